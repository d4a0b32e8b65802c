pub mod types;
pub mod yaml;

pub use types::{Step, Suite, TestCase};
pub use yaml::{builtin_suite, parse_suite_file};
