//! Appium driver module
//!
//! Client for an Appium server speaking the W3C WebDriver protocol. The server owns
//! locator resolution and device control; this module only forwards commands.

pub mod capabilities;
pub mod client;

pub use capabilities::Capabilities;
pub use client::{server_status, AppiumClient, AppiumConnector, ServerStatus, DEFAULT_SERVER_URL};
