use crate::driver::appium::DEFAULT_SERVER_URL;
use crate::parser::types::Suite;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Automation server URL
    pub server_url: String,

    /// Session-wide implicit wait (s)
    pub implicit_wait_secs: u64,

    /// Default timeout for explicit waits (ms)
    pub wait_timeout_ms: u64,

    /// Poll interval for explicit waits (ms)
    pub poll_interval_ms: u64,

    /// HTTP request timeout (s); must exceed the implicit wait
    pub http_timeout_secs: u64,

    /// Log file, truncated at every run
    pub log_file: PathBuf,

    /// Output directory for reports and screenshots
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            implicit_wait_secs: 30,
            wait_timeout_ms: 10_000,
            poll_interval_ms: 500,
            http_timeout_secs: 90,
            log_file: PathBuf::from("test.log"),
            output_dir: PathBuf::from("./output"),
        }
    }
}

/// Values given on the command line; these beat both the suite file and the defaults
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub server_url: Option<String>,
    pub implicit_wait_secs: Option<u64>,
    pub wait_timeout_ms: Option<u64>,
}

impl Config {
    /// Effective configuration for one suite
    pub fn for_suite(&self, suite: &Suite, overrides: &Overrides) -> Config {
        let mut config = self.clone();

        if let Some(server) = overrides.server_url.clone().or_else(|| suite.server.clone()) {
            config.server_url = server;
        }
        if let Some(secs) = overrides.implicit_wait_secs.or(suite.implicit_wait) {
            config.implicit_wait_secs = secs;
        }
        if let Some(ms) = overrides.wait_timeout_ms.or(suite.wait_timeout_ms) {
            config.wait_timeout_ms = ms;
        }
        config.http_timeout_secs = config
            .http_timeout_secs
            .max(config.implicit_wait_secs + 30);

        config
    }

    pub fn implicit_wait(&self) -> Duration {
        Duration::from_secs(self.implicit_wait_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::yaml::builtin_suite;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server_url, "http://127.0.0.1:4723/wd/hub");
        assert_eq!(config.implicit_wait(), Duration::from_secs(30));
        assert_eq!(config.wait_timeout(), Duration::from_secs(10));
        assert_eq!(config.log_file, PathBuf::from("test.log"));
    }

    #[test]
    fn test_precedence_overrides_then_suite_then_default() {
        let mut suite = builtin_suite().unwrap();
        suite.server = Some("http://suite:4723".to_string());
        suite.implicit_wait = Some(5);
        suite.wait_timeout_ms = None;

        let config = Config::default().for_suite(&suite, &Overrides::default());
        assert_eq!(config.server_url, "http://suite:4723");
        assert_eq!(config.implicit_wait_secs, 5);
        assert_eq!(config.wait_timeout_ms, 10_000);

        let overrides = Overrides {
            server_url: Some("http://cli:4723".to_string()),
            implicit_wait_secs: Some(120),
            wait_timeout_ms: Some(2_000),
        };
        let config = Config::default().for_suite(&suite, &overrides);
        assert_eq!(config.server_url, "http://cli:4723");
        assert_eq!(config.implicit_wait_secs, 120);
        assert_eq!(config.wait_timeout_ms, 2_000);
        assert!(config.http_timeout_secs > 120);
    }
}
