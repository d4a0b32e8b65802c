use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

fn var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([a-zA-Z0-9_.]+)\}").expect("valid variable pattern"))
}

/// Names of the `${var}` placeholders used in a string
pub fn referenced_vars(text: &str) -> Vec<String> {
    var_pattern()
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Runtime information for one test case instance
#[derive(Debug, Clone)]
pub struct CaseContext {
    /// Variables of the current variant
    pub vars: BTreeMap<String, String>,

    /// Session-wide implicit wait, restored after explicit waits
    pub implicit_wait: Duration,

    /// Default timeout for explicit waits
    pub wait_timeout: Duration,

    /// Poll interval for explicit waits
    pub poll_interval: Duration,
}

impl CaseContext {
    pub fn new(
        vars: BTreeMap<String, String>,
        implicit_wait: Duration,
        wait_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            vars,
            implicit_wait,
            wait_timeout,
            poll_interval,
        }
    }

    /// Explicit wait timeout for a step, falling back to the default
    pub fn wait_for(&self, timeout_ms: Option<u64>) -> Duration {
        timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.wait_timeout)
    }

    /// Substitute `${varname}` patterns; unknown names are left untouched
    pub fn substitute_vars(&self, text: &str) -> String {
        var_pattern()
            .replace_all(text, |caps: &regex::Captures| {
                let key = &caps[1];
                match self.vars.get(key) {
                    Some(value) => value.clone(),
                    None => format!("${{{}}}", key),
                }
            })
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(pairs: &[(&str, &str)]) -> CaseContext {
        let vars = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CaseContext::new(
            vars,
            Duration::from_secs(30),
            Duration::from_secs(10),
            Duration::from_millis(500),
        )
    }

    #[test]
    fn test_substitute_vars() {
        let ctx = context(&[("username", "incorrect_username"), ("password", "secret")]);
        assert_eq!(
            ctx.substitute_vars("user=${username} pass=${password}"),
            "user=incorrect_username pass=secret"
        );
    }

    #[test]
    fn test_unknown_vars_kept() {
        let ctx = context(&[]);
        assert_eq!(ctx.substitute_vars("${missing}"), "${missing}");
        assert_eq!(ctx.substitute_vars("plain text"), "plain text");
    }

    #[test]
    fn test_referenced_vars() {
        assert_eq!(
            referenced_vars("${username} and ${password} and ${username}"),
            vec!["username", "password", "username"]
        );
        assert!(referenced_vars("no placeholders").is_empty());
    }

    #[test]
    fn test_wait_for_default() {
        let ctx = context(&[]);
        assert_eq!(ctx.wait_for(None), Duration::from_secs(10));
        assert_eq!(ctx.wait_for(Some(250)), Duration::from_millis(250));
    }
}
