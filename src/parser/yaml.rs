use super::types::{Step, Suite};
use crate::error::{FlowError, FlowResult};
use crate::runner::context::referenced_vars;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

/// Suite shipped with the binary: the Ajax onboarding and login journey
const BUILTIN_SUITE: &str = include_str!("../../suites/ajax_login.yaml");

/// Parse a YAML suite file
pub fn parse_suite_file(path: &Path) -> Result<Suite> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    parse_suite_content(&content, path)
}

/// Parse and validate YAML content into a Suite
pub fn parse_suite_content(content: &str, source_path: &Path) -> Result<Suite> {
    let suite: Suite = serde_yaml::from_str(content)
        .with_context(|| format!("Failed to parse YAML suite: {}", source_path.display()))?;

    validate_suite(&suite).with_context(|| format!("In {}", source_path.display()))?;
    Ok(suite)
}

/// Parse a single step written as a one-key mapping, e.g. `tapOn: { id: ... }`
pub fn parse_step_value(value: &serde_yaml::Value) -> FlowResult<Step> {
    let map = value.as_mapping().ok_or_else(|| {
        FlowError::InvalidSuite(format!("step must be a mapping, got {:?}", value))
    })?;

    let mut entries = map.iter();
    let (key, params) = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        _ => {
            return Err(FlowError::InvalidSuite(format!(
                "step must have exactly one key, got {}",
                map.len()
            )))
        }
    };
    let name = key
        .as_str()
        .ok_or_else(|| FlowError::InvalidSuite("step name must be a string".to_string()))?;

    let invalid = |e: serde_yaml::Error| FlowError::InvalidSuite(format!("{}: {}", name, e));
    let params = params.clone();

    let step = match name {
        "tapOn" | "tap" => Step::TapOn(serde_yaml::from_value(params).map_err(invalid)?),
        "inputText" => Step::InputText(serde_yaml::from_value(params).map_err(invalid)?),
        "waitForVisible" | "waitVisible" => {
            Step::WaitForVisible(serde_yaml::from_value(params).map_err(invalid)?)
        }
        "assertSourceContains" => {
            Step::AssertSourceContains(serde_yaml::from_value(params).map_err(invalid)?)
        }
        "assertSourceLacks" => {
            Step::AssertSourceLacks(serde_yaml::from_value(params).map_err(invalid)?)
        }
        "assertChildren" => Step::AssertChildren(serde_yaml::from_value(params).map_err(invalid)?),
        other => {
            return Err(FlowError::InvalidSuite(format!("unknown step '{}'", other)));
        }
    };

    Ok(step)
}

/// The built-in suite
pub fn builtin_suite() -> Result<Suite> {
    parse_suite_content(BUILTIN_SUITE, Path::new("<builtin>/ajax_login.yaml"))
}

/// Check a suite is runnable before any session is created
pub fn validate_suite(suite: &Suite) -> FlowResult<()> {
    if suite.cases.is_empty() {
        return Err(FlowError::InvalidSuite(format!(
            "suite '{}' has no cases",
            suite.name
        )));
    }

    let mut names = HashSet::new();
    for case in &suite.cases {
        if !names.insert(case.name.as_str()) {
            return Err(FlowError::InvalidSuite(format!(
                "duplicate case name '{}'",
                case.name
            )));
        }

        if case.steps.is_empty() {
            return Err(FlowError::InvalidSuite(format!(
                "case '{}' has no steps",
                case.name
            )));
        }

        for step in &case.steps {
            for locator in step.locators() {
                locator.to_locator().map_err(|e| {
                    FlowError::InvalidSuite(format!("case '{}': {}", case.name, e))
                })?;
            }
        }

        check_variables(case)?;
    }

    check_screen_chain(suite)
}

/// Every `${var}` a case uses must be defined by each of its variants
fn check_variables(case: &super::types::TestCase) -> FlowResult<()> {
    let mut used: Vec<String> = case
        .steps
        .iter()
        .flat_map(|step| step.templated_fields())
        .chain(case.description.as_deref())
        .flat_map(referenced_vars)
        .collect();
    used.sort();
    used.dedup();

    if used.is_empty() {
        return Ok(());
    }

    if case.variants.is_empty() {
        return Err(FlowError::InvalidSuite(format!(
            "case '{}' uses {} but defines no variants",
            case.name,
            used.join(", ")
        )));
    }

    for (idx, variant) in case.variants.iter().enumerate() {
        let missing: Vec<&str> = used
            .iter()
            .filter(|name| !variant.contains_key(name.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(FlowError::InvalidSuite(format!(
                "case '{}' variant {} does not define {}",
                case.name,
                idx + 1,
                missing.join(", ")
            )));
        }
    }

    Ok(())
}

/// Declared `from` of each case must match the screen the previous case leaves
fn check_screen_chain(suite: &Suite) -> FlowResult<()> {
    let mut current = suite.start_screen.clone();

    for case in &suite.cases {
        if let (Some(from), Some(expected)) = (&case.from, &current) {
            if from != expected {
                return Err(FlowError::InvalidSuite(format!(
                    "case '{}' starts on screen '{}' but the previous case leaves '{}'",
                    case.name, from, expected
                )));
            }
        }
        current = case.to.clone();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = r#"
name: sample
capabilities:
  platformName: Android
  platformVersion: "14.0"
  deviceName: Android
  app: /tmp/app.apk
  automationName: UIAutomator2
  appPackage: com.example
  appActivity: com.example.Main
"#;

    fn suite_with(cases: &str) -> String {
        format!("{}{}", HEADER, cases)
    }

    #[test]
    fn test_builtin_suite_is_valid() {
        let suite = builtin_suite().unwrap();
        assert_eq!(suite.name, "ajax_login");
        assert_eq!(suite.implicit_wait, Some(30));
        assert_eq!(suite.capabilities.app_package, "com.ajaxsystems");
        assert_eq!(suite.cases.len(), 7);

        let invalid = &suite.cases[2];
        assert_eq!(invalid.name, "login_with_invalid_credentials");
        assert_eq!(invalid.variants.len(), 3);
        assert_eq!(invalid.variants[0]["username"], "incorrect_username");
        assert_eq!(invalid.variants[2]["password"], "incorrect_password");
    }

    #[test]
    fn test_rejects_duplicate_case_names() {
        let yaml = suite_with(
            r#"
cases:
  - name: a
    steps: [ { tapOn: { id: x } } ]
  - name: a
    steps: [ { tapOn: { id: y } } ]
"#,
        );
        let err = parse_suite_content(&yaml, Path::new("dup.yaml")).unwrap_err();
        assert!(format!("{:#}", err).contains("duplicate case name 'a'"));
    }

    #[test]
    fn test_rejects_undefined_variable() {
        let yaml = suite_with(
            r#"
cases:
  - name: login
    variants:
      - { username: u }
    steps:
      - inputText: { id: field, text: "${username}:${password}" }
"#,
        );
        let err = parse_suite_content(&yaml, Path::new("vars.yaml")).unwrap_err();
        assert!(format!("{:#}", err).contains("variant 1 does not define password"));
    }

    #[test]
    fn test_rejects_broken_screen_chain() {
        let yaml = suite_with(
            r#"
startScreen: home
cases:
  - name: first
    from: home
    to: login
    steps: [ { tapOn: { id: x } } ]
  - name: second
    from: dashboard
    steps: [ { tapOn: { id: y } } ]
"#,
        );
        let err = parse_suite_content(&yaml, Path::new("chain.yaml")).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("starts on screen 'dashboard'"));
        assert!(message.contains("the previous case leaves 'login'"));
    }

    #[test]
    fn test_undeclared_screens_are_not_checked() {
        let yaml = suite_with(
            r#"
cases:
  - name: first
    to: login
    steps: [ { tapOn: { id: x } } ]
  - name: second
    steps: [ { tapOn: { id: y } } ]
  - name: third
    from: anywhere
    steps: [ { tapOn: { id: z } } ]
"#,
        );
        assert!(parse_suite_content(&yaml, Path::new("loose.yaml")).is_ok());
    }

    #[test]
    fn test_rejects_locator_without_strategy() {
        let yaml = suite_with(
            r#"
cases:
  - name: tap
    steps: [ { tapOn: {} } ]
"#,
        );
        assert!(parse_suite_content(&yaml, Path::new("loc.yaml")).is_err());
    }

    #[test]
    fn test_rejects_locator_with_two_strategies() {
        let yaml = suite_with(
            r#"
cases:
  - name: tap
    steps: [ { tapOn: { id: a, xpath: //b } } ]
"#,
        );
        let err = parse_suite_content(&yaml, Path::new("loc.yaml")).unwrap_err();
        assert!(format!("{:#}", err).contains("more than one strategy"));
    }

    #[test]
    fn test_parse_step_value() {
        let value: serde_yaml::Value = serde_yaml::from_str(
            "waitVisible: { xpath: //xpath_of_sidebar_element, timeout: 10000 }",
        )
        .unwrap();
        match parse_step_value(&value).unwrap() {
            Step::WaitForVisible(p) => {
                assert_eq!(p.timeout, Some(10000));
                assert_eq!(
                    p.target.to_locator().unwrap().value,
                    "//xpath_of_sidebar_element"
                );
            }
            other => panic!("unexpected step: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_or_ambiguous_step() {
        let unknown: serde_yaml::Value = serde_yaml::from_str("swipeUp: {}").unwrap();
        let err = parse_step_value(&unknown).unwrap_err();
        assert!(err.to_string().contains("unknown step 'swipeUp'"));

        let two_keys: serde_yaml::Value =
            serde_yaml::from_str("{ tapOn: { id: a }, inputText: { id: b, text: c } }").unwrap();
        let err = parse_step_value(&two_keys).unwrap_err();
        assert!(err.to_string().contains("exactly one key"));

        let bare: serde_yaml::Value = serde_yaml::from_str("tapOn").unwrap();
        assert!(parse_step_value(&bare).is_err());
    }
}
