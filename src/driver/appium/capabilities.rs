use crate::error::{FlowError, FlowResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Capability keys defined by the W3C spec itself; everything else needs a vendor prefix
const W3C_STANDARD_KEYS: &[&str] = &[
    "platformName",
    "browserName",
    "browserVersion",
    "acceptInsecureCerts",
    "pageLoadStrategy",
    "proxy",
    "setWindowRect",
    "timeouts",
    "unhandledPromptBehavior",
    "strictFileInteractability",
];

const VENDOR_PREFIX: &str = "appium:";

/// Session capabilities: describes the target platform, device and application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub platform_name: String,
    #[serde(default)]
    pub platform_version: String,
    #[serde(default)]
    pub device_name: String,
    /// Path of the application binary, as seen by the server
    #[serde(default)]
    pub app: String,
    #[serde(default)]
    pub automation_name: String,
    #[serde(default)]
    pub app_package: String,
    #[serde(default)]
    pub app_activity: String,
    /// Additional capabilities passed through untouched (e.g. `noReset`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl Capabilities {
    /// Check every required field is present before contacting the server
    pub fn validate(&self) -> FlowResult<()> {
        let fields = [
            ("platformName", &self.platform_name),
            ("platformVersion", &self.platform_version),
            ("deviceName", &self.device_name),
            ("app", &self.app),
            ("automationName", &self.automation_name),
            ("appPackage", &self.app_package),
            ("appActivity", &self.app_activity),
        ];

        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(FlowError::Setup(format!(
                "missing capabilities: {}",
                missing.join(", ")
            )))
        }
    }

    /// Flat capability map with vendor prefixes applied
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        let mut insert = |key: &str, value: Value| {
            map.insert(prefixed(key), value);
        };

        insert("platformName", Value::from(self.platform_name.clone()));
        insert("platformVersion", Value::from(self.platform_version.clone()));
        insert("deviceName", Value::from(self.device_name.clone()));
        insert("app", Value::from(self.app.clone()));
        insert("automationName", Value::from(self.automation_name.clone()));
        insert("appPackage", Value::from(self.app_package.clone()));
        insert("appActivity", Value::from(self.app_activity.clone()));
        for (key, value) in &self.extra {
            insert(key, value.clone());
        }

        map
    }

    /// Body of a W3C new-session request
    pub fn to_w3c(&self) -> Value {
        serde_json::json!({
            "capabilities": {
                "alwaysMatch": Value::Object(self.to_map()),
                "firstMatch": [{}],
            }
        })
    }
}

fn prefixed(key: &str) -> String {
    if key.contains(':') || W3C_STANDARD_KEYS.contains(&key) {
        key.to_string()
    } else {
        format!("{}{}", VENDOR_PREFIX, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Capabilities {
        Capabilities {
            platform_name: "Android".to_string(),
            platform_version: "14.0".to_string(),
            device_name: "Android".to_string(),
            app: "/tmp/ajax.apk".to_string(),
            automation_name: "UIAutomator2".to_string(),
            app_package: "com.ajaxsystems".to_string(),
            app_activity: "com.ajaxsystems.ui.activity.LauncherActivity".to_string(),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn test_w3c_payload_prefixes_vendor_keys() {
        let mut caps = sample();
        caps.extra.insert("noReset".to_string(), Value::Bool(true));
        caps.extra
            .insert("appium:newCommandTimeout".to_string(), Value::from(120));

        let body = caps.to_w3c();
        let always = &body["capabilities"]["alwaysMatch"];
        assert_eq!(always["platformName"], "Android");
        assert_eq!(always["appium:platformVersion"], "14.0");
        assert_eq!(always["appium:appPackage"], "com.ajaxsystems");
        assert_eq!(always["appium:automationName"], "UIAutomator2");
        assert_eq!(always["appium:noReset"], true);
        assert_eq!(always["appium:newCommandTimeout"], 120);
        assert!(always.get("appPackage").is_none());
        assert_eq!(body["capabilities"]["firstMatch"], serde_json::json!([{}]));
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        let mut caps = sample();
        assert!(caps.validate().is_ok());

        caps.app.clear();
        caps.app_activity = "  ".to_string();
        let err = caps.validate().unwrap_err();
        assert!(err.is_setup());
        assert_eq!(
            err.to_string(),
            "Session setup failed: missing capabilities: app, appActivity"
        );
    }

    #[test]
    fn test_deserialize_from_yaml() {
        let yaml = r#"
platformName: Android
platformVersion: "14.0"
deviceName: Android
app: /tmp/ajax.apk
automationName: UIAutomator2
appPackage: com.ajaxsystems
appActivity: com.ajaxsystems.ui.activity.LauncherActivity
extra:
  noReset: true
"#;
        let caps: Capabilities = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(caps.platform_version, "14.0");
        assert_eq!(caps.extra.get("noReset"), Some(&Value::Bool(true)));
    }
}
