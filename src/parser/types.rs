use crate::driver::appium::Capabilities;
use crate::driver::traits::{Locator, Strategy};
use crate::error::{FlowError, FlowResult};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// A suite: one capabilities set, one session, an ordered list of test cases
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suite {
    pub name: String,

    /// Automation server URL
    #[serde(default)]
    pub server: Option<String>,

    /// Session-wide implicit wait in seconds
    #[serde(default)]
    pub implicit_wait: Option<u64>,

    /// Default explicit wait timeout in milliseconds
    #[serde(default, alias = "waitTimeout")]
    pub wait_timeout_ms: Option<u64>,

    /// Screen the application shows right after launch
    #[serde(default)]
    pub start_screen: Option<String>,

    pub capabilities: Capabilities,

    #[serde(default)]
    pub cases: Vec<TestCase>,
}

/// One named step sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub name: String,

    /// Logged when the case starts
    #[serde(default)]
    pub description: Option<String>,

    /// Screen this case expects to start on
    #[serde(default)]
    pub from: Option<String>,

    /// Screen this case leaves behind
    #[serde(default)]
    pub to: Option<String>,

    /// Variable sets; the case runs once per entry
    #[serde(default)]
    pub variants: Vec<BTreeMap<String, String>>,

    pub steps: Vec<Step>,
}

/// All supported steps
///
/// Written in YAML as a one-key mapping from step name to parameters.
#[derive(Debug, Clone)]
pub enum Step {
    TapOn(LocatorInput),
    InputText(InputTextParams),
    WaitForVisible(WaitParams),
    AssertSourceContains(MarkerParams),
    AssertSourceLacks(MarkerParams),
    AssertChildren(ChildrenParams),
}

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_yaml::Value::deserialize(deserializer)?;
        super::yaml::parse_step_value(&value).map_err(serde::de::Error::custom)
    }
}

impl Serialize for Step {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Step::TapOn(p) => map.serialize_entry(self.name(), p)?,
            Step::InputText(p) => map.serialize_entry(self.name(), p)?,
            Step::WaitForVisible(p) => map.serialize_entry(self.name(), p)?,
            Step::AssertSourceContains(p) | Step::AssertSourceLacks(p) => {
                map.serialize_entry(self.name(), p)?
            }
            Step::AssertChildren(p) => map.serialize_entry(self.name(), p)?,
        }
        map.end()
    }
}

impl Step {
    /// Step name as written in YAML
    pub fn name(&self) -> &'static str {
        match self {
            Step::TapOn(_) => "tapOn",
            Step::InputText(_) => "inputText",
            Step::WaitForVisible(_) => "waitForVisible",
            Step::AssertSourceContains(_) => "assertSourceContains",
            Step::AssertSourceLacks(_) => "assertSourceLacks",
            Step::AssertChildren(_) => "assertChildren",
        }
    }

    pub fn display_name(&self) -> String {
        let detail = match self {
            Step::TapOn(target) => target.describe(),
            Step::InputText(p) => format!("\"{}\" into {}", p.text, p.target.describe()),
            Step::WaitForVisible(p) => p.target.describe(),
            Step::AssertSourceContains(p) | Step::AssertSourceLacks(p) => {
                format!("\"{}\"", p.marker)
            }
            Step::AssertChildren(p) => format!(
                "{} within {}",
                p.children.describe(),
                p.parent.describe()
            ),
        };
        format!("{} {}", self.name(), detail)
    }

    /// Text fields that may reference `${var}` placeholders
    pub fn templated_fields(&self) -> Vec<&str> {
        match self {
            Step::InputText(p) => vec![p.text.as_str()],
            Step::AssertSourceContains(p) | Step::AssertSourceLacks(p) => {
                vec![p.marker.as_str()]
            }
            _ => Vec::new(),
        }
    }

    /// Every locator the step resolves
    pub fn locators(&self) -> Vec<&LocatorInput> {
        match self {
            Step::TapOn(target) => vec![target],
            Step::InputText(p) => vec![&p.target],
            Step::WaitForVisible(p) => vec![&p.target],
            Step::AssertChildren(p) => vec![&p.parent, &p.children],
            Step::AssertSourceContains(_) | Step::AssertSourceLacks(_) => Vec::new(),
        }
    }
}

/// Locator as written in YAML: exactly one strategy key must be set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatorInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessibility_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

impl LocatorInput {
    pub fn to_locator(&self) -> FlowResult<Locator> {
        let candidates = [
            (Strategy::Id, &self.id),
            (Strategy::XPath, &self.xpath),
            (Strategy::AccessibilityId, &self.accessibility_id),
            (Strategy::ClassName, &self.class_name),
        ];

        let mut set = candidates
            .iter()
            .filter_map(|(strategy, value)| value.as_ref().map(|v| (*strategy, v)));

        match (set.next(), set.next()) {
            (Some((strategy, value)), None) if !value.is_empty() => {
                Ok(Locator::new(strategy, value.clone()))
            }
            (Some(_), None) => Err(FlowError::InvalidSuite(
                "locator value must not be empty".to_string(),
            )),
            (None, _) => Err(FlowError::InvalidSuite(
                "locator needs one of: id, xpath, accessibilityId, className".to_string(),
            )),
            (Some(_), Some(_)) => Err(FlowError::InvalidSuite(format!(
                "locator sets more than one strategy: {:?}",
                self
            ))),
        }
    }

    pub fn describe(&self) -> String {
        match self.to_locator() {
            Ok(locator) => locator.to_string(),
            Err(_) => format!("{:?}", self),
        }
    }
}

impl From<Locator> for LocatorInput {
    fn from(locator: Locator) -> Self {
        let mut input = LocatorInput::default();
        match locator.strategy {
            Strategy::Id => input.id = Some(locator.value),
            Strategy::XPath => input.xpath = Some(locator.value),
            Strategy::AccessibilityId => input.accessibility_id = Some(locator.value),
            Strategy::ClassName => input.class_name = Some(locator.value),
        }
        input
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputTextParams {
    #[serde(flatten)]
    pub target: LocatorInput,
    pub text: String,
    /// Clear the field before typing
    #[serde(default)]
    pub clear: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitParams {
    #[serde(flatten)]
    pub target: LocatorInput,
    /// Timeout in milliseconds
    #[serde(default)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerParams {
    pub marker: String,
    /// Failure message
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildrenParams {
    /// Container waited for before its children are resolved
    pub parent: LocatorInput,
    pub children: LocatorInput,
    /// Timeout for the parent to become visible, in milliseconds
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_input_single_strategy() {
        let input = LocatorInput {
            id: Some("com.ajaxsystems:id/menuDrawer".to_string()),
            ..Default::default()
        };
        assert_eq!(
            input.to_locator().unwrap(),
            Locator::id("com.ajaxsystems:id/menuDrawer")
        );
    }

    #[test]
    fn test_locator_input_rejects_zero_or_two() {
        assert!(LocatorInput::default().to_locator().is_err());

        let both = LocatorInput {
            id: Some("a".to_string()),
            xpath: Some("//b".to_string()),
            ..Default::default()
        };
        let err = both.to_locator().unwrap_err();
        assert!(err.to_string().contains("more than one strategy"));

        let empty = LocatorInput {
            xpath: Some(String::new()),
            ..Default::default()
        };
        assert!(empty.to_locator().is_err());
    }

    #[test]
    fn test_parse_steps() {
        let yaml = r#"
- tapOn:
    id: com.android.permissioncontroller:id/permission_allow_button
- inputText:
    xpath: //android.widget.EditText[@bounds="[0,273][1080,446]"]
    text: ${username}
- waitForVisible:
    xpath: //xpath_of_sidebar_element
    timeout: 10000
- assertSourceContains:
    marker: error_message_element
"#;
        let steps: Vec<Step> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(steps.len(), 4);

        match &steps[1] {
            Step::InputText(p) => {
                assert_eq!(p.text, "${username}");
                assert!(!p.clear);
                assert_eq!(p.target.to_locator().unwrap().strategy, Strategy::XPath);
            }
            other => panic!("unexpected step: {:?}", other),
        }
        match &steps[2] {
            Step::WaitForVisible(p) => assert_eq!(p.timeout, Some(10000)),
            other => panic!("unexpected step: {:?}", other),
        }
        assert_eq!(steps[3].templated_fields(), vec!["error_message_element"]);
    }

    #[test]
    fn test_step_serializes_as_single_key_mapping() {
        let step = Step::TapOn(LocatorInput::from(Locator::id("menuDrawer")));
        let yaml = serde_yaml::to_string(&vec![step]).unwrap();
        assert!(yaml.contains("tapOn:"));
        assert!(!yaml.contains('!'));

        let parsed: Vec<Step> = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed[0].name(), "tapOn");
    }

    #[test]
    fn test_display_name() {
        let step = Step::TapOn(LocatorInput::from(Locator::id("menuDrawer")));
        assert_eq!(step.display_name(), "tapOn id=menuDrawer");
    }
}
