use crate::driver::appium::Capabilities;
use crate::error::FlowResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Locator strategy understood by the automation server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Strategy {
    /// Android resource id (e.g. `com.ajaxsystems:id/menuDrawer`)
    Id,
    /// XPath over the UI hierarchy
    XPath,
    /// Accessibility id / content-desc
    AccessibilityId,
    /// Widget class name
    ClassName,
}

impl Strategy {
    /// Value of the `using` field in a W3C find-element request
    pub fn as_w3c(&self) -> &'static str {
        match self {
            Strategy::Id => "id",
            Strategy::XPath => "xpath",
            Strategy::AccessibilityId => "accessibility id",
            Strategy::ClassName => "class name",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Strategy::Id => "id",
            Strategy::XPath => "xpath",
            Strategy::AccessibilityId => "accessibilityId",
            Strategy::ClassName => "className",
        }
    }
}

/// Element locator: a (strategy, value) pair, resolved again on every use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub strategy: Strategy,
    pub value: String,
}

impl Locator {
    pub fn new(strategy: Strategy, value: impl Into<String>) -> Self {
        Self {
            strategy,
            value: value.into(),
        }
    }

    pub fn id(value: impl Into<String>) -> Self {
        Self::new(Strategy::Id, value)
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self::new(Strategy::XPath, value)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy.label(), self.value)
    }
}

/// Server-side element handle. Valid only until the next screen transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef(pub String);

impl ElementRef {
    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Operations the flow runner needs from a live application session
///
/// Implementations talk to the automation server; locator resolution happens there.
#[async_trait]
pub trait SessionDriver: Send + Sync {
    /// Server-assigned session id
    fn session_id(&self) -> &str;

    /// Apply the session-wide implicit wait used by every element lookup
    async fn set_implicit_wait(&self, timeout: Duration) -> FlowResult<()>;

    /// Resolve a locator to exactly one element
    ///
    /// Fails with `ElementNotFound` once the implicit wait expires.
    async fn find_element(&self, locator: &Locator) -> FlowResult<ElementRef>;

    /// Resolve a locator to every matching element (possibly none)
    async fn find_elements(&self, locator: &Locator) -> FlowResult<Vec<ElementRef>>;

    /// Resolve a locator relative to a parent element
    async fn find_child_elements(
        &self,
        parent: &ElementRef,
        locator: &Locator,
    ) -> FlowResult<Vec<ElementRef>>;

    /// Tap an element
    async fn click(&self, element: &ElementRef) -> FlowResult<()>;

    /// Clear an editable element
    async fn clear(&self, element: &ElementRef) -> FlowResult<()>;

    /// Type literal text into an element
    async fn send_keys(&self, element: &ElementRef, text: &str) -> FlowResult<()>;

    /// Whether the element is currently displayed
    async fn is_displayed(&self, element: &ElementRef) -> FlowResult<bool>;

    /// Serialized UI hierarchy of the current screen
    async fn page_source(&self) -> FlowResult<String>;

    /// Screenshot of the current screen, base64 encoded PNG
    async fn screenshot(&self) -> FlowResult<String>;

    /// End the session and terminate the application
    async fn quit(&self) -> FlowResult<()>;
}

/// Creates sessions on an automation server
#[async_trait]
pub trait DriverConnector: Send + Sync {
    /// Endpoint sessions are created against (for display)
    fn endpoint(&self) -> &str;

    /// Create a session and launch the application. Failure is a setup error.
    async fn connect(&self, capabilities: &Capabilities) -> FlowResult<Box<dyn SessionDriver>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_display() {
        let locator = Locator::xpath("//android.widget.TextView[@bounds=\"[480,2076][600,2137]\"]");
        assert_eq!(
            locator.to_string(),
            "xpath=//android.widget.TextView[@bounds=\"[480,2076][600,2137]\"]"
        );
        assert_eq!(
            Locator::new(Strategy::AccessibilityId, "Menu").to_string(),
            "accessibilityId=Menu"
        );
    }

    #[test]
    fn test_w3c_strategy_names() {
        assert_eq!(Strategy::Id.as_w3c(), "id");
        assert_eq!(Strategy::XPath.as_w3c(), "xpath");
        assert_eq!(Strategy::AccessibilityId.as_w3c(), "accessibility id");
        assert_eq!(Strategy::ClassName.as_w3c(), "class name");
    }
}
