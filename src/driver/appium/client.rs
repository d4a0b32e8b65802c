//! Appium HTTP client (W3C WebDriver protocol)
//!
//! Talks to an Appium server, by default at `http://127.0.0.1:4723/wd/hub`. Every call goes
//! through [`call`], which unwraps the `{"value": ...}` envelope and turns W3C error
//! responses into [`FlowError::Protocol`].

use super::capabilities::Capabilities;
use crate::driver::traits::{DriverConnector, ElementRef, Locator, SessionDriver};
use crate::error::{FlowError, FlowResult};
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Default Appium endpoint
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:4723/wd/hub";

/// W3C element identifier key
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
/// Legacy JSONWP element key, still returned by some servers
const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

/// W3C error body
#[derive(Debug, Deserialize)]
struct WdError {
    error: String,
    #[serde(default)]
    message: String,
}

/// New session response value
#[derive(Debug, Deserialize)]
struct NewSessionValue {
    #[serde(rename = "sessionId")]
    session_id: String,
}

/// Server status value
#[derive(Debug, Clone, Deserialize)]
pub struct ServerStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub message: String,
}

/// Send one command and return the `value` field of the response
async fn call(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    body: Option<Value>,
    command: &str,
) -> FlowResult<Value> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let resp = request.send().await.map_err(|source| FlowError::Transport {
        command: command.to_string(),
        source,
    })?;

    let status = resp.status();
    let text = resp.text().await.map_err(|source| FlowError::Transport {
        command: command.to_string(),
        source,
    })?;

    let mut envelope: Value = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).map_err(|e| FlowError::Protocol {
            command: command.to_string(),
            error: "invalid response".to_string(),
            message: format!("HTTP {}: {} ({})", status.as_u16(), text, e),
        })?
    };
    let value = envelope
        .get_mut("value")
        .map(Value::take)
        .unwrap_or(Value::Null);

    if !status.is_success() {
        let err: WdError = serde_json::from_value(value).unwrap_or_else(|_| WdError {
            error: "unknown error".to_string(),
            message: format!("HTTP {}: {}", status.as_u16(), text),
        });
        return Err(FlowError::Protocol {
            command: command.to_string(),
            error: err.error,
            message: err.message,
        });
    }

    Ok(value)
}

fn decode<T: DeserializeOwned>(value: Value, command: &str) -> FlowResult<T> {
    serde_json::from_value(value).map_err(|e| FlowError::Protocol {
        command: command.to_string(),
        error: "invalid response".to_string(),
        message: e.to_string(),
    })
}

fn element_from_value(value: &Value) -> Option<ElementRef> {
    value
        .get(ELEMENT_KEY)
        .or_else(|| value.get(LEGACY_ELEMENT_KEY))
        .and_then(Value::as_str)
        .map(|id| ElementRef(id.to_string()))
}

fn elements_from_value(value: &Value, command: &str) -> FlowResult<Vec<ElementRef>> {
    let items = value.as_array().ok_or_else(|| FlowError::Protocol {
        command: command.to_string(),
        error: "invalid response".to_string(),
        message: format!("expected element list, got {}", value),
    })?;
    Ok(items.iter().filter_map(element_from_value).collect())
}

fn http_client(timeout: Duration) -> FlowResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|source| FlowError::Transport {
            command: "build HTTP client".to_string(),
            source,
        })
}

/// Query `/status` on an Appium server
pub async fn server_status(server_url: &str, timeout: Duration) -> FlowResult<ServerStatus> {
    let client = http_client(timeout)?;
    let url = format!("{}/status", server_url.trim_end_matches('/'));
    let value = call(&client, Method::GET, &url, None, "status").await?;
    decode(value, "status")
}

/// Creates Appium sessions
pub struct AppiumConnector {
    server_url: String,
    http_timeout: Duration,
}

impl AppiumConnector {
    pub fn new(server_url: &str, http_timeout: Duration) -> Self {
        Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            http_timeout,
        }
    }
}

#[async_trait]
impl DriverConnector for AppiumConnector {
    fn endpoint(&self) -> &str {
        &self.server_url
    }

    async fn connect(&self, capabilities: &Capabilities) -> FlowResult<Box<dyn SessionDriver>> {
        capabilities.validate()?;

        let client = http_client(self.http_timeout)?;
        let url = format!("{}/session", self.server_url);
        let value = call(
            &client,
            Method::POST,
            &url,
            Some(capabilities.to_w3c()),
            "newSession",
        )
        .await
        .map_err(|e| FlowError::Setup(e.to_string()))?;

        let session: NewSessionValue =
            decode(value, "newSession").map_err(|e| FlowError::Setup(e.to_string()))?;

        log::info!(
            "Created session {} on {} for {}/{}",
            session.session_id,
            self.server_url,
            capabilities.app_package,
            capabilities.app_activity
        );

        Ok(Box::new(AppiumClient {
            base_url: self.server_url.clone(),
            client,
            session_id: session.session_id,
        }))
    }
}

/// Appium client bound to one session
pub struct AppiumClient {
    /// Server URL, e.g. "http://127.0.0.1:4723/wd/hub"
    base_url: String,
    client: reqwest::Client,
    session_id: String,
}

impl AppiumClient {
    /// Attach to an already existing session
    pub fn attach(server_url: &str, session_id: &str, http_timeout: Duration) -> FlowResult<Self> {
        Ok(Self {
            base_url: server_url.trim_end_matches('/').to_string(),
            client: http_client(http_timeout)?,
            session_id: session_id.to_string(),
        })
    }

    fn session_url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.base_url, self.session_id, path)
    }

    fn element_url(&self, element: &ElementRef, path: &str) -> String {
        self.session_url(&format!("/element/{}{}", element.id(), path))
    }

    async fn get(&self, url: &str, command: &str) -> FlowResult<Value> {
        call(&self.client, Method::GET, url, None, command).await
    }

    async fn post(&self, url: &str, body: Value, command: &str) -> FlowResult<Value> {
        call(&self.client, Method::POST, url, Some(body), command).await
    }

    fn locator_body(locator: &Locator) -> Value {
        serde_json::json!({
            "using": locator.strategy.as_w3c(),
            "value": locator.value,
        })
    }
}

#[async_trait]
impl SessionDriver for AppiumClient {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn set_implicit_wait(&self, timeout: Duration) -> FlowResult<()> {
        let body = serde_json::json!({ "implicit": timeout.as_millis() as u64 });
        self.post(&self.session_url("/timeouts"), body, "setTimeouts")
            .await?;
        Ok(())
    }

    async fn find_element(&self, locator: &Locator) -> FlowResult<ElementRef> {
        let result = self
            .post(
                &self.session_url("/element"),
                Self::locator_body(locator),
                "findElement",
            )
            .await;

        match result {
            Ok(value) => element_from_value(&value).ok_or_else(|| FlowError::Protocol {
                command: "findElement".to_string(),
                error: "invalid response".to_string(),
                message: format!("no element id in {}", value),
            }),
            Err(e) if e.protocol_code() == Some("no such element") => {
                Err(FlowError::ElementNotFound {
                    locator: locator.clone(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn find_elements(&self, locator: &Locator) -> FlowResult<Vec<ElementRef>> {
        let value = self
            .post(
                &self.session_url("/elements"),
                Self::locator_body(locator),
                "findElements",
            )
            .await?;
        elements_from_value(&value, "findElements")
    }

    async fn find_child_elements(
        &self,
        parent: &ElementRef,
        locator: &Locator,
    ) -> FlowResult<Vec<ElementRef>> {
        let value = self
            .post(
                &self.element_url(parent, "/elements"),
                Self::locator_body(locator),
                "findChildElements",
            )
            .await?;
        elements_from_value(&value, "findChildElements")
    }

    async fn click(&self, element: &ElementRef) -> FlowResult<()> {
        self.post(
            &self.element_url(element, "/click"),
            serde_json::json!({}),
            "elementClick",
        )
        .await?;
        Ok(())
    }

    async fn clear(&self, element: &ElementRef) -> FlowResult<()> {
        self.post(
            &self.element_url(element, "/clear"),
            serde_json::json!({}),
            "elementClear",
        )
        .await?;
        Ok(())
    }

    async fn send_keys(&self, element: &ElementRef, text: &str) -> FlowResult<()> {
        let chars: Vec<String> = text.chars().map(|c| c.to_string()).collect();
        let body = serde_json::json!({ "text": text, "value": chars });
        self.post(&self.element_url(element, "/value"), body, "elementSendKeys")
            .await?;
        Ok(())
    }

    async fn is_displayed(&self, element: &ElementRef) -> FlowResult<bool> {
        let value = self
            .get(&self.element_url(element, "/displayed"), "isElementDisplayed")
            .await?;
        decode(value, "isElementDisplayed")
    }

    async fn page_source(&self) -> FlowResult<String> {
        let value = self.get(&self.session_url("/source"), "getPageSource").await?;
        decode(value, "getPageSource")
    }

    async fn screenshot(&self) -> FlowResult<String> {
        let value = self
            .get(&self.session_url("/screenshot"), "takeScreenshot")
            .await?;
        decode(value, "takeScreenshot")
    }

    async fn quit(&self) -> FlowResult<()> {
        call(
            &self.client,
            Method::DELETE,
            &self.session_url(""),
            None,
            "deleteSession",
        )
        .await
        .map_err(|e| FlowError::Teardown(e.to_string()))?;
        Ok(())
    }
}
