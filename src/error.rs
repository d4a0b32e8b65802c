//! Error types for flow execution
//!
//! Each variant maps to one failure class of a suite run. Only `Setup` is fatal for the
//! whole suite; everything raised while a case runs fails that case alone.

use crate::driver::traits::Locator;
use thiserror::Error;

pub type FlowResult<T> = std::result::Result<T, FlowError>;

#[derive(Error, Debug)]
pub enum FlowError {
    // === Session lifecycle ===
    #[error("Session setup failed: {0}")]
    Setup(String),

    #[error("Session teardown failed: {0}")]
    Teardown(String),

    // === Step failures ===
    #[error("Element not found: {locator}")]
    ElementNotFound { locator: Locator },

    #[error("Element {locator} not visible after {timeout_ms}ms")]
    WaitTimeout { locator: Locator, timeout_ms: u64 },

    #[error("{0}")]
    Assertion(String),

    // === Server communication ===
    #[error("Server returned '{error}' for {command}: {message}")]
    Protocol {
        command: String,
        error: String,
        message: String,
    },

    #[error("Request for {command} failed: {source}")]
    Transport {
        command: String,
        #[source]
        source: reqwest::Error,
    },

    // === Suite definition ===
    #[error("Invalid suite: {0}")]
    InvalidSuite(String),
}

impl FlowError {
    /// Whether this error means the session could not be brought up
    pub fn is_setup(&self) -> bool {
        matches!(self, FlowError::Setup(_))
    }

    /// W3C error code reported by the server, if this is a protocol error
    pub fn protocol_code(&self) -> Option<&str> {
        match self {
            FlowError::Protocol { error, .. } => Some(error.as_str()),
            _ => None,
        }
    }

    /// Short name of the failure class, used as the JUnit failure type
    pub fn kind(&self) -> &'static str {
        match self {
            FlowError::Setup(_) => "SetupError",
            FlowError::Teardown(_) => "TeardownError",
            FlowError::ElementNotFound { .. } => "ElementNotFound",
            FlowError::WaitTimeout { .. } => "WaitTimeout",
            FlowError::Assertion(_) => "AssertionError",
            FlowError::Protocol { .. } => "ProtocolError",
            FlowError::Transport { .. } => "TransportError",
            FlowError::InvalidSuite(_) => "InvalidSuite",
        }
    }
}
