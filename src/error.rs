//! Error taxonomy for the engine, per layer: transport, protocol,
//! locator, actionability, and the fatal `BrowserGone` state. One
//! `thiserror`-derived enum per layer, composed with `#[from]` so each
//! layer can propagate through `?` without manual wrapping.

use std::io;

use async_tungstenite::tungstenite;
use thiserror::Error;

use vibium_types::BidiError;

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    Ws(#[from] tungstenite::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to decode message: {0}")]
    MessageParseFailure(#[from] serde_json::Error),
    #[error("failed to write to connection: {0}")]
    WriteFailure(String),
    #[error("connection closed unexpectedly")]
    ConnectionClosed,
    #[error("send after close")]
    SendAfterClose,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid request")]
    InvalidRequest,
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("parse error: {0}")]
    ParseError(String),
}

impl ProtocolError {
    /// JSON-RPC 2.0 error code for this variant.
    pub fn code(&self) -> i64 {
        match self {
            ProtocolError::ParseError(_) => -32700,
            ProtocolError::InvalidRequest => -32600,
            ProtocolError::MethodNotFound(_) => -32601,
            ProtocolError::InvalidParams(_) => -32602,
        }
    }
}

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("no element matched the selector within the timeout")]
    ElementNotFound,
    #[error("selector is invalid: {0}")]
    SelectorInvalid(String),
    #[error("scope element could not be resolved: {0}")]
    ScopeNotFound(String),
    #[error("the browsing context was destroyed while waiting")]
    StaleContext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionabilityCheck {
    Visible,
    Stable,
    ReceivesEvents,
    Enabled,
    Editable,
}

impl std::fmt::Display for ActionabilityCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionabilityCheck::Visible => "visible",
            ActionabilityCheck::Stable => "stable",
            ActionabilityCheck::ReceivesEvents => "receives_events",
            ActionabilityCheck::Enabled => "enabled",
            ActionabilityCheck::Editable => "editable",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Error)]
#[error("element did not become actionable: last failing check was `{check}` ({reason})")]
pub struct NotActionable {
    pub check: ActionabilityCheck,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Locator(#[from] LocatorError),
    #[error(transparent)]
    Actionability(#[from] NotActionable),
    #[error("browser error: {0}")]
    Browser(#[from] BidiError),
    #[error("the browser connection is gone; restart the session to continue")]
    BrowserGone,
    #[error("{0}")]
    Other(String),
}

impl From<tungstenite::Error> for EngineError {
    fn from(err: tungstenite::Error) -> Self {
        TransportError::from(err).into()
    }
}

impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        TransportError::from(err).into()
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::from(err).into()
    }
}

impl EngineError {
    pub fn msg(text: impl Into<String>) -> Self {
        EngineError::Other(text.into())
    }
}
