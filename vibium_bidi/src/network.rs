//! `network` module: request/response lifecycle events.
//!
//! The engine only observes these (for the trace recorder's network
//! stream); it does not issue network commands in this subsystem.
//!
//! [BiDi network](https://w3c.github.io/webdriver-bidi/#module-network)

use std::borrow::Cow;

use serde::Deserialize;
use vibium_types::{Event, Method};

use crate::browsing_context::BrowsingContext;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseParameters {
    pub context: Option<BrowsingContext>,
    pub request: RequestData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestData {
    pub request: String,
    pub url: String,
    pub method: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeforeRequestSent {
    #[serde(flatten)]
    pub base: BaseParameters,
}

impl Method for BeforeRequestSent {
    fn identifier(&self) -> Cow<'static, str> {
        "network.beforeRequestSent".into()
    }
}
impl Event for BeforeRequestSent {}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseCompleted {
    #[serde(flatten)]
    pub base: BaseParameters,
    pub status: u16,
}

impl Method for ResponseCompleted {
    fn identifier(&self) -> Cow<'static, str> {
        "network.responseCompleted".into()
    }
}
impl Event for ResponseCompleted {}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchError {
    #[serde(flatten)]
    pub base: BaseParameters,
    pub error_text: String,
}

impl Method for FetchError {
    fn identifier(&self) -> Cow<'static, str> {
        "network.fetchError".into()
    }
}
impl Event for FetchError {}

/// Benign races a network-interception handler should swallow rather
/// than propagate, because the request has already moved past the
/// interceptable state by the time the engine acts on it.
pub fn is_benign_race(message: &str) -> bool {
    const BENIGN: &[&str] = &["no such request", "invalid state", "no such network data"];
    let lower = message.to_ascii_lowercase();
    BENIGN.iter().any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_benign_races() {
        assert!(is_benign_race("No such request: abc"));
        assert!(is_benign_race("Invalid state for this operation"));
        assert!(!is_benign_race("disconnected"));
    }
}
