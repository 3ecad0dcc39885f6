//! `session` module: capability negotiation for the BiDi connection
//! itself and event subscription management.
//!
//! [BiDi session](https://w3c.github.io/webdriver-bidi/#module-session)

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use vibium_types::{Command, Method};

use crate::browsing_context::BrowsingContext;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewParams {
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    #[serde(rename = "alwaysMatch", skip_serializing_if = "Option::is_none")]
    pub always_match: Option<serde_json::Value>,
}

impl Method for NewParams {
    fn identifier(&self) -> Cow<'static, str> {
        "session.new".into()
    }
}

impl Command for NewParams {
    type Response = NewResult;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewResult {
    pub session_id: String,
    pub capabilities: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeParams {
    pub events: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contexts: Option<Vec<BrowsingContext>>,
}

impl SubscribeParams {
    pub fn new(events: Vec<String>) -> Self {
        Self {
            events,
            contexts: None,
        }
    }
}

impl Method for SubscribeParams {
    fn identifier(&self) -> Cow<'static, str> {
        "session.subscribe".into()
    }
}

impl Command for SubscribeParams {
    type Response = serde_json::Value;
}

/// Default subscriptions set up at session start: context tree,
/// network, console log and user-prompt events.
pub fn default_subscriptions() -> SubscribeParams {
    SubscribeParams::new(vec![
        "browsingContext".to_string(),
        "network".to_string(),
        "log".to_string(),
    ])
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EndParams {}

impl Method for EndParams {
    fn identifier(&self) -> Cow<'static, str> {
        "session.end".into()
    }
}

impl Command for EndParams {
    type Response = serde_json::Value;
}
