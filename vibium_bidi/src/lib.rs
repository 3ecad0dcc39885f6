//! Hand-written WebDriver BiDi domain types, one module per protocol
//! module (`browsingContext`, `script`, `input`, `network`, `storage`,
//! `log`, `session`).
//!
//! Unlike the Chrome DevTools Protocol this mirrors structurally, BiDi's
//! public surface is a handful of modules rather than several hundred
//! commands, so these types are authored directly rather than generated
//! from a machine-readable protocol description.

pub mod browsing_context;
pub mod input;
pub mod log;
pub mod network;
pub mod script;
pub mod session;
pub mod storage;

use vibium_types::JsonEventMessage;

/// A BiDi event dispatched to its concrete payload type by method name.
/// Mirrors the shape of a generated `CdpEvent` dispatch enum, but
/// written out for the much smaller BiDi event surface.
#[derive(Debug, Clone)]
pub enum BidiEvent {
    ContextCreated(browsing_context::ContextInfo),
    ContextDestroyed(browsing_context::ContextInfo),
    NavigationStarted(browsing_context::NavigationInfo),
    Load(browsing_context::LifecycleEvent),
    DomContentLoaded(browsing_context::LifecycleEvent),
    UserPromptOpened(browsing_context::UserPromptOpened),
    UserPromptClosed(browsing_context::UserPromptClosed),
    BeforeRequestSent(network::BeforeRequestSent),
    ResponseCompleted(network::ResponseCompleted),
    FetchError(network::FetchError),
    LogEntryAdded(log::EntryAdded),
    Other(JsonEventMessage),
}

impl BidiEvent {
    /// Classifies a raw event envelope by its dotted method name.
    pub fn from_json(raw: JsonEventMessage) -> Result<Self, serde_json::Error> {
        let parsed = match raw.method.as_ref() {
            "browsingContext.contextCreated" => {
                BidiEvent::ContextCreated(serde_json::from_value(raw.params.clone())?)
            }
            "browsingContext.contextDestroyed" => {
                BidiEvent::ContextDestroyed(serde_json::from_value(raw.params.clone())?)
            }
            "browsingContext.navigationStarted" => {
                BidiEvent::NavigationStarted(serde_json::from_value(raw.params.clone())?)
            }
            "browsingContext.load" => {
                BidiEvent::Load(serde_json::from_value(raw.params.clone())?)
            }
            "browsingContext.domContentLoaded" => {
                BidiEvent::DomContentLoaded(serde_json::from_value(raw.params.clone())?)
            }
            "browsingContext.userPromptOpened" => {
                BidiEvent::UserPromptOpened(serde_json::from_value(raw.params.clone())?)
            }
            "browsingContext.userPromptClosed" => {
                BidiEvent::UserPromptClosed(serde_json::from_value(raw.params.clone())?)
            }
            "network.beforeRequestSent" => {
                BidiEvent::BeforeRequestSent(serde_json::from_value(raw.params.clone())?)
            }
            "network.responseCompleted" => {
                BidiEvent::ResponseCompleted(serde_json::from_value(raw.params.clone())?)
            }
            "network.fetchError" => {
                BidiEvent::FetchError(serde_json::from_value(raw.params.clone())?)
            }
            "log.entryAdded" => BidiEvent::LogEntryAdded(serde_json::from_value(raw.params.clone())?),
            _ => BidiEvent::Other(raw),
        };
        Ok(parsed)
    }

    /// True for `network.*` events, which the trace recorder routes to
    /// the network stream instead of the main event stream.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            BidiEvent::BeforeRequestSent(_) | BidiEvent::ResponseCompleted(_) | BidiEvent::FetchError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn classifies_known_event() {
        let raw = JsonEventMessage {
            method: Cow::Borrowed("log.entryAdded"),
            params: serde_json::json!({"level": "info", "text": "hi", "timestamp": 1}),
        };
        let event = BidiEvent::from_json(raw).unwrap();
        assert!(matches!(event, BidiEvent::LogEntryAdded(_)));
    }

    #[test]
    fn unknown_event_falls_back_to_other() {
        let raw = JsonEventMessage {
            method: Cow::Borrowed("script.realmCreated"),
            params: serde_json::json!({}),
        };
        let event = BidiEvent::from_json(raw).unwrap();
        assert!(matches!(event, BidiEvent::Other(_)));
    }
}
