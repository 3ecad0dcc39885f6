//! Wire-level envelope types shared by the BiDi transport and every
//! domain crate built on top of it.
//!
//! Mirrors the shape of a WebDriver BiDi message: requests carry
//! `{id, method, params}`, replies carry
//! `{id, type: "success" | "error", result?, error?, message?}`, and
//! events carry `{method, params}` with no `id`. A [`Message`] is
//! classified structurally, exactly like the wire does: presence of
//! `id` means a reply, its absence means an event.

use std::borrow::Cow;
use std::fmt;
use std::ops::Deref;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Identifier assigned to an outgoing command. Monotonically increasing
/// per connection; never reused for the lifetime of the transport.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CallId(u64);

impl CallId {
    pub fn new(id: u64) -> Self {
        CallId(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallId({})", self.0)
    }
}

/// A command sent by the engine to the browser: `{id, method, params}`.
#[derive(Debug, Serialize, PartialEq)]
pub struct MethodCall {
    pub id: CallId,
    pub method: Cow<'static, str>,
    pub params: serde_json::Value,
}

/// Implemented by every command/event payload; splits the dotted BiDi
/// method name (`browsingContext.navigate`) into domain and member.
pub trait Method {
    /// The whole string identifier for this method, e.g.
    /// `browsingContext.navigate`.
    fn identifier(&self) -> Cow<'static, str>;

    /// The BiDi module this method belongs to, e.g. `browsingContext`.
    fn domain_name(&self) -> Cow<'static, str> {
        self.split().0
    }

    /// The member name within the module, e.g. `navigate`.
    fn method_name(&self) -> Cow<'static, str> {
        self.split().1
    }

    fn split(&self) -> (Cow<'static, str>, Cow<'static, str>) {
        match self.identifier() {
            Cow::Borrowed(id) => {
                let mut iter = id.splitn(2, '.');
                (
                    iter.next().unwrap_or_default().into(),
                    iter.next().unwrap_or_default().into(),
                )
            }
            Cow::Owned(id) => {
                let mut iter = id.splitn(2, '.');
                (
                    Cow::Owned(iter.next().unwrap_or_default().to_string()),
                    Cow::Owned(iter.next().unwrap_or_default().to_string()),
                )
            }
        }
    }
}

/// A request the engine can send over the BiDi transport and the
/// deserialized shape of its reply.
pub trait Command: Serialize + Method {
    type Response: DeserializeOwned + fmt::Debug;
}

/// A BiDi event payload. `method` carries the dotted event name (e.g.
/// `browsingContext.contextCreated`), `params` the raw event body.
pub trait Event: Method + DeserializeOwned {}

/// A successfully deserialized response to a [`Command`], still
/// carrying the id and method name it answers.
#[derive(Debug)]
pub struct CommandResponse<T>
where
    T: fmt::Debug,
{
    pub id: CallId,
    pub result: T,
    pub method: Cow<'static, str>,
}

impl<T: fmt::Debug> Deref for CommandResponse<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.result
    }
}

/// Discriminates a [`Response`] envelope's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Success,
    Error,
}

/// A reply to a [`MethodCall`], `{id, type, result?, error?, message?}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub id: CallId,
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A generic untyped event message, used when the concrete [`Event`]
/// type for a subscription is not known ahead of time.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonEventMessage {
    pub method: Cow<'static, str>,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl Method for JsonEventMessage {
    fn identifier(&self) -> Cow<'static, str> {
        self.method.clone()
    }
}

impl Event for JsonEventMessage {}

/// A single frame on the BiDi connection: either a reply to a command
/// we issued, or an unsolicited event. Classified structurally by the
/// presence of `id`, matching the wire rather than an explicit tag.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Message<T = JsonEventMessage> {
    Response(Response),
    Event(T),
}

/// The error the browser returned for a failed command:
/// `{type: "error", error: "<code>", message: "<text>"}`.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("{error}: {message}")]
pub struct BidiError {
    pub error: String,
    pub message: String,
}

impl Response {
    /// Turns this reply into a typed [`CommandResponse`], or the
    /// browser's [`BidiError`] if `type` was `"error"`.
    pub fn into_command_response<T: DeserializeOwned + fmt::Debug>(
        self,
        method: Cow<'static, str>,
    ) -> Result<CommandResponse<T>, BidiError> {
        match self.kind {
            ResponseKind::Success => {
                let value = self.result.unwrap_or(serde_json::Value::Null);
                let result = serde_json::from_value(value).map_err(|err| BidiError {
                    error: "decode".to_string(),
                    message: err.to_string(),
                })?;
                Ok(CommandResponse {
                    id: self.id,
                    result,
                    method,
                })
            }
            ResponseKind::Error => Err(BidiError {
                error: self.error.unwrap_or_else(|| "unknown error".to_string()),
                message: self.message.unwrap_or_default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Navigate;
    impl Method for Navigate {
        fn identifier(&self) -> Cow<'static, str> {
            "browsingContext.navigate".into()
        }
    }

    #[test]
    fn splits_domain_and_method() {
        let n = Navigate;
        assert_eq!(n.domain_name(), "browsingContext");
        assert_eq!(n.method_name(), "navigate");
    }

    #[test]
    fn message_classifies_by_id_presence() {
        let reply: Message = serde_json::from_str(
            r#"{"id":1,"type":"success","result":{"ok":true}}"#,
        )
        .unwrap();
        assert!(matches!(reply, Message::Response(_)));

        let event: Message = serde_json::from_str(
            r#"{"method":"browsingContext.contextCreated","params":{}}"#,
        )
        .unwrap();
        assert!(matches!(event, Message::Event(_)));
    }

    #[test]
    fn error_response_surfaces_browser_message() {
        let resp = Response {
            id: CallId::new(1),
            kind: ResponseKind::Error,
            result: None,
            error: Some("no such node".to_string()),
            message: Some("node not found".to_string()),
        };
        let err = resp
            .into_command_response::<serde_json::Value>("x".into())
            .unwrap_err();
        assert_eq!(err.error, "no such node");
    }
}
