//! Router / Dispatcher: the JSON-RPC 2.0 surface. One [`Router`] is
//! shared (behind an `Arc`) by every transport (stdio, socket) that
//! talks to this daemon; it owns the per-session exclusive lock the
//! handler set relies on for ordering guarantees like "focus before
//! type".
//!
//! A single actor correlates and dispatches by method name, the same
//! shape as BiDi command correlation generalized to JSON-RPC request
//! routing: parse, look up by name, reply.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex};
use tracing::instrument;

use crate::config::VibiumConfig;
use crate::error::{EngineError, ProtocolError, Result};
use crate::handlers::navigate::WaitUntil;
use crate::handlers::screenshot::ScreenshotTarget;
use crate::handlers::{cookies, dialog, evaluate, interact, navigate, query};
use crate::locator::{SelectorSpec, SemanticCriteria};
use crate::supervisor::Supervisor;

const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Capacity of the server-push notification channel. A slow reader
/// drops the oldest unconsumed notifications rather than block a
/// handler on a stuck client.
const NOTIFICATION_CAPACITY: usize = 64;

/// A selector as it arrives over the wire: either `{css, scope?}` or a
/// bag of semantic criteria. Converts into the internal [`SelectorSpec`].
#[derive(Debug, Default, Deserialize)]
struct SelectorWire {
    css: Option<String>,
    scope: Option<String>,
    role: Option<String>,
    text: Option<String>,
    label: Option<String>,
    placeholder: Option<String>,
    alt: Option<String>,
    title: Option<String>,
    testid: Option<String>,
    xpath: Option<String>,
    selector: Option<String>,
    near: Option<String>,
    index: Option<usize>,
}

impl SelectorWire {
    fn into_spec(self) -> Result<SelectorSpec> {
        if let Some(css) = self.css {
            return Ok(match self.scope {
                Some(scope) => SelectorSpec::css_scoped(css, scope),
                None => SelectorSpec::css(css),
            });
        }
        SelectorSpec::semantic(SemanticCriteria {
            role: self.role,
            text: self.text,
            label: self.label,
            placeholder: self.placeholder,
            alt: self.alt,
            title: self.title,
            testid: self.testid,
            xpath: self.xpath,
            selector: self.selector,
            near: self.near,
            index: self.index,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SelectorArgs {
    selector: SelectorWire,
    #[serde(default)]
    context: Option<String>,
    #[serde(rename = "timeoutMs")]
    timeout_ms: Option<u64>,
}

fn timeout_of(ms: Option<u64>, config: &VibiumConfig) -> Duration {
    ms.map(Duration::from_millis).unwrap_or(config.default_timeout)
}

/// Names and minimal JSON Schemas for the tools this daemon exposes,
/// returned verbatim by `tools/list`.
fn tool_catalogue() -> Vec<Value> {
    let selector_schema = json!({
        "type": "object",
        "properties": {
            "selector": {"type": "object"},
            "context": {"type": "string"},
            "timeoutMs": {"type": "integer"}
        },
        "required": ["selector"]
    });
    let with_value = {
        let mut schema = selector_schema.clone();
        schema["properties"]["value"] = json!({"type": "string"});
        schema["required"] = json!(["selector", "value"]);
        schema
    };
    vec![
        json!({"name": "navigate", "description": "Navigate the page to a URL.", "inputSchema": {
            "type": "object",
            "properties": {"url": {"type": "string"}, "context": {"type": "string"}, "waitUntil": {"type": "string", "enum": ["load", "domContentLoaded", "none"]}},
            "required": ["url"]
        }}),
        json!({"name": "click", "description": "Click an element.", "inputSchema": selector_schema}),
        json!({"name": "dblclick", "description": "Double-click an element.", "inputSchema": selector_schema}),
        json!({"name": "hover", "description": "Hover over an element.", "inputSchema": selector_schema}),
        json!({"name": "tap", "description": "Tap an element.", "inputSchema": selector_schema}),
        json!({"name": "fill", "description": "Set an input's value via DOM assignment.", "inputSchema": with_value}),
        json!({"name": "clear", "description": "Clear an input's value.", "inputSchema": selector_schema}),
        json!({"name": "type", "description": "Click to focus, then type a keyboard sequence.", "inputSchema": with_value}),
        json!({"name": "press", "description": "Click to focus, then dispatch a single key.", "inputSchema": with_value}),
        json!({"name": "check", "description": "Check a checkbox, idempotently.", "inputSchema": selector_schema}),
        json!({"name": "uncheck", "description": "Uncheck a checkbox, idempotently.", "inputSchema": selector_schema}),
        json!({"name": "selectOption", "description": "Set a <select>'s value.", "inputSchema": with_value}),
        json!({"name": "dragTo", "description": "Drag one element onto another.", "inputSchema": {
            "type": "object",
            "properties": {"source": {"type": "object"}, "target": {"type": "object"}, "context": {"type": "string"}, "timeoutMs": {"type": "integer"}},
            "required": ["source", "target"]
        }}),
        json!({"name": "find", "description": "Find the first matching element.", "inputSchema": selector_schema}),
        json!({"name": "findAll", "description": "Find every matching element.", "inputSchema": selector_schema}),
        json!({"name": "evaluate", "description": "Evaluate JavaScript in the page.", "inputSchema": {
            "type": "object",
            "properties": {"expr": {"type": "string"}, "await": {"type": "boolean"}, "context": {"type": "string"}},
            "required": ["expr"]
        }}),
        json!({"name": "screenshot", "description": "Capture a screenshot.", "inputSchema": {
            "type": "object",
            "properties": {"fullPage": {"type": "boolean"}, "clip": {"type": "object"}, "selector": {"type": "object"}, "context": {"type": "string"}}
        }}),
        json!({"name": "cookies.get", "description": "Read cookies.", "inputSchema": {"type": "object", "properties": {"name": {"type": "string"}}}}),
        json!({"name": "cookies.set", "description": "Set a cookie.", "inputSchema": {"type": "object", "properties": {"name": {"type": "string"}, "value": {"type": "string"}, "domain": {"type": "string"}}, "required": ["name", "value", "domain"]}}),
        json!({"name": "cookies.clear", "description": "Delete cookies.", "inputSchema": {"type": "object", "properties": {"name": {"type": "string"}}}}),
        json!({"name": "dialog.accept", "description": "Accept the open dialog.", "inputSchema": {"type": "object", "properties": {"text": {"type": "string"}, "context": {"type": "string"}}}}),
        json!({"name": "dialog.dismiss", "description": "Dismiss the open dialog.", "inputSchema": {"type": "object", "properties": {"context": {"type": "string"}}}}),
    ]
}

/// Routes JSON-RPC requests to the handler set, serializing access to
/// the shared [`Supervisor`]/`SessionState`.
pub struct Router {
    supervisor: Arc<Mutex<Supervisor>>,
    start_time: Instant,
    pid: u32,
    socket_path: String,
    shutting_down: AtomicBool,
    shutdown_notify: tokio::sync::Notify,
    notify: broadcast::Sender<String>,
}

impl Router {
    pub fn new(supervisor: Arc<Mutex<Supervisor>>, socket_path: String) -> Self {
        let (notify, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            supervisor,
            start_time: Instant::now(),
            pid: std::process::id(),
            socket_path,
            shutting_down: AtomicBool::new(false),
            shutdown_notify: tokio::sync::Notify::new(),
            notify,
        }
    }

    /// Subscribes to server-initiated notifications (e.g. `dialog.onOpen`),
    /// one receiver per connected client.
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<String> {
        self.notify.subscribe()
    }

    /// Pushes an unsolicited JSON-RPC notification to every connected
    /// client. A no-op if nobody is currently subscribed.
    pub fn push_notification(&self, method: &str, params: Value) {
        let line = serde_json::to_string(&json!({"jsonrpc": "2.0", "method": method, "params": params})).unwrap_or_default();
        let _ = self.notify.send(line);
    }

    pub fn supervisor(&self) -> Arc<Mutex<Supervisor>> {
        self.supervisor.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Resolves once `daemon/shutdown` has been handled, for listeners
    /// to use as the other arm of a `select!` around `accept()`.
    pub async fn shutdown_requested(&self) {
        self.shutdown_notify.notified().await;
    }

    /// Handles one framing unit (one line of JSON). Returns `None` for
    /// notifications (no `id`), which are accepted but not answered.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let raw: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => return Some(error_envelope(Value::Null, ProtocolError::ParseError(line.to_string()).code(), "parse error")),
        };
        let id = raw.get("id").cloned();
        let is_notification = raw.get("id").is_none();

        if raw.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let response = error_envelope(id.unwrap_or(Value::Null), ProtocolError::InvalidRequest.code(), "invalid request");
            return if is_notification { None } else { Some(response) };
        }
        let method = match raw.get("method").and_then(Value::as_str) {
            Some(m) => m.to_string(),
            None => {
                let response = error_envelope(id.unwrap_or(Value::Null), ProtocolError::InvalidRequest.code(), "missing method");
                return if is_notification { None } else { Some(response) };
            }
        };
        let params = raw.get("params").cloned().unwrap_or(Value::Null);

        let response = self.dispatch(&method, params, id.clone()).await;
        if is_notification {
            None
        } else {
            Some(response)
        }
    }

    #[instrument(skip(self, params, id), fields(method = %method))]
    async fn dispatch(&self, method: &str, params: Value, id: Option<Value>) -> String {
        let id = id.unwrap_or(Value::Null);
        match method {
            "initialize" => success_envelope(id, json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "vibium-engine", "version": ENGINE_VERSION},
            })),
            "tools/list" => success_envelope(id, json!({"tools": tool_catalogue()})),
            "daemon/status" => success_envelope(id, json!({
                "version": ENGINE_VERSION,
                "pid": self.pid,
                "uptime": self.start_time.elapsed().as_secs(),
                "socket": self.socket_path,
                "startTime": self.start_time.elapsed().as_secs(),
            })),
            "daemon/shutdown" => {
                self.shutting_down.store(true, Ordering::SeqCst);
                let response = success_envelope(id, json!({"status": "shutting down"}));
                self.shutdown_notify.notify_waiters();
                response
            }
            "tools/call" => self.dispatch_tool_call(params, id).await,
            _ => error_envelope(id, ProtocolError::MethodNotFound(method.to_string()).code(), "method not found"),
        }
    }

    async fn dispatch_tool_call(&self, params: Value, id: Value) -> String {
        let name = match params.get("name").and_then(Value::as_str) {
            Some(n) => n.to_string(),
            None => return error_envelope(id, ProtocolError::InvalidParams("missing tool name".to_string()).code(), "invalid params"),
        };
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        let mut supervisor = self.supervisor.lock().await;
        supervisor.session.touch();
        let result = call_tool(&mut supervisor, &name, arguments).await;
        drop(supervisor);

        match result {
            Ok(value) => success_envelope(id, tool_content(value)),
            Err(err) => success_envelope(id, json!({
                "isError": true,
                "content": [{"type": "text", "text": err.to_string()}],
            })),
        }
    }
}

fn found_element_json(el: &query::FoundElement) -> Value {
    let (x, y, width, height) = el.box_;
    json!({
        "ref": el.ref_id,
        "tag": el.tag,
        "text": el.text,
        "box": {"x": x, "y": y, "width": width, "height": height},
    })
}

fn tool_content(value: Value) -> Value {
    match &value {
        Value::String(text) => json!({"content": [{"type": "text", "text": text}]}),
        _ => json!({"content": [{"type": "text", "text": value.to_string()}]}),
    }
}

fn success_envelope(id: Value, result: Value) -> String {
    serde_json::to_string(&json!({"jsonrpc": "2.0", "id": id, "result": result})).unwrap_or_default()
}

fn error_envelope(id: Value, code: i64, message: &str) -> String {
    serde_json::to_string(&json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})).unwrap_or_default()
}

async fn call_tool(supervisor: &mut Supervisor, name: &str, arguments: Value) -> Result<Value> {
    let action_id = supervisor.session.trace.as_ref().map(|trace| trace.record_action(name, &arguments));
    let result = call_tool_inner(supervisor, name, arguments).await;
    if let Some(id) = action_id {
        if let Some(trace) = supervisor.session.trace.as_ref() {
            trace.record_action_end(id);
        }
    }
    result
}

async fn call_tool_inner(supervisor: &mut Supervisor, name: &str, arguments: Value) -> Result<Value> {
    let config = supervisor.session.config.clone();
    let session = &mut supervisor.session;

    macro_rules! args {
        ($ty:ty) => {
            serde_json::from_value::<$ty>(arguments.clone())
                .map_err(|err| EngineError::msg(format!("invalid arguments for {name}: {err}")))?
        };
    }

    match name {
        "navigate" => {
            #[derive(Deserialize)]
            struct Args {
                url: String,
                context: Option<String>,
                #[serde(rename = "waitUntil", default)]
                wait_until: Option<String>,
            }
            let a: Args = args!(Args);
            let wait = match a.wait_until.as_deref() {
                Some("domContentLoaded") => WaitUntil::DomContentLoaded,
                Some("none") => WaitUntil::None,
                _ => WaitUntil::Load,
            };
            let result = navigate::navigate(session, a.context.as_deref(), &a.url, wait).await?;
            Ok(json!({"url": result.url, "navigation": result.navigation}))
        }
        "click" | "dblclick" | "hover" | "tap" | "check" | "uncheck" | "clear" => {
            let a: SelectorArgs = args!(SelectorArgs);
            let spec = a.selector.into_spec()?;
            let timeout = timeout_of(a.timeout_ms, &config);
            match name {
                "click" => interact::click(session, a.context.as_deref(), &spec, timeout).await?,
                "dblclick" => interact::dblclick(session, a.context.as_deref(), &spec, timeout).await?,
                "hover" => interact::hover(session, a.context.as_deref(), &spec, timeout).await?,
                "tap" => interact::tap(session, a.context.as_deref(), &spec, timeout).await?,
                "check" => interact::check(session, a.context.as_deref(), &spec, timeout).await?,
                "uncheck" => interact::uncheck(session, a.context.as_deref(), &spec, timeout).await?,
                "clear" => interact::clear(session, a.context.as_deref(), &spec, timeout).await?,
                _ => unreachable!(),
            }
            Ok(json!({"ok": true}))
        }
        "fill" | "type" | "press" | "selectOption" => {
            #[derive(Deserialize)]
            struct Args {
                selector: SelectorWire,
                value: String,
                context: Option<String>,
                #[serde(rename = "timeoutMs")]
                timeout_ms: Option<u64>,
            }
            let a: Args = args!(Args);
            let spec = a.selector.into_spec()?;
            let timeout = timeout_of(a.timeout_ms, &config);
            match name {
                "fill" => interact::fill(session, a.context.as_deref(), &spec, &a.value, timeout).await?,
                "type" => interact::type_text(session, a.context.as_deref(), &spec, &a.value, timeout).await?,
                "press" => interact::press(session, a.context.as_deref(), &spec, &a.value, timeout).await?,
                "selectOption" => interact::select_option(session, a.context.as_deref(), &spec, &a.value, timeout).await?,
                _ => unreachable!(),
            }
            Ok(json!({"ok": true}))
        }
        "dragTo" => {
            #[derive(Deserialize)]
            struct Args {
                source: SelectorWire,
                target: SelectorWire,
                context: Option<String>,
                #[serde(rename = "timeoutMs")]
                timeout_ms: Option<u64>,
            }
            let a: Args = args!(Args);
            let source = a.source.into_spec()?;
            let target = a.target.into_spec()?;
            let timeout = timeout_of(a.timeout_ms, &config);
            interact::drag_to(session, a.context.as_deref(), &source, &target, timeout).await?;
            Ok(json!({"ok": true}))
        }
        "find" => {
            let a: SelectorArgs = args!(SelectorArgs);
            let spec = a.selector.into_spec()?;
            let timeout = timeout_of(a.timeout_ms, &config);
            let found = query::find(session, a.context.as_deref(), &spec, timeout).await?;
            Ok(match found {
                Some(el) => found_element_json(&el),
                None => Value::Null,
            })
        }
        "findAll" => {
            let a: SelectorArgs = args!(SelectorArgs);
            let spec = a.selector.into_spec()?;
            let timeout = timeout_of(a.timeout_ms, &config);
            let found = query::find_all(session, a.context.as_deref(), &spec, timeout).await?;
            let elements: Vec<Value> = found.iter().map(found_element_json).collect();
            Ok(json!(elements))
        }
        "evaluate" => {
            #[derive(Deserialize)]
            struct Args {
                expr: String,
                #[serde(default)]
                r#await: bool,
                context: Option<String>,
            }
            let a: Args = args!(Args);
            evaluate::evaluate(session, a.context.as_deref(), &a.expr, a.r#await).await
        }
        "screenshot" => {
            #[derive(Deserialize)]
            struct ClipWire {
                x: f64,
                y: f64,
                width: f64,
                height: f64,
            }
            #[derive(Deserialize)]
            struct Args {
                #[serde(default, rename = "fullPage")]
                full_page: bool,
                clip: Option<ClipWire>,
                selector: Option<SelectorWire>,
                context: Option<String>,
                #[serde(rename = "timeoutMs")]
                timeout_ms: Option<u64>,
            }
            let a: Args = args!(Args);
            let timeout = timeout_of(a.timeout_ms, &config);
            let spec = a.selector.map(|s| s.into_spec()).transpose()?;
            let target = if let Some(spec) = &spec {
                ScreenshotTarget::Element(spec)
            } else if let Some(clip) = a.clip {
                ScreenshotTarget::Clip(vibium_bidi::browsing_context::ClipRectangle {
                    x: clip.x,
                    y: clip.y,
                    width: clip.width,
                    height: clip.height,
                })
            } else if a.full_page {
                ScreenshotTarget::FullPage
            } else {
                ScreenshotTarget::Viewport
            };
            let data = crate::handlers::screenshot::capture(session, a.context.as_deref(), target, timeout).await?;
            Ok(json!({"data": data, "mimeType": "image/png"}))
        }
        "cookies.get" => {
            #[derive(Deserialize)]
            struct Args {
                name: Option<String>,
            }
            let a: Args = args!(Args);
            let cookies = cookies::get(session, a.name.as_deref()).await?;
            Ok(json!(cookies))
        }
        "cookies.set" => {
            #[derive(Deserialize)]
            struct Args {
                name: String,
                value: String,
                domain: String,
                path: Option<String>,
            }
            let a: Args = args!(Args);
            cookies::set(session, vibium_bidi::storage::PartialCookie {
                name: a.name,
                value: a.value,
                domain: a.domain,
                path: a.path,
                http_only: None,
                secure: None,
                same_site: None,
                expiry: None,
            }).await?;
            Ok(json!({"ok": true}))
        }
        "cookies.clear" => {
            #[derive(Deserialize)]
            struct Args {
                name: Option<String>,
            }
            let a: Args = args!(Args);
            cookies::clear(session, a.name.as_deref()).await?;
            Ok(json!({"ok": true}))
        }
        "dialog.accept" => {
            #[derive(Deserialize)]
            struct Args {
                text: Option<String>,
                context: Option<String>,
            }
            let a: Args = args!(Args);
            dialog::accept(session, a.context.as_deref(), a.text).await?;
            Ok(json!({"ok": true}))
        }
        "dialog.dismiss" => {
            #[derive(Deserialize)]
            struct Args {
                context: Option<String>,
            }
            let a: Args = args!(Args);
            dialog::dismiss(session, a.context.as_deref()).await?;
            Ok(json!({"ok": true}))
        }
        other => Err(EngineError::msg(format!("unknown tool: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_wire_with_css_builds_a_css_spec() {
        let wire = SelectorWire { css: Some("button.primary".to_string()), ..Default::default() };
        let spec = wire.into_spec().unwrap();
        assert!(matches!(spec, SelectorSpec::Css { .. }));
    }

    #[test]
    fn selector_wire_without_css_builds_a_semantic_spec() {
        let wire = SelectorWire { role: Some("button".to_string()), ..Default::default() };
        let spec = wire.into_spec().unwrap();
        assert!(matches!(spec, SelectorSpec::Semantic { .. }));
    }

    #[test]
    fn tool_catalogue_includes_every_handler() {
        let names: Vec<String> = tool_catalogue()
            .iter()
            .map(|t| t.get("name").and_then(Value::as_str).unwrap().to_string())
            .collect();
        for expected in ["navigate", "click", "fill", "find", "evaluate", "screenshot", "cookies.get"] {
            assert!(names.contains(&expected.to_string()), "missing tool {expected}");
        }
    }
}
