//! End-to-end scenarios driven against a scripted BiDi fixture server
//! instead of a live Chromium process, so they run with no network
//! access beyond the loopback socket the fixture binds.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_tungstenite::tungstenite::Message as WsMessage;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use vibium::config::VibiumConfig;
use vibium::handlers::navigate::{self, WaitUntil};
use vibium::handlers::{interact, query};
use vibium::locator::{SelectorSpec, SemanticCriteria};
use vibium::session::SessionState;
use vibium::trace::{TraceHandle, TraceOptions};
use vibium::transport::Transport;
use vibium_bidi::browsing_context::BrowsingContext;

/// A request the fixture received, kept around for assertions about
/// call order and content.
#[derive(Debug, Clone)]
struct LoggedCall {
    method: String,
    params: Value,
}

type CallLog = Arc<Mutex<Vec<LoggedCall>>>;

/// Wraps a plain JSON value as the `RemoteValue` shape
/// (`script.evaluate`/`script.callFunction` results nest the real
/// payload one level deeper than the JSON-RPC envelope).
fn remote_value(value: Value) -> Value {
    json!({ "type": "object", "value": value, "handle": Value::Null })
}

/// The `result` payload for a successful `script.evaluate`/
/// `script.callFunction` reply: an `EvaluateResult::Success` wrapping a
/// `RemoteValue` that carries `value`.
fn evaluate_success(value: Value) -> Value {
    json!({ "type": "success", "result": remote_value(value) })
}

fn candidate(handle: &str, tag: &str, text: &str) -> Value {
    json!({
        "el": { "handle": handle },
        "tag": tag,
        "text": text,
        "box_": { "x": 0.0, "y": 0.0, "w": 40.0, "h": 20.0 },
    })
}

fn check_report(visible: bool) -> Value {
    json!({
        "visible": visible,
        "enabled": true,
        "editable": false,
        "receives_events": true,
        "box_": { "x": 0.0, "y": 0.0, "w": 40.0, "h": 20.0 },
        "tag": "button",
        "text": "Btn",
    })
}

/// Starts a scripted BiDi server on loopback and returns the websocket
/// URL to connect to, a handle to the log of every request it saw, and
/// a sender for pushing unsolicited events onto the wire.
///
/// `handler` is invoked once per request with `(method, params, calls
/// already seen for that method)` and returns the `result` payload for
/// the reply envelope.
async fn spawn_fixture<F>(handler: F) -> (String, CallLog, mpsc::UnboundedSender<Value>)
where
    F: Fn(&str, &Value, usize) -> Value + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Value>();

    let returned_log = log.clone();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = async_tungstenite::tokio::accept_async(stream).await.unwrap();
        let (sink, mut incoming) = ws.split();
        let sink = Arc::new(tokio::sync::Mutex::new(sink));

        let event_sink = sink.clone();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                let mut guard = event_sink.lock().await;
                if guard.send(WsMessage::Text(event.to_string())).await.is_err() {
                    break;
                }
            }
        });

        let mut counts: HashMap<String, usize> = HashMap::new();
        while let Some(Ok(WsMessage::Text(text))) = incoming.next().await {
            let req: Value = serde_json::from_str(&text).unwrap();
            let id = req["id"].clone();
            let method = req["method"].as_str().unwrap_or_default().to_string();
            let params = req["params"].clone();

            log.lock().unwrap().push(LoggedCall { method: method.clone(), params: params.clone() });
            let seen = counts.entry(method.clone()).or_insert(0);
            let result = handler(&method, &params, *seen);
            *seen += 1;

            let reply = json!({ "id": id, "type": "success", "result": result });
            let mut guard = sink.lock().await;
            if guard.send(WsMessage::Text(reply.to_string())).await.is_err() {
                break;
            }
        }
    });

    (format!("ws://{addr}"), returned_log, event_tx)
}

async fn session_with<F>(handler: F) -> (SessionState, CallLog, mpsc::UnboundedSender<Value>)
where
    F: Fn(&str, &Value, usize) -> Value + Send + 'static,
{
    let (url, log, events) = spawn_fixture(handler).await;
    let transport = Transport::connect(url).await.unwrap();
    let mut session = SessionState::new(transport, VibiumConfig::default());
    session.record_context(BrowsingContext::new("ctx-1"), None, "about:blank".to_string());
    (session, log, events)
}

/// S1: navigating a context and then finding an element reports the
/// text actually rendered by the fixture, proving navigate and find
/// go through the same context and round-trip correctly.
#[tokio::test]
async fn navigate_then_find_reports_element_text() {
    let (mut session, _log, _events) = session_with(|method, _params, _seen| match method {
        "browsingContext.navigate" => json!({ "navigation": null, "url": "https://example.com/" }),
        "script.evaluate" => evaluate_success(json!([candidate("obj-1", "h1", "Example Domain")])),
        other => panic!("unexpected call to {other}"),
    })
    .await;

    let result = navigate::navigate(&mut session, None, "https://example.com/", WaitUntil::Load)
        .await
        .unwrap();
    assert_eq!(result.url, "https://example.com/");

    let spec = SelectorSpec::css("h1");
    let found = query::find(&mut session, None, &spec, Duration::from_millis(500))
        .await
        .unwrap()
        .expect("h1 should be found");
    assert_eq!(found.tag, "h1");
    assert_eq!(found.text, "Example Domain");
}

/// S2: `fill` replaces via a single DOM assignment and never dispatches
/// a pointer/keyboard action; `type` always clicks first, then appends
/// via a keyboard sequence. The two handlers must stay distinguishable
/// at the wire level even though both end in a changed input value.
#[tokio::test]
async fn fill_replaces_without_input_actions_while_type_clicks_and_sends_keys() {
    let (mut session, log, _events) = session_with(|method, params, _seen| match method {
        "script.evaluate" => evaluate_success(json!([candidate("obj-1", "input", "")])),
        "script.callFunction" => {
            let decl = params["functionDeclaration"].as_str().unwrap_or_default();
            if decl.contains("scrollIntoView") {
                evaluate_success(json!(true))
            } else if decl.contains("getComputedStyle") {
                evaluate_success(check_report(true))
            } else {
                evaluate_success(json!(true))
            }
        }
        "input.performActions" => json!({}),
        other => panic!("unexpected call to {other}"),
    })
    .await;

    let spec = SelectorSpec::css("input#name");
    interact::fill(&mut session, None, &spec, "Ada", Duration::from_millis(500))
        .await
        .unwrap();

    let calls = log.lock().unwrap().clone();
    assert!(
        calls.iter().all(|c| c.method != "input.performActions"),
        "fill must not dispatch a pointer/keyboard action"
    );
    log.lock().unwrap().clear();

    interact::type_text(&mut session, None, &spec, "Ada", Duration::from_millis(500))
        .await
        .unwrap();
    let calls = log.lock().unwrap().clone();
    let pointer_or_key_actions = calls.iter().filter(|c| c.method == "input.performActions").count();
    assert_eq!(pointer_or_key_actions, 2, "type clicks to focus, then sends a key sequence");
}

/// S3: when actionability never settles, the operation fails only once
/// the deadline elapses, not immediately and not long after.
#[tokio::test]
async fn actionability_wait_fails_at_the_deadline_not_before_or_long_after() {
    let (mut session, _log, _events) = session_with(|method, params, _seen| match method {
        "script.evaluate" => evaluate_success(json!([candidate("obj-1", "button", "Go")])),
        "script.callFunction" => {
            let decl = params["functionDeclaration"].as_str().unwrap_or_default();
            if decl.contains("scrollIntoView") {
                evaluate_success(json!(true))
            } else {
                // Always reports not-visible, so the wait can never settle.
                evaluate_success(check_report(false))
            }
        }
        other => panic!("unexpected call to {other}"),
    })
    .await;

    let spec = SelectorSpec::css("button#go");
    let timeout = Duration::from_millis(250);
    let started = Instant::now();
    let err = interact::click(&mut session, None, &spec, timeout).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(elapsed >= timeout, "must not fail before the deadline");
    assert!(elapsed < timeout * 4, "must not overshoot the deadline by more than a poll or two");
    match err {
        vibium::error::EngineError::Actionability(not_actionable) => {
            assert_eq!(not_actionable.check, vibium::error::ActionabilityCheck::Visible);
        }
        other => panic!("expected a NotActionable error, got {other:?}"),
    }
}

/// S4: among several semantic matches, the one whose accessible text is
/// the shortest wins, since `text` was supplied as a tie-break
/// criterion. Covers the same invariant as the `locator` unit tests,
/// exercised here through the wire instead of in-process.
#[tokio::test]
async fn semantic_tie_break_prefers_shortest_matching_text() {
    let (mut session, _log, _events) = session_with(|method, _params, _seen| match method {
        "script.evaluate" => evaluate_success(json!([
            candidate("obj-long", "button", "Submit the form now"),
            candidate("obj-short", "button", "Submit"),
        ])),
        other => panic!("unexpected call to {other}"),
    })
    .await;

    let spec = SelectorSpec::semantic(SemanticCriteria {
        text: Some("submit".to_string()),
        ..Default::default()
    })
    .unwrap();
    let found = query::find(&mut session, None, &spec, Duration::from_millis(500))
        .await
        .unwrap()
        .expect("a match should be found");
    assert_eq!(found.text, "Submit");
}

/// S5: two concurrent handler calls on the same session, serialized by
/// a caller-held lock the way the router holds one per session, never
/// interleave their wire traffic — each handler's whole round-trip
/// sequence completes before the next one's starts.
#[tokio::test]
async fn concurrent_handlers_on_one_session_never_interleave_on_the_wire() {
    let (session, log, _events) = session_with(|method, params, _seen| match method {
        "script.evaluate" => {
            let expr = params["expression"].as_str().unwrap_or_default();
            if expr.contains("#a") {
                evaluate_success(json!([candidate("obj-a", "button", "A")]))
            } else {
                evaluate_success(json!([candidate("obj-b", "button", "B")]))
            }
        }
        "script.callFunction" => {
            let decl = params["functionDeclaration"].as_str().unwrap_or_default();
            if decl.contains("scrollIntoView") {
                evaluate_success(json!(true))
            } else {
                evaluate_success(check_report(true))
            }
        }
        "input.performActions" => json!({}),
        other => panic!("unexpected call to {other}"),
    })
    .await;

    let session = Arc::new(tokio::sync::Mutex::new(session));
    let spec_a = SelectorSpec::css("#a");
    let spec_b = SelectorSpec::css("#b");

    let session_a = session.clone();
    let task_a = tokio::spawn(async move {
        let mut guard = session_a.lock().await;
        interact::click(&mut guard, None, &spec_a, Duration::from_millis(2000)).await
    });
    let session_b = session.clone();
    let task_b = tokio::spawn(async move {
        let mut guard = session_b.lock().await;
        interact::click(&mut guard, None, &spec_b, Duration::from_millis(2000)).await
    });

    let (result_a, result_b) = tokio::join!(task_a, task_b);
    result_a.unwrap().unwrap();
    result_b.unwrap().unwrap();

    let calls = log.lock().unwrap().clone();
    let labels: Vec<char> = calls
        .iter()
        .filter_map(|c| {
            let haystack = format!("{} {}", c.params, c.method);
            if haystack.contains("#a") || haystack.contains("obj-a") {
                Some('a')
            } else if haystack.contains("#b") || haystack.contains("obj-b") {
                Some('b')
            } else {
                None
            }
        })
        .collect();

    assert!(!labels.is_empty(), "the fixture should have seen at least one labeled call per task");
    let mut runs = 1;
    for window in labels.windows(2) {
        if window[0] != window[1] {
            runs += 1;
        }
    }
    assert_eq!(runs, 2, "calls from the two handlers must not interleave: {labels:?}");
}

/// S6: a trace recorder captures both action markers and BiDi events
/// pushed during its recording window, and still produces a well-formed
/// archive after it is stopped.
#[tokio::test]
async fn trace_round_trip_captures_actions_and_events() {
    let (session, _log, events) = session_with(|method, _params, _seen| match method {
        other => panic!("unexpected call to {other}"),
    })
    .await;

    let context = BrowsingContext::new("ctx-1");
    let options = TraceOptions { screenshots: false, snapshots: false, bidi: true };
    let handle = TraceHandle::start(session.transport.clone(), context, options).await.unwrap();

    let id = handle.record_action("click", &json!({ "selector": "#go" }));
    handle.record_action_end(id);

    events
        .send(json!({
            "method": "log.entryAdded",
            "params": { "level": "info", "text": "hello from the page", "timestamp": 1_700_000_000_000u64 },
        }))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let archive = handle.stop().await.unwrap();
    assert!(!archive.is_empty());

    let mut zip = zip::ZipArchive::new(std::io::Cursor::new(archive)).unwrap();
    let mut trace_text = String::new();
    {
        use std::io::Read;
        let mut file = zip.by_name("0-trace.trace").unwrap();
        file.read_to_string(&mut trace_text).unwrap();
    }
    let lines: Vec<&str> = trace_text.lines().collect();
    assert!(lines.iter().any(|l| l.contains("\"type\":\"before\"") && l.contains("click")));
    assert!(lines.iter().any(|l| l.contains("\"type\":\"after\"")));
    assert!(lines.iter().any(|l| l.contains("hello from the page")));
}
