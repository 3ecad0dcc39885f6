//! Trace Recorder: a passive observer that produces a replayable,
//! human-inspectable archive of a recording window — action markers,
//! BiDi events, and (optionally) a screenshot/DOM-snapshot stream.
//!
//! Built on [`crate::job::PeriodicJob`] for the screenshot-loop timer,
//! and a passive Transport subscriber for the event fan-out that feeds
//! the main/network streams.

use std::collections::HashMap;
use std::io::{Cursor, Write as _};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use sha1::{Digest, Sha1};
use tokio::task::JoinHandle;

use vibium_bidi::browsing_context::{BrowsingContext, CaptureScreenshotParams};
use vibium_bidi::script::{EvaluateParams, EvaluateResult};
use vibium_bidi::BidiEvent;

use crate::error::{EngineError, Result};
use crate::job::PeriodicJob;
use crate::transport::{SubscriptionId, Transport};

const SCREENSHOT_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, Default)]
pub struct TraceOptions {
    pub screenshots: bool,
    pub snapshots: bool,
    pub bidi: bool,
}

struct Resource {
    bytes: Vec<u8>,
    extension: &'static str,
}

struct ChunkState {
    index: u64,
    trace: Vec<serde_json::Value>,
    network: Vec<serde_json::Value>,
    resources: HashMap<String, Resource>,
    last_screencast_sha1: Option<String>,
    next_correlation: u64,
}

impl ChunkState {
    fn new(index: u64) -> Self {
        Self {
            index,
            trace: Vec::new(),
            network: Vec::new(),
            resources: HashMap::new(),
            last_screencast_sha1: None,
            next_correlation: 0,
        }
    }

    fn push_trace(&mut self, record: serde_json::Value) -> usize {
        self.trace.push(record);
        self.trace.len() - 1
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_correlation;
        self.next_correlation = self.next_correlation.wrapping_add(1);
        id
    }

    fn store_resource(&mut self, bytes: Vec<u8>, extension: &'static str) -> String {
        let hash = hex_sha1(&bytes);
        self.resources.entry(hash.clone()).or_insert(Resource { bytes, extension });
        hash
    }
}

struct Inner {
    options: TraceOptions,
    chunk: ChunkState,
}

fn now_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0)
}

fn hex_sha1(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

/// A user-facing guard returned by [`start_group`]/[`TraceHandle::start_group`],
/// closing its `group`/`group-end` pair on drop so early returns and
/// panics still balance the span.
pub struct GroupGuard<'a> {
    handle: &'a TraceHandle,
    id: u64,
    closed: bool,
}

impl GroupGuard<'_> {
    pub fn stop(mut self) {
        self.handle.stop_group(self.id);
        self.closed = true;
    }
}

impl Drop for GroupGuard<'_> {
    fn drop(&mut self) {
        if !self.closed {
            self.handle.stop_group(self.id);
        }
    }
}

/// One recording window. Holds the chunked buffers, the content-addressed
/// resource map, and the handles for the passive subscriber and the
/// optional screenshot-loop task.
pub struct TraceHandle {
    inner: Arc<Mutex<Inner>>,
    transport: Transport,
    context: BrowsingContext,
    subscription: SubscriptionId,
    screenshot_task: Option<JoinHandle<()>>,
}

impl TraceHandle {
    /// Starts a new recording window on `context`'s event stream.
    pub async fn start(transport: Transport, context: BrowsingContext, options: TraceOptions) -> Result<Self> {
        let inner = Arc::new(Mutex::new(Inner { options, chunk: ChunkState::new(0) }));
        write_context_options(&inner, options);

        let (subscription, mut events) = transport.subscribe("").await?;
        let fan_out_inner = inner.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                record_event(&fan_out_inner, event);
            }
        });

        let screenshot_task = if options.screenshots {
            let shot_inner = inner.clone();
            let shot_transport = transport.clone();
            let shot_context = context.clone();
            Some(tokio::spawn(async move {
                let mut job = PeriodicJob::new(SCREENSHOT_INTERVAL);
                loop {
                    job.tick().await;
                    if capture_screenshot(&shot_transport, &shot_context, &shot_inner).await.is_err() {
                        break;
                    }
                }
            }))
        } else {
            None
        };

        Ok(Self { inner, transport, context, subscription, screenshot_task })
    }

    /// Finalizes the current chunk and starts a fresh one with new
    /// options, without tearing down the subscriber/screenshot loop.
    pub fn start_chunk(&self, options: TraceOptions) -> (Vec<u8>, Vec<u8>, HashMap<String, (Vec<u8>, &'static str)>) {
        let archive = self.snapshot_chunk();
        let mut guard = self.inner.lock().unwrap();
        let next_index = guard.chunk.index + 1;
        guard.options = options;
        guard.chunk = ChunkState::new(next_index);
        drop(guard);
        write_context_options(&self.inner, options);
        archive
    }

    pub fn record_action(&self, method: &str, params: &serde_json::Value) -> u64 {
        let mut guard = self.inner.lock().unwrap();
        let id = guard.chunk.next_id();
        let record = serde_json::json!({
            "ts": now_millis(),
            "type": "before",
            "callId": format!("action@{id}"),
            "method": method,
            "params": params,
        });
        guard.chunk.push_trace(record);
        id
    }

    pub fn record_action_end(&self, id: u64) {
        let mut guard = self.inner.lock().unwrap();
        let record = serde_json::json!({
            "ts": now_millis(),
            "type": "after",
            "callId": format!("action-end@{id}"),
        });
        guard.chunk.push_trace(record);
    }

    pub fn record_bidi_command(&self, method: &str, params: &serde_json::Value) -> Option<u64> {
        let mut guard = self.inner.lock().unwrap();
        if !guard.options.bidi {
            return None;
        }
        let id = guard.chunk.next_id();
        let record = serde_json::json!({
            "ts": now_millis(),
            "type": "before",
            "callId": format!("bidi@{id}"),
            "method": method,
            "params": params,
        });
        guard.chunk.push_trace(record);
        Some(id)
    }

    pub fn record_bidi_command_end(&self, id: u64) {
        let mut guard = self.inner.lock().unwrap();
        let record = serde_json::json!({
            "ts": now_millis(),
            "type": "after",
            "callId": format!("bidi-end@{id}"),
        });
        guard.chunk.push_trace(record);
    }

    /// Starts a user-defined nestable labeled span. The returned guard
    /// closes it with `stop_group`/drop.
    pub fn start_group(&self, name: &str) -> GroupGuard<'_> {
        let mut guard = self.inner.lock().unwrap();
        let id = guard.chunk.next_id();
        guard.chunk.push_trace(serde_json::json!({
            "ts": now_millis(),
            "type": "before",
            "callId": format!("group@{id}"),
            "name": name,
        }));
        drop(guard);
        GroupGuard { handle: self, id, closed: false }
    }

    fn stop_group(&self, id: u64) {
        let mut guard = self.inner.lock().unwrap();
        guard.chunk.push_trace(serde_json::json!({
            "ts": now_millis(),
            "type": "after",
            "callId": format!("group-end@{id}"),
        }));
    }

    /// Finalizes the recording: captures a final DOM snapshot if
    /// requested, unsubscribes, stops the screenshot loop, and returns
    /// the packaged archive bytes.
    pub async fn stop(self) -> Result<Vec<u8>> {
        if self.inner.lock().unwrap().options.snapshots {
            let _ = capture_snapshot(&self.transport, &self.context, &self.inner).await;
        }
        self.transport.unsubscribe(self.subscription);
        if let Some(task) = &self.screenshot_task {
            task.abort();
        }
        let (trace_bytes, network_bytes, resources) = self.snapshot_chunk();
        package_zip(self.inner.lock().unwrap().chunk.index, trace_bytes, network_bytes, resources)
    }

    fn snapshot_chunk(&self) -> (Vec<u8>, Vec<u8>, HashMap<String, (Vec<u8>, &'static str)>) {
        let guard = self.inner.lock().unwrap();
        let trace_bytes = ndjson(&guard.chunk.trace);
        let network_bytes = ndjson(&guard.chunk.network);
        let resources = guard
            .chunk
            .resources
            .iter()
            .map(|(sha1, res)| (sha1.clone(), (res.bytes.clone(), res.extension)))
            .collect();
        (trace_bytes, network_bytes, resources)
    }
}

fn ndjson(records: &[serde_json::Value]) -> Vec<u8> {
    let mut out = Vec::new();
    for record in records {
        if let Ok(line) = serde_json::to_string(record) {
            out.extend_from_slice(line.as_bytes());
            out.push(b'\n');
        }
    }
    out
}

fn write_context_options(inner: &Arc<Mutex<Inner>>, options: TraceOptions) {
    let mut guard = inner.lock().unwrap();
    guard.chunk.push_trace(serde_json::json!({
        "ts": now_millis(),
        "type": "context-options",
        "screenshots": options.screenshots,
        "snapshots": options.snapshots,
        "bidi": options.bidi,
    }));
}

fn record_event(inner: &Arc<Mutex<Inner>>, event: BidiEvent) {
    let mut guard = inner.lock().unwrap();
    let is_network = event.is_network();
    let payload = match serde_json::to_value(DebugEvent(&event)) {
        Ok(v) => v,
        Err(_) => return,
    };
    if is_network {
        guard.chunk.network.push(serde_json::json!({
            "ts": now_millis(),
            "type": "resource-snapshot",
            "event": payload,
        }));
    } else {
        guard.chunk.trace.push(serde_json::json!({
            "ts": now_millis(),
            "type": "event",
            "event": payload,
        }));
    }
}

/// `BidiEvent` carries no `Serialize` impl (it's a dispatch enum over
/// already-deserialized payloads); render it as its `Debug` text for
/// the trace file instead of re-deriving a serializer for every variant.
struct DebugEvent<'a>(&'a BidiEvent);

impl serde::Serialize for DebugEvent<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:?}", self.0))
    }
}

async fn capture_screenshot(transport: &Transport, context: &BrowsingContext, inner: &Arc<Mutex<Inner>>) -> Result<()> {
    let response = transport.send(CaptureScreenshotParams::new(context.clone())).await?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&response.result.data)
        .map_err(|err| EngineError::msg(format!("bad screenshot payload: {err}")))?;
    let hash = hex_sha1(&bytes);
    let mut guard = inner.lock().unwrap();
    if guard.chunk.last_screencast_sha1.as_deref() == Some(hash.as_str()) {
        return Ok(());
    }
    guard.chunk.last_screencast_sha1 = Some(hash.clone());
    guard.chunk.resources.entry(hash.clone()).or_insert(Resource { bytes, extension: "png" });
    guard.chunk.trace.push(serde_json::json!({
        "ts": now_millis(),
        "type": "screencast-frame",
        "sha1": hash,
    }));
    Ok(())
}

async fn capture_snapshot(transport: &Transport, context: &BrowsingContext, inner: &Arc<Mutex<Inner>>) -> Result<()> {
    let params = EvaluateParams::new("document.documentElement.outerHTML", context.clone(), false);
    let response = transport.send(params).await?;
    let html = match &response.result {
        EvaluateResult::Success { result } => result
            .value
            .clone()
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .unwrap_or_default(),
        EvaluateResult::Exception { exception_details } => return Err(EngineError::msg(exception_details.text.clone())),
    };
    let mut guard = inner.lock().unwrap();
    let hash = guard.chunk.store_resource(html.into_bytes(), "html");
    guard.chunk.trace.push(serde_json::json!({
        "ts": now_millis(),
        "type": "dom-snapshot",
        "sha1": hash,
    }));
    Ok(())
}

fn package_zip(
    index: u64,
    trace_bytes: Vec<u8>,
    network_bytes: Vec<u8>,
    resources: HashMap<String, (Vec<u8>, &'static str)>,
) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        writer
            .start_file(format!("{index}-trace.trace"), options)
            .map_err(|err| EngineError::msg(err.to_string()))?;
        writer.write_all(&trace_bytes).map_err(|err| EngineError::msg(err.to_string()))?;

        writer
            .start_file(format!("{index}-trace.network"), options)
            .map_err(|err| EngineError::msg(err.to_string()))?;
        writer.write_all(&network_bytes).map_err(|err| EngineError::msg(err.to_string()))?;

        for (sha1, (bytes, extension)) in resources {
            writer
                .start_file(format!("resources/{sha1}.{extension}"), options)
                .map_err(|err| EngineError::msg(err.to_string()))?;
            writer.write_all(&bytes).map_err(|err| EngineError::msg(err.to_string()))?;
        }

        writer.finish().map_err(|err| EngineError::msg(err.to_string()))?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bytes_hash_to_the_same_resource() {
        let a = hex_sha1(b"same content");
        let b = hex_sha1(b"same content");
        assert_eq!(a, b);
    }

    #[test]
    fn different_bytes_hash_differently() {
        assert_ne!(hex_sha1(b"frame-1"), hex_sha1(b"frame-2"));
    }

    #[test]
    fn ndjson_emits_one_line_per_record() {
        let records = vec![serde_json::json!({"a": 1}), serde_json::json!({"b": 2})];
        let bytes = ndjson(&records);
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
