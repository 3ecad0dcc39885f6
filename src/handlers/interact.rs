//! Interaction handlers: click, fill, type, hover, check/uncheck,
//! selectOption, dragTo, tap. Each composes the locator, the
//! actionability checker, and a low-level BiDi action.

use vibium_bidi::input::{key_press, key_sequence, pointer_click_at, pointer_dblclick_at, pointer_drag, pointer_move_to};
use vibium_bidi::script::{CallFunctionParams, EvaluateResult, LocalValue, RemoteReference};

use crate::actionability::{wait_for_actionable, ActionabilityResult, CheckSet};
use crate::error::{EngineError, Result};
use crate::locator::{locate, Cardinality, LocateOptions, SelectorSpec};
use crate::session::{ElementHandle, SessionState};

use super::resolve_context;

async fn locate_one(
    session: &mut SessionState,
    context: Option<&str>,
    spec: &SelectorSpec,
    timeout: std::time::Duration,
) -> Result<ElementHandle> {
    let context = resolve_context(session, context)?;
    let options = LocateOptions { timeout, cardinality: Cardinality::Single };
    let mut matches = locate(&session.transport, &context, &mut session.refs, spec, &options).await?;
    Ok(matches.remove(0).1)
}

fn center(result: &ActionabilityResult) -> (f64, f64) {
    let (x, y, w, h) = result.box_;
    (x + w / 2.0, y + h / 2.0)
}

/// Reads an element's current bounding box, used by the screenshot
/// handler to derive a clip rectangle for an element target.
pub(crate) async fn element_box(session: &SessionState, element: &ElementHandle) -> Result<(f64, f64, f64, f64)> {
    let script = r#"(el) => { const r = el.getBoundingClientRect(); return [r.x, r.y, r.width, r.height]; }"#;
    let params = CallFunctionParams::new(
        script,
        element.context.clone(),
        vec![LocalValue::RemoteReference(RemoteReference { handle: element.remote_object_id.clone() })],
        false,
    );
    let response = session.transport.send(params).await?;
    match &response.result {
        EvaluateResult::Success { result } => {
            let value = result.value.clone().unwrap_or(serde_json::Value::Null);
            let quad: (f64, f64, f64, f64) =
                serde_json::from_value(value).map_err(|err| EngineError::msg(err.to_string()))?;
            Ok(quad)
        }
        EvaluateResult::Exception { exception_details } => Err(EngineError::msg(exception_details.text.clone())),
    }
}

async fn call_bool(session: &SessionState, element: &ElementHandle, function_declaration: &str) -> Result<bool> {
    let params = CallFunctionParams::new(
        function_declaration,
        element.context.clone(),
        vec![LocalValue::RemoteReference(RemoteReference {
            handle: element.remote_object_id.clone(),
        })],
        false,
    );
    let response = session.transport.send(params).await?;
    match &response.result {
        EvaluateResult::Success { result } => {
            let value = result.value.clone().unwrap_or(serde_json::Value::Bool(false));
            serde_json::from_value(value).map_err(|err| EngineError::msg(err.to_string()))
        }
        EvaluateResult::Exception { exception_details } => Err(EngineError::msg(exception_details.text.clone())),
    }
}

pub async fn click(session: &mut SessionState, context: Option<&str>, spec: &SelectorSpec, timeout: std::time::Duration) -> Result<()> {
    let element = locate_one(session, context, spec, timeout).await?;
    let result = wait_for_actionable(&session.transport, &element.context, &element.remote_object_id, CheckSet::click(), timeout).await?;
    let (cx, cy) = center(&result);
    session.transport.send(pointer_click_at(element.context.clone(), cx, cy)).await?;
    Ok(())
}

pub async fn dblclick(session: &mut SessionState, context: Option<&str>, spec: &SelectorSpec, timeout: std::time::Duration) -> Result<()> {
    let element = locate_one(session, context, spec, timeout).await?;
    let result = wait_for_actionable(&session.transport, &element.context, &element.remote_object_id, CheckSet::click(), timeout).await?;
    let (cx, cy) = center(&result);
    session.transport.send(pointer_dblclick_at(element.context.clone(), cx, cy)).await?;
    Ok(())
}

pub async fn hover(session: &mut SessionState, context: Option<&str>, spec: &SelectorSpec, timeout: std::time::Duration) -> Result<()> {
    let element = locate_one(session, context, spec, timeout).await?;
    let result = wait_for_actionable(&session.transport, &element.context, &element.remote_object_id, CheckSet::hover_or_drag(), timeout).await?;
    let (cx, cy) = center(&result);
    session.transport.send(pointer_move_to(element.context.clone(), cx, cy)).await?;
    Ok(())
}

/// Assigns `value` via DOM assignment and synthesizes `input`+`change`.
/// Does not simulate keystrokes (that's `type`).
pub async fn fill(session: &mut SessionState, context: Option<&str>, spec: &SelectorSpec, value: &str, timeout: std::time::Duration) -> Result<()> {
    let element = locate_one(session, context, spec, timeout).await?;
    wait_for_actionable(&session.transport, &element.context, &element.remote_object_id, CheckSet::fill_or_clear(), timeout).await?;
    let script = r#"(el, value) => {
        el.focus();
        const proto = el.tagName === 'TEXTAREA' ? window.HTMLTextAreaElement.prototype : window.HTMLInputElement.prototype;
        const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
        setter.call(el, value);
        el.dispatchEvent(new Event('input', { bubbles: true }));
        el.dispatchEvent(new Event('change', { bubbles: true }));
        return true;
    }"#;
    let params = CallFunctionParams::new(
        script,
        element.context.clone(),
        vec![
            LocalValue::RemoteReference(RemoteReference { handle: element.remote_object_id.clone() }),
            LocalValue::String(value.to_string()),
        ],
        false,
    );
    session.transport.send(params).await?;
    Ok(())
}

pub async fn clear(session: &mut SessionState, context: Option<&str>, spec: &SelectorSpec, timeout: std::time::Duration) -> Result<()> {
    fill(session, context, spec, "", timeout).await
}

/// Clicks to focus, then dispatches a keyboard sequence. Appends to
/// whatever value is already present (unlike `fill`, which replaces).
pub async fn type_text(session: &mut SessionState, context: Option<&str>, spec: &SelectorSpec, text: &str, timeout: std::time::Duration) -> Result<()> {
    let element = locate_one(session, context, spec, timeout).await?;
    let result = wait_for_actionable(&session.transport, &element.context, &element.remote_object_id, CheckSet::type_or_press(), timeout).await?;
    let (cx, cy) = center(&result);
    session.transport.send(pointer_click_at(element.context.clone(), cx, cy)).await?;
    session.transport.send(key_sequence(element.context.clone(), text)).await?;
    Ok(())
}

/// Clicks to focus, then dispatches a single key rather than a typed
/// sequence (unlike `type`, which simulates printable characters).
pub async fn press(session: &mut SessionState, context: Option<&str>, spec: &SelectorSpec, key: &str, timeout: std::time::Duration) -> Result<()> {
    let element = locate_one(session, context, spec, timeout).await?;
    let result = wait_for_actionable(&session.transport, &element.context, &element.remote_object_id, CheckSet::type_or_press(), timeout).await?;
    let (cx, cy) = center(&result);
    session.transport.send(pointer_click_at(element.context.clone(), cx, cy)).await?;
    session.transport.send(key_press(element.context.clone(), key)).await?;
    Ok(())
}

/// Idempotent: if the checkbox already matches `target`, returns
/// without dispatching a pointer action.
async fn set_checked(session: &mut SessionState, context: Option<&str>, spec: &SelectorSpec, target: bool, timeout: std::time::Duration) -> Result<()> {
    let element = locate_one(session, context, spec, timeout).await?;
    let current = call_bool(session, &element, "(el) => !!el.checked").await?;
    if current == target {
        return Ok(());
    }
    let result = wait_for_actionable(&session.transport, &element.context, &element.remote_object_id, CheckSet::click(), timeout).await?;
    let (cx, cy) = center(&result);
    session.transport.send(pointer_click_at(element.context.clone(), cx, cy)).await?;
    Ok(())
}

pub async fn check(session: &mut SessionState, context: Option<&str>, spec: &SelectorSpec, timeout: std::time::Duration) -> Result<()> {
    set_checked(session, context, spec, true, timeout).await
}

pub async fn uncheck(session: &mut SessionState, context: Option<&str>, spec: &SelectorSpec, timeout: std::time::Duration) -> Result<()> {
    set_checked(session, context, spec, false, timeout).await
}

pub async fn select_option(session: &mut SessionState, context: Option<&str>, spec: &SelectorSpec, value: &str, timeout: std::time::Duration) -> Result<()> {
    let element = locate_one(session, context, spec, timeout).await?;
    wait_for_actionable(&session.transport, &element.context, &element.remote_object_id, CheckSet::select_option(), timeout).await?;
    let script = r#"(el, value) => {
        el.value = value;
        el.dispatchEvent(new Event('change', { bubbles: true }));
        return true;
    }"#;
    let params = CallFunctionParams::new(
        script,
        element.context.clone(),
        vec![
            LocalValue::RemoteReference(RemoteReference { handle: element.remote_object_id.clone() }),
            LocalValue::String(value.to_string()),
        ],
        false,
    );
    session.transport.send(params).await?;
    Ok(())
}

pub async fn drag_to(
    session: &mut SessionState,
    context: Option<&str>,
    source: &SelectorSpec,
    target: &SelectorSpec,
    timeout: std::time::Duration,
) -> Result<()> {
    let source_el = locate_one(session, context, source, timeout).await?;
    let source_box = wait_for_actionable(&session.transport, &source_el.context, &source_el.remote_object_id, CheckSet::hover_or_drag(), timeout).await?;
    let target_el = locate_one(session, context, target, timeout).await?;
    let target_box = wait_for_actionable(&session.transport, &target_el.context, &target_el.remote_object_id, CheckSet::hover_or_drag(), timeout).await?;
    session
        .transport
        .send(pointer_drag(source_el.context.clone(), center(&source_box), center(&target_box)))
        .await?;
    Ok(())
}

pub async fn tap(session: &mut SessionState, context: Option<&str>, spec: &SelectorSpec, timeout: std::time::Duration) -> Result<()> {
    click(session, context, spec, timeout).await
}
