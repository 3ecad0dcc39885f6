//! Actionability Checker: decides whether an element is ready for an
//! operation, re-checking over time. One injected script evaluates all
//! instantaneous checks per poll; stability needs a real-time gap and
//! is therefore judged host-side.
//!
//! Built on [`crate::job::PeriodicJob`] for the poll/retry shape, with
//! deadline-bounded waiting for the overall check set to settle.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::time::sleep;

use vibium_bidi::browsing_context::BrowsingContext;
use vibium_bidi::script::{CallFunctionParams, EvaluateResult, LocalValue, RemoteReference};

use crate::error::{ActionabilityCheck, EngineError, NotActionable, Result};
use crate::transport::Transport;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STABILITY_GAP: Duration = Duration::from_millis(50);

/// Which checks a given operation requires before it may run.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckSet {
    pub visible: bool,
    pub stable: bool,
    pub receives_events: bool,
    pub enabled: bool,
    pub editable: bool,
}

impl CheckSet {
    pub const fn click() -> Self {
        Self { visible: true, stable: true, receives_events: true, enabled: true, editable: false }
    }

    pub const fn hover_or_drag() -> Self {
        Self { visible: true, stable: true, receives_events: true, enabled: false, editable: false }
    }

    pub const fn fill_or_clear() -> Self {
        Self { visible: true, stable: false, receives_events: false, enabled: true, editable: true }
    }

    pub const fn select_option() -> Self {
        Self { visible: true, stable: false, receives_events: false, enabled: true, editable: false }
    }

    pub const fn scroll_into_view() -> Self {
        Self { visible: false, stable: true, receives_events: false, enabled: false, editable: false }
    }

    pub const fn type_or_press() -> Self {
        Self::click()
    }
}

#[derive(Debug, Deserialize)]
struct CheckReport {
    visible: bool,
    enabled: bool,
    editable: bool,
    receives_events: bool,
    box_: BoxReport,
    tag: String,
    text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
struct BoxReport {
    x: f64,
    y: f64,
    w: f64,
    h: f64,
}

/// Result of a successful wait: the element's description at the
/// moment every required check passed.
#[derive(Debug, Clone)]
pub struct ActionabilityResult {
    pub tag: String,
    pub text: String,
    pub box_: (f64, f64, f64, f64),
}

/// Waits for `handle` to satisfy every check in `checks`, scrolling it
/// into view first. Returns as soon as all selected checks pass in the
/// same attempt; otherwise fails with [`NotActionable`] naming the
/// last failing check once `deadline` elapses.
pub async fn wait_for_actionable(
    transport: &Transport,
    context: &BrowsingContext,
    remote_object_id: &str,
    checks: CheckSet,
    timeout: Duration,
) -> Result<ActionabilityResult> {
    let deadline = Instant::now() + timeout;
    scroll_into_view(transport, context, remote_object_id).await?;

    let mut last_failure = (ActionabilityCheck::Visible, "never evaluated".to_string());

    loop {
        let report = evaluate_checks(transport, context, remote_object_id).await?;
        match first_failing(&report, checks) {
            Some(failure) => last_failure = failure,
            None => {
                if !checks.stable {
                    return Ok(to_result(report));
                }
                let first_box = report.box_;
                sleep(STABILITY_GAP).await;
                let second = evaluate_checks(transport, context, remote_object_id).await?;
                if second.box_ == first_box && first_failing(&second, checks).is_none() {
                    return Ok(to_result(second));
                }
                last_failure = (ActionabilityCheck::Stable, "bounding box moved between reads".to_string());
            }
        }

        if Instant::now() >= deadline {
            return Err(EngineError::Actionability(NotActionable {
                check: last_failure.0,
                reason: last_failure.1,
            }));
        }
        sleep(POLL_INTERVAL).await;
    }
}

fn to_result(report: CheckReport) -> ActionabilityResult {
    ActionabilityResult {
        tag: report.tag,
        text: report.text,
        box_: (report.box_.x, report.box_.y, report.box_.w, report.box_.h),
    }
}

fn first_failing(report: &CheckReport, checks: CheckSet) -> Option<(ActionabilityCheck, String)> {
    if checks.visible && !report.visible {
        return Some((ActionabilityCheck::Visible, "element has zero size or is hidden".to_string()));
    }
    if checks.enabled && !report.enabled {
        return Some((ActionabilityCheck::Enabled, "element is disabled".to_string()));
    }
    if checks.editable && !report.editable {
        return Some((ActionabilityCheck::Editable, "element is read-only or not editable".to_string()));
    }
    if checks.receives_events && !report.receives_events {
        return Some((
            ActionabilityCheck::ReceivesEvents,
            "another element intercepts pointer events at the target point".to_string(),
        ));
    }
    None
}

async fn scroll_into_view(transport: &Transport, context: &BrowsingContext, remote_object_id: &str) -> Result<()> {
    let script = r#"(el) => { el.scrollIntoView({ block: 'center', inline: 'center' }); return true; }"#;
    call_with_element::<bool>(transport, context, remote_object_id, script).await?;
    Ok(())
}

async fn evaluate_checks(
    transport: &Transport,
    context: &BrowsingContext,
    remote_object_id: &str,
) -> Result<CheckReport> {
    let script = r#"(el) => {
        const style = window.getComputedStyle(el);
        const rect = el.getBoundingClientRect();
        const visible = rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none';

        let enabled = !el.disabled && el.getAttribute('aria-disabled') !== 'true';
        const fieldset = el.closest('fieldset[disabled]');
        if (fieldset && el.closest('legend') == null) enabled = false;

        const tag = el.tagName.toLowerCase();
        const editableTag = tag === 'textarea'
            || (tag === 'input' && ['text', 'search', 'email', 'url', 'tel', 'password', 'number'].includes((el.type || 'text').toLowerCase()))
            || el.isContentEditable;
        const editable = editableTag && !el.readOnly && el.getAttribute('aria-readonly') !== 'true';

        const cx = rect.x + rect.width / 2;
        const cy = rect.y + rect.height / 2;
        const atPoint = document.elementFromPoint(cx, cy);
        const receivesEvents = atPoint === el || (atPoint != null && el.contains(atPoint));

        return {
            visible, enabled, editable,
            receives_events: receivesEvents,
            box_: { x: rect.x, y: rect.y, w: rect.width, h: rect.height },
            tag,
            text: (el.textContent || '').trim(),
        };
    }"#;
    call_with_element(transport, context, remote_object_id, script).await
}

async fn call_with_element<T: for<'de> Deserialize<'de>>(
    transport: &Transport,
    context: &BrowsingContext,
    remote_object_id: &str,
    function_declaration: &str,
) -> Result<T> {
    let params = CallFunctionParams::new(
        function_declaration,
        context.clone(),
        vec![LocalValue::RemoteReference(RemoteReference {
            handle: remote_object_id.to_string(),
        })],
        false,
    );
    let response = transport.send(params).await?;
    match &response.result {
        EvaluateResult::Success { result } => {
            let value = result.value.clone().unwrap_or(serde_json::Value::Null);
            serde_json::from_value(value).map_err(|err| EngineError::msg(format!("bad actionability report: {err}")))
        }
        EvaluateResult::Exception { exception_details } => {
            Err(EngineError::msg(exception_details.text.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_requires_visible_stable_events_enabled_not_editable() {
        let checks = CheckSet::click();
        assert!(checks.visible && checks.stable && checks.receives_events && checks.enabled);
        assert!(!checks.editable);
    }

    #[test]
    fn fill_requires_editable_but_not_stability_or_events() {
        let checks = CheckSet::fill_or_clear();
        assert!(checks.visible && checks.enabled && checks.editable);
        assert!(!checks.stable && !checks.receives_events);
    }

    #[test]
    fn first_failing_reports_visible_before_other_checks() {
        let report = CheckReport {
            visible: false,
            enabled: false,
            editable: false,
            receives_events: false,
            box_: BoxReport { x: 0.0, y: 0.0, w: 0.0, h: 0.0 },
            tag: "button".into(),
            text: String::new(),
        };
        let (check, _) = first_failing(&report, CheckSet::click()).unwrap();
        assert_eq!(check, ActionabilityCheck::Visible);
    }
}
