//! Element Locator: resolves a [`SelectorSpec`] to one or more
//! [`ElementHandle`]s in a chosen browsing context, polling until a
//! match appears or the deadline elapses.
//!
//! Resolution is expressed as a single `script.callFunction` call with
//! `resultOwnership: root`, so a candidate's handle, box, tag and text
//! all come back in one round trip rather than a separate describe/
//! resolve step per candidate.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::time::sleep;

use vibium_bidi::browsing_context::BrowsingContext;
use vibium_bidi::script::{EvaluateParams, EvaluateResult, ResultOwnership, Target};

use crate::error::{EngineError, LocatorError, Result};
use crate::session::{ElementHandle, RefTable};
use crate::transport::Transport;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Criteria for the `semantic` selector strategy; compose as logical
/// AND. At least one must be set (enforced by [`SelectorSpec::semantic`]).
#[derive(Debug, Clone, Default)]
pub struct SemanticCriteria {
    pub role: Option<String>,
    pub text: Option<String>,
    pub label: Option<String>,
    pub placeholder: Option<String>,
    pub alt: Option<String>,
    pub title: Option<String>,
    pub testid: Option<String>,
    pub xpath: Option<String>,
    /// CSS pre-filter: candidates are drawn from this selector instead
    /// of `*`.
    pub selector: Option<String>,
    /// CSS scope: candidates are rooted under this selector's match.
    pub near: Option<String>,
    pub index: Option<usize>,
}

impl SemanticCriteria {
    fn is_empty(&self) -> bool {
        self.role.is_none()
            && self.text.is_none()
            && self.label.is_none()
            && self.placeholder.is_none()
            && self.alt.is_none()
            && self.title.is_none()
            && self.testid.is_none()
            && self.xpath.is_none()
            && self.selector.is_none()
    }
}

/// Tagged union of the two resolution strategies: a raw CSS selector
/// (optionally scoped to an ancestor) or a bag of semantic criteria.
#[derive(Debug, Clone)]
pub enum SelectorSpec {
    Css {
        value: String,
        scope: Option<String>,
    },
    Semantic {
        criteria: SemanticCriteria,
    },
}

impl SelectorSpec {
    pub fn css(value: impl Into<String>) -> Self {
        SelectorSpec::Css {
            value: value.into(),
            scope: None,
        }
    }

    pub fn css_scoped(value: impl Into<String>, scope: impl Into<String>) -> Self {
        SelectorSpec::Css {
            value: value.into(),
            scope: Some(scope.into()),
        }
    }

    pub fn semantic(criteria: SemanticCriteria) -> Result<Self> {
        if criteria.is_empty() {
            return Err(EngineError::Locator(LocatorError::SelectorInvalid(
                "semantic selector needs at least one criterion".to_string(),
            )));
        }
        Ok(SelectorSpec::Semantic { criteria })
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Cardinality {
    Single,
    All,
}

#[derive(Debug, Clone)]
pub struct LocateOptions {
    pub timeout: Duration,
    pub cardinality: Cardinality,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(30_000),
            cardinality: Cardinality::Single,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CandidateBox {
    x: f64,
    y: f64,
    w: f64,
    h: f64,
}

#[derive(Debug, Deserialize)]
struct CandidateWire {
    el: RemoteValueWire,
    tag: String,
    text: String,
    box_: CandidateBox,
}

#[derive(Debug, Deserialize)]
struct RemoteValueWire {
    #[serde(default)]
    handle: Option<String>,
}

/// Resolves `spec` to one or more handles in `context`, minting fresh
/// refs in `refs` for every match, polling every ~100 ms until
/// `options.timeout` elapses.
pub async fn locate(
    transport: &Transport,
    context: &BrowsingContext,
    refs: &mut RefTable,
    spec: &SelectorSpec,
    options: &LocateOptions,
) -> Result<Vec<(crate::session::RefId, ElementHandle)>> {
    let script = build_probe_script(spec)?;
    let deadline = Instant::now() + options.timeout;

    loop {
        let candidates = evaluate_candidates(transport, context, &script).await?;
        let selected = select_candidates(spec, candidates, options.cardinality);
        if !selected.is_empty() {
            let mut minted = Vec::with_capacity(selected.len());
            for candidate in selected {
                let Some(handle) = candidate.el.handle else {
                    continue;
                };
                let element = ElementHandle {
                    context: context.clone(),
                    remote_object_id: handle,
                    tag: candidate.tag,
                    label: candidate.text,
                    box_: (candidate.box_.x, candidate.box_.y, candidate.box_.w, candidate.box_.h),
                };
                let id = refs.mint(element.clone());
                minted.push((id, element));
            }
            if !minted.is_empty() {
                return Ok(minted);
            }
        }

        if Instant::now() >= deadline {
            return Err(EngineError::Locator(LocatorError::ElementNotFound));
        }
        sleep(POLL_INTERVAL).await;
    }
}

async fn evaluate_candidates(
    transport: &Transport,
    context: &BrowsingContext,
    script: &str,
) -> Result<Vec<CandidateWire>> {
    // `resultOwnership: root` keeps every node handle in the returned
    // candidate graph alive, so one evaluate gives us every match plus
    // the metadata needed to tie-break, in a single round trip.
    let evaluate = EvaluateParams {
        expression: script.to_string(),
        target: Target::context(context.clone()),
        await_promise: false,
        result_ownership: Some(ResultOwnership::Root),
    };
    let response = transport.send(evaluate).await?;
    match &response.result {
        EvaluateResult::Success { result } => {
            let value = result.value.clone().unwrap_or(serde_json::Value::Array(vec![]));
            serde_json::from_value(value)
                .map_err(|err| EngineError::msg(format!("could not decode candidates: {err}")))
        }
        EvaluateResult::Exception { exception_details } => Err(EngineError::Locator(
            LocatorError::SelectorInvalid(exception_details.text.clone()),
        )),
    }
}

fn select_candidates(
    spec: &SelectorSpec,
    mut candidates: Vec<CandidateWire>,
    cardinality: Cardinality,
) -> Vec<CandidateWire> {
    match cardinality {
        Cardinality::All => candidates,
        Cardinality::Single => {
            if candidates.is_empty() {
                return candidates;
            }
            let index = match spec {
                SelectorSpec::Semantic { criteria } => criteria.index,
                SelectorSpec::Css { .. } => None,
            };
            if let Some(index) = index {
                return candidates.into_iter().nth(index).into_iter().collect();
            }
            let prefers_text = matches!(
                spec,
                SelectorSpec::Semantic { criteria } if criteria.text.is_some()
            );
            if prefers_text && candidates.len() > 1 {
                candidates.sort_by_key(|c| c.text.len());
            }
            vec![candidates.remove(0)]
        }
    }
}

/// Builds the single injected script a poll attempt evaluates. Returns
/// the candidate array (with node handles owned by the caller) plus
/// enough metadata (`tag`, `text`, `box`) to tie-break and render
/// `find` results without a second round trip.
fn build_probe_script(spec: &SelectorSpec) -> Result<String> {
    let candidate_collector = r#"
        const __vibiumDescribe = (el) => ({
            el,
            tag: el.tagName ? el.tagName.toLowerCase() : '',
            text: (el.textContent || '').trim(),
            box_: (() => {
                const r = el.getBoundingClientRect();
                return { x: r.x, y: r.y, w: r.width, h: r.height };
            })(),
        });
    "#;

    match spec {
        SelectorSpec::Css { value, scope } => {
            let root_expr = match scope {
                Some(scope_selector) => format!(
                    "(() => {{ const s = document.querySelector({}); if (!s) throw new Error('scope not found'); return s; }})()",
                    serde_json::to_string(scope_selector).unwrap()
                ),
                None => "document".to_string(),
            };
            Ok(format!(
                "(() => {{ {collector} const root = {root}; return Array.prototype.slice.call(root.querySelectorAll({value})).map(__vibiumDescribe); }})()",
                collector = candidate_collector,
                root = root_expr,
                value = serde_json::to_string(value).unwrap(),
            ))
        }
        SelectorSpec::Semantic { criteria } => {
            let root_expr = match &criteria.near {
                Some(near) => format!(
                    "(() => {{ const s = document.querySelector({}); if (!s) throw new Error('scope not found'); return s; }})()",
                    serde_json::to_string(near).unwrap()
                ),
                None => "document".to_string(),
            };
            let pool_selector = criteria.selector.clone().unwrap_or_else(|| "*".to_string());
            let criteria_json = serde_json::json!({
                "role": criteria.role,
                "text": criteria.text,
                "label": criteria.label,
                "placeholder": criteria.placeholder,
                "alt": criteria.alt,
                "title": criteria.title,
                "testid": criteria.testid,
                "xpath": criteria.xpath,
            });
            Ok(format!(
                r#"(() => {{
                    {collector}
                    function vibiumAccessibleName(el) {{
                        const labelledby = el.getAttribute('aria-labelledby');
                        if (labelledby) {{
                            const joined = labelledby.split(/\s+/)
                                .map((id) => {{ const n = document.getElementById(id); return n ? n.textContent.trim() : ''; }})
                                .join(' ').trim();
                            if (joined) return joined;
                        }}
                        const ariaLabel = el.getAttribute('aria-label');
                        if (ariaLabel) return ariaLabel.trim();
                        if (el.labels && el.labels.length) {{
                            const t = Array.from(el.labels).map((l) => l.textContent.trim()).join(' ').trim();
                            if (t) return t;
                        }}
                        for (const attr of ['placeholder', 'alt', 'title']) {{
                            const v = el.getAttribute(attr);
                            if (v) return v.trim();
                        }}
                        return (el.textContent || '').trim();
                    }}
                    function vibiumRole(el) {{
                        const explicit = el.getAttribute('role');
                        if (explicit) return explicit;
                        const implicit = {{ button: 'button', a: 'link', input: 'textbox', textarea: 'textbox', select: 'combobox', img: 'img' }};
                        return implicit[el.tagName.toLowerCase()] || el.tagName.toLowerCase();
                    }}
                    const criteria = {criteria_json};
                    const root = {root};
                    const pool = criteria.xpath
                        ? (() => {{
                            const found = document.evaluate(criteria.xpath, root, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
                            const nodes = [];
                            for (let i = 0; i < found.snapshotLength; i++) nodes.push(found.snapshotItem(i));
                            return nodes;
                        }})()
                        : Array.prototype.slice.call(root.querySelectorAll({pool_selector}));
                    const name = (el) => vibiumAccessibleName(el).toLowerCase();
                    return pool.filter((el) => {{
                        if (criteria.role && vibiumRole(el) !== criteria.role) return false;
                        if (criteria.testid && el.getAttribute('data-testid') !== criteria.testid) return false;
                        if (criteria.text && !(el.textContent || '').toLowerCase().includes(criteria.text.toLowerCase())) return false;
                        if (criteria.label && !name(el).includes(criteria.label.toLowerCase())) return false;
                        if (criteria.placeholder && !(el.getAttribute('placeholder') || '').toLowerCase().includes(criteria.placeholder.toLowerCase())) return false;
                        if (criteria.alt && !(el.getAttribute('alt') || '').toLowerCase().includes(criteria.alt.toLowerCase())) return false;
                        if (criteria.title && !(el.getAttribute('title') || '').toLowerCase().includes(criteria.title.toLowerCase())) return false;
                        return true;
                    }}).map(__vibiumDescribe);
                }})()"#,
                collector = candidate_collector,
                criteria_json = criteria_json,
                root = root_expr,
                pool_selector = serde_json::to_string(&pool_selector).unwrap(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_semantic_criteria_is_rejected() {
        let err = SelectorSpec::semantic(SemanticCriteria::default()).unwrap_err();
        assert!(matches!(err, EngineError::Locator(LocatorError::SelectorInvalid(_))));
    }

    #[test]
    fn tie_break_prefers_shortest_text_when_text_was_a_criterion() {
        let spec = SelectorSpec::semantic(SemanticCriteria {
            role: Some("button".into()),
            text: Some("Submit".into()),
            ..Default::default()
        })
        .unwrap();
        let candidates = vec![
            CandidateWire {
                el: RemoteValueWire { handle: Some("outer".into()) },
                tag: "div".into(),
                text: "Outer Submit inside container".into(),
                box_: CandidateBox { x: 0.0, y: 0.0, w: 1.0, h: 1.0 },
            },
            CandidateWire {
                el: RemoteValueWire { handle: Some("inner".into()) },
                tag: "button".into(),
                text: "Submit".into(),
                box_: CandidateBox { x: 0.0, y: 0.0, w: 1.0, h: 1.0 },
            },
        ];
        let selected = select_candidates(&spec, candidates, Cardinality::Single);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].el.handle.as_deref(), Some("inner"));
    }

    #[test]
    fn without_text_criterion_document_order_wins() {
        let spec = SelectorSpec::css("button");
        let candidates = vec![
            CandidateWire {
                el: RemoteValueWire { handle: Some("first".into()) },
                tag: "button".into(),
                text: "A".into(),
                box_: CandidateBox { x: 0.0, y: 0.0, w: 1.0, h: 1.0 },
            },
            CandidateWire {
                el: RemoteValueWire { handle: Some("second".into()) },
                tag: "button".into(),
                text: "Longer label here".into(),
                box_: CandidateBox { x: 0.0, y: 0.0, w: 1.0, h: 1.0 },
            },
        ];
        let selected = select_candidates(&spec, candidates, Cardinality::Single);
        assert_eq!(selected[0].el.handle.as_deref(), Some("first"));
    }
}
