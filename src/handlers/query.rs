//! `find`/`findAll` handlers: drive the Locator and render refs back
//! to the client with their descriptive fields.

use crate::error::{EngineError, LocatorError, Result};
use crate::locator::{locate, Cardinality, LocateOptions, SelectorSpec};
use crate::session::SessionState;

use super::resolve_context;

#[derive(Debug, Clone)]
pub struct FoundElement {
    pub ref_id: String,
    pub tag: String,
    pub text: String,
    pub box_: (f64, f64, f64, f64),
}

/// Unlike the other handlers, `find` reports "no match" as `None`
/// rather than an error — only `findAll`'s and the interaction
/// handlers' timeouts are failures.
pub async fn find(
    session: &mut SessionState,
    context: Option<&str>,
    spec: &SelectorSpec,
    timeout: std::time::Duration,
) -> Result<Option<FoundElement>> {
    match find_all_with_cardinality(session, context, spec, timeout, Cardinality::Single).await {
        Ok(mut found) => Ok(if found.is_empty() { None } else { Some(found.remove(0)) }),
        Err(EngineError::Locator(LocatorError::ElementNotFound)) => Ok(None),
        Err(err) => Err(err),
    }
}

pub async fn find_all(
    session: &mut SessionState,
    context: Option<&str>,
    spec: &SelectorSpec,
    timeout: std::time::Duration,
) -> Result<Vec<FoundElement>> {
    match find_all_with_cardinality(session, context, spec, timeout, Cardinality::All).await {
        Ok(found) => Ok(found),
        Err(EngineError::Locator(LocatorError::ElementNotFound)) => Ok(Vec::new()),
        Err(err) => Err(err),
    }
}

async fn find_all_with_cardinality(
    session: &mut SessionState,
    context: Option<&str>,
    spec: &SelectorSpec,
    timeout: std::time::Duration,
    cardinality: Cardinality,
) -> Result<Vec<FoundElement>> {
    let context = resolve_context(session, context)?;
    let options = LocateOptions { timeout, cardinality };
    let matches = locate(&session.transport, &context, &mut session.refs, spec, &options).await?;
    Ok(matches
        .into_iter()
        .map(|(id, handle)| FoundElement { ref_id: id.to_string(), tag: handle.tag, text: handle.label, box_: handle.box_ })
        .collect())
}
