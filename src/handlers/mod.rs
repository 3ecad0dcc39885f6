//! Handler Set: one async function per public operation. Each handler
//! composes the Locator, the Actionability Checker and low-level BiDi
//! calls; this is where domain logic lives.
//!
//! One function per operation, expressed as free functions over a
//! `&mut SessionState` rather than methods on a shared handle, since
//! the router already serializes access via its per-session lock (no
//! need for interior mutability here).

pub mod cookies;
pub mod dialog;
pub mod evaluate;
pub mod interact;
pub mod navigate;
pub mod query;
pub mod screenshot;

use vibium_bidi::browsing_context::BrowsingContext;

use crate::error::{EngineError, LocatorError, Result};
use crate::session::SessionState;

/// Resolves the context a handler should act on: the explicit id when
/// given, otherwise the session's sole/most-recently-created context.
pub(crate) fn resolve_context(
    session: &SessionState,
    requested: Option<&str>,
) -> Result<BrowsingContext> {
    if let Some(id) = requested {
        let context = BrowsingContext::new(id);
        return if session.contexts.contains_key(&context) {
            Ok(context)
        } else {
            Err(EngineError::Locator(LocatorError::ScopeNotFound(id.to_string())))
        };
    }
    session
        .contexts
        .keys()
        .next()
        .cloned()
        .ok_or_else(|| EngineError::msg("no open browsing context"))
}
