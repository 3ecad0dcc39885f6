//! Session state: the set of open browsing contexts, the ref table for
//! minted element handles, and the configuration a live session runs
//! with. One [`SessionState`] exists per live browser, exclusively
//! mutated inside the per-session lock held by the router.

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use vibium_bidi::browsing_context::BrowsingContext;

use crate::config::VibiumConfig;
use crate::trace::TraceHandle;
use crate::transport::{SubscriptionId, Transport};

/// An engine-local name for a remote DOM node, rendered to clients as
/// `@e1`, `@e2`, ... The table mapping ref to remote object is
/// server-authoritative; clients never see anything but the ref.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RefId(u64);

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@e{}", self.0)
    }
}

/// `(refId, contextId, remoteObjectId)` plus the descriptive fields
/// handlers render back to clients (`find` returns tag/text/box).
#[derive(Debug, Clone)]
pub struct ElementHandle {
    pub context: BrowsingContext,
    pub remote_object_id: String,
    pub tag: String,
    pub label: String,
    pub box_: (f64, f64, f64, f64),
}

/// Maps minted refs to their element handle. Writes happen only under
/// the owning session's lock; reads outside the lock (e.g. to render
/// an error message) see a possibly-stale but never torn snapshot.
#[derive(Debug, Default)]
pub struct RefTable {
    next: u64,
    entries: HashMap<RefId, ElementHandle>,
}

impl RefTable {
    pub fn mint(&mut self, handle: ElementHandle) -> RefId {
        self.next += 1;
        let id = RefId(self.next);
        self.entries.insert(id, handle);
        id
    }

    pub fn get(&self, id: RefId) -> Option<&ElementHandle> {
        self.entries.get(&id)
    }

    /// Drops every handle scoped to a context, called when that
    /// context navigates or closes (its remote object ids go stale).
    pub fn invalidate_context(&mut self, context: &BrowsingContext) {
        self.entries.retain(|_, handle| &handle.context != context);
    }
}

/// A tracked browsing context: id, parent (frames have one, tabs
/// don't), and last-known URL.
#[derive(Debug, Clone)]
pub struct ContextRecord {
    pub id: BrowsingContext,
    pub parent: Option<BrowsingContext>,
    pub url: String,
}

/// One per live browser. Holds everything a handler needs: the
/// transport, the open-context tree, the ref table, the optional
/// trace recorder, and the session's configuration.
pub struct SessionState {
    pub transport: Transport,
    pub contexts: HashMap<BrowsingContext, ContextRecord>,
    pub refs: RefTable,
    pub trace: Option<TraceHandle>,
    pub config: VibiumConfig,
    pub subscriptions: Vec<SubscriptionId>,
    pub last_request: Instant,
}

impl SessionState {
    pub fn new(transport: Transport, config: VibiumConfig) -> Self {
        Self {
            transport,
            contexts: HashMap::new(),
            refs: RefTable::default(),
            trace: None,
            config,
            subscriptions: Vec::new(),
            last_request: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_request = Instant::now();
    }

    pub fn idle_for(&self) -> std::time::Duration {
        self.last_request.elapsed()
    }

    pub fn record_context(&mut self, id: BrowsingContext, parent: Option<BrowsingContext>, url: String) {
        self.contexts.insert(id.clone(), ContextRecord { id, parent, url });
    }

    pub fn forget_context(&mut self, id: &BrowsingContext) {
        self.contexts.remove(id);
        self.refs.invalidate_context(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_ids_render_as_eN() {
        let mut table = RefTable::default();
        let id = table.mint(ElementHandle {
            context: BrowsingContext::new("ctx-1"),
            remote_object_id: "obj-1".into(),
            tag: "button".into(),
            label: "Submit".into(),
            box_: (0.0, 0.0, 10.0, 10.0),
        });
        assert_eq!(id.to_string(), "@e1");
        assert!(table.get(id).is_some());
    }

    #[test]
    fn invalidating_a_context_drops_its_handles() {
        let mut table = RefTable::default();
        let ctx = BrowsingContext::new("ctx-1");
        let id = table.mint(ElementHandle {
            context: ctx.clone(),
            remote_object_id: "obj-1".into(),
            tag: "button".into(),
            label: String::new(),
            box_: (0.0, 0.0, 10.0, 10.0),
        });
        table.invalidate_context(&ctx);
        assert!(table.get(id).is_none());
    }
}
