//! Indexed, read-only view of the normalised audit trail.
//!
//! Events are grouped per declaration and kept in chronological order, with the
//! original log position breaking ties. A secondary index maps each actor to the
//! declarations they touched so per-user reports never scan the whole log.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use audit_core::models::Event;

/// The full event snapshot a report is computed from.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    declarations: BTreeMap<String, Vec<Event>>,
    by_identity: HashMap<String, BTreeSet<String>>,
    event_count: usize,
}

impl EventLog {
    /// Group `events` by declaration and sort each history.
    pub fn from_events(events: Vec<Event>) -> Self {
        let event_count = events.len();
        let mut declarations: BTreeMap<String, Vec<Event>> = BTreeMap::new();
        let mut by_identity: HashMap<String, BTreeSet<String>> = HashMap::new();

        for event in events {
            by_identity
                .entry(event.actor.clone())
                .or_default()
                .insert(event.declaration_id.clone());
            declarations
                .entry(event.declaration_id.clone())
                .or_default()
                .push(event);
        }

        for history in declarations.values_mut() {
            history.sort_by_key(|e| e.order_key());
        }

        Self {
            declarations,
            by_identity,
            event_count,
        }
    }

    /// Chronological history of one declaration.
    pub fn history(&self, declaration_id: &str) -> Option<&[Event]> {
        self.declarations.get(declaration_id).map(Vec::as_slice)
    }

    /// All declaration ids in lexical order.
    pub fn declaration_ids(&self) -> impl Iterator<Item = &str> {
        self.declarations.keys().map(String::as_str)
    }

    /// Declarations on which `identity` has at least one event, in lexical order.
    pub fn declarations_of<'a>(&'a self, identity: &str) -> impl Iterator<Item = &'a str> {
        self.by_identity
            .get(identity)
            .into_iter()
            .flat_map(|ids| ids.iter().map(String::as_str))
    }

    /// Every actor appearing in the log, sorted.
    pub fn identities(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.by_identity.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of distinct declarations.
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Total number of events across all declarations.
    pub fn event_count(&self) -> usize {
        self.event_count
    }
}

/// The sub-history performed by `identity`, preserving order.
pub fn target_history<'a>(history: &'a [Event], identity: &str) -> Vec<&'a Event> {
    history.iter().filter(|e| e.actor == identity).collect()
}

/// Document type of a declaration: that of its earliest event.
pub fn declaration_doc_type(history: &[Event]) -> Option<&str> {
    history.first().map(|e| e.doc_type.as_str())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
