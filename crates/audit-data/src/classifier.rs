//! Creation attribution for a single declaration.
//!
//! Decides, for one declaration history and one identity, whether that identity
//! created the declaration manually, was credited with an automatic creation, or
//! neither. The decision depends only on the history and the fixed vocabularies
//! in [`audit_core::models`], so results can be memoised per declaration.

use audit_core::error::{AuditError, Result};
use audit_core::models::{
    is_reserved_identity, normalize_code, Classification, ClassificationResult, Event,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Stateless attribution rules.
pub struct ActivityClassifier;

impl ActivityClassifier {
    /// Classify `history` (one declaration, chronological) for `target`.
    ///
    /// Rules, in order:
    /// 1. The declaration is *globally automatic* when any event carries the
    ///    interface-trigger status.
    /// 2. If the earliest event was performed by a reserved identity, the file
    ///    is batch-originated and is never manual for anyone:
    ///    * with no human ever involved, only the reserved creator is credited
    ///      as automatic;
    ///    * otherwise only the [`responsible_human`](Self::responsible_human)
    ///      is credited as automatic.
    /// 3. Otherwise the target is manual when its own events include a
    ///    manual-trigger status and the file is not globally automatic, and
    ///    automatic when the file is globally automatic. An identity with no
    ///    events on the declaration gets nothing.
    pub fn classify(
        declaration_id: &str,
        history: &[Event],
        target: &str,
    ) -> Result<Classification> {
        Self::validate(declaration_id, history)?;
        let target = normalize_code(target);
        let Some(first) = history.first() else {
            return Err(AuditError::EmptyHistory(declaration_id.to_string()));
        };

        let globally_automatic = history.iter().any(|e| e.status.is_interface_trigger());

        if first.is_by_reserved() {
            let credited = Self::responsible_human(history).unwrap_or(first.actor.as_str());
            return Ok(if credited == target {
                Classification::AUTOMATIC
            } else {
                Classification::NONE
            });
        }

        let mut own_events = history.iter().filter(|e| e.actor == target).peekable();
        if own_events.peek().is_none() {
            return Ok(Classification::NONE);
        }
        let created_by_hand = own_events.any(|e| e.status.is_manual_trigger());

        Ok(Classification {
            is_manual: created_by_hand && !globally_automatic,
            is_automatic: globally_automatic,
        })
    }

    /// [`classify`](Self::classify), tagged with the declaration and identity.
    pub fn classify_declaration(
        declaration_id: &str,
        history: &[Event],
        target: &str,
    ) -> Result<ClassificationResult> {
        let classification = Self::classify(declaration_id, history, target)?;
        Ok(ClassificationResult {
            declaration_id: declaration_id.to_string(),
            target_identity: normalize_code(target),
            classification,
        })
    }

    /// Whether the earliest event was performed by a reserved identity.
    pub fn is_batch_originated(history: &[Event]) -> bool {
        history.first().is_some_and(Event::is_by_reserved)
    }

    /// The single human credited with a batch-originated declaration.
    ///
    /// Picks the non-reserved actor with the most modification events. Ties go
    /// to the actor whose first action is earliest, then to the smallest
    /// identity code. Returns `None` when no human appears in the history.
    pub fn responsible_human(history: &[Event]) -> Option<&str> {
        // actor → (modification count, first action)
        let mut humans: BTreeMap<&str, (u32, DateTime<Utc>)> = BTreeMap::new();
        for event in history {
            if is_reserved_identity(&event.actor) {
                continue;
            }
            let entry = humans
                .entry(event.actor.as_str())
                .or_insert((0, event.timestamp));
            if event.status.is_modification() {
                entry.0 += 1;
            }
            if event.timestamp < entry.1 {
                entry.1 = event.timestamp;
            }
        }

        humans
            .into_iter()
            .min_by(|(a_id, (a_mods, a_first)), (b_id, (b_mods, b_first))| {
                b_mods
                    .cmp(a_mods)
                    .then(a_first.cmp(b_first))
                    .then(a_id.cmp(b_id))
            })
            .map(|(actor, _)| actor)
    }

    /// Reject histories that are empty or mix declarations.
    fn validate(declaration_id: &str, history: &[Event]) -> Result<()> {
        if history.is_empty() {
            return Err(AuditError::EmptyHistory(declaration_id.to_string()));
        }
        if let Some(stray) = history.iter().find(|e| e.declaration_id != declaration_id) {
            return Err(AuditError::MixedHistory {
                declaration_id: declaration_id.to_string(),
                found: stray.declaration_id.clone(),
            });
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
