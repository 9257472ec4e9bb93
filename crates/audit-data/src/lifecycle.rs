//! Single-declaration inspection.
//!
//! Rebuilds one declaration's timeline from the [`EventLog`] and derives a
//! simplified origin and responsible user. Unknown ids produce a structured
//! miss carrying the closest known ids instead of an error.

use std::collections::BTreeMap;

use audit_core::models::{Event, FileType};
use chrono_tz::Tz;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::Serialize;

use crate::classifier::ActivityClassifier;
use crate::history::EventLog;

/// Maximum number of suggestions in a lookup miss.
pub const MAX_SIMILAR_IDS: usize = 5;

// ── Payloads ──────────────────────────────────────────────────────────────────

/// One event as shown in a lifecycle timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    /// RFC 3339 timestamp in the report timezone.
    pub timestamp: String,
    pub user: String,
    pub status: String,
    pub company: String,
    pub doc_type: String,
}

/// Full lifecycle of a known declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeclarationLifecycle {
    pub found: bool,
    pub declaration_id: String,
    pub file_type: FileType,
    pub creator: String,
    pub responsible_user: Option<String>,
    /// Distinct actors in order of first appearance.
    pub users_involved: Vec<String>,
    pub user_action_counts: BTreeMap<String, u32>,
    pub total_actions: usize,
    pub status_breakdown: BTreeMap<String, u32>,
    pub first_action: Option<TimelineEntry>,
    pub last_action: Option<TimelineEntry>,
    pub duration_hours: Option<f64>,
    pub timeline: Vec<TimelineEntry>,
}

/// Result for an id that is not in the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupMiss {
    pub found: bool,
    pub declaration_id: String,
    pub similar_ids: Vec<String>,
    pub total_ids_in_system: usize,
}

/// Outcome of a declaration lookup; serialises as either payload directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DeclarationLookup {
    Found(Box<DeclarationLifecycle>),
    Missing(LookupMiss),
}

impl DeclarationLookup {
    pub fn is_found(&self) -> bool {
        matches!(self, DeclarationLookup::Found(_))
    }
}

// ── LifecycleAnalyzer ─────────────────────────────────────────────────────────

/// Read-only lifecycle queries over a loaded log.
pub struct LifecycleAnalyzer<'a> {
    log: &'a EventLog,
    tz: Tz,
}

impl<'a> LifecycleAnalyzer<'a> {
    pub fn new(log: &'a EventLog, tz: Tz) -> Self {
        Self { log, tz }
    }

    /// Look up `declaration_id` (trimmed), returning the lifecycle or a miss.
    pub fn lookup(&self, declaration_id: &str) -> DeclarationLookup {
        let id = declaration_id.trim();
        match self.lifecycle(id) {
            Some(lifecycle) => DeclarationLookup::Found(Box::new(lifecycle)),
            None => DeclarationLookup::Missing(LookupMiss {
                found: false,
                declaration_id: id.to_string(),
                similar_ids: self.similar_ids(id, MAX_SIMILAR_IDS),
                total_ids_in_system: self.log.len(),
            }),
        }
    }

    /// Timeline and derived attributes of one declaration, if present.
    pub fn lifecycle(&self, declaration_id: &str) -> Option<DeclarationLifecycle> {
        let history = self.log.history(declaration_id)?;
        let first = history.first()?;

        let mut users_involved: Vec<String> = Vec::new();
        let mut user_action_counts: BTreeMap<String, u32> = BTreeMap::new();
        let mut status_breakdown: BTreeMap<String, u32> = BTreeMap::new();
        for event in history {
            if !users_involved.contains(&event.actor) {
                users_involved.push(event.actor.clone());
            }
            *user_action_counts.entry(event.actor.clone()).or_default() += 1;
            *status_breakdown
                .entry(event.status.as_str().to_string())
                .or_default() += 1;
        }

        let timeline: Vec<TimelineEntry> = history.iter().map(|e| self.entry(e)).collect();

        Some(DeclarationLifecycle {
            found: true,
            declaration_id: declaration_id.to_string(),
            file_type: file_type(history),
            creator: first.actor.clone(),
            responsible_user: responsible_user(history),
            users_involved,
            user_action_counts,
            total_actions: history.len(),
            status_breakdown,
            first_action: timeline.first().cloned(),
            last_action: timeline.last().cloned(),
            duration_hours: duration_hours(history),
            timeline,
        })
    }

    /// Up to `limit` known ids closest to `query`.
    ///
    /// Skim fuzzy matches rank first by score; ids that only share a leading
    /// prefix with the query follow, longest prefix first. Equal scores are
    /// ordered by id.
    pub fn similar_ids(&self, query: &str, limit: usize) -> Vec<String> {
        if query.is_empty() {
            return Vec::new();
        }
        let matcher = SkimMatcherV2::default();

        // (tier, score, id): tier 1 = fuzzy match, tier 0 = shared prefix only
        let mut ranked: Vec<(u8, i64, &str)> = self
            .log
            .declaration_ids()
            .filter_map(|id| {
                if let Some(score) = matcher.fuzzy_match(id, query) {
                    return Some((1, score, id));
                }
                let prefix = common_prefix_len(id, query);
                (prefix > 0).then_some((0, prefix as i64, id))
            })
            .collect();

        ranked.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)).then(a.2.cmp(b.2)));
        ranked
            .into_iter()
            .take(limit)
            .map(|(_, _, id)| id.to_string())
            .collect()
    }

    fn entry(&self, event: &Event) -> TimelineEntry {
        TimelineEntry {
            timestamp: event.timestamp.with_timezone(&self.tz).to_rfc3339(),
            user: event.actor.clone(),
            status: event.status.as_str().to_string(),
            company: event.company_code.clone(),
            doc_type: event.doc_type.clone(),
        }
    }
}

// ── Derived attributes ────────────────────────────────────────────────────────

/// `Automatic` if any interface trigger, else `Manual` if any manual trigger.
pub fn file_type(history: &[Event]) -> FileType {
    if history.iter().any(|e| e.status.is_interface_trigger()) {
        FileType::Automatic
    } else if history.iter().any(|e| e.status.is_manual_trigger()) {
        FileType::Manual
    } else {
        FileType::Unknown
    }
}

/// Batch files go to the credited human (or the reserved creator when no
/// human appears); human-originated files go to their creator.
pub fn responsible_user(history: &[Event]) -> Option<String> {
    let creator = history.first()?.actor.as_str();
    let responsible = if ActivityClassifier::is_batch_originated(history) {
        ActivityClassifier::responsible_human(history).unwrap_or(creator)
    } else {
        creator
    };
    Some(responsible.to_string())
}

/// Hours between the first and last event.
pub fn duration_hours(history: &[Event]) -> Option<f64> {
    let first = history.first()?;
    let last = history.last()?;
    let seconds = (last.timestamp - first.timestamp).num_seconds();
    Some(seconds as f64 / 3600.0)
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use audit_core::models::Status;
    use chrono::{TimeZone, Utc};

    fn ev(decl: &str, hour: u32, actor: &str, status: &str, seq: u64) -> Event {
        Event {
            declaration_id: decl.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap(),
            status: Status::parse(status),
            actor: actor.to_string(),
            company_code: "BE01".to_string(),
            doc_type: "IM".to_string(),
            sequence: seq,
        }
    }

    fn sample_log() -> EventLog {
        EventLog::from_events(vec![
            ev("100", 8, "SYSTEM", "NEW", 0),
            ev("100", 9, "ALICE", "MODIFIED", 1),
            ev("100", 10, "ALICE", "MODIFIED", 2),
            ev("100", 11, "BOB", "MODIFIED", 3),
            ev("200", 8, "CAROL", "NEW", 4),
            ev("200", 9, "CAROL", "DEC_DAT", 5),
            ev("300", 8, "DAVE", "INTERFACE", 6),
            ev("1000", 8, "ERIN", "PRINTED", 7),
        ])
    }

    // ── lifecycle ─────────────────────────────────────────────────────────────

    #[test]
    fn test_lifecycle_of_batch_file() {
        let log = sample_log();
        let analyzer = LifecycleAnalyzer::new(&log, Tz::UTC);
        let lc = analyzer.lifecycle("100").unwrap();

        assert!(lc.found);
        assert_eq!(lc.creator, "SYSTEM");
        assert_eq!(lc.responsible_user.as_deref(), Some("ALICE"));
        assert_eq!(lc.file_type, FileType::Manual);
        assert_eq!(lc.users_involved, vec!["SYSTEM", "ALICE", "BOB"]);
        assert_eq!(lc.user_action_counts["ALICE"], 2);
        assert_eq!(lc.status_breakdown["MODIFIED"], 3);
        assert_eq!(lc.total_actions, 4);
        assert_eq!(lc.duration_hours, Some(3.0));
        assert_eq!(lc.timeline.len(), 4);
        assert_eq!(lc.first_action.unwrap().user, "SYSTEM");
        assert_eq!(lc.last_action.unwrap().user, "BOB");
    }

    #[test]
    fn test_file_type_variants() {
        let log = sample_log();
        let analyzer = LifecycleAnalyzer::new(&log, Tz::UTC);
        assert_eq!(analyzer.lifecycle("200").unwrap().file_type, FileType::Manual);
        assert_eq!(analyzer.lifecycle("300").unwrap().file_type, FileType::Automatic);
        assert_eq!(analyzer.lifecycle("1000").unwrap().file_type, FileType::Unknown);
    }

    #[test]
    fn test_human_file_responsible_is_creator() {
        let log = sample_log();
        let analyzer = LifecycleAnalyzer::new(&log, Tz::UTC);
        assert_eq!(
            analyzer.lifecycle("200").unwrap().responsible_user.as_deref(),
            Some("CAROL")
        );
    }

    #[test]
    fn test_batch_file_without_humans_responsible_is_reserved_creator() {
        let history = vec![ev("400", 8, "BATCHPROC", "NEW", 0)];
        assert_eq!(responsible_user(&history).as_deref(), Some("BATCHPROC"));
        assert_eq!(duration_hours(&history), Some(0.0));
        assert_eq!(duration_hours(&[]), None);
    }

    #[test]
    fn test_timeline_uses_report_timezone() {
        let log = sample_log();
        let tz: Tz = "Europe/Brussels".parse().unwrap();
        let analyzer = LifecycleAnalyzer::new(&log, tz);
        let lc = analyzer.lifecycle("200").unwrap();
        assert_eq!(lc.timeline[0].timestamp, "2024-01-15T09:00:00+01:00");
    }

    // ── lookup ────────────────────────────────────────────────────────────────

    #[test]
    fn test_lookup_found_serializes_flat() {
        let log = sample_log();
        let analyzer = LifecycleAnalyzer::new(&log, Tz::UTC);
        let result = analyzer.lookup(" 200 ");
        assert!(result.is_found());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["found"], true);
        assert_eq!(json["declaration_id"], "200");
        assert_eq!(json["file_type"], "Manual");
        assert_eq!(json["status_breakdown"]["DEC_DAT"], 1);
    }

    #[test]
    fn test_lookup_miss_lists_similar_ids() {
        let log = sample_log();
        let analyzer = LifecycleAnalyzer::new(&log, Tz::UTC);
        let result = analyzer.lookup("10");
        assert!(!result.is_found());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["found"], false);
        assert_eq!(json["total_ids_in_system"], 4);
        let similar: Vec<String> = serde_json::from_value(json["similar_ids"].clone()).unwrap();
        assert!(similar.contains(&"100".to_string()));
        assert!(similar.contains(&"1000".to_string()));
        assert!(!similar.contains(&"300".to_string()));
    }

    #[test]
    fn test_similar_ids_include_prefix_only_matches() {
        let log = sample_log();
        let analyzer = LifecycleAnalyzer::new(&log, Tz::UTC);
        let similar = analyzer.similar_ids("1009", 5);
        assert!(similar.contains(&"100".to_string()));
    }

    #[test]
    fn test_similar_ids_capped() {
        let events = (0..20)
            .map(|i| ev(&format!("50{:02}", i), 8, "ALICE", "NEW", i))
            .collect();
        let log = EventLog::from_events(events);
        let analyzer = LifecycleAnalyzer::new(&log, Tz::UTC);
        assert_eq!(analyzer.similar_ids("50", MAX_SIMILAR_IDS).len(), MAX_SIMILAR_IDS);
    }

    #[test]
    fn test_similar_ids_empty_query() {
        let log = sample_log();
        let analyzer = LifecycleAnalyzer::new(&log, Tz::UTC);
        assert!(analyzer.similar_ids("", 5).is_empty());
    }
}
