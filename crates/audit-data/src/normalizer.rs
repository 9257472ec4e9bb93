//! Raw row cleaning.
//!
//! Turns the loosely-typed export rows into [`Event`]s: codes are trimmed and
//! upper-cased, timestamps parsed tolerantly, unusable rows dropped, rows of the
//! excluded company removed and replayed rows collapsed to one.

use std::collections::HashSet;

use audit_core::data_processors::TimestampProcessor;
use audit_core::models::{normalize_code, Event, RawEventRow, Status};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::debug;

use crate::history::EventLog;

/// Counters describing what the normaliser kept and discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizationStats {
    pub rows_read: usize,
    /// Rows whose timestamp could not be parsed.
    pub unparsable_timestamps: usize,
    /// Rows missing a declaration id or actor.
    pub malformed: usize,
    pub excluded_company: usize,
    pub duplicates: usize,
    pub events_kept: usize,
}

/// Output of [`EventNormalizer::normalize`].
#[derive(Debug, Clone)]
pub struct NormalizedLog {
    pub log: EventLog,
    pub stats: NormalizationStats,
}

/// Cleans raw export rows into a deduplicated [`EventLog`].
pub struct EventNormalizer {
    timestamps: TimestampProcessor,
    excluded_company: Option<String>,
}

impl EventNormalizer {
    /// `tz` interprets naive timestamps; `excluded_company` rows are dropped.
    pub fn new(tz: Tz, excluded_company: Option<&str>) -> Self {
        Self {
            timestamps: TimestampProcessor::new(tz),
            excluded_company: excluded_company
                .map(normalize_code)
                .filter(|c| !c.is_empty()),
        }
    }

    /// Clean `rows`; the row index becomes each event's log sequence.
    pub fn normalize(&self, rows: &[RawEventRow]) -> NormalizedLog {
        let mut stats = NormalizationStats {
            rows_read: rows.len(),
            ..Default::default()
        };
        let mut seen: HashSet<(String, String, String, DateTime<Utc>)> = HashSet::new();
        let mut events = Vec::with_capacity(rows.len());

        for (index, row) in rows.iter().enumerate() {
            let Some(timestamp) = self.timestamps.parse(&row.history_datetime) else {
                stats.unparsable_timestamps += 1;
                debug!("dropping row {}: unparsable timestamp", index);
                continue;
            };

            let declaration_id = row
                .declaration_id
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string();
            let actor = normalize_code(row.user_code.as_deref().unwrap_or_default());
            if declaration_id.is_empty() || actor.is_empty() {
                stats.malformed += 1;
                debug!("dropping row {}: missing declaration id or user", index);
                continue;
            }

            let company_code = normalize_code(row.active_company.as_deref().unwrap_or_default());
            if self.excluded_company.as_deref() == Some(company_code.as_str()) {
                stats.excluded_company += 1;
                continue;
            }

            let status = Status::parse(row.history_status.as_deref().unwrap_or_default());
            let key = (
                declaration_id.clone(),
                actor.clone(),
                status.as_str().to_string(),
                timestamp,
            );
            if !seen.insert(key) {
                stats.duplicates += 1;
                continue;
            }

            events.push(Event {
                declaration_id,
                timestamp,
                status,
                actor,
                company_code,
                doc_type: normalize_code(row.declaration_type.as_deref().unwrap_or_default()),
                sequence: index as u64,
            });
        }

        stats.events_kept = events.len();
        debug!(
            "{} rows: {} kept, {} bad timestamps, {} malformed, {} excluded, {} duplicates",
            stats.rows_read,
            stats.events_kept,
            stats.unparsable_timestamps,
            stats.malformed,
            stats.excluded_company,
            stats.duplicates
        );

        NormalizedLog {
            log: EventLog::from_events(events),
            stats,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(decl: &str, ts: &str, status: &str, user: &str, company: &str) -> RawEventRow {
        RawEventRow {
            declaration_id: Some(decl.to_string()),
            history_datetime: json!(ts),
            history_status: Some(status.to_string()),
            user_code: Some(user.to_string()),
            active_company: Some(company.to_string()),
            declaration_type: Some("im".to_string()),
        }
    }

    fn normalizer() -> EventNormalizer {
        EventNormalizer::new(Tz::UTC, Some("testco"))
    }

    #[test]
    fn test_normalize_cleans_codes() {
        let raw = row(" 100 ", "2024-01-15 10:00:00", " new ", " alice ", "be01");
        let out = normalizer().normalize(&[raw]);
        let history = out.log.history("100").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].actor, "ALICE");
        assert_eq!(history[0].status, Status::New);
        assert_eq!(history[0].company_code, "BE01");
        assert_eq!(history[0].doc_type, "IM");
    }

    #[test]
    fn test_unparsable_timestamp_dropped() {
        let out = normalizer().normalize(&[
            row("100", "not-a-date", "NEW", "CAROL", "BE01"),
            row("200", "2024-01-15 10:00:00", "NEW", "CAROL", "BE01"),
        ]);
        assert_eq!(out.stats.unparsable_timestamps, 1);
        assert_eq!(out.stats.events_kept, 1);
        assert!(out.log.history("100").is_none());
        assert!(out.log.history("200").is_some());
    }

    #[test]
    fn test_excluded_company_dropped_case_insensitively() {
        let out = normalizer().normalize(&[
            row("100", "2024-01-15 10:00:00", "NEW", "ALICE", " TestCo "),
            row("100", "2024-01-15 11:00:00", "MODIFIED", "ALICE", "BE01"),
        ]);
        assert_eq!(out.stats.excluded_company, 1);
        assert_eq!(out.log.history("100").unwrap().len(), 1);
    }

    #[test]
    fn test_missing_identity_or_declaration_dropped() {
        let mut no_user = row("100", "2024-01-15 10:00:00", "NEW", "", "BE01");
        no_user.user_code = None;
        let no_decl = row("  ", "2024-01-15 10:00:00", "NEW", "ALICE", "BE01");
        let out = normalizer().normalize(&[no_user, no_decl]);
        assert_eq!(out.stats.malformed, 2);
        assert!(out.log.is_empty());
    }

    #[test]
    fn test_exact_repeats_count_once() {
        let r = row("100", "2024-01-15 10:00:00", "MODIFIED", "ALICE", "BE01");
        let out = normalizer().normalize(&[r.clone(), r.clone(), r]);
        assert_eq!(out.stats.duplicates, 2);
        assert_eq!(out.log.event_count(), 1);
    }

    #[test]
    fn test_repeats_differing_only_in_case_are_duplicates() {
        let out = normalizer().normalize(&[
            row("100", "2024-01-15 10:00:00", "modified", "alice", "BE01"),
            row("100", "2024-01-15T10:00:00Z", "MODIFIED", "ALICE", "BE01"),
        ]);
        assert_eq!(out.log.event_count(), 1);
    }

    #[test]
    fn test_same_second_different_status_kept() {
        let out = normalizer().normalize(&[
            row("100", "2024-01-15 10:00:00", "NEW", "ALICE", "BE01"),
            row("100", "2024-01-15 10:00:00", "MODIFIED", "ALICE", "BE01"),
        ]);
        assert_eq!(out.log.event_count(), 2);
        assert_eq!(out.stats.duplicates, 0);
    }

    #[test]
    fn test_sequence_records_row_position() {
        let out = normalizer().normalize(&[
            row("100", "2024-01-15 10:00:00", "NEW", "ALICE", "BE01"),
            row("100", "2024-01-15 10:00:00", "MODIFIED", "BOB", "BE01"),
        ]);
        let history = out.log.history("100").unwrap();
        assert_eq!(history[0].sequence, 0);
        assert_eq!(history[1].sequence, 1);
    }
}
