//! Query façade over a loaded audit trail.
//!
//! [`load_event_log`] runs the ingestion pipeline once; a [`ReportService`]
//! then answers any number of read-only queries against the shared snapshot.

use std::path::Path;
use std::sync::Arc;

use audit_core::error::Result;
use audit_core::models::RawEventRow;
use audit_core::settings::MetricsConfig;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};

use crate::aggregator::{AttributionContext, Horizon, MetricsAggregator};
use crate::history::EventLog;
use crate::lifecycle::{DeclarationLookup, LifecycleAnalyzer};
use crate::normalizer::{EventNormalizer, NormalizationStats, NormalizedLog};
use crate::reader::load_raw_rows;
use crate::reports::{DayCounts, MonthlyUserRow, UserReport, WorkingDaysRow};

/// Longest working-day report [`ReportService::last_working_days`] produces.
pub const MAX_WORKING_DAYS: usize = 31;

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// Load every history file under `data_path` and normalise it.
///
/// Naive timestamps are read in `tz`; rows of the configured excluded company
/// are dropped.
pub fn load_event_log(
    data_path: &Path,
    config: &MetricsConfig,
    tz: Tz,
) -> Result<NormalizedLog> {
    let load_start = std::time::Instant::now();
    let rows = load_raw_rows(data_path)?;
    let load_time = load_start.elapsed().as_secs_f64();

    let normalized = normalize_rows(&rows, config, tz);
    info!(
        "Loaded {} events over {} declarations in {:.2}s",
        normalized.stats.events_kept,
        normalized.log.len(),
        load_time
    );
    Ok(normalized)
}

/// Normalise already-loaded rows with the config's exclusion rule.
pub fn normalize_rows(rows: &[RawEventRow], config: &MetricsConfig, tz: Tz) -> NormalizedLog {
    EventNormalizer::new(tz, config.excluded_company.as_deref()).normalize(rows)
}

// ── ReportService ─────────────────────────────────────────────────────────────

/// Read-only entry points producing report payloads.
///
/// Cloning is cheap; every clone shares the same [`EventLog`] and each query
/// keeps its aggregation state local.
#[derive(Debug, Clone)]
pub struct ReportService {
    log: Arc<EventLog>,
    config: MetricsConfig,
    contexts: Vec<AttributionContext>,
    tz: Tz,
    now: DateTime<Utc>,
}

impl ReportService {
    pub fn new(log: Arc<EventLog>, config: MetricsConfig, tz: Tz, now: DateTime<Utc>) -> Self {
        let contexts = config.teams.iter().map(AttributionContext::from_team).collect();
        Self {
            log,
            config,
            contexts,
            tz,
            now,
        }
    }

    /// Build a service straight from raw rows.
    pub fn from_rows(
        rows: &[RawEventRow],
        config: MetricsConfig,
        tz: Tz,
        now: DateTime<Utc>,
    ) -> (Self, NormalizationStats) {
        let NormalizedLog { log, stats } = normalize_rows(rows, &config, tz);
        (Self::new(Arc::new(log), config, tz, now), stats)
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    fn aggregator(&self) -> MetricsAggregator<'_> {
        MetricsAggregator::new(&self.log, self.tz, self.now)
    }

    /// Report for one user over the last `days` days, or all time.
    ///
    /// Without `team` no document-type filter applies. An unknown team name is
    /// the only error.
    pub fn user_report(
        &self,
        user: &str,
        team: Option<&str>,
        days: Option<u32>,
    ) -> Result<UserReport> {
        let ctx = match team {
            Some(name) => AttributionContext::from_team(self.config.team(name)?),
            None => AttributionContext::unscoped(),
        };
        let horizon = days.map(Horizon::Days).unwrap_or(Horizon::AllTime);
        let activity = self.aggregator().user_activity(user, &ctx, horizon);
        debug!("user report for {} ({:?})", activity.identity, horizon);
        Ok(UserReport::build(&activity, ctx.team_name(), self.tz))
    }

    /// Month-to-date row per tracked user, then per untracked active human.
    pub fn all_users_monthly(&self) -> Vec<MonthlyUserRow> {
        let aggregator = self.aggregator();
        let unscoped = AttributionContext::unscoped();
        aggregator
            .roster(&self.contexts, Horizon::MonthToDate)
            .into_iter()
            .map(|(user, ctx)| {
                let ctx = ctx.unwrap_or(&unscoped);
                let activity = aggregator.user_activity(&user, ctx, Horizon::MonthToDate);
                MonthlyUserRow::build(&activity, ctx.team_name(), self.tz)
            })
            .collect()
    }

    /// Creations per day over the last `n` working days, per user.
    ///
    /// `n` is capped at [`MAX_WORKING_DAYS`].
    pub fn last_working_days(&self, n: usize) -> Vec<WorkingDaysRow> {
        let n = n.min(MAX_WORKING_DAYS);
        let aggregator = self.aggregator();
        let unscoped = AttributionContext::unscoped();
        let horizon = Horizon::Days(working_span_days(n));
        aggregator
            .roster(&self.contexts, horizon)
            .into_iter()
            .map(|(user, ctx)| {
                let ctx = ctx.unwrap_or(&unscoped);
                let counts = aggregator.working_day_counts(&user, ctx, n);
                WorkingDaysRow {
                    user,
                    team: ctx.team_name().map(str::to_string),
                    daily_file_creations: DayCounts(counts),
                }
            })
            .collect()
    }

    /// Lifecycle of one declaration, or a miss with suggestions.
    pub fn declaration_lookup(&self, declaration_id: &str) -> DeclarationLookup {
        LifecycleAnalyzer::new(&self.log, self.tz).lookup(declaration_id)
    }
}

/// Calendar days needed to cover `n` working days (whole weeks plus a margin).
fn working_span_days(n: usize) -> u32 {
    let weeks = u32::try_from(n / 5).unwrap_or(u32::MAX);
    weeks.saturating_add(1).saturating_mul(7).saturating_add(2)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use audit_core::settings::TeamConfig;
    use audit_core::time_utils::is_weekday;
    use chrono::{NaiveDate, TimeZone};
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn row(decl: &str, ts: &str, status: &str, user: &str, doc: &str) -> RawEventRow {
        RawEventRow {
            declaration_id: Some(decl.to_string()),
            history_datetime: json!(ts),
            history_status: Some(status.to_string()),
            user_code: Some(user.to_string()),
            active_company: Some("BE01".to_string()),
            declaration_type: Some(doc.to_string()),
        }
    }

    /// Wednesday 17 January 2024, 18:00 UTC.
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 17, 18, 0, 0).unwrap()
    }

    fn config() -> MetricsConfig {
        MetricsConfig {
            timezone: "UTC".to_string(),
            excluded_company: Some("TESTCO".to_string()),
            teams: vec![
                TeamConfig {
                    name: "import".into(),
                    members: vec!["ALICE".into(), "BOB".into(), "BATCHPROC".into()],
                    reserved_doc_types: vec!["IM".into()],
                },
                TeamConfig {
                    name: "export".into(),
                    members: vec!["CAROL".into(), "BATCHPROC".into()],
                    reserved_doc_types: vec!["EX".into()],
                },
            ],
        }
    }

    fn sample_rows() -> Vec<RawEventRow> {
        vec![
            // batch file claimed by ALICE
            row("100", "2024-01-15 08:00:00", "NEW", "SYSTEM", "IM"),
            row("100", "2024-01-15 09:00:00", "MODIFIED", "alice", "IM"),
            row("100", "2024-01-15 09:30:00", "MODIFIED", "alice", "IM"),
            row("100", "2024-01-15 10:00:00", "MODIFIED", "bob", "IM"),
            // manual file sent by CAROL
            row("200", "2024-01-16 09:00:00", "NEW", "carol", "EX"),
            row("200", "2024-01-16 09:20:00", "DEC_DAT", "carol", "EX"),
            // unparsable timestamp
            row("999", "not-a-date", "NEW", "carol", "EX"),
            // reserved-only files for the shared identity
            row("300", "2024-01-17 07:00:00", "NEW", "BATCHPROC", "IM"),
            row("400", "2024-01-17 07:05:00", "NEW", "BATCHPROC", "EX"),
            // untracked human
            row("500", "2024-01-17 11:00:00", "COPIED", "dave", "IM"),
        ]
    }

    fn service(rows: &[RawEventRow]) -> ReportService {
        ReportService::from_rows(rows, config(), Tz::UTC, now()).0
    }

    // ── Examples ──────────────────────────────────────────────────────────────

    #[test]
    fn test_batch_file_credited_to_top_modifier() {
        let svc = service(&sample_rows());
        let alice = svc.user_report("ALICE", None, Some(30)).unwrap();
        let bob = svc.user_report("BOB", None, Some(30)).unwrap();
        let system = svc.user_report("SYSTEM", None, Some(30)).unwrap();

        assert_eq!(alice.summary.total_automatic_files, 1);
        assert_eq!(alice.summary.total_manual_files, 0);
        assert_eq!(bob.summary.total_automatic_files, 0);
        assert_eq!(system.summary.total_automatic_files, 0);
    }

    #[test]
    fn test_manual_file_and_sending_counted() {
        let svc = service(&sample_rows());
        let carol = svc.user_report("carol", None, Some(30)).unwrap();

        assert_eq!(carol.summary.total_manual_files, 1);
        assert_eq!(carol.summary.total_automatic_files, 0);
        let tuesday = carol
            .daily_metrics
            .iter()
            .find(|d| d.date == "2024-01-16")
            .unwrap();
        assert_eq!(tuesday.sending_count, 1);
        assert_eq!(tuesday.sending_file_ids, vec!["200"]);
    }

    #[test]
    fn test_unparsable_row_never_reported() {
        let (svc, stats) = ReportService::from_rows(&sample_rows(), config(), Tz::UTC, now());
        assert_eq!(stats.unparsable_timestamps, 1);
        assert!(svc.log().history("999").is_none());

        let carol = svc.user_report("CAROL", None, None).unwrap();
        assert!(carol
            .daily_metrics
            .iter()
            .all(|d| !d.manual_file_ids.contains(&"999".to_string())));
        assert!(!svc.declaration_lookup("999").is_found());
    }

    // ── Properties ────────────────────────────────────────────────────────────

    #[test]
    fn test_replayed_rows_do_not_change_counts() {
        let rows = sample_rows();
        let mut doubled = rows.clone();
        doubled.extend(rows.iter().cloned());

        let once = service(&rows);
        let twice = service(&doubled);
        assert_eq!(once.all_users_monthly(), twice.all_users_monthly());
        assert_eq!(once.last_working_days(5), twice.last_working_days(5));
        assert_eq!(
            once.user_report("ALICE", None, None).unwrap(),
            twice.user_report("ALICE", None, None).unwrap()
        );
    }

    #[test]
    fn test_working_day_buckets_skip_weekends() {
        let svc = service(&sample_rows());
        for n in [1, 5, 12, 31] {
            for row in svc.last_working_days(n) {
                assert_eq!(row.daily_file_creations.0.len(), n);
                assert!(row.daily_file_creations.0.iter().all(|(d, _)| is_weekday(*d)));
            }
        }
    }

    #[test]
    fn test_last_working_days_rows() {
        let svc = service(&sample_rows());
        let rows = svc.last_working_days(3);

        let users: Vec<(&str, Option<&str>)> = rows
            .iter()
            .map(|r| (r.user.as_str(), r.team.as_deref()))
            .collect();
        assert_eq!(
            users,
            vec![
                ("ALICE", Some("import")),
                ("BOB", Some("import")),
                ("BATCHPROC", Some("import")),
                ("CAROL", Some("export")),
                ("BATCHPROC", Some("export")),
                ("DAVE", None),
            ]
        );

        let wed = NaiveDate::from_ymd_opt(2024, 1, 17).unwrap();
        assert_eq!(rows[2].daily_file_creations.get(wed), Some(1));
        assert_eq!(rows[4].daily_file_creations.get(wed), Some(1));
        assert_eq!(rows[5].daily_file_creations.get(wed), Some(1));

        let json = serde_json::to_value(&rows[0]).unwrap();
        let keys: Vec<&String> = json["daily_file_creations"].as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_all_users_monthly() {
        let svc = service(&sample_rows());
        let rows = svc.all_users_monthly();
        let alice = rows.iter().find(|r| r.user == "ALICE").unwrap();
        assert_eq!(alice.automatic_files, 1);
        assert_eq!(alice.avg_activity_per_day, 1.0);

        let bob = rows.iter().find(|r| r.user == "BOB").unwrap();
        assert_eq!(bob.automatic_files, 0);
        assert_eq!(bob.avg_activity_per_day, 0.0);
        assert_eq!(bob.manual_vs_auto_ratio, 0.0);
        assert_eq!(bob.days_with_activity, 1);

        let dave = rows.iter().find(|r| r.user == "DAVE").unwrap();
        assert_eq!(dave.team, None);
        assert_eq!(dave.manual_files, 1);
        assert_eq!(dave.manual_vs_auto_ratio, 1.0);
    }

    #[test]
    fn test_user_report_with_team_scope() {
        let svc = service(&sample_rows());
        let import = svc.user_report("BATCHPROC", Some("import"), None).unwrap();
        let unscoped = svc.user_report("BATCHPROC", None, None).unwrap();
        assert_eq!(import.team.as_deref(), Some("import"));
        assert_eq!(import.summary.total_automatic_files, 1);
        assert_eq!(unscoped.summary.total_automatic_files, 2);
    }

    #[test]
    fn test_user_report_unknown_team_errors() {
        let svc = service(&sample_rows());
        assert!(svc.user_report("ALICE", Some("logistics"), None).is_err());
    }

    #[test]
    fn test_excluded_company_rows_dropped() {
        let mut rows = sample_rows();
        let mut excluded = row("600", "2024-01-17 10:00:00", "NEW", "carol", "EX");
        excluded.active_company = Some("testco".into());
        rows.push(excluded);

        let svc = service(&rows);
        assert!(svc.log().history("600").is_none());
    }

    #[test]
    fn test_declaration_lookup() {
        let svc = service(&sample_rows());
        match svc.declaration_lookup("100") {
            DeclarationLookup::Found(lc) => {
                assert_eq!(lc.responsible_user.as_deref(), Some("ALICE"));
                assert_eq!(lc.creator, "SYSTEM");
            }
            DeclarationLookup::Missing(_) => panic!("declaration 100 should exist"),
        }
        match svc.declaration_lookup("10") {
            DeclarationLookup::Missing(miss) => {
                assert!(!miss.found);
                assert_eq!(miss.total_ids_in_system, 5);
                assert!(miss.similar_ids.len() <= 5);
                assert!(miss.similar_ids.contains(&"100".to_string()));
            }
            DeclarationLookup::Found(_) => panic!("declaration 10 should not exist"),
        }
    }

    #[test]
    fn test_clones_share_snapshot_across_threads() {
        let svc = service(&sample_rows());
        let expected = svc.all_users_monthly();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let svc = svc.clone();
                std::thread::spawn(move || svc.all_users_monthly())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }

    // ── load_event_log ────────────────────────────────────────────────────────

    #[test]
    fn test_load_event_log_from_directory() {
        let dir = TempDir::new().unwrap();
        let mut file = std::fs::File::create(dir.path().join("history.jsonl")).unwrap();
        for r in sample_rows() {
            writeln!(file, "{}", serde_json::to_string(&r).unwrap()).unwrap();
        }

        let normalized = load_event_log(dir.path(), &config(), Tz::UTC).unwrap();
        assert_eq!(normalized.stats.rows_read, 10);
        assert_eq!(normalized.stats.unparsable_timestamps, 1);
        assert_eq!(normalized.log.len(), 5);
    }

    #[test]
    fn test_load_event_log_missing_path() {
        let result = load_event_log(Path::new("/tmp/does-not-exist-audit-xyz"), &config(), Tz::UTC);
        assert!(result.is_err());
    }

    #[test]
    fn test_working_span_covers_requested_days() {
        assert!(working_span_days(1) >= 3);
        assert!(working_span_days(5) >= 7);
        assert!(working_span_days(31) >= 43);
        assert_eq!(working_span_days(usize::MAX), u32::MAX);
    }

    #[test]
    fn test_oversized_working_day_request_is_capped() {
        let svc = service(&sample_rows());
        let rows = svc.last_working_days(usize::MAX);
        assert_eq!(rows.len(), svc.last_working_days(5).len());
        for row in rows {
            assert_eq!(row.daily_file_creations.0.len(), MAX_WORKING_DAYS);
        }
    }

    #[test]
    fn test_huge_day_horizon_reports_all_history() {
        let svc = service(&sample_rows());
        assert_eq!(
            svc.user_report("ALICE", None, Some(u32::MAX)).unwrap(),
            svc.user_report("ALICE", None, None).unwrap()
        );
    }
}
