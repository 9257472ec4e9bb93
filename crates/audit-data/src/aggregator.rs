//! Per-user productivity aggregation over day and window horizons.
//!
//! Drives the [`ActivityClassifier`] across every declaration a tracked
//! identity touched and buckets the results by the local date of that
//! identity's first action. Team rosters are modelled as independent
//! [`AttributionContext`]s so a reserved identity shared by two teams is
//! evaluated once per team, under that team's document-type filter.

use std::collections::{BTreeMap, BTreeSet};

use audit_core::calculations::{mean, round2};
use audit_core::models::{is_reserved_identity, normalize_code, Classification, Event};
use audit_core::settings::TeamConfig;
use audit_core::time_utils::{last_working_days, local_date, month_start};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::classifier::ActivityClassifier;
use crate::history::{declaration_doc_type, target_history, EventLog};

// ── AttributionContext ────────────────────────────────────────────────────────

/// One team's roster together with the document types its reserved members
/// may be credited for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributionContext {
    /// Team name; empty for an unscoped context.
    pub team: String,
    pub members: Vec<String>,
    pub reserved_doc_types: Vec<String>,
}

impl AttributionContext {
    /// Context without any roster or document-type restriction.
    pub fn unscoped() -> Self {
        Self::default()
    }

    pub fn from_team(team: &TeamConfig) -> Self {
        Self {
            team: team.name.clone(),
            members: team.members.iter().map(|m| normalize_code(m)).collect(),
            reserved_doc_types: team
                .reserved_doc_types
                .iter()
                .map(|d| normalize_code(d))
                .collect(),
        }
    }

    /// Team name, or `None` for the unscoped context.
    pub fn team_name(&self) -> Option<&str> {
        (!self.team.is_empty()).then_some(self.team.as_str())
    }

    /// Whether `identity`'s activity on `history` counts in this context.
    ///
    /// Only reserved identities are filtered, by the declaration's document
    /// type. An empty filter admits everything.
    pub fn admits(&self, identity: &str, history: &[Event]) -> bool {
        if self.reserved_doc_types.is_empty() || !is_reserved_identity(identity) {
            return true;
        }
        declaration_doc_type(history)
            .is_some_and(|doc| self.reserved_doc_types.iter().any(|d| d == doc))
    }
}

// ── Horizon ───────────────────────────────────────────────────────────────────

/// Time span a window report covers, always ending at the reference "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizon {
    /// The last `n` elapsed days.
    Days(u32),
    /// From local midnight on the first of the current month.
    MonthToDate,
    AllTime,
}

impl Horizon {
    /// Window start, or `None` for an unbounded past.
    ///
    /// A day count reaching past the representable calendar is unbounded too.
    pub fn start(&self, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        match self {
            Horizon::Days(days) => now.checked_sub_signed(Duration::days(i64::from(*days))),
            Horizon::MonthToDate => Some(month_start(now, tz)),
            Horizon::AllTime => None,
        }
    }
}

// ── DailyMetric ───────────────────────────────────────────────────────────────

/// Everything one identity did on one local date.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyMetric {
    pub date: NaiveDate,
    pub manual_file_ids: BTreeSet<String>,
    pub automatic_file_ids: BTreeSet<String>,
    pub sending_file_ids: BTreeSet<String>,
    pub modification_file_ids: BTreeSet<String>,
    pub modification_count: u32,
    /// Minutes between the identity's first and last event, per creation.
    pub session_minutes: Vec<f64>,
}

impl DailyMetric {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            manual_file_ids: BTreeSet::new(),
            automatic_file_ids: BTreeSet::new(),
            sending_file_ids: BTreeSet::new(),
            modification_file_ids: BTreeSet::new(),
            modification_count: 0,
            session_minutes: Vec::new(),
        }
    }

    pub fn manual_count(&self) -> u32 {
        self.manual_file_ids.len() as u32
    }

    pub fn automatic_count(&self) -> u32 {
        self.automatic_file_ids.len() as u32
    }

    pub fn sending_count(&self) -> u32 {
        self.sending_file_ids.len() as u32
    }

    /// Manual plus automatic creations.
    pub fn creations(&self) -> u32 {
        self.manual_count() + self.automatic_count()
    }

    /// Distinct declarations created, sent or modified on this date.
    pub fn files_handled(&self) -> BTreeSet<&str> {
        self.manual_file_ids
            .iter()
            .chain(&self.automatic_file_ids)
            .chain(&self.sending_file_ids)
            .chain(&self.modification_file_ids)
            .map(String::as_str)
            .collect()
    }

    /// Mean session length in minutes, `None` without creations.
    pub fn avg_creation_time(&self) -> Option<f64> {
        mean(&self.session_minutes).map(round2)
    }
}

// ── UserActivity ──────────────────────────────────────────────────────────────

/// A creation credited to the identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Credit {
    pub declaration_id: String,
    pub classification: Classification,
    pub doc_type: String,
    pub created_on: NaiveDate,
}

/// Window-bounded activity of one identity.
#[derive(Debug, Clone)]
pub struct UserActivity<'a> {
    pub identity: String,
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
    /// Date buckets with at least one creation, sending or modification.
    pub days: BTreeMap<NaiveDate, DailyMetric>,
    pub credits: Vec<Credit>,
    /// The identity's own events inside the window, chronological.
    pub events: Vec<&'a Event>,
}

impl<'a> UserActivity<'a> {
    fn new(identity: String, start: Option<DateTime<Utc>>, end: DateTime<Utc>) -> Self {
        Self {
            identity,
            start,
            end,
            days: BTreeMap::new(),
            credits: Vec::new(),
            events: Vec::new(),
        }
    }

    fn day(&mut self, date: NaiveDate) -> &mut DailyMetric {
        self.days.entry(date).or_insert_with(|| DailyMetric::new(date))
    }

    pub fn total_manual(&self) -> u32 {
        self.days.values().map(DailyMetric::manual_count).sum()
    }

    pub fn total_automatic(&self) -> u32 {
        self.days.values().map(DailyMetric::automatic_count).sum()
    }

    pub fn total_sent(&self) -> u32 {
        self.days.values().map(DailyMetric::sending_count).sum()
    }

    pub fn total_modifications(&self) -> u32 {
        self.days.values().map(|d| d.modification_count).sum()
    }

    /// Distinct declarations created, sent or modified across the window.
    pub fn files_handled(&self) -> usize {
        self.days
            .values()
            .flat_map(|d| d.files_handled())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Creations per date, for smart averaging.
    pub fn daily_creations(&self) -> impl Iterator<Item = (NaiveDate, u32)> + '_ {
        self.days.values().map(|d| (d.date, d.creations()))
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

// ── MetricsAggregator ─────────────────────────────────────────────────────────

/// Aggregates classifications for tracked identities against a fixed "now".
pub struct MetricsAggregator<'a> {
    log: &'a EventLog,
    tz: Tz,
    now: DateTime<Utc>,
}

impl<'a> MetricsAggregator<'a> {
    pub fn new(log: &'a EventLog, tz: Tz, now: DateTime<Utc>) -> Self {
        Self { log, tz, now }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Local date of the reference instant.
    pub fn today(&self) -> NaiveDate {
        local_date(self.now, self.tz)
    }

    /// Creations per date over the last `n` working days, zero-filled and
    /// chronological.
    ///
    /// A creation lands on the date of the identity's earliest action on the
    /// declaration; creations outside the working days are ignored.
    pub fn working_day_counts(
        &self,
        identity: &str,
        ctx: &AttributionContext,
        n: usize,
    ) -> Vec<(NaiveDate, u32)> {
        let identity = normalize_code(identity);
        let mut counts: BTreeMap<NaiveDate, u32> = last_working_days(self.today(), n)
            .into_iter()
            .map(|d| (d, 0))
            .collect();

        for declaration_id in self.log.declarations_of(&identity) {
            let Some(history) = self.log.history(declaration_id) else {
                continue;
            };
            if !ctx.admits(&identity, history) {
                continue;
            }
            let Some(first_own) = history.iter().find(|e| e.actor == identity) else {
                continue;
            };
            if first_own.timestamp > self.now {
                continue;
            }
            let classification =
                match ActivityClassifier::classify(declaration_id, history, &identity) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!("skipping declaration {}: {}", declaration_id, e);
                        continue;
                    }
                };
            if !classification.is_creation() {
                continue;
            }
            if let Some(count) = counts.get_mut(&local_date(first_own.timestamp, self.tz)) {
                *count += 1;
            }
        }

        counts.into_iter().collect()
    }

    /// Creations, sendings and modifications by `identity` within `horizon`.
    ///
    /// * creations are bucketed on the identity's first action and only
    ///   counted when that action falls inside the window;
    /// * a declaration counts as sent once, on the identity's first
    ///   sending event inside the window;
    /// * every modification event inside the window counts.
    pub fn user_activity(
        &self,
        identity: &str,
        ctx: &AttributionContext,
        horizon: Horizon,
    ) -> UserActivity<'a> {
        let identity = normalize_code(identity);
        let start = horizon.start(self.now, self.tz);
        let in_window = |ts: DateTime<Utc>| start.map_or(true, |s| ts >= s) && ts <= self.now;
        let mut activity = UserActivity::new(identity.clone(), start, self.now);
        let mut skipped = 0usize;

        let log = self.log;
        for declaration_id in log.declarations_of(&identity) {
            let Some(history) = log.history(declaration_id) else {
                continue;
            };
            if !ctx.admits(&identity, history) {
                continue;
            }
            let classification =
                match ActivityClassifier::classify(declaration_id, history, &identity) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!("skipping declaration {}: {}", declaration_id, e);
                        skipped += 1;
                        continue;
                    }
                };

            let own = target_history(history, &identity);
            let (Some(first_own), Some(last_own)) = (own.first(), own.last()) else {
                continue;
            };

            if classification.is_creation() && in_window(first_own.timestamp) {
                let created_on = local_date(first_own.timestamp, self.tz);
                let minutes =
                    (last_own.timestamp - first_own.timestamp).num_seconds() as f64 / 60.0;
                let day = activity.day(created_on);
                if classification.is_manual {
                    day.manual_file_ids.insert(declaration_id.to_string());
                } else {
                    day.automatic_file_ids.insert(declaration_id.to_string());
                }
                day.session_minutes.push(minutes);
                activity.credits.push(Credit {
                    declaration_id: declaration_id.to_string(),
                    classification,
                    doc_type: declaration_doc_type(history).unwrap_or_default().to_string(),
                    created_on,
                });
            }

            if let Some(sent) = own
                .iter()
                .find(|e| e.status.is_sending() && in_window(e.timestamp))
            {
                activity
                    .day(local_date(sent.timestamp, self.tz))
                    .sending_file_ids
                    .insert(declaration_id.to_string());
            }

            for modified in own
                .iter()
                .filter(|e| e.status.is_modification() && in_window(e.timestamp))
            {
                let day = activity.day(local_date(modified.timestamp, self.tz));
                day.modification_count += 1;
                day.modification_file_ids.insert(declaration_id.to_string());
            }

            activity
                .events
                .extend(own.into_iter().filter(|e| in_window(e.timestamp)));
        }

        activity.events.sort_by_key(|e| e.order_key());
        debug!(
            "{}: {} credited declarations, {} events in window, {} skipped",
            identity,
            activity.credits.len(),
            activity.events.len(),
            skipped
        );
        activity
    }

    /// Identities to report on: every roster member in context order, then
    /// any untracked human active in the window, sorted.
    pub fn roster<'c>(
        &self,
        contexts: &'c [AttributionContext],
        horizon: Horizon,
    ) -> Vec<(String, Option<&'c AttributionContext>)> {
        let mut rows: Vec<(String, Option<&'c AttributionContext>)> = Vec::new();
        let mut tracked: BTreeSet<&str> = BTreeSet::new();
        for ctx in contexts {
            for member in &ctx.members {
                tracked.insert(member.as_str());
                rows.push((member.clone(), Some(ctx)));
            }
        }

        let start = horizon.start(self.now, self.tz);
        for identity in self.log.identities() {
            if tracked.contains(identity) || is_reserved_identity(identity) {
                continue;
            }
            if self.is_active(identity, start) {
                rows.push((identity.to_string(), None));
            }
        }
        rows
    }

    fn is_active(&self, identity: &str, start: Option<DateTime<Utc>>) -> bool {
        self.log.declarations_of(identity).any(|id| {
            self.log.history(id).is_some_and(|history| {
                history.iter().any(|e| {
                    e.actor == identity
                        && e.timestamp <= self.now
                        && start.map_or(true, |s| e.timestamp >= s)
                })
            })
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
