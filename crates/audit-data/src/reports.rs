//! JSON payloads returned by the query façade.
//!
//! Each builder turns a [`UserActivity`] (or working-day counts) into the
//! serialisable shape consumed downstream. All ratios go through the guarded
//! helpers in [`audit_core::calculations`].

use std::collections::{BTreeMap, BTreeSet};

use audit_core::calculations::{manual_vs_auto_ratio, mean, round2, safe_div, smart_average_per_day};
use audit_core::time_utils::{day_key, local_date, short_day_key, weekdays_between};
use chrono::{NaiveDate, Timelike};
use chrono_tz::Tz;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::aggregator::{DailyMetric, UserActivity};

// ── Single-user report ────────────────────────────────────────────────────────

/// One day of a single-user report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyMetricRow {
    pub date: String,
    pub manual_files_created: u32,
    pub automatic_files_created: u32,
    pub sending_count: u32,
    pub modification_count: u32,
    pub modification_file_ids: Vec<String>,
    pub total_files_handled: usize,
    pub avg_creation_time: Option<f64>,
    pub manual_file_ids: Vec<String>,
    pub automatic_file_ids: Vec<String>,
    pub sending_file_ids: Vec<String>,
}

impl From<&DailyMetric> for DailyMetricRow {
    fn from(day: &DailyMetric) -> Self {
        Self {
            date: day_key(day.date),
            manual_files_created: day.manual_count(),
            automatic_files_created: day.automatic_count(),
            sending_count: day.sending_count(),
            modification_count: day.modification_count,
            modification_file_ids: day.modification_file_ids.iter().cloned().collect(),
            total_files_handled: day.files_handled().len(),
            avg_creation_time: day.avg_creation_time(),
            manual_file_ids: day.manual_file_ids.iter().cloned().collect(),
            automatic_file_ids: day.automatic_file_ids.iter().cloned().collect(),
            sending_file_ids: day.sending_file_ids.iter().cloned().collect(),
        }
    }
}

/// Window totals for a single user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    pub total_manual_files: u32,
    pub total_automatic_files: u32,
    pub total_sent_files: u32,
    pub total_files_handled: usize,
    pub total_modifications: u32,
    /// Smart average: creations per weekday that had at least one.
    pub avg_files_per_day: f64,
    /// Minutes, averaged over every credited creation.
    pub avg_creation_time: Option<f64>,
    pub most_productive_day: Option<String>,
    /// Credited creations per declaration document type.
    pub file_type_counts: BTreeMap<String, u32>,
    /// Own events per local hour, keyed `"HH"`.
    pub activity_by_hour: BTreeMap<String, u32>,
    /// Own events per company code.
    pub company_specialization: BTreeMap<String, u32>,
    pub days_active: usize,
    pub modifications_per_file: f64,
    pub manual_vs_auto_ratio: f64,
    pub activity_days: Vec<String>,
    pub inactivity_days: Vec<String>,
    pub hour_with_most_activity: Option<u32>,
}

/// Full single-user report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserReport {
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    pub daily_metrics: Vec<DailyMetricRow>,
    pub summary: UserSummary,
}

impl UserReport {
    /// Build the report; `tz` buckets event hours and dates.
    pub fn build(activity: &UserActivity<'_>, team: Option<&str>, tz: Tz) -> Self {
        Self {
            user: activity.identity.clone(),
            team: team.map(str::to_string),
            daily_metrics: activity.days.values().map(DailyMetricRow::from).collect(),
            summary: UserSummary::build(activity, tz),
        }
    }
}

impl UserSummary {
    pub fn build(activity: &UserActivity<'_>, tz: Tz) -> Self {
        let total_manual = activity.total_manual();
        let total_automatic = activity.total_automatic();
        let total_modifications = activity.total_modifications();

        let sessions: Vec<f64> = activity
            .days
            .values()
            .flat_map(|d| d.session_minutes.iter().copied())
            .collect();

        let most_productive_day = activity
            .days
            .values()
            .filter(|d| d.creations() > 0)
            .max_by(|a, b| a.creations().cmp(&b.creations()).then(b.date.cmp(&a.date)))
            .map(|d| day_key(d.date));

        let mut file_type_counts: BTreeMap<String, u32> = BTreeMap::new();
        for credit in &activity.credits {
            *file_type_counts.entry(credit.doc_type.clone()).or_default() += 1;
        }

        let mut hours: BTreeMap<u32, u32> = BTreeMap::new();
        let mut company_specialization: BTreeMap<String, u32> = BTreeMap::new();
        let mut active_dates: BTreeSet<NaiveDate> = BTreeSet::new();
        for event in &activity.events {
            let local = event.timestamp.with_timezone(&tz);
            *hours.entry(local.hour()).or_default() += 1;
            *company_specialization
                .entry(event.company_code.clone())
                .or_default() += 1;
            active_dates.insert(local.date_naive());
        }

        let hour_with_most_activity = hours
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(hour, _)| *hour);

        let modified_files: BTreeSet<&str> = activity
            .days
            .values()
            .flat_map(|d| d.modification_file_ids.iter().map(String::as_str))
            .collect();

        let (activity_days, inactivity_days) = split_weekdays(activity, &active_dates, tz);

        Self {
            total_manual_files: total_manual,
            total_automatic_files: total_automatic,
            total_sent_files: activity.total_sent(),
            total_files_handled: activity.files_handled(),
            total_modifications,
            avg_files_per_day: round2(smart_average_per_day(activity.daily_creations())),
            avg_creation_time: mean(&sessions).map(round2),
            most_productive_day,
            file_type_counts,
            activity_by_hour: hours
                .into_iter()
                .map(|(hour, count)| (format!("{:02}", hour), count))
                .collect(),
            company_specialization,
            days_active: active_dates.len(),
            modifications_per_file: round2(safe_div(
                f64::from(total_modifications),
                modified_files.len() as f64,
            )),
            manual_vs_auto_ratio: round2(manual_vs_auto_ratio(total_manual, total_automatic)),
            activity_days,
            inactivity_days,
            hour_with_most_activity,
        }
    }
}

/// Weekdays of the window with and without own events.
///
/// An unbounded window starts at the identity's first event in it.
fn split_weekdays(
    activity: &UserActivity<'_>,
    active_dates: &BTreeSet<NaiveDate>,
    tz: Tz,
) -> (Vec<String>, Vec<String>) {
    let first = activity
        .start
        .or_else(|| activity.events.first().map(|e| e.timestamp));
    let Some(first) = first else {
        return (Vec::new(), Vec::new());
    };

    let (active, inactive): (Vec<NaiveDate>, Vec<NaiveDate>) =
        weekdays_between(local_date(first, tz), local_date(activity.end, tz))
            .into_iter()
            .partition(|d| active_dates.contains(d));
    (
        active.into_iter().map(day_key).collect(),
        inactive.into_iter().map(day_key).collect(),
    )
}

// ── All-users monthly report ──────────────────────────────────────────────────

/// One row of the all-users report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyUserRow {
    pub user: String,
    pub team: Option<String>,
    pub total_files_handled: usize,
    pub manual_files: u32,
    pub automatic_files: u32,
    pub sent_files: u32,
    pub days_with_activity: usize,
    pub avg_activity_per_day: f64,
    pub manual_vs_auto_ratio: f64,
}

impl MonthlyUserRow {
    pub fn build(activity: &UserActivity<'_>, team: Option<&str>, tz: Tz) -> Self {
        let manual = activity.total_manual();
        let automatic = activity.total_automatic();
        let days_with_activity = activity
            .events
            .iter()
            .map(|e| local_date(e.timestamp, tz))
            .collect::<BTreeSet<_>>()
            .len();

        Self {
            user: activity.identity.clone(),
            team: team.map(str::to_string),
            total_files_handled: activity.files_handled(),
            manual_files: manual,
            automatic_files: automatic,
            sent_files: activity.total_sent(),
            days_with_activity,
            avg_activity_per_day: round2(smart_average_per_day(activity.daily_creations())),
            manual_vs_auto_ratio: round2(manual_vs_auto_ratio(manual, automatic)),
        }
    }
}

// ── Working-days report ───────────────────────────────────────────────────────

/// Creation counts keyed `"DD/MM"`, serialised in chronological order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayCounts(pub Vec<(NaiveDate, u32)>);

impl DayCounts {
    pub fn total(&self) -> u32 {
        self.0.iter().map(|(_, c)| c).sum()
    }

    pub fn get(&self, date: NaiveDate) -> Option<u32> {
        self.0.iter().find(|(d, _)| *d == date).map(|(_, c)| *c)
    }
}

impl Serialize for DayCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (date, count) in &self.0 {
            map.serialize_entry(&short_day_key(*date), count)?;
        }
        map.end()
    }
}

/// One row of the last-N-working-days report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkingDaysRow {
    pub user: String,
    pub team: Option<String>,
    pub daily_file_creations: DayCounts,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
