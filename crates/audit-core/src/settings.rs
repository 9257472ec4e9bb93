use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{AuditError, Result};
use crate::models::normalize_code;
use crate::time_utils::validate_timezone;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Productivity metrics over the customs declaration audit trail
#[derive(Parser, Debug, Clone)]
#[command(
    name = "audit-metrics",
    about = "Productivity metrics over the customs declaration audit trail",
    version
)]
pub struct Settings {
    /// Report to produce
    #[arg(long, default_value = "all-users", value_parser = ["user", "all-users", "working-days", "lookup"])]
    pub view: String,

    /// User code for the single-user report
    #[arg(long)]
    pub user: Option<String>,

    /// Restrict the single-user report to one team's attribution context
    #[arg(long)]
    pub team: Option<String>,

    /// Horizon in days for the single-user report (all history when omitted)
    #[arg(long)]
    pub days: Option<u32>,

    /// Number of working days in the working-days report (1-31)
    #[arg(long, default_value = "5", value_parser = clap::value_parser!(u32).range(1..=31))]
    pub working_days: u32,

    /// Declaration id for the lookup view
    #[arg(long)]
    pub declaration: Option<String>,

    /// Directory (or single file) holding the exported history rows
    #[arg(long, env = "AUDIT_METRICS_DATA_PATH")]
    pub data_path: Option<PathBuf>,

    /// Path to the metrics configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Report timezone, overrides the configuration file ("auto" = system)
    #[arg(long)]
    pub timezone: Option<String>,

    /// Reference instant for the reports (defaults to the current time)
    #[arg(long)]
    pub now: Option<String>,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Write the default configuration file and exit
    #[arg(long)]
    pub init_config: bool,
}

impl Settings {
    /// Parse the process arguments and apply derived values.
    pub fn load() -> Self {
        Self::load_from_args(std::env::args_os().collect())
    }

    /// Same as [`Settings::load`] with an explicit argument list.
    pub fn load_from_args(args: Vec<std::ffi::OsString>) -> Self {
        let mut settings = Settings::parse_from(args);
        // --debug overrides log level.
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    /// Configuration file path: `--config` when given, else the default.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(MetricsConfig::config_path)
    }
}

// ── MetricsConfig (file) ───────────────────────────────────────────────────────

/// Roster of one team together with its attribution rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamConfig {
    pub name: String,
    /// User codes tracked for this team. Reserved identities may appear in
    /// several teams.
    pub members: Vec<String>,
    /// Document types a reserved member is credited for within this team.
    /// Empty means no restriction.
    #[serde(default)]
    pub reserved_doc_types: Vec<String>,
}

/// Site-specific settings persisted at `~/.audit-metrics/config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// IANA timezone used for day bucketing ("auto" = system timezone).
    pub timezone: String,
    /// Company code whose rows are discarded before any grouping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded_company: Option<String>,
    pub teams: Vec<TeamConfig>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            timezone: "Europe/Brussels".to_string(),
            excluded_company: None,
            teams: vec![
                TeamConfig {
                    name: "import".to_string(),
                    members: vec!["BATCHPROC".to_string()],
                    reserved_doc_types: vec!["IM".to_string()],
                },
                TeamConfig {
                    name: "export".to_string(),
                    members: vec!["BATCHPROC".to_string()],
                    reserved_doc_types: vec!["EX".to_string()],
                },
            ],
        }
    }
}

impl MetricsConfig {
    /// Return the default path to the config file.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".audit-metrics").join("config.json")
    }

    /// Load the config from `path`.
    ///
    /// Returns `Default` when the file is absent; an unparsable file is
    /// logged and also yields the defaults.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str::<MetricsConfig>(&content) {
            Ok(config) => config.normalized(),
            Err(e) => {
                warn!("ignoring unreadable config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Atomically write the config, creating parent directories if needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;

        // Write to a temp file then rename for atomicity.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Upper-case and trim every code so roster look-ups match normalised events.
    pub fn normalized(mut self) -> Self {
        self.excluded_company = self
            .excluded_company
            .map(|c| normalize_code(&c))
            .filter(|c| !c.is_empty());
        for team in &mut self.teams {
            team.members = team.members.iter().map(|m| normalize_code(m)).collect();
            team.reserved_doc_types = team
                .reserved_doc_types
                .iter()
                .map(|d| normalize_code(d))
                .collect();
        }
        self
    }

    /// Reject rosters the reports cannot attribute unambiguously.
    pub fn validate(&self) -> Result<()> {
        if !self.timezone.eq_ignore_ascii_case("auto") && !validate_timezone(&self.timezone) {
            return Err(AuditError::Config(format!(
                "unknown timezone \"{}\"",
                self.timezone
            )));
        }
        let mut seen: Vec<String> = Vec::new();
        for team in &self.teams {
            let name = team.name.trim().to_lowercase();
            if name.is_empty() {
                return Err(AuditError::Config("team without a name".to_string()));
            }
            if seen.contains(&name) {
                return Err(AuditError::Config(format!("team \"{}\" defined twice", team.name)));
            }
            if team.members.iter().any(|m| m.trim().is_empty()) {
                return Err(AuditError::Config(format!(
                    "team \"{}\" has an empty member code",
                    team.name
                )));
            }
            seen.push(name);
        }
        Ok(())
    }

    /// Look up a team by name (case-insensitive).
    pub fn team(&self, name: &str) -> Result<&TeamConfig> {
        self.teams
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| AuditError::UnknownTeam(name.to_string()))
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
