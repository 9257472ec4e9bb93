mod bootstrap;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use audit_core::settings::{MetricsConfig, Settings};
use audit_core::time_utils::resolve_timezone;
use audit_data::analysis::{load_event_log, ReportService};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("audit-metrics v{} starting", env!("CARGO_PKG_VERSION"));

    let config_path = settings.config_path();
    if settings.init_config {
        MetricsConfig::default().save_to(&config_path)?;
        tracing::info!("Wrote default configuration to {}", config_path.display());
        println!("{}", config_path.display());
        return Ok(());
    }

    let config = MetricsConfig::load_from(&config_path);
    config.validate()?;
    let tz = resolve_timezone(settings.timezone.as_deref().unwrap_or(config.timezone.as_str()));
    let now = bootstrap::reference_time(settings.now.as_deref(), tz)?;
    let Some(data_path) = bootstrap::resolve_data_path(settings.data_path.as_ref()) else {
        bail!("no history data found: pass --data-path or set AUDIT_METRICS_DATA_PATH");
    };

    tracing::info!(
        "View: {}, timezone: {}, reference time: {}",
        settings.view,
        tz,
        now.to_rfc3339()
    );

    // CPU-bound; runs on the blocking pool.
    let job = tokio::task::spawn_blocking(move || run_view(&settings, &data_path, config, tz, now));

    tokio::select! {
        result = job => {
            let output = result.context("report task failed")??;
            println!("{}", output);
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received; abandoning report");
        }
    }

    Ok(())
}

/// Load the snapshot and render the requested view as pretty JSON.
fn run_view(
    settings: &Settings,
    data_path: &Path,
    config: MetricsConfig,
    tz: Tz,
    now: DateTime<Utc>,
) -> Result<String> {
    let normalized = load_event_log(data_path, &config, tz)?;
    tracing::debug!("normalisation: {:?}", normalized.stats);
    let service = ReportService::new(Arc::new(normalized.log), config, tz, now);

    let report = match settings.view.as_str() {
        "user" => {
            let user = settings
                .user
                .as_deref()
                .context("--user is required for the user view")?;
            let report = service.user_report(user, settings.team.as_deref(), settings.days)?;
            serde_json::to_value(report)?
        }
        "all-users" => serde_json::to_value(service.all_users_monthly())?,
        "working-days" => {
            serde_json::to_value(service.last_working_days(settings.working_days as usize))?
        }
        "lookup" => {
            let declaration = settings
                .declaration
                .as_deref()
                .context("--declaration is required for the lookup view")?;
            serde_json::to_value(service.declaration_lookup(declaration))?
        }
        unknown => bail!("Unknown view mode: {}", unknown),
    };

    Ok(serde_json::to_string_pretty(&report)?)
}
