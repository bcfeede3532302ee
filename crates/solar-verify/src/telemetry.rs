use crate::config::TelemetryConfig;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

/// Target the verification pipeline logs under. When the global level is quieter than `warn`
/// it is raised back to `warn` so degraded checks and pipeline faults stay visible.
const PIPELINE_TARGET: &str = "solar_verify::workflows::verification";

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log level/filter '{value}': unable to build EnvFilter")]
    EnvFilter {
        value: String,
        #[source]
        source: ParseError,
    },
    #[error("telemetry error: {0}")]
    Subscriber(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Filter for the configured level. `RUST_LOG`, when set and valid, takes precedence.
pub fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    level_filter(&config.log_level)
}

fn level_filter(log_level: &str) -> Result<EnvFilter, TelemetryError> {
    let filter = EnvFilter::try_new(log_level).map_err(|source| TelemetryError::EnvFilter {
        value: log_level.to_string(),
        source,
    })?;

    let quiet = matches!(
        log_level.trim().to_ascii_lowercase().as_str(),
        "off" | "error"
    );
    if !quiet || log_level.contains(PIPELINE_TARGET) {
        return Ok(filter);
    }

    let directive = format!("{PIPELINE_TARGET}=warn")
        .parse()
        .map_err(|source| TelemetryError::EnvFilter {
            value: log_level.to_string(),
            source,
        })?;
    Ok(filter.add_directive(directive))
}

pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config)?)
        .with_target(true)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}
