use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::workflows::verification::{
    CheckKind, PipelineSettings, ThresholdError, Thresholds, WeightConfig, WeightConfigError,
};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub verification: VerificationConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            verification: VerificationConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Scoring weights, decision thresholds and deadlines for the verification pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerificationConfig {
    pub pipeline: PipelineSettings,
    /// Maximum distance between evidence GPS and declared coordinates that still matches.
    pub gps_tolerance_meters: f64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineSettings::default(),
            gps_tolerance_meters: 100.0,
        }
    }
}

impl VerificationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let weights = defaults.pipeline.weights;
        let thresholds = defaults.pipeline.thresholds;

        let weights = WeightConfig::new(
            number("VERIFY_WEIGHT_GPS", weights.weight(CheckKind::LocationProximity))?,
            number("VERIFY_WEIGHT_SHADOW", weights.weight(CheckKind::ShadowForensics))?,
            number("VERIFY_WEIGHT_SATELLITE", weights.weight(CheckKind::SatellitePanelDelta))?,
            number("VERIFY_WEIGHT_EQUIPMENT", weights.weight(CheckKind::EquipmentSerial))?,
        )
        .map_err(ConfigError::InvalidWeights)?;

        let thresholds = Thresholds::new(
            number("VERIFY_APPROVE_THRESHOLD", thresholds.approve())?,
            number("VERIFY_REVIEW_THRESHOLD", thresholds.review())?,
        )
        .map_err(ConfigError::InvalidThresholds)?;

        let pipeline = PipelineSettings {
            weights,
            thresholds,
            check_timeout: seconds(
                "VERIFY_CHECK_TIMEOUT_SECS",
                defaults.pipeline.check_timeout,
            )?,
            pipeline_timeout: seconds(
                "VERIFY_PIPELINE_TIMEOUT_SECS",
                defaults.pipeline.pipeline_timeout,
            )?,
            notification_timeout: seconds(
                "VERIFY_NOTIFICATION_TIMEOUT_SECS",
                defaults.pipeline.notification_timeout,
            )?,
        };
        if pipeline.check_timeout >= pipeline.pipeline_timeout {
            return Err(ConfigError::CheckOutlastsPipeline {
                check: pipeline.check_timeout,
                pipeline: pipeline.pipeline_timeout,
            });
        }

        let gps_tolerance_meters =
            number("VERIFY_GPS_TOLERANCE_METERS", defaults.gps_tolerance_meters)?;
        if !gps_tolerance_meters.is_finite() || gps_tolerance_meters < 0.0 {
            return Err(ConfigError::InvalidNumber {
                key: "VERIFY_GPS_TOLERANCE_METERS",
                value: gps_tolerance_meters.to_string(),
            });
        }

        Ok(Self {
            pipeline,
            gps_tolerance_meters,
        })
    }
}

fn number<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
            key,
            value: raw.clone(),
        }),
        Err(_) => Ok(default),
    }
}

fn seconds(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    let secs = number(key, default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::InvalidNumber {
            key,
            value: "0".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str, value: String },
    InvalidWeights(WeightConfigError),
    InvalidThresholds(ThresholdError),
    CheckOutlastsPipeline { check: Duration, pipeline: Duration },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} has an invalid value '{value}'")
            }
            ConfigError::InvalidWeights(err) => write!(f, "VERIFY_WEIGHT_*: {err}"),
            ConfigError::InvalidThresholds(err) => write!(f, "VERIFY_*_THRESHOLD: {err}"),
            ConfigError::CheckOutlastsPipeline { check, pipeline } => write!(
                f,
                "VERIFY_CHECK_TIMEOUT_SECS ({}s) must be shorter than VERIFY_PIPELINE_TIMEOUT_SECS ({}s)",
                check.as_secs(),
                pipeline.as_secs()
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::CheckOutlastsPipeline { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidWeights(err) => Some(err),
            ConfigError::InvalidThresholds(err) => Some(err),
        }
    }
}
