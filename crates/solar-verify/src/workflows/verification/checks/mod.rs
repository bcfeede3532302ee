//! Evidence check contract and the typed findings each check produces.
//!
//! Providers wrap external analysis collaborators (photo metadata, solar geometry, satellite
//! imagery, OCR). They may fail; the coordinator converts every failure into a degraded
//! finding so no provider can abort a verification run.

mod equipment;
mod geo;
mod handle;
mod location;
mod satellite;
mod shadow;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::Coordinates;

pub use equipment::{
    ApprovedEquipment, EquipmentRegistry, EquipmentSerialCheck, SerialReader,
    StaticEquipmentRegistry,
};
pub use geo::haversine_meters;
pub use handle::LazyHandle;
pub use location::{LocationProximityCheck, PhotoMetadata, PhotoMetadataReader};
pub use satellite::{
    Imagery, ImageryPhase, ImageryService, ImageryWindow, PanelDetection, PanelDetector,
    SatellitePanelDeltaCheck, PRE_INSTALL_LOOKBACK_DAYS,
};
pub use shadow::{ShadowDetector, ShadowForensicsCheck, SolarPositionModel, SunPosition};

/// The four evidence checks, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    LocationProximity,
    ShadowForensics,
    SatellitePanelDelta,
    EquipmentSerial,
}

impl CheckKind {
    pub const ALL: [CheckKind; 4] = [
        CheckKind::LocationProximity,
        CheckKind::ShadowForensics,
        CheckKind::SatellitePanelDelta,
        CheckKind::EquipmentSerial,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            CheckKind::LocationProximity => "location-proximity",
            CheckKind::ShadowForensics => "shadow-forensics",
            CheckKind::SatellitePanelDelta => "satellite-panel-delta",
            CheckKind::EquipmentSerial => "equipment-serial",
        }
    }

    /// Short key used by weight configuration.
    pub const fn weight_key(self) -> &'static str {
        match self {
            CheckKind::LocationProximity => "gps",
            CheckKind::ShadowForensics => "shadow",
            CheckKind::SatellitePanelDelta => "satellite",
            CheckKind::EquipmentSerial => "equipment",
        }
    }
}

/// Failure kinds a provider may report.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CheckError {
    #[error("provider timed out after {0:?}")]
    Timeout(Duration),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Output of a single check run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckResult {
    LocationProximity(LocationFinding),
    ShadowForensics(ShadowFinding),
    SatellitePanelDelta(SatelliteFinding),
    EquipmentSerial(EquipmentFinding),
}

impl CheckResult {
    pub fn kind(&self) -> CheckKind {
        match self {
            CheckResult::LocationProximity(_) => CheckKind::LocationProximity,
            CheckResult::ShadowForensics(_) => CheckKind::ShadowForensics,
            CheckResult::SatellitePanelDelta(_) => CheckKind::SatellitePanelDelta,
            CheckResult::EquipmentSerial(_) => CheckKind::EquipmentSerial,
        }
    }

    pub fn score(&self) -> f64 {
        match self {
            CheckResult::LocationProximity(finding) => finding.score,
            CheckResult::ShadowForensics(finding) => finding.score,
            CheckResult::SatellitePanelDelta(finding) => finding.score,
            CheckResult::EquipmentSerial(finding) => finding.score,
        }
    }

    pub fn reasoning(&self) -> &str {
        match self {
            CheckResult::LocationProximity(finding) => &finding.reasoning,
            CheckResult::ShadowForensics(finding) => &finding.reasoning,
            CheckResult::SatellitePanelDelta(finding) => &finding.reasoning,
            CheckResult::EquipmentSerial(finding) => &finding.reasoning,
        }
    }
}

/// Typed view over one `CheckResult` variant.
pub trait Finding: Sized + Send + 'static {
    const KIND: CheckKind;

    /// Substitute result for a failed, timed-out or misbehaving provider.
    fn degraded(reasoning: String) -> Self;

    fn from_result(result: CheckResult) -> Option<Self>;

    fn into_result(self) -> CheckResult;

    fn score(&self) -> f64;

    fn with_score(self, score: f64) -> Self;
}

/// Clamp a provider score into `[0.0, 1.0]`; non-finite values become `0.0`.
pub fn bounded_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Location proximity: evidence GPS against declared coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationFinding {
    pub score: f64,
    pub reasoning: String,
    pub detected: Option<Coordinates>,
    pub deviation_meters: Option<f64>,
    /// Capture time derived from the evidence; consumed by the shadow check.
    pub capture_time: Option<DateTime<Utc>>,
}

/// Shadow forensics: expected sun azimuth against the detected shadow angle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowFinding {
    pub score: f64,
    pub reasoning: String,
    pub expected_sun_azimuth: Option<f64>,
    pub expected_sun_elevation: Option<f64>,
    pub detected_shadow_angle: Option<f64>,
}

/// Whether satellite imagery was usable for the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QcStatus {
    Verifiable,
    NotVerifiable,
}

/// Satellite panel delta: pre/post installation imagery against the declared count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteFinding {
    pub score: f64,
    pub reasoning: String,
    pub declared_panel_count: u32,
    pub pre_install_panel_count: u32,
    pub post_install_panel_count: u32,
    pub detector_confidence: f64,
    pub pv_area_sqm: f64,
    pub qc_status: QcStatus,
}

/// Equipment serials: OCR output against the approved-equipment registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentFinding {
    pub score: f64,
    pub reasoning: String,
    pub detected_serials: Vec<String>,
    pub verified_serials: Vec<String>,
}

macro_rules! finding_variant {
    ($finding:ty, $variant:ident) => {
        impl Finding for $finding {
            const KIND: CheckKind = CheckKind::$variant;

            fn degraded(reasoning: String) -> Self {
                Self::unscored(reasoning)
            }

            fn from_result(result: CheckResult) -> Option<Self> {
                match result {
                    CheckResult::$variant(finding) => Some(finding),
                    _ => None,
                }
            }

            fn into_result(self) -> CheckResult {
                CheckResult::$variant(self)
            }

            fn score(&self) -> f64 {
                self.score
            }

            fn with_score(mut self, score: f64) -> Self {
                self.score = score;
                self
            }
        }
    };
}

finding_variant!(LocationFinding, LocationProximity);
finding_variant!(ShadowFinding, ShadowForensics);
finding_variant!(SatelliteFinding, SatellitePanelDelta);
finding_variant!(EquipmentFinding, EquipmentSerial);

impl LocationFinding {
    fn unscored(reasoning: String) -> Self {
        Self {
            score: 0.0,
            reasoning,
            detected: None,
            deviation_meters: None,
            capture_time: None,
        }
    }
}

impl ShadowFinding {
    fn unscored(reasoning: String) -> Self {
        Self {
            score: 0.0,
            reasoning,
            expected_sun_azimuth: None,
            expected_sun_elevation: None,
            detected_shadow_angle: None,
        }
    }
}

impl SatelliteFinding {
    fn unscored(reasoning: String) -> Self {
        Self {
            score: 0.0,
            reasoning,
            declared_panel_count: 0,
            pre_install_panel_count: 0,
            post_install_panel_count: 0,
            detector_confidence: 0.0,
            pv_area_sqm: 0.0,
            qc_status: QcStatus::NotVerifiable,
        }
    }
}

impl EquipmentFinding {
    fn unscored(reasoning: String) -> Self {
        Self {
            score: 0.0,
            reasoning,
            detected_serials: Vec::new(),
            verified_serials: Vec::new(),
        }
    }
}

/// Tier-1 input.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationInput {
    pub declared: Coordinates,
    pub measured: Option<Coordinates>,
    pub photo_key: String,
}

/// Tier-2 shadow input; `capture_time` comes from the Tier-1 finding.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowInput {
    pub photo_key: String,
    pub position: Coordinates,
    pub capture_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SatelliteInput {
    pub position: Coordinates,
    pub declared_panel_count: u32,
    pub submitted_at: DateTime<Utc>,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EquipmentInput {
    pub serial_photo_key: String,
}

/// Contract every evidence check implements.
///
/// Implementations must not hold shared mutable state across concurrent invocations; any
/// model handle they need is injected at construction.
#[async_trait]
pub trait CheckProvider: Send + Sync {
    type Input: Send + 'static;

    fn kind(&self) -> CheckKind;

    async fn evaluate(&self, input: Self::Input) -> Result<CheckResult, CheckError>;
}

/// One finding per check kind; the coordinator always produces all four.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckSet {
    pub location: LocationFinding,
    pub shadow: ShadowFinding,
    pub satellite: SatelliteFinding,
    pub equipment: EquipmentFinding,
}

impl CheckSet {
    /// Every check degraded with the same cause.
    pub fn degraded(reasoning: &str) -> Self {
        Self {
            location: LocationFinding::degraded(reasoning.to_string()),
            shadow: ShadowFinding::degraded(reasoning.to_string()),
            satellite: SatelliteFinding::degraded(reasoning.to_string()),
            equipment: EquipmentFinding::degraded(reasoning.to_string()),
        }
    }

    pub fn score(&self, kind: CheckKind) -> f64 {
        match kind {
            CheckKind::LocationProximity => self.location.score,
            CheckKind::ShadowForensics => self.shadow.score,
            CheckKind::SatellitePanelDelta => self.satellite.score,
            CheckKind::EquipmentSerial => self.equipment.score,
        }
    }

    pub fn reasoning(&self, kind: CheckKind) -> &str {
        match kind {
            CheckKind::LocationProximity => &self.location.reasoning,
            CheckKind::ShadowForensics => &self.shadow.reasoning,
            CheckKind::SatellitePanelDelta => &self.satellite.reasoning,
            CheckKind::EquipmentSerial => &self.equipment.reasoning,
        }
    }

    pub fn results(&self) -> Vec<CheckResult> {
        vec![
            self.location.clone().into_result(),
            self.shadow.clone().into_result(),
            self.satellite.clone().into_result(),
            self.equipment.clone().into_result(),
        ]
    }
}
