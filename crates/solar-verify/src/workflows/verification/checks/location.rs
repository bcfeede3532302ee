use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::super::domain::Coordinates;
use super::geo::haversine_meters;
use super::{CheckError, CheckKind, CheckProvider, CheckResult, LocationFinding, LocationInput};

/// Metadata extracted from a stored photo (EXIF or equivalent).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PhotoMetadata {
    pub gps: Option<Coordinates>,
    pub captured_at: Option<DateTime<Utc>>,
}

/// External collaborator that reads embedded photo metadata.
#[async_trait]
pub trait PhotoMetadataReader: Send + Sync {
    async fn read(&self, photo_key: &str) -> Result<PhotoMetadata, CheckError>;
}

/// Tier-1 check comparing evidence-derived GPS with the declared installation site.
pub struct LocationProximityCheck {
    reader: Arc<dyn PhotoMetadataReader>,
    tolerance_meters: f64,
}

impl LocationProximityCheck {
    pub fn new(reader: Arc<dyn PhotoMetadataReader>, tolerance_meters: f64) -> Self {
        Self {
            reader,
            tolerance_meters,
        }
    }
}

#[async_trait]
impl CheckProvider for LocationProximityCheck {
    type Input = LocationInput;

    fn kind(&self) -> CheckKind {
        CheckKind::LocationProximity
    }

    async fn evaluate(&self, input: LocationInput) -> Result<CheckResult, CheckError> {
        let metadata = self.reader.read(&input.photo_key).await?;

        // Embedded GPS wins; the on-site measurement is the fallback.
        let detected = metadata.gps.or(input.measured).ok_or_else(|| {
            CheckError::InvalidInput("no GPS position in photo metadata or request".to_string())
        })?;
        detected.validate().map_err(|err| CheckError::InvalidInput(err.to_string()))?;

        let deviation = haversine_meters(input.declared, detected);
        let (score, reasoning) = if deviation <= self.tolerance_meters {
            (
                1.0,
                format!("GPS location verified. Deviation: {deviation:.2}m."),
            )
        } else {
            (
                0.0,
                format!(
                    "GPS mismatch detected. Deviation: {deviation:.2}m exceeds {:.0}m threshold.",
                    self.tolerance_meters
                ),
            )
        };

        Ok(CheckResult::LocationProximity(LocationFinding {
            score,
            reasoning,
            detected: Some(detected),
            deviation_meters: Some(deviation),
            capture_time: metadata.captured_at,
        }))
    }
}
