use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::super::domain::Coordinates;
use super::handle::LazyHandle;
use super::{CheckError, CheckKind, CheckProvider, CheckResult, ShadowFinding, ShadowInput};

/// Apparent sun position in degrees (azimuth clockwise from north).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunPosition {
    pub azimuth: f64,
    pub elevation: f64,
}

/// Solar-position astronomy collaborator.
pub trait SolarPositionModel: Send + Sync {
    fn position(&self, at: DateTime<Utc>, site: Coordinates) -> Result<SunPosition, CheckError>;
}

/// Image-processing collaborator that measures the dominant shadow angle in a photo.
#[async_trait]
pub trait ShadowDetector: Send + Sync {
    async fn detect_angle(&self, photo_key: &str) -> Result<f64, CheckError>;
}

/// Tier-2 check that needs the capture time derived by the location check.
pub struct ShadowForensicsCheck {
    sun: Arc<dyn SolarPositionModel>,
    detector: Arc<LazyHandle<dyn ShadowDetector>>,
}

impl ShadowForensicsCheck {
    pub fn new(
        sun: Arc<dyn SolarPositionModel>,
        detector: Arc<LazyHandle<dyn ShadowDetector>>,
    ) -> Self {
        Self { sun, detector }
    }
}

/// Smallest absolute difference between two bearings, in `[0, 180]`.
fn angular_difference(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(360.0);
    diff.min(360.0 - diff)
}

#[async_trait]
impl CheckProvider for ShadowForensicsCheck {
    type Input = ShadowInput;

    fn kind(&self) -> CheckKind {
        CheckKind::ShadowForensics
    }

    async fn evaluate(&self, input: ShadowInput) -> Result<CheckResult, CheckError> {
        let capture_time = input.capture_time.ok_or_else(|| {
            CheckError::InvalidInput("capture time unavailable from location evidence".to_string())
        })?;
        let sun = self.sun.position(capture_time, input.position)?;
        let detector = self.detector.get()?;
        let detected = detector.detect_angle(&input.photo_key).await?;

        let difference = angular_difference(sun.azimuth, detected);
        let (score, reasoning) = if difference < 10.0 {
            (
                1.0,
                format!("Shadow angle matches solar position within {difference:.2} degrees."),
            )
        } else if difference < 30.0 {
            (
                0.7,
                format!(
                    "Shadow angle deviated significantly ({difference:.2} degrees). Possible tampering or measurement error."
                ),
            )
        } else {
            (
                0.2,
                format!(
                    "Major shadow angle mismatch ({difference:.2} degrees). Capture time or location likely altered."
                ),
            )
        };

        Ok(CheckResult::ShadowForensics(ShadowFinding {
            score,
            reasoning,
            expected_sun_azimuth: Some(sun.azimuth),
            expected_sun_elevation: Some(sun.elevation),
            detected_shadow_angle: Some(detected),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct FixedSun(f64);

    impl SolarPositionModel for FixedSun {
        fn position(&self, _at: DateTime<Utc>, _site: Coordinates) -> Result<SunPosition, CheckError> {
            Ok(SunPosition {
                azimuth: self.0,
                elevation: 45.0,
            })
        }
    }

    struct FixedAngle(f64);

    #[async_trait]
    impl ShadowDetector for FixedAngle {
        async fn detect_angle(&self, _photo_key: &str) -> Result<f64, CheckError> {
            Ok(self.0)
        }
    }

    fn check(azimuth: f64, detected: f64) -> ShadowForensicsCheck {
        let detector: Arc<dyn ShadowDetector> = Arc::new(FixedAngle(detected));
        ShadowForensicsCheck::new(
            Arc::new(FixedSun(azimuth)),
            Arc::new(LazyHandle::ready("shadow-detector", detector)),
        )
    }

    fn input(capture_time: Option<DateTime<Utc>>) -> ShadowInput {
        ShadowInput {
            photo_key: "uploads/wide.jpg".to_string(),
            position: Coordinates {
                latitude: 12.9716,
                longitude: 77.5946,
            },
            capture_time,
        }
    }

    fn noon() -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2025, 3, 14, 6, 30, 0).unwrap())
    }

    #[tokio::test]
    async fn scores_follow_angle_bands() {
        for (detected, expected) in [(184.0, 1.0), (200.0, 0.7), (260.0, 0.2)] {
            let result = check(180.0, detected)
                .evaluate(input(noon()))
                .await
                .expect("evaluates");
            assert_eq!(result.score(), expected, "detected angle {detected}");
        }
    }

    #[tokio::test]
    async fn bearings_wrap_around_north() {
        let result = check(355.0, 3.0)
            .evaluate(input(noon()))
            .await
            .expect("evaluates");
        assert_eq!(result.score(), 1.0);
    }

    #[tokio::test]
    async fn missing_capture_time_is_invalid_input() {
        let error = check(180.0, 180.0)
            .evaluate(input(None))
            .await
            .expect_err("needs a capture time");
        assert!(matches!(error, CheckError::InvalidInput(_)));
    }

    #[test]
    fn angular_difference_is_symmetric_and_bounded() {
        assert_eq!(angular_difference(10.0, 350.0), 20.0);
        assert_eq!(angular_difference(350.0, 10.0), 20.0);
        assert_eq!(angular_difference(0.0, 180.0), 180.0);
    }
}
