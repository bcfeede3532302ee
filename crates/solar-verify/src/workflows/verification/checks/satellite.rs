use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::super::domain::Coordinates;
use super::handle::LazyHandle;
use super::{
    CheckError, CheckKind, CheckProvider, CheckResult, QcStatus, SatelliteFinding,
    SatelliteInput,
};

/// How far before submission the pre-installation imagery window opens.
pub const PRE_INSTALL_LOOKBACK_DAYS: i64 = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageryPhase {
    PreInstall,
    PostInstall,
}

/// Acquisition window requested from the imagery provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageryWindow {
    pub phase: ImageryPhase,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Overhead scene returned by the imagery provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Imagery {
    pub phase: ImageryPhase,
    pub content: Vec<u8>,
    pub source: String,
    pub captured_on: Option<String>,
}

/// Output of the panel detection model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelDetection {
    pub panel_count: u32,
    pub mean_confidence: f64,
    pub area_sqm: f64,
}

/// Satellite/aerial imagery retrieval collaborator. `Ok(None)` means no usable scene.
#[async_trait]
pub trait ImageryService: Send + Sync {
    async fn fetch(
        &self,
        site: Coordinates,
        window: ImageryWindow,
    ) -> Result<Option<Imagery>, CheckError>;
}

/// Object-detection model inference.
pub trait PanelDetector: Send + Sync {
    fn detect(&self, imagery: &Imagery) -> Result<PanelDetection, CheckError>;
}

/// Tier-2 check comparing pre/post installation panel counts with the declared count.
pub struct SatellitePanelDeltaCheck {
    imagery: Arc<dyn ImageryService>,
    detector: Arc<LazyHandle<dyn PanelDetector>>,
}

impl SatellitePanelDeltaCheck {
    pub fn new(
        imagery: Arc<dyn ImageryService>,
        detector: Arc<LazyHandle<dyn PanelDetector>>,
    ) -> Self {
        Self { imagery, detector }
    }

    fn not_verifiable(
        declared: u32,
        pre_count: u32,
        reasoning: &str,
    ) -> Result<CheckResult, CheckError> {
        Ok(CheckResult::SatellitePanelDelta(SatelliteFinding {
            score: 0.0,
            reasoning: reasoning.to_string(),
            declared_panel_count: declared,
            pre_install_panel_count: pre_count,
            post_install_panel_count: 0,
            detector_confidence: 0.0,
            pv_area_sqm: 0.0,
            qc_status: QcStatus::NotVerifiable,
        }))
    }
}

fn score_panel_delta(pre: u32, post: u32, declared: u32, area_sqm: f64) -> (f64, String) {
    if post == 0 {
        return (
            0.0,
            "No panels detected in the post-installation image.".to_string(),
        );
    }
    if pre > post {
        return (
            0.1,
            format!("Suspicious activity: panel count decreased from {pre} to {post}."),
        );
    }

    let difference = post.abs_diff(declared);
    if difference <= 2 {
        (
            1.0,
            format!(
                "Panel count verified. Detected: {post}, Declared: {declared}. Estimated area: {area_sqm:.2} sqm."
            ),
        )
    } else if difference <= 10 {
        (
            0.8,
            format!(
                "Panel count is close. Detected: {post}, Declared: {declared}. Estimated area: {area_sqm:.2} sqm."
            ),
        )
    } else {
        (
            0.5,
            format!(
                "Significant panel count mismatch. Detected: {post}, Declared: {declared}. Estimated area: {area_sqm:.2} sqm."
            ),
        )
    }
}

#[async_trait]
impl CheckProvider for SatellitePanelDeltaCheck {
    type Input = SatelliteInput;

    fn kind(&self) -> CheckKind {
        CheckKind::SatellitePanelDelta
    }

    async fn evaluate(&self, input: SatelliteInput) -> Result<CheckResult, CheckError> {
        let declared = input.declared_panel_count;
        let detector = self.detector.get()?;

        let pre_window = ImageryWindow {
            phase: ImageryPhase::PreInstall,
            from: input.submitted_at - Duration::days(PRE_INSTALL_LOOKBACK_DAYS),
            to: input.submitted_at,
        };
        let Some(pre_image) = self.imagery.fetch(input.position, pre_window).await? else {
            return Self::not_verifiable(
                declared,
                0,
                "Pre-installation image fetch failed. Likely heavy cloud cover or no data.",
            );
        };
        let pre = detector.detect(&pre_image)?;

        let post_window = ImageryWindow {
            phase: ImageryPhase::PostInstall,
            from: input.submitted_at,
            to: input.requested_at.max(input.submitted_at),
        };
        let Some(post_image) = self.imagery.fetch(input.position, post_window).await? else {
            return Self::not_verifiable(
                declared,
                pre.panel_count,
                "Post-installation image fetch failed. Cannot confirm installation.",
            );
        };
        let post = detector.detect(&post_image)?;

        let (score, reasoning) =
            score_panel_delta(pre.panel_count, post.panel_count, declared, post.area_sqm);

        Ok(CheckResult::SatellitePanelDelta(SatelliteFinding {
            score,
            reasoning,
            declared_panel_count: declared,
            pre_install_panel_count: pre.panel_count,
            post_install_panel_count: post.panel_count,
            detector_confidence: post.mean_confidence,
            pv_area_sqm: post.area_sqm,
            qc_status: QcStatus::Verifiable,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct Scenes {
        pre: bool,
        post: bool,
    }

    #[async_trait]
    impl ImageryService for Scenes {
        async fn fetch(
            &self,
            _site: Coordinates,
            window: ImageryWindow,
        ) -> Result<Option<Imagery>, CheckError> {
            let available = match window.phase {
                ImageryPhase::PreInstall => self.pre,
                ImageryPhase::PostInstall => self.post,
            };
            Ok(available.then(|| Imagery {
                phase: window.phase,
                content: vec![0_u8; 16],
                source: "fixture".to_string(),
                captured_on: None,
            }))
        }
    }

    struct Counts {
        pre: u32,
        post: u32,
    }

    impl PanelDetector for Counts {
        fn detect(&self, imagery: &Imagery) -> Result<PanelDetection, CheckError> {
            let panel_count = match imagery.phase {
                ImageryPhase::PreInstall => self.pre,
                ImageryPhase::PostInstall => self.post,
            };
            Ok(PanelDetection {
                panel_count,
                mean_confidence: 0.9,
                area_sqm: panel_count as f64 * 1.7,
            })
        }
    }

    fn check(scenes: Scenes, counts: Counts) -> SatellitePanelDeltaCheck {
        let detector: Arc<dyn PanelDetector> = Arc::new(counts);
        SatellitePanelDeltaCheck::new(
            Arc::new(scenes),
            Arc::new(LazyHandle::ready("panel-detector", detector)),
        )
    }

    fn input(declared: u32) -> SatelliteInput {
        let submitted_at = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        SatelliteInput {
            position: Coordinates {
                latitude: 12.9716,
                longitude: 77.5946,
            },
            declared_panel_count: declared,
            submitted_at,
            requested_at: submitted_at + Duration::days(3),
        }
    }

    #[test]
    fn panel_delta_bands_match_the_scoring_table() {
        assert_eq!(score_panel_delta(0, 0, 10, 0.0).0, 0.0);
        assert_eq!(score_panel_delta(12, 8, 10, 0.0).0, 0.1);
        assert_eq!(score_panel_delta(0, 12, 10, 0.0).0, 1.0);
        assert_eq!(score_panel_delta(0, 18, 10, 0.0).0, 0.8);
        assert_eq!(score_panel_delta(0, 30, 10, 0.0).0, 0.5);
        assert!(score_panel_delta(0, 30, 10, 0.0).1.contains("panel count mismatch"));
    }

    #[tokio::test]
    async fn matching_post_install_count_verifies() {
        let result = check(
            Scenes {
                pre: true,
                post: true,
            },
            Counts { pre: 0, post: 10 },
        )
        .evaluate(input(10))
        .await
        .expect("evaluates");

        let CheckResult::SatellitePanelDelta(finding) = result else {
            panic!("unexpected variant");
        };
        assert_eq!(finding.score, 1.0);
        assert_eq!(finding.post_install_panel_count, 10);
        assert_eq!(finding.qc_status, QcStatus::Verifiable);
    }

    #[tokio::test]
    async fn missing_post_scene_is_not_verifiable() {
        let result = check(
            Scenes {
                pre: true,
                post: false,
            },
            Counts { pre: 2, post: 10 },
        )
        .evaluate(input(10))
        .await
        .expect("evaluates");

        let CheckResult::SatellitePanelDelta(finding) = result else {
            panic!("unexpected variant");
        };
        assert_eq!(finding.score, 0.0);
        assert_eq!(finding.pre_install_panel_count, 2);
        assert_eq!(finding.qc_status, QcStatus::NotVerifiable);
    }

    #[tokio::test]
    async fn unavailable_model_surfaces_as_provider_error() {
        let check = SatellitePanelDeltaCheck::new(
            Arc::new(Scenes {
                pre: true,
                post: true,
            }),
            Arc::new(LazyHandle::new("panel-detector", || {
                Err("weights file missing".to_string())
            })),
        );

        let error = check.evaluate(input(10)).await.expect_err("model missing");
        assert!(matches!(error, CheckError::Unavailable(_)));
    }
}
