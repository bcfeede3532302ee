use serde::{Deserialize, Serialize};

use super::checks::{CheckKind, CheckSet, QcStatus};
use super::domain::ApplicationStatus;
use super::scoring::WeightConfig;

/// Classification of an aggregated confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    AutoApprove,
    ManualReview,
    AutoReject,
}

impl Decision {
    pub const fn status(self) -> ApplicationStatus {
        match self {
            Decision::AutoApprove => ApplicationStatus::Approved,
            Decision::ManualReview => ApplicationStatus::ManualReview,
            Decision::AutoReject => ApplicationStatus::Rejected,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Decision::AutoApprove => "auto_approve",
            Decision::ManualReview => "manual_review",
            Decision::AutoReject => "auto_reject",
        }
    }
}

/// Decision thresholds; `approve` is strictly greater than `review`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    approve: f64,
    review: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThresholdError {
    #[error("thresholds must lie within [0, 1] (approve {approve}, review {review})")]
    OutOfRange { approve: f64, review: f64 },
    #[error("approve threshold {approve} must be greater than review threshold {review}")]
    NotOrdered { approve: f64, review: f64 },
}

impl Thresholds {
    pub fn new(approve: f64, review: f64) -> Result<Self, ThresholdError> {
        let in_range = |value: f64| value.is_finite() && (0.0..=1.0).contains(&value);
        if !in_range(approve) || !in_range(review) {
            return Err(ThresholdError::OutOfRange { approve, review });
        }
        if approve <= review {
            return Err(ThresholdError::NotOrdered { approve, review });
        }
        Ok(Self { approve, review })
    }

    pub fn approve(&self) -> f64 {
        self.approve
    }

    pub fn review(&self) -> f64 {
        self.review
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            approve: 0.85,
            review: 0.60,
        }
    }
}

/// Decision plus the status it maps to and a canned explanation.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub decision: Decision,
    pub status: ApplicationStatus,
    pub reasoning: String,
}

/// Classifies confidence scores against the configured thresholds.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionEngine {
    thresholds: Thresholds,
}

impl DecisionEngine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Both bounds are inclusive on the upper side: `confidence == approve` approves and
    /// `confidence == review` goes to manual review.
    pub fn classify(&self, confidence: f64) -> Decision {
        if confidence >= self.thresholds.approve {
            Decision::AutoApprove
        } else if confidence < self.thresholds.review {
            Decision::AutoReject
        } else {
            Decision::ManualReview
        }
    }

    pub fn decide(&self, confidence: f64, checks: &CheckSet, weights: &WeightConfig) -> Verdict {
        let decision = self.classify(confidence);
        let reasoning = match decision {
            Decision::AutoApprove => {
                let mut text = format!(
                    "High confidence score ({confidence:.4}); all major checks passed verification."
                );
                if let Some(kind) = dominant_passing(checks, weights) {
                    text.push_str(&format!(" Strongest evidence: {}.", passing_label(kind)));
                }
                text
            }
            Decision::ManualReview => {
                let mut text = format!("Flagged for manual review ({confidence:.4}).");
                if let Some(kind) = dominant_failing(checks, weights) {
                    text.push_str(&format!(
                        " Dominant failing factor: {}.",
                        failing_label(kind, checks)
                    ));
                }
                text
            }
            Decision::AutoReject => {
                let mut text = format!(
                    "Low confidence score ({confidence:.4}) due to major failures in multiple checks."
                );
                if let Some(kind) = dominant_failing(checks, weights) {
                    text.push_str(&format!(
                        " Dominant failing factor: {}.",
                        failing_label(kind, checks)
                    ));
                }
                text
            }
        };

        Verdict {
            decision,
            status: decision.status(),
            reasoning,
        }
    }
}

/// Check with the largest weighted shortfall; ties resolve to report order.
fn dominant_failing(checks: &CheckSet, weights: &WeightConfig) -> Option<CheckKind> {
    let mut best: Option<(CheckKind, f64)> = None;
    for kind in CheckKind::ALL {
        let shortfall = weights.weight(kind) * (1.0 - checks.score(kind));
        if shortfall <= 0.0 {
            continue;
        }
        if best.map_or(true, |(_, current)| shortfall > current) {
            best = Some((kind, shortfall));
        }
    }
    best.map(|(kind, _)| kind)
}

/// Check with the largest weighted contribution; ties resolve to report order.
fn dominant_passing(checks: &CheckSet, weights: &WeightConfig) -> Option<CheckKind> {
    let mut best: Option<(CheckKind, f64)> = None;
    for kind in CheckKind::ALL {
        let contribution = weights.weight(kind) * checks.score(kind);
        if contribution <= 0.0 {
            continue;
        }
        if best.map_or(true, |(_, current)| contribution > current) {
            best = Some((kind, contribution));
        }
    }
    best.map(|(kind, _)| kind)
}

fn failing_label(kind: CheckKind, checks: &CheckSet) -> &'static str {
    match kind {
        CheckKind::LocationProximity => "GPS mismatch",
        CheckKind::ShadowForensics => "shadow angle mismatch",
        CheckKind::SatellitePanelDelta if checks.satellite.qc_status == QcStatus::NotVerifiable => {
            "satellite imagery unavailable"
        }
        CheckKind::SatellitePanelDelta if checks.satellite.post_install_panel_count == 0 => {
            "no panels detected"
        }
        CheckKind::SatellitePanelDelta => "panel count mismatch",
        CheckKind::EquipmentSerial => "unverified equipment serials",
    }
}

fn passing_label(kind: CheckKind) -> &'static str {
    match kind {
        CheckKind::LocationProximity => "GPS location match",
        CheckKind::ShadowForensics => "shadow angle consistent with capture time",
        CheckKind::SatellitePanelDelta => "satellite panel count match",
        CheckKind::EquipmentSerial => "approved equipment serials",
    }
}
