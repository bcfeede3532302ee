use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::checks::CheckSet;
use super::decision::{Decision, Verdict};

/// Reasoning recorded when the pipeline itself faults.
pub const PIPELINE_ERROR_REASONING: &str = "pipeline error";

/// Immutable audit record of one completed verification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub checks: CheckSet,
    pub confidence_score: f64,
    pub decision: Decision,
    pub reasoning: String,
    pub attempt: u32,
    pub completed_at: DateTime<Utc>,
}

impl VerificationReport {
    /// Report for a normal pipeline completion.
    pub fn assemble(
        checks: CheckSet,
        confidence_score: f64,
        verdict: &Verdict,
        attempt: u32,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            checks,
            confidence_score,
            decision: verdict.decision,
            reasoning: verdict.reasoning.clone(),
            attempt,
            completed_at,
        }
    }

    /// Terminal report for a run that faulted or exceeded its deadline.
    pub fn pipeline_error(attempt: u32, completed_at: DateTime<Utc>) -> Self {
        Self {
            checks: CheckSet::degraded(PIPELINE_ERROR_REASONING),
            confidence_score: 0.0,
            decision: Decision::ManualReview,
            reasoning: PIPELINE_ERROR_REASONING.to_string(),
            attempt,
            completed_at,
        }
    }

    pub fn is_pipeline_error(&self) -> bool {
        self.reasoning == PIPELINE_ERROR_REASONING
    }
}
