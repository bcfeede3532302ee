use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::domain::Coordinates;

/// Expected generation for the declared system; stored alongside the report, never scored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyEstimate {
    pub expected_annual_kwh: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnergyError {
    #[error("energy estimator unavailable: {0}")]
    Unavailable(String),
}

/// Production-estimate collaborator (e.g. a PVWatts-style service).
#[async_trait]
pub trait EnergyEstimator: Send + Sync {
    async fn estimate(
        &self,
        site: Coordinates,
        system_capacity_kw: f64,
    ) -> Result<EnergyEstimate, EnergyError>;
}
