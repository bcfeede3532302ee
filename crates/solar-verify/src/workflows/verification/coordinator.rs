//! Dependency-aware fan-out over the four evidence checks.
//!
//! Tier 1 (location proximity) runs alone because it derives the capture time the shadow
//! check needs. Tier 2 (shadow forensics, satellite panel delta, equipment serials) then runs
//! concurrently. Every provider call is isolated in its own task with its own deadline, so
//! errors, timeouts and panics all collapse into degraded findings scored 0.0.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

use super::checks::{
    bounded_score, CheckError, CheckProvider, CheckSet, EquipmentFinding, EquipmentInput, Finding,
    LocationFinding, LocationInput, SatelliteFinding, SatelliteInput, ShadowFinding, ShadowInput,
};
use super::domain::Application;
use super::energy::{EnergyEstimate, EnergyEstimator};

/// The provider for each check kind plus the optional energy estimator.
#[derive(Clone)]
pub struct CheckProviders {
    pub location: Arc<dyn CheckProvider<Input = LocationInput>>,
    pub shadow: Arc<dyn CheckProvider<Input = ShadowInput>>,
    pub satellite: Arc<dyn CheckProvider<Input = SatelliteInput>>,
    pub equipment: Arc<dyn CheckProvider<Input = EquipmentInput>>,
    pub energy: Option<Arc<dyn EnergyEstimator>>,
}

/// Everything a run produces before aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorOutput {
    pub checks: CheckSet,
    pub expected_energy: Option<EnergyEstimate>,
}

/// Unexpected failure of the coordinator itself, as opposed to a provider failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineFault {
    #[error("application is missing verification input: {0}")]
    MissingInput(&'static str),
    #[error("pipeline task failed: {0}")]
    Task(String),
    #[error("pipeline exceeded its {0:?} deadline")]
    Deadline(Duration),
    #[error("outcome could not be persisted: {0}")]
    Persistence(String),
    #[error("a newer verification attempt has started")]
    Superseded,
}

pub struct FanOutCoordinator {
    providers: CheckProviders,
    check_timeout: Duration,
}

impl FanOutCoordinator {
    pub fn new(providers: CheckProviders, check_timeout: Duration) -> Self {
        Self {
            providers,
            check_timeout,
        }
    }

    /// Run all checks for `application`; always yields four findings unless the application
    /// itself lacks the verification-phase fields.
    pub async fn run(&self, application: &Application) -> Result<CoordinatorOutput, PipelineFault> {
        let evidence = application
            .evidence
            .as_ref()
            .ok_or(PipelineFault::MissingInput("evidence"))?;
        let requested_at = application
            .verification_requested_at
            .ok_or(PipelineFault::MissingInput("verification_requested_at"))?;
        let facts = &application.facts;

        // Tier 1
        let location: LocationFinding = isolated(
            self.providers.location.clone(),
            LocationInput {
                declared: facts.coordinates,
                measured: application.measured_coordinates,
                photo_key: evidence.wide_rooftop_photo.clone(),
            },
            self.check_timeout,
        )
        .await;

        // Tier 2
        let shadow_input = ShadowInput {
            photo_key: evidence.wide_rooftop_photo.clone(),
            position: location.detected.unwrap_or(facts.coordinates),
            capture_time: location.capture_time,
        };
        let satellite_input = SatelliteInput {
            position: facts.coordinates,
            declared_panel_count: facts.declared_panel_count,
            submitted_at: application.submitted_at,
            requested_at,
        };
        let equipment_input = EquipmentInput {
            serial_photo_key: evidence.serial_number_photo.clone(),
        };

        let (shadow, mut satellite, equipment, expected_energy) = tokio::join!(
            isolated::<ShadowFinding, _>(
                self.providers.shadow.clone(),
                shadow_input,
                self.check_timeout
            ),
            isolated::<SatelliteFinding, _>(
                self.providers.satellite.clone(),
                satellite_input,
                self.check_timeout
            ),
            isolated::<EquipmentFinding, _>(
                self.providers.equipment.clone(),
                equipment_input,
                self.check_timeout
            ),
            self.estimate_energy(application),
        );
        satellite.declared_panel_count = facts.declared_panel_count;

        Ok(CoordinatorOutput {
            checks: CheckSet {
                location,
                shadow,
                satellite,
                equipment,
            },
            expected_energy,
        })
    }

    async fn estimate_energy(&self, application: &Application) -> Option<EnergyEstimate> {
        let estimator = self.providers.energy.clone()?;
        let site = application.facts.coordinates;
        let capacity = application.facts.system_capacity_kw;

        let task = AbortOnDrop(tokio::spawn(async move {
            estimator.estimate(site, capacity).await
        }));
        match tokio::time::timeout(self.check_timeout, task).await {
            Ok(Ok(Ok(estimate))) => Some(estimate),
            Ok(Ok(Err(err))) => {
                warn!(application_id = %application.id, error = %err, "energy estimate unavailable");
                None
            }
            Ok(Err(join_error)) => {
                warn!(application_id = %application.id, error = %join_error, "energy estimator faulted");
                None
            }
            Err(_) => {
                warn!(application_id = %application.id, "energy estimate timed out");
                None
            }
        }
    }
}

/// Run one provider call in its own task under `deadline`, mapping every failure mode to a
/// degraded finding of the expected kind.
async fn isolated<F, I>(
    provider: Arc<dyn CheckProvider<Input = I>>,
    input: I,
    deadline: Duration,
) -> F
where
    F: Finding,
    I: Send + 'static,
{
    let kind = F::KIND;
    let registered = provider.kind();
    if registered != kind {
        let cause = format!("provider is registered for {}", registered.label());
        warn!(check = kind.label(), %cause, "check degraded");
        return F::degraded(format!("{} check degraded: {cause}", kind.label()));
    }

    let task = AbortOnDrop(tokio::spawn(async move { provider.evaluate(input).await }));
    let cause = match tokio::time::timeout(deadline, task).await {
        Ok(Ok(Ok(result))) => {
            let returned = result.kind();
            match F::from_result(result) {
                Some(finding) => {
                    let score = bounded_score(finding.score());
                    debug!(check = kind.label(), score, "check completed");
                    return finding.with_score(score);
                }
                None => format!("provider returned a {} result", returned.label()),
            }
        }
        Ok(Ok(Err(err))) => err.to_string(),
        Ok(Err(join_error)) if join_error.is_panic() => "provider panicked".to_string(),
        Ok(Err(join_error)) => join_error.to_string(),
        Err(_) => CheckError::Timeout(deadline).to_string(),
    };

    warn!(check = kind.label(), %cause, "check degraded");
    F::degraded(format!("{} check degraded: {cause}", kind.label()))
}

/// A spawned task that is aborted when its handle is dropped.
///
/// Dropping a run mid-flight (for example when the pipeline deadline cancels it) therefore
/// cancels every provider call it started instead of leaving them running detached.
pub(crate) struct AbortOnDrop<T>(pub(crate) JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}
