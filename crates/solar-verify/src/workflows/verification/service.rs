use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::coordinator::{AbortOnDrop, CheckProviders, FanOutCoordinator, PipelineFault};
use super::decision::{DecisionEngine, Thresholds};
use super::domain::{
    Application, ApplicationId, ApplicationStatus, Coordinates, EvidenceRefs, InitialApplication,
    LegacySubmission, OwnerId, ValidationError, VerificationSubmission,
};
use super::energy::EnergyEstimate;
use super::lifecycle::TransitionError;
use super::notify::{dispatch_best_effort, NotificationSink, StatusNotification};
use super::report::VerificationReport;
use super::repository::{ApplicationRepository, ApplicationUpdate, RepositoryError, StatusGuard};
use super::scoring::{aggregate, WeightConfig};

/// Tunables for scoring, decisions and deadlines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub weights: WeightConfig,
    pub thresholds: Thresholds,
    pub check_timeout: Duration,
    pub pipeline_timeout: Duration,
    pub notification_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            weights: WeightConfig::default(),
            thresholds: Thresholds::default(),
            check_timeout: Duration::from_secs(30),
            pipeline_timeout: Duration::from_secs(180),
            notification_timeout: Duration::from_secs(5),
        }
    }
}

/// Identifies one verification run: the application and the attempt it was started for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineTicket {
    pub application_id: ApplicationId,
    pub attempt: u32,
}

/// Immediate response to a verification trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationAck {
    pub application_id: ApplicationId,
    pub status: &'static str,
    pub attempt: u32,
    pub message: String,
}

/// How a background run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Completed {
        status: ApplicationStatus,
        confidence_score: f64,
        pipeline_error: bool,
    },
    /// The application moved on (newer attempt or concurrent completion); nothing was written.
    Discarded,
    /// The store refused both the outcome and the pipeline-error fallback.
    Unpersisted,
}

/// Service composing intake, the state machine, the check fan-out and the decision engine.
pub struct VerificationService<R, N> {
    repository: Arc<R>,
    notifier: Arc<N>,
    coordinator: Arc<FanOutCoordinator>,
    engine: DecisionEngine,
    settings: PipelineSettings,
}

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("app-{id:06}"))
}

impl<R, N> VerificationService<R, N>
where
    R: ApplicationRepository + 'static,
    N: NotificationSink + 'static,
{
    pub fn new(
        repository: Arc<R>,
        notifier: Arc<N>,
        providers: CheckProviders,
        settings: PipelineSettings,
    ) -> Self {
        let coordinator = Arc::new(FanOutCoordinator::new(providers, settings.check_timeout));
        Self {
            repository,
            notifier,
            coordinator,
            engine: DecisionEngine::new(settings.thresholds),
            settings,
        }
    }

    /// Effective tunables, as logged at startup.
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// First step of the two-step flow: persist declared facts only.
    pub fn create_initial(
        &self,
        owner: OwnerId,
        request: InitialApplication,
    ) -> Result<Application, ServiceError> {
        request.facts.validate()?;
        let application = Application::new(
            next_application_id(),
            owner,
            request.facts,
            ApplicationStatus::InitialApplication,
            Utc::now(),
        );
        let stored = self.repository.insert(application)?;
        info!(application_id = %stored.id, "initial application created");
        Ok(stored)
    }

    /// Single-step flow: persist facts and evidence as `submitted`, then trigger verification.
    pub fn submit_legacy(
        self: &Arc<Self>,
        owner: OwnerId,
        request: LegacySubmission,
    ) -> Result<VerificationAck, ServiceError> {
        request.facts.validate()?;
        request.evidence.validate()?;

        let application = Application::new(
            next_application_id(),
            owner.clone(),
            request.facts,
            ApplicationStatus::Submitted,
            Utc::now(),
        );
        let stored = self.repository.insert(application)?;
        let ticket = self.begin_verification(&owner, &stored.id, None, request.evidence)?;
        self.spawn_pipeline(ticket.clone());
        Ok(Self::acknowledge(ticket))
    }

    /// Second step of the two-step flow; returns once the application is `verifying`.
    pub fn submit_verification(
        self: &Arc<Self>,
        owner: &OwnerId,
        application_id: &ApplicationId,
        request: VerificationSubmission,
    ) -> Result<VerificationAck, ServiceError> {
        request.validate()?;
        let ticket = self.begin_verification(
            owner,
            application_id,
            Some(request.measured_coordinates),
            request.evidence,
        )?;
        self.spawn_pipeline(ticket.clone());
        Ok(Self::acknowledge(ticket))
    }

    /// Guarded `-> verifying` transition. Exactly one of several concurrent callers wins.
    pub fn begin_verification(
        &self,
        owner: &OwnerId,
        application_id: &ApplicationId,
        measured_coordinates: Option<Coordinates>,
        evidence: EvidenceRefs,
    ) -> Result<PipelineTicket, ServiceError> {
        let application = self.owned(owner, application_id)?;
        application
            .status
            .begin_verification()
            .map_err(ConflictError::from)?;

        let update = ApplicationUpdate::BeginVerification {
            measured_coordinates,
            evidence,
            requested_at: Utc::now(),
        };
        let updated = self
            .repository
            .compare_and_set(application_id, StatusGuard::of(&application), update)
            .map_err(|err| match err {
                RepositoryError::StaleStatus { .. } => {
                    ServiceError::Conflict(ConflictError::ConcurrentUpdate)
                }
                RepositoryError::IllegalTransition(transition) => {
                    ServiceError::Conflict(ConflictError::Transition(transition))
                }
                RepositoryError::NotFound => ServiceError::NotFound(application_id.clone()),
                other => ServiceError::Repository(other),
            })?;

        info!(
            application_id = %updated.id,
            attempt = updated.verification_attempt,
            "verification requested"
        );
        Ok(PipelineTicket {
            application_id: updated.id,
            attempt: updated.verification_attempt,
        })
    }

    /// Run the pipeline for `ticket` as an independent background task.
    pub fn spawn_pipeline(self: &Arc<Self>, ticket: PipelineTicket) -> JoinHandle<PipelineOutcome> {
        let service = Arc::clone(self);
        tokio::spawn(async move { service.run_pipeline(ticket).await })
    }

    /// Re-schedule runs for applications left in `verifying`, e.g. after a restart.
    pub fn resume_in_flight(
        self: &Arc<Self>,
        limit: usize,
    ) -> Result<Vec<JoinHandle<PipelineOutcome>>, ServiceError> {
        let stalled = self
            .repository
            .with_status(ApplicationStatus::Verifying, limit)?;
        Ok(stalled
            .into_iter()
            .map(|application| {
                warn!(application_id = %application.id, "resuming in-flight verification");
                self.spawn_pipeline(PipelineTicket {
                    application_id: application.id,
                    attempt: application.verification_attempt,
                })
            })
            .collect())
    }

    /// Top-level orchestration. Once an application is `verifying`, this always drives it
    /// to a terminal state: any coordinator or aggregation fault, and the outer deadline,
    /// end in `manual_review` with a pipeline-error report.
    pub async fn run_pipeline(&self, ticket: PipelineTicket) -> PipelineOutcome {
        info!(
            application_id = %ticket.application_id,
            attempt = ticket.attempt,
            "verification pipeline started"
        );

        let (report, expected_energy) = match self.evaluate(&ticket).await {
            Ok(evaluated) => evaluated,
            Err(PipelineFault::Superseded) => {
                warn!(
                    application_id = %ticket.application_id,
                    attempt = ticket.attempt,
                    "verification run superseded before it started"
                );
                return PipelineOutcome::Discarded;
            }
            Err(fault) => {
                error!(
                    application_id = %ticket.application_id,
                    attempt = ticket.attempt,
                    error = %fault,
                    "verification pipeline fault; forcing manual review"
                );
                (
                    VerificationReport::pipeline_error(ticket.attempt, Utc::now()),
                    None,
                )
            }
        };

        self.persist(&ticket, report, expected_energy).await
    }

    async fn evaluate(
        &self,
        ticket: &PipelineTicket,
    ) -> Result<(VerificationReport, Option<EnergyEstimate>), PipelineFault> {
        let application = self
            .repository
            .fetch(&ticket.application_id)
            .map_err(|err| PipelineFault::Persistence(err.to_string()))?
            .ok_or(PipelineFault::MissingInput("application"))?;
        let expected = StatusGuard {
            status: ApplicationStatus::Verifying,
            attempt: ticket.attempt,
        };
        if !expected.holds_for(&application) {
            return Err(PipelineFault::Superseded);
        }

        let coordinator = Arc::clone(&self.coordinator);
        let weights = self.settings.weights;
        let engine = self.engine;
        let attempt = ticket.attempt;

        let mut task = AbortOnDrop(tokio::spawn(async move {
            let output = coordinator.run(&application).await?;
            let confidence = aggregate(&output.checks, &weights);
            let verdict = engine.decide(confidence, &output.checks, &weights);
            info!(
                application_id = %application.id,
                confidence,
                decision = verdict.decision.label(),
                "verification decided"
            );
            let report =
                VerificationReport::assemble(output.checks, confidence, &verdict, attempt, Utc::now());
            Ok::<_, PipelineFault>((report, output.expected_energy))
        }));

        match tokio::time::timeout(self.settings.pipeline_timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(PipelineFault::Task(join_error.to_string())),
            Err(_) => {
                task.0.abort();
                // Wait for the cancelled run to unwind so its check tasks are gone too.
                let _ = task.await;
                Err(PipelineFault::Deadline(self.settings.pipeline_timeout))
            }
        }
    }

    /// Write report and status in one compare-and-set on `(verifying, attempt)`.
    async fn persist(
        &self,
        ticket: &PipelineTicket,
        report: VerificationReport,
        expected_energy: Option<EnergyEstimate>,
    ) -> PipelineOutcome {
        let guard = StatusGuard {
            status: ApplicationStatus::Verifying,
            attempt: ticket.attempt,
        };
        let mut report = report;
        let mut expected_energy = expected_energy;

        loop {
            let update = ApplicationUpdate::Complete {
                report: report.clone(),
                expected_energy,
            };
            match self
                .repository
                .compare_and_set(&ticket.application_id, guard, update)
            {
                Ok(application) => {
                    info!(
                        application_id = %application.id,
                        status = %application.status,
                        confidence = report.confidence_score,
                        "verification complete"
                    );
                    let notification = StatusNotification::status_changed(&application);
                    dispatch_best_effort(
                        Arc::clone(&self.notifier),
                        notification,
                        self.settings.notification_timeout,
                    )
                    .await;
                    return PipelineOutcome::Completed {
                        status: application.status,
                        confidence_score: report.confidence_score,
                        pipeline_error: report.is_pipeline_error(),
                    };
                }
                Err(RepositoryError::StaleStatus { expected, found }) => {
                    warn!(
                        application_id = %ticket.application_id,
                        ?expected,
                        ?found,
                        "verification outcome discarded; application changed concurrently"
                    );
                    return PipelineOutcome::Discarded;
                }
                Err(err) if report.is_pipeline_error() => {
                    error!(
                        application_id = %ticket.application_id,
                        error = %err,
                        "verification outcome could not be persisted"
                    );
                    return PipelineOutcome::Unpersisted;
                }
                Err(err) => {
                    error!(
                        application_id = %ticket.application_id,
                        error = %err,
                        "verification outcome rejected by store; falling back to manual review"
                    );
                    report = VerificationReport::pipeline_error(ticket.attempt, Utc::now());
                    expected_energy = None;
                }
            }
        }
    }

    /// Fetch an application visible to `owner`.
    pub fn get(
        &self,
        owner: &OwnerId,
        application_id: &ApplicationId,
    ) -> Result<Application, ServiceError> {
        self.owned(owner, application_id)
    }

    /// Report for a settled application; in-flight applications are a conflict.
    pub fn report(
        &self,
        owner: &OwnerId,
        application_id: &ApplicationId,
    ) -> Result<VerificationReport, ServiceError> {
        let application = self.owned(owner, application_id)?;
        if !application.status.is_terminal() {
            return Err(ConflictError::InProgress {
                status: application.status,
            }
            .into());
        }
        application
            .verification_report
            .ok_or_else(|| ServiceError::NotFound(application_id.clone()))
    }

    fn owned(
        &self,
        owner: &OwnerId,
        application_id: &ApplicationId,
    ) -> Result<Application, ServiceError> {
        match self.repository.fetch(application_id)? {
            Some(application) if application.is_owned_by(owner) => Ok(application),
            _ => Err(ServiceError::NotFound(application_id.clone())),
        }
    }

    fn acknowledge(ticket: PipelineTicket) -> VerificationAck {
        VerificationAck {
            application_id: ticket.application_id,
            status: ApplicationStatus::Verifying.label(),
            attempt: ticket.attempt,
            message: "Verification accepted and running in the background.".to_string(),
        }
    }
}

/// Illegal or racing state changes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConflictError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("verification for this application is still in progress (status: {status})")]
    InProgress { status: ApplicationStatus },
    #[error("application status changed concurrently; retry the request")]
    ConcurrentUpdate,
}

/// Error raised synchronously to the caller of the verification service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("application {0} not found")]
    NotFound(ApplicationId),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
