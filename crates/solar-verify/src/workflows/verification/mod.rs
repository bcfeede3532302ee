//! Rooftop solar verification: intake, evidence checks, weighted scoring and the
//! auto-approve / manual-review / auto-reject decision.
//!
//! Submitting evidence moves an application into `verifying` synchronously; the check
//! fan-out, aggregation, decision and persistence then run in a background task that always
//! ends in a terminal status.

pub mod checks;
pub mod coordinator;
pub mod decision;
pub mod domain;
pub mod energy;
mod lifecycle;
pub mod notify;
pub mod report;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;

#[cfg(test)]
mod tests;

pub use checks::{CheckError, CheckKind, CheckProvider, CheckResult, CheckSet, LazyHandle};
pub use coordinator::{CheckProviders, CoordinatorOutput, FanOutCoordinator, PipelineFault};
pub use decision::{Decision, DecisionEngine, ThresholdError, Thresholds, Verdict};
pub use domain::{
    Application, ApplicationId, ApplicationStatus, ApplicationStatusView, Coordinates,
    EvidenceRefs, InitialApplication, InstallationFacts, LegacySubmission, OwnerId,
    ValidationError, VerificationSubmission,
};
pub use energy::{EnergyError, EnergyEstimate, EnergyEstimator};
pub use lifecycle::TransitionError;
pub use notify::{NotificationError, NotificationSink, StatusNotification};
pub use report::{VerificationReport, PIPELINE_ERROR_REASONING};
pub use repository::{ApplicationRepository, ApplicationUpdate, RepositoryError, StatusGuard};
pub use router::{verification_router, OWNER_HEADER};
pub use scoring::{aggregate, WeightConfig, WeightConfigError};
pub use service::{
    ConflictError, PipelineOutcome, PipelineSettings, PipelineTicket, ServiceError,
    VerificationAck, VerificationService,
};
