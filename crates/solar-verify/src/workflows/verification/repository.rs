use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Application, ApplicationId, ApplicationStatus, Coordinates, EvidenceRefs};
use super::energy::EnergyEstimate;
use super::lifecycle::TransitionError;
use super::report::VerificationReport;

/// Previously observed `(status, attempt)` pair a conditional update is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusGuard {
    pub status: ApplicationStatus,
    pub attempt: u32,
}

impl StatusGuard {
    pub fn of(application: &Application) -> Self {
        Self {
            status: application.status,
            attempt: application.verification_attempt,
        }
    }

    pub fn holds_for(&self, application: &Application) -> bool {
        *self == Self::of(application)
    }
}

/// Mutations the verification workflow performs on a stored application.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplicationUpdate {
    /// `initial_application | submitted | rejected -> verifying`.
    BeginVerification {
        measured_coordinates: Option<Coordinates>,
        evidence: EvidenceRefs,
        requested_at: DateTime<Utc>,
    },
    /// `verifying -> approved | rejected | manual_review`, together with the report.
    Complete {
        report: VerificationReport,
        expected_energy: Option<EnergyEstimate>,
    },
}

impl ApplicationUpdate {
    /// Check `guard` against `application` and, if it holds, apply the update in place.
    ///
    /// Repository implementations call this inside their write lock or transaction so the
    /// comparison and the write form one atomic step. On error `application` is untouched.
    pub fn apply_guarded(
        self,
        application: &mut Application,
        guard: StatusGuard,
    ) -> Result<(), RepositoryError> {
        if !guard.holds_for(application) {
            return Err(RepositoryError::StaleStatus {
                expected: guard,
                found: StatusGuard::of(application),
            });
        }

        match self {
            ApplicationUpdate::BeginVerification {
                measured_coordinates,
                evidence,
                requested_at,
            } => {
                let next = application.status.begin_verification()?;
                application.status = next;
                application.verification_attempt += 1;
                application.measured_coordinates = measured_coordinates;
                application.evidence = Some(evidence);
                application.verification_requested_at = Some(requested_at);
                application.verification_report = None;
                application.expected_energy = None;
            }
            ApplicationUpdate::Complete {
                report,
                expected_energy,
            } => {
                let next = application.status.complete_verification(report.decision)?;
                application.status = next;
                application.verification_report = Some(report);
                application.expected_energy = expected_energy;
            }
        }
        Ok(())
    }
}

/// Document store holding applications keyed by identity.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError>;

    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError>;

    /// Atomically apply `update` if the stored application still matches `guard`.
    fn compare_and_set(
        &self,
        id: &ApplicationId,
        guard: StatusGuard,
        update: ApplicationUpdate,
    ) -> Result<Application, RepositoryError>;

    fn with_status(
        &self,
        status: ApplicationStatus,
        limit: usize,
    ) -> Result<Vec<Application>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("stored status {found:?} no longer matches expected {expected:?}")]
    StaleStatus {
        expected: StatusGuard,
        found: StatusGuard,
    },
    #[error(transparent)]
    IllegalTransition(#[from] TransitionError),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
