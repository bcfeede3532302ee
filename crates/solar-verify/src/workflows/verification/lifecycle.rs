//! Application state machine.
//!
//! ```text
//! initial_application | submitted | rejected --(trigger)--> verifying
//! verifying --(pipeline)--> approved | rejected | manual_review
//! ```

use super::decision::Decision;
use super::domain::ApplicationStatus;

/// Illegal edge requested against the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot start verification while application is {from}")]
    VerificationNotAllowed { from: ApplicationStatus },
    #[error("cannot record a verification outcome while application is {from}")]
    NotVerifying { from: ApplicationStatus },
}

impl ApplicationStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Approved
                | ApplicationStatus::Rejected
                | ApplicationStatus::ManualReview
        )
    }

    /// Whether a verification request may move this application to `verifying`.
    pub const fn accepts_verification(self) -> bool {
        matches!(
            self,
            ApplicationStatus::InitialApplication
                | ApplicationStatus::Submitted
                | ApplicationStatus::Rejected
        )
    }

    pub fn begin_verification(self) -> Result<ApplicationStatus, TransitionError> {
        if self.accepts_verification() {
            Ok(ApplicationStatus::Verifying)
        } else {
            Err(TransitionError::VerificationNotAllowed { from: self })
        }
    }

    pub fn complete_verification(
        self,
        decision: Decision,
    ) -> Result<ApplicationStatus, TransitionError> {
        match self {
            ApplicationStatus::Verifying => Ok(decision.status()),
            from => Err(TransitionError::NotVerifying { from }),
        }
    }
}
