use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::energy::EnergyEstimate;
use super::report::VerificationReport;

/// Identifier wrapper for installation applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the account that owns an application, as asserted by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub String);

/// WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ValidationError::InvalidLatitude(self.latitude));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ValidationError::InvalidLongitude(self.longitude));
        }
        Ok(())
    }
}

/// Installation facts declared by the applicant at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallationFacts {
    pub address: String,
    pub coordinates: Coordinates,
    pub system_capacity_kw: f64,
    pub declared_panel_count: u32,
}

impl InstallationFacts {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.address.trim().is_empty() {
            return Err(ValidationError::EmptyAddress);
        }
        self.coordinates.validate()?;
        if !self.system_capacity_kw.is_finite() || self.system_capacity_kw <= 0.0 {
            return Err(ValidationError::InvalidCapacity(self.system_capacity_kw));
        }
        if self.declared_panel_count == 0 {
            return Err(ValidationError::NoDeclaredPanels);
        }
        Ok(())
    }
}

/// Storage keys for the evidence artifacts uploaded with a verification request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRefs {
    pub wide_rooftop_photo: String,
    pub serial_number_photo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverter_photo: Option<String>,
}

impl EvidenceRefs {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.wide_rooftop_photo.trim().is_empty() {
            return Err(ValidationError::MissingEvidence("wide_rooftop_photo"));
        }
        if self.serial_number_photo.trim().is_empty() {
            return Err(ValidationError::MissingEvidence("serial_number_photo"));
        }
        Ok(())
    }
}

/// Payload for the first step of the two-step flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialApplication {
    #[serde(flatten)]
    pub facts: InstallationFacts,
}

/// Payload for the second step: on-site measurement plus evidence references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationSubmission {
    pub measured_coordinates: Coordinates,
    pub evidence: EvidenceRefs,
}

impl VerificationSubmission {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.measured_coordinates.validate()?;
        self.evidence.validate()
    }
}

/// Single-step submission kept for older clients: facts and evidence together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacySubmission {
    #[serde(flatten)]
    pub facts: InstallationFacts,
    pub evidence: EvidenceRefs,
}

/// Lifecycle status of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    InitialApplication,
    /// Entry point of the single-step flow; equivalent to `InitialApplication`.
    Submitted,
    Verifying,
    Approved,
    Rejected,
    ManualReview,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::InitialApplication => "initial_application",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::Verifying => "verifying",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::ManualReview => "manual_review",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Persisted application document.
///
/// Verification-phase fields stay `None` until a verification request supplies them, and
/// `verification_report` is present exactly when the status is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub owner: OwnerId,
    pub facts: InstallationFacts,
    pub measured_coordinates: Option<Coordinates>,
    pub evidence: Option<EvidenceRefs>,
    pub status: ApplicationStatus,
    pub submitted_at: DateTime<Utc>,
    pub verification_requested_at: Option<DateTime<Utc>>,
    pub verification_attempt: u32,
    pub verification_report: Option<VerificationReport>,
    pub expected_energy: Option<EnergyEstimate>,
}

impl Application {
    pub fn new(
        id: ApplicationId,
        owner: OwnerId,
        facts: InstallationFacts,
        status: ApplicationStatus,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner,
            facts,
            measured_coordinates: None,
            evidence: None,
            status,
            submitted_at,
            verification_requested_at: None,
            verification_attempt: 0,
            verification_report: None,
            expected_energy: None,
        }
    }

    pub fn is_owned_by(&self, owner: &OwnerId) -> bool {
        &self.owner == owner
    }

    pub fn decision_rationale(&self) -> String {
        match &self.verification_report {
            Some(report) => report.reasoning.clone(),
            None if self.status == ApplicationStatus::Verifying => {
                "verification in progress".to_string()
            }
            None => "pending verification".to_string(),
        }
    }

    pub fn status_view(&self) -> ApplicationStatusView {
        ApplicationStatusView {
            application_id: self.id.clone(),
            status: self.status.label(),
            decision_rationale: self.decision_rationale(),
            confidence_score: self
                .verification_report
                .as_ref()
                .map(|report| report.confidence_score),
            verification_attempt: self.verification_attempt,
        }
    }
}

/// Sanitized representation of an application's exposed status.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub status: &'static str,
    pub decision_rationale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    pub verification_attempt: u32,
}

/// Malformed input rejected before anything is persisted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("address must not be empty")]
    EmptyAddress,
    #[error("latitude {0} is outside [-90, 90]")]
    InvalidLatitude(f64),
    #[error("longitude {0} is outside [-180, 180]")]
    InvalidLongitude(f64),
    #[error("system capacity must be a positive number of kW (found {0})")]
    InvalidCapacity(f64),
    #[error("declared panel count must be at least 1")]
    NoDeclaredPanels,
    #[error("missing evidence artifact: {0}")]
    MissingEvidence(&'static str),
}
