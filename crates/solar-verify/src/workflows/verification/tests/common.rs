use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::verification::checks::{
    CheckError, CheckKind, CheckProvider, CheckResult, CheckSet, EquipmentFinding,
    EquipmentInput, LocationFinding, LocationInput, QcStatus, SatelliteFinding, SatelliteInput,
    ShadowFinding, ShadowInput,
};
use crate::workflows::verification::coordinator::CheckProviders;
use crate::workflows::verification::domain::{
    Application, ApplicationId, ApplicationStatus, Coordinates, EvidenceRefs, InitialApplication,
    InstallationFacts, LegacySubmission, OwnerId, VerificationSubmission,
};
use crate::workflows::verification::energy::{EnergyError, EnergyEstimate, EnergyEstimator};
use crate::workflows::verification::notify::{
    NotificationError, NotificationSink, StatusNotification,
};
use crate::workflows::verification::repository::{
    ApplicationRepository, ApplicationUpdate, RepositoryError, StatusGuard,
};
use crate::workflows::verification::service::{PipelineSettings, VerificationService};

pub(super) fn site() -> Coordinates {
    Coordinates {
        latitude: 12.9716,
        longitude: 77.5946,
    }
}

pub(super) fn capture_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 6, 30, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn owner() -> OwnerId {
    OwnerId("owner-1".to_string())
}

pub(super) fn facts() -> InstallationFacts {
    InstallationFacts {
        address: "14 MG Road, Bengaluru".to_string(),
        coordinates: site(),
        system_capacity_kw: 3.3,
        declared_panel_count: 10,
    }
}

pub(super) fn evidence() -> EvidenceRefs {
    EvidenceRefs {
        wide_rooftop_photo: "uploads/owner-1/rooftop.jpg".to_string(),
        serial_number_photo: "uploads/owner-1/serial.jpg".to_string(),
        inverter_photo: None,
    }
}

pub(super) fn initial_application() -> InitialApplication {
    InitialApplication { facts: facts() }
}

pub(super) fn verification_request() -> VerificationSubmission {
    VerificationSubmission {
        measured_coordinates: site(),
        evidence: evidence(),
    }
}

pub(super) fn legacy_submission() -> LegacySubmission {
    LegacySubmission {
        facts: facts(),
        evidence: evidence(),
    }
}

/// Application stored directly in a given status, bypassing the service.
pub(super) fn stored_application(
    id: &str,
    status: ApplicationStatus,
    attempt: u32,
    evidence: Option<EvidenceRefs>,
) -> Application {
    let mut application = Application::new(
        ApplicationId(id.to_string()),
        owner(),
        facts(),
        status,
        capture_time(),
    );
    application.verification_attempt = attempt;
    application.measured_coordinates = Some(site());
    application.verification_requested_at = evidence.as_ref().map(|_| capture_time());
    application.evidence = evidence;
    application
}

/// Findings with the given scores, in report order.
pub(super) fn check_set(gps: f64, shadow: f64, satellite: f64, equipment: f64) -> CheckSet {
    CheckSet {
        location: location_finding(gps),
        shadow: shadow_finding(shadow),
        satellite: satellite_finding(satellite, 10),
        equipment: equipment_finding(equipment),
    }
}

pub(super) fn location_finding(score: f64) -> LocationFinding {
    LocationFinding {
        score,
        reasoning: "stub location".to_string(),
        detected: Some(site()),
        deviation_meters: Some(4.0),
        capture_time: Some(capture_time()),
    }
}

pub(super) fn shadow_finding(score: f64) -> ShadowFinding {
    ShadowFinding {
        score,
        reasoning: "stub shadow".to_string(),
        expected_sun_azimuth: Some(95.0),
        expected_sun_elevation: Some(12.0),
        detected_shadow_angle: Some(97.0),
    }
}

pub(super) fn satellite_finding(score: f64, post_install: u32) -> SatelliteFinding {
    SatelliteFinding {
        score,
        reasoning: "stub satellite".to_string(),
        declared_panel_count: 10,
        pre_install_panel_count: 0,
        post_install_panel_count: post_install,
        detector_confidence: 0.9,
        pv_area_sqm: 17.0,
        qc_status: QcStatus::Verifiable,
    }
}

pub(super) fn equipment_finding(score: f64) -> EquipmentFinding {
    EquipmentFinding {
        score,
        reasoning: "stub equipment".to_string(),
        detected_serials: vec!["SERIAL-123456".to_string()],
        verified_serials: vec!["SERIAL-123456".to_string()],
    }
}

fn finding_for(kind: CheckKind, score: f64) -> CheckResult {
    match kind {
        CheckKind::LocationProximity => CheckResult::LocationProximity(location_finding(score)),
        CheckKind::ShadowForensics => CheckResult::ShadowForensics(shadow_finding(score)),
        CheckKind::SatellitePanelDelta => {
            CheckResult::SatellitePanelDelta(satellite_finding(score, 10))
        }
        CheckKind::EquipmentSerial => CheckResult::EquipmentSerial(equipment_finding(score)),
    }
}

/// What a scripted provider does when invoked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum Behavior {
    Score(f64),
    Fail,
    Panic,
    Hang,
    WrongKind,
}

pub(super) struct ScriptedProvider<I> {
    kind: CheckKind,
    behavior: Behavior,
    calls: Mutex<Vec<I>>,
    _input: PhantomData<fn(I)>,
}

impl<I: Clone> ScriptedProvider<I> {
    pub(super) fn new(kind: CheckKind, behavior: Behavior) -> Self {
        Self {
            kind,
            behavior,
            calls: Mutex::new(Vec::new()),
            _input: PhantomData,
        }
    }

    pub(super) fn calls(&self) -> Vec<I> {
        self.calls.lock().expect("provider mutex poisoned").clone()
    }
}

#[async_trait]
impl<I> CheckProvider for ScriptedProvider<I>
where
    I: Clone + Send + Sync + 'static,
{
    type Input = I;

    fn kind(&self) -> CheckKind {
        self.kind
    }

    async fn evaluate(&self, input: I) -> Result<CheckResult, CheckError> {
        self.calls
            .lock()
            .expect("provider mutex poisoned")
            .push(input);
        match self.behavior {
            Behavior::Score(score) => Ok(finding_for(self.kind, score)),
            Behavior::Fail => Err(CheckError::Unavailable("model offline".to_string())),
            Behavior::Panic => panic!("provider crashed"),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Err(CheckError::Unavailable("woke up too late".to_string()))
            }
            Behavior::WrongKind => {
                let other = if self.kind == CheckKind::EquipmentSerial {
                    CheckKind::LocationProximity
                } else {
                    CheckKind::EquipmentSerial
                };
                Ok(finding_for(other, 1.0))
            }
        }
    }
}

/// Typed handles on the scripted providers so tests can inspect received inputs.
pub(super) struct Scripted {
    pub(super) location: Arc<ScriptedProvider<LocationInput>>,
    pub(super) shadow: Arc<ScriptedProvider<ShadowInput>>,
    pub(super) satellite: Arc<ScriptedProvider<SatelliteInput>>,
    pub(super) equipment: Arc<ScriptedProvider<EquipmentInput>>,
}

impl Scripted {
    pub(super) fn new(
        location: Behavior,
        shadow: Behavior,
        satellite: Behavior,
        equipment: Behavior,
    ) -> Self {
        Self {
            location: Arc::new(ScriptedProvider::new(CheckKind::LocationProximity, location)),
            shadow: Arc::new(ScriptedProvider::new(CheckKind::ShadowForensics, shadow)),
            satellite: Arc::new(ScriptedProvider::new(
                CheckKind::SatellitePanelDelta,
                satellite,
            )),
            equipment: Arc::new(ScriptedProvider::new(CheckKind::EquipmentSerial, equipment)),
        }
    }

    pub(super) fn scores(gps: f64, shadow: f64, satellite: f64, equipment: f64) -> Self {
        Self::new(
            Behavior::Score(gps),
            Behavior::Score(shadow),
            Behavior::Score(satellite),
            Behavior::Score(equipment),
        )
    }

    pub(super) fn providers(&self) -> CheckProviders {
        CheckProviders {
            location: self.location.clone(),
            shadow: self.shadow.clone(),
            satellite: self.satellite.clone(),
            equipment: self.equipment.clone(),
            energy: Some(Arc::new(FlatEnergyEstimator)),
        }
    }
}

/// 1,400 kWh per installed kW per year.
pub(super) struct FlatEnergyEstimator;

#[async_trait]
impl EnergyEstimator for FlatEnergyEstimator {
    async fn estimate(
        &self,
        _site: Coordinates,
        system_capacity_kw: f64,
    ) -> Result<EnergyEstimate, EnergyError> {
        Ok(EnergyEstimate {
            expected_annual_kwh: system_capacity_kw * 1_400.0,
        })
    }
}

#[derive(Default)]
pub(super) struct MemoryRepository {
    records: Mutex<HashMap<ApplicationId, Application>>,
    failing_completions: AtomicUsize,
}

impl MemoryRepository {
    /// Reject the next `count` completion writes as unavailable.
    pub(super) fn fail_next_completions(&self, count: usize) {
        self.failing_completions.store(count, Ordering::SeqCst);
    }

    pub(super) fn stored(&self, id: &ApplicationId) -> Application {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .get(id)
            .cloned()
            .expect("application stored")
    }

    pub(super) fn put(&self, application: Application) {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .insert(application.id.clone(), application);
    }
}

impl ApplicationRepository for MemoryRepository {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&application.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn compare_and_set(
        &self,
        id: &ApplicationId,
        expected: StatusGuard,
        update: ApplicationUpdate,
    ) -> Result<Application, RepositoryError> {
        if matches!(update, ApplicationUpdate::Complete { .. })
            && self
                .failing_completions
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(RepositoryError::Unavailable("write timeout".to_string()));
        }

        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let application = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        update.apply_guarded(application, expected)?;
        Ok(application.clone())
    }

    fn with_status(
        &self,
        status: ApplicationStatus,
        limit: usize,
    ) -> Result<Vec<Application>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|application| application.status == status)
            .take(limit)
            .cloned()
            .collect())
    }
}

pub(super) struct UnavailableRepository;

impl ApplicationRepository for UnavailableRepository {
    fn insert(&self, _application: Application) -> Result<Application, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn compare_and_set(
        &self,
        _id: &ApplicationId,
        _expected: StatusGuard,
        _update: ApplicationUpdate,
    ) -> Result<Application, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn with_status(
        &self,
        _status: ApplicationStatus,
        _limit: usize,
    ) -> Result<Vec<Application>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct MemoryNotifier {
    sent: Mutex<Vec<StatusNotification>>,
    failing: bool,
    panicking: bool,
}

impl MemoryNotifier {
    pub(super) fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub(super) fn panicking() -> Self {
        Self {
            panicking: true,
            ..Self::default()
        }
    }

    pub(super) fn sent(&self) -> Vec<StatusNotification> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

#[async_trait]
impl NotificationSink for MemoryNotifier {
    async fn send(&self, notification: StatusNotification) -> Result<(), NotificationError> {
        if self.panicking {
            panic!("push client crashed");
        }
        if self.failing {
            return Err(NotificationError::Transport("push gateway down".to_string()));
        }
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) type TestService = VerificationService<MemoryRepository, MemoryNotifier>;

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) repository: Arc<MemoryRepository>,
    pub(super) notifier: Arc<MemoryNotifier>,
}

pub(super) fn harness(scripted: &Scripted) -> Harness {
    harness_with(scripted, MemoryNotifier::default(), PipelineSettings::default())
}

pub(super) fn harness_with(
    scripted: &Scripted,
    notifier: MemoryNotifier,
    settings: PipelineSettings,
) -> Harness {
    let repository = Arc::new(MemoryRepository::default());
    let notifier = Arc::new(notifier);
    let service = Arc::new(VerificationService::new(
        repository.clone(),
        notifier.clone(),
        scripted.providers(),
        settings,
    ));
    Harness {
        service,
        repository,
        notifier,
    }
}

/// Let aborted tasks on the current-thread runtime run their cancellation.
pub(super) async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
