use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use solar_verify::config::VerificationConfig;
use solar_verify::workflows::verification::checks::{
    CheckError, EquipmentSerialCheck, Imagery, ImageryPhase, ImageryService, ImageryWindow,
    LazyHandle, LocationProximityCheck, PanelDetection, PanelDetector, PhotoMetadata,
    PhotoMetadataReader, SatellitePanelDeltaCheck, SerialReader, ShadowDetector,
    ShadowForensicsCheck, SolarPositionModel, StaticEquipmentRegistry, SunPosition,
};
use solar_verify::workflows::verification::{
    Application, ApplicationId, ApplicationRepository, ApplicationStatus, ApplicationUpdate,
    CheckProviders, Coordinates, EnergyError, EnergyEstimate, EnergyEstimator, NotificationError,
    NotificationSink, RepositoryError, StatusGuard, StatusNotification,
};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Module footprint used to turn a panel count into covered area.
const PANEL_AREA_SQM: f64 = 1.7;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryApplicationRepository {
    records: Arc<Mutex<HashMap<ApplicationId, Application>>>,
}

impl InMemoryApplicationRepository {
    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<ApplicationId, Application>>, RepositoryError>
    {
        self.records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
    }
}

impl ApplicationRepository for InMemoryApplicationRepository {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.contains_key(&application.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard.get(id).cloned())
    }

    fn compare_and_set(
        &self,
        id: &ApplicationId,
        expected: StatusGuard,
        update: ApplicationUpdate,
    ) -> Result<Application, RepositoryError> {
        let mut guard = self.lock()?;
        let application = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        update.apply_guarded(application, expected)?;
        Ok(application.clone())
    }

    fn with_status(
        &self,
        status: ApplicationStatus,
        limit: usize,
    ) -> Result<Vec<Application>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .values()
            .filter(|application| application.status == status)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Push-delivery stand-in: logs each notification and keeps an outbox.
#[derive(Default, Clone)]
pub(crate) struct LogNotificationSink {
    outbox: Arc<Mutex<Vec<StatusNotification>>>,
}

impl LogNotificationSink {
    pub(crate) fn sent(&self) -> Vec<StatusNotification> {
        self.outbox
            .lock()
            .map(|outbox| outbox.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn send(&self, notification: StatusNotification) -> Result<(), NotificationError> {
        info!(
            recipient = %notification.recipient.0,
            title = %notification.title,
            body = %notification.body,
            "push notification"
        );
        self.outbox
            .lock()
            .map_err(|_| NotificationError::Transport("outbox mutex poisoned".to_string()))?
            .push(notification);
        Ok(())
    }
}

/// What the photo analysis collaborators report for one uploaded photo.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct PhotoFixture {
    pub(crate) gps: Option<Coordinates>,
    pub(crate) captured_at: Option<DateTime<Utc>>,
    pub(crate) shadow_angle: Option<f64>,
    pub(crate) serials: Vec<String>,
}

/// Panel counts visible in overhead imagery before and after installation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct SceneFixture {
    pub(crate) pre_install: Option<u32>,
    pub(crate) post_install: Option<u32>,
}

/// Deterministic stand-ins for the EXIF, shadow, OCR, ephemeris and imagery backends.
#[derive(Default, Clone)]
pub(crate) struct EvidenceFixtures {
    photos: Arc<Mutex<HashMap<String, PhotoFixture>>>,
    scenes: Arc<Mutex<HashMap<String, SceneFixture>>>,
    sun: Arc<Mutex<HashMap<String, SunPosition>>>,
}

impl EvidenceFixtures {
    pub(crate) fn register_photo(&self, key: impl Into<String>, fixture: PhotoFixture) {
        if let Ok(mut photos) = self.photos.lock() {
            photos.insert(key.into(), fixture);
        }
    }

    pub(crate) fn register_scene(&self, site: Coordinates, fixture: SceneFixture) {
        if let Ok(mut scenes) = self.scenes.lock() {
            scenes.insert(site_key(site), fixture);
        }
    }

    /// Sun position reported for `site`, whatever the capture time.
    pub(crate) fn register_sun(&self, site: Coordinates, position: SunPosition) {
        if let Ok(mut sun) = self.sun.lock() {
            sun.insert(site_key(site), position);
        }
    }

    fn photo(&self, key: &str) -> Result<Option<PhotoFixture>, CheckError> {
        self.photos
            .lock()
            .map(|photos| photos.get(key).cloned())
            .map_err(|_| CheckError::Unavailable("photo fixtures poisoned".to_string()))
    }
}

fn site_key(site: Coordinates) -> String {
    format!("{:.4},{:.4}", site.latitude, site.longitude)
}

#[async_trait]
impl PhotoMetadataReader for EvidenceFixtures {
    async fn read(&self, photo_key: &str) -> Result<PhotoMetadata, CheckError> {
        Ok(self
            .photo(photo_key)?
            .map(|photo| PhotoMetadata {
                gps: photo.gps,
                captured_at: photo.captured_at,
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl ShadowDetector for EvidenceFixtures {
    async fn detect_angle(&self, photo_key: &str) -> Result<f64, CheckError> {
        self.photo(photo_key)?
            .and_then(|photo| photo.shadow_angle)
            .ok_or_else(|| CheckError::Unavailable(format!("no measurable shadow in {photo_key}")))
    }
}

impl SolarPositionModel for EvidenceFixtures {
    fn position(&self, _at: DateTime<Utc>, site: Coordinates) -> Result<SunPosition, CheckError> {
        let key = site_key(site);
        self.sun
            .lock()
            .map_err(|_| CheckError::Unavailable("ephemeris fixtures poisoned".to_string()))?
            .get(&key)
            .copied()
            .ok_or_else(|| CheckError::Unavailable(format!("no solar ephemeris for site {key}")))
    }
}

#[async_trait]
impl SerialReader for EvidenceFixtures {
    async fn read_serials(&self, photo_key: &str) -> Result<Vec<String>, CheckError> {
        Ok(self
            .photo(photo_key)?
            .map(|photo| photo.serials)
            .unwrap_or_default())
    }
}

#[async_trait]
impl ImageryService for EvidenceFixtures {
    async fn fetch(
        &self,
        site: Coordinates,
        window: ImageryWindow,
    ) -> Result<Option<Imagery>, CheckError> {
        let scene = self
            .scenes
            .lock()
            .map(|scenes| scenes.get(&site_key(site)).copied())
            .map_err(|_| CheckError::Unavailable("scene fixtures poisoned".to_string()))?;
        let count = scene.and_then(|scene| match window.phase {
            ImageryPhase::PreInstall => scene.pre_install,
            ImageryPhase::PostInstall => scene.post_install,
        });
        Ok(count.map(|count| Imagery {
            phase: window.phase,
            content: count.to_le_bytes().to_vec(),
            source: "fixture".to_string(),
            captured_on: Some(window.to.date_naive().to_string()),
        }))
    }
}

/// Reads the panel count encoded in fixture imagery.
pub(crate) struct EncodedPanelDetector;

impl PanelDetector for EncodedPanelDetector {
    fn detect(&self, imagery: &Imagery) -> Result<PanelDetection, CheckError> {
        let bytes: [u8; 4] = imagery.content.as_slice().try_into().map_err(|_| {
            CheckError::InvalidInput(format!(
                "unexpected scene payload of {} bytes from {}",
                imagery.content.len(),
                imagery.source
            ))
        })?;
        let panel_count = u32::from_le_bytes(bytes);
        Ok(PanelDetection {
            panel_count,
            mean_confidence: if panel_count == 0 { 0.0 } else { 0.9 },
            area_sqm: f64::from(panel_count) * PANEL_AREA_SQM,
        })
    }
}

/// Annual yield from a fixed specific yield (kWh per installed kW).
pub(crate) struct SpecificYieldEstimator {
    pub(crate) kwh_per_kw: f64,
}

#[async_trait]
impl EnergyEstimator for SpecificYieldEstimator {
    async fn estimate(
        &self,
        _site: Coordinates,
        system_capacity_kw: f64,
    ) -> Result<EnergyEstimate, EnergyError> {
        if !system_capacity_kw.is_finite() || system_capacity_kw <= 0.0 {
            return Err(EnergyError::Unavailable(format!(
                "cannot estimate yield for {system_capacity_kw} kW"
            )));
        }
        Ok(EnergyEstimate {
            expected_annual_kwh: system_capacity_kw * self.kwh_per_kw,
        })
    }
}

pub(crate) fn default_equipment_registry() -> StaticEquipmentRegistry {
    StaticEquipmentRegistry::new()
        .with_entry("SERIAL-123456", "Mono PERC 540W", "SunVolt")
        .with_entry("SERIAL-987654", "String Inverter 5kW", "GridWave")
        .with_entry("INV-2024-0042", "Hybrid Inverter 3.6kW", "GridWave")
}

/// Wire the concrete check providers from configuration and collaborator fixtures.
pub(crate) fn build_providers(
    config: &VerificationConfig,
    fixtures: &EvidenceFixtures,
) -> CheckProviders {
    let shadow_source = fixtures.clone();
    let shadow_detector: Arc<LazyHandle<dyn ShadowDetector>> =
        Arc::new(LazyHandle::new("shadow-detector", move || {
            Ok(Arc::new(shadow_source.clone()) as Arc<dyn ShadowDetector>)
        }));
    let panel_detector: Arc<LazyHandle<dyn PanelDetector>> =
        Arc::new(LazyHandle::new("panel-detector", || {
            Ok(Arc::new(EncodedPanelDetector) as Arc<dyn PanelDetector>)
        }));
    let ocr_source = fixtures.clone();
    let serial_reader: Arc<LazyHandle<dyn SerialReader>> =
        Arc::new(LazyHandle::new("serial-ocr", move || {
            Ok(Arc::new(ocr_source.clone()) as Arc<dyn SerialReader>)
        }));

    CheckProviders {
        location: Arc::new(LocationProximityCheck::new(
            Arc::new(fixtures.clone()),
            config.gps_tolerance_meters,
        )),
        shadow: Arc::new(ShadowForensicsCheck::new(
            Arc::new(fixtures.clone()),
            shadow_detector,
        )),
        satellite: Arc::new(SatellitePanelDeltaCheck::new(
            Arc::new(fixtures.clone()),
            panel_detector,
        )),
        equipment: Arc::new(EquipmentSerialCheck::new(
            serial_reader,
            Arc::new(default_equipment_registry()),
        )),
        energy: Some(Arc::new(SpecificYieldEstimator { kwh_per_kw: 1_450.0 })),
    }
}
