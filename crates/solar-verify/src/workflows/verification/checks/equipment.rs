use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::handle::LazyHandle;
use super::{CheckError, CheckKind, CheckProvider, CheckResult, EquipmentFinding, EquipmentInput};

/// OCR collaborator extracting candidate serial numbers from a close-up photo.
#[async_trait]
pub trait SerialReader: Send + Sync {
    async fn read_serials(&self, photo_key: &str) -> Result<Vec<String>, CheckError>;
}

/// Registry entry for an approved module or inverter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovedEquipment {
    pub model: String,
    pub manufacturer: String,
}

/// Approved-equipment registry lookup.
pub trait EquipmentRegistry: Send + Sync {
    fn lookup(&self, serial: &str) -> Option<ApprovedEquipment>;
}

/// In-memory registry seeded from configuration or fixtures.
#[derive(Debug, Clone, Default)]
pub struct StaticEquipmentRegistry {
    entries: HashMap<String, ApprovedEquipment>,
}

impl StaticEquipmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(
        mut self,
        serial: impl Into<String>,
        model: impl Into<String>,
        manufacturer: impl Into<String>,
    ) -> Self {
        self.entries.insert(
            normalize_serial(&serial.into()),
            ApprovedEquipment {
                model: model.into(),
                manufacturer: manufacturer.into(),
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl EquipmentRegistry for StaticEquipmentRegistry {
    fn lookup(&self, serial: &str) -> Option<ApprovedEquipment> {
        self.entries.get(&normalize_serial(serial)).cloned()
    }
}

fn normalize_serial(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Tier-2 check verifying photographed serial numbers against the registry.
pub struct EquipmentSerialCheck {
    reader: Arc<LazyHandle<dyn SerialReader>>,
    registry: Arc<dyn EquipmentRegistry>,
}

impl EquipmentSerialCheck {
    pub fn new(
        reader: Arc<LazyHandle<dyn SerialReader>>,
        registry: Arc<dyn EquipmentRegistry>,
    ) -> Self {
        Self { reader, registry }
    }
}

#[async_trait]
impl CheckProvider for EquipmentSerialCheck {
    type Input = EquipmentInput;

    fn kind(&self) -> CheckKind {
        CheckKind::EquipmentSerial
    }

    async fn evaluate(&self, input: EquipmentInput) -> Result<CheckResult, CheckError> {
        let reader = self.reader.get()?;
        let detected: Vec<String> = reader
            .read_serials(&input.serial_photo_key)
            .await?
            .iter()
            .map(|serial| normalize_serial(serial))
            .filter(|serial| !serial.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let verified: Vec<String> = detected
            .iter()
            .filter(|serial| self.registry.lookup(serial).is_some())
            .cloned()
            .collect();

        let (score, reasoning) = if detected.is_empty() {
            (
                0.1,
                "No legible serial numbers could be extracted from the image.".to_string(),
            )
        } else if verified.len() == detected.len() {
            (
                1.0,
                format!(
                    "All {} detected serial numbers match the approved equipment list.",
                    verified.len()
                ),
            )
        } else if !verified.is_empty() {
            (
                0.7,
                format!(
                    "{} out of {} serials verified. Non-matching serials detected.",
                    verified.len(),
                    detected.len()
                ),
            )
        } else {
            (
                0.0,
                format!(
                    "None of the {} detected serial numbers matched the approved equipment list.",
                    detected.len()
                ),
            )
        };

        Ok(CheckResult::EquipmentSerial(EquipmentFinding {
            score,
            reasoning,
            detected_serials: detected,
            verified_serials: verified,
        }))
    }
}
