use serde::{Deserialize, Serialize};

use super::checks::{CheckKind, CheckSet};

/// Per-check weights used by the aggregator.
///
/// Constructed only through [`WeightConfig::new`] (or deserialization, which routes through
/// it), so every instance has non-negative finite weights with a positive total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWeights", into = "RawWeights")]
pub struct WeightConfig {
    gps: f64,
    shadow: f64,
    satellite: f64,
    equipment: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawWeights {
    gps: f64,
    shadow: f64,
    satellite: f64,
    equipment: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WeightConfigError {
    #[error("weight for {check} must be a finite, non-negative number (found {value})")]
    InvalidWeight { check: &'static str, value: f64 },
    #[error("weights must sum to a positive total")]
    ZeroTotal,
}

impl WeightConfig {
    pub fn new(
        gps: f64,
        shadow: f64,
        satellite: f64,
        equipment: f64,
    ) -> Result<Self, WeightConfigError> {
        let config = Self {
            gps,
            shadow,
            satellite,
            equipment,
        };
        for kind in CheckKind::ALL {
            let value = config.weight(kind);
            if !value.is_finite() || value < 0.0 {
                return Err(WeightConfigError::InvalidWeight {
                    check: kind.weight_key(),
                    value,
                });
            }
        }
        if config.total() <= 0.0 {
            return Err(WeightConfigError::ZeroTotal);
        }
        Ok(config)
    }

    pub fn weight(&self, kind: CheckKind) -> f64 {
        match kind {
            CheckKind::LocationProximity => self.gps,
            CheckKind::ShadowForensics => self.shadow,
            CheckKind::SatellitePanelDelta => self.satellite,
            CheckKind::EquipmentSerial => self.equipment,
        }
    }

    pub fn total(&self) -> f64 {
        CheckKind::ALL.iter().map(|kind| self.weight(*kind)).sum()
    }
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            gps: 0.30,
            shadow: 0.20,
            satellite: 0.30,
            equipment: 0.20,
        }
    }
}

impl TryFrom<RawWeights> for WeightConfig {
    type Error = WeightConfigError;

    fn try_from(raw: RawWeights) -> Result<Self, Self::Error> {
        Self::new(raw.gps, raw.shadow, raw.satellite, raw.equipment)
    }
}

impl From<WeightConfig> for RawWeights {
    fn from(config: WeightConfig) -> Self {
        Self {
            gps: config.gps,
            shadow: config.shadow,
            satellite: config.satellite,
            equipment: config.equipment,
        }
    }
}

/// Round to four decimal places, the precision at which confidence is compared and stored.
pub fn round_confidence(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Weighted mean of all four check scores, rounded to four decimals.
///
/// Degraded checks take part with their 0.0 score; no kind is ever left out of the
/// denominator.
pub fn aggregate(checks: &CheckSet, weights: &WeightConfig) -> f64 {
    let weighted: f64 = CheckKind::ALL
        .iter()
        .map(|kind| checks.score(*kind) * weights.weight(*kind))
        .sum();
    let confidence = weighted / weights.total();
    round_confidence(confidence.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_and_non_finite_weights() {
        assert_eq!(
            WeightConfig::new(-0.1, 0.2, 0.3, 0.2),
            Err(WeightConfigError::InvalidWeight {
                check: "gps",
                value: -0.1
            })
        );
        assert!(matches!(
            WeightConfig::new(0.3, f64::NAN, 0.3, 0.2),
            Err(WeightConfigError::InvalidWeight { check: "shadow", .. })
        ));
    }

    #[test]
    fn rejects_all_zero_weights() {
        assert_eq!(
            WeightConfig::new(0.0, 0.0, 0.0, 0.0),
            Err(WeightConfigError::ZeroTotal)
        );
    }

    #[test]
    fn deserialization_goes_through_validation() {
        let parsed: WeightConfig =
            serde_json::from_str(r#"{"gps":0.3,"shadow":0.2,"satellite":0.3,"equipment":0.2}"#)
                .expect("valid weights parse");
        assert_eq!(parsed, WeightConfig::default());

        let invalid = serde_json::from_str::<WeightConfig>(
            r#"{"gps":0.0,"shadow":0.0,"satellite":0.0,"equipment":0.0}"#,
        );
        assert!(invalid.is_err());
    }

    #[test]
    fn rounding_keeps_four_decimals() {
        assert_eq!(round_confidence(0.123_449), 0.1234);
        assert_eq!(round_confidence(0.123_46), 0.1235);
        assert_eq!(round_confidence(0.7000000000000001), 0.7);
    }
}
