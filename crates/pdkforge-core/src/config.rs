use serde::de::Error as _;
use serde::{Deserialize, Serialize};

use crate::geometry::EPSILON;

/// Numerical tolerances used when building layouts.
///
/// The two values are independent: `shape_epsilon` is an absolute coordinate
/// tolerance in µm, `abutment_tolerance` is the relative area tolerance of
/// the multi-net consistency check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTolerances")]
pub struct Tolerances {
    pub shape_epsilon: f64,
    pub abutment_tolerance: f64,
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawTolerances {
    shape_epsilon: f64,
    abutment_tolerance: f64,
}

impl Default for RawTolerances {
    fn default() -> Self {
        let tol = Tolerances::default();
        Self {
            shape_epsilon: tol.shape_epsilon,
            abutment_tolerance: tol.abutment_tolerance,
        }
    }
}

impl TryFrom<RawTolerances> for Tolerances {
    type Error = String;

    fn try_from(raw: RawTolerances) -> Result<Self, Self::Error> {
        let tol = Tolerances {
            shape_epsilon: raw.shape_epsilon,
            abutment_tolerance: raw.abutment_tolerance,
        };
        tol.validate()?;
        Ok(tol)
    }
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            shape_epsilon: EPSILON,
            abutment_tolerance: 1e-4,
        }
    }
}

impl Tolerances {
    /// Both values must be finite and strictly positive.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("shape_epsilon", self.shape_epsilon),
            ("abutment_tolerance", self.abutment_tolerance),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("{name} has to be a positive number, got {value}"));
            }
        }
        Ok(())
    }

    /// Load from a JSON object; missing fields keep their default value.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if !value.is_object() {
            return Err(serde_json::Error::custom("tolerances have to be a JSON object"));
        }
        serde_json::from_value(value)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
