//! Risk-problem configuration.
//!
//! Parameters are plain serde data with defaults for every field, so a JSON
//! object may set any subset of them. Merging is deliberately permissive:
//! unrecognized keys are skipped with a warning instead of being rejected.

use crate::error::{GridRiskError, GridRiskResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::warn;

/// Parameters of the risk-averse two-stage problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskParameters {
    /// Upper cap on the risk multiplier.
    pub lam_max: f64,
    /// Softplus sharpness. Larger values approach the exact hinge.
    pub smax_param: f64,
    /// Quadratic regularization weight on `t`.
    pub t_reg: f64,
    /// Lower bound of `t`, as a multiple of `Qref`.
    pub t_min: f64,
    /// Upper bound of `t`, as a multiple of `Qref`.
    pub t_max: f64,
    /// `Qmax = q_fac * Qref`.
    #[serde(rename = "Qfac")]
    pub q_fac: f64,
    /// CVaR confidence level.
    pub gamma: f64,
    /// Monte Carlo sample count for expectations.
    pub num_samples: usize,
    /// Worker count for parallel expectations.
    pub num_procs: usize,
    /// Convex solver tolerance.
    pub tol: f64,
    /// Run the KKT self-check after every Lagrangian solve.
    pub debug: bool,
    /// Base seed; parallel worker `i` samples with `seed + i`.
    pub seed: u64,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            lam_max: 1e2,
            smax_param: 1e2,
            t_reg: 1e-8,
            t_min: -0.1,
            t_max: 0.0,
            q_fac: 0.8,
            gamma: 0.95,
            num_samples: 1000,
            num_procs: 10,
            tol: 1e-4,
            debug: false,
            seed: 0,
        }
    }
}

impl RiskParameters {
    /// Parse parameters from a JSON object; missing keys take defaults.
    pub fn from_json_str(json: &str) -> GridRiskResult<Self> {
        let overrides: Map<String, Value> = serde_json::from_str(json)?;
        let mut params = Self::default();
        params.set_parameters(&overrides)?;
        Ok(params)
    }

    /// Load parameters from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> GridRiskResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Merge `overrides` into these parameters.
    ///
    /// Keys that do not name a parameter are ignored (logged at warn level).
    /// Values of the wrong type are a parse error and leave `self` untouched.
    pub fn set_parameters(&mut self, overrides: &Map<String, Value>) -> GridRiskResult<()> {
        let mut next = self.clone();
        for (key, value) in overrides {
            match key.as_str() {
                "lam_max" => next.lam_max = field(key, value)?,
                "smax_param" => next.smax_param = field(key, value)?,
                "t_reg" => next.t_reg = field(key, value)?,
                "t_min" => next.t_min = field(key, value)?,
                "t_max" => next.t_max = field(key, value)?,
                "Qfac" => next.q_fac = field(key, value)?,
                "gamma" => next.gamma = field(key, value)?,
                "num_samples" => next.num_samples = field(key, value)?,
                "num_procs" => next.num_procs = field(key, value)?,
                "tol" => next.tol = field(key, value)?,
                "debug" => next.debug = field(key, value)?,
                "seed" => next.seed = field(key, value)?,
                _ => warn!(key = %key, "ignoring unrecognized risk parameter"),
            }
        }
        *self = next;
        Ok(())
    }

    /// Reject values that make the problem ill-posed.
    pub fn validate(&self) -> GridRiskResult<()> {
        if !(self.gamma > 0.0 && self.gamma < 1.0) {
            return Err(GridRiskError::Config(format!(
                "gamma must lie in (0, 1), got {}",
                self.gamma
            )));
        }
        let finite = [
            ("smax_param", self.smax_param),
            ("t_reg", self.t_reg),
            ("t_min", self.t_min),
            ("t_max", self.t_max),
            ("Qfac", self.q_fac),
            ("tol", self.tol),
        ];
        if let Some((name, value)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(GridRiskError::Config(format!("{} must be finite, got {}", name, value)));
        }
        // lam_max may be infinite (uncapped multiplier)
        if !(self.lam_max >= 0.0) {
            return Err(GridRiskError::Config(format!(
                "lam_max must be non-negative, got {}",
                self.lam_max
            )));
        }
        if self.smax_param <= 0.0 {
            return Err(GridRiskError::Config(format!(
                "smax_param must be positive, got {}",
                self.smax_param
            )));
        }
        if self.t_min > self.t_max {
            return Err(GridRiskError::Config(format!(
                "t_min ({}) exceeds t_max ({})",
                self.t_min, self.t_max
            )));
        }
        if self.q_fac <= 0.0 {
            return Err(GridRiskError::Config(format!(
                "Qfac must be positive, got {}",
                self.q_fac
            )));
        }
        if self.t_reg < 0.0 {
            return Err(GridRiskError::Config(format!(
                "t_reg must be non-negative, got {}",
                self.t_reg
            )));
        }
        if self.tol <= 0.0 {
            return Err(GridRiskError::Config(format!(
                "tol must be positive, got {}",
                self.tol
            )));
        }
        if self.num_samples == 0 || self.num_procs == 0 {
            return Err(GridRiskError::Config(
                "num_samples and num_procs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn field<T: DeserializeOwned>(key: &str, value: &Value) -> GridRiskResult<T> {
    T::deserialize(value).map_err(|e| GridRiskError::Parse(format!("{}: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let params = RiskParameters::default();
        assert_eq!(params.lam_max, 1e2);
        assert_eq!(params.gamma, 0.95);
        assert_eq!(params.q_fac, 0.8);
        assert_eq!(params.num_procs, 10);
        assert!(!params.debug);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_set_parameters_ignores_unknown_keys() {
        let mut params = RiskParameters::default();
        let overrides = json!({ "gamma": 0.9, "Qfac": 0.5, "not_a_param": 3 });
        params
            .set_parameters(overrides.as_object().unwrap())
            .unwrap();
        assert_eq!(params.gamma, 0.9);
        assert_eq!(params.q_fac, 0.5);
        assert_eq!(params.lam_max, 1e2);
    }

    #[test]
    fn test_set_parameters_rejects_wrong_type() {
        let mut params = RiskParameters::default();
        let overrides = json!({ "num_samples": "many" });
        assert!(params
            .set_parameters(overrides.as_object().unwrap())
            .is_err());
        assert_eq!(params, RiskParameters::default());
    }

    #[test]
    fn test_set_parameters_keeps_uncapped_lam_max() {
        let mut params = RiskParameters {
            lam_max: f64::INFINITY,
            ..Default::default()
        };
        let overrides = json!({ "gamma": 0.9 });
        params
            .set_parameters(overrides.as_object().unwrap())
            .unwrap();
        assert_eq!(params.gamma, 0.9);
        assert_eq!(params.lam_max, f64::INFINITY);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_nan() {
        let params = RiskParameters {
            lam_max: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(GridRiskError::Config(_))));
        let params = RiskParameters {
            t_min: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(GridRiskError::Config(_))));
    }

    #[test]
    fn test_from_json_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "num_samples": 64, "debug": true }}"#).unwrap();

        let params = RiskParameters::from_json_file(file.path()).unwrap();
        assert_eq!(params.num_samples, 64);
        assert!(params.debug);
        assert_eq!(params.smax_param, 1e2);
    }

    #[test]
    fn test_validate_rejects_bad_gamma() {
        let params = RiskParameters {
            gamma: 1.0,
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(GridRiskError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_inverted_t_bounds() {
        let params = RiskParameters {
            t_min: 0.5,
            t_max: 0.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
