//! # gridrisk-core: shared foundations for risk-averse stochastic DC-OPF
//!
//! Provides the pieces every solver component needs:
//!
//! - [`GridRiskError`] / [`GridRiskResult`]: fail-fast error taxonomy
//! - [`RiskParameters`]: serde-backed configuration with permissive merging
//! - [`linalg`]: `sprs` helpers (block assembly, lower-triangular products)
//!
//! ## Quick Start
//!
//! ```rust
//! use gridrisk_core::RiskParameters;
//!
//! let params = RiskParameters::from_json_str(r#"{ "gamma": 0.9, "num_procs": 4 }"#).unwrap();
//! assert_eq!(params.num_procs, 4);
//! params.validate().unwrap();
//! ```

pub mod error;
pub mod linalg;
pub mod params;

pub use error::{GridRiskError, GridRiskResult};
pub use params::RiskParameters;
