//! Watermass transformation diagnostics
//!
//! The watermass transformation $G(\lambda)$ is the net diabatic mass flux across a
//! contour of a materially conserved tracer λ (potential temperature, salinity or
//! density). It is estimated from model diagnostics by binning the diffusive tendency
//! of λ into λ classes:
//!
//! $$G(\lambda) = \frac{1}{\Delta\lambda} \sum_{cells} \rho\dot\lambda \, V \, \Pi(\lambda_n, \lambda, \Delta\lambda)$$
//!
//! * [`binning`] - the transformation binner and its strategies
//! * [`bins`] - the λ bin axis
//! * [`result`] - binned sums and G(λ) derived from them
//! * [`online`] - transformation from tendencies already binned on density layers
//! * [`budget`] - mass budget closure check
//! * [`config`] - TOML configuration

pub mod binning;
pub mod bins;
pub mod budget;
pub mod config;
pub mod errors;
pub mod field;
pub mod online;
pub mod python;
pub mod result;

pub use binning::{compute_transformation, TransformationBinner};
pub use bins::BinEdges;
pub use result::TransformationResult;
