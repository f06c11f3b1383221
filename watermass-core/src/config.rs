//! Analysis configuration
//!
//! Configuration is plain serde data with defaults for every field, so a TOML file
//! only needs to name what differs from the defaults:
//!
//! ```rust
//! use watermass_core::config::{BinningMethod, WatermassConfig};
//!
//! let config = WatermassConfig::from_toml_str(
//!     r#"
//!     [bins]
//!     kind = "uniform"
//!     start = 20.0
//!     stop = 30.0
//!     width = 0.5
//!
//!     [transformation]
//!     method = "vertical_remap"
//!     vertical_axis = 0
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.transformation.method, BinningMethod::VerticalRemap);
//! assert_eq!(config.bin_edges().unwrap().n_bins(), 20);
//! ```

use crate::bins::BinEdges;
use crate::errors::{WatermassError, WatermassResult};
use crate::field::FloatValue;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a weighted quantity is assigned to λ bins
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinningMethod {
    /// Each cell's contribution goes to the single bin containing its λ
    #[default]
    Histogram,
    /// Each cell's contribution is spread over the λ range spanned by a piecewise
    /// linear profile along the vertical axis
    VerticalRemap,
}

/// Which grid measure weights the tendency
///
/// The tendency of a per-level tracer (λ̇) is weighted by cell volume, while the
/// tendency of vertically integrated content (Λ̇) is weighted by cell area.
///
/// Both conventions accumulate the same `tendency * weight` product. The convention
/// records which measure the caller supplied and is checked against the inputs:
/// `vertical_remap` requires `Volume`, and with `Area` and a `vertical_axis` the
/// weight must not vary along that axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightConvention {
    #[default]
    Volume,
    Area,
}

impl fmt::Display for WeightConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightConvention::Volume => write!(f, "volume"),
            WeightConvention::Area => write!(f, "area"),
        }
    }
}

/// Settings controlling a single transformation calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformationConfig {
    /// Binning strategy
    ///
    /// Default: `histogram`
    pub method: BinningMethod,

    /// Grid measure used as the weight field
    ///
    /// Default: `volume`
    pub weight_convention: WeightConvention,

    /// Axis along which water columns run
    ///
    /// Required by `vertical_remap`, ignored by `histogram`.
    pub vertical_axis: Option<usize>,

    /// Fill value marking missing cells, in addition to NaN
    ///
    /// Model output commonly uses `1e20` over land.
    pub missing_value: Option<FloatValue>,

    /// Split histogram accumulation across threads
    ///
    /// Default: `false`
    pub parallel: bool,

    /// Minimum number of cells before parallel accumulation is used
    ///
    /// Default: 65536
    pub parallel_threshold: usize,
}

impl Default for TransformationConfig {
    fn default() -> Self {
        Self {
            method: BinningMethod::Histogram,
            weight_convention: WeightConvention::Volume,
            vertical_axis: None,
            missing_value: None,
            parallel: false,
            parallel_threshold: 65536,
        }
    }
}

impl TransformationConfig {
    /// Check that the settings can be honoured together
    pub fn validate(&self) -> WatermassResult<()> {
        if self.method == BinningMethod::VerticalRemap {
            if self.vertical_axis.is_none() {
                return Err(WatermassError::InvalidConfig(
                    "vertical_remap requires vertical_axis to be set".to_string(),
                ));
            }
            if self.weight_convention == WeightConvention::Area {
                return Err(WatermassError::InvalidConfig(
                    "vertical_remap cannot be used with vertically integrated (area weighted) tendencies"
                        .to_string(),
                ));
            }
        }
        if let Some(m) = self.missing_value {
            if m.is_nan() {
                return Err(WatermassError::InvalidConfig(
                    "missing_value must not be NaN; NaN is always treated as missing".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Definition of the λ bins for an analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BinSpec {
    /// Explicit list of edges
    Edges { edges: Vec<FloatValue> },
    /// Constant width bins covering `[start, stop]`
    Uniform {
        start: FloatValue,
        stop: FloatValue,
        width: FloatValue,
    },
    /// `count` equal bins spanning `[start, stop]`
    Linspace {
        start: FloatValue,
        stop: FloatValue,
        count: usize,
    },
}

impl Default for BinSpec {
    fn default() -> Self {
        // σ₂ range typical of the global ocean, 0.1 kg m-3 bins
        BinSpec::Uniform {
            start: 30.0,
            stop: 38.0,
            width: 0.1,
        }
    }
}

impl BinSpec {
    pub fn build(&self) -> WatermassResult<BinEdges> {
        match self {
            BinSpec::Edges { edges } => BinEdges::new(edges.clone()),
            BinSpec::Uniform { start, stop, width } => BinEdges::uniform(*start, *stop, *width),
            BinSpec::Linspace { start, stop, count } => BinEdges::linspace(*start, *stop, *count),
        }
    }
}

/// Top level configuration for a transformation analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermassConfig {
    pub bins: BinSpec,
    pub transformation: TransformationConfig,
}

impl WatermassConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(document: &str) -> WatermassResult<Self> {
        let config: Self = toml::from_str(document)?;
        config.validate()?;
        debug!(
            "Loaded configuration: method={:?}, weight_convention={}, bins={:?}",
            config.transformation.method, config.transformation.weight_convention, config.bins
        );
        Ok(config)
    }

    pub fn validate(&self) -> WatermassResult<()> {
        self.transformation.validate()?;
        self.bins.build().map(|_| ())
    }

    pub fn bin_edges(&self) -> WatermassResult<BinEdges> {
        self.bins.build()
    }
}
