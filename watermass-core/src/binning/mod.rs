//! Binning of weighted tendencies into λ classes
//!
//! The [`TransformationBinner`] turns three gridded fields into a
//! [`TransformationResult`]:
//!
//! * `lambda` - the tracer coordinate λ of each cell
//! * `tendency` - the diffusive tendency ρλ̇ (or ρΛ̇ for vertically integrated content)
//! * `weight` - the grid measure, cell volume V or cell area A
//!
//! How a cell's `tendency * weight` is assigned to bins is delegated to a
//! [`BinningStrategy`]. Two strategies are provided:
//!
//! * [`HistogramBinning`] - the boxcar histogram-sum; each cell lands in the single bin
//!   containing its λ
//! * [`VerticalRemapBinning`] - spreads each cell over the λ range it spans along the
//!   vertical axis
//!
//! Cells whose λ, tendency or weight is missing (NaN, infinite or the configured fill
//! value) are skipped. Cells whose λ lies outside the bin range are dropped from the
//! sum; both are counted in the result's [`BinningSummary`].
//!
//! # Examples
//!
//! ```rust
//! use ndarray::array;
//! use watermass_core::binning::compute_transformation;
//!
//! let lambda = array![0.5, 1.0, 1.5, 3.0].into_dyn();
//! let tendency = array![1.0, 2.0, 3.0, 4.0].into_dyn();
//! let volume = array![10.0, 10.0, 10.0, 10.0].into_dyn();
//!
//! let result =
//!     compute_transformation(lambda.view(), tendency.view(), volume.view(), &[0.0, 1.0, 2.0])
//!         .unwrap();
//!
//! // λ = 3.0 is outside the bins and is dropped
//! assert_eq!(result.values().to_vec(), vec![10.0, 50.0]);
//! assert_eq!(result.summary().out_of_range_cells, 1);
//! ```

mod histogram;
mod remap;

pub use histogram::HistogramBinning;
pub use remap::VerticalRemapBinning;

use crate::bins::BinEdges;
use crate::config::{BinningMethod, TransformationConfig, WeightConvention};
use crate::errors::{WatermassError, WatermassResult};
use crate::field::{ConformedFields, FloatValue};
use crate::result::{BinningSummary, TransformationResult};
use log::{debug, warn};
use ndarray::{Array1, ArrayViewD};
use serde::{Deserialize, Serialize};

/// Per-bin partial sums and cell counts
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulation {
    pub sums: Vec<FloatValue>,
    pub summary: BinningSummary,
}

impl Accumulation {
    pub fn empty(n_bins: usize) -> Self {
        Self {
            sums: vec![0.0; n_bins],
            summary: BinningSummary::default(),
        }
    }

    /// Combine the partial sums of two disjoint sets of cells
    pub fn merge(mut self, other: Self) -> Self {
        self.sums
            .iter_mut()
            .zip(other.sums.iter())
            .for_each(|(a, b)| *a += b);
        self.summary = self.summary.merge(other.summary);
        self
    }
}

/// A way of assigning a weighted quantity to λ bins
///
/// Implementations must be pure: the same fields always give the same sums (up to
/// floating point summation order).
#[typetag::serde(tag = "type")]
pub trait BinningStrategy: std::fmt::Debug + Send + Sync {
    /// Short name used in log messages
    fn name(&self) -> &'static str;

    /// Accumulate `tendency * weight` of every valid cell into the bins
    fn accumulate(
        &self,
        fields: &ConformedFields<'_>,
        edges: &BinEdges,
        missing_value: Option<FloatValue>,
    ) -> WatermassResult<Accumulation>;
}

/// Computes binned transformation from gridded fields
#[derive(Debug, Serialize, Deserialize)]
pub struct TransformationBinner {
    strategy: Box<dyn BinningStrategy>,
    weight_convention: WeightConvention,
    missing_value: Option<FloatValue>,
    #[serde(default)]
    vertical_axis: Option<usize>,
}

impl TransformationBinner {
    pub fn new(strategy: Box<dyn BinningStrategy>, weight_convention: WeightConvention) -> Self {
        Self {
            strategy,
            weight_convention,
            missing_value: None,
            vertical_axis: None,
        }
    }

    /// Sequential histogram binning with volume weights
    pub fn histogram() -> Self {
        Self::new(
            Box::new(HistogramBinning::default()),
            WeightConvention::Volume,
        )
    }

    /// Build the binner described by a configuration
    pub fn from_config(config: &TransformationConfig) -> WatermassResult<Self> {
        config.validate()?;

        let strategy: Box<dyn BinningStrategy> = match config.method {
            BinningMethod::Histogram => Box::new(HistogramBinning::new(
                config.parallel,
                config.parallel_threshold,
            )),
            BinningMethod::VerticalRemap => {
                let axis = config.vertical_axis.ok_or_else(|| {
                    WatermassError::InvalidConfig(
                        "vertical_remap requires vertical_axis to be set".to_string(),
                    )
                })?;
                Box::new(VerticalRemapBinning::new(axis))
            }
        };

        Ok(Self::new(strategy, config.weight_convention)
            .with_missing_value(config.missing_value)
            .with_vertical_axis(config.vertical_axis))
    }

    /// Treat `missing_value` as missing in addition to NaN
    pub fn with_missing_value(mut self, missing_value: Option<FloatValue>) -> Self {
        self.missing_value = missing_value;
        self
    }

    /// Index of the vertical dimension of the full fields
    ///
    /// With [`WeightConvention::Area`] the weight is then checked to be constant along
    /// this axis.
    pub fn with_vertical_axis(mut self, vertical_axis: Option<usize>) -> Self {
        self.vertical_axis = vertical_axis;
        self
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn weight_convention(&self) -> WeightConvention {
        self.weight_convention
    }

    /// Bin `tendency * weight` by `lambda`
    ///
    /// # Errors
    ///
    /// * [`WatermassError::ShapeMismatch`] if the fields do not broadcast to a common
    ///   shape
    /// * [`WatermassError::InvalidConfig`] if area weights vary along the vertical axis
    pub fn compute(
        &self,
        lambda: ArrayViewD<'_, FloatValue>,
        tendency: ArrayViewD<'_, FloatValue>,
        weight: ArrayViewD<'_, FloatValue>,
        edges: &BinEdges,
    ) -> WatermassResult<TransformationResult> {
        let fields = ConformedFields::conform(&lambda, &tendency, &weight)?;
        self.check_weight_convention(&weight, fields.ndim())?;
        let accumulation = self
            .strategy
            .accumulate(&fields, edges, self.missing_value)?;

        let summary = accumulation.summary;
        debug!(
            "{} binning over {} bins ({} weights): {} cells binned, {} missing, {} out of range",
            self.strategy.name(),
            edges.n_bins(),
            self.weight_convention,
            summary.binned_cells,
            summary.missing_cells,
            summary.out_of_range_cells
        );
        if summary.binned_cells == 0 && summary.total_cells() > 0 {
            if summary.missing_cells == summary.total_cells() {
                warn!("All {} cells have missing values", summary.total_cells());
            } else {
                warn!(
                    "No cells fell within the bin range [{}, {}]",
                    edges.first(),
                    edges.last()
                );
            }
        }

        Ok(TransformationResult::new(
            edges.clone(),
            Array1::from(accumulation.sums),
            self.weight_convention,
            summary,
        ))
    }
}

impl TransformationBinner {
    /// An area weight is a 2-D measure; one spanning several levels is a volume
    fn check_weight_convention(
        &self,
        weight: &ArrayViewD<'_, FloatValue>,
        ndim: usize,
    ) -> WatermassResult<()> {
        let axis = match (self.weight_convention, self.vertical_axis) {
            (WeightConvention::Area, Some(axis)) => axis,
            _ => return Ok(()),
        };
        // Weight axes align with the trailing axes of the conformed fields
        let offset = ndim - weight.ndim();
        if axis >= offset && axis < ndim && weight.shape()[axis - offset] > 1 {
            return Err(WatermassError::InvalidConfig(format!(
                "area weights must not vary along vertical axis {}, got weight shape {:?}",
                axis,
                weight.shape()
            )));
        }
        Ok(())
    }
}

impl Default for TransformationBinner {
    fn default() -> Self {
        Self::histogram()
    }
}

/// Bin `tendency * weight` by `lambda` using the boxcar histogram
///
/// `bin_edges` must hold at least two strictly increasing values. A cell is assigned
/// to bin `n` when `bin_edges[n] <= lambda < bin_edges[n + 1]`; a cell exactly on the
/// final edge belongs to the last bin. Cells outside `[bin_edges[0], bin_edges[B]]`
/// are dropped and cells with missing values are skipped.
///
/// # Errors
///
/// * [`WatermassError::InvalidBins`] if `bin_edges` is malformed
/// * [`WatermassError::ShapeMismatch`] if the fields do not broadcast together
pub fn compute_transformation(
    lambda: ArrayViewD<'_, FloatValue>,
    tendency: ArrayViewD<'_, FloatValue>,
    weight: ArrayViewD<'_, FloatValue>,
    bin_edges: &[FloatValue],
) -> WatermassResult<TransformationResult> {
    let edges = BinEdges::new(bin_edges.to_vec())?;
    TransformationBinner::histogram().compute(lambda, tendency, weight, &edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array, ArrayD, IxDyn};

    #[test]
    fn interior_edge_goes_to_upper_bin() {
        let lambda = array![1.0].into_dyn();
        let tendency = array![5.0].into_dyn();
        let weight = array![1.0].into_dyn();

        let edges = [0.0, 1.0, 2.0];

        let result =
            compute_transformation(lambda.view(), tendency.view(), weight.view(), &edges).unwrap();
        assert_eq!(result.values().to_vec(), vec![0.0, 5.0]);
    }

    #[test]
    fn final_edge_goes_to_last_bin() {
        let lambda = array![2.0].into_dyn();
        let tendency = array![5.0].into_dyn();
        let weight = array![1.0].into_dyn();

        let edges = [0.0, 1.0, 2.0];

        let result =
            compute_transformation(lambda.view(), tendency.view(), weight.view(), &edges).unwrap();
        assert_eq!(result.values().to_vec(), vec![0.0, 5.0]);
    }

    #[test]
    fn invalid_bins() {
        let field = array![1.0].into_dyn();
        for edges in [&[5.0, 3.0, 1.0][..], &[1.0][..]] {
            let result = compute_transformation(field.view(), field.view(), field.view(), edges);
            assert!(matches!(result, Err(WatermassError::InvalidBins(_))));
        }
    }

    #[test]
    fn shape_mismatch() {
        let lambda: ArrayD<f64> = Array::zeros(IxDyn(&[10, 10]));
        let tendency: ArrayD<f64> = Array::zeros(IxDyn(&[5, 5]));
        let weight: ArrayD<f64> = Array::ones(IxDyn(&[10, 10]));

        let result =
            compute_transformation(lambda.view(), tendency.view(), weight.view(), &[0.0, 1.0]);
        assert!(matches!(result, Err(WatermassError::ShapeMismatch { .. })));
    }

    #[test]
    fn missing_cells_are_skipped() {
        let lambda = array![0.5, f64::NAN, 0.5, 0.5].into_dyn();
        let tendency = array![1.0, 1.0, f64::NAN, 1e20].into_dyn();
        let weight = array![1.0, 1.0, 1.0, 1.0].into_dyn();

        let binner = TransformationBinner::histogram().with_missing_value(Some(1e20));
        let edges = BinEdges::new(vec![0.0, 1.0]).unwrap();
        let result = binner
            .compute(lambda.view(), tendency.view(), weight.view(), &edges)
            .unwrap();

        assert_eq!(result.values().to_vec(), vec![1.0]);
        assert_eq!(result.summary().binned_cells, 1);
        assert_eq!(result.summary().missing_cells, 3);
    }

    #[test]
    fn from_config_selects_strategy() {
        let config = TransformationConfig {
            method: BinningMethod::VerticalRemap,
            vertical_axis: Some(0),
            ..Default::default()
        };
        let binner = TransformationBinner::from_config(&config).unwrap();
        assert_eq!(binner.strategy_name(), "vertical_remap");

        let binner = TransformationBinner::from_config(&TransformationConfig::default()).unwrap();
        assert_eq!(binner.strategy_name(), "histogram");
    }

    #[test]
    fn binner_serialisation_round_trip() {
        let binner = TransformationBinner::new(
            Box::new(VerticalRemapBinning::new(1)),
            WeightConvention::Volume,
        )
        .with_missing_value(Some(1e20));

        let serialised = toml::to_string(&binner).unwrap();
        let deserialised: TransformationBinner = toml::from_str(&serialised).unwrap();

        assert_eq!(deserialised.strategy_name(), "vertical_remap");
        assert_eq!(deserialised.missing_value, Some(1e20));
        assert_eq!(toml::to_string(&deserialised).unwrap(), serialised);
    }

    #[test]
    fn area_weight_spanning_vertical_axis_is_rejected() {
        let config = TransformationConfig {
            weight_convention: WeightConvention::Area,
            vertical_axis: Some(0),
            ..Default::default()
        };
        let binner = TransformationBinner::from_config(&config).unwrap();
        let edges = BinEdges::new(vec![0.0, 1.0]).unwrap();
        let lambda: ArrayD<f64> = Array::from_elem(IxDyn(&[3, 2]), 0.5);
        let tendency: ArrayD<f64> = Array::ones(IxDyn(&[3, 2]));

        // A (level, x) weight is a volume
        let volume: ArrayD<f64> = Array::ones(IxDyn(&[3, 2]));
        let result = binner.compute(lambda.view(), tendency.view(), volume.view(), &edges);
        assert!(matches!(result, Err(WatermassError::InvalidConfig(_))));

        // A horizontal area broadcasts over the levels
        let area: ArrayD<f64> = Array::from_elem(IxDyn(&[2]), 2.0);
        let result = binner
            .compute(lambda.view(), tendency.view(), area.view(), &edges)
            .unwrap();
        assert_eq!(result.values().to_vec(), vec![12.0]);
    }

    #[test]
    fn all_missing_cells_give_empty_result() {
        let lambda = array![f64::NAN, f64::NAN].into_dyn();
        let tendency = array![1.0, 1.0].into_dyn();
        let weight = array![1.0, 1.0].into_dyn();

        let result =
            compute_transformation(lambda.view(), tendency.view(), weight.view(), &[0.0, 1.0])
                .unwrap();
        assert_eq!(result.values().to_vec(), vec![0.0]);
        assert_eq!(result.summary().missing_cells, 2);
        assert_eq!(result.summary().out_of_range_cells, 0);
    }

    #[test]
    fn accumulation_merge() {
        let mut a = Accumulation::empty(2);
        a.sums = vec![1.0, 2.0];
        a.summary.binned_cells = 2;
        let mut b = Accumulation::empty(2);
        b.sums = vec![0.5, 0.5];
        b.summary.missing_cells = 1;

        let merged = a.merge(b);
        assert_eq!(merged.sums, vec![1.5, 2.5]);
        assert_eq!(merged.summary.total_cells(), 3);
    }
}
