//! Transformation from tendencies binned online by the model
//!
//! Some models accumulate the diffusive tendency of locally-referenced density
//! directly on a pre-built density axis while they run, for example ρΛ̇ on σ₂ layers.
//! The density classes are then fixed by the model's layer edges rather than by a
//! post-hoc histogram. The binning itself is unchanged: every cell of layer `n`
//! carries λ equal to that layer's centre and is passed through the histogram
//! strategy.
//!
//! Layer tendencies may be vertically integrated within each layer (ρΛ̇, weighted by
//! cell area) or per-level (ρλ̇, weighted by layer volume). The configured
//! [`WeightConvention`] records which one the caller supplied.

use crate::binning::{HistogramBinning, TransformationBinner};
use crate::bins::BinEdges;
use crate::config::TransformationConfig;
use crate::errors::{WatermassError, WatermassResult};
use crate::field::{broadcast_shape, FloatValue};
use crate::result::TransformationResult;
use ndarray::{ArrayD, ArrayViewD};

/// Reduce layer tendencies accumulated on a density axis to a transformation result
///
/// # Arguments
///
/// * `layer_tendency` - tendency per layer, with the layers along `layer_axis`
/// * `weight` - cell area or layer volume, broadcastable to the shape of
///   `layer_tendency`
/// * `layer_axis` - index of the layer dimension
/// * `layer_edges` - the B+1 density edges bounding the B layers
/// * `config` - weight convention, missing value and parallelism settings; the
///   binning method is always the histogram
///
/// # Errors
///
/// * [`WatermassError::InvalidBins`] if `layer_edges` is malformed
/// * [`WatermassError::ShapeMismatch`] if the layer axis does not have one entry per
///   layer or `weight` does not broadcast
pub fn online_transformation(
    layer_tendency: ArrayViewD<'_, FloatValue>,
    weight: ArrayViewD<'_, FloatValue>,
    layer_axis: usize,
    layer_edges: &[FloatValue],
    config: &TransformationConfig,
) -> WatermassResult<TransformationResult> {
    let edges = BinEdges::new(layer_edges.to_vec())?;
    let shape = layer_tendency.shape().to_vec();

    if layer_axis >= shape.len() || shape[layer_axis] != edges.n_bins() {
        let mut expected = shape.clone();
        if layer_axis < expected.len() {
            expected[layer_axis] = edges.n_bins();
        }
        return Err(WatermassError::ShapeMismatch {
            field: "layer_tendency".to_string(),
            expected,
            found: shape,
        });
    }
    broadcast_shape(&[
        ("layer_tendency", shape.as_slice()),
        ("weight", weight.shape()),
    ])?;

    let centres = edges.centres();
    let lambda = ArrayD::from_shape_fn(shape.as_slice(), |idx| centres[idx[layer_axis]]);

    let binner = TransformationBinner::new(
        Box::new(HistogramBinning::new(
            config.parallel,
            config.parallel_threshold,
        )),
        config.weight_convention,
    )
    .with_missing_value(config.missing_value);

    binner.compute(lambda.view(), layer_tendency, weight, &edges)
}
