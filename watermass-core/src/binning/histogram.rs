use crate::binning::{Accumulation, BinningStrategy};
use crate::bins::BinEdges;
use crate::errors::WatermassResult;
use crate::field::{is_valid, ConformedFields, FloatValue};
use ndarray::{ArrayViewD, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Boxcar histogram-sum
///
/// Each valid cell adds `tendency * weight` to the one bin containing its λ:
///
/// $$S_n = \sum_{cells} \rho\dot\lambda \, V \, \Pi(\lambda_n, \lambda, \Delta\lambda)$$
///
/// With `parallel` enabled, fields of at least `parallel_threshold` cells are split along
/// their outermost axis and the partial sums merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramBinning {
    parallel: bool,
    parallel_threshold: usize,
}

impl HistogramBinning {
    pub fn new(parallel: bool, parallel_threshold: usize) -> Self {
        Self {
            parallel,
            parallel_threshold,
        }
    }

    /// Parallel binning for any field with more than one cell along its outer axis
    pub fn parallel() -> Self {
        Self::new(true, 0)
    }

    fn use_parallel(&self, fields: &ConformedFields<'_>) -> bool {
        self.parallel
            && fields.ndim() > 0
            && fields.shape()[0] > 1
            && fields.len() >= self.parallel_threshold
    }
}

impl Default for HistogramBinning {
    fn default() -> Self {
        Self::new(false, 65536)
    }
}

#[typetag::serde]
impl BinningStrategy for HistogramBinning {
    fn name(&self) -> &'static str {
        "histogram"
    }

    fn accumulate(
        &self,
        fields: &ConformedFields<'_>,
        edges: &BinEdges,
        missing_value: Option<FloatValue>,
    ) -> WatermassResult<Accumulation> {
        if !self.use_parallel(fields) {
            return Ok(accumulate_block(
                &fields.lambda,
                &fields.tendency,
                &fields.weight,
                edges,
                missing_value,
            ));
        }

        let blocks: Vec<_> = fields
            .lambda
            .outer_iter()
            .zip(fields.tendency.outer_iter())
            .zip(fields.weight.outer_iter())
            .map(|((lambda, tendency), weight)| (lambda, tendency, weight))
            .collect();

        Ok(blocks
            .par_iter()
            .map(|(lambda, tendency, weight)| {
                accumulate_block(lambda, tendency, weight, edges, missing_value)
            })
            .reduce(|| Accumulation::empty(edges.n_bins()), Accumulation::merge))
    }
}

fn accumulate_block(
    lambda: &ArrayViewD<'_, FloatValue>,
    tendency: &ArrayViewD<'_, FloatValue>,
    weight: &ArrayViewD<'_, FloatValue>,
    edges: &BinEdges,
    missing_value: Option<FloatValue>,
) -> Accumulation {
    let mut accumulation = Accumulation::empty(edges.n_bins());

    Zip::from(lambda)
        .and(tendency)
        .and(weight)
        .for_each(|&l, &t, &w| {
            let valid = is_valid(l, missing_value)
                && is_valid(t, missing_value)
                && is_valid(w, missing_value);
            if !valid {
                accumulation.summary.missing_cells += 1;
                return;
            }
            match edges.find_bin(l) {
                Some(n) => {
                    accumulation.sums[n] += t * w;
                    accumulation.summary.binned_cells += 1;
                }
                None => accumulation.summary.out_of_range_cells += 1,
            }
        });

    accumulation
}
