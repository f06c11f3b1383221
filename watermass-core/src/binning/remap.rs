use crate::binning::{Accumulation, BinningStrategy};
use crate::bins::BinEdges;
use crate::errors::{WatermassError, WatermassResult};
use crate::field::{is_valid, ConformedFields, FloatValue};
use ndarray::{ArrayView1, Axis, Zip};
use serde::{Deserialize, Serialize};

/// Conservative remapping of each water column onto the λ bins
///
/// The histogram assigns a whole cell to one bin, which is noisy when the bins are
/// finer than the vertical change in λ between cells. Here λ is instead taken to vary
/// linearly through each column. The value at the interface between two cells is the
/// mean of their λ; at the top and bottom of a column, or next to a cell with missing
/// λ, the interface takes the cell's own value.
///
/// Each half of a cell carries half of its `tendency * weight`, spread uniformly over
/// the λ range between the cell centre and the interface. A half with no λ range falls
/// into a single bin using the histogram rule. Any share lying outside the bins is
/// dropped, so a column wholly within the bin range is conserved exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerticalRemapBinning {
    axis: usize,
}

impl VerticalRemapBinning {
    /// Remap along `axis`, the index of the vertical dimension
    pub fn new(axis: usize) -> Self {
        Self { axis }
    }

    pub fn axis(&self) -> usize {
        self.axis
    }
}

#[typetag::serde]
impl BinningStrategy for VerticalRemapBinning {
    fn name(&self) -> &'static str {
        "vertical_remap"
    }

    fn accumulate(
        &self,
        fields: &ConformedFields<'_>,
        edges: &BinEdges,
        missing_value: Option<FloatValue>,
    ) -> WatermassResult<Accumulation> {
        if self.axis >= fields.ndim() {
            return Err(WatermassError::InvalidConfig(format!(
                "vertical axis {} does not exist for fields with {} dimensions",
                self.axis,
                fields.ndim()
            )));
        }

        let axis = Axis(self.axis);
        let mut accumulation = Accumulation::empty(edges.n_bins());

        Zip::from(fields.lambda.lanes(axis))
            .and(fields.tendency.lanes(axis))
            .and(fields.weight.lanes(axis))
            .for_each(|lambda, tendency, weight| {
                remap_column(
                    lambda,
                    tendency,
                    weight,
                    edges,
                    missing_value,
                    &mut accumulation,
                )
            });

        Ok(accumulation)
    }
}

fn remap_column(
    lambda: ArrayView1<'_, FloatValue>,
    tendency: ArrayView1<'_, FloatValue>,
    weight: ArrayView1<'_, FloatValue>,
    edges: &BinEdges,
    missing_value: Option<FloatValue>,
    accumulation: &mut Accumulation,
) {
    let n_levels = lambda.len();
    let has_lambda = |k: usize| is_valid(lambda[k], missing_value);

    for k in 0..n_levels {
        let valid = has_lambda(k)
            && is_valid(tendency[k], missing_value)
            && is_valid(weight[k], missing_value);
        if !valid {
            accumulation.summary.missing_cells += 1;
            continue;
        }

        let centre = lambda[k];
        let upper = if k > 0 && has_lambda(k - 1) {
            0.5 * (lambda[k - 1] + centre)
        } else {
            centre
        };
        let lower = if k + 1 < n_levels && has_lambda(k + 1) {
            0.5 * (centre + lambda[k + 1])
        } else {
            centre
        };

        let half = 0.5 * tendency[k] * weight[k];
        let deposited = [upper, lower]
            .iter()
            .map(|&interface| {
                edges.deposit_interval(
                    interface.min(centre),
                    interface.max(centre),
                    half,
                    &mut accumulation.sums,
                )
            })
            .sum::<FloatValue>();

        if deposited > 0.0 {
            accumulation.summary.binned_cells += 1;
        } else {
            accumulation.summary.out_of_range_cells += 1;
        }
    }
}
