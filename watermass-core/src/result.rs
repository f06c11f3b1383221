//! Binned transformation results and the quantities derived from them
//!
//! A binner produces the bin-integrated tendency
//!
//! $$S_n = \sum_{cells} \rho\dot\lambda \, V \, \Pi(\lambda_n, \lambda, \Delta\lambda_n)$$
//!
//! from which the watermass transformation follows as
//!
//! $$G(\lambda) = \frac{\partial}{\partial \lambda} \iiint_{\lambda' \le \lambda} \rho\dot\lambda \, dV
//!   \approx \frac{S_n}{\Delta\lambda_n}$$

use crate::bins::BinEdges;
use crate::config::WeightConvention;
use crate::field::FloatValue;
use ndarray::{s, Array1};
use serde::{Deserialize, Serialize};

/// Counts of how grid cells were treated during binning
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinningSummary {
    /// Cells that contributed to at least one bin
    pub binned_cells: usize,
    /// Cells excluded because λ, tendency or weight was missing
    pub missing_cells: usize,
    /// Valid cells whose λ lay entirely outside the bin range
    pub out_of_range_cells: usize,
}

impl BinningSummary {
    /// Combine the counts of two disjoint sets of cells
    pub fn merge(self, other: Self) -> Self {
        Self {
            binned_cells: self.binned_cells + other.binned_cells,
            missing_cells: self.missing_cells + other.missing_cells,
            out_of_range_cells: self.out_of_range_cells + other.out_of_range_cells,
        }
    }

    pub fn total_cells(&self) -> usize {
        self.binned_cells + self.missing_cells + self.out_of_range_cells
    }
}

/// Finite difference used to differentiate the cumulative integral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceScheme {
    /// One value per bin, located at the lower edge
    Forward,
    /// One value per interior edge
    Centred,
}

/// G(λ) sampled at a set of λ coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationProfile {
    pub lambda: Array1<FloatValue>,
    pub values: Array1<FloatValue>,
}

/// Per-bin accumulated tendency together with its bins
///
/// Produced fresh by each binning call and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationResult {
    edges: BinEdges,
    values: Array1<FloatValue>,
    weight_convention: WeightConvention,
    summary: BinningSummary,
}

impl TransformationResult {
    /// # Panics
    ///
    /// Panics if `values` does not hold one value per bin
    pub fn new(
        edges: BinEdges,
        values: Array1<FloatValue>,
        weight_convention: WeightConvention,
        summary: BinningSummary,
    ) -> Self {
        assert_eq!(
            values.len(),
            edges.n_bins(),
            "One value is required per bin"
        );
        Self {
            edges,
            values,
            weight_convention,
            summary,
        }
    }

    pub fn edges(&self) -> &BinEdges {
        &self.edges
    }

    /// Bin-integrated tendency, one value per bin
    ///
    /// Units are mass × tracer per time (e.g. kg K s⁻¹).
    pub fn values(&self) -> &Array1<FloatValue> {
        &self.values
    }

    pub fn n_bins(&self) -> usize {
        self.values.len()
    }

    pub fn weight_convention(&self) -> WeightConvention {
        self.weight_convention
    }

    pub fn summary(&self) -> &BinningSummary {
        &self.summary
    }

    /// Sum over all bins
    pub fn total(&self) -> FloatValue {
        self.values.sum()
    }

    /// Values divided by their bin widths
    ///
    /// This is the boxcar estimate of G(λ) for each bin (mass per time, e.g. kg s⁻¹).
    pub fn per_unit_lambda(&self) -> Array1<FloatValue> {
        &self.values / &self.edges.widths()
    }

    /// Integrated tendency over all water lighter than each edge
    ///
    /// Returns B+1 values; the first is always zero and the last equals [`total`](Self::total).
    pub fn cumulative(&self) -> Array1<FloatValue> {
        let mut cumulative = Array1::zeros(self.n_bins() + 1);
        let mut running = 0.0;
        for (n, value) in self.values.iter().enumerate() {
            running += value;
            cumulative[n + 1] = running;
        }
        cumulative
    }

    /// Differentiate the cumulative integral with respect to λ to give G(λ)
    ///
    /// The centred scheme needs at least two bins and returns an empty profile
    /// otherwise.
    pub fn transformation(&self, scheme: DifferenceScheme) -> TransformationProfile {
        let edges = self.edges.to_array();
        let cumulative = self.cumulative();

        match scheme {
            DifferenceScheme::Forward => TransformationProfile {
                lambda: edges.slice(s![..-1]).to_owned(),
                values: self.per_unit_lambda(),
            },
            DifferenceScheme::Centred => {
                let n_edges = edges.len();
                let interior = n_edges.saturating_sub(2);
                let values = (1..=interior)
                    .map(|i| {
                        (cumulative[i + 1] - cumulative[i - 1]) / (edges[i + 1] - edges[i - 1])
                    })
                    .collect();
                TransformationProfile {
                    lambda: edges.slice(s![1..n_edges - 1]).to_owned(),
                    values,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn result(edges: Vec<f64>, values: Array1<f64>) -> TransformationResult {
        TransformationResult::new(
            BinEdges::new(edges).unwrap(),
            values,
            WeightConvention::Volume,
            BinningSummary::default(),
        )
    }

    #[test]
    fn per_unit_lambda_divides_by_width() {
        let r = result(vec![0.0, 1.0, 3.0], array![4.0, 4.0]);
        assert_eq!(r.per_unit_lambda(), array![4.0, 2.0]);
    }

    #[test]
    fn cumulative_starts_at_zero() {
        let r = result(vec![0.0, 1.0, 2.0, 3.0], array![1.0, 2.0, 3.0]);
        assert_eq!(r.cumulative(), array![0.0, 1.0, 3.0, 6.0]);
        assert_eq!(r.total(), 6.0);
    }

    #[test]
    fn forward_difference_at_lower_edges() {
        let r = result(vec![0.0, 0.5, 1.0], array![1.0, 3.0]);
        let profile = r.transformation(DifferenceScheme::Forward);
        assert_eq!(profile.lambda, array![0.0, 0.5]);
        assert_eq!(profile.values, array![2.0, 6.0]);
    }

    #[test]
    fn centred_difference_at_interior_edges() {
        let r = result(vec![0.0, 1.0, 2.0, 4.0], array![2.0, 4.0, 6.0]);
        let profile = r.transformation(DifferenceScheme::Centred);
        assert_eq!(profile.lambda, array![1.0, 2.0]);
        // (2 + 4) / 2 and (4 + 6) / 3
        assert_relative_eq!(profile.values[0], 3.0);
        assert_relative_eq!(profile.values[1], 10.0 / 3.0);
    }

    #[test]
    fn centred_difference_single_bin_is_empty() {
        let r = result(vec![0.0, 1.0], array![2.0]);
        let profile = r.transformation(DifferenceScheme::Centred);
        assert!(profile.lambda.is_empty());
        assert!(profile.values.is_empty());
    }

    #[test]
    fn summary_merge() {
        let a = BinningSummary {
            binned_cells: 1,
            missing_cells: 2,
            out_of_range_cells: 3,
        };
        let merged = a.merge(a);
        assert_eq!(merged.binned_cells, 2);
        assert_eq!(merged.total_cells(), 12);
    }

    #[test]
    #[should_panic(expected = "One value is required per bin")]
    fn wrong_number_of_values() {
        result(vec![0.0, 1.0, 2.0], array![1.0]);
    }
}
