//! Bin axis in λ-space
//!
//! [`BinEdges`] partitions the tracer coordinate λ into B contiguous intervals defined
//! by B+1 strictly increasing edges. Bins are half-open, $[\lambda_n, \lambda_{n+1})$,
//! except the last bin which also includes the final edge. Values outside
//! $[\lambda_0, \lambda_B]$ belong to no bin.
//!
//! # Examples
//!
//! ```rust
//! use watermass_core::bins::BinEdges;
//!
//! let edges = BinEdges::new(vec![0.0, 1.0, 2.0]).unwrap();
//! assert_eq!(edges.n_bins(), 2);
//!
//! // Interior edges belong to the upper bin
//! assert_eq!(edges.find_bin(1.0), Some(1));
//! // The final edge closes the last bin
//! assert_eq!(edges.find_bin(2.0), Some(1));
//! // Out of range values are dropped
//! assert_eq!(edges.find_bin(2.5), None);
//! ```

use crate::errors::{WatermassError, WatermassResult};
use crate::field::FloatValue;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Strictly increasing bin edges
///
/// Constructed once per analysis and never mutated. Validation happens on
/// construction and on deserialisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FloatValue>", into = "Vec<FloatValue>")]
pub struct BinEdges {
    edges: Vec<FloatValue>,
}

impl BinEdges {
    /// Create bin edges from an explicit sequence
    ///
    /// # Errors
    ///
    /// Returns [`WatermassError::InvalidBins`] if fewer than 2 edges are given, if any
    /// edge is not finite or if the edges are not strictly increasing.
    pub fn new(edges: Vec<FloatValue>) -> WatermassResult<Self> {
        if edges.len() < 2 {
            return Err(WatermassError::InvalidBins(format!(
                "at least 2 edges are required, got {}",
                edges.len()
            )));
        }
        if let Some(value) = edges.iter().find(|e| !e.is_finite()) {
            return Err(WatermassError::InvalidBins(format!(
                "edges must be finite, got {}",
                value
            )));
        }
        if let Some(i) = edges.windows(2).position(|w| w[1] <= w[0]) {
            return Err(WatermassError::InvalidBins(format!(
                "edges must be strictly increasing, edge {} ({}) is not greater than edge {} ({})",
                i + 1,
                edges[i + 1],
                i,
                edges[i]
            )));
        }

        Ok(Self { edges })
    }

    /// Create bins of constant width `width` starting at `start`
    ///
    /// The last edge is the first edge greater than or equal to `stop`, so the bins
    /// always cover `[start, stop]`.
    ///
    /// ```rust
    /// use watermass_core::bins::BinEdges;
    ///
    /// let edges = BinEdges::uniform(20.0, 22.0, 0.5).unwrap();
    /// assert_eq!(edges.as_slice(), &[20.0, 20.5, 21.0, 21.5, 22.0]);
    /// ```
    pub fn uniform(
        start: FloatValue,
        stop: FloatValue,
        width: FloatValue,
    ) -> WatermassResult<Self> {
        if !(width > 0.0) || !width.is_finite() {
            return Err(WatermassError::InvalidBins(format!(
                "bin width must be positive and finite, got {}",
                width
            )));
        }
        if !(stop > start) {
            return Err(WatermassError::InvalidBins(format!(
                "stop ({}) must be greater than start ({})",
                stop, start
            )));
        }

        // Tolerate floating point error in (stop - start) / width
        let n_bins = ((stop - start) / width - 1e-9).ceil().max(1.0) as usize;
        let edges = (0..=n_bins)
            .map(|i| start + i as FloatValue * width)
            .collect();
        Self::new(edges)
    }

    /// Create `n_bins` equally sized bins spanning `[start, stop]`
    pub fn linspace(start: FloatValue, stop: FloatValue, n_bins: usize) -> WatermassResult<Self> {
        if n_bins == 0 {
            return Err(WatermassError::InvalidBins(
                "at least one bin is required".to_string(),
            ));
        }
        let edges = Array1::linspace(start, stop, n_bins + 1).to_vec();
        Self::new(edges)
    }

    /// Number of bins (one fewer than the number of edges)
    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn as_slice(&self) -> &[FloatValue] {
        &self.edges
    }

    pub fn to_array(&self) -> Array1<FloatValue> {
        Array1::from(self.edges.clone())
    }

    /// Lowest edge
    pub fn first(&self) -> FloatValue {
        self.edges[0]
    }

    /// Highest edge
    pub fn last(&self) -> FloatValue {
        self.edges[self.edges.len() - 1]
    }

    /// Width Δλ of every bin
    pub fn widths(&self) -> Array1<FloatValue> {
        self.edges.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Midpoint of every bin
    pub fn centres(&self) -> Array1<FloatValue> {
        self.edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }

    /// Whether `value` lies within `[first, last]`
    pub fn contains(&self, value: FloatValue) -> bool {
        value >= self.first() && value <= self.last()
    }

    /// Index of the bin containing `value`
    ///
    /// Returns `None` for values outside the bin range and for NaN.
    pub fn find_bin(&self, value: FloatValue) -> Option<usize> {
        if !self.contains(value) {
            return None;
        }
        if value == self.last() {
            return Some(self.n_bins() - 1);
        }
        // Number of edges <= value is at least 1 here
        Some(self.edges.partition_point(|e| *e <= value) - 1)
    }

    /// Spread `amount` uniformly over the interval `[lo, hi)` and add each bin's share
    /// to `sums`
    ///
    /// The share of the interval lying outside the bin range is dropped. A degenerate
    /// interval (`lo == hi`) is assigned like a point with [`find_bin`](Self::find_bin).
    /// Returns the fraction of `amount` that was deposited.
    pub(crate) fn deposit_interval(
        &self,
        lo: FloatValue,
        hi: FloatValue,
        amount: FloatValue,
        sums: &mut [FloatValue],
    ) -> FloatValue {
        debug_assert!(hi >= lo);
        debug_assert_eq!(sums.len(), self.n_bins());

        let span = hi - lo;
        if span <= 0.0 {
            return match self.find_bin(lo) {
                Some(n) => {
                    sums[n] += amount;
                    1.0
                }
                None => 0.0,
            };
        }

        let start = self.edges.partition_point(|e| *e <= lo).saturating_sub(1);
        let mut deposited = 0.0;
        for n in start..self.n_bins() {
            let (lower, upper) = (self.edges[n], self.edges[n + 1]);
            if lower >= hi {
                break;
            }
            let overlap = hi.min(upper) - lo.max(lower);
            if overlap > 0.0 {
                let fraction = overlap / span;
                sums[n] += amount * fraction;
                deposited += fraction;
            }
        }
        deposited
    }
}

impl TryFrom<Vec<FloatValue>> for BinEdges {
    type Error = WatermassError;

    fn try_from(edges: Vec<FloatValue>) -> Result<Self, Self::Error> {
        Self::new(edges)
    }
}

impl From<BinEdges> for Vec<FloatValue> {
    fn from(edges: BinEdges) -> Self {
        edges.edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    #[test]
    fn rejects_too_few_edges() {
        assert!(matches!(
            BinEdges::new(vec![1.0]),
            Err(WatermassError::InvalidBins(_))
        ));
        assert!(matches!(
            BinEdges::new(vec![]),
            Err(WatermassError::InvalidBins(_))
        ));
    }

    #[test]
    fn rejects_decreasing_edges() {
        assert!(matches!(
            BinEdges::new(vec![5.0, 3.0, 1.0]),
            Err(WatermassError::InvalidBins(_))
        ));
    }

    #[test]
    fn rejects_repeated_edges() {
        assert!(matches!(
            BinEdges::new(vec![0.0, 1.0, 1.0, 2.0]),
            Err(WatermassError::InvalidBins(_))
        ));
    }

    #[test]
    fn rejects_non_finite_edges() {
        assert!(BinEdges::new(vec![0.0, f64::NAN, 2.0]).is_err());
        assert!(BinEdges::new(vec![0.0, 1.0, f64::INFINITY]).is_err());
    }

    #[test]
    fn half_open_lookup() {
        let edges = BinEdges::new(vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(edges.find_bin(0.0), Some(0));
        assert_eq!(edges.find_bin(0.999), Some(0));
        assert_eq!(edges.find_bin(1.0), Some(1));
        assert_eq!(edges.find_bin(2.5), Some(2));
        assert_eq!(edges.find_bin(3.0), Some(2));
        assert_eq!(edges.find_bin(-0.1), None);
        assert_eq!(edges.find_bin(3.1), None);
        assert_eq!(edges.find_bin(f64::NAN), None);
    }

    #[test]
    fn widths_and_centres() {
        let edges = BinEdges::new(vec![0.0, 1.0, 3.0]).unwrap();
        assert_eq!(edges.widths().to_vec(), vec![1.0, 2.0]);
        assert_eq!(edges.centres().to_vec(), vec![0.5, 2.0]);
    }

    #[test]
    fn uniform_covers_stop() {
        let edges = BinEdges::uniform(0.0, 1.0, 0.3).unwrap();
        assert_eq!(edges.n_bins(), 4);
        assert!(edges.last() >= 1.0);

        let exact = BinEdges::uniform(0.0, 1.0, 0.1).unwrap();
        assert_eq!(exact.n_bins(), 10);
        assert!(is_close!(exact.last(), 1.0));
    }

    #[test]
    fn uniform_rejects_bad_width() {
        assert!(BinEdges::uniform(0.0, 1.0, 0.0).is_err());
        assert!(BinEdges::uniform(0.0, 1.0, -0.5).is_err());
        assert!(BinEdges::uniform(1.0, 0.0, 0.5).is_err());
    }

    #[test]
    fn linspace_bins() {
        let edges = BinEdges::linspace(0.0, 2.0, 4).unwrap();
        assert_eq!(edges.as_slice(), &[0.0, 0.5, 1.0, 1.5, 2.0]);
        assert!(BinEdges::linspace(0.0, 2.0, 0).is_err());
    }

    #[test]
    fn deposit_interval_splits_by_overlap() {
        let edges = BinEdges::new(vec![0.0, 1.0, 2.0]).unwrap();
        let mut sums = vec![0.0; 2];
        let deposited = edges.deposit_interval(0.5, 1.5, 4.0, &mut sums);
        assert!(is_close!(deposited, 1.0));
        assert!(is_close!(sums[0], 2.0));
        assert!(is_close!(sums[1], 2.0));
    }

    #[test]
    fn deposit_interval_drops_out_of_range_share() {
        let edges = BinEdges::new(vec![0.0, 1.0, 2.0]).unwrap();
        let mut sums = vec![0.0; 2];
        let deposited = edges.deposit_interval(1.5, 3.5, 4.0, &mut sums);
        assert!(is_close!(deposited, 0.25));
        assert_eq!(sums[0], 0.0);
        assert!(is_close!(sums[1], 1.0));
    }

    #[test]
    fn deposit_degenerate_interval_uses_point_rule() {
        let edges = BinEdges::new(vec![0.0, 1.0, 2.0]).unwrap();
        let mut sums = vec![0.0; 2];
        edges.deposit_interval(1.0, 1.0, 5.0, &mut sums);
        assert_eq!(sums, vec![0.0, 5.0]);
    }

    #[test]
    fn deserialisation_validates() {
        let edges: BinEdges = serde_json::from_str("[0.0, 1.0, 2.0]").unwrap();
        assert_eq!(edges.n_bins(), 2);
        assert!(serde_json::from_str::<BinEdges>("[2.0, 1.0]").is_err());
        assert_eq!(serde_json::to_string(&edges).unwrap(), "[0.0,1.0,2.0]");
    }
}
