//! Mass budget closure for a λ class
//!
//! The mass $M(\lambda, t)$ of water lighter than a λ contour changes through
//! transport ψ across the contour and through diabatic transformation. With $W$ the
//! transformation by surface fluxes, the budget reads
//!
//! $$G = -\frac{\partial M}{\partial t} - \psi + W$$
//!
//! Diagnosing G independently from binned tendencies and comparing it with the right
//! hand side recomputed from M, ψ and W is a standard check of the binning and of
//! the model diagnostics.

use crate::errors::{WatermassError, WatermassResult};
use crate::field::FloatValue;
use log::debug;
use ndarray::{Array1, ArrayView1, Zip};
use serde::{Deserialize, Serialize};

/// Time series entering the mass budget of one λ class
#[derive(Debug, Clone)]
pub struct BudgetTerms<'a> {
    /// Sample times, strictly increasing
    pub time: ArrayView1<'a, FloatValue>,
    /// Mass M(t) of water lighter than the contour
    pub mass: ArrayView1<'a, FloatValue>,
    /// Transport ψ(t) across the contour
    pub transport: ArrayView1<'a, FloatValue>,
    /// Transformation W(t) by surface fluxes
    pub surface_flux: ArrayView1<'a, FloatValue>,
}

/// Outcome of a closure check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosureReport {
    /// $G - (-dM/dt - \psi + W)$ at each sample time
    pub residual: Array1<FloatValue>,
    /// Largest absolute residual, NaN if any residual is NaN
    pub max_abs_residual: FloatValue,
    pub tolerance: FloatValue,
    /// Whether every residual is within the tolerance
    pub closed: bool,
}

/// Derivative of `values` with respect to `coordinate`
///
/// Second order accurate differences are used in the interior and one-sided second
/// order differences at the ends, so quadratics are differentiated exactly on any
/// spacing. With only two samples a first order difference is used for both.
///
/// # Errors
///
/// * [`WatermassError::ShapeMismatch`] if the arrays differ in length
/// * [`WatermassError::InvalidTimeAxis`] if there are fewer than 2 samples or the
///   coordinate is not finite and strictly increasing
pub fn gradient(
    values: ArrayView1<'_, FloatValue>,
    coordinate: ArrayView1<'_, FloatValue>,
) -> WatermassResult<Array1<FloatValue>> {
    check_length("values", values.len(), coordinate.len())?;
    validate_time_axis(coordinate)?;

    let n = values.len();
    let (f, x) = (values, coordinate);
    let mut result = Array1::zeros(n);

    if n == 2 {
        let slope = (f[1] - f[0]) / (x[1] - x[0]);
        result.fill(slope);
        return Ok(result);
    }

    for i in 1..n - 1 {
        let h1 = x[i] - x[i - 1];
        let h2 = x[i + 1] - x[i];
        result[i] = -h2 / (h1 * (h1 + h2)) * f[i - 1]
            + (h2 - h1) / (h1 * h2) * f[i]
            + h1 / (h2 * (h1 + h2)) * f[i + 1];
    }

    let h1 = x[1] - x[0];
    let h2 = x[2] - x[1];
    result[0] = -(2.0 * h1 + h2) / (h1 * (h1 + h2)) * f[0] + (h1 + h2) / (h1 * h2) * f[1]
        - h1 / (h2 * (h1 + h2)) * f[2];

    let h1 = x[n - 2] - x[n - 3];
    let h2 = x[n - 1] - x[n - 2];
    result[n - 1] = h2 / (h1 * (h1 + h2)) * f[n - 3] - (h1 + h2) / (h1 * h2) * f[n - 2]
        + (h1 + 2.0 * h2) / (h2 * (h1 + h2)) * f[n - 1];

    Ok(result)
}

/// Right hand side of the budget, $-dM/dt - \psi + W$
pub fn implied_transformation(terms: &BudgetTerms<'_>) -> WatermassResult<Array1<FloatValue>> {
    let n = terms.time.len();
    check_length("mass", terms.mass.len(), n)?;
    check_length("transport", terms.transport.len(), n)?;
    check_length("surface_flux", terms.surface_flux.len(), n)?;

    let dm_dt = gradient(terms.mass, terms.time)?;
    Ok(Zip::from(&dm_dt)
        .and(&terms.transport)
        .and(&terms.surface_flux)
        .map_collect(|&dm, &psi, &w| -dm - psi + w))
}

/// Compare a diagnosed transformation series with the one implied by the mass budget
///
/// # Errors
///
/// * [`WatermassError::ShapeMismatch`] if any series differs in length from `time`
/// * [`WatermassError::InvalidTimeAxis`] if `time` is unusable
pub fn check_budget_closure(
    terms: &BudgetTerms<'_>,
    transformation: ArrayView1<'_, FloatValue>,
    tolerance: FloatValue,
) -> WatermassResult<ClosureReport> {
    check_length("transformation", transformation.len(), terms.time.len())?;

    let implied = implied_transformation(terms)?;
    let residual = &transformation - &implied;
    // f64::max ignores NaN
    let max_abs_residual = residual.iter().fold(0.0, |acc: FloatValue, r| {
        if acc.is_nan() || r.is_nan() {
            FloatValue::NAN
        } else {
            acc.max(r.abs())
        }
    });
    let closed = residual.iter().all(|r| r.abs() <= tolerance);

    debug!(
        "Budget closure over {} samples: max residual {:e} (tolerance {:e})",
        residual.len(),
        max_abs_residual,
        tolerance
    );

    Ok(ClosureReport {
        residual,
        max_abs_residual,
        tolerance,
        closed,
    })
}

fn check_length(field: &str, found: usize, expected: usize) -> WatermassResult<()> {
    if found != expected {
        return Err(WatermassError::ShapeMismatch {
            field: field.to_string(),
            expected: vec![expected],
            found: vec![found],
        });
    }
    Ok(())
}

fn validate_time_axis(time: ArrayView1<'_, FloatValue>) -> WatermassResult<()> {
    if time.len() < 2 {
        return Err(WatermassError::InvalidTimeAxis(format!(
            "at least 2 samples are required, got {}",
            time.len()
        )));
    }
    if time.iter().any(|t| !t.is_finite()) {
        return Err(WatermassError::InvalidTimeAxis(
            "time values must be finite".to_string(),
        ));
    }
    if time.windows(2).into_iter().any(|w| w[1] <= w[0]) {
        return Err(WatermassError::InvalidTimeAxis(
            "time values must be strictly increasing".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn gradient_of_quadratic_is_exact() {
        let x = array![0.0, 0.5, 1.5, 3.0, 3.5];
        let f = x.mapv(|x| 2.0 * x * x - 3.0 * x + 1.0);
        let df = gradient(f.view(), x.view()).unwrap();
        for (d, x) in df.iter().zip(x.iter()) {
            assert_relative_eq!(*d, 4.0 * x - 3.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn gradient_two_samples() {
        let df = gradient(array![1.0, 3.0].view(), array![0.0, 4.0].view()).unwrap();
        assert_eq!(df, array![0.5, 0.5]);
    }

    #[test]
    fn gradient_rejects_bad_time_axis() {
        assert!(matches!(
            gradient(array![1.0].view(), array![0.0].view()),
            Err(WatermassError::InvalidTimeAxis(_))
        ));
        assert!(matches!(
            gradient(array![1.0, 2.0, 3.0].view(), array![0.0, 2.0, 1.0].view()),
            Err(WatermassError::InvalidTimeAxis(_))
        ));
        assert!(matches!(
            gradient(array![1.0, 2.0].view(), array![0.0, 1.0, 2.0].view()),
            Err(WatermassError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn mismatched_series_lengths() {
        let time = array![0.0, 1.0, 2.0];
        let short = array![1.0, 2.0];
        let terms = BudgetTerms {
            time: time.view(),
            mass: time.view(),
            transport: short.view(),
            surface_flux: time.view(),
        };
        let result = check_budget_closure(&terms, time.view(), 1e-9);
        match result {
            Err(WatermassError::ShapeMismatch { field, .. }) => assert_eq!(field, "transport"),
            other => panic!("Expected ShapeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn nan_residual_is_not_hidden() {
        let time = array![0.0, 1.0, 2.0];
        let zeros = array![0.0, 0.0, 0.0];
        let transformation = array![0.0, f64::NAN, 0.0];
        let terms = BudgetTerms {
            time: time.view(),
            mass: zeros.view(),
            transport: zeros.view(),
            surface_flux: zeros.view(),
        };
        let report = check_budget_closure(&terms, transformation.view(), 1e-6).unwrap();
        assert!(!report.closed);
        assert!(report.max_abs_residual.is_nan());
    }

    #[test]
    fn non_closing_budget_is_reported() {
        let time = array![0.0, 1.0, 2.0];
        let zeros = array![0.0, 0.0, 0.0];
        let transformation = array![0.0, 1.0, 0.0];
        let terms = BudgetTerms {
            time: time.view(),
            mass: zeros.view(),
            transport: zeros.view(),
            surface_flux: zeros.view(),
        };
        let report = check_budget_closure(&terms, transformation.view(), 1e-6).unwrap();
        assert!(!report.closed);
        assert_eq!(report.max_abs_residual, 1.0);
    }
}
