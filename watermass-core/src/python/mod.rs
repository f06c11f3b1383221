//! Python bindings for the transformation binner
//!
//! This module exposes:
//! - `compute_transformation` and `online_transformation`, taking numpy arrays
//! - [`PyTransformationResult`] wrapping the binned sums and derived G(λ)
//! - `check_budget_closure` returning a [`PyClosureReport`]

use crate::binning::TransformationBinner;
use crate::bins::BinEdges;
use crate::budget::{check_budget_closure as check_closure, BudgetTerms, ClosureReport};
use crate::config::{BinningMethod, TransformationConfig, WeightConvention};
use crate::errors::WatermassError;
use crate::field::FloatValue;
use crate::online::online_transformation as online;
use crate::result::{DifferenceScheme, TransformationResult};
use numpy::{PyArray1, PyReadonlyArray1, PyReadonlyArrayDyn, ToPyArray};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

impl From<WatermassError> for PyErr {
    fn from(err: WatermassError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

fn parse_method(method: &str) -> PyResult<BinningMethod> {
    match method {
        "histogram" => Ok(BinningMethod::Histogram),
        "vertical_remap" => Ok(BinningMethod::VerticalRemap),
        _ => Err(PyValueError::new_err(format!(
            "Unknown binning method: {}. Must be 'histogram' or 'vertical_remap'.",
            method
        ))),
    }
}

fn parse_weight_convention(convention: &str) -> PyResult<WeightConvention> {
    match convention {
        "volume" => Ok(WeightConvention::Volume),
        "area" => Ok(WeightConvention::Area),
        _ => Err(PyValueError::new_err(format!(
            "Unknown weight convention: {}. Must be 'volume' or 'area'.",
            convention
        ))),
    }
}

fn parse_scheme(scheme: &str) -> PyResult<DifferenceScheme> {
    match scheme {
        "forward" => Ok(DifferenceScheme::Forward),
        "centred" | "centered" => Ok(DifferenceScheme::Centred),
        _ => Err(PyValueError::new_err(format!(
            "Unknown difference scheme: {}. Must be 'forward' or 'centred'.",
            scheme
        ))),
    }
}

/// Python wrapper for TransformationResult
#[pyclass(name = "TransformationResult", module = "watermass.core")]
#[derive(Debug, Clone)]
pub struct PyTransformationResult(pub TransformationResult);

#[pymethods]
impl PyTransformationResult {
    /// Bin edges (length B + 1)
    #[getter]
    fn edges<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<FloatValue>> {
        self.0.edges().to_array().to_pyarray_bound(py)
    }

    /// Bin-integrated tendency (length B)
    #[getter]
    fn values<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<FloatValue>> {
        self.0.values().to_pyarray_bound(py)
    }

    #[getter]
    fn weight_convention(&self) -> String {
        self.0.weight_convention().to_string()
    }

    #[getter]
    fn binned_cells(&self) -> usize {
        self.0.summary().binned_cells
    }

    #[getter]
    fn missing_cells(&self) -> usize {
        self.0.summary().missing_cells
    }

    #[getter]
    fn out_of_range_cells(&self) -> usize {
        self.0.summary().out_of_range_cells
    }

    fn total(&self) -> FloatValue {
        self.0.total()
    }

    /// Values divided by bin width
    fn per_unit_lambda<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<FloatValue>> {
        self.0.per_unit_lambda().to_pyarray_bound(py)
    }

    /// Cumulative integral at each bin edge
    fn cumulative<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<FloatValue>> {
        self.0.cumulative().to_pyarray_bound(py)
    }

    /// G(λ) as a `(lambda, values)` tuple
    #[pyo3(signature = (scheme="forward"))]
    fn transformation<'py>(
        &self,
        py: Python<'py>,
        scheme: &str,
    ) -> PyResult<(
        Bound<'py, PyArray1<FloatValue>>,
        Bound<'py, PyArray1<FloatValue>>,
    )> {
        let profile = self.0.transformation(parse_scheme(scheme)?);
        Ok((
            profile.lambda.to_pyarray_bound(py),
            profile.values.to_pyarray_bound(py),
        ))
    }

    fn __repr__(&self) -> String {
        format!(
            "TransformationResult(n_bins={}, total={}, weight_convention={})",
            self.0.n_bins(),
            self.0.total(),
            self.0.weight_convention()
        )
    }
}

/// Python wrapper for ClosureReport
#[pyclass(name = "ClosureReport", module = "watermass.core")]
#[derive(Debug, Clone)]
pub struct PyClosureReport(pub ClosureReport);

#[pymethods]
impl PyClosureReport {
    #[getter]
    fn residual<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<FloatValue>> {
        self.0.residual.to_pyarray_bound(py)
    }

    #[getter]
    fn max_abs_residual(&self) -> FloatValue {
        self.0.max_abs_residual
    }

    #[getter]
    fn tolerance(&self) -> FloatValue {
        self.0.tolerance
    }

    #[getter]
    fn closed(&self) -> bool {
        self.0.closed
    }

    fn __repr__(&self) -> String {
        format!(
            "ClosureReport(closed={}, max_abs_residual={:e}, tolerance={:e})",
            self.0.closed, self.0.max_abs_residual, self.0.tolerance
        )
    }
}

/// Bin `tendency_field * weight_field` by `lambda_field`
#[pyfunction]
#[pyo3(signature = (
    lambda_field,
    tendency_field,
    weight_field,
    bin_edges,
    method="histogram",
    weight_convention="volume",
    vertical_axis=None,
    missing_value=None,
    parallel=false,
))]
#[allow(clippy::too_many_arguments)]
fn compute_transformation(
    py: Python<'_>,
    lambda_field: PyReadonlyArrayDyn<'_, FloatValue>,
    tendency_field: PyReadonlyArrayDyn<'_, FloatValue>,
    weight_field: PyReadonlyArrayDyn<'_, FloatValue>,
    bin_edges: Vec<FloatValue>,
    method: &str,
    weight_convention: &str,
    vertical_axis: Option<usize>,
    missing_value: Option<FloatValue>,
    parallel: bool,
) -> PyResult<PyTransformationResult> {
    let config = TransformationConfig {
        method: parse_method(method)?,
        weight_convention: parse_weight_convention(weight_convention)?,
        vertical_axis,
        missing_value,
        parallel,
        ..Default::default()
    };
    let binner = TransformationBinner::from_config(&config)?;
    let edges = BinEdges::new(bin_edges)?;

    let (lambda, tendency, weight) = (
        lambda_field.as_array(),
        tendency_field.as_array(),
        weight_field.as_array(),
    );
    let result = py.allow_threads(|| binner.compute(lambda, tendency, weight, &edges))?;
    Ok(PyTransformationResult(result))
}

/// Reduce tendencies accumulated on density layers to a transformation result
#[pyfunction]
#[pyo3(signature = (
    layer_tendency,
    weight,
    layer_axis,
    layer_edges,
    weight_convention="area",
    missing_value=None,
))]
fn online_transformation(
    layer_tendency: PyReadonlyArrayDyn<'_, FloatValue>,
    weight: PyReadonlyArrayDyn<'_, FloatValue>,
    layer_axis: usize,
    layer_edges: Vec<FloatValue>,
    weight_convention: &str,
    missing_value: Option<FloatValue>,
) -> PyResult<PyTransformationResult> {
    let config = TransformationConfig {
        weight_convention: parse_weight_convention(weight_convention)?,
        missing_value,
        ..Default::default()
    };
    let result = online(
        layer_tendency.as_array(),
        weight.as_array(),
        layer_axis,
        &layer_edges,
        &config,
    )?;
    Ok(PyTransformationResult(result))
}

/// Compare G with -dM/dt - psi + W
#[pyfunction]
#[pyo3(signature = (time, mass, transport, surface_flux, transformation, tolerance=1e-9))]
fn check_budget_closure(
    time: PyReadonlyArray1<'_, FloatValue>,
    mass: PyReadonlyArray1<'_, FloatValue>,
    transport: PyReadonlyArray1<'_, FloatValue>,
    surface_flux: PyReadonlyArray1<'_, FloatValue>,
    transformation: PyReadonlyArray1<'_, FloatValue>,
    tolerance: FloatValue,
) -> PyResult<PyClosureReport> {
    let terms = BudgetTerms {
        time: time.as_array(),
        mass: mass.as_array(),
        transport: transport.as_array(),
        surface_flux: surface_flux.as_array(),
    };
    let report = check_closure(&terms, transformation.as_array(), tolerance)?;
    Ok(PyClosureReport(report))
}

#[pymodule]
#[pyo3(name = "core")]
pub fn core_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyTransformationResult>()?;
    m.add_class::<PyClosureReport>()?;
    m.add_function(wrap_pyfunction!(compute_transformation, m)?)?;
    m.add_function(wrap_pyfunction!(online_transformation, m)?)?;
    m.add_function(wrap_pyfunction!(check_budget_closure, m)?)?;
    Ok(())
}
