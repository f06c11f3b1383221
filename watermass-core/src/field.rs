//! Gridded fields taking part in a transformation calculation
//!
//! Model diagnostics arrive as plain arrays: the tracer λ, its tendency ρλ̇ and a
//! grid measure (cell volume or cell area). They do not need identical shapes, but
//! they must broadcast to one common shape using the usual trailing-axis rules, so
//! that e.g. a 2-D cell area can weight a `(time, y, x)` tendency.

use crate::errors::{WatermassError, WatermassResult};
use ndarray::{ArrayViewD, IxDyn};

pub type FloatValue = f64;

/// Compute the shape that all of the named shapes broadcast to
///
/// Shapes are aligned on their trailing axes. Each axis must either match or be 1.
///
/// # Errors
///
/// Returns [`WatermassError::ShapeMismatch`] naming the first field that cannot be
/// broadcast against the fields before it.
///
/// ```rust
/// use watermass_core::field::broadcast_shape;
///
/// let shape = broadcast_shape(&[("lambda", &[4, 3, 2][..]), ("area", &[3, 2][..])]).unwrap();
/// assert_eq!(shape, vec![4, 3, 2]);
/// assert!(broadcast_shape(&[("lambda", &[10, 10][..]), ("tendency", &[5, 5][..])]).is_err());
/// ```
pub fn broadcast_shape(shapes: &[(&str, &[usize])]) -> WatermassResult<Vec<usize>> {
    let mut result: Vec<usize> = Vec::new();

    for (name, shape) in shapes {
        let ndim = result.len().max(shape.len());
        let mut merged = vec![1; ndim];

        for (i, target) in merged.iter_mut().enumerate() {
            // Index counted from the trailing axis
            let from_end = ndim - 1 - i;
            let current = axis_from_end(&result, from_end);
            let other = axis_from_end(shape, from_end);

            *target = match (current, other) {
                (a, b) if a == b => a,
                (1, b) => b,
                (a, 1) => a,
                _ => {
                    return Err(WatermassError::ShapeMismatch {
                        field: name.to_string(),
                        expected: result.clone(),
                        found: shape.to_vec(),
                    })
                }
            };
        }
        result = merged;
    }

    Ok(result)
}

fn axis_from_end(shape: &[usize], from_end: usize) -> usize {
    if from_end < shape.len() {
        shape[shape.len() - 1 - from_end]
    } else {
        1
    }
}

/// Whether a value takes part in accumulation
///
/// NaN, infinite values and the optional model fill value are treated as missing.
pub(crate) fn is_valid(value: FloatValue, missing_value: Option<FloatValue>) -> bool {
    value.is_finite() && missing_value.map_or(true, |m| value != m)
}

/// λ, tendency and weight views broadcast to one common shape
#[derive(Debug, Clone)]
pub struct ConformedFields<'a> {
    pub lambda: ArrayViewD<'a, FloatValue>,
    pub tendency: ArrayViewD<'a, FloatValue>,
    pub weight: ArrayViewD<'a, FloatValue>,
}

impl<'a> ConformedFields<'a> {
    /// Broadcast the three fields against each other
    ///
    /// The views borrow the inputs; nothing is copied.
    pub fn conform(
        lambda: &'a ArrayViewD<'_, FloatValue>,
        tendency: &'a ArrayViewD<'_, FloatValue>,
        weight: &'a ArrayViewD<'_, FloatValue>,
    ) -> WatermassResult<Self> {
        let shape = broadcast_shape(&[
            ("lambda", lambda.shape()),
            ("tendency", tendency.shape()),
            ("weight", weight.shape()),
        ])?;

        Ok(Self {
            lambda: broadcast_view(lambda, "lambda", &shape)?,
            tendency: broadcast_view(tendency, "tendency", &shape)?,
            weight: broadcast_view(weight, "weight", &shape)?,
        })
    }

    pub fn shape(&self) -> &[usize] {
        self.lambda.shape()
    }

    pub fn ndim(&self) -> usize {
        self.lambda.ndim()
    }

    /// Total number of grid cells after broadcasting
    pub fn len(&self) -> usize {
        self.lambda.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lambda.is_empty()
    }
}

fn broadcast_view<'a>(
    field: &'a ArrayViewD<'_, FloatValue>,
    name: &str,
    shape: &[usize],
) -> WatermassResult<ArrayViewD<'a, FloatValue>> {
    field
        .broadcast(IxDyn(shape))
        .ok_or_else(|| WatermassError::ShapeMismatch {
            field: name.to_string(),
            expected: shape.to_vec(),
            found: field.shape().to_vec(),
        })
}
