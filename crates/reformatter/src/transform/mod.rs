//! Transform pipeline from decoded source tiles to store-ready values.
//!
//! Steps run in a fixed order:
//! 1. shape check
//! 2. source sentinel to missing (NaN)
//! 3. valid range check
//! 4. unit conversion
//! 5. resampling onto the target grid
//! 6. mantissa rounding
//! 7. missing to the variable's fill value
//!
//! The pipeline is pure: the same tile and descriptor always produce the
//! same bytes.

mod bitround;
mod interpolation;

pub use bitround::{bitround, bitround_slice};
pub use interpolation::{GridView, ResampleMethod};

use serde::{Deserialize, Serialize};

use crate::error::TransformError;
use crate::schema::VariableDescriptor;
use crate::source::RawTile;

/// Unit conversion applied after range checking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitConversion {
    KelvinToCelsius,
    PascalToHectopascal,
    /// `value * scale + offset`
    Linear { scale: f32, offset: f32 },
}

impl UnitConversion {
    pub fn apply(&self, value: f32) -> f32 {
        match *self {
            UnitConversion::KelvinToCelsius => value - 273.15,
            UnitConversion::PascalToHectopascal => value / 100.0,
            UnitConversion::Linear { scale, offset } => value * scale + offset,
        }
    }
}

/// Resample a source grid of `source_shape` (`[ny, nx]`) onto the target's
/// trailing two dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampleSpec {
    pub source_shape: [usize; 2],
    #[serde(default)]
    pub method: ResampleMethod,
}

/// Shape the raw tile must have for `target_shape`.
pub fn expected_source_shape(variable: &VariableDescriptor, target_shape: &[usize]) -> Vec<usize> {
    let mut shape = target_shape.to_vec();
    if let Some(resample) = &variable.transform.resample {
        if shape.len() >= 2 {
            let n = shape.len();
            shape[n - 2] = resample.source_shape[0];
            shape[n - 1] = resample.source_shape[1];
        }
    }
    shape
}

/// Run the full pipeline on one tile.
///
/// `target_shape` is the tile shape in the store (every dimension of the
/// variable except the append dimension).
pub fn transform(
    raw: &RawTile,
    variable: &VariableDescriptor,
    target_shape: &[usize],
) -> Result<Vec<f32>, TransformError> {
    let spec = &variable.transform;

    let expected = expected_source_shape(variable, target_shape);
    if raw.shape != expected {
        return Err(TransformError::ShapeMismatch {
            expected,
            actual: raw.shape.clone(),
        });
    }
    let count: usize = raw.shape.iter().product();
    if raw.values.len() != count {
        return Err(TransformError::LengthMismatch {
            shape: raw.shape.clone(),
            expected: count,
            actual: raw.values.len(),
        });
    }

    let mut values = raw.values.clone();

    if let Some(sentinel) = spec.missing_sentinel {
        for v in values.iter_mut() {
            if *v == sentinel {
                *v = f32::NAN;
            }
        }
    }

    if let Some([min, max]) = spec.valid_range {
        if let Some(&value) = values.iter().find(|v| !v.is_nan() && (**v < min || **v > max)) {
            return Err(TransformError::ImplausibleValue { value, min, max });
        }
    }

    if let Some(conversion) = spec.unit_conversion {
        for v in values.iter_mut() {
            *v = conversion.apply(*v);
        }
    }

    if let Some(resample) = &spec.resample {
        values = resample_slices(&values, &raw.shape, target_shape, resample.method);
    }

    if let Some(bits) = spec.keep_mantissa_bits {
        bitround_slice(&mut values, bits);
    }

    if !variable.fill_value.is_nan() {
        for v in values.iter_mut() {
            if v.is_nan() {
                *v = variable.fill_value;
            }
        }
    }

    Ok(values)
}

/// Resample every trailing 2-D slice of `values`.
fn resample_slices(
    values: &[f32],
    source_shape: &[usize],
    target_shape: &[usize],
    method: ResampleMethod,
) -> Vec<f32> {
    let n = source_shape.len();
    let (src_h, src_w) = (source_shape[n - 2], source_shape[n - 1]);
    let (dst_h, dst_w) = (target_shape[n - 2], target_shape[n - 1]);

    let mut output = Vec::with_capacity(target_shape.iter().product());
    for slice in values.chunks(src_h * src_w) {
        match GridView::new(slice, src_w, src_h) {
            Some(grid) => output.extend(grid.resample(dst_w, dst_h, method)),
            None => output.extend(std::iter::repeat(f32::NAN).take(dst_w * dst_h)),
        }
    }
    output
}
