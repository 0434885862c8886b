//! GRIB2 field selection and decoding using the `grib` crate.

use std::io::Cursor;

use tracing::debug;

use super::TileDecoder;
use crate::error::FetchError;
use crate::schema::{SourceSelector, StepType};

/// Identity of one GRIB2 submessage, as far as selection is concerned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceMatch {
    pub discipline: u8,
    pub category: Option<u8>,
    pub number: Option<u8>,
    /// Type and value of the first fixed surface.
    pub surface: Option<(u8, f64)>,
    pub step_type: StepType,
}

impl SurfaceMatch {
    /// Whether this submessage is the field `selector` asks for.
    pub fn matches(&self, selector: &SourceSelector) -> bool {
        if self.discipline != selector.discipline
            || self.category != Some(selector.category)
            || self.number != Some(selector.number)
            || self.step_type != selector.step_type
        {
            return false;
        }
        match self.surface {
            Some((surface_type, value)) => {
                surface_type == selector.surface_type
                    && selector
                        .surface_value
                        .map_or(true, |wanted| (wanted - value).abs() < 1e-6)
            }
            None => false,
        }
    }
}

/// Product definition templates 4.8 to 4.15 are statistically processed
/// over a time interval; everything else is an instant.
fn step_type(template: u16) -> StepType {
    match template {
        8..=15 => StepType::Accum,
        _ => StepType::Instant,
    }
}

/// Decodes the first submessage matching a [`SourceSelector`].
#[derive(Debug, Clone, Default)]
pub struct GribDecoder;

impl GribDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl TileDecoder for GribDecoder {
    fn decode(&self, bytes: &[u8], selector: &SourceSelector) -> Result<Vec<f32>, FetchError> {
        let grib_file = ::grib::from_reader(Cursor::new(bytes))
            .map_err(|e| FetchError::decode(format!("failed to parse GRIB2: {}", e)))?;

        for (index, submsg) in grib_file.iter() {
            let prod_def = submsg.prod_def();
            let candidate = SurfaceMatch {
                discipline: submsg.indicator().discipline,
                category: prod_def.parameter_category(),
                number: prod_def.parameter_number(),
                surface: prod_def
                    .fixed_surfaces()
                    .map(|(first, _)| (first.surface_type, first.value())),
                step_type: step_type(prod_def.prod_tmpl_num()),
            };
            if !candidate.matches(selector) {
                continue;
            }

            debug!(submessage = ?index, ?candidate, "Decoding matching GRIB2 submessage");
            let decoder = ::grib::Grib2SubmessageDecoder::from(submsg)
                .map_err(|e| FetchError::decode(e.to_string()))?;
            let values = decoder
                .dispatch()
                .map_err(|e| FetchError::decode(e.to_string()))?;
            return Ok(values.collect());
        }

        Err(FetchError::decode(format!(
            "no submessage for discipline {} parameter {}/{} surface {}{} ({:?})",
            selector.discipline,
            selector.category,
            selector.number,
            selector.surface_type,
            selector
                .surface_value
                .map(|v| format!(" at {}", v))
                .unwrap_or_default(),
            selector.step_type
        )))
    }
}
