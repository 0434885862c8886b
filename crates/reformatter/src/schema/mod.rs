//! Dataset schema: dimensions, coordinates, chunking and variable descriptors.
//!
//! A [`Schema`] is immutable once validated. It fully determines the layout
//! of the store it describes, so two runs configured with the same schema
//! always address the same chunks.

mod coords;
pub mod presets;

pub use coords::{expected_forecast_length, CoordinateValues};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::SchemaError;
use crate::transform::{ResampleSpec, UnitConversion};
use projection::PolarStereographic;

/// Helper for serde to skip NaN values.
fn is_nan_f32(v: &f32) -> bool {
    v.is_nan()
}

/// Default fill value (NaN).
fn default_fill_value() -> f32 {
    f32::NAN
}

/// Dataset-level attributes written to the root group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetAttributes {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub version: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub variant: String,
}

/// How the values along a dimension are generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CoordinateSpec {
    /// Regular time stride starting at `start`.
    Time {
        start: DateTime<Utc>,
        step_hours: i64,
    },
    /// Integer hour offsets (forecast lead times).
    LeadHours { start: i64, step: i64 },
    /// Projected x of the grid mapping.
    ProjectionX,
    /// Projected y of the grid mapping.
    ProjectionY,
    /// Regularly spaced floating point values.
    Linear { start: f64, step: f64 },
}

/// A named, ordered axis of the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    /// Fixed length, or `None` for the unbounded append dimension.
    #[serde(default)]
    pub len: Option<u64>,
    pub chunk: u64,
    pub coordinate: CoordinateSpec,
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub long_name: String,
    #[serde(default)]
    pub standard_name: Option<String>,
}

impl Dimension {
    /// Whether this is the append dimension.
    pub fn is_unbounded(&self) -> bool {
        self.len.is_none()
    }
}

/// Grid mapping for projected `x`/`y` dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GridMapping {
    /// North polar stereographic, parameterised as in GRIB2 template 3.20.
    PolarStereographic {
        /// Latitude of the first grid point (degrees)
        lat1: f64,
        /// Longitude of the first grid point (degrees)
        lon1: f64,
        /// Straight vertical longitude from pole (degrees)
        lov: f64,
        /// Latitude of true scale (degrees)
        lad: f64,
        dx: f64,
        dy: f64,
        #[serde(default = "default_earth_radius")]
        earth_radius: f64,
    },
}

fn default_earth_radius() -> f64 {
    projection::NCEP_EARTH_RADIUS
}

impl GridMapping {
    /// Build the projection for a grid of `nx` by `ny` points.
    pub fn projection(&self, nx: usize, ny: usize) -> PolarStereographic {
        match *self {
            GridMapping::PolarStereographic {
                lat1,
                lon1,
                lov,
                lad,
                dx,
                dy,
                earth_radius,
            } => PolarStereographic::from_grib2(lat1, lon1, lov, lad, dx, dy, nx, ny)
                .with_earth_radius(earth_radius),
        }
    }

    /// CF grid mapping attributes for the `spatial_ref` variable.
    pub fn cf_attributes(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut attrs = serde_json::Map::new();
        match *self {
            GridMapping::PolarStereographic {
                lov,
                lad,
                earth_radius,
                ..
            } => {
                attrs.insert("grid_mapping_name".into(), "polar_stereographic".into());
                attrs.insert("straight_vertical_longitude_from_pole".into(), lov.into());
                attrs.insert("latitude_of_projection_origin".into(), 90.0.into());
                attrs.insert("standard_parallel".into(), lad.into());
                attrs.insert("false_easting".into(), 0.0.into());
                attrs.insert("false_northing".into(), 0.0.into());
                attrs.insert("earth_radius".into(), earth_radius.into());
            }
        }
        attrs
    }
}

/// Which init times get a long forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastLengthRule {
    /// Cycle hours (UTC) that run the long forecast.
    pub long_cycle_hours: Vec<u32>,
    pub long_hours: i64,
    pub short_hours: i64,
}

/// Compression codec for variable chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    /// No compression.
    None,
    /// Blosc with LZ4.
    BloscLz4,
    /// Blosc with Zstd.
    #[default]
    BloscZstd,
}

impl Compression {
    /// Get the codec name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::BloscLz4 => "blosc_lz4",
            Self::BloscZstd => "blosc_zstd",
        }
    }
}

/// Chunk encoding shared by every variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encoding {
    #[serde(default)]
    pub compression: Compression,
    /// Compression level (1-9).
    #[serde(default = "default_compression_level")]
    pub level: u8,
    /// Enable byte shuffle filter.
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,
}

fn default_compression_level() -> u8 {
    3
}

fn default_shuffle() -> bool {
    true
}

impl Default for Encoding {
    fn default() -> Self {
        Self {
            compression: Compression::BloscZstd,
            level: default_compression_level(),
            shuffle: default_shuffle(),
        }
    }
}

/// Where a variable comes from in the source files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSelector {
    /// Source file family, e.g. `sfc` or `prs`.
    pub file_type: String,
    pub discipline: u8,
    pub category: u8,
    pub number: u8,
    /// Type of first fixed surface (GRIB2 code table 4.5).
    pub surface_type: u8,
    /// Value of the first fixed surface, when it matters.
    #[serde(default)]
    pub surface_value: Option<f64>,
    #[serde(default)]
    pub step_type: StepType,
}

/// Whether a field is a point in time or processed over an interval.
///
/// Accumulations such as total precipitation share their parameter with
/// other products in the same file, so the selector has to tell them apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    #[default]
    Instant,
    /// Statistically processed over a time interval (product templates 4.8 to 4.15).
    Accum,
}

/// Per-variable transform recipe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformSpec {
    #[serde(default)]
    pub unit_conversion: Option<UnitConversion>,
    /// Source value meaning "missing".
    #[serde(default)]
    pub missing_sentinel: Option<f32>,
    /// Plausible source range `[min, max]`; anything outside fails the tile.
    #[serde(default)]
    pub valid_range: Option<[f32; 2]>,
    /// Mantissa bits kept by precision reduction (0-23).
    #[serde(default)]
    pub keep_mantissa_bits: Option<u32>,
    #[serde(default)]
    pub resample: Option<ResampleSpec>,
}

/// A data variable of the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDescriptor {
    pub name: String,
    pub dimensions: Vec<String>,
    pub units: String,
    #[serde(default)]
    pub long_name: String,
    #[serde(default)]
    pub standard_name: Option<String>,
    /// Fill value (NaN when omitted).
    #[serde(default = "default_fill_value", skip_serializing_if = "is_nan_f32")]
    pub fill_value: f32,
    pub source: SourceSelector,
    #[serde(default)]
    pub transform: TransformSpec,
}

impl PartialEq for VariableDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.dimensions == other.dimensions
            && self.units == other.units
            && self.long_name == other.long_name
            && self.standard_name == other.standard_name
            && self.fill_value.to_bits() == other.fill_value.to_bits()
            && self.source == other.source
            && self.transform == other.transform
    }
}

/// The complete, validated description of a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub attributes: DatasetAttributes,
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub grid_mapping: Option<GridMapping>,
    #[serde(default)]
    pub forecast_length: Option<ForecastLengthRule>,
    #[serde(default)]
    pub encoding: Encoding,
    pub variables: Vec<VariableDescriptor>,
}

/// Version of the persisted schema document.
pub const SCHEMA_VERSION: u32 = 1;

impl Schema {
    /// Validate a schema, returning it unchanged on success.
    pub fn validated(self) -> Result<Self, SchemaError> {
        self.validate()?;
        Ok(self)
    }

    /// Check every structural rule.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.dimensions.is_empty() {
            return Err(SchemaError::NoDimensions);
        }
        if self.variables.is_empty() {
            return Err(SchemaError::NoVariables);
        }

        let mut seen = HashSet::new();
        for dim in &self.dimensions {
            if dim.name.trim().is_empty() {
                return Err(SchemaError::EmptyName("dimension"));
            }
            if !seen.insert(dim.name.as_str()) {
                return Err(SchemaError::Duplicate {
                    kind: "dimension",
                    name: dim.name.clone(),
                });
            }
            let chunk_ok = dim.chunk > 0 && dim.len.map_or(true, |len| dim.chunk <= len);
            if !chunk_ok {
                return Err(SchemaError::InvalidChunk {
                    dimension: dim.name.clone(),
                    chunk: dim.chunk,
                    len: dim.len,
                });
            }
            self.validate_coordinate(dim)?;
        }

        let unbounded = self.dimensions.iter().filter(|d| d.is_unbounded()).count();
        if unbounded != 1 {
            return Err(SchemaError::AppendDimensionCount(unbounded));
        }
        let append = self.append_dimension().name.clone();

        let mut seen_vars = HashSet::new();
        for var in &self.variables {
            if var.name.trim().is_empty() {
                return Err(SchemaError::EmptyName("variable"));
            }
            if seen.contains(var.name.as_str()) || !seen_vars.insert(var.name.as_str()) {
                return Err(SchemaError::Duplicate {
                    kind: "variable",
                    name: var.name.clone(),
                });
            }
            self.validate_variable(var, &append)?;
        }

        Ok(())
    }

    fn validate_coordinate(&self, dim: &Dimension) -> Result<(), SchemaError> {
        let invalid = |reason: &str| SchemaError::InvalidCoordinate {
            dimension: dim.name.clone(),
            reason: reason.to_string(),
        };
        match &dim.coordinate {
            CoordinateSpec::Time { step_hours, .. } => {
                if *step_hours <= 0 {
                    return Err(invalid("time step must be positive"));
                }
                if !dim.is_unbounded() {
                    return Err(invalid("time coordinates are only supported on the append dimension"));
                }
            }
            CoordinateSpec::LeadHours { step, .. } => {
                if *step <= 0 {
                    return Err(invalid("lead time step must be positive"));
                }
            }
            CoordinateSpec::ProjectionX | CoordinateSpec::ProjectionY => {
                if self.grid_mapping.is_none() {
                    return Err(invalid("projected coordinates require a grid mapping"));
                }
            }
            CoordinateSpec::Linear { step, .. } => {
                if !step.is_finite() || *step == 0.0 {
                    return Err(invalid("linear step must be finite and non-zero"));
                }
            }
        }
        if dim.is_unbounded() && !matches!(dim.coordinate, CoordinateSpec::Time { .. }) {
            return Err(invalid("the append dimension must use time coordinates"));
        }
        Ok(())
    }

    fn validate_variable(&self, var: &VariableDescriptor, append: &str) -> Result<(), SchemaError> {
        if var.dimensions.first().map(String::as_str) != Some(append) {
            return Err(SchemaError::MissingAppendDimension {
                variable: var.name.clone(),
                append: append.to_string(),
            });
        }

        let mut last_position = None;
        for name in &var.dimensions {
            let position = self.dimension_position(name).ok_or_else(|| {
                SchemaError::UnknownDimension {
                    variable: var.name.clone(),
                    dimension: name.clone(),
                }
            })?;
            if last_position.map_or(false, |last| position <= last) {
                return Err(SchemaError::DimensionOrder {
                    variable: var.name.clone(),
                });
            }
            last_position = Some(position);
        }

        let invalid = |reason: String| SchemaError::InvalidVariable {
            variable: var.name.clone(),
            reason,
        };
        let t = &var.transform;
        if let Some(bits) = t.keep_mantissa_bits {
            if bits > 23 {
                return Err(invalid(format!("keep_mantissa_bits {} exceeds 23", bits)));
            }
        }
        if let Some([min, max]) = t.valid_range {
            if min.is_nan() || max.is_nan() || min > max {
                return Err(invalid(format!("invalid valid_range [{}, {}]", min, max)));
            }
        }
        if let Some(resample) = &t.resample {
            if var.dimensions.len() < 3 {
                return Err(invalid("resampling needs two spatial dimensions".into()));
            }
            if resample.source_shape.iter().any(|&n| n == 0) {
                return Err(invalid("resample source shape must be non-empty".into()));
            }
        }
        Ok(())
    }

    /// Load a schema from a YAML file, substituting `${VAR}` references
    /// from the environment.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SchemaError::Parse(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&content)
    }

    /// Parse a schema from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self, SchemaError> {
        let content = substitute_env_vars(content);
        let schema: Schema =
            serde_yaml::from_str(&content).map_err(|e| SchemaError::Parse(e.to_string()))?;
        schema.validated()
    }

    /// The unbounded dimension. Only valid after validation.
    pub fn append_dimension(&self) -> &Dimension {
        self.dimensions
            .iter()
            .find(|d| d.is_unbounded())
            .unwrap_or(&self.dimensions[0])
    }

    /// Chunk length along the append dimension.
    pub fn time_chunk(&self) -> u64 {
        self.append_dimension().chunk
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    fn dimension_position(&self, name: &str) -> Option<usize> {
        self.dimensions.iter().position(|d| d.name == name)
    }

    pub fn variable(&self, name: &str) -> Option<&VariableDescriptor> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Start and stride (seconds) of the append dimension.
    fn time_axis(&self) -> (DateTime<Utc>, i64) {
        match self.append_dimension().coordinate {
            CoordinateSpec::Time { start, step_hours } => (start, step_hours.max(1) * 3600),
            _ => (DateTime::<Utc>::UNIX_EPOCH, 3600),
        }
    }

    /// Stride of the append dimension.
    pub fn time_step(&self) -> Duration {
        Duration::seconds(self.time_axis().1)
    }

    /// Time coordinate at append index `index`.
    pub fn time_at(&self, index: u64) -> DateTime<Utc> {
        let (start, step) = self.time_axis();
        start + Duration::seconds(step * index as i64)
    }

    /// Exact append index of `time`, if it lies on the time grid.
    pub fn index_of(&self, time: DateTime<Utc>) -> Option<u64> {
        let (start, step) = self.time_axis();
        let offset = (time - start).num_seconds();
        if offset < 0 || offset % step != 0 {
            return None;
        }
        Some((offset / step) as u64)
    }

    /// Index of the newest grid time at or before `time`.
    pub fn floor_index(&self, time: DateTime<Utc>) -> Option<u64> {
        let (start, step) = self.time_axis();
        let offset = (time - start).num_seconds();
        if offset < 0 {
            return None;
        }
        Some((offset / step) as u64)
    }

    /// Shape of one variable's tile for a single append coordinate
    /// (every dimension except the append dimension).
    pub fn tile_shape(&self, var: &VariableDescriptor) -> Vec<usize> {
        var.dimensions
            .iter()
            .skip(1)
            .filter_map(|name| self.dimension(name))
            .map(|d| d.len.unwrap_or(0) as usize)
            .collect()
    }

    /// Full array shape of a variable for a given append extent.
    pub fn array_shape(&self, var: &VariableDescriptor, time_len: u64) -> Vec<u64> {
        let mut shape = vec![time_len];
        shape.extend(self.tile_shape(var).into_iter().map(|n| n as u64));
        shape
    }

    /// Chunk shape of a variable.
    pub fn chunk_shape(&self, var: &VariableDescriptor) -> Vec<u64> {
        var.dimensions
            .iter()
            .filter_map(|name| self.dimension(name))
            .map(|d| d.chunk)
            .collect()
    }

    /// Round an append extent up to whole chunks.
    pub fn round_up_to_chunk(&self, len: u64) -> u64 {
        let chunk = self.time_chunk();
        len.div_ceil(chunk) * chunk
    }

    /// Projection for the `x`/`y` dimensions, when a grid mapping is set.
    pub fn projection(&self) -> Option<PolarStereographic> {
        let mapping = self.grid_mapping.as_ref()?;
        let nx = self.projected_len(|c| matches!(c, CoordinateSpec::ProjectionX))?;
        let ny = self.projected_len(|c| matches!(c, CoordinateSpec::ProjectionY))?;
        Some(mapping.projection(nx, ny))
    }

    fn projected_len(&self, is_axis: impl Fn(&CoordinateSpec) -> bool) -> Option<usize> {
        self.dimensions
            .iter()
            .find(|d| is_axis(&d.coordinate))
            .and_then(|d| d.len)
            .map(|n| n as usize)
    }

    /// The dimension holding forecast lead hours, if any.
    pub fn lead_dimension(&self) -> Option<&Dimension> {
        self.dimensions
            .iter()
            .find(|d| matches!(d.coordinate, CoordinateSpec::LeadHours { .. }))
    }

    /// Describe the first structural difference from `persisted`, if any.
    ///
    /// Attribute text (titles, descriptions, long and standard names) is not
    /// structural. Units, source fields and transform recipes are: they
    /// determine the values written.
    pub fn structural_difference(&self, persisted: &Schema) -> Option<String> {
        if self.dimensions.len() != persisted.dimensions.len() {
            return Some(format!(
                "dimension count {} != {}",
                self.dimensions.len(),
                persisted.dimensions.len()
            ));
        }
        for (ours, theirs) in self.dimensions.iter().zip(&persisted.dimensions) {
            if ours.name != theirs.name {
                return Some(format!("dimension '{}' != '{}'", ours.name, theirs.name));
            }
            if ours.len != theirs.len {
                return Some(format!("dimension '{}' length differs", ours.name));
            }
            if ours.chunk != theirs.chunk {
                return Some(format!(
                    "dimension '{}' chunk {} != {}",
                    ours.name, ours.chunk, theirs.chunk
                ));
            }
            if ours.coordinate != theirs.coordinate {
                return Some(format!("dimension '{}' coordinates differ", ours.name));
            }
        }
        if self.grid_mapping != persisted.grid_mapping {
            return Some("grid mapping differs".to_string());
        }
        if self.encoding != persisted.encoding {
            return Some("encoding differs".to_string());
        }

        let ours: Vec<&str> = self.variables.iter().map(|v| v.name.as_str()).collect();
        let theirs: Vec<&str> = persisted.variables.iter().map(|v| v.name.as_str()).collect();
        if ours != theirs {
            return Some(format!("variables {:?} != {:?}", ours, theirs));
        }
        for (a, b) in self.variables.iter().zip(&persisted.variables) {
            if a.dimensions != b.dimensions {
                return Some(format!("variable '{}' dimensions differ", a.name));
            }
            if a.fill_value.to_bits() != b.fill_value.to_bits() {
                return Some(format!("variable '{}' fill value differs", a.name));
            }
            if a.units != b.units {
                return Some(format!(
                    "variable '{}' units '{}' != '{}'",
                    a.name, a.units, b.units
                ));
            }
            if a.source != b.source {
                return Some(format!("variable '{}' source field differs", a.name));
            }
            // Compared as persisted, where a NaN sentinel reads back as unset.
            let recipe = |v: &VariableDescriptor| serde_json::to_value(&v.transform).ok();
            if recipe(a) != recipe(b) {
                return Some(format!("variable '{}' transform differs", a.name));
            }
        }
        None
    }
}

/// Replace `${VAR}` references with environment values. Unset variables
/// are left as written.
fn substitute_env_vars(content: &str) -> String {
    let mut result = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) => result.push_str(&value),
                    Err(_) => result.push_str(&rest[start..start + 3 + end]),
                }
                rest = &after[end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}
