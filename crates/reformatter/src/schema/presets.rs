//! Bundled dataset definitions.

use chrono::{TimeZone, Utc};

use super::{
    CoordinateSpec, DatasetAttributes, Dimension, Encoding, ForecastLengthRule, GridMapping,
    Schema, SourceSelector, StepType, TransformSpec, VariableDescriptor,
};
use crate::error::ReformatError;

/// Ids of every registered dataset.
pub fn dataset_ids() -> Vec<&'static str> {
    vec![HRRR_ALASKA_FORECAST]
}

/// Look up a registered dataset by id.
pub fn dataset(id: &str) -> Result<Schema, ReformatError> {
    match id {
        HRRR_ALASKA_FORECAST => Ok(hrrr_alaska_forecast()),
        other => Err(ReformatError::UnknownDataset(other.to_string())),
    }
}

pub const HRRR_ALASKA_FORECAST: &str = "noaa-hrrr-alaska-forecast";

// GRIB2 code table 4.5 surface types
const SURFACE: u8 = 1;
const CLOUD_CEILING: u8 = 215;
const MEAN_SEA_LEVEL: u8 = 101;
const HEIGHT_ABOVE_GROUND: u8 = 103;
const ENTIRE_ATMOSPHERE: u8 = 10;
const ATMOSPHERE_LAYER: u8 = 200;

struct Var {
    name: &'static str,
    units: &'static str,
    long_name: &'static str,
    standard_name: Option<&'static str>,
    /// (category, number) in discipline 0
    param: (u8, u8),
    surface: (u8, Option<f64>),
    step: StepType,
    keep_bits: u32,
}

const INSTANT: StepType = StepType::Instant;
const ACCUM: StepType = StepType::Accum;

#[rustfmt::skip]
const ALASKA_VARIABLES: &[Var] = &[
    Var { name: "t2m", units: "K", long_name: "2 meter temperature", standard_name: Some("air_temperature"), param: (0, 0), surface: (HEIGHT_ABOVE_GROUND, Some(2.0)), step: INSTANT, keep_bits: 12 },
    Var { name: "d2m", units: "K", long_name: "2 meter dewpoint temperature", standard_name: Some("dew_point_temperature"), param: (0, 6), surface: (HEIGHT_ABOVE_GROUND, Some(2.0)), step: INSTANT, keep_bits: 12 },
    Var { name: "r2", units: "%", long_name: "2 meter relative humidity", standard_name: Some("relative_humidity"), param: (1, 1), surface: (HEIGHT_ABOVE_GROUND, Some(2.0)), step: INSTANT, keep_bits: 10 },
    Var { name: "u10", units: "m/s", long_name: "10 meter U wind component", standard_name: Some("eastward_wind"), param: (2, 2), surface: (HEIGHT_ABOVE_GROUND, Some(10.0)), step: INSTANT, keep_bits: 12 },
    Var { name: "v10", units: "m/s", long_name: "10 meter V wind component", standard_name: Some("northward_wind"), param: (2, 3), surface: (HEIGHT_ABOVE_GROUND, Some(10.0)), step: INSTANT, keep_bits: 12 },
    Var { name: "u80", units: "m/s", long_name: "80 meter U wind component", standard_name: None, param: (2, 2), surface: (HEIGHT_ABOVE_GROUND, Some(80.0)), step: INSTANT, keep_bits: 12 },
    Var { name: "v80", units: "m/s", long_name: "80 meter V wind component", standard_name: None, param: (2, 3), surface: (HEIGHT_ABOVE_GROUND, Some(80.0)), step: INSTANT, keep_bits: 12 },
    Var { name: "gust", units: "m/s", long_name: "Wind gust", standard_name: Some("wind_speed_of_gust"), param: (2, 22), surface: (SURFACE, None), step: INSTANT, keep_bits: 10 },
    Var { name: "prate", units: "kg/m^2/s", long_name: "Precipitation rate", standard_name: None, param: (1, 7), surface: (SURFACE, None), step: INSTANT, keep_bits: 10 },
    Var { name: "crain", units: "categorical", long_name: "Categorical rain", standard_name: None, param: (1, 192), surface: (SURFACE, None), step: INSTANT, keep_bits: 1 },
    Var { name: "csnow", units: "categorical", long_name: "Categorical snow", standard_name: None, param: (1, 195), surface: (SURFACE, None), step: INSTANT, keep_bits: 1 },
    Var { name: "cfrzr", units: "categorical", long_name: "Categorical freezing rain", standard_name: None, param: (1, 193), surface: (SURFACE, None), step: INSTANT, keep_bits: 1 },
    Var { name: "cicep", units: "categorical", long_name: "Categorical ice pellets", standard_name: None, param: (1, 194), surface: (SURFACE, None), step: INSTANT, keep_bits: 1 },
    Var { name: "tcc", units: "%", long_name: "Total cloud cover", standard_name: Some("cloud_area_fraction"), param: (6, 1), surface: (ENTIRE_ATMOSPHERE, None), step: INSTANT, keep_bits: 8 },
    Var { name: "dswrf", units: "W/m^2", long_name: "Downward short-wave radiation flux", standard_name: Some("surface_downwelling_shortwave_flux_in_air"), param: (4, 7), surface: (SURFACE, None), step: INSTANT, keep_bits: 10 },
    Var { name: "dlwrf", units: "W/m^2", long_name: "Downward long-wave radiation flux", standard_name: Some("surface_downwelling_longwave_flux_in_air"), param: (5, 3), surface: (SURFACE, None), step: INSTANT, keep_bits: 10 },
    Var { name: "sp", units: "Pa", long_name: "Surface pressure", standard_name: Some("surface_air_pressure"), param: (3, 0), surface: (SURFACE, None), step: INSTANT, keep_bits: 14 },
    Var { name: "msl", units: "Pa", long_name: "Mean sea level pressure", standard_name: Some("air_pressure_at_mean_sea_level"), param: (3, 198), surface: (MEAN_SEA_LEVEL, None), step: INSTANT, keep_bits: 14 },
    Var { name: "vis", units: "m", long_name: "Visibility", standard_name: Some("visibility_in_air"), param: (19, 0), surface: (SURFACE, None), step: INSTANT, keep_bits: 10 },
    Var { name: "refc", units: "dBZ", long_name: "Radar reflectivity at 1000 m", standard_name: None, param: (16, 195), surface: (HEIGHT_ABOVE_GROUND, Some(1000.0)), step: INSTANT, keep_bits: 10 },
    Var { name: "ceiling", units: "m", long_name: "Geopotential height at cloud ceiling", standard_name: Some("geopotential_height_at_cloud_ceiling"), param: (3, 5), surface: (CLOUD_CEILING, None), step: INSTANT, keep_bits: 10 },
    Var { name: "cpofp", units: "%", long_name: "Percent frozen precipitation", standard_name: None, param: (1, 39), surface: (SURFACE, None), step: INSTANT, keep_bits: 8 },
    Var { name: "pwat", units: "kg/m^2", long_name: "Precipitable water", standard_name: Some("atmosphere_mass_content_of_water_vapor"), param: (1, 3), surface: (ATMOSPHERE_LAYER, None), step: INSTANT, keep_bits: 10 },
    Var { name: "acpcp", units: "kg/m^2", long_name: "Total precipitation (accumulated)", standard_name: Some("precipitation_amount"), param: (1, 8), surface: (SURFACE, None), step: ACCUM, keep_bits: 10 },
];

/// NOAA HRRR Alaska forecasts on the native 3 km polar stereographic grid.
///
/// 3-hourly cycles from 2018-07-13T00Z. The 00/06/12/18 UTC cycles run to
/// 48 hours, the others to 18 hours; the missing leads stay at the fill value.
pub fn hrrr_alaska_forecast() -> Schema {
    let dimensions = vec![
        Dimension {
            name: "init_time".into(),
            len: None,
            chunk: 1,
            coordinate: CoordinateSpec::Time {
                start: Utc.with_ymd_and_hms(2018, 7, 13, 0, 0, 0).single().unwrap_or_default(),
                step_hours: 3,
            },
            units: "seconds since 1970-01-01".into(),
            long_name: "Forecast initialization time".into(),
            standard_name: Some("forecast_reference_time".into()),
        },
        Dimension {
            name: "lead_time".into(),
            len: Some(49),
            chunk: 49,
            coordinate: CoordinateSpec::LeadHours { start: 0, step: 1 },
            units: "hours".into(),
            long_name: "Forecast lead time".into(),
            standard_name: Some("forecast_period".into()),
        },
        Dimension {
            name: "y".into(),
            len: Some(919),
            chunk: 265,
            coordinate: CoordinateSpec::ProjectionY,
            units: "m".into(),
            long_name: "Y coordinate (polar stereographic projection)".into(),
            standard_name: Some("projection_y_coordinate".into()),
        },
        Dimension {
            name: "x".into(),
            len: Some(1299),
            chunk: 300,
            coordinate: CoordinateSpec::ProjectionX,
            units: "m".into(),
            long_name: "X coordinate (polar stereographic projection)".into(),
            standard_name: Some("projection_x_coordinate".into()),
        },
    ];

    let variables = ALASKA_VARIABLES
        .iter()
        .map(|v| VariableDescriptor {
            name: v.name.into(),
            dimensions: vec![
                "init_time".into(),
                "lead_time".into(),
                "y".into(),
                "x".into(),
            ],
            units: v.units.into(),
            long_name: v.long_name.into(),
            standard_name: v.standard_name.map(Into::into),
            fill_value: f32::NAN,
            source: SourceSelector {
                file_type: "sfc".into(),
                discipline: 0,
                category: v.param.0,
                number: v.param.1,
                surface_type: v.surface.0,
                surface_value: v.surface.1,
                step_type: v.step,
            },
            transform: TransformSpec {
                keep_mantissa_bits: Some(v.keep_bits),
                ..Default::default()
            },
        })
        .collect();

    Schema {
        attributes: DatasetAttributes {
            id: HRRR_ALASKA_FORECAST.into(),
            title: "NOAA HRRR Alaska Forecast".into(),
            description: "High-Resolution Rapid Refresh forecasts for the Alaska domain. \
                3 km polar stereographic grid, 3-hourly cycles, 48 hour forecasts for \
                00/06/12/18 UTC and 18 hour forecasts for 03/09/15/21 UTC."
                .into(),
            version: "1.0.0".into(),
            provider: "NOAA".into(),
            model: "HRRR".into(),
            variant: "alaska-forecast".into(),
        },
        dimensions,
        grid_mapping: Some(GridMapping::PolarStereographic {
            lat1: 41.612949,
            lon1: 185.117126,
            lov: 225.0,
            lad: 60.0,
            dx: 3000.0,
            dy: 3000.0,
            earth_radius: projection::NCEP_EARTH_RADIUS,
        }),
        forecast_length: Some(ForecastLengthRule {
            long_cycle_hours: vec![0, 6, 12, 18],
            long_hours: 48,
            short_hours: 18,
        }),
        encoding: Encoding::default(),
        variables,
    }
}
