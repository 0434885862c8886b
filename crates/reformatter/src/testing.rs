//! Shared fixtures for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::error::FetchError;
use crate::schema::{
    CoordinateSpec, DatasetAttributes, Dimension, Encoding, Schema, SourceSelector, StepType,
    TransformSpec, VariableDescriptor,
};
use crate::source::{RawTile, SourceAdapter};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn variable(name: &str, number: u8) -> VariableDescriptor {
    VariableDescriptor {
        name: name.into(),
        dimensions: vec!["time".into(), "y".into(), "x".into()],
        units: "K".into(),
        long_name: name.into(),
        standard_name: None,
        fill_value: f32::NAN,
        source: SourceSelector {
            file_type: "sfc".into(),
            discipline: 0,
            category: 0,
            number,
            surface_type: 1,
            surface_value: None,
            step_type: StepType::Instant,
        },
        transform: TransformSpec::default(),
    }
}

fn linear(name: &str, len: u64) -> Dimension {
    Dimension {
        name: name.into(),
        len: Some(len),
        chunk: len,
        coordinate: CoordinateSpec::Linear { start: 0.0, step: 1.0 },
        units: "m".into(),
        long_name: name.into(),
        standard_name: None,
    }
}

/// 3-hourly `time` from [`t0`], a 2x3 grid and two variables.
pub fn tiny_schema(time_chunk: u64) -> Schema {
    Schema {
        attributes: DatasetAttributes {
            id: "tiny".into(),
            title: "Tiny".into(),
            description: String::new(),
            version: "0.1.0".into(),
            provider: String::new(),
            model: String::new(),
            variant: String::new(),
        },
        dimensions: vec![
            Dimension {
                name: "time".into(),
                len: None,
                chunk: time_chunk,
                coordinate: CoordinateSpec::Time {
                    start: t0(),
                    step_hours: 3,
                },
                units: "seconds since 1970-01-01".into(),
                long_name: "Time".into(),
                standard_name: Some("time".into()),
            },
            linear("y", 2),
            linear("x", 3),
        ],
        grid_mapping: None,
        forecast_length: None,
        encoding: Encoding::default(),
        variables: vec![variable("t2m", 0), variable("u10", 2)],
    }
}

#[derive(Debug, Clone)]
pub enum Scripted {
    Value(f32),
    NotYet,
    Fail(&'static str),
}

/// Source answering from a script; unscripted pairs are not yet available.
pub struct ScriptedSource {
    pub latest: DateTime<Utc>,
    script: Mutex<HashMap<(DateTime<Utc>, String), Scripted>>,
    pub calls: Mutex<Vec<(DateTime<Utc>, String)>>,
    pub released: Mutex<Vec<DateTime<Utc>>>,
}

impl ScriptedSource {
    pub fn new(latest: DateTime<Utc>) -> Self {
        Self {
            latest,
            script: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, time: DateTime<Utc>, variable: &str, answer: Scripted) {
        self.script
            .lock()
            .unwrap()
            .insert((time, variable.to_string()), answer);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SourceAdapter for ScriptedSource {
    async fn fetch(
        &self,
        time: DateTime<Utc>,
        variable: &VariableDescriptor,
    ) -> Result<RawTile, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((time, variable.name.clone()));
        let answer = self
            .script
            .lock()
            .unwrap()
            .get(&(time, variable.name.clone()))
            .cloned()
            .unwrap_or(Scripted::NotYet);
        match answer {
            Scripted::Value(v) => Ok(RawTile::new(vec![2, 3], vec![v; 6])),
            Scripted::NotYet => Err(FetchError::NotYetAvailable),
            Scripted::Fail(cause) => Err(FetchError::retrieval(cause)),
        }
    }

    fn latest_available(&self, _now: DateTime<Utc>) -> DateTime<Utc> {
        self.latest
    }

    async fn release(&self, time: DateTime<Utc>) {
        self.released.lock().unwrap().push(time);
    }
}
