//! Reformatter command-line driver.
//!
//! Subcommands:
//! - `list-datasets`: registered dataset ids
//! - `info <dataset>`: schema summary, plus store state when the store exists
//! - `init <dataset>`: create an empty store
//! - `update <dataset>`: run one incremental update
//!
//! Every subcommand prints a JSON summary on stdout. `update` exits with
//! status 1 when any coordinate failed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use reformatter::{
    presets, GribDecoder, HttpSourceAdapter, HttpSourceConfig, Orchestrator, ReformatConfig,
    Schema, UpdateSettings, ZarrStore,
};

#[derive(Parser, Debug)]
#[command(name = "reformatter")]
#[command(about = "Incrementally reformat forecast files into a Zarr V3 store")]
struct Args {
    /// Log level (overridden by RUST_LOG)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered datasets
    ListDatasets,

    /// Describe a dataset and, if present, its store
    Info {
        dataset: String,

        /// Store location (default: REFORMAT_STORE_PATH)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Load the schema from a YAML file instead of the registry
        #[arg(long)]
        schema: Option<PathBuf>,
    },

    /// Create an empty store for a dataset
    Init {
        dataset: String,

        #[arg(long)]
        store: Option<PathBuf>,

        #[arg(long)]
        schema: Option<PathBuf>,
    },

    /// Fetch, transform and commit everything newly available
    Update {
        dataset: String,

        #[arg(long)]
        store: Option<PathBuf>,

        /// Coordinates past the watermark considered in this run
        #[arg(long)]
        max_lookahead: Option<usize>,

        /// Region jobs in flight
        #[arg(long)]
        concurrency: Option<usize>,

        #[arg(long)]
        schema: Option<PathBuf>,
    },
}

/// Resolve a dataset's schema from a YAML file or the registry.
fn load_schema(dataset: &str, schema_path: Option<&Path>) -> Result<Arc<Schema>> {
    let schema = match schema_path {
        Some(path) => Schema::from_yaml_file(path)
            .with_context(|| format!("loading schema from {}", path.display()))?,
        None => presets::dataset(dataset)?,
    };
    if schema.attributes.id != dataset {
        bail!(
            "schema describes dataset '{}', not '{}'",
            schema.attributes.id,
            dataset
        );
    }
    Ok(Arc::new(schema))
}

fn config_with_store(store: Option<PathBuf>) -> ReformatConfig {
    let mut config = ReformatConfig::from_env();
    if let Some(path) = store {
        config.store_path = path;
    }
    config
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn list_datasets() -> Result<()> {
    let mut datasets = Vec::new();
    for id in presets::dataset_ids() {
        let schema = presets::dataset(id)?;
        datasets.push(json!({
            "id": id,
            "title": schema.attributes.title,
            "variables": schema.variables.len(),
        }));
    }
    print_json(&datasets)
}

fn info(dataset: &str, store: Option<PathBuf>, schema_path: Option<&Path>) -> Result<()> {
    let schema = load_schema(dataset, schema_path)?;
    let config = config_with_store(store);

    let store_info = if config.store_path.join("zarr.json").exists() {
        let store = ZarrStore::open_existing(&config.store_path)
            .with_context(|| format!("opening {}", config.store_path.display()))?;
        Some(store.info()?)
    } else {
        None
    };

    print_json(&json!({
        "dataset": schema.attributes,
        "dimensions": schema
            .dimensions
            .iter()
            .map(|d| json!({ "name": d.name, "len": d.len, "chunk": d.chunk }))
            .collect::<Vec<_>>(),
        "variables": schema.variables.iter().map(|v| &v.name).collect::<Vec<_>>(),
        "store": store_info,
    }))
}

fn init(dataset: &str, store: Option<PathBuf>, schema_path: Option<&Path>) -> Result<()> {
    let schema = load_schema(dataset, schema_path)?;
    let config = config_with_store(store);

    let store = ZarrStore::open_or_create(&config.store_path, schema)
        .with_context(|| format!("initialising {}", config.store_path.display()))?;
    print_json(&store.info()?)
}

/// Returns whether any coordinate failed.
async fn update(
    dataset: &str,
    mut config: ReformatConfig,
    max_lookahead: Option<usize>,
    concurrency: Option<usize>,
    schema_path: Option<&Path>,
) -> Result<bool> {
    if let Some(n) = max_lookahead {
        config.max_lookahead = n;
    }
    if let Some(n) = concurrency {
        config.concurrency = n;
    }
    config.validate().map_err(anyhow::Error::msg)?;

    let schema = load_schema(dataset, schema_path)?;
    let store = ZarrStore::open_or_create(&config.store_path, schema.clone())
        .with_context(|| format!("opening {}", config.store_path.display()))?;
    let source = HttpSourceAdapter::new(
        HttpSourceConfig::from(&config),
        schema,
        Arc::new(GribDecoder::new()),
    )?;

    info!(
        dataset,
        store = %config.store_path.display(),
        max_lookahead = config.max_lookahead,
        concurrency = config.concurrency,
        "Starting update"
    );
    let orchestrator = Orchestrator::new(
        Arc::new(store),
        Arc::new(source),
        UpdateSettings::from(&config),
    );
    let report = orchestrator.update(Utc::now()).await?;
    print_json(&report)?;
    Ok(report.has_failures())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .json()
        .init();

    match args.command {
        Command::ListDatasets => list_datasets(),
        Command::Info {
            dataset,
            store,
            schema,
        } => info(&dataset, store, schema.as_deref()),
        Command::Init {
            dataset,
            store,
            schema,
        } => init(&dataset, store, schema.as_deref()),
        Command::Update {
            dataset,
            store,
            max_lookahead,
            concurrency,
            schema,
        } => {
            let config = config_with_store(store);
            let failed =
                update(&dataset, config, max_lookahead, concurrency, schema.as_deref()).await?;
            if failed {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_update_flags() {
        let args = Args::parse_from([
            "reformatter",
            "update",
            "noaa-hrrr-alaska-forecast",
            "--store",
            "/tmp/ak.zarr",
            "--max-lookahead",
            "8",
        ]);
        match args.command {
            Command::Update {
                dataset,
                store,
                max_lookahead,
                concurrency,
                ..
            } => {
                assert_eq!(dataset, "noaa-hrrr-alaska-forecast");
                assert_eq!(store, Some(PathBuf::from("/tmp/ak.zarr")));
                assert_eq!(max_lookahead, Some(8));
                assert_eq!(concurrency, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_load_schema_checks_dataset_id() {
        assert!(load_schema(presets::HRRR_ALASKA_FORECAST, None).is_ok());
        assert!(load_schema("no-such-dataset", None).is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.yaml");
        let schema = presets::dataset(presets::HRRR_ALASKA_FORECAST).unwrap();
        std::fs::write(&path, serde_json::to_string(&schema).unwrap()).unwrap();
        assert!(load_schema(presets::HRRR_ALASKA_FORECAST, Some(&path)).is_ok());
        assert!(load_schema("other", Some(&path)).is_err());
    }

    #[test]
    fn test_init_creates_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ak.zarr");
        init(presets::HRRR_ALASKA_FORECAST, Some(path.clone()), None).unwrap();
        assert!(path.join("zarr.json").exists());
    }
}
