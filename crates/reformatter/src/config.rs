//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default base URL for NOAA HRRR output on the public S3 mirror.
pub const DEFAULT_SOURCE_BASE_URL: &str = "https://noaa-hrrr-bdp-pds.s3.amazonaws.com";

/// Configuration for a reformatting run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReformatConfig {
    /// Root directory of the Zarr store.
    pub store_path: PathBuf,

    /// Maximum number of region jobs in flight.
    ///
    /// A job buffers every variable of one append chunk in memory. For the
    /// HRRR Alaska preset that is 24 variables x 49 leads x 919 x 1299
    /// float32 values, about 5.6 GB per job.
    pub concurrency: usize,

    /// Maximum number of append-dimension coordinates considered past the
    /// watermark in a single update.
    pub max_lookahead: usize,

    /// Base URL that source file paths are appended to.
    pub source_base_url: String,

    /// Hours between a cycle's nominal init time and the moment its files
    /// are expected to be published.
    pub publication_delay_hours: i64,

    /// Local directory for downloaded source files.
    pub download_dir: PathBuf,
}

impl Default for ReformatConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("./data/reformatted.zarr"),
            concurrency: 1,
            max_lookahead: 64,
            source_base_url: DEFAULT_SOURCE_BASE_URL.to_string(),
            publication_delay_hours: 2,
            download_dir: std::env::temp_dir().join("reformatter-downloads"),
        }
    }
}

impl ReformatConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("REFORMAT_STORE_PATH") {
            config.store_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("REFORMAT_CONCURRENCY") {
            if let Ok(n) = val.parse() {
                config.concurrency = n;
            }
        }

        if let Ok(val) = std::env::var("REFORMAT_MAX_LOOKAHEAD") {
            if let Ok(n) = val.parse() {
                config.max_lookahead = n;
            }
        }

        if let Ok(val) = std::env::var("REFORMAT_SOURCE_BASE_URL") {
            config.source_base_url = val.trim_end_matches('/').to_string();
        }

        if let Ok(val) = std::env::var("REFORMAT_PUBLICATION_DELAY_HOURS") {
            if let Ok(hours) = val.parse() {
                config.publication_delay_hours = hours;
            }
        }

        if let Ok(val) = std::env::var("REFORMAT_DOWNLOAD_DIR") {
            config.download_dir = PathBuf::from(val);
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err("concurrency must be > 0".to_string());
        }

        if self.max_lookahead == 0 {
            return Err("max_lookahead must be > 0".to_string());
        }

        if self.publication_delay_hours < 0 {
            return Err("publication_delay_hours must be >= 0".to_string());
        }

        if self.source_base_url.is_empty() {
            return Err("source_base_url must not be empty".to_string());
        }

        Ok(())
    }
}
