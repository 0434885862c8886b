//! HTTP source adapter for HRRR Alaska GRIB2 files.
//!
//! Every lead time of a cycle lives in its own file. Files are cached in a
//! local download directory, so fetching several variables of the same
//! cycle downloads each file once. A cached file that fails to decode is
//! evicted, and a cycle's files are released once it is committed.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use super::{RawTile, SourceAdapter, SourceFileCoord, TileDecoder};
use crate::config::ReformatConfig;
use crate::error::FetchError;
use crate::schema::{expected_forecast_length, Schema, VariableDescriptor};
use crate::transform::expected_source_shape;

/// Settings for [`HttpSourceAdapter`].
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    pub base_url: String,
    pub download_dir: PathBuf,
    /// Hours after init time before a cycle's files appear.
    pub publication_delay_hours: i64,
    pub request_timeout: Duration,
}

impl From<&ReformatConfig> for HttpSourceConfig {
    fn from(config: &ReformatConfig) -> Self {
        Self {
            base_url: config.source_base_url.clone(),
            download_dir: config.download_dir.clone(),
            publication_delay_hours: config.publication_delay_hours,
            request_timeout: Duration::from_secs(300),
        }
    }
}

/// Fetches per-lead GRIB2 files over HTTP and decodes one field from each.
pub struct HttpSourceAdapter {
    client: Client,
    config: HttpSourceConfig,
    schema: Arc<Schema>,
    decoder: Arc<dyn TileDecoder>,
}

impl HttpSourceAdapter {
    pub fn new(
        config: HttpSourceConfig,
        schema: Arc<Schema>,
        decoder: Arc<dyn TileDecoder>,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| FetchError::retrieval(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            schema,
            decoder,
        })
    }

    /// Lead hours to fetch for a cycle, with `false` for leads past the
    /// cycle's forecast length.
    fn leads_for(&self, init_time: DateTime<Utc>) -> Vec<(i64, bool)> {
        let Some(leads) = self.schema.lead_hours() else {
            return vec![(0, true)];
        };
        let max_lead = self
            .schema
            .forecast_length
            .as_ref()
            .map(|rule| expected_forecast_length(rule, init_time));
        leads
            .into_iter()
            .map(|lead| (lead, max_lead.map_or(true, |max| lead <= max)))
            .collect()
    }

    /// Return the file's bytes, from the cache or freshly downloaded.
    #[instrument(skip(self), fields(file = %coord.file_name()))]
    async fn download(&self, coord: &SourceFileCoord) -> Result<Bytes, FetchError> {
        let cache_path = coord.cache_path(&self.config.download_dir);
        if let Ok(cached) = fs::read(&cache_path).await {
            debug!(path = %cache_path.display(), "Using cached source file");
            return Ok(Bytes::from(cached));
        }

        let url = coord.url(&self.config.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::retrieval(format!("GET {}: {}", url, e)))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => {
                debug!(url = %url, "Source file not published yet");
                return Err(FetchError::NotYetAvailable);
            }
            status => {
                return Err(FetchError::retrieval(format!("GET {}: HTTP {}", url, status)));
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::retrieval(format!("reading {}: {}", url, e)))?;

        if let Err(e) = self.store_in_cache(&cache_path, &body).await {
            warn!(path = %cache_path.display(), error = %e, "Failed to cache source file");
        } else {
            info!(url = %url, bytes = body.len(), "Downloaded source file");
        }

        Ok(body)
    }

    /// Decode one field and check it has `field_len` points.
    async fn decode_field(
        &self,
        coord: &SourceFileCoord,
        bytes: Bytes,
        variable: &VariableDescriptor,
        field_len: usize,
    ) -> Result<Vec<f32>, FetchError> {
        let decoder = Arc::clone(&self.decoder);
        let selector = variable.source.clone();
        let field = tokio::task::spawn_blocking(move || decoder.decode(&bytes, &selector))
            .await
            .map_err(|e| FetchError::decode(format!("decode task failed: {}", e)))??;

        if field.len() != field_len {
            return Err(FetchError::decode(format!(
                "{} has {} points, expected {}",
                coord.file_name(),
                field.len(),
                field_len
            )));
        }
        Ok(field)
    }

    async fn store_in_cache(&self, path: &Path, body: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let partial = path.with_extension("grib2.partial");
        fs::write(&partial, body).await?;
        fs::rename(&partial, path).await
    }
}

#[async_trait]
impl SourceAdapter for HttpSourceAdapter {
    async fn fetch(
        &self,
        time: DateTime<Utc>,
        variable: &VariableDescriptor,
    ) -> Result<RawTile, FetchError> {
        let shape = expected_source_shape(variable, &self.schema.tile_shape(variable));
        let field_len: usize = shape.iter().rev().take(2).product();

        let mut values = Vec::with_capacity(shape.iter().product());
        for (lead, in_forecast) in self.leads_for(time) {
            if !in_forecast {
                values.extend(std::iter::repeat(f32::NAN).take(field_len));
                continue;
            }

            let coord = SourceFileCoord::new(time, lead, variable.source.file_type.clone());
            let bytes = self.download(&coord).await?;
            match self.decode_field(&coord, bytes, variable, field_len).await {
                Ok(field) => values.extend(field),
                Err(e) => {
                    // The next attempt downloads the file again.
                    let path = coord.cache_path(&self.config.download_dir);
                    if discard(&path).await {
                        warn!(path = %path.display(), error = %e, "Evicted undecodable source file");
                    }
                    return Err(e);
                }
            }
        }

        Ok(RawTile::new(shape, values))
    }

    fn latest_available(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let published = now - chrono::Duration::hours(self.config.publication_delay_hours);
        match self.schema.floor_index(published) {
            Some(index) => self.schema.time_at(index),
            None => published,
        }
    }

    async fn release(&self, time: DateTime<Utc>) {
        let file_types: BTreeSet<&str> = self
            .schema
            .variables
            .iter()
            .map(|v| v.source.file_type.as_str())
            .collect();

        let mut removed = 0;
        for (lead, in_forecast) in self.leads_for(time) {
            if !in_forecast {
                continue;
            }
            for &file_type in &file_types {
                let coord = SourceFileCoord::new(time, lead, file_type);
                if discard(&coord.cache_path(&self.config.download_dir)).await {
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            debug!(%time, files = removed, "Released cached source files");
        }
    }
}

/// Remove a cached file, returning whether one was there.
async fn discard(path: &Path) -> bool {
    match fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove cached source file");
            false
        }
    }
}
