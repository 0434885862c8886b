//! Addresses of individual HRRR Alaska source files.

use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// One source file: a cycle, a lead time and a file family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceFileCoord {
    pub init_time: DateTime<Utc>,
    pub lead_hours: i64,
    /// `sfc`, `prs`, `nat` or `subh`
    pub file_type: String,
}

impl SourceFileCoord {
    pub fn new(init_time: DateTime<Utc>, lead_hours: i64, file_type: impl Into<String>) -> Self {
        Self {
            init_time,
            lead_hours,
            file_type: file_type.into(),
        }
    }

    /// File name, e.g. `hrrr.t06z.wrfsfcf03.ak.grib2`.
    pub fn file_name(&self) -> String {
        format!(
            "hrrr.t{}z.wrf{}f{:02}.ak.grib2",
            self.init_time.format("%H"),
            self.file_type,
            self.lead_hours
        )
    }

    /// Path below the base URL.
    pub fn relative_path(&self) -> String {
        format!(
            "hrrr.{}/alaska/{}",
            self.init_time.format("%Y%m%d"),
            self.file_name()
        )
    }

    pub fn url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.relative_path())
    }

    /// URL of the wgrib2 inventory next to the file.
    pub fn index_url(&self, base_url: &str) -> String {
        format!("{}.idx", self.url(base_url))
    }

    /// Location of the cached download below `download_dir`.
    pub fn cache_path(&self, download_dir: &std::path::Path) -> PathBuf {
        download_dir.join(self.relative_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_url_format() {
        let coord = SourceFileCoord::new(Utc.with_ymd_and_hms(2024, 2, 29, 6, 0, 0).unwrap(), 3, "sfc");
        assert_eq!(coord.file_name(), "hrrr.t06z.wrfsfcf03.ak.grib2");
        assert_eq!(
            coord.url("https://example.com/"),
            "https://example.com/hrrr.20240229/alaska/hrrr.t06z.wrfsfcf03.ak.grib2"
        );
        assert_eq!(
            coord.index_url("https://example.com"),
            "https://example.com/hrrr.20240229/alaska/hrrr.t06z.wrfsfcf03.ak.grib2.idx"
        );
    }

    #[test]
    fn test_two_digit_lead() {
        let coord = SourceFileCoord::new(Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap(), 48, "prs");
        assert_eq!(coord.file_name(), "hrrr.t18z.wrfprsf48.ak.grib2");
        assert!(coord
            .cache_path(std::path::Path::new("/tmp/dl"))
            .ends_with("hrrr.20240101/alaska/hrrr.t18z.wrfprsf48.ak.grib2"));
    }
}
