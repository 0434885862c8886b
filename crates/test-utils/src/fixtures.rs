//! HRRR Alaska constants, so tests can assert shapes without magic numbers.

pub mod grid {
    /// HRRR Alaska 3 km polar stereographic grid.
    pub const HRRR_ALASKA: GridSpec = GridSpec {
        nx: 1299,
        ny: 919,
        dx: 3000.0,
        dy: 3000.0,
    };

    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct GridSpec {
        pub nx: usize,
        pub ny: usize,
        /// Grid spacing in metres.
        pub dx: f64,
        pub dy: f64,
    }

    impl GridSpec {
        /// Points in one field.
        pub fn size(&self) -> usize {
            self.nx * self.ny
        }
    }
}

pub mod cycles {
    /// First init time of the HRRR Alaska archive.
    pub const HRRR_ALASKA_START: &str = "2018-07-13T00:00:00Z";

    pub const HRRR_ALASKA_STEP_HOURS: i64 = 3;

    /// Cycle hours (UTC) that run the long forecast.
    pub const HRRR_ALASKA_LONG_CYCLES: [u32; 4] = [0, 6, 12, 18];

    pub const HRRR_ALASKA_LONG_HOURS: i64 = 48;
    pub const HRRR_ALASKA_SHORT_HOURS: i64 = 18;

    /// Hourly leads 0..=48 stored per init time.
    pub const HRRR_ALASKA_LEAD_COUNT: usize = 49;
}
