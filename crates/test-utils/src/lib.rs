//! Helpers shared by the reformatter test suites.
//!
//! - [`find_test_file`] and [`require_test_file!`] locate optional GRIB2
//!   samples and skip a test when they are absent.
//! - The `create_*` generators build small synthetic fields.
//! - [`grid`] and [`cycles`] hold the HRRR Alaska constants tests assert
//!   against.

pub mod fixtures;
pub mod generators;
pub mod paths;

pub use fixtures::*;
pub use generators::*;
pub use paths::*;

/// Resolve a sample file with [`find_test_file`], or skip the calling test.
///
/// ```ignore
/// let path = require_test_file!("hrrr.t00z.wrfsfcf00.ak.grib2");
/// ```
#[macro_export]
macro_rules! require_test_file {
    ($name:expr) => {{
        match $crate::find_test_file($name) {
            Some(path) => path,
            None => {
                eprintln!("skipping: sample '{}' not found (set TEST_DATA_DIR)", $name);
                return;
            }
        }
    }};
}

/// Assert two numbers are within `epsilon` of each other.
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let (left, right, epsilon) = ($left as f64, $right as f64, $epsilon as f64);
        let diff = (left - right).abs();
        assert!(
            diff <= epsilon,
            "{} is not within {} of {} (off by {})",
            left,
            epsilon,
            right,
            diff
        );
    }};
}
