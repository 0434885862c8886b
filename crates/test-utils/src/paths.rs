//! Locating GRIB2 samples and scratch directories.

use std::path::PathBuf;

/// Root of the cargo workspace.
pub fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    match manifest_dir.ancestors().nth(2) {
        Some(root) => root.to_path_buf(),
        None => manifest_dir,
    }
}

/// First existing copy of sample `name`.
///
/// Looked up in `$TEST_DATA_DIR`, then `crates/reformatter/testdata/`,
/// then `testdata/` at the workspace root.
pub fn find_test_file(name: &str) -> Option<PathBuf> {
    let root = workspace_root();
    std::env::var_os("TEST_DATA_DIR")
        .map(PathBuf::from)
        .into_iter()
        .chain([root.join("crates/reformatter/testdata"), root.join("testdata")])
        .map(|dir| dir.join(name))
        .find(|path| path.is_file())
}

/// Scratch directory named `<prefix>XXXXXX`, removed on drop.
pub fn temp_test_dir_with_prefix(prefix: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("create scratch directory")
}
