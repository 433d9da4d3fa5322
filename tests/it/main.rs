//! Integration tests for the `datim` library, exercising the generator,
//! codec, and checker together against real temporary-directory trees
//! rather than in isolation.

use tempfile::TempDir;

mod nested_tree;
mod roundtrip;

/// Build a fresh temporary directory, returning it alongside its canonical
/// path so callers don't each re-derive it.
fn temp_dir() -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().expect("create temporary directory");
    let path = dir.path().canonicalize().expect("canonicalize temp dir");
    (dir, path)
}
