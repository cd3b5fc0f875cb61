#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use sheet_loader::memory::{Catalog, MemoryConnection};
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Destination seeded from `tests/data/catalog.yml`.
pub fn clinic() -> MemoryConnection {
    let catalog = Catalog::load(&fixture_path("catalog.yml")).expect("load catalog fixture");
    MemoryConnection::from_catalog(&catalog).expect("build destination")
}

/// Destination built from an inline YAML catalog.
pub fn destination(yaml: &str) -> MemoryConnection {
    let catalog = Catalog::from_yaml_str(yaml).expect("parse catalog");
    MemoryConnection::from_catalog(&catalog).expect("build destination")
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}
