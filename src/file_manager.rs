use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, SnapshotError};
use crate::extractor::AssetClass;

pub const LOG_FILE_NAME: &str = "logs.txt";
pub const INDEX_FILE_NAME: &str = "index.html";

const ASSET_CLASSES: [AssetClass; 3] = [AssetClass::Css, AssetClass::Js, AssetClass::Image];

/// Owns the output root: timestamped snapshot trees plus the shared log file.
#[derive(Debug, Clone)]
pub struct FileManager {
    base_dir: PathBuf,
}

impl FileManager {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
        }
    }

    /// Like [`FileManager::new`], creating the root if it does not exist yet.
    pub fn create(base_dir: &Path) -> Result<Self> {
        fs::create_dir_all(base_dir).map_err(|source| SnapshotError::Directory {
            path: base_dir.to_path_buf(),
            source,
        })?;
        Ok(Self::new(base_dir))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn snapshot_path(&self, timestamp: &str) -> PathBuf {
        self.base_dir.join(timestamp)
    }

    /// Create `<root>/<timestamp>/` with its `css`, `js` and `images` subdirectories.
    pub fn create_snapshot_tree(&self, timestamp: &str) -> Result<SnapshotDir> {
        let root = self.snapshot_path(timestamp);
        for class in ASSET_CLASSES {
            let dir = root.join(class.dir_name());
            fs::create_dir_all(&dir)
                .map_err(|source| SnapshotError::Directory { path: dir, source })?;
        }
        Ok(SnapshotDir { root })
    }

    pub fn log_path(&self) -> PathBuf {
        self.base_dir.join(LOG_FILE_NAME)
    }

    /// Append `<timestamp> <message>` to the log, opening the file fresh for each entry.
    pub fn append_log(&self, timestamp: &str, message: &str) -> Result<()> {
        let path = self.log_path();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| SnapshotError::Persist {
                path: path.clone(),
                source,
            })?;

        writeln!(file, "{} {}", timestamp, message)
            .map_err(|source| SnapshotError::Persist { path, source })
    }
}

/// One snapshot's directory tree.
#[derive(Debug, Clone)]
pub struct SnapshotDir {
    root: PathBuf,
}

impl SnapshotDir {
    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn asset_path(&self, class: AssetClass, local_name: &str) -> PathBuf {
        self.root.join(class.dir_name()).join(local_name)
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE_NAME)
    }

    pub fn write_asset(&self, class: AssetClass, local_name: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.asset_path(class, local_name);
        write_file(&path, content)?;
        Ok(path)
    }

    pub fn write_index(&self, html: &str) -> Result<PathBuf> {
        let path = self.index_path();
        write_file(&path, html.as_bytes())?;
        Ok(path)
    }
}

fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    fs::write(path, content).map_err(|source| SnapshotError::Persist {
        path: path.to_path_buf(),
        source,
    })
}
