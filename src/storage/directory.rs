//! Shard Directory
//!
//! Discovers shard files in the pool data directory and names new ones.
//!
//! ## Layout
//! ```text
//! {project_dir}/pooldata/
//!   ├── data0.db   (oldest)
//!   ├── data1.db
//!   └── dataN.db   (newest, the only writable one)
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// A shard file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardFile {
    /// Numeric suffix of the file name (creation order)
    pub index: u32,
    pub path: PathBuf,
}

/// The `pooldata` directory of a project
#[derive(Debug, Clone)]
pub struct ShardDirectory {
    root: PathBuf,
}

impl ShardDirectory {
    /// Name of the pool data directory inside a project
    pub const DIR_NAME: &'static str = "pooldata";

    const FILE_PREFIX: &'static str = "data";
    const FILE_EXTENSION: &'static str = "db";

    /// Open `{project_dir}/pooldata`, creating it if missing
    pub fn open(project_dir: &Path) -> Result<Self> {
        let root = project_dir.join(Self::DIR_NAME);
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Enumerate shard files, oldest first
    ///
    /// Regular files whose name does not follow `data{N}.db` are skipped.
    pub fn discover(&self) -> Result<Vec<ShardFile>> {
        let mut shards = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();

            if !entry.file_type()?.is_file() {
                continue;
            }

            match Self::parse_shard_index(&path) {
                Some(index) => shards.push(ShardFile { index, path }),
                None => tracing::warn!("Ignoring non-shard file {}", path.display()),
            }
        }

        shards.sort_by_key(|shard| shard.index);
        Ok(shards)
    }

    /// Path of the shard with the given index
    pub fn shard_path(&self, index: u32) -> PathBuf {
        self.root.join(format!(
            "{}{}.{}",
            Self::FILE_PREFIX,
            index,
            Self::FILE_EXTENSION
        ))
    }

    /// The pooldata directory itself
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// "data42.db" → Some(42)
    fn parse_shard_index(path: &Path) -> Option<u32> {
        if path.extension()? != Self::FILE_EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let digits = stem.strip_prefix(Self::FILE_PREFIX)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}
