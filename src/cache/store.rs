//! On-disk cache store

use crate::cache::{CacheError, CacheKey, CacheResult};
use crate::state::Partition;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Directory used when no partition is active
pub const UNKNOWN_PARTITION: &str = "unknown";

/// Partitioned, content-addressed cache of response bodies
///
/// Entries never expire. A lookup hit is an existing, non-empty file; a miss
/// is reported as `Ok(None)` and only genuine disk failures are errors.
#[derive(Debug, Clone)]
pub struct ContentCache {
    root: PathBuf,
}

impl ContentCache {
    /// Opens the cache rooted at `root`, creating the root and the fallback
    /// partition directory if needed
    pub fn open(root: impl Into<PathBuf>) -> CacheResult<Self> {
        let root = root.into();
        let unknown = root.join(UNKNOWN_PARTITION);
        fs::create_dir_all(&unknown).map_err(|source| CacheError::Write {
            path: unknown.clone(),
            source,
        })?;
        tracing::info!("Cache path is {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the entry for `key` inside `partition`
    pub fn entry_path(&self, partition: Option<&Partition>, key: &CacheKey) -> PathBuf {
        self.partition_dir(partition).join(key.as_str())
    }

    /// Path the entry had in the flat, unpartitioned layout
    pub fn legacy_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// Stable location for a binary side artifact, e.g. a captcha image
    pub fn artifact_path(&self, namespace: &str, key: &CacheKey) -> PathBuf {
        self.root.join(namespace).join(key.as_str())
    }

    /// Looks up a body in `partition`
    ///
    /// On a miss the legacy location is checked once; an entry found there is
    /// moved into the partition and served from its new place.
    pub fn lookup(
        &self,
        partition: Option<&Partition>,
        key: &CacheKey,
    ) -> CacheResult<Option<String>> {
        let path = self.entry_path(partition, key);
        if let Some(body) = read_entry(&path)? {
            return Ok(Some(body));
        }

        if self.relocate_legacy(partition, key)? {
            return read_entry(&path);
        }

        Ok(None)
    }

    /// Returns true if a non-empty entry exists for `key` in `partition`
    ///
    /// Unlike [`ContentCache::lookup`] this never touches the legacy layout.
    pub fn contains(&self, partition: Option<&Partition>, key: &CacheKey) -> bool {
        fs::metadata(self.entry_path(partition, key))
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false)
    }

    /// Writes `body` for `key` into `partition`, replacing any previous entry
    pub fn store(
        &self,
        partition: Option<&Partition>,
        key: &CacheKey,
        body: &str,
    ) -> CacheResult<PathBuf> {
        let path = self.entry_path(partition, key);
        write_atomic(&path, body.as_bytes())?;
        tracing::info!("Saved to cache as {}", path.display());
        Ok(path)
    }

    /// Writes a binary artifact and returns its path
    pub fn store_artifact(
        &self,
        namespace: &str,
        key: &CacheKey,
        bytes: &[u8],
    ) -> CacheResult<PathBuf> {
        let path = self.artifact_path(namespace, key);
        write_atomic(&path, bytes)?;
        Ok(path)
    }

    /// Moves a legacy entry for `key` into `partition`
    ///
    /// Returns false when there is nothing at the legacy location. Probing the
    /// legacy location is best effort; only a failed move is an error.
    pub fn relocate_legacy(
        &self,
        partition: Option<&Partition>,
        key: &CacheKey,
    ) -> CacheResult<bool> {
        let legacy = self.legacy_path(key);
        match fs::metadata(&legacy) {
            Ok(meta) if meta.is_file() => {}
            _ => return Ok(false),
        }

        let dir = self.partition_dir(partition);
        fs::create_dir_all(&dir).map_err(|source| CacheError::Write {
            path: dir.clone(),
            source,
        })?;

        let target = dir.join(key.as_str());
        tracing::warn!(
            "Cache file {} will be moved to {}",
            key,
            target.display()
        );
        fs::rename(&legacy, &target).map_err(|source| CacheError::Relocate {
            from: legacy,
            to: target,
            source,
        })?;

        Ok(true)
    }

    fn partition_dir(&self, partition: Option<&Partition>) -> PathBuf {
        self.root
            .join(partition.map(Partition::as_str).unwrap_or(UNKNOWN_PARTITION))
    }
}

/// Reads an entry, treating absent and empty files as a miss
fn read_entry(path: &Path) -> CacheResult<Option<String>> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => {}
        Ok(_) => return Ok(None),
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CacheError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    fs::read_to_string(path)
        .map(Some)
        .map_err(|source| CacheError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Writes through a temporary sibling and renames it into place, so a
/// crash never leaves a truncated entry behind
fn write_atomic(path: &Path, bytes: &[u8]) -> CacheResult<()> {
    let write_err = |source| CacheError::Write {
        path: path.to_path_buf(),
        source,
    };

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(write_err)?;

    let tmp = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|s| s.to_str()).unwrap_or("entry"),
        std::process::id()
    ));
    {
        let mut file = fs::File::create(&tmp).map_err(write_err)?;
        file.write_all(bytes).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
    }
    fs::rename(&tmp, path).map_err(write_err)?;

    Ok(())
}
