use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use dedup_core::{DedupError, DedupResult};
use serde::{Deserialize, Serialize};

/// One cached digest: the hash itself, plus the modification time the file
/// carried when the hash was computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub digest: String,
    pub modified_unix: i64,
}

/// An on-disk, path-keyed digest cache.
///
/// Required operations per the hash-cache collaborator contract: open the
/// store (creating it if absent), `contains`/`get` an entry by absolute
/// path, `insert` (insert-or-replace), and `save` (flush to disk). The
/// cache also tracks its own on-disk modification time so freshness can be
/// judged without touching every entry's individual timestamp.
#[derive(Debug, Default)]
pub struct DigestCache {
    entries: HashMap<PathBuf, CacheEntry>,
    path: PathBuf,
    cache_modified: Option<SystemTime>,
}

impl DigestCache {
    /// Opens an existing cache file, or starts an empty one if it doesn't
    /// exist yet. Fatal if the path exists but cannot be read/deserialized,
    /// or if its parent directory cannot be created.
    pub fn open(path: &Path) -> DedupResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        if !path.exists() {
            return Ok(DigestCache {
                entries: HashMap::new(),
                path: path.to_path_buf(),
                cache_modified: None,
            });
        }

        let file = File::open(path)?;
        let cache_modified = file.metadata().ok().and_then(|m| m.modified().ok());
        let reader = BufReader::new(file);
        let entries: HashMap<PathBuf, CacheEntry> = bincode::deserialize_from(reader)?;

        Ok(DigestCache {
            entries,
            path: path.to_path_buf(),
            cache_modified,
        })
    }

    /// Deletes the on-disk cache file, ignoring a missing file. Used by
    /// `--nuke-database`.
    pub fn nuke(path: &Path) -> DedupResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DedupError::Io(e)),
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn get(&self, path: &Path) -> Option<&str> {
        self.entries.get(path).map(|e| e.digest.as_str())
    }

    /// True when this cache's own on-disk modification time is at least as
    /// new as `file_modified`, the freshness rule that lets us trust a
    /// cached digest without rereading the file.
    pub fn is_fresh(&self, file_modified: SystemTime) -> bool {
        match self.cache_modified {
            Some(cache_modified) => cache_modified >= file_modified,
            None => false,
        }
    }

    pub fn insert(&mut self, path: PathBuf, digest: String, modified: SystemTime) {
        let modified_unix = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        self.entries.insert(path, CacheEntry { digest, modified_unix });
    }

    /// Drops cache entries whose source path no longer exists on disk.
    /// Returns the number of entries removed. Used by `--clean-database`.
    pub fn remove_missing(&mut self) -> usize {
        let missing: Vec<PathBuf> = self
            .entries
            .keys()
            .filter(|path| !path.exists())
            .cloned()
            .collect();
        let removed = missing.len();
        for path in missing {
            self.entries.remove(&path);
        }
        removed
    }

    /// Flushes the cache to disk, replacing its contents atomically via a
    /// temp-file rename, and closes it.
    pub fn save(&mut self) -> DedupResult<()> {
        let temp_path = self.path.with_extension("tmp");
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            bincode::serialize_into(&mut writer, &self.entries)?;
            writer.flush()?;
        }
        fs::rename(&temp_path, &self.path)?;
        self.cache_modified = fs::metadata(&self.path).ok().and_then(|m| m.modified().ok());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Default cache location, following the XDG base-directory convention on
/// Unix-like systems.
pub fn default_cache_path() -> DedupResult<PathBuf> {
    if let Ok(cache_home) = std::env::var("XDG_CACHE_HOME") {
        let path = PathBuf::from(cache_home);
        if path.is_absolute() {
            return Ok(path.join("dedup").join("digests.dat"));
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let home_path = PathBuf::from(home);
        if home_path.is_absolute() {
            return Ok(home_path.join(".cache").join("dedup").join("digests.dat"));
        }
    }

    Err(DedupError::Cache(
        "could not determine cache directory; set XDG_CACHE_HOME or HOME to an absolute path".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_cache_is_empty() -> DedupResult<()> {
        let temp_dir = std::env::temp_dir().join("dedup_test_cache_missing");
        let _ = fs::remove_dir_all(&temp_dir);
        fs::create_dir_all(&temp_dir)?;
        let cache_path = temp_dir.join("digests.dat");

        let cache = DigestCache::open(&cache_path)?;
        assert!(cache.is_empty());

        let _ = fs::remove_dir_all(&temp_dir);
        Ok(())
    }

    #[test]
    fn insert_get_and_roundtrip_through_save() -> DedupResult<()> {
        let temp_dir = std::env::temp_dir().join("dedup_test_cache_roundtrip");
        let _ = fs::remove_dir_all(&temp_dir);
        fs::create_dir_all(&temp_dir)?;
        let cache_path = temp_dir.join("digests.dat");
        let tracked = temp_dir.join("file.txt");
        fs::write(&tracked, b"hello")?;

        let mut cache = DigestCache::open(&cache_path)?;
        cache.insert(tracked.clone(), "abc123".to_string(), SystemTime::now());
        assert_eq!(cache.get(&tracked), Some("abc123"));
        cache.save()?;

        let reloaded = DigestCache::open(&cache_path)?;
        assert_eq!(reloaded.get(&tracked), Some("abc123"));

        let _ = fs::remove_dir_all(&temp_dir);
        Ok(())
    }

    #[test]
    fn remove_missing_drops_entries_for_deleted_files() -> DedupResult<()> {
        let temp_dir = std::env::temp_dir().join("dedup_test_cache_clean");
        let _ = fs::remove_dir_all(&temp_dir);
        fs::create_dir_all(&temp_dir)?;
        let cache_path = temp_dir.join("digests.dat");
        let present = temp_dir.join("present.txt");
        let gone = temp_dir.join("gone.txt");
        fs::write(&present, b"x")?;

        let mut cache = DigestCache::open(&cache_path)?;
        cache.insert(present.clone(), "p".to_string(), SystemTime::now());
        cache.insert(gone.clone(), "g".to_string(), SystemTime::now());

        let removed = cache.remove_missing();
        assert_eq!(removed, 1);
        assert!(cache.contains(&present));
        assert!(!cache.contains(&gone));

        let _ = fs::remove_dir_all(&temp_dir);
        Ok(())
    }

    #[test]
    fn freshness_compares_cache_mtime_to_file_mtime() {
        let mut cache = DigestCache {
            entries: HashMap::new(),
            path: PathBuf::new(),
            cache_modified: Some(SystemTime::now()),
        };
        let earlier = SystemTime::now() - std::time::Duration::from_secs(60);
        assert!(cache.is_fresh(earlier));

        cache.cache_modified = None;
        assert!(!cache.is_fresh(earlier));
    }
}
