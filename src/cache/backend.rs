//! Storage backends for the whitelist document and the blacklist lines.
//!
//! Backends are synchronous; the cache store calls them from `spawn_blocking`.

use crate::cache::error::CacheError;
use std::collections::HashMap;
use std::fmt::Debug;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::NamedTempFile;

const BLACKLIST_FILE: &str = "blacklist.txt";

pub trait CacheBackend: Debug + Send + Sync {
    /// Where the whitelist of `target` lives, for error messages.
    fn whitelist_path(&self, target: &str) -> PathBuf;

    /// Raw whitelist document, or `None` when it was never written.
    fn read_whitelist(&self, target: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Replaces the whitelist document as a whole.
    fn write_whitelist(&self, target: &str, contents: &[u8]) -> Result<(), CacheError>;

    fn read_blacklist(&self) -> Result<Vec<String>, CacheError>;

    fn append_blacklist(&self, line: &str) -> Result<(), CacheError>;
}

/// Plain files in a cache folder: `whitelist_<target>.json` and `blacklist.txt`.
#[derive(Debug, Clone)]
pub struct FileBackend {
    folder: PathBuf,
}

impl FileBackend {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn blacklist_path(&self) -> PathBuf {
        self.folder.join(BLACKLIST_FILE)
    }

    fn ensure_folder(&self) -> Result<(), CacheError> {
        fs::create_dir_all(&self.folder).map_err(|e| CacheError::DirCreation(self.folder.clone(), e))
    }
}

impl CacheBackend for FileBackend {
    fn whitelist_path(&self, target: &str) -> PathBuf {
        self.folder.join(format!("whitelist_{target}.json"))
    }

    fn read_whitelist(&self, target: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.whitelist_path(target);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::Read(path, e)),
        }
    }

    fn write_whitelist(&self, target: &str, contents: &[u8]) -> Result<(), CacheError> {
        self.ensure_folder()?;
        let path = self.whitelist_path(target);
        // Write next to the destination so the rename stays on one filesystem.
        let mut temp_file =
            NamedTempFile::new_in(&self.folder).map_err(|e| CacheError::Write(path.clone(), e))?;
        temp_file
            .write_all(contents)
            .and_then(|_| temp_file.as_file().sync_all())
            .map_err(|e| CacheError::Write(path.clone(), e))?;
        temp_file
            .persist(&path)
            .map_err(|e| CacheError::Persist(path.clone(), e))?;
        Ok(())
    }

    fn read_blacklist(&self) -> Result<Vec<String>, CacheError> {
        let path = self.blacklist_path();
        match fs::read_to_string(&path) {
            Ok(text) => Ok(text.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(CacheError::Read(path, e)),
        }
    }

    fn append_blacklist(&self, line: &str) -> Result<(), CacheError> {
        self.ensure_folder()?;
        let path = self.blacklist_path();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| CacheError::Write(path.clone(), e))?;
        writeln!(file, "{line}").map_err(|e| CacheError::Write(path, e))
    }
}

/// Keeps everything in memory. Useful for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    whitelists: Mutex<HashMap<String, Vec<u8>>>,
    blacklist: Mutex<Vec<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBackend for MemoryBackend {
    fn whitelist_path(&self, target: &str) -> PathBuf {
        PathBuf::from(format!("memory/whitelist_{target}.json"))
    }

    fn read_whitelist(&self, target: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let whitelists = self.whitelists.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(whitelists.get(target).cloned())
    }

    fn write_whitelist(&self, target: &str, contents: &[u8]) -> Result<(), CacheError> {
        let mut whitelists = self.whitelists.lock().unwrap_or_else(PoisonError::into_inner);
        whitelists.insert(target.to_string(), contents.to_vec());
        Ok(())
    }

    fn read_blacklist(&self) -> Result<Vec<String>, CacheError> {
        let blacklist = self.blacklist.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(blacklist.clone())
    }

    fn append_blacklist(&self, line: &str) -> Result<(), CacheError> {
        let mut blacklist = self.blacklist.lock().unwrap_or_else(PoisonError::into_inner);
        blacklist.push(line.to_string());
        Ok(())
    }
}
