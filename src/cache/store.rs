use crate::cache::backend::{CacheBackend, FileBackend};
use crate::cache::blacklist::Blacklist;
use crate::cache::error::CacheError;
use crate::cache::whitelist::{LocationMetadata, StationEntry, WhitelistStore};
use crate::types::query::QueryFingerprint;
use chrono::Utc;
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task;

/// Shared whitelist and blacklist state for one target.
///
/// Each list sits behind its own async mutex. Every mutation updates memory and
/// persists through the backend while the lock is held, so concurrent callers never
/// lose each other's updates.
#[derive(Debug)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    target: String,
    whitelist: Mutex<WhitelistStore>,
    blacklist: Mutex<Blacklist>,
}

impl CacheStore {
    /// Loads both lists for `target`, starting empty when nothing was stored yet.
    ///
    /// # Arguments
    ///
    /// * `backend` - Storage for the whitelist document and the blacklist lines.
    /// * `target` - Location category the whitelist belongs to, e.g. `CNTRY`. It becomes
    ///   part of a file name, so path separators are rejected.
    /// * `description` - Written into a newly created whitelist only.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidTarget`] for an empty target or one containing a path
    /// separator, [`CacheError::Decode`] for a corrupt whitelist and read errors from
    /// the backend.
    pub async fn open(
        backend: Arc<dyn CacheBackend>,
        target: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, CacheError> {
        let target = target.into();
        let description = description.into();
        if target.is_empty() || target.chars().any(|c| std::path::is_separator(c) || c == '\0') {
            return Err(CacheError::InvalidTarget(target));
        }

        let whitelist = {
            let backend = Arc::clone(&backend);
            let target = target.clone();
            task::spawn_blocking(move || Self::load_whitelist(&*backend, &target, description))
                .await??
        };
        let blacklist = {
            let backend = Arc::clone(&backend);
            task::spawn_blocking(move || backend.read_blacklist()).await??
        };
        let blacklist = Blacklist::from_lines(blacklist.iter().map(String::as_str));

        info!(
            "Opened cache for {target}: {} locations, {} blacklisted queries",
            whitelist.metadata.locations.len(),
            blacklist.len()
        );
        Ok(Self {
            backend,
            target,
            whitelist: Mutex::new(whitelist),
            blacklist: Mutex::new(blacklist),
        })
    }

    /// Opens a store backed by plain files in `folder`.
    pub async fn open_in_folder(
        folder: &Path,
        target: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, CacheError> {
        Self::open(Arc::new(FileBackend::new(folder)), target, description).await
    }

    fn load_whitelist(
        backend: &dyn CacheBackend,
        target: &str,
        description: String,
    ) -> Result<WhitelistStore, CacheError> {
        match backend.read_whitelist(target)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| CacheError::Decode(backend.whitelist_path(target), e)),
            None => Ok(WhitelistStore::new(target, description, Utc::now())),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Whether a query with this fingerprint already came back empty.
    pub async fn is_blacklisted(&self, fingerprint: &QueryFingerprint) -> bool {
        self.blacklist.lock().await.contains(fingerprint)
    }

    /// Blacklists a query that returned no data. Returns `true` if it was new; only new
    /// fingerprints are written to storage.
    ///
    /// The fingerprint enters memory before the append starts, so a caller dropped
    /// mid-write never causes the same line to be appended twice. A failed append
    /// takes it out again.
    pub async fn record_empty(&self, fingerprint: QueryFingerprint) -> Result<bool, CacheError> {
        let mut blacklist = self.blacklist.lock().await;
        if blacklist.contains(&fingerprint) {
            return Ok(false);
        }
        blacklist.insert(fingerprint.clone());
        let backend = Arc::clone(&self.backend);
        let line = fingerprint.as_str().to_string();
        let appended = match task::spawn_blocking(move || backend.append_blacklist(&line)).await {
            Ok(result) => result,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = appended {
            blacklist.remove(&fingerprint);
            return Err(e);
        }
        debug!("Blacklisted {fingerprint}");
        Ok(true)
    }

    pub async fn blacklist_len(&self) -> usize {
        self.blacklist.lock().await.len()
    }

    pub async fn is_location_complete(&self, location_id: &str) -> bool {
        self.whitelist.lock().await.is_complete(location_id)
    }

    pub async fn known_stations(&self, location_id: &str) -> Vec<String> {
        self.whitelist.lock().await.known_stations(location_id)
    }

    pub async fn location_entry(&self, location_id: &str) -> Option<LocationMetadata> {
        self.whitelist.lock().await.location(location_id).cloned()
    }

    /// Snapshot of the whole whitelist.
    pub async fn whitelist(&self) -> WhitelistStore {
        self.whitelist.lock().await.clone()
    }

    /// Records the name and discovered station count of a location and persists the
    /// whitelist.
    ///
    /// # Arguments
    ///
    /// * `location_id` - e.g. `FIPS:BR`.
    /// * `name` - Human readable name. `None` keeps a name stored earlier.
    /// * `total_stations` - Number of distinct stations discovered.
    pub async fn register_location(
        &self,
        location_id: &str,
        name: Option<&str>,
        total_stations: usize,
    ) -> Result<(), CacheError> {
        let mut whitelist = self.whitelist.lock().await;
        whitelist.register_location(location_id, name, total_stations, Utc::now());
        self.persist(&whitelist).await
    }

    /// Sets the totals of a station that returned data and persists the whitelist.
    pub async fn record_success(
        &self,
        location_id: &str,
        station_id: &str,
        items: u64,
        bytes: u64,
    ) -> Result<(), CacheError> {
        let mut whitelist = self.whitelist.lock().await;
        let entry = StationEntry { items, size: bytes };
        if whitelist.station(location_id, station_id) == Some(&entry) {
            if whitelist.record_attempt(location_id, station_id, Utc::now()) {
                self.persist(&whitelist).await?;
            }
            return Ok(());
        }
        whitelist.record_success(location_id, station_id, entry, Utc::now());
        self.persist(&whitelist).await
    }

    /// Notes a station of a known location as tried. The whitelist is persisted when
    /// this raises the location's station total.
    pub async fn record_attempt(&self, location_id: &str, station_id: &str) -> Result<(), CacheError> {
        let mut whitelist = self.whitelist.lock().await;
        if whitelist.record_attempt(location_id, station_id, Utc::now()) {
            self.persist(&whitelist).await?;
        }
        Ok(())
    }

    /// Marks a location `Complete` if every discovered station was attempted.
    pub async fn mark_complete(&self, location_id: &str) -> Result<bool, CacheError> {
        let mut whitelist = self.whitelist.lock().await;
        let was_complete = whitelist.is_complete(location_id);
        let complete = whitelist.mark_complete(location_id, Utc::now());
        if complete && !was_complete {
            info!("Location {location_id} is complete");
            self.persist(&whitelist).await?;
        }
        Ok(complete)
    }

    async fn persist(&self, whitelist: &WhitelistStore) -> Result<(), CacheError> {
        let contents = serde_json::to_vec_pretty(whitelist)
            .map_err(|e| CacheError::Encode(self.target.clone(), e))?;
        let backend = Arc::clone(&self.backend);
        let target = self.target.clone();
        task::spawn_blocking(move || backend.write_whitelist(&target, &contents)).await?
    }
}
