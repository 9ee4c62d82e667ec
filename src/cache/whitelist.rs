//! Durable record of which stations produced data for which locations.
//!
//! The on-disk form is one JSON document per target (a location category such as
//! `CNTRY`): a `metadata` object with store-wide totals and one summary per location,
//! plus one top-level object per location mapping station ids to their item counts and
//! sizes. Totals are always derived from the station entries, never stored on their own.

use crate::utils::{format_size, parse_size};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Completion state of a location. `"C"` and `"I"` are accepted as legacy spellings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationStatus {
    #[serde(alias = "C")]
    Complete,
    #[default]
    #[serde(alias = "I")]
    Incomplete,
}

/// Data recorded for one station of a location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationEntry {
    pub items: u64,
    #[serde(with = "human_size")]
    pub size: u64,
}

/// `with_data/total` station count, serialized as `"2/3"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StationCount {
    pub with_data: usize,
    pub total: usize,
}

impl fmt::Display for StationCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.with_data, self.total)
    }
}

impl From<StationCount> for String {
    fn from(count: StationCount) -> Self {
        count.to_string()
    }
}

impl TryFrom<String> for StationCount {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let parse = |part: &str| part.trim().parse::<usize>().ok();
        value
            .split_once('/')
            .and_then(|(with_data, total)| {
                Some(StationCount {
                    with_data: parse(with_data)?,
                    total: parse(total)?,
                })
            })
            .ok_or_else(|| format!("invalid station count '{value}'"))
    }
}

/// Per-location summary kept under `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationMetadata {
    #[serde(default)]
    pub name: String,
    pub items: u64,
    #[serde(with = "human_size")]
    pub size: u64,
    #[serde(default)]
    pub status: LocationStatus,
    #[serde(default)]
    pub count: StationCount,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    // Stations tried during this process, used to decide completion.
    #[serde(skip)]
    attempted: BTreeSet<String>,
}

impl LocationMetadata {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            name: String::new(),
            items: 0,
            size: 0,
            status: LocationStatus::Incomplete,
            count: StationCount::default(),
            created: now,
            updated: now,
            attempted: BTreeSet::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == LocationStatus::Complete
    }

    /// Stations attempted since this store was loaded.
    pub fn attempted(&self) -> &BTreeSet<String> {
        &self.attempted
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhitelistMetadata {
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub total_items: u64,
    #[serde(with = "human_size")]
    pub total_size: u64,
    #[serde(flatten)]
    pub locations: BTreeMap<String, LocationMetadata>,
}

/// The whole whitelist document for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhitelistStore {
    pub target: String,
    #[serde(default)]
    pub description: String,
    pub metadata: WhitelistMetadata,
    #[serde(flatten)]
    pub stations: BTreeMap<String, BTreeMap<String, StationEntry>>,
}

impl WhitelistStore {
    pub fn new(target: impl Into<String>, description: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            target: target.into(),
            description: description.into(),
            metadata: WhitelistMetadata {
                created: now,
                updated: now,
                total_items: 0,
                total_size: 0,
                locations: BTreeMap::new(),
            },
            stations: BTreeMap::new(),
        }
    }

    pub fn location(&self, location_id: &str) -> Option<&LocationMetadata> {
        self.metadata.locations.get(location_id)
    }

    pub fn is_complete(&self, location_id: &str) -> bool {
        self.location(location_id)
            .is_some_and(LocationMetadata::is_complete)
    }

    /// Stations known to have data for `location_id`, in id order.
    pub fn known_stations(&self, location_id: &str) -> Vec<String> {
        self.stations
            .get(location_id)
            .map(|stations| stations.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn station(&self, location_id: &str, station_id: &str) -> Option<&StationEntry> {
        self.stations.get(location_id)?.get(station_id)
    }

    fn location_mut(&mut self, location_id: &str, now: DateTime<Utc>) -> &mut LocationMetadata {
        self.metadata
            .locations
            .entry(location_id.to_string())
            .or_insert_with(|| LocationMetadata::new(now))
    }

    /// Records the name and the number of stations discovered for a location.
    pub fn register_location(
        &mut self,
        location_id: &str,
        name: Option<&str>,
        total_stations: usize,
        now: DateTime<Utc>,
    ) {
        let location = self.location_mut(location_id, now);
        if let Some(name) = name {
            location.name = name.to_string();
        }
        location.count.total = total_stations;
        location.updated = now;
        self.recompute_totals();
        self.metadata.updated = now;
    }

    /// Stores the totals of one station. Recording the same values twice leaves every
    /// total unchanged.
    pub fn record_success(
        &mut self,
        location_id: &str,
        station_id: &str,
        entry: StationEntry,
        now: DateTime<Utc>,
    ) {
        self.stations
            .entry(location_id.to_string())
            .or_default()
            .insert(station_id.to_string(), entry);
        let location = self.location_mut(location_id, now);
        location.attempted.insert(station_id.to_string());
        location.updated = now;
        self.recompute_totals();
        self.metadata.updated = now;
    }

    /// Notes that a station of a known location was fully tried, whether or not it
    /// had data. Attempted stations count towards the location's station total.
    ///
    /// # Returns
    ///
    /// `true` when the stored station count changed and should be persisted. Unknown
    /// locations are left alone and yield `false`.
    pub fn record_attempt(&mut self, location_id: &str, station_id: &str, now: DateTime<Utc>) -> bool {
        let Some(location) = self.metadata.locations.get_mut(location_id) else {
            return false;
        };
        if !location.attempted.insert(station_id.to_string()) {
            return false;
        }
        let before = location.count;
        self.recompute_totals();
        let Some(location) = self.metadata.locations.get_mut(location_id) else {
            return false;
        };
        if location.count == before {
            return false;
        }
        location.updated = now;
        self.metadata.updated = now;
        true
    }

    /// Flips a location to `Complete` once every discovered station was attempted.
    /// A location without any station never completes.
    /// Returns whether the location is complete afterwards.
    pub fn mark_complete(&mut self, location_id: &str, now: DateTime<Utc>) -> bool {
        let Some(location) = self.metadata.locations.get_mut(location_id) else {
            return false;
        };
        if location.is_complete() {
            return true;
        }
        if location.count.total == 0 || location.attempted.len() < location.count.total {
            return false;
        }
        location.status = LocationStatus::Complete;
        location.updated = now;
        self.metadata.updated = now;
        true
    }

    fn recompute_totals(&mut self) {
        let mut total_items = 0;
        let mut total_size = 0;
        for (location_id, location) in self.metadata.locations.iter_mut() {
            let stations = self.stations.get(location_id);
            location.items = stations.map_or(0, |s| s.values().map(|e| e.items).sum());
            location.size = stations.map_or(0, |s| s.values().map(|e| e.size).sum());
            location.count.with_data = stations.map_or(0, BTreeMap::len);
            location.count.total = location
                .count
                .total
                .max(location.count.with_data)
                .max(location.attempted.len());
            total_items += location.items;
            total_size += location.size;
        }
        self.metadata.total_items = total_items;
        self.metadata.total_size = total_size;
    }
}

/// Serde adapter storing byte counts as human-readable strings such as `1.17 KiB`.
/// Plain integers are accepted when reading.
pub(crate) mod human_size {
    use super::{format_size, parse_size};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_size(*bytes))
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Bytes(u64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Bytes(bytes) => Ok(bytes),
            Repr::Text(text) => parse_size(&text)
                .ok_or_else(|| de::Error::custom(format!("invalid size '{text}'"))),
        }
    }
}
