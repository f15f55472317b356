// src/seen/mod.rs
//! Persisted record of listings that were already notified.
//!
//! The whole state of the watcher is one JSON blob holding an array of listing
//! ids. It is read once at the start of an invocation and overwritten once at
//! the end; there is no versioning, so the last writer wins.

pub mod backend;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::listing::ListingId;
use backend::BlobBackend;

pub const CONTAINER_NAME: &str = "seen-ads";
pub const BLOB_NAME: &str = "seen_ads.json";

/// Set of listing ids; each id may carry the time it was first seen.
///
/// Equality compares ids only.
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    entries: HashMap<ListingId, Option<DateTime<Utc>>>,
}

impl PartialEq for SeenSet {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.keys().all(|k| other.entries.contains_key(k))
    }
}

impl Eq for SeenSet {}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &ListingId) -> bool {
        self.entries.contains_key(id)
    }

    /// Insert without a timestamp. Returns false if already present.
    pub fn insert(&mut self, id: ListingId) -> bool {
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(id, None);
        true
    }

    /// Insert stamped with `at`; an existing entry keeps its original stamp.
    pub fn insert_at(&mut self, id: ListingId, at: DateTime<Utc>) -> bool {
        match self.entries.get_mut(&id) {
            Some(slot) => {
                if slot.is_none() {
                    *slot = Some(at);
                }
                false
            }
            None => {
                self.entries.insert(id, Some(at));
                true
            }
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &ListingId> {
        self.entries.keys()
    }

    pub fn first_seen(&self, id: &ListingId) -> Option<DateTime<Utc>> {
        self.entries.get(id).copied().flatten()
    }

    pub fn is_superset(&self, other: &SeenSet) -> bool {
        other.entries.keys().all(|k| self.entries.contains_key(k))
    }

    /// `self ∪ fetched`, stamping ids that were not there yet with `now`.
    pub fn union_with<'a>(
        &self,
        fetched: impl IntoIterator<Item = &'a ListingId>,
        now: DateTime<Utc>,
    ) -> SeenSet {
        let mut out = self.clone();
        for id in fetched {
            out.insert_at(id.clone(), now);
        }
        out
    }

    /// Drop entries first seen before `cutoff`, except those in `keep`.
    /// Unstamped entries are stamped with `now` instead of being dropped.
    pub fn expire(&mut self, cutoff: DateTime<Utc>, now: DateTime<Utc>, keep: &HashSet<&ListingId>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|id, seen_at| match seen_at {
            Some(ts) => *ts >= cutoff || keep.contains(id),
            None => {
                *seen_at = Some(now);
                true
            }
        });
        before - self.entries.len()
    }

    /// Encode as a JSON array, sorted so the blob is stable between runs.
    /// With `stamped`, entries are `{id, seen_at}` objects instead of bare strings.
    pub fn to_json(&self, stamped: bool) -> Result<Vec<u8>, serde_json::Error> {
        let mut ids: Vec<(&ListingId, &Option<DateTime<Utc>>)> = self.entries.iter().collect();
        ids.sort_by(|a, b| a.0.cmp(b.0));
        if stamped {
            let rows: Vec<StampedRow<'_>> = ids
                .into_iter()
                .map(|(id, seen_at)| StampedRow {
                    id: id.as_str(),
                    seen_at: *seen_at,
                })
                .collect();
            serde_json::to_vec(&rows)
        } else {
            let rows: Vec<&str> = ids.into_iter().map(|(id, _)| id.as_str()).collect();
            serde_json::to_vec(&rows)
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let rows: Vec<StoredEntry> = serde_json::from_slice(bytes)?;
        let mut set = SeenSet::new();
        for row in rows {
            match row {
                StoredEntry::Bare(id) => {
                    set.insert(ListingId::new(id));
                }
                StoredEntry::Numeric(n) => {
                    set.insert(ListingId::from(n));
                }
                StoredEntry::Stamped { id, seen_at } => match seen_at {
                    Some(ts) => {
                        set.insert_at(ListingId::new(id), ts);
                    }
                    None => {
                        set.insert(ListingId::new(id));
                    }
                },
            }
        }
        Ok(set)
    }
}

impl FromIterator<ListingId> for SeenSet {
    fn from_iter<I: IntoIterator<Item = ListingId>>(iter: I) -> Self {
        let mut set = SeenSet::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

impl<'a> FromIterator<&'a str> for SeenSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().map(ListingId::from).collect()
    }
}

#[derive(Serialize)]
struct StampedRow<'a> {
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    seen_at: Option<DateTime<Utc>>,
}

// --- tolerant element shapes accepted on load ---

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Bare(String),
    // older blobs were written with numeric provider ids
    Numeric(u64),
    Stamped {
        id: String,
        #[serde(default)]
        seen_at: Option<DateTime<Utc>>,
    },
}

/// Loads and persists the [`SeenSet`] through a [`BlobBackend`].
#[derive(Clone)]
pub struct SeenStore {
    backend: Arc<dyn BlobBackend>,
    blob: String,
    retention: Option<Duration>,
}

impl SeenStore {
    pub fn new(backend: Arc<dyn BlobBackend>) -> Self {
        Self {
            backend,
            blob: BLOB_NAME.to_string(),
            retention: None,
        }
    }

    /// Keep ids for `days` after they were first seen. `None` keeps them forever.
    pub fn with_retention_days(mut self, days: Option<u32>) -> Self {
        self.retention = days.map(|d| Duration::days(i64::from(d)));
        self
    }

    pub fn retention(&self) -> Option<Duration> {
        self.retention
    }

    pub fn location(&self) -> String {
        format!("{}/{}", self.backend.describe(), self.blob)
    }

    /// Never fails: a missing, unreadable or malformed blob yields an empty set.
    pub async fn load(&self) -> SeenSet {
        match self.try_load().await {
            Ok(Some(set)) => {
                debug!(count = set.len(), location = %self.location(), "seen-set loaded");
                set
            }
            Ok(None) => {
                debug!(location = %self.location(), "no seen-set yet; starting empty");
                SeenSet::new()
            }
            Err(err) => {
                warn!(error = %err, location = %self.location(), "seen-set load failed; starting empty");
                SeenSet::new()
            }
        }
    }

    pub async fn try_load(&self) -> Result<Option<SeenSet>, StoreError> {
        match self.backend.get(&self.blob).await? {
            Some(bytes) => Ok(Some(SeenSet::from_json(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Overwrite the blob with the full set.
    pub async fn save(&self, set: &SeenSet) -> Result<(), StoreError> {
        let bytes = set.to_json(self.retention.is_some())?;
        self.backend.put(&self.blob, bytes).await
    }

    /// The union step of an invocation: `seen ∪ fetched`, then retention if enabled.
    /// Ids fetched in this invocation always survive.
    pub fn merge(&self, seen: &SeenSet, fetched: &[ListingId], now: DateTime<Utc>) -> SeenSet {
        let mut merged = seen.union_with(fetched, now);
        // a window reaching past the representable past expires nothing
        if let Some(cutoff) = self.retention.and_then(|w| now.checked_sub_signed(w)) {
            let keep: HashSet<&ListingId> = fetched.iter().collect();
            let dropped = merged.expire(cutoff, now, &keep);
            if dropped > 0 {
                debug!(dropped, "expired seen ids past retention");
            }
        }
        merged
    }
}
