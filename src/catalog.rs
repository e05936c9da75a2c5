use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::FrameError;
use crate::model::PhotoRecord;
use crate::source::PhotoSource;
use crate::token::TokenStore;

/// Immutable view of the remote catalog at one point in time.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    entries: Vec<PhotoRecord>,
    index: HashMap<String, usize>,
    fetched_at: DateTime<Utc>,
    ttl: Duration,
}

impl CatalogSnapshot {
    /// Builds a snapshot, keeping the first record for each id.
    pub fn new(records: Vec<PhotoRecord>, fetched_at: DateTime<Utc>, ttl: Duration) -> Self {
        let mut seen = HashSet::with_capacity(records.len());
        let entries: Vec<PhotoRecord> = records
            .into_iter()
            .filter(|record| seen.insert(record.id.clone()))
            .collect();
        let index = entries
            .iter()
            .enumerate()
            .map(|(idx, record)| (record.id.clone(), idx))
            .collect();
        Self {
            entries,
            index,
            fetched_at,
            ttl,
        }
    }

    pub fn entries(&self) -> &[PhotoRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// An empty snapshot is a valid result (e.g. an empty album), not a failure.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&PhotoRecord> {
        self.index.get(id).map(|&idx| &self.entries[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|record| record.id.as_str())
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        self.fetched_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

/// TTL-bounded cache of the catalog, refreshed through the photo source.
pub struct CatalogCache {
    source: Arc<dyn PhotoSource>,
    tokens: Arc<TokenStore>,
    clock: Arc<dyn Clock>,
    album_id: Option<String>,
    ttl: Duration,
    current: Option<Arc<CatalogSnapshot>>,
}

impl CatalogCache {
    pub fn new(
        source: Arc<dyn PhotoSource>,
        tokens: Arc<TokenStore>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            source,
            tokens,
            clock,
            album_id: None,
            ttl,
            current: None,
        }
    }

    pub fn with_album(mut self, album_id: Option<String>) -> Self {
        self.album_id = album_id;
        self
    }

    /// Snapshot held right now, fresh or not.
    pub fn cached(&self) -> Option<Arc<CatalogSnapshot>> {
        self.current.clone()
    }

    /// Returns a fresh snapshot, fetching when the held one is stale or absent.
    ///
    /// A failed refresh falls back to the stale snapshot when there is one.
    /// Fatal errors (revoked authorization) always propagate.
    pub async fn get_current(&mut self) -> Result<Arc<CatalogSnapshot>, FrameError> {
        let now = self.clock.now();
        if let Some(snapshot) = &self.current {
            if !snapshot.is_stale_at(now) {
                debug!(photos = snapshot.len(), "catalog cache hit");
                return Ok(Arc::clone(snapshot));
            }
        }

        match self.fetch().await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                info!(
                    photos = snapshot.len(),
                    fetched_at = %snapshot.fetched_at(),
                    album = self.album_id.as_deref(),
                    "catalog refreshed"
                );
                self.current = Some(Arc::clone(&snapshot));
                Ok(snapshot)
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => match &self.current {
                Some(stale) => {
                    warn!(
                        category = err.kind().label(),
                        error = %err,
                        fetched_at = %stale.fetched_at(),
                        "catalog refresh failed; using stale snapshot"
                    );
                    Ok(Arc::clone(stale))
                }
                None => Err(err),
            },
        }
    }

    async fn fetch(&self) -> Result<CatalogSnapshot, FrameError> {
        let token = self.tokens.current_token().await?;
        let records = match self
            .source
            .fetch_catalog(&token, self.album_id.as_deref())
            .await
        {
            Ok(records) => records,
            Err(err @ FrameError::Unauthorized(_)) => {
                self.tokens.invalidate().await;
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        Ok(CatalogSnapshot::new(records, self.clock.now(), self.ttl))
    }
}
