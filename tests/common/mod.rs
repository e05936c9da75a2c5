#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_eink_frame::clock::{Clock, ManualClock};
use rust_eink_frame::error::FrameError;
use rust_eink_frame::model::{AlbumInfo, Card, DisplayOutcome, PhotoRecord, TokenGrant};
use rust_eink_frame::source::PhotoSource;
use rust_eink_frame::display::DisplaySink;
use rust_eink_frame::state::TokenState;
use rust_eink_frame::token::TokenStore;

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap()
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(start()))
}

pub fn photo(id: &str) -> PhotoRecord {
    PhotoRecord {
        id: id.to_string(),
        source_ref: format!("https://photos.test/{id}"),
        filename: format!("{id}.jpg"),
        created_at: Some(start()),
        album_id: None,
    }
}

pub fn photos(ids: &[&str]) -> Vec<PhotoRecord> {
    ids.iter().map(|id| photo(id)).collect()
}

/// Scripted photo source. Queued failures are consumed one call at a time;
/// once a queue is empty the call succeeds.
pub struct FakeSource {
    catalog: Mutex<Vec<PhotoRecord>>,
    catalog_failures: Mutex<VecDeque<FrameError>>,
    bytes_failures: Mutex<VecDeque<FrameError>>,
    refresh_failures: Mutex<VecDeque<FrameError>>,
    album_failures: Mutex<VecDeque<FrameError>>,
    refresh_delay: Mutex<Duration>,
    rotate_refresh_token: Mutex<bool>,
    pub catalog_calls: AtomicUsize,
    pub bytes_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(catalog: Vec<PhotoRecord>) -> Arc<Self> {
        Arc::new(Self {
            catalog: Mutex::new(catalog),
            catalog_failures: Mutex::new(VecDeque::new()),
            bytes_failures: Mutex::new(VecDeque::new()),
            refresh_failures: Mutex::new(VecDeque::new()),
            album_failures: Mutex::new(VecDeque::new()),
            refresh_delay: Mutex::new(Duration::ZERO),
            rotate_refresh_token: Mutex::new(false),
            catalog_calls: AtomicUsize::new(0),
            bytes_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_catalog(&self, catalog: Vec<PhotoRecord>) {
        *self.catalog.lock().unwrap() = catalog;
    }

    pub fn fail_catalog(&self, err: FrameError) {
        self.catalog_failures.lock().unwrap().push_back(err);
    }

    pub fn fail_bytes(&self, err: FrameError) {
        self.bytes_failures.lock().unwrap().push_back(err);
    }

    pub fn fail_refresh(&self, err: FrameError) {
        self.refresh_failures.lock().unwrap().push_back(err);
    }

    pub fn fail_albums(&self, err: FrameError) {
        self.album_failures.lock().unwrap().push_back(err);
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    pub fn rotate_refresh_token(&self) {
        *self.rotate_refresh_token.lock().unwrap() = true;
    }

    pub fn catalog_calls(&self) -> usize {
        self.catalog_calls.load(Ordering::SeqCst)
    }

    pub fn bytes_calls(&self) -> usize {
        self.bytes_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PhotoSource for FakeSource {
    async fn fetch_catalog(
        &self,
        _access_token: &str,
        _album_id: Option<&str>,
    ) -> Result<Vec<PhotoRecord>, FrameError> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.catalog_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self.catalog.lock().unwrap().clone())
    }

    async fn fetch_bytes(
        &self,
        _access_token: &str,
        photo: &PhotoRecord,
    ) -> Result<Vec<u8>, FrameError> {
        self.bytes_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.bytes_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(photo.id.as_bytes().to_vec())
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, FrameError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.refresh_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.refresh_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let rotate = *self.rotate_refresh_token.lock().unwrap();
        Ok(TokenGrant {
            access_token: format!("access-{n}"),
            refresh_token: rotate.then(|| format!("{refresh_token}-next")),
            expires_in: Duration::from_secs(3600),
        })
    }

    async fn list_albums(&self, _access_token: &str) -> Result<Vec<AlbumInfo>, FrameError> {
        if let Some(err) = self.album_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(vec![AlbumInfo {
            id: "album-1".into(),
            title: "Holidays".into(),
            media_items_count: 3,
        }])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shown {
    Photo(String),
    Card(Card),
}

/// Display sink that records every frame it is asked to draw.
#[derive(Default)]
pub struct RecordingSink {
    shown: Mutex<Vec<Shown>>,
    photo_outcomes: Mutex<VecDeque<DisplayOutcome>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next `render_photo` call reports `outcome` instead of success.
    pub fn script_photo_outcome(&self, outcome: DisplayOutcome) {
        self.photo_outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn shown(&self) -> Vec<Shown> {
        self.shown.lock().unwrap().clone()
    }

    pub fn photo_ids(&self) -> Vec<String> {
        self.shown()
            .into_iter()
            .filter_map(|shown| match shown {
                Shown::Photo(id) => Some(id),
                Shown::Card(_) => None,
            })
            .collect()
    }

    pub fn last(&self) -> Option<Shown> {
        self.shown.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl DisplaySink for RecordingSink {
    async fn render_photo(&self, photo: &PhotoRecord, _bytes: &[u8]) -> DisplayOutcome {
        if let Some(outcome) = self.photo_outcomes.lock().unwrap().pop_front() {
            return outcome;
        }
        self.shown
            .lock()
            .unwrap()
            .push(Shown::Photo(photo.id.clone()));
        DisplayOutcome::rendered()
    }

    async fn render_card(&self, card: &Card) -> DisplayOutcome {
        self.shown.lock().unwrap().push(Shown::Card(card.clone()));
        DisplayOutcome::rendered()
    }
}

pub fn token_state(access: &str, expires_at: DateTime<Utc>) -> TokenState {
    TokenState {
        access_token: access.to_string(),
        refresh_token: "refresh-0".to_string(),
        expires_at,
    }
}

/// Token store whose access token stays valid for `valid_for` after `start()`.
pub fn token_store(
    dir: &Path,
    source: Arc<FakeSource>,
    clock: Arc<ManualClock>,
    valid_for: chrono::Duration,
) -> Arc<TokenStore> {
    let clock: Arc<dyn Clock> = clock;
    Arc::new(TokenStore::new(
        dir.join("token.json"),
        token_state("access-0", start() + valid_for),
        source,
        clock,
    ))
}
