use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::catalog::CatalogCache;
use crate::clock::Clock;
use crate::display::DisplaySink;
use crate::error::{ErrorKind, FrameError};
use crate::model::{Card, PhotoRecord};
use crate::selector::{Selection, Selector};
use crate::source::PhotoSource;
use crate::state::{self, RotationState};
use crate::token::TokenStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Ticking,
    Rendered,
    Errored,
    /// Terminal.
    Stopped,
}

/// What a single tick ended up showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Rendered { id: String },
    NothingToShow,
    /// A recoverable failure was shown as an error card.
    Errored(ErrorKind),
    /// Shutdown was requested between pipeline steps.
    Cancelled,
}

/// Drives one fetch-render cycle per interval.
///
/// Every failure except a fatal one is turned into an error card and retried
/// after the regular interval; there is no backoff.
pub struct RotationScheduler {
    catalog: CatalogCache,
    selector: Selector,
    tokens: Arc<TokenStore>,
    source: Arc<dyn PhotoSource>,
    sink: Arc<dyn DisplaySink>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    state_file: Option<PathBuf>,
    last_rotated_at: Option<DateTime<Utc>>,
    state: SchedulerState,
}

impl RotationScheduler {
    pub fn new(
        catalog: CatalogCache,
        selector: Selector,
        tokens: Arc<TokenStore>,
        source: Arc<dyn PhotoSource>,
        sink: Arc<dyn DisplaySink>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            catalog,
            selector,
            tokens,
            source,
            sink,
            clock,
            interval,
            state_file: None,
            last_rotated_at: None,
            state: SchedulerState::Idle,
        }
    }

    /// Persist the rotation position to `path` after every rendered photo.
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = Some(path.into());
        self
    }

    /// Delays the first tick until `last + interval` when that is still ahead.
    pub fn with_last_rotated_at(mut self, last: Option<DateTime<Utc>>) -> Self {
        self.last_rotated_at = last;
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Runs until `cancel` fires (`Ok`) or a fatal error occurs (`Err`).
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), FrameError> {
        let mut wait = self.initial_delay();
        if !wait.is_zero() {
            info!(wait = ?wait, "resuming rotation; waiting out the current interval");
        }
        loop {
            if !wait.is_zero() {
                self.transition(SchedulerState::Idle);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(wait) => {}
                }
            }
            if cancel.is_cancelled() {
                break;
            }
            if let Err(err) = self.tick(&cancel).await {
                error!(
                    category = err.kind().label(),
                    error = %err,
                    "fatal error; stopping rotation"
                );
                self.transition(SchedulerState::Stopped);
                return Err(err);
            }
            wait = self.interval;
        }
        self.transition(SchedulerState::Stopped);
        info!("rotation stopped");
        Ok(())
    }

    /// Runs the pipeline once. Only fatal errors are returned as `Err`; an error
    /// card has already been rendered for them.
    pub async fn tick(&mut self, cancel: &CancellationToken) -> Result<TickOutcome, FrameError> {
        self.transition(SchedulerState::Ticking);
        match self.attempt(cancel).await {
            Ok(TickOutcome::Cancelled) => {
                self.transition(SchedulerState::Idle);
                Ok(TickOutcome::Cancelled)
            }
            Ok(outcome) => {
                self.transition(SchedulerState::Rendered);
                Ok(outcome)
            }
            Err(err) => {
                warn!(category = err.kind().label(), error = %err, "tick failed");
                let shown = self.sink.render_card(&Card::error(&err)).await;
                if let Some(display_err) = shown.into_error() {
                    warn!(error = %display_err, "error card could not be shown");
                }
                self.transition(SchedulerState::Errored);
                if err.is_fatal() {
                    Err(err)
                } else {
                    Ok(TickOutcome::Errored(err.kind()))
                }
            }
        }
    }

    async fn attempt(&mut self, cancel: &CancellationToken) -> Result<TickOutcome, FrameError> {
        let snapshot = self.catalog.get_current().await?;
        if cancel.is_cancelled() {
            return Ok(TickOutcome::Cancelled);
        }

        let photo = match self.selector.next(&snapshot) {
            Selection::Photo(photo) => photo,
            Selection::Empty => {
                info!("catalog is empty; nothing to show");
                if let Some(err) = self.sink.render_card(&Card::NothingToShow).await.into_error() {
                    return Err(err);
                }
                return Ok(TickOutcome::NothingToShow);
            }
        };

        let bytes = self.fetch_bytes(&photo).await?;
        if cancel.is_cancelled() {
            return Ok(TickOutcome::Cancelled);
        }

        if let Some(err) = self.sink.render_photo(&photo, &bytes).await.into_error() {
            return Err(err);
        }
        info!(
            id = %photo.id,
            filename = %photo.filename,
            position = self.selector.cursor(),
            cycle = self.selector.ordered_ids().len(),
            "photo rendered"
        );
        self.last_rotated_at = Some(self.clock.now());
        self.persist();
        Ok(TickOutcome::Rendered { id: photo.id })
    }

    async fn fetch_bytes(&self, photo: &PhotoRecord) -> Result<Vec<u8>, FrameError> {
        let token = self.tokens.current_token().await?;
        match self.source.fetch_bytes(&token, photo).await {
            Err(err @ FrameError::Unauthorized(_)) => {
                self.tokens.invalidate().await;
                Err(err)
            }
            other => other,
        }
    }

    fn persist(&self) {
        let Some(path) = &self.state_file else {
            return;
        };
        let snapshot = RotationState {
            ordered_ids: self.selector.ordered_ids().to_vec(),
            cursor: self.selector.cursor(),
            last_rotated_at: self.last_rotated_at,
            interval_seconds: self.interval.as_secs(),
        };
        if let Err(err) = state::write_json_atomic(path, &snapshot, 0o644) {
            warn!(path = %path.display(), error = %format!("{err:#}"), "failed to persist rotation state");
        }
    }

    fn initial_delay(&self) -> Duration {
        let Some(last) = self.last_rotated_at else {
            return Duration::ZERO;
        };
        let elapsed = (self.clock.now() - last).to_std().unwrap_or(Duration::ZERO);
        self.interval.saturating_sub(elapsed)
    }

    fn transition(&mut self, next: SchedulerState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "scheduler state");
            self.state = next;
        }
    }
}
