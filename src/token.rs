use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::FrameError;
use crate::source::PhotoSource;
use crate::state::{self, TokenState};

/// Refresh this many seconds before the provider's expiry.
pub const DEFAULT_REFRESH_SKEW_SECS: i64 = 60;

/// Owns the OAuth token pair and keeps the access token fresh.
///
/// The token lives behind an async mutex that is held across the refresh call,
/// so overlapping callers wait for the in-flight refresh and then read its
/// result instead of spending a single-use refresh token twice.
pub struct TokenStore {
    path: PathBuf,
    source: Arc<dyn PhotoSource>,
    clock: Arc<dyn Clock>,
    skew: Duration,
    state: Mutex<TokenState>,
}

impl TokenStore {
    pub fn new(
        path: impl Into<PathBuf>,
        initial: TokenState,
        source: Arc<dyn PhotoSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            path: path.into(),
            source,
            clock,
            skew: Duration::seconds(DEFAULT_REFRESH_SKEW_SECS),
            state: Mutex::new(initial),
        }
    }

    /// Loads the persisted token file. A missing file is a configuration error.
    pub fn open(
        path: &Path,
        source: Arc<dyn PhotoSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, FrameError> {
        let initial = state::read_json_optional::<TokenState>(path)
            .map_err(|err| FrameError::Config(format!("{err:#}")))?
            .ok_or_else(|| {
                FrameError::Config(format!(
                    "token file {} not found; authorize the frame first",
                    path.display()
                ))
            })?;
        Ok(Self::new(path, initial, source, clock))
    }

    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    /// Returns a usable access token, refreshing first when it is about to expire.
    pub async fn current_token(&self) -> Result<String, FrameError> {
        let mut guard = self.state.lock().await;
        if !self.needs_refresh(&guard, self.clock.now()) {
            return Ok(guard.access_token.clone());
        }
        let refreshed = self.refresh(&guard).await?;
        *guard = refreshed;
        Ok(guard.access_token.clone())
    }

    /// Marks the access token as expired so the next call refreshes it.
    pub async fn invalidate(&self) {
        let mut guard = self.state.lock().await;
        warn!("access token rejected; forcing refresh on next use");
        guard.expires_at = DateTime::<Utc>::UNIX_EPOCH;
    }

    pub async fn snapshot(&self) -> TokenState {
        self.state.lock().await.clone()
    }

    fn needs_refresh(&self, state: &TokenState, now: DateTime<Utc>) -> bool {
        state.access_token.is_empty() || now >= state.expires_at - self.skew
    }

    async fn refresh(&self, current: &TokenState) -> Result<TokenState, FrameError> {
        if current.refresh_token.is_empty() {
            return Err(FrameError::AuthRevoked(format!(
                "token file {} has no refresh token",
                self.path.display()
            )));
        }
        let grant = self.source.refresh_token(&current.refresh_token).await?;
        let expires_in = Duration::from_std(grant.expires_in).unwrap_or(Duration::zero());
        let next = TokenState {
            access_token: grant.access_token,
            refresh_token: grant
                .refresh_token
                .unwrap_or_else(|| current.refresh_token.clone()),
            expires_at: self.clock.now() + expires_in,
        };
        state::write_json_atomic(&self.path, &next, 0o600).map_err(|err| {
            FrameError::Storage(format!("refreshed token could not be persisted: {err:#}"))
        })?;
        info!(expires_at = %next.expires_at, "access token refreshed");
        Ok(next)
    }
}
