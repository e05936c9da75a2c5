use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{ErrorKind, FrameError};

/// One photo from the remote catalog. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRecord {
    pub id: String,
    /// Opaque handle the source uses to fetch the bytes.
    pub source_ref: String,
    pub filename: String,
    pub created_at: Option<DateTime<Utc>>,
    pub album_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumInfo {
    pub id: String,
    pub title: String,
    pub media_items_count: u64,
}

/// Result of a successful refresh-token exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Present only when the provider rotated the refresh token.
    pub refresh_token: Option<String>,
    pub expires_in: Duration,
}

/// Non-photo frames the sink knows how to draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Card {
    Error { kind: ErrorKind, message: String },
    NothingToShow,
}

impl Card {
    const MAX_MESSAGE_CHARS: usize = 60;

    pub fn error(err: &FrameError) -> Self {
        let text = err.to_string();
        let message = if text.chars().count() > Self::MAX_MESSAGE_CHARS {
            let mut short: String = text.chars().take(Self::MAX_MESSAGE_CHARS - 3).collect();
            short.push_str("...");
            short
        } else {
            text
        };
        Card::Error {
            kind: err.kind(),
            message,
        }
    }

    pub fn headline(&self) -> &'static str {
        match self {
            Card::Error { kind, .. } => kind.headline(),
            Card::NothingToShow => "No photos to show",
        }
    }
}

/// What the display sink reports back after a render call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayOutcome {
    pub succeeded: bool,
    pub error_kind: Option<ErrorKind>,
    pub detail: Option<String>,
}

impl DisplayOutcome {
    pub fn rendered() -> Self {
        Self {
            succeeded: true,
            error_kind: None,
            detail: None,
        }
    }

    pub fn failed(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            error_kind: Some(kind),
            detail: Some(detail.into()),
        }
    }

    pub fn from_error(err: &FrameError) -> Self {
        Self::failed(err.kind(), err.to_string())
    }

    /// Converts a failed outcome back into the error it reports.
    pub fn into_error(self) -> Option<FrameError> {
        if self.succeeded {
            return None;
        }
        let detail = self
            .detail
            .unwrap_or_else(|| "display sink reported a failure".to_string());
        Some(match self.error_kind {
            Some(ErrorKind::Decode) => FrameError::Decode(detail),
            _ => FrameError::Display(detail),
        })
    }
}
