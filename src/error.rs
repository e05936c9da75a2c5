use std::fmt;

use thiserror::Error;

/// Failure category, used both as a log field and as the label on error cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Auth,
    Network,
    Decode,
    Display,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Auth => "auth",
            ErrorKind::Network => "network",
            ErrorKind::Decode => "decode",
            ErrorKind::Display => "display",
        }
    }

    /// Short heading printed on the panel.
    pub fn headline(self) -> &'static str {
        match self {
            ErrorKind::Config => "Configuration error",
            ErrorKind::Auth => "Authorization error",
            ErrorKind::Network => "Network error",
            ErrorKind::Decode => "Unreadable photo",
            ErrorKind::Display => "Display error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Library error type for rotation operations.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Missing or invalid credentials or settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// Persisted state could not be written.
    #[error("storage error: {0}")]
    Storage(String),

    /// The refresh token was rejected. Only a new authorization can fix this.
    #[error("authorization revoked: {0}")]
    AuthRevoked(String),

    /// An API call rejected the current access token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Catalog, image or token endpoint unreachable or answering with an error.
    #[error("network error: {0}")]
    Network(String),

    /// Fetched bytes are not a renderable image.
    #[error("decode error: {0}")]
    Decode(String),

    /// The display sink failed to show a frame.
    #[error("display error: {0}")]
    Display(String),
}

impl FrameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FrameError::Config(_) | FrameError::Storage(_) => ErrorKind::Config,
            FrameError::AuthRevoked(_) | FrameError::Unauthorized(_) => ErrorKind::Auth,
            FrameError::Network(_) => ErrorKind::Network,
            FrameError::Decode(_) => ErrorKind::Decode,
            FrameError::Display(_) => ErrorKind::Display,
        }
    }

    /// Fatal errors stop the rotation loop; everything else is retried on the next tick.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FrameError::Config(_) | FrameError::Storage(_) | FrameError::AuthRevoked(_)
        )
    }
}

impl From<reqwest::Error> for FrameError {
    fn from(err: reqwest::Error) -> Self {
        FrameError::Network(err.to_string())
    }
}
