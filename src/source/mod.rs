use async_trait::async_trait;

use crate::error::FrameError;
use crate::model::{AlbumInfo, PhotoRecord, TokenGrant};

pub mod google;

pub use google::{GoogleCredentials, GooglePhotosSource};

/// Remote photo library the rotation engine reads from.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    /// Lists the photos in `album_id`, or recent library photos when `None`.
    /// The order of the result carries no meaning.
    async fn fetch_catalog(
        &self,
        access_token: &str,
        album_id: Option<&str>,
    ) -> Result<Vec<PhotoRecord>, FrameError>;

    /// Downloads the image bytes for `photo`, sized for the panel.
    async fn fetch_bytes(
        &self,
        access_token: &str,
        photo: &PhotoRecord,
    ) -> Result<Vec<u8>, FrameError>;

    /// Exchanges a refresh token for a new access token.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, FrameError>;

    /// Lists the albums visible to the authorized account.
    async fn list_albums(&self, access_token: &str) -> Result<Vec<AlbumInfo>, FrameError>;
}
