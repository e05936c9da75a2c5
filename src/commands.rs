//! One-shot diagnostics behind `test-auth` and `list-albums`.
//!
//! Neither touches the rotation state file.

use tracing::info;

use crate::error::FrameError;
use crate::model::AlbumInfo;
use crate::source::PhotoSource;
use crate::token::TokenStore;

/// Obtains a valid token (refreshing if due) and fetches the catalog once.
/// Returns the number of photos found.
pub async fn test_auth(
    tokens: &TokenStore,
    source: &dyn PhotoSource,
    album_id: Option<&str>,
) -> Result<usize, FrameError> {
    let token = tokens.current_token().await?;
    info!("access token is valid");
    let photos = source.fetch_catalog(&token, album_id).await?;
    info!(photos = photos.len(), album = album_id, "catalog fetched");
    Ok(photos.len())
}

pub async fn list_albums(
    tokens: &TokenStore,
    source: &dyn PhotoSource,
) -> Result<Vec<AlbumInfo>, FrameError> {
    let token = tokens.current_token().await?;
    let albums = source.list_albums(&token).await?;
    info!(albums = albums.len(), "albums listed");
    Ok(albums)
}
