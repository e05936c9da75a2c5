use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::PhotoSource;
use crate::config::Configuration;
use crate::error::FrameError;
use crate::model::{AlbumInfo, PhotoRecord, TokenGrant};

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const MEDIA_PAGE_SIZE: usize = 100;
const ALBUM_PAGE_SIZE: usize = 50;
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;
/// OAuth error codes meaning the stored grant or client is no longer accepted.
const REVOKED_GRANT_ERRORS: [&str; 3] = ["invalid_grant", "invalid_client", "unauthorized_client"];
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OAuth client identity from the `credentials.json` downloaded from the Google console.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GoogleCredentials {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<GoogleCredentials>,
    web: Option<GoogleCredentials>,
}

impl GoogleCredentials {
    pub fn from_file(path: &Path) -> Result<Self, FrameError> {
        let data = std::fs::read(path).map_err(|err| {
            FrameError::Config(format!(
                "cannot read credentials file {}: {err}",
                path.display()
            ))
        })?;
        let file: ClientSecretsFile = serde_json::from_slice(&data).map_err(|err| {
            FrameError::Config(format!(
                "invalid credentials file {}: {err}",
                path.display()
            ))
        })?;
        file.installed.or(file.web).ok_or_else(|| {
            FrameError::Config(format!(
                "credentials file {} has neither an 'installed' nor a 'web' client",
                path.display()
            ))
        })
    }
}

/// Google Photos Library API client.
pub struct GooglePhotosSource {
    http: Client,
    api_base: String,
    token_uri: String,
    credentials: GoogleCredentials,
    recent_limit: usize,
    image_size: (u32, u32),
}

impl GooglePhotosSource {
    pub fn new(
        credentials: GoogleCredentials,
        api_base: impl Into<String>,
    ) -> Result<Self, FrameError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| FrameError::Config(format!("failed to build HTTP client: {err}")))?;
        let token_uri = credentials
            .token_uri
            .clone()
            .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token_uri,
            credentials,
            recent_limit: 500,
            image_size: (800, 480),
        })
    }

    pub fn from_config(cfg: &Configuration) -> Result<Self, FrameError> {
        let credentials = GoogleCredentials::from_file(&cfg.credentials_file)?;
        let photo_height = cfg.display.height - cfg.display.caption_height;
        let mut source = Self::new(credentials, cfg.api_base_url.as_str())?
            .with_recent_limit(cfg.recent_photos_limit)
            .with_image_size(cfg.display.width, photo_height);
        if let Some(uri) = &cfg.token_uri {
            source = source.with_token_uri(uri.clone());
        }
        Ok(source)
    }

    pub fn with_token_uri(mut self, uri: impl Into<String>) -> Self {
        self.token_uri = uri.into();
        self
    }

    pub fn with_recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit.max(1);
        self
    }

    /// Bounding box requested from the image service.
    pub fn with_image_size(mut self, width: u32, height: u32) -> Self {
        self.image_size = (width.max(1), height.max(1));
        self
    }

    async fn search_album(
        &self,
        access_token: &str,
        album_id: &str,
    ) -> Result<Vec<PhotoRecord>, FrameError> {
        let url = format!("{}/v1/mediaItems:search", self.api_base);
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let body = SearchRequest {
                album_id,
                page_size: MEDIA_PAGE_SIZE,
                page_token: page_token.as_deref(),
            };
            let response = self
                .http
                .post(&url)
                .bearer_auth(access_token)
                .json(&body)
                .send()
                .await?;
            let page: MediaItemsPage = check_status(response, "mediaItems:search")
                .await?
                .json()
                .await?;
            debug!(items = page.media_items.len(), album = album_id, "catalog page");
            records.extend(
                page.media_items
                    .into_iter()
                    .filter_map(|item| item.into_record(Some(album_id))),
            );
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(records)
    }

    async fn list_recent(&self, access_token: &str) -> Result<Vec<PhotoRecord>, FrameError> {
        let url = format!("{}/v1/mediaItems", self.api_base);
        let page_size = MEDIA_PAGE_SIZE.to_string();
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .http
                .get(&url)
                .bearer_auth(access_token)
                .query(&[("pageSize", page_size.as_str())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let page: MediaItemsPage = check_status(request.send().await?, "mediaItems.list")
                .await?
                .json()
                .await?;
            debug!(items = page.media_items.len(), "recent photos page");
            records.extend(
                page.media_items
                    .into_iter()
                    .filter_map(|item| item.into_record(None)),
            );
            if records.len() >= self.recent_limit {
                records.truncate(self.recent_limit);
                break;
            }
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl PhotoSource for GooglePhotosSource {
    async fn fetch_catalog(
        &self,
        access_token: &str,
        album_id: Option<&str>,
    ) -> Result<Vec<PhotoRecord>, FrameError> {
        let records = match album_id {
            Some(album) => self.search_album(access_token, album).await?,
            None => self.list_recent(access_token).await?,
        };
        info!(photos = records.len(), album = album_id, "catalog fetched");
        Ok(records)
    }

    async fn fetch_bytes(
        &self,
        access_token: &str,
        photo: &PhotoRecord,
    ) -> Result<Vec<u8>, FrameError> {
        let (width, height) = self.image_size;
        let url = format!("{}=w{width}-h{height}", photo.source_ref);
        let response = self.http.get(&url).bearer_auth(access_token).send().await?;
        let bytes = check_status(response, "image download")
            .await?
            .bytes()
            .await?;
        debug!(id = %photo.id, bytes = bytes.len(), "image downloaded");
        Ok(bytes.to_vec())
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, FrameError> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let response = self.http.post(&self.token_uri).form(&params).send().await?;
        let status = response.status();
        if status.is_success() {
            let body: TokenResponse = response.json().await?;
            return Ok(TokenGrant {
                access_token: body.access_token,
                refresh_token: body.refresh_token.filter(|t| !t.is_empty()),
                expires_in: Duration::from_secs(
                    body.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
                ),
            });
        }

        let text = response.text().await.unwrap_or_default();
        if matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED)
            && let Ok(refused) = serde_json::from_str::<OAuthError>(&text)
            && REVOKED_GRANT_ERRORS.contains(&refused.error.as_str())
        {
            // Retrying with the same refresh token cannot succeed.
            let reason = match refused.error_description {
                Some(description) => format!("{}: {description}", refused.error),
                None => refused.error,
            };
            return Err(FrameError::AuthRevoked(reason));
        }
        Err(FrameError::Network(format!(
            "token endpoint returned {status}: {}",
            snippet(&text)
        )))
    }

    async fn list_albums(&self, access_token: &str) -> Result<Vec<AlbumInfo>, FrameError> {
        let url = format!("{}/v1/albums", self.api_base);
        let page_size = ALBUM_PAGE_SIZE.to_string();
        let mut albums = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .http
                .get(&url)
                .bearer_auth(access_token)
                .query(&[("pageSize", page_size.as_str())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let page: AlbumsPage = check_status(request.send().await?, "albums.list")
                .await?
                .json()
                .await?;
            albums.extend(page.albums.into_iter().map(AlbumEntry::into_info));
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(albums)
    }
}

async fn check_status(response: Response, what: &str) -> Result<Response, FrameError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = format!("{what} returned {status}: {}", snippet(&body));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(FrameError::Unauthorized(detail)),
        _ => Err(FrameError::Network(detail)),
    }
}

fn snippet(body: &str) -> String {
    body.trim().chars().take(200).collect()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    album_id: &'a str,
    page_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaItemsPage {
    #[serde(default)]
    media_items: Vec<MediaItem>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaItem {
    id: String,
    #[serde(default)]
    base_url: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    media_metadata: MediaMetadata,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaMetadata {
    creation_time: Option<String>,
    photo: Option<serde_json::Value>,
    video: Option<serde_json::Value>,
}

impl MediaItem {
    /// Videos and items without a download URL are skipped.
    fn into_record(self, album_id: Option<&str>) -> Option<PhotoRecord> {
        let metadata = self.media_metadata;
        let is_photo = metadata.photo.is_some()
            || (metadata.video.is_none()
                && self
                    .mime_type
                    .as_deref()
                    .is_some_and(|mime| mime.starts_with("image/")));
        if !is_photo || self.base_url.is_empty() {
            return None;
        }
        let created_at = metadata
            .creation_time
            .as_deref()
            .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
            .map(|at| at.with_timezone(&Utc));
        Some(PhotoRecord {
            id: self.id,
            source_ref: self.base_url,
            filename: self.filename,
            created_at,
            album_id: album_id.map(str::to_string),
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlbumsPage {
    #[serde(default)]
    albums: Vec<AlbumEntry>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlbumEntry {
    id: String,
    #[serde(default)]
    title: Option<String>,
    /// The API encodes int64 values as strings.
    #[serde(default)]
    media_items_count: Option<serde_json::Value>,
}

impl AlbumEntry {
    fn into_info(self) -> AlbumInfo {
        let media_items_count = match self.media_items_count {
            Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(0),
            Some(serde_json::Value::String(s)) => s.parse().unwrap_or(0),
            _ => 0,
        };
        AlbumInfo {
            id: self.id,
            title: self.title.unwrap_or_else(|| "Untitled".to_string()),
            media_items_count,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct OAuthError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}
