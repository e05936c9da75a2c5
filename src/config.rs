use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail, ensure};
use serde::Deserialize;

pub const DEFAULT_API_BASE_URL: &str = "https://photoslibrary.googleapis.com";

/// What to do with the persisted rotation position when the service starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResumePolicy {
    /// Continue mid-cycle when the catalog is unchanged.
    #[default]
    Resume,
    /// Always start with a fresh shuffle.
    Reshuffle,
}

impl FromStr for ResumePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resume" => Ok(ResumePolicy::Resume),
            "reshuffle" => Ok(ResumePolicy::Reshuffle),
            other => bail!("unknown resume policy '{other}' (expected resume or reshuffle)"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct DisplayOptions {
    /// Panel width in pixels.
    pub width: u32,
    /// Panel height in pixels.
    pub height: u32,
    /// Strip at the bottom of the panel reserved for the caption.
    pub caption_height: u32,
    /// Directory receiving `frame.png` and `frame.json`.
    pub output_dir: PathBuf,
    /// Panel driver invoked after each frame, with the PNG and JSON paths appended.
    pub refresh_command: Option<Vec<String>>,
    /// TrueType/OpenType font for captions and cards; system fonts are searched when unset.
    pub font_file: Option<PathBuf>,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 480,
            caption_height: 80,
            output_dir: PathBuf::from("frame"),
            refresh_command: None,
            font_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Restrict the catalog to one album; `None` rotates through recent library photos.
    pub album_id: Option<String>,
    /// Minutes between photo changes.
    pub rotation_interval_minutes: u64,
    /// OAuth client secrets downloaded from the Google console.
    pub credentials_file: PathBuf,
    /// Persisted access/refresh token pair.
    pub token_file: PathBuf,
    /// Persisted rotation order and position.
    pub state_file: PathBuf,
    pub resume: ResumePolicy,
    /// Maximum age of the cached catalog before it is fetched again.
    #[serde(with = "humantime_serde")]
    pub catalog_ttl: Duration,
    /// Cap on the whole-library listing when no album is configured.
    pub recent_photos_limit: usize,
    /// Optional deterministic seed for the rotation shuffle.
    pub shuffle_seed: Option<u64>,
    pub api_base_url: String,
    /// Overrides the token endpoint named in the credentials file.
    pub token_uri: Option<String>,
    pub display: DisplayOptions,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            album_id: None,
            rotation_interval_minutes: 30,
            credentials_file: PathBuf::from("credentials.json"),
            token_file: PathBuf::from("token.json"),
            state_file: PathBuf::from("rotation-state.json"),
            resume: ResumePolicy::default(),
            catalog_ttl: Duration::from_secs(60 * 60),
            recent_photos_limit: 500,
            shuffle_seed: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            token_uri: None,
            display: DisplayOptions::default(),
        }
    }
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        serde_yaml::from_str(&s)
            .with_context(|| format!("failed to parse config at {}", path.display()))
    }

    /// Loads the optional YAML file, overlays the process environment and validates.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        base.with_env(std::env::vars())?.validated()
    }

    /// Applies environment overrides. Empty values are treated as unset.
    pub fn with_env<I>(mut self, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let env: HashMap<String, String> = vars
            .into_iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .collect();
        let get = |key: &str| env.get(key).map(|v| v.trim().to_string());

        if let Some(album) = get("GOOGLE_PHOTOS_ALBUM_ID") {
            self.album_id = Some(album);
        }
        if let Some(minutes) = get("PHOTO_ROTATION_INTERVAL_MINUTES")
            .or_else(|| get("UPDATE_INTERVAL_MINUTES"))
        {
            self.rotation_interval_minutes = parse_env("PHOTO_ROTATION_INTERVAL_MINUTES", &minutes)?;
        }
        if let Some(path) = get("GOOGLE_PHOTOS_CREDENTIALS_FILE") {
            self.credentials_file = PathBuf::from(path);
        }
        if let Some(path) = get("GOOGLE_PHOTOS_TOKEN_FILE") {
            self.token_file = PathBuf::from(path);
        }
        if let Some(path) = get("PHOTO_FRAME_STATE_FILE") {
            self.state_file = PathBuf::from(path);
        }
        if let Some(policy) = get("PHOTO_FRAME_RESUME") {
            self.resume = parse_env("PHOTO_FRAME_RESUME", &policy)?;
        }
        if let Some(ttl) = get("PHOTO_FRAME_CATALOG_TTL") {
            self.catalog_ttl = humantime::parse_duration(&ttl)
                .with_context(|| format!("PHOTO_FRAME_CATALOG_TTL: invalid duration '{ttl}'"))?;
        }
        if let Some(limit) = get("PHOTO_FRAME_RECENT_LIMIT") {
            self.recent_photos_limit = parse_env("PHOTO_FRAME_RECENT_LIMIT", &limit)?;
        }
        if let Some(seed) = get("PHOTO_FRAME_SHUFFLE_SEED") {
            self.shuffle_seed = Some(parse_env("PHOTO_FRAME_SHUFFLE_SEED", &seed)?);
        }
        if let Some(width) = get("PHOTO_FRAME_DISPLAY_WIDTH") {
            self.display.width = parse_env("PHOTO_FRAME_DISPLAY_WIDTH", &width)?;
        }
        if let Some(height) = get("PHOTO_FRAME_DISPLAY_HEIGHT") {
            self.display.height = parse_env("PHOTO_FRAME_DISPLAY_HEIGHT", &height)?;
        }
        if let Some(dir) = get("PHOTO_FRAME_OUTPUT_DIR") {
            self.display.output_dir = PathBuf::from(dir);
        }
        if let Some(command) = get("PHOTO_FRAME_REFRESH_COMMAND") {
            self.display.refresh_command =
                Some(command.split_whitespace().map(str::to_string).collect());
        }
        if let Some(path) = get("PHOTO_FRAME_FONT_FILE") {
            self.display.font_file = Some(PathBuf::from(path));
        }
        Ok(self)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            self.rotation_interval_minutes > 0,
            "rotation-interval-minutes must be greater than zero"
        );
        ensure!(
            !self.catalog_ttl.is_zero(),
            "catalog-ttl must be greater than zero"
        );
        ensure!(
            self.recent_photos_limit > 0,
            "recent-photos-limit must be greater than zero"
        );
        ensure!(
            self.display.width > 0 && self.display.height > 0,
            "display.width and display.height must be greater than zero"
        );
        ensure!(
            self.display.caption_height < self.display.height,
            "display.caption-height must be smaller than display.height"
        );
        for (field, path) in [
            ("credentials-file", &self.credentials_file),
            ("token-file", &self.token_file),
            ("state-file", &self.state_file),
            ("display.output-dir", &self.display.output_dir),
        ] {
            ensure!(!path.as_os_str().is_empty(), "{field} must not be empty");
        }
        if let Some(album) = &self.album_id {
            ensure!(!album.trim().is_empty(), "album-id must not be blank when provided");
        }
        if let Some(command) = &self.display.refresh_command {
            ensure!(
                command.first().is_some_and(|c| !c.trim().is_empty()),
                "display.refresh-command must name a program"
            );
        }
        ensure!(
            !self.api_base_url.trim().is_empty(),
            "api-base-url must not be empty"
        );
        Ok(self)
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_minutes.saturating_mul(60))
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|err| anyhow!("{key}: invalid value '{value}': {err}"))
}
