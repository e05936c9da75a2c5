//! On-disk JSON state: the OAuth token pair and the rotation position.
//!
//! Both files have a single writer (the rotation loop, or the in-flight token
//! refresh). Writes go to a sibling temp file first and are renamed into place
//! so a crash never leaves a truncated file behind.

use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};

/// Persisted OAuth credential state.
///
/// Reads both the canonical layout and the authorized-user layout written by
/// Google's auth libraries (`token`, `refresh_token`, `expiry`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenState {
    #[serde(default, alias = "token")]
    pub access_token: String,
    #[serde(default, alias = "refresh_token")]
    pub refresh_token: String,
    /// A missing expiry reads as already expired.
    #[serde(
        default = "expired",
        alias = "expiry",
        deserialize_with = "deserialize_timestamp"
    )]
    pub expires_at: DateTime<Utc>,
}

/// Persisted rotation position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationState {
    pub ordered_ids: Vec<String>,
    /// Index of the photo shown most recently.
    pub cursor: usize,
    #[serde(default)]
    pub last_rotated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub interval_seconds: u64,
}

impl RotationState {
    pub fn current_id(&self) -> Option<&str> {
        self.ordered_ids.get(self.cursor).map(String::as_str)
    }
}

fn expired() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(i64),
        Fractional(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| de::Error::custom(format!("timestamp {secs} out of range"))),
        Raw::Fractional(secs) => DateTime::from_timestamp(secs.trunc() as i64, 0)
            .ok_or_else(|| de::Error::custom(format!("timestamp {secs} out of range"))),
        Raw::Text(text) => parse_timestamp(&text).ok_or_else(|| {
            de::Error::custom(format!("expected RFC 3339 or epoch seconds, got '{text}'"))
        }),
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(secs) = text.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0);
    }
    // Offset-less ISO timestamps are taken as UTC.
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn read_json_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let data = match fs::read(path) {
        Ok(value) => value,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let value = serde_json::from_slice::<T>(&data)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Writes `value` as pretty JSON, replacing `path` atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T, mode: u32) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json, mode)
}

/// Writes `bytes` to a sibling temp file and renames it over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent dir at {}", parent.display()))?;
    }
    let tmp = temp_path(path);
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;
    let mut file = options
        .open(&tmp)
        .with_context(|| format!("failed to open {}", tmp.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    file.sync_all()
        .with_context(|| format!("failed to sync {}", tmp.display()))?;
    drop(file);
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
