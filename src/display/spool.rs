use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ab_glyph::FontArc;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::{GrayImage, ImageFormat};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::DisplaySink;
use super::compose::{self, PanelGeometry};
use super::text;
use crate::clock::Clock;
use crate::config::DisplayOptions;
use crate::error::FrameError;
use crate::model::{Card, DisplayOutcome, PhotoRecord};
use crate::state;

pub const FRAME_FILE: &str = "frame.png";
pub const MANIFEST_FILE: &str = "frame.json";

/// Sidecar describing the frame currently in `frame.png`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameManifest {
    /// `photo`, `error` or `empty`.
    pub kind: String,
    pub headline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub photo_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
    pub rendered_at: DateTime<Utc>,
}

/// Writes each frame as a panel-sized grayscale PNG plus a JSON manifest and,
/// when configured, hands both paths to an external panel driver.
pub struct SpoolSink {
    dir: PathBuf,
    panel: PanelGeometry,
    refresh_command: Option<Vec<String>>,
    font: Option<FontArc>,
    clock: Arc<dyn Clock>,
}

impl SpoolSink {
    pub fn new(dir: impl Into<PathBuf>, panel: PanelGeometry, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            panel,
            refresh_command: None,
            font: None,
            clock,
        }
    }

    pub fn from_config(opts: &DisplayOptions, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            &opts.output_dir,
            PanelGeometry::new(opts.width, opts.height, opts.caption_height),
            clock,
        )
        .with_refresh_command(opts.refresh_command.clone())
        .with_font(load_font(opts.font_file.as_deref()))
    }

    /// Font for captions and card text. Frames are drawn without text when `None`.
    pub fn with_font(mut self, font: Option<FontArc>) -> Self {
        self.font = font;
        self
    }

    pub fn with_refresh_command(mut self, command: Option<Vec<String>>) -> Self {
        self.refresh_command = command.filter(|argv| !argv.is_empty());
        self
    }

    pub fn frame_path(&self) -> PathBuf {
        self.dir.join(FRAME_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    async fn publish(&self, frame: GrayImage, manifest: FrameManifest) -> Result<(), FrameError> {
        let png_path = self.frame_path();
        let json_path = self.manifest_path();
        {
            let png_path = png_path.clone();
            let json_path = json_path.clone();
            tokio::task::spawn_blocking(move || {
                write_frame(&png_path, &json_path, &frame, &manifest)
            })
            .await
            .map_err(|err| FrameError::Display(format!("frame writer panicked: {err}")))?
            .map_err(|err| FrameError::Display(format!("{err:#}")))?;
        }
        debug!(path = %png_path.display(), "frame written");
        self.run_refresh_command(&png_path, &json_path).await
    }

    async fn run_refresh_command(&self, png: &Path, json: &Path) -> Result<(), FrameError> {
        let Some((program, args)) = self.refresh_command.as_ref().and_then(|c| c.split_first())
        else {
            return Ok(());
        };
        let status = Command::new(program)
            .args(args)
            .arg(png)
            .arg(json)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|err| FrameError::Display(format!("failed to run {program}: {err}")))?;
        if !status.success() {
            return Err(FrameError::Display(format!("{program} exited with {status}")));
        }
        info!(program = %program, "panel refreshed");
        Ok(())
    }
}

fn load_font(configured: Option<&Path>) -> Option<FontArc> {
    if let Some(path) = configured {
        match text::load_font(Some(path)) {
            Ok(font) => return Some(font),
            Err(err) => warn!(error = ?err, "configured font unusable; searching system fonts"),
        }
    }
    match text::load_font(None) {
        Ok(font) => Some(font),
        Err(err) => {
            warn!(error = ?err, "no font available; frames will carry no text");
            None
        }
    }
}

fn write_frame(
    png_path: &Path,
    json_path: &Path,
    frame: &GrayImage,
    manifest: &FrameManifest,
) -> anyhow::Result<()> {
    let mut encoded = Cursor::new(Vec::new());
    frame
        .write_to(&mut encoded, ImageFormat::Png)
        .context("failed to encode frame")?;
    state::write_atomic(png_path, encoded.get_ref(), 0o644)?;
    state::write_json_atomic(json_path, manifest, 0o644)
}

#[async_trait]
impl DisplaySink for SpoolSink {
    async fn render_photo(&self, photo: &PhotoRecord, bytes: &[u8]) -> DisplayOutcome {
        let panel = self.panel;
        let owned = bytes.to_vec();
        let font = self.font.clone();
        let caption = compose::caption(photo);
        let line = caption.clone();
        let composed = tokio::task::spawn_blocking(move || {
            let mut frame = compose::compose_photo(&owned, panel)?;
            if let Some(font) = &font {
                compose::draw_caption(&mut frame, panel, font, &line);
            }
            Ok::<_, FrameError>(frame)
        })
        .await
        .map_err(|err| FrameError::Display(format!("compose task panicked: {err}")))
        .and_then(|result| result);
        let frame = match composed {
            Ok(frame) => frame,
            Err(err) => return DisplayOutcome::from_error(&err),
        };
        let manifest = FrameManifest {
            kind: "photo".into(),
            headline: None,
            photo_id: Some(photo.id.clone()),
            caption: Some(caption),
            category: None,
            message: None,
            rendered_at: self.clock.now(),
        };
        match self.publish(frame, manifest).await {
            Ok(()) => DisplayOutcome::rendered(),
            Err(err) => DisplayOutcome::from_error(&err),
        }
    }

    async fn render_card(&self, card: &Card) -> DisplayOutcome {
        let (kind, category, message) = match card {
            Card::Error { kind, message } => {
                ("error", Some(kind.label().to_string()), Some(message.clone()))
            }
            Card::NothingToShow => ("empty", None, None),
        };
        let manifest = FrameManifest {
            kind: kind.into(),
            headline: Some(card.headline().to_string()),
            photo_id: None,
            caption: None,
            category,
            message,
            rendered_at: self.clock.now(),
        };
        let frame = compose::render_card(self.panel, card, self.font.as_ref());
        match self.publish(frame, manifest).await {
            Ok(()) => DisplayOutcome::rendered(),
            Err(err) => DisplayOutcome::from_error(&err),
        }
    }
}
