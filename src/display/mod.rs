use async_trait::async_trait;

use crate::model::{Card, DisplayOutcome, PhotoRecord};

pub mod compose;
pub mod spool;
pub mod text;

pub use compose::PanelGeometry;
pub use spool::SpoolSink;

/// Output surface for composed frames.
///
/// Failures are reported through [`DisplayOutcome`] rather than `Err` so a sink
/// can classify them (an undecodable photo versus a panel fault).
#[async_trait]
pub trait DisplaySink: Send + Sync {
    async fn render_photo(&self, photo: &PhotoRecord, bytes: &[u8]) -> DisplayOutcome;

    async fn render_card(&self, card: &Card) -> DisplayOutcome;
}
