use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::catalog::CatalogSnapshot;
use crate::model::PhotoRecord;
use crate::state::RotationState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Photo(PhotoRecord),
    /// The catalog is empty; show the "nothing to show" card.
    Empty,
}

/// Non-repeating rotation over the catalog.
///
/// Rules:
/// - Each member set gets one shuffled order; `cursor` points at the photo shown last.
/// - While the member set is unchanged, `next` walks the order circularly, so every
///   photo appears once per cycle and the cycle order never changes.
/// - Any change to the member set (added or removed ids) discards the order and
///   starts a new shuffle at index 0, even mid-cycle.
pub struct Selector {
    ordered_ids: Vec<String>,
    cursor: usize,
    rng: StdRng,
}

impl Selector {
    pub fn new(rng: StdRng) -> Self {
        Self {
            ordered_ids: Vec::new(),
            cursor: 0,
            rng,
        }
    }

    /// Restores a persisted position. The next call continues after `state.cursor`
    /// when the catalog still holds exactly the same ids.
    pub fn from_state(state: &RotationState, rng: StdRng) -> Self {
        let mut seen = HashSet::new();
        let ordered_ids: Vec<String> = state
            .ordered_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();
        let cursor = if ordered_ids.is_empty() {
            0
        } else {
            state.cursor.min(ordered_ids.len() - 1)
        };
        Self {
            ordered_ids,
            cursor,
            rng,
        }
    }

    pub fn next(&mut self, snapshot: &CatalogSnapshot) -> Selection {
        if snapshot.is_empty() {
            self.ordered_ids.clear();
            self.cursor = 0;
            return Selection::Empty;
        }

        if self.same_members(snapshot) {
            self.cursor = (self.cursor + 1) % self.ordered_ids.len();
            if self.cursor == 0 {
                debug!(photos = self.ordered_ids.len(), "rotation cycle complete");
            }
        } else {
            self.reshuffle(snapshot);
        }

        snapshot
            .get(&self.ordered_ids[self.cursor])
            .cloned()
            .map_or(Selection::Empty, Selection::Photo)
    }

    pub fn ordered_ids(&self) -> &[String] {
        &self.ordered_ids
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn same_members(&self, snapshot: &CatalogSnapshot) -> bool {
        self.ordered_ids.len() == snapshot.len()
            && self.ordered_ids.iter().all(|id| snapshot.contains(id))
    }

    fn reshuffle(&mut self, snapshot: &CatalogSnapshot) {
        // Sorting first makes the order depend only on the member set and the RNG.
        let mut ids: Vec<String> = snapshot.ids().map(str::to_string).collect();
        ids.sort_unstable();
        ids.shuffle(&mut self.rng);
        info!(
            photos = ids.len(),
            previous = self.ordered_ids.len(),
            "catalog changed; starting new rotation cycle"
        );
        self.ordered_ids = ids;
        self.cursor = 0;
    }
}
