//! Decides when aggregate statistics are fetched and which responses count.

use std::sync::Arc;

use crate::error::Result;
use crate::filters::FilterSelection;
use crate::generation::{Disposition, Generation, GenerationCounter};
use crate::models::OverviewSnapshot;

/// What the overview panel shows.
#[derive(Debug, Clone, PartialEq)]
pub enum OverviewState {
    /// Nothing selected; no request is made
    NoSelection,
    Loading {
        generation: Generation,
    },
    Ready {
        generation: Generation,
        snapshot: Arc<OverviewSnapshot>,
    },
    /// The last fetch failed; distinct from `NoSelection`
    Unavailable {
        generation: Generation,
        reason: String,
    },
}

/// An aggregate fetch the caller must perform.
#[derive(Debug, Clone, PartialEq)]
pub struct OverviewRequest {
    pub generation: Generation,
    pub selection: FilterSelection,
}

#[derive(Debug)]
pub struct DependentFetchOrchestrator {
    generations: GenerationCounter,
    state: OverviewState,
}

impl Default for DependentFetchOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl DependentFetchOrchestrator {
    pub fn new() -> Self {
        Self {
            generations: GenerationCounter::new(),
            state: OverviewState::NoSelection,
        }
    }

    pub fn state(&self) -> &OverviewState {
        &self.state
    }

    pub fn snapshot(&self) -> Option<&OverviewSnapshot> {
        match &self.state {
            OverviewState::Ready { snapshot, .. } => Some(snapshot),
            _ => None,
        }
    }

    pub fn current_generation(&self) -> Generation {
        self.generations.current()
    }

    /// React to a changed selection. Returns the fetch to issue, if any.
    ///
    /// Every call supersedes whatever is in flight, including the call that
    /// empties the selection.
    pub fn on_selection_changed(&mut self, selection: &FilterSelection) -> Option<OverviewRequest> {
        let generation = self.generations.advance();
        if selection.is_empty() {
            tracing::debug!("selection empty at {}, clearing overview", generation);
            self.state = OverviewState::NoSelection;
            return None;
        }
        tracing::debug!(
            "issuing aggregate fetch {} ({} units, {} sub-categories)",
            generation,
            selection.units.len(),
            selection.subcategories.len()
        );
        self.state = OverviewState::Loading { generation };
        Some(OverviewRequest {
            generation,
            selection: selection.clone(),
        })
    }

    /// Apply a fetch result if it is still current.
    pub fn complete(
        &mut self,
        generation: Generation,
        result: Result<OverviewSnapshot>,
    ) -> Disposition {
        if !self.generations.is_current(generation) {
            tracing::debug!(
                "discarding stale aggregate response {} (current {})",
                generation,
                self.generations.current()
            );
            return Disposition::Discarded;
        }
        self.state = match result {
            Ok(snapshot) => {
                tracing::info!(
                    "overview {} applied: {} kpis, {} breakdowns",
                    generation,
                    snapshot.kpis.len(),
                    snapshot.breakdowns.len()
                );
                OverviewState::Ready {
                    generation,
                    snapshot: Arc::new(snapshot),
                }
            }
            Err(err) => {
                tracing::warn!("aggregate fetch {} failed: {}", generation, err);
                OverviewState::Unavailable {
                    generation,
                    reason: err.to_string(),
                }
            }
        };
        Disposition::Applied
    }
}
