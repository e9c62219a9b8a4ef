//! Request generations: the stale-response guard shared by every slot owner.

use std::fmt;

/// Tag stamped on an outbound request. Only a response carrying the slot's
/// current generation may touch the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// What happened to a completed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Applied,
    /// Superseded by a newer request for the same slot
    Discarded,
}

#[derive(Debug, Default)]
pub struct GenerationCounter {
    current: u64,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supersede everything issued so far.
    pub fn advance(&mut self) -> Generation {
        self.current += 1;
        Generation(self.current)
    }

    pub fn current(&self) -> Generation {
        Generation(self.current)
    }

    /// Anything older than the current generation is stale.
    pub fn is_stale(&self, generation: Generation) -> bool {
        generation.0 < self.current
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        if generation.0 > self.current {
            tracing::warn!(
                "response stamped {} is newer than the current generation g{}",
                generation,
                self.current
            );
            return false;
        }
        !self.is_stale(generation)
    }
}
