//! Enrichment run identity and progress counters

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of one enrichment run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Loaded/total counters of one run
///
/// Counters only move forward and `loaded` never exceeds `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    pub loaded: usize,
    pub total: usize,
}

impl ProgressState {
    pub fn new(total: usize) -> Self {
        Self { loaded: 0, total }
    }

    /// Advance by `units`, clamped to `total`
    pub fn advance(&mut self, units: usize) {
        self.loaded = self.loaded.saturating_add(units).min(self.total);
    }

    pub fn is_complete(&self) -> bool {
        self.loaded == self.total
    }

    /// Completion percentage (100 for an empty run)
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.loaded * 100) / self.total) as u8
    }
}

/// Final tally of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub epoch: u64,
    pub progress: ProgressState,
    /// Entities with every requested field group loaded
    pub fully_loaded: usize,
    /// Entities carrying at least one failure sentinel
    pub with_unavailable: usize,
    pub elapsed_ms: u64,
}
