// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Rowtrim service.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, RowtrimError};

/// Default standard-deviation threshold below which a row counts as blank.
pub const DEFAULT_THRESHOLD: f64 = 10.0;

/// Default number of leading rows kept from each blank run.
pub const DEFAULT_SPACING: usize = 6;

/// Tuning knobs of the blank-row filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    /// A row is blank when the standard deviation of its intensity values
    /// (0-255 scale) is strictly below this value.
    pub threshold: f64,
    /// Leading rows of every blank run that survive; only the rest are removed.
    pub spacing: usize,
}

impl FilterParams {
    pub fn new(threshold: f64, spacing: usize) -> Self {
        Self { threshold, spacing }
    }

    /// Reject thresholds that are negative or not finite.
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(RowtrimError::InvalidParameter(format!(
                "threshold must be a finite, non-negative number (got {})",
                self.threshold
            )));
        }
        Ok(())
    }
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            spacing: DEFAULT_SPACING,
        }
    }
}

/// What a single filter pass did to an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSummary {
    /// Row count before filtering.
    pub original_height: u32,
    /// Row count after filtering.
    pub output_height: u32,
    /// Removed row indices (ascending, relative to the original image).
    pub removed_rows: Vec<u32>,
}

impl FilterSummary {
    pub fn removed_count(&self) -> usize {
        self.removed_rows.len()
    }
}

/// Per-request identifier, attached to log spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of the HTTP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerStatus {
    Stopped,
    Starting,
    Running,
}
