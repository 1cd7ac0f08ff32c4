use std::collections::BTreeMap;

use log::debug;

use super::model::{ShowerEntry, ShowerTables};
use crate::error::{DatasetError, Result};

// ---------------------------------------------------------------------------
// Shower-count filter
// ---------------------------------------------------------------------------

/// Inclusive-exclusive bound on the number of showers per sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShowerCountRange {
    pub min: usize,
    pub max: usize,
}

impl ShowerCountRange {
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, count: usize) -> bool {
        count >= self.min && count < self.max
    }
}

/// Remove every sample whose shower count falls outside `[min, max)`.
///
/// Fails if nothing survives.
pub fn retain_shower_count(tables: &mut ShowerTables, range: ShowerCountRange) -> Result<()> {
    let before = tables.len();
    tables.retain(|_, entry| range.contains(entry.shower_count()));
    debug!(
        "shower-count filter [{}, {}) kept {} of {} samples",
        range.min,
        range.max,
        tables.len(),
        before
    );

    if tables.is_empty() {
        return Err(DatasetError::EmptyAfterFiltering {
            min: range.min,
            max: range.max,
        });
    }
    Ok(())
}

/// Number of samples per shower count.
pub fn count_histogram<'a>(entries: impl IntoIterator<Item = &'a ShowerEntry>) -> BTreeMap<usize, usize> {
    let mut hist = BTreeMap::new();
    for entry in entries {
        *hist.entry(entry.shower_count()).or_insert(0) += 1;
    }
    hist
}
