//! Error types for shower dataset construction and retrieval

use std::path::PathBuf;
use thiserror::Error;

use crate::data::model::Voxel;

/// Result type alias for dataset operations
pub type Result<T> = std::result::Result<T, DatasetError>;

/// Errors raised while building or reading a shower dataset
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Deposit and energy tables do not describe the same samples
    #[error(
        "Key sets differ: {deposit_only} keys only in deposits (e.g. {deposit_example:?}), \
         {energy_only} keys only in energies (e.g. {energy_example:?})"
    )]
    KeyMismatch {
        /// Number of keys present only in the deposit table
        deposit_only: usize,
        /// Number of keys present only in the energy table
        energy_only: usize,
        /// First deposit-only key, if any
        deposit_example: Option<String>,
        /// First energy-only key, if any
        energy_example: Option<String>,
    },

    /// Requested noise sample is absent from the noise table
    #[error("Noise sample not found: {key}")]
    NoiseSampleNotFound {
        /// Key that was drawn
        key: String,
    },

    /// Noise augmentation requested but no noise table was loaded
    #[error("Noise injection requested but no noise table is loaded")]
    NoNoiseTable,

    /// Shower-count filter removed every sample
    #[error("Empty dataset after filtering to shower counts in [{min}, {max})")]
    EmptyAfterFiltering {
        /// Inclusive lower bound
        min: usize,
        /// Exclusive upper bound
        max: usize,
    },

    /// Index past the end of the dataset
    #[error("Index {index} out of range for dataset of length {len}")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Dataset length
        len: usize,
    },

    /// Deposit coordinate outside the detector grid
    #[error("Sample {key}: voxel {voxel} lies outside the detector grid")]
    VoxelOutOfBounds {
        /// Sample key
        key: String,
        /// Offending coordinate
        voxel: Voxel,
    },

    /// Noise entry with the wrong number of values
    #[error("Noise sample {key}: expected {expected} values, found {len}")]
    InvalidNoiseShape {
        /// Noise key
        key: String,
        /// Expected flattened length
        expected: usize,
        /// Actual flattened length
        len: usize,
    },

    /// Invalid or unreadable configuration
    #[error("Configuration error: {reason}")]
    Config {
        /// Reason for failure
        reason: String,
    },

    /// A table file could not be parsed
    #[error("Failed to load {path}: {reason}")]
    Load {
        /// File that was read
        path: PathBuf,
        /// Reason for failure, including the context chain
        reason: String,
    },
}

impl DatasetError {
    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Wrap a loader failure, keeping the full context chain
    pub fn load(path: impl Into<PathBuf>, err: &anyhow::Error) -> Self {
        Self::Load {
            path: path.into(),
            reason: format!("{err:#}"),
        }
    }
}
