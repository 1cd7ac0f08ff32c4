//! Calorimeter shower datasets.
//!
//! Loads sparse voxel deposits and per-shower energies, joins them by sample
//! key, and serves each sample as a dense `(x, y, z)` grid together with a
//! learning target: shower count, energy-bin histogram, energy moments or a
//! class label. Noise injection and sample superposition are available as
//! seeded augmentation policies, and [`batch::DataLoader`] stacks samples into
//! batches for a training loop.

pub mod augment;
pub mod batch;
pub mod binning;
pub mod config;
pub mod data;
pub mod dataset;
pub mod error;
pub mod mix;
pub mod moments;

pub use config::{DatasetConfig, TargetKind};
pub use data::model::{Sample, Target};
pub use dataset::{Pipeline, SampleSource, ShowerDataset};
pub use error::{DatasetError, Result};
