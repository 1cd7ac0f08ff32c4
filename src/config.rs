use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::binning::{DEFAULT_HIGH, DEFAULT_LOW};
use crate::error::{DatasetError, Result};

/// Which learning target a retrieval produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Raw number of showers.
    ShowerCount,
    /// Histogram of shower energies over the configured bins.
    EnergyBins,
    /// Leading raw moments of the energy list.
    Moments,
    /// A class index drawn at random on every access. Carries no information
    /// about the sample; only useful for exercising a training loop.
    RandomClass,
}

/// Augmentations applied after the deterministic fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    /// Add a random noise sample to every tensor.
    pub noise: bool,
    /// Inclusive range of integer noise keys to draw from.
    pub noise_keys: RangeInclusive<u32>,
    /// Number of extra samples superimposed on each retrieval.
    pub superimpose: usize,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            noise: false,
            noise_keys: 0..=999,
            superimpose: 0,
        }
    }
}

/// Batching options for [`crate::batch::DataLoader`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub batch_size: usize,
    pub shuffle: bool,
    /// Fraction in `(0, 1)` or an absolute sample count `>= 1`; `0` disables.
    pub validation_split: f64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 128,
            shuffle: true,
            validation_split: 0.0,
        }
    }
}

/// Runtime configuration for a shower dataset, usually read from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Sparse deposit table.
    pub deposit_file: PathBuf,
    /// Per-sample energy lists.
    pub energy_file: PathBuf,
    /// Optional dense noise table.
    #[serde(default)]
    pub noise_file: Option<PathBuf>,
    /// Number of classes, given inline.
    #[serde(default)]
    pub num_classes: Option<usize>,
    /// File holding the number of classes; read once at construction.
    #[serde(default)]
    pub num_classes_file: Option<PathBuf>,
    #[serde(default)]
    pub min_shower_num: usize,
    #[serde(default = "default_max_shower_num")]
    pub max_shower_num: usize,
    #[serde(default = "default_target")]
    pub target: TargetKind,
    /// Number of moments for [`TargetKind::Moments`].
    #[serde(default = "default_moment")]
    pub moment: usize,
    /// Normalise moments of order three and above.
    #[serde(default = "default_true")]
    pub normalize_moments: bool,
    /// Lower and upper energy-bin edges.
    #[serde(default = "default_bin_range")]
    pub bin_range: [f64; 2],
    #[serde(default)]
    pub augment: AugmentConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
    /// RNG seed for augmentation and shuffling.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

/// Upper shower-count bound that means "no filtering".
pub const DEFAULT_MAX_SHOWER_NUM: usize = 10_000;

fn default_max_shower_num() -> usize {
    DEFAULT_MAX_SHOWER_NUM
}

fn default_target() -> TargetKind {
    TargetKind::EnergyBins
}

fn default_moment() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_bin_range() -> [f64; 2] {
    [DEFAULT_LOW, DEFAULT_HIGH]
}

fn default_seed() -> u64 {
    17
}

impl DatasetConfig {
    /// Minimal configuration over two table files; everything else defaulted.
    pub fn new(deposit_file: impl Into<PathBuf>, energy_file: impl Into<PathBuf>) -> Self {
        Self {
            deposit_file: deposit_file.into(),
            energy_file: energy_file.into(),
            noise_file: None,
            num_classes: None,
            num_classes_file: None,
            min_shower_num: 0,
            max_shower_num: default_max_shower_num(),
            target: default_target(),
            moment: default_moment(),
            normalize_moments: true,
            bin_range: default_bin_range(),
            augment: AugmentConfig::default(),
            loader: LoaderConfig::default(),
            seed: default_seed(),
        }
    }

    /// Read a JSON configuration file. Relative table paths are resolved
    /// against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DatasetError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut cfg: DatasetConfig = serde_json::from_str(&text).map_err(|e| {
            DatasetError::config(format!("cannot parse {}: {e}", path.display()))
        })?;

        if let Some(base) = path.parent() {
            cfg.resolve_relative_to(base);
        }
        cfg.validate()?;
        Ok(cfg)
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.deposit_file);
        resolve(&mut self.energy_file);
        if let Some(p) = self.noise_file.as_mut() {
            resolve(p);
        }
        if let Some(p) = self.num_classes_file.as_mut() {
            resolve(p);
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure(
            self.min_shower_num < self.max_shower_num,
            "min_shower_num must be < max_shower_num",
        )?;
        ensure(
            self.bin_range[0] < self.bin_range[1],
            "bin_range lower edge must be below the upper edge",
        )?;
        ensure(
            self.target != TargetKind::Moments || self.moment >= 1,
            "moment must be at least 1 for moment targets",
        )?;
        ensure(
            !self.augment.noise || self.noise_file.is_some(),
            "noise augmentation requires noise_file",
        )?;
        ensure(
            !self.augment.noise_keys.is_empty(),
            "noise_keys range is empty",
        )?;
        ensure(self.loader.batch_size >= 1, "batch_size must be at least 1")?;
        ensure(
            self.loader.validation_split >= 0.0,
            "validation_split must be non-negative",
        )?;
        Ok(())
    }

    /// Class count from the inline value or, failing that, the class-count file.
    pub fn class_count(&self) -> Result<usize> {
        match (self.num_classes, &self.num_classes_file) {
            (Some(n), _) if n > 0 => Ok(n),
            (Some(_), _) => Err(DatasetError::config("num_classes must be at least 1")),
            (None, Some(path)) => read_class_count(path),
            (None, None) => Err(DatasetError::config(
                "either num_classes or num_classes_file must be set",
            )),
        }
    }
}

fn ensure(cond: bool, reason: &str) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(DatasetError::config(reason))
    }
}

/// Read the single-integer class-count file.
///
/// Accepts a bare integer, a JSON integer, or `{"num_classes": n}`.
pub fn read_class_count(path: &Path) -> Result<usize> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        DatasetError::config(format!("cannot read class count {}: {e}", path.display()))
    })?;

    #[derive(Deserialize)]
    struct Wrapped {
        num_classes: usize,
    }

    let trimmed = text.trim();
    let count = trimmed
        .parse::<usize>()
        .ok()
        .or_else(|| serde_json::from_str::<Wrapped>(trimmed).ok().map(|w| w.num_classes))
        .ok_or_else(|| {
            DatasetError::config(format!(
                "{} does not hold a class count: {trimmed:?}",
                path.display()
            ))
        })?;

    if count == 0 {
        return Err(DatasetError::config(format!(
            "{}: class count must be at least 1",
            path.display()
        )));
    }
    Ok(count)
}
