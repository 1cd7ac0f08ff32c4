//! Augmentation policies applied after the deterministic fetch.
//!
//! Every policy draws from the RNG it is handed, never from a global one, so
//! a seeded RNG reproduces a run exactly.

use std::ops::RangeInclusive;

use log::trace;
use rand::seq::index;
use rand::{Rng, RngCore};

use crate::config::AugmentConfig;
use crate::data::model::{Sample, ShowerEntry, ShowerTensor};
use crate::data::tensor;
use crate::dataset::ShowerDataset;
use crate::error::{DatasetError, Result};

/// A randomised transformation of a retrieved sample.
pub trait Augmentation: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, dataset: &ShowerDataset, sample: Sample, rng: &mut dyn RngCore)
        -> Result<Sample>;
}

/// Policies described by an [`AugmentConfig`], noise first.
pub fn from_config(cfg: &AugmentConfig) -> Vec<Box<dyn Augmentation>> {
    let mut policies: Vec<Box<dyn Augmentation>> = Vec::new();
    if cfg.noise {
        policies.push(Box::new(NoiseInjection::new(cfg.noise_keys.clone())));
    }
    if cfg.superimpose > 0 {
        policies.push(Box::new(Superposition::new(cfg.superimpose)));
    }
    policies
}

// ---------------------------------------------------------------------------
// Noise injection
// ---------------------------------------------------------------------------

/// Adds one noise grid, picked uniformly from integer keys in `keys`.
#[derive(Debug, Clone)]
pub struct NoiseInjection {
    keys: RangeInclusive<u32>,
}

impl NoiseInjection {
    pub fn new(keys: RangeInclusive<u32>) -> Self {
        Self { keys }
    }
}

impl Default for NoiseInjection {
    fn default() -> Self {
        Self::new(0..=999)
    }
}

impl Augmentation for NoiseInjection {
    fn name(&self) -> &'static str {
        "noise"
    }

    fn apply(
        &self,
        dataset: &ShowerDataset,
        mut sample: Sample,
        rng: &mut dyn RngCore,
    ) -> Result<Sample> {
        let key = rng.gen_range(self.keys.clone()).to_string();
        let noise = tensor::noise_tensor(&key, dataset.noise(&key)?)?;
        trace!("sample {}: adding noise sample {key}", sample.index);
        sample.tensor += &noise;
        Ok(sample)
    }
}

// ---------------------------------------------------------------------------
// Superposition
// ---------------------------------------------------------------------------

/// Superimposes `extra` other samples, chosen without replacement.
#[derive(Debug, Clone, Copy)]
pub struct Superposition {
    extra: usize,
}

impl Superposition {
    pub fn new(extra: usize) -> Self {
        Self { extra }
    }
}

impl Augmentation for Superposition {
    fn name(&self) -> &'static str {
        "superposition"
    }

    fn apply(
        &self,
        dataset: &ShowerDataset,
        mut sample: Sample,
        rng: &mut dyn RngCore,
    ) -> Result<Sample> {
        if self.extra == 0 {
            return Ok(sample);
        }
        let added = overlay_others(dataset, &mut sample.tensor, self.extra, sample.index, rng)?;
        for entry in added {
            sample.energies.extend_from_slice(&entry.energies);
            sample.shower_count += entry.shower_count();
        }

        // Random-class labels are not derived from energies.
        if !matches!(dataset.target_kind(), crate::config::TargetKind::RandomClass) {
            sample.target = dataset.target_for(&sample.energies);
        }
        Ok(sample)
    }
}

/// `k` distinct indices from `0..len`, none equal to `exclude`.
fn pick_others(len: usize, exclude: usize, k: usize, rng: &mut dyn RngCore) -> Result<Vec<usize>> {
    if exclude >= len {
        return Err(DatasetError::config(format!(
            "excluded sample {exclude} is outside a dataset of {len}"
        )));
    }
    let pool = len - 1;
    if k > pool {
        return Err(DatasetError::config(format!(
            "cannot superimpose {k} samples: only {pool} others available"
        )));
    }
    Ok(index::sample(rng, pool, k)
        .into_iter()
        .map(|i| if i >= exclude { i + 1 } else { i })
        .collect())
}

/// Scatter `k` samples other than `exclude` into `grid`; returns their entries.
fn overlay_others<'d>(
    dataset: &'d ShowerDataset,
    grid: &mut ShowerTensor,
    k: usize,
    exclude: usize,
    rng: &mut dyn RngCore,
) -> Result<Vec<&'d ShowerEntry>> {
    let picks = pick_others(dataset.len(), exclude, k, rng)?;
    let mut added = Vec::with_capacity(picks.len());
    for pick in picks {
        let (key, entry) = dataset.entry(pick)?;
        tensor::scatter_into(grid, key, &entry.record)?;
        trace!("superimposed sample {pick} ({key}) onto {exclude}");
        added.push(entry);
    }
    Ok(added)
}

/// Superimpose `k` samples other than `exclude` onto a copy of `tensor`.
///
/// Returns the new grid and `shower_count` plus the showers added. `k == 0`
/// returns an unchanged copy.
pub fn superimpose(
    dataset: &ShowerDataset,
    tensor: &ShowerTensor,
    shower_count: usize,
    k: usize,
    exclude: usize,
    rng: &mut dyn RngCore,
) -> Result<(ShowerTensor, usize)> {
    let mut grid = tensor.clone();
    if k == 0 {
        return Ok((grid, shower_count));
    }
    let added = overlay_others(dataset, &mut grid, k, exclude, rng)?;
    let count = shower_count + added.iter().map(|e| e.shower_count()).sum::<usize>();
    Ok((grid, count))
}
