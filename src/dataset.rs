//! The shower dataset: joined tables plus per-sample retrieval.
//!
//! Retrieval is split in two. [`ShowerDataset::sample`] is a pure function of
//! the index. Randomised steps (noise, superposition, random class labels)
//! run afterwards in [`ShowerDataset::sample_with`] and always draw from a
//! caller-supplied RNG.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{info, trace};
use rand::{Rng, RngCore};

use crate::augment::{self, Augmentation};
use crate::binning::BinEdges;
use crate::config::{DatasetConfig, TargetKind, DEFAULT_MAX_SHOWER_NUM};
use crate::data::filter::{count_histogram, retain_shower_count, ShowerCountRange};
use crate::data::join::join_tables;
use crate::data::loader;
use crate::data::model::{
    EnergyList, NoiseTable, Sample, SampleKey, ShowerEntry, ShowerTables, ShowerTensor, Target,
};
use crate::data::tensor;
use crate::error::{DatasetError, Result};
use crate::moments::calculate_moment;

/// What the instrumentation hook sees after each retrieval.
#[derive(Debug)]
pub struct SampleEvent<'a> {
    pub index: usize,
    pub key: &'a str,
    pub tensor: &'a ShowerTensor,
    pub shower_count: usize,
    pub augmented: bool,
}

/// Caller-installed observer of retrievals.
pub type RetrievalHook = Arc<dyn Fn(&SampleEvent<'_>) + Send + Sync>;

/// Anything that can hand out samples by index.
pub trait SampleSource {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retrieve one sample; `rng` feeds any randomised step.
    fn get(&self, index: usize, rng: &mut dyn RngCore) -> Result<Sample>;
}

/// Construction options that do not come from the tables themselves.
#[derive(Debug, Clone)]
pub struct DatasetOptions {
    pub num_classes: usize,
    pub target: TargetKind,
    pub moment: usize,
    pub normalize_moments: bool,
    pub bin_range: [f64; 2],
    /// Keep only samples whose shower count is inside this range.
    pub shower_range: Option<ShowerCountRange>,
    pub noise: Option<NoiseTable>,
}

impl DatasetOptions {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            target: TargetKind::EnergyBins,
            moment: 1,
            normalize_moments: true,
            bin_range: [crate::binning::DEFAULT_LOW, crate::binning::DEFAULT_HIGH],
            shower_range: None,
            noise: None,
        }
    }
}

pub struct ShowerDataset {
    samples: Vec<(SampleKey, ShowerEntry)>,
    noise: Option<NoiseTable>,
    edges: BinEdges,
    num_classes: usize,
    target: TargetKind,
    moment: usize,
    normalize_moments: bool,
    hook: Option<RetrievalHook>,
}

impl std::fmt::Debug for ShowerDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShowerDataset")
            .field("samples", &self.samples.len())
            .field("noise", &self.noise.as_ref().map(|n| n.len()))
            .field("num_classes", &self.num_classes)
            .field("target", &self.target)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl ShowerDataset {
    /// Build from already joined tables.
    pub fn new(mut tables: ShowerTables, options: DatasetOptions) -> Result<Self> {
        if options.num_classes == 0 {
            return Err(DatasetError::config("num_classes must be at least 1"));
        }
        let [low, high] = options.bin_range;
        if !(low.is_finite() && high.is_finite() && low < high) {
            return Err(DatasetError::config(format!(
                "bin_range [{low}, {high}] must be finite with a lower edge below the upper edge"
            )));
        }
        if let Some(range) = options.shower_range {
            retain_shower_count(&mut tables, range)?;
        }

        let dataset = Self {
            samples: tables.into_iter().collect(),
            noise: options.noise,
            edges: BinEdges::linear(low, high, options.num_classes),
            num_classes: options.num_classes,
            target: options.target,
            moment: options.moment,
            normalize_moments: options.normalize_moments,
            hook: None,
        };

        info!(
            "dataset ready: {} samples, {} classes, target {:?}, noise table: {}",
            dataset.len(),
            dataset.num_classes,
            dataset.target,
            dataset.noise.as_ref().map_or(0, |n| n.len())
        );
        Ok(dataset)
    }

    /// Load every table named by `cfg` and build the dataset.
    pub fn from_config(cfg: &DatasetConfig) -> Result<Self> {
        cfg.validate()?;
        let num_classes = cfg.class_count()?;

        let deposits = loader::load_deposits(&cfg.deposit_file)?;
        let energies = loader::load_energies(&cfg.energy_file)?;
        let tables = join_tables(deposits, energies)?;

        let noise = cfg
            .noise_file
            .as_deref()
            .map(loader::load_noise)
            .transpose()?;

        let filtering = cfg.min_shower_num > 0 || cfg.max_shower_num != DEFAULT_MAX_SHOWER_NUM;
        let options = DatasetOptions {
            num_classes,
            target: cfg.target,
            moment: cfg.moment,
            normalize_moments: cfg.normalize_moments,
            bin_range: cfg.bin_range,
            shower_range: filtering
                .then(|| ShowerCountRange::new(cfg.min_shower_num, cfg.max_shower_num)),
            noise,
        };
        Self::new(tables, options)
    }

    /// Install an observer called after every retrieval.
    pub fn with_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&SampleEvent<'_>) + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn target_kind(&self) -> TargetKind {
        self.target
    }

    pub fn edges(&self) -> &BinEdges {
        &self.edges
    }

    /// Keys in index order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.samples.iter().map(|(k, _)| k.as_str())
    }

    pub fn key(&self, index: usize) -> Result<&str> {
        self.entry(index).map(|(k, _)| k.as_str())
    }

    pub fn entry(&self, index: usize) -> Result<&(SampleKey, ShowerEntry)> {
        self.samples.get(index).ok_or(DatasetError::IndexOutOfRange {
            index,
            len: self.samples.len(),
        })
    }

    /// Number of samples per shower count.
    pub fn shower_histogram(&self) -> BTreeMap<usize, usize> {
        count_histogram(self.samples.iter().map(|(_, entry)| entry))
    }

    /// Noise grid for `key`, flattened in `(z, x, y)` order.
    pub fn noise(&self, key: &str) -> Result<&[f32]> {
        let table = self.noise.as_ref().ok_or(DatasetError::NoNoiseTable)?;
        table
            .get(key)
            .map(|v| v.as_slice())
            .ok_or_else(|| DatasetError::NoiseSampleNotFound {
                key: key.to_string(),
            })
    }

    /// Deterministic retrieval of sample `index`.
    ///
    /// Fails for [`TargetKind::RandomClass`], which needs an RNG; use
    /// [`ShowerDataset::sample_with`] for that.
    pub fn sample(&self, index: usize) -> Result<Sample> {
        if self.target == TargetKind::RandomClass {
            return Err(DatasetError::config(
                "random_class targets need an RNG; use sample_with",
            ));
        }
        let sample = self.fetch(index)?;
        self.notify(&sample, false);
        Ok(sample)
    }

    /// Retrieval followed by `augmentations` in order.
    pub fn sample_with(
        &self,
        index: usize,
        augmentations: &[Box<dyn Augmentation>],
        rng: &mut dyn RngCore,
    ) -> Result<Sample> {
        let mut sample = self.fetch(index)?;
        if self.target == TargetKind::RandomClass {
            sample.target = Target::Class(rng.gen_range(0..self.num_classes));
        }
        for aug in augmentations {
            sample = aug.apply(self, sample, rng)?;
        }
        self.notify(&sample, !augmentations.is_empty());
        Ok(sample)
    }

    fn fetch(&self, index: usize) -> Result<Sample> {
        let (key, entry) = self.entry(index)?;
        let tensor = tensor::scatter(key, &entry.record)?;
        trace!(
            "sample {index} ({key}): {} deposits, {} showers",
            entry.record.len(),
            entry.shower_count()
        );

        Ok(Sample {
            tensor,
            target: self.target_for(&entry.energies),
            shower_count: entry.shower_count(),
            energies: entry.energies.clone(),
            index,
        })
    }

    /// Target for an energy list. Random-class targets get a placeholder
    /// `Class(0)` that [`ShowerDataset::sample_with`] replaces.
    pub fn target_for(&self, energies: &EnergyList) -> Target {
        match self.target {
            TargetKind::ShowerCount => Target::Count(energies.len()),
            TargetKind::EnergyBins => Target::Bins(self.edges.bin_vector(energies)),
            TargetKind::Moments => Target::Moments(calculate_moment(
                self.moment,
                energies,
                self.normalize_moments,
            )),
            TargetKind::RandomClass => Target::Class(0),
        }
    }

    fn notify(&self, sample: &Sample, augmented: bool) {
        if let Some(hook) = &self.hook {
            let key = self
                .samples
                .get(sample.index)
                .map_or("", |(k, _)| k.as_str());
            hook(&SampleEvent {
                index: sample.index,
                key,
                tensor: &sample.tensor,
                shower_count: sample.shower_count,
                augmented,
            });
        }
    }
}

impl SampleSource for ShowerDataset {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize, rng: &mut dyn RngCore) -> Result<Sample> {
        self.sample_with(index, &[], rng)
    }
}

/// A dataset paired with the augmentations applied on every retrieval.
pub struct Pipeline {
    pub dataset: ShowerDataset,
    pub augmentations: Vec<Box<dyn Augmentation>>,
}

impl Pipeline {
    pub fn new(dataset: ShowerDataset) -> Self {
        Self {
            dataset,
            augmentations: Vec::new(),
        }
    }

    pub fn with(mut self, augmentation: Box<dyn Augmentation>) -> Self {
        self.augmentations.push(augmentation);
        self
    }

    /// Dataset and augmentations as described by `cfg`.
    pub fn from_config(cfg: &DatasetConfig) -> Result<Self> {
        let dataset = ShowerDataset::from_config(cfg)?;
        Ok(Self {
            dataset,
            augmentations: augment::from_config(&cfg.augment),
        })
    }
}

impl SampleSource for Pipeline {
    fn len(&self) -> usize {
        self.dataset.len()
    }

    fn get(&self, index: usize, rng: &mut dyn RngCore) -> Result<Sample> {
        self.dataset.sample_with(index, &self.augmentations, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{ShowerRecord, Voxel};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Mutex;

    fn entry(deposits: Vec<(Voxel, f64)>, energies: Vec<f64>) -> ShowerEntry {
        ShowerEntry {
            record: ShowerRecord::new(deposits),
            energies,
        }
    }

    fn tables() -> ShowerTables {
        ShowerTables::from([
            (
                "a".to_string(),
                entry(vec![(Voxel::new(1, 2, 3), 4.0)], vec![2.0, 5.0]),
            ),
            ("b".to_string(), entry(vec![], vec![])),
        ])
    }

    #[test]
    fn descending_bin_range_is_rejected() {
        let mut opts = DatasetOptions::new(4);
        opts.bin_range = [13.0, 1.0];
        let err = ShowerDataset::new(tables(), opts.clone()).unwrap_err();
        assert!(matches!(err, DatasetError::Config { .. }));

        opts.bin_range = [1.0, f64::NAN];
        assert!(ShowerDataset::new(tables(), opts).is_err());
    }

    #[test]
    fn empty_energy_list_gives_zero_target() {
        let ds = ShowerDataset::new(tables(), DatasetOptions::new(4)).unwrap();
        let s = ds.sample(1).unwrap();
        assert_eq!(s.shower_count, 0);
        assert_eq!(s.tensor.sum(), 0.0);
        match s.target {
            Target::Bins(b) => assert!(b.iter().all(|c| *c == 0.0)),
            other => panic!("unexpected target {other:?}"),
        }
    }

    #[test]
    fn out_of_range_index() {
        let ds = ShowerDataset::new(tables(), DatasetOptions::new(4)).unwrap();
        assert!(matches!(
            ds.sample(2),
            Err(DatasetError::IndexOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn shower_count_and_moment_targets() {
        let mut opts = DatasetOptions::new(4);
        opts.target = TargetKind::ShowerCount;
        let ds = ShowerDataset::new(tables(), opts.clone()).unwrap();
        assert_eq!(ds.sample(0).unwrap().target, Target::Count(2));

        opts.target = TargetKind::Moments;
        opts.moment = 2;
        let ds = ShowerDataset::new(tables(), opts).unwrap();
        assert_eq!(ds.sample(0).unwrap().target, Target::Moments(vec![3.5, 14.5]));
    }

    #[test]
    fn random_class_needs_rng_and_stays_in_range() {
        let mut opts = DatasetOptions::new(3);
        opts.target = TargetKind::RandomClass;
        let ds = ShowerDataset::new(tables(), opts).unwrap();
        assert!(matches!(ds.sample(0), Err(DatasetError::Config { .. })));

        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..50 {
            match ds.get(0, &mut rng).unwrap().target {
                Target::Class(c) => assert!(c < 3),
                other => panic!("unexpected target {other:?}"),
            }
        }
    }

    #[test]
    fn filtering_at_construction() {
        let mut opts = DatasetOptions::new(4);
        opts.shower_range = Some(ShowerCountRange::new(1, 10));
        let ds = ShowerDataset::new(tables(), opts).unwrap();
        assert_eq!(ds.keys().collect::<Vec<_>>(), ["a"]);
    }

    #[test]
    fn hook_sees_every_retrieval() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let ds = ShowerDataset::new(tables(), DatasetOptions::new(4))
            .unwrap()
            .with_hook(move |ev| {
                sink.lock().unwrap().push((ev.key.to_string(), ev.shower_count));
            });

        ds.sample(0).unwrap();
        ds.sample(1).unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("a".to_string(), 2), ("b".to_string(), 0)]
        );
    }

    #[test]
    fn missing_noise_key_is_reported() {
        let mut opts = DatasetOptions::new(4);
        opts.noise = Some(NoiseTable::new());
        let ds = ShowerDataset::new(tables(), opts).unwrap();
        assert!(matches!(
            ds.noise("17"),
            Err(DatasetError::NoiseSampleNotFound { ref key }) if key == "17"
        ));

        let ds = ShowerDataset::new(tables(), DatasetOptions::new(4)).unwrap();
        assert!(matches!(ds.noise("17"), Err(DatasetError::NoNoiseTable)));
    }
}
