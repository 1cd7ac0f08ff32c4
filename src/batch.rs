//! Batched iteration over a [`SampleSource`], with an optional held-out
//! validation subset.

use log::{debug, info};
use ndarray::{Array2, Array3, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};

use crate::config::LoaderConfig;
use crate::data::model::{Target, GRID_X, GRID_Z};
use crate::dataset::SampleSource;
use crate::error::{DatasetError, Result};

/// Stacked samples.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `(batch, x, z)` projections.
    pub projections: Array3<f32>,
    pub targets: Vec<Target>,
    pub shower_counts: Vec<usize>,
    pub indices: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Targets stacked row-wise. Fails if targets differ in width.
    pub fn target_matrix(&self) -> Result<Array2<f32>> {
        let rows: Vec<Vec<f32>> = self.targets.iter().map(Target::to_vec).collect();
        let width = rows.first().map_or(0, |r| r.len());
        if rows.iter().any(|r| r.len() != width) {
            return Err(DatasetError::config("targets in a batch differ in width"));
        }
        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        Array2::from_shape_vec((self.len(), width), flat)
            .map_err(|e| DatasetError::config(format!("stacking targets: {e}")))
    }
}

pub struct DataLoader<'a, S: SampleSource> {
    source: &'a S,
    batch_size: usize,
    shuffle: bool,
    indices: Vec<usize>,
    validation: Vec<usize>,
}

impl<'a, S: SampleSource> DataLoader<'a, S> {
    /// Set up batching. The validation subset is drawn once from `seed`.
    pub fn new(source: &'a S, cfg: &LoaderConfig, seed: u64) -> Result<Self> {
        if cfg.batch_size == 0 {
            return Err(DatasetError::config("batch_size must be at least 1"));
        }
        let (indices, validation) = split_indices(source.len(), cfg.validation_split, seed)?;
        info!(
            "loader: {} training / {} validation samples, batch size {}",
            indices.len(),
            validation.len(),
            cfg.batch_size
        );
        Ok(Self {
            source,
            batch_size: cfg.batch_size,
            shuffle: cfg.shuffle,
            indices,
            validation,
        })
    }

    /// Sample indices served by this loader.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Number of batches per epoch.
    pub fn num_batches(&self) -> usize {
        self.indices.len().div_ceil(self.batch_size)
    }

    /// Loader over the held-out validation indices, if any were split off.
    pub fn split_validation(&self) -> Option<DataLoader<'a, S>> {
        if self.validation.is_empty() {
            return None;
        }
        Some(DataLoader {
            source: self.source,
            batch_size: self.batch_size,
            shuffle: false,
            indices: self.validation.clone(),
            validation: Vec::new(),
        })
    }

    /// One pass over the loader's indices.
    pub fn iter_epoch<'r>(&self, rng: &'r mut dyn RngCore) -> Batches<'a, 'r, S> {
        let mut order = self.indices.clone();
        if self.shuffle {
            order.shuffle(&mut *rng);
        }
        Batches {
            source: self.source,
            order,
            batch_size: self.batch_size,
            pos: 0,
            rng,
        }
    }
}

/// Split `0..len` into training and validation indices.
///
/// `split` is a fraction when below 1, otherwise an absolute count.
fn split_indices(len: usize, split: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    let mut all: Vec<usize> = (0..len).collect();
    if split <= 0.0 {
        return Ok((all, Vec::new()));
    }

    let n_valid = if split >= 1.0 {
        let n = split as usize;
        if n >= len {
            return Err(DatasetError::config(format!(
                "validation split of {n} samples leaves nothing to train on ({len} samples)"
            )));
        }
        n
    } else {
        (len as f64 * split) as usize
    };

    let mut rng = StdRng::seed_from_u64(seed);
    all.shuffle(&mut rng);
    let train = all.split_off(n_valid);
    debug!("validation split: {n_valid} of {len} samples held out");
    Ok((train, all))
}

pub struct Batches<'a, 'r, S: SampleSource> {
    source: &'a S,
    order: Vec<usize>,
    batch_size: usize,
    pos: usize,
    rng: &'r mut dyn RngCore,
}

impl<S: SampleSource> Iterator for Batches<'_, '_, S> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.order.len() {
            return None;
        }
        let end = (self.pos + self.batch_size).min(self.order.len());
        let chunk = self.order[self.pos..end].to_vec();
        self.pos = end;
        Some(self.build(&chunk))
    }
}

impl<S: SampleSource> Batches<'_, '_, S> {
    fn build(&mut self, chunk: &[usize]) -> Result<Batch> {
        let mut projections = Array3::<f32>::zeros((chunk.len(), GRID_X, GRID_Z));
        let mut targets = Vec::with_capacity(chunk.len());
        let mut shower_counts = Vec::with_capacity(chunk.len());
        let mut indices = Vec::with_capacity(chunk.len());

        for (row, &idx) in chunk.iter().enumerate() {
            let sample = self.source.get(idx, &mut *self.rng)?;
            projections
                .index_axis_mut(Axis(0), row)
                .assign(&sample.projection());
            targets.push(sample.target);
            shower_counts.push(sample.shower_count);
            indices.push(sample.index);
        }

        Ok(Batch {
            projections,
            targets,
            shower_counts,
            indices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Sample, ShowerTensor};
    use std::collections::BTreeSet;

    /// Source whose sample `i` has `i` showers and an empty grid.
    struct Counting(usize);

    impl SampleSource for Counting {
        fn len(&self) -> usize {
            self.0
        }

        fn get(&self, index: usize, _rng: &mut dyn RngCore) -> Result<Sample> {
            Ok(Sample {
                tensor: ShowerTensor::zeros(crate::data::model::GRID_SHAPE),
                target: Target::Count(index),
                shower_count: index,
                energies: Vec::new(),
                index,
            })
        }
    }

    fn cfg(batch_size: usize, shuffle: bool, validation_split: f64) -> LoaderConfig {
        LoaderConfig {
            batch_size,
            shuffle,
            validation_split,
        }
    }

    #[test]
    fn epoch_covers_every_index_once() {
        let source = Counting(10);
        let loader = DataLoader::new(&source, &cfg(4, true, 0.0), 0).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        let batches: Vec<Batch> = loader.iter_epoch(&mut rng).collect::<Result<_>>().unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(loader.num_batches(), 3);
        assert_eq!(batches[2].len(), 2);
        assert_eq!(batches[0].projections.dim(), (4, GRID_X, GRID_Z));

        let seen: BTreeSet<usize> = batches.iter().flat_map(|b| b.indices.clone()).collect();
        assert_eq!(seen, (0..10).collect());
    }

    #[test]
    fn unshuffled_epoch_is_in_order() {
        let source = Counting(5);
        let loader = DataLoader::new(&source, &cfg(2, false, 0.0), 0).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let first = loader.iter_epoch(&mut rng).next().unwrap().unwrap();
        assert_eq!(first.indices, vec![0, 1]);
        assert_eq!(first.shower_counts, vec![0, 1]);
        assert_eq!(
            first.target_matrix().unwrap(),
            Array2::from_shape_vec((2, 1), vec![0.0, 1.0]).unwrap()
        );
    }

    #[test]
    fn validation_split_is_disjoint() {
        let source = Counting(20);
        let loader = DataLoader::new(&source, &cfg(8, true, 0.25), 3).unwrap();
        let valid = loader.split_validation().unwrap();

        assert_eq!(valid.indices().len(), 5);
        assert_eq!(loader.indices().len(), 15);
        let train: BTreeSet<usize> = loader.indices().iter().copied().collect();
        assert!(valid.indices().iter().all(|i| !train.contains(i)));
    }

    #[test]
    fn absolute_validation_count() {
        let source = Counting(10);
        let loader = DataLoader::new(&source, &cfg(8, false, 3.0), 3).unwrap();
        assert_eq!(loader.split_validation().unwrap().indices().len(), 3);

        assert!(DataLoader::new(&source, &cfg(8, false, 10.0), 3).is_err());
        assert!(DataLoader::new(&source, &cfg(8, false, 0.0), 3)
            .unwrap()
            .split_validation()
            .is_none());
    }
}
