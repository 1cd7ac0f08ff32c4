//! Two-population mixing.
//!
//! Pairs the `i`-th sample of two datasets (for example two interaction
//! points) and labels each retrieval with which population(s) it contains.

use log::trace;
use rand::{Rng, RngCore};

use crate::data::model::{Sample, Target};
use crate::data::tensor;
use crate::dataset::{SampleSource, ShowerDataset};
use crate::error::Result;

/// Which populations a mixed sample contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixClass {
    First = 0,
    Second = 1,
    Both = 2,
}

impl MixClass {
    pub const COUNT: usize = 3;

    pub fn from_index(i: usize) -> Option<Self> {
        match i {
            0 => Some(Self::First),
            1 => Some(Self::Second),
            2 => Some(Self::Both),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct PopulationMix {
    first: ShowerDataset,
    second: ShowerDataset,
}

impl PopulationMix {
    pub fn new(first: ShowerDataset, second: ShowerDataset) -> Self {
        Self { first, second }
    }

    /// Build the sample at `index` for a given class.
    pub fn sample_as(&self, index: usize, class: MixClass) -> Result<Sample> {
        let (key_a, a) = self.first.entry(index)?;
        let (key_b, b) = self.second.entry(index)?;

        let mut grid = tensor::zeros();
        let mut energies = Vec::new();
        if class != MixClass::Second {
            tensor::scatter_into(&mut grid, key_a, &a.record)?;
            energies.extend_from_slice(&a.energies);
        }
        if class != MixClass::First {
            tensor::scatter_into(&mut grid, key_b, &b.record)?;
            energies.extend_from_slice(&b.energies);
        }
        trace!("mix {index} ({key_a} | {key_b}) as {class:?}");

        Ok(Sample {
            tensor: grid,
            target: Target::Class(class as usize),
            shower_count: energies.len(),
            energies,
            index,
        })
    }
}

impl SampleSource for PopulationMix {
    fn len(&self) -> usize {
        self.first.len().min(self.second.len())
    }

    fn get(&self, index: usize, rng: &mut dyn RngCore) -> Result<Sample> {
        let class =
            MixClass::from_index(rng.gen_range(0..MixClass::COUNT)).unwrap_or(MixClass::Both);
        self.sample_as(index, class)
    }
}
