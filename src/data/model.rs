use std::collections::BTreeMap;
use std::fmt;

use ndarray::{Array1, Array2, Array3};

// ---------------------------------------------------------------------------
// Detector geometry
// ---------------------------------------------------------------------------

/// Rows along x (storage axis 0).
pub const GRID_X: usize = 110;
/// Columns along y (storage axis 1).
pub const GRID_Y: usize = 11;
/// Layers along z (storage axis 2).
pub const GRID_Z: usize = 21;

/// Storage shape of a dense shower tensor: `(x, y, z)`.
pub const GRID_SHAPE: (usize, usize, usize) = (GRID_X, GRID_Y, GRID_Z);

/// Number of values in one flattened grid.
pub const GRID_LEN: usize = GRID_X * GRID_Y * GRID_Z;

/// Identifier shared by the deposit, energy and noise tables.
pub type SampleKey = String;

/// Dense `(x, y, z)` energy grid for one sample.
pub type ShowerTensor = Array3<f32>;

// ---------------------------------------------------------------------------
// Voxel – one detector cell, in input order (z, x, y)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Voxel {
    pub z: usize,
    pub x: usize,
    pub y: usize,
}

impl Voxel {
    pub fn new(z: usize, x: usize, y: usize) -> Self {
        Self { z, x, y }
    }

    /// Whether the voxel fits inside the detector grid.
    pub fn in_grid(&self) -> bool {
        self.x < GRID_X && self.y < GRID_Y && self.z < GRID_Z
    }
}

impl fmt::Display for Voxel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(z={}, x={}, y={})", self.z, self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// ShowerRecord – sparse deposits of one sample
// ---------------------------------------------------------------------------

/// Sparse energy deposits of one sample.
///
/// A voxel may appear more than once; its contributions are summed when the
/// record is scattered into a dense grid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShowerRecord {
    pub deposits: Vec<(Voxel, f64)>,
}

impl ShowerRecord {
    pub fn new(deposits: Vec<(Voxel, f64)>) -> Self {
        Self { deposits }
    }

    pub fn push(&mut self, voxel: Voxel, energy: f64) {
        self.deposits.push((voxel, energy));
    }

    pub fn len(&self) -> usize {
        self.deposits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deposits.is_empty()
    }

    /// Total deposited energy.
    pub fn total_energy(&self) -> f64 {
        self.deposits.iter().map(|(_, e)| e).sum()
    }
}

/// Per-shower energies of one sample, one entry per physical shower.
pub type EnergyList = Vec<f64>;

// ---------------------------------------------------------------------------
// Joined tables
// ---------------------------------------------------------------------------

/// Deposits and energies of one sample, joined by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShowerEntry {
    pub record: ShowerRecord,
    pub energies: EnergyList,
}

impl ShowerEntry {
    pub fn shower_count(&self) -> usize {
        self.energies.len()
    }
}

/// All samples, keyed and ordered by sample key.
pub type ShowerTables = BTreeMap<SampleKey, ShowerEntry>;

/// Noise grids keyed by noise-sample key, flattened in `(z, x, y)` order.
pub type NoiseTable = BTreeMap<SampleKey, Vec<f32>>;

// ---------------------------------------------------------------------------
// Retrieval output
// ---------------------------------------------------------------------------

/// Learning target produced for one sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Class index (random-class and population-mix variants).
    Class(usize),
    /// Raw number of showers.
    Count(usize),
    /// Energy histogram, one count per bin.
    Bins(Array1<f32>),
    /// Leading raw moments of the energy list.
    Moments(Vec<f64>),
}

impl Target {
    /// Flat numeric view, convenient for stacking into a batch.
    pub fn to_vec(&self) -> Vec<f32> {
        match self {
            Target::Class(c) => vec![*c as f32],
            Target::Count(n) => vec![*n as f32],
            Target::Bins(b) => b.to_vec(),
            Target::Moments(m) => m.iter().map(|v| *v as f32).collect(),
        }
    }
}

/// One retrieved sample.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Dense `(x, y, z)` grid.
    pub tensor: ShowerTensor,
    pub target: Target,
    /// Number of showers contributing to `tensor`.
    pub shower_count: usize,
    /// Energies of those showers.
    pub energies: EnergyList,
    /// Position of the sample in the dataset.
    pub index: usize,
}

impl Sample {
    /// Tensor summed along the y axis: shape `(x, z)`.
    pub fn projection(&self) -> Array2<f32> {
        super::tensor::project(&self.tensor)
    }
}
