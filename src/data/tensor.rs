use ndarray::{Array2, Axis};

use super::model::{ShowerRecord, ShowerTensor, GRID_LEN, GRID_SHAPE, GRID_X, GRID_Y};
use crate::error::{DatasetError, Result};

/// An all-zero detector grid.
pub fn zeros() -> ShowerTensor {
    ShowerTensor::zeros(GRID_SHAPE)
}

/// Scatter a sparse record into a fresh `(x, y, z)` grid.
///
/// `key` is only used to label errors.
pub fn scatter(key: &str, record: &ShowerRecord) -> Result<ShowerTensor> {
    let mut grid = zeros();
    scatter_into(&mut grid, key, record)?;
    Ok(grid)
}

/// Accumulate a sparse record into an existing grid.
///
/// Input coordinates are `(z, x, y)`; storage is `[x, y, z]`. Repeated voxels
/// add up. The grid is left untouched if any voxel is outside the detector.
pub fn scatter_into(grid: &mut ShowerTensor, key: &str, record: &ShowerRecord) -> Result<()> {
    if let Some((voxel, _)) = record.deposits.iter().find(|(v, _)| !v.in_grid()) {
        return Err(DatasetError::VoxelOutOfBounds {
            key: key.to_string(),
            voxel: *voxel,
        });
    }
    for (voxel, energy) in &record.deposits {
        grid[[voxel.x, voxel.y, voxel.z]] += *energy as f32;
    }
    Ok(())
}

/// Reorder a flattened `(z, x, y)` noise grid into `(x, y, z)` storage.
pub fn noise_tensor(key: &str, values: &[f32]) -> Result<ShowerTensor> {
    if values.len() != GRID_LEN {
        return Err(DatasetError::InvalidNoiseShape {
            key: key.to_string(),
            expected: GRID_LEN,
            len: values.len(),
        });
    }
    Ok(ShowerTensor::from_shape_fn(GRID_SHAPE, |(i, j, k)| {
        values[(k * GRID_X + i) * GRID_Y + j]
    }))
}

/// Sum along the y axis, giving an `(x, z)` image.
pub fn project(tensor: &ShowerTensor) -> Array2<f32> {
    tensor.sum_axis(Axis(1))
}
