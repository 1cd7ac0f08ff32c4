//! Energy-bin targets.
//!
//! Shower energies are histogrammed against linearly spaced edges. Bin `i`
//! holds energies `e` with `edges[i] <= e < edges[i + 1]`; anything below the
//! first edge or at/above the last edge is dropped.

use ndarray::Array1;

/// Default lower edge of the energy range.
pub const DEFAULT_LOW: f64 = 1.0;
/// Default upper edge of the energy range.
pub const DEFAULT_HIGH: f64 = 13.0;

#[derive(Debug, Clone, PartialEq)]
pub struct BinEdges {
    edges: Vec<f64>,
}

impl BinEdges {
    /// `bins + 1` evenly spaced edges from `low` to `high` inclusive.
    pub fn linear(low: f64, high: f64, bins: usize) -> Self {
        let edges = if bins == 0 {
            Vec::new()
        } else {
            let step = (high - low) / bins as f64;
            (0..=bins)
                .map(|i| if i == bins { high } else { low + step * i as f64 })
                .collect()
        };
        Self { edges }
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.edges.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bin holding `value`, or `None` when it falls outside `[low, high)`.
    pub fn digitize(&self, value: f64) -> Option<usize> {
        // Number of edges <= value; 0 and len+1 are the out-of-range slots.
        let slot = self.edges.partition_point(|edge| *edge <= value);
        if slot == 0 || slot > self.len() {
            None
        } else {
            Some(slot - 1)
        }
    }

    /// Occupancy count per bin.
    pub fn bin_vector(&self, energies: &[f64]) -> Array1<f32> {
        let mut counts = Array1::<f32>::zeros(self.len());
        for bin in energies.iter().filter_map(|e| self.digitize(*e)) {
            counts[bin] += 1.0;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_span_the_range() {
        let edges = BinEdges::linear(1.0, 13.0, 4);
        assert_eq!(edges.edges(), &[1.0, 4.0, 7.0, 10.0, 13.0]);
        assert_eq!(edges.len(), 4);
    }

    #[test]
    fn digitize_uses_left_closed_bins() {
        let edges = BinEdges::linear(1.0, 13.0, 4);
        assert_eq!(edges.digitize(1.0), Some(0));
        assert_eq!(edges.digitize(3.999), Some(0));
        assert_eq!(edges.digitize(4.0), Some(1));
        assert_eq!(edges.digitize(12.999), Some(3));
    }

    #[test]
    fn values_outside_the_range_are_dropped() {
        let edges = BinEdges::linear(DEFAULT_LOW, DEFAULT_HIGH, 6);
        assert_eq!(edges.digitize(13.0), None);
        assert_eq!(edges.digitize(0.5), None);

        let bins = edges.bin_vector(&[0.5, 2.0, 13.0, 12.5]);
        assert_eq!(bins.sum(), 2.0);
        assert_eq!(bins[0], 1.0);
        assert_eq!(bins[5], 1.0);
    }

    #[test]
    fn in_range_energies_sum_to_shower_count() {
        let edges = BinEdges::linear(DEFAULT_LOW, DEFAULT_HIGH, 12);
        let energies = [1.0, 1.5, 6.2, 6.9, 11.0, 12.99];
        assert_eq!(edges.bin_vector(&energies).sum(), energies.len() as f32);
    }

    #[test]
    fn empty_energy_list_gives_zero_vector() {
        let bins = BinEdges::linear(DEFAULT_LOW, DEFAULT_HIGH, 5).bin_vector(&[]);
        assert_eq!(bins.len(), 5);
        assert!(bins.iter().all(|c| *c == 0.0));
    }

    #[test]
    fn zero_bins_drop_everything() {
        let edges = BinEdges::linear(1.0, 13.0, 0);
        assert!(edges.is_empty());
        assert_eq!(edges.digitize(5.0), None);
    }
}
