//! Synthetic input generation for benchmarks and tests.

use crate::{io, memory::*, Result};
use rand::prelude::*;
use std::path::Path;

/// Default value range of [`uniform`].
pub const UNIFORM_RANGE: (f64, f64) = (0.0, 1e9);
/// Distance between neighbouring true centers of [`clustered`].
pub const CLUSTER_SPACING: f64 = 10.0;
/// Maximum distance of a [`clustered`] sample from its center.
pub const CLUSTER_NOISE: f64 = 2.5;

/// Generated samples plus a matching initial centroid vector.
#[derive(Clone, Debug)]
pub struct Dataset<T: Primitive> {
    pub samples: Vec<T>,
    pub initial_centroids: Vec<T>,
}
impl<T: Primitive> Dataset<T> {
    /// Write both vectors in the format read by [`io::load_samples`].
    pub fn store(&self, samples: impl AsRef<Path>, centroids: impl AsRef<Path>) -> Result<()> {
        io::store_values(samples, &self.samples)?;
        io::store_values(centroids, &self.initial_centroids)
    }
}

/// A reproducible generator for `Some(seed)`, an entropy-seeded one otherwise.
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    seed.map(StdRng::seed_from_u64).unwrap_or_else(StdRng::from_entropy)
}

/// Samples and initial centroids drawn uniformly from `[min, max]`.
pub fn uniform<T: Primitive, R: Rng>(rng: &mut R, sample_cnt: usize, k: usize, min: T, max: T) -> Dataset<T> {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    let mut draw = |n: usize| (0..n).map(|_| rng.gen_range(lo..=hi)).collect::<Vec<T>>();
    let samples = draw(sample_cnt);
    Dataset { samples, initial_centroids: draw(k) }
}

/// `k` well separated groups: true centers at `10, 20, ..., 10k`, every sample picks one of them
/// uniformly and adds noise from `[-2.5, 2.5]`. Initial centroids are uniform in `[0, 15k]`.
pub fn clustered<T: Primitive, R: Rng>(rng: &mut R, sample_cnt: usize, k: usize) -> Dataset<T> {
    let cast = |v: f64| T::from_wire(v);
    if k == 0 {
        return Dataset { samples: Vec::new(), initial_centroids: Vec::new() };
    }
    let samples = (0..sample_cnt).map(|_| {
        let center = CLUSTER_SPACING * (rng.gen_range(0..k) + 1) as f64;
        cast(center + rng.gen_range(-CLUSTER_NOISE..=CLUSTER_NOISE))
    }).collect();
    let upper = 1.5 * CLUSTER_SPACING * k as f64;
    let initial_centroids = (0..k).map(|_| cast(rng.gen_range(0.0..=upper))).collect();
    Dataset { samples, initial_centroids }
}

/// The centers [`clustered`] draws its samples around.
pub fn cluster_centers<T: Primitive>(k: usize) -> Vec<T> {
    (1..=k).map(|i| T::from_wire(CLUSTER_SPACING * i as f64)).collect()
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KMeans, KMeansConfig};

    #[test]
    fn uniform_stays_in_range() {
        let mut rnd = rng_from_seed(Some(3));
        let data = uniform(&mut rnd, 1000, 8, 5.0f64, -5.0);
        assert_eq!(data.samples.len(), 1000);
        assert_eq!(data.initial_centroids.len(), 8);
        assert!(data.samples.iter().chain(data.initial_centroids.iter()).all(|v| (-5.0..=5.0).contains(v)));
    }

    #[test]
    fn seed_is_reproducible() {
        let a: Dataset<f64> = clustered(&mut rng_from_seed(Some(11)), 500, 4);
        let b: Dataset<f64> = clustered(&mut rng_from_seed(Some(11)), 500, 4);
        assert_eq!(a.samples, b.samples);
        assert_eq!(a.initial_centroids, b.initial_centroids);
    }

    #[test]
    fn clustered_samples_surround_centers() {
        let k = 6;
        let data: Dataset<f64> = clustered(&mut rng_from_seed(Some(5)), 3000, k);
        let centers = cluster_centers::<f64>(k);
        for s in &data.samples {
            assert!(centers.iter().any(|c| (s - c).abs() <= CLUSTER_NOISE), "sample {} is far from every center", s);
        }
        assert!(data.initial_centroids.iter().all(|c| (0.0..=90.0).contains(c)));
    }

    #[test]
    fn clustered_groups_are_recovered() {
        let k = 5;
        let data: Dataset<f64> = clustered(&mut rng_from_seed(Some(8)), 20_000, k);
        let centers = cluster_centers::<f64>(k);
        let res = KMeans::new(data.samples).kmeans_parallel(&centers, &KMeansConfig::build().threads(4).build()).unwrap();
        for (found, truth) in res.centroids.iter().zip(centers.iter()) {
            assert_approx_eq!(*found, *truth, 0.2);
        }
    }

    #[test]
    fn store_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let (samples, centroids) = (dir.path().join("samples.csv"), dir.path().join("centroids.csv"));
        let data: Dataset<f64> = uniform(&mut rng_from_seed(Some(1)), 10, 3, UNIFORM_RANGE.0, UNIFORM_RANGE.1);
        data.store(&samples, &centroids).unwrap();

        assert_eq!(io::load_samples::<f64>(&samples).unwrap().len(), 10);
        assert_eq!(io::load_initial_centroids::<f64>(&centroids).unwrap().len(), 3);
    }
}
