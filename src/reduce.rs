use crate::memory::*;

/// Partial (or fully merged) result of one assignment pass.
///
/// Every execution unit fills its own accumulator while scanning its partition; accumulators
/// are then folded together elementwise. A merged accumulator is what the centroid update
/// and the convergence check operate on.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterAccumulator<T: Primitive> {
    /// Sum of squared distances from each scanned sample to its nearest centroid
    pub sse: T,
    /// Per-cluster sum of the assigned sample values
    pub sums: Vec<T>,
    /// Per-cluster number of assigned samples
    pub counts: Vec<usize>,
}
impl<T: Primitive> ClusterAccumulator<T> {
    pub fn new(k: usize) -> Self {
        Self { sse: T::zero(), sums: vec![T::zero(); k], counts: vec![0; k] }
    }

    pub fn k(&self) -> usize { self.sums.len() }

    pub fn reset(&mut self) {
        self.sse = T::zero();
        self.sums.iter_mut().for_each(|s| *s = T::zero());
        self.counts.iter_mut().for_each(|c| *c = 0);
    }

    /// Fold the per-cluster part of `other` into `self`. SSE is merged separately by the callers,
    /// because the shared-memory schedule merges it through an atomic instead of the lock.
    pub fn merge_clusters(&mut self, other: &Self) {
        debug_assert_eq!(self.k(), other.k());
        self.sums.iter_mut().zip(other.sums.iter()).for_each(|(s, o)| *s += o);
        self.counts.iter_mut().zip(other.counts.iter()).for_each(|(c, o)| *c += o);
    }

    pub fn merge(&mut self, other: &Self) {
        self.sse += other.sse;
        self.merge_clusters(other);
    }

    /// Number of samples that contributed to this accumulator.
    pub fn total_count(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Recompute centroids as the mean of their assigned samples. Clusters without samples keep
    /// their previous position.
    ///
    /// ## Returns
    /// Amount of empty clusters
    pub fn update_centroids(&self, centroids: &mut [T]) -> usize {
        debug_assert_eq!(centroids.len(), self.k());
        let mut empty = 0;
        centroids.iter_mut()
            .zip(self.sums.iter().cloned().zip(self.counts.iter().cloned()))
            .for_each(|(c, (sum, cnt))| {
                if cnt > 0 {
                    *c = sum / T::from(cnt).unwrap_or_else(T::one);
                } else {
                    empty += 1;
                }
            });
        empty
    }
}

/// Index and squared distance of the centroid nearest to `sample`. Ties go to the lowest index.
#[inline(always)]
pub(crate) fn nearest_centroid<T: Primitive>(sample: T, centroids: &[T]) -> (usize, T) {
    let mut best_idx = 0;
    let mut best_dist = T::infinity();
    for (idx, c) in centroids.iter().cloned().enumerate() {
        let dist = sq_dist(sample, c);
        if dist < best_dist {
            best_dist = dist;
            best_idx = idx;
        }
    }
    (best_idx, best_dist)
}

/// Assign every sample of a partition to its nearest centroid and accumulate the partition's
/// SSE, per-cluster sums and counts.
///
/// `assignments` must have the same length as `samples`; `centroids` is only read.
pub fn local_reduce<T: Primitive>(samples: &[T], centroids: &[T], assignments: &mut [usize]) -> ClusterAccumulator<T> {
    debug_assert_eq!(samples.len(), assignments.len());
    let mut acc = ClusterAccumulator::new(centroids.len());
    samples.iter().cloned()
        .zip(assignments.iter_mut())
        .for_each(|(s, assignment)| {
            let (best_idx, best_dist) = nearest_centroid(s, centroids);
            *assignment = best_idx;
            acc.sse += best_dist;
            acc.sums[best_idx] += s;
            acc.counts[best_idx] += 1;
        });
    acc
}
