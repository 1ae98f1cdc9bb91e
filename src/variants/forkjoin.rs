use crate::{KMeans, KMeansState, KMeansConfig, Result, memory::*, partition, controller::IterationController, reduce::*};
use rayon::prelude::*;
use std::ops::Range;
use tracing::info;

pub(crate) struct ForkJoin<T> where T: Primitive {
	_p: std::marker::PhantomData<T>
}
impl<T> ForkJoin<T> where T: Primitive {
    /// One parallel assignment pass. Every partition is scanned by one rayon task into its own
    /// accumulator; the join hands all of them back, and they are folded in partition order.
    pub(crate) fn assign_and_reduce(samples: &[T], partitions: &[Range<usize>], centroids: &[T], assignments: &mut [usize]) -> ClusterAccumulator<T> {
        let mut work = Vec::with_capacity(partitions.len());
        let mut rest = assignments;
        for range in partitions.iter().cloned() {
            let (chunk, tail) = std::mem::take(&mut rest).split_at_mut(range.len());
            work.push((range, chunk));
            rest = tail;
        }

        let partials: Vec<ClusterAccumulator<T>> = work.into_par_iter()
            .map(|(range, chunk)| local_reduce(&samples[range], centroids, chunk))
            .collect();

        let mut totals = ClusterAccumulator::new(centroids.len());
        partials.iter().for_each(|p| totals.merge(p));
        totals
    }

    #[inline(always)] pub fn calculate(data: &KMeans<T>, initial_centroids: &[T], config: &KMeansConfig<'_, T>) -> Result<KMeansState<T>> {
        KMeans::check_centroids(initial_centroids)?;
        let threads = config.threads();
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
        let partitions = partition::balanced(data.sample_cnt(), threads);
        info!(threads, samples = data.sample_cnt(), k = initial_centroids.len(), "starting fork/join k-means");

        let mut centroids = initial_centroids.to_vec();
        let mut assignments = vec![0usize; data.sample_cnt()];
        let mut controller = IterationController::new(config, centroids.len(), true);

        while controller.should_run() {
            let totals = pool.install(|| Self::assign_and_reduce(&data.samples, &partitions, &centroids, &mut assignments));
            debug_assert_eq!(totals.total_count(), data.sample_cnt());
            if controller.decide(&totals, &centroids) {
                controller.update(&totals, &mut centroids);
            }
        }

        let state = controller.finish(centroids, assignments);
        info!(iterations = state.iterations, sse = %state.sse, converged = state.converged, "fork/join k-means finished");
        Ok(state)
    }
}
