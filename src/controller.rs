use crate::{memory::*, ConvergenceMonitor, KMeansConfig, KMeansState, reduce::ClusterAccumulator};
use tracing::debug;

/// Iteration state of one calculation: owns the convergence monitor and decides, after every
/// reduction, whether another assign/reduce/update round follows.
///
/// The execution models drive it in the same order every iteration:
/// [`IterationController::decide`] on the fully reduced totals, then (only if that returned
/// **true**) [`IterationController::update`] to move the centroids.
pub(crate) struct IterationController<'c, 'a, T: Primitive> {
    config: &'c KMeansConfig<'a, T>,
    monitor: ConvergenceMonitor<T>,
    centroid_frequency: Vec<usize>,
    /// Whether this controller reports progress through the config's callback
    notify: bool,
}
impl<'c, 'a, T: Primitive> IterationController<'c, 'a, T> {
    pub fn new(config: &'c KMeansConfig<'a, T>, k: usize, notify: bool) -> Self {
        Self {
            config,
            monitor: ConvergenceMonitor::new(config.convergence_threshold),
            centroid_frequency: vec![0; k],
            notify,
        }
    }

    /// Whether another iteration has to run: not yet converged and below the iteration limit.
    pub fn should_run(&self) -> bool {
        !self.monitor.converged() && self.monitor.iteration() < self.config.max_iter
    }

    /// Convergence decision for the iteration whose reduction produced `totals`.
    /// `centroids` are the positions this iteration assigned against.
    pub fn decide(&mut self, totals: &ClusterAccumulator<T>, centroids: &[T]) -> bool {
        let iteration_nr = self.monitor.iteration() + 1;
        let proceed = self.monitor.next(totals.sse);
        self.centroid_frequency.copy_from_slice(&totals.counts);
        debug!(iteration = iteration_nr, sse = %totals.sse, processed = totals.total_count(), converged = !proceed, "iteration reduced");
        if self.notify {
            (self.config.iteration_done)(iteration_nr, totals.sse, centroids);
        }
        proceed
    }

    /// Move every non-empty cluster to the mean of its samples.
    pub fn update(&self, totals: &ClusterAccumulator<T>, centroids: &mut [T]) {
        let empty = totals.update_centroids(centroids);
        if empty > 0 {
            debug!(iteration = self.monitor.iteration(), empty, "clusters without samples keep their position");
        }
    }

    pub fn finish(self, centroids: Vec<T>, assignments: Vec<usize>) -> KMeansState<T> {
        KMeansState {
            k: centroids.len(),
            sse: self.monitor.sse(),
            iterations: self.monitor.iteration(),
            converged: self.monitor.converged(),
            centroids,
            centroid_frequency: self.centroid_frequency,
            assignments,
        }
    }
}
