use crate::{memory::*, partition::RemainderPolicy, comm::Communicator, KMeansError, Result};

pub type IterationDoneCallbackFn<'a, T> = &'a (dyn Fn(usize, T, &[T]) + Sync);

/// This is a structure holding the configuration options for a k-means calculation, such as
/// the iteration limit, the convergence threshold or the amount of execution units to use.
///
/// For a more detailed information about all possible options, have a look at [`KMeansConfigBuilder`].
pub struct KMeansConfig<'a, T: Primitive> {
    /// Callback that is called after the reduction of each iteration, by exactly one execution unit
    /// ## Arguments
    /// - **iteration_nr**: Number of the iteration (starting with 1)
    /// - **sse**: Global sum of squared errors of this iteration's assignment
    /// - **centroids**: Centroids the assignment was computed against
    pub(crate) iteration_done: IterationDoneCallbackFn<'a, T>,
    /// Upper limit for the amount of iterations
    pub(crate) max_iter: usize,
    /// Relative SSE change below which the calculation is considered converged
    pub(crate) convergence_threshold: T,
    /// Amount of threads for the shared-memory variants (`None` = rayon's current thread count)
    pub(crate) threads: Option<usize>,
    /// Handling of samples not filling a whole share in the distributed variant
    pub(crate) remainder: RemainderPolicy,
}
impl<'a, T: Primitive> Default for KMeansConfig<'a, T> {
    fn default() -> Self {
        Self {
            iteration_done: &|_, _, _| {},
            max_iter: 50,
            convergence_threshold: T::from(1e-4).unwrap_or_else(T::epsilon),
            threads: None,
            remainder: RemainderPolicy::Drop,
        }
    }
}
impl<'a, T: Primitive> KMeansConfig<'a, T> {
    /// Use the [`KMeansConfigBuilder`] to build a [`KMeansConfig`] instance.
    pub fn build() -> KMeansConfigBuilder<'a, T> {
        KMeansConfigBuilder { config: KMeansConfig::default() }
    }

    pub fn max_iter(&self) -> usize { self.max_iter }
    pub fn convergence_threshold(&self) -> T { self.convergence_threshold }
    pub fn remainder(&self) -> RemainderPolicy { self.remainder }

    /// Amount of execution units the shared-memory variants will use.
    pub fn threads(&self) -> usize {
        self.threads.unwrap_or_else(rayon::current_num_threads).max(1)
    }
}
impl<'a, T: Primitive> std::fmt::Debug for KMeansConfig<'a, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KMeansConfig")
            .field("max_iter", &self.max_iter)
            .field("convergence_threshold", &self.convergence_threshold)
            .field("threads", &self.threads)
            .field("remainder", &self.remainder)
            .finish()
    }
}

pub struct KMeansConfigBuilder<'a, T: Primitive> {
    config: KMeansConfig<'a, T>
}
impl<'a, T: Primitive> KMeansConfigBuilder<'a, T> {
    /// Set the callback that should be called after each iteration during a running k-means calculation.
    pub fn iteration_done(mut self, iteration_done: IterationDoneCallbackFn<'a, T>) -> Self {
        self.config.iteration_done = iteration_done; self
    }
    /// Limit the maximum amount of iterations.
    /// ## Default
    /// `50`
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.config.max_iter = max_iter; self
    }
    /// Set the relative SSE change below which the calculation stops. For more information,
    /// see documentation of [`crate::ConvergenceMonitor`].
    /// ## Default
    /// `1e-4`
    pub fn convergence_threshold(mut self, threshold: T) -> Self {
        self.config.convergence_threshold = threshold; self
    }
    /// Set the amount of threads the shared-memory variants use. The thread pool (or thread set)
    /// is created once per calculation.
    pub fn threads(mut self, threads: usize) -> Self {
        self.config.threads = Some(threads.max(1)); self
    }
    /// Set how the distributed variant treats samples that do not fill a whole share.
    /// ## Default
    /// [`RemainderPolicy::Drop`]
    pub fn remainder(mut self, remainder: RemainderPolicy) -> Self {
        self.config.remainder = remainder; self
    }
    /// Return the internally built configuration structure.
    pub fn build(self) -> KMeansConfig<'a, T> { self.config }
}


/// Final state (result) of a k-means calculation, as returned by the API.
///
/// ## Generics
/// - **T**: Underlying primitive type that was used for the calculation
///
/// ## Fields
/// - **k**: The amount of clusters (length of the initial centroid vector)
/// - **sse**: Sum of squared distances from all processed samples to their assigned centroids, as computed
///   by the last iteration
/// - **iterations**: Amount of completed iterations (the iteration that detected convergence is not counted)
/// - **converged**: Whether the calculation stopped because the SSE settled (**false** if it hit the iteration limit)
/// - **centroids**: Final cluster centers
/// - **centroid_frequency**: Amount of samples in each cluster, as of the last reduction
/// - **assignments**: Cluster id of every processed sample, in sample order
#[derive(Clone, Debug)]
pub struct KMeansState<T: Primitive> {
    pub k: usize,
    pub sse: T,
    pub iterations: usize,
    pub converged: bool,
    pub centroids: Vec<T>,
    pub centroid_frequency: Vec<usize>,
    pub assignments: Vec<usize>,
}


/// Entrypoint of this crate's API-Surface.
///
/// Create an instance of this struct, giving the samples you want to operate on. The primitive type
/// of the passed samples will be the type used internally for all calculations, as well as the result
/// as stored in the returned [`KMeansState`] structure.
///
/// ## Supported execution models
/// - Shared memory, fork/join on a rayon pool [`KMeans::kmeans_parallel`]
/// - Shared memory, barrier-synchronized threads [`KMeans::kmeans_spmd`]
/// - Message passing between workers [`KMeans::kmeans_distributed`]
pub struct KMeans<T: Primitive> {
    pub(crate) samples: Vec<T>,
}
impl<T: Primitive> KMeans<T> {
    /// Create a new instance of the [`KMeans`] structure.
    ///
    /// ## Arguments
    /// - **samples**: Vector of (1-dimensional) samples
    pub fn new(samples: Vec<T>) -> Self {
        Self { samples }
    }

    pub fn sample_cnt(&self) -> usize { self.samples.len() }
    pub fn samples(&self) -> &[T] { &self.samples }

    pub(crate) fn check_centroids(centroids: &[T]) -> Result<()> {
        if centroids.is_empty() {
            return Err(KMeansError::NoCentroids);
        }
        Ok(())
    }

    /// Shared-memory k-means. The samples are split into one balanced partition per thread; every
    /// iteration each partition is scanned on a rayon pool (created once for the calculation), and the
    /// per-partition accumulators are handed back and merged in partition order by the caller.
    ///
    /// ## Arguments
    /// - **initial_centroids**: Starting position of the clusters (its length is **k**)
    /// - **config**: [`KMeansConfig`] instance, containing several configuration options for the calculation.
    ///
    /// ## Example
    /// ```rust
    /// use kmeans1d::*;
    ///
    /// let kmean = KMeans::new(vec![1.0f64, 2.0, 3.0, 10.0, 11.0, 12.0]);
    /// let conf = KMeansConfig::build().threads(2).build();
    /// let result = kmean.kmeans_parallel(&[0.0, 5.0], &conf).unwrap();
    ///
    /// assert_eq!(result.centroids, vec![2.0, 11.0]);
    /// assert_eq!(result.assignments, vec![0, 0, 0, 1, 1, 1]);
    /// ```
    pub fn kmeans_parallel(&self, initial_centroids: &[T], config: &KMeansConfig<'_, T>) -> Result<KMeansState<T>> {
        crate::variants::ForkJoin::calculate(self, initial_centroids, config)
    }

    /// Shared-memory k-means in SPMD style: a fixed set of threads runs the same loop in lockstep,
    /// separated by three barriers per iteration. Each thread merges its accumulator into a shared
    /// one under a lock (bounded by **k**, not by the sample count) and its SSE through an atomic add.
    ///
    /// Produces the same result as [`KMeans::kmeans_parallel`], up to floating-point summation order.
    pub fn kmeans_spmd(&self, initial_centroids: &[T], config: &KMeansConfig<'_, T>) -> Result<KMeansState<T>> {
        crate::variants::Spmd::calculate(self, initial_centroids, config)
    }

    /// Distributed k-means. Must be called by every worker of the communicator's group.
    ///
    /// The coordinating worker (rank 0) passes `Some` with the outcome of loading its inputs
    /// (samples and initial centroids), every other worker passes `None`. Rank 0 scatters the
    /// samples, then all workers iterate in lockstep using collective reductions. The final
    /// assignments are gathered to rank 0, which is the only worker receiving `Some` state.
    ///
    /// A load failure on rank 0 is broadcast, so that all workers return an error.
    pub fn kmeans_distributed<C>(comm: &C, root_input: Option<Result<(Vec<T>, Vec<T>)>>, config: &KMeansConfig<'_, T>) -> Result<Option<KMeansState<T>>>
            where C: Communicator + ?Sized {
        crate::variants::Distributed::calculate(comm, root_input, config)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let conf = KMeansConfig::<f64>::default();
        assert_eq!(conf.max_iter(), 50);
        assert_eq!(conf.convergence_threshold(), 1e-4);
        assert_eq!(conf.remainder(), RemainderPolicy::Drop);
        assert!(conf.threads() >= 1);
    }

    #[test]
    fn builder_overrides() {
        let conf = KMeansConfig::<f32>::build()
            .max_iter(7)
            .convergence_threshold(1e-3)
            .threads(0)
            .remainder(RemainderPolicy::AssignToLast)
            .build();
        assert_eq!(conf.max_iter(), 7);
        assert_eq!(conf.convergence_threshold(), 1e-3);
        assert_eq!(conf.threads(), 1);
        assert_eq!(conf.remainder(), RemainderPolicy::AssignToLast);
    }

    #[test]
    fn no_centroids_is_rejected() {
        let kmean = KMeans::new(vec![1.0f64, 2.0]);
        let conf = KMeansConfig::default();
        assert!(matches!(kmean.kmeans_parallel(&[], &conf), Err(KMeansError::NoCentroids)));
        assert!(matches!(kmean.kmeans_spmd(&[], &conf), Err(KMeansError::NoCentroids)));
    }
}
