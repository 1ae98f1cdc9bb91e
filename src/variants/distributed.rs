use crate::{KMeans, KMeansError, KMeansState, KMeansConfig, Result, memory::*, partition, controller::IterationController, reduce::*};
use crate::comm::{self, Communicator, Reducible};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use tracing::{info, warn};

/// First message of every run: lets the workers size their buffers, or tells them to give up.
#[derive(Serialize, Deserialize, Debug, Default)]
struct RunHeader {
    aborted: bool,
    sample_cnt: u64,
    k: u64,
}

#[derive(Serialize, Deserialize, Debug)]
struct SseTotal(f64);
impl Reducible for SseTotal {
    fn combine(&mut self, other: Self) { self.0 += other.0; }
}

#[derive(Serialize, Deserialize, Debug)]
struct ClusterTotals {
    sums: Vec<f64>,
    counts: Vec<u64>,
}
impl ClusterTotals {
    fn of<T: Primitive>(acc: &ClusterAccumulator<T>) -> Self {
        Self {
            sums: acc.sums.iter().map(|s| s.to_wire()).collect(),
            counts: acc.counts.iter().map(|&c| c as u64).collect(),
        }
    }
}
impl Reducible for ClusterTotals {
    fn combine(&mut self, other: Self) {
        self.sums.iter_mut().zip(other.sums).for_each(|(s, o)| *s += o);
        self.counts.iter_mut().zip(other.counts).for_each(|(c, o)| *c += o);
    }
}

pub(crate) struct Distributed<T> where T: Primitive {
    _p: PhantomData<T>
}
impl<T> Distributed<T> where T: Primitive {
    /// Validate the root's inputs and broadcast the run header. Returns the inputs on the root,
    /// an empty pair elsewhere, plus the agreed sample count.
    fn agree_on_run<C>(comm: &C, root_input: Option<Result<(Vec<T>, Vec<T>)>>) -> Result<(Vec<T>, Vec<T>, usize)>
            where C: Communicator + ?Sized {
        let mut header = RunHeader::default();
        let mut root_failure = None;
        let mut inputs = (Vec::new(), Vec::new());

        if comm.is_root() {
            let loaded = root_input
                .unwrap_or_else(|| Err(KMeansError::Collective("rank 0 was started without inputs".into())))
                .and_then(|(samples, centroids)| KMeans::<T>::check_centroids(&centroids).map(|_| (samples, centroids)));
            match loaded {
                Ok((samples, centroids)) => {
                    header.sample_cnt = samples.len() as u64;
                    header.k = centroids.len() as u64;
                    inputs = (samples, centroids);
                },
                Err(e) => {
                    header.aborted = true;
                    root_failure = Some(e);
                }
            }
        }

        comm::broadcast(comm, &mut header)?;
        if header.aborted {
            return Err(root_failure.unwrap_or(KMeansError::RootAborted));
        }
        Ok((inputs.0, inputs.1, header.sample_cnt as usize))
    }

    pub fn calculate<C>(comm: &C, root_input: Option<Result<(Vec<T>, Vec<T>)>>, config: &KMeansConfig<'_, T>) -> Result<Option<KMeansState<T>>>
            where C: Communicator + ?Sized {
        let (rank, workers) = (comm.rank(), comm.world_size());
        let (samples, centroids, sample_cnt) = Self::agree_on_run(comm, root_input)?;

        let mut centroids: Vec<f64> = centroids.iter().map(|c| c.to_wire()).collect();
        comm::broadcast(comm, &mut centroids)?;
        let mut centroids: Vec<T> = centroids.into_iter().map(T::from_wire).collect();
        let k = centroids.len();

        let shares = partition::even_split(sample_cnt, workers, config.remainder());
        let processed = partition::covered(&shares);
        let parts = comm.is_root().then(|| {
            if processed < sample_cnt {
                warn!(samples = sample_cnt, workers, dropped = sample_cnt - processed, "sample count not divisible by worker count, trailing samples are not processed");
            }
            info!(workers, samples = sample_cnt, k, "starting distributed k-means");
            shares.iter().map(|r| samples[r.clone()].iter().map(|s| s.to_wire()).collect::<Vec<f64>>()).collect()
        });
        let local: Vec<T> = comm::scatter(comm, parts)?.into_iter().map(T::from_wire).collect();
        drop(samples);

        let mut assignments = vec![0usize; local.len()];
        let mut controller = IterationController::new(config, k, comm.is_root());
        while controller.should_run() {
            let partial = local_reduce(&local, &centroids, &mut assignments);
            // Every worker receives bit-identical totals and therefore takes the same decision.
            let sse = comm::all_reduce(comm, SseTotal(partial.sse.to_wire()))?;
            let clusters = comm::all_reduce(comm, ClusterTotals::of(&partial))?;
            let totals = ClusterAccumulator {
                sse: T::from_wire(sse.0),
                sums: clusters.sums.into_iter().map(T::from_wire).collect(),
                counts: clusters.counts.into_iter().map(|c| c as usize).collect(),
            };
            debug_assert_eq!(totals.total_count(), processed, "rank {} saw a partial reduction", rank);
            if controller.decide(&totals, &centroids) {
                controller.update(&totals, &mut centroids);
            }
        }

        let local_assignments: Vec<u64> = assignments.iter().map(|&a| a as u64).collect();
        let Some(all) = comm::gather(comm, local_assignments)? else {
            return Ok(None);
        };
        let assignments = all.into_iter().flatten().map(|a| a as usize).collect();
        let state = controller.finish(centroids, assignments);
        info!(iterations = state.iterations, sse = %state.sse, converged = state.converged, "distributed k-means finished");
        Ok(Some(state))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::LocalCommunicator;
    use crate::helpers::testing::*;
    use crate::partition::RemainderPolicy;
    use rand::prelude::*;

    /// Run one calculation on a group of in-process workers, returning every worker's outcome by rank.
    fn run_workers(workers: usize, input: impl Fn() -> Result<(Vec<f64>, Vec<f64>)> + Sync, config: &KMeansConfig<'_, f64>)
            -> Vec<Result<Option<KMeansState<f64>>>> {
        let group = LocalCommunicator::new_group(workers);
        std::thread::scope(|s| {
            let handles: Vec<_> = group.iter().map(|comm| {
                let input = &input;
                s.spawn(move || {
                    let root_input = comm.is_root().then(input);
                    KMeans::kmeans_distributed(comm, root_input, config)
                })
            }).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    #[test]
    fn separated_groups() {
        let conf = KMeansConfig::build().max_iter(10).build();
        let mut results = run_workers(2, || Ok((vec![1.0, 2.0, 3.0, 10.0, 11.0, 12.0], vec![0.0, 5.0])), &conf);
        assert!(results[1].as_ref().unwrap().is_none());

        let res = results.remove(0).unwrap().unwrap();
        assert_eq!(res.centroids, vec![2.0, 11.0]);
        assert_eq!(res.assignments, vec![0, 0, 0, 1, 1, 1]);
        assert_eq!(res.sse, 4.0);
        assert_eq!(res.iterations, 3);
        assert!(res.converged);
    }

    #[test]
    fn matches_fork_join() {
        let mut rnd = StdRng::seed_from_u64(4711);
        let samples: Vec<f64> = (0..4096).map(|i| (i % 3) as f64 * 40.0 + rnd.gen_range(-6.0..6.0)).collect();
        let initial = vec![-5.0, 33.0, 101.0];

        for workers in [1, 2, 4, 8] {
            let conf = KMeansConfig::build().threads(workers).build();
            let should = KMeans::new(samples.clone()).kmeans_parallel(&initial, &conf).unwrap();
            let actual = run_workers(workers, || Ok((samples.clone(), initial.clone())), &conf)
                .remove(0).unwrap().unwrap();
            assert_kmeans_result_eq(&should, &actual);
        }
    }

    #[test]
    fn identical_runs_are_bitwise_equal() {
        let mut rnd = StdRng::seed_from_u64(99);
        let samples: Vec<f64> = (0..3000).map(|_| rnd.gen_range(0.0..1e6)).collect();
        let conf = KMeansConfig::build().build();
        let run = || run_workers(6, || Ok((samples.clone(), vec![1.0, 2.0, 3.0, 4.0])), &conf).remove(0).unwrap().unwrap();
        let (a, b) = (run(), run());
        assert_eq!(a.sse.to_bits(), b.sse.to_bits());
        assert_eq!(a.centroids, b.centroids);
        assert_eq!(a.assignments, b.assignments);
    }

    #[test]
    fn iteration_limit_with_several_workers() {
        let mut rnd = StdRng::seed_from_u64(3);
        let samples: Vec<f64> = (0..1000).map(|_| rnd.gen_range(0.0..1000.0)).collect();
        let initial = vec![0.0, 1.0, 2.0, 3.0];

        for workers in [2, 4, 8] {
            let conf = KMeansConfig::build().threads(workers).max_iter(3).convergence_threshold(1e-12).build();
            let should = KMeans::new(samples.clone()).kmeans_parallel(&initial, &conf).unwrap();
            let res = run_workers(workers, || Ok((samples.clone(), initial.clone())), &conf).remove(0).unwrap().unwrap();
            assert_eq!(res.iterations, 3);
            assert!(!res.converged);
            assert_kmeans_result_eq(&should, &res);
        }
    }

    #[test]
    fn remainder_is_dropped() {
        let samples: Vec<f64> = (0..10).map(f64::from).collect();
        let conf = KMeansConfig::build().build();
        let res = run_workers(3, || Ok((samples.clone(), vec![0.0, 9.0])), &conf).remove(0).unwrap().unwrap();

        assert_eq!(res.assignments.len(), 9);
        assert_eq!(res.centroid_frequency.iter().sum::<usize>(), 9);
    }

    #[test]
    fn remainder_assigned_to_last_worker() {
        let samples: Vec<f64> = (0..10).map(f64::from).collect();
        let conf = KMeansConfig::build().threads(3).remainder(RemainderPolicy::AssignToLast).build();
        let res = run_workers(3, || Ok((samples.clone(), vec![0.0, 9.0])), &conf).remove(0).unwrap().unwrap();
        let should = KMeans::new(samples.clone()).kmeans_parallel(&[0.0, 9.0], &conf).unwrap();

        assert_eq!(res.assignments.len(), 10);
        assert_kmeans_result_eq(&should, &res);
    }

    #[test]
    fn root_failure_reaches_all_workers() {
        let conf = KMeansConfig::build().build();
        let results = run_workers(4, || Err(KMeansError::InputFileNotFound { path: "missing.txt".into() }), &conf);

        assert!(matches!(results[0], Err(KMeansError::InputFileNotFound { .. })));
        for res in &results[1..] {
            assert!(matches!(res, Err(KMeansError::RootAborted)));
        }
    }

    #[test]
    fn missing_centroids_abort() {
        let conf = KMeansConfig::build().build();
        let results = run_workers(2, || Ok((vec![1.0, 2.0], vec![])), &conf);
        assert!(matches!(results[0], Err(KMeansError::NoCentroids)));
        assert!(matches!(results[1], Err(KMeansError::RootAborted)));
    }

    #[test]
    fn empty_cluster_keeps_position() {
        let conf = KMeansConfig::build().build();
        let res = run_workers(2, || Ok((vec![1.0, 2.0, 3.0, 4.0], vec![2.0, 1e6])), &conf).remove(0).unwrap().unwrap();
        assert_eq!(res.centroids, vec![2.5, 1e6]);
        assert_eq!(res.centroid_frequency, vec![4, 0]);
    }
}
