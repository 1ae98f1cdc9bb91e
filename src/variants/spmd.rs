use crate::{KMeans, KMeansState, KMeansConfig, Result, memory::*, partition, controller::IterationController, reduce::*};
use parking_lot::{Mutex, RwLock};
use std::sync::Barrier;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{info, trace};

/// f64 accumulator supporting lock-free concurrent adds.
struct AtomicSse(AtomicU64);
impl AtomicSse {
	fn new() -> Self { Self(AtomicU64::new(0f64.to_bits())) }

	fn add(&self, value: f64) {
		let mut current = self.0.load(Ordering::Relaxed);
		loop {
			let next = (f64::from_bits(current) + value).to_bits();
			match self.0.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed) {
				Ok(_) => return,
				Err(actual) => current = actual,
			}
		}
	}

	/// Read the accumulated value and reset to zero.
	fn take(&self) -> f64 {
		f64::from_bits(self.0.swap(0f64.to_bits(), Ordering::AcqRel))
	}
}

/// State shared by all threads of one calculation.
struct Shared<T: Primitive> {
	barrier: Barrier,
	/// Written by unit 0 only, between the second and third barrier
	centroids: RwLock<Vec<T>>,
	/// Per-cluster part of the global accumulator (its `sse` is filled from [`Shared::sse`])
	totals: Mutex<ClusterAccumulator<T>>,
	sse: AtomicSse,
	/// Written by unit 0 before the second barrier, read by all units after it
	converged: AtomicBool,
	/// Iteration limit reached. Written by unit 0 before the third barrier, read only at the loop head
	exhausted: AtomicBool,
}

pub(crate) struct Spmd<T> where T: Primitive {
	_p: std::marker::PhantomData<T>
}
impl<T> Spmd<T> where T: Primitive {
	/// Loop body executed by every thread. Unit 0 additionally owns the [`IterationController`].
	fn run_unit<'c, 'a>(unit: usize, shared: &Shared<T>, samples: &[T], assignments: &mut [usize], mut leader: Option<IterationController<'c, 'a, T>>)
			-> Option<IterationController<'c, 'a, T>> {
		while !shared.exhausted.load(Ordering::Acquire) {
			// Assignment + local accumulation, no coordination
			let local = {
				let centroids = shared.centroids.read();
				local_reduce(samples, &centroids, assignments)
			};
			shared.sse.add(local.sse.to_wire());
			shared.totals.lock().merge_clusters(&local);
			trace!(unit, processed = local.total_count(), "partition merged");
			shared.barrier.wait();

			if let Some(controller) = leader.as_mut() {
				let mut totals = shared.totals.lock();
				totals.sse = T::from_wire(shared.sse.take());
				let proceed = controller.decide(&totals, &shared.centroids.read());
				shared.converged.store(!proceed, Ordering::Release);
			}
			shared.barrier.wait();
			if shared.converged.load(Ordering::Acquire) {
				break;
			}

			if let Some(controller) = leader.as_ref() {
				let mut totals = shared.totals.lock();
				controller.update(&totals, &mut shared.centroids.write());
				totals.reset();
				shared.exhausted.store(!controller.should_run(), Ordering::Release);
			}
			shared.barrier.wait();
		}
		leader
	}

	#[inline(always)] pub fn calculate(data: &KMeans<T>, initial_centroids: &[T], config: &KMeansConfig<'_, T>) -> Result<KMeansState<T>> {
		KMeans::check_centroids(initial_centroids)?;
		let (threads, k) = (config.threads(), initial_centroids.len());
		let partitions = partition::balanced(data.sample_cnt(), threads);
		info!(threads, samples = data.sample_cnt(), k, "starting spmd k-means");

		let controller = IterationController::new(config, k, true);
		let shared = Shared {
			barrier: Barrier::new(threads),
			centroids: RwLock::new(initial_centroids.to_vec()),
			totals: Mutex::new(ClusterAccumulator::new(k)),
			sse: AtomicSse::new(),
			converged: AtomicBool::new(false),
			exhausted: AtomicBool::new(!controller.should_run()),
		};
		let mut assignments = vec![0usize; data.sample_cnt()];

		let controller = std::thread::scope(|s| {
			let mut handles = Vec::with_capacity(threads);
			let mut rest = assignments.as_mut_slice();
			let mut leader = Some(controller);
			for (unit, range) in partitions.iter().cloned().enumerate() {
				let (chunk, tail) = std::mem::take(&mut rest).split_at_mut(range.len());
				rest = tail;
				let (shared, samples, unit_leader) = (&shared, &data.samples[range], leader.take());
				handles.push(s.spawn(move || Self::run_unit(unit, shared, samples, chunk, unit_leader)));
			}
			let mut controller = None;
			for handle in handles {
				if let Some(c) = handle.join().unwrap_or_else(|e| std::panic::resume_unwind(e)) {
					controller = Some(c);
				}
			}
			controller
		});

		// Unit 0 always exists and always hands its controller back.
		let controller = controller.unwrap_or_else(|| IterationController::new(config, k, false));
		let state = controller.finish(shared.centroids.into_inner(), assignments);
		info!(iterations = state.iterations, sse = %state.sse, converged = state.converged, "spmd k-means finished");
		Ok(state)
	}
}
