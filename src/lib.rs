//! # kmeans1d - API documentation
//!
//! kmeans1d is a small rust library for the calculation of k-means-clustering on one-dimensional data,
//! parallelized either over threads sharing memory or over workers exchanging messages.
//!
//! ## Design target
//! Its main target is throughput on large sample vectors, you will therefore find most of its API-surface
//! rather plain: samples are given as a raw vector of scalars, and initial centroids are always supplied
//! by the caller.
//!
//! ## Supported execution models
//! Every model runs the same Lloyd iteration: assign each sample to its nearest centroid, reduce the
//! per-cluster sums, counts and SSE of all partitions into global totals, check convergence, move the
//! centroids. They only differ in how partitions are executed and how the totals are combined.
//! For the list, have a look at the documentation of [`KMeans`].
//!
//! ## Supported primitive types
//! - [`f32`]
//! - [`f64`]
//!
//! ## Example
//! ```rust
//! use kmeans1d::*;
//!
//! fn main() {
//!     // Two obvious groups
//!     let samples = vec![1.0f64, 2.0, 3.0, 10.0, 11.0, 12.0];
//!     let kmean = KMeans::new(samples);
//!
//!     let result = kmean.kmeans_parallel(&[0.0, 5.0], &KMeansConfig::default()).unwrap();
//!
//!     println!("Centroids: {:?}", result.centroids);
//!     println!("Cluster-Assignments: {:?}", result.assignments);
//!     println!("Error: {}", result.sse);
//! }
//! ```
//!
//! ## Example (using the status event callback)
//! ```rust
//! use kmeans1d::*;
//!
//! fn main() {
//!     let mut rnd = generate::rng_from_seed(Some(42));
//!     let data: generate::Dataset<f64> = generate::clustered(&mut rnd, 20000, 8);
//!
//!     let conf = KMeansConfig::build()
//!         .threads(4)
//!         .iteration_done(&|nr, sse, _centroids| println!("Iteration {} - Error: {:.2}", nr, sse))
//!         .build();
//!
//!     let kmean = KMeans::new(data.samples);
//!     let result = kmean.kmeans_spmd(&data.initial_centroids, &conf).unwrap();
//!     println!("Converged: {} after {} iterations", result.converged, result.iterations);
//! }
//! ```
//!
//! ## Example (distributed, with in-process workers)
//! ```rust
//! use kmeans1d::*;
//! use kmeans1d::comm::{Communicator, LocalCommunicator};
//!
//! let group = LocalCommunicator::new_group(3);
//! let conf = &KMeansConfig::default();
//! let results: Vec<_> = std::thread::scope(|s| {
//!     let handles: Vec<_> = group.iter().map(|comm| s.spawn(move || {
//!         let input = comm.is_root().then(|| Ok((vec![1.0f64, 2.0, 3.0, 10.0, 11.0, 12.0], vec![0.0, 5.0])));
//!         KMeans::kmeans_distributed(comm, input, conf).unwrap()
//!     })).collect();
//!     handles.into_iter().map(|h| h.join().unwrap()).collect()
//! });
//! assert_eq!(results[0].as_ref().unwrap().centroids, vec![2.0, 11.0]);
//! ```
//!
//! ## Short API-Overview / Description
//! Entry-point of the library is the [`KMeans`] struct. This struct is generic over the underlying primitive
//! type, that should be used for the calculations. To use KMeans, an instance of this struct is created, taking
//! over the sample data into its ownership.
//!
//! The [`KMeans`] struct's instance-methods represent the shared-memory execution models. Calling such a
//! method does not mutate it, so multiple runs can be done in parallel. The distributed model is a static
//! method, because only the coordinating worker owns the samples; the other workers receive their share
//! through a [`comm::Communicator`]. Internally, an instance of [`KMeansState`] is filled while iterating,
//! and finally returned as result.
//!
//! The [`io`] module reads and writes the plain-text files used by the command line tool, the [`generate`]
//! module produces synthetic inputs and [`bench`] measures the speedup of the shared-memory models on them.

#[macro_use] mod helpers;
mod memory;
mod api;
mod variants;
mod controller;
mod convergence;
mod partition;
mod reduce;
mod error;
pub mod comm;
pub mod io;
pub mod generate;
pub mod bench;

pub use api::{KMeansState, KMeansConfig, KMeansConfigBuilder, KMeans};
pub use convergence::{ConvergenceMonitor, Phase};
pub use error::{KMeansError, Result};
pub use memory::Primitive;
pub use partition::{balanced, even_split, RemainderPolicy};
pub use reduce::{local_reduce, ClusterAccumulator};
