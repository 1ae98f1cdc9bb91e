use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while loading inputs, writing results, or talking to other workers.
///
/// Empty clusters and non-divisible partitions are handled inside the algorithm and have no variant here.
#[derive(Error, Debug)]
pub enum KMeansError {
    #[error("input file not found: {}", path.display())]
    InputFileNotFound { path: PathBuf },

    #[error("could not read {}: {source}", path.display())]
    InputUnreadable { path: PathBuf, #[source] source: std::io::Error },

    #[error("{}:{line}: not a finite number: {token:?}", path.display())]
    MalformedValue { path: PathBuf, line: usize, token: String },

    #[error("{} contains no values", path.display())]
    EmptyInput { path: PathBuf },

    #[error("at least one initial centroid is required")]
    NoCentroids,

    #[error("could not write {}: {source}", path.display())]
    OutputUnwritable { path: PathBuf, #[source] source: std::io::Error },

    #[error("communication with worker {peer} failed: {source}")]
    Communication { peer: usize, #[source] source: std::io::Error },

    #[error("message from worker {peer} could not be decoded: {reason}")]
    Codec { peer: usize, reason: String },

    #[error("could not build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("collective operation misused: {0}")]
    Collective(String),

    #[error("worker launch failed: {0}")]
    Launch(String),

    #[error("coordinating worker aborted before the computation started")]
    RootAborted,
}

pub type Result<T> = std::result::Result<T, KMeansError>;
