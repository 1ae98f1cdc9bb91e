//! Speedup measurements of the shared-memory models.
//!
//! For every `(N, K)` pair of the sweep a [`generate::clustered`] dataset is drawn, a single-threaded
//! fork/join run serves as baseline, and every schedule is timed once per thread count. A run counts
//! as correct when its SSE is within 1% of the baseline's and it produced the same amount of centroids.

use crate::{generate, KMeans, KMeansConfig, KMeansError, KMeansState, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Largest relative SSE deviation from the baseline that still counts as correct.
pub const SSE_TOLERANCE: f64 = 0.01;

/// Shared-memory execution model being measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Schedule {
    ForkJoin,
    Spmd,
}
impl Schedule {
    pub const ALL: [Schedule; 2] = [Schedule::ForkJoin, Schedule::Spmd];

    pub fn name(self) -> &'static str {
        match self {
            Schedule::ForkJoin => "fork-join",
            Schedule::Spmd => "spmd",
        }
    }

    pub fn run(self, kmean: &KMeans<f64>, initial_centroids: &[f64], config: &KMeansConfig<'_, f64>) -> Result<KMeansState<f64>> {
        match self {
            Schedule::ForkJoin => kmean.kmeans_parallel(initial_centroids, config),
            Schedule::Spmd => kmean.kmeans_spmd(initial_centroids, config),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BenchConfig {
    /// `(samples, centroids)` pairs
    pub sizes: Vec<(usize, usize)>,
    pub threads: Vec<usize>,
    pub schedules: Vec<Schedule>,
    pub max_iter: usize,
    pub eps: f64,
    pub seed: Option<u64>,
}
impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            sizes: vec![(10_000, 4), (1_000_000, 16), (10_000_000, 32)],
            threads: vec![1, 2, 4, 8, 16, 32],
            schedules: Schedule::ALL.to_vec(),
            max_iter: 50,
            eps: 1e-4,
            seed: None,
        }
    }
}

/// One timed run. The baseline row has `schedule == None`.
#[derive(Clone, Debug)]
pub struct BenchRow {
    pub sample_cnt: usize,
    pub k: usize,
    pub schedule: Option<Schedule>,
    pub threads: usize,
    pub seconds: f64,
    pub iterations: usize,
    pub sse: f64,
    pub speedup: f64,
    pub efficiency: f64,
    pub sse_rel_diff: f64,
    pub sse_ok: bool,
    pub k_ok: bool,
}
impl BenchRow {
    pub const CSV_HEADER: &'static str = "N,K,schedule,threads,seconds,iterations,sse,speedup,efficiency,sse_rel_diff,sse_ok,k_ok";

    pub fn is_correct(&self) -> bool { self.sse_ok && self.k_ok }

    pub fn to_csv(&self) -> String {
        format!("{},{},{},{},{:.6},{},{:.6},{:.4},{:.4},{:.3e},{},{}",
            self.sample_cnt, self.k, self.schedule.map_or("baseline", Schedule::name), self.threads,
            self.seconds, self.iterations, self.sse, self.speedup, self.efficiency, self.sse_rel_diff,
            self.sse_ok, self.k_ok)
    }
}

fn relative_diff(reference: f64, value: f64) -> f64 {
    let diff = (reference - value).abs();
    if reference != 0.0 { diff / reference.abs() } else { diff }
}

fn timed(schedule: Schedule, kmean: &KMeans<f64>, initial_centroids: &[f64], config: &KMeansConfig<'_, f64>) -> Result<(KMeansState<f64>, f64)> {
    let started = Instant::now();
    let state = schedule.run(kmean, initial_centroids, config)?;
    Ok((state, started.elapsed().as_secs_f64()))
}

/// Run the whole sweep. `report` sees every row as soon as it was measured.
pub fn run(config: &BenchConfig, mut report: impl FnMut(&BenchRow) -> Result<()>) -> Result<Vec<BenchRow>> {
    let mut rnd = generate::rng_from_seed(config.seed);
    let mut rows = Vec::new();

    for &(sample_cnt, k) in &config.sizes {
        info!(samples = sample_cnt, k, "generating dataset");
        let data: generate::Dataset<f64> = generate::clustered(&mut rnd, sample_cnt, k);
        let kmean = KMeans::new(data.samples);
        let build = |threads: usize| KMeansConfig::build()
            .threads(threads)
            .max_iter(config.max_iter)
            .convergence_threshold(config.eps)
            .build();

        let (base, base_seconds) = timed(Schedule::ForkJoin, &kmean, &data.initial_centroids, &build(1))?;
        let baseline = BenchRow {
            sample_cnt, k, schedule: None, threads: 1,
            seconds: base_seconds, iterations: base.iterations, sse: base.sse,
            speedup: 1.0, efficiency: 1.0, sse_rel_diff: 0.0, sse_ok: true, k_ok: true,
        };
        report(&baseline)?;
        rows.push(baseline);

        for &schedule in &config.schedules {
            for &threads in &config.threads {
                let (state, seconds) = timed(schedule, &kmean, &data.initial_centroids, &build(threads))?;
                let speedup = if seconds > 0.0 { base_seconds / seconds } else { 0.0 };
                let sse_rel_diff = relative_diff(base.sse, state.sse);
                let row = BenchRow {
                    sample_cnt, k, schedule: Some(schedule), threads, seconds,
                    iterations: state.iterations, sse: state.sse,
                    speedup, efficiency: speedup / threads.max(1) as f64,
                    sse_rel_diff, sse_ok: sse_rel_diff <= SSE_TOLERANCE,
                    k_ok: state.centroids.len() == base.centroids.len(),
                };
                info!(schedule = schedule.name(), threads, seconds, speedup = row.speedup, correct = row.is_correct(), "run measured");
                report(&row)?;
                rows.push(row);
            }
        }
    }
    Ok(rows)
}

/// CSV file receiving one line per [`BenchRow`], flushed after every row.
pub struct CsvReport {
    path: PathBuf,
    out: BufWriter<File>,
}
impl CsvReport {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|source| KMeansError::OutputUnwritable { path: path.clone(), source })?;
        let mut report = Self { path, out: BufWriter::new(file) };
        report.write_line(BenchRow::CSV_HEADER)?;
        Ok(report)
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.out, "{}", line)
            .and_then(|_| self.out.flush())
            .map_err(|source| KMeansError::OutputUnwritable { path: self.path.clone(), source })
    }

    pub fn write(&mut self, row: &BenchRow) -> Result<()> {
        self.write_line(&row.to_csv())
    }
}
