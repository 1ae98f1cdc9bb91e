//! kmeans1d command line tool
//!
//! # Commands
//!
//! - `threads`: shared-memory k-means on one machine (fork/join or SPMD schedule)
//! - `worker`: one process of a distributed run, joins its group through `KMEANS_RANK`,
//!   `KMEANS_WORLD_SIZE` and `KMEANS_ADDR`
//! - `launch`: start a distributed run of `-n` local worker processes
//! - `generate`: write synthetic sample and centroid files
//! - `bench`: speedup sweep of the shared-memory schedules, written as CSV

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use kmeans1d::comm::{Communicator, TcpCommunicator, ADDR_VAR, RANK_VAR, WORLD_SIZE_VAR};
use kmeans1d::bench::{self, BenchConfig, CsvReport};
use kmeans1d::{generate, io, KMeans, KMeansConfig, KMeansState, RemainderPolicy};
use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

const SKIP_OUTPUT: &str = "-";

/// Parallel and distributed k-means clustering of one-dimensional samples
#[derive(Parser)]
#[command(name = "kmeans1d", version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster with threads sharing memory
    Threads {
        #[command(flatten)]
        run: RunArgs,
        /// Amount of threads (default: one per core)
        #[arg(short, long)]
        threads: Option<usize>,
        #[arg(long, value_enum, default_value_t = Schedule::ForkJoin)]
        schedule: Schedule,
    },
    /// Run as one worker of a distributed calculation
    Worker {
        #[command(flatten)]
        run: RunArgs,
        #[command(flatten)]
        distribution: DistributionArgs,
    },
    /// Start a distributed calculation with local worker processes
    Launch {
        /// Amount of worker processes
        #[arg(short = 'n', long)]
        workers: usize,
        /// Address of rank 0; rank r listens on its port + r
        #[arg(long, default_value = "127.0.0.1:47000")]
        addr: SocketAddr,
        #[command(flatten)]
        run: RunArgs,
        #[command(flatten)]
        distribution: DistributionArgs,
    },
    /// Write a synthetic sample file and a matching initial centroid file
    Generate {
        #[arg(value_enum)]
        kind: Generator,
        samples_out: PathBuf,
        centroids_out: PathBuf,
        /// Amount of samples
        #[arg(short = 'n', long, default_value_t = 10_000_000)]
        samples: usize,
        /// Amount of initial centroids
        #[arg(short, long, default_value_t = 32)]
        k: usize,
        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
        /// Lower bound of the uniform generator
        #[arg(long, default_value_t = generate::UNIFORM_RANGE.0)]
        min: f64,
        /// Upper bound of the uniform generator
        #[arg(long, default_value_t = generate::UNIFORM_RANGE.1)]
        max: f64,
    },
    /// Measure speedup and efficiency of the shared-memory schedules on clustered data
    Bench {
        /// Dataset sizes as `N:K`, comma separated
        #[arg(long, value_delimiter = ',', value_parser = parse_size,
            default_values = ["10000:4", "1000000:16", "10000000:32"])]
        sizes: Vec<(usize, usize)>,
        /// Thread counts, comma separated
        #[arg(short, long, value_delimiter = ',', default_values_t = [1, 2, 4, 8, 16, 32])]
        threads: Vec<usize>,
        /// Schedules to measure (default: all)
        #[arg(long, value_enum, value_delimiter = ',')]
        schedule: Vec<Schedule>,
        #[arg(long, default_value_t = 50)]
        max_iter: usize,
        #[arg(long, default_value_t = 1e-4)]
        eps: f64,
        /// Seed for reproducible datasets
        #[arg(long)]
        seed: Option<u64>,
        /// CSV file receiving one line per run
        #[arg(short, long, default_value = "bench.csv")]
        output: PathBuf,
    },
}

fn parse_size(arg: &str) -> std::result::Result<(usize, usize), String> {
    let (n, k) = arg.split_once(':').ok_or_else(|| format!("expected N:K, got {:?}", arg))?;
    let n = n.trim().parse().map_err(|e| format!("bad sample count {:?}: {}", n, e))?;
    let k = k.trim().parse().map_err(|e| format!("bad centroid count {:?}: {}", k, e))?;
    Ok((n, k))
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Sample file, one value per line
    samples: PathBuf,
    /// Initial centroid file, one value per line
    centroids: PathBuf,
    #[arg(default_value_t = 50)]
    max_iter: usize,
    /// Relative SSE change below which the calculation stops
    #[arg(default_value_t = 1e-4)]
    eps: f64,
    /// Write one cluster id per processed sample here (`-`: skip)
    assignments_out: Option<PathBuf>,
    /// Write the final centroids here
    centroids_out: Option<PathBuf>,
}
impl RunArgs {
    fn load(&self) -> kmeans1d::Result<(Vec<f64>, Vec<f64>)> {
        Ok((io::load_samples(&self.samples)?, io::load_initial_centroids(&self.centroids)?))
    }

    /// `-` as output path means "do not write".
    fn output(path: &Option<PathBuf>) -> Option<&Path> {
        path.as_deref().filter(|p| p.as_os_str() != SKIP_OUTPUT)
    }

    fn store(&self, state: &KMeansState<f64>) -> Result<()> {
        if let Some(path) = Self::output(&self.assignments_out) {
            io::store_assignments(path, &state.assignments).context("storing assignments")?;
        }
        if let Some(path) = Self::output(&self.centroids_out) {
            io::store_centroids(path, &state.centroids).context("storing centroids")?;
        }
        Ok(())
    }

    /// Command line that reproduces these arguments for a child process.
    fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            self.samples.clone().into(), self.centroids.clone().into(),
            self.max_iter.to_string().into(), self.eps.to_string().into(),
        ];
        match (&self.assignments_out, &self.centroids_out) {
            (Some(a), Some(c)) => args.extend([a.clone().into(), c.clone().into()]),
            (Some(a), None) => args.push(a.clone().into()),
            // The centroid path is the second optional positional
            (None, Some(c)) => args.extend([OsString::from(SKIP_OUTPUT), c.clone().into()]),
            (None, None) => {},
        }
        args
    }
}

#[derive(Args, Clone)]
struct DistributionArgs {
    /// What happens with samples that do not fill a whole share
    #[arg(long, value_enum, default_value_t = Remainder::Drop)]
    remainder: Remainder,
}

#[derive(ValueEnum, Clone, Copy, PartialEq, Eq, Debug)]
enum Schedule {
    ForkJoin,
    Spmd,
}
impl From<Schedule> for bench::Schedule {
    fn from(s: Schedule) -> Self {
        match s {
            Schedule::ForkJoin => bench::Schedule::ForkJoin,
            Schedule::Spmd => bench::Schedule::Spmd,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, PartialEq, Eq)]
enum Remainder {
    Drop,
    AssignToLast,
}
impl From<Remainder> for RemainderPolicy {
    fn from(r: Remainder) -> Self {
        match r {
            Remainder::Drop => RemainderPolicy::Drop,
            Remainder::AssignToLast => RemainderPolicy::AssignToLast,
        }
    }
}
impl Remainder {
    fn as_arg(self) -> &'static str {
        match self {
            Remainder::Drop => "drop",
            Remainder::AssignToLast => "assign-to-last",
        }
    }
}

#[derive(ValueEnum, Clone, Copy)]
enum Generator {
    Uniform,
    Clustered,
}

fn print_summary(units: usize, sample_cnt: usize, state: &KMeansState<f64>, elapsed: Duration) {
    println!("units={} N={} K={} iterations={} SSE={:.6} elapsed={:.6}s",
        units, sample_cnt, state.k, state.iterations, state.sse, elapsed.as_secs_f64());
}

fn run_threads(run: &RunArgs, threads: Option<usize>, schedule: Schedule) -> Result<()> {
    let (samples, centroids) = run.load()?;
    let mut builder = KMeansConfig::build().max_iter(run.max_iter).convergence_threshold(run.eps);
    if let Some(threads) = threads {
        builder = builder.threads(threads);
    }
    let conf = builder.build();
    let kmean = KMeans::new(samples);

    let started = Instant::now();
    let state = bench::Schedule::from(schedule).run(&kmean, &centroids, &conf).context("k-means failed")?;
    let elapsed = started.elapsed();

    run.store(&state)?;
    print_summary(conf.threads(), kmean.sample_cnt(), &state, elapsed);
    Ok(())
}

fn run_worker(run: &RunArgs, distribution: &DistributionArgs) -> Result<()> {
    let comm = TcpCommunicator::from_env().context("joining the worker group")?;
    let root_input = comm.is_root().then(|| run.load());
    let sample_cnt = match &root_input {
        Some(Ok((samples, _))) => samples.len(),
        _ => 0,
    };
    let conf = KMeansConfig::build()
        .max_iter(run.max_iter)
        .convergence_threshold(run.eps)
        .remainder(distribution.remainder.into())
        .build();

    let started = Instant::now();
    let state = KMeans::kmeans_distributed(&comm, root_input, &conf)
        .with_context(|| format!("worker {} failed", comm.rank()))?;
    let elapsed = started.elapsed();

    if let Some(state) = state {
        run.store(&state)?;
        print_summary(comm.world_size(), sample_cnt, &state, elapsed);
    }
    Ok(())
}

fn kill_all(children: &mut [Child]) {
    for child in children.iter_mut() {
        let _ = child.kill();
        let _ = child.wait();
    }
}

fn launch(workers: usize, addr: SocketAddr, run: &RunArgs, distribution: &DistributionArgs, verbose: u8) -> Result<()> {
    if workers == 0 {
        bail!("at least one worker is required");
    }
    let exe = std::env::current_exe().context("locating the current executable")?;
    let verbosity = (verbose > 0).then(|| format!("-{}", "v".repeat(verbose as usize)));

    let mut children = Vec::with_capacity(workers);
    for rank in 0..workers {
        let spawned = Command::new(&exe)
            .args(verbosity.iter())
            .arg("worker")
            .args(run.to_args())
            .args(["--remainder", distribution.remainder.as_arg()])
            .env(RANK_VAR, rank.to_string())
            .env(WORLD_SIZE_VAR, workers.to_string())
            .env(ADDR_VAR, addr.to_string())
            .spawn();
        match spawned {
            Ok(child) => children.push(child),
            Err(e) => {
                kill_all(&mut children);
                return Err(e).with_context(|| format!("spawning worker {}", rank));
            }
        }
    }
    info!(workers, %addr, "workers started");

    let mut failed = 0;
    for (rank, mut child) in children.into_iter().enumerate() {
        let status = child.wait().with_context(|| format!("waiting for worker {}", rank))?;
        if !status.success() {
            error!(rank, %status, "worker failed");
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("{} of {} workers failed", failed, workers);
    }
    Ok(())
}

fn run_generate(kind: Generator, samples_out: &Path, centroids_out: &Path, sample_cnt: usize, k: usize, seed: Option<u64>, min: f64, max: f64) -> Result<()> {
    let mut rnd = generate::rng_from_seed(seed);
    let data: generate::Dataset<f64> = match kind {
        Generator::Uniform => generate::uniform(&mut rnd, sample_cnt, k, min, max),
        Generator::Clustered => generate::clustered(&mut rnd, sample_cnt, k),
    };
    data.store(samples_out, centroids_out).context("writing generated data")?;
    println!("wrote {} samples to {} and {} centroids to {}",
        data.samples.len(), samples_out.display(), data.initial_centroids.len(), centroids_out.display());
    Ok(())
}

fn run_bench(config: BenchConfig, output: &Path) -> Result<()> {
    if config.threads.iter().any(|&t| t == 0) {
        bail!("thread counts must be positive");
    }
    let mut csv = CsvReport::create(output).context("creating benchmark report")?;
    let rows = bench::run(&config, |row| {
        println!("N={} K={} {:<9} threads={:<3} {:>10.3}ms speedup={:.2} efficiency={:.2} {}",
            row.sample_cnt, row.k, row.schedule.map_or("baseline", bench::Schedule::name), row.threads,
            row.seconds * 1e3, row.speedup, row.efficiency,
            if !row.k_ok { "K_MISMATCH" } else if !row.sse_ok { "SSE_MISMATCH" } else { "ok" });
        csv.write(row)
    }).context("benchmark failed")?;

    let incorrect = rows.iter().filter(|r| !r.is_correct()).count();
    println!("wrote {} rows to {}", rows.len(), output.display());
    if incorrect > 0 {
        bail!("{} of {} runs deviate from the sequential baseline", incorrect, rows.len());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Threads { run, threads, schedule } => run_threads(run, *threads, *schedule),
        Commands::Worker { run, distribution } => run_worker(run, distribution),
        Commands::Launch { workers, addr, run, distribution } => launch(*workers, *addr, run, distribution, cli.verbose),
        Commands::Generate { kind, samples_out, centroids_out, samples, k, seed, min, max } =>
            run_generate(*kind, samples_out, centroids_out, *samples, *k, *seed, *min, *max),
        Commands::Bench { sizes, threads, schedule, max_iter, eps, seed, output } => {
            let schedules = if schedule.is_empty() { bench::Schedule::ALL.to_vec() } else { schedule.iter().map(|&s| s.into()).collect() };
            let config = BenchConfig { sizes: sizes.clone(), threads: threads.clone(), schedules, max_iter: *max_iter, eps: *eps, seed: *seed };
            run_bench(config, output)
        },
    }
}
