//! Demo driver for ferrodist
//!
//! Runs one of three workloads on a group of ranks and prints a JSON summary
//! from the root.
//!
//! # Usage
//!
//! ```bash
//! # Monte-Carlo pi with 10^8 samples on 8 thread ranks
//! ferrodist --ranks 8 pi 100000000
//!
//! # 120x120 matrix-vector product, rows split cyclically
//! ferrodist --strategy cyclic matvec 120
//!
//! # Mandelbrot scanlines handed out by a coordinator, per-rank records kept
//! ferrodist --report-dir out/ mandelbrot --schedule dynamic
//!
//! # One MPI process per rank (built with `--features mpi`)
//! mpiexec -n 4 ferrodist pi
//! ```
//!
//! A missing, zero or unparsable size argument falls back to the workload's
//! default. Set `RUST_LOG=ferrodist=debug` to see partitioning and dispatch.

mod workloads;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ferrodist::{launcher, resolve_domain_size, Strategy};
use std::path::PathBuf;
use tracing::{debug, info};
use workloads::{Job, RankOutput, Schedule};

/// Distributed numeric workloads over thread or MPI ranks
#[derive(Parser, Debug)]
#[command(name = "ferrodist")]
#[command(about = "Run a rank-parallel demo workload and report its throughput")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    workload: Workload,

    /// Number of thread ranks
    ///
    /// Ignored when built with the `mpi` feature; the launcher decides then.
    #[arg(short, long, default_value_t = 4, global = true)]
    ranks: i32,

    /// Partition strategy for static schedules (block or cyclic)
    #[arg(short, long, default_value_t = Strategy::Block, global = true)]
    strategy: Strategy,

    /// Directory receiving one rank_NNNNN.json record per rank
    #[arg(long, global = true)]
    report_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Workload {
    /// Monte-Carlo estimate of pi
    Pi {
        /// Total number of samples [default: 100000000]
        samples: Option<String>,
    },
    /// Product of a dim x dim matrix with a vector, gathered on every rank
    Matvec {
        /// Matrix dimension [default: 120]
        dim: Option<String>,
    },
    /// Smooth escape-time image of the Mandelbrot set, one unit per row
    Mandelbrot {
        /// Image height in rows [default: 1024]
        rows: Option<String>,

        /// How rows are assigned to ranks
        #[arg(long, value_enum, default_value_t = Schedule::Static)]
        schedule: Schedule,
    },
}

impl Args {
    fn job(&self) -> Job {
        match &self.workload {
            Workload::Pi { samples } => Job::Pi {
                samples: resolve_domain_size(samples.as_deref(), workloads::DEFAULT_SAMPLES),
            },
            Workload::Matvec { dim } => Job::Matvec {
                dim: resolve_domain_size(dim.as_deref(), workloads::DEFAULT_DIM),
                strategy: self.strategy,
            },
            Workload::Mandelbrot { rows, schedule } => Job::Mandelbrot {
                rows: resolve_domain_size(rows.as_deref(), workloads::DEFAULT_ROWS),
                strategy: self.strategy,
                schedule: *schedule,
            },
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let job = args.job();
    debug!(
        job = ?launcher::job_id(),
        node = ?launcher::node_name(),
        "launch environment"
    );
    info!(?job, "starting");

    let outputs = run(&args, &job)?;

    for output in &outputs {
        if let Some(dir) = &args.report_dir {
            output
                .report
                .write_to(dir)
                .with_context(|| format!("writing rank {} report", output.report.rank))?;
        }
        if let Some(summary) = &output.summary {
            info!(
                workload = %summary.workload,
                value = summary.value,
                elapsed = summary.elapsed,
                mops = summary.throughput_mops,
                "done"
            );
            println!("{}", serde_json::to_string_pretty(summary)?);
        }
    }
    Ok(())
}

/// Run `job` on a thread universe and return every rank's output.
#[cfg(not(feature = "mpi"))]
fn run(args: &Args, job: &Job) -> Result<Vec<RankOutput>> {
    use ferrodist::{Error, LocalUniverse};

    if let Some(launch) = launcher::detect().filter(|l| l.size > 1) {
        tracing::warn!(
            launcher = %launch.launcher,
            rank = launch.rank,
            size = launch.size,
            "started as one rank of a multi-process launch, but this build only runs \
             thread ranks; every process will compute the whole job (rebuild with --features mpi)"
        );
    }

    let universe = LocalUniverse::new(args.ranks).context("invalid --ranks")?;
    let results = universe.run(|world| workloads::run(&world, job));

    // Report the failure that caused the abort, not the ranks it released.
    let mut aborted = None;
    let mut outputs = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(output) => outputs.push(output),
            Err(err @ Error::Aborted(_)) => aborted = aborted.or(Some(err)),
            Err(err) => return Err(err).context("rank failed"),
        }
    }
    match aborted {
        Some(err) => Err(err).context("run aborted"),
        None => Ok(outputs),
    }
}

/// Run `job` as this process's MPI rank.
#[cfg(feature = "mpi")]
fn run(_args: &Args, job: &Job) -> Result<Vec<RankOutput>> {
    use ferrodist::mpi_backend::MpiRuntime;

    let runtime = MpiRuntime::init()?;
    let world = runtime.world()?;
    if let Some(launch) = launcher::detect() {
        debug!(launcher = %launch.launcher, rank = launch.rank, "launcher detected");
    }
    Ok(vec![workloads::run(&world, job)?])
}
