//! The three demo workloads and their kernels.

use clap::ValueEnum;
use ferrodist::{
    rank_rng, run_dynamic, run_static, run_static_all, Communicator, DynamicOutcome, Error,
    Partition, RankReport, RankRng, ReduceOp, Result, Strategy, Summary, Transport,
    DEFAULT_COORDINATOR,
};
use rand::Rng;
use tracing::info;

pub const DEFAULT_SAMPLES: u64 = 100_000_000;
pub const DEFAULT_DIM: u64 = 120;
pub const DEFAULT_ROWS: u64 = 1024;

const ROOT: i32 = 0;

/// How rows are assigned to ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Schedule {
    /// Fixed partition, gathered at the root
    Static,
    /// Coordinator hands out rows on demand
    Dynamic,
}

/// A fully resolved workload.
#[derive(Debug, Clone, Copy)]
pub enum Job {
    Pi {
        samples: u64,
    },
    Matvec {
        dim: u64,
        strategy: Strategy,
    },
    Mandelbrot {
        rows: u64,
        strategy: Strategy,
        schedule: Schedule,
    },
}

/// What one rank hands back to `main`.
pub struct RankOutput {
    pub report: RankReport,
    /// Present on the root only.
    pub summary: Option<Summary>,
}

pub fn run<X: Transport>(world: &Communicator<X>, job: &Job) -> Result<RankOutput> {
    match *job {
        Job::Pi { samples } => pi(world, samples),
        Job::Matvec { dim, strategy } => matvec(world, dim, strategy),
        Job::Mandelbrot {
            rows,
            strategy,
            schedule,
        } => mandelbrot(world, rows, strategy, schedule),
    }
}

fn report<X: Transport>(
    world: &Communicator<X>,
    units: u64,
    elapsed: f64,
    local_value: Option<f64>,
) -> RankReport {
    RankReport {
        rank: world.rank(),
        size: world.size(),
        units,
        elapsed,
        local_value,
    }
}

// ============================================================================
// Pi
// ============================================================================

/// Darts out of `samples` landing inside the unit circle.
fn count_inside(rng: &mut RankRng, samples: u64) -> u64 {
    let mut inside = 0;
    for _ in 0..samples {
        let x: f64 = rng.gen_range(-1.0..=1.0);
        let y: f64 = rng.gen_range(-1.0..=1.0);
        if x * x + y * y <= 1.0 {
            inside += 1;
        }
    }
    inside
}

fn pi<X: Transport>(world: &Communicator<X>, samples: u64) -> Result<RankOutput> {
    let topology = world.topology();
    let share = Partition::with_domain(Strategy::Block, samples, &topology);
    let mut rng = rank_rng(&topology);

    let (inside, elapsed) = world.timed(|| count_inside(&mut rng, share.len()))?;

    let totals = world.reduce(&[inside, share.len()], ReduceOp::Sum, ROOT)?;
    let slowest = world.reduce_scalar(elapsed, ReduceOp::Max, ROOT)?;

    let local_estimate = (share.len() > 0).then(|| 4.0 * inside as f64 / share.len() as f64);
    let summary = match (totals.as_deref(), slowest) {
        (Some(&[inside, total]), Some(slowest)) => {
            let estimate = if total > 0 {
                4.0 * inside as f64 / total as f64
            } else {
                0.0
            };
            // Two random draws per sample.
            Some(Summary::new("pi", estimate, total, world.size(), slowest, 2.0))
        }
        _ => None,
    };

    Ok(RankOutput {
        report: report(world, share.len(), elapsed, local_estimate),
        summary,
    })
}

// ============================================================================
// Matrix-vector product
// ============================================================================

/// `A[i][j] = (i + j) % dim + 1`
fn matrix_entry(i: u64, j: u64, dim: u64) -> f64 {
    ((i + j) % dim + 1) as f64
}

fn matvec<X: Transport>(
    world: &Communicator<X>,
    dim: u64,
    strategy: Strategy,
) -> Result<RankOutput> {
    let u: Vec<f64> = (1..=dim).map(|j| j as f64).collect();
    let mut row_product = |i: u64| {
        vec![u
            .iter()
            .enumerate()
            .map(|(j, uj)| matrix_entry(i, j as u64, dim) * uj)
            .sum::<f64>()]
    };

    let outcome = run_static_all(world, strategy, dim, &mut row_product)?;
    let v = outcome
        .aggregate
        .ok_or_else(|| Error::Internal("all-gather left a rank without the product".into()))?;
    let slowest = world.reduce_scalar(outcome.elapsed, ReduceOp::Max, ROOT)?;

    let summary = slowest.map(|slowest| {
        let head = &v.as_slice()[..v.as_slice().len().min(5)];
        info!(?head, "leading elements of v");
        let checksum = v.as_slice().iter().sum();
        // One multiply and one add per matrix entry.
        Summary::new("matvec", checksum, dim, world.size(), slowest, 2.0 * dim as f64)
    });

    Ok(RankOutput {
        report: report(world, outcome.partition.len(), outcome.elapsed, None),
        summary,
    })
}

// ============================================================================
// Mandelbrot
// ============================================================================

/// Escape-time parameters of the rendered view.
#[derive(Debug, Clone, Copy)]
struct MandelbrotView {
    max_iterations: u32,
    escape_radius: f64,
    width: u64,
    height: u64,
}

impl MandelbrotView {
    fn new(height: u64) -> Self {
        MandelbrotView {
            max_iterations: 50,
            escape_radius: 10.0,
            width: 1024,
            height,
        }
    }

    /// Smoothed escape iteration of `c` as a fraction of `max_iterations`,
    /// in `[0, 1]`. Points that never escape score 1.
    fn convergence(&self, cx: f64, cy: f64) -> f64 {
        let max = f64::from(self.max_iterations);
        let (mut zr, mut zi) = (0.0f64, 0.0f64);
        for iter in 0..self.max_iterations {
            (zr, zi) = (zr * zr - zi * zi + cx, 2.0 * zr * zi + cy);
            let modulus = zr.hypot(zi);
            if modulus > self.escape_radius {
                let smooth = f64::from(iter) + 1.0 - modulus.ln().ln() / std::f64::consts::LN_2;
                return (smooth / max).clamp(0.0, 1.0);
            }
        }
        1.0
    }

    fn row(&self, y: u64) -> Vec<f64> {
        let scale_x = 3.0 / self.width as f64;
        let scale_y = 2.25 / self.height as f64;
        let cy = -1.125 + scale_y * y as f64;
        (0..self.width)
            .map(|x| self.convergence(-2.0 + scale_x * x as f64, cy))
            .collect()
    }
}

fn mandelbrot<X: Transport>(
    world: &Communicator<X>,
    rows: u64,
    strategy: Strategy,
    schedule: Schedule,
) -> Result<RankOutput> {
    let view = MandelbrotView::new(rows);
    let mut scanline = |y: u64| view.row(y);

    let (units, elapsed, image) = match schedule {
        Schedule::Static => {
            let outcome = run_static(world, strategy, rows, &mut scanline, ROOT)?;
            (outcome.partition.len(), outcome.elapsed, outcome.aggregate)
        }
        Schedule::Dynamic => match run_dynamic(world, rows, DEFAULT_COORDINATOR, &mut scanline)? {
            DynamicOutcome::Coordinator {
                aggregate,
                stats,
                elapsed,
            } => {
                info!(
                    per_rank = ?stats.units_per_rank,
                    results = stats.results_received,
                    "coordinator finished"
                );
                (0, elapsed, Some(aggregate))
            }
            DynamicOutcome::Worker(stats) => (stats.units, stats.elapsed, None),
        },
    };
    let slowest = world.reduce_scalar(elapsed, ReduceOp::Max, ROOT)?;

    let summary = match (image, slowest) {
        (Some(image), Some(slowest)) => {
            let pixels = image.as_slice().len().max(1) as f64;
            let mean = image.as_slice().iter().sum::<f64>() / pixels;
            Some(Summary::new(
                "mandelbrot",
                mean,
                rows,
                world.size(),
                slowest,
                view.width as f64,
            ))
        }
        _ => None,
    };

    Ok(RankOutput {
        report: report(world, units, elapsed, None),
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrodist::LocalUniverse;

    #[test]
    fn origin_never_escapes() {
        let view = MandelbrotView::new(8);
        assert_eq!(view.convergence(0.0, 0.0), 1.0);
        let fast = view.convergence(2.0, 2.0);
        assert!((0.0..0.04).contains(&fast), "{fast}");
    }

    #[test]
    fn convergence_stays_in_unit_interval() {
        let view = MandelbrotView::new(16);
        for y in 0..16 {
            assert!(view.row(y).iter().all(|v| (0.0..=1.0).contains(v)));
        }
        // Escapes on the first step, where the raw smoothed count is negative.
        assert_eq!(view.convergence(50.0, 0.0), 0.0);
    }

    #[test]
    fn matvec_matches_sequential_product() {
        let dim = 12;
        let expected: f64 = (0..dim)
            .flat_map(|i| (0..dim).map(move |j| matrix_entry(i, j, dim) * (j + 1) as f64))
            .sum();
        let out = LocalUniverse::new(5).unwrap().run(|world| {
            matvec(&world, dim, Strategy::Cyclic)
        });
        let summary = out[0].as_ref().unwrap().summary.as_ref().unwrap();
        assert!((summary.value - expected).abs() < 1e-9);
        assert!(out[1].as_ref().unwrap().summary.is_none());
    }

    #[test]
    fn mandelbrot_schedules_agree() {
        let mean = |schedule| {
            let out = LocalUniverse::new(3).unwrap().run(|world| {
                mandelbrot(&world, 16, Strategy::Cyclic, schedule)
            });
            out[0].as_ref().unwrap().summary.as_ref().unwrap().value
        };
        assert_eq!(mean(Schedule::Static), mean(Schedule::Dynamic));
    }

    #[test]
    fn pi_estimate_is_plausible() {
        let out = LocalUniverse::new(4)
            .unwrap()
            .run(|world| pi(&world, 200_000));
        let summary = out[0].as_ref().unwrap().summary.as_ref().unwrap();
        assert_eq!(summary.units, 200_000);
        assert!((summary.value - std::f64::consts::PI).abs() < 0.05);
        let units: u64 = out.iter().map(|o| o.as_ref().unwrap().report.units).sum();
        assert_eq!(units, 200_000);
    }
}
