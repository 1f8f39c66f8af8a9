//! Monte Carlo Pi Estimation on thread ranks.
//!
//! Samples are split into contiguous blocks, each rank throws its darts with
//! its own random stream, and the hit counts are summed at rank 0. The slowest
//! and fastest rank timings come from max and min reductions.
//!
//! Run with: cargo run --release --example pi_monte_carlo -- [samples] [ranks]

use ferrodist::{
    rank_rng, resolve_domain_size, LocalUniverse, Partition, ReduceOp, Result, Strategy,
};
use rand::Rng;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let total_samples = resolve_domain_size(args.next().as_deref(), 10_000_000);
    let ranks = resolve_domain_size(args.next().as_deref(), 4) as i32;

    let results = LocalUniverse::new(ranks)?.run(|world| {
        let topology = world.topology();
        let share = Partition::with_domain(Strategy::Block, total_samples, &topology);
        let mut rng = rank_rng(&topology);

        let (local_inside, elapsed) = world.timed(|| {
            (0..share.len())
                .filter(|_| {
                    let x: f64 = rng.gen_range(-1.0..=1.0);
                    let y: f64 = rng.gen_range(-1.0..=1.0);
                    x * x + y * y <= 1.0
                })
                .count() as u64
        })?;

        let inside = world.reduce_scalar(local_inside, ReduceOp::Sum, 0)?;
        let max_time = world.reduce_scalar(elapsed, ReduceOp::Max, 0)?;
        let min_time = world.reduce_scalar(elapsed, ReduceOp::Min, 0)?;

        // Every rank learns the estimate so it can check it.
        let estimate = world.all_reduce_scalar(
            inside.map_or(0.0, |n| 4.0 * n as f64 / total_samples as f64),
            ReduceOp::Sum,
        )?;

        if let (Some(inside), Some(max_time), Some(min_time)) = (inside, max_time, min_time) {
            let error = (estimate - std::f64::consts::PI).abs();
            println!("Ranks: {}  Samples: {}", world.size(), total_samples);
            println!("  Points inside circle: {inside}");
            println!("  Estimated pi: {estimate:.10}");
            println!("  Error:        {error:.10}");
            println!("  Time (min/max): {min_time:.4}s / {max_time:.4}s");
            println!(
                "  Samples/second: {:.2e}",
                total_samples as f64 / max_time.max(f64::EPSILON)
            );
        }
        Ok(estimate)
    });

    for (rank, estimate) in results.into_iter().enumerate() {
        let estimate = estimate?;
        assert!(
            (estimate - std::f64::consts::PI).abs() < 0.01,
            "rank {rank} saw estimate {estimate}"
        );
    }
    println!("All ranks agree on the estimate.");
    Ok(())
}
