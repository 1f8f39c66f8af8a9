//! Mandelbrot scanlines, scheduled three ways.
//!
//! Rows near the middle of the image take far longer than rows at the edges,
//! so a block split leaves some ranks idle while others finish. A cyclic split
//! interleaves cheap and expensive rows, and the coordinator/worker schedule
//! hands rows out as workers become free.
//!
//! Run with: cargo run --release --example mandelbrot_rows -- [rows] [ranks]

use ferrodist::{
    resolve_domain_size, run_dynamic, run_static, DynamicOutcome, LocalUniverse, ReduceOp,
    Result, Strategy,
};

const WIDTH: u64 = 512;
const MAX_ITERATIONS: u32 = 200;

fn escape_row(y: u64, height: u64) -> Vec<u32> {
    let cy = -1.125 + 2.25 * y as f64 / height as f64;
    (0..WIDTH)
        .map(|x| {
            let cx = -2.0 + 3.0 * x as f64 / WIDTH as f64;
            let (mut zr, mut zi) = (0.0f64, 0.0f64);
            let mut iter = 0;
            while iter < MAX_ITERATIONS && zr * zr + zi * zi <= 4.0 {
                (zr, zi) = (zr * zr - zi * zi + cx, 2.0 * zr * zi + cy);
                iter += 1;
            }
            iter
        })
        .collect()
}

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let height = resolve_domain_size(args.next().as_deref(), 512);
    let ranks = resolve_domain_size(args.next().as_deref(), 4) as i32;
    let universe = LocalUniverse::new(ranks)?;

    let mut images = Vec::new();
    for strategy in [Strategy::Block, Strategy::Cyclic] {
        let out = universe.run(|world| {
            let mut kernel = |y: u64| escape_row(y, height);
            let outcome = run_static(&world, strategy, height, &mut kernel, 0)?;
            let spread = world.gather(&[outcome.elapsed], 0)?;
            Ok((outcome.aggregate, spread))
        });
        let (image, spread) = out.into_iter().next().unwrap_or_else(|| Ok((None, None)))?;
        if let Some(spread) = spread {
            println!("{strategy:>7}: per-rank seconds {spread:.4?}");
        }
        images.extend(image);
    }

    let out = universe.run(|world| {
        let mut kernel = |y: u64| escape_row(y, height);
        let outcome = run_dynamic(&world, height, 0, &mut kernel)?;
        let elapsed = match &outcome {
            DynamicOutcome::Coordinator { elapsed, .. } => *elapsed,
            DynamicOutcome::Worker(stats) => stats.elapsed,
        };
        world.reduce_scalar(elapsed, ReduceOp::Max, 0)?;
        Ok(outcome)
    });
    for outcome in out {
        if let DynamicOutcome::Coordinator {
            aggregate,
            stats,
            elapsed,
        } = outcome?
        {
            println!(
                "dynamic: {elapsed:.4}s, rows per rank {:?}",
                stats.units_per_rank
            );
            images.push(aggregate);
        }
    }

    assert!(images.windows(2).all(|w| w[0] == w[1]), "schedules disagree");
    println!("All {} schedules produced the same image.", images.len());
    Ok(())
}
