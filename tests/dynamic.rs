//! Coordinator/worker scheduling on thread ranks.

use ferrodist::{
    run_dynamic, CoordinatorStats, DynamicOutcome, Error, LocalUniverse, Result, WorkerStats,
};
use std::time::Duration;

fn split(outcomes: Vec<Result<DynamicOutcome<u64>>>) -> (Vec<u64>, CoordinatorStats, Vec<WorkerStats>) {
    let mut coordinator = None;
    let mut workers = Vec::new();
    for outcome in outcomes {
        match outcome.unwrap() {
            DynamicOutcome::Coordinator {
                aggregate, stats, ..
            } => coordinator = Some((aggregate.into_vec(), stats)),
            DynamicOutcome::Worker(stats) => workers.push(stats),
        }
    }
    let (values, stats) = coordinator.expect("no coordinator outcome");
    (values, stats, workers)
}

#[test]
fn ten_units_two_workers() {
    let out = LocalUniverse::new(3).unwrap().run(|world| {
        let mut kernel = |u: u64| vec![u + 100];
        run_dynamic(&world, 10, 0, &mut kernel)
    });
    let (values, stats, workers) = split(out);

    assert_eq!(values, (100..110).collect::<Vec<_>>());
    assert_eq!(stats.tasks_sent, 10);
    assert_eq!(stats.sentinels_sent, 2);
    assert_eq!(stats.results_received, 10);
    assert_eq!(stats.units_per_rank[0], 0);
    assert_eq!(stats.units_per_rank.iter().sum::<u64>(), 10);

    assert_eq!(workers.len(), 2);
    assert_eq!(workers.iter().map(|w| w.units).sum::<u64>(), 10);
}

#[test]
fn surplus_workers_are_released_at_fan_out() {
    let out = LocalUniverse::new(6).unwrap().run(|world| {
        let mut kernel = |u: u64| vec![u];
        run_dynamic(&world, 2, 0, &mut kernel)
    });
    let (values, stats, workers) = split(out);
    assert_eq!(values, vec![0, 1]);
    assert_eq!(stats.tasks_sent, 2);
    assert_eq!(stats.sentinels_sent, 5);
    assert_eq!(workers.iter().filter(|w| w.units == 0).count(), 3);
}

#[test]
fn empty_domain_only_sends_sentinels() {
    let out = LocalUniverse::new(3).unwrap().run(|world| {
        let mut kernel = |u: u64| vec![u];
        run_dynamic(&world, 0, 0, &mut kernel)
    });
    let (values, stats, _) = split(out);
    assert!(values.is_empty());
    assert_eq!(stats.tasks_sent, 0);
    assert_eq!(stats.sentinels_sent, 2);
}

#[test]
fn non_zero_coordinator() {
    let out = LocalUniverse::new(4).unwrap().run(|world| {
        let mut kernel = |u: u64| vec![u, u * u];
        run_dynamic(&world, 7, 2, &mut kernel)
    });
    assert!(matches!(out[2], Ok(DynamicOutcome::Coordinator { .. })));
    let (values, stats, _) = split(out);
    assert_eq!(values.len(), 14);
    assert_eq!(&values[12..], &[6, 36]);
    assert_eq!(stats.units_per_rank[2], 0);
}

#[test]
fn uneven_costs_favour_the_fast_worker() {
    // Rank 1 sleeps on every unit, rank 2 never does.
    let out = LocalUniverse::new(3).unwrap().run(|world| {
        let slow = world.rank() == 1;
        let mut kernel = |u: u64| {
            if slow {
                std::thread::sleep(Duration::from_millis(20));
            }
            vec![u]
        };
        run_dynamic(&world, 20, 0, &mut kernel)
    });
    let (values, stats, _) = split(out);
    assert_eq!(values, (0..20).collect::<Vec<_>>());
    assert!(stats.units_per_rank[2] > stats.units_per_rank[1]);
}

#[test]
fn single_rank_cannot_schedule_work() {
    let out = LocalUniverse::new(1).unwrap().run(|world| {
        let mut kernel = |u: u64| vec![u];
        run_dynamic(&world, 5, 0, &mut kernel)
    });
    assert!(matches!(out[0], Err(Error::InvalidTopology(_))));
}

#[test]
fn bad_coordinator_rank_is_rejected() {
    let out = LocalUniverse::new(2).unwrap().run(|world| {
        let mut kernel = |u: u64| vec![u];
        run_dynamic(&world, 5, 2, &mut kernel)
    });
    for rank in out {
        assert!(matches!(rank, Err(Error::InvalidRank { rank: 2, size: 2 })));
    }
}

#[test]
fn ragged_rows_are_refused_by_the_coordinator() {
    let out = LocalUniverse::new(3).unwrap().run(|world| {
        let mut kernel = |u: u64| vec![u; if u == 3 { 2 } else { 1 }];
        run_dynamic(&world, 6, 0, &mut kernel)
    });
    assert!(matches!(out[0], Err(Error::RowLengthMismatch { unit: 3, .. })));
    // Workers blocked on their next assignment are released by the abort.
    for worker in &out[1..] {
        assert!(matches!(worker, Ok(_) | Err(Error::Aborted(0))));
    }
}
