//! Property tests for partitioning and reassembly.

use ferrodist::{assemble, assemble_gathered, partition, Partition, Strategy, Topology};
use proptest::prelude::*;
use proptest::strategy::Strategy as _;

fn strategy() -> impl proptest::strategy::Strategy<Value = Strategy> {
    prop_oneof![Just(Strategy::Block), Just(Strategy::Cyclic)]
}

proptest! {
    #[test]
    fn partitions_cover_domain_exactly_once(
        strat in strategy(),
        domain in 0i64..500,
        size in 1i32..17,
    ) {
        let mut seen = vec![0u32; domain as usize];
        let mut counts = Vec::new();
        for rank in 0..size {
            let units = partition(strat, domain, rank, size).unwrap();
            prop_assert!(units.windows(2).all(|w| w[0] < w[1]));
            counts.push(units.len());
            for unit in units {
                seen[unit as usize] += 1;
            }
        }
        prop_assert!(seen.iter().all(|&n| n == 1));
        let max = counts.iter().max().copied().unwrap_or(0);
        let min = counts.iter().min().copied().unwrap_or(0);
        prop_assert!(max - min <= 1);
    }

    #[test]
    fn owner_agrees_with_membership(
        strat in strategy(),
        domain in 1u64..300,
        size in 1i32..9,
        unit_seed in any::<u64>(),
    ) {
        let unit = unit_seed % domain;
        let base = Partition::with_domain(strat, domain, &Topology::new(0, size).unwrap());
        let owner = base.owner(unit).unwrap();
        let part = base.for_rank(owner).unwrap();
        prop_assert!(part.contains(unit));
        let offset = base.local_offset(unit).unwrap();
        prop_assert_eq!(part.units().nth(offset as usize), Some(unit));
        prop_assert_eq!(base.owner(domain + unit), None);
    }

    #[test]
    fn gathered_partitions_reassemble(
        strat in strategy(),
        domain in 0u64..120,
        size in 1i32..9,
        row_len in 1usize..4,
    ) {
        let row = |u: u64| (0..row_len).map(move |k| u as i64 * 10 + k as i64);
        let mut gathered = Vec::new();
        for rank in 0..size {
            let part = Partition::with_domain(strat, domain, &Topology::new(rank, size).unwrap());
            for unit in part.units() {
                gathered.extend(row(unit));
            }
        }
        let aggregate = assemble_gathered(&gathered, strat, domain, size, row_len).unwrap();
        let expected: Vec<i64> = (0..domain).flat_map(row).collect();
        prop_assert_eq!(aggregate.into_vec(), expected);
    }

    #[test]
    fn assembly_ignores_arrival_order(
        order in Just((0u64..40).collect::<Vec<_>>()).prop_shuffle(),
    ) {
        let pairs = order.iter().map(|&u| (u, vec![u as f32, -(u as f32)]));
        let aggregate = assemble(pairs, 40).unwrap();
        for u in 0..40u64 {
            prop_assert_eq!(aggregate.row(u), Some(&[u as f32, -(u as f32)][..]));
        }
    }
}
