//! Property: the multiset of indices currently "in flight" (allocated and
//! not yet deallocated) always matches what a plain reference model would
//! compute from the same sequence of `allocate`/`deallocate` calls, and no
//! index is ever in flight twice at once.

use std::collections::HashSet;

use nebula_lockfree::MemoryPool;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Allocate,
    Deallocate(usize),
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            Just(Op::Allocate),
            (0usize..8).prop_map(Op::Deallocate),
        ],
        0..200,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn in_flight_set_never_duplicates_and_matches_model(sequence in ops()) {
        const CAPACITY: usize = 4;
        let pool: MemoryPool<u32> = MemoryPool::new(CAPACITY).unwrap();

        let mut live: Vec<u32> = Vec::new();
        let mut in_flight: HashSet<u32> = HashSet::new();
        let mut next_value = 0u32;

        for op in sequence {
            match op {
                Op::Allocate => {
                    let value = next_value;
                    next_value += 1;
                    match pool.allocate(value) {
                        Some(idx) => {
                            prop_assert!(in_flight.insert(idx), "index {idx} was already in flight");
                            live.push(idx);
                        }
                        None => {
                            prop_assert_eq!(in_flight.len(), CAPACITY, "allocate failed below capacity");
                        }
                    }
                }
                Op::Deallocate(pos) => {
                    if let Some(&idx) = live.get(pos % live.len().max(1)) {
                        if in_flight.remove(&idx) {
                            live.retain(|&i| i != idx);
                            prop_assert!(pool.deallocate(idx).is_some());
                        }
                    }
                }
            }
            prop_assert!(in_flight.len() <= CAPACITY);
        }
    }
}
