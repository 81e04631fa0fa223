//! Property-based tests for the `heap` module.
//!
//! Differential testing against a per-element oracle of queued priorities.

#![allow(clippy::unwrap_used)]

use nexus_intrusive::{PriorityQueue, PriorityQueueLink, Storage, VecStorage, adapter};
use proptest::prelude::*;

#[derive(Debug)]
struct Task {
    link: PriorityQueueLink<u16>,
}

adapter!(TaskLink = Task { link: PriorityQueueLink<u16> });

type Queue = PriorityQueue<u16, TaskLink>;

/// Elements available to each run.
const POOL: usize = 64;

// ============================================================================
//  Strategies
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Insert(usize, u16),
    Remove(usize),
    RemoveTop,
    RemoveTopWithPriority(u16),
}

fn operations(max_ops: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            4 => (0..POOL, 0..200u16).prop_map(|(i, p)| Op::Insert(i, p)),
            2 => (0..POOL).prop_map(Op::Remove),
            1 => Just(Op::RemoveTop),
            1 => (0..200u16).prop_map(Op::RemoveTopWithPriority),
        ],
        0..=max_ops,
    )
}

fn pool(storage: &mut VecStorage<Task>) -> Vec<u32> {
    (0..POOL)
        .map(|_| {
            storage
                .try_insert(Task {
                    link: PriorityQueueLink::new(),
                })
                .unwrap()
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// The top always holds the minimum queued priority and draining is sorted.
    #[test]
    fn top_is_minimum_and_drain_sorted(ops in operations(400)) {
        let mut storage = VecStorage::new();
        let mut queue: Queue = PriorityQueue::new();
        let handles = pool(&mut storage);
        let mut oracle: Vec<Option<u16>> = vec![None; POOL];

        for op in &ops {
            match *op {
                Op::Insert(i, priority) => {
                    queue.insert(&mut storage, priority, handles[i]);
                    oracle[i] = Some(priority);
                }
                Op::Remove(i) => {
                    let removed = queue.remove(&mut storage, handles[i]);
                    prop_assert_eq!(removed, oracle[i].is_some());
                    oracle[i] = None;
                }
                Op::RemoveTop => {
                    let min = oracle.iter().flatten().min().copied();
                    match queue.remove_top(&mut storage) {
                        Some(h) => {
                            let i = handles.iter().position(|&x| x == h).unwrap();
                            prop_assert_eq!(oracle[i], min);
                            oracle[i] = None;
                        }
                        None => prop_assert_eq!(min, None),
                    }
                }
                Op::RemoveTopWithPriority(limit) => {
                    let min = oracle.iter().flatten().min().copied();
                    let got = queue.remove_top_with_priority(&mut storage, &limit);
                    prop_assert_eq!(got.is_some(), min.is_some_and(|m| m <= limit));
                    if let Some(h) = got {
                        let i = handles.iter().position(|&x| x == h).unwrap();
                        oracle[i] = None;
                    }
                }
            }

            prop_assert_eq!(queue.len(), oracle.iter().flatten().count());
            if let Some(top) = queue.top() {
                let min = oracle.iter().flatten().min().copied();
                prop_assert_eq!(queue.priority(&storage, top).copied(), min);
            }
        }

        for (i, &h) in handles.iter().enumerate() {
            prop_assert_eq!(queue.contains(&storage, h), oracle[i].is_some());
            prop_assert_eq!(queue.priority(&storage, h).copied(), oracle[i]);
        }

        let mut expected: Vec<u16> = oracle.iter().flatten().copied().collect();
        expected.sort_unstable();
        let mut drained = Vec::new();
        while let Some(h) = queue.remove_top(&mut storage) {
            drained.push(*storage[h].link.priority());
        }
        prop_assert_eq!(drained, expected);
    }

    /// Removing an arbitrary non-top element leaves a sorted drain.
    #[test]
    fn remove_middle_then_drain_sorted(
        priorities in prop::collection::vec(any::<u16>(), 2..300),
        victim in any::<prop::sample::Index>()
    ) {
        let mut storage = VecStorage::new();
        let mut queue: Queue = PriorityQueue::with_capacity(priorities.len());

        let handles: Vec<u32> = priorities
            .iter()
            .map(|&p| {
                let h = storage.try_insert(Task { link: PriorityQueueLink::new() }).unwrap();
                queue.insert(&mut storage, p, h);
                h
            })
            .collect();

        let top = queue.top().unwrap();
        let candidates: Vec<u32> = handles.iter().copied().filter(|&h| h != top).collect();
        let victim = candidates[victim.index(candidates.len())];
        prop_assert!(queue.remove(&mut storage, victim));
        prop_assert!(!queue.contains(&storage, victim));

        let mut drained = Vec::new();
        while let Some(h) = queue.remove_top(&mut storage) {
            drained.push(*storage[h].link.priority());
        }
        prop_assert_eq!(drained.len(), priorities.len() - 1);
        prop_assert!(drained.windows(2).all(|w| w[0] <= w[1]));
    }
}
