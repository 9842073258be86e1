//! The four load-balancing policies `GetClient` dispatches on.
//!
//! These are pure functions over a snapshot of the currently-healthy nodes
//! (`spec.md` §4.5): no locks, no I/O, no side effects. `Pool::get_client`
//! is responsible for building the snapshot under the node read locks and
//! for recording the selection (`total_used`, `last_used`) afterward.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

use crate::config::LoadBalanceStrategy;

/// The fields of a healthy node the selector needs to make a choice. Index
/// order here is the same stable index order as the pool's node list
/// (`spec.md` §3 I5), which is what makes `LeastUsed`'s and
/// `WeightedRoundRobin`'s tie-breaking by "first scanned" well-defined.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Candidate {
    pub(crate) total_used: u64,
    pub(crate) weight: u32,
}

/// Choose one index into `healthy` according to `strategy`. Returns `None`
/// only if `healthy` is empty; callers translate that into
/// `ErrNoHealthyNodes`.
pub(crate) fn select(
    strategy: LoadBalanceStrategy,
    healthy: &[Candidate],
    round_robin_counter: &AtomicU64,
) -> Option<usize> {
    if healthy.is_empty() {
        return None;
    }

    match strategy {
        LoadBalanceStrategy::RoundRobin => Some(round_robin(healthy, round_robin_counter)),
        LoadBalanceStrategy::Random => Some(random(healthy)),
        LoadBalanceStrategy::LeastUsed => Some(least_used(healthy)),
        LoadBalanceStrategy::WeightedRoundRobin => Some(weighted(healthy, round_robin_counter)),
    }
}

/// The round-robin counter is pool-global, not per-healthy-set, so
/// transient membership changes cause harmless skips — the tie-break is
/// "fair over time" rather than strictly exact on any single call
/// (`spec.md` §4.5).
fn round_robin(healthy: &[Candidate], counter: &AtomicU64) -> usize {
    let n = healthy.len() as u64;
    let idx = counter.fetch_add(1, Ordering::Relaxed) % n;
    idx as usize
}

fn random(healthy: &[Candidate]) -> usize {
    rand::rng().random_range(0..healthy.len())
}

/// Linear scan; first scanned wins on a tie (stable by node index).
fn least_used(healthy: &[Candidate]) -> usize {
    let mut best = 0;
    let mut best_used = healthy[0].total_used;
    for (i, candidate) in healthy.iter().enumerate().skip(1) {
        if candidate.total_used < best_used {
            best = i;
            best_used = candidate.total_used;
        }
    }
    best
}

/// Named "round-robin" by the reference design, but is actually a
/// randomized weighted draw; true deterministic weighted rotation is not
/// required (`spec.md` §4.5). Falls back to plain `RoundRobin` when the
/// total weight is zero.
fn weighted(healthy: &[Candidate], counter: &AtomicU64) -> usize {
    let total_weight: u64 = healthy.iter().map(|c| c.weight as u64).sum();
    if total_weight == 0 {
        return round_robin(healthy, counter);
    }

    let pick = rand::rng().random_range(0..total_weight);
    let mut running = 0u64;
    for (i, candidate) in healthy.iter().enumerate() {
        running += candidate.weight as u64;
        if running > pick {
            return i;
        }
    }
    // Unreachable because `pick < total_weight` guarantees some prefix sum
    // strictly exceeds it, but fall back to the last candidate rather than
    // panic if floating-point-free integer math ever surprises us.
    healthy.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(used: &[u64]) -> Vec<Candidate> {
        used.iter()
            .map(|&total_used| Candidate {
                total_used,
                weight: 1,
            })
            .collect()
    }

    #[test]
    fn round_robin_cycles_in_order() {
        let healthy = candidates(&[0, 0, 0]);
        let counter = AtomicU64::new(0);
        let picks: Vec<usize> = (0..6)
            .map(|_| select(LoadBalanceStrategy::RoundRobin, &healthy, &counter).unwrap())
            .collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn least_used_picks_smallest_with_stable_tiebreak() {
        let healthy = candidates(&[5, 2, 2, 9]);
        let counter = AtomicU64::new(0);
        let pick = select(LoadBalanceStrategy::LeastUsed, &healthy, &counter).unwrap();
        assert_eq!(pick, 1);
    }

    #[test]
    fn weighted_falls_back_to_round_robin_when_all_weights_zero() {
        let healthy = vec![
            Candidate {
                total_used: 0,
                weight: 0,
            },
            Candidate {
                total_used: 0,
                weight: 0,
            },
        ];
        let counter = AtomicU64::new(0);
        let picks: Vec<usize> = (0..4)
            .map(|_| select(LoadBalanceStrategy::WeightedRoundRobin, &healthy, &counter).unwrap())
            .collect();
        assert_eq!(picks, vec![0, 1, 0, 1]);
    }

    #[test]
    fn weighted_never_picks_a_zero_weight_node() {
        let healthy = vec![
            Candidate {
                total_used: 0,
                weight: 0,
            },
            Candidate {
                total_used: 0,
                weight: 3,
            },
        ];
        let counter = AtomicU64::new(0);
        for _ in 0..200 {
            let pick = select(LoadBalanceStrategy::WeightedRoundRobin, &healthy, &counter).unwrap();
            assert_eq!(pick, 1);
        }
    }

    #[test]
    fn empty_healthy_set_returns_none() {
        let counter = AtomicU64::new(0);
        assert!(select(LoadBalanceStrategy::RoundRobin, &[], &counter).is_none());
    }
}
