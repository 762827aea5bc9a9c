//! Placement policies.
//!
//! A [`PlacementPolicy`] picks the file server that receives a new file.
//! The controller calls it while holding its table lock, so a policy must
//! be fast and must not block.

use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::PlacementKind;
use crate::membership::Address;

/// A registered file server as seen by a placement policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub addr: Address,
    /// Number of files currently assigned.
    pub file_count: u64,
    /// Sum of the declared sizes of those files.
    pub assigned_bytes: u64,
}

/// Strategy for choosing where a new file goes.
///
/// `candidates` is never empty and is sorted by address.
pub trait PlacementPolicy: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn choose(&self, file_name: &str, candidates: &[Candidate]) -> Option<Address>;
}

/// Build the policy selected in configuration.
pub fn from_kind(kind: PlacementKind) -> Box<dyn PlacementPolicy> {
    match kind {
        PlacementKind::LeastLoaded => Box::new(LeastLoaded),
        PlacementKind::RoundRobin => Box::new(RoundRobin::default()),
        PlacementKind::Hash => Box::new(RendezvousHash),
        PlacementKind::Random => Box::new(RandomPlacement),
    }
}

/// Fewest assigned bytes wins, then fewest files; remaining ties go to the
/// lowest address.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastLoaded;

impl PlacementPolicy for LeastLoaded {
    fn name(&self) -> &'static str {
        "least_loaded"
    }

    fn choose(&self, _file_name: &str, candidates: &[Candidate]) -> Option<Address> {
        candidates
            .iter()
            .min_by(|a, b| {
                a.assigned_bytes
                    .cmp(&b.assigned_bytes)
                    .then_with(|| a.file_count.cmp(&b.file_count))
                    .then_with(|| a.addr.cmp(&b.addr))
            })
            .map(|c| c.addr.clone())
    }
}

/// Cycles through the candidates in address order.
///
/// The cursor is global, so when membership changes the rotation simply
/// continues at the same index modulo the new size.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl PlacementPolicy for RoundRobin {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn choose(&self, _file_name: &str, candidates: &[Candidate]) -> Option<Address> {
        if candidates.is_empty() {
            return None;
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Some(candidates[idx].addr.clone())
    }
}

/// Highest-random-weight hashing of the file name.
///
/// For a fixed membership the same name always maps to the same node, and
/// when a node leaves only the names it owned move.
#[derive(Debug, Default, Clone, Copy)]
pub struct RendezvousHash;

impl RendezvousHash {
    fn score(addr: &Address, file_name: &str) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(addr.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(file_name.as_bytes());
        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(head)
    }
}

impl PlacementPolicy for RendezvousHash {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn choose(&self, file_name: &str, candidates: &[Candidate]) -> Option<Address> {
        candidates
            .iter()
            .max_by(|a, b| {
                Self::score(&a.addr, file_name)
                    .cmp(&Self::score(&b.addr, file_name))
                    .then_with(|| b.addr.cmp(&a.addr))
            })
            .map(|c| c.addr.clone())
    }
}

/// Uniform random choice.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPlacement;

impl PlacementPolicy for RandomPlacement {
    fn name(&self) -> &'static str {
        "random"
    }

    fn choose(&self, _file_name: &str, candidates: &[Candidate]) -> Option<Address> {
        if candidates.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..candidates.len());
        Some(candidates[idx].addr.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(addr: &str, bytes: u64) -> Candidate {
        Candidate {
            addr: Address::parse(addr).unwrap(),
            file_count: if bytes > 0 { 1 } else { 0 },
            assigned_bytes: bytes,
        }
    }

    #[test]
    fn test_least_loaded_picks_smallest() {
        let cands = vec![
            candidate("node-a:1", 300),
            candidate("node-b:1", 100),
            candidate("node-c:1", 200),
        ];
        assert_eq!(
            LeastLoaded.choose("f", &cands).unwrap().as_str(),
            "node-b:1"
        );
    }

    #[test]
    fn test_least_loaded_tie_breaks_lexically() {
        let cands = vec![candidate("node-b:1", 0), candidate("node-a:1", 0)];
        assert_eq!(
            LeastLoaded.choose("f", &cands).unwrap().as_str(),
            "node-a:1"
        );
    }

    #[test]
    fn test_least_loaded_spreads_empty_files_by_count() {
        let cands = vec![
            Candidate {
                addr: Address::parse("node-a:1").unwrap(),
                file_count: 3,
                assigned_bytes: 0,
            },
            Candidate {
                addr: Address::parse("node-b:1").unwrap(),
                file_count: 1,
                assigned_bytes: 0,
            },
        ];
        assert_eq!(
            LeastLoaded.choose("f", &cands).unwrap().as_str(),
            "node-b:1"
        );
    }

    #[test]
    fn test_single_candidate_always_chosen() {
        let cands = vec![candidate("only:1", 999)];
        let policies: Vec<Box<dyn PlacementPolicy>> = vec![
            from_kind(PlacementKind::LeastLoaded),
            from_kind(PlacementKind::RoundRobin),
            from_kind(PlacementKind::Hash),
            from_kind(PlacementKind::Random),
        ];
        for policy in policies {
            for name in ["a", "b", "c"] {
                assert_eq!(
                    policy.choose(name, &cands).unwrap().as_str(),
                    "only:1",
                    "policy {}",
                    policy.name()
                );
            }
        }
    }

    #[test]
    fn test_empty_candidates_yield_none() {
        assert!(LeastLoaded.choose("f", &[]).is_none());
        assert!(RoundRobin::default().choose("f", &[]).is_none());
        assert!(RendezvousHash.choose("f", &[]).is_none());
        assert!(RandomPlacement.choose("f", &[]).is_none());
    }

    #[test]
    fn test_round_robin_cycles() {
        let rr = RoundRobin::default();
        let cands = vec![candidate("node-a:1", 0), candidate("node-b:1", 0)];
        let picks: Vec<String> = (0..4)
            .map(|_| rr.choose("f", &cands).unwrap().to_string())
            .collect();
        assert_eq!(picks, vec!["node-a:1", "node-b:1", "node-a:1", "node-b:1"]);
    }

    #[test]
    fn test_rendezvous_is_stable_and_minimally_disruptive() {
        let full = vec![
            candidate("node-a:1", 0),
            candidate("node-b:1", 0),
            candidate("node-c:1", 0),
        ];
        let names: Vec<String> = (0..64).map(|i| format!("file-{i}")).collect();
        let before: Vec<Address> = names
            .iter()
            .map(|n| RendezvousHash.choose(n, &full).unwrap())
            .collect();
        let again: Vec<Address> = names
            .iter()
            .map(|n| RendezvousHash.choose(n, &full).unwrap())
            .collect();
        assert_eq!(before, again);

        let without_b: Vec<Candidate> = full
            .iter()
            .filter(|c| c.addr.as_str() != "node-b:1")
            .cloned()
            .collect();
        for (name, owner) in names.iter().zip(&before) {
            if owner.as_str() != "node-b:1" {
                assert_eq!(&RendezvousHash.choose(name, &without_b).unwrap(), owner);
            }
        }
    }

    #[test]
    fn test_random_stays_within_candidates() {
        let cands = vec![candidate("node-a:1", 0), candidate("node-b:1", 0)];
        for _ in 0..32 {
            let pick = RandomPlacement.choose("f", &cands).unwrap();
            assert!(cands.iter().any(|c| c.addr == pick));
        }
    }
}
