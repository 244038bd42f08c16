//! Domain-separated binary Merkle tree over audit entry hashes.
//!
//! Leaves are `H(LEAF || this_hash)`, interior nodes `H(NODE || left || right)`.
//! An odd node at the end of a level is promoted unchanged.

use concord_types::ChainHash;
use serde::{Deserialize, Serialize};

use crate::entry::AuditLogEntry;

const LEAF_DOMAIN: &[u8] = b"concord-merkle-leaf-v1:";
const NODE_DOMAIN: &[u8] = b"concord-merkle-node-v1:";

/// Which side of the running hash a sibling sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub hash: ChainHash,
    pub side: Side,
}

/// Inclusion proof of one entry in a committed range.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub seq: u64,
    pub from_seq: u64,
    pub to_seq: u64,
    pub steps: Vec<ProofStep>,
    pub root: ChainHash,
}

fn leaf_hash(entry_hash: &ChainHash) -> ChainHash {
    ChainHash::digest(LEAF_DOMAIN, &[entry_hash.as_bytes()])
}

fn node_hash(left: &ChainHash, right: &ChainHash) -> ChainHash {
    ChainHash::digest(NODE_DOMAIN, &[left.as_bytes(), right.as_bytes()])
}

fn next_level(level: &[ChainHash]) -> Vec<ChainHash> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => node_hash(left, right),
            [single] => *single,
            _ => ChainHash::GENESIS,
        })
        .collect()
}

/// Root over a sequence of entry hashes. `None` for an empty range.
pub fn merkle_root(entry_hashes: &[ChainHash]) -> Option<ChainHash> {
    if entry_hashes.is_empty() {
        return None;
    }
    let mut level: Vec<ChainHash> = entry_hashes.iter().map(leaf_hash).collect();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level.first().copied()
}

/// Sibling path from leaf `index` to the root.
pub(crate) fn proof_steps(entry_hashes: &[ChainHash], index: usize) -> Option<Vec<ProofStep>> {
    if index >= entry_hashes.len() {
        return None;
    }
    let mut level: Vec<ChainHash> = entry_hashes.iter().map(leaf_hash).collect();
    let mut idx = index;
    let mut steps = Vec::new();
    while level.len() > 1 {
        let sibling = idx ^ 1;
        if let Some(hash) = level.get(sibling) {
            let side = if sibling < idx { Side::Left } else { Side::Right };
            steps.push(ProofStep { hash: *hash, side });
        }
        level = next_level(&level);
        idx /= 2;
    }
    Some(steps)
}

/// Check that `entry` is intact and included under `proof.root`.
pub fn verify_inclusion(entry: &AuditLogEntry, proof: &MerkleProof) -> bool {
    if entry.seq != proof.seq || entry.seq < proof.from_seq || entry.seq > proof.to_seq {
        return false;
    }
    if !matches!(entry.hash_matches(), Ok(true)) {
        return false;
    }
    let computed = proof
        .steps
        .iter()
        .fold(leaf_hash(&entry.this_hash), |acc, step| match step.side {
            Side::Left => node_hash(&step.hash, &acc),
            Side::Right => node_hash(&acc, &step.hash),
        });
    computed == proof.root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashes(n: usize) -> Vec<ChainHash> {
        (0..n)
            .map(|i| ChainHash::digest(b"test:", &[&(i as u64).to_le_bytes()]))
            .collect()
    }

    fn fold(leaf: &ChainHash, steps: &[ProofStep]) -> ChainHash {
        steps.iter().fold(leaf_hash(leaf), |acc, s| match s.side {
            Side::Left => node_hash(&s.hash, &acc),
            Side::Right => node_hash(&acc, &s.hash),
        })
    }

    #[test]
    fn empty_range_has_no_root() {
        assert!(merkle_root(&[]).is_none());
    }

    #[test]
    fn single_leaf_root_is_leaf_hash() {
        let h = hashes(1);
        assert_eq!(merkle_root(&h), Some(leaf_hash(&h[0])));
        assert!(proof_steps(&h, 0).unwrap().is_empty());
    }

    #[test]
    fn every_leaf_proves_for_odd_and_even_sizes() {
        for n in [2usize, 3, 5, 7, 8, 13] {
            let h = hashes(n);
            let root = merkle_root(&h).unwrap();
            for (i, leaf) in h.iter().enumerate() {
                let steps = proof_steps(&h, i).unwrap();
                assert_eq!(fold(leaf, &steps), root, "n={n} i={i}");
            }
        }
    }

    #[test]
    fn wrong_leaf_does_not_prove() {
        let h = hashes(6);
        let root = merkle_root(&h).unwrap();
        let steps = proof_steps(&h, 2).unwrap();
        assert_ne!(fold(&h[3], &steps), root);
        assert!(proof_steps(&h, 6).is_none());
    }

    #[test]
    fn root_changes_when_any_leaf_changes() {
        let mut h = hashes(4);
        let root = merkle_root(&h).unwrap();
        h[1] = ChainHash::digest(b"other:", &[b"x"]);
        assert_ne!(merkle_root(&h).unwrap(), root);
    }
}
