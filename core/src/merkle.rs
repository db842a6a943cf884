use crate::collaborators::ContentStore;
use crate::errors::MerkleError;
use crate::model::{Candidate, Cid};

/// One leaf of a built [`MerkleTree`]: the candidate it commits to, and its
/// root-to-leaf path as `"b1/b2/.../bd"`, left = `0`, right = `1`.
#[derive(Debug, Clone)]
pub struct MerkleLeaf {
    pub candidate: Candidate,
    pub path: String,
}

/// An in-memory, per-cycle balanced binary tree over candidates. Discarded
/// once the cycle finishes emitting anchors.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    pub leaves: Vec<MerkleLeaf>,
    pub root: Option<Cid>,
}

impl MerkleTree {
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }
}

/// Builds a [`MerkleTree`] from an ordered list of candidates, bounded by a
/// configured maximum depth.
pub struct MerkleBuilder {
    max_depth: u32,
}

impl MerkleBuilder {
    pub fn new(max_depth: u32) -> Self {
        MerkleBuilder { max_depth }
    }

    /// Builds the tree. `candidates` must already be in the order they
    /// should occupy leaves left to right (stream-level FIFO, see
    /// `CandidateSelector`).
    ///
    /// Returns an empty tree for an empty input — callers should treat that
    /// as "skip this cycle" rather than an error. Fails with
    /// [`MerkleError::BatchTooLarge`] if `candidates.len()` exceeds what the
    /// configured depth can hold; the coordinator is expected to have
    /// enforced `effective_anchor_limit` before calling this.
    pub async fn build(
        &self,
        candidates: Vec<Candidate>,
        store: &dyn ContentStore,
    ) -> anyhow::Result<MerkleTree> {
        if candidates.is_empty() {
            return Ok(MerkleTree {
                leaves: vec![],
                root: None,
            });
        }

        let max_leaves = 1usize.checked_shl(self.max_depth).unwrap_or(usize::MAX);
        if candidates.len() > max_leaves {
            return Err(MerkleError::BatchTooLarge {
                candidates: candidates.len(),
                max_leaves,
            }
            .into());
        }

        let depth = leaf_depth(candidates.len());
        let total_slots = 1usize << depth;

        let mut level: Vec<Option<Cid>> = candidates.iter().map(|c| Some(c.cid.clone())).collect();
        level.resize(total_slots, None);

        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len() / 2);
            for pair in level.chunks(2) {
                let node = match (&pair[0], &pair[1]) {
                    (Some(l), Some(r)) => {
                        let node = serde_json::json!({ "l": l.to_string(), "r": r.to_string() });
                        Some(store.put(&node).await?)
                    }
                    (Some(l), None) => Some(l.clone()),
                    (None, None) => None,
                    (None, Some(_)) => unreachable!("left-packed tree never skips a left slot"),
                };
                next.push(node);
            }
            level = next;
        }

        let root = level.into_iter().next().flatten();
        let leaves = candidates
            .into_iter()
            .enumerate()
            .map(|(i, candidate)| MerkleLeaf {
                path: leaf_path(i, depth),
                candidate,
            })
            .collect();

        Ok(MerkleTree { leaves, root })
    }
}

/// `ceil(log2(n))`, with `leaf_depth(0) == leaf_depth(1) == 0`.
fn leaf_depth(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as u32
    }
}

fn leaf_path(index: usize, depth: u32) -> String {
    if depth == 0 {
        return String::new();
    }
    (0..depth)
        .map(|b| {
            let shift = depth - 1 - b;
            if (index >> shift) & 1 == 1 {
                '1'
            } else {
                '0'
            }
        })
        .collect::<Vec<_>>()
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("/")
}
