//! Extract bipartition snapshots from normalized trees.
//!
//! # Overview
//! A [`TreeSnapshot`] captures all non-trivial bipartitions (splits) of a tree
//! along with the branch length of the edge inducing each. Snapshots of two
//! trees built over the same [`LeafIndex`] can be compared directly, and are
//! immutable so they can be shared across threads.
//!
//! # What is a bipartition?
//! Each internal branch in a tree divides the leaves into two groups.
//! ```text
//!      root
//!     /    \
//!   {A,B}  {C,D}  ← this branch separates {A,B} from {C,D}
//! ```
//!
//! # Canonical form
//! The same split can be read from either side. Unrooted snapshots store the
//! smaller side; when both sides are equally large, the side that does NOT
//! contain leaf 0 (the smallest label of the leaf index). Rooted snapshots
//! store clusters: the leaves below the edge, as-is.
//!
//! Bit positions come from the shared, name-sorted [`LeafIndex`], never from
//! node handles, so identical taxa map to identical bits in both trees.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::bitset::Bitset;
use crate::error::RfError;
use crate::normalize::LeafIndex;
use crate::tree::Tree;

/// An immutable snapshot of all non-trivial bipartitions of a tree.
///
/// # Fields
/// - `parts`: all bipartitions in canonical form
/// - `lengths`: branch length per bipartition (missing lengths are 0.0)
/// - `words`: number of u64 words per bitset
/// - `num_leaves`: size of the leaf index
/// - `rooted`: whether `parts` holds rooted clusters instead of splits
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    pub parts: HashSet<Bitset>,
    pub lengths: HashMap<Bitset, f64>,
    pub words: usize,
    pub num_leaves: usize,
    pub rooted: bool,
}

impl TreeSnapshot {
    /// Extract a snapshot from a normalized tree.
    ///
    /// # Algorithm
    /// 1. Post-order traversal; a leaf's bitset has its own bit set, an
    ///    internal node's bitset is the OR of its children's.
    /// 2. Each non-root internal node induces one bipartition.
    /// 3. Skip trivial ones: a side with at most one leaf (unrooted), or a
    ///    cluster of at most one leaf or of all leaves (rooted).
    /// 4. Canonicalize (unrooted only) and record the branch length.
    ///
    /// # Errors
    /// `InvariantViolation` if a leaf is unlabeled, its label is not in
    /// `leaf_index`, or two leaves share a label.
    pub fn from_tree(tree: &Tree, leaf_index: &LeafIndex, rooted: bool) -> Result<Self, RfError> {
        let num_leaves = leaf_index.len();
        let words = Bitset::words_for(num_leaves);

        let mut parts = HashSet::new();
        let mut lengths: HashMap<Bitset, f64> = HashMap::new();
        if tree.is_empty() {
            return Ok(TreeSnapshot { parts, lengths, words, num_leaves, rooted });
        }
        let root_id = tree.get_root()?;

        // Subtree bitsets indexed by node handle
        let mut subtree: Vec<Option<Bitset>> = vec![None; tree.size()];
        let mut seen = Bitset::zeros(words);

        for id in tree.postorder() {
            let node = tree.get(id)?;
            let bitset = if node.is_leaf() {
                let label = node.name.as_deref().ok_or_else(|| {
                    RfError::InvariantViolation(format!("leaf {id} has no label"))
                })?;
                let idx = leaf_index.position(label).ok_or_else(|| {
                    RfError::InvariantViolation(format!("leaf '{label}' is not in the leaf index"))
                })?;
                if seen.contains(idx) {
                    return Err(RfError::InvariantViolation(format!(
                        "leaf '{label}' occurs more than once"
                    )));
                }
                seen.set(idx);
                let mut bitset = Bitset::zeros(words);
                bitset.set(idx);
                bitset
            } else {
                let mut bitset = Bitset::zeros(words);
                for &child in &node.children {
                    let child_bits = subtree[child].take().ok_or_else(|| {
                        RfError::InvariantViolation(format!("child {child} visited after parent {id}"))
                    })?;
                    bitset.or_assign(&child_bits);
                }
                bitset
            };

            if id != root_id && !node.is_leaf() {
                if let Some(part) = Self::canonical_part(&bitset, num_leaves, rooted) {
                    // Only possible for two edges of one unrooted edge; their lengths add up.
                    *lengths.entry(part.clone()).or_insert(0.0) += node.parent_edge.unwrap_or(0.0);
                    parts.insert(part);
                }
            }
            subtree[id] = Some(bitset);
        }

        debug!(splits = parts.len(), leaves = num_leaves, rooted, "extracted bipartitions");
        Ok(TreeSnapshot { parts, lengths, words, num_leaves, rooted })
    }

    /// Canonical form of the bipartition induced by the edge above a subtree
    /// with leaf set `side`, or `None` if the bipartition is trivial.
    ///
    /// # Example
    /// Leaves: A=0, B=1, C=2, D=3, E=4
    /// - {A,B} (unrooted): smaller side is {A,B} → kept as `0b00011`
    /// - {A,B,C} (unrooted): smaller side is {D,E} → `0b11000`
    /// - {A,B,C,D} (unrooted): other side {E} is a single leaf → `None`
    pub fn canonical_part(side: &Bitset, num_leaves: usize, rooted: bool) -> Option<Bitset> {
        let size = side.count_ones();
        if rooted {
            return (size > 1 && size < num_leaves).then(|| side.clone());
        }

        let other = num_leaves - size;
        if size <= 1 || other <= 1 {
            return None;
        }
        let flip = match size.cmp(&other) {
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Greater => true,
            // Tie: keep the side without leaf 0
            std::cmp::Ordering::Equal => side.contains(0),
        };
        Some(if flip { side.complement(num_leaves) } else { side.clone() })
    }

    /// Number of non-trivial bipartitions.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Sum of the absolute branch lengths of all bipartitions.
    pub fn total_length(&self) -> f64 {
        self.lengths.values().map(|length| length.abs()).sum()
    }

    /// Human-readable bipartitions, sorted by stored side.
    pub fn bipartitions(&self, leaf_index: &LeafIndex) -> Vec<Bipartition> {
        let mut parts: Vec<&Bitset> = self.parts.iter().collect();
        parts.sort_unstable_by_key(|part| (part.count_ones(), part.ones().collect::<Vec<_>>()));
        parts
            .into_iter()
            .map(|part| Bipartition::from_bitset(part, leaf_index, self.num_leaves))
            .collect()
    }
}

/// A bipartition spelled out with taxon labels.
///
/// `side` is the stored (canonical) side, `rest` the complement; both are
/// sorted in leaf-index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bipartition {
    pub side: Vec<String>,
    pub rest: Vec<String>,
}

impl Bipartition {
    fn from_bitset(part: &Bitset, leaf_index: &LeafIndex, num_leaves: usize) -> Self {
        let labels = |bits: &Bitset| -> Vec<String> {
            bits.ones()
                .filter_map(|idx| leaf_index.label(idx).map(str::to_string))
                .collect()
        };
        Bipartition {
            side: labels(part),
            rest: labels(&part.complement(num_leaves)),
        }
    }
}

impl std::fmt::Display for Bipartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}} | {{{}}}", self.side.join(","), self.rest.join(","))
    }
}
