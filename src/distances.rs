//! Tree distance metrics using bitset-based snapshots.
//!
//! This module implements four phylogenetic tree distance measures:
//!
//! 1. **Robinson-Foulds (RF)**: Counts the bipartitions present in exactly one
//!    of the two trees. Range: [0, 2n-6] where n is the number of leaves.
//!
//! 2. **Normalized RF**: RF divided by the number of bipartitions of both
//!    trees, which is 2(n-3) for two fully resolved trees. Range: [0, 1].
//!
//! 3. **Weighted Robinson-Foulds**: Like RF but considers branch lengths.
//!    For shared partitions, adds |length_a - length_b|.
//!    For unique partitions, adds the full branch length.
//!
//! 4. **Kuhner-Felsenstein (Branch Score)**: Similar to weighted RF but uses
//!    squared differences: sqrt(Σ(length_a - length_b)²)
//!
//! All snapshot-level functions assume both snapshots were built over the same
//! [`LeafIndex`] and in the same mode (rooted or unrooted).

use rayon::prelude::*;
use tracing::debug;

use crate::error::RfError;
use crate::normalize::{check_same_taxa, normalize_pair, normalized_copy, LeafIndex};
use crate::snapshot::TreeSnapshot;
use crate::tree::Tree;

/// Builds the snapshots of two trees after validating and normalizing them.
fn snapshot_pair(tree_a: &Tree, tree_b: &Tree, rooted: bool) -> Result<(TreeSnapshot, TreeSnapshot), RfError> {
    let pair = normalize_pair(tree_a, tree_b, rooted)?;
    let snap_a = TreeSnapshot::from_tree(&pair.first, &pair.leaf_index, rooted)?;
    let snap_b = TreeSnapshot::from_tree(&pair.second, &pair.leaf_index, rooted)?;
    Ok((snap_a, snap_b))
}

/// Compute the unrooted Robinson-Foulds distance between two trees.
///
/// # Example
/// ```text
/// Tree 1:  ((A,B),(C,D))     Split: {A,B}|{C,D}
/// Tree 2:  ((A,C),(B,D))     Split: {A,C}|{B,D}
///
/// No split is shared
/// RF = 1 + 1 = 2
/// ```
///
/// # Errors
/// Returns `LabelMismatch` if the trees have different leaf sets.
pub fn robinson_foulds(tree_a: &Tree, tree_b: &Tree) -> Result<usize, RfError> {
    let (snap_a, snap_b) = snapshot_pair(tree_a, tree_b, false)?;
    Ok(rf_from_snapshots(&snap_a, &snap_b))
}

/// Compute the rooted Robinson-Foulds distance (on clusters) between two trees.
pub fn rooted_robinson_foulds(tree_a: &Tree, tree_b: &Tree) -> Result<usize, RfError> {
    let (snap_a, snap_b) = snapshot_pair(tree_a, tree_b, true)?;
    Ok(rf_from_snapshots(&snap_a, &snap_b))
}

/// Compute Robinson-Foulds distance from two pre-computed snapshots.
///
/// # Algorithm
/// ```text
/// intersection = A.parts ∩ B.parts
/// RF = |A \ B| + |B \ A| = len(A) + len(B) - 2 * len(intersection)
/// ```
pub fn rf_from_snapshots(a: &TreeSnapshot, b: &TreeSnapshot) -> usize {
    let inter = a.parts.intersection(&b.parts).count();
    a.parts.len() + b.parts.len() - 2 * inter
}

/// Compute normalized Robinson-Foulds distance from two snapshots.
///
/// Divides RF by the largest value it could take for these two trees, the
/// total number of bipartitions in both. For two resolved trees this is
/// 2(n-3); a multifurcating tree lowers it. Returns 0.0 when neither tree has
/// a bipartition.
pub fn normalized_rf_from_snapshots(a: &TreeSnapshot, b: &TreeSnapshot) -> f64 {
    let max = a.parts.len() + b.parts.len();
    if max == 0 {
        return 0.0;
    }
    rf_from_snapshots(a, b) as f64 / max as f64
}

/// Compute Weighted Robinson-Foulds distance between two trees (unrooted).
///
/// # Algorithm
/// For each partition:
/// - If in both trees: add |length_a - length_b|
/// - If only in A: add |length_a|
/// - If only in B: add |length_b|
///
/// # Example
/// ```text
/// Tree 1: ((A:1.0,B:1.0):2.0,(C:1.0,D:1.0):2.0,E:1.0);
/// Tree 2: ((A:1.5,B:1.0):3.0,(C:0.5,D:1.0):2.0,E:1.0);
///
/// Shared partition {A,B}: |2.0 - 3.0| = 1.0
/// Shared partition {C,D}: |2.0 - 2.0| = 0.0
/// Leaf branches are trivial splits and do not contribute
/// ```
///
/// # Errors
/// Returns `LabelMismatch` if the trees have different leaf sets.
pub fn weighted_robinson_foulds(tree_a: &Tree, tree_b: &Tree) -> Result<f64, RfError> {
    let (snap_a, snap_b) = snapshot_pair(tree_a, tree_b, false)?;
    Ok(weighted_rf_from_snapshots(&snap_a, &snap_b))
}

/// Compute Weighted RF distance from two pre-computed snapshots.
pub fn weighted_rf_from_snapshots(a: &TreeSnapshot, b: &TreeSnapshot) -> f64 {
    let mut distance = 0.0;

    for part in &a.parts {
        let length_a = a.lengths.get(part).unwrap_or(&0.0);

        if let Some(length_b) = b.lengths.get(part) {
            distance += (length_a - length_b).abs();
        } else {
            distance += length_a.abs();
        }
    }

    // Partitions only in B
    for part in &b.parts {
        if !a.parts.contains(part) {
            distance += b.lengths.get(part).unwrap_or(&0.0).abs();
        }
    }

    distance
}

/// Weighted RF divided by the summed absolute branch length of all
/// bipartitions of both trees, so the result lies in [0, 1] even when a
/// tree carries negative lengths; 0.0 when that sum is zero.
pub fn normalized_weighted_rf_from_snapshots(a: &TreeSnapshot, b: &TreeSnapshot) -> f64 {
    let total = a.total_length() + b.total_length();
    if total == 0.0 {
        return 0.0;
    }
    weighted_rf_from_snapshots(a, b) / total
}

/// Compute Kuhner-Felsenstein (Branch Score) distance between two trees.
///
/// # Algorithm
/// Like Weighted RF but uses squared differences:
/// distance = sqrt(Σ (length_a - length_b)²)
///
/// # Errors
/// Returns `LabelMismatch` if the trees have different leaf sets.
pub fn kuhner_felsenstein(tree_a: &Tree, tree_b: &Tree) -> Result<f64, RfError> {
    let (snap_a, snap_b) = snapshot_pair(tree_a, tree_b, false)?;
    Ok(kf_from_snapshots(&snap_a, &snap_b))
}

/// Compute Kuhner-Felsenstein distance from two pre-computed snapshots.
pub fn kf_from_snapshots(a: &TreeSnapshot, b: &TreeSnapshot) -> f64 {
    let mut sum_squared = 0.0;

    for part in &a.parts {
        let length_a = a.lengths.get(part).unwrap_or(&0.0);

        if let Some(length_b) = b.lengths.get(part) {
            let diff = length_a - length_b;
            sum_squared += diff * diff;
        } else {
            sum_squared += length_a * length_a;
        }
    }

    for part in &b.parts {
        if !a.parts.contains(part) {
            let length_b = b.lengths.get(part).unwrap_or(&0.0);
            sum_squared += length_b * length_b;
        }
    }

    sum_squared.sqrt()
}

/// Distance measure used for pairwise matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Rf,
    NormalizedRf,
    WeightedRf,
    Kf,
}

impl Metric {
    /// Distance between two snapshots under this metric.
    pub fn between(self, a: &TreeSnapshot, b: &TreeSnapshot) -> f64 {
        match self {
            Metric::Rf => rf_from_snapshots(a, b) as f64,
            Metric::NormalizedRf => normalized_rf_from_snapshots(a, b),
            Metric::WeightedRf => weighted_rf_from_snapshots(a, b),
            Metric::Kf => kf_from_snapshots(a, b),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Metric::Rf => "RF",
            Metric::NormalizedRf => "Normalized RF",
            Metric::WeightedRf => "Weighted",
            Metric::Kf => "KF",
        }
    }
}

/// Validate a collection of trees against the first one and build one
/// snapshot per tree over a shared leaf index.
///
/// # Errors
/// - `InvariantViolation` if `trees` is empty
/// - `LabelMismatch` if any tree's taxa differ from the first tree's
pub fn build_bitset_snapshots(trees: &[Tree], rooted: bool) -> Result<(LeafIndex, Vec<TreeSnapshot>), RfError> {
    let first = trees
        .first()
        .ok_or_else(|| RfError::InvariantViolation("no trees to compare".to_string()))?;
    let leaf_index = LeafIndex::from_tree(first)?;
    for tree in &trees[1..] {
        check_same_taxa(first, tree)?;
    }

    let snapshots = trees
        .par_iter()
        .map(|tree| {
            let normalized = normalized_copy(tree, rooted)?;
            TreeSnapshot::from_tree(&normalized, &leaf_index, rooted)
        })
        .collect::<Result<Vec<_>, _>>()?;
    debug!(trees = snapshots.len(), leaves = leaf_index.len(), rooted, "built snapshots");
    Ok((leaf_index, snapshots))
}

/// Compute all i < j distances in parallel.
pub fn compute_pairwise_parallel<T, F>(snaps: &[TreeSnapshot], distance: F) -> Vec<(usize, usize, T)>
where
    T: Send,
    F: Fn(&TreeSnapshot, &TreeSnapshot) -> T + Sync,
{
    let n = snaps.len();
    (0..n)
        .into_par_iter()
        .flat_map_iter(|i| (i + 1..n).map(move |j| (i, j)))
        .map(|(i, j)| (i, j, distance(&snaps[i], &snaps[j])))
        .collect()
}

/// Pairwise RF distances for all i < j.
pub fn compute_pairwise_rf_bitset_parallel(snaps: &[TreeSnapshot]) -> Vec<(usize, usize, usize)> {
    compute_pairwise_parallel(snaps, rf_from_snapshots)
}

/// Symmetric n × n matrix under `metric`, zero on the diagonal.
pub fn distance_matrix(snaps: &[TreeSnapshot], metric: Metric) -> Vec<Vec<f64>> {
    let n = snaps.len();
    let mut mat = vec![vec![0.0f64; n]; n];
    for (i, j, d) in compute_pairwise_parallel(snaps, |a, b| metric.between(a, b)) {
        mat[i][j] = d;
        mat[j][i] = d;
    }
    mat
}
