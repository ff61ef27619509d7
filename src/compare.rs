//! Entry point for comparing two Newick strings.

use std::fmt;

use tracing::debug;

use crate::distances::{
    normalized_rf_from_snapshots, normalized_weighted_rf_from_snapshots, rf_from_snapshots,
    weighted_rf_from_snapshots,
};
use crate::error::RfError;
use crate::newick::parse_newick;
use crate::normalize::normalize_pair;
use crate::snapshot::TreeSnapshot;

/// How two trees are compared.
///
/// The default compares unrooted topologies and returns the raw count of
/// differing bipartitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RfOptions {
    /// Compare clusters below the root instead of unrooted splits.
    pub rooted: bool,
    /// Scale the result into [0, 1].
    pub normalized: bool,
    /// Use branch lengths (weighted RF) instead of counting splits.
    pub weighted: bool,
}

impl RfOptions {
    pub fn with_rooted(mut self, rooted: bool) -> Self {
        self.rooted = rooted;
        self
    }

    pub fn with_normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }

    pub fn with_weighted(mut self, weighted: bool) -> Self {
        self.weighted = weighted;
        self
    }
}

/// Result of a comparison: a split count, or a real value for normalized or
/// weighted comparisons.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distance {
    Count(usize),
    Real(f64),
}

impl Distance {
    pub fn as_f64(self) -> f64 {
        match self {
            Distance::Count(count) => count as f64,
            Distance::Real(value) => value,
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distance::Count(count) => write!(f, "{count}"),
            Distance::Real(value) => write!(f, "{value}"),
        }
    }
}

/// Robinson-Foulds distance between two Newick trees.
///
/// Both strings are parsed, checked for a shared taxon set, normalized and
/// reduced to their bipartitions before the distance is taken. The first
/// error of any stage is returned unchanged.
///
/// # Example
/// ```
/// use rf_tree_distance::{calculate_rf_distance, Distance, RfOptions};
///
/// let d = calculate_rf_distance("((A,B),(C,D));", "((A,C),(B,D));", &RfOptions::default()).unwrap();
/// assert_eq!(d, Distance::Count(2));
/// ```
pub fn calculate_rf_distance(tree_a: &str, tree_b: &str, options: &RfOptions) -> Result<Distance, RfError> {
    let a = parse_newick(tree_a)?;
    let b = parse_newick(tree_b)?;

    let pair = normalize_pair(&a, &b, options.rooted)?;
    let snap_a = TreeSnapshot::from_tree(&pair.first, &pair.leaf_index, options.rooted)?;
    let snap_b = TreeSnapshot::from_tree(&pair.second, &pair.leaf_index, options.rooted)?;

    let distance = match (options.weighted, options.normalized) {
        (false, false) => Distance::Count(rf_from_snapshots(&snap_a, &snap_b)),
        (false, true) => Distance::Real(normalized_rf_from_snapshots(&snap_a, &snap_b)),
        (true, false) => Distance::Real(weighted_rf_from_snapshots(&snap_a, &snap_b)),
        (true, true) => Distance::Real(normalized_weighted_rf_from_snapshots(&snap_a, &snap_b)),
    };
    debug!(
        splits_a = snap_a.len(),
        splits_b = snap_b.len(),
        rooted = options.rooted,
        normalized = options.normalized,
        weighted = options.weighted,
        %distance,
        "computed RF distance"
    );
    Ok(distance)
}

/// Unrooted, unweighted Robinson-Foulds distance as a plain count.
pub fn rf_distance(tree_a: &str, tree_b: &str) -> Result<usize, RfError> {
    let a = parse_newick(tree_a)?;
    let b = parse_newick(tree_b)?;
    let pair = normalize_pair(&a, &b, false)?;
    let snap_a = TreeSnapshot::from_tree(&pair.first, &pair.leaf_index, false)?;
    let snap_b = TreeSnapshot::from_tree(&pair.second, &pair.leaf_index, false)?;
    Ok(rf_from_snapshots(&snap_a, &snap_b))
}
