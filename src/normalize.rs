//! Prepare a pair of trees for bipartition comparison.
//!
//! # Steps
//! 1. Check that both trees carry exactly the same taxa ([`check_same_taxa`]).
//! 2. Build the shared [`LeafIndex`]: labels sorted byte-wise, label → bit.
//! 3. Copy each tree, collapsing unary nodes and (unless comparing rooted
//!    trees) suppressing a bifurcating root ([`normalized_copy`]).
//!
//! # Why suppress the root?
//! ```text
//!          root                          X
//!         /    \                      /  |  \
//!        X      C        ==>         A   B   C
//!       / \
//!      A   B
//! ```
//! Both edges below a bifurcating root separate the same two leaf sets, so
//! they are one edge of the unrooted tree. Merging them keeps one split per
//! edge and sums the two branch lengths.
//!
//! The input trees are never modified.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, trace};

use crate::error::RfError;
use crate::tree::{Node, NodeId, Tree};

/// Sorted taxon labels shared by the trees of one comparison.
///
/// Labels are ordered byte-wise (`str` ordering) so bit positions, and thus
/// canonical bipartitions, are the same on every platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafIndex {
    labels: Vec<String>,
    positions: HashMap<String, usize>,
}

impl LeafIndex {
    /// Builds the index from the leaves of one tree.
    ///
    /// # Errors
    /// - `DuplicateLabel` if a label occurs twice
    /// - `InvariantViolation` if a leaf has no label
    pub fn from_tree(tree: &Tree) -> Result<Self, RfError> {
        let mut labels = Vec::with_capacity(tree.n_leaves());
        for id in tree.get_leaves() {
            let name = tree.get(id)?.name.clone().ok_or_else(|| {
                RfError::InvariantViolation(format!("leaf {id} has no label"))
            })?;
            labels.push(name);
        }
        labels.sort();

        if let Some(pair) = labels.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(RfError::DuplicateLabel {
                label: pair[0].clone(),
            });
        }

        let positions = labels
            .iter()
            .enumerate()
            .map(|(idx, label)| (label.clone(), idx))
            .collect();
        Ok(LeafIndex { labels, positions })
    }

    /// Bit position of `label`, if it is part of the index.
    pub fn position(&self, label: &str) -> Option<usize> {
        self.positions.get(label).copied()
    }

    /// Label at bit position `idx`.
    pub fn label(&self, idx: usize) -> Option<&str> {
        self.labels.get(idx).map(String::as_str)
    }

    /// All labels in bit order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Verifies that `a` and `b` have identical leaf-label sets and returns the
/// shared [`LeafIndex`].
///
/// # Errors
/// `LabelMismatch` with the sorted symmetric difference of both label sets.
pub fn check_same_taxa(a: &Tree, b: &Tree) -> Result<LeafIndex, RfError> {
    let index = LeafIndex::from_tree(a)?;
    let labels_a: BTreeSet<&str> = index.labels().iter().map(String::as_str).collect();
    let labels_b: BTreeSet<&str> = b.leaf_names().into_iter().collect();

    if labels_a != labels_b || b.n_leaves() != index.len() {
        let labels: Vec<String> = labels_a
            .symmetric_difference(&labels_b)
            .map(|label| label.to_string())
            .collect();
        if labels.is_empty() {
            // Same label set but different leaf counts: b repeats a label.
            LeafIndex::from_tree(b)?;
        }
        return Err(RfError::LabelMismatch { labels });
    }
    Ok(index)
}

/// Follows a chain of single-child nodes starting at `id`.
///
/// Returns the first node with zero or several children, together with the
/// summed branch length of the chain's edges below `id` (`None` if no edge on
/// the chain carries a length).
fn skip_unary(tree: &Tree, mut id: NodeId) -> Result<(NodeId, Option<f64>), RfError> {
    let mut length = None;
    loop {
        let node = tree.get(id)?;
        match node.children.as_slice() {
            [only] => {
                length = add_lengths(length, tree.get(*only)?.parent_edge);
                id = *only;
            }
            _ => return Ok((id, length)),
        }
    }
}

fn add_lengths(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
    }
}

/// Children of `id` after skipping unary chains below each child, with the
/// length of the resulting merged edge.
fn resolved_children(tree: &Tree, id: NodeId) -> Result<Vec<(NodeId, Option<f64>)>, RfError> {
    tree.get(id)?
        .children
        .iter()
        .map(|&child| {
            let (resolved, below) = skip_unary(tree, child)?;
            Ok((resolved, add_lengths(tree.get(child)?.parent_edge, below)))
        })
        .collect()
}

/// Returns a normalized copy of `tree`.
///
/// - Every node with exactly one child is replaced by that child; branch
///   lengths along the collapsed chain are summed.
/// - If `rooted` is false and the root has exactly two children, at least one
///   of them internal, the root is removed: its first internal child becomes
///   the new root and the other child hangs below it with the two root edge
///   lengths summed.
///
/// Labels and the order of children are preserved.
pub fn normalized_copy(tree: &Tree, rooted: bool) -> Result<Tree, RfError> {
    let mut out = Tree::new();
    if tree.is_empty() {
        return Ok(out);
    }

    let (root, _) = skip_unary(tree, tree.get_root()?)?;
    let mut top = root;
    let mut extra: Option<(NodeId, Option<f64>)> = None;

    if !rooted {
        let children = resolved_children(tree, root)?;
        if let [first, second] = children.as_slice() {
            let first_internal = !tree.get(first.0)?.is_leaf();
            let second_internal = !tree.get(second.0)?.is_leaf();
            let merged = add_lengths(first.1, second.1);
            if first_internal {
                top = first.0;
                extra = Some((second.0, merged));
            } else if second_internal {
                top = second.0;
                extra = Some((first.0, merged));
            }
        }
    }

    let top_node = tree.get(top)?;
    let new_root = out.add(Node {
        name: top_node.name.clone(),
        ..Node::new()
    })?;

    // (source node, parent in `out`, merged edge length)
    let mut stack: Vec<(NodeId, NodeId, Option<f64>)> = Vec::new();
    if let Some((other, length)) = extra {
        stack.push((other, new_root, length));
    }
    for (child, length) in resolved_children(tree, top)?.into_iter().rev() {
        stack.push((child, new_root, length));
    }

    while let Some((source, parent, length)) = stack.pop() {
        let node = tree.get(source)?;
        let id = out.add_child(
            Node {
                name: node.name.clone(),
                ..Node::new()
            },
            parent,
            length,
        )?;
        for (child, child_length) in resolved_children(tree, source)?.into_iter().rev() {
            stack.push((child, id, child_length));
        }
    }

    trace!(
        before = tree.size(),
        after = out.size(),
        rooted,
        "normalized tree"
    );
    Ok(out)
}

/// A pair of trees ready for bipartition extraction.
#[derive(Debug, Clone)]
pub struct NormalizedPair {
    pub first: Tree,
    pub second: Tree,
    pub leaf_index: LeafIndex,
}

/// Validates that `a` and `b` are comparable and returns normalized copies
/// plus their shared leaf index.
pub fn normalize_pair(a: &Tree, b: &Tree, rooted: bool) -> Result<NormalizedPair, RfError> {
    let leaf_index = check_same_taxa(a, b)?;
    let first = normalized_copy(a, rooted)?;
    let second = normalized_copy(b, rooted)?;
    debug!(
        leaves = leaf_index.len(),
        nodes_a = first.size(),
        nodes_b = second.size(),
        rooted,
        "normalized tree pair"
    );
    Ok(NormalizedPair {
        first,
        second,
        leaf_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::newick::parse_newick;

    fn tree(newick: &str) -> Tree {
        parse_newick(newick).unwrap()
    }

    #[test]
    fn leaf_index_is_sorted_bytewise() {
        let index = LeafIndex::from_tree(&tree("(b,(a,C),B);")).unwrap();
        assert_eq!(index.labels(), &["B", "C", "a", "b"]);
        assert_eq!(index.position("a"), Some(2));
        assert_eq!(index.label(0), Some("B"));
        assert_eq!(index.position("z"), None);
    }

    #[test]
    fn same_taxa_in_any_order() {
        let index = check_same_taxa(&tree("((A,B),C);"), &tree("(C,(B,A));")).unwrap();
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn mismatch_names_symmetric_difference() {
        match check_same_taxa(&tree("(A,B);"), &tree("(A,C);")) {
            Err(RfError::LabelMismatch { labels }) => assert_eq!(labels, vec!["B", "C"]),
            other => panic!("expected label mismatch, got {other:?}"),
        }
        match check_same_taxa(&tree("(A,B,C);"), &tree("(A,B);")) {
            Err(RfError::LabelMismatch { labels }) => assert_eq!(labels, vec!["C"]),
            other => panic!("expected label mismatch, got {other:?}"),
        }
    }

    #[test]
    fn unlabeled_leaf_is_invariant_violation() {
        let mut t = Tree::new();
        let root = t.add(Node::new()).unwrap();
        t.add_child(Node::new(), root, None).unwrap();
        t.add_child(Node::new_named("A"), root, None).unwrap();
        assert!(matches!(LeafIndex::from_tree(&t), Err(RfError::InvariantViolation(_))));
    }

    #[test]
    fn duplicate_in_hand_built_tree() {
        let mut t = Tree::new();
        let root = t.add(Node::new()).unwrap();
        t.add_child(Node::new_named("A"), root, None).unwrap();
        t.add_child(Node::new_named("A"), root, None).unwrap();
        assert!(matches!(LeafIndex::from_tree(&t), Err(RfError::DuplicateLabel { .. })));
    }

    #[test]
    fn collapses_unary_chains_and_sums_lengths() {
        let t = tree("((((A:1):2,B:1):1):0.5,C:1,D:1);");
        let n = normalized_copy(&t, true).unwrap();
        assert_eq!(n.to_newick(), "((A:3,B:1):1.5,C:1,D:1);");
        assert_eq!(n.n_leaves(), 4);
    }

    #[test]
    fn unary_root_is_dropped() {
        let t = tree("((A,B,C));");
        let n = normalized_copy(&t, true).unwrap();
        assert_eq!(n.to_newick(), "(A,B,C);");
    }

    #[test]
    fn suppresses_bifurcating_root_when_unrooted() {
        let t = tree("((A:1,B:1):2,C:3);");
        let unrooted = normalized_copy(&t, false).unwrap();
        assert_eq!(unrooted.to_newick(), "(A:1,B:1,C:5);");

        let rooted = normalized_copy(&t, true).unwrap();
        assert_eq!(rooted.to_newick(), "((A:1,B:1):2,C:3);");
    }

    #[test]
    fn keeps_two_leaf_tree() {
        let t = tree("(A:1,B:2);");
        assert_eq!(normalized_copy(&t, false).unwrap().to_newick(), "(A:1,B:2);");
    }

    #[test]
    fn suppressing_root_between_two_subtrees() {
        let t = tree("((A,B)x:1,(C,D)y:2);");
        let n = normalized_copy(&t, false).unwrap();
        assert_eq!(n.to_newick(), "(A,B,(C,D)y:3)x;");
    }

    #[test]
    fn input_is_not_modified() {
        let t = tree("(((A,B)),C);");
        let before = t.clone();
        let _ = normalize_pair(&t, &tree("(A,(B,C));"), false).unwrap();
        assert_eq!(t, before);
    }
}
