//! Arena-backed phylogenetic tree.
//!
//! # Overview
//! Nodes are stored in a `Vec` owned by the [`Tree`] and addressed by
//! [`NodeId`] handles. Each node knows its children (ordered, as written in
//! the Newick string) and, for bookkeeping only, its parent.
//!
//! ```text
//!        root (id 0)
//!       /    \
//!   A (1)    node (2)      "(A,(B,C));"
//!            /    \
//!         B (3)   C (4)
//! ```
//!
//! Trees are built once (by the parser, the normalizer or a conversion) and
//! only read afterwards.

use std::fmt;

use crate::error::RfError;

/// Handle of a node inside a [`Tree`].
pub type NodeId = usize;

/// A node of a [`Tree`].
///
/// # Fields
/// - `name`: taxon label for leaves, optional label for internal nodes
/// - `children`: ordered child handles (empty for leaves)
/// - `parent`: parent handle, `None` for the root
/// - `parent_edge`: length of the branch leading to this node, if given
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    pub name: Option<String>,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
    pub parent_edge: Option<f64>,
}

impl Node {
    /// Creates an unnamed node without branch length.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a leaf node carrying a taxon label.
    pub fn new_named(name: &str) -> Self {
        Node {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A rooted arena tree with unique leaf labels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tree {
    nodes: Vec<Node>,
    num_leaves: usize,
}

impl Tree {
    /// Creates an empty tree. The first node added becomes the root.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the root node and returns its handle.
    ///
    /// # Errors
    /// Returns `InvariantViolation` if the tree already has a root; every
    /// later node goes through [`Tree::add_child`].
    pub fn add(&mut self, node: Node) -> Result<NodeId, RfError> {
        if !self.nodes.is_empty() {
            return Err(RfError::InvariantViolation(
                "tree already has a root".to_string(),
            ));
        }
        self.nodes.push(Node { parent: None, ..node });
        self.num_leaves = 1;
        Ok(0)
    }

    /// Adds `node` as the last child of `parent` with the given branch length.
    ///
    /// # Errors
    /// Returns `InvariantViolation` if `parent` is not a node of this tree.
    pub fn add_child(
        &mut self,
        node: Node,
        parent: NodeId,
        edge: Option<f64>,
    ) -> Result<NodeId, RfError> {
        let id = self.nodes.len();
        // A leaf that gains its first child stops being a leaf, the new child is one.
        if !self.get(parent)?.children.is_empty() {
            self.num_leaves += 1;
        }
        self.get_mut(parent)?.children.push(id);
        self.nodes.push(Node {
            parent: Some(parent),
            parent_edge: edge,
            ..node
        });
        Ok(id)
    }

    pub fn get(&self, id: NodeId) -> Result<&Node, RfError> {
        self.nodes
            .get(id)
            .ok_or_else(|| RfError::InvariantViolation(format!("no node with index {id}")))
    }

    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut Node, RfError> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| RfError::InvariantViolation(format!("no node with index {id}")))
    }

    /// Handle of the root node.
    ///
    /// # Errors
    /// Returns `InvariantViolation` for an empty tree.
    pub fn get_root(&self) -> Result<NodeId, RfError> {
        if self.nodes.is_empty() {
            Err(RfError::InvariantViolation("tree is empty".to_string()))
        } else {
            Ok(0)
        }
    }

    /// Number of nodes (leaves and internal nodes).
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of leaves reachable from the root.
    pub fn n_leaves(&self) -> usize {
        self.num_leaves
    }

    /// Handles of all leaves, in the order they appear in the Newick string.
    pub fn get_leaves(&self) -> Vec<NodeId> {
        self.preorder()
            .into_iter()
            .filter(|&id| self.nodes[id].is_leaf())
            .collect()
    }

    /// Leaf labels in Newick order. Unnamed leaves are skipped.
    pub fn leaf_names(&self) -> Vec<&str> {
        self.get_leaves()
            .into_iter()
            .filter_map(|id| self.nodes[id].name.as_deref())
            .collect()
    }

    /// Node handles in pre-order (parents before children, children in order).
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        if self.nodes.is_empty() {
            return order;
        }
        let mut stack = vec![0];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().rev());
        }
        order
    }

    /// Node handles in post-order (children before their parent).
    pub fn postorder(&self) -> Vec<NodeId> {
        // Reversed "parent, last child .. first child" pre-order is a valid post-order.
        let mut order = Vec::with_capacity(self.nodes.len());
        if self.nodes.is_empty() {
            return order;
        }
        let mut stack = vec![0];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter());
        }
        order.reverse();
        order
    }

    /// Serializes the tree back to Newick, quoting labels where needed.
    pub fn to_newick(&self) -> String {
        let mut out = String::new();
        if self.nodes.is_empty() {
            out.push(';');
            return out;
        }

        // (node, next child to visit)
        let mut stack: Vec<(NodeId, usize)> = vec![(0, 0)];
        while let Some((id, next)) = stack.pop() {
            let node = &self.nodes[id];
            if next == 0 && !node.is_leaf() {
                out.push('(');
            }
            if next < node.children.len() {
                if next > 0 {
                    out.push(',');
                }
                stack.push((id, next + 1));
                stack.push((node.children[next], 0));
                continue;
            }
            if !node.is_leaf() {
                out.push(')');
            }
            if let Some(name) = &node.name {
                write_label(&mut out, name);
            }
            if let Some(length) = node.parent_edge {
                out.push(':');
                out.push_str(&length.to_string());
            }
        }
        out.push(';');
        out
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_newick())
    }
}

/// Characters that force a label to be quoted when written.
const NEWICK_SPECIAL: &[char] = &['(', ')', ',', ':', ';', '[', ']', '\'', '"'];

fn write_label(out: &mut String, label: &str) {
    let needs_quotes = label.is_empty()
        || label
            .chars()
            .any(|c| c.is_whitespace() || NEWICK_SPECIAL.contains(&c));
    if needs_quotes {
        out.push('\'');
        out.push_str(&label.replace('\'', "''"));
        out.push('\'');
    } else {
        out.push_str(label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds `(A,(B,C));` by hand.
    ///
    /// ```text
    ///        root
    ///       /    \
    ///      A     node
    ///            /  \
    ///           B    C
    /// ```
    fn small_tree() -> Tree {
        let mut tree = Tree::new();
        let root = tree.add(Node::new()).unwrap();
        tree.add_child(Node::new_named("A"), root, Some(1.0)).unwrap();
        let inner = tree.add_child(Node::new(), root, Some(0.5)).unwrap();
        tree.add_child(Node::new_named("B"), inner, None).unwrap();
        tree.add_child(Node::new_named("C"), inner, None).unwrap();
        tree
    }

    #[test]
    fn counts_leaves_while_building() {
        let tree = small_tree();
        assert_eq!(tree.size(), 5);
        assert_eq!(tree.n_leaves(), 3);
        assert_eq!(tree.leaf_names(), vec!["A", "B", "C"]);
    }

    #[test]
    fn single_node_tree_is_one_leaf() {
        let mut tree = Tree::new();
        tree.add(Node::new_named("A")).unwrap();
        assert_eq!(tree.n_leaves(), 1);
        assert_eq!(tree.get_leaves(), vec![0]);
        assert_eq!(tree.to_newick(), "A;");
    }

    #[test]
    fn traversal_orders() {
        let tree = small_tree();
        assert_eq!(tree.preorder(), vec![0, 1, 2, 3, 4]);
        let post = tree.postorder();
        assert_eq!(post.last(), Some(&0));
        let pos = |id| post.iter().position(|&x| x == id).unwrap();
        assert!(pos(3) < pos(2));
        assert!(pos(4) < pos(2));
    }

    #[test]
    fn second_root_is_rejected() {
        let mut tree = small_tree();
        assert!(matches!(
            tree.add(Node::new_named("D")),
            Err(RfError::InvariantViolation(_))
        ));
        assert_eq!(tree.size(), 5);
        assert_eq!(tree.n_leaves(), 3);
    }

    #[test]
    fn writes_newick() {
        let tree = small_tree();
        assert_eq!(tree.to_newick(), "(A:1,(B,C):0.5);");
        assert_eq!(format!("{tree}"), "(A:1,(B,C):0.5);");
    }

    #[test]
    fn quotes_special_labels() {
        let mut tree = Tree::new();
        let root = tree.add(Node::new()).unwrap();
        tree.add_child(Node::new_named("Homo sapiens"), root, None).unwrap();
        tree.add_child(Node::new_named("it's"), root, None).unwrap();
        assert_eq!(tree.to_newick(), "('Homo sapiens','it''s');");
    }

    #[test]
    fn missing_node_is_invariant_violation() {
        let tree = small_tree();
        assert!(matches!(tree.get(42), Err(RfError::InvariantViolation(_))));
        assert!(matches!(Tree::new().get_root(), Err(RfError::InvariantViolation(_))));
    }
}
