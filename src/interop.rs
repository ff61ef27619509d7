//! Conversion from [`phylotree`] trees.
//!
//! Lets callers that already hold a `phylotree::tree::Tree` (for example one
//! read with its own Newick or NEXUS readers) compare it without writing it
//! back to text.

use phylotree::tree::Tree as PhyloTree;

use crate::error::RfError;
use crate::tree::{Node, Tree};

impl TryFrom<&PhyloTree> for Tree {
    type Error = RfError;

    /// Copies topology, labels and branch lengths.
    ///
    /// # Errors
    /// `Conversion` if the tree has no root, refers to a missing node, or
    /// has an unnamed leaf.
    fn try_from(source: &PhyloTree) -> Result<Self, Self::Error> {
        let conversion = |e: &dyn std::fmt::Display| RfError::Conversion(e.to_string());

        let root = source.get_root().map_err(|e| conversion(&e))?;
        let root_node = source.get(&root).map_err(|e| conversion(&e))?;

        let mut tree = Tree::new();
        let new_root = tree.add(Node {
            name: root_node.name.clone(),
            ..Node::new()
        })?;

        // (phylotree node, parent in the new tree)
        let mut stack: Vec<_> = root_node.children.iter().rev().map(|&c| (c, new_root)).collect();
        while let Some((source_id, parent)) = stack.pop() {
            let node = source.get(&source_id).map_err(|e| conversion(&e))?;
            if node.children.is_empty() && node.name.is_none() {
                return Err(RfError::Conversion(format!("leaf {source_id} has no name")));
            }
            let id = tree.add_child(
                Node {
                    name: node.name.clone(),
                    ..Node::new()
                },
                parent,
                node.parent_edge,
            )?;
            stack.extend(node.children.iter().rev().map(|&c| (c, id)));
        }

        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distances::{robinson_foulds, weighted_robinson_foulds};
    use crate::newick::parse_newick;

    #[test]
    fn converts_topology_and_lengths() {
        let newick = "((A:0.1,B:0.2):0.3,(C:0.4,D:0.5):0.6,E:0.7);";
        let tree = Tree::try_from(&PhyloTree::from_newick(newick).unwrap()).unwrap();

        assert_eq!(tree.n_leaves(), 5);
        assert_eq!(tree.size(), 8);
        let mut names = tree.leaf_names();
        names.sort();
        assert_eq!(names, vec!["A", "B", "C", "D", "E"]);

        let parsed = parse_newick(newick).unwrap();
        assert_eq!(robinson_foulds(&tree, &parsed).unwrap(), 0);
        assert_eq!(weighted_robinson_foulds(&tree, &parsed).unwrap(), 0.0);
    }

    #[test]
    fn converted_tree_compares_like_parsed_tree() {
        let newick = "(((A,B),C),(D,(E,F)));";
        let converted = Tree::try_from(&PhyloTree::from_newick(newick).unwrap()).unwrap();
        let other = parse_newick("((A,(B,C)),((D,E),F));").unwrap();
        assert_eq!(robinson_foulds(&converted, &other).unwrap(), 4);
    }

    #[test]
    fn empty_tree_is_conversion_error() {
        let source = PhyloTree::new();
        assert!(matches!(Tree::try_from(&source), Err(RfError::Conversion(_))));
    }

    #[test]
    fn unnamed_leaf_is_conversion_error() {
        let mut source = PhyloTree::new();
        let root = source.add(phylotree::tree::Node::new());
        source.add_child(phylotree::tree::Node::new_named("A"), root, None).unwrap();
        source.add_child(phylotree::tree::Node::new(), root, None).unwrap();
        assert!(matches!(Tree::try_from(&source), Err(RfError::Conversion(_))));
    }
}
