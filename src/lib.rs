//! Crate root: lightweight module orchestration and public re-exports.
//!
//! Pipeline: Newick text → [`Tree`] → normalized copy → [`TreeSnapshot`]
//! (bipartition set) → distance.
//!
//! Modules:
//! - `error`: `RfError` and `NewickParseError`.
//! - `tree`: arena tree with integer node handles.
//! - `newick`: iterative Newick parser.
//! - `normalize`: shared leaf index, taxon checks, unary/root suppression.
//! - `bitset`: compact bitset representation for tree partitions.
//! - `snapshot`: canonical bipartitions of a tree with their branch lengths.
//! - `distances`: RF / normalized RF / weighted RF / KF, pairwise with rayon.
//! - `compare`: `calculate_rf_distance` and its options.
//! - `io`: reading Newick/NEXUS tree files, writing TSV matrices.
//! - `interop`: conversion from `phylotree` trees.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod bitset;
pub mod compare;
pub mod distances;
pub mod error;
pub mod interop;
pub mod io;
pub mod newick;
pub mod normalize;
pub mod snapshot;
pub mod tree;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use bitset::Bitset;
pub use compare::{calculate_rf_distance, rf_distance, Distance, RfOptions};
pub use error::{NewickParseError, RfError};
pub use io::{read_newick_trees, read_nexus_trees, write_matrix_tsv};
pub use newick::parse_newick;
pub use normalize::{normalized_copy, LeafIndex};
pub use snapshot::{Bipartition, TreeSnapshot};
pub use tree::{Node, NodeId, Tree};
