//! Control-flow restructurer.
//!
//! Transforms an arbitrary control-flow graph of basic blocks (with
//! exception edges) into a tree of nested structured constructs. The
//! pipeline runs several graph-rewriting passes, each producing the input
//! shape the next pass expects:
//!
//! - `loops` - give every strongly-connected component a single entry,
//!   duplicating nodes when necessary
//! - `throws` - split exception dispatch into per-type successor edges
//! - `cond` - order switch targets consistent with fallthrough; isolate
//!   if-branches behind fresh single-predecessor nodes
//! - `constraints` + `order` - build nested-scope constraints and find a
//!   valid nesting
//! - `merge` - greedily merge try-scopes respecting the exception-type
//!   lattice
//! - `scopes` - expand each scope via a min vertex cut to minimise its
//!   outgoing successors
//! - `breaks` - wrap regions so remaining multi-successor jumps become
//!   labelled breaks
//! - `setree` - fold the constraint tree into structured-tree items

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod breaks;
pub mod cond;
pub mod constraints;
pub mod dom;
pub mod exset;
pub mod graph;
pub mod loops;
pub mod merge;
pub mod order;
pub mod pipeline;
pub mod scopes;
pub mod setree;
pub mod throws;

#[cfg(test)]
mod pipeline_tests;

pub use dom::DominatorInfo;
pub use exset::{ClassId, ExceptionSet, Hierarchy};
pub use graph::{Graph, Node, NodeId, Terminator, VarId};
pub use pipeline::structure;
pub use setree::{Item, Scope};

/// Errors from the restructuring pipeline. Fatal to the current run; no
/// partial tree is produced.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StructureError {
    /// The constraint orderer found no viable candidate. Does not occur
    /// for well-formed SSA input.
    #[error("structuring failed: no viable constraint candidate")]
    StructuringFailed,
}

pub type StructureResult<T> = Result<T, StructureError>;
