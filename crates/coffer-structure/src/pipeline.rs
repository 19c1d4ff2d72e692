//! The restructuring pipeline.
//!
//! Each pass rewrites the graph (or the constraint set) into the shape
//! the next pass expects; the node set and its non-exception successor
//! structure keep describing the same program throughout.

use crate::StructureResult;
use crate::constraints::{self, Constraints};
use crate::dom::DominatorInfo;
use crate::exset::Hierarchy;
use crate::graph::{Graph, NodeId};
use crate::setree::Scope;
use crate::{breaks, cond, loops, merge, order, scopes, setree, throws};

/// Restructure the graph rooted at `entry` into a structured-tree scope.
pub fn structure(
    graph: &mut Graph,
    entry: NodeId,
    hierarchy: &Hierarchy,
) -> StructureResult<Scope> {
    // Self loops would confuse loop-entry analysis; hide them behind
    // pass-through nodes first.
    for n in graph.ids() {
        if graph.node(n).succs.contains(&n) {
            graph.indirect(n, &[n]);
        }
    }

    let while_heads = loops::structure_loops(graph);
    let throw_infos = throws::structure_exceptions(graph, hierarchy);
    let (switch_infos, if_infos) = cond::structure_conditionals(graph, entry);

    // No pass below adds nodes, so dominator info stays valid until the
    // try-merge removes some.
    let dom = DominatorInfo::compute(graph, entry);
    let mut cons = Constraints::new();
    let mut active = constraints::create_constraints(
        &mut cons,
        &dom,
        graph,
        &while_heads,
        &throw_infos,
        &switch_infos,
        &if_infos,
    );

    let live = graph.live_set();
    let (_croot, mut children) =
        order::order_constraints(&dom, graph, &mut cons, &active, &live)?;

    let dom = merge::merge_exceptions(
        graph,
        &dom,
        &mut children,
        &mut cons,
        &mut active,
        entry,
    );
    merge::fix_try_constraints(&dom, &mut cons, &active);

    // Freezing the try constraints invalidates the tree; rebuild it.
    let live = graph.live_set();
    let (croot, mut children) =
        order::order_constraints(&dom, graph, &mut cons, &active, &live)?;

    graph.compute_loop_free_edges(&dom);
    scopes::complete_scopes(&dom, graph, croot, &mut children, &mut cons);
    breaks::add_break_scopes(
        &dom,
        graph,
        croot,
        &mut cons,
        &mut active,
        &mut children,
        entry,
    );

    Ok(setree::build_tree(&dom, graph, croot, &children, &cons, hierarchy))
}
