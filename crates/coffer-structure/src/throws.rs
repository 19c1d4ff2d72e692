//! Exception structuring.
//!
//! For every node that ends in exception dispatch, the direct edges to its
//! catch handlers are replaced by one fresh pass-through node per maximal
//! type in each handler's exception set. This flattens typed dispatch into
//! per-type successor edges, which later become per-type try constraints.

use indexmap::IndexMap;

use crate::exset::{ExceptionSet, Hierarchy};
use crate::graph::{Graph, NodeId, Terminator, VarId};

/// The result of splitting one throwing node.
#[derive(Debug)]
pub struct ThrowInfo {
    pub node: NodeId,
    /// Union of all handler sets at this node.
    pub mask: ExceptionSet,
    /// Handler -> the exception set it catches here.
    pub csets: IndexMap<NodeId, ExceptionSet>,
    /// One entry per (top type, pass-through node, caught variable).
    pub tryinfos: Vec<(ExceptionSet, NodeId, Option<VarId>)>,
}

pub fn structure_exceptions(graph: &mut Graph, hierarchy: &Hierarchy) -> Vec<ThrowInfo> {
    let throw_nodes: Vec<NodeId> = graph
        .ids()
        .into_iter()
        .filter(|&n| graph.node(n).terminator == Terminator::OnException)
        .collect();

    let mut infos = Vec::new();
    for n in throw_nodes {
        let dispatch = graph
            .node(n)
            .dispatch
            .clone()
            .expect("on-exception node carries dispatch");
        let thrown = dispatch.thrown;

        let mut mask = ExceptionSet::empty();
        for (_, cset) in &dispatch.handlers {
            debug_assert!(!mask.intersects(cset), "handler sets must partition");
            mask.union_with(cset);
        }

        let mut csets = IndexMap::new();
        let mut tryinfos = Vec::new();
        for (handler, cset) in dispatch.handlers {
            csets.insert(handler, cset.clone());

            // Detach the direct edge in both directions.
            graph.node_mut(n).succs.retain(|&s| s != handler);
            graph.node_mut(handler).preds.retain(|&p| p != n);

            // The handler input matching the thrown variable is the
            // caught variable.
            let outv = graph
                .node(n)
                .outvars
                .get(&handler)
                .cloned()
                .unwrap_or_default();
            let invars = graph.node(handler).invars.clone();
            let caughtvar = outv
                .iter()
                .zip(&invars)
                .find(|(v1, _)| **v1 == thrown)
                .map(|(_, v2)| *v2);
            let masked: Vec<Option<VarId>> = outv
                .iter()
                .map(|&v| if v == thrown { None } else { Some(v) })
                .collect();
            graph.node_mut(n).outvars.remove(&handler);

            for top in cset.tops(hierarchy) {
                let top_set = ExceptionSet::from_top(hierarchy, top);
                let dummy = graph.indirect(handler, &[]);
                graph.node_mut(dummy).preds.push(n);
                graph.node_mut(n).succs.push(dummy);
                graph.node_mut(n).eassigns.insert(dummy, masked.clone());
                tryinfos.push((top_set, dummy, caughtvar));
            }
        }
        infos.push(ThrowInfo {
            node: n,
            mask,
            csets,
            tryinfos,
        });
    }
    infos
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ThrowDispatch;

    #[test]
    fn dispatch_becomes_per_type_edges() {
        let mut h = Hierarchy::new();
        let throwable = h.add("java/lang/Throwable", None);
        let exception = h.add("java/lang/Exception", Some(throwable));
        let io = h.add("java/io/IOException", Some(exception));

        let mut g = Graph::new();
        let t = g.add(Terminator::OnException);
        let next = g.add(Terminator::Return);
        let handler = g.add(Terminator::Return);
        g.link(t, next, vec![]);
        g.link(t, handler, vec![VarId(0)]);
        g.node_mut(handler).invars = vec![VarId(9)];
        g.node_mut(t).dispatch = Some(ThrowDispatch {
            thrown: VarId(0),
            handlers: vec![(handler, ExceptionSet::from_top(&h, io))],
        });

        let infos = structure_exceptions(&mut g, &h);
        assert_eq!(infos.len(), 1);
        let info = &infos[0];
        assert_eq!(info.tryinfos.len(), 1);
        let (top_set, dummy, caughtvar) = &info.tryinfos[0];
        assert!(top_set.contains(io));
        assert_eq!(*caughtvar, Some(VarId(9)));

        // The direct edge is gone; the throwing node now reaches the
        // handler only through the pass-through node.
        assert!(!g.node(t).succs.contains(&handler));
        assert!(g.node(t).succs.contains(dummy));
        assert_eq!(g.node(*dummy).succs, vec![handler]);
        assert!(g.node(t).eassigns.contains_key(dummy));
        assert!(!g.node(t).outvars.contains_key(&handler));
    }
}
