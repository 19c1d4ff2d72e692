//! Dominator information over the current graph.
//!
//! Stores, for each reachable node, the full root-to-node dominator path.
//! Computed by iterative relaxation with an explicit work list: the
//! candidate path for an edge `u -> v` is `doms[u] ++ [v]`, reconciled
//! with any existing path for `v` by keeping their common elements.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::graph::{Graph, NodeId, postorder};

#[derive(Debug)]
pub struct DominatorInfo {
    doms: BTreeMap<NodeId, Vec<NodeId>>,
    root: NodeId,
}

impl DominatorInfo {
    pub fn compute(graph: &Graph, root: NodeId) -> Self {
        let mut doms: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        doms.insert(root, vec![root]);
        let mut stack = vec![root];
        while let Some(cur) = stack.pop() {
            for &child in &graph.node(cur).succs {
                let mut candidate = doms[&cur].clone();
                candidate.push(child);
                let next = match doms.get(&child) {
                    None => candidate,
                    Some(old) => {
                        let filtered: Vec<NodeId> = old
                            .iter()
                            .copied()
                            .filter(|x| candidate.contains(x))
                            .collect();
                        debug_assert!(filtered.contains(&child));
                        if filtered == *old {
                            continue;
                        }
                        filtered
                    }
                };
                doms.insert(child, next);
                if !stack.contains(&child) {
                    stack.push(child);
                }
            }
        }
        Self { doms, root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn is_reachable(&self, node: NodeId) -> bool {
        self.doms.contains_key(&node)
    }

    /// Root-to-node dominator path, ending with the node itself.
    pub fn dominators(&self, node: NodeId) -> &[NodeId] {
        &self.doms[&node]
    }

    /// The deepest node that prefixes every given node's dominator path.
    pub fn common(&self, nodes: impl IntoIterator<Item = NodeId>) -> NodeId {
        let paths: Vec<&[NodeId]> = nodes
            .into_iter()
            .map(|n| self.dominators(n))
            .collect();
        debug_assert!(!paths.is_empty());
        let shortest = paths.iter().map(|p| p.len()).min().unwrap_or(0);
        let mut result = self.root;
        for i in 0..shortest {
            let x = paths[0][i];
            if paths.iter().all(|p| p[i] == x) {
                result = x;
            } else {
                break;
            }
        }
        result
    }

    /// Fresh mutable set of all nodes dominated by `node`.
    pub fn area(&self, node: NodeId) -> BTreeSet<NodeId> {
        self.doms
            .iter()
            .filter(|(_, path)| path.contains(&node))
            .map(|(&n, _)| n)
            .collect()
    }

    /// Topological closure of `nodes`: everything reachable from them
    /// along reverse edges without walking above their common dominator.
    pub fn extend(&self, graph: &Graph, nodes: &BTreeSet<NodeId>) -> BTreeSet<NodeId> {
        if nodes.is_empty() {
            return BTreeSet::new();
        }
        let dom = self.common(nodes.iter().copied());
        let starts: Vec<NodeId> = nodes.iter().copied().collect();
        let reached = postorder(&starts, |n| {
            if n == dom {
                Vec::new()
            } else {
                graph.node(n).preds.clone()
            }
        });
        reached.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Terminator;

    /// Diamond: a -> b, a -> c, b -> d, c -> d.
    fn diamond() -> (Graph, [NodeId; 4]) {
        let mut g = Graph::new();
        let a = g.add(Terminator::If);
        let b = g.add(Terminator::Goto);
        let c = g.add(Terminator::Goto);
        let d = g.add(Terminator::Return);
        g.link(a, b, vec![]);
        g.link(a, c, vec![]);
        g.link(b, d, vec![]);
        g.link(c, d, vec![]);
        (g, [a, b, c, d])
    }

    #[test]
    fn join_point_is_dominated_by_fork_only() {
        let (g, [a, b, c, d]) = diamond();
        let dom = DominatorInfo::compute(&g, a);
        assert_eq!(dom.dominators(b), &[a, b]);
        assert_eq!(dom.dominators(d), &[a, d]);
        assert_eq!(dom.common([b, c]), a);
        assert_eq!(dom.common([b, d]), a);
    }

    #[test]
    fn area_returns_dominated_set() {
        let (g, [a, b, _c, d]) = diamond();
        let dom = DominatorInfo::compute(&g, a);
        assert_eq!(dom.area(b), [b].into_iter().collect());
        assert_eq!(dom.area(a).len(), 4);
        assert!(dom.area(a).contains(&d));
    }

    #[test]
    fn extend_closes_over_predecessors() {
        let (g, [a, b, c, d]) = diamond();
        let dom = DominatorInfo::compute(&g, a);
        // A single node extends to itself: its common dominator is itself.
        let single: BTreeSet<NodeId> = [d].into_iter().collect();
        assert_eq!(dom.extend(&g, &single), single);
        // {b, d} shares dominator a, so the walk pulls in c as well.
        let set: BTreeSet<NodeId> = [b, d].into_iter().collect();
        let extended = dom.extend(&g, &set);
        assert_eq!(extended, [a, b, c, d].into_iter().collect());
    }

    #[test]
    fn loop_back_edge_does_not_break_paths() {
        // a -> b -> c -> a
        let mut g = Graph::new();
        let a = g.add(Terminator::Goto);
        let b = g.add(Terminator::Goto);
        let c = g.add(Terminator::Goto);
        g.link(a, b, vec![]);
        g.link(b, c, vec![]);
        g.link(c, a, vec![]);
        let dom = DominatorInfo::compute(&g, a);
        assert_eq!(dom.dominators(c), &[a, b, c]);
        assert_eq!(dom.dominators(a), &[a]);
    }
}
