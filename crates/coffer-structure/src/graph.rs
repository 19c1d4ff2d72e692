//! CFG node arena.
//!
//! Nodes are identified by stable integer ids; predecessor and successor
//! lists hold ids, never owning handles, so the cyclic graph lives in a
//! single flat container. Removed nodes leave a tombstone slot and their
//! ids are never reused.

use std::collections::{BTreeMap, BTreeSet};

use crate::exset::ExceptionSet;

/// Stable node identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

/// SSA variable identity. Only equality matters to the restructurer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub u32);

/// Basic-block terminator kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    Goto,
    /// Two-way branch. The first successor is the branch taken when the
    /// condition is false.
    If,
    Switch,
    OnException,
    Return,
}

/// Exception dispatch carried by an `OnException` node: the thrown
/// variable and the partition of its static type over catch handlers.
#[derive(Debug, Clone)]
pub struct ThrowDispatch {
    pub thrown: VarId,
    pub handlers: Vec<(NodeId, ExceptionSet)>,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub terminator: Terminator,
    pub preds: Vec<NodeId>,
    pub succs: Vec<NodeId>,
    /// Block inputs, positionally matched against predecessor outvars.
    pub invars: Vec<VarId>,
    /// Normal successor -> variables passed along that edge.
    pub outvars: BTreeMap<NodeId, Vec<VarId>>,
    /// Exception successor -> variables passed along that edge (the
    /// thrown variable's slot is `None`).
    pub eassigns: BTreeMap<NodeId, Vec<Option<VarId>>>,
    pub dispatch: Option<ThrowDispatch>,
    /// Loop-free edge lists, filled late by `compute_loop_free_edges`.
    pub succs_nl: Vec<NodeId>,
    pub preds_nl: Vec<NodeId>,
    pub norm_succs_nl: Vec<NodeId>,
}

impl Node {
    fn new(terminator: Terminator) -> Self {
        Self {
            terminator,
            preds: Vec::new(),
            succs: Vec::new(),
            invars: Vec::new(),
            outvars: BTreeMap::new(),
            eassigns: BTreeMap::new(),
            dispatch: None,
            succs_nl: Vec::new(),
            preds_nl: Vec::new(),
            norm_succs_nl: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Option<Node>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, terminator: Terminator) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(Node::new(terminator)));
        id
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes
            .get(id.0 as usize)
            .is_some_and(|slot| slot.is_some())
    }

    pub fn node(&self, id: NodeId) -> &Node {
        self.nodes[id.0 as usize].as_ref().expect("live node")
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.0 as usize].as_mut().expect("live node")
    }

    /// Live node ids in ascending order.
    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| NodeId(i as u32)))
            .collect()
    }

    pub fn live_set(&self) -> BTreeSet<NodeId> {
        self.ids().into_iter().collect()
    }

    /// Add a normal edge carrying `outvars`.
    pub fn link(&mut self, from: NodeId, to: NodeId, outvars: Vec<VarId>) {
        self.node_mut(from).succs.push(to);
        self.node_mut(from).outvars.insert(to, outvars);
        self.node_mut(to).preds.push(from);
    }

    /// Remove a node. The caller is responsible for having detached its
    /// edges first.
    pub fn remove(&mut self, id: NodeId) {
        self.nodes[id.0 as usize] = None;
    }

    /// Insert a pass-through node in front of `target`, rerouting the
    /// edges from `reroute` through it. With an empty `reroute` list the
    /// new node starts with no predecessors (exception-edge dummies).
    pub fn indirect(&mut self, target: NodeId, reroute: &[NodeId]) -> NodeId {
        let dummy = self.add(Terminator::Goto);
        for &p in reroute {
            let pred = self.node_mut(p);
            for s in pred.succs.iter_mut() {
                if *s == target {
                    *s = dummy;
                }
            }
            if let Some(vars) = pred.outvars.remove(&target) {
                pred.outvars.insert(dummy, vars);
            }
            if let Some(vars) = pred.eassigns.remove(&target) {
                pred.eassigns.insert(dummy, vars);
            }
        }
        let t = self.node_mut(target);
        t.preds.retain(|p| !reroute.contains(p));
        t.preds.push(dummy);
        let d = self.node_mut(dummy);
        d.preds = reroute.to_vec();
        d.succs = vec![target];
        d.outvars.insert(target, Vec::new());
        dummy
    }

    /// Clone `region` (a subset of the SCC `scc`). Internal edges are
    /// remapped onto the clones; predecessors from outside the SCC move
    /// from the originals to the clones; edges from SCC nodes outside the
    /// region keep pointing at the originals.
    pub fn duplicate(&mut self, region: &[NodeId], scc: &BTreeSet<NodeId>) -> Vec<NodeId> {
        let mut mapping: BTreeMap<NodeId, NodeId> = BTreeMap::new();
        for &orig in region {
            let clone = self.node(orig).clone();
            let id = NodeId(self.nodes.len() as u32);
            self.nodes.push(Some(clone));
            mapping.insert(orig, id);
        }
        let map = |id: NodeId| mapping.get(&id).copied().unwrap_or(id);

        // Rewrite the clones' own edge lists.
        for &orig in region {
            let clone_id = mapping[&orig];
            let clone = self.nodes[clone_id.0 as usize].as_mut().expect("clone");

            for s in clone.succs.iter_mut() {
                *s = map(*s);
            }
            clone.outvars = std::mem::take(&mut clone.outvars)
                .into_iter()
                .map(|(k, v)| (map(k), v))
                .collect();
            clone.eassigns = std::mem::take(&mut clone.eassigns)
                .into_iter()
                .map(|(k, v)| (map(k), v))
                .collect();
            if let Some(dispatch) = clone.dispatch.as_mut() {
                for (handler, _) in dispatch.handlers.iter_mut() {
                    *handler = map(*handler);
                }
            }

            let old_preds = std::mem::take(&mut clone.preds);
            let mut new_preds = Vec::new();
            for p in old_preds {
                if let Some(&pc) = mapping.get(&p) {
                    new_preds.push(pc);
                } else if !scc.contains(&p) {
                    // Entry predecessor: this edge moves to the clone.
                    new_preds.push(p);
                }
                // Predecessors inside the SCC but outside the region (the
                // loop head) keep their edge to the original.
            }
            clone.preds = new_preds;
        }

        // Register the clones with their external successors.
        for &orig in region {
            let clone_id = mapping[&orig];
            let succs = self.node(clone_id).succs.clone();
            for s in succs {
                if !mapping.values().any(|&c| c == s) {
                    self.node_mut(s).preds.push(clone_id);
                }
            }
        }

        // Move the external entry edges over to the clones.
        for &orig in region {
            let clone_id = mapping[&orig];
            let external: Vec<NodeId> = self
                .node(orig)
                .preds
                .iter()
                .copied()
                .filter(|p| !scc.contains(p) && !mapping.contains_key(p))
                .collect();
            for p in external {
                self.node_mut(orig).preds.retain(|&x| x != p);
                let pred = self.node_mut(p);
                for s in pred.succs.iter_mut() {
                    if *s == orig {
                        *s = clone_id;
                    }
                }
                if let Some(vars) = pred.outvars.remove(&orig) {
                    pred.outvars.insert(clone_id, vars);
                }
                if let Some(vars) = pred.eassigns.remove(&orig) {
                    pred.eassigns.insert(clone_id, vars);
                }
            }
        }

        mapping.into_values().collect()
    }

    /// Fill the loop-free edge lists: successors excluding back edges
    /// (targets dominating the node) and predecessors excluding edges
    /// from the node's own dominated area.
    pub fn compute_loop_free_edges(&mut self, dom: &crate::dom::DominatorInfo) {
        for id in self.ids() {
            if !dom.is_reachable(id) {
                let node = self.node_mut(id);
                node.succs_nl.clear();
                node.preds_nl.clear();
                node.norm_succs_nl.clear();
                continue;
            }
            let dominators: BTreeSet<NodeId> = dom.dominators(id).iter().copied().collect();
            let area = dom.area(id);
            let node = self.node(id);
            let succs_nl: Vec<NodeId> = node
                .succs
                .iter()
                .copied()
                .filter(|s| !dominators.contains(s))
                .collect();
            let preds_nl: Vec<NodeId> = node
                .preds
                .iter()
                .copied()
                .filter(|p| !area.contains(p))
                .collect();
            let norm_succs_nl: Vec<NodeId> = succs_nl
                .iter()
                .copied()
                .filter(|s| node.outvars.contains_key(s))
                .collect();
            let node = self.node_mut(id);
            node.succs_nl = succs_nl;
            node.preds_nl = preds_nl;
            node.norm_succs_nl = norm_succs_nl;
        }
    }
}

/// Iterative depth-first postorder over `children`, deduplicating across
/// starts. Used both as a reachability set and as a deterministic order.
pub fn postorder(
    starts: &[NodeId],
    mut children: impl FnMut(NodeId) -> Vec<NodeId>,
) -> Vec<NodeId> {
    let mut result = Vec::new();
    let mut seen: BTreeSet<NodeId> = BTreeSet::new();
    for &start in starts {
        if !seen.insert(start) {
            continue;
        }
        let kids = children(start);
        let mut stack: Vec<(NodeId, Vec<NodeId>, usize)> = vec![(start, kids, 0)];
        while let Some((node, kids, idx)) = stack.last_mut() {
            if let Some(&k) = kids.get(*idx) {
                *idx += 1;
                if seen.insert(k) {
                    let grand = children(k);
                    stack.push((k, grand, 0));
                }
            } else {
                result.push(*node);
                stack.pop();
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear3() -> (Graph, NodeId, NodeId, NodeId) {
        let mut g = Graph::new();
        let a = g.add(Terminator::Goto);
        let b = g.add(Terminator::Goto);
        let c = g.add(Terminator::Return);
        g.link(a, b, vec![]);
        g.link(b, c, vec![]);
        (g, a, b, c)
    }

    #[test]
    fn indirect_reroutes_edges() {
        let (mut g, a, b, _c) = linear3();
        let d = g.indirect(b, &[a]);
        assert_eq!(g.node(a).succs, vec![d]);
        assert_eq!(g.node(d).preds, vec![a]);
        assert_eq!(g.node(d).succs, vec![b]);
        assert_eq!(g.node(b).preds, vec![d]);
        assert!(g.node(a).outvars.contains_key(&d));
        assert!(g.node(d).outvars.contains_key(&b));
    }

    #[test]
    fn indirect_with_no_reroute_is_detached() {
        let (mut g, _a, b, _c) = linear3();
        let d = g.indirect(b, &[]);
        assert!(g.node(d).preds.is_empty());
        assert_eq!(g.node(d).succs, vec![b]);
        assert!(g.node(b).preds.contains(&d));
    }

    #[test]
    fn duplicate_moves_entry_edges_to_clones() {
        // p -> x -> y -> x (SCC {x, y}), head x, region {y}? Build the
        // two-entry shape instead: p1 -> x, p2 -> y, x <-> y.
        let mut g = Graph::new();
        let p1 = g.add(Terminator::Goto);
        let p2 = g.add(Terminator::Goto);
        let x = g.add(Terminator::Goto);
        let y = g.add(Terminator::Goto);
        g.link(p1, x, vec![]);
        g.link(p2, y, vec![]);
        g.link(x, y, vec![]);
        g.link(y, x, vec![]);

        let scc: BTreeSet<NodeId> = [x, y].into_iter().collect();
        let clones = g.duplicate(&[y], &scc);
        assert_eq!(clones.len(), 1);
        let yc = clones[0];

        // p2's edge moved to the clone; x keeps its edge to the original.
        assert_eq!(g.node(p2).succs, vec![yc]);
        assert_eq!(g.node(yc).preds, vec![p2]);
        assert!(g.node(y).preds.contains(&x));
        assert!(!g.node(y).preds.contains(&p2));
        // The clone's loop edge still enters the original head.
        assert_eq!(g.node(yc).succs, vec![x]);
        assert!(g.node(x).preds.contains(&yc));
    }

    #[test]
    fn postorder_emits_children_first() {
        let (g, a, _b, _c) = linear3();
        let order = postorder(&[a], |n| g.node(n).succs.clone());
        assert_eq!(
            order,
            vec![NodeId(2), NodeId(1), NodeId(0)]
        );
    }
}
