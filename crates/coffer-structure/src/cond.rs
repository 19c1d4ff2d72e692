//! Conditional structuring.
//!
//! Switch targets cannot all be hidden behind fresh nodes, because that
//! would destroy fallthrough chains. Targets dominated by the switch are
//! kept and ordered into chains consistent with fallthrough; the rest are
//! demoted and reached through pass-through nodes. If-branches are always
//! indirected so each arm has a single predecessor.

use std::collections::{BTreeMap, BTreeSet};

use crate::dom::DominatorInfo;
use crate::graph::{Graph, NodeId, Terminator, postorder};

#[derive(Debug)]
pub struct SwitchInfo {
    pub node: NodeId,
    /// All targets, fallthrough order first, demoted targets last.
    pub ordered: Vec<NodeId>,
}

#[derive(Debug)]
pub struct IfInfo {
    pub node: NodeId,
    /// The two fresh single-predecessor arm entries, in successor order.
    pub targets: Vec<NodeId>,
}

pub fn structure_conditionals(
    graph: &mut Graph,
    entry: NodeId,
) -> (Vec<SwitchInfo>, Vec<IfInfo>) {
    let dom = DominatorInfo::compute(graph, entry);
    let switch_nodes: Vec<NodeId> = graph
        .ids()
        .into_iter()
        .filter(|&n| graph.node(n).terminator == Terminator::Switch)
        .collect();
    let if_nodes: Vec<NodeId> = graph
        .ids()
        .into_iter()
        .filter(|&n| graph.node(n).terminator == Terminator::If)
        .collect();

    let mut switch_infos = Vec::new();
    for n in switch_nodes {
        let targets: Vec<NodeId> = graph.node(n).succs.clone();
        let mut bad: Vec<NodeId> = targets
            .iter()
            .copied()
            .filter(|&x| !dom.dominators(x).contains(&n))
            .collect();
        let mut good: Vec<NodeId> = targets
            .iter()
            .copied()
            .filter(|x| !bad.contains(x))
            .collect();

        let domains: BTreeMap<NodeId, BTreeSet<NodeId>> =
            good.iter().map(|&x| (x, dom.area(x))).collect();
        let mut parents: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        for &x in &good {
            let preds: BTreeSet<NodeId> = graph.node(x).preds.iter().copied().collect();
            let mut ps: Vec<NodeId> = good
                .iter()
                .copied()
                .filter(|k| !domains[k].is_disjoint(&preds))
                .collect();
            ps.retain(|&p| p != x);
            parents.insert(x, ps);
        }

        // Demote targets whose parentage is ambiguous: more than one
        // candidate parent, or a parent that is itself no longer good.
        let depthfirst = postorder(&good, |x| parents.get(&x).cloned().unwrap_or_default());
        for target in depthfirst {
            let ambiguous = match parents.get(&target) {
                Some(ps) => ps.len() > 1 || ps.iter().any(|p| !parents.contains_key(p)),
                None => continue,
            };
            if ambiguous {
                bad.push(target);
                good.retain(|&x| x != target);
                parents.remove(&target);
            }
        }

        // Leaves are good targets nobody falls through from; walking
        // parent pointers from each leaf yields one contiguous chain.
        let mut leaves = good.clone();
        for ps in parents.values() {
            if let Some(first) = ps.first()
                && let Some(at) = leaves.iter().position(|l| l == first)
            {
                leaves.remove(at);
            }
        }

        let mut ordered = Vec::new();
        for leaf in leaves {
            let mut cur = leaf;
            ordered.push(cur);
            while let Some(&p) = parents.get(&cur).and_then(|ps| ps.first()) {
                cur = p;
                ordered.push(cur);
            }
        }
        ordered.reverse();

        for x in bad {
            let fresh = graph.indirect(x, &[n]);
            ordered.push(fresh);
        }
        debug_assert_eq!(ordered.len(), targets.len());
        switch_infos.push(SwitchInfo { node: n, ordered });
    }

    let mut if_infos = Vec::new();
    for n in if_nodes {
        let targets: Vec<NodeId> = graph.node(n).succs.clone();
        let fresh: Vec<NodeId> = targets
            .into_iter()
            .map(|x| graph.indirect(x, &[n]))
            .collect();
        if_infos.push(IfInfo { node: n, targets: fresh });
    }

    (switch_infos, if_infos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn if_arms_get_single_predecessor_nodes() {
        let mut g = Graph::new();
        let a = g.add(Terminator::If);
        let b = g.add(Terminator::Goto);
        let c = g.add(Terminator::Goto);
        let d = g.add(Terminator::Return);
        g.link(a, b, vec![]);
        g.link(a, c, vec![]);
        g.link(b, d, vec![]);
        g.link(c, d, vec![]);

        let (_, ifs) = structure_conditionals(&mut g, a);
        assert_eq!(ifs.len(), 1);
        let info = &ifs[0];
        assert_eq!(info.targets.len(), 2);
        for &t in &info.targets {
            assert_eq!(g.node(t).preds, vec![a]);
            assert_eq!(g.node(t).succs.len(), 1);
        }
        assert_eq!(g.node(a).succs, info.targets);
    }

    #[test]
    fn switch_orders_fallthrough_chain() {
        // s -> c0, c1, j. c0 falls through to c1; both dominated by s.
        // j is also reachable from elsewhere, so it is demoted.
        let mut g = Graph::new();
        let e = g.add(Terminator::Goto);
        let s = g.add(Terminator::Switch);
        let c0 = g.add(Terminator::Goto);
        let c1 = g.add(Terminator::Goto);
        let j = g.add(Terminator::Return);
        g.link(e, s, vec![]);
        g.link(e, j, vec![]);
        g.link(s, c0, vec![]);
        g.link(s, c1, vec![]);
        g.link(s, j, vec![]);
        g.link(c0, c1, vec![]);
        g.link(c1, j, vec![]);

        let (switches, _) = structure_conditionals(&mut g, e);
        assert_eq!(switches.len(), 1);
        let info = &switches[0];
        assert_eq!(info.ordered.len(), 3);
        // Fallthrough order: c0 before c1.
        assert_eq!(&info.ordered[..2], &[c0, c1]);
        // The demoted target is reached through a fresh node.
        let fresh = info.ordered[2];
        assert_eq!(g.node(fresh).succs, vec![j]);
        assert_eq!(g.node(fresh).preds, vec![s]);
    }
}
