//! Loop canonicalisation.
//!
//! Every strongly-connected component of size >= 2 must end up with a
//! single entry node, the loop head. When an SCC has several entries, one
//! becomes the head (the smallest live id, so the choice is observable and
//! reproducible) and the regions reachable from the other entries are
//! duplicated so their outside predecessors enter the clones instead.
//! Nodes not chosen as a head are re-analysed, since nested loops may
//! remain. Duplication can be exponential in pathological graphs.

use std::collections::{BTreeMap, BTreeSet};

use crate::graph::{Graph, NodeId, postorder};

/// Tarjan's algorithm, iterative, over an explicit child function.
fn tarjan_sccs(
    nodes: &[NodeId],
    mut children: impl FnMut(NodeId) -> Vec<NodeId>,
) -> Vec<Vec<NodeId>> {
    let mut index: BTreeMap<NodeId, usize> = BTreeMap::new();
    let mut low: BTreeMap<NodeId, usize> = BTreeMap::new();
    let mut on_stack: BTreeSet<NodeId> = BTreeSet::new();
    let mut stack: Vec<NodeId> = Vec::new();
    let mut sccs: Vec<Vec<NodeId>> = Vec::new();
    let mut counter = 0usize;

    for &root in nodes {
        if index.contains_key(&root) {
            continue;
        }
        index.insert(root, counter);
        low.insert(root, counter);
        counter += 1;
        stack.push(root);
        on_stack.insert(root);
        let kids = children(root);
        let mut calls: Vec<(NodeId, Vec<NodeId>, usize)> = vec![(root, kids, 0)];

        while let Some((node, kids, idx)) = calls.last_mut() {
            if let Some(&k) = kids.get(*idx) {
                *idx += 1;
                if let Some(&ki) = index.get(&k) {
                    if on_stack.contains(&k) {
                        let entry = low.get_mut(node).expect("visited");
                        *entry = (*entry).min(ki);
                    }
                } else {
                    index.insert(k, counter);
                    low.insert(k, counter);
                    counter += 1;
                    stack.push(k);
                    on_stack.insert(k);
                    let grand = children(k);
                    calls.push((k, grand, 0));
                }
            } else {
                let node = *node;
                if low[&node] == index[&node] {
                    let mut scc = Vec::new();
                    loop {
                        let n = stack.pop().expect("scc member");
                        on_stack.remove(&n);
                        scc.push(n);
                        if n == node {
                            break;
                        }
                    }
                    sccs.push(scc);
                }
                calls.pop();
                if let Some((parent, _, _)) = calls.last() {
                    let child_low = low[&node];
                    let entry = low.get_mut(parent).expect("visited");
                    *entry = (*entry).min(child_low);
                }
            }
        }
    }
    sccs
}

/// Canonicalise all loops, returning the loop heads.
pub fn structure_loops(graph: &mut Graph) -> Vec<NodeId> {
    let mut todo: Vec<NodeId> = graph.ids();
    let mut heads = Vec::new();

    while !todo.is_empty() {
        let mut next_todo = Vec::new();
        let members: BTreeSet<NodeId> = todo.iter().copied().collect();
        let sccs = tarjan_sccs(&todo, |n| {
            graph
                .node(n)
                .preds
                .iter()
                .copied()
                .filter(|p| members.contains(p))
                .collect()
        });

        for scc in sccs {
            if scc.len() <= 1 {
                continue;
            }
            let scc_set: BTreeSet<NodeId> = scc.iter().copied().collect();
            let mut entries: Vec<NodeId> = scc
                .iter()
                .copied()
                .filter(|&n| {
                    graph
                        .node(n)
                        .preds
                        .iter()
                        .any(|p| !scc_set.contains(p))
                })
                .collect();
            entries.sort();

            // Smallest-id entry becomes the head. A loop that contains
            // the program entry has no entries at all; fall back to the
            // smallest SCC member.
            let head = if entries.is_empty() {
                *scc_set.first().expect("non-empty scc")
            } else {
                entries.remove(0)
            };

            if !entries.is_empty() {
                let region = postorder(&entries, |n| {
                    graph
                        .node(n)
                        .succs
                        .iter()
                        .copied()
                        .filter(|&s| scc_set.contains(&s) && s != head)
                        .collect()
                });
                let clones = graph.duplicate(&region, &scc_set);
                next_todo.extend(clones);
            }

            next_todo.extend(scc.iter().copied().filter(|&n| n != head));
            heads.push(head);
        }
        todo = next_todo;
    }
    heads
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Terminator;

    #[test]
    fn single_entry_loop_head_is_detected() {
        // a -> b -> c -> a with entry edge from p.
        let mut g = Graph::new();
        let p = g.add(Terminator::Goto);
        let a = g.add(Terminator::Goto);
        let b = g.add(Terminator::Goto);
        let c = g.add(Terminator::Goto);
        g.link(p, a, vec![]);
        g.link(a, b, vec![]);
        g.link(b, c, vec![]);
        g.link(c, a, vec![]);

        let heads = structure_loops(&mut g);
        assert_eq!(heads, vec![a]);
    }

    #[test]
    fn multi_entry_loop_is_canonicalised() {
        // Two entries into the cycle {x, y}: p1 -> x, p2 -> y.
        let mut g = Graph::new();
        let p1 = g.add(Terminator::Goto);
        let p2 = g.add(Terminator::Goto);
        let x = g.add(Terminator::Goto);
        let y = g.add(Terminator::Goto);
        g.link(p1, x, vec![]);
        g.link(p2, y, vec![]);
        g.link(x, y, vec![]);
        g.link(y, x, vec![]);

        let before = g.ids().len();
        let heads = structure_loops(&mut g);
        // x has the smaller id, so it is the head; y was duplicated.
        assert_eq!(heads, vec![x]);
        assert_eq!(g.ids().len(), before + 1);

        // Every SCC of size >= 2 now has exactly one entry.
        let live: BTreeSet<NodeId> = g.live_set();
        let sccs = tarjan_sccs(&g.ids(), |n| {
            g.node(n)
                .preds
                .iter()
                .copied()
                .filter(|p| live.contains(p))
                .collect()
        });
        for scc in sccs.iter().filter(|s| s.len() >= 2) {
            let scc_set: BTreeSet<NodeId> = scc.iter().copied().collect();
            let entries: Vec<NodeId> = scc
                .iter()
                .copied()
                .filter(|&n| g.node(n).preds.iter().any(|p| !scc_set.contains(p)))
                .collect();
            assert_eq!(entries.len(), 1, "scc {scc:?} has entries {entries:?}");
        }
    }

    #[test]
    fn nested_loops_produce_two_heads() {
        // outer: a -> b -> a, inner: b -> c -> b. Entry p -> a.
        let mut g = Graph::new();
        let p = g.add(Terminator::Goto);
        let a = g.add(Terminator::Goto);
        let b = g.add(Terminator::Goto);
        let c = g.add(Terminator::Goto);
        g.link(p, a, vec![]);
        g.link(a, b, vec![]);
        g.link(b, a, vec![]);
        g.link(b, c, vec![]);
        g.link(c, b, vec![]);

        let mut heads = structure_loops(&mut g);
        heads.sort();
        assert_eq!(heads, vec![a, b]);
    }
}
