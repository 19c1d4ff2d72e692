//! Break-scope insertion.
//!
//! After scope completion some constraints still jump to more than one
//! place. Each round picks the jump target shared by the most pending
//! constraints (ties broken by reverse-topological position), wraps the
//! region that reaches it in a fixed scope constraint, and re-parents the
//! contained constraints, until every constraint has at most one outgoing
//! successor - expressible as a labelled break.

use std::collections::{BTreeMap, BTreeSet};

use crate::constraints::{ConId, Constraint, Constraints};
use crate::dom::DominatorInfo;
use crate::graph::{Graph, NodeId, postorder};

/// Outgoing normal successors of a constraint's body, restricted to the
/// enclosing scope.
fn outgoing(
    graph: &Graph,
    cons: &Constraints,
    pscope_lbound: &BTreeSet<NodeId>,
    cnode: ConId,
) -> BTreeSet<NodeId> {
    let body = &cons.get(cnode).lbound;
    let mut successors: BTreeSet<NodeId> = BTreeSet::new();
    for &n in body.iter() {
        successors.extend(graph.node(n).norm_succs_nl.iter().copied());
    }
    successors
        .difference(body)
        .copied()
        .filter(|s| pscope_lbound.contains(s))
        .collect()
}

pub fn add_break_scopes(
    dom: &DominatorInfo,
    graph: &Graph,
    croot: ConId,
    cons: &mut Constraints,
    active: &mut Vec<ConId>,
    children: &mut BTreeMap<ConId, Vec<ConId>>,
    entry: NodeId,
) {
    // Collect (constraint, outgoing-successor-set) pairs with an
    // explicit walk over the tree.
    let mut todo: Vec<(ConId, BTreeSet<NodeId>)> = Vec::new();
    let mut walk: Vec<(Option<BTreeSet<NodeId>>, ConId)> = vec![(None, croot)];
    while let Some((pscope_lbound, cnode)) = walk.pop() {
        if let Some(pscope_lbound) = pscope_lbound {
            let successors = outgoing(graph, cons, &pscope_lbound, cnode);
            if successors.len() > 1 {
                todo.push((cnode, successors));
            }
        }
        for &child in children.get(&cnode).map(|v| v.as_slice()).unwrap_or(&[]) {
            let matching: Vec<usize> = cons
                .get(cnode)
                .scopes
                .iter()
                .enumerate()
                .filter(|(_, s)| !s.ubound.is_disjoint(&cons.get(child).lbound))
                .map(|(i, _)| i)
                .collect();
            debug_assert_eq!(matching.len(), 1);
            let scope_lbound = cons.get(cnode).scopes[matching[0]].lbound.clone();
            walk.push((Some(scope_lbound), child));
        }
    }

    // Reverse topological order of the whole CFG for tie-breaking.
    let order_list = postorder(&[entry], |n| graph.node(n).succs_nl.clone());
    let position: BTreeMap<NodeId, usize> = order_list
        .iter()
        .enumerate()
        .map(|(i, &n)| (n, i))
        .collect();

    while !todo.is_empty() {
        // The successor appearing in the most pending sets wins.
        let mut counts: BTreeMap<NodeId, usize> = BTreeMap::new();
        for (_, successors) in &todo {
            for &s in successors {
                *counts.entry(s).or_default() += 1;
            }
        }
        let max_count = counts.values().copied().max().expect("todo is non-empty");
        let target = counts
            .iter()
            .filter(|&(_, &c)| c >= max_count)
            .map(|(&n, _)| n)
            .min_by_key(|n| position.get(n).copied().unwrap_or(usize::MAX))
            .expect("at least one candidate");

        // Nodes reachable from the target can never join the new scope.
        let after_scope: BTreeSet<NodeId> =
            postorder(&[target], |n| graph.node(n).succs_nl.clone())
                .into_iter()
                .collect();

        let mut body: BTreeSet<NodeId> = BTreeSet::new();
        let mut other_targets: BTreeSet<NodeId> = BTreeSet::new();
        for (cnode, successors) in &todo {
            if successors.contains(&target) {
                body.extend(cons.get(*cnode).lbound.iter().copied());
                other_targets.extend(successors.iter().copied());
            }
        }
        body.extend(other_targets.difference(&after_scope).copied());
        body.extend(graph.node(target).preds_nl.iter().copied());
        body = dom.extend(graph, &body);

        // Swallow every constraint the region cuts through.
        let overlapping: Vec<ConId> = active
            .iter()
            .copied()
            .filter(|&c| {
                let lbound = &cons.get(c).lbound;
                !lbound.is_disjoint(&body) && !lbound.is_superset(&body)
            })
            .collect();
        for c in overlapping {
            body.extend(cons.get(c).lbound.iter().copied());
        }
        debug_assert!(body.is_disjoint(&after_scope));

        // Lowest enclosing scope.
        let mut parent = croot;
        let mut pscope_index = 0usize;
        loop {
            let before = parent;
            for &child in children.get(&parent).map(|v| v.as_slice()).unwrap_or(&[]) {
                for (i, scope) in cons.get(child).scopes.iter().enumerate() {
                    if body.is_subset(&scope.lbound) {
                        parent = child;
                        pscope_index = i;
                    }
                }
            }
            if before == parent {
                break;
            }
        }

        {
            let con = cons.get_mut(parent);
            con.scopes[pscope_index]
                .lbound
                .extend(body.iter().copied());
            con.lbound.extend(body.iter().copied());
        }

        let fresh = cons.add(Constraint::fixed_scope(body.clone()));
        let moved: Vec<ConId> = children
            .get(&parent)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
            .iter()
            .copied()
            .filter(|&c| cons.get(c).lbound.is_subset(&body))
            .collect();
        children
            .entry(parent)
            .or_default()
            .retain(|c| !moved.contains(c));
        children.entry(parent).or_default().push(fresh);
        children.insert(fresh, moved);
        active.push(fresh);

        // Contained constraints' pending jumps are clipped to the new
        // scope; the scope itself becomes a pending entry.
        for (cnode, successors) in todo.iter_mut() {
            if children[&fresh].contains(cnode) {
                successors.retain(|s| body.contains(s));
            }
        }
        let pscope_lbound = cons.get(parent).scopes[pscope_index].lbound.clone();
        let fresh_successors = outgoing(graph, cons, &pscope_lbound, fresh);
        todo.push((fresh, fresh_successors));
        todo.retain(|(_, successors)| successors.len() > 1);
    }
}
