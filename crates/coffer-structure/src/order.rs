//! Constraint ordering: find a valid nesting.
//!
//! Repeatedly grows a connected component of unplaced constraints (via the
//! forced partial order and lbound overlap under dominator closure), then
//! places one viable member: a constraint whose `forcedup` set is fully
//! placed and whose scopes can each swallow the other members whole. The
//! placed constraint absorbs the component's node set and is attached
//! under the lowest already-placed ancestor. Failure to find a viable
//! member means the input was not well-formed SSA.

use std::collections::{BTreeMap, BTreeSet};

use crate::StructureError;
use crate::constraints::{ConId, Constraint, Constraints};
use crate::dom::DominatorInfo;
use crate::graph::{Graph, NodeId};

/// The placed tree: synthetic root plus parent -> children lists.
pub type ConstraintTree = (ConId, BTreeMap<ConId, Vec<ConId>>);

pub fn order_constraints(
    dom: &DominatorInfo,
    graph: &Graph,
    cons: &mut Constraints,
    active: &[ConId],
    nodes: &BTreeSet<NodeId>,
) -> Result<ConstraintTree, StructureError> {
    let mut children: BTreeMap<Option<ConId>, Vec<ConId>> = BTreeMap::new();
    let mut frozen: BTreeSet<ConId> = BTreeSet::new();
    let mut todo: Vec<ConId> = active.to_vec();

    while !todo.is_empty() {
        // Grow a connected component starting from the first unplaced
        // constraint.
        let mut items: Vec<ConId> = Vec::new();
        let mut queue: Vec<ConId> = vec![todo[0]];
        let mut in_component: BTreeSet<ConId> = queue.iter().copied().collect();
        let mut nset: BTreeSet<NodeId> = BTreeSet::new();
        let mut parents: BTreeSet<ConId> = BTreeSet::new();

        while let Some(item) = queue.pop() {
            if frozen.contains(&item) {
                parents.insert(item);
                continue;
            }
            items.push(item);

            let forced: Vec<ConId> = cons
                .get(item)
                .forcedup
                .iter()
                .chain(cons.get(item).forceddown.iter())
                .copied()
                .collect();
            for other in forced {
                if in_component.insert(other) {
                    queue.push(other);
                }
            }

            if !cons.get(item).lbound.is_subset(&nset) {
                nset.extend(cons.get(item).lbound.iter().copied());
                nset = dom.extend(graph, &nset);
                for &other in active {
                    if !cons.get(other).lbound.is_disjoint(&nset)
                        && in_component.insert(other)
                    {
                        queue.push(other);
                    }
                }
            }
        }

        // Viable candidates: every forcedup ancestor already placed, and
        // each other member fits entirely inside one scope.
        let mut chosen: Option<(ConId, BTreeMap<usize, BTreeSet<NodeId>>)> = None;
        for &candidate in &items {
            if !cons.get(candidate).forcedup.is_subset(&frozen) {
                continue;
            }
            let mut svals: BTreeMap<usize, BTreeSet<NodeId>> = BTreeMap::new();
            let mut bad = false;
            for &item in &items {
                if item == candidate {
                    continue;
                }
                let ilbound = cons.get(item).lbound.clone();
                let matching: Vec<usize> = cons
                    .get(candidate)
                    .scopes
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| !s.ubound.is_disjoint(&ilbound))
                    .map(|(i, _)| i)
                    .collect();
                let fits = matching.len() == 1
                    && ilbound.is_subset(&cons.get(candidate).scopes[matching[0]].ubound);
                if !fits {
                    bad = true;
                    break;
                }
                svals
                    .entry(matching[0])
                    .or_default()
                    .extend(ilbound.iter().copied());
            }
            if !bad {
                chosen = Some((candidate, svals));
            }
        }
        let Some((cnode, svals)) = chosen else {
            return Err(StructureError::StructuringFailed);
        };

        let con = cons.get_mut(cnode);
        for (scope_index, ext) in svals {
            con.scopes[scope_index].lbound.extend(ext.iter().copied());
        }
        con.lbound.extend(nset.iter().copied());
        debug_assert!(con.lbound.is_subset(&con.ubound));

        // Attach under the lowest placed ancestor.
        let mut parent: Option<ConId> = None;
        loop {
            let kids = children.get(&parent).cloned().unwrap_or_default();
            let inter: Vec<ConId> = kids
                .iter()
                .copied()
                .filter(|k| parents.contains(k))
                .collect();
            match inter.as_slice() {
                [] => break,
                [only] => parent = Some(*only),
                _ => {
                    debug_assert!(false, "placed ancestors must form a chain");
                    parent = Some(inter[0]);
                }
            }
        }
        children.entry(parent).or_default().push(cnode);
        todo.retain(|&t| t != cnode);
        frozen.insert(cnode);
    }

    // Wrap the forest in a synthetic root covering every node.
    let croot = cons.add(Constraint::fixed_scope(nodes.clone()));
    let mut tree: BTreeMap<ConId, Vec<ConId>> = BTreeMap::new();
    for (parent, kids) in children {
        match parent {
            Some(p) => {
                tree.insert(p, kids);
            }
            None => {
                tree.insert(croot, kids);
            }
        }
    }
    tree.entry(croot).or_default();
    Ok((croot, tree))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{Kind, ScopeBounds};
    use crate::graph::Terminator;

    #[test]
    fn nested_lbounds_nest_in_tree() {
        // a -> b -> c; an outer scope over all three, an inner over {b}.
        let mut g = Graph::new();
        let a = g.add(Terminator::Goto);
        let b = g.add(Terminator::Goto);
        let c = g.add(Terminator::Return);
        g.link(a, b, vec![]);
        g.link(b, c, vec![]);
        let dom = DominatorInfo::compute(&g, a);

        let all: BTreeSet<NodeId> = [a, b, c].into_iter().collect();
        let inner_set: BTreeSet<NodeId> = [b].into_iter().collect();

        let mut cons = Constraints::new();
        let outer = cons.add(Constraint::compound(
            Kind::Scope,
            None,
            vec![ScopeBounds {
                lbound: all.clone(),
                ubound: all.clone(),
            }],
        ));
        let inner = cons.add(Constraint::compound(
            Kind::Scope,
            None,
            vec![ScopeBounds {
                lbound: inner_set.clone(),
                ubound: inner_set.clone(),
            }],
        ));

        let (croot, tree) =
            order_constraints(&dom, &g, &mut cons, &[outer, inner], &all).unwrap();
        assert_eq!(tree[&croot], vec![outer]);
        assert_eq!(tree[&outer], vec![inner]);

        // Sibling disjointness and child containment hold.
        for (&parent, kids) in &tree {
            let mut seen: BTreeSet<NodeId> = BTreeSet::new();
            for &kid in kids {
                assert!(seen.is_disjoint(&cons.get(kid).lbound));
                seen.extend(cons.get(kid).lbound.iter().copied());
                assert!(cons.get(kid).lbound.is_subset(&cons.get(parent).lbound));
            }
        }
    }
}
