//! Try-scope merging.
//!
//! Walks try constraints top-down through the placed tree and greedily
//! extends each one to swallow compatible same-handler tries, so the
//! swallowed ones can be removed. Extension must respect the forced
//! nesting order, the tree shape (a try can only grow by absorbing whole
//! ancestors and siblings), its own upper bound, and the per-node
//! forbidden exception sets - which it may shrink by forcing other tries
//! to nest inside it.

use std::collections::{BTreeMap, BTreeSet};

use crate::constraints::{ConId, Constraints, Kind, ScopeBounds};
use crate::dom::DominatorInfo;
use crate::exset::ExceptionSet;
use crate::graph::{Graph, NodeId, VarId, postorder};

fn kids<'t>(children: &'t BTreeMap<ConId, Vec<ConId>>, id: ConId) -> &'t [ConId] {
    children.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
}

fn unforbid(
    forbidden: &mut BTreeMap<NodeId, ExceptionSet>,
    down_lbound: &BTreeSet<NodeId>,
    down_cset: &ExceptionSet,
) {
    for n in down_lbound {
        if let Some(entry) = forbidden.get_mut(n) {
            *entry = entry.difference(down_cset);
            if entry.is_empty() {
                forbidden.remove(n);
            }
        }
    }
}

/// Attempt to extend `con` to cover `con2`. On failure nothing observable
/// changes, except that `con.ubound` may shrink to make future attempts
/// fail faster.
#[allow(clippy::too_many_arguments)]
fn try_extend(
    graph: &Graph,
    dom: &DominatorInfo,
    cons: &mut Constraints,
    parents: &mut BTreeMap<ConId, ConId>,
    children: &mut BTreeMap<ConId, Vec<ConId>>,
    trycons: &[ConId],
    con_id: ConId,
    con2_id: ConId,
) -> bool {
    let mut forcedup: BTreeSet<ConId> = cons
        .get(con_id)
        .forcedup
        .union(&cons.get(con2_id).forcedup)
        .copied()
        .collect();
    let mut forceddown: BTreeSet<ConId> = cons
        .get(con_id)
        .forceddown
        .union(&cons.get(con2_id).forceddown)
        .copied()
        .collect();
    debug_assert!(!forceddown.contains(&con_id));
    forcedup.remove(&con_id);
    if !forcedup.is_disjoint(&forceddown) {
        return false;
    }

    let mut body: BTreeSet<NodeId> = cons
        .get(con_id)
        .lbound
        .union(&cons.get(con2_id).lbound)
        .copied()
        .collect();
    body = dom.extend(graph, &body);

    // Grow upward until the body fits inside a single parent.
    let oldparent = parents[&con_id];
    let mut parent = oldparent;
    while !body.is_subset(&cons.get(parent).lbound) {
        body.extend(cons.get(parent).lbound.iter().copied());
        if !body.is_subset(&cons.get(con_id).ubound) {
            let parent_lbound = cons.get(parent).lbound.clone();
            let con = cons.get_mut(con_id);
            con.ubound = con
                .ubound
                .intersection(&parent_lbound)
                .copied()
                .collect();
            return false;
        }
        parent = parents[&parent];
    }

    // Absorb every sibling the body touches.
    for &child in kids(children, parent) {
        if !cons.get(child).lbound.is_disjoint(&body) {
            body.extend(cons.get(child).lbound.iter().copied());
        }
    }
    if !body.is_subset(&cons.get(con_id).ubound) {
        return false;
    }

    let cset = cons.get(con_id).cset.union(&cons.get(con2_id).cset);
    let mut forbidden = cons.get(con_id).forbidden.clone();
    let newly_down: Vec<ConId> = forceddown
        .difference(&cons.get(con_id).forceddown)
        .copied()
        .collect();
    for down in newly_down {
        let lb = cons.get(down).lbound.clone();
        let cs = cons.get(down).cset.clone();
        unforbid(&mut forbidden, &lb, &cs);
    }

    // The merged cset may hit forbidden types; try to clear them by
    // forcing other tries down inside the merged scope.
    for &node in &body {
        let Some(f) = forbidden.get(&node) else { continue };
        let mut bad = cset.intersection(f);
        if bad.is_empty() {
            continue;
        }

        let candidates: Vec<ConId> = trycons
            .iter()
            .copied()
            .filter(|&c| {
                c != con_id
                    && cons.get(c).lbound.contains(&node)
                    && cons.get(c).lbound.is_subset(&body)
                    && cons.get(c).cset.intersects(&bad)
                    && !forcedup.contains(&c)
            })
            .collect();
        for topnd in candidates {
            if forceddown.contains(&topnd) {
                continue;
            }
            let mut group: BTreeSet<ConId> = cons
                .get(topnd)
                .forceddown
                .difference(&forceddown)
                .copied()
                .collect();
            group.insert(topnd);
            for &down in &group {
                let lb = cons.get(down).lbound.clone();
                let cs = cons.get(down).cset.clone();
                unforbid(&mut forbidden, &lb, &cs);
            }
            debug_assert!(!group.contains(&con_id));
            forceddown.extend(group.iter().copied());
            bad = match forbidden.get(&node) {
                Some(f) => cset.intersection(f),
                None => ExceptionSet::empty(),
            };
            if bad.is_empty() {
                break;
            }
        }
        if !bad.is_empty() {
            return false;
        }
    }
    debug_assert!(forceddown.is_disjoint(&forcedup));

    // Commit.
    {
        let con = cons.get_mut(con_id);
        con.lbound = body.clone();
        con.cset = cset;
        con.forbidden = forbidden;
        con.forcedup = forcedup.clone();
        con.forceddown = forceddown.clone();
    }
    for &up in &forcedup {
        cons.get_mut(up).forceddown.insert(con_id);
    }
    for &down in &forceddown {
        cons.get_mut(down).forcedup.insert(con_id);
    }

    // Re-hang the tree: the extended try's old children move to its old
    // parent, the try itself moves under the parent that fits its new
    // body, and any sibling now inside the body becomes its child.
    let moved = children.remove(&con_id).unwrap_or_default();
    for &child in &moved {
        parents.insert(child, oldparent);
    }
    children.entry(oldparent).or_default().extend(moved);
    children
        .entry(oldparent)
        .or_default()
        .retain(|&c| c != con_id);
    children.entry(parent).or_default().push(con_id);
    parents.insert(con_id, parent);

    let absorbed: Vec<ConId> = kids(children, parent)
        .iter()
        .copied()
        .filter(|&c| c != con_id && cons.get(c).lbound.is_subset(&body))
        .collect();
    children
        .entry(parent)
        .or_default()
        .retain(|c| !absorbed.contains(c));
    for &c in &absorbed {
        parents.insert(c, con_id);
    }
    children.insert(con_id, absorbed);
    true
}

/// Merge compatible try constraints, remove the subsumed ones and their
/// pass-through nodes, and retarget the surviving throw edges. Returns
/// fresh dominator info for the reduced graph.
pub fn merge_exceptions(
    graph: &mut Graph,
    dom: &DominatorInfo,
    children: &mut BTreeMap<ConId, Vec<ConId>>,
    cons: &mut Constraints,
    active: &mut Vec<ConId>,
    entry: NodeId,
) -> DominatorInfo {
    let mut parents: BTreeMap<ConId, ConId> = BTreeMap::new();
    for (&parent, kids) in children.iter() {
        for &child in kids {
            parents.insert(child, parent);
        }
    }

    // Tree order, ancestors first.
    let mut topo: Vec<ConId> = Vec::new();
    let mut seen: BTreeSet<ConId> = BTreeSet::new();
    for &c in active.iter() {
        let mut chain = Vec::new();
        let mut cur = Some(c);
        while let Some(x) = cur {
            if seen.contains(&x) {
                break;
            }
            chain.push(x);
            cur = parents.get(&x).copied();
        }
        for &x in chain.iter().rev() {
            seen.insert(x);
            topo.push(x);
        }
    }
    let position: BTreeMap<ConId, usize> =
        topo.iter().enumerate().map(|(i, &c)| (c, i)).collect();
    let mut trycons: Vec<ConId> = active
        .iter()
        .copied()
        .filter(|&c| cons.get(c).kind == Kind::Try)
        .collect();
    trycons.sort_by_key(|c| position[c]);

    let live_nodes = graph.live_set();
    let mut removed: BTreeSet<ConId> = BTreeSet::new();

    for index in 0..trycons.len() {
        let con_id = trycons[index];
        if removed.contains(&con_id) {
            continue;
        }

        // Effective upper bound: everything not reachable from the catch
        // target (ignoring edges back through the try head's dominators).
        let tryhead = *cons.get(con_id).lbound.first().expect("try head");
        let backnodes: BTreeSet<NodeId> =
            dom.dominators(tryhead).iter().copied().collect();
        let target = cons.get(con_id).target.expect("try target");
        let catchreach: BTreeSet<NodeId> = postorder(&[target], |n| {
            graph
                .node(n)
                .succs
                .iter()
                .copied()
                .filter(|s| !backnodes.contains(s))
                .collect()
        })
        .into_iter()
        .collect();
        cons.get_mut(con_id).ubound =
            live_nodes.difference(&catchreach).copied().collect();

        let candidates: Vec<ConId> = trycons
            .iter()
            .copied()
            .filter(|&c| {
                c != con_id
                    && !removed.contains(&c)
                    && cons.get(c).orig_target == cons.get(con_id).orig_target
                    && cons.get(c).lbound.is_subset(&cons.get(con_id).ubound)
            })
            .collect();

        for &con2 in &candidates {
            try_extend(
                graph, dom, cons, &mut parents, children, &trycons, con_id, con2,
            );
        }

        // Remove every candidate the extension fully subsumed.
        for &con2 in &candidates {
            let subsumed = cons.get(con2).lbound.is_subset(&cons.get(con_id).lbound)
                && cons
                    .get(con2)
                    .forceddown
                    .iter()
                    .all(|d| {
                        *d == con_id
                            || *d == con2
                            || cons.get(con_id).forceddown.contains(d)
                    })
                && cons
                    .get(con2)
                    .forcedup
                    .iter()
                    .all(|u| {
                        *u == con_id || *u == con2 || cons.get(con_id).forcedup.contains(u)
                    })
                && cons.get(con2).cset.is_subset(&cons.get(con_id).cset);
            if !subsumed {
                continue;
            }

            removed.insert(con2);
            for &tc in &trycons {
                cons.get_mut(tc).forcedup.remove(&con2);
                cons.get_mut(tc).forceddown.remove(&con2);
            }
            let parent = parents[&con2];
            let orphans = children.remove(&con2).unwrap_or_default();
            for &kid in &orphans {
                parents.insert(kid, parent);
            }
            children.entry(parent).or_default().extend(orphans);
            children.entry(parent).or_default().retain(|&c| c != con2);
            parents.remove(&con2);
        }
    }

    // Drop the removed constraints and their pass-through nodes.
    let removed_nodes: BTreeSet<NodeId> = removed
        .iter()
        .map(|&c| cons.get(c).target.expect("try target"))
        .collect();
    active.retain(|c| !removed.contains(c));
    for &c in active.iter() {
        let con = cons.get_mut(c);
        con.lbound.retain(|n| !removed_nodes.contains(n));
        con.ubound.retain(|n| !removed_nodes.contains(n));
        for scope in con.scopes.iter_mut() {
            scope.lbound.retain(|n| !removed_nodes.contains(n));
            scope.ubound.retain(|n| !removed_nodes.contains(n));
        }
    }
    let survivors: Vec<ConId> = trycons
        .iter()
        .copied()
        .filter(|c| !removed.contains(c))
        .collect();
    for &tc in &survivors {
        let con = cons.get_mut(tc);
        con.forcedup.retain(|c| !removed.contains(c));
        con.forceddown.retain(|c| !removed.contains(c));
        // The merged bounds become the try scope's bounds.
        let lbound = con.lbound.clone();
        let ubound = con.ubound.clone();
        con.scopes[0].lbound = lbound;
        con.scopes[0].ubound = ubound;
    }

    // Rebuild each node's edges: normal successors come from outvars,
    // throw edges are re-pointed at the surviving pass-through nodes.
    for n in graph.ids() {
        if removed_nodes.contains(&n) {
            continue;
        }
        graph
            .node_mut(n)
            .preds
            .retain(|p| !removed_nodes.contains(p));
        let normal: Vec<NodeId> = graph
            .node(n)
            .succs
            .iter()
            .copied()
            .filter(|s| graph.node(n).outvars.contains_key(s))
            .collect();
        graph.node_mut(n).succs = normal;

        let eassigns = std::mem::take(&mut graph.node_mut(n).eassigns);
        if eassigns.is_empty() {
            continue;
        }
        let by_handler: BTreeMap<NodeId, Vec<Option<VarId>>> = eassigns
            .into_iter()
            .map(|(dummy, vars)| (graph.node(dummy).succs[0], vars))
            .collect();
        let mut rebuilt: BTreeMap<NodeId, Vec<Option<VarId>>> = BTreeMap::new();
        for &tc in &survivors {
            if !cons.get(tc).lbound.contains(&n) {
                continue;
            }
            let orig = cons.get(tc).orig_target.expect("try handler");
            if let Some(vars) = by_handler.get(&orig) {
                let target = cons.get(tc).target.expect("try target");
                rebuilt.insert(target, vars.clone());
                if !graph.node(target).preds.contains(&n) {
                    graph.node_mut(target).preds.push(n);
                }
                graph.node_mut(n).succs.push(target);
            }
        }
        debug_assert!(rebuilt.len() >= by_handler.len());
        graph.node_mut(n).eassigns = rebuilt;
    }
    for &d in &removed_nodes {
        graph.remove(d);
    }

    DominatorInfo::compute(graph, entry)
}

/// Freeze try constraints: add the catch scope, restrict the try scope's
/// upper bound by the forbidden sets, and drop the forbidden maps.
pub fn fix_try_constraints(dom: &DominatorInfo, cons: &mut Constraints, active: &[ConId]) {
    for &id in active {
        if cons.get(id).kind != Kind::Try {
            continue;
        }
        let target = cons.get(id).target.expect("try target");
        let mut catch_lbound = BTreeSet::new();
        catch_lbound.insert(target);
        let catch_scope = ScopeBounds {
            lbound: catch_lbound,
            ubound: dom.area(target),
        };

        let con = cons.get_mut(id);
        let cset = con.cset.clone();
        let forbidden = std::mem::take(&mut con.forbidden);
        let empty = ExceptionSet::empty();
        con.scopes[0]
            .ubound
            .retain(|x| !cset.intersects(forbidden.get(x).unwrap_or(&empty)));
        con.scopes.push(catch_scope);

        con.lbound = con.scopes[0]
            .lbound
            .union(&con.scopes[1].lbound)
            .copied()
            .collect();
        con.ubound = con.scopes[0]
            .ubound
            .union(&con.scopes[1].ubound)
            .copied()
            .collect();
        debug_assert!(con.scopes[0].lbound.is_subset(&con.scopes[0].ubound));
        debug_assert!(con.scopes[0].ubound.is_disjoint(&con.scopes[1].ubound));
    }
}
