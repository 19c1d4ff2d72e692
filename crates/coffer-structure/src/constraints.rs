//! Nested-scope constraints.
//!
//! Each pending structured construct is a [`Constraint`]: a tag, optional
//! head node, and one bound pair per scope. `lbound` is the mandatory
//! member set, `ubound` the maximal permitted one; `lbound` stays inside
//! `ubound` at all times, and sibling constraints in the finished tree
//! have disjoint `lbound`s. Try constraints additionally carry the caught
//! exception set, the caught variable, per-node forbidden sets and the
//! `forcedup`/`forceddown` partial order.

use std::collections::{BTreeMap, BTreeSet};

use crate::cond::{IfInfo, SwitchInfo};
use crate::dom::DominatorInfo;
use crate::exset::ExceptionSet;
use crate::graph::{Graph, NodeId, VarId};
use crate::throws::ThrowInfo;

/// Constraint identity within a [`Constraints`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    While,
    Try,
    Switch,
    If,
    Scope,
}

/// One scope's bounds.
#[derive(Debug, Clone, Default)]
pub struct ScopeBounds {
    pub lbound: BTreeSet<NodeId>,
    pub ubound: BTreeSet<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Constraint {
    pub kind: Kind,
    pub head: Option<NodeId>,
    pub scopes: Vec<ScopeBounds>,
    pub lbound: BTreeSet<NodeId>,
    pub ubound: BTreeSet<NodeId>,

    // Try-only state; empty/None elsewhere.
    pub target: Option<NodeId>,
    pub orig_target: Option<NodeId>,
    pub cset: ExceptionSet,
    pub catchvar: Option<VarId>,
    pub forcedup: BTreeSet<ConId>,
    pub forceddown: BTreeSet<ConId>,
    pub forbidden: BTreeMap<NodeId, ExceptionSet>,
}

impl Constraint {
    pub fn compound(kind: Kind, head: Option<NodeId>, scopes: Vec<ScopeBounds>) -> Self {
        let mut lbound: BTreeSet<NodeId> = BTreeSet::new();
        let mut ubound: BTreeSet<NodeId> = BTreeSet::new();
        for scope in &scopes {
            lbound.extend(scope.lbound.iter().copied());
            ubound.extend(scope.ubound.iter().copied());
        }
        if let Some(h) = head {
            lbound.insert(h);
            ubound.insert(h);
        }
        debug_assert!(lbound.is_subset(&ubound));
        Self {
            kind,
            head,
            scopes,
            lbound,
            ubound,
            target: None,
            orig_target: None,
            cset: ExceptionSet::empty(),
            catchvar: None,
            forcedup: BTreeSet::new(),
            forceddown: BTreeSet::new(),
            forbidden: BTreeMap::new(),
        }
    }

    /// A frozen scope whose bounds coincide.
    pub fn fixed_scope(lbound: BTreeSet<NodeId>) -> Self {
        let scope = ScopeBounds {
            lbound: lbound.clone(),
            ubound: lbound.clone(),
        };
        Self::compound(Kind::Scope, None, vec![scope])
    }
}

/// Arena of constraints; ids are indices and are never reused.
#[derive(Debug, Default)]
pub struct Constraints {
    items: Vec<Constraint>,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, constraint: Constraint) -> ConId {
        let id = ConId(self.items.len() as u32);
        self.items.push(constraint);
        id
    }

    pub fn get(&self, id: ConId) -> &Constraint {
        &self.items[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ConId) -> &mut Constraint {
        &mut self.items[id.0 as usize]
    }
}

fn while_constraint(dom: &DominatorInfo, graph: &Graph, head: NodeId) -> Constraint {
    let ubound = dom.area(head);
    let mut seed: BTreeSet<NodeId> = BTreeSet::new();
    seed.insert(head);
    for &p in &graph.node(head).preds {
        if ubound.contains(&p) {
            seed.insert(p);
        }
    }
    let lbound = dom.extend(graph, &seed);
    debug_assert!(lbound.len() > 1);
    Constraint::compound(Kind::While, None, vec![ScopeBounds { lbound, ubound }])
}

fn try_constraint(
    graph: &Graph,
    trynode: NodeId,
    target: NodeId,
    cset: ExceptionSet,
    catchvar: Option<VarId>,
) -> Constraint {
    let mut bound = BTreeSet::new();
    bound.insert(trynode);
    let scope = ScopeBounds {
        lbound: bound.clone(),
        ubound: bound,
    };
    let mut con = Constraint::compound(Kind::Try, None, vec![scope]);
    con.target = Some(target);
    debug_assert_eq!(graph.node(target).succs.len(), 1);
    con.orig_target = Some(graph.node(target).succs[0]);
    con.cset = cset;
    con.catchvar = catchvar;
    con
}

/// Build all constraints from the structuring passes' outputs. Returns
/// the active constraint ids in creation order.
pub fn create_constraints(
    cons: &mut Constraints,
    dom: &DominatorInfo,
    graph: &Graph,
    while_heads: &[NodeId],
    throw_infos: &[ThrowInfo],
    switch_infos: &[SwitchInfo],
    if_infos: &[IfInfo],
) -> Vec<ConId> {
    let mut active = Vec::new();

    for &head in while_heads {
        active.push(cons.add(while_constraint(dom, graph, head)));
    }

    // Per handler target: nodes where this target's set does not cover
    // the whole mask, and what it must not cover there.
    let mut forbid_maps: BTreeMap<NodeId, BTreeMap<NodeId, ExceptionSet>> = BTreeMap::new();
    for info in throw_infos {
        if info.csets.len() > 1 {
            for (&handler, cset) in &info.csets {
                forbid_maps
                    .entry(handler)
                    .or_default()
                    .insert(info.node, info.mask.difference(cset));
            }
        }
    }

    for info in throw_infos {
        let batch: Vec<ConId> = info
            .tryinfos
            .iter()
            .map(|(top, target, caughtvar)| {
                cons.add(try_constraint(
                    graph,
                    info.node,
                    *target,
                    top.clone(),
                    *caughtvar,
                ))
            })
            .collect();

        // Strict subset on the caught sets forces nesting order.
        for &a in &batch {
            for &b in &batch {
                if a == b {
                    continue;
                }
                let narrower = cons.get(a).cset.is_subset(&cons.get(b).cset)
                    && cons.get(a).cset != cons.get(b).cset;
                if narrower {
                    cons.get_mut(a).forcedup.insert(b);
                    cons.get_mut(b).forceddown.insert(a);
                }
            }
        }

        for &id in &batch {
            let orig_target = cons.get(id).orig_target.expect("try target");
            let mut forbidden = forbid_maps
                .get(&orig_target)
                .cloned()
                .unwrap_or_default();
            if forbidden.contains_key(&info.node) {
                let downs: Vec<ConId> = cons.get(id).forceddown.iter().copied().collect();
                for down in downs {
                    let down_cset = cons.get(down).cset.clone();
                    if let Some(entry) = forbidden.get_mut(&info.node) {
                        *entry = entry.difference(&down_cset);
                    }
                }
                debug_assert!(
                    !cons.get(id)
                        .cset
                        .intersects(forbidden.get(&info.node).unwrap_or(&ExceptionSet::empty()))
                );
                if forbidden
                    .get(&info.node)
                    .is_some_and(|set| set.is_empty())
                {
                    forbidden.remove(&info.node);
                }
            }
            cons.get_mut(id).forbidden = forbidden;
        }
        active.extend(batch);
    }

    for info in switch_infos {
        let mut last: Vec<NodeId> = Vec::new();
        let mut scopes = Vec::new();
        for &target in info.ordered.iter().rev() {
            let fallthroughs: Vec<NodeId> = last
                .iter()
                .copied()
                .filter(|&x| dom.dominators(x).contains(&target))
                .collect();
            last = graph.node(target).preds.clone();

            let mut seed: BTreeSet<NodeId> = fallthroughs.into_iter().collect();
            seed.insert(target);
            let lbound = dom.extend(graph, &seed);
            let ubound = dom.area(target);
            debug_assert!(lbound.is_subset(&ubound) && !ubound.contains(&info.node));
            scopes.push(ScopeBounds { lbound, ubound });
        }
        scopes.reverse();
        active.push(cons.add(Constraint::compound(Kind::Switch, Some(info.node), scopes)));
    }

    for info in if_infos {
        let scopes: Vec<ScopeBounds> = info
            .targets
            .iter()
            .map(|&target| {
                let mut lbound = BTreeSet::new();
                lbound.insert(target);
                ScopeBounds {
                    lbound,
                    ubound: dom.area(target),
                }
            })
            .collect();
        active.push(cons.add(Constraint::compound(Kind::If, Some(info.node), scopes)));
    }

    active
}
