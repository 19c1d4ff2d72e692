//! Structured-tree items and the final tree builder.
//!
//! Once the constraint tree is complete, each scope's lower bound is a
//! region whose items chain by unique in-scope successor. The builder
//! folds the tree bottom-up (explicit postorder, no recursion over the
//! graph), replacing each constraint by one structured item keyed by its
//! entry node.

use std::collections::{BTreeMap, BTreeSet};

use crate::constraints::{ConId, Constraints, Kind};
use crate::dom::DominatorInfo;
use crate::exset::{ClassId, Hierarchy};
use crate::graph::{Graph, NodeId, VarId};

/// One structured construct.
#[derive(Debug)]
pub enum Item {
    /// A single basic block.
    Block(NodeId),
    /// A labelled sequence of items.
    Scope(Scope),
    /// Two-way branch; the first arm is the branch taken when the
    /// condition holds.
    If { head: NodeId, arms: Vec<Scope> },
    /// Ordered cases; each is wrapped in its own scope so fallthrough
    /// targets stay addressable by labelled break.
    Switch { head: NodeId, cases: Vec<Scope> },
    While { body: Scope },
    Try {
        body: Scope,
        catch: Scope,
        tops: Vec<ClassId>,
        catchvar: Option<VarId>,
    },
}

#[derive(Debug, Default)]
pub struct Scope {
    pub items: Vec<Item>,
}

impl Item {
    /// The node control enters this item through.
    pub fn entry(&self) -> NodeId {
        match self {
            Item::Block(n) => *n,
            Item::Scope(scope) => scope.entry(),
            Item::If { head, .. } | Item::Switch { head, .. } => *head,
            Item::While { body } => body.entry(),
            Item::Try { body, .. } => body.entry(),
        }
    }

    pub fn collect_nodes(&self, out: &mut BTreeSet<NodeId>) {
        match self {
            Item::Block(n) => {
                out.insert(*n);
            }
            Item::Scope(scope) => scope.collect_nodes(out),
            Item::If { head, arms } => {
                out.insert(*head);
                for arm in arms {
                    arm.collect_nodes(out);
                }
            }
            Item::Switch { head, cases } => {
                out.insert(*head);
                for case in cases {
                    case.collect_nodes(out);
                }
            }
            Item::While { body } => body.collect_nodes(out),
            Item::Try { body, catch, .. } => {
                body.collect_nodes(out);
                catch.collect_nodes(out);
            }
        }
    }
}

impl Scope {
    pub fn entry(&self) -> NodeId {
        self.items.first().expect("scope is non-empty").entry()
    }

    pub fn collect_nodes(&self, out: &mut BTreeSet<NodeId>) {
        for item in &self.items {
            item.collect_nodes(out);
        }
    }
}

/// Loop-free successors of the item's node set, outside the set.
fn item_successors(item: &Item, graph: &Graph) -> BTreeSet<NodeId> {
    let mut nodes = BTreeSet::new();
    item.collect_nodes(&mut nodes);
    let mut successors = BTreeSet::new();
    for &n in &nodes {
        successors.extend(graph.node(n).succs_nl.iter().copied());
    }
    successors.difference(&nodes).copied().collect()
}

/// Fold the finished constraint tree into one structured scope.
pub fn build_tree(
    dom: &DominatorInfo,
    graph: &Graph,
    croot: ConId,
    children: &BTreeMap<ConId, Vec<ConId>>,
    cons: &Constraints,
    hierarchy: &Hierarchy,
) -> Scope {
    let mut seitems: BTreeMap<NodeId, Item> = graph
        .ids()
        .into_iter()
        .map(|n| (n, Item::Block(n)))
        .collect();

    // Postorder over the constraint tree: children before parents.
    let mut order: Vec<ConId> = Vec::new();
    let mut stack: Vec<(ConId, bool)> = vec![(croot, false)];
    while let Some((c, expanded)) = stack.pop() {
        if expanded {
            order.push(c);
            continue;
        }
        stack.push((c, true));
        for &kid in children.get(&c).map(|v| v.as_slice()).unwrap_or(&[]) {
            stack.push((kid, false));
        }
    }

    for cnode in order {
        let con = cons.get(cnode);
        let mut sescopes: Vec<Scope> = Vec::new();
        for scope in &con.scopes {
            let body = &scope.lbound;
            let mut items = Vec::new();
            let mut pos = if body.is_empty() {
                None
            } else {
                Some(dom.common(body.iter().copied()))
            };
            while let Some(p) = pos {
                let item = seitems.remove(&p).expect("chain entry is unplaced");
                let succ: Vec<NodeId> = item_successors(&item, graph)
                    .into_iter()
                    .filter(|s| body.contains(s))
                    .collect();
                debug_assert!(succ.len() <= 1);
                pos = succ.first().copied();
                items.push(item);
            }
            sescopes.push(Scope { items });
        }

        let new_item = match con.kind {
            Kind::While => Item::While {
                body: sescopes.swap_remove(0),
            },
            Kind::If => {
                let head = con.head.expect("if has a head");
                let head_item = seitems.remove(&head).expect("if head is unplaced");
                debug_assert!(matches!(head_item, Item::Block(_)));
                // The CFG stores the false branch first; the tree wants
                // the taken branch first.
                let second = sescopes.pop().expect("two arms");
                let first = sescopes.pop().expect("two arms");
                Item::If {
                    head,
                    arms: vec![second, first],
                }
            }
            Kind::Switch => {
                let head = con.head.expect("switch has a head");
                let head_item = seitems.remove(&head).expect("switch head is unplaced");
                debug_assert!(matches!(head_item, Item::Block(_)));
                let cases = sescopes
                    .into_iter()
                    .map(|s| Scope {
                        items: vec![Item::Scope(s)],
                    })
                    .collect();
                Item::Switch { head, cases }
            }
            Kind::Try => {
                let catch = sescopes.pop().expect("catch scope");
                let body = sescopes.pop().expect("try scope");
                Item::Try {
                    body,
                    catch,
                    tops: con.cset.tops(hierarchy),
                    catchvar: con.catchvar,
                }
            }
            Kind::Scope => Item::Scope(sescopes.swap_remove(0)),
        };

        let entry = new_item.entry();
        debug_assert!(!seitems.contains_key(&entry));
        seitems.insert(entry, new_item);
    }

    debug_assert_eq!(seitems.len(), 1);
    let (_, root) = seitems.pop_first().expect("root item");
    match root {
        Item::Scope(scope) => scope,
        other => Scope { items: vec![other] },
    }
}
