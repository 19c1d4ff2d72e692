use std::collections::BTreeSet;

use crate::exset::{ExceptionSet, Hierarchy};
use crate::graph::{Graph, NodeId, Terminator, ThrowDispatch, VarId};
use crate::pipeline::structure;
use crate::setree::{Item, Scope};

fn empty_hierarchy() -> Hierarchy {
    Hierarchy::new()
}

fn tree_nodes(scope: &Scope) -> BTreeSet<NodeId> {
    let mut out = BTreeSet::new();
    scope.collect_nodes(&mut out);
    out
}

#[test]
fn linear_graph_becomes_block_sequence() {
    let mut g = Graph::new();
    let a = g.add(Terminator::Goto);
    let b = g.add(Terminator::Goto);
    let c = g.add(Terminator::Return);
    g.link(a, b, vec![]);
    g.link(b, c, vec![]);

    let tree = structure(&mut g, a, &empty_hierarchy()).unwrap();
    assert_eq!(tree.items.len(), 3);
    let entries: Vec<NodeId> = tree.items.iter().map(|i| i.entry()).collect();
    assert_eq!(entries, vec![a, b, c]);
    for item in &tree.items {
        assert!(matches!(item, Item::Block(_)));
    }
    assert_eq!(tree_nodes(&tree), g.live_set());
}

#[test]
fn diamond_becomes_if_with_two_arms() {
    let mut g = Graph::new();
    let a = g.add(Terminator::If);
    let b = g.add(Terminator::Goto);
    let c = g.add(Terminator::Goto);
    let d = g.add(Terminator::Return);
    g.link(a, b, vec![]);
    g.link(a, c, vec![]);
    g.link(b, d, vec![]);
    g.link(c, d, vec![]);

    let tree = structure(&mut g, a, &empty_hierarchy()).unwrap();
    // The if (head plus both arms), then the join block.
    assert_eq!(tree.items.len(), 2);
    let Item::If { head, arms } = &tree.items[0] else {
        panic!("expected an if, got {:?}", tree.items[0]);
    };
    assert_eq!(*head, a);
    assert_eq!(arms.len(), 2);
    // Each arm holds its fresh entry node followed by the branch block.
    let mut arm_blocks = BTreeSet::new();
    for arm in arms {
        assert_eq!(arm.items.len(), 2);
        arm_blocks.insert(arm.items[1].entry());
    }
    assert_eq!(arm_blocks, [b, c].into_iter().collect());
    assert_eq!(tree.items[1].entry(), d);

    // Every live node appears exactly once in the tree.
    assert_eq!(tree_nodes(&tree), g.live_set());
}

#[test]
fn single_loop_becomes_while() {
    // a -> b, a -> c, b -> c, c -> a: one loop headed at a.
    let mut g = Graph::new();
    let a = g.add(Terminator::If);
    let b = g.add(Terminator::Goto);
    let c = g.add(Terminator::Goto);
    g.link(a, b, vec![]);
    g.link(a, c, vec![]);
    g.link(b, c, vec![]);
    g.link(c, a, vec![]);

    let tree = structure(&mut g, a, &empty_hierarchy()).unwrap();
    assert_eq!(tree.items.len(), 1);
    let Item::While { body } = &tree.items[0] else {
        panic!("expected a while, got {:?}", tree.items[0]);
    };
    // The loop body covers the original nodes (plus branch pass-throughs).
    let mut body_nodes = BTreeSet::new();
    body.collect_nodes(&mut body_nodes);
    for original in [a, b, c] {
        assert!(body_nodes.contains(&original));
    }
    assert_eq!(tree_nodes(&tree), g.live_set());
}

#[test]
fn thrower_becomes_try_with_catch_scope() {
    let mut h = Hierarchy::new();
    let throwable = h.add("java/lang/Throwable", None);
    let exception = h.add("java/lang/Exception", Some(throwable));
    let io = h.add("java/io/IOException", Some(exception));

    let mut g = Graph::new();
    let a = g.add(Terminator::Goto);
    let t = g.add(Terminator::OnException);
    let r = g.add(Terminator::Return);
    let handler = g.add(Terminator::Return);
    g.link(a, t, vec![]);
    g.link(t, r, vec![]);
    g.link(t, handler, vec![VarId(0)]);
    g.node_mut(handler).invars = vec![VarId(7)];
    g.node_mut(t).dispatch = Some(ThrowDispatch {
        thrown: VarId(0),
        handlers: vec![(handler, ExceptionSet::from_top(&h, io))],
    });

    let tree = structure(&mut g, a, &h).unwrap();
    assert_eq!(tree.items.len(), 2);
    assert_eq!(tree.items[0].entry(), a);
    let Item::Try {
        body,
        catch,
        tops,
        catchvar,
    } = &tree.items[1]
    else {
        panic!("expected a try, got {:?}", tree.items[1]);
    };
    assert_eq!(body.entry(), t);
    assert_eq!(tops, &vec![io]);
    assert_eq!(*catchvar, Some(VarId(7)));
    // The catch scope ends at the handler block.
    let mut catch_nodes = BTreeSet::new();
    catch.collect_nodes(&mut catch_nodes);
    assert!(catch_nodes.contains(&handler));

    assert_eq!(tree_nodes(&tree), g.live_set());
}

#[test]
fn same_handler_tries_merge_into_one() {
    let mut h = Hierarchy::new();
    let throwable = h.add("java/lang/Throwable", None);
    let exception = h.add("java/lang/Exception", Some(throwable));
    let e1 = h.add("java/io/IOException", Some(exception));
    let e2 = h.add("java/lang/ArithmeticException", Some(exception));

    let mut g = Graph::new();
    let a = g.add(Terminator::Goto);
    let t1 = g.add(Terminator::OnException);
    let t2 = g.add(Terminator::OnException);
    let r = g.add(Terminator::Return);
    let handler = g.add(Terminator::Return);
    g.link(a, t1, vec![]);
    g.link(t1, t2, vec![]);
    g.link(t2, r, vec![]);
    g.link(t1, handler, vec![VarId(0)]);
    g.link(t2, handler, vec![VarId(1)]);
    g.node_mut(handler).invars = vec![VarId(7)];
    g.node_mut(t1).dispatch = Some(ThrowDispatch {
        thrown: VarId(0),
        handlers: vec![(handler, ExceptionSet::from_top(&h, e1))],
    });
    g.node_mut(t2).dispatch = Some(ThrowDispatch {
        thrown: VarId(1),
        handlers: vec![(handler, ExceptionSet::from_top(&h, e2))],
    });

    let tree = structure(&mut g, a, &h).unwrap();
    // One merged try remains; its caught set is the union of both.
    let mut tries = Vec::new();
    fn find_tries<'t>(scope: &'t Scope, out: &mut Vec<&'t Item>) {
        for item in &scope.items {
            match item {
                Item::Try { body, catch, .. } => {
                    out.push(item);
                    find_tries(body, out);
                    find_tries(catch, out);
                }
                Item::Scope(s) => find_tries(s, out),
                Item::If { arms, .. } => {
                    for arm in arms {
                        find_tries(arm, out);
                    }
                }
                Item::Switch { cases, .. } => {
                    for case in cases {
                        find_tries(case, out);
                    }
                }
                Item::While { body } => find_tries(body, out),
                Item::Block(_) => {}
            }
        }
    }
    find_tries(&tree, &mut tries);
    assert_eq!(tries.len(), 1);
    let Item::Try { body, tops, .. } = tries[0] else {
        unreachable!();
    };
    assert_eq!(tops, &vec![e1, e2]);
    let mut body_nodes = BTreeSet::new();
    body.collect_nodes(&mut body_nodes);
    assert!(body_nodes.contains(&t1));
    assert!(body_nodes.contains(&t2));

    assert_eq!(tree_nodes(&tree), g.live_set());
}

#[test]
fn switch_cases_follow_fallthrough_order() {
    // e switches to c0 and c1; c0 falls through to c1; c1 exits to x.
    let mut g = Graph::new();
    let e = g.add(Terminator::Switch);
    let c0 = g.add(Terminator::Goto);
    let c1 = g.add(Terminator::Goto);
    let x = g.add(Terminator::Return);
    g.link(e, c0, vec![]);
    g.link(e, c1, vec![]);
    g.link(c0, c1, vec![]);
    g.link(c1, x, vec![]);

    let tree = structure(&mut g, e, &empty_hierarchy()).unwrap();
    assert_eq!(tree.items.len(), 1);
    let Item::Switch { head, cases } = &tree.items[0] else {
        panic!("expected a switch, got {:?}", tree.items[0]);
    };
    assert_eq!(*head, e);
    assert_eq!(cases.len(), 2);
    // Fallthrough order: the c0 case precedes the c1 case.
    let case_entries: Vec<NodeId> = cases
        .iter()
        .map(|case| case.items[0].entry())
        .collect();
    assert_eq!(case_entries, vec![c0, c1]);

    assert_eq!(tree_nodes(&tree), g.live_set());
}

#[test]
fn self_loop_is_isolated_before_loop_analysis() {
    let mut g = Graph::new();
    let a = g.add(Terminator::Goto);
    let b = g.add(Terminator::If);
    let c = g.add(Terminator::Return);
    g.link(a, b, vec![]);
    g.link(b, b, vec![]);
    g.link(b, c, vec![]);

    let tree = structure(&mut g, a, &empty_hierarchy()).unwrap();
    assert_eq!(tree_nodes(&tree), g.live_set());
}
