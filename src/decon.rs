use crate::ir::{Function, InstrLoc, Op, UseIndex, ValueId};
use petgraph::prelude::*;
use petgraph::visit::{VisitMap, Visitable};
use std::collections::HashSet;

/// Strategy deciding, for a tainted value, in which blocks it must be
/// treated as cleared. Swappable so stricter policies can replace the guard
/// heuristic without touching the propagator.
pub trait DeconPolicy: Sync {
    fn cleared_blocks(
        &self,
        func: &Function,
        uses: &UseIndex,
        root: ValueId,
    ) -> HashSet<NodeIndex>;
}

/// The fail-fast-guard heuristic: `if cond(v) { return }` clears `v` in all
/// code that only runs when the guard did not fire. This correlates control
/// flow with the value; it does not prove the condition validated the
/// value's content.
pub struct GuardExitPolicy;

impl DeconPolicy for GuardExitPolicy {
    fn cleared_blocks(
        &self,
        func: &Function,
        uses: &UseIndex,
        root: ValueId,
    ) -> HashSet<NodeIndex> {
        let mut cleared = HashSet::new();
        // Both guards are scoped to this one invocation and never reset, which
        // bounds the walk by blocks × instructions even on cyclic CFGs.
        let mut visited_instr: HashSet<InstrLoc> = HashSet::new();
        let mut roots = vec![root];

        while let Some(v) = roots.pop() {
            for &loc in uses.users(v) {
                if !visited_instr.insert(loc) {
                    continue;
                }
                match &func.instr(loc).op {
                    Op::Branch {
                        condition,
                        true_block,
                        false_block,
                    } if *condition == v => {
                        let t_exits = func.graph[*true_block].exits();
                        let f_exits = func.graph[*false_block].exits();
                        if t_exits || f_exits {
                            let mut seen = func.graph.visit_map();
                            if t_exits {
                                collect_reachable(func, *false_block, &mut seen, &mut cleared);
                            }
                            if f_exits {
                                collect_reachable(func, *true_block, &mut seen, &mut cleared);
                            }
                        }
                    }
                    // A value re-derived from the root (cast, load, field, ...)
                    // inherits the guard semantics: its users are walked too.
                    op => {
                        if let Some(r) = op.result() {
                            roots.push(r);
                        }
                    }
                }
            }
        }
        cleared
    }
}

fn collect_reachable(
    func: &Function,
    start: NodeIndex,
    seen: &mut <crate::ir::Cfg as Visitable>::Map,
    out: &mut HashSet<NodeIndex>,
) {
    let mut stack = vec![start];
    while let Some(b) = stack.pop() {
        if !seen.visit(b) {
            continue;
        }
        out.insert(b);
        for succ in func.graph[b].successors() {
            if !seen.is_visited(&succ) {
                stack.push(succ);
            }
        }
    }
}

#[cfg(test)]
use crate::ir::{CallSig, Dispatch, FuncAttrs, PackageBuilder};

#[test]
fn guard_then_exit_clears_the_other_branch() {
    // b0: v := source(); branch v -> b1 (exit) | b2; b2 -> b3
    let mut pb = PackageBuilder::new("demo");
    let mut fb = pb.function("f", FuncAttrs::empty());
    let b0 = fb.block();
    let b1 = fb.block();
    let b2 = fb.block();
    let b3 = fb.block();
    let v = fb.call(
        b0,
        CallSig::function("source", "demo", &[], "String"),
        Dispatch::Static,
        &[],
    );
    fb.branch(b0, v, b1, b2);
    fb.exit(b1);
    fb.jump(b2, b3);
    fb.exit(b3);
    let fi = fb.finish();
    let pkg = pb.finish();
    let func = &pkg.functions[fi];
    let uses = UseIndex::build(func);

    let cleared = GuardExitPolicy.cleared_blocks(func, &uses, v);
    assert!(cleared.contains(&b2));
    assert!(cleared.contains(&b3), "everything reachable from the clean branch");
    assert!(!cleared.contains(&b1));
}

#[test]
fn derived_values_inherit_guard_semantics() {
    // y := cast(v); branch y -> exit | clean
    let mut pb = PackageBuilder::new("demo");
    let mut fb = pb.function("f", FuncAttrs::empty());
    let b0 = fb.block();
    let b1 = fb.block();
    let b2 = fb.block();
    let v = fb.local("v");
    let y = fb.cast(b0, v);
    fb.branch(b0, y, b1, b2);
    fb.exit(b1);
    fb.exit(b2);
    let fi = fb.finish();
    let pkg = pb.finish();
    let func = &pkg.functions[fi];
    let uses = UseIndex::build(func);

    let cleared = GuardExitPolicy.cleared_blocks(func, &uses, v);
    assert!(cleared.contains(&b2));
}

#[test]
fn resolver_terminates_on_cyclic_cfgs() {
    // b1 and b2 form a loop; the guard's clean branch leads into it.
    let mut pb = PackageBuilder::new("demo");
    let mut fb = pb.function("f", FuncAttrs::empty());
    let b0 = fb.block();
    let exit_b = fb.block();
    let b1 = fb.block();
    let b2 = fb.block();
    let v = fb.local("v");
    fb.branch(b0, v, exit_b, b1);
    fb.exit(exit_b);
    fb.jump(b1, b2);
    fb.jump(b2, b1);
    let fi = fb.finish();
    let pkg = pb.finish();
    let func = &pkg.functions[fi];
    let uses = UseIndex::build(func);

    let cleared = GuardExitPolicy.cleared_blocks(func, &uses, v);
    assert!(cleared.contains(&b1));
    assert!(cleared.contains(&b2));
}

#[test]
fn no_exit_branch_means_nothing_cleared() {
    let mut pb = PackageBuilder::new("demo");
    let mut fb = pb.function("f", FuncAttrs::empty());
    let b0 = fb.block();
    let b1 = fb.block();
    let b2 = fb.block();
    let b3 = fb.block();
    let v = fb.local("v");
    fb.branch(b0, v, b1, b2);
    fb.jump(b1, b3);
    fb.jump(b2, b3);
    fb.exit(b3);
    let fi = fb.finish();
    let pkg = pb.finish();
    let uses = UseIndex::build(&pkg.functions[fi]);

    // Neither direct successor exits; b3 does, but with an intervening join.
    assert!(
        GuardExitPolicy
            .cleared_blocks(&pkg.functions[fi], &uses, v)
            .is_empty()
    );
}
