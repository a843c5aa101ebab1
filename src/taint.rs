use crate::config::TaintConfig;
use crate::decon::DeconPolicy;
use crate::diag::{DiagEngine, RuleKind};
use crate::ir::{
    CallSig, Dispatch, Function, Op, Package, Span, UseIndex, ValueFlags, ValueId, display_name,
};
use crate::log_scan;
use crate::tables::{ArgPos, PropKind, RuleTables};
use petgraph::prelude::*;
use petgraph::visit::{VisitMap, Visitable};
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Per-function taint state. Created empty (plus the global seed) at
/// function entry, mutated only during the single forward walk, and dropped
/// with it; never shared across functions. Nested closures are walked on the
/// state of their enclosing function.
#[derive(Debug, Default)]
pub struct TaintState {
    tainted: HashSet<ValueId>,
    /// Per tainted identifier: blocks in which it must be treated as clean.
    /// Flow-sensitive only; global membership in `tainted` is unaffected.
    cleared_in: HashMap<ValueId, HashSet<NodeIndex>>,
}

impl TaintState {
    pub fn new() -> Self {
        TaintState::default()
    }

    pub fn with_seed(seed: &HashSet<ValueId>) -> Self {
        TaintState {
            tainted: seed.clone(),
            cleared_in: HashMap::new(),
        }
    }

    pub fn mark(&mut self, id: ValueId, cleared: HashSet<NodeIndex>) {
        self.tainted.insert(id);
        self.cleared_in.insert(id, cleared);
    }

    pub fn unmark(&mut self, id: ValueId) {
        self.tainted.remove(&id);
        self.cleared_in.remove(&id);
    }

    pub fn contains(&self, id: ValueId) -> bool {
        self.tainted.contains(&id)
    }

    /// Tainted and not decontaminated in `block`.
    pub fn active_in(&self, id: ValueId, block: NodeIndex) -> bool {
        self.contains(id)
            && !self
                .cleared_in
                .get(&id)
                .is_some_and(|blocks| blocks.contains(&block))
    }

    fn cleared_of(&self, id: ValueId) -> HashSet<NodeIndex> {
        self.cleared_in.get(&id).cloned().unwrap_or_default()
    }

    /// Sorted for deterministic comparison.
    pub fn tainted_ids(&self) -> Vec<ValueId> {
        let mut v: Vec<_> = self.tainted.iter().copied().collect();
        v.sort();
        v
    }
}

struct Propagator<'a> {
    func: &'a Function,
    pkg: &'a Package,
    tables: &'a RuleTables,
    cfg: &'a TaintConfig,
    policy: &'a dyn DeconPolicy,
    uses: UseIndex,
    diag: &'a DiagEngine,
}

/// Walk one function body and return which identifiers remain tainted.
/// Findings are emitted through `diag` as the walk encounters them.
///
/// This is a single forward pass with a visited-block guard, not a fixpoint:
/// taint introduced in a loop body reaches textually later code, but an
/// already-visited predecessor is not re-examined with updated taint.
pub fn propagate(
    func: &Function,
    pkg: &Package,
    tables: &RuleTables,
    cfg: &TaintConfig,
    policy: &dyn DeconPolicy,
    seed: &HashSet<ValueId>,
    diag: &DiagEngine,
) -> TaintState {
    trace!(target: "taint", "analysing {}::{}", func.package, func.name);
    let p = Propagator {
        func,
        pkg,
        tables,
        cfg,
        policy,
        uses: UseIndex::build(func),
        diag,
    };
    let mut state = TaintState::with_seed(seed);

    let mut visited = func.graph.visit_map();
    let mut work = vec![func.entry];
    while let Some(b) = work.pop() {
        if !visited.visit(b) {
            continue;
        }
        let fallback = func.graph[b].terminator_span();
        for instr in &func.graph[b].instrs {
            match &instr.op {
                Op::Call {
                    sig,
                    dispatch,
                    args,
                    result,
                } => {
                    log_scan::check_call(&p.view(), &state, b, instr.span, fallback, sig, args);
                    p.handle_call(
                        &mut state, b, instr.span, fallback, sig, *dispatch, args, *result,
                    );
                }
                Op::Load { location, result } => p.identity(&mut state, *location, *result),
                Op::Cast { source, result } | Op::Box { source, result } => {
                    p.identity(&mut state, *source, *result)
                }
                Op::Store { value, location } => {
                    p.handle_store(&mut state, b, instr.span, fallback, *value, *location)
                }
                Op::Tuple { elements, result } => {
                    if elements.iter().any(|e| state.contains(*e)) {
                        p.mark_with_decon(&mut state, *result);
                    }
                }
                Op::Field { base, result, .. } => p.identity(&mut state, *base, *result),
                // Closure bodies share the enclosing function's taint state and
                // visited set.
                Op::Lambda { entry, .. } => work.push(*entry),
                Op::Branch {
                    true_block,
                    false_block,
                    ..
                } => {
                    work.push(*false_block);
                    work.push(*true_block);
                }
                Op::Jump { target } => work.push(*target),
                Op::Const { .. } | Op::Exit => {}
            }
        }
    }
    state
}

impl<'a> Propagator<'a> {
    fn view(&self) -> log_scan::CallView<'_> {
        log_scan::CallView {
            func: self.func,
            pkg: self.pkg,
            uses: &self.uses,
            cfg: self.cfg,
            diag: self.diag,
        }
    }

    fn mark_with_decon(&self, state: &mut TaintState, id: ValueId) {
        let cleared = self.policy.cleared_blocks(self.func, &self.uses, id);
        state.mark(id, cleared);
    }

    fn is_ret_slot(&self, id: ValueId) -> bool {
        self
            .pkg
            .value(self.func, id)
            .is_some_and(|v| v.flags.contains(ValueFlags::RET_SLOT))
    }

    /// Taint the locations written by store users of a freshly tainted value,
    /// flagging stores into the return slot.
    fn taint_store_users(&self, state: &mut TaintState, id: ValueId) {
        for &loc in self.uses.users(id) {
            let instr = self.func.instr(loc);
            if let Op::Store { value, location } = instr.op {
                if value != id {
                    continue;
                }
                let fallback = self.func.graph[loc.block].terminator_span();
                if self.is_ret_slot(location) {
                    self
                        .diag
                        .emit(instr.span, fallback, RuleKind::UntrustedReturn, Vec::new());
                } else {
                    self.mark_with_decon(state, location);
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_call(
        &self,
        state: &mut TaintState,
        b: NodeIndex,
        span: Option<Span>,
        fallback: Option<Span>,
        sig: &CallSig,
        dispatch: Dispatch,
        args: &[ValueId],
        result: Option<ValueId>,
    ) {
        // 1. Source rules: the designated target enters the program tainted.
        if let Some(rule) = self.tables.source_match(sig) {
            let targets: Vec<ValueId> = match rule.target {
                ArgPos::Return => result.into_iter().collect(),
                ArgPos::Index(i) => args.get(i as usize - 1).copied().into_iter().collect(),
                ArgPos::All => args.to_vec(),
            };
            if !targets.is_empty() {
                trace!(target: "taint", "source match on `{}`", sig.name);
                for t in targets {
                    self.mark_with_decon(state, t);
                    self.taint_store_users(state, t);
                }
                return;
            }
        }

        // 2. Propagation rules, first signature match with a tainted source
        //    position (clearing in the current block counts as clean).
        for rule in self.tables.propagation_matches(sig) {
            let src_hit = match rule.src {
                ArgPos::All => args.iter().any(|a| state.active_in(*a, b)),
                ArgPos::Index(i) => args
                    .get(i as usize - 1)
                    .is_some_and(|a| state.active_in(*a, b)),
                ArgPos::Return => false,
            };
            if !src_hit {
                continue;
            }
            if matches!(rule.kind, PropKind::NotTainted | PropKind::Uncertain) {
                trace!(
                    target: "taint",
                    "`{}` consumes taint without certainly spreading it",
                    sig.name
                );
                return;
            }
            let dests: Vec<ValueId> = match rule.dst {
                ArgPos::Return => result.into_iter().collect(),
                ArgPos::Index(i) => args.get(i as usize - 1).copied().into_iter().collect(),
                ArgPos::All => args.to_vec(),
            };
            for d in dests {
                self.mark_with_decon(state, d);
                self.taint_store_users(state, d);
            }
            return;
        }

        // 3. Unmodelled callee receiving tainted data: the argument escapes the
        //    trust boundary.
        if self.tables.has_propagation_for(&sig.name) {
            return;
        }
        for (i, arg) in args.iter().enumerate() {
            if !state.active_in(*arg, b) {
                continue;
            }
            // Receiver in argument 0 shifts the user-visible numbering.
            let index = if dispatch.has_receiver() { i } else { i + 1 };
            self.diag.emit(
                span,
                fallback,
                RuleKind::UntrustedArg,
                vec![index.to_string(), sig.name.clone()],
            );
        }
    }

    fn handle_store(
        &self,
        state: &mut TaintState,
        b: NodeIndex,
        span: Option<Span>,
        fallback: Option<Span>,
        value: ValueId,
        location: ValueId,
    ) {
        if state.active_in(value, b) {
            if self.is_ret_slot(location) {
                self
                    .diag
                    .emit(span, fallback, RuleKind::UntrustedReturn, Vec::new());
            } else {
                self.mark_with_decon(state, location);
            }
        } else if !state.contains(value) && state.contains(location) {
            // Overwriting with clean data clears the destination.
            trace!(
                target: "taint",
                "store of clean data clears {}",
                display_name(self.pkg, self.func, &self.uses, location)
            );
            state.unmark(location);
        }
    }

    /// Load / cast / box: the result is the same data under a new identifier,
    /// so it inherits both the taint and the decontamination mapping.
    fn identity(&self, state: &mut TaintState, source: ValueId, result: ValueId) {
        if state.contains(source) {
            let cleared = state.cleared_of(source);
            state.mark(result, cleared);
        }
    }
}

#[cfg(test)]
use crate::decon::GuardExitPolicy;
#[cfg(test)]
use crate::ir::{FuncAttrs, PackageBuilder};

#[test]
fn identity_propagation_carries_the_cleared_map() {
    let mut pb = PackageBuilder::new("demo");
    let mut fb = pb.function("f", FuncAttrs::empty());
    let b = fb.block();
    let x = fb.local("x");
    let t = fb.load(b, x);
    fb.exit(b);
    let fi = fb.finish();
    let pkg = pb.finish();
    let func = &pkg.functions[fi];

    let diag = DiagEngine::new();
    let cfg = TaintConfig::default();
    let tables = RuleTables::from_rules(&[], &[]);
    let mut seed = HashSet::new();
    seed.insert(x);
    let state = propagate(func, &pkg, &tables, &cfg, &GuardExitPolicy, &seed, &diag);

    assert!(state.contains(t));
    assert_eq!(state.tainted_ids(), vec![x, t]);
}

#[test]
fn clean_store_clears_the_destination() {
    let mut pb = PackageBuilder::new("demo");
    let mut fb = pb.function("f", FuncAttrs::empty());
    let b = fb.block();
    let x = fb.local("x");
    let clean = fb.str_const(b, "ok");
    fb.store(b, clean, x);
    fb.exit(b);
    let fi = fb.finish();
    let pkg = pb.finish();
    let func = &pkg.functions[fi];

    let diag = DiagEngine::new();
    let cfg = TaintConfig::default();
    let tables = RuleTables::from_rules(&[], &[]);
    let mut seed = HashSet::new();
    seed.insert(x);
    let state = propagate(func, &pkg, &tables, &cfg, &GuardExitPolicy, &seed, &diag);

    assert!(!state.contains(x));
}
