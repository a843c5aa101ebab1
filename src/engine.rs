//! Package-level driver: seeds taint from global initializers, fans the
//! per-function analysis out over a thread pool and collects the findings.

use crate::config::TaintConfig;
use crate::decon::{DeconPolicy, GuardExitPolicy};
use crate::diag::{DiagEngine, Finding};
use crate::ir::{FuncAttrs, Package, ValueId};
use crate::tables::RuleTables;
use crate::taint::propagate;
use rayon::prelude::*;
use std::collections::HashSet;
use tracing::debug;

const SKIPPED: FuncAttrs = FuncAttrs::IMPORTED
    .union(FuncAttrs::GENERIC_INSTANTIATED)
    .union(FuncAttrs::SYNTHESIZED);

/// Analyse every function body in `pkg` and return the deduplicated,
/// position-sorted findings. Runs are deterministic: per-function analysis
/// order does not influence the result.
pub fn run_rule(pkg: &Package, tables: &RuleTables, cfg: &TaintConfig) -> Vec<Finding> {
    let policy = GuardExitPolicy;
    let diag = DiagEngine::new();

    let seed = if cfg.analysis.seed_globals {
        perilous_globals(pkg, tables, cfg, &policy, &diag)
    } else {
        HashSet::new()
    };
    if !seed.is_empty() {
        debug!(target: "engine", "{} global(s) seeded as tainted in `{}`", seed.len(), pkg.name);
    }

    let analysed = pkg
        .functions
        .par_iter()
        .filter(|f| !f.attrs.intersects(SKIPPED))
        .map(|f| {
            propagate(f, pkg, tables, cfg, &policy, &seed, &diag);
        })
        .count();
    debug!(target: "engine", "analysed {analysed} function(s) in `{}`", pkg.name);

    diag.into_sorted()
}

/// Walk each global initializer with an empty seed; a global whose slot is
/// tainted after its own initializer ran stays tainted for every function in
/// the package. Findings inside initializers are reported as usual.
fn perilous_globals(
    pkg: &Package,
    tables: &RuleTables,
    cfg: &TaintConfig,
    policy: &dyn DeconPolicy,
    diag: &DiagEngine,
) -> HashSet<ValueId> {
    let empty = HashSet::new();
    let mut seed = HashSet::new();
    for global in &pkg.globals {
        let Some(init) = global.init else { continue };
        let state = propagate(&pkg.functions[init], pkg, tables, cfg, policy, &empty, diag);
        if state.contains(global.value.id) {
            debug!(
                target: "engine",
                "global `{}` is initialized from an untrusted source",
                global.value.name.as_deref().unwrap_or("?")
            );
            seed.insert(global.value.id);
        }
    }
    seed
}

#[cfg(test)]
use crate::ir::{CallSig, Dispatch, PackageBuilder};

#[test]
fn imported_and_synthesized_functions_are_skipped() {
    let mut pb = PackageBuilder::new("demo");
    for attrs in [FuncAttrs::IMPORTED, FuncAttrs::SYNTHESIZED] {
        let mut fb = pb.function("f", attrs);
        let b = fb.block();
        let console = fb.local("console");
        let t = fb.call(
            b,
            CallSig::method("readln", "ConsoleReader", "std.console", &["ConsoleReader"], "Option"),
            Dispatch::Member,
            &[console],
        );
        fb.call_void(
            b,
            CallSig::function("fire", "demo", &["String"], "Unit"),
            Dispatch::Static,
            &[t],
        );
        fb.exit(b);
        fb.finish();
    }
    let pkg = pb.finish();

    let findings = run_rule(&pkg, RuleTables::builtin(), &TaintConfig::default());
    assert!(findings.is_empty());
}

#[test]
fn tainted_global_seeds_every_function() {
    let mut pb = PackageBuilder::new("demo");
    let host = pb.global("remoteHost");

    let mut init = pb.function("remoteHost.init", FuncAttrs::SYNTHESIZED);
    let b = init.block();
    let name = init.str_const(b, "HOST");
    let env = init.call(
        b,
        CallSig::function("getEnv", "std.env", &["String"], "Option"),
        Dispatch::Static,
        &[name],
    );
    init.store(b, env, host);
    init.exit(b);
    let init_idx = init.finish();
    pb.set_global_init(host, init_idx);

    let mut fb = pb.function("use_host", FuncAttrs::empty());
    let b = fb.block();
    let v = fb.load(b, host);
    fb.call_void(
        b,
        CallSig::function("connect", "demo", &["String"], "Unit"),
        Dispatch::Static,
        &[v],
    );
    fb.exit(b);
    fb.finish();
    let pkg = pb.finish();

    let findings = run_rule(&pkg, RuleTables::builtin(), &TaintConfig::default());
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].args[1], "connect");
}
