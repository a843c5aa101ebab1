//! End-to-end runs over hand-built control-flow graphs: source to sink
//! reporting, guard-based clearing, loop termination and determinism.

use styx::config::TaintConfig;
use styx::diag::{Finding, RuleKind};
use styx::engine::run_rule;
use styx::ir::{CallSig, Dispatch, FuncAttrs, FunctionBuilder, NodeIndex, PackageBuilder, ValueId};
use styx::tables::RuleTables;

fn readln_sig() -> CallSig {
    CallSig::method("readln", "ConsoleReader", "std.console", &["ConsoleReader"], "Option")
}

fn sink_sig(name: &str) -> CallSig {
    CallSig::function(name, "demo", &["String"], "Unit")
}

/// `let t = reader.readln()` in `block`, returning the tainted result.
fn read_source(fb: &mut FunctionBuilder<'_>, block: NodeIndex) -> ValueId {
    let reader = fb.local("reader");
    fb.call(block, readln_sig(), Dispatch::Member, &[reader])
}

fn run(pkg: &styx::ir::Package) -> Vec<Finding> {
    run_rule(pkg, RuleTables::builtin(), &TaintConfig::default())
}

#[test]
fn source_reaching_an_unmodelled_call_is_reported_once() {
    let mut pb = PackageBuilder::new("demo");
    let mut fb = pb.function("handler", FuncAttrs::empty());
    let b = fb.block();
    let t = read_source(&mut fb, b);
    fb.call_void(b, sink_sig("execute"), Dispatch::Static, &[t]);
    fb.exit(b);
    fb.finish();
    let pkg = pb.finish();

    let findings = run(&pkg);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].kind, RuleKind::UntrustedArg);
    assert_eq!(findings[0].args, vec!["1", "execute"]);
}

#[test]
fn guard_with_early_exit_clears_the_surviving_branch() {
    let mut pb = PackageBuilder::new("demo");
    let mut fb = pb.function("guarded", FuncAttrs::empty());
    let b0 = fb.block();
    let bail = fb.block();
    let rest = fb.block();

    let t = read_source(&mut fb, b0);
    let ok = fb.call(
        b0,
        CallSig::method("isEmpty", "String", "std.core", &["String"], "Bool"),
        Dispatch::Member,
        &[t],
    );
    fb.branch(b0, ok, bail, rest);
    fb.exit(bail);
    fb.call_void(rest, sink_sig("execute"), Dispatch::Static, &[t]);
    fb.exit(rest);
    fb.finish();
    let pkg = pb.finish();

    assert!(run(&pkg).is_empty());
}

#[test]
fn branch_without_an_exit_does_not_clear_anything() {
    let mut pb = PackageBuilder::new("demo");
    let mut fb = pb.function("unguarded", FuncAttrs::empty());
    let b0 = fb.block();
    let left = fb.block();
    let right = fb.block();
    let join = fb.block();

    let t = read_source(&mut fb, b0);
    let ok = fb.call(
        b0,
        CallSig::method("isEmpty", "String", "std.core", &["String"], "Bool"),
        Dispatch::Member,
        &[t],
    );
    fb.branch(b0, ok, left, right);
    fb.jump(left, join);
    fb.jump(right, join);
    fb.call_void(join, sink_sig("execute"), Dispatch::Static, &[t]);
    fb.exit(join);
    fb.finish();
    let pkg = pb.finish();

    let findings = run(&pkg);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].kind, RuleKind::UntrustedArg);
}

#[test]
fn analysis_terminates_on_a_cyclic_cfg() {
    let mut pb = PackageBuilder::new("demo");
    let mut fb = pb.function("looped", FuncAttrs::empty());
    let b0 = fb.block();
    let body = fb.block();
    let done = fb.block();

    let t = read_source(&mut fb, b0);
    fb.jump(b0, body);
    fb.call_void(body, sink_sig("send"), Dispatch::Static, &[t]);
    let more = fb.local("more");
    fb.branch(body, more, body, done);
    fb.exit(done);
    fb.finish();
    let pkg = pb.finish();

    // One visit per block: the sink inside the loop reports exactly once.
    let findings = run(&pkg);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].args[1], "send");
}

#[test]
fn taint_flows_through_a_modelled_string_concat() {
    let mut pb = PackageBuilder::new("demo");
    let mut fb = pb.function("builds_query", FuncAttrs::empty());
    let b = fb.block();
    let t = read_source(&mut fb, b);
    let prefix = fb.str_const(b, "name=");
    let query = fb.call(
        b,
        CallSig::method("concat", "String", "std.core", &["String", "String"], "String"),
        Dispatch::Member,
        &[prefix, t],
    );
    fb.call_void(b, sink_sig("runQuery"), Dispatch::Static, &[query]);
    fb.exit(b);
    fb.finish();
    let pkg = pb.finish();

    let findings = run(&pkg);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].args, vec!["1", "runQuery"]);
}

#[test]
fn benign_predicate_consumes_taint_without_a_report() {
    let mut pb = PackageBuilder::new("demo");
    let mut fb = pb.function("compares", FuncAttrs::empty());
    let b = fb.block();
    let t = read_source(&mut fb, b);
    let expected = fb.str_const(b, "admin");
    let eq = fb.call(
        b,
        CallSig::method("==", "String", "std.core", &["String", "String"], "Bool"),
        Dispatch::Member,
        &[t, expected],
    );
    fb.call_void(b, sink_sig("record"), Dispatch::Static, &[eq]);
    fb.exit(b);
    fb.finish();
    let pkg = pb.finish();

    assert!(run(&pkg).is_empty());
}

#[test]
fn concatenated_log_literal_is_scanned_for_keywords() {
    let mut pb = PackageBuilder::new("demo");
    let mut fb = pb.function("logs", FuncAttrs::empty());
    let b = fb.block();
    let logger = fb.local("logger");
    let left = fb.str_const(b, "token=");
    let right = fb.str_const(b, "abcd1234");
    let msg = fb.call(
        b,
        CallSig::function("+", "std.core", &["String", "String"], "String"),
        Dispatch::Static,
        &[left, right],
    );
    fb.call_void(
        b,
        CallSig::method("info", "Logger", "std.log", &["String"], "Unit"),
        Dispatch::Member,
        &[logger, msg],
    );
    fb.exit(b);
    fb.finish();
    let pkg = pb.finish();

    let findings = run(&pkg);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].kind, RuleKind::SensitiveLog);
    assert_eq!(findings[0].args, vec!["token"]);
}

#[test]
fn tainted_value_reaching_a_logger_is_reported() {
    let mut pb = PackageBuilder::new("demo");
    let mut fb = pb.function("logs_input", FuncAttrs::empty());
    let b = fb.block();
    let logger = fb.local("logger");
    let t = read_source(&mut fb, b);
    fb.call_void(
        b,
        CallSig::method("info", "Logger", "std.log", &["String"], "Unit"),
        Dispatch::Member,
        &[logger, t],
    );
    fb.exit(b);
    fb.finish();
    let pkg = pb.finish();

    let findings = run(&pkg);
    assert!(
        findings
            .iter()
            .any(|f| f.kind == RuleKind::TaintedLog),
        "expected a log-untrusted-data finding, got {findings:?}"
    );
}

#[test]
fn tainted_store_into_the_return_slot_is_reported() {
    let mut pb = PackageBuilder::new("demo");
    let mut fb = pb.function("returns_input", FuncAttrs::empty());
    let ret = fb.ret_slot();
    let b = fb.block();
    let t = read_source(&mut fb, b);
    fb.store(b, t, ret);
    fb.exit(b);
    fb.finish();
    let pkg = pb.finish();

    let findings = run(&pkg);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].kind, RuleKind::UntrustedReturn);
}

#[test]
fn closure_body_shares_the_enclosing_taint_state() {
    let mut pb = PackageBuilder::new("demo");
    let mut fb = pb.function("handler", FuncAttrs::empty());
    let b0 = fb.block();
    let body = fb.block();

    // The captured value is tainted in the enclosing function and only
    // consumed inside the closure body.
    let t = read_source(&mut fb, b0);
    fb.call_void(body, sink_sig("fire"), Dispatch::Static, &[t]);
    fb.exit(body);
    fb.lambda(b0, "deferred", body);
    fb.exit(b0);
    fb.finish();
    let pkg = pb.finish();

    let findings = run(&pkg);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].kind, RuleKind::UntrustedArg);
    assert_eq!(findings[0].args, vec!["1", "fire"]);
}

#[test]
fn tuple_with_a_tainted_element_is_tainted() {
    let mut pb = PackageBuilder::new("demo");
    let mut fb = pb.function("handler", FuncAttrs::empty());
    let b = fb.block();
    let t = read_source(&mut fb, b);
    let clean = fb.str_const(b, "label");
    let pair = fb.tuple(b, &[clean, t]);
    fb.call_void(b, sink_sig("persist"), Dispatch::Static, &[pair]);
    fb.exit(b);
    fb.finish();
    let pkg = pb.finish();

    let findings = run(&pkg);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].kind, RuleKind::UntrustedArg);
    assert_eq!(findings[0].args, vec!["1", "persist"]);
}

#[test]
fn field_projection_carries_taint_from_its_base() {
    let mut pb = PackageBuilder::new("demo");
    let mut fb = pb.function("handler", FuncAttrs::empty());
    let b = fb.block();
    let t = read_source(&mut fb, b);
    let part = fb.field(b, t, 0);
    fb.call_void(b, sink_sig("execute"), Dispatch::Static, &[part]);
    fb.exit(b);
    fb.finish();
    let pkg = pb.finish();

    let findings = run(&pkg);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].kind, RuleKind::UntrustedArg);
    assert_eq!(findings[0].args, vec!["1", "execute"]);
}

#[test]
fn repeated_runs_are_identical() {
    let mut pb = PackageBuilder::new("demo");
    let mut fb = pb.function("handler", FuncAttrs::empty());
    let b = fb.block();
    let t = read_source(&mut fb, b);
    fb.call_void(b, sink_sig("execute"), Dispatch::Static, &[t]);
    fb.call_void(b, sink_sig("persist"), Dispatch::Static, &[t]);
    fb.exit(b);
    fb.finish();
    let pkg = pb.finish();

    let first = run(&pkg);
    let second = run(&pkg);
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
}
