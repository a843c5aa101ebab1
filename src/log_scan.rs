//! Log sink inspection: flags sensitive keywords in literal log messages and
//! untrusted data reaching a logger call. Runs inline during the taint walk
//! so it sees the flow-sensitive state at each call site.

use crate::config::TaintConfig;
use crate::diag::{DiagEngine, RuleKind};
use crate::ir::{
    CallSig, Function, Lit, Op, Package, Span, UseIndex, ValueFlags, ValueId, display_name,
};
use crate::tables::LOG_METHODS;
use crate::taint::TaintState;
use petgraph::prelude::*;
use tracing::trace;

/// The slice of analysis context a sink check needs; borrowed from the
/// propagator for the duration of one call instruction.
pub struct CallView<'a> {
    pub func: &'a Function,
    pub pkg: &'a Package,
    pub uses: &'a UseIndex,
    pub cfg: &'a TaintConfig,
    pub diag: &'a DiagEngine,
}

pub fn check_call(
    view: &CallView<'_>,
    state: &TaintState,
    block: NodeIndex,
    span: Option<Span>,
    fallback: Option<Span>,
    sig: &CallSig,
    args: &[ValueId],
) {
    if !is_logger_call(view, sig) {
        return;
    }
    // `log(level, msg)` carries the level first; the shorthand methods do not.
    let msg_index = if sig.name == "log" {
        if !level_is_enabled(view, args.get(1).copied()) {
            return;
        }
        2
    } else {
        1
    };
    let Some(&msg) = args.get(msg_index) else {
        return;
    };
    trace!(
        target: "log_scan",
        "inspecting log call `{}.{}`",
        sig.owner.as_deref().unwrap_or(""),
        sig.name
    );

    let text = resolve_text(view, msg);
    if !text.is_empty() {
        let lowered = text.to_lowercase();
        for kw in &view.cfg.log.sensitive_keywords {
            if lowered.contains(kw.as_str()) {
                view
                    .diag
                    .emit(span, fallback, RuleKind::SensitiveLog, vec![kw.clone()]);
            }
        }
    }

    if state.active_in(msg, block) {
        let name = display_name(view.pkg, view.func, view.uses, msg);
        view
            .diag
            .emit(span, fallback, RuleKind::TaintedLog, vec![name]);
    }
}

/// A call is a log sink when the method name is one of the logger entry
/// points, the receiver type is the configured logger type or a declared
/// subtype of it, and the call returns nothing.
fn is_logger_call(view: &CallView<'_>, sig: &CallSig) -> bool {
    if !LOG_METHODS.contains(sig.name.as_str()) {
        return false;
    }
    let Some(owner) = sig.owner.as_deref() else {
        return false;
    };
    if !(sig.ret.is_empty() || sig.ret == "Unit") {
        return false;
    }
    let log = &view.cfg.log;
    (owner == log.logger_type && sig.package == log.logger_package)
        || view.pkg.inherits(owner, &log.logger_type)
}

/// The level must resolve to a load of a global or imported level constant
/// other than `OFF`; anything else means the call cannot be proven live and
/// is skipped.
fn level_is_enabled(view: &CallView<'_>, level: Option<ValueId>) -> bool {
    let Some(level) = level else { return false };
    let Some(Op::Load { location, .. }) = view.uses.def_op(view.func, level) else {
        return false;
    };
    let Some(value) = view.pkg.value(view.func, *location) else {
        return false;
    };
    value
        .flags
        .intersects(ValueFlags::GLOBAL | ValueFlags::IMPORTED)
        && value.name.as_deref() != Some("OFF")
}

/// Resolve the message to literal text where possible: string constants,
/// two-operand `+` concatenation over `std.core`, and copies in between.
/// Unresolvable parts contribute nothing.
fn resolve_text(view: &CallView<'_>, id: ValueId) -> String {
    resolve_inner(view, id, 0)
}

fn resolve_inner(view: &CallView<'_>, id: ValueId, depth: usize) -> String {
    if depth > 64 {
        return String::new();
    }
    match view.uses.def_op(view.func, id) {
        Some(Op::Const { lit: Lit::Str(s), .. }) => s.clone(),
        Some(Op::Call { sig, args, .. })
            if sig.name == "+" && sig.package == "std.core" && args.len() == 2 =>
        {
            let mut out = resolve_inner(view, args[0], depth + 1);
            out.push_str(&resolve_inner(view, args[1], depth + 1));
            out
        }
        Some(Op::Load { location, .. }) => resolve_inner(view, *location, depth + 1),
        Some(Op::Cast { source, .. }) | Some(Op::Box { source, .. }) => {
            resolve_inner(view, *source, depth + 1)
        }
        _ => String::new(),
    }
}

#[cfg(test)]
use crate::ir::{Dispatch, FuncAttrs, PackageBuilder};

#[cfg(test)]
fn logger_sig(method: &str) -> CallSig {
    CallSig::method(method, "Logger", "std.log", &["String"], "Unit")
}

#[test]
fn literal_keyword_is_flagged_once_per_keyword() {
    let mut pb = PackageBuilder::new("demo");
    let mut fb = pb.function("f", FuncAttrs::empty());
    let b = fb.block();
    let logger = fb.local("logger");
    let msg = fb.str_const(b, "token=abcd1234 password=hunter2");
    fb.call_void(b, logger_sig("info"), Dispatch::Member, &[logger, msg]);
    fb.exit(b);
    let fi = fb.finish();
    let pkg = pb.finish();
    let func = &pkg.functions[fi];

    let diag = DiagEngine::new();
    let cfg = TaintConfig::default();
    let uses = UseIndex::build(func);
    let view = CallView {
        func,
        pkg: &pkg,
        uses: &uses,
        cfg: &cfg,
        diag: &diag,
    };
    let state = TaintState::new();
    let (block, instr) = (func.entry, &func.graph[func.entry].instrs[1]);
    let Op::Call { sig, args, .. } = &instr.op else {
        unreachable!()
    };
    check_call(&view, &state, block, instr.span, None, sig, args);

    let out = diag.into_sorted();
    let kws: Vec<_> = out.iter().map(|f| f.args[0].as_str()).collect();
    assert!(kws.contains(&"token"));
    assert!(kws.contains(&"password"));
}

#[test]
fn concatenated_literals_are_scanned_as_one_string() {
    let mut pb = PackageBuilder::new("demo");
    let mut fb = pb.function("f", FuncAttrs::empty());
    let b = fb.block();
    let logger = fb.local("logger");
    let left = fb.str_const(b, "se");
    let right = fb.str_const(b, "cret=x");
    let msg = fb.call(
        b,
        CallSig::function("+", "std.core", &["String", "String"], "String"),
        Dispatch::Static,
        &[left, right],
    );
    fb.call_void(b, logger_sig("warn"), Dispatch::Member, &[logger, msg]);
    fb.exit(b);
    let fi = fb.finish();
    let pkg = pb.finish();
    let func = &pkg.functions[fi];

    let diag = DiagEngine::new();
    let cfg = TaintConfig::default();
    let uses = UseIndex::build(func);
    let view = CallView {
        func,
        pkg: &pkg,
        uses: &uses,
        cfg: &cfg,
        diag: &diag,
    };
    let instr = func.graph[func.entry]
        .instrs
        .iter()
        .find(|i| matches!(&i.op, Op::Call { sig, .. } if sig.name == "warn"))
        .unwrap();
    let Op::Call { sig, args, .. } = &instr.op else {
        unreachable!()
    };
    check_call(
        &view,
        &TaintState::new(),
        func.entry,
        instr.span,
        None,
        sig,
        args,
    );

    let out = diag.into_sorted();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].args[0], "secret");
}

#[test]
fn off_level_suppresses_the_generic_log_method() {
    let mut pb = PackageBuilder::new("demo");
    let off = pb.global("OFF");
    let mut fb = pb.function("f", FuncAttrs::empty());
    let b = fb.block();
    let logger = fb.local("logger");
    let level = fb.load(b, off);
    let msg = fb.str_const(b, "password=oops");
    fb.call_void(
        b,
        CallSig::method("log", "Logger", "std.log", &["LogLevel", "String"], "Unit"),
        Dispatch::Member,
        &[logger, level, msg],
    );
    fb.exit(b);
    let fi = fb.finish();
    let pkg = pb.finish();
    let func = &pkg.functions[fi];

    let diag = DiagEngine::new();
    let cfg = TaintConfig::default();
    let uses = UseIndex::build(func);
    let view = CallView {
        func,
        pkg: &pkg,
        uses: &uses,
        cfg: &cfg,
        diag: &diag,
    };
    let instr = func.graph[func.entry]
        .instrs
        .iter()
        .find(|i| matches!(&i.op, Op::Call { .. }))
        .unwrap();
    let Op::Call { sig, args, .. } = &instr.op else {
        unreachable!()
    };
    check_call(
        &view,
        &TaintState::new(),
        func.entry,
        instr.span,
        None,
        sig,
        args,
    );

    assert!(diag.is_empty());
}

#[test]
fn live_level_enables_the_generic_log_method() {
    let mut pb = PackageBuilder::new("demo");
    let info = pb.global("INFO");
    let mut fb = pb.function("f", FuncAttrs::empty());
    let b = fb.block();
    let logger = fb.local("logger");
    let level = fb.load(b, info);
    let msg = fb.str_const(b, "auth failure for root");
    fb.call_void(
        b,
        CallSig::method("log", "Logger", "std.log", &["LogLevel", "String"], "Unit"),
        Dispatch::Member,
        &[logger, level, msg],
    );
    fb.exit(b);
    let fi = fb.finish();
    let pkg = pb.finish();
    let func = &pkg.functions[fi];

    let diag = DiagEngine::new();
    let cfg = TaintConfig::default();
    let uses = UseIndex::build(func);
    let view = CallView {
        func,
        pkg: &pkg,
        uses: &uses,
        cfg: &cfg,
        diag: &diag,
    };
    let instr = func.graph[func.entry]
        .instrs
        .iter()
        .find(|i| matches!(&i.op, Op::Call { .. }))
        .unwrap();
    let Op::Call { sig, args, .. } = &instr.op else {
        unreachable!()
    };
    check_call(
        &view,
        &TaintState::new(),
        func.entry,
        instr.span,
        None,
        sig,
        args,
    );

    let out = diag.into_sorted();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].args[0], "auth");
}

#[test]
fn subtype_logger_is_recognised() {
    let mut pb = PackageBuilder::new("demo");
    pb.supertype("AuditLogger", "Logger");
    let mut fb = pb.function("f", FuncAttrs::empty());
    let b = fb.block();
    let logger = fb.local("audit");
    let msg = fb.str_const(b, "session=live");
    fb.call_void(
        b,
        CallSig::method("error", "AuditLogger", "demo", &["String"], "Unit"),
        Dispatch::Virtual,
        &[logger, msg],
    );
    fb.exit(b);
    let fi = fb.finish();
    let pkg = pb.finish();
    let func = &pkg.functions[fi];

    let diag = DiagEngine::new();
    let cfg = TaintConfig::default();
    let uses = UseIndex::build(func);
    let view = CallView {
        func,
        pkg: &pkg,
        uses: &uses,
        cfg: &cfg,
        diag: &diag,
    };
    let instr = func.graph[func.entry]
        .instrs
        .iter()
        .find(|i| matches!(&i.op, Op::Call { .. }))
        .unwrap();
    let Op::Call { sig, args, .. } = &instr.op else {
        unreachable!()
    };
    check_call(
        &view,
        &TaintState::new(),
        func.entry,
        instr.span,
        None,
        sig,
        args,
    );

    let out = diag.into_sorted();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].kind, RuleKind::SensitiveLog);
}
