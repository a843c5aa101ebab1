use crate::ir::Span;
use dashmap::DashSet;
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RuleKind {
    /// Untrusted data handed to an unmodelled callee.
    UntrustedArg,
    /// Untrusted data stored into the function's return slot.
    UntrustedReturn,
    /// A configured sensitive keyword appears in a logged literal.
    SensitiveLog,
    /// A tainted value is written to a log.
    TaintedLog,
}

impl RuleKind {
    pub const fn code(self) -> &'static str {
        match self {
            RuleKind::UntrustedArg => "taint-untrusted-arg",
            RuleKind::UntrustedReturn => "taint-untrusted-return",
            RuleKind::SensitiveLog => "log-sensitive-keyword",
            RuleKind::TaintedLog => "log-untrusted-data",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One diagnostic: position, rule kind, ordered message arguments. Message
/// templating lives here; severity classification, ignore-list filtering and
/// serialization are the host collector's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub span: Span,
    pub kind: RuleKind,
    pub args: Vec<String>,
}

impl Finding {
    fn arg(&self, i: usize) -> &str {
        self.args.get(i).map(String::as_str).unwrap_or("?")
    }

    pub fn message(&self) -> String {
        match self.kind {
            RuleKind::UntrustedArg => format!(
                "argument {} of call to `{}` carries untrusted data across a trust boundary",
                self.arg(0),
                self.arg(1),
            ),
            RuleKind::UntrustedReturn => {
                "untrusted data is returned without validation".to_string()
            }
            RuleKind::SensitiveLog => format!(
                "sensitive keyword `{}` is written to a log",
                self.arg(0)
            ),
            RuleKind::TaintedLog => format!(
                "untrusted data `{}` is written to a log",
                self.arg(0)
            ),
        }
    }
}

/// Append-only finding collector shared by all function-analysis runs.
/// Serializes its own writes; inserts at most once per identical
/// (location, message) pair.
#[derive(Debug, Default)]
pub struct DiagEngine {
    seen: DashSet<(Span, &'static str, String)>,
    findings: Mutex<Vec<Finding>>,
}

impl DiagEngine {
    pub fn new() -> Self {
        DiagEngine::default()
    }

    /// Record a finding. `span` is the instruction's own position; `fallback`
    /// is the owning block's terminator position. With neither available the
    /// finding is suppressed rather than emitted with a meaningless location.
    pub fn emit(
        &self,
        span: Option<Span>,
        fallback: Option<Span>,
        kind: RuleKind,
        args: Vec<String>,
    ) {
        let Some(span) = span.or(fallback) else {
            tracing::trace!(target: "diag", "finding {kind} suppressed: no source position");
            return;
        };
        let key = (span, kind.code(), args.join("\u{1f}"));
        if !self.seen.insert(key) {
            return;
        }
        self.findings.lock().unwrap().push(Finding { span, kind, args });
    }

    pub fn is_empty(&self) -> bool {
        self.findings.lock().unwrap().is_empty()
    }

    /// Findings ordered by (position, rule code, arguments) so output is
    /// deterministic regardless of analysis thread interleaving.
    pub fn into_sorted(self) -> Vec<Finding> {
        let mut v = self.findings.into_inner().unwrap();
        v.sort_by(|a, b| {
            (a.span, a.kind.code(), &a.args).cmp(&(b.span, b.kind.code(), &b.args))
        });
        v
    }
}

#[test]
fn duplicate_findings_collapse() {
    let diag = DiagEngine::new();
    let span = Span::line(3);
    diag.emit(Some(span), None, RuleKind::SensitiveLog, vec!["token".into()]);
    diag.emit(Some(span), None, RuleKind::SensitiveLog, vec!["token".into()]);
    diag.emit(Some(span), None, RuleKind::SensitiveLog, vec!["password".into()]);
    assert_eq!(diag.into_sorted().len(), 2);
}

#[test]
fn missing_position_falls_back_then_suppresses() {
    let diag = DiagEngine::new();
    diag.emit(None, Some(Span::line(9)), RuleKind::UntrustedReturn, vec![]);
    diag.emit(None, None, RuleKind::UntrustedReturn, vec![]);
    let out = diag.into_sorted();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].span, Span::line(9));
}

#[test]
fn findings_sort_by_position_then_code() {
    let diag = DiagEngine::new();
    diag.emit(Some(Span::line(5)), None, RuleKind::UntrustedReturn, vec![]);
    diag.emit(
        Some(Span::line(2)),
        None,
        RuleKind::UntrustedArg,
        vec!["1".into(), "sink".into()],
    );
    let out = diag.into_sorted();
    assert_eq!(out[0].span, Span::line(2));
    assert!(out[0].message().contains("`sink`"));
}
