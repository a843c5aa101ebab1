pub mod propagation;
pub mod sources;

use crate::ir::CallSig;
use crate::sig::{self, NOT_CARE, RuleSig};
use once_cell::sync::Lazy;
use phf::phf_set;
use std::collections::HashSet;

/// Argument position in a rule. Indexes are 1-based; the conceptual index 0
/// ("all arguments") is spelled `All`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgPos {
    Return,
    All,
    Index(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropKind {
    Taints,
    NotTainted,
    Uncertain,
    PreservesOrTaints,
}

/// A call whose result (or argument) is, by rule, considered tainted.
#[derive(Debug, Clone, Copy)]
pub struct SourceRule {
    pub sig: RuleSig,
    pub target: ArgPos,
}

/// How taint moves from one call position to another.
#[derive(Debug, Clone, Copy)]
pub struct PropRule {
    pub sig: RuleSig,
    pub src: ArgPos,
    pub dst: ArgPos,
    pub kind: PropKind,
}

/// Logging-method family inspected by the sink emitter.
pub static LOG_METHODS: phf::Set<&'static str> =
    phf_set! {"trace", "debug", "info", "warn", "error", "log"};

/// Validated, immutable rule tables. Built once per process; reads need no
/// locking.
#[derive(Debug)]
pub struct RuleTables {
    sources: Vec<&'static SourceRule>,
    propagation: Vec<&'static PropRule>,
    prop_names: HashSet<&'static str>,
}

fn check_sig(sig: &RuleSig) -> Result<(), String> {
    if sig.name.is_empty() {
        return Err("empty function name".into());
    }
    Ok(())
}

fn check_pos(pos: ArgPos, what: &str) -> Result<(), String> {
    if pos == ArgPos::Index(0) {
        return Err(format!("{what} index 0 (1-based; use All for every argument)"));
    }
    Ok(())
}

impl RuleTables {
    /// Validate and assemble rule tables. Malformed entries are a
    /// configuration error: reported once here, then skipped.
    pub fn from_rules(sources: &'static [SourceRule], propagation: &'static [PropRule]) -> Self {
        let sources = sources
            .iter()
            .filter(|r| {
                check_sig(&r.sig)
                    .and_then(|()| check_pos(r.target, "source target"))
                    .map_err(|e| {
                        tracing::warn!(
                            target: "tables",
                            "skipping source rule `{}`: {e}",
                            r.sig.name
                        )
                    })
                    .is_ok()
            })
            .collect();

        let propagation: Vec<&'static PropRule> = propagation
            .iter()
            .filter(|r| {
                check_sig(&r.sig)
                    .and_then(|()| check_pos(r.src, "propagation source"))
                    .and_then(|()| check_pos(r.dst, "propagation destination"))
                    .and_then(|()| {
                        if r.src == ArgPos::Return {
                            Err("propagation source cannot be the return value".into())
                        } else {
                            Ok(())
                        }
                    })
                    .map_err(|e| {
                        tracing::warn!(
                            target: "tables",
                            "skipping propagation rule `{}`: {e}",
                            r.sig.name
                        )
                    })
                    .is_ok()
            })
            .collect();

        let prop_names = propagation
            .iter()
            .map(|r| r.sig.name)
            .filter(|n| *n != NOT_CARE)
            .collect();

        RuleTables {
            sources,
            propagation,
            prop_names,
        }
    }

    pub fn builtin() -> &'static RuleTables {
        static BUILTIN: Lazy<RuleTables> =
            Lazy::new(|| RuleTables::from_rules(sources::SOURCES, propagation::PROPAGATION));
        &BUILTIN
    }

    /// First matching source rule wins.
    pub fn source_match(&self, call: &CallSig) -> Option<&'static SourceRule> {
        self
            .sources
            .iter()
            .copied()
            .find(|r| sig::matches(&r.sig, call))
    }

    /// Propagation rules matching the call signature, in table order.
    pub fn propagation_matches<'a>(
        &'a self,
        call: &'a CallSig,
    ) -> impl Iterator<Item = &'static PropRule> + 'a {
        self
            .propagation
            .iter()
            .copied()
            .filter(move |r| sig::matches(&r.sig, call))
    }

    /// Name-level lookup used by the trust-boundary check: a callee that has
    /// any propagation entry is modelled, hence not alarmed on.
    pub fn has_propagation_for(&self, name: &str) -> bool {
        self.prop_names.contains(name)
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn propagation_count(&self) -> usize {
        self.propagation.len()
    }
}

#[test]
fn builtin_tables_have_no_malformed_entries() {
    let tables = RuleTables::builtin();
    assert_eq!(tables.source_count(), sources::SOURCES.len());
    assert_eq!(tables.propagation_count(), propagation::PROPAGATION.len());
}

#[test]
fn every_http_client_verb_is_a_source() {
    use crate::ir::CallSig;
    let tables = RuleTables::builtin();
    for (name, params) in [
        ("send", &["Client", "Request"][..]),
        ("get", &["Client", "String"][..]),
        ("head", &["Client", "String"][..]),
        ("post", &["Client", "String", "String", "InputStream"][..]),
        ("postForm", &["Client", "String", "Form"][..]),
        ("postJson", &["Client", "String", "JsonValue"][..]),
        ("put", &["Client", "String", "String", "InputStream"][..]),
        ("putForm", &["Client", "String", "Form"][..]),
        ("putForm", &["Client", "String", "JsonValue"][..]),
        ("delete", &["Client", "String", "String", "InputStream"][..]),
        ("deleteForm", &["Client", "String", "Form"][..]),
        ("deleteJson", &["Client", "String", "JsonValue"][..]),
    ] {
        let call = CallSig::method(name, "Client", "std.net.http", params, "HttpResponse");
        let hit = tables.source_match(&call).unwrap_or_else(|| panic!("no source rule for {name}"));
        assert_eq!(hit.target, ArgPos::Return, "{name}");
    }
    let build = CallSig::method(
        "build",
        "HttpResponseBuilder",
        "std.net.http",
        &["HttpResponseBuilder"],
        "HttpResponse",
    );
    assert!(tables.source_match(&build).is_some());
}

#[test]
fn malformed_entries_are_skipped_not_fatal() {
    static BAD_SOURCES: &[SourceRule] = &[
        SourceRule {
            sig: RuleSig {
                name: "",
                owner: "",
                params: &[],
                ret: "",
                package: "p",
            },
            target: ArgPos::Return,
        },
        SourceRule {
            sig: RuleSig {
                name: "read",
                owner: "",
                params: &[],
                ret: "",
                package: "p",
            },
            target: ArgPos::Index(0),
        },
    ];
    static BAD_PROPS: &[PropRule] = &[PropRule {
        sig: RuleSig {
            name: "wrap",
            owner: "",
            params: &[],
            ret: "",
            package: "p",
        },
        src: ArgPos::Return,
        dst: ArgPos::Index(1),
        kind: PropKind::Taints,
    }];

    let tables = RuleTables::from_rules(BAD_SOURCES, BAD_PROPS);
    assert_eq!(tables.source_count(), 0);
    assert_eq!(tables.propagation_count(), 0);
    assert!(!tables.has_propagation_for("wrap"));
}

#[test]
fn first_matching_source_rule_wins() {
    use crate::ir::CallSig;
    static TWO: &[SourceRule] = &[
        SourceRule {
            sig: RuleSig {
                name: "read",
                owner: NOT_CARE,
                params: &[NOT_CARE],
                ret: "",
                package: NOT_CARE,
            },
            target: ArgPos::Return,
        },
        SourceRule {
            sig: RuleSig {
                name: "read",
                owner: "Console",
                params: &["Console"],
                ret: "",
                package: "std.console",
            },
            target: ArgPos::Index(1),
        },
    ];
    let tables = RuleTables::from_rules(TWO, &[]);
    let call = CallSig::method("read", "Console", "std.console", &["Console"], "String");
    let hit = tables.source_match(&call).unwrap();
    assert_eq!(hit.target, ArgPos::Return);
}
