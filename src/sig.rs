use crate::ir::CallSig;

/// Wildcard matching any single type at its position (including "no owner"
/// in the owner slot).
pub const ANY_TYPE: &str = "ANY_TYPE";
/// Wildcard matched and skipped at its position; as the final parameter
/// entry it accepts any number of remaining parameters.
pub const NOT_CARE: &str = "NOT_CARE";

/// Rule-side call signature. Static data: rule tables are built once per
/// process and never written afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleSig {
    pub name: &'static str,
    /// `""` leaves the owner unconstrained: the rule matches free functions
    /// and methods alike.
    pub owner: &'static str,
    /// Receiver included for methods; `""` entries match any single type.
    pub params: &'static [&'static str],
    /// `""` leaves the return type unconstrained.
    pub ret: &'static str,
    pub package: &'static str,
}

/// Match an actual call descriptor against a rule signature. Fails fast on
/// the first mismatching position; no backtracking, no side effects.
pub fn matches(rule: &RuleSig, call: &CallSig) -> bool {
    if rule.name != NOT_CARE && rule.name != call.name {
        return false;
    }
    if rule.package != NOT_CARE && rule.package != call.package {
        return false;
    }
    if !rule.owner.is_empty() && rule.owner != NOT_CARE && rule.owner != ANY_TYPE {
        let actual = call.owner.as_deref().unwrap_or("");
        if rule.owner != actual {
            return false;
        }
    }
    if !rule.ret.is_empty() && rule.ret != NOT_CARE && rule.ret != ANY_TYPE && rule.ret != call.ret
    {
        return false;
    }

    for (i, &p) in rule.params.iter().enumerate() {
        // A trailing NOT_CARE accepts the whole rest, including an empty one.
        if p == NOT_CARE && i + 1 == rule.params.len() {
            return true;
        }
        let Some(actual) = call.params.get(i) else {
            return false;
        };
        if p == NOT_CARE || p == ANY_TYPE || p.is_empty() {
            continue;
        }
        if p != actual {
            return false;
        }
    }
    call.params.len() == rule.params.len()
}

#[test]
fn literal_positions_must_match() {
    let rule = RuleSig {
        name: "send",
        owner: "Client",
        params: &["Client", "Request"],
        ret: "HttpResponse",
        package: "std.net.http",
    };
    let ok = CallSig::method(
        "send",
        "Client",
        "std.net.http",
        &["Client", "Request"],
        "HttpResponse",
    );
    assert!(matches(&rule, &ok));

    let wrong_pkg = CallSig::method(
        "send",
        "Client",
        "std.io",
        &["Client", "Request"],
        "HttpResponse",
    );
    assert!(!matches(&rule, &wrong_pkg));

    let wrong_arity =
        CallSig::method("send", "Client", "std.net.http", &["Client"], "HttpResponse");
    assert!(!matches(&rule, &wrong_arity));
}

#[test]
fn any_type_matches_one_position_including_missing_owner() {
    let rule = RuleSig {
        name: "==",
        owner: ANY_TYPE,
        params: &[ANY_TYPE],
        ret: ANY_TYPE,
        package: NOT_CARE,
    };
    assert!(matches(
        &rule,
        &CallSig::method("==", "String", "std.core", &["String"], "Bool"),
    ));
    assert!(matches(
        &rule,
        &CallSig::function("==", "std.core", &["Int64"], "Bool"),
    ));
    // ANY_TYPE still requires the parameter to be present.
    assert!(!matches(&rule, &CallSig::function("==", "std.core", &[], "Bool")));
}

#[test]
fn empty_owner_is_unconstrained() {
    let rule = RuleSig {
        name: "readToEnd",
        owner: "",
        params: &["InputStream"],
        ret: "Array",
        package: "std.io",
    };
    // An empty owner accepts both a receiver-reporting method call and a
    // free function.
    assert!(matches(
        &rule,
        &CallSig::method("readToEnd", "InputStream", "std.io", &["InputStream"], "Array"),
    ));
    assert!(matches(
        &rule,
        &CallSig::function("readToEnd", "std.io", &["InputStream"], "Array"),
    ));
    assert!(!matches(
        &rule,
        &CallSig::method("readToEnd", "InputStream", "std.io", &["InputStream"], "String"),
    ));
}

#[test]
fn trailing_not_care_accepts_any_rest() {
    let rule = RuleSig {
        name: "read",
        owner: "TcpSocket",
        params: &["TcpSocket", "Array", NOT_CARE],
        ret: "",
        package: "std.net",
    };
    for params in [
        &["TcpSocket", "Array"][..],
        &["TcpSocket", "Array", "Int64"][..],
        &["TcpSocket", "Array", "Int64", "Int64"][..],
    ] {
        assert!(matches(
            &rule,
            &CallSig::method("read", "TcpSocket", "std.net", params, "Int64"),
        ));
    }
    assert!(!matches(
        &rule,
        &CallSig::method("read", "TcpSocket", "std.net", &["TcpSocket"], "Int64"),
    ));
}

#[test]
fn mid_list_not_care_skips_exactly_one_position() {
    let rule = RuleSig {
        name: "[]",
        owner: NOT_CARE,
        params: &[NOT_CARE, ANY_TYPE],
        ret: ANY_TYPE,
        package: NOT_CARE,
    };
    assert!(matches(
        &rule,
        &CallSig::method("[]", "ArrayList", "std.collection", &["ArrayList", "Int64"], "Unit"),
    ));
    assert!(!matches(
        &rule,
        &CallSig::method(
            "[]",
            "ArrayList",
            "std.collection",
            &["ArrayList", "Int64", "String"],
            "Unit",
        ),
    ));
}
