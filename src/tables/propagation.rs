use super::{ArgPos, PropKind, PropRule};
use crate::sig::{ANY_TYPE, NOT_CARE, RuleSig};

/// How taint flows through known callees. Ordered: lookups stop at the first
/// signature match whose source position is actually tainted.
pub static PROPAGATION: &[PropRule] = &[
    // ─────────── http response accessors ───────────
    PropRule {
        sig: RuleSig {
            name: "readTextToEnd",
            owner: "HttpResponse",
            params: &["HttpResponse"],
            ret: "String",
            package: "std.net.http",
        },
        src: ArgPos::Index(1),
        dst: ArgPos::Return,
        kind: PropKind::Uncertain,
    },
    PropRule {
        sig: RuleSig {
            name: "readToEnd",
            owner: "HttpResponse",
            params: &["HttpResponse"],
            ret: "Array",
            package: "std.net.http",
        },
        src: ArgPos::Index(1),
        dst: ArgPos::Return,
        kind: PropKind::Uncertain,
    },
    PropRule {
        sig: RuleSig {
            name: "copyTo",
            owner: "HttpResponse",
            params: &["HttpResponse", "OutputStream"],
            ret: "",
            package: "std.net.http",
        },
        src: ArgPos::Index(1),
        dst: ArgPos::Index(2),
        kind: PropKind::Uncertain,
    },
    PropRule {
        sig: RuleSig {
            name: "isClosed",
            owner: "HttpResponse",
            params: &["HttpResponse"],
            ret: "",
            package: "std.net.http",
        },
        src: ArgPos::Index(1),
        dst: ArgPos::Return,
        kind: PropKind::NotTainted,
    },
    // ─────────── collections and arrays ───────────
    // Index assignment first: the getter signature below matches any arity.
    PropRule {
        sig: RuleSig {
            name: "[]",
            owner: NOT_CARE,
            params: &[ANY_TYPE, ANY_TYPE, ANY_TYPE],
            ret: ANY_TYPE,
            package: NOT_CARE,
        },
        src: ArgPos::Index(3),
        dst: ArgPos::Index(1),
        kind: PropKind::PreservesOrTaints,
    },
    PropRule {
        sig: RuleSig {
            name: "[]",
            owner: NOT_CARE,
            params: &[NOT_CARE],
            ret: ANY_TYPE,
            package: NOT_CARE,
        },
        src: ArgPos::Index(1),
        dst: ArgPos::Return,
        kind: PropKind::Uncertain,
    },
    PropRule {
        sig: RuleSig {
            name: "add",
            owner: ANY_TYPE,
            params: &[ANY_TYPE, ANY_TYPE],
            ret: NOT_CARE,
            package: "std.collection",
        },
        src: ArgPos::Index(2),
        dst: ArgPos::Index(1),
        kind: PropKind::PreservesOrTaints,
    },
    PropRule {
        sig: RuleSig {
            name: "get",
            owner: ANY_TYPE,
            params: &[ANY_TYPE, ANY_TYPE],
            ret: "Option",
            package: "std.collection",
        },
        src: ArgPos::Index(1),
        dst: ArgPos::Return,
        kind: PropKind::Uncertain,
    },
    PropRule {
        sig: RuleSig {
            name: "iterator",
            owner: NOT_CARE,
            params: &[NOT_CARE],
            ret: ANY_TYPE,
            package: NOT_CARE,
        },
        src: ArgPos::Index(1),
        dst: ArgPos::Return,
        kind: PropKind::Uncertain,
    },
    PropRule {
        sig: RuleSig {
            name: "next",
            owner: ANY_TYPE,
            params: &[ANY_TYPE],
            ret: "Option",
            package: NOT_CARE,
        },
        src: ArgPos::Index(1),
        dst: ArgPos::Return,
        kind: PropKind::Uncertain,
    },
    PropRule {
        sig: RuleSig {
            name: "clone",
            owner: ANY_TYPE,
            params: &[ANY_TYPE],
            ret: ANY_TYPE,
            package: "std.collection",
        },
        src: ArgPos::Index(1),
        dst: ArgPos::Return,
        kind: PropKind::Uncertain,
    },
    PropRule {
        sig: RuleSig {
            name: "clear",
            owner: ANY_TYPE,
            params: &[ANY_TYPE],
            ret: NOT_CARE,
            package: "std.collection",
        },
        src: ArgPos::Index(1),
        dst: ArgPos::Index(1),
        kind: PropKind::NotTainted,
    },
    // ─────────── json ───────────
    PropRule {
        sig: RuleSig {
            name: "fromStr",
            owner: "JsonValue",
            params: &["JsonValue", "String"],
            ret: "JsonValue",
            package: "std.encoding.json",
        },
        src: ArgPos::Index(1),
        dst: ArgPos::Return,
        kind: PropKind::Uncertain,
    },
    PropRule {
        sig: RuleSig {
            name: "asString",
            owner: "JsonValue",
            params: &["JsonValue"],
            ret: "JsonString",
            package: "std.encoding.json",
        },
        src: ArgPos::Index(1),
        dst: ArgPos::Return,
        kind: PropKind::Uncertain,
    },
    PropRule {
        sig: RuleSig {
            name: "put",
            owner: "JsonObject",
            params: &["JsonObject", "String", "JsonValue"],
            ret: "Option",
            package: "std.encoding.json",
        },
        src: ArgPos::Index(3),
        dst: ArgPos::Index(1),
        kind: PropKind::PreservesOrTaints,
    },
    // ─────────── strings ───────────
    PropRule {
        sig: RuleSig {
            name: "concat",
            owner: "String",
            params: &["String", "String"],
            ret: "String",
            package: "std.core",
        },
        src: ArgPos::All,
        dst: ArgPos::Return,
        kind: PropKind::Taints,
    },
    PropRule {
        sig: RuleSig {
            name: "+",
            owner: ANY_TYPE,
            params: &[ANY_TYPE, ANY_TYPE],
            ret: ANY_TYPE,
            package: NOT_CARE,
        },
        src: ArgPos::All,
        dst: ArgPos::Return,
        kind: PropKind::Uncertain,
    },
    PropRule {
        sig: RuleSig {
            name: "toString",
            owner: NOT_CARE,
            params: &[NOT_CARE],
            ret: "String",
            package: NOT_CARE,
        },
        src: ArgPos::Index(1),
        dst: ArgPos::Return,
        kind: PropKind::Uncertain,
    },
    PropRule {
        sig: RuleSig {
            name: "getOrThrow",
            owner: ANY_TYPE,
            params: &[NOT_CARE],
            ret: ANY_TYPE,
            package: "std.core",
        },
        src: ArgPos::Index(1),
        dst: ArgPos::Return,
        kind: PropKind::Uncertain,
    },
    // ─────────── benign predicates (fuzzy matching) ───────────
    PropRule {
        sig: RuleSig {
            name: "==",
            owner: ANY_TYPE,
            params: &[NOT_CARE],
            ret: ANY_TYPE,
            package: NOT_CARE,
        },
        src: ArgPos::All,
        dst: ArgPos::Return,
        kind: PropKind::NotTainted,
    },
    PropRule {
        sig: RuleSig {
            name: "!=",
            owner: ANY_TYPE,
            params: &[NOT_CARE],
            ret: ANY_TYPE,
            package: NOT_CARE,
        },
        src: ArgPos::All,
        dst: ArgPos::Return,
        kind: PropKind::NotTainted,
    },
    PropRule {
        sig: RuleSig {
            name: "contains",
            owner: NOT_CARE,
            params: &[NOT_CARE],
            ret: ANY_TYPE,
            package: NOT_CARE,
        },
        src: ArgPos::All,
        dst: ArgPos::Return,
        kind: PropKind::NotTainted,
    },
    PropRule {
        sig: RuleSig {
            name: "isEmpty",
            owner: NOT_CARE,
            params: &[NOT_CARE],
            ret: ANY_TYPE,
            package: NOT_CARE,
        },
        src: ArgPos::All,
        dst: ArgPos::Return,
        kind: PropKind::NotTainted,
    },
    PropRule {
        sig: RuleSig {
            name: "size",
            owner: NOT_CARE,
            params: &[NOT_CARE],
            ret: ANY_TYPE,
            package: NOT_CARE,
        },
        src: ArgPos::All,
        dst: ArgPos::Return,
        kind: PropKind::NotTainted,
    },
];
