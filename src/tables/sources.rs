use super::{ArgPos, SourceRule};
use crate::sig::{NOT_CARE, RuleSig};

/// Calls whose results (or out-arguments) carry untrusted external data.
/// Ordered: the first matching entry wins.
pub static SOURCES: &[SourceRule] = &[
    // ─────────── http client ───────────
    SourceRule {
        sig: RuleSig {
            name: "send",
            owner: "Client",
            params: &["Client", "Request"],
            ret: "HttpResponse",
            package: "std.net.http",
        },
        target: ArgPos::Return,
    },
    SourceRule {
        sig: RuleSig {
            name: "get",
            owner: "Client",
            params: &["Client", "String"],
            ret: "HttpResponse",
            package: "std.net.http",
        },
        target: ArgPos::Return,
    },
    SourceRule {
        sig: RuleSig {
            name: "head",
            owner: "Client",
            params: &["Client", "String"],
            ret: "HttpResponse",
            package: "std.net.http",
        },
        target: ArgPos::Return,
    },
    SourceRule {
        sig: RuleSig {
            name: "post",
            owner: "Client",
            params: &["Client", "String", "String", "InputStream"],
            ret: "HttpResponse",
            package: "std.net.http",
        },
        target: ArgPos::Return,
    },
    SourceRule {
        sig: RuleSig {
            name: "postForm",
            owner: "Client",
            params: &["Client", "String", "Form"],
            ret: "HttpResponse",
            package: "std.net.http",
        },
        target: ArgPos::Return,
    },
    SourceRule {
        sig: RuleSig {
            name: "postJson",
            owner: "Client",
            params: &["Client", "String", "JsonValue"],
            ret: "HttpResponse",
            package: "std.net.http",
        },
        target: ArgPos::Return,
    },
    SourceRule {
        sig: RuleSig {
            name: "put",
            owner: "Client",
            params: &["Client", "String", "String", "InputStream"],
            ret: "HttpResponse",
            package: "std.net.http",
        },
        target: ArgPos::Return,
    },
    SourceRule {
        sig: RuleSig {
            name: "putForm",
            owner: "Client",
            params: &["Client", "String", "Form"],
            ret: "HttpResponse",
            package: "std.net.http",
        },
        target: ArgPos::Return,
    },
    SourceRule {
        sig: RuleSig {
            name: "putForm",
            owner: "Client",
            params: &["Client", "String", "JsonValue"],
            ret: "HttpResponse",
            package: "std.net.http",
        },
        target: ArgPos::Return,
    },
    SourceRule {
        sig: RuleSig {
            name: "delete",
            owner: "Client",
            params: &["Client", "String", "String", "InputStream"],
            ret: "HttpResponse",
            package: "std.net.http",
        },
        target: ArgPos::Return,
    },
    SourceRule {
        sig: RuleSig {
            name: "deleteForm",
            owner: "Client",
            params: &["Client", "String", "Form"],
            ret: "HttpResponse",
            package: "std.net.http",
        },
        target: ArgPos::Return,
    },
    SourceRule {
        sig: RuleSig {
            name: "deleteJson",
            owner: "Client",
            params: &["Client", "String", "JsonValue"],
            ret: "HttpResponse",
            package: "std.net.http",
        },
        target: ArgPos::Return,
    },
    SourceRule {
        sig: RuleSig {
            name: "build",
            owner: "HttpRequestBuilder",
            params: &["HttpRequestBuilder"],
            ret: "HttpRequest",
            package: "std.net.http",
        },
        target: ArgPos::Return,
    },
    SourceRule {
        sig: RuleSig {
            name: "build",
            owner: "HttpResponseBuilder",
            params: &["HttpResponseBuilder"],
            ret: "HttpResponse",
            package: "std.net.http",
        },
        target: ArgPos::Return,
    },
    // ─────────── sockets ───────────
    // `read` fills the caller's buffer: the out-argument is the target.
    SourceRule {
        sig: RuleSig {
            name: "read",
            owner: "TcpSocket",
            params: &["TcpSocket", "Array", NOT_CARE],
            ret: "",
            package: "std.net",
        },
        target: ArgPos::Index(2),
    },
    // ─────────── console ───────────
    SourceRule {
        sig: RuleSig {
            name: "read",
            owner: "ConsoleReader",
            params: &["ConsoleReader"],
            ret: "Option",
            package: "std.console",
        },
        target: ArgPos::Return,
    },
    SourceRule {
        sig: RuleSig {
            name: "readln",
            owner: "ConsoleReader",
            params: &["ConsoleReader"],
            ret: "Option",
            package: "std.console",
        },
        target: ArgPos::Return,
    },
    SourceRule {
        sig: RuleSig {
            name: "readToEnd",
            owner: "ConsoleReader",
            params: &["ConsoleReader"],
            ret: "Option",
            package: "std.console",
        },
        target: ArgPos::Return,
    },
    // ─────────── streams ───────────
    SourceRule {
        sig: RuleSig {
            name: "read",
            owner: "InputStream",
            params: &["InputStream", "Array"],
            ret: "",
            package: "std.io",
        },
        target: ArgPos::Index(2),
    },
    SourceRule {
        sig: RuleSig {
            name: "readToEnd",
            owner: "",
            params: &["InputStream"],
            ret: "Array",
            package: "std.io",
        },
        target: ArgPos::Return,
    },
    // ─────────── process environment ───────────
    SourceRule {
        sig: RuleSig {
            name: "getEnv",
            owner: "",
            params: &["String"],
            ret: "Option",
            package: "std.env",
        },
        target: ArgPos::Return,
    },
    SourceRule {
        sig: RuleSig {
            name: "getArgs",
            owner: "",
            params: &[],
            ret: "Array",
            package: "std.env",
        },
        target: ArgPos::Return,
    },
    SourceRule {
        sig: RuleSig {
            name: "gethostname",
            owner: "",
            params: &[],
            ret: "String",
            package: "std.posix",
        },
        target: ArgPos::Return,
    },
];
