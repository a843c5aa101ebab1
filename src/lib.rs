pub mod config;
pub mod decon;
pub mod diag;
pub mod engine;
pub mod errors;
pub mod ir;
pub mod log_scan;
pub mod sig;
pub mod tables;
pub mod taint;

pub use crate::config::TaintConfig;
pub use crate::diag::{DiagEngine, Finding, RuleKind};
pub use crate::engine::run_rule;
pub use crate::errors::{StyxError, StyxResult};
pub use crate::taint::{TaintState, propagate};
