use bitflags::bitflags;
use petgraph::prelude::*;
pub use petgraph::graph::NodeIndex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Stable, package-unique value identifier. Taint is keyed by this, never by
/// source-code name strings (names can collide across shadowing scopes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

bitflags! {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct ValueFlags: u8 {
                /// The function's return slot; a tainted store here is a finding.
                const RET_SLOT = 0b0000_0001;
                /// Package-level variable.
                const GLOBAL   = 0b0000_0010;
                /// Declared in another package.
                const IMPORTED = 0b0000_0100;
        }
}

/// The result of an instruction, a parameter, or a global slot.
#[derive(Debug, Clone)]
pub struct Value {
    pub id: ValueId,
    /// Source-level identifier, kept for diagnostics only.
    pub name: Option<String>,
    pub flags: ValueFlags,
}

/// Source position of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    pub fn line(line: u32) -> Self {
        Span {
            start: Pos { line, col: 1 },
            end: Pos { line, col: 80 },
        }
    }
}

/// How a call site dispatches: plain function, instance method (receiver in
/// argument 0), or dynamic dispatch (`Invoke`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Static,
    Member,
    Virtual,
}

impl Dispatch {
    /// Member and virtual calls carry the receiver as argument 0, which shifts
    /// the user-visible argument numbering.
    pub fn has_receiver(self) -> bool {
        matches!(self, Dispatch::Member | Dispatch::Virtual)
    }
}

/// Resolved callee descriptor as exposed by the IR provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSig {
    pub name: String,
    /// Owner type for methods, `None` for free functions.
    pub owner: Option<String>,
    /// Parameter type names, receiver included for methods.
    pub params: Vec<String>,
    pub ret: String,
    pub package: String,
}

impl CallSig {
    pub fn function(name: &str, package: &str, params: &[&str], ret: &str) -> Self {
        CallSig {
            name: name.into(),
            owner: None,
            params: params.iter().map(|s| (*s).into()).collect(),
            ret: ret.into(),
            package: package.into(),
        }
    }

    pub fn method(name: &str, owner: &str, package: &str, params: &[&str], ret: &str) -> Self {
        CallSig {
            owner: Some(owner.into()),
            ..CallSig::function(name, package, params, ret)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    Str(String),
    Int(i64),
    Bool(bool),
    Unit,
}

/// Closed union over the instruction kinds the engine consumes; exhaustive
/// matching is enforced by the compiler.
#[derive(Debug, Clone)]
pub enum Op {
    Const {
        lit: Lit,
        result: ValueId,
    },
    Call {
        sig: CallSig,
        dispatch: Dispatch,
        args: Vec<ValueId>,
        result: Option<ValueId>,
    },
    Load {
        location: ValueId,
        result: ValueId,
    },
    Store {
        value: ValueId,
        location: ValueId,
    },
    Cast {
        source: ValueId,
        result: ValueId,
    },
    Box {
        source: ValueId,
        result: ValueId,
    },
    Tuple {
        elements: Vec<ValueId>,
        result: ValueId,
    },
    Field {
        base: ValueId,
        index: usize,
        result: ValueId,
    },
    /// Nested closure body; its blocks live in the same function graph and are
    /// analysed with the enclosing function's taint state.
    Lambda {
        name: Option<String>,
        entry: NodeIndex,
        result: Option<ValueId>,
    },
    Branch {
        condition: ValueId,
        true_block: NodeIndex,
        false_block: NodeIndex,
    },
    Jump {
        target: NodeIndex,
    },
    /// Return or throw terminator.
    Exit,
}

impl Op {
    pub fn result(&self) -> Option<ValueId> {
        match self {
            Op::Const { result, .. }
            | Op::Load { result, .. }
            | Op::Cast { result, .. }
            | Op::Box { result, .. }
            | Op::Tuple { result, .. }
            | Op::Field { result, .. } => Some(*result),
            Op::Call { result, .. } | Op::Lambda { result, .. } => *result,
            Op::Store { .. } | Op::Branch { .. } | Op::Jump { .. } | Op::Exit => None,
        }
    }

    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            Op::Const { .. } | Op::Lambda { .. } | Op::Jump { .. } | Op::Exit => Vec::new(),
            Op::Call { args, .. } => args.clone(),
            Op::Load { location, .. } => vec![*location],
            Op::Store { value, location } => vec![*value, *location],
            Op::Cast { source, .. } | Op::Box { source, .. } => vec![*source],
            Op::Tuple { elements, .. } => elements.clone(),
            Op::Field { base, .. } => vec![*base],
            Op::Branch { condition, .. } => vec![*condition],
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, Op::Branch { .. } | Op::Jump { .. } | Op::Exit)
    }

    pub fn successors(&self) -> Vec<NodeIndex> {
        match self {
            Op::Branch {
                true_block,
                false_block,
                ..
            } => vec![*true_block, *false_block],
            Op::Jump { target } => vec![*target],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Instr {
    pub op: Op,
    /// `None` for compiler-synthesized instructions with no mapped location.
    pub span: Option<Span>,
}

#[derive(Debug, Clone, Copy)]
pub enum EdgeKind {
    Seq,
    True,
    False,
}

/// Ordered instruction list ending in a terminator (or fallthrough).
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub instrs: Vec<Instr>,
}

impl Block {
    pub fn terminator(&self) -> Option<&Instr> {
        self.instrs.last().filter(|i| i.op.is_terminator())
    }

    pub fn terminator_span(&self) -> Option<Span> {
        self.terminator().and_then(|i| i.span)
    }

    /// Whether the block contains an `Exit` (the "guard that returns/throws"
    /// test of the decontamination heuristic).
    pub fn exits(&self) -> bool {
        self.instrs.iter().any(|i| matches!(i.op, Op::Exit))
    }

    pub fn successors(&self) -> Vec<NodeIndex> {
        self.terminator().map(|i| i.op.successors()).unwrap_or_default()
    }
}

pub type Cfg = Graph<Block, EdgeKind>;

bitflags! {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct FuncAttrs: u8 {
                const IMPORTED             = 0b0000_0001;
                const GENERIC_INSTANTIATED = 0b0000_0010;
                /// Compiler-synthesized body (global-variable initializers).
                const SYNTHESIZED          = 0b0000_0100;
                const STATIC               = 0b0000_1000;
        }
}

/// One function body: an entry block plus the CFG reachable from it.
/// Supplied by the IR provider; the engine never mutates it.
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub package: String,
    pub attrs: FuncAttrs,
    pub graph: Cfg,
    pub entry: NodeIndex,
    pub values: HashMap<ValueId, Value>,
}

impl Function {
    pub fn value(&self, id: ValueId) -> Option<&Value> {
        self.values.get(&id)
    }

    pub fn instr(&self, loc: InstrLoc) -> &Instr {
        &self.graph[loc.block].instrs[loc.index]
    }
}

#[derive(Debug)]
pub struct GlobalVar {
    pub value: Value,
    /// Index of the initializer function in `Package::functions`, if any.
    pub init: Option<usize>,
}

#[derive(Debug, Default)]
pub struct Package {
    pub name: String,
    pub functions: Vec<Function>,
    pub globals: Vec<GlobalVar>,
    /// Type name → direct supertypes (classes and interfaces); used by the
    /// logger-inheritance check.
    pub supertypes: HashMap<String, Vec<String>>,
}

impl Package {
    /// Resolve a value id against the function's locals, then the globals.
    pub fn value<'a>(&'a self, func: &'a Function, id: ValueId) -> Option<&'a Value> {
        func
            .value(id)
            .or_else(|| self.globals.iter().map(|g| &g.value).find(|v| v.id == id))
    }

    /// Whether `ty` is `base` or transitively inherits it. Guarded against
    /// cyclic supertype declarations.
    pub fn inherits(&self, ty: &str, base: &str) -> bool {
        let mut seen = std::collections::HashSet::new();
        let mut work = vec![ty];
        while let Some(t) = work.pop() {
            if t == base {
                return true;
            }
            if !seen.insert(t) {
                continue;
            }
            if let Some(supers) = self.supertypes.get(t) {
                work.extend(supers.iter().map(String::as_str));
            }
        }
        false
    }
}

/* ---------- def/use index ---------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstrLoc {
    pub block: NodeIndex,
    pub index: usize,
}

/// Per-function def/use index, built once per analysis run. Users are kept in
/// deterministic (block, instruction) insertion order.
#[derive(Debug, Default)]
pub struct UseIndex {
    uses: HashMap<ValueId, Vec<InstrLoc>>,
    defs: HashMap<ValueId, InstrLoc>,
}

impl UseIndex {
    pub fn build(func: &Function) -> Self {
        let mut idx = UseIndex::default();
        for block in func.graph.node_indices() {
            for (i, instr) in func.graph[block].instrs.iter().enumerate() {
                let loc = InstrLoc { block, index: i };
                for operand in instr.op.operands() {
                    idx.uses.entry(operand).or_default().push(loc);
                }
                if let Some(r) = instr.op.result() {
                    idx.defs.insert(r, loc);
                }
            }
        }
        idx
    }

    pub fn users(&self, id: ValueId) -> &[InstrLoc] {
        self.uses.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn def(&self, id: ValueId) -> Option<InstrLoc> {
        self.defs.get(&id).copied()
    }

    pub fn def_op<'f>(&self, func: &'f Function, id: ValueId) -> Option<&'f Op> {
        self.def(id).map(|loc| &func.instr(loc).op)
    }
}

/// Best identifier for diagnostics: the source name if the value has one,
/// otherwise the name of the variable it was loaded from, otherwise the raw
/// id.
pub fn display_name(pkg: &Package, func: &Function, uses: &UseIndex, id: ValueId) -> String {
    if let Some(v) = pkg.value(func, id) {
        if let Some(n) = &v.name {
            return n.clone();
        }
    }
    if let Some(Op::Load { location, .. }) = uses.def_op(func, id) {
        return display_name(pkg, func, uses, *location);
    }
    format!("{id}")
}

/* ---------- builders (tests and IR providers) ---------- */

pub struct PackageBuilder {
    pkg: Package,
    next_value: u32,
    next_line: u32,
}

impl PackageBuilder {
    pub fn new(name: &str) -> Self {
        PackageBuilder {
            pkg: Package {
                name: name.into(),
                ..Package::default()
            },
            next_value: 0,
            next_line: 1,
        }
    }

    fn fresh(&mut self, name: Option<&str>, flags: ValueFlags) -> Value {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        Value {
            id,
            name: name.map(str::to_owned),
            flags,
        }
    }

    fn fresh_span(&mut self) -> Span {
        let line = self.next_line;
        self.next_line += 1;
        Span::line(line)
    }

    pub fn supertype(&mut self, ty: &str, base: &str) {
        self
            .pkg
            .supertypes
            .entry(ty.into())
            .or_default()
            .push(base.into());
    }

    pub fn global(&mut self, name: &str) -> ValueId {
        let value = self.fresh(Some(name), ValueFlags::GLOBAL);
        let id = value.id;
        self.pkg.globals.push(GlobalVar { value, init: None });
        id
    }

    pub fn set_global_init(&mut self, global: ValueId, func: usize) {
        if let Some(g) = self.pkg.globals.iter_mut().find(|g| g.value.id == global) {
            g.init = Some(func);
        }
    }

    pub fn function(&mut self, name: &str, attrs: FuncAttrs) -> FunctionBuilder<'_> {
        let package = self.pkg.name.clone();
        FunctionBuilder {
            func: Function {
                name: name.into(),
                package,
                attrs,
                graph: Cfg::with_capacity(8, 8),
                entry: NodeIndex::end(),
                values: HashMap::new(),
            },
            synthetic: false,
            pb: self,
        }
    }

    pub fn finish(self) -> Package {
        self.pkg
    }
}

pub struct FunctionBuilder<'p> {
    pb: &'p mut PackageBuilder,
    func: Function,
    synthetic: bool,
}

impl FunctionBuilder<'_> {
    /// Add a basic block; the first one becomes the entry block.
    pub fn block(&mut self) -> NodeIndex {
        let b = self.func.graph.add_node(Block::default());
        if self.func.entry == NodeIndex::end() {
            self.func.entry = b;
        }
        b
    }

    fn register(&mut self, name: Option<&str>, flags: ValueFlags) -> ValueId {
        let value = self.pb.fresh(name, flags);
        let id = value.id;
        self.func.values.insert(id, value);
        id
    }

    pub fn local(&mut self, name: &str) -> ValueId {
        self.register(Some(name), ValueFlags::empty())
    }

    pub fn temp(&mut self) -> ValueId {
        self.register(None, ValueFlags::empty())
    }

    pub fn ret_slot(&mut self) -> ValueId {
        self.register(None, ValueFlags::RET_SLOT)
    }

    /// Subsequent instructions carry no source span, like compiler-synthesized
    /// code.
    pub fn synthetic(&mut self, on: bool) {
        self.synthetic = on;
    }

    fn push(&mut self, b: NodeIndex, op: Op) {
        let span = if self.synthetic {
            None
        } else {
            Some(self.pb.fresh_span())
        };
        self.func.graph[b].instrs.push(Instr { op, span });
    }

    pub fn str_const(&mut self, b: NodeIndex, text: &str) -> ValueId {
        let result = self.temp();
        self.push(
            b,
            Op::Const {
                lit: Lit::Str(text.into()),
                result,
            },
        );
        result
    }

    pub fn call(
        &mut self,
        b: NodeIndex,
        sig: CallSig,
        dispatch: Dispatch,
        args: &[ValueId],
    ) -> ValueId {
        let result = self.temp();
        self.push(
            b,
            Op::Call {
                sig,
                dispatch,
                args: args.to_vec(),
                result: Some(result),
            },
        );
        result
    }

    pub fn call_void(&mut self, b: NodeIndex, sig: CallSig, dispatch: Dispatch, args: &[ValueId]) {
        self.push(
            b,
            Op::Call {
                sig,
                dispatch,
                args: args.to_vec(),
                result: None,
            },
        );
    }

    pub fn load(&mut self, b: NodeIndex, location: ValueId) -> ValueId {
        let result = self.temp();
        self.push(b, Op::Load { location, result });
        result
    }

    pub fn store(&mut self, b: NodeIndex, value: ValueId, location: ValueId) {
        self.push(b, Op::Store { value, location });
    }

    pub fn cast(&mut self, b: NodeIndex, source: ValueId) -> ValueId {
        let result = self.temp();
        self.push(b, Op::Cast { source, result });
        result
    }

    pub fn boxed(&mut self, b: NodeIndex, source: ValueId) -> ValueId {
        let result = self.temp();
        self.push(b, Op::Box { source, result });
        result
    }

    pub fn tuple(&mut self, b: NodeIndex, elements: &[ValueId]) -> ValueId {
        let result = self.temp();
        self.push(
            b,
            Op::Tuple {
                elements: elements.to_vec(),
                result,
            },
        );
        result
    }

    pub fn field(&mut self, b: NodeIndex, base: ValueId, index: usize) -> ValueId {
        let result = self.temp();
        self.push(b, Op::Field { base, index, result });
        result
    }

    pub fn lambda(&mut self, b: NodeIndex, name: &str, entry: NodeIndex) -> ValueId {
        let result = self.temp();
        self.push(
            b,
            Op::Lambda {
                name: Some(name.into()),
                entry,
                result: Some(result),
            },
        );
        result
    }

    pub fn branch(&mut self, b: NodeIndex, condition: ValueId, t: NodeIndex, f: NodeIndex) {
        self.push(
            b,
            Op::Branch {
                condition,
                true_block: t,
                false_block: f,
            },
        );
        self.func.graph.add_edge(b, t, EdgeKind::True);
        self.func.graph.add_edge(b, f, EdgeKind::False);
    }

    pub fn jump(&mut self, b: NodeIndex, target: NodeIndex) {
        self.push(b, Op::Jump { target });
        self.func.graph.add_edge(b, target, EdgeKind::Seq);
    }

    pub fn exit(&mut self, b: NodeIndex) {
        self.push(b, Op::Exit);
    }

    /// Register the function and return its index in the package.
    pub fn finish(self) -> usize {
        let FunctionBuilder { pb, func, .. } = self;
        pb.pkg.functions.push(func);
        pb.pkg.functions.len() - 1
    }
}

#[test]
fn builder_sets_entry_and_allocates_unique_ids() {
    let mut pb = PackageBuilder::new("demo");
    let g = pb.global("cfg");
    let mut fb = pb.function("main", FuncAttrs::empty());
    let b0 = fb.block();
    let b1 = fb.block();
    let x = fb.local("x");
    let t = fb.load(b0, g);
    fb.store(b0, t, x);
    fb.jump(b0, b1);
    fb.exit(b1);
    let fi = fb.finish();
    let pkg = pb.finish();

    let func = &pkg.functions[fi];
    assert_eq!(func.entry, b0);
    assert_ne!(g, x);
    assert_ne!(x, t);
    assert!(pkg.value(func, g).is_some(), "globals resolve through the package");
}

#[test]
fn use_index_tracks_defs_and_users() {
    let mut pb = PackageBuilder::new("demo");
    let mut fb = pb.function("f", FuncAttrs::empty());
    let b = fb.block();
    let x = fb.local("x");
    let t = fb.load(b, x);
    let u = fb.cast(b, t);
    fb.store(b, u, x);
    fb.exit(b);
    let fi = fb.finish();
    let pkg = pb.finish();

    let func = &pkg.functions[fi];
    let idx = UseIndex::build(func);
    assert_eq!(idx.users(t).len(), 1); // the cast
    assert_eq!(idx.users(x).len(), 2); // the load and the store
    assert!(matches!(idx.def_op(func, u), Some(Op::Cast { .. })));
}

#[test]
fn display_name_follows_load_chains() {
    let mut pb = PackageBuilder::new("demo");
    let mut fb = pb.function("f", FuncAttrs::empty());
    let b = fb.block();
    let x = fb.local("request");
    let t = fb.load(b, x);
    fb.exit(b);
    let fi = fb.finish();
    let pkg = pb.finish();

    let func = &pkg.functions[fi];
    let idx = UseIndex::build(func);
    assert_eq!(display_name(&pkg, func, &idx, t), "request");
    assert_eq!(display_name(&pkg, func, &idx, x), "request");
}

#[test]
fn inherits_walks_supertype_chains_and_survives_cycles() {
    let mut pb = PackageBuilder::new("demo");
    pb.supertype("FileLogger", "AbstractLogger");
    pb.supertype("AbstractLogger", "Logger");
    pb.supertype("Loop", "Loop");
    let pkg = pb.finish();

    assert!(pkg.inherits("FileLogger", "Logger"));
    assert!(pkg.inherits("Logger", "Logger"));
    assert!(!pkg.inherits("Loop", "Logger"));
}
