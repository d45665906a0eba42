//! The shunting-yard parser: turns token text into a [`Node`] tree.
//!
//! Three stacks drive the algorithm: `es` holds completed subexpressions
//! (the "expression stack"), `os` holds operators and open-bracket markers
//! awaiting an operand or a matching close (the "operator stack"), and
//! `frames` holds one entry per call currently being collected (the
//! "call-frame stack"). Macro definitions and calls are expanded entirely
//! during this pass — by the time a tree leaves [`parse`], no macro
//! bookkeeping survives in it.

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::environment::{Environment, VarHandle};
use crate::expr::{BinaryOp, Node, UnaryOp};
use crate::function::{FuncContext, FunctionRegistry};
use crate::lex::{LexError, Token, Tokenizer};
use crate::resource::{DepthGuard, Limits, ResourceError};

/// Everything that can go wrong while parsing, each carrying the byte offset
/// it was detected at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// A number appeared where an operator was expected.
    UnexpectedNumber(usize),
    /// An identifier appeared where an operator was expected.
    UnexpectedWord(usize),
    /// A `)` has no matching `(`/`{`, or one is left open at end of input.
    MismatchedParen(usize),
    /// An operator has fewer operands available than it needs.
    MissingOperand(usize),
    /// An operator byte didn't match any known lexeme.
    UnknownOperator(usize),
    /// `(` followed a non-callable, or a callable name was never called.
    BadCall(usize),
    /// The left side of `=` is not a bare variable reference.
    BadAssignment(usize),
    /// A `$(...)` definition or invocation was malformed.
    BadMacro(usize),
    /// Nesting depth exceeded the configured [`Limits`].
    TooDeep(ResourceError),
    /// The global allocator reported it could not satisfy a request. Kept
    /// for API completeness with hosts that want to match on every variant;
    /// unreachable in practice since Rust's default allocator aborts the
    /// process on allocation failure rather than returning an error here.
    AllocationFailure,
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        match err {
            LexError::UnexpectedNumber(at) => Self::UnexpectedNumber(at),
            LexError::UnexpectedWord(at) => Self::UnexpectedWord(at),
            LexError::MissingOperand(at) => Self::MissingOperand(at),
            LexError::UnknownOperator(at) => Self::UnknownOperator(at),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedNumber(at) => write!(f, "unexpected number at byte {at}"),
            Self::UnexpectedWord(at) => write!(f, "unexpected identifier at byte {at}"),
            Self::MismatchedParen(at) => write!(f, "mismatched parenthesis at byte {at}"),
            Self::MissingOperand(at) => write!(f, "missing operand at byte {at}"),
            Self::UnknownOperator(at) => write!(f, "unknown operator at byte {at}"),
            Self::BadCall(at) => write!(f, "invalid call at byte {at}"),
            Self::BadAssignment(at) => write!(f, "left side of assignment is not a variable, at byte {at}"),
            Self::BadMacro(at) => write!(f, "malformed macro definition or call at byte {at}"),
            Self::TooDeep(e) => write!(f, "{e}"),
            Self::AllocationFailure => write!(f, "allocation failure"),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<ResourceError> for ParseError {
    fn from(err: ResourceError) -> Self {
        Self::TooDeep(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenKind {
    Paren,
    Brace,
}

#[derive(Debug, Clone, Copy)]
enum OsEntry {
    Open(OpenKind),
    Unary(UnaryOp),
    Binary(BinaryOp),
}

struct CallFrame {
    name: String,
    es_depth: usize,
    collected: Vec<Node>,
}

struct MacroDef {
    body: Node,
    param_count: usize,
}

/// Parses `source` into a [`Node`] tree, creating any variables it
/// references for the first time in `env` and resolving calls against
/// `funcs`.
pub fn parse(source: &str, env: &mut Environment, funcs: &FunctionRegistry) -> Result<Node, ParseError> {
    parse_with_limits(source, env, funcs, Limits::default())
}

/// Like [`parse`], but with caller-supplied nesting-depth limits.
pub fn parse_with_limits(
    source: &str,
    env: &mut Environment,
    funcs: &FunctionRegistry,
    limits: Limits,
) -> Result<Node, ParseError> {
    Parser::new(source, env, funcs, limits).run()
}

struct Parser<'a> {
    lexer: Tokenizer<'a>,
    env: &'a mut Environment,
    funcs: &'a FunctionRegistry,
    macros: AHashMap<String, MacroDef>,
    es: Vec<Node>,
    os: Vec<OsEntry>,
    frames: Vec<CallFrame>,
    pending_call: Option<String>,
    /// True iff the most recently shifted thing was a number or a plain
    /// variable reference with nothing consumed since — i.e. a `(` right
    /// now would be an illegal call on a non-callable.
    forbids_call: bool,
    depth: DepthGuard,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, env: &'a mut Environment, funcs: &'a FunctionRegistry, limits: Limits) -> Self {
        Self {
            lexer: Tokenizer::new(source),
            env,
            funcs,
            macros: AHashMap::new(),
            es: Vec::new(),
            os: Vec::new(),
            frames: Vec::new(),
            pending_call: None,
            forbids_call: false,
            depth: DepthGuard::new(limits),
        }
    }

    fn run(mut self) -> Result<Node, ParseError> {
        loop {
            let pos = self.lexer.pos();
            let Some(token) = self.lexer.next_token()? else { break };

            if self.pending_call.is_some() && !matches!(token, Token::LParen) {
                return Err(ParseError::BadCall(pos));
            }

            match token {
                Token::LParen => self.on_lparen(pos)?,
                Token::RParen => self.on_rparen(pos)?,
                Token::Number(v) => {
                    self.es.push(Node::Const(v));
                    self.drain_unary(pos)?;
                    self.forbids_call = true;
                }
                Token::Ident(name) => self.on_ident(name, pos)?,
                Token::UnaryOp(op) => {
                    self.depth.enter()?;
                    self.os.push(OsEntry::Unary(op));
                    self.forbids_call = false;
                }
                Token::BinaryOp(op) => {
                    self.on_binary(op, pos)?;
                    self.forbids_call = false;
                }
                Token::Newline => self.on_newline(pos)?,
            }
        }

        if self.pending_call.is_some() {
            return Err(ParseError::BadCall(self.lexer.pos()));
        }
        self.finish()
    }

    fn innermost_open(&self) -> Option<OpenKind> {
        self.os.iter().rev().find_map(|e| match e {
            OsEntry::Open(k) => Some(*k),
            OsEntry::Unary(_) | OsEntry::Binary(_) => None,
        })
    }

    fn on_lparen(&mut self, pos: usize) -> Result<(), ParseError> {
        if self.forbids_call {
            return Err(ParseError::BadCall(pos));
        }
        self.depth.enter()?;
        if let Some(name) = self.pending_call.take() {
            self.os.push(OsEntry::Open(OpenKind::Brace));
            self.frames.push(CallFrame { name, es_depth: self.es.len(), collected: Vec::new() });
        } else {
            self.os.push(OsEntry::Open(OpenKind::Paren));
        }
        self.forbids_call = false;
        Ok(())
    }

    fn on_rparen(&mut self, pos: usize) -> Result<(), ParseError> {
        self.reduce_to_barrier(pos)?;
        match self.os.pop() {
            Some(OsEntry::Open(OpenKind::Paren)) => {
                self.depth.exit();
                self.drain_unary(pos)?;
                // Closing a plain group is explicitly allowed to be followed
                // by another `(` — only a *value* (number or variable)
                // immediately forbids a call.
                self.forbids_call = false;
                Ok(())
            }
            Some(OsEntry::Open(OpenKind::Brace)) => {
                self.depth.exit();
                let mut frame = self.frames.pop().expect("brace entry always has a matching frame");
                if self.es.len() > frame.es_depth {
                    let arg = self.es.pop().ok_or(ParseError::MissingOperand(pos))?;
                    frame.collected.push(arg);
                }
                self.resolve_call(frame, pos)?;
                self.forbids_call = true;
                Ok(())
            }
            _ => Err(ParseError::MismatchedParen(pos)),
        }
    }

    fn on_ident(&mut self, name: String, pos: usize) -> Result<(), ParseError> {
        if name == "$" || self.macros.contains_key(&name) || self.funcs.lookup(&name).is_some() {
            self.pending_call = Some(name);
            self.forbids_call = false;
        } else {
            let handle = self
                .env
                .lookup_or_create(&name)
                .expect("the tokenizer only emits identifiers it already validated");
            self.es.push(Node::VarRef(handle));
            self.drain_unary(pos)?;
            self.forbids_call = true;
        }
        Ok(())
    }

    fn on_binary(&mut self, op: BinaryOp, pos: usize) -> Result<(), ParseError> {
        if op == BinaryOp::Comma {
            self.reduce_to_barrier(pos)?;
            if matches!(self.os.last(), Some(OsEntry::Open(OpenKind::Brace))) {
                let arg = self.es.pop().ok_or(ParseError::MissingOperand(pos))?;
                self.frames.last_mut().expect("brace barrier implies an open frame").collected.push(arg);
            } else {
                self.os.push(OsEntry::Binary(BinaryOp::Comma));
            }
        } else {
            while let Some(OsEntry::Binary(top)) = self.os.last().copied() {
                if BinaryOp::should_reduce_before(top, op) {
                    self.os.pop();
                    self.bind_binary(top, pos)?;
                } else {
                    break;
                }
            }
            self.os.push(OsEntry::Binary(op));
        }
        Ok(())
    }

    fn on_newline(&mut self, pos: usize) -> Result<(), ParseError> {
        let separator_meaningful = !matches!(self.innermost_open(), Some(OpenKind::Paren));
        if separator_meaningful && self.forbids_call {
            self.on_binary(BinaryOp::Comma, pos)?;
        }
        self.forbids_call = false;
        Ok(())
    }

    fn drain_unary(&mut self, pos: usize) -> Result<(), ParseError> {
        while let Some(OsEntry::Unary(op)) = self.os.last().copied() {
            self.os.pop();
            self.depth.exit();
            let child = self.es.pop().ok_or(ParseError::MissingOperand(pos))?;
            self.es.push(Node::Unary(op, Box::new(child)));
        }
        Ok(())
    }

    fn reduce_to_barrier(&mut self, pos: usize) -> Result<(), ParseError> {
        while let Some(OsEntry::Binary(op)) = self.os.last().copied() {
            self.os.pop();
            self.bind_binary(op, pos)?;
        }
        Ok(())
    }

    fn bind_binary(&mut self, op: BinaryOp, pos: usize) -> Result<(), ParseError> {
        let rhs = self.es.pop().ok_or(ParseError::MissingOperand(pos))?;
        let lhs = self.es.pop().ok_or(ParseError::MissingOperand(pos))?;
        if op == BinaryOp::Assign && !matches!(lhs, Node::VarRef(_)) {
            return Err(ParseError::BadAssignment(pos));
        }
        self.es.push(Node::Binary(op, Box::new(lhs), Box::new(rhs)));
        Ok(())
    }

    fn resolve_call(&mut self, frame: CallFrame, pos: usize) -> Result<(), ParseError> {
        if frame.name == "$" {
            self.define_macro(frame.collected, pos)?;
            self.es.push(Node::Const(0.0));
        } else if self.macros.contains_key(&frame.name) {
            let mac = self.macros.remove(&frame.name).expect("just checked contains_key");
            if frame.collected.len() != mac.param_count {
                self.macros.insert(frame.name, mac);
                return Err(ParseError::BadMacro(pos));
            }
            let expanded = self.expand_macro(&mac, frame.collected);
            self.macros.insert(frame.name, mac);
            self.es.push(expanded);
        } else if let Some(descriptor) = self.funcs.lookup(&frame.name) {
            let ctx = FuncContext::new(descriptor);
            let args: SmallVec<[Node; 2]> = frame.collected.into_iter().collect();
            self.es.push(Node::Func(ctx, args));
        } else {
            return Err(ParseError::BadCall(pos));
        }
        Ok(())
    }

    fn define_macro(&mut self, mut args: Vec<Node>, pos: usize) -> Result<(), ParseError> {
        if args.is_empty() {
            return Err(ParseError::BadMacro(pos));
        }
        let name_node = args.remove(0);
        let Node::VarRef(handle) = name_node else {
            return Err(ParseError::BadMacro(pos));
        };
        if args.is_empty() {
            return Err(ParseError::BadMacro(pos));
        }
        let name = self.env.name(handle).to_owned();
        let body = args
            .into_iter()
            .reduce(|acc, next| Node::Binary(BinaryOp::Comma, Box::new(acc), Box::new(next)))
            .expect("checked non-empty above");
        let param_count = max_macro_param(&body, self.env);
        self.macros.insert(name, MacroDef { body, param_count });
        Ok(())
    }

    /// Expands one call site of `mac`. The `$1 … $k` parameter slots are the
    /// literal, shared variables of those names in the enclosing
    /// environment — not freshly allocated per call site. This means nested
    /// or recursive macro invocations alias the same `$k` storage: a
    /// deliberate, low-tech hygiene scheme, kept as-is rather than patched
    /// with per-call-site uniquification.
    fn expand_macro(&mut self, mac: &MacroDef, args: Vec<Node>) -> Node {
        let slots: Vec<VarHandle> = (1..=mac.param_count)
            .map(|i| {
                self.env
                    .lookup_or_create(&format!("${i}"))
                    .expect("$N is always a valid variable name")
            })
            .collect();

        let mut chain = instantiate(&mac.body, self.env, &slots);
        for (i, arg) in args.into_iter().enumerate().rev() {
            let assign = Node::Binary(BinaryOp::Assign, Box::new(Node::VarRef(slots[i])), Box::new(arg));
            chain = Node::Binary(BinaryOp::Comma, Box::new(assign), Box::new(chain));
        }
        chain
    }

    fn finish(mut self) -> Result<Node, ParseError> {
        let pos = self.lexer.pos();
        self.reduce_to_barrier(pos)?;
        if !self.os.is_empty() {
            return Err(ParseError::MismatchedParen(pos));
        }
        match self.es.len() {
            1 => Ok(self.es.pop().expect("checked length above")),
            // Empty input (or input that reduces to nothing, e.g. a
            // comments-only source) is not an error: it parses to a
            // constant-zero tree with an empty root, per spec.
            0 => Ok(Node::Const(0.0)),
            _ => Err(ParseError::MissingOperand(pos)),
        }
    }
}

/// Returns the highest `N` such that the body references a variable literally
/// named `$N` (the macro's formal parameters), or `0` if it references none.
fn max_macro_param(body: &Node, env: &Environment) -> usize {
    let mut max = 0;
    walk(body, &mut |node| {
        if let Node::VarRef(h) = node {
            if let Some(n) = macro_param_index(env.name(*h)) {
                max = max.max(n);
            }
        }
    });
    max
}

fn macro_param_index(name: &str) -> Option<usize> {
    let digits = name.strip_prefix('$')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn walk(node: &Node, f: &mut impl FnMut(&Node)) {
    f(node);
    match node {
        Node::Const(_) | Node::VarRef(_) => {}
        Node::Unary(_, child) => walk(child, f),
        Node::Binary(_, lhs, rhs) => {
            walk(lhs, f);
            walk(rhs, f);
        }
        Node::Func(_, args) => {
            for arg in args {
                walk(arg, f);
            }
        }
    }
}

/// Deep-copies `template`, replacing any reference to a formal macro
/// parameter `$N` with a reference to `fresh[N - 1]`. Every [`Node::Func`]
/// in the copy gets its own fresh context buffer, exactly like
/// [`Node::deep_copy`].
fn instantiate(template: &Node, env: &Environment, fresh: &[VarHandle]) -> Node {
    match template {
        Node::Const(v) => Node::Const(*v),
        Node::VarRef(h) => {
            if let Some(n) = macro_param_index(env.name(*h)) {
                if n >= 1 && n <= fresh.len() {
                    return Node::VarRef(fresh[n - 1]);
                }
            }
            Node::VarRef(*h)
        }
        Node::Unary(op, child) => Node::Unary(*op, Box::new(instantiate(child, env, fresh))),
        Node::Binary(op, lhs, rhs) => Node::Binary(
            *op,
            Box::new(instantiate(lhs, env, fresh)),
            Box::new(instantiate(rhs, env, fresh)),
        ),
        Node::Func(ctx, args) => {
            let fresh_ctx = FuncContext::new(ctx.descriptor().clone());
            let args = args.iter().map(|a| instantiate(a, env, fresh)).collect();
            Node::Func(fresh_ctx, args)
        }
    }
}
