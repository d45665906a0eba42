//! An embeddable arithmetic/logic expression engine.
//!
//! A host registers variables and functions, hands a line of text to
//! [`parser::parse`], and gets back a [`expr::Node`] tree it can evaluate
//! ([`eval::eval`] or [`eval::eval_stack`]) as many times as it likes against
//! whatever [`environment::Environment`] it chooses — typically the same one
//! the parse ran against, so assignments and prior variable values carry
//! forward, but any environment with the same variables registered will do.
#![expect(clippy::float_cmp, reason = "the language's own equality operator is exact float comparison")]

pub mod environment;
pub mod eval;
pub mod expr;
pub mod function;
pub mod lex;
pub mod numeric;
pub mod parser;
pub mod resource;
pub mod trace;

pub use crate::environment::{Environment, VarHandle};
pub use crate::eval::{eval, eval_stack, eval_traced};
pub use crate::expr::{BinaryOp, Node, UnaryOp};
pub use crate::function::{CleanupFn, FuncContext, FunctionDescriptor, FunctionRegistry, FunctionRegistryBuilder, InvokeFn};
pub use crate::lex::{LexError, Token, Tokenizer};
pub use crate::numeric::{to_int, Scalar};
pub use crate::parser::{parse, parse_with_limits, ParseError};
pub use crate::resource::{DepthGuard, Limits, ResourceError};
pub use crate::trace::{EvalTracer, NoopTracer, RecordingTracer, StderrTracer};
