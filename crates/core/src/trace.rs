//! Evaluation tracing.
//!
//! Mirrors the bytecode VM's tracer design: a trait with no-op default
//! methods so a caller that doesn't want tracing pays nothing for it, and a
//! handful of concrete implementations for the callers that do. The engine
//! never depends on a logging crate — a host embeds its own tracer instead,
//! the same way it embeds its own function registry.

use crate::environment::VarHandle;
use crate::expr::{BinaryOp, UnaryOp};
use crate::numeric::Scalar;

/// Hook points visited during evaluation of a parsed tree.
///
/// All methods default to doing nothing, so implementing just one or two is
/// enough to observe a specific kind of event.
pub trait EvalTracer: std::fmt::Debug {
    /// Called before a constant or variable reference is read.
    #[inline(always)]
    fn on_leaf(&mut self, _value: Scalar) {}

    /// Called after a unary operator has been applied.
    #[inline(always)]
    fn on_unary(&mut self, _op: UnaryOp, _operand: Scalar, _result: Scalar) {}

    /// Called after a binary operator has been applied. Not called for `&&`
    /// or `||` when short-circuiting skipped the right operand.
    #[inline(always)]
    fn on_binary(&mut self, _op: BinaryOp, _lhs: Scalar, _rhs: Scalar, _result: Scalar) {}

    /// Called whenever a variable is written, whether by `=` or by a host
    /// function that mutates the environment directly.
    #[inline(always)]
    fn on_assign(&mut self, _handle: VarHandle, _value: Scalar) {}

    /// Called immediately before a function's `invoke` runs.
    #[inline(always)]
    fn on_function_call(&mut self, _name: &str, _depth: usize) {}
}

/// Zero-cost tracer: every method is empty and should compile away entirely
/// once the evaluator is monomorphized or inlined against it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl EvalTracer for NoopTracer {}

/// Writes a human-readable line to stderr for every hook, capped at `limit`
/// lines so a runaway loop in traced code doesn't flood the terminal.
#[derive(Debug)]
pub struct StderrTracer {
    limit: Option<usize>,
    emitted: usize,
}

impl StderrTracer {
    #[must_use]
    pub fn new() -> Self {
        Self { limit: None, emitted: 0 }
    }

    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self { limit: Some(limit), emitted: 0 }
    }

    fn allow(&mut self) -> bool {
        match self.limit {
            Some(limit) if self.emitted >= limit => false,
            _ => {
                self.emitted += 1;
                true
            }
        }
    }
}

impl Default for StderrTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl EvalTracer for StderrTracer {
    fn on_unary(&mut self, op: UnaryOp, operand: Scalar, result: Scalar) {
        if self.allow() {
            eprintln!("{op:?} {operand} -> {result}");
        }
    }

    fn on_binary(&mut self, op: BinaryOp, lhs: Scalar, rhs: Scalar, result: Scalar) {
        if self.allow() {
            eprintln!("{lhs} {op:?} {rhs} -> {result}");
        }
    }

    fn on_assign(&mut self, handle: VarHandle, value: Scalar) {
        if self.allow() {
            eprintln!("{handle:?} := {value}");
        }
    }

    fn on_function_call(&mut self, name: &str, depth: usize) {
        if self.allow() {
            eprintln!("call {name} (depth {depth})");
        }
    }
}

/// Records every event in order, for tests or post-mortem inspection.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    pub events: Vec<String>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EvalTracer for RecordingTracer {
    fn on_binary(&mut self, op: BinaryOp, lhs: Scalar, rhs: Scalar, result: Scalar) {
        self.events.push(format!("{lhs} {op:?} {rhs} -> {result}"));
    }

    fn on_assign(&mut self, handle: VarHandle, value: Scalar) {
        self.events.push(format!("{handle:?} := {value}"));
    }

    fn on_function_call(&mut self, name: &str, depth: usize) {
        self.events.push(format!("call {name} @{depth}"));
    }
}
