//! Two evaluators over the same tree, kept deliberately interchangeable.
//!
//! [`eval`] walks the tree with ordinary Rust recursion; it is the reference
//! implementation and the one used internally by [`crate::function::FuncContext::invoke`]
//! for evaluating a function's argument subtrees. [`eval_stack`] computes the
//! same result with an explicit work stack instead of the host call stack, so
//! a caller worried about adversarially deep trees (untrusted expression
//! text, say) can use it without a stack-overflow risk. Both must agree on
//! every input, including short-circuiting `&&`/`||` — an explicit-stack
//! rewrite is an easy place to accidentally eagerly evaluate both sides, and
//! the two evaluators are exercised against each other in tests for exactly
//! that reason.

use crate::environment::Environment;
use crate::expr::{BinaryOp, Node, UnaryOp};
use crate::numeric::{to_int, Scalar};
use crate::trace::EvalTracer;

/// Evaluates `node` against `env` using ordinary recursion.
#[must_use]
pub fn eval(node: &Node, env: &mut Environment) -> Scalar {
    match node {
        Node::Const(v) => *v,
        Node::VarRef(h) => env.value(*h),
        Node::Unary(op, child) => apply_unary(*op, eval(child, env)),
        Node::Binary(BinaryOp::And, lhs, rhs) => {
            let l = eval(lhs, env);
            if l == 0.0 {
                0.0
            } else {
                eval(rhs, env)
            }
        }
        Node::Binary(BinaryOp::Or, lhs, rhs) => {
            let l = eval(lhs, env);
            if l != 0.0 && !l.is_nan() {
                l
            } else {
                let r = eval(rhs, env);
                if r != 0.0 {
                    r
                } else {
                    0.0
                }
            }
        }
        Node::Binary(BinaryOp::Assign, lhs, rhs) => {
            let handle = assign_target(lhs);
            let value = eval(rhs, env);
            env.set(handle, value);
            value
        }
        Node::Binary(BinaryOp::Comma, lhs, rhs) => {
            eval(lhs, env);
            eval(rhs, env)
        }
        Node::Binary(op, lhs, rhs) => {
            let l = eval(lhs, env);
            let r = eval(rhs, env);
            apply_binary(*op, l, r)
        }
        Node::Func(ctx, args) => ctx.invoke(args, env),
    }
}

/// Evaluates `node` against `env` with an explicit work stack in place of
/// host recursion. Semantically identical to [`eval`], including
/// short-circuit evaluation of `&&`/`||`.
#[must_use]
pub fn eval_stack(root: &Node, env: &mut Environment) -> Scalar {
    enum Task<'a> {
        Eval(&'a Node),
        Discard,
        FinishUnary(UnaryOp),
        FinishBinary(BinaryOp),
        FinishAssign(crate::environment::VarHandle),
        AndRhs(&'a Node),
        OrRhs(&'a Node),
        OrFallback,
    }

    let mut tasks = vec![Task::Eval(root)];
    let mut values: Vec<Scalar> = Vec::new();

    while let Some(task) = tasks.pop() {
        match task {
            Task::Eval(node) => match node {
                Node::Const(v) => values.push(*v),
                Node::VarRef(h) => values.push(env.value(*h)),
                Node::Unary(op, child) => {
                    tasks.push(Task::FinishUnary(*op));
                    tasks.push(Task::Eval(child));
                }
                Node::Binary(BinaryOp::And, lhs, rhs) => {
                    tasks.push(Task::AndRhs(rhs));
                    tasks.push(Task::Eval(lhs));
                }
                Node::Binary(BinaryOp::Or, lhs, rhs) => {
                    tasks.push(Task::OrRhs(rhs));
                    tasks.push(Task::Eval(lhs));
                }
                Node::Binary(BinaryOp::Assign, lhs, rhs) => {
                    tasks.push(Task::FinishAssign(assign_target(lhs)));
                    tasks.push(Task::Eval(rhs));
                }
                Node::Binary(BinaryOp::Comma, lhs, rhs) => {
                    tasks.push(Task::Eval(rhs));
                    tasks.push(Task::Discard);
                    tasks.push(Task::Eval(lhs));
                }
                Node::Binary(op, lhs, rhs) => {
                    tasks.push(Task::FinishBinary(*op));
                    tasks.push(Task::Eval(rhs));
                    tasks.push(Task::Eval(lhs));
                }
                Node::Func(ctx, args) => values.push(ctx.invoke(args, env)),
            },
            Task::Discard => {
                values.pop().expect("discard with no value pending");
            }
            Task::FinishUnary(op) => {
                let v = values.pop().expect("unary operand not evaluated");
                values.push(apply_unary(op, v));
            }
            Task::FinishBinary(op) => {
                let r = values.pop().expect("binary rhs not evaluated");
                let l = values.pop().expect("binary lhs not evaluated");
                values.push(apply_binary(op, l, r));
            }
            Task::FinishAssign(handle) => {
                let v = values.pop().expect("assign rhs not evaluated");
                env.set(handle, v);
                values.push(v);
            }
            Task::AndRhs(rhs) => {
                let lhs_val = values.pop().expect("&& lhs not evaluated");
                if lhs_val == 0.0 {
                    values.push(0.0);
                } else {
                    tasks.push(Task::Eval(rhs));
                }
            }
            Task::OrRhs(rhs) => {
                let lhs_val = values.pop().expect("|| lhs not evaluated");
                if lhs_val != 0.0 && !lhs_val.is_nan() {
                    values.push(lhs_val);
                } else {
                    tasks.push(Task::OrFallback);
                    tasks.push(Task::Eval(rhs));
                }
            }
            Task::OrFallback => {
                let rhs_val = values.pop().expect("|| rhs not evaluated");
                values.push(if rhs_val != 0.0 { rhs_val } else { 0.0 });
            }
        }
    }

    values.pop().expect("evaluation left no result on the stack")
}

/// Like [`eval`], but reports every leaf read, operator application, and
/// assignment to `tracer` as it goes. Slower than [`eval`]; meant for
/// debugging sessions, not hot loops.
pub fn eval_traced(node: &Node, env: &mut Environment, tracer: &mut impl EvalTracer) -> Scalar {
    match node {
        Node::Const(v) => {
            tracer.on_leaf(*v);
            *v
        }
        Node::VarRef(h) => {
            let v = env.value(*h);
            tracer.on_leaf(v);
            v
        }
        Node::Unary(op, child) => {
            let operand = eval_traced(child, env, tracer);
            let result = apply_unary(*op, operand);
            tracer.on_unary(*op, operand, result);
            result
        }
        Node::Binary(BinaryOp::And, lhs, rhs) => {
            let l = eval_traced(lhs, env, tracer);
            let result = if l == 0.0 { 0.0 } else { eval_traced(rhs, env, tracer) };
            tracer.on_binary(BinaryOp::And, l, result, result);
            result
        }
        Node::Binary(BinaryOp::Or, lhs, rhs) => {
            let l = eval_traced(lhs, env, tracer);
            let result = if l != 0.0 && !l.is_nan() {
                l
            } else {
                let r = eval_traced(rhs, env, tracer);
                if r != 0.0 {
                    r
                } else {
                    0.0
                }
            };
            tracer.on_binary(BinaryOp::Or, l, result, result);
            result
        }
        Node::Binary(BinaryOp::Assign, lhs, rhs) => {
            let handle = assign_target(lhs);
            let value = eval_traced(rhs, env, tracer);
            env.set(handle, value);
            tracer.on_assign(handle, value);
            value
        }
        Node::Binary(BinaryOp::Comma, lhs, rhs) => {
            eval_traced(lhs, env, tracer);
            eval_traced(rhs, env, tracer)
        }
        Node::Binary(op, lhs, rhs) => {
            let l = eval_traced(lhs, env, tracer);
            let r = eval_traced(rhs, env, tracer);
            let result = apply_binary(*op, l, r);
            tracer.on_binary(*op, l, r, result);
            result
        }
        Node::Func(ctx, args) => {
            tracer.on_function_call(&ctx.descriptor().name, 0);
            ctx.invoke(args, env)
        }
    }
}

fn assign_target(lhs: &Node) -> crate::environment::VarHandle {
    match lhs {
        Node::VarRef(h) => *h,
        _ => unreachable!("the parser never produces an assignment with a non-variable left side"),
    }
}

fn bool_scalar(b: bool) -> Scalar {
    if b {
        1.0
    } else {
        0.0
    }
}

fn apply_unary(op: UnaryOp, v: Scalar) -> Scalar {
    match op {
        UnaryOp::Neg => -v,
        UnaryOp::Not => bool_scalar(v == 0.0),
        UnaryOp::BitNot => !to_int(v) as Scalar,
    }
}

/// Applies every binary operator except the four with evaluation-order or
/// side-effect semantics (`&&`, `||`, `=`, `,`), which both evaluators
/// intercept before their operands reach this function.
fn apply_binary(op: BinaryOp, l: Scalar, r: Scalar) -> Scalar {
    match op {
        BinaryOp::Pow => l.powf(r),
        BinaryOp::Mul => l * r,
        BinaryOp::Div => l / r,
        BinaryOp::Rem => l % r,
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Shl => (to_int(l) << (to_int(r) & 31)) as Scalar,
        BinaryOp::Shr => (to_int(l) >> (to_int(r) & 31)) as Scalar,
        BinaryOp::Lt => bool_scalar(l < r),
        BinaryOp::Le => bool_scalar(l <= r),
        BinaryOp::Gt => bool_scalar(l > r),
        BinaryOp::Ge => bool_scalar(l >= r),
        BinaryOp::Eq => bool_scalar(l == r),
        BinaryOp::Ne => bool_scalar(l != r),
        BinaryOp::BitAnd => (to_int(l) & to_int(r)) as Scalar,
        BinaryOp::BitOr => (to_int(l) | to_int(r)) as Scalar,
        BinaryOp::BitXor => (to_int(l) ^ to_int(r)) as Scalar,
        BinaryOp::And | BinaryOp::Or | BinaryOp::Assign | BinaryOp::Comma => {
            unreachable!("short-circuit and assignment operators bypass apply_binary")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinaryOp, Node, UnaryOp};

    fn leaf(v: Scalar) -> Node {
        Node::Const(v)
    }

    fn bin(op: BinaryOp, l: Node, r: Node) -> Node {
        Node::Binary(op, Box::new(l), Box::new(r))
    }

    #[test]
    fn both_evaluators_agree_on_arithmetic() {
        let mut env = Environment::new();
        let tree = bin(BinaryOp::Add, leaf(1.0), bin(BinaryOp::Mul, leaf(2.0), leaf(3.0)));
        assert_eq!(eval(&tree, &mut env), 7.0);
        assert_eq!(eval_stack(&tree, &mut env), 7.0);
    }

    #[test]
    fn and_short_circuits_without_evaluating_rhs() {
        let mut env = Environment::new();
        let handle = env.lookup_or_create("touched").unwrap();
        let side_effect = bin(BinaryOp::Assign, Node::VarRef(handle), leaf(1.0));
        let tree = bin(BinaryOp::And, leaf(0.0), side_effect);
        assert_eq!(eval(&tree, &mut env), 0.0);
        assert_eq!(env.value(handle), 0.0, "rhs must not run when lhs is falsy");
    }

    #[test]
    fn or_short_circuits_without_evaluating_rhs() {
        let mut env = Environment::new();
        let handle = env.lookup_or_create("touched").unwrap();
        let side_effect = bin(BinaryOp::Assign, Node::VarRef(handle), leaf(1.0));
        let tree = bin(BinaryOp::Or, leaf(1.0), side_effect);
        assert_eq!(eval(&tree, &mut env), 1.0);
        assert_eq!(env.value(handle), 0.0, "rhs must not run when lhs is truthy");
    }

    #[test]
    fn stack_evaluator_also_short_circuits() {
        let mut env = Environment::new();
        let handle = env.lookup_or_create("touched").unwrap();
        let side_effect = bin(BinaryOp::Assign, Node::VarRef(handle), leaf(1.0));
        let tree = bin(BinaryOp::And, leaf(0.0), side_effect);
        assert_eq!(eval_stack(&tree, &mut env), 0.0);
        assert_eq!(env.value(handle), 0.0);
    }

    #[test]
    fn comma_discards_left_keeps_right() {
        let mut env = Environment::new();
        let tree = bin(BinaryOp::Comma, leaf(100.0), leaf(2.0));
        assert_eq!(eval(&tree, &mut env), 2.0);
        assert_eq!(eval_stack(&tree, &mut env), 2.0);
    }

    #[test]
    fn assign_writes_through_and_returns_value() {
        let mut env = Environment::new();
        let handle = env.lookup_or_create("x").unwrap();
        let tree = bin(BinaryOp::Assign, Node::VarRef(handle), leaf(5.0));
        assert_eq!(eval(&tree, &mut env), 5.0);
        assert_eq!(env.value(handle), 5.0);
    }

    #[test]
    fn greater_than_is_not_dropped_like_the_known_bug() {
        let mut env = Environment::new();
        let tree = bin(BinaryOp::Gt, leaf(3.0), leaf(2.0));
        assert_eq!(eval(&tree, &mut env), 1.0);
        assert_eq!(eval_stack(&tree, &mut env), 1.0);
    }

    #[test]
    fn unary_not_and_bitnot() {
        let mut env = Environment::new();
        assert_eq!(eval(&Node::Unary(UnaryOp::Not, Box::new(leaf(0.0))), &mut env), 1.0);
        assert_eq!(eval(&Node::Unary(UnaryOp::Not, Box::new(leaf(5.0))), &mut env), 0.0);
        assert_eq!(eval(&Node::Unary(UnaryOp::BitNot, Box::new(leaf(0.0))), &mut env), -1.0);
    }

    #[test]
    fn traced_eval_records_binary_operations() {
        use crate::trace::RecordingTracer;
        let mut env = Environment::new();
        let mut tracer = RecordingTracer::new();
        let tree = bin(BinaryOp::Add, leaf(1.0), leaf(2.0));
        assert_eq!(eval_traced(&tree, &mut env, &mut tracer), 3.0);
        assert_eq!(tracer.events.len(), 1);
    }

    #[test]
    fn and_or_pass_through_operand_values_rather_than_booleanizing() {
        let mut env = Environment::new();
        let and_tree = bin(BinaryOp::And, leaf(3.0), leaf(5.0));
        assert_eq!(eval(&and_tree, &mut env), 5.0, "&& yields rhs's own value, not 1.0");
        assert_eq!(eval_stack(&and_tree, &mut env), 5.0);

        let or_truthy = bin(BinaryOp::Or, leaf(5.0), leaf(0.0));
        assert_eq!(eval(&or_truthy, &mut env), 5.0, "|| yields lhs's own value, not 1.0");
        assert_eq!(eval_stack(&or_truthy, &mut env), 5.0);

        let or_falls_through = bin(BinaryOp::Or, leaf(0.0), leaf(3.0));
        assert_eq!(eval(&or_falls_through, &mut env), 3.0);
        assert_eq!(eval_stack(&or_falls_through, &mut env), 3.0);

        let or_both_zero = bin(BinaryOp::Or, leaf(0.0), leaf(0.0));
        assert_eq!(eval(&or_both_zero, &mut env), 0.0);
        assert_eq!(eval_stack(&or_both_zero, &mut env), 0.0);
    }

    #[test]
    fn or_treats_nan_left_operand_as_falsy() {
        let mut env = Environment::new();
        let tree = bin(BinaryOp::Or, leaf(Scalar::NAN), leaf(7.0));
        assert_eq!(eval(&tree, &mut env), 7.0, "NaN lhs must fall through to rhs, not be returned as-is");
        assert_eq!(eval_stack(&tree, &mut env), 7.0);
    }

    #[test]
    fn shift_amount_is_masked_to_avoid_panicking() {
        let mut env = Environment::new();
        let tree = bin(BinaryOp::Shl, leaf(1.0), leaf(40.0));
        assert_eq!(eval(&tree, &mut env), eval_stack(&tree, &mut env));
    }
}
