//! End-to-end parse-and-evaluate checks against the public API, covering the
//! boundary behaviors and error cases a host is most likely to hit.

use exprcalc_core::{eval, eval_stack, parse, Environment, FunctionRegistryBuilder, Node, ParseError, Scalar};
use pretty_assertions::assert_eq;

fn run(src: &str) -> Result<Scalar, ParseError> {
    let mut env = Environment::new();
    let funcs = FunctionRegistryBuilder::new().build();
    let tree = parse(src, &mut env, &funcs)?;
    Ok(eval(&tree, &mut env))
}

fn run_both(src: &str) -> (Scalar, Scalar) {
    let mut env = Environment::new();
    let funcs = FunctionRegistryBuilder::new().build();
    let tree = parse(src, &mut env, &funcs).unwrap();
    let a = eval(&tree, &mut env);
    let b = eval_stack(&tree, &mut env);
    (a, b)
}

#[test]
fn operator_precedence_matches_conventional_math() {
    assert_eq!(run("2 + 3 * 4").unwrap(), 14.0);
    assert_eq!(run("(2 + 3) * 4").unwrap(), 20.0);
    assert_eq!(run("2 * 3 + 4 * 5").unwrap(), 26.0);
}

#[test]
fn comparisons_and_logic_compose() {
    assert_eq!(run("1 < 2 && 3 > 2").unwrap(), 1.0);
    assert_eq!(run("1 > 2 || 3 > 2").unwrap(), 1.0);
    assert_eq!(run("1 > 2 && 3 > 2").unwrap(), 0.0);
}

#[test]
fn logic_operators_yield_operand_values_not_booleans() {
    assert_eq!(run("0 && (1 / 0)").unwrap(), 0.0, "rhs must not be evaluated, so no infinity leaks out");
    assert_eq!(run("5 || 0").unwrap(), 5.0);
    assert_eq!(run("0 || 3").unwrap(), 3.0);
    assert_eq!(run("0 || 0").unwrap(), 0.0);
}

#[test]
fn bitwise_operators_round_trip_through_to_int() {
    assert_eq!(run("5 & 3").unwrap(), 1.0);
    assert_eq!(run("5 | 2").unwrap(), 7.0);
    assert_eq!(run("5 ^ 1").unwrap(), 4.0);
    assert_eq!(run("1 << 4").unwrap(), 16.0);
    assert_eq!(run("256 >> 4").unwrap(), 16.0);
}

#[test]
fn recursive_and_stack_evaluators_agree_on_a_mixed_tree() {
    let (a, b) = run_both("(1 + 2 * 3 - 4 / 2) ** 2 & 15 | (1 && 0)");
    assert_eq!(a, b);
}

#[test]
fn nan_comparisons_are_all_false_in_both_evaluators() {
    let mut env = Environment::new();
    let funcs = FunctionRegistryBuilder::new().build();
    let tree = parse("x == x", &mut env, &funcs).unwrap();
    env.set(env.get_handle("x").unwrap(), Scalar::NAN);
    assert_eq!(eval(&tree, &mut env), 0.0);
    assert_eq!(eval_stack(&tree, &mut env), 0.0);
}

#[test]
fn every_documented_parser_error_fires_on_its_example() {
    assert!(matches!(run("2 3"), Err(ParseError::UnexpectedNumber(_))));
    assert!(matches!(run("x y"), Err(ParseError::UnexpectedWord(_))));
    assert!(matches!(run("2 +"), Err(ParseError::MissingOperand(_))));
    assert!(matches!(run("(1 + 2"), Err(ParseError::MismatchedParen(_))));
    assert!(matches!(run("1 = 2"), Err(ParseError::BadAssignment(_))));
    assert!(matches!(run("2(3)"), Err(ParseError::BadCall(_))));
}

#[test]
fn functions_see_unevaluated_arguments_and_choose_what_to_run() {
    fn first_truthy(args: &[Node], _ctx: &mut [u8], env: &mut exprcalc_core::Environment) -> Scalar {
        for arg in args {
            let v = eval(arg, env);
            if v != 0.0 {
                return v;
            }
        }
        0.0
    }
    let mut env = Environment::new();
    let mut builder = FunctionRegistryBuilder::new();
    builder.register("first_truthy", first_truthy, 0, None);
    let funcs = builder.build();
    let tree = parse("first_truthy(0, 0, 7, 0)", &mut env, &funcs).unwrap();
    assert_eq!(eval(&tree, &mut env), 7.0);
}

#[test]
fn function_context_persists_across_calls_at_the_same_site() {
    fn counter(_args: &[Node], ctx: &mut [u8], _env: &mut exprcalc_core::Environment) -> Scalar {
        let count = u32::from_le_bytes(ctx.try_into().unwrap());
        let next = count + 1;
        ctx.copy_from_slice(&next.to_le_bytes());
        next as Scalar
    }
    let mut env = Environment::new();
    let mut builder = FunctionRegistryBuilder::new();
    builder.register("counter", counter, 4, None);
    let funcs = builder.build();
    let tree = parse("counter()", &mut env, &funcs).unwrap();
    assert_eq!(eval(&tree, &mut env), 1.0);
    assert_eq!(eval(&tree, &mut env), 2.0);
    assert_eq!(eval(&tree, &mut env), 3.0);
}

#[test]
fn division_by_zero_follows_ieee_signed_infinities() {
    assert_eq!(run("1 / 0").unwrap(), Scalar::INFINITY);
    assert_eq!(run("-1 / 0").unwrap(), Scalar::NEG_INFINITY);
    assert!(run("0 / 0").unwrap().is_nan());
}

#[test]
fn bitwise_not_truncates_then_complements() {
    // ~2.7 == ~to_int(2.7) == ~2 == -3
    assert_eq!(run("^2.7").unwrap(), -3.0);
}

#[test]
fn shift_of_a_saturated_infinity_matches_int_max_numerically() {
    assert_eq!(run("(1 / 0) << 2").unwrap(), ((i32::MAX) << 2) as Scalar);
}

#[test]
fn number_text_round_trips_through_parse_and_eval_below_f32_mantissa_bound() {
    for n in [0_i32, 1, -1, 42, -42, 1000, 8_388_607] {
        let src = n.to_string();
        assert_eq!(run(&src).unwrap(), n as Scalar, "round trip failed for {n}");
    }
}

#[test]
fn addition_is_commutative_for_finite_variable_values() {
    let mut env_ab = Environment::new();
    let funcs = FunctionRegistryBuilder::new().build();
    let tree_ab = parse("a + b", &mut env_ab, &funcs).unwrap();
    let a = env_ab.get_handle("a").unwrap();
    let b = env_ab.get_handle("b").unwrap();
    env_ab.set(a, 3.0);
    env_ab.set(b, 4.0);

    let mut env_ba = Environment::new();
    let tree_ba = parse("b + a", &mut env_ba, &funcs).unwrap();
    let a2 = env_ba.get_handle("a").unwrap();
    let b2 = env_ba.get_handle("b").unwrap();
    env_ba.set(a2, 3.0);
    env_ba.set(b2, 4.0);

    assert_eq!(eval(&tree_ab, &mut env_ab), eval(&tree_ba, &mut env_ba));
}

#[test]
fn repeated_eval_of_a_pure_expression_is_idempotent() {
    let mut env = Environment::new();
    let funcs = FunctionRegistryBuilder::new().build();
    let tree = parse("2 + 3 * 4", &mut env, &funcs).unwrap();
    let first = eval(&tree, &mut env);
    let second = eval(&tree, &mut env);
    assert_eq!(first, second);
}

#[test]
fn assignment_chains_right_to_left() {
    let mut env = Environment::new();
    let funcs = FunctionRegistryBuilder::new().build();
    let tree = parse("x = y = 3", &mut env, &funcs).unwrap();
    assert_eq!(eval(&tree, &mut env), 3.0);
    assert_eq!(env.value(env.get_handle("x").unwrap()), 3.0);
    assert_eq!(env.value(env.get_handle("y").unwrap()), 3.0);
}
