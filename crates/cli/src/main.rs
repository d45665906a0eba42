use std::{env, fs, process::ExitCode, time::Instant};

use exprcalc_core::{eval, parse, Environment, FunctionRegistryBuilder, Node, Scalar};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let file_path = if args.len() > 1 { &args[1] } else { "example.expr" };
    let source = match fs::read_to_string(file_path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut env = Environment::new();
    let funcs = builtin_functions();

    let start = Instant::now();
    let tree = match parse(&source, &mut env, &funcs) {
        Ok(tree) => tree,
        Err(err) => {
            eprintln!("parse error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let result = eval(&tree, &mut env);
    let elapsed = start.elapsed();

    println!("{result}");
    eprintln!("time taken: {elapsed:?}");
    ExitCode::SUCCESS
}

/// A small demonstration library: enough for hosts to see how `invoke`,
/// argument evaluation order, and context buffers are meant to be used.
fn builtin_functions() -> exprcalc_core::FunctionRegistry {
    let mut builder = FunctionRegistryBuilder::new();
    builder.register("min", min_invoke, 0, None);
    builder.register("max", max_invoke, 0, None);
    builder.register("print", print_invoke, 0, None);
    builder.build()
}

fn min_invoke(args: &[Node], _ctx: &mut [u8], env: &mut Environment) -> Scalar {
    args.iter().map(|a| eval(a, env)).fold(Scalar::INFINITY, Scalar::min)
}

fn max_invoke(args: &[Node], _ctx: &mut [u8], env: &mut Environment) -> Scalar {
    args.iter().map(|a| eval(a, env)).fold(Scalar::NEG_INFINITY, Scalar::max)
}

fn print_invoke(args: &[Node], _ctx: &mut [u8], env: &mut Environment) -> Scalar {
    let mut last = 0.0;
    for arg in args {
        last = eval(arg, env);
        println!("{last}");
    }
    last
}
