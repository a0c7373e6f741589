use lambda_cps::{
    compiler::{ast::*, compile},
    options::{Options, USAGE},
    runtime::Machine,
};
use termcolor::{ColorChoice, StandardStream};

const PROGRAMS: &[(&str, &str)] = &[
    ("countdown", "tail-recursive loop from 100000 down to zero"),
    ("sum", "non-tail recursive sum of 1..10000"),
    ("fib", "doubly recursive fib(20)"),
    ("hello", "printing through native continuations"),
];

fn program(name: &str) -> Option<Node> {
    let n = || make_var("n");
    let minus = |k: f64| make_binary("-", make_var("n"), make_num(k));

    let ast = match name {
        "countdown" => make_call(
            make_lambda(
                Some("loop"),
                &["n"],
                make_if(
                    make_binary(">", n(), make_num(0.0)),
                    make_call(make_var("loop"), vec![minus(1.0)]),
                    Some(n()),
                ),
            ),
            vec![make_num(100000.0)],
        ),
        "sum" => make_call(
            make_lambda(
                Some("sum"),
                &["n"],
                make_if(
                    make_binary("==", n(), make_num(0.0)),
                    make_num(0.0),
                    Some(make_binary(
                        "+",
                        n(),
                        make_call(make_var("sum"), vec![minus(1.0)]),
                    )),
                ),
            ),
            vec![make_num(10000.0)],
        ),
        "fib" => make_call(
            make_lambda(
                Some("fib"),
                &["n"],
                make_if(
                    make_binary("<", n(), make_num(2.0)),
                    n(),
                    Some(make_binary(
                        "+",
                        make_call(make_var("fib"), vec![minus(1.0)]),
                        make_call(make_var("fib"), vec![minus(2.0)]),
                    )),
                ),
            ),
            vec![make_num(20.0)],
        ),
        "hello" => make_prog(vec![
            make_call(make_var("println"), vec![make_str("Hello, world!")]),
            make_call(
                make_var("println"),
                vec![
                    make_str("2 + 3 * 4 ="),
                    make_binary(
                        "+",
                        make_num(2.0),
                        make_binary("*", make_num(3.0), make_num(4.0)),
                    ),
                ],
            ),
            make_str("done"),
        ]),
        _ => return None,
    };

    Some(ast)
}

fn main() {
    env_logger::init();

    let options = match Options::parse() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };

    if options.help {
        println!("{}", USAGE);
        return;
    }

    if options.list {
        for (name, description) in PROGRAMS {
            println!("{:<10} {}", name, description);
        }
        return;
    }

    let name = options.program.as_deref().unwrap_or("countdown");
    let Some(ast) = program(name) else {
        eprintln!("unknown program `{}`, try --list", name);
        std::process::exit(2);
    };

    let compiled = match compile(ast, &options) {
        Ok(tree) => tree,
        Err(e) => {
            eprintln!("compile error: {}", e);
            std::process::exit(1);
        }
    };

    if options.dump {
        let mut out = StandardStream::stdout(ColorChoice::Auto);
        if let Err(e) = compiled.pretty_print(&mut out) {
            eprintln!("failed to dump tree: {}", e);
        }
        println!();
    }

    let mut machine = Machine::with_options(&options);
    machine.set_echo(true);
    match machine.run(&compiled) {
        Ok(value) => {
            let stats = machine.stats();
            println!(">returned: {}", value);
            println!(
                "bounces: {}, guarded entries: {}, max depth: {} (budget {})",
                stats.bounces,
                stats.guarded_entries,
                stats.max_depth,
                machine.budget()
            );
        }
        Err(e) => {
            eprintln!("runtime error: {}", e);
            std::process::exit(1);
        }
    }
}
