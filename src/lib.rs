//! A small expression-language compiler that lowers a direct-style tree to
//! continuation-passing style, rewrites the result to a normal form and runs it under a
//! stack-bounded trampoline.
//!
//! ```
//! use lambda_cps::{compiler::{ast::*, compile}, options::Options, runtime::{Machine, Value}};
//!
//! let options = Options::new();
//! let ast = make_binary("+", make_num(2.0), make_binary("*", make_num(3.0), make_num(4.0)));
//! let program = compile(ast, &options).unwrap();
//!
//! let mut machine = Machine::with_options(&options);
//! assert_eq!(machine.run(&program).unwrap(), Value::Num(14.0));
//! ```

pub mod compiler;
pub mod error;
pub mod options;
pub mod runtime;
