//! Shared helpers: running programs through the pipeline, and a direct-style
//! evaluator used as the reference semantics.

#![allow(dead_code)]

use std::{collections::HashMap, fmt, rc::Rc};

use lambda_cps::{
    compiler::{ast::*, compile},
    error::{CompileError, RuntimeError},
    options::Options,
    runtime::{Machine, Stats, Value},
};

/// Owned view of a final value.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Num(f64),
    Str(String),
    Bool(bool),
    Function,
}

impl From<&Value<'_>> for Outcome {
    fn from(value: &Value<'_>) -> Self {
        match value {
            Value::Num(x) => Outcome::Num(*x),
            Value::Str(s) => Outcome::Str(s.to_string()),
            Value::Bool(b) => Outcome::Bool(*b),
            Value::Closure(_) | Value::Native(_) => Outcome::Function,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum Failure {
    Compile(CompileError),
    Runtime(RuntimeError),
}

#[derive(Debug)]
pub struct Run {
    pub value: Outcome,
    pub stats: Stats,
    pub output: String,
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn options(optimize: bool) -> Options {
    let mut options = Options::new();
    options.set_optimize(optimize);
    options
}

/// Runs an already compiled tree.
pub fn execute(program: &Node, options: &Options) -> Result<Run, Failure> {
    let mut machine = Machine::with_options(options);
    let value = machine.run(program).map_err(Failure::Runtime)?;
    Ok(Run {
        value: Outcome::from(&value),
        stats: machine.stats(),
        output: machine.output().to_owned(),
    })
}

pub fn run(ast: Node, options: &Options) -> Result<Run, Failure> {
    init_logging();
    let program = compile(ast, options).map_err(Failure::Compile)?;
    execute(&program, options)
}

pub fn run_value(ast: Node, optimize: bool) -> Outcome {
    match run(ast, &options(optimize)) {
        Ok(run) => run.value,
        Err(failure) => panic!("program failed: {:?}", failure),
    }
}

#[derive(Clone)]
enum Direct {
    Num(f64),
    Str(String),
    Bool(bool),
    Closure(Rc<(Lambda, Env)>),
    /// `print` or `println`, flagged by whether a newline follows.
    Printer(bool),
}

impl fmt::Display for Direct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direct::Num(x) => write!(f, "{}", x),
            Direct::Str(s) => write!(f, "{}", s),
            Direct::Bool(b) => write!(f, "{}", b),
            Direct::Closure(_) | Direct::Printer(_) => write!(f, "#<function>"),
        }
    }
}

type Env = Rc<Scope>;

struct Scope {
    vars: std::cell::RefCell<HashMap<String, Direct>>,
    parent: Option<Env>,
}

fn extend(parent: &Env) -> Env {
    Rc::new(Scope {
        vars: Default::default(),
        parent: Some(parent.clone()),
    })
}

fn lookup(env: &Env, name: &str) -> Option<Direct> {
    let mut current = Some(env.clone());
    while let Some(scope) = current {
        if let Some(value) = scope.vars.borrow().get(name) {
            return Some(value.clone());
        }
        current = scope.parent.clone();
    }
    None
}

fn truthy(value: &Direct) -> bool {
    !matches!(value, Direct::Bool(false))
}

/// Reference evaluator over direct-style trees. Returns `None` on any error.
pub fn eval_direct(ast: &Node) -> Option<Outcome> {
    eval_direct_with_output(ast).map(|(value, _)| value)
}

/// Like [`eval_direct`], also returning what `print`/`println` wrote.
pub fn eval_direct_with_output(ast: &Node) -> Option<(Outcome, String)> {
    let global = Rc::new(Scope {
        vars: Default::default(),
        parent: None,
    });
    global
        .vars
        .borrow_mut()
        .insert("print".to_owned(), Direct::Printer(false));
    global
        .vars
        .borrow_mut()
        .insert("println".to_owned(), Direct::Printer(true));

    let mut reference = Reference {
        output: String::new(),
    };
    let value = match reference.eval(ast, &global)? {
        Direct::Num(x) => Outcome::Num(x),
        Direct::Str(s) => Outcome::Str(s),
        Direct::Bool(b) => Outcome::Bool(b),
        Direct::Closure(_) | Direct::Printer(_) => Outcome::Function,
    };
    Some((value, reference.output))
}

struct Reference {
    output: String,
}

impl Reference {
    fn eval(&mut self, node: &Node, env: &Env) -> Option<Direct> {
        Some(match node {
            Node::Num(x) => Direct::Num(*x),
            Node::Str(s) => Direct::Str(s.clone()),
            Node::Bool(b) => Direct::Bool(*b),
            Node::Raw(_) => return None,
            Node::Var(var) => lookup(env, &var.name)?,
            Node::Not(body) => Direct::Bool(!truthy(&self.eval(body, env)?)),
            Node::Binary(binary) => {
                let left = self.eval(&binary.left, env)?;
                match binary.operator.as_str() {
                    "&&" if !truthy(&left) => return Some(Direct::Bool(false)),
                    "&&" => return self.eval(&binary.right, env),
                    "||" if truthy(&left) => return Some(left),
                    "||" => return self.eval(&binary.right, env),
                    _ => {}
                }
                let right = self.eval(&binary.right, env)?;
                match (binary.operator.as_str(), left, right) {
                    ("+", Direct::Num(x), Direct::Num(y)) => Direct::Num(x + y),
                    ("-", Direct::Num(x), Direct::Num(y)) => Direct::Num(x - y),
                    ("*", Direct::Num(x), Direct::Num(y)) => Direct::Num(x * y),
                    ("<", Direct::Num(x), Direct::Num(y)) => Direct::Bool(x < y),
                    (">", Direct::Num(x), Direct::Num(y)) => Direct::Bool(x > y),
                    ("<=", Direct::Num(x), Direct::Num(y)) => Direct::Bool(x <= y),
                    (">=", Direct::Num(x), Direct::Num(y)) => Direct::Bool(x >= y),
                    ("==", Direct::Num(x), Direct::Num(y)) => Direct::Bool(x == y),
                    ("!=", Direct::Num(x), Direct::Num(y)) => Direct::Bool(x != y),
                    ("==", Direct::Bool(x), Direct::Bool(y)) => Direct::Bool(x == y),
                    ("!=", Direct::Bool(x), Direct::Bool(y)) => Direct::Bool(x != y),
                    _ => return None,
                }
            }
            Node::Assign(assign) => {
                let name = &assign.left.var()?.name;
                let value = self.eval(&assign.right, env)?;
                let mut current = Some(env.clone());
                while let Some(scope) = current {
                    if scope.vars.borrow().contains_key(name) || scope.parent.is_none() {
                        scope.vars.borrow_mut().insert(name.clone(), value.clone());
                        break;
                    }
                    current = scope.parent.clone();
                }
                value
            }
            Node::Let(let_) => {
                let mut scope = env.clone();
                for binding in &let_.bindings {
                    let value = match &binding.init {
                        Some(init) => self.eval(init, &scope)?,
                        None => Direct::Bool(false),
                    };
                    scope = extend(&scope);
                    scope.vars.borrow_mut().insert(binding.name.clone(), value);
                }
                self.eval(&let_.body, &scope)?
            }
            Node::Lambda(lambda) => Direct::Closure(Rc::new((lambda.clone(), env.clone()))),
            Node::If(if_) => {
                if truthy(&self.eval(&if_.cond, env)?) {
                    self.eval(&if_.then, env)?
                } else {
                    match &if_.otherwise {
                        Some(otherwise) => self.eval(otherwise, env)?,
                        None => Direct::Bool(false),
                    }
                }
            }
            Node::Prog(prog) => {
                let mut last = Direct::Bool(false);
                for node in prog {
                    last = self.eval(node, env)?;
                }
                last
            }
            Node::Call(call) => {
                let callee = self.eval(&call.func, env)?;
                let mut args = Vec::with_capacity(call.args.len());
                for arg in &call.args {
                    args.push(self.eval(arg, env)?);
                }
                match callee {
                    Direct::Printer(newline) => {
                        let text = args
                            .iter()
                            .map(|arg| arg.to_string())
                            .collect::<Vec<_>>()
                            .join(" ");
                        self.output.push_str(&text);
                        if newline {
                            self.output.push('\n');
                        }
                        Direct::Bool(false)
                    }
                    Direct::Closure(closure) => self.apply(closure, args)?,
                    _ => return None,
                }
            }
        })
    }

    fn apply(&mut self, closure: Rc<(Lambda, Env)>, args: Vec<Direct>) -> Option<Direct> {
        let (lambda, captured) = &*closure;
        let scope = extend(captured);
        if let Some(name) = &lambda.name {
            scope
                .vars
                .borrow_mut()
                .insert(name.clone(), Direct::Closure(closure.clone()));
        }
        let mut args = args.into_iter();
        for param in &lambda.params {
            let value = args.next().unwrap_or(Direct::Bool(false));
            scope.vars.borrow_mut().insert(param.clone(), value);
        }
        for local in &lambda.locals {
            scope
                .vars
                .borrow_mut()
                .insert(local.clone(), Direct::Bool(false));
        }
        self.eval(&lambda.body, &scope)
    }
}
