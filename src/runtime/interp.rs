//! Tree-walking evaluator for CPS programs.
//!
//! Calls are evaluated with host recursion, so the depth of the host stack follows
//! the depth of the CPS call chain. The trampoline guard on every guarded function
//! entry is what keeps that depth bounded.

use std::rc::Rc;

use super::{
    builtins,
    frame::Frame,
    trampoline::{self, Countdown, Interrupt, Suspension},
    value::{Closure, Native, NativeFn, Value},
};
use crate::{
    compiler::{
        ast::{Binary, Lambda, Node},
        env::Environment,
    },
    error::RuntimeError,
    options::Options,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Suspensions resumed by the driving loop.
    pub bounces: usize,
    pub guarded_entries: usize,
    pub unguarded_entries: usize,
    pub native_calls: usize,
    /// Deepest nesting of function applications seen on the host stack.
    pub max_depth: usize,
}

pub struct Machine<'p> {
    pub(crate) countdown: Countdown,
    pub(crate) stats: Stats,
    global: Rc<Frame<'p>>,
    depth: usize,
    pub(crate) result: Option<Value<'p>>,
    pub(crate) output: String,
    pub(crate) echo: bool,
}

type Eval<'p> = Result<Value<'p>, Interrupt<'p>>;

impl<'p> Machine<'p> {
    /// Machine with the standard natives and `sink` as the top-level continuation.
    pub fn new(budget: usize, sink: &str) -> Self {
        let mut machine = Machine {
            countdown: Countdown::new(budget),
            stats: Stats::default(),
            global: Frame::global(),
            depth: 0,
            result: None,
            output: String::new(),
            echo: false,
        };
        builtins::install(&mut machine, sink);
        machine
    }

    pub fn with_options(options: &Options) -> Self {
        Self::new(options.budget, &options.sink)
    }

    /// Also write program output to stdout.
    pub fn set_echo(&mut self, echo: bool) {
        self.echo = echo;
    }

    pub fn define_native(&mut self, name: &'static str, func: NativeFn<'p>) {
        self.global.define(name, Value::Native(Native { name, func }));
    }

    pub fn define_global(&mut self, name: &str, value: Value<'p>) {
        self.global.define(name, value);
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn budget(&self) -> usize {
        self.countdown.budget()
    }

    /// Runs a compiled program to completion and returns the value it passed to the
    /// top-level continuation.
    pub fn run(&mut self, program: &'p Node) -> Result<Value<'p>, RuntimeError> {
        self.result = None;
        let global = self.global.clone();
        trampoline::drive(self, |machine| machine.eval(program, &global))?;

        log::debug!(
            target: "trampoline",
            "finished after {} bounces, max depth {}",
            self.stats.bounces,
            self.stats.max_depth
        );
        self.result.take().ok_or(RuntimeError::Unfinished)
    }

    pub fn apply(&mut self, callee: Value<'p>, args: Vec<Value<'p>>) -> Eval<'p> {
        match callee {
            Value::Closure(closure) => {
                if closure.lambda.unguarded {
                    self.stats.unguarded_entries += 1;
                } else {
                    self.stats.guarded_entries += 1;
                    if self.countdown.tick() {
                        return Err(Interrupt::Suspend(Suspension {
                            callee: Value::Closure(closure),
                            args,
                        }));
                    }
                }

                self.enter();
                let result = self.invoke(closure, args);
                self.depth -= 1;
                result
            }
            Value::Native(native) => {
                self.stats.native_calls += 1;
                self.enter();
                let result = (native.func)(self, args);
                self.depth -= 1;
                result
            }
            other => Err(RuntimeError::NotCallable(other.to_string()).into()),
        }
    }

    fn enter(&mut self) {
        self.depth += 1;
        self.stats.max_depth = self.stats.max_depth.max(self.depth);
    }

    fn invoke(&mut self, closure: Rc<Closure<'p>>, args: Vec<Value<'p>>) -> Eval<'p> {
        let lambda: &'p Lambda = closure.lambda;
        let frame = Frame::extend(&closure.frame);

        if let Some(name) = &lambda.name {
            frame.define(name, Value::Closure(closure.clone()));
        }

        let mut args = args.into_iter();
        for param in &lambda.params {
            frame.define(param, args.next().unwrap_or(Value::FALSE));
        }
        for local in &lambda.locals {
            frame.define(local, Value::FALSE);
        }

        self.eval(&lambda.body, &frame)
    }

    pub fn eval(&mut self, node: &'p Node, frame: &Rc<Frame<'p>>) -> Eval<'p> {
        match node {
            Node::Num(x) => Ok(Value::Num(*x)),
            Node::Str(s) => Ok(Value::string(s)),
            Node::Bool(b) => Ok(Value::Bool(*b)),
            Node::Raw(code) => Err(RuntimeError::RawSplice(code.clone()).into()),
            Node::Var(var) => Ok(frame.get(&var.name)?),
            Node::Not(body) => Ok(Value::Bool(!self.eval(body, frame)?.is_truthy())),
            Node::Binary(binary) => self.eval_binary(binary, frame),
            Node::Assign(assign) => {
                let Node::Var(target) = &*assign.left else {
                    return Err(RuntimeError::Malformed(format!(
                        "cannot assign to a {} node",
                        assign.left.kind()
                    ))
                    .into());
                };
                let value = self.eval(&assign.right, frame)?;
                // Top-level code may run inside a continuation's frame after CPS.
                if target.scope == Some(Environment::ROOT) {
                    self.global.define(&target.name, value.clone());
                } else {
                    frame.set(&target.name, value.clone())?;
                }
                Ok(value)
            }
            Node::Let(let_) => {
                let scope = Frame::extend(frame);
                for binding in &let_.bindings {
                    let value = match &binding.init {
                        Some(init) => self.eval(init, &scope)?,
                        None => Value::FALSE,
                    };
                    scope.define(&binding.name, value);
                }
                self.eval(&let_.body, &scope)
            }
            Node::Lambda(lambda) => Ok(Value::Closure(Rc::new(Closure {
                lambda,
                frame: frame.clone(),
            }))),
            Node::If(if_) => {
                if self.eval(&if_.cond, frame)?.is_truthy() {
                    self.eval(&if_.then, frame)
                } else {
                    match &if_.otherwise {
                        Some(otherwise) => self.eval(otherwise, frame),
                        None => Ok(Value::FALSE),
                    }
                }
            }
            Node::Prog(prog) => {
                let mut last = Value::FALSE;
                for node in prog {
                    last = self.eval(node, frame)?;
                }
                Ok(last)
            }
            Node::Call(call) => {
                let callee = self.eval(&call.func, frame)?;
                let mut args = Vec::with_capacity(call.args.len());
                for arg in &call.args {
                    args.push(self.eval(arg, frame)?);
                }
                self.apply(callee, args)
            }
        }
    }

    fn eval_binary(&mut self, binary: &'p Binary, frame: &Rc<Frame<'p>>) -> Eval<'p> {
        let left = self.eval(&binary.left, frame)?;

        match binary.operator.as_str() {
            "&&" if !left.is_truthy() => return Ok(Value::FALSE),
            "&&" => return self.eval(&binary.right, frame),
            "||" if left.is_truthy() => return Ok(left),
            "||" => return self.eval(&binary.right, frame),
            _ => {}
        }

        let right = self.eval(&binary.right, frame)?;
        Ok(binary_op(&binary.operator, left, right)?)
    }
}

/// Strict binary operators over runtime values.
pub fn binary_op<'p>(
    operator: &str,
    left: Value<'p>,
    right: Value<'p>,
) -> Result<Value<'p>, RuntimeError> {
    let mismatch = |left: &Value<'p>, right: &Value<'p>| RuntimeError::TypeMismatch {
        operator: operator.to_owned(),
        left: left.type_name().to_owned(),
        right: right.type_name().to_owned(),
    };

    let value = match (operator, &left, &right) {
        ("==", _, _) => Value::Bool(left == right),
        ("!=", _, _) => Value::Bool(left != right),
        ("+", Value::Num(x), Value::Num(y)) => Value::Num(x + y),
        ("+", Value::Str(_), _) | ("+", _, Value::Str(_)) => {
            Value::string(&format!("{}{}", left, right))
        }
        ("-", Value::Num(x), Value::Num(y)) => Value::Num(x - y),
        ("*", Value::Num(x), Value::Num(y)) => Value::Num(x * y),
        ("/" | "%", Value::Num(_), Value::Num(y)) if *y == 0.0 => {
            return Err(RuntimeError::DivisionByZero)
        }
        ("/", Value::Num(x), Value::Num(y)) => Value::Num(x / y),
        ("%", Value::Num(x), Value::Num(y)) => Value::Num(x % y),
        ("<" | ">" | "<=" | ">=", Value::Num(x), Value::Num(y)) => {
            Value::Bool(compare(operator, x.partial_cmp(y)))
        }
        ("<" | ">" | "<=" | ">=", Value::Str(x), Value::Str(y)) => {
            Value::Bool(compare(operator, Some(x.cmp(y))))
        }
        _ => return Err(mismatch(&left, &right)),
    };

    Ok(value)
}

fn compare(operator: &str, ordering: Option<std::cmp::Ordering>) -> bool {
    let Some(ordering) = ordering else {
        return false;
    };

    match operator {
        "<" => ordering.is_lt(),
        ">" => ordering.is_gt(),
        "<=" => ordering.is_le(),
        _ => ordering.is_ge(),
    }
}
