use std::{fmt, rc::Rc};

use super::{frame::Frame, interp::Machine, trampoline::Interrupt};
use crate::compiler::ast::Lambda;

pub type NativeFn<'p> = fn(&mut Machine<'p>, Vec<Value<'p>>) -> Result<Value<'p>, Interrupt<'p>>;

/// Runtime value. `'p` is the lifetime of the program tree closures point into.
#[derive(Clone)]
pub enum Value<'p> {
    Num(f64),
    Str(Rc<str>),
    Bool(bool),
    Closure(Rc<Closure<'p>>),
    Native(Native<'p>),
}

pub struct Closure<'p> {
    pub lambda: &'p Lambda,
    pub frame: Rc<Frame<'p>>,
}

#[derive(Clone)]
pub struct Native<'p> {
    pub name: &'static str,
    pub func: NativeFn<'p>,
}

impl<'p> Value<'p> {
    pub const FALSE: Self = Value::Bool(false);

    pub fn string(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    /// `false` is the only falsy value.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::Native(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Closure(_) | Value::Native(_) => "function",
        }
    }
}

impl PartialEq for Value<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Num(x), Value::Num(y)) => x == y,
            (Value::Str(x), Value::Str(y)) => x == y,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Closure(x), Value::Closure(y)) => Rc::ptr_eq(x, y),
            (Value::Native(x), Value::Native(y)) => x.name == y.name,
            _ => false,
        }
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Num(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Closure(closure) => match &closure.lambda.name {
                Some(name) => write!(f, "#<lambda {}>", name),
                None => write!(f, "#<lambda>"),
            },
            Value::Native(native) => write!(f, "#<native {}>", native.name),
        }
    }
}

impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            _ => write!(f, "{}", self),
        }
    }
}

impl From<f64> for Value<'_> {
    fn from(x: f64) -> Self {
        Value::Num(x)
    }
}

impl From<bool> for Value<'_> {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value<'_> {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}
