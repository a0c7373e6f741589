//! Expression tree shared by every stage of the pipeline.
//!
//! The same node kinds describe both the direct-style input and the CPS output. The
//! resolver annotates variable references and lambdas in place, see [`Var::binding`]
//! and [`Lambda::scope`]; annotations are rebuilt from scratch on every resolution.

use std::fmt;

use pretty::{BoxAllocator, DocAllocator, DocBuilder};
use termcolor::{Color, ColorSpec, WriteColor};

use super::env::{BindingId, ScopeId};

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Num(f64),
    Str(String),
    Bool(bool),
    /// Target-language code spliced verbatim.
    Raw(String),
    Var(Var),
    Not(Box<Node>),
    Binary(Binary),
    Assign(Assign),
    Let(Let),
    Lambda(Lambda),
    If(If),
    Prog(Vec<Node>),
    Call(Call),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Var {
    pub name: String,
    /// Binding record this reference resolves to.
    pub binding: Option<BindingId>,
    /// Scope that owns the binding.
    pub scope: Option<ScopeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub operator: String,
    pub left: Box<Node>,
    pub right: Box<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    pub left: Box<Node>,
    pub right: Box<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LetBinding {
    pub name: String,
    pub init: Option<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Let {
    pub bindings: Vec<LetBinding>,
    pub body: Box<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    /// Self name, visible inside the body for recursion.
    pub name: Option<String>,
    /// Ordered parameters. After CPS conversion the first one is the continuation.
    pub params: Vec<String>,
    /// Names declared local to the function body.
    pub locals: Vec<String>,
    pub body: Box<Node>,
    /// Set by the optimizer when entry to this function needs no stack guard.
    pub unguarded: bool,
    /// Scope opened for the body.
    pub scope: Option<ScopeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct If {
    pub cond: Box<Node>,
    pub then: Box<Node>,
    pub otherwise: Option<Box<Node>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub func: Box<Node>,
    pub args: Vec<Node>,
}

pub const FALSE: Node = Node::Bool(false);
pub const TRUE: Node = Node::Bool(true);

impl Node {
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Num(_) => "num",
            Node::Str(_) => "str",
            Node::Bool(_) => "bool",
            Node::Raw(_) => "raw",
            Node::Var(_) => "var",
            Node::Not(_) => "not",
            Node::Binary(_) => "binary",
            Node::Assign(_) => "assign",
            Node::Let(_) => "let",
            Node::Lambda(_) => "lambda",
            Node::If(_) => "if",
            Node::Prog(_) => "prog",
            Node::Call(_) => "call",
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Node::Num(_) | Node::Str(_) | Node::Bool(_))
    }

    pub fn var(&self) -> Option<&Var> {
        match self {
            Node::Var(var) => Some(var),
            _ => None,
        }
    }

    /// Truthiness of a constant: `false` is the only falsy value.
    pub fn is_truthy_constant(&self) -> Option<bool> {
        match self {
            Node::Bool(b) => Some(*b),
            Node::Num(_) | Node::Str(_) => Some(true),
            _ => None,
        }
    }

    /// Structural side-effect analysis.
    ///
    /// Calls, assignments and raw splices always have effects; literals, variables and
    /// lambdas never do. An absent `else` branch counts as `false`.
    pub fn has_side_effects(&self) -> bool {
        match self {
            Node::Call(_) | Node::Assign(_) | Node::Raw(_) => true,
            Node::Num(_) | Node::Str(_) | Node::Bool(_) | Node::Var(_) | Node::Lambda(_) => false,
            Node::Not(body) => body.has_side_effects(),
            Node::Binary(binary) => {
                binary.left.has_side_effects() || binary.right.has_side_effects()
            }
            Node::If(if_) => {
                if_.cond.has_side_effects()
                    || if_.then.has_side_effects()
                    || if_
                        .otherwise
                        .as_ref()
                        .map_or(false, |otherwise| otherwise.has_side_effects())
            }
            Node::Let(let_) => {
                let_.bindings.iter().any(|binding| {
                    binding
                        .init
                        .as_ref()
                        .map_or(false, |init| init.has_side_effects())
                }) || let_.body.has_side_effects()
            }
            Node::Prog(prog) => prog.iter().any(Node::has_side_effects),
        }
    }

    /// Calls `f` on every identifier that occurs in the tree: references, parameters,
    /// locals, self names and `let` names.
    pub fn for_each_name(&self, f: &mut impl FnMut(&str)) {
        match self {
            Node::Num(_) | Node::Str(_) | Node::Bool(_) | Node::Raw(_) => {}
            Node::Var(var) => f(var.name.as_str()),
            Node::Not(body) => body.for_each_name(f),
            Node::Binary(binary) => {
                binary.left.for_each_name(f);
                binary.right.for_each_name(f);
            }
            Node::Assign(assign) => {
                assign.left.for_each_name(f);
                assign.right.for_each_name(f);
            }
            Node::Let(let_) => {
                for binding in &let_.bindings {
                    f(binding.name.as_str());
                    if let Some(init) = &binding.init {
                        init.for_each_name(f);
                    }
                }
                let_.body.for_each_name(f);
            }
            Node::Lambda(lambda) => {
                if let Some(name) = &lambda.name {
                    f(name.as_str());
                }
                lambda.params.iter().for_each(|name| f(name.as_str()));
                lambda.locals.iter().for_each(|name| f(name.as_str()));
                lambda.body.for_each_name(f);
            }
            Node::If(if_) => {
                if_.cond.for_each_name(f);
                if_.then.for_each_name(f);
                if let Some(otherwise) = &if_.otherwise {
                    otherwise.for_each_name(f);
                }
            }
            Node::Prog(prog) => prog.iter().for_each(|node| node.for_each_name(f)),
            Node::Call(call) => {
                call.func.for_each_name(f);
                call.args.iter().for_each(|arg| arg.for_each_name(f));
            }
        }
    }

    /// Calls `f` on every variable reference, including assignment targets.
    pub fn for_each_var_mut(&mut self, f: &mut impl FnMut(&mut Var)) {
        match self {
            Node::Num(_) | Node::Str(_) | Node::Bool(_) | Node::Raw(_) => {}
            Node::Var(var) => f(var),
            Node::Not(body) => body.for_each_var_mut(f),
            Node::Binary(binary) => {
                binary.left.for_each_var_mut(f);
                binary.right.for_each_var_mut(f);
            }
            Node::Assign(assign) => {
                assign.left.for_each_var_mut(f);
                assign.right.for_each_var_mut(f);
            }
            Node::Let(let_) => {
                for binding in &mut let_.bindings {
                    if let Some(init) = &mut binding.init {
                        init.for_each_var_mut(f);
                    }
                }
                let_.body.for_each_var_mut(f);
            }
            Node::Lambda(lambda) => lambda.body.for_each_var_mut(f),
            Node::If(if_) => {
                if_.cond.for_each_var_mut(f);
                if_.then.for_each_var_mut(f);
                if let Some(otherwise) = &mut if_.otherwise {
                    otherwise.for_each_var_mut(f);
                }
            }
            Node::Prog(prog) => prog.iter_mut().for_each(|node| node.for_each_var_mut(f)),
            Node::Call(call) => {
                call.func.for_each_var_mut(f);
                call.args.iter_mut().for_each(|arg| arg.for_each_var_mut(f));
            }
        }
    }
}

pub fn make_num(value: f64) -> Node {
    Node::Num(value)
}

pub fn make_str(value: &str) -> Node {
    Node::Str(value.to_owned())
}

pub fn make_bool(value: bool) -> Node {
    Node::Bool(value)
}

pub fn make_raw(code: &str) -> Node {
    Node::Raw(code.to_owned())
}

pub fn make_var(name: &str) -> Node {
    Node::Var(Var {
        name: name.to_owned(),
        binding: None,
        scope: None,
    })
}

pub fn make_not(body: Node) -> Node {
    Node::Not(Box::new(body))
}

pub fn make_binary(operator: &str, left: Node, right: Node) -> Node {
    Node::Binary(Binary {
        operator: operator.to_owned(),
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn make_assign(left: Node, right: Node) -> Node {
    Node::Assign(Assign {
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn make_let(bindings: Vec<(&str, Option<Node>)>, body: Node) -> Node {
    Node::Let(Let {
        bindings: bindings
            .into_iter()
            .map(|(name, init)| LetBinding {
                name: name.to_owned(),
                init,
            })
            .collect(),
        body: Box::new(body),
    })
}

pub fn make_lambda(name: Option<&str>, params: &[&str], body: Node) -> Node {
    Node::Lambda(Lambda {
        name: name.map(str::to_owned),
        params: params.iter().map(|param| (*param).to_owned()).collect(),
        locals: Vec::new(),
        body: Box::new(body),
        unguarded: false,
        scope: None,
    })
}

pub fn make_if(cond: Node, then: Node, otherwise: Option<Node>) -> Node {
    Node::If(If {
        cond: Box::new(cond),
        then: Box::new(then),
        otherwise: otherwise.map(Box::new),
    })
}

pub fn make_prog(prog: Vec<Node>) -> Node {
    Node::Prog(prog)
}

pub fn make_call(func: Node, args: Vec<Node>) -> Node {
    Node::Call(Call {
        func: Box::new(func),
        args,
    })
}

fn fg(color: Color) -> ColorSpec {
    let mut spec = ColorSpec::new();
    spec.set_fg(Some(color));
    spec
}

fn kw(color: Color) -> ColorSpec {
    let mut spec = fg(color);
    spec.set_bold(true);
    spec
}

impl Node {
    pub fn pretty<'a, D>(&self, allocator: &'a D) -> DocBuilder<'a, D, ColorSpec>
    where
        D: DocAllocator<'a, ColorSpec>,
        D::Doc: Clone,
    {
        match self {
            Node::Num(value) => allocator
                .text(value.to_string())
                .annotate(fg(Color::Cyan)),
            Node::Str(value) => allocator
                .text(format!("{:?}", value))
                .annotate(fg(Color::Yellow)),
            Node::Bool(value) => allocator
                .text(if *value { "#t" } else { "#f" })
                .annotate(fg(Color::Cyan)),
            Node::Raw(code) => allocator
                .text("raw")
                .annotate(kw(Color::Magenta))
                .append(allocator.space())
                .append(allocator.text(format!("{:?}", code)))
                .group()
                .parens(),
            Node::Var(var) => allocator.text(var.name.clone()),
            Node::Not(body) => allocator
                .text("not")
                .annotate(kw(Color::Blue))
                .append(allocator.space())
                .append(body.pretty(allocator))
                .group()
                .parens(),
            Node::Binary(binary) => allocator
                .text(binary.operator.clone())
                .annotate(kw(Color::Blue))
                .append(allocator.space())
                .append(binary.left.pretty(allocator))
                .append(allocator.line())
                .append(binary.right.pretty(allocator))
                .nest(1)
                .group()
                .parens(),
            Node::Assign(assign) => allocator
                .text("set!")
                .annotate(kw(Color::Red))
                .append(allocator.space())
                .append(assign.left.pretty(allocator))
                .append(allocator.line())
                .append(assign.right.pretty(allocator))
                .nest(1)
                .group()
                .parens(),
            Node::Let(let_) => {
                let bindings = allocator.intersperse(
                    let_.bindings.iter().map(|binding| {
                        let init = binding
                            .init
                            .as_ref()
                            .map(|init| allocator.space().append(init.pretty(allocator)))
                            .unwrap_or_else(|| allocator.nil());
                        allocator
                            .text(binding.name.clone())
                            .append(init)
                            .group()
                            .brackets()
                    }),
                    allocator.line(),
                );

                allocator
                    .text("let")
                    .annotate(kw(Color::Green))
                    .append(allocator.space())
                    .append(bindings.parens().align())
                    .append(allocator.line())
                    .append(let_.body.pretty(allocator))
                    .nest(1)
                    .group()
                    .parens()
            }
            Node::Lambda(lambda) => {
                let head = if lambda.unguarded {
                    "lambda/unguarded"
                } else {
                    "lambda"
                };
                let mut doc = allocator
                    .text(head)
                    .annotate(fg(Color::Green))
                    .append(allocator.space());

                if let Some(name) = &lambda.name {
                    doc = doc
                        .append(allocator.text(name.clone()).annotate(kw(Color::Blue)))
                        .append(allocator.space());
                }

                let params = allocator
                    .intersperse(
                        lambda.params.iter().map(|param| allocator.text(param.clone())),
                        allocator.space(),
                    )
                    .parens();
                doc = doc.append(params);

                if !lambda.locals.is_empty() {
                    let locals = allocator
                        .intersperse(
                            lambda.locals.iter().map(|local| allocator.text(local.clone())),
                            allocator.space(),
                        )
                        .brackets();
                    doc = doc.append(allocator.space()).append(locals);
                }

                doc.append(allocator.line())
                    .append(lambda.body.pretty(allocator))
                    .nest(1)
                    .group()
                    .parens()
            }
            Node::If(if_) => {
                let otherwise = if_
                    .otherwise
                    .as_ref()
                    .map(|otherwise| otherwise.pretty(allocator))
                    .unwrap_or_else(|| FALSE.pretty(allocator));

                allocator
                    .text("if")
                    .annotate(kw(Color::Green))
                    .append(allocator.space())
                    .append(if_.cond.pretty(allocator))
                    .append(allocator.line())
                    .append(if_.then.pretty(allocator))
                    .append(allocator.line())
                    .append(otherwise)
                    .nest(1)
                    .group()
                    .parens()
            }
            Node::Prog(prog) => {
                let body = allocator.intersperse(
                    prog.iter().map(|node| node.pretty(allocator)),
                    allocator.line(),
                );

                allocator
                    .text("seq")
                    .annotate(kw(Color::Green))
                    .append(allocator.line())
                    .append(body)
                    .nest(1)
                    .group()
                    .parens()
            }
            Node::Call(call) => {
                let mut doc = call.func.pretty(allocator);
                for arg in &call.args {
                    doc = doc.append(allocator.line()).append(arg.pretty(allocator));
                }
                doc.nest(1).group().parens()
            }
        }
    }

    pub fn pretty_print(&self, writer: &mut impl WriteColor) -> std::io::Result<()> {
        let allocator = BoxAllocator;
        let doc = self.pretty(&allocator);
        doc.render_colored(70, writer)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let allocator = BoxAllocator;
        let doc = self.pretty(&allocator);
        doc.render_fmt(70, f)
    }
}
