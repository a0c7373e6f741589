//! Conversion to continuation-passing style.
//!
//! Every helper receives the rest of the computation as a continuation closure and
//! returns a complete CPS node. Atoms are handed to the continuation unchanged, compound
//! expressions are taken apart left to right so evaluation order is preserved, and calls
//! receive a reified continuation lambda as their first argument.
//!
//! ```text
//! f(a + g(b))   ==>   g(λ(R2) f(λ(R1) k(R1), a + R2), b)
//! ```

use std::collections::VecDeque;

use super::{ast::*, gensym::NameGen};
use crate::error::CompileError;

type Cont<'a> = Box<dyn FnOnce(&mut Transformer, Node) -> Result<Node, CompileError> + 'a>;

fn cont<'a>(
    f: impl FnOnce(&mut Transformer, Node) -> Result<Node, CompileError> + 'a,
) -> Cont<'a> {
    Box::new(f)
}

/// Continuation that passes its value to the function bound to `name`.
fn jump_to(name: &str) -> Cont<'static> {
    let name = name.to_owned();
    cont(move |_, value| Ok(make_call(make_var(&name), vec![value])))
}

/// Converts `ast` to CPS. `k` builds the node that consumes the program's final value,
/// usually a call to the top-level continuation, see [`sink`].
pub fn transform(
    ast: Node,
    names: &mut NameGen,
    k: impl FnOnce(Node) -> Node,
) -> Result<Node, CompileError> {
    names.observe(&ast);
    log::debug!(target: "cps", "converting {} node", ast.kind());

    let mut transformer = Transformer {
        names: std::mem::take(names),
    };
    let result = transformer.cps(ast, cont(move |_, node| Ok(k(node))));
    *names = transformer.names;
    result
}

/// Final continuation calling the function named `name` with the result.
pub fn sink(name: &str) -> impl Fn(Node) -> Node + '_ {
    move |result| make_call(make_var(name), vec![result])
}

struct Transformer {
    names: NameGen,
}

impl Transformer {
    fn cps(&mut self, node: Node, k: Cont<'_>) -> Result<Node, CompileError> {
        match node {
            Node::Num(_) | Node::Str(_) | Node::Bool(_) | Node::Raw(_) | Node::Var(_) => {
                k(self, node)
            }
            Node::Not(body) => self.cps(*body, cont(move |t, body| k(t, make_not(body)))),
            Node::Binary(binary) => self.cps_binary(binary, k),
            Node::Assign(assign) => self.cps_assign(assign, k),
            Node::Let(let_) => self.cps_let(let_, k),
            Node::Lambda(lambda) => self.cps_lambda(lambda, k),
            Node::If(if_) => self.cps_if(if_, k),
            Node::Prog(prog) => self.cps_prog(prog.into(), k),
            Node::Call(call) => self.cps_call(call, k),
        }
    }

    fn cps_binary(&mut self, binary: Binary, k: Cont<'_>) -> Result<Node, CompileError> {
        let Binary {
            operator,
            left,
            right,
        } = binary;

        self.cps(
            *left,
            cont(move |t, left| {
                t.cps(
                    *right,
                    cont(move |t, right| {
                        k(
                            t,
                            Node::Binary(Binary {
                                operator,
                                left: Box::new(left),
                                right: Box::new(right),
                            }),
                        )
                    }),
                )
            }),
        )
    }

    fn cps_assign(&mut self, assign: Assign, k: Cont<'_>) -> Result<Node, CompileError> {
        if !matches!(&*assign.left, Node::Var(_)) {
            return Err(CompileError::malformed(
                "assign",
                format!("cannot assign to a {} node", assign.left.kind()),
            ));
        }

        let Assign { left, right } = assign;
        self.cps(
            *left,
            cont(move |t, left| {
                t.cps(*right, cont(move |t, right| k(t, make_assign(left, right))))
            }),
        )
    }

    /// `let (x = e, rest...) body` is `(λ(x) let (rest...) body)(e)`.
    fn cps_let(&mut self, let_: Let, k: Cont<'_>) -> Result<Node, CompileError> {
        let Let { mut bindings, body } = let_;
        if bindings.is_empty() {
            return self.cps(*body, k);
        }

        let first = bindings.remove(0);
        let rest = Node::Let(Let { bindings, body });
        let iife = make_call(
            Node::Lambda(Lambda {
                name: None,
                params: vec![first.name],
                locals: Vec::new(),
                body: Box::new(rest),
                unguarded: false,
                scope: None,
            }),
            vec![first.init.unwrap_or(FALSE)],
        );

        self.cps(iife, k)
    }

    fn cps_lambda(&mut self, lambda: Lambda, k: Cont<'_>) -> Result<Node, CompileError> {
        let continuation = self.names.fresh("K");
        let body = self.cps(*lambda.body, jump_to(&continuation))?;

        let mut params = Vec::with_capacity(lambda.params.len() + 1);
        params.push(continuation);
        params.extend(lambda.params);

        k(
            self,
            Node::Lambda(Lambda {
                name: lambda.name,
                params,
                locals: lambda.locals,
                body: Box::new(body),
                unguarded: false,
                scope: None,
            }),
        )
    }

    /// The continuation is materialised once and bound to a join point, both branches
    /// jump to it.
    fn cps_if(&mut self, if_: If, k: Cont<'_>) -> Result<Node, CompileError> {
        let If {
            cond,
            then,
            otherwise,
        } = if_;

        self.cps(
            *cond,
            cont(move |t, cond| {
                let join = t.names.fresh("I");
                let reified = t.make_continuation(k)?;
                let then = t.cps(*then, jump_to(&join))?;
                let otherwise = t.cps(otherwise.map_or(FALSE, |otherwise| *otherwise), jump_to(&join))?;

                Ok(make_call(
                    Node::Lambda(Lambda {
                        name: None,
                        params: vec![join],
                        locals: Vec::new(),
                        body: Box::new(make_if(cond, then, Some(otherwise))),
                        unguarded: false,
                        scope: None,
                    }),
                    vec![reified],
                ))
            }),
        )
    }

    fn cps_call(&mut self, call: Call, k: Cont<'_>) -> Result<Node, CompileError> {
        let Call { func, args } = call;

        self.cps(
            *func,
            cont(move |t, func| {
                let reified = t.make_continuation(k)?;
                t.cps_args(func, args.into_iter(), vec![reified])
            }),
        )
    }

    fn cps_args(
        &mut self,
        func: Node,
        mut pending: std::vec::IntoIter<Node>,
        mut done: Vec<Node>,
    ) -> Result<Node, CompileError> {
        match pending.next() {
            None => Ok(make_call(func, done)),
            Some(arg) => self.cps(
                arg,
                cont(move |t, value| {
                    done.push(value);
                    t.cps_args(func, pending, done)
                }),
            ),
        }
    }

    fn cps_prog(&mut self, mut body: VecDeque<Node>, k: Cont<'_>) -> Result<Node, CompileError> {
        let Some(first) = body.pop_front() else {
            return k(self, FALSE);
        };

        if body.is_empty() {
            return self.cps(first, k);
        }

        if !first.has_side_effects() {
            return self.cps_prog(body, k);
        }

        self.cps(
            first,
            cont(move |t, first| {
                if first.has_side_effects() {
                    let rest = t.cps_prog(body, k)?;
                    Ok(make_prog(vec![first, rest]))
                } else {
                    t.cps_prog(body, k)
                }
            }),
        )
    }

    /// `λ(R) k(R)` with a fresh `R`.
    fn make_continuation(&mut self, k: Cont<'_>) -> Result<Node, CompileError> {
        let result = self.names.fresh("R");
        let body = k(self, make_var(&result))?;
        Ok(make_lambda(None, &[result.as_str()], body))
    }
}
