//! Fixed-point optimizer over CPS trees.
//!
//! Each round re-resolves the tree, then walks it once. As soon as one rewrite fires
//! the rest of the round leaves nodes untouched, because the binding counts it relies
//! on are stale from that point on. Renames decided during the round are applied to
//! the whole tree before the next resolution. Rounds repeat until one fires nothing.

use std::collections::HashMap;

use super::{
    ast::*,
    constfold::fold_binary,
    env::{Binding, BindingId, BindingRole, Environment, ScopeId},
    gensym::NameGen,
    scope::{resolve, GlobalPolicy, Mode},
};
use crate::error::CompileError;

pub fn optimize(
    mut tree: Node,
    names: &mut NameGen,
    policy: &GlobalPolicy,
) -> Result<Node, CompileError> {
    names.observe(&tree);

    let mut rounds = 0usize;
    let mut rewrites = 0usize;
    loop {
        rounds += 1;
        let env = resolve(&mut tree, policy, Mode::Cps)?;
        let mut pass = Pass {
            env,
            names: &mut *names,
            changes: 0,
            defun: Vec::new(),
            renames: HashMap::new(),
        };

        tree = pass.opt(tree)?;
        let changes = pass.changes;
        let renames = std::mem::take(&mut pass.renames);
        apply_renames(&mut tree, &renames);

        log::trace!(target: "optimizer", "round {}: {} rewrites", rounds, changes);
        rewrites += changes;
        if changes == 0 {
            break;
        }
    }

    resolve(&mut tree, policy, Mode::Cps)?;
    log::debug!(
        target: "optimizer",
        "reached fixed point after {} rounds, {} rewrites",
        rounds,
        rewrites
    );
    Ok(tree)
}

fn apply_renames(tree: &mut Node, renames: &HashMap<BindingId, String>) {
    if renames.is_empty() {
        return;
    }

    tree.for_each_var_mut(&mut |var| {
        if let Some(name) = var.binding.and_then(|id| renames.get(&id)) {
            var.name = name.clone();
        }
    });
}

/// Innermost lambda being optimized; inlined functions hoist their variables here.
struct DefunFrame {
    scope: ScopeId,
    locals: Vec<String>,
}

enum AssignRewrite {
    Propagate { left: BindingId, right: String },
    Dead,
    Keep,
}

struct Pass<'a> {
    env: Environment,
    names: &'a mut NameGen,
    changes: usize,
    defun: Vec<DefunFrame>,
    renames: HashMap<BindingId, String>,
}

fn unresolved(kind: &'static str) -> CompileError {
    CompileError::malformed(kind, "node was not resolved before optimization")
}

impl Pass<'_> {
    fn changed(&mut self, rule: &str) {
        self.changes += 1;
        log::trace!(target: "optimizer", "{} fired", rule);
    }

    fn opt(&mut self, node: Node) -> Result<Node, CompileError> {
        if self.changes > 0 {
            return Ok(node);
        }

        match node {
            Node::Num(_) | Node::Str(_) | Node::Bool(_) | Node::Raw(_) | Node::Var(_) => Ok(node),
            Node::Not(body) => Ok(make_not(self.opt(*body)?)),
            Node::Binary(binary) => self.opt_binary(binary),
            Node::Assign(assign) => self.opt_assign(assign),
            Node::Let(_) => Err(CompileError::malformed(
                "let",
                "let groups must be converted to CPS before optimization",
            )),
            Node::Lambda(lambda) => self.opt_lambda(lambda),
            Node::If(if_) => self.opt_if(if_),
            Node::Prog(prog) => self.opt_prog(prog),
            Node::Call(call) => self.opt_call(call),
        }
    }

    fn opt_binary(&mut self, binary: Binary) -> Result<Node, CompileError> {
        let left = self.opt(*binary.left)?;
        let right = self.opt(*binary.right)?;

        if let Some(folded) = fold_binary(&binary.operator, &left, &right)? {
            self.changed("constant folding");
            return Ok(folded);
        }

        Ok(make_binary(&binary.operator, left, right))
    }

    fn opt_assign(&mut self, assign: Assign) -> Result<Node, CompileError> {
        match self.assign_rewrite(&assign) {
            AssignRewrite::Propagate { left, right } => {
                self.changed("copy propagation");
                self.renames.insert(left, right);
                self.opt(*assign.right)
            }
            AssignRewrite::Dead => {
                self.changed("dead assignment");
                self.opt(*assign.right)
            }
            AssignRewrite::Keep => {
                let left = self.opt(*assign.left)?;
                let right = self.opt(*assign.right)?;
                Ok(make_assign(left, right))
            }
        }
    }

    fn assign_rewrite(&self, assign: &Assign) -> AssignRewrite {
        let Some(left) = assign.left.var().and_then(|var| var.binding) else {
            return AssignRewrite::Keep;
        };

        if let Some(right) = assign.right.var() {
            if self.can_propagate(left, right) {
                return AssignRewrite::Propagate {
                    left,
                    right: right.name.clone(),
                };
            }
        }

        let binding = self.env.binding(left);
        if binding.ref_count() == binding.assignments as usize && !binding.is_global() {
            return AssignRewrite::Dead;
        }

        AssignRewrite::Keep
    }

    /// `x = k` where `k` is an unassigned continuation parameter can be dropped in
    /// favour of using `k` wherever `x` is read.
    ///
    /// Only single-assignment locals qualify, and every place that reads `x` must see
    /// the same `k` binding.
    fn can_propagate(&self, left: BindingId, right: &Var) -> bool {
        let Some(right_id) = right.binding else {
            return false;
        };
        if right_id == left {
            return false;
        }

        let source = self.env.binding(right_id);
        if !source.is_continuation() || !source.is_immutable() {
            return false;
        }

        let target = self.env.binding(left);
        if target.role != BindingRole::Local || target.assignments != 1 {
            return false;
        }

        target
            .references
            .iter()
            .all(|&site| self.env.get(site, &source.name) == Ok(right_id))
    }

    fn opt_if(&mut self, if_: If) -> Result<Node, CompileError> {
        let cond = self.opt(*if_.cond)?;
        let then = self.opt(*if_.then)?;
        let otherwise = self.opt(if_.otherwise.map_or(FALSE, |otherwise| *otherwise))?;

        if let Some(truthy) = cond.is_truthy_constant() {
            self.changed("if folding");
            return Ok(if truthy { then } else { otherwise });
        }

        Ok(make_if(cond, then, Some(otherwise)))
    }

    fn opt_prog(&mut self, mut prog: Vec<Node>) -> Result<Node, CompileError> {
        match prog.len() {
            0 => {
                self.changed("empty sequence");
                Ok(FALSE)
            }
            1 => {
                self.changed("singleton sequence");
                let only = prog.remove(0);
                self.opt(only)
            }
            _ if !prog[0].has_side_effects() => {
                self.changed("pure sequence prefix");
                prog.remove(0);
                self.opt(make_prog(prog))
            }
            2 => {
                let prog = prog
                    .into_iter()
                    .map(|node| self.opt(node))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(make_prog(prog))
            }
            _ => {
                let first = prog.remove(0);
                self.opt(make_prog(vec![first, make_prog(prog)]))
            }
        }
    }

    fn opt_call(&mut self, call: Call) -> Result<Node, CompileError> {
        let Call { func, args } = call;
        let mut top_level = false;

        let func = match *func {
            Node::Lambda(lambda) if lambda.name.is_none() => {
                let scope = lambda.scope.ok_or_else(|| unresolved("lambda"))?;
                let defining = self.env.parent(scope);
                // Functions defined directly in the global scope are not unwrapped.
                if defining.and_then(|scope| self.env.parent(scope)).is_some() {
                    return self.opt_iife(lambda, args);
                }
                top_level = true;
                Node::Lambda(lambda)
            }
            func => func,
        };

        let mut func = self.opt(func)?;
        if top_level {
            if let Node::Lambda(lambda) = &mut func {
                lambda.unguarded = true;
            }
        }

        let args = args
            .into_iter()
            .map(|arg| self.opt(arg))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(make_call(func, args))
    }

    /// `(λ(a, b) body)(x, y)  ==>  a = x, b = y, body` with `a` and `b` hoisted into
    /// the enclosing function.
    fn opt_iife(&mut self, lambda: Lambda, args: Vec<Node>) -> Result<Node, CompileError> {
        self.changed("iife inlining");

        let Lambda {
            params,
            locals,
            body,
            scope,
            ..
        } = lambda;
        let scope = scope.ok_or_else(|| unresolved("lambda"))?;

        let mut args = args.into_iter();
        let mut prog = Vec::with_capacity(params.len() + 1);
        for param in &params {
            let name = self.hoist(scope, param)?;
            prog.push(make_assign(make_var(&name), args.next().unwrap_or(FALSE)));
        }
        // Surplus arguments are still evaluated.
        prog.extend(args);

        for local in &locals {
            self.hoist(scope, local)?;
        }

        prog.push(*body);
        Ok(make_prog(prog))
    }

    /// Declares a local in the enclosing function standing in for `name` of `scope`.
    ///
    /// The original name is reused unless something by that name is already visible
    /// from the enclosing function.
    fn hoist(&mut self, scope: ScopeId, name: &str) -> Result<String, CompileError> {
        let id = self.env.get(scope, name)?;
        let Some(frame) = self.defun.last_mut() else {
            return Err(CompileError::malformed(
                "call",
                "immediately invoked function outside of any function",
            ));
        };

        let hoisted = if self.env.is_visible(frame.scope, name) {
            self.names.fresh(&format!("{}$", name))
        } else {
            name.to_owned()
        };

        self.env.define(
            frame.scope,
            Binding::new(&hoisted, BindingRole::Local, frame.scope),
        );
        frame.locals.push(hoisted.clone());
        self.renames.insert(id, hoisted.clone());
        Ok(hoisted)
    }

    fn opt_lambda(&mut self, mut lambda: Lambda) -> Result<Node, CompileError> {
        if let Some(target) = self.eta_target(&lambda)? {
            self.changed("eta reduction");
            return Ok(target);
        }

        let scope = lambda.scope.ok_or_else(|| unresolved("lambda"))?;
        let env = &self.env;
        lambda.locals.retain(|name| {
            env.get(scope, name)
                .map_or(false, |id| env.binding(id).ref_count() > 0)
        });

        self.defun.push(DefunFrame {
            scope,
            locals: Vec::new(),
        });
        let body = self.opt(*lambda.body);
        let frame = self.defun.pop();
        let body = body?;

        if let Some(frame) = frame {
            lambda.locals.extend(frame.locals);
        }

        // A tail call into a lambda literal cannot close a loop on its own, the loop
        // has to pass through a guarded function.
        lambda.unguarded = matches!(&body, Node::Call(call) if matches!(&*call.func, Node::Lambda(_)));
        lambda.body = Box::new(body);
        Ok(Node::Lambda(lambda))
    }

    /// `λ(x...) f(x...)  ==>  f` when `f` is an unassigned, non-global binding from
    /// outside the lambda.
    fn eta_target(&self, lambda: &Lambda) -> Result<Option<Node>, CompileError> {
        let Node::Call(call) = &*lambda.body else {
            return Ok(None);
        };
        let Node::Var(callee) = &*call.func else {
            return Ok(None);
        };
        let Some(callee_id) = callee.binding else {
            return Ok(None);
        };

        let scope = lambda.scope.ok_or_else(|| unresolved("lambda"))?;
        let binding = self.env.binding(callee_id);
        if !binding.is_immutable()
            || self.env.is_root(binding.scope)
            || binding.scope == scope
            || call.args.len() != lambda.params.len()
        {
            return Ok(None);
        }

        for (arg, param) in call.args.iter().zip(&lambda.params) {
            let Some(arg) = arg.var() else {
                return Ok(None);
            };
            if arg.binding.is_none() || arg.binding != self.env.get(scope, param).ok() {
                return Ok(None);
            }
        }

        Ok(Some(Node::Var(callee.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::cps::{sink, transform};

    fn pipeline(ast: Node) -> Result<Node, CompileError> {
        let mut names = NameGen::new();
        names.reserve("halt");
        let cps = transform(ast, &mut names, sink("halt"))?;
        optimize(cps, &mut names, &GlobalPolicy::Open)
    }

    fn halted_value(tree: &Node) -> &Node {
        let Node::Call(call) = tree else {
            panic!("expected a call, got {}", tree)
        };
        assert_eq!(call.func.var().map(|var| var.name.as_str()), Some("halt"));
        &call.args[0]
    }

    fn with_locals(mut node: Node, locals: &[&str]) -> Node {
        if let Node::Lambda(lambda) = &mut node {
            lambda.locals = locals.iter().map(|local| (*local).to_owned()).collect();
        }
        node
    }

    #[test]
    fn folds_arithmetic() {
        let ast = make_binary(
            "+",
            make_num(2.0),
            make_binary("*", make_num(3.0), make_num(4.0)),
        );
        let tree = pipeline(ast).unwrap();
        assert_eq!(halted_value(&tree), &make_num(14.0));
    }

    #[test]
    fn folds_mixed_equality() {
        let tree = pipeline(make_binary("==", make_num(1.0), make_str("1"))).unwrap();
        assert_eq!(halted_value(&tree), &FALSE);
    }

    #[test]
    fn rejects_division_by_zero() {
        let err = pipeline(make_binary("/", make_num(1.0), make_num(0.0))).unwrap_err();
        assert!(matches!(err, CompileError::Arithmetic { .. }));
    }

    #[test]
    fn conditional_inside_function_reduces_to_branches() {
        let ast = make_lambda(
            Some("f"),
            &["n"],
            make_if(make_var("n"), make_num(1.0), Some(make_num(2.0))),
        );
        let tree = pipeline(ast).unwrap();
        assert_eq!(
            tree.to_string(),
            "(halt (lambda f (β_K1 n) (if n (β_K1 1) (β_K1 2))))"
        );
    }

    #[test]
    fn constant_condition_is_folded() {
        let tree = pipeline(make_if(TRUE, make_num(1.0), Some(make_num(2.0)))).unwrap();
        let mut saw_if = false;
        let mut stack = vec![&tree];
        while let Some(node) = stack.pop() {
            match node {
                Node::If(_) => saw_if = true,
                Node::Call(call) => {
                    stack.push(&call.func);
                    stack.extend(call.args.iter());
                }
                Node::Lambda(lambda) => stack.push(&lambda.body),
                _ => {}
            }
        }
        assert!(!saw_if, "{}", tree);
    }

    #[test]
    fn unused_let_binding_keeps_initializer_effects() {
        let ast = make_let(
            vec![("x", Some(make_call(make_var("f"), vec![])))],
            make_num(1.0),
        );
        let tree = pipeline(ast).unwrap();

        let mut names = Vec::new();
        tree.for_each_name(&mut |name| names.push(name.to_owned()));
        assert!(names.iter().any(|name| name == "f"));
        assert!(!names.iter().any(|name| name == "x"), "{}", tree);

        let Node::Call(call) = &tree else { unreachable!() };
        assert_eq!(call.func.var().map(|var| var.name.as_str()), Some("f"));
    }

    #[test]
    fn eta_reduces_to_outer_binding() {
        let ast = make_lambda(
            Some("outer"),
            &["addTwo"],
            make_lambda(
                None,
                &["x", "y"],
                make_call(make_var("addTwo"), vec![make_var("x"), make_var("y")]),
            ),
        );
        let tree = pipeline(ast).unwrap();
        let Node::Lambda(outer) = halted_value(&tree) else { unreachable!() };
        let Node::Call(call) = &*outer.body else { unreachable!() };
        assert_eq!(call.args.len(), 1);
        assert_eq!(call.args[0].var().map(|var| var.name.as_str()), Some("addTwo"));
    }

    #[test]
    fn eta_leaves_global_callees_alone() {
        let ast = make_lambda(
            None,
            &["x", "y"],
            make_call(make_var("addTwo"), vec![make_var("x"), make_var("y")]),
        );
        let tree = pipeline(ast).unwrap();
        assert!(matches!(halted_value(&tree), Node::Lambda(_)));
    }

    #[test]
    fn top_level_iife_is_unguarded_not_inlined() {
        let ast = make_call(make_lambda(None, &["x"], make_var("x")), vec![make_num(1.0)]);
        let tree = pipeline(ast).unwrap();
        let Node::Call(call) = &tree else { unreachable!() };
        let Node::Lambda(lambda) = &*call.func else {
            panic!("expected the lambda to survive: {}", tree)
        };
        assert!(lambda.unguarded);
    }

    #[test]
    fn inlined_locals_are_renamed_apart() {
        // λ(K, a) (λ(K1, x)[tmp] (tmp = x, (λ(K2, y)[tmp] (tmp = y, K2(tmp)))(λ(R) K1(R + tmp), 2)))(K, a)
        let inner = with_locals(
            make_lambda(
                None,
                &["K2", "y"],
                make_prog(vec![
                    make_assign(make_var("tmp"), make_var("y")),
                    make_call(make_var("K2"), vec![make_var("tmp")]),
                ]),
            ),
            &["tmp"],
        );
        let middle = with_locals(
            make_lambda(
                None,
                &["K1", "x"],
                make_prog(vec![
                    make_assign(make_var("tmp"), make_var("x")),
                    make_call(
                        inner,
                        vec![
                            make_lambda(
                                None,
                                &["R"],
                                make_call(
                                    make_var("K1"),
                                    vec![make_binary("+", make_var("R"), make_var("tmp"))],
                                ),
                            ),
                            make_num(2.0),
                        ],
                    ),
                ]),
            ),
            &["tmp"],
        );
        let outer = make_lambda(
            None,
            &["K", "a"],
            make_call(middle, vec![make_var("K"), make_var("a")]),
        );

        let mut names = NameGen::new();
        let tree = optimize(outer, &mut names, &GlobalPolicy::Open).unwrap();
        let Node::Lambda(lambda) = &tree else { unreachable!() };

        let tmps: Vec<_> = lambda
            .locals
            .iter()
            .filter(|local| local.contains("tmp"))
            .collect();
        assert_eq!(tmps.len(), 2, "{}", tree);
        assert_ne!(tmps[0], tmps[1]);
    }

    /// Names of the variables assigned to `name` anywhere in `tree`.
    fn sources_of(tree: &Node, name: &str) -> Vec<String> {
        let mut found = Vec::new();
        let mut stack = vec![tree];
        while let Some(node) = stack.pop() {
            match node {
                Node::Assign(assign) => {
                    if assign.left.var().map_or(false, |var| var.name == name) {
                        if let Some(source) = assign.right.var() {
                            found.push(source.name.clone());
                        }
                    }
                    stack.push(&assign.right);
                }
                Node::Prog(prog) => stack.extend(prog.iter()),
                Node::Call(call) => {
                    stack.push(&call.func);
                    stack.extend(call.args.iter());
                }
                Node::Lambda(lambda) => stack.push(&lambda.body),
                Node::If(if_) => {
                    stack.push(&if_.cond);
                    stack.push(&if_.then);
                    stack.extend(if_.otherwise.as_deref());
                }
                _ => {}
            }
        }
        found
    }

    #[test]
    fn continuation_copy_is_propagated() {
        // λ(K, a) (λ(K1, x) K1(x + 1))(K, a)
        let ast = make_lambda(
            None,
            &["K", "a"],
            make_call(
                make_lambda(
                    None,
                    &["K1", "x"],
                    make_call(
                        make_var("K1"),
                        vec![make_binary("+", make_var("x"), make_num(1.0))],
                    ),
                ),
                vec![make_var("K"), make_var("a")],
            ),
        );
        let mut names = NameGen::new();
        let tree = optimize(ast, &mut names, &GlobalPolicy::Open).unwrap();

        let mut seen = Vec::new();
        tree.for_each_name(&mut |name| seen.push(name.to_owned()));
        assert!(!seen.iter().any(|name| name == "K1"), "{}", tree);

        let Node::Lambda(lambda) = &tree else { unreachable!() };
        assert!(!lambda.locals.iter().any(|local| local == "K1"));

        let mut calls_k = false;
        let mut stack = vec![&*lambda.body];
        while let Some(node) = stack.pop() {
            match node {
                Node::Prog(prog) => stack.extend(prog.iter()),
                Node::Call(call) => calls_k |= call.func.var().map_or(false, |var| var.name == "K"),
                _ => {}
            }
        }
        assert!(calls_k, "{}", tree);
    }

    #[test]
    fn reassigned_local_is_not_propagated() {
        let ast = with_locals(
            make_lambda(
                None,
                &["K", "a"],
                make_prog(vec![
                    make_assign(make_var("k1"), make_var("K")),
                    make_assign(make_var("k1"), make_var("a")),
                    make_call(make_var("k1"), vec![make_var("a")]),
                ]),
            ),
            &["k1"],
        );
        let mut names = NameGen::new();
        let tree = optimize(ast, &mut names, &GlobalPolicy::Open).unwrap();

        let mut sources = sources_of(&tree, "k1");
        sources.sort();
        assert_eq!(sources, vec!["K".to_owned(), "a".to_owned()], "{}", tree);
        let Node::Lambda(lambda) = &tree else { unreachable!() };
        assert_eq!(lambda.locals, vec!["k1".to_owned()]);
    }

    #[test]
    fn shadowed_continuation_is_not_propagated() {
        // λ(K, a)[k1] (k1 = K, K(λ(K, v) k1(v)))
        let ast = with_locals(
            make_lambda(
                None,
                &["K", "a"],
                make_prog(vec![
                    make_assign(make_var("k1"), make_var("K")),
                    make_call(
                        make_var("K"),
                        vec![make_lambda(
                            None,
                            &["K", "v"],
                            make_call(make_var("k1"), vec![make_var("v")]),
                        )],
                    ),
                ]),
            ),
            &["k1"],
        );
        let mut names = NameGen::new();
        let tree = optimize(ast, &mut names, &GlobalPolicy::Open).unwrap();

        assert_eq!(sources_of(&tree, "k1"), vec!["K".to_owned()], "{}", tree);
        let Node::Lambda(lambda) = &tree else { unreachable!() };
        assert_eq!(lambda.locals, vec!["k1".to_owned()]);
    }

    #[test]
    fn let_is_rejected() {
        let mut names = NameGen::new();
        let err = optimize(
            make_let(vec![("x", None)], make_var("x")),
            &mut names,
            &GlobalPolicy::Open,
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::MalformedNode { kind: "let", .. }));
    }

    #[test]
    fn second_run_is_a_no_op() {
        let ast = make_lambda(
            Some("loop"),
            &["n"],
            make_if(
                make_binary("<", make_var("n"), make_num(1.0)),
                make_var("n"),
                Some(make_call(
                    make_var("loop"),
                    vec![make_binary("-", make_var("n"), make_num(1.0))],
                )),
            ),
        );
        let mut names = NameGen::new();
        let cps = transform(ast, &mut names, sink("halt")).unwrap();
        let once = optimize(cps, &mut names, &GlobalPolicy::Open).unwrap();
        let twice = optimize(once.clone(), &mut names, &GlobalPolicy::Open).unwrap();
        assert_eq!(once, twice);
    }
}
