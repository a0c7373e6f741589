//! Scope resolution.
//!
//! Walks a tree once, opening a scope per lambda, and links every variable reference to
//! its binding record. Free names become globals of the root scope. The pass only
//! writes annotations, so it can be re-run at any time to refresh reference and
//! assignment counts after the tree was rewritten.

use std::collections::HashSet;

use super::{
    ast::{Lambda, Node, Var},
    env::{Binding, BindingRole, Environment, ScopeId},
};
use crate::error::CompileError;

/// How references to names without an enclosing definition are treated.
#[derive(Clone, Debug, Default)]
pub enum GlobalPolicy {
    /// Any free name is accepted as a global.
    #[default]
    Open,
    /// Only the listed names may be referenced free.
    Declared(HashSet<String>),
}

impl GlobalPolicy {
    pub fn declared<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Declared(names.into_iter().map(Into::into).collect())
    }

    fn admits(&self, name: &str) -> bool {
        match self {
            GlobalPolicy::Open => true,
            GlobalPolicy::Declared(names) => names.contains(name),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Direct,
    /// The first parameter of every lambda is its continuation.
    Cps,
}

pub fn resolve(
    tree: &mut Node,
    policy: &GlobalPolicy,
    mode: Mode,
) -> Result<Environment, CompileError> {
    let mut resolver = Resolver {
        env: Environment::new(),
        policy,
        mode,
    };
    let root = resolver.env.root();
    resolver.scope(tree, root)?;
    Ok(resolver.env)
}

struct Resolver<'a> {
    env: Environment,
    policy: &'a GlobalPolicy,
    mode: Mode,
}

impl Resolver<'_> {
    fn scope(&mut self, node: &mut Node, scope: ScopeId) -> Result<(), CompileError> {
        match node {
            Node::Num(_) | Node::Str(_) | Node::Bool(_) | Node::Raw(_) => Ok(()),
            Node::Var(var) => self.reference(var, scope),
            Node::Not(body) => self.scope(body, scope),
            Node::Binary(binary) => {
                self.scope(&mut binary.left, scope)?;
                self.scope(&mut binary.right, scope)
            }
            Node::Assign(assign) => {
                self.scope(&mut assign.left, scope)?;
                self.scope(&mut assign.right, scope)?;
                if let Node::Var(Var {
                    binding: Some(id), ..
                }) = &*assign.left
                {
                    self.env.binding_mut(*id).assignments += 1;
                }
                Ok(())
            }
            Node::Let(let_) => {
                for binding in &mut let_.bindings {
                    if let Some(init) = &mut binding.init {
                        self.scope(init, scope)?;
                    }
                }
                self.scope(&mut let_.body, scope)
            }
            Node::If(if_) => {
                self.scope(&mut if_.cond, scope)?;
                self.scope(&mut if_.then, scope)?;
                if let Some(otherwise) = &mut if_.otherwise {
                    self.scope(otherwise, scope)?;
                }
                Ok(())
            }
            Node::Prog(prog) => prog.iter_mut().try_for_each(|node| self.scope(node, scope)),
            Node::Call(call) => {
                self.scope(&mut call.func, scope)?;
                call.args
                    .iter_mut()
                    .try_for_each(|arg| self.scope(arg, scope))
            }
            Node::Lambda(lambda) => self.lambda(lambda, scope),
        }
    }

    fn lambda(&mut self, lambda: &mut Lambda, scope: ScopeId) -> Result<(), CompileError> {
        let inner = self.env.extend(scope);
        lambda.scope = Some(inner);

        if let Some(name) = &lambda.name {
            self.env
                .define(inner, Binding::new(name, BindingRole::SelfName, inner));
        }

        for (i, param) in lambda.params.iter().enumerate() {
            let role = if i == 0 && self.mode == Mode::Cps {
                BindingRole::Continuation
            } else {
                BindingRole::Argument
            };
            self.env.define(inner, Binding::new(param, role, inner));
        }

        for local in &lambda.locals {
            self.env
                .define(inner, Binding::new(local, BindingRole::Local, inner));
        }

        self.scope(&mut lambda.body, inner)
    }

    fn reference(&mut self, var: &mut Var, scope: ScopeId) -> Result<(), CompileError> {
        let owner = match self.env.lookup(scope, &var.name) {
            Some(owner) => owner,
            None => {
                if !self.policy.admits(&var.name) {
                    return Err(CompileError::UndefinedVariable(var.name.clone()));
                }
                let root = self.env.root();
                self.env
                    .set(root, &var.name, Binding::new(&var.name, BindingRole::Global, root))?;
                root
            }
        };

        let id = self.env.get(owner, &var.name)?;
        self.env.binding_mut(id).references.push(scope);
        var.binding = Some(id);
        var.scope = Some(owner);
        Ok(())
    }
}
