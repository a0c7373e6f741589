//! Lexical environments.
//!
//! Scopes and binding records live in one arena owned by [`Environment`]; tree nodes
//! refer to them through [`ScopeId`] and [`BindingId`]. A scope only stores its own
//! names, lookups fall through to the parent chain.

use indexmap::IndexMap;

use crate::error::CompileError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingRole {
    /// Free name, owned by the root scope.
    Global,
    Argument,
    /// First parameter of a CPS lambda.
    Continuation,
    Local,
    /// Name of a named lambda inside its own body.
    SelfName,
}

#[derive(Clone, Debug)]
pub struct Binding {
    pub name: String,
    pub role: BindingRole,
    /// Scope that owns this binding.
    pub scope: ScopeId,
    /// Scope in which each reference to this binding occurs.
    pub references: Vec<ScopeId>,
    pub assignments: u32,
}

impl Binding {
    pub fn new(name: &str, role: BindingRole, scope: ScopeId) -> Self {
        Self {
            name: name.to_owned(),
            role,
            scope,
            references: Vec::new(),
            assignments: 0,
        }
    }

    pub fn is_global(&self) -> bool {
        self.role == BindingRole::Global
    }

    pub fn is_continuation(&self) -> bool {
        self.role == BindingRole::Continuation
    }

    pub fn is_immutable(&self) -> bool {
        self.assignments == 0
    }

    pub fn ref_count(&self) -> usize {
        self.references.len()
    }
}

#[derive(Debug)]
struct Scope {
    parent: Option<ScopeId>,
    vars: IndexMap<String, BindingId>,
}

#[derive(Debug)]
pub struct Environment {
    scopes: Vec<Scope>,
    bindings: Vec<Binding>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub const ROOT: ScopeId = ScopeId(0);

    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                parent: None,
                vars: IndexMap::new(),
            }],
            bindings: Vec::new(),
        }
    }

    pub fn root(&self) -> ScopeId {
        Self::ROOT
    }

    pub fn is_root(&self, scope: ScopeId) -> bool {
        scope == Self::ROOT
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.0 as usize].parent
    }

    /// Creates a child scope of `scope`.
    pub fn extend(&mut self, scope: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent: Some(scope),
            vars: IndexMap::new(),
        });
        id
    }

    /// Inserts `binding` into the own map of `scope`, shadowing inherited entries.
    pub fn define(&mut self, scope: ScopeId, binding: Binding) -> BindingId {
        let id = BindingId(self.bindings.len() as u32);
        let name = binding.name.clone();
        self.bindings.push(Binding { scope, ..binding });
        self.scopes[scope.0 as usize].vars.insert(name, id);
        id
    }

    /// Nearest scope, starting at `scope`, that owns `name`.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<ScopeId> {
        let mut current = Some(scope);

        while let Some(id) = current {
            let frame = &self.scopes[id.0 as usize];
            if frame.vars.contains_key(name) {
                return Some(id);
            }
            current = frame.parent;
        }

        None
    }

    pub fn get(&self, scope: ScopeId, name: &str) -> Result<BindingId, CompileError> {
        self.lookup(scope, name)
            .and_then(|owner| self.scopes[owner.0 as usize].vars.get(name).copied())
            .ok_or_else(|| CompileError::UndefinedVariable(name.to_owned()))
    }

    /// Replaces the binding of `name` in its owning scope.
    ///
    /// Fails when no scope owns the name, unless `scope` is the root which defines it.
    pub fn set(
        &mut self,
        scope: ScopeId,
        name: &str,
        binding: Binding,
    ) -> Result<BindingId, CompileError> {
        match self.lookup(scope, name) {
            Some(owner) => Ok(self.define(owner, binding)),
            None if self.is_root(scope) => Ok(self.define(scope, binding)),
            None => Err(CompileError::UndefinedVariable(name.to_owned())),
        }
    }

    pub fn is_visible(&self, scope: ScopeId, name: &str) -> bool {
        self.lookup(scope, name).is_some()
    }

    pub fn binding(&self, id: BindingId) -> &Binding {
        &self.bindings[id.0 as usize]
    }

    pub fn binding_mut(&mut self, id: BindingId) -> &mut Binding {
        &mut self.bindings[id.0 as usize]
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }
}
