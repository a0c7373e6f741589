//! Runtime variable frames.
//!
//! Same contract as the compile-time environment: `define` writes the frame's own
//! map, `set` writes the owning frame and only the global frame may create a name on
//! demand.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use super::value::Value;
use crate::error::RuntimeError;

pub struct Frame<'p> {
    vars: RefCell<HashMap<String, Value<'p>>>,
    parent: Option<Rc<Frame<'p>>>,
}

impl<'p> Frame<'p> {
    pub fn global() -> Rc<Self> {
        Rc::new(Frame {
            vars: RefCell::new(HashMap::new()),
            parent: None,
        })
    }

    pub fn extend(parent: &Rc<Self>) -> Rc<Self> {
        Rc::new(Frame {
            vars: RefCell::new(HashMap::new()),
            parent: Some(parent.clone()),
        })
    }

    pub fn is_global(&self) -> bool {
        self.parent.is_none()
    }

    pub fn define(&self, name: &str, value: Value<'p>) {
        self.vars.borrow_mut().insert(name.to_owned(), value);
    }

    /// Nearest frame, starting at `self`, that owns `name`.
    pub fn lookup<'a>(&'a self, name: &str) -> Option<&'a Frame<'p>> {
        let mut current = Some(self);

        while let Some(frame) = current {
            if frame.vars.borrow().contains_key(name) {
                return Some(frame);
            }
            current = frame.parent.as_deref();
        }

        None
    }

    pub fn get(&self, name: &str) -> Result<Value<'p>, RuntimeError> {
        self.lookup(name)
            .and_then(|frame| frame.vars.borrow().get(name).cloned())
            .ok_or_else(|| RuntimeError::UndefinedVariable(name.to_owned()))
    }

    pub fn set(&self, name: &str, value: Value<'p>) -> Result<(), RuntimeError> {
        match self.lookup(name) {
            Some(owner) => owner.define(name, value),
            None if self.is_global() => self.define(name, value),
            None => return Err(RuntimeError::UndefinedVariable(name.to_owned())),
        }
        Ok(())
    }
}
