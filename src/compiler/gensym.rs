//! Fresh name generation.

use std::collections::HashSet;

use super::ast::Node;

/// Prefix of every generated name.
pub const SENTINEL: &str = "β_";

/// Produces names that collide neither with each other nor with any name it has been
/// shown through [`NameGen::observe`] or [`NameGen::reserve`].
#[derive(Debug, Default)]
pub struct NameGen {
    counter: u64,
    taken: HashSet<String>,
}

impl NameGen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks every identifier of `tree` as taken.
    pub fn observe(&mut self, tree: &Node) {
        tree.for_each_name(&mut |name| {
            self.taken.insert(name.to_owned());
        });
    }

    pub fn reserve(&mut self, name: &str) {
        self.taken.insert(name.to_owned());
    }

    pub fn fresh(&mut self, hint: &str) -> String {
        loop {
            self.counter += 1;
            let name = format!("{}{}{}", SENTINEL, hint, self.counter);
            if self.taken.insert(name.clone()) {
                return name;
            }
        }
    }
}
