//! Lexical scope chain for aliases inherited from enclosing blocks.
//!
//! Each nested query block pushes a child scope on entry and restores the
//! parent on exit; lookup walks the chain outward. The planner treats an
//! alias found in an outer frame as external and rematerializes it.

use std::collections::HashSet;

use crate::utils::Ident;

#[derive(Debug, Clone, Default)]
pub struct OuterScope {
    aliases: HashSet<Ident>,
    parent: Option<Box<OuterScope>>,
}

impl OuterScope {
    pub fn root() -> Self {
        OuterScope::default()
    }

    /// Enter a nested block that inherits `self` and declares `aliases`.
    pub fn child(self, aliases: impl IntoIterator<Item = Ident>) -> Self {
        OuterScope {
            aliases: aliases.into_iter().collect(),
            parent: Some(Box::new(self)),
        }
    }

    /// Leave the current block, restoring the enclosing scope.
    pub fn into_parent(self) -> Option<OuterScope> {
        self.parent.map(|parent| *parent)
    }

    pub fn contains(&self, alias: &Ident) -> bool {
        if self.aliases.contains(alias) {
            return true;
        }
        match &self.parent {
            Some(parent) => parent.contains(alias),
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty() && self.parent.is_none()
    }
}
