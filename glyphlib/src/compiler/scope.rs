use std::collections::HashSet;

/// Lexical scopes for name checks. At runtime locals are a flat map, so a
/// declaration of a name visible in an outer scope writes that same local.
pub(super) struct ScopeStack {
    scopes: Vec<HashSet<String>>,
}

impl ScopeStack {
    /// The outermost scope holds the pre-declared names of the body.
    pub(super) fn new(prelude: &[String]) -> Self {
        Self {
            scopes: vec![prelude.iter().cloned().collect()],
        }
    }

    pub(super) fn push_block(&mut self) {
        self.scopes.push(HashSet::new());
    }

    pub(super) fn pop_block(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub(super) fn declared_here(&self, name: &str) -> bool {
        self.scopes.last().is_some_and(|s| s.contains(name))
    }

    pub(super) fn resolve(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|s| s.contains(name))
    }

    pub(super) fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }
}
