//! The lexical environment threaded through the checker.

use std::{collections::HashSet, rc::Rc};

use crate::ast::Identifier;

/// The set of identifiers visible at some point of a term.
///
/// Contexts are persistent: `extend` returns a new context that shares its
/// parent frames with `self`, so extending never changes what the caller or a
/// sibling subtree sees. Cloning is a reference count bump.
#[derive(Debug, Clone, Default)]
pub struct Context {
    scope: Option<Rc<Scope>>,
}

#[derive(Debug)]
struct Scope {
    names: HashSet<Identifier>,
    parent: Option<Rc<Scope>>,
}

// Unlink the chain iteratively; a recursive drop would overflow the stack on
// very deep nesting.
impl Drop for Scope {
    fn drop(&mut self) {
        let mut parent = self.parent.take();
        while let Some(scope) = parent {
            match Rc::try_unwrap(scope) {
                Ok(mut scope) => parent = scope.parent.take(),
                Err(_) => break,
            }
        }
    }
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        let mut scope = self.scope.as_deref();
        while let Some(s) = scope {
            if s.names.contains(name) {
                return true;
            }
            scope = s.parent.as_deref();
        }
        false
    }

    /// Returns a context where `names` are bound in addition to everything
    /// bound in `self`. Names already bound are shadowed.
    pub fn extend<'a, I>(&self, names: I) -> Context
    where
        I: IntoIterator<Item = &'a Identifier>,
    {
        let names: HashSet<Identifier> = names.into_iter().cloned().collect();
        if names.is_empty() {
            return self.clone();
        }
        Context {
            scope: Some(Rc::new(Scope {
                names,
                parent: self.scope.clone(),
            })),
        }
    }

    /// Every visible name, innermost scope first, each name once.
    pub fn names(&self) -> Vec<Identifier> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        let mut scope = self.scope.as_deref();
        while let Some(s) = scope {
            let mut frame: Vec<_> = s.names.iter().filter(|n| seen.insert(*n)).collect();
            frame.sort();
            result.extend(frame.into_iter().cloned());
            scope = s.parent.as_deref();
        }
        result
    }
}

impl FromIterator<Identifier> for Context {
    fn from_iter<T: IntoIterator<Item = Identifier>>(iter: T) -> Self {
        let names: Vec<Identifier> = iter.into_iter().collect();
        Context::new().extend(&names)
    }
}

impl<'a> FromIterator<&'a str> for Context {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        iter.into_iter().map(Identifier::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extend_does_not_touch_parent() {
        let outer: Context = ["x"].into_iter().collect();
        let inner = outer.extend(&[Identifier::from("y")]);
        assert!(inner.contains("x"));
        assert!(inner.contains("y"));
        assert!(outer.contains("x"));
        assert!(!outer.contains("y"));
    }

    #[test]
    fn test_siblings_are_independent() {
        let root: Context = ["a"].into_iter().collect();
        let left = root.extend(&[Identifier::from("l")]);
        let right = root.extend(&[Identifier::from("r")]);
        assert!(left.contains("l") && !left.contains("r"));
        assert!(right.contains("r") && !right.contains("l"));
    }

    #[test]
    fn test_shadowing_lists_name_once() {
        let outer: Context = ["x", "y"].into_iter().collect();
        let inner = outer.extend(&[Identifier::from("x"), Identifier::from("z")]);
        assert_eq!(
            inner.names(),
            vec![
                Identifier::from("x"),
                Identifier::from("z"),
                Identifier::from("y"),
            ]
        );
    }

    #[test]
    fn test_empty_extension_reuses_scope() {
        let empty = Context::new();
        assert!(empty.scope.is_none());
        assert!(empty.extend(std::iter::empty()).scope.is_none());
        assert!(!empty.contains("x"));
    }
}
