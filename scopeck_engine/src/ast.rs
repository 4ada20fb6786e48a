use std::{borrow::Borrow, rc::Rc};

use serde::Serialize;

/// A variable name. Two identifiers are equal when their names are equal,
/// regardless of where they were bound.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identifier(Rc<str>);

impl Identifier {
    pub fn new(name: &str) -> Self {
        Self(Rc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Identifier::new(name)
    }
}

impl From<String> for Identifier {
    fn from(name: String) -> Self {
        Self(Rc::from(name))
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Term {
    Immediate(i64),
    Reference(Identifier),
    /// Simultaneous binding: the values cannot see each other.
    Let {
        bindings: Vec<Binding>,
        body: Box<Term>,
    },
    /// Mutually recursive binding: every value sees every binder.
    LetRec {
        bindings: Vec<Binding>,
        body: Box<Term>,
    },
    Abstract {
        parameters: Vec<Identifier>,
        body: Box<Term>,
    },
    Apply {
        function: Box<Term>,
        arguments: Vec<Term>,
    },
    Primitive {
        operator: Operator,
        operands: Vec<Term>,
    },
    Branch {
        condition: Box<Term>,
        consequent: Box<Term>,
        alternative: Box<Term>,
    },
    Allocate {
        initializers: Vec<Term>,
    },
    Load {
        collection: Box<Term>,
        index: Box<Term>,
    },
    Store {
        collection: Box<Term>,
        index: Box<Term>,
        value: Box<Term>,
    },
    /// The effects are evaluated for their side effects only; `result` is the value.
    Begin {
        effects: Vec<Term>,
        result: Box<Term>,
    },
}

// Move children onto a heap stack before they drop; the derived drop
// recurses once per level and overflows on very deep trees.
impl Drop for Term {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.take_children(&mut pending);
        while let Some(mut term) = pending.pop() {
            term.take_children(&mut pending);
        }
    }
}

impl Term {
    fn take_children(&mut self, pending: &mut Vec<Term>) {
        fn take(term: &mut Term) -> Term {
            std::mem::replace(term, Term::Immediate(0))
        }
        match self {
            Term::Immediate(_) | Term::Reference(_) => {}
            Term::Let { bindings, body } | Term::LetRec { bindings, body } => {
                pending.extend(bindings.drain(..).map(|b| b.value));
                pending.push(take(body));
            }
            Term::Abstract { body, .. } => pending.push(take(body)),
            Term::Apply {
                function,
                arguments,
            } => {
                pending.append(arguments);
                pending.push(take(function));
            }
            Term::Primitive { operands, .. } => pending.append(operands),
            Term::Branch {
                condition,
                consequent,
                alternative,
            } => pending.extend([take(condition), take(consequent), take(alternative)]),
            Term::Allocate { initializers } => pending.append(initializers),
            Term::Load { collection, index } => {
                pending.extend([take(collection), take(index)]);
            }
            Term::Store {
                collection,
                index,
                value,
            } => pending.extend([take(collection), take(index), take(value)]),
            Term::Begin { effects, result } => {
                pending.append(effects);
                pending.push(take(result));
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub name: Identifier,
    pub value: Term,
}

/// A whole compilation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Program {
    pub parameters: Vec<Identifier>,
    pub body: Term,
}

impl Program {
    pub fn new<I, N>(parameters: I, body: Term) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Identifier>,
    {
        Self {
            parameters: parameters.into_iter().map(Into::into).collect(),
            body,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Lt,
    Eq,
}

impl Operator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(Operator::Add),
            "-" => Some(Operator::Sub),
            "*" => Some(Operator::Mul),
            "<" => Some(Operator::Lt),
            "=" => Some(Operator::Eq),
            _ => None,
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operator::Add => write!(f, "+"),
            Operator::Sub => write!(f, "-"),
            Operator::Mul => write!(f, "*"),
            Operator::Lt => write!(f, "<"),
            Operator::Eq => write!(f, "="),
        }
    }
}

fn bindings<I, N>(pairs: I) -> Vec<Binding>
where
    I: IntoIterator<Item = (N, Term)>,
    N: Into<Identifier>,
{
    pairs
        .into_iter()
        .map(|(name, value)| Binding {
            name: name.into(),
            value,
        })
        .collect()
}

// Shorthands for building trees by hand, mostly in tests and in the reader.
impl Term {
    pub fn reference(name: impl Into<Identifier>) -> Self {
        Term::Reference(name.into())
    }

    pub fn let_in<I, N>(pairs: I, body: Term) -> Self
    where
        I: IntoIterator<Item = (N, Term)>,
        N: Into<Identifier>,
    {
        Term::Let {
            bindings: bindings(pairs),
            body: Box::new(body),
        }
    }

    pub fn letrec_in<I, N>(pairs: I, body: Term) -> Self
    where
        I: IntoIterator<Item = (N, Term)>,
        N: Into<Identifier>,
    {
        Term::LetRec {
            bindings: bindings(pairs),
            body: Box::new(body),
        }
    }

    pub fn lambda<I, N>(parameters: I, body: Term) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Identifier>,
    {
        Term::Abstract {
            parameters: parameters.into_iter().map(Into::into).collect(),
            body: Box::new(body),
        }
    }

    pub fn apply(function: Term, arguments: Vec<Term>) -> Self {
        Term::Apply {
            function: Box::new(function),
            arguments,
        }
    }

    pub fn branch(condition: Term, consequent: Term, alternative: Term) -> Self {
        Term::Branch {
            condition: Box::new(condition),
            consequent: Box::new(consequent),
            alternative: Box::new(alternative),
        }
    }

    pub fn load(collection: Term, index: Term) -> Self {
        Term::Load {
            collection: Box::new(collection),
            index: Box::new(index),
        }
    }

    pub fn store(collection: Term, index: Term, value: Term) -> Self {
        Term::Store {
            collection: Box::new(collection),
            index: Box::new(index),
            value: Box::new(value),
        }
    }

    pub fn begin(effects: Vec<Term>, result: Term) -> Self {
        Term::Begin {
            effects,
            result: Box::new(result),
        }
    }
}
