//! The scope checking pass.
//!
//! The walk is depth first and left to right, and stops at the first
//! violation. It is driven by an explicit work list rather than by recursion,
//! so arbitrarily deep trees cannot overflow the stack. Since the list is
//! LIFO, children are pushed in reverse evaluation order.

use std::collections::HashSet;

use miette::Diagnostic;
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    ast::{Identifier, Program, Term},
    context::Context,
};

/// How the right-hand sides of a `Let` see the binders of that same `Let`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LetScoping {
    /// No right-hand side sees any binder of its own `Let`.
    #[default]
    Simultaneous,
    /// Each right-hand side sees the binders to its left (`let*`).
    Sequential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CheckOptions {
    pub let_scoping: LetScoping,
}

/// Checks terms and programs with a fixed set of options. Holds no other
/// state, so one checker can be reused for any number of trees.
#[derive(Debug, Clone, Copy, Default)]
pub struct Checker {
    options: CheckOptions,
}

/// Checks `program` with the default options.
pub fn check_program(program: &Program) -> Result<(), ScopeError> {
    Checker::new().check_program(program)
}

/// Checks `term` under `context` with the default options.
pub fn check_term(term: &Term, context: &Context) -> Result<(), ScopeError> {
    Checker::new().check_term(term, context)
}

impl Checker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CheckOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> CheckOptions {
        self.options
    }

    #[tracing::instrument(level = "debug", skip_all, fields(parameters = program.parameters.len()))]
    pub fn check_program(&self, program: &Program) -> Result<(), ScopeError> {
        ensure_distinct(Construct::Program, &program.parameters)?;
        let context = Context::new().extend(&program.parameters);
        self.check_term(&program.body, &context)
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn check_term(&self, term: &Term, context: &Context) -> Result<(), ScopeError> {
        let mut work = WorkList::default();
        work.push(term, context.clone());
        let mut visited = 0usize;
        while let Some((term, context)) = work.pending.pop() {
            visited += 1;
            self.visit(term, context, &mut work)?;
        }
        debug!(visited, "term is well scoped");
        Ok(())
    }

    /// Checks the node itself and schedules its children.
    fn visit<'t>(
        &self,
        term: &'t Term,
        context: Context,
        work: &mut WorkList<'t>,
    ) -> Result<(), ScopeError> {
        match term {
            Term::Immediate(_) => {}
            Term::Reference(name) => {
                if !context.contains(name.as_str()) {
                    debug!(%name, "unbound identifier");
                    return Err(ScopeError::UnboundIdentifier { name: name.clone() });
                }
            }
            Term::Let { bindings, body } => {
                ensure_distinct(Construct::Let, bindings.iter().map(|b| &b.name))?;
                trace!(binders = bindings.len(), "entering let");
                work.push(body, context.extend(bindings.iter().map(|b| &b.name)));
                match self.options.let_scoping {
                    LetScoping::Simultaneous => {
                        work.push_all(bindings.iter().map(|b| &b.value), &context);
                    }
                    LetScoping::Sequential => {
                        let mut scoped = Vec::with_capacity(bindings.len());
                        let mut visible = context;
                        for binding in bindings {
                            scoped.push((&binding.value, visible.clone()));
                            visible = visible.extend([&binding.name]);
                        }
                        work.pending.extend(scoped.into_iter().rev());
                    }
                }
            }
            Term::LetRec { bindings, body } => {
                ensure_distinct(Construct::LetRec, bindings.iter().map(|b| &b.name))?;
                trace!(binders = bindings.len(), "entering letrec");
                let extended = context.extend(bindings.iter().map(|b| &b.name));
                work.push(body, extended.clone());
                work.push_all(bindings.iter().map(|b| &b.value), &extended);
            }
            Term::Abstract { parameters, body } => {
                ensure_distinct(Construct::Abstract, parameters)?;
                trace!(parameters = parameters.len(), "entering abstraction");
                work.push(body, context.extend(parameters));
            }
            Term::Apply {
                function,
                arguments,
            } => {
                work.push_all(arguments, &context);
                work.push(function, context);
            }
            Term::Primitive { operands, .. } => work.push_all(operands, &context),
            Term::Branch {
                condition,
                consequent,
                alternative,
            } => work.push_all([&**condition, &**consequent, &**alternative], &context),
            Term::Allocate { initializers } => work.push_all(initializers, &context),
            Term::Load { collection, index } => {
                work.push_all([&**collection, &**index], &context);
            }
            Term::Store {
                collection,
                index,
                value,
            } => work.push_all([&**collection, &**index, &**value], &context),
            Term::Begin { effects, result } => {
                work.push(result, context.clone());
                work.push_all(effects, &context);
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct WorkList<'t> {
    pending: Vec<(&'t Term, Context)>,
}

impl<'t> WorkList<'t> {
    fn push(&mut self, term: &'t Term, context: Context) {
        self.pending.push((term, context));
    }

    /// Schedules `terms` so that they are visited in iteration order.
    fn push_all<I>(&mut self, terms: I, context: &Context)
    where
        I: IntoIterator<Item = &'t Term>,
        I::IntoIter: DoubleEndedIterator,
    {
        self.pending
            .extend(terms.into_iter().rev().map(|t| (t, context.clone())));
    }
}

fn ensure_distinct<'a, I>(construct: Construct, names: I) -> Result<(), ScopeError>
where
    I: IntoIterator<Item = &'a Identifier>,
{
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            debug!(%name, %construct, "duplicate binder");
            return Err(ScopeError::DuplicateBinder {
                construct,
                name: name.clone(),
            });
        }
    }
    Ok(())
}

/// The binding form a duplicate binder was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Construct {
    Program,
    Let,
    LetRec,
    Abstract,
}

impl std::fmt::Display for Construct {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Construct::Program => write!(f, "program"),
            Construct::Let => write!(f, "let"),
            Construct::LetRec => write!(f, "letrec"),
            Construct::Abstract => write!(f, "abstract"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ScopeError {
    #[error("Reference to unbound identifier [{name}]")]
    #[diagnostic(
        code(scopeck::unbound_identifier),
        help("Names must be bound by an enclosing let, letrec, lambda or program parameter.")
    )]
    UnboundIdentifier { name: Identifier },

    #[error("Duplicate binder [{name}] in {construct}")]
    #[diagnostic(
        code(scopeck::duplicate_binder),
        help("A name can appear only once in the binder list of a single construct.")
    )]
    DuplicateBinder {
        construct: Construct,
        name: Identifier,
    },

    /// Only produced when a tree crosses an untyped boundary, such as the reader.
    #[error("Malformed term: {reason}")]
    #[diagnostic(code(scopeck::malformed_term))]
    MalformedTerm { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Operator;
    use pretty_assertions::assert_eq;

    fn unbound(name: &str) -> Result<(), ScopeError> {
        Err(ScopeError::UnboundIdentifier { name: name.into() })
    }

    fn duplicate(construct: Construct, name: &str) -> Result<(), ScopeError> {
        Err(ScopeError::DuplicateBinder {
            construct,
            name: name.into(),
        })
    }

    fn r(name: &str) -> Term {
        Term::reference(name)
    }

    #[test]
    fn test_reference() {
        let context: Context = ["x"].into_iter().collect();
        assert_eq!(check_term(&r("x"), &context), Ok(()));
        assert_eq!(check_term(&r("y"), &context), unbound("y"));
        assert_eq!(check_term(&Term::Immediate(3), &Context::new()), Ok(()));
    }

    #[test]
    fn test_well_scoped_program() {
        // (program (n) (letrec ((loop (lambda (i acc) ...))) (loop n 0)))
        let body = Term::letrec_in(
            [(
                "loop",
                Term::lambda(
                    ["i", "acc"],
                    Term::branch(
                        Term::Primitive {
                            operator: Operator::Eq,
                            operands: vec![r("i"), Term::Immediate(0)],
                        },
                        r("acc"),
                        Term::apply(
                            r("loop"),
                            vec![
                                Term::Primitive {
                                    operator: Operator::Sub,
                                    operands: vec![r("i"), Term::Immediate(1)],
                                },
                                Term::Primitive {
                                    operator: Operator::Add,
                                    operands: vec![r("acc"), r("i")],
                                },
                            ],
                        ),
                    ),
                ),
            )],
            Term::apply(r("loop"), vec![r("n"), Term::Immediate(0)]),
        );
        assert_eq!(check_program(&Program::new(["n"], body)), Ok(()));
    }

    #[test]
    fn test_memory_operations() {
        let body = Term::let_in(
            [(
                "block",
                Term::Allocate {
                    initializers: vec![Term::Immediate(0), r("seed")],
                },
            )],
            Term::begin(
                vec![Term::store(r("block"), Term::Immediate(1), r("seed"))],
                Term::load(r("block"), Term::Immediate(1)),
            ),
        );
        assert_eq!(check_program(&Program::new(["seed"], body.clone())), Ok(()));
        assert_eq!(
            check_program(&Program::new(Vec::<&str>::new(), body)),
            unbound("seed")
        );
    }

    #[test]
    fn test_shadowing() {
        let term = Term::lambda(["x"], Term::lambda(["x"], r("x")));
        assert_eq!(check_term(&term, &Context::new()), Ok(()));

        // The inner `y` is initialized from the outer one.
        let term = Term::let_in(
            [("y", Term::Immediate(1))],
            Term::begin(vec![Term::let_in([("y", r("y"))], r("y"))], r("y")),
        );
        assert_eq!(check_term(&term, &Context::new()), Ok(()));
    }

    #[test]
    fn test_let_is_simultaneous() {
        let term = Term::let_in(
            [("x", Term::Immediate(5)), ("y", r("x"))],
            Term::Immediate(0),
        );
        assert_eq!(check_term(&term, &Context::new()), unbound("x"));

        let own_name = Term::let_in([("x", r("x"))], r("x"));
        assert_eq!(check_term(&own_name, &Context::new()), unbound("x"));
    }

    #[test]
    fn test_let_values_see_outer_binding() {
        let term = Term::let_in(
            [("x", Term::Immediate(5)), ("y", r("x"))],
            r("y"),
        );
        let context: Context = ["x"].into_iter().collect();
        assert_eq!(check_term(&term, &context), Ok(()));
    }

    #[test]
    fn test_sequential_let_option() {
        let checker = Checker::with_options(CheckOptions {
            let_scoping: LetScoping::Sequential,
        });
        let term = Term::let_in(
            [("x", Term::Immediate(5)), ("y", r("x"))],
            Term::apply(r("x"), vec![r("y")]),
        );
        assert_eq!(checker.check_term(&term, &Context::new()), Ok(()));

        // Later binders are still invisible, and so is a binding's own name.
        let term = Term::let_in([("x", r("y")), ("y", Term::Immediate(1))], r("x"));
        assert_eq!(checker.check_term(&term, &Context::new()), unbound("y"));
        let term = Term::let_in([("x", r("x"))], r("x"));
        assert_eq!(checker.check_term(&term, &Context::new()), unbound("x"));

        let term = Term::let_in([("x", Term::Immediate(0)), ("x", r("x"))], r("x"));
        assert_eq!(
            checker.check_term(&term, &Context::new()),
            duplicate(Construct::Let, "x")
        );
    }

    #[test]
    fn test_letrec_is_recursive() {
        let term = Term::letrec_in([("f", r("f"))], r("f"));
        assert_eq!(check_term(&term, &Context::new()), Ok(()));

        let term = Term::letrec_in(
            [
                ("even", Term::lambda(["n"], Term::apply(r("odd"), vec![r("n")]))),
                ("odd", Term::lambda(["n"], Term::apply(r("even"), vec![r("n")]))),
            ],
            Term::apply(r("even"), vec![Term::Immediate(10)]),
        );
        assert_eq!(check_term(&term, &Context::new()), Ok(()));

        let term = Term::letrec_in([("f", r("g"))], r("f"));
        assert_eq!(check_term(&term, &Context::new()), unbound("g"));
    }

    #[test]
    fn test_duplicate_binders() {
        let term = Term::let_in(
            [("x", Term::Immediate(0)), ("x", Term::Immediate(1))],
            r("x"),
        );
        assert_eq!(
            check_term(&term, &Context::new()),
            duplicate(Construct::Let, "x")
        );

        let term = Term::letrec_in([("f", r("f")), ("f", r("f"))], r("f"));
        assert_eq!(
            check_term(&term, &Context::new()),
            duplicate(Construct::LetRec, "f")
        );

        let term = Term::lambda(["x", "x"], Term::Immediate(0));
        assert_eq!(
            check_term(&term, &Context::new()),
            duplicate(Construct::Abstract, "x")
        );

        let program = Program::new(["x", "x"], Term::Immediate(0));
        assert_eq!(check_program(&program), duplicate(Construct::Program, "x"));
    }

    #[test]
    fn test_duplicate_binder_reported_before_values() {
        let term = Term::let_in([("x", r("missing")), ("x", Term::Immediate(1))], r("x"));
        assert_eq!(
            check_term(&term, &Context::new()),
            duplicate(Construct::Let, "x")
        );
    }

    #[test]
    fn test_scope_does_not_leak() {
        let term = Term::begin(
            vec![Term::let_in([("x", Term::Immediate(5))], Term::Immediate(10))],
            r("x"),
        );
        assert_eq!(check_term(&term, &Context::new()), unbound("x"));

        let term = Term::apply(Term::lambda(["x"], r("x")), vec![r("x")]);
        assert_eq!(check_term(&term, &Context::new()), unbound("x"));
    }

    #[test]
    fn test_empty_forms() {
        let context: Context = ["f"].into_iter().collect();
        let terms = [
            Term::let_in(Vec::<(&str, Term)>::new(), r("f")),
            Term::letrec_in(Vec::<(&str, Term)>::new(), r("f")),
            Term::lambda(Vec::<&str>::new(), r("f")),
            Term::apply(r("f"), vec![]),
            Term::begin(vec![], r("f")),
            Term::Allocate {
                initializers: vec![],
            },
            Term::Primitive {
                operator: Operator::Add,
                operands: vec![],
            },
        ];
        for term in &terms {
            assert_eq!(check_term(term, &context), Ok(()), "{:?}", term);
        }
    }

    #[test]
    fn test_fail_fast_order() {
        let term = Term::apply(r("undefined1"), vec![r("undefined2")]);
        assert_eq!(check_term(&term, &Context::new()), unbound("undefined1"));

        let term = Term::store(r("a"), r("b"), r("c"));
        assert_eq!(check_term(&term, &Context::new()), unbound("a"));

        let term = Term::branch(Term::Immediate(1), r("then"), r("else"));
        assert_eq!(check_term(&term, &Context::new()), unbound("then"));

        // Values of a let come before its body.
        let term = Term::let_in([("x", r("value"))], r("body"));
        assert_eq!(check_term(&term, &Context::new()), unbound("value"));

        // An error deep in the left subtree wins over a shallow one on the right.
        let term = Term::begin(
            vec![Term::lambda(["a"], Term::load(r("a"), r("deep")))],
            r("shallow"),
        );
        assert_eq!(check_term(&term, &Context::new()), unbound("deep"));

        // Letrec values come before its body.
        let term = Term::letrec_in([("f", r("a"))], r("b"));
        assert_eq!(check_term(&term, &Context::new()), unbound("a"));

        let term = Term::Primitive {
            operator: Operator::Add,
            operands: vec![r("first"), r("second")],
        };
        assert_eq!(check_term(&term, &Context::new()), unbound("first"));

        let term = Term::Allocate {
            initializers: vec![Term::Immediate(0), r("first"), r("second")],
        };
        assert_eq!(check_term(&term, &Context::new()), unbound("first"));

        let term = Term::load(r("collection"), r("index"));
        assert_eq!(check_term(&term, &Context::new()), unbound("collection"));
    }

    #[test]
    fn test_checker_is_reusable() {
        let checker = Checker::new();
        let term = Term::lambda(["x"], r("x"));
        assert_eq!(checker.check_term(&term, &Context::new()), Ok(()));
        assert_eq!(checker.check_term(&r("x"), &Context::new()), unbound("x"));
        assert_eq!(checker.check_term(&term, &Context::new()), Ok(()));
        assert_eq!(checker.options().let_scoping, LetScoping::Simultaneous);
    }

    #[test]
    fn test_deep_nesting_does_not_overflow() {
        let mut term = r("x0");
        for i in 0..200_000 {
            term = Term::lambda([format!("x{}", i)], term);
        }
        assert_eq!(check_term(&term, &Context::new()), Ok(()));
        drop(term);
    }

    #[test]
    fn test_error_messages() {
        let err = ScopeError::UnboundIdentifier { name: "x".into() };
        assert_eq!(err.to_string(), "Reference to unbound identifier [x]");
        let err = ScopeError::DuplicateBinder {
            construct: Construct::LetRec,
            name: "f".into(),
        };
        assert_eq!(err.to_string(), "Duplicate binder [f] in letrec");
        assert_eq!(
            err.code().map(|c| c.to_string()),
            Some("scopeck::duplicate_binder".to_string())
        );
    }
}
