//! Reads terms and programs written as s-expressions.
//!
//! This is the boundary where untyped data becomes a `Term`, so anything that
//! is not one of the known forms is reported as `ScopeError::MalformedTerm`.

use lexpr::Value;

use crate::{
    ast::{Binding, Identifier, Operator, Program, Term},
    check::ScopeError,
};

const RESERVED: &[&str] = &[
    "let", "letrec", "lambda", "if", "prim", "allocate", "load", "store", "begin", "program",
];

/// Either a whole `(program ...)` form or a bare term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toplevel {
    Program(Program),
    Term(Term),
}

pub fn read_term(text: &str) -> Result<Term, ScopeError> {
    term(&parse(text)?)
}

pub fn read_program(text: &str) -> Result<Program, ScopeError> {
    program(&parse(text)?)
}

pub fn read_toplevel(text: &str) -> Result<Toplevel, ScopeError> {
    let value = parse(text)?;
    if head_symbol(&value) == Some("program") {
        Ok(Toplevel::Program(program(&value)?))
    } else {
        Ok(Toplevel::Term(term(&value)?))
    }
}

fn parse(text: &str) -> Result<Value, ScopeError> {
    lexpr::from_str(text).map_err(|e| malformed(format!("invalid s-expression: {}", e)))
}

fn malformed(reason: impl Into<String>) -> ScopeError {
    ScopeError::MalformedTerm {
        reason: reason.into(),
    }
}

fn program(value: &Value) -> Result<Program, ScopeError> {
    let items = list(value)
        .ok_or_else(|| malformed(format!("expected a program, found `{}`", value)))?;
    match items.as_slice() {
        [head, parameters, body] if symbol(head) == Some("program") => Ok(Program {
            parameters: identifiers(parameters)?,
            body: term(body)?,
        }),
        _ => Err(malformed(format!(
            "a program must look like `(program (parameter ...) body)`, found `{}`",
            value
        ))),
    }
}

fn term(value: &Value) -> Result<Term, ScopeError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(Term::Immediate)
            .ok_or_else(|| malformed(format!("integer literal `{}` is out of range", n))),
        Value::Bool(b) => Ok(Term::Immediate(i64::from(*b))),
        Value::Symbol(_) => Ok(Term::Reference(identifier(value)?)),
        Value::Cons(_) => form(value),
        Value::Null => Err(malformed("empty application `()`")),
        other => Err(malformed(format!("unsupported term `{}`", other))),
    }
}

fn form(value: &Value) -> Result<Term, ScopeError> {
    let items = list(value).ok_or_else(|| malformed(format!("improper list `{}`", value)))?;
    let Some((head, args)) = items.split_first() else {
        return Err(malformed("empty application `()`"));
    };
    let parsed = match symbol(head) {
        Some("let") => {
            let [bindings, body] = arguments("let", args)?;
            Term::Let {
                bindings: binding_list("let", bindings)?,
                body: Box::new(term(body)?),
            }
        }
        Some("letrec") => {
            let [bindings, body] = arguments("letrec", args)?;
            Term::LetRec {
                bindings: binding_list("letrec", bindings)?,
                body: Box::new(term(body)?),
            }
        }
        Some("lambda") => {
            let [parameters, body] = arguments("lambda", args)?;
            Term::Abstract {
                parameters: identifiers(parameters)?,
                body: Box::new(term(body)?),
            }
        }
        Some("if") => {
            let [condition, consequent, alternative] = arguments("if", args)?;
            Term::branch(term(condition)?, term(consequent)?, term(alternative)?)
        }
        Some("prim") => {
            let Some((op, operands)) = args.split_first() else {
                return Err(malformed("`prim` expects an operator"));
            };
            let operator = symbol(op)
                .and_then(Operator::from_symbol)
                .ok_or_else(|| malformed(format!("unknown primitive operator `{}`", op)))?;
            Term::Primitive {
                operator,
                operands: terms(operands)?,
            }
        }
        Some("allocate") => Term::Allocate {
            initializers: terms(args)?,
        },
        Some("load") => {
            let [collection, index] = arguments("load", args)?;
            Term::load(term(collection)?, term(index)?)
        }
        Some("store") => {
            let [collection, index, value] = arguments("store", args)?;
            Term::store(term(collection)?, term(index)?, term(value)?)
        }
        Some("begin") => {
            let Some((result, effects)) = args.split_last() else {
                return Err(malformed("`begin` expects at least one term"));
            };
            Term::begin(terms(effects)?, term(result)?)
        }
        Some("program") => return Err(malformed("`program` can only appear at the top level")),
        _ => Term::apply(term(head)?, terms(args)?),
    };
    Ok(parsed)
}

fn arguments<'v, const N: usize>(
    form: &str,
    args: &[&'v Value],
) -> Result<[&'v Value; N], ScopeError> {
    args.try_into().map_err(|_| {
        malformed(format!(
            "`{}` expects {} arguments, found {}",
            form,
            N,
            args.len()
        ))
    })
}

fn terms(values: &[&Value]) -> Result<Vec<Term>, ScopeError> {
    values.iter().map(|v| term(v)).collect()
}

fn binding_list(form: &str, value: &Value) -> Result<Vec<Binding>, ScopeError> {
    let items = list(value).ok_or_else(|| {
        malformed(format!(
            "`{}` expects a list of bindings, found `{}`",
            form, value
        ))
    })?;
    items
        .into_iter()
        .map(|item| match list(item).as_deref() {
            Some([name, value]) => Ok(Binding {
                name: identifier(name)?,
                value: term(value)?,
            }),
            _ => Err(malformed(format!(
                "`{}` bindings look like `(name value)`, found `{}`",
                form, item
            ))),
        })
        .collect()
}

fn identifiers(value: &Value) -> Result<Vec<Identifier>, ScopeError> {
    list(value)
        .ok_or_else(|| malformed(format!("expected a list of names, found `{}`", value)))?
        .into_iter()
        .map(identifier)
        .collect()
}

fn identifier(value: &Value) -> Result<Identifier, ScopeError> {
    match symbol(value) {
        Some(name) if RESERVED.contains(&name) => {
            Err(malformed(format!("`{}` is reserved and cannot name a variable", name)))
        }
        Some(name) => Ok(Identifier::from(name)),
        None => Err(malformed(format!("expected a name, found `{}`", value))),
    }
}

fn symbol(value: &Value) -> Option<&str> {
    match value {
        Value::Symbol(s) => Some(&**s),
        _ => None,
    }
}

fn head_symbol(value: &Value) -> Option<&str> {
    match value {
        Value::Cons(cons) => symbol(cons.car()),
        _ => None,
    }
}

/// The elements of a proper list, or `None` for anything else.
fn list(value: &Value) -> Option<Vec<&Value>> {
    let mut items = Vec::new();
    let mut rest = value;
    loop {
        match rest {
            Value::Null | Value::Nil => return Some(items),
            Value::Cons(cons) => {
                items.push(cons.car());
                rest = cons.cdr();
            }
            _ => return None,
        }
    }
}
