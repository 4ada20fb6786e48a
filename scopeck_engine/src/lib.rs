pub mod ast;
pub mod check;
pub mod context;
pub mod reader;

pub use ast::{Binding, Identifier, Operator, Program, Term};
pub use check::{
    check_program, check_term, CheckOptions, Checker, Construct, LetScoping, ScopeError,
};
pub use context::Context;
