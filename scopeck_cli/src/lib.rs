//! Argument handling, input chunking and diagnostic rendering for the
//! `scopeck` shell. Kept out of `main.rs` so it can be tested.
use std::path::PathBuf;

use miette::{Diagnostic, GraphicalReportHandler, GraphicalTheme};
use scopeck_engine::{
    check::{CheckOptions, Checker, LetScoping, ScopeError},
    context::Context,
    reader::{read_toplevel, Toplevel},
};

pub const USAGE: &str = "\
usage: scopeck [--sequential-let] [--param NAME]... [--verbose] [FILE]

Checks a `(program (parameter ...) body)` form in FILE, or starts an
interactive shell when no file is given.

  --sequential-let   let right-hand sides see the binders to their left
  -p, --param NAME   bind NAME in the shell's initial context
  -v, --verbose      log the checker's progress to stderr";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    pub path: Option<PathBuf>,
    pub parameters: Vec<String>,
    pub sequential_let: bool,
    pub verbose: bool,
    pub help: bool,
}

impl CliArgs {
    pub fn options(&self) -> CheckOptions {
        CheckOptions {
            let_scoping: if self.sequential_let {
                LetScoping::Sequential
            } else {
                LetScoping::Simultaneous
            },
        }
    }

    /// The context terms typed into the shell are checked under.
    pub fn context(&self) -> Context {
        self.parameters.iter().map(String::as_str).collect()
    }
}

/// Parses the arguments that follow the program name.
pub fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut result = CliArgs::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--sequential-let" => result.sequential_let = true,
            "--verbose" | "-v" => result.verbose = true,
            "--help" | "-h" => result.help = true,
            "--param" | "-p" => {
                i += 1;
                match args.get(i) {
                    Some(name) => result.parameters.push(name.clone()),
                    None => return Err("--param requires a name".to_string()),
                }
            }
            flag if flag.starts_with('-') => return Err(format!("unknown option {}", flag)),
            path => {
                if result.path.is_some() {
                    return Err(format!("unexpected argument {}", path));
                }
                result.path = Some(PathBuf::from(path));
            }
        }
        i += 1;
    }
    Ok(result)
}

/// Whether `code` closes every parenthesis it opens, ignoring string literals
/// and `;` comments. The shell keeps reading lines until this holds.
pub fn is_complete(code: &str) -> bool {
    let mut depth = 0i64;
    let mut in_string = false;
    let mut chars = code.chars();
    while let Some(c) = chars.next() {
        if in_string {
            match c {
                '\\' => {
                    chars.next();
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            ';' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
    }
    !in_string && depth <= 0
}

/// Reads `source` and checks it. A `(program ...)` form is checked on its own;
/// any other term is checked under `context`.
pub fn check_source(source: &str, checker: &Checker, context: &Context) -> Result<(), ScopeError> {
    match read_toplevel(source)? {
        Toplevel::Program(program) => checker.check_program(&program),
        Toplevel::Term(term) => checker.check_term(&term, context),
    }
}

pub fn render_diagnostic<T: Diagnostic>(diagnostic: &T, theme: GraphicalTheme) -> String {
    let handler = GraphicalReportHandler::new_themed(theme);
    let mut string = String::new();
    let _ = handler.render_report(&mut string, diagnostic);
    string
}

pub fn print_diagnostic<T: Diagnostic>(diagnostic: &T) {
    eprintln!("{}", render_diagnostic(diagnostic, GraphicalTheme::default()));
}
