use std::{fs, process::ExitCode};

use scopeck_cli::{check_source, is_complete, parse_args, print_diagnostic, USAGE};
use scopeck_engine::{
    check::{Checker, ScopeError},
    reader::read_program,
};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli_args = match parse_args(&args) {
        Ok(cli_args) => cli_args,
        Err(message) => {
            eprintln!("Error: {}\n\n{}", message, USAGE);
            return ExitCode::from(2);
        }
    };
    if cli_args.help {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    tracing_subscriber::fmt()
        .with_max_level(if cli_args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    let checker = Checker::with_options(cli_args.options());

    if let Some(path) = &cli_args.path {
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("Error reading {}: {}", path.display(), e);
                return ExitCode::from(2);
            }
        };
        return match read_program(&source).and_then(|p| checker.check_program(&p)) {
            Ok(()) => {
                println!("ok");
                ExitCode::SUCCESS
            }
            Err(e) => {
                print_diagnostic(&e);
                ExitCode::FAILURE
            }
        };
    }

    let context = cli_args.context();
    tracing::info!(
        parameters = ?context.names(),
        options = ?checker.options(),
        "starting shell"
    );
    let mut rl = match rustyline::DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Error starting the shell: {}", e);
            return ExitCode::from(2);
        }
    };
    let mut code = String::new();
    while let Ok(line) = rl.readline(if code.is_empty() { "> " } else { ". " }) {
        code.push_str(&line);
        code.push('\n');
        if !is_complete(&code) {
            continue;
        }
        let input = std::mem::take(&mut code);
        if input.trim().is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(input.trim());

        match check_source(&input, &checker, &context) {
            Ok(()) => println!("ok"),
            Err(e @ ScopeError::MalformedTerm { .. }) => eprintln!("Error: {}", e),
            Err(e) => print_diagnostic(&e),
        }
    }
    ExitCode::SUCCESS
}
