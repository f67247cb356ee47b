use anyhow::{Context, Result, bail};
use clap::{Parser as ClapParser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use emfrp::{Machine, parse_program};

mod repl;
mod report;

use report::render_syntax_errors;

#[derive(ClapParser)]
#[command(name = "emfrp")]
#[command(about = "Emfrp reactive language CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Raise log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive session on stdin (default)
    Repl,
    /// Evaluate inline code and print a JSON status
    Eval {
        /// The code to evaluate
        code: String,
    },
    /// Run every statement of a file
    Run {
        /// Path to .emfrp file
        file: PathBuf,
    },
    /// Check if code parses correctly
    Check {
        /// Path to .emfrp file
        file: PathBuf,
    },
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum Status {
    Ok { result: serde_json::Value },
    Error { error: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).parse_default_env().init();

    match cli.command.unwrap_or(Commands::Repl) {
        Commands::Repl => repl::run(std::io::stdin().lock(), std::io::stdout().lock()),
        Commands::Eval { code } => {
            let status = eval_code(&code);
            let failed = matches!(status, Status::Error { .. });
            println!("{}", serde_json::to_string_pretty(&status)?);
            if failed {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Run { file } => {
            let code = read_source(&file)?;
            run_code(&code, &file)
        }
        Commands::Check { file } => {
            let code = read_source(&file)?;
            check_code(&code, &file)
        }
    }
}

fn read_source(file: &Path) -> Result<String> {
    fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))
}

/// Executes every statement; the last value is the result.
fn eval_code(code: &str) -> Status {
    let statements = match parse_program(code) {
        Ok(statements) => statements,
        Err(errors) => {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            return Status::Error {
                error: format!("syntax error: {}", messages.join("; ")),
            };
        }
    };
    let mut machine = Machine::new();
    let mut result = serde_json::Value::Null;
    for statement in statements {
        match machine.execute(statement.node) {
            Ok(value) => result = value.to_json(),
            Err(error) => {
                return Status::Error {
                    error: error.to_string(),
                };
            }
        }
    }
    Status::Ok { result }
}

fn run_code(code: &str, file: &Path) -> Result<()> {
    let filename = file.display().to_string();
    let statements = match parse_program(code) {
        Ok(statements) => statements,
        Err(errors) => {
            eprintln!("{}", render_syntax_errors(&filename, code, &errors));
            bail!("{} syntax error(s) in {filename}", errors.len());
        }
    };
    eprintln!("Running: {filename}");
    let mut machine = Machine::new();
    let mut failures = 0;
    for statement in statements {
        match machine.execute(statement.node) {
            Ok(value) => println!("OK, {value}"),
            Err(error) => {
                failures += 1;
                println!("Error: {error}");
            }
        }
    }
    log::debug!("final state:\n{machine}");
    if failures > 0 {
        bail!("{failures} statement(s) failed");
    }
    Ok(())
}

fn check_code(code: &str, file: &Path) -> Result<()> {
    let filename = file.display().to_string();
    eprintln!("Checking: {filename}");
    match parse_program(code) {
        Ok(statements) => {
            println!("OK, {} statement(s)", statements.len());
            Ok(())
        }
        Err(errors) => {
            eprintln!("{}", render_syntax_errors(&filename, code, &errors));
            bail!("{} syntax error(s) in {filename}", errors.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_reports_last_value_as_json() {
        let status = serde_json::to_value(eval_code("node x = 3 + 4\nx > 5")).unwrap();
        assert_eq!(status, serde_json::json!({"status": "ok", "result": true}));
    }

    #[test]
    fn eval_reports_errors() {
        let status = serde_json::to_value(eval_code("1 / 0")).unwrap();
        assert_eq!(status, serde_json::json!({"status": "error", "error": "division by zero"}));

        let status = serde_json::to_value(eval_code("node = 1")).unwrap();
        assert_eq!(status["status"], "error");
    }

    #[test]
    fn eval_rejects_long_chains() {
        let code = vec!["1"; 10_000].join(" + ");
        let status = serde_json::to_value(eval_code(&code)).unwrap();
        assert_eq!(status["status"], "error");
        assert!(status["error"].as_str().unwrap().contains("nested deeper"));
    }
}
