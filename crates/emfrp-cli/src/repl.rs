//! Line-oriented session: statements, plus a few `:` commands for driving
//! the node store by hand.

use anyhow::{Context, Result};
use std::io::{BufRead, Write};

use emfrp::{Machine, Recomputation, Statement, Value, parse_program};

use crate::report::render_syntax_errors;

const HELP: &str = "\
statements:
  node [init[<expr>]] <name> = <expr>   define or replace a node
  <expr>                                evaluate an expression
commands:
  :indicate <name>...                   signal a change and recompute dependents
  :set <name> <expr>                    set a host value, then indicate it
  :defs                                 list all nodes
  :help                                 show this text
  :quit                                 leave";

pub enum Reply {
    Text(String),
    Quit,
}

#[derive(Default)]
pub struct Session {
    machine: Machine,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, line: &str) -> Reply {
        let line = line.trim();
        let Some(command) = line.strip_prefix(':') else {
            return Reply::Text(self.execute(line));
        };
        let (command, arguments) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
        let arguments = arguments.trim();
        let text = match command {
            "quit" | "q" => return Reply::Quit,
            "help" | "h" => HELP.to_owned(),
            "defs" => self.machine.to_string().trim_end().to_owned(),
            "indicate" | "i" => self.indicate(&arguments.split_whitespace().collect::<Vec<_>>()),
            "set" => match arguments.split_once(char::is_whitespace) {
                Some((name, expression)) => self.set(name, expression),
                None => "Usage: :set <name> <expr>".to_owned(),
            },
            unknown => format!("Unknown command ':{unknown}', try :help"),
        };
        Reply::Text(text)
    }

    fn execute(&mut self, code: &str) -> String {
        let statements = match parse_program(code) {
            Ok(statements) => statements,
            Err(errors) => return render_syntax_errors("<repl>", code, &errors).trim_end().to_owned(),
        };
        statements
            .into_iter()
            .map(|statement| match self.machine.execute(statement.node) {
                Ok(value) => format!("OK, {value}"),
                Err(error) => format!("Error: {error}"),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn indicate(&mut self, names: &[&str]) -> String {
        if names.is_empty() {
            return "Usage: :indicate <name>...".to_owned();
        }
        match self.machine.indicate(names) {
            Ok(recomputation) => describe(&recomputation),
            Err(error) => format!("Error: {error}"),
        }
    }

    fn set(&mut self, name: &str, code: &str) -> String {
        let value = match self.evaluate(code) {
            Ok(value) => value,
            Err(message) => return message,
        };
        if let Err(error) = self.machine.set_value(name, value) {
            return format!("Error: {error}");
        }
        self.indicate(&[name])
    }

    fn evaluate(&self, code: &str) -> Result<Value, String> {
        let mut statements = parse_program(code)
            .map_err(|errors| render_syntax_errors("<repl>", code, &errors).trim_end().to_owned())?;
        if statements.len() != 1 {
            return Err("Expected a single expression".to_owned());
        }
        match statements.remove(0).node {
            Statement::Expression(expression) => {
                self.machine.evaluate(&expression).map_err(|error| format!("Error: {error}"))
            }
            Statement::Definition(_) => Err("Expected an expression, not a definition".to_owned()),
        }
    }
}

fn describe(recomputation: &Recomputation) -> String {
    let mut lines: Vec<String> = recomputation
        .updated
        .iter()
        .map(|(name, value)| format!("OK, {name} = {value}"))
        .collect();
    lines.extend(
        recomputation
            .failed
            .iter()
            .map(|(name, error)| format!("Error: {name}: {error}")),
    );
    if lines.is_empty() {
        lines.push("OK".to_owned());
    }
    lines.join("\n")
}

/// Runs a session until `:quit` or end of input.
pub fn run(input: impl BufRead, mut output: impl Write) -> Result<()> {
    let mut session = Session::new();
    writeln!(output, "Emfrp REPL, :help for commands")?;
    for line in input.lines() {
        let line = line.context("reading standard input")?;
        if line.trim().is_empty() {
            continue;
        }
        match session.handle(&line) {
            Reply::Quit => break,
            Reply::Text(text) => writeln!(output, "{text}")?,
        }
        output.flush()?;
    }
    Ok(())
}
