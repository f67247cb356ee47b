//! Execution engine for Emfrp, a small reactive dataflow language.
//!
//! Programs declare named nodes whose values are expressions over the
//! current values of other nodes, or over the node's own previous value
//! (`name@last`). The crate is split leaf-first:
//!
//! - [`value`]: runtime values and per-kind equality
//! - [`parser`]: lexer, grammar and the expression tree
//! - [`exec`]: the recursive evaluator and its error taxonomy
//! - [`dependencies`]: static dependency extraction over expressions
//! - [`machine`]: the node store that drives recomputation on `indicate`

pub mod dependencies;
pub mod exec;
pub mod identifier;
pub mod machine;
pub mod parser;
pub mod value;

pub use dependencies::{Dependencies, dependencies_of, depends_on};
pub use exec::{ExecContext, ExecError, NodeLookup, evaluate, evaluate_binary};
pub use identifier::Identifier;
pub use machine::{Machine, MachineError, Recomputation};
pub use parser::{BinaryOperator, Expression, MAX_NESTING, NodeDefinition, Statement, SyntaxError, parse_program};
pub use value::{Value, ValueKind};
