use std::fmt;

use crate::dependencies::Dependencies;
use crate::identifier::Identifier;
use crate::parser::NodeDefinition;
use crate::value::Value;

pub type InputCallback = Box<dyn FnMut() -> Value>;
pub type OutputCallback = Box<dyn FnMut(&Value)>;

/// Where a node's value comes from.
pub enum NodeKind {
    /// Set by the host through `Machine::set_value`, or a declared output
    /// that has no definition yet.
    Host,
    /// Polled from a host callback each time the node is indicated.
    Input(InputCallback),
    /// Computed from a definition.
    Defined(NodeDefinition),
}

pub struct Node {
    pub(super) name: Identifier,
    pub(super) kind: NodeKind,
    /// Names read by the body, without the node itself.
    pub(super) dependencies: Dependencies,
    pub(super) current: Option<Value>,
    pub(super) previous: Option<Value>,
    pub(super) output: Option<OutputCallback>,
}

impl Node {
    pub(super) fn new(name: Identifier) -> Self {
        Self {
            name,
            kind: NodeKind::Host,
            dependencies: Dependencies::new(),
            current: None,
            previous: None,
            output: None,
        }
    }

    pub fn name(&self) -> &Identifier {
        &self.name
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn definition(&self) -> Option<&NodeDefinition> {
        match &self.kind {
            NodeKind::Defined(definition) => Some(definition),
            _ => None,
        }
    }

    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    pub fn current(&self) -> Option<&Value> {
        self.current.as_ref()
    }

    pub fn previous(&self) -> Option<&Value> {
        self.previous.as_ref()
    }

    pub fn is_output(&self) -> bool {
        self.output.is_some()
    }

    /// Starts a new cycle: the old current value becomes the previous one.
    pub(super) fn advance(&mut self, value: Value) {
        self.previous = self.current.replace(value);
        self.notify();
    }

    pub(super) fn notify(&mut self) {
        if let (Some(output), Some(value)) = (&mut self.output, &self.current) {
            output(value);
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            NodeKind::Host => write!(f, "host {}", self.name)?,
            NodeKind::Input(_) => write!(f, "input {}", self.name)?,
            NodeKind::Defined(definition) => write!(f, "{definition}")?,
        }
        if self.is_output() {
            f.write_str(" [output]")?;
        }
        match &self.current {
            Some(value) => write!(f, " -> {value}"),
            None => f.write_str(" -> (no value)"),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("definition", &self.definition())
            .field("dependencies", &self.dependencies)
            .field("current", &self.current)
            .field("previous", &self.previous)
            .field("output", &self.is_output())
            .finish()
    }
}
