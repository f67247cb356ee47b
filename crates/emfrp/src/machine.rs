//! Node store and recomputation scheduler.
//!
//! The machine owns every named node, answers lookups for the evaluator and
//! decides what to recompute when the host indicates that something changed.
//! Recomputation takes `&mut self`, so two passes can never overlap.

use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;

use crate::dependencies::{Dependencies, dependencies_of, depends_on};
use crate::exec::{ExecContext, ExecError, NodeLookup, evaluate};
use crate::identifier::Identifier;
use crate::parser::{Expression, MAX_NESTING, NodeDefinition, Statement};
use crate::value::Value;

mod node;
pub use node::{InputCallback, Node, NodeKind, OutputCallback};

#[derive(Debug, Clone, PartialEq)]
pub enum MachineError {
    /// A top-level expression failed.
    Eval(ExecError),
    /// A definition was rejected because its `init` or body failed.
    Exec { node: Identifier, error: ExecError },
    /// Defining `node` would make it depend on itself through `via`.
    CyclicDependency { node: Identifier, via: Identifier },
    UnknownNode(Identifier),
    /// The host tried to set or re-register a node computed from a definition.
    ComputedNode(Identifier),
    /// A definition tried to replace a node fed by an input callback.
    InputNode(Identifier),
}

impl fmt::Display for MachineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineError::Eval(error) => write!(f, "{error}"),
            MachineError::Exec { node, error } => write!(f, "node '{node}' rejected: {error}"),
            MachineError::CyclicDependency { node, via } => {
                write!(f, "node '{node}' rejected: cyclic dependency through '{via}'")
            }
            MachineError::UnknownNode(name) => write!(f, "unknown node '{name}'"),
            MachineError::ComputedNode(name) => write!(f, "node '{name}' is computed from a definition"),
            MachineError::InputNode(name) => write!(f, "node '{name}' is fed by an input callback"),
        }
    }
}

impl std::error::Error for MachineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MachineError::Eval(error) | MachineError::Exec { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Outcome of one recomputation pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Recomputation {
    /// Nodes that received a new value, in evaluation order.
    pub updated: Vec<(Identifier, Value)>,
    /// Nodes whose body failed; they keep their old values.
    pub failed: Vec<(Identifier, ExecError)>,
}

impl Recomputation {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn value_of(&self, name: &str) -> Option<&Value> {
        self.updated
            .iter()
            .rev()
            .find(|(updated, _)| updated == name)
            .map(|(_, value)| value)
    }
}

#[derive(Default)]
pub struct Machine {
    nodes: Vec<Node>,
    index: FxHashMap<Identifier, usize>,
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` as an input whose value is pulled from `callback`
    /// every time the node is indicated.
    pub fn add_input_node(
        &mut self,
        name: &str,
        callback: impl FnMut() -> Value + 'static,
    ) -> Result<(), MachineError> {
        let node = self.entry(name);
        if node.definition().is_some() {
            return Err(MachineError::ComputedNode(node.name.clone()));
        }
        node.kind = NodeKind::Input(Box::new(callback));
        log::debug!("input node '{name}' registered");
        Ok(())
    }

    /// Attaches `callback` to `name`; it fires with every new value the node
    /// receives. The node itself may be defined later.
    pub fn add_output_node(&mut self, name: &str, callback: impl FnMut(&Value) + 'static) {
        self.entry(name).output = Some(Box::new(callback));
        log::debug!("output node '{name}' registered");
    }

    /// Stores a host-provided value. Dependents are not recomputed until the
    /// node is indicated.
    pub fn set_value(&mut self, name: &str, value: Value) -> Result<(), MachineError> {
        let node = self.entry(name);
        if node.definition().is_some() {
            return Err(MachineError::ComputedNode(node.name.clone()));
        }
        node.advance(value);
        Ok(())
    }

    pub fn execute(&mut self, statement: Statement) -> Result<Value, MachineError> {
        match statement {
            Statement::Expression(expression) => self.evaluate(&expression).map_err(MachineError::Eval),
            Statement::Definition(definition) => self.define(definition),
        }
    }

    /// Evaluates an expression outside any node body.
    pub fn evaluate(&self, expression: &Expression) -> Result<Value, ExecError> {
        evaluate(expression, &ExecContext::top_level(self))
    }

    /// Installs or replaces a node definition and recomputes its dependents.
    ///
    /// A rejected definition leaves the store untouched.
    pub fn define(&mut self, definition: NodeDefinition) -> Result<Value, MachineError> {
        let name = definition.name.clone();
        if matches!(self.node(&name).map(Node::kind), Some(NodeKind::Input(_))) {
            return Err(MachineError::InputNode(name));
        }
        if definition.depth() > MAX_NESTING {
            return Err(MachineError::Exec {
                node: name,
                error: ExecError::NestingTooDeep,
            });
        }
        // A node's own `@last` read never blocks its definition.
        let dependencies: Dependencies = dependencies_of(&definition.body)
            .into_iter()
            .filter(|dependency| *dependency != name)
            .collect();

        if let Some(via) = dependencies
            .iter()
            .find(|dependency| self.reaches(dependency, &name, &mut FxHashSet::default()))
        {
            return Err(MachineError::CyclicDependency {
                node: name,
                via: via.clone(),
            });
        }

        let previous = match &definition.init {
            Some(init) => Some(
                evaluate(init, &ExecContext::top_level(&*self)).map_err(|error| MachineError::Exec {
                    node: name.clone(),
                    error,
                })?,
            ),
            None => self.node(&name).and_then(|node| node.current.clone()),
        };
        let value = self
            .evaluate_body(&name, &definition.body, previous.as_ref())
            .map_err(|error| MachineError::Exec {
                node: name.clone(),
                error,
            })?;
        log::debug!("{definition} -> {value}");

        let node = self.entry(&name);
        node.kind = NodeKind::Defined(definition);
        node.dependencies = dependencies;
        node.previous = previous;
        node.current = Some(value.clone());
        node.notify();

        let recomputation = self.propagate(&[name], Vec::new());
        for (node, error) in &recomputation.failed {
            log::warn!("dependent '{node}' failed after definition: {error}");
        }
        Ok(value)
    }

    /// Handles an external signal on `names`: input nodes are polled, indicated
    /// definitions are recomputed, and so is everything downstream of them.
    /// A name listed more than once is handled once.
    pub fn indicate(&mut self, names: &[&str]) -> Result<Recomputation, MachineError> {
        let mut roots = Vec::with_capacity(names.len());
        for name in names {
            let index = *self
                .index
                .get(*name)
                .ok_or_else(|| MachineError::UnknownNode(Identifier::from(*name)))?;
            if !roots.contains(&index) {
                roots.push(index);
            }
        }

        let mut changed = Vec::with_capacity(roots.len());
        let mut dirty = Vec::new();
        let mut polled = Vec::new();
        for index in roots {
            let node = &mut self.nodes[index];
            match &mut node.kind {
                NodeKind::Input(poll) => {
                    let value = poll();
                    node.advance(value.clone());
                    polled.push((node.name.clone(), value));
                }
                NodeKind::Defined(_) => dirty.push(node.name.clone()),
                NodeKind::Host => {}
            }
            changed.push(node.name.clone());
        }

        let mut recomputation = self.propagate(&changed, dirty);
        polled.append(&mut recomputation.updated);
        recomputation.updated = polled;
        for (node, error) in &recomputation.failed {
            log::warn!("node '{node}' failed: {error}");
        }
        Ok(recomputation)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.index.get(name).map(|&index| &self.nodes[index])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn current(&self, name: &str) -> Option<&Value> {
        self.node(name).and_then(Node::current)
    }

    pub fn previous(&self, name: &str) -> Option<&Value> {
        self.node(name).and_then(Node::previous)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &NodeDefinition> {
        self.nodes.iter().filter_map(Node::definition)
    }

    fn entry(&mut self, name: &str) -> &mut Node {
        let index = match self.index.get(name) {
            Some(&index) => index,
            None => {
                let identifier = Identifier::from(name);
                self.nodes.push(Node::new(identifier.clone()));
                self.index.insert(identifier, self.nodes.len() - 1);
                self.nodes.len() - 1
            }
        };
        &mut self.nodes[index]
    }

    /// Whether `from` reads `target`, directly or through other definitions.
    fn reaches(&self, from: &str, target: &str, visited: &mut FxHashSet<Identifier>) -> bool {
        let Some(node) = self.node(from) else {
            return false;
        };
        if !visited.insert(node.name.clone()) {
            return false;
        }
        let Some(definition) = node.definition() else {
            return false;
        };
        depends_on(&definition.body, target)
            || node
                .dependencies
                .iter()
                .any(|dependency| self.reaches(dependency, target, visited))
    }

    fn evaluate_body(&self, name: &str, body: &Expression, previous: Option<&Value>) -> Result<Value, ExecError> {
        log::trace!("evaluating '{name}'");
        let lookup = WithPrevious {
            machine: self,
            name,
            previous,
        };
        evaluate(body, &ExecContext::for_node(&lookup, name))
    }

    /// Recomputes `dirty` plus every definition downstream of `changed` or
    /// `dirty`, each node only after all of its affected dependencies.
    fn propagate(&mut self, changed: &[Identifier], dirty: Vec<Identifier>) -> Recomputation {
        let mut affected: FxHashSet<Identifier> = dirty.into_iter().collect();
        loop {
            let before = affected.len();
            for node in &self.nodes {
                if node.definition().is_none() || affected.contains(&node.name) {
                    continue;
                }
                if node
                    .dependencies
                    .iter()
                    .any(|dependency| changed.contains(dependency) || affected.contains(dependency))
                {
                    affected.insert(node.name.clone());
                }
            }
            if affected.len() == before {
                break;
            }
        }

        let mut recomputation = Recomputation::default();
        if affected.is_empty() {
            return recomputation;
        }
        log::debug!("recomputing {} node(s)", affected.len());

        let mut pending: Vec<usize> = (0..self.nodes.len())
            .filter(|&index| affected.contains(&self.nodes[index].name))
            .collect();
        while !pending.is_empty() {
            let ready = pending.iter().position(|&index| {
                self.nodes[index]
                    .dependencies
                    .iter()
                    .all(|dependency| !affected.contains(dependency))
            });
            let Some(position) = ready else {
                log::error!("recomputation stalled with {} node(s) pending", pending.len());
                break;
            };
            let index = pending.remove(position);
            let name = self.nodes[index].name.clone();
            match self.recompute(index) {
                Ok(value) => recomputation.updated.push((name.clone(), value)),
                Err(error) => recomputation.failed.push((name.clone(), error)),
            }
            affected.remove(&name);
        }
        recomputation
    }

    fn recompute(&mut self, index: usize) -> Result<Value, ExecError> {
        let node = &self.nodes[index];
        let Some(definition) = node.definition() else {
            return Err(ExecError::InvalidArgument);
        };
        // The value being replaced is what `@last` sees during this cycle.
        let value = self.evaluate_body(&node.name, &definition.body, node.current.as_ref())?;
        self.nodes[index].advance(value.clone());
        Ok(value)
    }
}

impl NodeLookup for Machine {
    fn lookup_current(&self, name: &str) -> Option<Value> {
        self.current(name).cloned()
    }

    fn lookup_previous(&self, name: &str) -> Option<Value> {
        self.previous(name).cloned()
    }
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for node in &self.nodes {
            writeln!(f, "{node}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(&self.nodes).finish()
    }
}

/// Lookup that shows the node under evaluation with a substituted previous
/// value, so nothing is written until the evaluation succeeds.
struct WithPrevious<'a> {
    machine: &'a Machine,
    name: &'a str,
    previous: Option<&'a Value>,
}

impl NodeLookup for WithPrevious<'_> {
    fn lookup_current(&self, name: &str) -> Option<Value> {
        self.machine.lookup_current(name)
    }

    fn lookup_previous(&self, name: &str) -> Option<Value> {
        if name == self.name {
            self.previous.cloned()
        } else {
            self.machine.lookup_previous(name)
        }
    }
}
