//! Generated scenario scripts as typed nodes.
//!
//! Modules never produce indentation themselves. They append statements and
//! open or close blocks on a [`ScriptBuilder`]; indentation is applied once,
//! when the finished [`Script`] is rendered.
//!
//! Every node that touches a capability carries the [`Operation`]s it stands
//! for, so the planned operation sequence can be compared with what an
//! execution actually performed.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Indentation applied per block level.
pub const INDENT: &str = "    ";

/// A capability-affecting action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Broker `start` of a capability.
    Start {
        /// Capability name.
        capability: String,
    },
    /// A method call on a capability.
    Call {
        /// Capability name.
        capability: String,
        /// Method invoked.
        method: String,
        /// Call arguments.
        args: Value,
    },
    /// Broker `stop` of a capability.
    Stop {
        /// Capability name.
        capability: String,
    },
}

impl Operation {
    /// Broker start of `capability`.
    pub fn start(capability: impl Into<String>) -> Self {
        Self::Start {
            capability: capability.into(),
        }
    }

    /// Call `method` on `capability`.
    pub fn call(capability: impl Into<String>, method: impl Into<String>, args: Value) -> Self {
        Self::Call {
            capability: capability.into(),
            method: method.into(),
            args,
        }
    }

    /// Broker stop of `capability`.
    pub fn stop(capability: impl Into<String>) -> Self {
        Self::Stop {
            capability: capability.into(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start { capability } => write!(f, "broker.start({:?})", capability),
            Self::Call {
                capability,
                method,
                args,
            } => write!(f, "{}.{}({})", capability, method, args),
            Self::Stop { capability } => write!(f, "broker.stop({:?})", capability),
        }
    }
}

/// One element of a generated script.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A single line at the current depth.
    Statement {
        /// Line text without indentation.
        text: String,
        /// Operations the line performs.
        ops: Vec<Operation>,
    },
    /// A line that opens a nested block.
    BlockOpen {
        /// Line text without indentation.
        text: String,
        /// Operations performed on entering the block.
        ops: Vec<Operation>,
    },
    /// End of the innermost open block.
    BlockClose,
    /// An empty line.
    Blank,
}

impl Node {
    /// Operations carried by this node.
    pub fn ops(&self) -> &[Operation] {
        match self {
            Self::Statement { ops, .. } | Self::BlockOpen { ops, .. } => ops,
            Self::BlockClose | Self::Blank => &[],
        }
    }
}

/// Structural errors while building a script.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// `close_block` without a matching open.
    #[error("block closed at depth 0")]
    UnbalancedClose,

    /// A step returned with a different block depth than it started with.
    #[error("step changed block depth from {before} to {after}")]
    DepthChanged {
        /// Depth before the step.
        before: usize,
        /// Depth after the step.
        after: usize,
    },

    /// The script was finished with blocks still open.
    #[error("{0} block(s) left open")]
    Unclosed(usize),
}

/// A finished script: imports followed by nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    imports: BTreeSet<String>,
    nodes: Vec<Node>,
}

impl Script {
    /// Sorted import set.
    pub fn imports(&self) -> &BTreeSet<String> {
        &self.imports
    }

    /// Nodes in order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of statement lines (block openers included).
    pub fn statement_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Statement { .. } | Node::BlockOpen { .. }))
            .count()
    }

    /// The planned operation sequence.
    pub fn operations(&self) -> Vec<Operation> {
        self.nodes.iter().flat_map(|n| n.ops().iter().cloned()).collect()
    }

    /// Render with indentation.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for import in &self.imports {
            out.push_str("import ");
            out.push_str(import);
            out.push('\n');
        }
        if !self.imports.is_empty() && !self.nodes.is_empty() {
            out.push('\n');
        }

        let mut depth = 0usize;
        let mut empty_block = false;
        for node in &self.nodes {
            match node {
                Node::Statement { text, .. } => {
                    push_line(&mut out, depth, text);
                    empty_block = false;
                }
                Node::BlockOpen { text, .. } => {
                    push_line(&mut out, depth, text);
                    depth += 1;
                    empty_block = true;
                }
                Node::BlockClose => {
                    if empty_block {
                        push_line(&mut out, depth, "pass");
                    }
                    depth = depth.saturating_sub(1);
                    empty_block = false;
                }
                Node::Blank => out.push('\n'),
            }
        }
        out
    }
}

fn push_line(out: &mut String, depth: usize, text: &str) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    out.push_str(text);
    out.push('\n');
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Accumulates a script while tracking the current block depth.
#[derive(Debug, Default)]
pub struct ScriptBuilder {
    script: Script,
    depth: usize,
}

impl ScriptBuilder {
    /// An empty builder at depth 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current block depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of nodes so far.
    pub fn len(&self) -> usize {
        self.script.nodes.len()
    }

    /// Whether no nodes were added.
    pub fn is_empty(&self) -> bool {
        self.script.nodes.is_empty()
    }

    /// Add an import line.
    pub fn import(&mut self, dependency: impl Into<String>) -> &mut Self {
        self.script.imports.insert(dependency.into());
        self
    }

    /// Add a statement with no capability effect.
    pub fn statement(&mut self, text: impl Into<String>) -> &mut Self {
        self.statement_with(text, Vec::new())
    }

    /// Add a statement performing `ops`.
    pub fn statement_with(&mut self, text: impl Into<String>, ops: Vec<Operation>) -> &mut Self {
        self.script.nodes.push(Node::Statement {
            text: text.into(),
            ops,
        });
        self
    }

    /// Open a block; subsequent nodes nest one level deeper.
    pub fn open_block(&mut self, text: impl Into<String>, ops: Vec<Operation>) -> &mut Self {
        self.script.nodes.push(Node::BlockOpen {
            text: text.into(),
            ops,
        });
        self.depth += 1;
        self
    }

    /// Close the innermost block.
    pub fn close_block(&mut self) -> Result<&mut Self, ScriptError> {
        if self.depth == 0 {
            return Err(ScriptError::UnbalancedClose);
        }
        self.depth -= 1;
        self.script.nodes.push(Node::BlockClose);
        Ok(self)
    }

    /// Add an empty line.
    pub fn blank(&mut self) -> &mut Self {
        self.script.nodes.push(Node::Blank);
        self
    }

    /// Merge a finished fragment at the current depth.
    pub fn append(&mut self, fragment: Script) -> &mut Self {
        self.script.imports.extend(fragment.imports);
        self.script.nodes.extend(fragment.nodes);
        self
    }

    /// Finish, requiring every block to be closed.
    pub fn finish(self) -> Result<Script, ScriptError> {
        if self.depth != 0 {
            return Err(ScriptError::Unclosed(self.depth));
        }
        Ok(self.script)
    }
}

/// Quote a string literal for the script dialect.
pub fn quote(s: &str) -> String {
    // JSON string escaping is valid in the dialect
    Value::String(s.to_string()).to_string()
}
