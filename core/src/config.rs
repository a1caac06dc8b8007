// stepcore/src/config.rs

//! Environment configuration consumed by a step execution.
//!
//! Loading it (files, env, CLI) is the caller's business; this module only defines
//! the deserializable shape. The part the core reads is the per-node list of output
//! materializer specs, keyed by the node's dotted handle path:
//!
//! ```json
//! { "nodes": { "outer.inner": { "outputs": [ { "result": { "path": "/tmp/out.json" } } ] } } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
  /// Keyed by `NodeHandle` display path.
  pub nodes: HashMap<String, NodeConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
  /// Free-form config for the node's own logic; the core does not read it.
  pub config: Option<Value>,
  /// Type-materializer specs. Each entry must map exactly one output name to its spec.
  pub outputs: Vec<Map<String, Value>>,
}

impl EnvironmentConfig {
  pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
    serde_json::from_value(value)
  }

  pub fn node(&self, handle_path: &str) -> Option<&NodeConfig> {
    self.nodes.get(handle_path)
  }

  /// Adds a materializer spec for `output_name` on the node at `handle_path`.
  pub fn with_output_materialization(
    mut self,
    handle_path: impl Into<String>,
    output_name: impl Into<String>,
    spec: Value,
  ) -> Self {
    let mut entry = Map::new();
    entry.insert(output_name.into(), spec);
    self.nodes.entry(handle_path.into()).or_default().outputs.push(entry);
    self
  }
}
