// stepcore/src/core/step.rs

//! Defines the execution step and its declared inputs and outputs.

use crate::core::handle::NodeHandle;
use crate::core::traits::{ComputeFn, InputSource, OutputManager};
use crate::core::types::RuntimeType;
use serde_json::{Map, Value};
use std::sync::Arc;

pub struct StepInput {
  pub name: String,
  pub runtime_type: RuntimeType,
  pub source: Arc<dyn InputSource>,
}

impl StepInput {
  pub fn new(name: impl Into<String>, runtime_type: RuntimeType, source: impl InputSource + 'static) -> Self {
    Self {
      name: name.into(),
      runtime_type,
      source: Arc::new(source),
    }
  }
}

impl std::fmt::Debug for StepInput {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StepInput")
      .field("name", &self.name)
      .field("runtime_type", &self.runtime_type)
      .finish()
  }
}

pub struct StepOutput {
  pub name: String,
  pub runtime_type: RuntimeType,
  pub optional: bool,
  pub is_dynamic: bool,
  /// Key under which `manager` is known; recorded on every set-asset event.
  pub manager_key: String,
  pub manager: Arc<dyn OutputManager>,
  pub metadata: Map<String, Value>,
}

impl StepOutput {
  pub fn new(
    name: impl Into<String>,
    runtime_type: RuntimeType,
    manager_key: impl Into<String>,
    manager: Arc<dyn OutputManager>,
  ) -> Self {
    Self {
      name: name.into(),
      runtime_type,
      optional: false,
      is_dynamic: false,
      manager_key: manager_key.into(),
      manager,
      metadata: Map::new(),
    }
  }

  pub fn optional(mut self) -> Self {
    self.optional = true;
    self
  }

  pub fn dynamic(mut self) -> Self {
    self.is_dynamic = true;
    self
  }

  pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
    self.metadata = metadata;
    self
  }
}

impl std::fmt::Debug for StepOutput {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StepOutput")
      .field("name", &self.name)
      .field("runtime_type", &self.runtime_type)
      .field("optional", &self.optional)
      .field("is_dynamic", &self.is_dynamic)
      .field("manager_key", &self.manager_key)
      .finish()
  }
}

/// One schedulable unit of a pipeline. Read-only while it executes.
pub struct ExecutionStep {
  key: String,
  node_handle: NodeHandle,
  node_def_name: String,
  inputs: Vec<StepInput>,
  outputs: Vec<StepOutput>,
  compute: Arc<dyn ComputeFn>,
}

impl ExecutionStep {
  pub fn new(
    key: impl Into<String>,
    node_handle: NodeHandle,
    node_def_name: impl Into<String>,
    compute: impl ComputeFn + 'static,
  ) -> Self {
    Self {
      key: key.into(),
      node_handle,
      node_def_name: node_def_name.into(),
      inputs: Vec::new(),
      outputs: Vec::new(),
      compute: Arc::new(compute),
    }
  }

  /// Adds a declared input. Panics if an input with the same name exists.
  pub fn with_input(mut self, input: StepInput) -> Self {
    if self.step_input_named(&input.name).is_some() {
      panic!(
        "stepcore setup error: Input '{}' already declared on step '{}'.",
        input.name, self.key
      );
    }
    self.inputs.push(input);
    self
  }

  /// Adds a declared output. Panics if an output with the same name exists.
  pub fn with_output(mut self, output: StepOutput) -> Self {
    if self.has_step_output(&output.name) {
      panic!(
        "stepcore setup error: Output '{}' already declared on step '{}'.",
        output.name, self.key
      );
    }
    self.outputs.push(output);
    self
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  pub fn node_handle(&self) -> &NodeHandle {
    &self.node_handle
  }

  /// The node's invocation name (last segment of its handle).
  pub fn node_name(&self) -> &str {
    self.node_handle.name()
  }

  pub fn node_def_name(&self) -> &str {
    &self.node_def_name
  }

  pub fn inputs(&self) -> &[StepInput] {
    &self.inputs
  }

  pub fn outputs(&self) -> &[StepOutput] {
    &self.outputs
  }

  pub fn compute(&self) -> &dyn ComputeFn {
    self.compute.as_ref()
  }

  pub fn step_input_named(&self, name: &str) -> Option<&StepInput> {
    self.inputs.iter().find(|i| i.name == name)
  }

  pub fn step_output_named(&self, name: &str) -> Option<&StepOutput> {
    self.outputs.iter().find(|o| o.name == name)
  }

  pub fn has_step_output(&self, name: &str) -> bool {
    self.step_output_named(name).is_some()
  }

  pub fn output_names(&self) -> Vec<&str> {
    self.outputs.iter().map(|o| o.name.as_str()).collect()
  }
}

impl std::fmt::Debug for ExecutionStep {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ExecutionStep")
      .field("key", &self.key)
      .field("node_handle", &self.node_handle.to_string())
      .field("node_def_name", &self.node_def_name)
      .field("inputs", &self.inputs)
      .field("outputs", &self.outputs)
      .finish()
  }
}
