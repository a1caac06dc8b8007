// stepcore/src/core/context.rs

//! The explicit execution context handed to every stage and collaborator.
//!
//! A `StepContext` is owned by one step execution. It carries the step
//! definition, the pipeline it belongs to, the environment config and the
//! optional version resolver; nothing in it is shared mutable state.

use crate::config::EnvironmentConfig;
use crate::core::handle::StepOutputHandle;
use crate::core::step::{ExecutionStep, StepOutput};
use crate::core::traits::VersionResolver;
use crate::core::types::{RuntimeType, TypeCheckContext};
use crate::error::{StepError, StepResult};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Pipeline tag marking a run as memoized; output handles then carry a version.
pub const MEMOIZED_RUN_TAG: &str = "stepcore/is_memoized_run";

/// Resolved input values, in declaration order.
pub type StepInputs = IndexMap<String, Value>;

#[derive(Debug, Clone, Default)]
pub struct PipelineInfo {
  pub name: String,
  pub tags: HashMap<String, String>,
}

impl PipelineInfo {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      tags: HashMap::new(),
    }
  }

  pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.tags.insert(key.into(), value.into());
    self
  }

  pub fn is_memoized(&self) -> bool {
    self.tags.contains_key(MEMOIZED_RUN_TAG)
  }
}

pub struct StepContext {
  run_id: String,
  step: Arc<ExecutionStep>,
  pipeline: PipelineInfo,
  environment_config: Arc<EnvironmentConfig>,
  version_resolver: Option<Arc<dyn VersionResolver>>,
}

impl StepContext {
  pub fn new(run_id: impl Into<String>, step: Arc<ExecutionStep>, pipeline: PipelineInfo) -> Self {
    Self {
      run_id: run_id.into(),
      step,
      pipeline,
      environment_config: Arc::new(EnvironmentConfig::default()),
      version_resolver: None,
    }
  }

  pub fn with_environment_config(mut self, environment_config: Arc<EnvironmentConfig>) -> Self {
    self.environment_config = environment_config;
    self
  }

  pub fn with_version_resolver(mut self, resolver: Arc<dyn VersionResolver>) -> Self {
    self.version_resolver = Some(resolver);
    self
  }

  pub fn run_id(&self) -> &str {
    &self.run_id
  }

  pub fn step(&self) -> &ExecutionStep {
    &self.step
  }

  pub fn step_key(&self) -> &str {
    self.step.key()
  }

  pub fn pipeline(&self) -> &PipelineInfo {
    &self.pipeline
  }

  pub fn environment_config(&self) -> &EnvironmentConfig {
    &self.environment_config
  }

  pub(crate) fn type_check_context<'a>(&'a self, runtime_type: &'a RuntimeType) -> TypeCheckContext<'a> {
    TypeCheckContext {
      run_id: &self.run_id,
      step_key: self.step.key(),
      type_name: runtime_type.display_name(),
    }
  }

  /// Version for `handle`, present only for memoized runs.
  pub(crate) fn resolve_output_version(&self, handle: &StepOutputHandle) -> StepResult<Option<String>> {
    if !self.pipeline.is_memoized() {
      return Ok(None);
    }
    let resolver = self.version_resolver.as_ref().ok_or_else(|| {
      StepError::invariant(
        self.step.key(),
        format!(
          "Pipeline \"{}\" is tagged for memoized execution but step \"{}\" has no version resolver.",
          self.pipeline.name,
          self.step.key()
        ),
      )
    })?;
    Ok(resolver.resolve_version(handle))
  }

  pub(crate) fn output_context(
    &self,
    handle: &StepOutputHandle,
    step_output: &StepOutput,
    version: Option<String>,
  ) -> OutputContext {
    OutputContext {
      run_id: self.run_id.clone(),
      step_key: handle.step_key.clone(),
      name: handle.output_name.clone(),
      mapping_key: handle.mapping_key.clone(),
      metadata: step_output.metadata.clone(),
      version,
      handle: handle.clone(),
    }
  }
}

impl std::fmt::Debug for StepContext {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StepContext")
      .field("run_id", &self.run_id)
      .field("step", &self.step)
      .field("pipeline", &self.pipeline)
      .field("version_resolver_present", &self.version_resolver.is_some())
      .finish()
  }
}

/// What an output manager is told about the value it is persisting.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputContext {
  pub run_id: String,
  pub step_key: String,
  pub name: String,
  pub mapping_key: Option<String>,
  pub metadata: Map<String, Value>,
  pub version: Option<String>,
  pub handle: StepOutputHandle,
}
