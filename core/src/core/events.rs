// stepcore/src/core/events.rs

//! Event types.
//!
//! Two layers live here:
//!  - user events, produced by a step's compute logic (`UserEvent`);
//!  - lifecycle events, the append-only record the core yields for one step
//!    execution (`LifecycleEvent`). A step's execution *is* the ordered sequence
//!    of its lifecycle events, and nothing is committed until `StepSuccess`.
//!
//! Store operations sit in between: sources and output managers hand them to
//! the core, which strips the carried object and re-emits them as events.

use crate::core::context::StepContext;
use crate::core::handle::StepOutputHandle;
use crate::core::types::{MetadataEntry, TypeCheckResult, UserReturn};
use serde::Serialize;
use serde_json::{Map, Value};

// --- User events ---

/// Path identifying a durable asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AssetKey(pub Vec<String>);

impl AssetKey {
  pub fn new<I, S>(path: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    AssetKey(path.into_iter().map(Into::into).collect())
  }

  pub fn to_user_string(&self) -> String {
    self.0.join(".")
  }
}

impl From<&str> for AssetKey {
  fn from(key: &str) -> Self {
    AssetKey(vec![key.to_string()])
  }
}

/// Describes a durable artifact produced as a side effect of a step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Materialization {
  pub label: String,
  pub description: Option<String>,
  pub asset_key: Option<AssetKey>,
  pub partition: Option<String>,
  pub metadata: Vec<MetadataEntry>,
}

impl Materialization {
  pub fn new(label: impl Into<String>) -> Self {
    Self {
      label: label.into(),
      description: None,
      asset_key: None,
      partition: None,
      metadata: Vec::new(),
    }
  }

  /// A materialization of `asset_key`, labelled by the key's path.
  pub fn for_asset(asset_key: impl Into<AssetKey>) -> Self {
    let asset_key = asset_key.into();
    Self {
      label: asset_key.to_user_string(),
      asset_key: Some(asset_key),
      ..Self::new("")
    }
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
    self.partition = Some(partition.into());
    self
  }

  pub fn with_metadata(mut self, metadata: Vec<MetadataEntry>) -> Self {
    self.metadata = metadata;
    self
  }
}

impl From<Materialization> for UserReturn {
  fn from(materialization: Materialization) -> Self {
    UserReturn::new(materialization)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpectationResult {
  pub success: bool,
  pub label: Option<String>,
  pub description: Option<String>,
  pub metadata: Vec<MetadataEntry>,
}

impl ExpectationResult {
  pub fn new(success: bool) -> Self {
    Self {
      success,
      label: None,
      description: None,
      metadata: Vec::new(),
    }
  }

  pub fn with_label(mut self, label: impl Into<String>) -> Self {
    self.label = Some(label.into());
    self
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  pub fn with_metadata(mut self, metadata: Vec<MetadataEntry>) -> Self {
    self.metadata = metadata;
    self
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputKind {
  Static,
  /// One instance of a fan-out output.
  Dynamic { mapping_key: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputEvent {
  pub output_name: String,
  pub value: Value,
  pub kind: OutputKind,
}

impl OutputEvent {
  pub fn new(output_name: impl Into<String>, value: Value) -> Self {
    Self {
      output_name: output_name.into(),
      value,
      kind: OutputKind::Static,
    }
  }

  pub fn dynamic(output_name: impl Into<String>, mapping_key: impl Into<String>, value: Value) -> Self {
    Self {
      output_name: output_name.into(),
      value,
      kind: OutputKind::Dynamic {
        mapping_key: mapping_key.into(),
      },
    }
  }

  pub fn mapping_key(&self) -> Option<&str> {
    match &self.kind {
      OutputKind::Static => None,
      OutputKind::Dynamic { mapping_key } => Some(mapping_key),
    }
  }

  pub fn is_dynamic(&self) -> bool {
    matches!(self.kind, OutputKind::Dynamic { .. })
  }
}

/// Everything a step's compute logic may yield.
#[derive(Debug, Clone, PartialEq)]
pub enum UserEvent {
  Output(OutputEvent),
  ExpectationResult(ExpectationResult),
  Materialization(Materialization),
}

impl From<OutputEvent> for UserEvent {
  fn from(output: OutputEvent) -> Self {
    UserEvent::Output(output)
  }
}

impl From<ExpectationResult> for UserEvent {
  fn from(result: ExpectationResult) -> Self {
    UserEvent::ExpectationResult(result)
  }
}

impl From<Materialization> for UserEvent {
  fn from(materialization: Materialization) -> Self {
    UserEvent::Materialization(materialization)
  }
}

// --- Store operations ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectStoreOperationType {
  SetObject,
  GetObject,
  CpObject,
}

/// Legacy record of a direct read or write against an object store.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectStoreOperation {
  pub op: ObjectStoreOperationType,
  pub key: String,
  pub dest_key: Option<String>,
  pub obj: Value,
}

impl ObjectStoreOperation {
  pub fn new(op: ObjectStoreOperationType, key: impl Into<String>, obj: Value) -> Self {
    Self {
      op,
      key: key.into(),
      dest_key: None,
      obj,
    }
  }

  pub fn with_dest_key(mut self, dest_key: impl Into<String>) -> Self {
    self.dest_key = Some(dest_key.into());
    self
  }

  /// Drops the carried object and records which value the operation was for.
  pub fn serializable(&self, value_name: Option<&str>) -> ObjectStoreOperationResult {
    ObjectStoreOperationResult {
      op: self.op,
      key: self.key.clone(),
      dest_key: self.dest_key.clone(),
      value_name: value_name.map(str::to_string),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectStoreOperationResult {
  pub op: ObjectStoreOperationType,
  pub key: String,
  pub dest_key: Option<String>,
  pub value_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetStoreOperationType {
  SetAsset,
  GetAsset,
}

/// The output manager that owns a handle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetStoreHandle {
  pub manager_key: String,
  pub metadata: Map<String, Value>,
}

impl AssetStoreHandle {
  pub fn new(manager_key: impl Into<String>) -> Self {
    Self {
      manager_key: manager_key.into(),
      metadata: Map::new(),
    }
  }

  pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
    self.metadata = metadata;
    self
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetStoreOperation {
  pub op: AssetStoreOperationType,
  pub step_output_handle: StepOutputHandle,
  pub asset_store_handle: AssetStoreHandle,
  /// The loaded value, for `GetAsset`.
  pub obj: Option<Value>,
}

impl AssetStoreOperation {
  pub fn set_asset(step_output_handle: StepOutputHandle, asset_store_handle: AssetStoreHandle) -> Self {
    Self {
      op: AssetStoreOperationType::SetAsset,
      step_output_handle,
      asset_store_handle,
      obj: None,
    }
  }

  pub fn get_asset(step_output_handle: StepOutputHandle, asset_store_handle: AssetStoreHandle, obj: Value) -> Self {
    Self {
      op: AssetStoreOperationType::GetAsset,
      step_output_handle,
      asset_store_handle,
      obj: Some(obj),
    }
  }

  pub fn serializable(&self) -> AssetStoreOperationResult {
    AssetStoreOperationResult {
      op: self.op,
      step_output_handle: self.step_output_handle.clone(),
      asset_store_handle: self.asset_store_handle.clone(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetStoreOperationResult {
  pub op: AssetStoreOperationType,
  pub step_output_handle: StepOutputHandle,
  pub asset_store_handle: AssetStoreHandle,
}

// --- Lifecycle events ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeCheckData {
  pub success: bool,
  pub label: String,
  pub description: Option<String>,
  pub metadata: Vec<MetadataEntry>,
}

impl TypeCheckData {
  pub(crate) fn new(label: &str, type_check: &TypeCheckResult) -> Self {
    Self {
      success: type_check.success,
      label: label.to_string(),
      description: type_check.description.clone(),
      metadata: type_check.metadata.clone(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepInputData {
  pub input_name: String,
  pub type_check_data: TypeCheckData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutputData {
  pub step_output_handle: StepOutputHandle,
  pub type_check_data: TypeCheckData,
  pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSuccessData {
  /// Covers compute, output validation and persistence.
  pub duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleEventKind {
  StepStart,
  StepRestarted { prior_attempt_count: u32 },
  StepInput(StepInputData),
  StepOutput(StepOutputData),
  StepMaterialization(Materialization),
  StepExpectationResult(ExpectationResult),
  ObjectStoreOperation(ObjectStoreOperationResult),
  AssetStoreOperation(AssetStoreOperationResult),
  StepSuccess(StepSuccessData),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleEvent {
  pub step_key: String,
  pub node_handle: String,
  pub kind: LifecycleEventKind,
  pub message: String,
}

impl LifecycleEvent {
  fn for_step(ctx: &StepContext, kind: LifecycleEventKind, message: String) -> Self {
    Self {
      step_key: ctx.step_key().to_string(),
      node_handle: ctx.step().node_handle().to_string(),
      kind,
      message,
    }
  }

  pub fn event_type(&self) -> &'static str {
    match &self.kind {
      LifecycleEventKind::StepStart => "STEP_START",
      LifecycleEventKind::StepRestarted { .. } => "STEP_RESTARTED",
      LifecycleEventKind::StepInput(_) => "STEP_INPUT",
      LifecycleEventKind::StepOutput(_) => "STEP_OUTPUT",
      LifecycleEventKind::StepMaterialization(_) => "STEP_MATERIALIZATION",
      LifecycleEventKind::StepExpectationResult(_) => "STEP_EXPECTATION_RESULT",
      LifecycleEventKind::ObjectStoreOperation(_) => "OBJECT_STORE_OPERATION",
      LifecycleEventKind::AssetStoreOperation(_) => "ASSET_STORE_OPERATION",
      LifecycleEventKind::StepSuccess(_) => "STEP_SUCCESS",
    }
  }

  pub fn is_step_success(&self) -> bool {
    matches!(self.kind, LifecycleEventKind::StepSuccess(_))
  }

  pub(crate) fn step_start(ctx: &StepContext) -> Self {
    let message = format!("Started execution of step \"{}\".", ctx.step_key());
    Self::for_step(ctx, LifecycleEventKind::StepStart, message)
  }

  pub(crate) fn step_restarted(ctx: &StepContext, prior_attempt_count: u32) -> Self {
    let message = format!(
      "Started re-execution (attempt # {}) of step \"{}\".",
      prior_attempt_count + 1,
      ctx.step_key()
    );
    Self::for_step(ctx, LifecycleEventKind::StepRestarted { prior_attempt_count }, message)
  }

  pub(crate) fn step_input(ctx: &StepContext, input_name: &str, type_name: &str, type_check: &TypeCheckResult) -> Self {
    let message = format!(
      "Got input \"{}\" of type \"{}\". ({})",
      input_name,
      type_name,
      type_check_outcome(type_check)
    );
    let data = StepInputData {
      input_name: input_name.to_string(),
      type_check_data: TypeCheckData::new(input_name, type_check),
    };
    Self::for_step(ctx, LifecycleEventKind::StepInput(data), message)
  }

  pub(crate) fn step_output(
    ctx: &StepContext,
    step_output_handle: StepOutputHandle,
    type_name: &str,
    type_check: &TypeCheckResult,
    version: Option<String>,
  ) -> Self {
    let mapping = step_output_handle
      .mapping_key
      .as_deref()
      .map(|key| format!(" (mapping key \"{}\")", key))
      .unwrap_or_default();
    let message = format!(
      "Yielded output \"{}\"{} of type \"{}\". ({})",
      step_output_handle.output_name,
      mapping,
      type_name,
      type_check_outcome(type_check)
    );
    let data = StepOutputData {
      type_check_data: TypeCheckData::new(&step_output_handle.output_name, type_check),
      step_output_handle,
      version,
    };
    Self::for_step(ctx, LifecycleEventKind::StepOutput(data), message)
  }

  pub(crate) fn step_materialization(ctx: &StepContext, materialization: Materialization) -> Self {
    let message = match &materialization.description {
      Some(description) => format!("Materialized value {}: {}", materialization.label, description),
      None => format!("Materialized value {}.", materialization.label),
    };
    Self::for_step(ctx, LifecycleEventKind::StepMaterialization(materialization), message)
  }

  pub(crate) fn step_expectation_result(ctx: &StepContext, result: ExpectationResult) -> Self {
    let label = result.label.as_deref().map(|l| format!(" {}", l)).unwrap_or_default();
    let message = if result.success {
      format!("Expectation{} passed.", label)
    } else {
      format!("Expectation{} failed.", label)
    };
    Self::for_step(ctx, LifecycleEventKind::StepExpectationResult(result), message)
  }

  pub(crate) fn object_store_operation(ctx: &StepContext, result: ObjectStoreOperationResult) -> Self {
    let value_name = result.value_name.as_deref().unwrap_or("<unnamed>");
    let message = match result.op {
      ObjectStoreOperationType::SetObject => {
        format!("Stored intermediate object for \"{}\" at key \"{}\".", value_name, result.key)
      }
      ObjectStoreOperationType::GetObject => {
        format!("Retrieved intermediate object for \"{}\" from key \"{}\".", value_name, result.key)
      }
      ObjectStoreOperationType::CpObject => format!(
        "Copied intermediate object for \"{}\" from \"{}\" to \"{}\".",
        value_name,
        result.key,
        result.dest_key.as_deref().unwrap_or("<unknown>")
      ),
    };
    Self::for_step(ctx, LifecycleEventKind::ObjectStoreOperation(result), message)
  }

  pub(crate) fn asset_store_operation(ctx: &StepContext, result: AssetStoreOperationResult) -> Self {
    let message = match result.op {
      AssetStoreOperationType::SetAsset => format!(
        "Handled output \"{}\" using output manager \"{}\".",
        result.step_output_handle, result.asset_store_handle.manager_key
      ),
      AssetStoreOperationType::GetAsset => format!(
        "Loaded step output \"{}\" using output manager \"{}\".",
        result.step_output_handle, result.asset_store_handle.manager_key
      ),
    };
    Self::for_step(ctx, LifecycleEventKind::AssetStoreOperation(result), message)
  }

  pub(crate) fn step_success(ctx: &StepContext, duration_ms: f64) -> Self {
    let message = format!(
      "Finished execution of step \"{}\" in {}.",
      ctx.step_key(),
      format_duration(duration_ms)
    );
    Self::for_step(ctx, LifecycleEventKind::StepSuccess(StepSuccessData { duration_ms }), message)
  }
}

fn type_check_outcome(type_check: &TypeCheckResult) -> &'static str {
  if type_check.success {
    "Type check passed"
  } else {
    "Type check failed"
  }
}

pub(crate) fn format_duration(duration_ms: f64) -> String {
  if duration_ms < 1000.0 {
    format!("{:.2}ms", duration_ms)
  } else if duration_ms < 60_000.0 {
    format!("{:.2}s", duration_ms / 1000.0)
  } else {
    let minutes = (duration_ms / 60_000.0).floor();
    format!("{}m {:.2}s", minutes, (duration_ms - minutes * 60_000.0) / 1000.0)
  }
}
