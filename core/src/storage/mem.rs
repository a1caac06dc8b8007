// stepcore/src/storage/mem.rs

//! In-memory output storage, for tests and single-process runs.

use crate::core::context::{OutputContext, StepContext};
use crate::core::events::{AssetStoreHandle, AssetStoreOperation};
use crate::core::handle::StepOutputHandle;
use crate::core::traits::{HandledOutput, InputSource, LoadedInput, OutputManager, StoredValue};
use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{event, Level};

/// Keeps every handled output in a shared map keyed by its handle.
///
/// Clones share the same map, so one manager can back the outputs of several steps
/// and the `FromStepOutput` sources reading them downstream.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOutputManager {
  values: Arc<RwLock<HashMap<StepOutputHandle, Value>>>,
}

impl InMemoryOutputManager {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, handle: &StepOutputHandle) -> Option<Value> {
    self.values.read().get(handle).cloned()
  }

  pub fn contains(&self, handle: &StepOutputHandle) -> bool {
    self.values.read().contains_key(handle)
  }

  /// Stores a value directly, e.g. to stand in for an upstream step that did not run.
  pub fn insert(&self, handle: StepOutputHandle, value: Value) {
    self.values.write().insert(handle, value);
  }

  pub fn len(&self) -> usize {
    self.values.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.read().is_empty()
  }
}

#[async_trait]
impl OutputManager for InMemoryOutputManager {
  async fn handle_output(&self, ctx: &OutputContext, value: &Value) -> anyhow::Result<HandledOutput> {
    event!(Level::TRACE, handle = %ctx.handle, version = ?ctx.version, "Storing output in memory.");
    self.values.write().insert(ctx.handle.clone(), value.clone());
    Ok(HandledOutput::Nothing)
  }
}

/// Reads one upstream output out of an [`InMemoryOutputManager`].
#[derive(Debug, Clone)]
pub struct FromStepOutput {
  manager: InMemoryOutputManager,
  manager_key: String,
  handle: StepOutputHandle,
}

impl FromStepOutput {
  pub fn new(manager: InMemoryOutputManager, manager_key: impl Into<String>, handle: StepOutputHandle) -> Self {
    Self {
      manager,
      manager_key: manager_key.into(),
      handle,
    }
  }
}

#[async_trait]
impl InputSource for FromStepOutput {
  async fn load(&self, _ctx: &StepContext) -> anyhow::Result<LoadedInput> {
    let stored = load_from(&self.manager, &self.manager_key, &self.handle)?;
    Ok(LoadedInput::Single(stored))
  }
}

/// Fan-in source: reads several upstream outputs, in order, into one input.
#[derive(Debug, Clone)]
pub struct FromStepOutputs {
  manager: InMemoryOutputManager,
  manager_key: String,
  handles: Vec<StepOutputHandle>,
}

impl FromStepOutputs {
  pub fn new(manager: InMemoryOutputManager, manager_key: impl Into<String>, handles: Vec<StepOutputHandle>) -> Self {
    Self {
      manager,
      manager_key: manager_key.into(),
      handles,
    }
  }
}

#[async_trait]
impl InputSource for FromStepOutputs {
  async fn load(&self, _ctx: &StepContext) -> anyhow::Result<LoadedInput> {
    let stored = self
      .handles
      .iter()
      .map(|handle| load_from(&self.manager, &self.manager_key, handle))
      .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(LoadedInput::FanIn(stored))
  }
}

/// A constant input value.
#[derive(Debug, Clone)]
pub struct FromValue(pub Value);

#[async_trait]
impl InputSource for FromValue {
  async fn load(&self, _ctx: &StepContext) -> anyhow::Result<LoadedInput> {
    Ok(LoadedInput::from(self.0.clone()))
  }
}

fn load_from(manager: &InMemoryOutputManager, manager_key: &str, handle: &StepOutputHandle) -> anyhow::Result<StoredValue> {
  let value = manager
    .get(handle)
    .ok_or_else(|| anyhow!("No value stored for step output \"{}\" in output manager \"{}\".", handle, manager_key))?;
  Ok(StoredValue::AssetStore(AssetStoreOperation::get_asset(
    handle.clone(),
    AssetStoreHandle::new(manager_key),
    value,
  )))
}
