// stepcore/src/core/traits.rs

//! Interfaces of the collaborators a step execution consumes.
//!
//! Every collaborator reports failure as `anyhow::Error`. The core classifies
//! those errors at its boundaries: `Failure` and `RetryRequested` pass through
//! untouched, anything else is wrapped with step/input/output context.

use crate::core::context::{OutputContext, StepContext, StepInputs};
use crate::core::events::{AssetStoreOperation, ObjectStoreOperation, UserEvent};
use crate::core::handle::StepOutputHandle;
use crate::core::types::{TypeCheckContext, UserReturn};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use serde_json::Value;

/// Lazily produced user events from a step's compute logic.
pub type UserEventStream<'a> = BoxStream<'a, anyhow::Result<UserEvent>>;

/// A value as handed back by an input source: either plain, or wrapped in the
/// store operation that fetched it.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
  Plain(Value),
  ObjectStore(ObjectStoreOperation),
  AssetStore(AssetStoreOperation),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadedInput {
  Single(StoredValue),
  /// One entry per upstream value feeding a fan-in input.
  FanIn(Vec<StoredValue>),
}

impl From<Value> for LoadedInput {
  fn from(value: Value) -> Self {
    LoadedInput::Single(StoredValue::Plain(value))
  }
}

/// What an output manager reports after persisting a value.
#[derive(Debug)]
pub enum HandledOutput {
  Nothing,
  /// Records describing what was persisted. Each must be a `Materialization`.
  Records(Vec<UserReturn>),
  /// Legacy object-store path. Re-emitted as its own event, no set-asset follows.
  ObjectStore(ObjectStoreOperation),
}

#[async_trait]
pub trait InputSource: Send + Sync {
  async fn load(&self, ctx: &StepContext) -> anyhow::Result<LoadedInput>;
}

/// A step's externally supplied logic.
///
/// Returning `Ok(None)` means the logic produced nothing to iterate; that is only
/// legal when every declared output is optional or of the Nothing type.
pub trait ComputeFn: Send + Sync {
  fn compute<'a>(&'a self, ctx: &'a StepContext, inputs: &'a StepInputs) -> anyhow::Result<Option<UserEventStream<'a>>>;
}

/// Checks one runtime value.
///
/// Ordinary validation failures belong in the returned result. Returning anything
/// other than a `TypeCheckResult` is coerced into a failing check by the core.
pub trait TypeValidator: Send + Sync {
  fn check(&self, ctx: &TypeCheckContext<'_>, value: &Value) -> anyhow::Result<UserReturn>;
}

#[async_trait]
pub trait OutputManager: Send + Sync {
  async fn handle_output(&self, ctx: &OutputContext, value: &Value) -> anyhow::Result<HandledOutput>;
}

/// Produces materializations for an output named in the environment config.
///
/// Every returned record must be a `Materialization`.
#[async_trait]
pub trait Materializer: Send + Sync {
  async fn materialize(&self, ctx: &StepContext, spec: &Value, value: &Value) -> anyhow::Result<Vec<UserReturn>>;
}

/// Supplies content versions for memoized runs.
pub trait VersionResolver: Send + Sync {
  fn resolve_version(&self, handle: &StepOutputHandle) -> Option<String>;
}

/// Compute logic backed by a plain function returning its events eagerly.
///
/// The function runs on the first pull of the step's event stream, not before.
pub struct FnCompute<F>(F);

pub fn compute_fn<F>(f: F) -> FnCompute<F>
where
  F: Fn(&StepContext, &StepInputs) -> anyhow::Result<Vec<UserEvent>> + Send + Sync,
{
  FnCompute(f)
}

impl<F> ComputeFn for FnCompute<F>
where
  F: Fn(&StepContext, &StepInputs) -> anyhow::Result<Vec<UserEvent>> + Send + Sync,
{
  fn compute<'a>(&'a self, ctx: &'a StepContext, inputs: &'a StepInputs) -> anyhow::Result<Option<UserEventStream<'a>>> {
    let events = (self.0)(ctx, inputs)?;
    Ok(Some(Box::pin(stream::iter(events.into_iter().map(Ok)))))
  }
}
