// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use serde_json::{json, Value};
use stepcore::{
  collect_step_events, ComputeFn, ExecutionStep, HandledOutput, InputSource, LifecycleEvent, LifecycleEventKind,
  LoadedInput, Materialization, Materializer, NodeHandle, ObjectStoreOperation, ObjectStoreOperationType,
  OutputContext, OutputManager, PipelineInfo, StepContext, StepError, StepInputs, StepOutput, StoredValue,
  UserEvent, UserEventStream, UserReturn, VersionResolver,
};
use stepcore::{RuntimeType, StepOutputHandle};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::time::Duration;
use tracing::Level;

// --- Compute fixtures ---

/// One scripted item of a compute stream.
#[derive(Clone)]
pub enum Scripted {
  Emit(UserEvent),
  Raise(fn() -> anyhow::Error),
}

/// Compute logic that replays a fixed script and counts its invocations.
#[derive(Clone)]
pub struct ScriptedCompute {
  script: Vec<Scripted>,
  pub calls: Arc<AtomicUsize>,
}

impl ScriptedCompute {
  pub fn new(script: Vec<Scripted>) -> Self {
    Self {
      script,
      calls: Arc::new(AtomicUsize::new(0)),
    }
  }

  pub fn emitting<I, E>(events: I) -> Self
  where
    I: IntoIterator<Item = E>,
    E: Into<UserEvent>,
  {
    Self::new(events.into_iter().map(|e| Scripted::Emit(e.into())).collect())
  }

  pub fn call_count(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl ComputeFn for ScriptedCompute {
  fn compute<'a>(&'a self, _ctx: &'a StepContext, _inputs: &'a StepInputs) -> anyhow::Result<Option<UserEventStream<'a>>> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let items = self.script.iter().map(|item| match item {
      Scripted::Emit(user_event) => Ok(user_event.clone()),
      Scripted::Raise(make_error) => Err(make_error()),
    });
    Ok(Some(Box::pin(stream::iter(items))))
  }
}

/// Compute logic that returns nothing iterable.
pub struct ReturnsNothing;

impl ComputeFn for ReturnsNothing {
  fn compute<'a>(&'a self, _ctx: &'a StepContext, _inputs: &'a StepInputs) -> anyhow::Result<Option<UserEventStream<'a>>> {
    Ok(None)
  }
}

/// Compute logic that fails before producing a stream.
pub struct RaisesOnCall(pub fn() -> anyhow::Error);

impl ComputeFn for RaisesOnCall {
  fn compute<'a>(&'a self, _ctx: &'a StepContext, _inputs: &'a StepInputs) -> anyhow::Result<Option<UserEventStream<'a>>> {
    Err((self.0)())
  }
}

/// Compute logic that emits its resolved inputs as the "result" output.
pub struct EchoInputs;

impl ComputeFn for EchoInputs {
  fn compute<'a>(&'a self, _ctx: &'a StepContext, inputs: &'a StepInputs) -> anyhow::Result<Option<UserEventStream<'a>>> {
    let echoed = serde_json::to_value(inputs)?;
    let user_event = UserEvent::from(stepcore::OutputEvent::new("result", echoed));
    Ok(Some(Box::pin(stream::iter(vec![Ok(user_event)]))))
  }
}

// --- Output manager fixtures ---

#[derive(Clone)]
pub enum ManagerReply {
  Nothing,
  Materializations(Vec<Materialization>),
  WrongType,
  ObjectStore,
  Raise(fn() -> anyhow::Error),
}

/// Records every call and answers with a fixed reply.
#[derive(Clone)]
pub struct RecordingManager {
  reply: ManagerReply,
  delay: Option<Duration>,
  pub handled: Arc<Mutex<Vec<(OutputContext, Value)>>>,
}

impl RecordingManager {
  pub fn new(reply: ManagerReply) -> Self {
    Self {
      reply,
      delay: None,
      handled: Arc::new(Mutex::new(Vec::new())),
    }
  }

  pub fn slow(reply: ManagerReply, delay: Duration) -> Self {
    Self {
      delay: Some(delay),
      ..Self::new(reply)
    }
  }

  pub fn handled_values(&self) -> Vec<Value> {
    self.handled.lock().iter().map(|(_, value)| value.clone()).collect()
  }

  pub fn handled_contexts(&self) -> Vec<OutputContext> {
    self.handled.lock().iter().map(|(ctx, _)| ctx.clone()).collect()
  }
}

#[async_trait]
impl OutputManager for RecordingManager {
  async fn handle_output(&self, ctx: &OutputContext, value: &Value) -> anyhow::Result<HandledOutput> {
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    self.handled.lock().push((ctx.clone(), value.clone()));
    tracing::debug!(target: "test_managers", handle = %ctx.handle, "handled output");
    match &self.reply {
      ManagerReply::Nothing => Ok(HandledOutput::Nothing),
      ManagerReply::Materializations(materializations) => Ok(HandledOutput::Records(
        materializations.iter().cloned().map(UserReturn::from).collect(),
      )),
      ManagerReply::WrongType => Ok(HandledOutput::Records(vec![UserReturn::new("not a materialization")])),
      ManagerReply::ObjectStore => Ok(HandledOutput::ObjectStore(ObjectStoreOperation::new(
        ObjectStoreOperationType::SetObject,
        format!("intermediates/{}", ctx.handle),
        value.clone(),
      ))),
      ManagerReply::Raise(make_error) => Err(make_error()),
    }
  }
}

// --- Materializer fixtures ---

/// Emits one materialization labelled with the spec's "label" field.
#[derive(Clone, Default)]
pub struct LabelMaterializer {
  pub calls: Arc<Mutex<Vec<Value>>>,
}

#[async_trait]
impl Materializer for LabelMaterializer {
  async fn materialize(&self, _ctx: &StepContext, spec: &Value, value: &Value) -> anyhow::Result<Vec<UserReturn>> {
    self.calls.lock().push(spec.clone());
    let label = spec.get("label").and_then(Value::as_str).unwrap_or("unlabelled").to_string();
    Ok(vec![Materialization::new(label).with_description(format!("value {}", value)).into()])
  }
}

pub struct WrongTypeMaterializer;

#[async_trait]
impl Materializer for WrongTypeMaterializer {
  async fn materialize(&self, _ctx: &StepContext, _spec: &Value, _value: &Value) -> anyhow::Result<Vec<UserReturn>> {
    Ok(vec![UserReturn::new(42_i64)])
  }
}

pub struct RaisingMaterializer(pub fn() -> anyhow::Error);

#[async_trait]
impl Materializer for RaisingMaterializer {
  async fn materialize(&self, _ctx: &StepContext, _spec: &Value, _value: &Value) -> anyhow::Result<Vec<UserReturn>> {
    Err((self.0)())
  }
}

// --- Input source fixtures ---

pub struct RaisingSource(pub fn() -> anyhow::Error);

#[async_trait]
impl InputSource for RaisingSource {
  async fn load(&self, _ctx: &StepContext) -> anyhow::Result<LoadedInput> {
    Err((self.0)())
  }
}

/// Reports a legacy object-store read of `value` at `key`.
pub struct ObjectStoreSource {
  pub key: String,
  pub value: Value,
}

#[async_trait]
impl InputSource for ObjectStoreSource {
  async fn load(&self, _ctx: &StepContext) -> anyhow::Result<LoadedInput> {
    Ok(LoadedInput::Single(StoredValue::ObjectStore(ObjectStoreOperation::new(
      ObjectStoreOperationType::GetObject,
      self.key.clone(),
      self.value.clone(),
    ))))
  }
}

// --- Version resolver fixture ---

pub struct HandleVersions;

impl VersionResolver for HandleVersions {
  fn resolve_version(&self, handle: &StepOutputHandle) -> Option<String> {
    Some(format!("v1-{}", handle))
  }
}

// --- Step / context helpers ---

pub fn step(key: &str, compute: impl ComputeFn + 'static) -> ExecutionStep {
  ExecutionStep::new(key, NodeHandle::root(key), format!("{}_def", key), compute)
}

pub fn output(name: &str, runtime_type: RuntimeType, manager: &RecordingManager) -> StepOutput {
  StepOutput::new(name, runtime_type, "recording", Arc::new(manager.clone()))
}

pub fn context(step: ExecutionStep) -> StepContext {
  StepContext::new("run-1", Arc::new(step), PipelineInfo::new("test_pipeline"))
}

pub async fn run(ctx: &StepContext) -> (Vec<LifecycleEvent>, Option<StepError>) {
  collect_step_events(ctx, 0).await
}

pub fn event_types(events: &[LifecycleEvent]) -> Vec<&'static str> {
  events.iter().map(LifecycleEvent::event_type).collect()
}

pub fn count_of(events: &[LifecycleEvent], event_type: &str) -> usize {
  events.iter().filter(|e| e.event_type() == event_type).count()
}

pub fn materialization_labels(events: &[LifecycleEvent]) -> Vec<String> {
  events
    .iter()
    .filter_map(|e| match &e.kind {
      LifecycleEventKind::StepMaterialization(m) => Some(m.label.clone()),
      _ => None,
    })
    .collect()
}

pub fn anyhow_boom() -> anyhow::Error {
  anyhow::anyhow!("boom")
}

pub fn bucket_not_writable() -> anyhow::Error {
  anyhow::anyhow!("bucket not writable")
}

pub fn explicit_failure() -> anyhow::Error {
  stepcore::Failure::new("gave up on purpose").into()
}

pub fn retry_in_five() -> anyhow::Error {
  stepcore::RetryRequested::new(3).with_cooldown(5.0).into()
}

pub fn result_42() -> UserEvent {
  stepcore::OutputEvent::new("result", json!(42)).into()
}

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
