// stepcore/src/execution/persistence.rs

//! Turns one validated output into its lifecycle events: the output type check,
//! whatever the output manager reports, and any materializations configured for
//! the output anywhere up the node's composition hierarchy.

use crate::core::context::StepContext;
use crate::core::events::{AssetStoreHandle, AssetStoreOperation, LifecycleEvent, Materialization, OutputEvent};
use crate::core::handle::StepOutputHandle;
use crate::core::step::StepOutput;
use crate::core::traits::HandledOutput;
use crate::core::types::UserReturn;
use crate::error::{user_code_boundary, StepError, StepResult};
use crate::execution::orchestrator::EventStream;
use crate::execution::type_check::{checked_value, ensure_type_check_passed, CheckTarget};
use async_stream::try_stream;
use serde_json::{Map, Value};
use tracing::{event, instrument, Level};

pub(crate) fn step_events_for_output(ctx: &StepContext, output: OutputEvent) -> EventStream<'_> {
  Box::pin(try_stream! {
    let step = ctx.step();
    let step_output = step.step_output_named(&output.output_name).ok_or_else(|| {
      StepError::invariant(
        step.key(),
        format!(
          "Output \"{}\" reached persistence but is not declared on step \"{}\".",
          output.output_name,
          step.key()
        ),
      )
    })?;

    let handle = StepOutputHandle {
      step_key: step.key().to_string(),
      output_name: output.output_name.clone(),
      mapping_key: output.mapping_key().map(str::to_string),
    };
    let version = ctx.resolve_output_version(&handle)?;

    let target = CheckTarget::Output(&output.output_name);
    let runtime_type = &step_output.runtime_type;
    let type_check = checked_value(ctx, runtime_type, target, &output.value)?;
    yield LifecycleEvent::step_output(ctx, handle.clone(), runtime_type.display_name(), &type_check, version.clone());
    ensure_type_check_passed(step.key(), target, runtime_type, &type_check)?;

    match handle_output(ctx, step_output, &handle, version, &output.value).await? {
      HandledOutput::ObjectStore(op) => {
        yield LifecycleEvent::object_store_operation(ctx, op.serializable(Some(&handle.output_name)));
      }
      HandledOutput::Nothing => {
        yield set_asset_event(ctx, step_output, &handle);
      }
      HandledOutput::Records(records) => {
        for record in records {
          let materialization = expect_materialization(step.key(), record, |returned_type| {
            format!(
              "Output manager \"{}\" on output \"{}\" has returned a value of type {}. The return type can only be Materialization.",
              step_output.manager_key, handle.output_name, returned_type
            )
          })?;
          yield LifecycleEvent::step_materialization(ctx, materialization);
        }
        yield set_asset_event(ctx, step_output, &handle);
      }
    }

    // Every level of the hierarchy may contribute; the walk does not stop at a match.
    for node in step.node_handle().ancestors() {
      let node_path = node.to_string();
      let node_config = match ctx.environment_config().node(&node_path) {
        Some(node_config) => node_config,
        None => continue,
      };

      for spec_entry in &node_config.outputs {
        let (configured_name, spec) = single_spec(step.key(), spec_entry, &node_path)?;
        if configured_name != &output.output_name {
          continue;
        }
        event!(
          Level::DEBUG,
          step_key = %step.key(),
          output_name = %output.output_name,
          node = %node_path,
          "Found materialization config for output."
        );
        let records = materialize(ctx, step_output, spec, &output.value).await?;
        for record in records {
          let materialization = expect_materialization(step.key(), record, |returned_type| {
            format!(
              "Materializer on type \"{}\" has returned a value of type {}. You must return a Materialization.",
              runtime_type.display_name(),
              returned_type
            )
          })?;
          yield LifecycleEvent::step_materialization(ctx, materialization);
        }
      }
    }
  })
}

#[instrument(
  name = "handle_output",
  skip_all,
  fields(step_key = %ctx.step_key(), output_name = %handle.output_name, manager_key = %step_output.manager_key),
  err(Display)
)]
async fn handle_output(
  ctx: &StepContext,
  step_output: &StepOutput,
  handle: &StepOutputHandle,
  version: Option<String>,
  value: &Value,
) -> StepResult<HandledOutput> {
  let output_context = ctx.output_context(handle, step_output, version);
  event!(Level::DEBUG, "Handing output to its manager.");
  user_code_boundary(
    step_output.manager.handle_output(&output_context, value).await,
    |source| StepError::HandleOutput {
      step_key: ctx.step_key().to_string(),
      output_name: handle.output_name.clone(),
      source,
    },
  )
}

#[instrument(
  name = "materialize_output",
  skip_all,
  fields(step_key = %ctx.step_key(), output_name = %step_output.name),
  err(Display)
)]
async fn materialize(
  ctx: &StepContext,
  step_output: &StepOutput,
  spec: &Value,
  value: &Value,
) -> StepResult<Vec<UserReturn>> {
  let runtime_type = &step_output.runtime_type;
  let materializer = runtime_type.materializer().ok_or_else(|| {
    StepError::invariant(
      ctx.step_key(),
      format!(
        "Output \"{}\" of step \"{}\" has a materialization config entry, but its type \"{}\" declares no materializer.",
        step_output.name,
        ctx.step_key(),
        runtime_type.display_name()
      ),
    )
  })?;

  let step = ctx.step();
  user_code_boundary(materializer.materialize(ctx, spec, value).await, |source| {
    StepError::Materialization {
      step_key: step.key().to_string(),
      output_name: step_output.name.clone(),
      node_name: step.node_name().to_string(),
      node_def_name: step.node_def_name().to_string(),
      source,
    }
  })
}

fn set_asset_event(ctx: &StepContext, step_output: &StepOutput, handle: &StepOutputHandle) -> LifecycleEvent {
  let asset_store_handle = AssetStoreHandle::new(step_output.manager_key.clone()).with_metadata(step_output.metadata.clone());
  let op = AssetStoreOperation::set_asset(handle.clone(), asset_store_handle);
  LifecycleEvent::asset_store_operation(ctx, op.serializable())
}

fn expect_materialization(
  step_key: &str,
  record: UserReturn,
  describe_mismatch: impl FnOnce(&str) -> String,
) -> StepResult<Materialization> {
  record
    .downcast::<Materialization>()
    .map_err(|other| StepError::invariant(step_key, describe_mismatch(other.type_name())))
}

fn single_spec<'c>(
  step_key: &str,
  entry: &'c Map<String, Value>,
  node_path: &str,
) -> StepResult<(&'c String, &'c Value)> {
  let mut entries = entry.iter();
  match (entries.next(), entries.next()) {
    (Some(single), None) => Ok(single),
    _ => Err(StepError::invariant(
      step_key,
      format!(
        "Output materialization config for node \"{}\" must map exactly one output name to its spec, got {} entries.",
        node_path,
        entry.len()
      ),
    )),
  }
}
