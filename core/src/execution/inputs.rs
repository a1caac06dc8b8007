// stepcore/src/execution/inputs.rs

//! Input resolution: loading each declared input from its source, then checking
//! the loaded values against their declared types.

use crate::core::context::{StepContext, StepInputs};
use crate::core::events::LifecycleEvent;
use crate::core::step::StepInput;
use crate::core::traits::{LoadedInput, StoredValue};
use crate::error::{user_code_boundary, StepError, StepResult};
use crate::execution::orchestrator::EventStream;
use crate::execution::type_check::{checked_value, ensure_type_check_passed, CheckTarget};
use async_stream::try_stream;
use futures::stream::BoxStream;
use serde_json::Value;
use tracing::{event, instrument, Level};

/// One item of the loading pass.
#[derive(Debug)]
pub(crate) enum InputItem {
  /// A store operation reported by a source, already stripped of its object.
  Event(LifecycleEvent),
  Loaded { name: String, value: Value },
}

/// Loads every input whose type is not Nothing, in declaration order.
pub(crate) fn load_input_values(ctx: &StepContext) -> BoxStream<'_, StepResult<InputItem>> {
  Box::pin(try_stream! {
    for input in ctx.step().inputs() {
      if input.runtime_type.is_nothing() {
        event!(Level::TRACE, step_key = %ctx.step_key(), input_name = %input.name, "Skipping Nothing input.");
        continue;
      }

      match load_input(ctx, input).await? {
        LoadedInput::Single(stored) => {
          let (store_event, value) = unwrap_stored(ctx, &input.name, stored);
          if let Some(store_event) = store_event {
            yield InputItem::Event(store_event);
          }
          yield InputItem::Loaded { name: input.name.clone(), value };
        }
        LoadedInput::FanIn(stored_values) => {
          let mut values = Vec::with_capacity(stored_values.len());
          for stored in stored_values {
            let (store_event, value) = unwrap_stored(ctx, &input.name, stored);
            if let Some(store_event) = store_event {
              yield InputItem::Event(store_event);
            }
            values.push(value);
          }
          yield InputItem::Loaded { name: input.name.clone(), value: Value::Array(values) };
        }
      }
    }
  })
}

/// Checks every resolved input, yielding one `StepInput` event per input.
///
/// The event is yielded even when the check fails; the stream then ends with
/// `TypeCheckDidNotPass`.
pub(crate) fn type_checked_input_events<'a>(ctx: &'a StepContext, inputs: &'a StepInputs) -> EventStream<'a> {
  Box::pin(try_stream! {
    for (name, value) in inputs {
      let input = ctx.step().step_input_named(name).ok_or_else(|| {
        StepError::invariant(
          ctx.step_key(),
          format!("Resolved input \"{}\" is not declared on step \"{}\".", name, ctx.step_key()),
        )
      })?;
      let target = CheckTarget::Input(name);
      let type_check = checked_value(ctx, &input.runtime_type, target, value)?;
      yield LifecycleEvent::step_input(ctx, name, input.runtime_type.display_name(), &type_check);
      ensure_type_check_passed(ctx.step_key(), target, &input.runtime_type, &type_check)?;
    }
  })
}

#[instrument(
  name = "load_input",
  skip_all,
  fields(step_key = %ctx.step_key(), input_name = %input.name),
  err(Display)
)]
async fn load_input(ctx: &StepContext, input: &StepInput) -> StepResult<LoadedInput> {
  event!(Level::DEBUG, "Loading step input.");
  user_code_boundary(input.source.load(ctx).await, |source| StepError::LoadInput {
    step_key: ctx.step_key().to_string(),
    input_name: input.name.clone(),
    source,
  })
}

fn unwrap_stored(ctx: &StepContext, input_name: &str, stored: StoredValue) -> (Option<LifecycleEvent>, Value) {
  match stored {
    StoredValue::Plain(value) => (None, value),
    StoredValue::ObjectStore(op) => {
      let store_event = LifecycleEvent::object_store_operation(ctx, op.serializable(Some(input_name)));
      (Some(store_event), op.obj)
    }
    StoredValue::AssetStore(op) => {
      let store_event = LifecycleEvent::asset_store_operation(ctx, op.serializable());
      (Some(store_event), op.obj.unwrap_or(Value::Null))
    }
  }
}
