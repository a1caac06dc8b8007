// stepcore/src/execution/outputs.rs

//! The output validation gate between compute and persistence.
//!
//! Every output the compute logic yields is checked against the step's declared
//! outputs as it arrives. Once the compute stream is exhausted, required outputs
//! that were never yielded are either filled in (Nothing-typed) or reported.

use crate::core::context::StepContext;
use crate::core::events::{OutputEvent, OutputKind, UserEvent};
use crate::core::step::{ExecutionStep, StepOutput};
use crate::error::{StepError, StepResult};
use async_stream::try_stream;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{event, Level};

pub(crate) fn checked_user_events<'a>(
  ctx: &'a StepContext,
  user_events: BoxStream<'a, StepResult<UserEvent>>,
) -> BoxStream<'a, StepResult<UserEvent>> {
  Box::pin(try_stream! {
    let step = ctx.step();
    let mut tracker = OutputTracker::default();
    let mut user_events = user_events;

    while let Some(user_event) = user_events.next().await {
      let user_event = user_event?;
      if let UserEvent::Output(output) = &user_event {
        tracker.observe(step, output)?;
      }
      yield user_event;
    }

    for step_output in tracker.unseen_required(step) {
      let implicit = implicit_output(step, step_output)?;
      yield UserEvent::Output(implicit);
    }
  })
}

/// Outputs seen so far in one step execution.
#[derive(Debug, Default)]
pub(crate) struct OutputTracker {
  seen_outputs: HashSet<String>,
  seen_mapping_keys: HashMap<String, HashSet<String>>,
}

impl OutputTracker {
  /// Validates `output` against the step's declarations and records it.
  pub(crate) fn observe(&mut self, step: &ExecutionStep, output: &OutputEvent) -> StepResult<()> {
    let handle = step.node_handle();
    let name = &output.output_name;
    let violation = |message: String| StepError::invariant(step.key(), message);
    let step_output = step.step_output_named(name).ok_or_else(|| {
      violation(format!(
        "Compute for node \"{}\" returned an output \"{}\" that does not exist. The available outputs are {:?}",
        handle,
        name,
        step.output_names()
      ))
    })?;

    match &output.kind {
      OutputKind::Static => {
        if self.seen_outputs.contains(name) {
          return Err(violation(format!(
            "Compute for node \"{}\" returned an output \"{}\" multiple times",
            handle, name
          )));
        }
        if step_output.is_dynamic {
          return Err(violation(format!(
            "Compute for node \"{}\" for output \"{}\" defined as dynamic must yield a dynamic output, got a static one.",
            handle, name
          )));
        }
      }
      OutputKind::Dynamic { mapping_key } => {
        if !step_output.is_dynamic {
          return Err(violation(format!(
            "Compute for node \"{}\" yielded a dynamic output for \"{}\", but the output is not declared dynamic.",
            handle, name
          )));
        }
        let keys = self.seen_mapping_keys.entry(name.clone()).or_default();
        if !keys.insert(mapping_key.clone()) {
          return Err(violation(format!(
            "Compute for node \"{}\" yielded a dynamic output with mapping key \"{}\" multiple times.",
            handle, mapping_key
          )));
        }
      }
    }

    self.seen_outputs.insert(name.clone());
    Ok(())
  }

  /// Required outputs that were never yielded, in declaration order.
  pub(crate) fn unseen_required<'s>(&'s self, step: &'s ExecutionStep) -> impl Iterator<Item = &'s StepOutput> + 's {
    step
      .outputs()
      .iter()
      .filter(move |step_output| !step_output.optional && !self.seen_outputs.contains(&step_output.name))
  }
}

/// Fills in a required output the compute logic never yielded.
///
/// Only Nothing-typed outputs get an implicit null value; anything else is reported
/// as not found.
fn implicit_output(step: &ExecutionStep, step_output: &StepOutput) -> StepResult<OutputEvent> {
  if !step_output.runtime_type.is_nothing() {
    return Err(StepError::StepOutputNotFound {
      step_key: step.key().to_string(),
      output_name: step_output.name.clone(),
      message: format!(
        "Compute for node \"{}\" did not return an output for non-optional output \"{}\"",
        step.node_handle(),
        step_output.name
      ),
    });
  }
  event!(
    Level::INFO,
    step_key = %step.key(),
    output_name = %step_output.name,
    "Emitting implicit Nothing for output \"{}\" on node {}.",
    step_output.name,
    step.node_handle()
  );
  Ok(OutputEvent::new(step_output.name.clone(), Value::Null))
}
