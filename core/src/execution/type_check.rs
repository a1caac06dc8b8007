// stepcore/src/execution/type_check.rs

//! Runs a type validator against one runtime value and normalizes what it returns.

use crate::core::context::StepContext;
use crate::core::types::{json_type_name, RuntimeType, TypeCheckContext, TypeCheckResult};
use crate::error::{user_code_boundary, StepError, StepResult, TypeCheckTarget};
use serde_json::Value;
use tracing::{event, Level};

/// Which declared value a check is for.
#[derive(Debug, Clone, Copy)]
pub(crate) enum CheckTarget<'a> {
  Input(&'a str),
  Output(&'a str),
}

impl<'a> CheckTarget<'a> {
  fn label(&self) -> &'a str {
    match *self {
      CheckTarget::Input(name) | CheckTarget::Output(name) => name,
    }
  }

  fn kind(&self) -> TypeCheckTarget {
    match self {
      CheckTarget::Input(_) => TypeCheckTarget::Input,
      CheckTarget::Output(_) => TypeCheckTarget::Output,
    }
  }
}

/// Checks `value` against `runtime_type`.
///
/// A validator that hands back anything other than a `TypeCheckResult` yields a
/// failing result describing the mismatch instead of passing silently. Errors raised
/// by the validator are returned as-is.
pub fn do_type_check(
  ctx: &TypeCheckContext<'_>,
  runtime_type: &RuntimeType,
  value: &Value,
) -> anyhow::Result<TypeCheckResult> {
  let returned = runtime_type.validator().check(ctx, value)?;
  match returned.downcast::<TypeCheckResult>() {
    Ok(type_check) => Ok(type_check),
    Err(other) => {
      event!(
        Level::WARN,
        type_name = %runtime_type.display_name(),
        returned_type = other.type_name(),
        "Type validator returned a value that is not a TypeCheckResult."
      );
      Ok(TypeCheckResult::failed(format!(
        "Type checks must return TypeCheckResult. Type check for type {} returned value of type {} when checking runtime value {}.",
        runtime_type.display_name(),
        other.type_name(),
        value
      )))
    }
  }
}

/// `do_type_check` behind the type-check error boundary of `target`.
pub(crate) fn checked_value(
  ctx: &StepContext,
  runtime_type: &RuntimeType,
  target: CheckTarget<'_>,
  value: &Value,
) -> StepResult<TypeCheckResult> {
  let type_check_ctx = ctx.type_check_context(runtime_type);
  user_code_boundary(do_type_check(&type_check_ctx, runtime_type, value), |source| {
    StepError::TypeCheck {
      step_key: ctx.step_key().to_string(),
      label: target.label().to_string(),
      type_name: runtime_type.display_name().to_string(),
      message: format!(
        "In node \"{}\" the {} \"{}\" received value {} of JSON type {} which does not pass the type check for type \"{}\". Step {}.",
        ctx.step().node_handle(),
        target.kind(),
        target.label(),
        value,
        json_type_name(value),
        runtime_type.display_name(),
        ctx.step_key()
      ),
      source,
    }
  })
}

/// Turns a failing check into the fatal `TypeCheckDidNotPass` error.
pub(crate) fn ensure_type_check_passed(
  step_key: &str,
  target: CheckTarget<'_>,
  runtime_type: &RuntimeType,
  type_check: &TypeCheckResult,
) -> StepResult<()> {
  if type_check.success {
    return Ok(());
  }
  Err(StepError::TypeCheckDidNotPass {
    step_key: step_key.to_string(),
    target: target.kind(),
    label: target.label().to_string(),
    description: format!(
      "Type check failed for step {} \"{}\" - expected type \"{}\".",
      target.kind(),
      target.label(),
      runtime_type.display_name()
    ),
    metadata: type_check.metadata.clone(),
    type_name: runtime_type.display_name().to_string(),
  })
}
