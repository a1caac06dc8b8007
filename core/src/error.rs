// stepcore/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;

use crate::core::types::MetadataEntry;

/// Raised by user code to fail a step on purpose.
///
/// Return it from any collaborator as `Err(Failure::new("...").into())`. It is never
/// wrapped by an error boundary, so the caller sees it as `StepError::Failure`.
#[derive(Debug, Clone, Error)]
#[error("Step failed intentionally: {description}")]
pub struct Failure {
  pub description: String,
  pub metadata: Vec<MetadataEntry>,
}

impl Failure {
  pub fn new(description: impl Into<String>) -> Self {
    Self {
      description: description.into(),
      metadata: Vec::new(),
    }
  }

  pub fn with_metadata(mut self, metadata: Vec<MetadataEntry>) -> Self {
    self.metadata = metadata;
    self
  }
}

/// Raised by user code to ask the scheduler for another attempt.
///
/// The core never retries by itself; this signal reaches the caller unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Retry requested (max_retries: {max_retries}, seconds_to_wait: {seconds_to_wait:?})")]
pub struct RetryRequested {
  pub max_retries: u32,
  /// Optional cooldown before the next attempt.
  pub seconds_to_wait: Option<f64>,
}

impl RetryRequested {
  pub fn new(max_retries: u32) -> Self {
    Self {
      max_retries,
      seconds_to_wait: None,
    }
  }

  pub fn with_cooldown(mut self, seconds_to_wait: f64) -> Self {
    self.seconds_to_wait = Some(seconds_to_wait);
    self
  }
}

impl Default for RetryRequested {
  fn default() -> Self {
    Self::new(1)
  }
}

/// Whether a failed type check was for a step input or a step output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCheckTarget {
  Input,
  Output,
}

impl std::fmt::Display for TypeCheckTarget {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      TypeCheckTarget::Input => write!(f, "input"),
      TypeCheckTarget::Output => write!(f, "output"),
    }
  }
}

#[derive(Debug, Error)]
pub enum StepError {
  /// A contract breach inside the orchestration logic. Never retried.
  #[error("Invariant violation: {message}")]
  InvariantViolation { step_key: String, message: String },

  #[error("{message}")]
  StepOutputNotFound {
    step_key: String,
    output_name: String,
    message: String,
  },

  #[error("Error occurred during the loading of step input \"{input_name}\" (step key: \"{step_key}\"). Source: {source}")]
  LoadInput {
    step_key: String,
    input_name: String,
    #[source]
    source: AnyhowError,
  },

  #[error("Error occurred during the execution of step \"{step_key}\" (node: \"{node_name}\", definition: \"{node_def_name}\"). Source: {source}")]
  Compute {
    step_key: String,
    node_name: String,
    node_def_name: String,
    #[source]
    source: AnyhowError,
  },

  #[error("Error occurred during the handling of step output \"{output_name}\" (step key: \"{step_key}\"). Source: {source}")]
  HandleOutput {
    step_key: String,
    output_name: String,
    #[source]
    source: AnyhowError,
  },

  #[error("Error occurred during output materialization of \"{output_name}\" (step key: \"{step_key}\", node: \"{node_name}\", definition: \"{node_def_name}\"). Source: {source}")]
  Materialization {
    step_key: String,
    output_name: String,
    node_name: String,
    node_def_name: String,
    #[source]
    source: AnyhowError,
  },

  /// The type validator itself raised while checking `label`.
  #[error("{message} Source: {source}")]
  TypeCheck {
    step_key: String,
    label: String,
    type_name: String,
    message: String,
    #[source]
    source: AnyhowError,
  },

  /// The validator ran and reported failure.
  #[error("{description}")]
  TypeCheckDidNotPass {
    step_key: String,
    target: TypeCheckTarget,
    label: String,
    description: String,
    metadata: Vec<MetadataEntry>,
    type_name: String,
  },

  #[error(transparent)]
  Failure(#[from] Failure),

  #[error(transparent)]
  RetryRequested(#[from] RetryRequested),
}

impl StepError {
  pub(crate) fn invariant(step_key: impl Into<String>, message: impl Into<String>) -> Self {
    StepError::InvariantViolation {
      step_key: step_key.into(),
      message: message.into(),
    }
  }

  pub fn is_retry_requested(&self) -> bool {
    matches!(self, StepError::RetryRequested(_))
  }

  pub fn is_invariant_violation(&self) -> bool {
    matches!(self, StepError::InvariantViolation { .. })
  }

  /// True for the kinds that wrap an error raised by a user collaborator.
  pub fn is_user_code_error(&self) -> bool {
    matches!(
      self,
      StepError::LoadInput { .. }
        | StepError::Compute { .. }
        | StepError::HandleOutput { .. }
        | StepError::Materialization { .. }
        | StepError::TypeCheck { .. }
    )
  }

  /// The step key attached to this error, when the kind carries one.
  pub fn step_key(&self) -> Option<&str> {
    match self {
      StepError::InvariantViolation { step_key, .. }
      | StepError::StepOutputNotFound { step_key, .. }
      | StepError::LoadInput { step_key, .. }
      | StepError::Compute { step_key, .. }
      | StepError::HandleOutput { step_key, .. }
      | StepError::Materialization { step_key, .. }
      | StepError::TypeCheck { step_key, .. }
      | StepError::TypeCheckDidNotPass { step_key, .. } => Some(step_key),
      StepError::Failure(_)
      | StepError::RetryRequested(_) => None,
    }
  }
}

pub type StepResult<T, E = StepError> = std::result::Result<T, E>;

/// Classifies an error raised by user code.
///
/// `Failure` and `RetryRequested` pass through as their own variants, an error that is
/// already a `StepError` is returned as-is to avoid `Compute(LoadInput(...))` nesting,
/// and anything else is handed to `wrap` to attach the boundary's context.
pub(crate) fn classify_user_error(err: AnyhowError, wrap: impl FnOnce(AnyhowError) -> StepError) -> StepError {
  let err = match err.downcast::<Failure>() {
    Ok(failure) => return StepError::Failure(failure),
    Err(err) => err,
  };
  let err = match err.downcast::<RetryRequested>() {
    Ok(retry) => return StepError::RetryRequested(retry),
    Err(err) => err,
  };
  match err.downcast::<StepError>() {
    Ok(step_err) => step_err,
    Err(err) => wrap(err),
  }
}

/// Runs `result` through a user-code error boundary.
pub(crate) fn user_code_boundary<T>(
  result: anyhow::Result<T>,
  wrap: impl FnOnce(AnyhowError) -> StepError,
) -> StepResult<T> {
  result.map_err(|err| classify_user_error(err, wrap))
}
