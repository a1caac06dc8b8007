// src/lib.rs

//! stepcore: the ASYNC step-execution core of a pipeline orchestration engine.
//!
//! Executing a step produces a lazily pulled, ordered stream of lifecycle events:
//!  - start (or restart, for a retried attempt);
//!  - store operations and type checks for every loaded input;
//!  - per output yielded by the step's compute logic: its type check, what its
//!    output manager reported, and any materializations configured for it;
//!  - expectation results and materializations yielded directly by compute;
//!  - success, with the measured duration.
//!
//! The stream ends early with a `StepError` on the first fatal problem. User-declared
//! `Failure` and `RetryRequested` signals reach the caller unwrapped; the scheduler
//! driving the stream decides what happens next.

pub mod config;
pub mod core;
pub mod error;
pub mod execution;
pub mod storage;

// --- Re-exports for the Public API ---

// Step definition and execution context
pub use crate::core::context::{OutputContext, PipelineInfo, StepContext, StepInputs, MEMOIZED_RUN_TAG};
pub use crate::core::handle::{NodeHandle, StepOutputHandle};
pub use crate::core::step::{ExecutionStep, StepInput, StepOutput};
pub use crate::core::types::{
  MetadataEntry, MetadataValue, RuntimeType, TypeCheckContext, TypeCheckResult, TypeKind, UserReturn,
};

// Events, user-facing and lifecycle
pub use crate::core::events::{
  AssetKey, AssetStoreHandle, AssetStoreOperation, AssetStoreOperationResult, AssetStoreOperationType,
  ExpectationResult, LifecycleEvent, LifecycleEventKind, Materialization, ObjectStoreOperation,
  ObjectStoreOperationResult, ObjectStoreOperationType, OutputEvent, OutputKind, StepInputData, StepOutputData,
  StepSuccessData, TypeCheckData, UserEvent,
};

// Collaborator interfaces
pub use crate::core::traits::{
  compute_fn, ComputeFn, FnCompute, HandledOutput, InputSource, LoadedInput, Materializer, OutputManager,
  StoredValue, TypeValidator, UserEventStream, VersionResolver,
};

pub use crate::config::{EnvironmentConfig, NodeConfig};
pub use crate::error::{Failure, RetryRequested, StepError, StepResult, TypeCheckTarget};
pub use crate::execution::{collect_step_events, do_type_check, execute_step, EventStream};
pub use crate::storage::{FromStepOutput, FromStepOutputs, FromValue, InMemoryOutputManager};

pub use serde_json::Value;
