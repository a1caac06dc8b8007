pub mod context;
pub mod events;
pub mod handle;
pub mod step;
pub mod traits;
pub mod types;

// Re-export key types for easier access from other stepcore modules (and lib.rs)
pub use context::{OutputContext, PipelineInfo, StepContext, StepInputs, MEMOIZED_RUN_TAG};
pub use events::{LifecycleEvent, LifecycleEventKind, Materialization, OutputEvent, UserEvent};
pub use handle::{NodeHandle, StepOutputHandle};
pub use step::{ExecutionStep, StepInput, StepOutput};
pub use types::{RuntimeType, TypeCheckResult, TypeKind, UserReturn};
