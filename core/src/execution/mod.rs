// stepcore/src/execution/mod.rs

//! The stages of one step execution, leaf to root: type checks, input resolution,
//! compute invocation, the output gate, persistence, and the orchestrator on top.

mod compute;
mod inputs;
mod orchestrator;
mod outputs;
mod persistence;
mod timing;
mod type_check;

pub use orchestrator::{collect_step_events, execute_step, EventStream};
pub use type_check::do_type_check;
