// stepcore/src/storage/mod.rs

pub mod mem;

pub use mem::{FromStepOutput, FromStepOutputs, FromValue, InMemoryOutputManager};
