// core/src/flow/mod.rs

//! A small asynchronous step runner with saga-style compensation.
//!
//! A [`Flow`] is an ordered list of named steps. Each step has one `on`
//! handler and, optionally, a compensation. Handlers share a [`ContextData`].
//! When a handler fails, the compensations of every step that already
//! completed run in reverse order before the error is returned, so a flow
//! either finishes or leaves no partial effects behind (as far as its
//! compensations can undo them).

pub mod context_data;
pub mod control;
pub mod definition;
pub mod error;
mod execution;

pub use context_data::ContextData;
pub use control::{FlowControl, FlowResult};
pub use definition::{Compensation, Flow, StepDef, StepHandler};
pub use error::FlowError;
