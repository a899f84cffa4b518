//! Adaptive concurrency.
//!
//! The controller owns the permitted number of simultaneous attempts and moves
//! it between configured bounds based on the success rate of recent outcomes.
//! It is owned by the scheduler's dispatch task, which is the only place
//! outcomes are recorded, so updates are serialized without a lock.

mod controller;
mod window;

pub use controller::{ConcurrencyController, SlotTransition};
pub use window::SuccessWindow;
