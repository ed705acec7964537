//! State machine abstractions for the lockstep protocol.
//!
//! The protocol is implemented as synchronous, deterministic state machines:
//! an external runner (transport glue, simulation harness, ...) feeds
//! [`Event`]s in and executes the returned [`Action`]s. No I/O, threading or
//! locking happens inside a state machine; concurrency exists only across
//! peer processes.

mod action;
mod event;
mod request;
mod traits;

pub use action::{Action, Notification};
pub use event::Event;
pub use request::{QueryError, QuerySlot, RequestId};
pub use traits::{AppCore, PairwiseValidation, StateMachine};
