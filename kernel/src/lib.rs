//! An optimistic (Time Warp style) parallel discrete-event executor.
//!
//! Logical processes (LPs) are partitioned over worker threads. Each worker
//! speculatively executes its pending events in local virtual-time order; a
//! straggler event rolls the affected LP back through the exact reverse
//! handlers of everything it executed too early, and anti-messages chase
//! down the events those handlers scheduled. Side effects that must survive
//! are deferred to commit handlers, which only run once global virtual time
//! (GVT) has passed the event.

mod event;
mod executor;
mod lp;
mod rng;

pub use event::{Bitfield, Event, Payload, MAX_PAYLOAD};
pub use executor::{Executor, ExecutorConfig, RunOutput, RunStats};
pub use lp::{EventCtx, LogicalProcess, ScheduledEvent};
pub use rng::ReversibleRng;

/// Virtual time in milliseconds.
pub type SimTime = f64;

/// Global id of a logical process.
pub type LpId = u64;
