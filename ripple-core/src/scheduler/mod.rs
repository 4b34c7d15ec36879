//! Scheduling
//!
//! Batched computations do not recompute inside `notify()`. They hand
//! themselves to the thread's [`Scheduler`], which decides when and in what
//! order they run.
//!
//! The contract is small:
//!
//! - [`enqueue`](Scheduler::enqueue) accepts a job and de-duplicates it by
//!   [`ComputationId`](crate::reactive::ComputationId) until it runs.
//! - [`flush`](Scheduler::flush) eventually calls `before()` then `run()` on
//!   every queued job, once per flush cycle.
//!
//! [`FlushQueue`] is the default implementation. Install another one with
//! [`Runtime::set_scheduler`](crate::reactive::Runtime::set_scheduler).

mod queue;

pub use queue::FlushQueue;

use std::rc::Rc;

use crate::error::Result;
use crate::reactive::Subscriber;

/// A computation waiting to recompute.
pub type Job = Rc<dyn Subscriber>;

/// Receives batched computations and runs them later.
pub trait Scheduler {
    /// Queue `job` unless it is already queued.
    fn enqueue(&self, job: Job);

    /// Run queued jobs until none are left. Returns how many runs happened.
    fn flush(&self) -> Result<usize>;

    /// Number of jobs waiting.
    fn pending(&self) -> usize {
        0
    }
}
