//! Flush Queue
//!
//! The default [`Scheduler`]: a de-duplicating queue flushed in cycles.
//!
//! # Algorithm
//!
//! 1. `enqueue` records the job's id in a has-set and appends it. A job that
//!    is already waiting is ignored.
//! 2. `flush` takes the whole queue as one cycle and sorts it by ascending
//!    id, so computations created first run first.
//! 3. Each job leaves the has-set right before it runs. If it is notified
//!    again while running, or after it ran, it lands in the next cycle.
//! 4. Cycles repeat until the queue is empty.
//!
//! A job that runs more than `max_update_count` times in one flush is taken
//! to be an update loop: the queue is cleared and the flush fails with
//! [`ReactiveError::CircularUpdate`].

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use tracing::{debug, trace, warn};

use super::{Job, Scheduler};
use crate::error::{ReactiveError, Result};
use crate::reactive::{ComputationId, Runtime};

#[derive(Default)]
struct QueueState {
    queue: Vec<Job>,
    has: HashSet<ComputationId>,
    flushing: bool,
}

/// De-duplicating, id-ordered job queue.
#[derive(Default)]
pub struct FlushQueue {
    state: RefCell<QueueState>,
}

/// Clears the flushing flag however the flush ends.
struct Flushing<'a>(&'a RefCell<QueueState>);

impl Drop for Flushing<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.0.try_borrow_mut() {
            state.flushing = false;
        }
    }
}

impl FlushQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a flush is in progress.
    pub fn is_flushing(&self) -> bool {
        self.state.borrow().flushing
    }

    fn next_cycle(&self) -> Vec<Job> {
        let mut cycle = std::mem::take(&mut self.state.borrow_mut().queue);
        cycle.sort_by_key(|job| job.id());
        cycle
    }

    /// Drop everything queued. The jobs are released after the borrow ends.
    fn clear(&self) -> Vec<Job> {
        let mut state = self.state.borrow_mut();
        state.has.clear();
        std::mem::take(&mut state.queue)
    }
}

impl Scheduler for FlushQueue {
    fn enqueue(&self, job: Job) {
        let mut state = self.state.borrow_mut();
        if state.has.insert(job.id()) {
            trace!(computation = job.id().raw(), "queued");
            state.queue.push(job);
        }
    }

    fn flush(&self) -> Result<usize> {
        {
            let mut state = self.state.borrow_mut();
            if state.flushing {
                return Ok(0);
            }
            state.flushing = true;
        }
        let _flushing = Flushing(&self.state);

        let limit = Runtime::config().max_update_count;
        let mut runs: HashMap<ComputationId, usize> = HashMap::new();
        let mut total = 0;

        loop {
            let cycle = self.next_cycle();
            if cycle.is_empty() {
                break;
            }

            let mut jobs = cycle.into_iter();
            while let Some(job) = jobs.next() {
                let id = job.id();
                self.state.borrow_mut().has.remove(&id);

                let count = runs.entry(id).or_insert(0);
                *count += 1;
                if *count > limit {
                    let count = *count;
                    warn!(computation = id.raw(), count, "possible infinite update loop");
                    drop(self.clear());
                    return Err(ReactiveError::CircularUpdate { id, count });
                }

                job.before();
                if let Err(err) = job.run() {
                    // Put back what this cycle did not reach; it is still in `has`.
                    let mut state = self.state.borrow_mut();
                    let queued = std::mem::replace(&mut state.queue, jobs.collect());
                    state.queue.extend(queued);
                    return Err(err);
                }
                total += 1;
            }
        }

        debug!(runs = total, "flush complete");
        Ok(total)
    }

    fn pending(&self) -> usize {
        self.state.borrow().queue.len()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Computation, Mode, Signal};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn logged(signal: &Signal<i32>, log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> Computation<i32> {
        let (source, sink) = (signal.clone(), Rc::clone(log));
        Computation::builder(move || source.get())
            .mode(Mode::render())
            .callback(move |_, _| sink.borrow_mut().push(name))
            .build()
            .unwrap()
    }

    #[test]
    fn jobs_are_deduplicated() {
        let signal = Signal::new(0);
        let log = Rc::default();
        let computation = logged(&signal, &log, "a");

        let queue = FlushQueue::new();
        let job = Runtime::lookup(computation.id()).unwrap();
        queue.enqueue(Rc::clone(&job));
        queue.enqueue(job);
        assert_eq!(queue.pending(), 1);
    }

    #[test]
    fn cycle_runs_in_id_order() {
        let signal = Signal::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let first = logged(&signal, &log, "first");
        let second = logged(&signal, &log, "second");

        // Also queues both on the runtime's scheduler, which is never flushed here.
        signal.set(1).unwrap();

        let queue = FlushQueue::new();
        queue.enqueue(Runtime::lookup(second.id()).unwrap());
        queue.enqueue(Runtime::lookup(first.id()).unwrap());

        assert_eq!(queue.flush().unwrap(), 2);
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn notification_during_flush_runs_in_next_cycle() {
        let trigger = Signal::new(0);
        let downstream = Signal::new(0);
        let runs = Rc::new(Cell::new(0));

        let (source, target) = (trigger.clone(), downstream.clone());
        let _writer = Computation::builder(move || source.get())
            .mode(Mode::render())
            .try_callback(move |new, _| Ok(target.set(*new * 10)?))
            .build()
            .unwrap();

        let (source, counter) = (downstream.clone(), runs.clone());
        let reader = Computation::builder(move || {
            counter.set(counter.get() + 1);
            source.get()
        })
        .mode(Mode::render())
        .build()
        .unwrap();

        trigger.set(1).unwrap();
        assert_eq!(Runtime::flush().unwrap(), 2);
        assert_eq!(reader.value(), Some(10));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn feedback_loop_hits_circular_guard() {
        Runtime::configure(crate::RuntimeConfig {
            max_update_count: 20,
            ..Default::default()
        });
        let signal = Signal::new(0);

        let (source, target) = (signal.clone(), signal.clone());
        let looping = Computation::builder(move || source.get())
            .mode(Mode::render())
            .try_callback(move |new, _| Ok(target.set(*new + 1)?))
            .build()
            .unwrap();

        signal.set(1).unwrap();
        match Runtime::flush() {
            Err(ReactiveError::CircularUpdate { id, count }) => {
                assert_eq!(id, looping.id());
                assert_eq!(count, 21);
            }
            other => panic!("expected circular update, got {other:?}"),
        }
        assert_eq!(Runtime::scheduler().map_or(1, |s| s.pending()), 0);
        assert_eq!(signal.get_untracked(), 21);
    }

    #[test]
    fn failing_job_requeues_the_rest() {
        let signal = Signal::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));

        let source = signal.clone();
        let _failing = Computation::builder(move || source.get())
            .mode(Mode::render())
            .try_callback(|_, _| Err("render failed".into()))
            .build()
            .unwrap();
        let _after = logged(&signal, &log, "after");

        signal.set(1).unwrap();
        assert!(matches!(Runtime::flush(), Err(ReactiveError::Callback { .. })));
        assert_eq!(Runtime::scheduler().map_or(0, |s| s.pending()), 1);

        Runtime::flush().unwrap();
        assert_eq!(*log.borrow(), vec!["after"]);
    }

    #[test]
    fn nested_flush_is_a_no_op() {
        let signal = Signal::new(0);
        let nested = Rc::new(Cell::new(None));

        let (source, result) = (signal.clone(), nested.clone());
        let _computation = Computation::builder(move || source.get())
            .mode(Mode::render())
            .callback(move |_, _| result.set(Some(Runtime::flush().map_err(drop))))
            .build()
            .unwrap();

        signal.set(1).unwrap();
        assert_eq!(Runtime::flush().unwrap(), 1);
        assert_eq!(nested.get(), Some(Ok(0)));
    }
}
