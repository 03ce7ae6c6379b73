//! Cooperative scheduler
//!
//! All asynchronous work in the analysis, sub-query seeding and
//! live-collection deliveries, is expressed as jobs on this FIFO queue.
//! Handlers never block on a sub-query; they enqueue and return, so host
//! call-stack depth stays shallow no matter how deep (or cyclic) the
//! logical dependency structure is.

use parking_lot::Mutex;
use std::collections::VecDeque;

type Job = Box<dyn FnOnce() + Send>;

/// FIFO job queue driven to quiescence by the query layer.
#[derive(Default)]
pub struct Scheduler {
    queue: Mutex<VecDeque<Job>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a job. Safe to call from inside a running job.
    pub fn enqueue(&self, job: impl FnOnce() + Send + 'static) {
        self.queue.lock().push_back(Box::new(job));
    }

    /// Run jobs until none are left. Jobs may enqueue further jobs;
    /// re-entrant calls simply drain whatever is pending and return.
    pub fn run_to_quiescence(&self) {
        loop {
            let job = self.queue.lock().pop_front();
            match job {
                Some(job) => job(),
                None => return,
            }
        }
    }

    /// Number of currently pending jobs.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_jobs_may_enqueue_jobs() {
        let scheduler = Arc::new(Scheduler::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let (s, c) = (scheduler.clone(), counter.clone());
        scheduler.enqueue(move || {
            c.fetch_add(1, Ordering::SeqCst);
            let c2 = c.clone();
            s.enqueue(move || {
                c2.fetch_add(1, Ordering::SeqCst);
            });
        });
        scheduler.run_to_quiescence();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.pending(), 0);
    }
}
