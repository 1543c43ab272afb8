//! Job executor for Boa's promise job queue
//!
//! This module implements the `JobExecutor` that backs every app context. It
//! stores engine jobs in separate queues and lets the drainer run them one
//! bounded checkpoint at a time, so a handler that keeps scheduling microtasks
//! cannot monopolize the worker thread.
//!
//! # Job Types
//!
//! - **PromiseJob**: Microtasks for promise resolution (then/catch handlers)
//! - **GenericJob**: General-purpose jobs
//!
//! No NANO binding is an async native function, so `AsyncJob`s (like
//! `TimeoutJob`s) are refused with a warning instead of being queued.
//!
//! # Checkpoints
//!
//! A checkpoint ([`NanoJobExecutor::run_checkpoint`]) runs:
//! 1. At most one generic job (macrotask semantics)
//! 2. The promise jobs that were queued when the checkpoint started
//!
//! Promise jobs enqueued while the checkpoint runs wait for the next one. This
//! keeps each checkpoint finite even for self-rescheduling promise chains.

use boa_engine::{
    context::Context,
    job::{GenericJob, Job, JobExecutor, PromiseJob},
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A JobExecutor that runs Boa's job queues in bounded checkpoints.
///
/// # Thread Safety
///
/// This executor uses `RefCell` for interior mutability, which is safe
/// because each app context lives on exactly one worker thread.
///
/// # Example
///
/// ```ignore
/// let executor = Rc::new(NanoJobExecutor::new());
/// let mut ctx = Context::builder()
///     .job_executor(executor.clone())
///     .build()?;
///
/// // Run one bounded batch of pending jobs
/// executor.run_checkpoint(&mut ctx);
/// ```
pub struct NanoJobExecutor {
    /// Queue for promise microtasks (then/catch handlers)
    promise_jobs: RefCell<VecDeque<PromiseJob>>,
    /// Queue for general-purpose jobs
    generic_jobs: RefCell<VecDeque<GenericJob>>,
}

impl NanoJobExecutor {
    /// Creates a new executor with empty job queues.
    pub fn new() -> Self {
        Self {
            promise_jobs: RefCell::default(),
            generic_jobs: RefCell::default(),
        }
    }

    /// Returns true if a checkpoint would find work to do.
    pub fn has_pending_jobs(&self) -> bool {
        !self.promise_jobs.borrow().is_empty() || !self.generic_jobs.borrow().is_empty()
    }

    /// Runs one checkpoint and returns how many jobs it ran.
    ///
    /// Job failures are logged and do not stop the checkpoint; a rejected
    /// handler promise is observed through the promise itself, not here.
    ///
    /// # Arguments
    ///
    /// * `context` - The Boa context the jobs belong to
    ///
    /// # Returns
    ///
    /// The number of generic and promise jobs executed. Zero means the
    /// executor was idle.
    pub fn run_checkpoint(&self, context: &mut Context) -> usize {
        let mut ran = 0;

        // Pop before calling: the job may enqueue more generic jobs.
        let generic = self.generic_jobs.borrow_mut().pop_front();
        if let Some(generic) = generic {
            ran += 1;
            if let Err(err) = generic.call(context) {
                tracing::error!("Uncaught error in generic job: {err}");
            }
        }

        let jobs = std::mem::take(&mut *self.promise_jobs.borrow_mut());
        for job in jobs {
            ran += 1;
            if let Err(e) = job.call(context) {
                tracing::error!("Uncaught error in promise job: {e}");
            }
        }

        context.clear_kept_objects();
        ran
    }
}

impl Default for NanoJobExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl JobExecutor for NanoJobExecutor {
    /// Enqueues a job to be executed by a later checkpoint.
    ///
    /// AsyncJob, TimeoutJob and other job types are not supported and are
    /// logged as warnings.
    fn enqueue_job(self: Rc<Self>, job: Job, _context: &mut Context) {
        match job {
            Job::PromiseJob(job) => self.promise_jobs.borrow_mut().push_back(job),
            Job::GenericJob(g) => self.generic_jobs.borrow_mut().push_back(g),
            _ => {
                tracing::warn!("Unsupported job type enqueued, ignoring");
            }
        }
    }

    /// Runs checkpoints until the synchronous queues are empty.
    ///
    /// Unlike the drainer this is unbounded, so it is only used where the
    /// script is trusted to settle (tests and module evaluation helpers).
    fn run_jobs(self: Rc<Self>, context: &mut Context) -> boa_engine::JsResult<()> {
        while self.has_pending_jobs() {
            self.run_checkpoint(context);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boa_engine::Source;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn context_with(executor: &Rc<NanoJobExecutor>) -> Context {
        Context::builder()
            .job_executor(executor.clone())
            .build()
            .unwrap()
    }

    fn counting_job(counter: &Arc<AtomicUsize>, context: &Context) -> Job {
        let counter = Arc::clone(counter);
        Job::GenericJob(GenericJob::new(
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(boa_engine::JsValue::undefined())
            },
            context.realm().clone(),
        ))
    }

    #[test]
    fn test_new_executor_is_idle() {
        let executor = NanoJobExecutor::default();
        assert!(!executor.has_pending_jobs());
    }

    #[test]
    fn test_checkpoint_on_empty_queues() {
        let executor = NanoJobExecutor::new();
        let mut context = Context::default();
        assert_eq!(executor.run_checkpoint(&mut context), 0);
    }

    #[test]
    fn test_checkpoint_runs_one_generic_job() {
        let executor = Rc::new(NanoJobExecutor::new());
        let mut context = Context::default();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let job = counting_job(&counter, &context);
            executor.clone().enqueue_job(job, &mut context);
        }

        assert_eq!(executor.run_checkpoint(&mut context), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(executor.has_pending_jobs());

        executor.run_checkpoint(&mut context);
        executor.run_checkpoint(&mut context);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(!executor.has_pending_jobs());
    }

    #[test]
    fn test_checkpoint_is_bounded_for_self_rescheduling_chains() {
        let executor = Rc::new(NanoJobExecutor::new());
        let mut context = context_with(&executor);

        context
            .eval(Source::from_bytes(
                "globalThis.ticks = 0; (function tick() { ticks++; Promise.resolve().then(tick); })();",
            ))
            .unwrap();

        for _ in 0..10 {
            assert!(executor.run_checkpoint(&mut context) > 0);
        }
        assert!(executor.has_pending_jobs());

        let ticks = context
            .eval(Source::from_bytes("ticks"))
            .unwrap()
            .to_number(&mut context)
            .unwrap();
        assert_eq!(ticks, 11.0);
    }

    #[test]
    fn test_run_jobs_drains_until_idle() {
        let executor = Rc::new(NanoJobExecutor::new());
        let mut context = context_with(&executor);

        context
            .eval(Source::from_bytes(
                "globalThis.out = []; Promise.resolve(1).then(v => out.push(v)).then(() => out.push(2));",
            ))
            .unwrap();
        executor.clone().run_jobs(&mut context).unwrap();

        assert!(!executor.has_pending_jobs());
        let length = context
            .eval(Source::from_bytes("out.length"))
            .unwrap()
            .to_number(&mut context)
            .unwrap();
        assert_eq!(length, 2.0);
    }

    #[test]
    fn test_async_jobs_are_refused() {
        let executor = Rc::new(NanoJobExecutor::new());
        let mut context = Context::default();
        let job = boa_engine::job::NativeAsyncJob::new(async |_context: &RefCell<&mut Context>| {
            Ok(boa_engine::JsValue::undefined())
        });

        executor.clone().enqueue_job(job.into(), &mut context);

        assert!(!executor.has_pending_jobs());
        assert_eq!(executor.run_checkpoint(&mut context), 0);
    }
}
