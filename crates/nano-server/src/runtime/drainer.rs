//! Execution drainer
//!
//! Drives a handler's result to settlement under a bounded budget.
//!
//! ```text
//! Invoke ──► Immediate ───────────────────────────► Settled
//!    │
//!    └─────► Pending ──► [check state → budget → checkpoint]* ──► Settled
//!                                         │
//!                                         └── budget spent ──► Timeout
//! ```
//!
//! Non-promise results are final without running any checkpoint. For a
//! promise, the state is checked before every checkpoint, so an
//! already-resolved promise settles in zero cycles.

use std::rc::Rc;
use std::time::Duration;

use boa_engine::{
    Context, JsValue, builtins::promise::PromiseState, object::builtins::JsPromise,
};
use nano_common::error::{NanoError, Result};
use tokio::time::Instant;

use crate::runtime::job_executor::NanoJobExecutor;

/// How long a handler may take to settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainMode {
    /// Wall-clock budget. While the job queue is idle the drainer sleeps to
    /// the deadline rather than spinning.
    Deadline(Duration),
    /// A fixed number of checkpoints, idle or not.
    Iterations(u32),
}

impl Default for DrainMode {
    fn default() -> Self {
        DrainMode::Deadline(Duration::from_secs(30))
    }
}

/// The settled outcome of a promise-or-value.
#[derive(Debug, Clone)]
pub enum Settlement {
    Fulfilled(JsValue),
    Rejected(JsValue),
}

/// Budget tracking for one request. Shared across every promise the request
/// waits on, including response body reads.
#[derive(Debug)]
pub struct DrainBudget {
    mode: DrainMode,
    started: Instant,
    cycles: u32,
}

impl DrainBudget {
    pub fn new(mode: DrainMode) -> Self {
        Self {
            mode,
            started: Instant::now(),
            cycles: 0,
        }
    }

    /// Number of checkpoints run so far.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Counts one unit of progress made without running a checkpoint, such
    /// as a body chunk produced synchronously by `pull`.
    pub fn charge(&mut self) {
        self.cycles = self.cycles.saturating_add(1);
    }

    pub fn is_exhausted(&self) -> bool {
        match self.mode {
            DrainMode::Deadline(timeout) => self.started.elapsed() >= timeout,
            DrainMode::Iterations(limit) => self.cycles >= limit,
        }
    }

    fn deadline(&self) -> Option<Instant> {
        match self.mode {
            DrainMode::Deadline(timeout) => Some(self.started + timeout),
            DrainMode::Iterations(_) => None,
        }
    }

    fn timeout(&self) -> NanoError {
        NanoError::Timeout { cycles: self.cycles }
    }
}

/// Runs job checkpoints on behalf of a waiting request.
pub struct Drainer {
    executor: Rc<NanoJobExecutor>,
    mode: DrainMode,
}

impl Drainer {
    pub fn new(executor: Rc<NanoJobExecutor>, mode: DrainMode) -> Self {
        Self { executor, mode }
    }

    pub fn mode(&self) -> DrainMode {
        self.mode
    }

    /// Starts a fresh budget for one request.
    pub fn budget(&self) -> DrainBudget {
        DrainBudget::new(self.mode)
    }

    /// Waits for `value` to settle.
    ///
    /// # Arguments
    ///
    /// * `value` - The handler's return value; anything but a promise is
    ///   returned as fulfilled immediately
    /// * `budget` - The request's remaining budget
    /// * `context` - The app's engine context
    ///
    /// # Returns
    ///
    /// The promise's settlement, or [`NanoError::Timeout`] once the budget is
    /// exhausted with the promise still pending.
    pub async fn settle(
        &self,
        value: JsValue,
        budget: &mut DrainBudget,
        context: &mut Context,
    ) -> Result<Settlement> {
        let promise = match value.as_object().and_then(|object| JsPromise::from_object(object.clone()).ok()) {
            Some(promise) => promise,
            None => return Ok(Settlement::Fulfilled(value)),
        };

        loop {
            match promise.state() {
                PromiseState::Fulfilled(value) => return Ok(Settlement::Fulfilled(value)),
                PromiseState::Rejected(reason) => return Ok(Settlement::Rejected(reason)),
                PromiseState::Pending => {}
            }
            if budget.is_exhausted() {
                tracing::debug!(cycles = budget.cycles, "Drain budget exhausted");
                return Err(budget.timeout());
            }
            self.checkpoint(budget, context).await;
        }
    }

    /// Runs one checkpoint and charges it to `budget`.
    pub async fn checkpoint(&self, budget: &mut DrainBudget, context: &mut Context) {
        let ran = self.executor.run_checkpoint(context);
        budget.charge();

        if ran == 0 {
            if let Some(deadline) = budget.deadline() {
                // Nothing can make progress on this thread until the next
                // request arrives, which is queued behind this one.
                tracing::trace!("Job queue idle, waiting out the deadline");
                tokio::time::sleep_until(deadline).await;
                return;
            }
        }
        tokio::task::yield_now().await;
    }

    /// Fails with a timeout if the budget is already spent.
    pub fn ensure_budget(&self, budget: &DrainBudget) -> Result<()> {
        if budget.is_exhausted() {
            Err(budget.timeout())
        } else {
            Ok(())
        }
    }
}
