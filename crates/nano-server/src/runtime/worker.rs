//! Dedicated app threads
//!
//! Boa contexts cannot move between threads, so each app is owned by one OS
//! thread running a current-thread tokio runtime. The HTTP layer talks to it
//! through an unbounded channel; every request carries a one-shot reply
//! sender.
//!
//! ```text
//! HTTP task ──► mpsc ──► [worker thread: AppContext::handle] ──► oneshot ──► HTTP task
//! ```
//!
//! Requests are handled strictly one at a time, in arrival order.

use std::thread;

use nano_common::error::{NanoError, Result};
use nano_common::http::{HandlerResponse, RequestData};
use tokio::sync::{mpsc, oneshot};

use crate::resource_limits::ResourceLimits;
use crate::runtime::context::AppContext;

struct WorkRequest {
    request: RequestData,
    reply: oneshot::Sender<Result<HandlerResponse>>,
}

/// Handle to an app running on its own thread.
///
/// Cheap to share behind an `Arc`; dropping the last handle closes the
/// channel and lets the thread exit once in-flight work is done.
pub struct AppWorker {
    name: String,
    sender: mpsc::UnboundedSender<WorkRequest>,
}

impl AppWorker {
    /// Starts a worker thread and evaluates `source` on it.
    ///
    /// # Arguments
    ///
    /// * `name` - Used for the thread name and log fields
    /// * `source` - The app's module source
    /// * `limits` - Budget and buffer settings for this app
    ///
    /// # Errors
    ///
    /// Returns the module's [`NanoError::Script`] error if it fails to
    /// evaluate, or [`NanoError::Io`] if the thread cannot be spawned.
    pub async fn spawn(name: impl Into<String>, source: String, limits: ResourceLimits) -> Result<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let thread_name = name.clone();
        thread::Builder::new()
            .name(format!("nano-app-{}", name))
            .spawn(move || run_worker(thread_name, source, limits, receiver, ready_tx))?;

        ready_rx
            .await
            .map_err(|_| NanoError::WorkerUnavailable(format!("app {} exited during startup", name)))??;

        tracing::info!(app = %name, "App worker started");
        Ok(Self { name, sender })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues `request` for the app and waits for its response.
    ///
    /// # Errors
    ///
    /// Returns [`NanoError::WorkerUnavailable`] if the worker thread has
    /// exited, otherwise whatever the handler produced.
    pub async fn handle(&self, request: RequestData) -> Result<HandlerResponse> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(WorkRequest { request, reply })
            .map_err(|_| NanoError::WorkerUnavailable(format!("app {} is not running", self.name)))?;

        response
            .await
            .map_err(|_| NanoError::WorkerUnavailable(format!("app {} dropped the request", self.name)))?
    }
}

fn run_worker(
    name: String,
    source: String,
    limits: ResourceLimits,
    mut receiver: mpsc::UnboundedReceiver<WorkRequest>,
    ready: oneshot::Sender<Result<()>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready.send(Err(NanoError::Io(e)));
            return;
        }
    };

    runtime.block_on(async move {
        let mut app = match AppContext::new(&source, &limits).await {
            Ok(app) => app,
            Err(e) => {
                tracing::error!(app = %name, "App failed to start: {}", e);
                let _ = ready.send(Err(e));
                return;
            }
        };
        let _ = ready.send(Ok(()));

        while let Some(work) = receiver.recv().await {
            let result = app.handle(&work.request).await;
            if let Err(e) = &result {
                tracing::debug!(app = %name, method = %work.request.method, url = %work.request.url, "Request failed: {}", e);
            }
            // The caller may have gone away; the next request is unaffected.
            let _ = work.reply.send(result);
        }

        tracing::debug!(app = %name, "App worker shutting down");
    });
}
