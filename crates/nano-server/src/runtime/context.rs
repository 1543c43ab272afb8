use boa_engine::{Context, JsObject, JsValue, Module, Source, js_string};
use hyper::body::Bytes;
use nano_common::error::{NanoError, Result};
use nano_common::http::{HandlerResponse, RequestData};
use std::path::Path;
use std::rc::Rc;

use crate::resource_limits::ResourceLimits;
use crate::runtime::bindings;
use crate::runtime::conversions::{body_chunk_bytes, request_to_js, value_to_string};
use crate::runtime::drainer::{DrainBudget, DrainMode, Drainer, Settlement};
use crate::runtime::job_executor::NanoJobExecutor;
use crate::runtime::response::{ResponseBody, response_parts};
use crate::streams::readable::{self, ReadOutcome, ReadableHandle};

/// The app's request handler, resolved once from the module's default export.
struct Handler {
    function: JsObject,
    this: JsValue,
}

/// Boa context wrapper holding one evaluated NANO app.
///
/// The module is compiled and evaluated exactly once, in [`AppContext::new`].
/// Every call to [`AppContext::handle`] then only invokes `fetch` and drains
/// the job queue until the result settles.
///
/// # Thread Safety
///
/// `AppContext` is neither `Send` nor `Sync`: Boa's `Context` has thread-local
/// state. It is created on, and never leaves, the worker thread that owns it
/// (see [`crate::runtime::AppWorker`]).
pub struct AppContext {
    ctx: Context,
    drainer: Drainer,
    handler: Handler,
    /// Largest response body collected from a stream
    max_body: usize,
}

impl AppContext {
    /// Evaluates `source` as an ES module and resolves its handler.
    ///
    /// # Arguments
    ///
    /// * `source` - The app's module source
    /// * `limits` - Budget and buffer settings for this app
    ///
    /// # Errors
    ///
    /// Returns [`NanoError::Script`] if the module fails to parse, link or
    /// evaluate, or if its default export is not a handler. Module evaluation
    /// (including top-level `await`) gets a wall-clock budget of
    /// `execution_timeout`; the iteration ceiling applies only to requests.
    pub async fn new(source: &str, limits: &ResourceLimits) -> Result<Self> {
        let executor = Rc::new(NanoJobExecutor::new());
        let mut ctx = Context::builder()
            .job_executor(executor.clone())
            .build()
            .map_err(|e| NanoError::Script(format!("Failed to create context: {}", e)))?;

        bindings::install_bindings(&mut ctx, limits.stream_config())?;

        let module = Module::parse(Source::from_bytes(source), None, &mut ctx)
            .map_err(|e| NanoError::Script(format!("Failed to parse module: {}", e)))?;

        let drainer = Drainer::new(executor, limits.drain_mode());
        let evaluation = module.load_link_evaluate(&mut ctx);
        let mut budget = DrainBudget::new(DrainMode::Deadline(limits.execution_timeout));
        match drainer.settle(evaluation.into(), &mut budget, &mut ctx).await? {
            Settlement::Fulfilled(_) => {}
            Settlement::Rejected(reason) => {
                return Err(NanoError::Script(format!(
                    "Module evaluation failed: {}",
                    value_to_string(&reason, &mut ctx)
                )));
            }
        }

        let namespace = module.namespace(&mut ctx);
        let export = namespace
            .get(js_string!("default"), &mut ctx)
            .map_err(|e| NanoError::Script(format!("Failed to read default export: {}", e)))?;
        let handler = Self::resolve_handler(export, &mut ctx)?;

        tracing::debug!(cycles = budget.cycles(), "App module evaluated");

        Ok(Self {
            ctx,
            drainer,
            handler,
            max_body: limits.max_buffer_size,
        })
    }

    /// Reads and evaluates the module at `path`.
    pub async fn from_file(path: &Path, limits: &ResourceLimits) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| NanoError::Script(format!("Failed to load script {}: {}", path.display(), e)))?;
        Self::new(&source, limits).await
    }

    /// The default export is either an object with a `fetch` method or a
    /// function.
    fn resolve_handler(export: JsValue, ctx: &mut Context) -> Result<Handler> {
        let Some(object) = export.as_object() else {
            return Err(NanoError::Script(
                "default export must be a function or an object with a fetch method".to_string(),
            ));
        };

        if object.is_callable() {
            return Ok(Handler {
                function: object.clone(),
                this: JsValue::undefined(),
            });
        }

        let fetch = object
            .get(js_string!("fetch"), ctx)
            .map_err(|e| NanoError::Script(format!("Failed to read fetch: {}", e)))?;
        match fetch.as_object() {
            Some(function) if function.is_callable() => Ok(Handler {
                function: function.clone(),
                this: export.clone(),
            }),
            _ => Err(NanoError::Script(
                "default export has no callable fetch method".to_string(),
            )),
        }
    }

    /// Runs the handler for one request.
    ///
    /// # Arguments
    ///
    /// * `request` - The incoming request
    ///
    /// # Returns
    ///
    /// The response to send. A synchronous throw, a rejected result or an
    /// errored body stream becomes a 500 whose body is the reason's string
    /// form.
    ///
    /// # Errors
    ///
    /// - [`NanoError::Timeout`] if the result (or its body stream) does not
    ///   settle within the drain budget
    /// - [`NanoError::Shape`] if the result is not Response-shaped
    pub async fn handle(&mut self, request: &RequestData) -> Result<HandlerResponse> {
        let mut budget = self.drainer.budget();

        let request_value = request_to_js(request, &mut self.ctx)
            .map_err(|e| NanoError::JavaScriptExecution(format!("Failed to build request: {}", e)))?;

        let settlement = match self
            .handler
            .function
            .call(&self.handler.this, &[request_value], &mut self.ctx)
        {
            Ok(result) => self.drainer.settle(result, &mut budget, &mut self.ctx).await?,
            Err(err) => Settlement::Rejected(err.to_opaque(&mut self.ctx)),
        };

        let value = match settlement {
            Settlement::Fulfilled(value) => value,
            Settlement::Rejected(reason) => return Ok(self.failure(&reason)),
        };

        let parts = response_parts(&value, &mut self.ctx)?;
        let body = match parts.body {
            ResponseBody::Bytes(bytes) => bytes,
            ResponseBody::Stream(stream) => match self.collect_stream(&stream, &mut budget).await? {
                Ok(bytes) => bytes,
                Err(reason) => return Ok(self.failure(&reason)),
            },
        };

        tracing::debug!(
            status = parts.status,
            cycles = budget.cycles(),
            bytes = body.len(),
            "Handler settled"
        );

        Ok(HandlerResponse {
            status: parts.status,
            headers: parts.headers,
            body: Bytes::from(body),
        })
    }

    fn failure(&mut self, reason: &JsValue) -> HandlerResponse {
        let message = value_to_string(reason, &mut self.ctx);
        tracing::warn!("Handler failed: {}", message);
        HandlerResponse::text(500, message)
    }

    /// Reads a response body stream to the end under the request's budget.
    ///
    /// Every chunk is charged one drain cycle, so a `pull` that always
    /// enqueues synchronously still runs out of budget. The collected body
    /// is capped at the app's `max_buffer_size`.
    ///
    /// Returns `Ok(Err(reason))` when the stream errors.
    async fn collect_stream(
        &mut self,
        stream: &ReadableHandle,
        budget: &mut DrainBudget,
    ) -> Result<std::result::Result<Vec<u8>, JsValue>> {
        let js_err = |e: boa_engine::JsError| NanoError::JavaScriptExecution(e.to_string());

        let reader = readable::acquire_reader(stream, &mut self.ctx).map_err(js_err)?;
        let mut body = Vec::new();

        let outcome = loop {
            if let Err(err) = self.drainer.ensure_budget(budget) {
                break Err(err);
            }
            match readable::read_now(stream, &mut self.ctx).map_err(js_err)? {
                ReadOutcome::Chunk(chunk) => {
                    budget.charge();
                    let bytes = match body_chunk_bytes(&chunk, &mut self.ctx) {
                        Ok(bytes) => bytes,
                        Err(err) => break Err(err),
                    };
                    if body.len().saturating_add(bytes.len()) > self.max_body {
                        break Err(NanoError::ResponseTooLarge { limit: self.max_body });
                    }
                    body.extend_from_slice(&bytes);
                }
                ReadOutcome::Done => break Ok(Ok(body)),
                ReadOutcome::Errored(reason) => break Ok(Err(reason)),
                ReadOutcome::Empty => self.drainer.checkpoint(budget, &mut self.ctx).await,
            }
        };

        readable::release_reader(stream, &reader, &mut self.ctx).map_err(js_err)?;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ResourceLimits {
        ResourceLimits::new().with_drain_iterations(100)
    }

    #[tokio::test]
    async fn test_object_and_function_exports() {
        let mut app = AppContext::new(
            "export default { fetch(req) { return new Response('object ' + req.method); } };",
            &limits(),
        )
        .await
        .unwrap();
        let response = app.handle(&RequestData::new("GET", "/")).await.unwrap();
        assert_eq!(response.body.as_ref(), b"object GET");

        let mut app = AppContext::new(
            "export default (req) => new Response('function ' + req.url);",
            &limits(),
        )
        .await
        .unwrap();
        let response = app.handle(&RequestData::new("GET", "/x")).await.unwrap();
        assert_eq!(response.body.as_ref(), b"function /x");
    }

    #[tokio::test]
    async fn test_invalid_default_exports() {
        for source in [
            "export default 42;",
            "export default { handler() {} };",
            "export const fetch = () => null;",
        ] {
            let err = AppContext::new(source, &limits()).await.err().unwrap();
            assert!(matches!(err, NanoError::Script(_)), "{source}");
        }
    }

    #[tokio::test]
    async fn test_syntax_and_evaluation_errors() {
        let err = AppContext::new("export default {", &limits()).await.err().unwrap();
        assert!(matches!(err, NanoError::Script(_)));

        let err = AppContext::new("throw new Error('at load');", &limits()).await.err().unwrap();
        assert!(err.to_string().contains("at load"));
    }

    #[tokio::test]
    async fn test_module_state_persists_between_requests() {
        let mut app = AppContext::new(
            "let hits = 0; export default { fetch() { hits += 1; return new Response(String(hits)); } };",
            &limits(),
        )
        .await
        .unwrap();
        for expected in ["1", "2", "3"] {
            let response = app.handle(&RequestData::new("GET", "/")).await.unwrap();
            assert_eq!(response.body.as_ref(), expected.as_bytes());
        }
    }

    #[tokio::test]
    async fn test_timeout_reports_cycles() {
        let mut app = AppContext::new(
            "export default { fetch() { return new Promise(() => {}); } };",
            &ResourceLimits::new().with_drain_iterations(25),
        )
        .await
        .unwrap();
        assert_eq!(app.drainer.mode(), DrainMode::Iterations(25));

        let err = app.handle(&RequestData::new("GET", "/")).await.unwrap_err();
        assert!(matches!(err, NanoError::Timeout { cycles: 25 }));
    }
}
