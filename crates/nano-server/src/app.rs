use nano_common::error::{NanoError, Result};
use nano_common::http::{HandlerResponse, RequestData};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::resource_limits::ResourceLimits;
use crate::runtime::AppWorker;

/// A NANO app - one handler module served by its own worker thread.
///
/// The script is read once and evaluated once, on the worker. Requests are
/// forwarded to the worker and handled in arrival order.
pub struct App {
    /// Path to the app's module file
    script_path: PathBuf,
    /// Limits the worker was started with
    limits: ResourceLimits,
    /// The thread owning the app's engine context
    worker: AppWorker,
}

impl App {
    /// Loads an app from a module file.
    ///
    /// # Arguments
    /// * `script_path` - Path to the app's ES module
    /// * `limits` - Budget and buffer settings for the app
    ///
    /// # Errors
    ///
    /// - [`NanoError::Config`] if `limits` is invalid
    /// - [`NanoError::Script`] if the file cannot be read or the module
    ///   fails to evaluate
    pub async fn load(script_path: PathBuf, limits: ResourceLimits) -> Result<Self> {
        limits.validate()?;

        if !script_path.exists() {
            return Err(NanoError::Script(format!(
                "Script path does not exist: {}",
                script_path.display()
            )));
        }

        let source = std::fs::read_to_string(&script_path)
            .map_err(|e| NanoError::Script(format!("Failed to load script: {}", e)))?;

        let name = script_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "app".to_string());

        let started = Instant::now();
        let worker = AppWorker::spawn(name, source, limits.clone()).await?;
        tracing::info!(
            script = %script_path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "App loaded"
        );

        Ok(Self {
            script_path,
            limits,
            worker,
        })
    }

    /// Handles one request on the app's worker.
    pub async fn handle(&self, request: RequestData) -> Result<HandlerResponse> {
        tracing::debug!("Handling {} {}", request.method, request.url);
        self.worker.handle(request).await
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    fn create_test_script(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".js").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_app_handles_request() {
        let script = create_test_script("export default { fetch: (req) => new Response('hi ' + req.method) };");
        let app = App::load(script.path().to_path_buf(), ResourceLimits::default())
            .await
            .unwrap();
        assert_eq!(app.script_path(), script.path());

        let response = app.handle(RequestData::new("PATCH", "/")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body.as_ref(), b"hi PATCH");
    }

    #[tokio::test]
    async fn test_missing_script_is_rejected() {
        let err = App::load(PathBuf::from("/nonexistent/nano-app.js"), ResourceLimits::default())
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_invalid_limits_are_rejected_before_loading() {
        let script = create_test_script("export default () => new Response('');");
        let limits = ResourceLimits::new().with_execution_timeout(Duration::ZERO);
        let err = App::load(script.path().to_path_buf(), limits).await.err().unwrap();
        assert!(matches!(err, NanoError::Config(_)));
    }

    #[tokio::test]
    async fn test_limits_are_kept() {
        let script = create_test_script("export default () => new Response('');");
        let limits = ResourceLimits::new().with_drain_iterations(10);
        let app = App::load(script.path().to_path_buf(), limits.clone()).await.unwrap();
        assert_eq!(app.limits(), &limits);
    }
}
