//! HTTP Server for NANO apps
//!
//! This module provides the HTTP/1.1 listener, built on hyper. Every request
//! is turned into a [`RequestData`], handed to the app's worker thread, and
//! the resulting [`HandlerResponse`] (or request-ending error) is written
//! back.
//!
//! # Architecture
//!
//! The HTTP server:
//! - Listens on a TCP socket for incoming HTTP connections
//! - Spawns a tokio task for each connection
//! - Collects request bodies up to `max_request_body` bytes
//! - Forwards requests to the [`App`]
//! - Maps [`NanoError`]s onto status codes (504 timeout, 503 worker gone,
//!   400 bad request, 500 otherwise)
//!
//! # Example
//!
//! ```no_run
//! use nano_server::{App, HttpServer, ResourceLimits};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = App::load("app.js".into(), ResourceLimits::default()).await.unwrap();
//!     let server = HttpServer::new(Arc::new(app));
//!     server.run("127.0.0.1:8080".parse().unwrap()).await.unwrap();
//! }
//! ```

use http_body_util::{BodyExt, Limited};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use nano_common::error::NanoError;
use nano_common::http::{HandlerResponse, HyperRequest, HyperResponse, RequestData};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::app::App;

/// HTTP server for a NANO app.
pub struct HttpServer {
    /// The app every request is routed to
    app: Arc<App>,
}

impl HttpServer {
    /// Creates a new HTTP server for `app`.
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }

    /// Binds `addr` and serves until the listener fails.
    ///
    /// # Errors
    ///
    /// Returns [`NanoError::Transport`] if binding or accepting fails.
    pub async fn run(self, addr: SocketAddr) -> Result<(), NanoError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| NanoError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), NanoError> {
        tracing::info!(
            "HTTP server listening on {}",
            listener
                .local_addr()
                .map_err(|e| NanoError::Transport(format!("Failed to get local address: {}", e)))?
        );

        loop {
            let (stream, peer) = listener
                .accept()
                .await
                .map_err(|e| NanoError::Transport(format!("Failed to accept connection: {}", e)))?;

            let io = TokioIo::new(stream);
            let app = self.app.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let app = app.clone();
                    async move { Ok::<_, Infallible>(Self::handle_request(app, req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::error!(%peer, "Error serving connection: {}", err);
                }
            });
        }
    }

    /// Handles one HTTP request. Never fails: errors become error responses.
    async fn handle_request(app: Arc<App>, req: HyperRequest) -> HyperResponse {
        let limit = app.limits().max_request_body;
        let response = match Self::request_data(req, limit).await {
            Ok(request) => app.handle(request).await,
            Err(e) => Err(e),
        };

        match response {
            Ok(response) => response.into_hyper(),
            Err(e) => {
                tracing::error!("Request failed: {}", e);
                HandlerResponse::from_error(&e).into_hyper()
            }
        }
    }

    /// Converts a hyper request into an owned [`RequestData`].
    async fn request_data(req: HyperRequest, limit: usize) -> Result<RequestData, NanoError> {
        let (parts, body) = req.into_parts();

        let url = match parts.uri.scheme() {
            Some(_) => parts.uri.to_string(),
            None => {
                let host = parts
                    .headers
                    .get(hyper::header::HOST)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("localhost");
                let path = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
                format!("http://{}{}", host, path)
            }
        };

        let mut request = RequestData::new(parts.method.as_str(), url);
        for (name, value) in &parts.headers {
            match value.to_str() {
                Ok(value) => request = request.with_header(name.as_str(), value),
                Err(_) => tracing::warn!("Dropping non-UTF-8 request header: {}", name),
            }
        }

        let body = Limited::new(body, limit).collect().await.map_err(|e| {
            if e.downcast_ref::<http_body_util::LengthLimitError>().is_some() {
                NanoError::InvalidRequest(format!("Request body exceeds {} bytes", limit))
            } else {
                NanoError::InvalidRequest(format!("Failed to read request body: {}", e))
            }
        })?;

        Ok(request.with_body(body.to_bytes()))
    }
}
