//! HTTP exchange types
//!
//! These are the values that cross the boundary between the HTTP listener and
//! an app worker. They are plain owned data so they can be sent between
//! threads; the JavaScript-side `Request` and `Response` objects are built from
//! and reduced to them on the worker thread.
//!
//! # Components
//!
//! - **[`RequestData`]**: method, URL, headers and body of an incoming request
//! - **[`HandlerResponse`]**: status, headers and body produced by a handler
//! - **[`HyperRequest`]** / **[`HyperResponse`]**: hyper type aliases

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response, StatusCode};

use crate::error::NanoError;

/// Type alias for Hyper incoming requests
pub type HyperRequest = Request<Incoming>;

/// Type alias for Hyper responses with full body
pub type HyperResponse = Response<Full<Bytes>>;

/// An incoming request, detached from the connection it arrived on.
#[derive(Debug, Clone, Default)]
pub struct RequestData {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl RequestData {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// The settled result of one handler invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HandlerResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// A plain-text response carrying `message`.
    pub fn text(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            headers: vec![("content-type".into(), "text/plain; charset=utf-8".into())],
            body: Bytes::from(message.into()),
        }
    }

    /// Maps a request-ending error onto its HTTP representation.
    pub fn from_error(err: &NanoError) -> Self {
        Self::text(err.status_code(), err.to_string())
    }

    /// Returns the first header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Converts into a hyper response.
    ///
    /// Header pairs hyper rejects are skipped rather than failing the whole
    /// response.
    pub fn into_hyper(self) -> HyperResponse {
        let mut builder = Response::builder()
            .status(StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR));

        for (name, value) in &self.headers {
            match (
                hyper::header::HeaderName::from_bytes(name.as_bytes()),
                hyper::header::HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => builder = builder.header(name, value),
                _ => tracing::warn!("Dropping invalid response header: {}", name),
            }
        }

        builder.body(Full::new(self.body)).unwrap_or_else(|_| {
            let mut response = Response::new(Full::new(Bytes::from_static(b"Internal Server Error")));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = RequestData::new("POST", "http://localhost/echo")
            .with_header("content-type", "text/plain")
            .with_body("hello");

        assert_eq!(request.method, "POST");
        assert_eq!(request.url, "http://localhost/echo");
        assert_eq!(request.headers, vec![("content-type".to_string(), "text/plain".to_string())]);
        assert_eq!(request.body, Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_text_response_sets_content_type() {
        let response = HandlerResponse::text(500, "boom");
        assert_eq!(response.status, 500);
        assert_eq!(response.header("Content-Type"), Some("text/plain; charset=utf-8"));
        assert_eq!(response.body, Bytes::from_static(b"boom"));
    }

    #[test]
    fn test_from_error_uses_status_code() {
        let response = HandlerResponse::from_error(&NanoError::Timeout { cycles: 3 });
        assert_eq!(response.status, 504);
        assert_eq!(response.body, Bytes::from("Handler did not settle after 3 drain cycles"));
    }

    #[test]
    fn test_into_hyper_skips_invalid_headers() {
        let mut response = HandlerResponse::new(201, "created");
        response.headers.push(("x-ok".into(), "yes".into()));
        response.headers.push(("bad header".into(), "nope".into()));

        let hyper_response = response.into_hyper();
        assert_eq!(hyper_response.status(), StatusCode::CREATED);
        assert_eq!(hyper_response.headers().get("x-ok").unwrap(), "yes");
        assert_eq!(hyper_response.headers().len(), 1);
    }

    #[test]
    fn test_into_hyper_invalid_status_falls_back_to_500() {
        let hyper_response = HandlerResponse::new(1000, "").into_hyper();
        assert_eq!(hyper_response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
