//! NANO Common Types
//!
//! This crate provides the types shared between the HTTP host and the
//! JavaScript execution side of the NANO handler runtime:
//!
//! - **Errors**: [`NanoError`], the host-side failure taxonomy, and its
//!   mapping onto HTTP status codes
//! - **HTTP exchange**: [`RequestData`] and [`HandlerResponse`], the owned
//!   values passed between the listener and an app worker thread
//!
//! # Example
//!
//! ```
//! use nano_common::{HandlerResponse, NanoError, RequestData};
//!
//! let request = RequestData::new("GET", "http://localhost/");
//! assert_eq!(request.method, "GET");
//!
//! let response = HandlerResponse::from_error(&NanoError::Timeout { cycles: 1000 });
//! assert_eq!(response.status, 504);
//! ```

pub mod error;
pub mod http;

pub use error::{NanoError, Result};
pub use http::{HandlerResponse, HyperRequest, HyperResponse, RequestData};
