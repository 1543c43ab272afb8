//! NANO Server
//!
//! This crate runs JavaScript `fetch(request)` handlers in the Boa engine:
//!
//! - [`streams`]: WHATWG-style Readable, Writable and Transform streams,
//!   with per-app buffer limits
//! - [`runtime`]: the bounded job executor, the execution drainer, app
//!   contexts and their worker threads
//! - [`App`] and [`HttpServer`]: loading an app and serving it over HTTP/1.1

pub mod app;
pub mod http_server;
pub mod resource_limits;
pub mod runtime;
pub mod streams;

pub use app::App;
pub use http_server::HttpServer;
pub use resource_limits::ResourceLimits;
pub use runtime::{AppContext, AppWorker, DrainMode};
pub use streams::{EmptyReadPolicy, StreamConfig};
