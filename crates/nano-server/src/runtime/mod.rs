//! JavaScript execution runtime
//!
//! - [`job_executor`]: the engine job queue, run in bounded checkpoints
//! - [`drainer`]: drives a handler's result to settlement under a budget
//! - [`context`]: one evaluated app module and its `fetch` handler
//! - [`worker`]: the OS thread that owns an app context

pub mod context;
pub mod drainer;
pub mod job_executor;
pub mod worker;

mod bindings;
mod conversions;
mod response;


pub use context::AppContext;
pub use drainer::{DrainBudget, DrainMode, Drainer, Settlement};
pub use job_executor::NanoJobExecutor;
pub use response::Response;
pub use worker::AppWorker;
