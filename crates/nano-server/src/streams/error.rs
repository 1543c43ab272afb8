//! Script-facing stream failures.
//!
//! Each variant maps onto a native JavaScript error type when it crosses into
//! script code. Failures raised by user callbacks are not represented here:
//! those values are caught at the callback boundary and stored on the stream
//! as-is.

use boa_engine::{Context, JsError, JsNativeError, JsValue};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    /// Bad arguments passed by script code.
    #[error("{0}")]
    Usage(String),

    /// Invalid numeric argument, such as a negative highWaterMark.
    #[error("{0}")]
    Range(String),

    #[error("{stream} is locked to a {holder}")]
    Locked {
        stream: &'static str,
        holder: &'static str,
    },

    #[error("{stream} is {state}")]
    InvalidState {
        stream: &'static str,
        state: &'static str,
    },

    #[error("Buffer limit exceeded: queueing {attempted} bytes would exceed the {max} byte limit")]
    BufferLimitExceeded { attempted: usize, max: usize },

    #[error("{0} has been released from its stream")]
    Released(&'static str),

    #[error("No data available: pull() did not enqueue a chunk")]
    NoDataAvailable,

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("Illegal constructor")]
    IllegalConstructor,
}

impl StreamError {
    /// Builds the error as a script value, for storing on a stream or
    /// rejecting a promise.
    pub(crate) fn to_value(&self, context: &mut Context) -> JsValue {
        JsError::from(self.clone()).to_opaque(context)
    }
}

impl From<StreamError> for JsNativeError {
    fn from(err: StreamError) -> Self {
        let message = err.to_string();
        match err {
            StreamError::Range(_) | StreamError::BufferLimitExceeded { .. } => {
                JsNativeError::range().with_message(message)
            }
            _ => JsNativeError::typ().with_message(message),
        }
    }
}

impl From<StreamError> for JsError {
    fn from(err: StreamError) -> Self {
        JsNativeError::from(err).into()
    }
}
