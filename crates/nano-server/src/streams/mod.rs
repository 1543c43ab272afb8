//! WHATWG-style streams for handler scripts
//!
//! This module implements the `ReadableStream`, `WritableStream` and
//! `TransformStream` families as native Boa classes. The state machines live
//! in Rust; script code only ever sees the thin class wrappers.
//!
//! # Architecture
//!
//! Each stream keeps its mutable state behind a `Gc<GcRefCell<_>>` handle that
//! is shared by the stream object, its controller and its reader or writer.
//! A transform stream is two of these handles plus a third shared
//! [`transform::TransformShared`] that both sides point at.
//!
//! ```text
//!  ReadableStream ──┐                      ┌── WritableStream
//!  Controller ──────┼─► ReadableInner ◄──┐ ┌─► WritableInner ◄─┼── Controller
//!  Reader ──────────┘                    │ │                   └── Writer
//!                                   TransformShared
//!                                         ▲
//!                         TransformStreamDefaultController
//! ```
//!
//! Borrows of a state handle are never held across calls into script code:
//! every operation copies what it needs out of the state, releases the
//! borrow, and only then invokes user callbacks or settles promises.
//!
//! # Resource limits
//!
//! Every stream is created with the `max_buffer_size` of the app that owns the
//! engine realm (see [`StreamConfig`]). Exceeding it errors the stream at once;
//! there is no gradual backpressure past that ceiling.

pub mod chunk;
pub mod error;
pub(crate) mod queue;
pub mod readable;
pub mod transform;
pub mod writable;

#[cfg(test)]
mod tests;

use boa_engine::{
    Context, JsData, JsNativeError, JsObject, JsResult, JsString, JsValue,
    builtins::promise::ResolvingFunctions, js_string, object::builtins::JsPromise,
};
use boa_gc::{Finalize, Trace};

pub use chunk::chunk_size;
pub use error::StreamError;
pub use readable::{ReadableStream, ReadableStreamDefaultController, ReadableStreamDefaultReader};
pub use transform::{TransformStream, TransformStreamDefaultController};
pub use writable::{WritableStream, WritableStreamDefaultController, WritableStreamDefaultWriter};

/// Host default for `max_buffer_size`, used only when an app does not supply one.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// What `read()` does when the queue is empty and `pull` enqueued nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyReadPolicy {
    /// Park the read until a later `enqueue`, `close` or `error` settles it.
    #[default]
    Wait,
    /// Reject the read immediately. Matches runtimes where `pull` must
    /// enqueue synchronously.
    Reject,
}

/// Per-app stream settings, stored in the realm's host-defined data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, JsData)]
pub struct StreamConfig {
    pub max_buffer_size: usize,
    pub empty_read_policy: EmptyReadPolicy,
}

impl Finalize for StreamConfig {}

// SAFETY: holds no garbage-collected values.
unsafe impl Trace for StreamConfig {
    boa_gc::empty_trace!();
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            empty_read_policy: EmptyReadPolicy::Wait,
        }
    }
}

impl StreamConfig {
    pub fn new(max_buffer_size: usize) -> Self {
        Self {
            max_buffer_size,
            ..Self::default()
        }
    }

    pub fn with_empty_read_policy(mut self, policy: EmptyReadPolicy) -> Self {
        self.empty_read_policy = policy;
        self
    }

    /// Reads the configuration installed in the current realm.
    pub(crate) fn current(context: &Context) -> Self {
        context
            .realm()
            .host_defined()
            .get::<StreamConfig>()
            .copied()
            .unwrap_or_default()
    }
}

/// Lifecycle shared by both stream kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Active,
    Closed,
    Errored,
}

/// Registers every stream class on the global object and records `config`
/// for streams created in this realm.
pub fn install_stream_api(context: &mut Context, config: StreamConfig) -> JsResult<()> {
    context.realm().host_defined_mut().insert(config);

    context.register_global_class::<ReadableStream>()?;
    context.register_global_class::<ReadableStreamDefaultController>()?;
    context.register_global_class::<ReadableStreamDefaultReader>()?;
    context.register_global_class::<WritableStream>()?;
    context.register_global_class::<WritableStreamDefaultController>()?;
    context.register_global_class::<WritableStreamDefaultWriter>()?;
    context.register_global_class::<TransformStream>()?;
    context.register_global_class::<TransformStreamDefaultController>()?;

    tracing::debug!(
        max_buffer_size = config.max_buffer_size,
        policy = ?config.empty_read_policy,
        "Stream API installed"
    );
    Ok(())
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Looks up an optional callback on an underlying source, sink or transformer.
pub(crate) fn callback(
    object: &JsObject,
    name: &'static str,
    context: &mut Context,
) -> JsResult<Option<JsObject>> {
    let value = object.get(JsString::from(name), context)?;
    if value.is_undefined() {
        return Ok(None);
    }
    match value.as_object() {
        Some(function) if function.is_callable() => Ok(Some(function.clone())),
        _ => Err(StreamError::Usage(format!("'{name}' must be a function")).into()),
    }
}

/// Reads `highWaterMark` from a queuing strategy, falling back to `default`.
pub(crate) fn high_water_mark(strategy: &JsValue, default: f64, context: &mut Context) -> JsResult<f64> {
    if strategy.is_null_or_undefined() {
        return Ok(default);
    }
    let Some(strategy) = strategy.as_object() else {
        return Err(StreamError::Usage("queuing strategy must be an object".into()).into());
    };

    let size = strategy.get(js_string!("size"), context)?;
    if !size.is_undefined() && !size.is_callable() {
        return Err(StreamError::Usage("'size' must be a function".into()).into());
    }

    let mark = strategy.get(js_string!("highWaterMark"), context)?;
    if mark.is_undefined() {
        return Ok(default);
    }
    let mark = mark.to_number(context)?;
    if mark.is_nan() || mark < 0.0 {
        return Err(StreamError::Range("highWaterMark must be a non-negative number".into()).into());
    }
    Ok(mark)
}

/// `highWaterMark − queueLength`, `null` once errored and `0` once closed.
pub(crate) fn desired_size(state: StreamState, high_water_mark: f64, queue_len: usize) -> JsValue {
    match state {
        StreamState::Errored => JsValue::null(),
        StreamState::Closed => JsValue::new(0),
        StreamState::Active => JsValue::new(high_water_mark - queue_len as f64),
    }
}

pub(crate) fn resolved_promise(value: JsValue, context: &mut Context) -> JsResult<JsPromise> {
    let (promise, resolvers) = JsPromise::new_pending(context);
    resolvers.resolve.call(&JsValue::undefined(), &[value], context)?;
    Ok(promise)
}

pub(crate) fn rejected_promise(reason: JsValue, context: &mut Context) -> JsResult<JsPromise> {
    let (promise, resolvers) = JsPromise::new_pending(context);
    resolvers.reject.call(&JsValue::undefined(), &[reason], context)?;
    Ok(promise)
}

pub(crate) fn resolve(resolvers: &ResolvingFunctions, value: JsValue, context: &mut Context) -> JsResult<()> {
    resolvers.resolve.call(&JsValue::undefined(), &[value], context)?;
    Ok(())
}

pub(crate) fn reject(resolvers: &ResolvingFunctions, reason: JsValue, context: &mut Context) -> JsResult<()> {
    resolvers.reject.call(&JsValue::undefined(), &[reason], context)?;
    Ok(())
}

/// Error thrown when a native method is invoked on the wrong kind of object.
pub(crate) fn incompatible_receiver(class: &str) -> boa_engine::JsError {
    JsNativeError::typ()
        .with_message(format!("'this' is not a {class}"))
        .into()
}
