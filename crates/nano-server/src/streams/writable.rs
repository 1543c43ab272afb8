//! Writable stream core
//!
//! Writes are queued with their completion promise and handed to the sink one
//! at a time, head to tail. Sink callbacks run synchronously: a `write` that
//! returns normally counts as accepted, a `write` that throws errors the
//! stream.
//!
//! # Backpressure
//!
//! The writer's `ready` promise is replaced with a pending one when the queue
//! grows past `highWaterMark` items, and resolved again once draining brings
//! it back down. Independently of that, the queue's byte size may never pass
//! `max_buffer_size`: a write that would do so is refused and errors the
//! stream.

use boa_engine::{
    Context, JsArgs, JsData, JsNativeError, JsObject, JsResult, JsValue, NativeFunction,
    builtins::promise::ResolvingFunctions,
    class::{Class, ClassBuilder},
    js_string,
    object::builtins::JsPromise,
    property::Attribute,
};
use boa_gc::{Finalize, Gc, GcRefCell, Trace};

use super::chunk::chunk_size;
use super::error::StreamError;
use super::queue::SizedQueue;
use super::transform::{self, TransformHandle};
use super::{
    StreamConfig, StreamState, callback, desired_size, high_water_mark, incompatible_receiver,
    reject, rejected_promise, resolve, resolved_promise,
};

const STREAM: &str = "WritableStream";

/// Shared handle to a writable stream's state.
pub(crate) type WritableHandle = Gc<GcRefCell<WritableInner>>;

#[derive(Trace, Finalize)]
pub(crate) enum WritableSink {
    None,
    Script {
        underlying: JsObject,
        write: Option<JsObject>,
        close: Option<JsObject>,
        abort: Option<JsObject>,
    },
    /// The writable side of a transform stream.
    Transform(TransformHandle),
}

#[derive(Trace, Finalize)]
struct WriteRequest {
    chunk: JsValue,
    completion: ResolvingFunctions,
}

#[derive(Trace, Finalize)]
pub(crate) struct WriterState {
    attached: bool,
    ready: JsPromise,
    ready_resolvers: Option<ResolvingFunctions>,
    closed: JsPromise,
    closed_resolvers: Option<ResolvingFunctions>,
}

#[derive(Trace, Finalize)]
pub(crate) struct WritableInner {
    #[unsafe_ignore_trace]
    state: StreamState,
    queue: SizedQueue<WriteRequest>,
    high_water_mark: f64,
    max_buffer_size: usize,
    close_requested: bool,
    draining: bool,
    backpressure: bool,
    stored_error: JsValue,
    sink: WritableSink,
    controller: Option<JsObject>,
    writer: Option<Gc<GcRefCell<WriterState>>>,
    close_request: Option<ResolvingFunctions>,
}

impl WritableInner {
    fn new(high_water_mark: f64, config: StreamConfig, sink: WritableSink) -> Self {
        Self {
            state: StreamState::Active,
            queue: SizedQueue::new(),
            high_water_mark,
            max_buffer_size: config.max_buffer_size,
            close_requested: false,
            draining: false,
            backpressure: false,
            stored_error: JsValue::undefined(),
            sink,
            controller: None,
            writer: None,
            close_request: None,
        }
    }

    pub(crate) fn state(&self) -> StreamState {
        self.state
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.writer.is_some()
    }

    pub(crate) fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn queue_byte_size(&self) -> usize {
        self.queue.byte_size()
    }

    #[cfg(test)]
    pub(crate) fn accounting_holds(&self) -> bool {
        self.queue.byte_size() == self.queue.recomputed_byte_size()
    }

    /// Rejection reason for writes and closes on a stream that no longer
    /// accepts them.
    fn refusal(&self, context: &mut Context) -> JsValue {
        match self.state {
            StreamState::Errored => self.stored_error.clone(),
            StreamState::Closed => StreamError::InvalidState {
                stream: STREAM,
                state: "closed",
            }
            .to_value(context),
            StreamState::Active => StreamError::InvalidState {
                stream: STREAM,
                state: "closing",
            }
            .to_value(context),
        }
    }

    fn accepts_writes(&self) -> bool {
        self.state == StreamState::Active && !self.close_requested
    }
}

enum SinkCall {
    Script {
        function: JsObject,
        underlying: JsObject,
    },
    Transform(TransformHandle),
}

// ============================================================================
// Core operations
// ============================================================================

pub(crate) fn create_stream(
    high_water_mark: f64,
    config: StreamConfig,
    sink: WritableSink,
    context: &mut Context,
) -> JsResult<WritableHandle> {
    let stream = Gc::new(GcRefCell::new(WritableInner::new(high_water_mark, config, sink)));
    let controller = WritableStreamDefaultController::from_data(
        WritableStreamDefaultController { stream: stream.clone() },
        context,
    )?;
    stream.borrow_mut().controller = Some(controller);
    Ok(stream)
}

fn controller_value(stream: &WritableHandle) -> JsValue {
    stream
        .borrow()
        .controller
        .clone()
        .map(JsValue::from)
        .unwrap_or_else(JsValue::undefined)
}

/// Queues `chunk` and starts draining. The returned promise settles when the
/// sink has accepted or failed this particular chunk.
pub(crate) fn write(stream: &WritableHandle, chunk: JsValue, context: &mut Context) -> JsResult<JsPromise> {
    let refused = {
        let inner = stream.borrow();
        (!inner.accepts_writes()).then(|| inner.refusal(context))
    };
    if let Some(reason) = refused {
        return rejected_promise(reason, context);
    }

    let size = match chunk_size(&chunk, context) {
        Ok(size) => size,
        Err(err) => {
            let reason = err.to_opaque(context);
            return rejected_promise(reason, context);
        }
    };

    let exceeded = {
        let inner = stream.borrow();
        if !inner.accepts_writes() {
            let reason = inner.refusal(context);
            drop(inner);
            return rejected_promise(reason, context);
        }
        inner
            .queue
            .would_exceed(size, inner.max_buffer_size)
            .then(|| StreamError::BufferLimitExceeded {
                attempted: inner.queue.byte_size().saturating_add(size),
                max: inner.max_buffer_size,
            })
    };
    if let Some(err) = exceeded {
        tracing::debug!("WritableStream buffer limit exceeded: {}", err);
        let reason = err.to_value(context);
        error_stream(stream, reason.clone(), context)?;
        return rejected_promise(reason, context);
    }

    let (promise, completion) = JsPromise::new_pending(context);
    let (engage, start_draining) = {
        let mut inner = stream.borrow_mut();
        inner.queue.push(WriteRequest { chunk, completion }, size);
        let engage = !inner.backpressure && inner.queue.len() as f64 > inner.high_water_mark;
        if engage {
            inner.backpressure = true;
        }
        (engage, !inner.draining)
    };

    if engage {
        engage_backpressure(stream, context);
    }
    if start_draining {
        drain(stream, context)?;
    }
    Ok(promise)
}

fn engage_backpressure(stream: &WritableHandle, context: &mut Context) {
    let writer = stream.borrow().writer.clone();
    if let Some(writer) = writer {
        let (ready, resolvers) = JsPromise::new_pending(context);
        let mut writer = writer.borrow_mut();
        writer.ready = ready;
        writer.ready_resolvers = Some(resolvers);
    }
}

fn release_backpressure(stream: &WritableHandle, context: &mut Context) -> JsResult<()> {
    let writer = {
        let mut inner = stream.borrow_mut();
        inner.backpressure = false;
        inner.writer.clone()
    };
    if let Some(writer) = writer {
        let resolvers = writer.borrow_mut().ready_resolvers.take();
        if let Some(resolvers) = resolvers {
            resolve(&resolvers, JsValue::undefined(), context)?;
        }
    }
    Ok(())
}

/// Feeds queued chunks to the sink, then finalizes a pending close once the
/// queue is empty.
fn drain(stream: &WritableHandle, context: &mut Context) -> JsResult<()> {
    stream.borrow_mut().draining = true;
    let result = drain_queue(stream, context);
    stream.borrow_mut().draining = false;
    result?;

    let finish = {
        let inner = stream.borrow();
        inner.state == StreamState::Active && inner.close_requested && inner.queue.is_empty()
    };
    if finish {
        finalize_close(stream, context)?;
    }
    Ok(())
}

fn drain_queue(stream: &WritableHandle, context: &mut Context) -> JsResult<()> {
    loop {
        let (chunk, call) = {
            let inner = stream.borrow();
            if inner.state != StreamState::Active {
                return Ok(());
            }
            let Some(head) = inner.queue.front() else {
                return Ok(());
            };
            let call = match &inner.sink {
                WritableSink::Script {
                    underlying,
                    write: Some(write),
                    ..
                } => Some(SinkCall::Script {
                    function: write.clone(),
                    underlying: underlying.clone(),
                }),
                WritableSink::Transform(shared) => Some(SinkCall::Transform(shared.clone())),
                _ => None,
            };
            (head.chunk.clone(), call)
        };

        let outcome = match call {
            Some(SinkCall::Script { function, underlying }) => {
                let controller = controller_value(stream);
                function.call(&underlying.into(), &[chunk, controller], context)
            }
            Some(SinkCall::Transform(shared)) => transform::transform_chunk(&shared, chunk, context),
            None => Ok(JsValue::undefined()),
        };

        if let Err(err) = outcome {
            tracing::debug!("WritableStream sink write threw: {}", err);
            let reason = err.to_opaque(context);
            return error_stream(stream, reason, context);
        }

        let (completed, relieve) = {
            let mut inner = stream.borrow_mut();
            // The sink may have errored the stream from inside `write`; the
            // queue was settled by that transition.
            if inner.state != StreamState::Active {
                return Ok(());
            }
            let completed = inner.queue.pop_front();
            let relieve = inner.backpressure && inner.queue.len() as f64 <= inner.high_water_mark;
            (completed, relieve)
        };
        if let Some(request) = completed {
            resolve(&request.completion, JsValue::undefined(), context)?;
        }
        if relieve {
            release_backpressure(stream, context)?;
        }
    }
}

/// Requests a close. The returned promise settles once the sink has closed.
pub(crate) fn close(stream: &WritableHandle, context: &mut Context) -> JsResult<JsPromise> {
    let refused = {
        let inner = stream.borrow();
        (!inner.accepts_writes()).then(|| inner.refusal(context))
    };
    if let Some(reason) = refused {
        return rejected_promise(reason, context);
    }

    let (promise, resolvers) = JsPromise::new_pending(context);
    let (finish, relieve) = {
        let mut inner = stream.borrow_mut();
        inner.close_requested = true;
        inner.close_request = Some(resolvers);
        (inner.queue.is_empty() && !inner.draining, inner.backpressure)
    };
    if relieve {
        release_backpressure(stream, context)?;
    }
    if finish {
        finalize_close(stream, context)?;
    }
    Ok(promise)
}

fn finalize_close(stream: &WritableHandle, context: &mut Context) -> JsResult<()> {
    let (call, close_request) = {
        let mut inner = stream.borrow_mut();
        let call = match &inner.sink {
            WritableSink::Script {
                underlying,
                close: Some(close),
                ..
            } => Some(SinkCall::Script {
                function: close.clone(),
                underlying: underlying.clone(),
            }),
            WritableSink::Transform(shared) => Some(SinkCall::Transform(shared.clone())),
            _ => None,
        };
        (call, inner.close_request.take())
    };

    let outcome = match call {
        Some(SinkCall::Script { function, underlying }) => function.call(&underlying.into(), &[], context),
        Some(SinkCall::Transform(shared)) => transform::flush(&shared, context),
        None => Ok(JsValue::undefined()),
    };

    if let Err(err) = outcome {
        tracing::debug!("WritableStream sink close threw: {}", err);
        let reason = err.to_opaque(context);
        error_stream(stream, reason.clone(), context)?;
        if let Some(resolvers) = close_request {
            reject(&resolvers, reason, context)?;
        }
        return Ok(());
    }

    let (errored, writer) = {
        let mut inner = stream.borrow_mut();
        if inner.state == StreamState::Active {
            inner.state = StreamState::Closed;
            inner.close_requested = false;
            (None, inner.writer.clone())
        } else {
            (Some(inner.stored_error.clone()), None)
        }
    };

    match errored {
        Some(reason) => {
            if let Some(resolvers) = close_request {
                reject(&resolvers, reason, context)?;
            }
        }
        None => {
            tracing::debug!("WritableStream closed");
            if let Some(resolvers) = close_request {
                resolve(&resolvers, JsValue::undefined(), context)?;
            }
            if let Some(writer) = writer {
                let (ready, closed) = {
                    let mut writer = writer.borrow_mut();
                    (writer.ready_resolvers.take(), writer.closed_resolvers.take())
                };
                if let Some(ready) = ready {
                    resolve(&ready, JsValue::undefined(), context)?;
                }
                if let Some(closed) = closed {
                    resolve(&closed, JsValue::undefined(), context)?;
                }
            }
        }
    }
    Ok(())
}

/// Moves an active stream to `errored`: every queued write and a pending
/// close reject with `reason`, as do the writer's promises.
pub(crate) fn error_stream(stream: &WritableHandle, reason: JsValue, context: &mut Context) -> JsResult<()> {
    let (requests, close_request, writer) = {
        let mut inner = stream.borrow_mut();
        if inner.state != StreamState::Active {
            return Ok(());
        }
        inner.state = StreamState::Errored;
        inner.stored_error = reason.clone();
        inner.backpressure = false;
        inner.close_requested = false;
        (inner.queue.drain(), inner.close_request.take(), inner.writer.clone())
    };
    tracing::debug!(rejected_writes = requests.len(), "WritableStream errored");

    for request in requests {
        reject(&request.completion, reason.clone(), context)?;
    }
    if let Some(resolvers) = close_request {
        reject(&resolvers, reason.clone(), context)?;
    }
    if let Some(writer) = writer {
        reject_writer(&writer, reason, context)?;
    }
    Ok(())
}

/// Rejects the writer's `ready` and `closed`, replacing already-settled ones.
fn reject_writer(writer: &Gc<GcRefCell<WriterState>>, reason: JsValue, context: &mut Context) -> JsResult<()> {
    let (ready, closed) = {
        let mut writer = writer.borrow_mut();
        (writer.ready_resolvers.take(), writer.closed_resolvers.take())
    };

    match ready {
        Some(resolvers) => reject(&resolvers, reason.clone(), context)?,
        None => {
            let ready = rejected_promise(reason.clone(), context)?;
            writer.borrow_mut().ready = ready;
        }
    }
    match closed {
        Some(resolvers) => reject(&resolvers, reason, context)?,
        None => {
            let closed = rejected_promise(reason, context)?;
            writer.borrow_mut().closed = closed;
        }
    }
    Ok(())
}

/// Errors the stream with `reason` and tells the sink. Always fulfils.
pub(crate) fn abort(stream: &WritableHandle, reason: JsValue, context: &mut Context) -> JsResult<JsPromise> {
    let call = {
        let inner = stream.borrow();
        if inner.state != StreamState::Active {
            drop(inner);
            return resolved_promise(JsValue::undefined(), context);
        }
        match &inner.sink {
            WritableSink::Script {
                underlying,
                abort: Some(abort),
                ..
            } => Some(SinkCall::Script {
                function: abort.clone(),
                underlying: underlying.clone(),
            }),
            WritableSink::Transform(shared) => Some(SinkCall::Transform(shared.clone())),
            _ => None,
        }
    };
    tracing::debug!("WritableStream aborted");

    error_stream(stream, reason.clone(), context)?;

    match call {
        Some(SinkCall::Script { function, underlying }) => {
            if let Err(err) = function.call(&underlying.into(), &[reason], context) {
                tracing::warn!("WritableStream abort callback threw: {}", err);
            }
        }
        Some(SinkCall::Transform(shared)) => transform::error_readable(&shared, reason, context)?,
        None => {}
    }

    resolved_promise(JsValue::undefined(), context)
}

// ============================================================================
// Locking
// ============================================================================

pub(crate) fn acquire_writer(
    stream: &WritableHandle,
    context: &mut Context,
) -> JsResult<Gc<GcRefCell<WriterState>>> {
    let (state, stored_error, backpressure) = {
        let inner = stream.borrow();
        if inner.is_locked() {
            return Err(StreamError::Locked {
                stream: STREAM,
                holder: "writer",
            }
            .into());
        }
        (inner.state, inner.stored_error.clone(), inner.backpressure)
    };

    let (ready, ready_pending) = JsPromise::new_pending(context);
    let (closed, closed_pending) = JsPromise::new_pending(context);

    let (ready_resolvers, closed_resolvers) = match state {
        StreamState::Active => {
            let ready_resolvers = if backpressure {
                Some(ready_pending)
            } else {
                resolve(&ready_pending, JsValue::undefined(), context)?;
                None
            };
            (ready_resolvers, Some(closed_pending))
        }
        StreamState::Closed => {
            resolve(&ready_pending, JsValue::undefined(), context)?;
            resolve(&closed_pending, JsValue::undefined(), context)?;
            (None, None)
        }
        StreamState::Errored => {
            reject(&ready_pending, stored_error.clone(), context)?;
            reject(&closed_pending, stored_error, context)?;
            (None, None)
        }
    };

    let writer = Gc::new(GcRefCell::new(WriterState {
        attached: true,
        ready,
        ready_resolvers,
        closed,
        closed_resolvers,
    }));
    stream.borrow_mut().writer = Some(writer.clone());
    Ok(writer)
}

pub(crate) fn release_writer(
    stream: &WritableHandle,
    writer: &Gc<GcRefCell<WriterState>>,
    context: &mut Context,
) -> JsResult<()> {
    {
        let mut state = writer.borrow_mut();
        if !state.attached {
            return Ok(());
        }
        state.attached = false;
    }
    stream.borrow_mut().writer = None;

    let released = StreamError::Released("WritableStreamDefaultWriter").to_value(context);
    reject_writer(writer, released, context)
}

// ============================================================================
// WritableStream
// ============================================================================

#[derive(Trace, Finalize, JsData)]
pub struct WritableStream {
    inner: WritableHandle,
}

impl WritableStream {
    pub(crate) fn from_handle(inner: WritableHandle) -> Self {
        Self { inner }
    }

    pub(crate) fn handle(&self) -> &WritableHandle {
        &self.inner
    }

    fn this_handle(this: &JsValue) -> JsResult<WritableHandle> {
        if let Some(object) = this.as_object() {
            if let Some(stream) = object.downcast_ref::<WritableStream>() {
                return Ok(stream.inner.clone());
            }
        }
        Err(incompatible_receiver(STREAM))
    }

    fn get_writer(this: &JsValue, _args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
        let stream = Self::this_handle(this)?;
        let state = acquire_writer(&stream, context)?;
        let writer = WritableStreamDefaultWriter::from_data(WritableStreamDefaultWriter { stream, state }, context)?;
        Ok(writer.into())
    }

    fn abort(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
        let stream = Self::this_handle(this)?;
        Ok(abort(&stream, args.get_or_undefined(0).clone(), context)?.into())
    }

    fn locked(this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
        let stream = Self::this_handle(this)?;
        let locked = stream.borrow().is_locked();
        Ok(locked.into())
    }
}

impl Class for WritableStream {
    const NAME: &'static str = STREAM;
    const LENGTH: usize = 0;

    fn init(class: &mut ClassBuilder<'_>) -> JsResult<()> {
        let locked = NativeFunction::from_fn_ptr(Self::locked).to_js_function(class.context().realm());

        class
            .method(js_string!("getWriter"), 0, NativeFunction::from_fn_ptr(Self::get_writer))
            .method(js_string!("abort"), 0, NativeFunction::from_fn_ptr(Self::abort))
            .accessor(js_string!("locked"), Some(locked), None, Attribute::CONFIGURABLE);
        Ok(())
    }

    fn data_constructor(_new_target: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<Self> {
        let underlying = match args.get_or_undefined(0) {
            value if value.is_null_or_undefined() => None,
            value => match value.as_object() {
                Some(object) => Some(object.clone()),
                None => return Err(StreamError::Usage("underlying sink must be an object".into()).into()),
            },
        };

        let mut start = None;
        let sink = match underlying {
            None => WritableSink::None,
            Some(underlying) => {
                let kind = underlying.get(js_string!("type"), context)?;
                if !kind.is_undefined() {
                    return Err(StreamError::Range("underlying sink type must be undefined".into()).into());
                }
                start = callback(&underlying, "start", context)?.map(|start| (start, underlying.clone()));
                let write = callback(&underlying, "write", context)?;
                let close = callback(&underlying, "close", context)?;
                let abort = callback(&underlying, "abort", context)?;
                WritableSink::Script {
                    underlying,
                    write,
                    close,
                    abort,
                }
            }
        };

        let high_water_mark = high_water_mark(args.get_or_undefined(1), 1.0, context)?;
        let config = StreamConfig::current(context);
        let stream = create_stream(high_water_mark, config, sink, context)?;

        if let Some((start, underlying)) = start {
            let controller = controller_value(&stream);
            if let Err(err) = start.call(&underlying.into(), &[controller], context) {
                tracing::debug!("WritableStream start threw: {}", err);
                let reason = err.to_opaque(context);
                error_stream(&stream, reason, context)?;
            }
        }

        Ok(Self { inner: stream })
    }
}

// ============================================================================
// WritableStreamDefaultController
// ============================================================================

#[derive(Trace, Finalize, JsData)]
pub struct WritableStreamDefaultController {
    stream: WritableHandle,
}

impl WritableStreamDefaultController {
    fn this_stream(this: &JsValue) -> JsResult<WritableHandle> {
        if let Some(object) = this.as_object() {
            if let Some(controller) = object.downcast_ref::<WritableStreamDefaultController>() {
                return Ok(controller.stream.clone());
            }
        }
        Err(incompatible_receiver("WritableStreamDefaultController"))
    }

    fn error(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
        let stream = Self::this_stream(this)?;
        error_stream(&stream, args.get_or_undefined(0).clone(), context)?;
        Ok(JsValue::undefined())
    }
}

impl Class for WritableStreamDefaultController {
    const NAME: &'static str = "WritableStreamDefaultController";
    const LENGTH: usize = 0;

    fn init(class: &mut ClassBuilder<'_>) -> JsResult<()> {
        class.method(js_string!("error"), 1, NativeFunction::from_fn_ptr(Self::error));
        Ok(())
    }

    fn data_constructor(_new_target: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<Self> {
        Err(StreamError::IllegalConstructor.into())
    }
}

// ============================================================================
// WritableStreamDefaultWriter
// ============================================================================

#[derive(Trace, Finalize, JsData)]
pub struct WritableStreamDefaultWriter {
    stream: WritableHandle,
    state: Gc<GcRefCell<WriterState>>,
}

impl WritableStreamDefaultWriter {
    fn this_writer(this: &JsValue) -> JsResult<(WritableHandle, Gc<GcRefCell<WriterState>>)> {
        if let Some(object) = this.as_object() {
            if let Some(writer) = object.downcast_ref::<WritableStreamDefaultWriter>() {
                return Ok((writer.stream.clone(), writer.state.clone()));
            }
        }
        Err(incompatible_receiver("WritableStreamDefaultWriter"))
    }

    /// Returns the stream only while this writer still holds the lock.
    fn attached(this: &JsValue) -> JsResult<Option<(WritableHandle, Gc<GcRefCell<WriterState>>)>> {
        let (stream, state) = Self::this_writer(this)?;
        let attached = state.borrow().attached;
        Ok(attached.then_some((stream, state)))
    }

    fn released(context: &mut Context) -> JsResult<JsValue> {
        let reason = StreamError::Released("WritableStreamDefaultWriter").to_value(context);
        Ok(rejected_promise(reason, context)?.into())
    }

    fn write(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
        match Self::attached(this)? {
            Some((stream, _)) => Ok(write(&stream, args.get_or_undefined(0).clone(), context)?.into()),
            None => Self::released(context),
        }
    }

    fn close(this: &JsValue, _args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
        match Self::attached(this)? {
            Some((stream, _)) => Ok(close(&stream, context)?.into()),
            None => Self::released(context),
        }
    }

    fn abort(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
        match Self::attached(this)? {
            Some((stream, _)) => Ok(abort(&stream, args.get_or_undefined(0).clone(), context)?.into()),
            None => Self::released(context),
        }
    }

    fn release_lock(this: &JsValue, _args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
        let (stream, state) = Self::this_writer(this)?;
        release_writer(&stream, &state, context)?;
        Ok(JsValue::undefined())
    }

    fn ready(this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
        let (_, state) = Self::this_writer(this)?;
        let ready = state.borrow().ready.clone();
        Ok(ready.into())
    }

    fn closed(this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
        let (_, state) = Self::this_writer(this)?;
        let closed = state.borrow().closed.clone();
        Ok(closed.into())
    }

    fn desired_size(this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
        let Some((stream, _)) = Self::attached(this)? else {
            return Err(StreamError::Released("WritableStreamDefaultWriter").into());
        };
        let inner = stream.borrow();
        Ok(desired_size(inner.state, inner.high_water_mark, inner.queue.len()))
    }
}

impl Class for WritableStreamDefaultWriter {
    const NAME: &'static str = "WritableStreamDefaultWriter";
    const LENGTH: usize = 1;

    fn init(class: &mut ClassBuilder<'_>) -> JsResult<()> {
        let realm = class.context().realm().clone();
        let ready = NativeFunction::from_fn_ptr(Self::ready).to_js_function(&realm);
        let closed = NativeFunction::from_fn_ptr(Self::closed).to_js_function(&realm);
        let desired_size = NativeFunction::from_fn_ptr(Self::desired_size).to_js_function(&realm);

        class
            .method(js_string!("write"), 1, NativeFunction::from_fn_ptr(Self::write))
            .method(js_string!("close"), 0, NativeFunction::from_fn_ptr(Self::close))
            .method(js_string!("abort"), 0, NativeFunction::from_fn_ptr(Self::abort))
            .method(js_string!("releaseLock"), 0, NativeFunction::from_fn_ptr(Self::release_lock))
            .accessor(js_string!("ready"), Some(ready), None, Attribute::CONFIGURABLE)
            .accessor(js_string!("closed"), Some(closed), None, Attribute::CONFIGURABLE)
            .accessor(js_string!("desiredSize"), Some(desired_size), None, Attribute::CONFIGURABLE);
        Ok(())
    }

    /// `new WritableStreamDefaultWriter(stream)` is equivalent to `stream.getWriter()`.
    fn data_constructor(_new_target: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<Self> {
        let stream = WritableStream::this_handle(args.get_or_undefined(0)).map_err(|_| {
            JsNativeError::typ().with_message("WritableStreamDefaultWriter requires a WritableStream")
        })?;
        let state = acquire_writer(&stream, context)?;
        Ok(Self { stream, state })
    }
}
