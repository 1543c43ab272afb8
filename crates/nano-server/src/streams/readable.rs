//! Readable stream core
//!
//! A readable stream delivers chunks from an underlying source to a single
//! locked reader, in the order they were enqueued.
//!
//! # Lifecycle
//!
//! ```text
//!             close() with empty queue / last chunk read after close()
//!   active ───────────────────────────────────────────────────────────► closed
//!     │                         cancel()                                  ▲
//!     ├───────────────────────────────────────────────────────────────────┘
//!     │  controller.error() / start() throws / buffer limit exceeded
//!     └──────────────────────────────────────────────────────────────────► errored
//! ```
//!
//! Reads on an empty active stream first give the source's `pull` a chance to
//! enqueue synchronously. What happens if it does not is governed by
//! [`EmptyReadPolicy`].

use std::collections::VecDeque;

use boa_engine::{
    Context, JsArgs, JsData, JsError, JsNativeError, JsObject, JsResult, JsValue, NativeFunction,
    builtins::promise::ResolvingFunctions,
    class::{Class, ClassBuilder},
    js_string,
    object::{ObjectInitializer, builtins::JsPromise},
    property::Attribute,
};
use boa_gc::{Finalize, Gc, GcRefCell, Trace};

use super::chunk::chunk_size;
use super::error::StreamError;
use super::queue::SizedQueue;
use super::transform::{self, TransformHandle};
use super::{
    EmptyReadPolicy, StreamConfig, StreamState, callback, desired_size, high_water_mark,
    incompatible_receiver, reject, rejected_promise, resolve, resolved_promise,
};

const STREAM: &str = "ReadableStream";

/// Shared handle to a readable stream's state.
pub(crate) type ReadableHandle = Gc<GcRefCell<ReadableInner>>;

/// Where chunks come from, and who is told about cancellation.
#[derive(Trace, Finalize)]
pub(crate) enum ReadableSource {
    /// No callbacks: chunks arrive only through the controller.
    None,
    /// A script-supplied underlying source object.
    Script {
        underlying: JsObject,
        pull: Option<JsObject>,
        cancel: Option<JsObject>,
    },
    /// The readable side of a transform stream.
    Transform(TransformHandle),
}

/// Reader-side view of a lock: the `closed` promise and whether the reader
/// still holds the stream.
#[derive(Trace, Finalize)]
pub(crate) struct ReaderState {
    attached: bool,
    closed: JsPromise,
    closed_resolvers: Option<ResolvingFunctions>,
}

#[derive(Trace, Finalize)]
pub(crate) struct ReadableInner {
    #[unsafe_ignore_trace]
    state: StreamState,
    queue: SizedQueue<JsValue>,
    high_water_mark: f64,
    max_buffer_size: usize,
    #[unsafe_ignore_trace]
    read_policy: EmptyReadPolicy,
    close_requested: bool,
    pulling: bool,
    stored_error: JsValue,
    source: ReadableSource,
    controller: Option<JsObject>,
    reader: Option<Gc<GcRefCell<ReaderState>>>,
    pending_reads: VecDeque<ResolvingFunctions>,
}

impl ReadableInner {
    fn new(high_water_mark: f64, config: StreamConfig, source: ReadableSource) -> Self {
        Self {
            state: StreamState::Active,
            queue: SizedQueue::new(),
            high_water_mark,
            max_buffer_size: config.max_buffer_size,
            read_policy: config.empty_read_policy,
            close_requested: false,
            pulling: false,
            stored_error: JsValue::undefined(),
            source,
            controller: None,
            reader: None,
            pending_reads: VecDeque::new(),
        }
    }

    pub(crate) fn state(&self) -> StreamState {
        self.state
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.reader.is_some()
    }

    pub(crate) fn high_water_mark(&self) -> f64 {
        self.high_water_mark
    }

    pub(crate) fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn queue_byte_size(&self) -> usize {
        self.queue.byte_size()
    }

    pub(crate) fn pending_read_count(&self) -> usize {
        self.pending_reads.len()
    }

    #[cfg(test)]
    pub(crate) fn accounting_holds(&self) -> bool {
        self.queue.byte_size() == self.queue.recomputed_byte_size()
    }

    fn can_close(&self) -> bool {
        self.state == StreamState::Active && !self.close_requested
    }

    fn invalid_state(&self) -> StreamError {
        let state = match self.state {
            StreamState::Closed => "closed",
            StreamState::Errored => "errored",
            StreamState::Active => "closing",
        };
        StreamError::InvalidState { stream: STREAM, state }
    }
}

/// Result of a synchronous read attempt.
pub(crate) enum ReadOutcome {
    Chunk(JsValue),
    Done,
    Errored(JsValue),
    Empty,
}

// ============================================================================
// Core operations
// ============================================================================

/// Creates a stream together with its controller object.
pub(crate) fn create_stream(
    high_water_mark: f64,
    config: StreamConfig,
    source: ReadableSource,
    context: &mut Context,
) -> JsResult<ReadableHandle> {
    let stream = Gc::new(GcRefCell::new(ReadableInner::new(high_water_mark, config, source)));
    let controller = ReadableStreamDefaultController::from_data(
        ReadableStreamDefaultController { stream: stream.clone() },
        context,
    )?;
    stream.borrow_mut().controller = Some(controller);
    Ok(stream)
}

pub(crate) fn set_source(stream: &ReadableHandle, source: ReadableSource) {
    stream.borrow_mut().source = source;
}

/// Returns the controller object as a script value.
pub(crate) fn controller_value(stream: &ReadableHandle) -> JsValue {
    stream
        .borrow()
        .controller
        .clone()
        .map(JsValue::from)
        .unwrap_or_else(JsValue::undefined)
}

/// Adds a chunk, handing it straight to the oldest pending read if there is one.
pub(crate) fn enqueue(stream: &ReadableHandle, chunk: JsValue, context: &mut Context) -> JsResult<()> {
    {
        let inner = stream.borrow();
        if !inner.can_close() {
            return Err(inner.invalid_state().into());
        }
    }

    let size = chunk_size(&chunk, context)?;

    let exceeded = {
        let inner = stream.borrow();
        if !inner.can_close() {
            return Err(inner.invalid_state().into());
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
        tracing::debug!("ReadableStream buffer limit exceeded: {}", err);
        let reason = err.to_value(context);
        error_stream(stream, reason.clone(), context)?;
        return Err(JsError::from_opaque(reason));
    }

    let waiting = {
        let mut inner = stream.borrow_mut();
        match inner.pending_reads.pop_front() {
            Some(request) => Some(request),
            None => {
                inner.queue.push(chunk.clone(), size);
                None
            }
        }
    };
    if let Some(request) = waiting {
        let result = read_result(chunk, false, context);
        resolve(&request, result, context)?;
    }
    Ok(())
}

/// Requests a close. Deferred until the queue has been read empty.
pub(crate) fn close(stream: &ReadableHandle, context: &mut Context) -> JsResult<()> {
    {
        let mut inner = stream.borrow_mut();
        if !inner.can_close() {
            return Err(inner.invalid_state().into());
        }
        if !inner.queue.is_empty() {
            inner.close_requested = true;
            return Ok(());
        }
    }
    finalize_close(stream, context)
}

/// Whether [`close`] would currently succeed.
pub(crate) fn is_closable(stream: &ReadableHandle) -> bool {
    stream.borrow().can_close()
}

fn finalize_close(stream: &ReadableHandle, context: &mut Context) -> JsResult<()> {
    let (reads, reader) = {
        let mut inner = stream.borrow_mut();
        inner.state = StreamState::Closed;
        inner.close_requested = false;
        (std::mem::take(&mut inner.pending_reads), inner.reader.clone())
    };
    tracing::debug!(pending_reads = reads.len(), "ReadableStream closed");

    for request in reads {
        let result = read_result(JsValue::undefined(), true, context);
        resolve(&request, result, context)?;
    }
    if let Some(reader) = reader {
        let resolvers = reader.borrow_mut().closed_resolvers.take();
        if let Some(resolvers) = resolvers {
            resolve(&resolvers, JsValue::undefined(), context)?;
        }
    }
    Ok(())
}

/// Moves an active stream to `errored`, discarding the queue and rejecting
/// everything waiting on it. No-op for streams that are already settled.
pub(crate) fn error_stream(stream: &ReadableHandle, reason: JsValue, context: &mut Context) -> JsResult<()> {
    let (reads, reader) = {
        let mut inner = stream.borrow_mut();
        if inner.state != StreamState::Active {
            return Ok(());
        }
        inner.state = StreamState::Errored;
        inner.close_requested = false;
        inner.stored_error = reason.clone();
        let discarded = inner.queue.drain();
        tracing::debug!(discarded = discarded.len(), "ReadableStream errored");
        (std::mem::take(&mut inner.pending_reads), inner.reader.clone())
    };

    for request in reads {
        reject(&request, reason.clone(), context)?;
    }
    if let Some(reader) = reader {
        let resolvers = reader.borrow_mut().closed_resolvers.take();
        if let Some(resolvers) = resolvers {
            reject(&resolvers, reason, context)?;
        }
    }
    Ok(())
}

/// Cancels the stream. The returned promise always fulfils.
pub(crate) fn cancel(stream: &ReadableHandle, reason: JsValue, context: &mut Context) -> JsResult<JsPromise> {
    enum Notify {
        Script(JsObject, JsObject),
        Transform(TransformHandle),
    }

    let (notify, reads, reader) = {
        let mut inner = stream.borrow_mut();
        if inner.state != StreamState::Active {
            drop(inner);
            return resolved_promise(JsValue::undefined(), context);
        }
        inner.state = StreamState::Closed;
        inner.close_requested = false;
        inner.queue.drain();
        let notify = match &inner.source {
            ReadableSource::Script {
                underlying,
                cancel: Some(cancel),
                ..
            } => Some(Notify::Script(cancel.clone(), underlying.clone())),
            ReadableSource::Transform(shared) => Some(Notify::Transform(shared.clone())),
            _ => None,
        };
        (notify, std::mem::take(&mut inner.pending_reads), inner.reader.clone())
    };
    tracing::debug!("ReadableStream cancelled");

    for request in reads {
        let result = read_result(JsValue::undefined(), true, context);
        resolve(&request, result, context)?;
    }
    if let Some(reader) = reader {
        let resolvers = reader.borrow_mut().closed_resolvers.take();
        if let Some(resolvers) = resolvers {
            resolve(&resolvers, JsValue::undefined(), context)?;
        }
    }

    match notify {
        Some(Notify::Script(cancel, underlying)) => {
            if let Err(err) = cancel.call(&underlying.into(), &[reason], context) {
                tracing::warn!("ReadableStream cancel callback threw: {}", err);
            }
        }
        Some(Notify::Transform(shared)) => transform::error_writable(&shared, reason, context)?,
        None => {}
    }

    resolved_promise(JsValue::undefined(), context)
}

/// Invokes the source's `pull` once. Re-entrant calls are ignored and a
/// throwing `pull` errors the stream.
fn pull(stream: &ReadableHandle, context: &mut Context) -> JsResult<()> {
    let target = {
        let mut inner = stream.borrow_mut();
        if inner.pulling || !inner.can_close() {
            return Ok(());
        }
        let target = match &inner.source {
            ReadableSource::Script {
                underlying,
                pull: Some(pull),
                ..
            } => Some((pull.clone(), underlying.clone())),
            _ => None,
        };
        if target.is_some() {
            inner.pulling = true;
        }
        target
    };

    let Some((pull, underlying)) = target else {
        return Ok(());
    };
    let controller = controller_value(stream);
    let result = pull.call(&underlying.into(), &[controller], context);
    stream.borrow_mut().pulling = false;

    if let Err(err) = result {
        tracing::debug!("ReadableStream pull threw: {}", err);
        let reason = err.to_opaque(context);
        error_stream(stream, reason, context)?;
    }
    Ok(())
}

fn try_dequeue(stream: &ReadableHandle, context: &mut Context) -> JsResult<ReadOutcome> {
    let (outcome, finished) = {
        let mut inner = stream.borrow_mut();
        match inner.state {
            StreamState::Errored => (ReadOutcome::Errored(inner.stored_error.clone()), false),
            _ => match inner.queue.pop_front() {
                Some(chunk) => {
                    let finished = inner.close_requested && inner.queue.is_empty();
                    (ReadOutcome::Chunk(chunk), finished)
                }
                None if inner.state == StreamState::Closed => (ReadOutcome::Done, false),
                None => (ReadOutcome::Empty, false),
            },
        }
    };
    if finished {
        finalize_close(stream, context)?;
    }
    Ok(outcome)
}

/// Dequeues without waiting: if the queue is empty, `pull` gets one chance to
/// refill it.
pub(crate) fn read_now(stream: &ReadableHandle, context: &mut Context) -> JsResult<ReadOutcome> {
    match try_dequeue(stream, context)? {
        ReadOutcome::Empty => {
            pull(stream, context)?;
            try_dequeue(stream, context)
        }
        outcome => Ok(outcome),
    }
}

fn read(stream: &ReadableHandle, context: &mut Context) -> JsResult<JsPromise> {
    match read_now(stream, context)? {
        ReadOutcome::Chunk(chunk) => {
            let result = read_result(chunk, false, context);
            resolved_promise(result, context)
        }
        ReadOutcome::Done => {
            let result = read_result(JsValue::undefined(), true, context);
            resolved_promise(result, context)
        }
        ReadOutcome::Errored(reason) => rejected_promise(reason, context),
        ReadOutcome::Empty => {
            let policy = stream.borrow().read_policy;
            match policy {
                EmptyReadPolicy::Reject => {
                    let reason = StreamError::NoDataAvailable.to_value(context);
                    rejected_promise(reason, context)
                }
                EmptyReadPolicy::Wait => {
                    let (promise, resolvers) = JsPromise::new_pending(context);
                    stream.borrow_mut().pending_reads.push_back(resolvers);
                    Ok(promise)
                }
            }
        }
    }
}

/// `{ value, done }` as produced by `reader.read()`.
fn read_result(value: JsValue, done: bool, context: &mut Context) -> JsValue {
    ObjectInitializer::new(context)
        .property(js_string!("value"), value, Attribute::all())
        .property(js_string!("done"), done, Attribute::all())
        .build()
        .into()
}

// ============================================================================
// Locking
// ============================================================================

/// Locks the stream to a new reader.
pub(crate) fn acquire_reader(
    stream: &ReadableHandle,
    context: &mut Context,
) -> JsResult<Gc<GcRefCell<ReaderState>>> {
    let (state, stored_error) = {
        let inner = stream.borrow();
        if inner.is_locked() {
            return Err(StreamError::Locked {
                stream: STREAM,
                holder: "reader",
            }
            .into());
        }
        (inner.state, inner.stored_error.clone())
    };

    let (closed, resolvers) = JsPromise::new_pending(context);
    let closed_resolvers = match state {
        StreamState::Active => Some(resolvers),
        StreamState::Closed => {
            resolve(&resolvers, JsValue::undefined(), context)?;
            None
        }
        StreamState::Errored => {
            reject(&resolvers, stored_error, context)?;
            None
        }
    };

    let reader = Gc::new(GcRefCell::new(ReaderState {
        attached: true,
        closed,
        closed_resolvers,
    }));
    stream.borrow_mut().reader = Some(reader.clone());
    Ok(reader)
}

/// Detaches `reader` from the stream. Safe to call repeatedly.
pub(crate) fn release_reader(
    stream: &ReadableHandle,
    reader: &Gc<GcRefCell<ReaderState>>,
    context: &mut Context,
) -> JsResult<()> {
    {
        let mut state = reader.borrow_mut();
        if !state.attached {
            return Ok(());
        }
        state.attached = false;
    }

    let reads = {
        let mut inner = stream.borrow_mut();
        inner.reader = None;
        std::mem::take(&mut inner.pending_reads)
    };

    let released = StreamError::Released("ReadableStreamDefaultReader").to_value(context);
    for request in reads {
        reject(&request, released.clone(), context)?;
    }

    let pending = reader.borrow_mut().closed_resolvers.take();
    match pending {
        Some(resolvers) => reject(&resolvers, released, context)?,
        None => {
            let closed = rejected_promise(released, context)?;
            reader.borrow_mut().closed = closed;
        }
    }
    Ok(())
}

// ============================================================================
// ReadableStream
// ============================================================================

#[derive(Trace, Finalize, JsData)]
pub struct ReadableStream {
    inner: ReadableHandle,
}

impl ReadableStream {
    pub(crate) fn from_handle(inner: ReadableHandle) -> Self {
        Self { inner }
    }

    pub(crate) fn handle(&self) -> &ReadableHandle {
        &self.inner
    }

    fn this_handle(this: &JsValue) -> JsResult<ReadableHandle> {
        if let Some(object) = this.as_object() {
            if let Some(stream) = object.downcast_ref::<ReadableStream>() {
                return Ok(stream.inner.clone());
            }
        }
        Err(incompatible_receiver(STREAM))
    }

    fn get_reader(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
        let stream = Self::this_handle(this)?;

        if let Some(options) = args.get_or_undefined(0).as_object() {
            let mode = options.get(js_string!("mode"), context)?;
            if !mode.is_undefined() {
                return Err(StreamError::NotImplemented("BYOB reader").into());
            }
        }

        let state = acquire_reader(&stream, context)?;
        let reader = ReadableStreamDefaultReader::from_data(ReadableStreamDefaultReader { stream, state }, context)?;
        Ok(reader.into())
    }

    fn cancel(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
        let stream = Self::this_handle(this)?;
        Ok(cancel(&stream, args.get_or_undefined(0).clone(), context)?.into())
    }

    fn tee(_this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
        Err(StreamError::NotImplemented("ReadableStream.prototype.tee").into())
    }

    fn locked(this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
        let stream = Self::this_handle(this)?;
        let locked = stream.borrow().is_locked();
        Ok(locked.into())
    }
}

impl Class for ReadableStream {
    const NAME: &'static str = STREAM;
    const LENGTH: usize = 0;

    fn init(class: &mut ClassBuilder<'_>) -> JsResult<()> {
        let locked = NativeFunction::from_fn_ptr(Self::locked).to_js_function(class.context().realm());

        class
            .method(js_string!("getReader"), 0, NativeFunction::from_fn_ptr(Self::get_reader))
            .method(js_string!("cancel"), 0, NativeFunction::from_fn_ptr(Self::cancel))
            .method(js_string!("tee"), 0, NativeFunction::from_fn_ptr(Self::tee))
            .accessor(js_string!("locked"), Some(locked), None, Attribute::CONFIGURABLE);
        Ok(())
    }

    fn data_constructor(_new_target: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<Self> {
        let underlying = match args.get_or_undefined(0) {
            value if value.is_null_or_undefined() => None,
            value => match value.as_object() {
                Some(object) => Some(object.clone()),
                None => return Err(StreamError::Usage("underlying source must be an object".into()).into()),
            },
        };

        let mut start = None;
        let source = match underlying {
            None => ReadableSource::None,
            Some(underlying) => {
                let kind = underlying.get(js_string!("type"), context)?;
                if !kind.is_undefined() {
                    let kind = kind.to_string(context)?.to_std_string_escaped();
                    if kind == "bytes" {
                        return Err(StreamError::NotImplemented("Readable byte stream").into());
                    }
                    return Err(StreamError::Usage(format!("'{kind}' is not a valid stream type")).into());
                }
                start = callback(&underlying, "start", context)?.map(|start| (start, underlying.clone()));
                let pull = callback(&underlying, "pull", context)?;
                let cancel = callback(&underlying, "cancel", context)?;
                ReadableSource::Script {
                    underlying,
                    pull,
                    cancel,
                }
            }
        };

        let high_water_mark = high_water_mark(args.get_or_undefined(1), 1.0, context)?;
        let config = StreamConfig::current(context);
        let stream = create_stream(high_water_mark, config, source, context)?;

        if let Some((start, underlying)) = start {
            let controller = controller_value(&stream);
            if let Err(err) = start.call(&underlying.into(), &[controller], context) {
                tracing::debug!("ReadableStream start threw: {}", err);
                let reason = err.to_opaque(context);
                error_stream(&stream, reason, context)?;
            }
        }

        Ok(Self { inner: stream })
    }
}

// ============================================================================
// ReadableStreamDefaultController
// ============================================================================

#[derive(Trace, Finalize, JsData)]
pub struct ReadableStreamDefaultController {
    stream: ReadableHandle,
}

impl ReadableStreamDefaultController {
    fn this_stream(this: &JsValue) -> JsResult<ReadableHandle> {
        if let Some(object) = this.as_object() {
            if let Some(controller) = object.downcast_ref::<ReadableStreamDefaultController>() {
                return Ok(controller.stream.clone());
            }
        }
        Err(incompatible_receiver("ReadableStreamDefaultController"))
    }

    fn enqueue(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
        let stream = Self::this_stream(this)?;
        enqueue(&stream, args.get_or_undefined(0).clone(), context)?;
        Ok(JsValue::undefined())
    }

    fn close(this: &JsValue, _args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
        let stream = Self::this_stream(this)?;
        close(&stream, context)?;
        Ok(JsValue::undefined())
    }

    fn error(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
        let stream = Self::this_stream(this)?;
        error_stream(&stream, args.get_or_undefined(0).clone(), context)?;
        Ok(JsValue::undefined())
    }

    fn desired_size(this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
        let stream = Self::this_stream(this)?;
        let inner = stream.borrow();
        Ok(desired_size(inner.state, inner.high_water_mark, inner.queue.len()))
    }
}

impl Class for ReadableStreamDefaultController {
    const NAME: &'static str = "ReadableStreamDefaultController";
    const LENGTH: usize = 0;

    fn init(class: &mut ClassBuilder<'_>) -> JsResult<()> {
        let desired_size = NativeFunction::from_fn_ptr(Self::desired_size).to_js_function(class.context().realm());

        class
            .method(js_string!("enqueue"), 1, NativeFunction::from_fn_ptr(Self::enqueue))
            .method(js_string!("close"), 0, NativeFunction::from_fn_ptr(Self::close))
            .method(js_string!("error"), 1, NativeFunction::from_fn_ptr(Self::error))
            .accessor(js_string!("desiredSize"), Some(desired_size), None, Attribute::CONFIGURABLE);
        Ok(())
    }

    fn data_constructor(_new_target: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<Self> {
        Err(StreamError::IllegalConstructor.into())
    }
}

// ============================================================================
// ReadableStreamDefaultReader
// ============================================================================

#[derive(Trace, Finalize, JsData)]
pub struct ReadableStreamDefaultReader {
    stream: ReadableHandle,
    state: Gc<GcRefCell<ReaderState>>,
}

impl ReadableStreamDefaultReader {
    fn this_reader(this: &JsValue) -> JsResult<(ReadableHandle, Gc<GcRefCell<ReaderState>>)> {
        if let Some(object) = this.as_object() {
            if let Some(reader) = object.downcast_ref::<ReadableStreamDefaultReader>() {
                return Ok((reader.stream.clone(), reader.state.clone()));
            }
        }
        Err(incompatible_receiver("ReadableStreamDefaultReader"))
    }

    fn released(context: &mut Context) -> JsResult<JsValue> {
        let reason = StreamError::Released("ReadableStreamDefaultReader").to_value(context);
        Ok(rejected_promise(reason, context)?.into())
    }

    fn read(this: &JsValue, _args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
        let (stream, state) = Self::this_reader(this)?;
        if !state.borrow().attached {
            return Self::released(context);
        }
        Ok(read(&stream, context)?.into())
    }

    fn cancel(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
        let (stream, state) = Self::this_reader(this)?;
        if !state.borrow().attached {
            return Self::released(context);
        }
        let promise = cancel(&stream, args.get_or_undefined(0).clone(), context)?;
        release_reader(&stream, &state, context)?;
        Ok(promise.into())
    }

    fn release_lock(this: &JsValue, _args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
        let (stream, state) = Self::this_reader(this)?;
        release_reader(&stream, &state, context)?;
        Ok(JsValue::undefined())
    }

    fn closed(this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
        let (_, state) = Self::this_reader(this)?;
        let closed = state.borrow().closed.clone();
        Ok(closed.into())
    }
}

impl Class for ReadableStreamDefaultReader {
    const NAME: &'static str = "ReadableStreamDefaultReader";
    const LENGTH: usize = 1;

    fn init(class: &mut ClassBuilder<'_>) -> JsResult<()> {
        let closed = NativeFunction::from_fn_ptr(Self::closed).to_js_function(class.context().realm());

        class
            .method(js_string!("read"), 0, NativeFunction::from_fn_ptr(Self::read))
            .method(js_string!("cancel"), 0, NativeFunction::from_fn_ptr(Self::cancel))
            .method(js_string!("releaseLock"), 0, NativeFunction::from_fn_ptr(Self::release_lock))
            .accessor(js_string!("closed"), Some(closed), None, Attribute::CONFIGURABLE);
        Ok(())
    }

    /// `new ReadableStreamDefaultReader(stream)` is equivalent to `stream.getReader()`.
    fn data_constructor(_new_target: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<Self> {
        let stream = ReadableStream::this_handle(args.get_or_undefined(0)).map_err(|_| {
            JsNativeError::typ().with_message("ReadableStreamDefaultReader requires a ReadableStream")
        })?;
        let state = acquire_reader(&stream, context)?;
        Ok(Self { stream, state })
    }
}
