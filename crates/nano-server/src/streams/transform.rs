//! Transform streams
//!
//! A transform stream pairs a writable side with a readable side. Chunks
//! written to the writable side pass through the transformer's `transform`
//! callback (or straight through when there is none) and come out of the
//! readable side via the transform controller.
//!
//! Both sides hold the same [`TransformShared`] handle, so a failure on one
//! side can be propagated to the other without going back through script.

use boa_engine::{
    Context, JsArgs, JsData, JsError, JsObject, JsResult, JsString, JsValue, NativeFunction,
    class::{Class, ClassBuilder},
    js_string,
    property::Attribute,
};
use boa_gc::{Finalize, Gc, GcRefCell, Trace};

use super::error::StreamError;
use super::readable::{self, ReadableHandle, ReadableSource, ReadableStream};
use super::writable::{self, WritableHandle, WritableSink, WritableStream};
use super::{StreamConfig, callback, desired_size, high_water_mark, incompatible_receiver};

pub(crate) type TransformHandle = Gc<GcRefCell<TransformShared>>;

/// State shared by both sides of one transform stream.
#[derive(Trace, Finalize)]
pub(crate) struct TransformShared {
    readable: ReadableHandle,
    writable: Option<WritableHandle>,
    transformer: JsValue,
    transform: Option<JsObject>,
    flush: Option<JsObject>,
    controller: Option<JsObject>,
}

impl TransformShared {
    fn controller_value(&self) -> JsValue {
        self.controller
            .clone()
            .map(JsValue::from)
            .unwrap_or_else(JsValue::undefined)
    }
}

/// Runs one written chunk through the transformer.
pub(crate) fn transform_chunk(shared: &TransformHandle, chunk: JsValue, context: &mut Context) -> JsResult<JsValue> {
    let (transform, transformer, controller, readable) = {
        let shared = shared.borrow();
        (
            shared.transform.clone(),
            shared.transformer.clone(),
            shared.controller_value(),
            shared.readable.clone(),
        )
    };

    match transform {
        Some(transform) => {
            let result = transform.call(&transformer, &[chunk, controller], context);
            fail_readable_on_throw(shared, result, context)
        }
        None => {
            readable::enqueue(&readable, chunk, context)?;
            Ok(JsValue::undefined())
        }
    }
}

/// Runs `flush` and closes the readable side. Called when the writable side
/// closes.
pub(crate) fn flush(shared: &TransformHandle, context: &mut Context) -> JsResult<JsValue> {
    let (flush, transformer, controller, readable) = {
        let shared = shared.borrow();
        (
            shared.flush.clone(),
            shared.transformer.clone(),
            shared.controller_value(),
            shared.readable.clone(),
        )
    };

    if let Some(flush) = flush {
        let result = flush.call(&transformer, &[controller], context);
        fail_readable_on_throw(shared, result, context)?;
    }
    if readable::is_closable(&readable) {
        readable::close(&readable, context)?;
    }
    Ok(JsValue::undefined())
}

/// A throwing transformer callback errors the readable side with the thrown
/// value; the writable side is errored by its caller with the same value.
fn fail_readable_on_throw(
    shared: &TransformHandle,
    result: JsResult<JsValue>,
    context: &mut Context,
) -> JsResult<JsValue> {
    match result {
        Ok(value) => Ok(value),
        Err(err) => {
            let reason = err.to_opaque(context);
            error_readable(shared, reason.clone(), context)?;
            Err(JsError::from_opaque(reason))
        }
    }
}

pub(crate) fn error_readable(shared: &TransformHandle, reason: JsValue, context: &mut Context) -> JsResult<()> {
    let readable = shared.borrow().readable.clone();
    readable::error_stream(&readable, reason, context)
}

pub(crate) fn error_writable(shared: &TransformHandle, reason: JsValue, context: &mut Context) -> JsResult<()> {
    let writable = shared.borrow().writable.clone();
    match writable {
        Some(writable) => writable::error_stream(&writable, reason, context),
        None => Ok(()),
    }
}

fn error_both(shared: &TransformHandle, reason: JsValue, context: &mut Context) -> JsResult<()> {
    error_readable(shared, reason.clone(), context)?;
    error_writable(shared, reason, context)
}

fn terminate(shared: &TransformHandle, context: &mut Context) -> JsResult<()> {
    let readable = shared.borrow().readable.clone();
    if readable::is_closable(&readable) {
        readable::close(&readable, context)?;
    }
    let reason = StreamError::InvalidState {
        stream: "TransformStream",
        state: "terminated",
    }
    .to_value(context);
    error_writable(shared, reason, context)
}

// ============================================================================
// TransformStream
// ============================================================================

#[derive(Trace, Finalize, JsData)]
pub struct TransformStream {
    readable: JsObject,
    writable: JsObject,
}

impl TransformStream {
    fn this_stream(this: &JsValue) -> JsResult<(JsObject, JsObject)> {
        if let Some(object) = this.as_object() {
            if let Some(stream) = object.downcast_ref::<TransformStream>() {
                return Ok((stream.readable.clone(), stream.writable.clone()));
            }
        }
        Err(incompatible_receiver("TransformStream"))
    }

    fn readable(this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
        let (readable, _) = Self::this_stream(this)?;
        Ok(readable.into())
    }

    fn writable(this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
        let (_, writable) = Self::this_stream(this)?;
        Ok(writable.into())
    }
}

impl Class for TransformStream {
    const NAME: &'static str = "TransformStream";
    const LENGTH: usize = 0;

    fn init(class: &mut ClassBuilder<'_>) -> JsResult<()> {
        let realm = class.context().realm().clone();
        let readable = NativeFunction::from_fn_ptr(Self::readable).to_js_function(&realm);
        let writable = NativeFunction::from_fn_ptr(Self::writable).to_js_function(&realm);

        class
            .accessor(js_string!("readable"), Some(readable), None, Attribute::CONFIGURABLE)
            .accessor(js_string!("writable"), Some(writable), None, Attribute::CONFIGURABLE);
        Ok(())
    }

    fn data_constructor(_new_target: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<Self> {
        let transformer = args.get_or_undefined(0).clone();
        let (start, transform, flush) = if transformer.is_null_or_undefined() {
            (None, None, None)
        } else {
            let Some(object) = transformer.as_object() else {
                return Err(StreamError::Usage("transformer must be an object".into()).into());
            };
            for kind in ["readableType", "writableType"] {
                if !object.get(JsString::from(kind), context)?.is_undefined() {
                    return Err(StreamError::Range(format!("{kind} is not supported")).into());
                }
            }
            (
                callback(&object, "start", context)?,
                callback(&object, "transform", context)?,
                callback(&object, "flush", context)?,
            )
        };

        let writable_mark = high_water_mark(args.get_or_undefined(1), 1.0, context)?;
        let readable_mark = high_water_mark(args.get_or_undefined(2), 0.0, context)?;
        let config = StreamConfig::current(context);

        let readable_side = readable::create_stream(readable_mark, config, ReadableSource::None, context)?;
        let shared = Gc::new(GcRefCell::new(TransformShared {
            readable: readable_side.clone(),
            writable: None,
            transformer: transformer.clone(),
            transform,
            flush,
            controller: None,
        }));
        readable::set_source(&readable_side, ReadableSource::Transform(shared.clone()));

        let writable_side =
            writable::create_stream(writable_mark, config, WritableSink::Transform(shared.clone()), context)?;
        let controller = TransformStreamDefaultController::from_data(
            TransformStreamDefaultController { shared: shared.clone() },
            context,
        )?;
        {
            let mut shared = shared.borrow_mut();
            shared.writable = Some(writable_side.clone());
            shared.controller = Some(controller.clone());
        }

        let readable = ReadableStream::from_data(ReadableStream::from_handle(readable_side), context)?;
        let writable = WritableStream::from_data(WritableStream::from_handle(writable_side), context)?;

        if let Some(start) = start {
            if let Err(err) = start.call(&transformer, &[controller.into()], context) {
                tracing::debug!("TransformStream start threw: {}", err);
                let reason = err.to_opaque(context);
                error_both(&shared, reason, context)?;
            }
        }

        Ok(Self { readable, writable })
    }
}

// ============================================================================
// TransformStreamDefaultController
// ============================================================================

#[derive(Trace, Finalize, JsData)]
pub struct TransformStreamDefaultController {
    shared: TransformHandle,
}

impl TransformStreamDefaultController {
    fn this_shared(this: &JsValue) -> JsResult<TransformHandle> {
        if let Some(object) = this.as_object() {
            if let Some(controller) = object.downcast_ref::<TransformStreamDefaultController>() {
                return Ok(controller.shared.clone());
            }
        }
        Err(incompatible_receiver("TransformStreamDefaultController"))
    }

    fn enqueue(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
        let shared = Self::this_shared(this)?;
        let readable = shared.borrow().readable.clone();
        readable::enqueue(&readable, args.get_or_undefined(0).clone(), context)?;
        Ok(JsValue::undefined())
    }

    fn error(this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
        let shared = Self::this_shared(this)?;
        error_both(&shared, args.get_or_undefined(0).clone(), context)?;
        Ok(JsValue::undefined())
    }

    fn terminate(this: &JsValue, _args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
        let shared = Self::this_shared(this)?;
        terminate(&shared, context)?;
        Ok(JsValue::undefined())
    }

    fn desired_size(this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
        let shared = Self::this_shared(this)?;
        let readable = shared.borrow().readable.clone();
        let inner = readable.borrow();
        Ok(desired_size(inner.state(), inner.high_water_mark(), inner.queue_len()))
    }
}

impl Class for TransformStreamDefaultController {
    const NAME: &'static str = "TransformStreamDefaultController";
    const LENGTH: usize = 0;

    fn init(class: &mut ClassBuilder<'_>) -> JsResult<()> {
        let desired_size = NativeFunction::from_fn_ptr(Self::desired_size).to_js_function(class.context().realm());

        class
            .method(js_string!("enqueue"), 1, NativeFunction::from_fn_ptr(Self::enqueue))
            .method(js_string!("error"), 1, NativeFunction::from_fn_ptr(Self::error))
            .method(js_string!("terminate"), 0, NativeFunction::from_fn_ptr(Self::terminate))
            .accessor(js_string!("desiredSize"), Some(desired_size), None, Attribute::CONFIGURABLE);
        Ok(())
    }

    fn data_constructor(_new_target: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<Self> {
        Err(StreamError::IllegalConstructor.into())
    }
}
