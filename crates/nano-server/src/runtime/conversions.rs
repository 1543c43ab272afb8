//! Host <-> JavaScript value conversions
//!
//! This module builds the script-side request object from a [`RequestData`]
//! and reduces script values (body chunks, rejection reasons) back to bytes
//! and strings on the way out.
//!
//! # Request shape
//!
//! | Property  | Value                                                          |
//! |-----------|----------------------------------------------------------------|
//! | `method`  | String                                                         |
//! | `url`     | String                                                         |
//! | `headers` | Plain object, lower-cased names, repeated headers joined by `, ` |
//! | `body`    | Closed `ReadableStream` holding one `Uint8Array`, or `null`    |
//! | `text()`  | Promise of the body decoded as UTF-8                           |

use boa_engine::{
    Context, JsNativeError, JsObject, JsResult, JsString, JsValue, NativeFunction,
    class::Class,
    js_string,
    object::{
        ObjectInitializer,
        builtins::{JsArrayBuffer, JsDataView, JsTypedArray, JsUint8Array},
    },
    property::{Attribute, PropertyKey},
};
use nano_common::error::{NanoError, Result};
use nano_common::http::RequestData;

use crate::streams::chunk::is_buffer_source;
use crate::streams::readable::{self, ReadableSource, ReadableStream};
use crate::streams::{StreamConfig, resolved_promise};

/// Builds the object passed to the app's `fetch(request)`.
///
/// # Arguments
///
/// * `request` - The incoming request
/// * `ctx` - The app's engine context
///
/// # Returns
///
/// A plain object with `method`, `url`, `headers`, `body` and `text()`.
pub fn request_to_js(request: &RequestData, ctx: &mut Context) -> JsResult<JsValue> {
    let headers = headers_to_js(&request.headers, ctx);

    let body = if request.body.is_empty() {
        JsValue::null()
    } else {
        let config = StreamConfig::current(ctx);
        let stream = readable::create_stream(1.0, config, ReadableSource::None, ctx)?;
        let chunk = bytes_to_uint8_array(&request.body, ctx)?;
        readable::enqueue(&stream, chunk, ctx)?;
        readable::close(&stream, ctx)?;
        ReadableStream::from_data(ReadableStream::from_handle(stream), ctx)?.into()
    };

    let text = JsString::from(String::from_utf8_lossy(&request.body).as_ref());
    let text_fn = NativeFunction::from_copy_closure_with_captures(
        |_this, _args, text: &JsString, context| Ok(resolved_promise(text.clone().into(), context)?.into()),
        text,
    );

    let request = ObjectInitializer::new(ctx)
        .property(js_string!("method"), JsString::from(request.method.as_str()), Attribute::all())
        .property(js_string!("url"), JsString::from(request.url.as_str()), Attribute::all())
        .property(js_string!("headers"), headers, Attribute::all())
        .property(js_string!("body"), body, Attribute::all())
        .function(text_fn, js_string!("text"), 0)
        .build();
    Ok(request.into())
}

/// Lower-cases header names and joins repeated headers with `", "`.
fn merge_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = Vec::with_capacity(headers.len());
    for (name, value) in headers {
        let name = name.to_ascii_lowercase();
        match merged.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, joined)) => {
                joined.push_str(", ");
                joined.push_str(value);
            }
            None => merged.push((name, value.clone())),
        }
    }
    merged
}

fn headers_to_js(headers: &[(String, String)], ctx: &mut Context) -> JsObject {
    let merged = merge_headers(headers);
    let mut object = ObjectInitializer::new(ctx);
    for (name, value) in merged {
        object.property(JsString::from(name.as_str()), JsString::from(value.as_str()), Attribute::all());
    }
    object.build()
}

/// Reads the own string-keyed properties of a headers object.
pub fn headers_from_js(headers: &JsObject, ctx: &mut Context) -> JsResult<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for key in headers.own_property_keys(ctx)? {
        let name = match &key {
            PropertyKey::String(name) => name.to_std_string_lossy(),
            PropertyKey::Index(index) => index.get().to_string(),
            PropertyKey::Symbol(_) => continue,
        };
        let value = headers.get(key, ctx)?;
        if value.is_undefined() {
            continue;
        }
        pairs.push((name, value.to_string(ctx)?.to_std_string_lossy()));
    }
    Ok(pairs)
}

/// Copies `bytes` into a fresh `Uint8Array`.
pub fn bytes_to_uint8_array(bytes: &[u8], ctx: &mut Context) -> JsResult<JsValue> {
    Ok(JsUint8Array::from_iter(bytes.iter().copied(), ctx)?.into())
}

/// Copies the bytes viewed by an ArrayBuffer, TypedArray or DataView.
///
/// Views over a plain `ArrayBuffer` are copied straight from its backing
/// store. `SharedArrayBuffer` memory is not exposed by the engine, so those
/// are read through a `Uint8Array` view instead.
pub fn buffer_source_bytes(source: &JsObject, ctx: &mut Context) -> JsResult<Vec<u8>> {
    let (buffer, offset, length) = if let Ok(typed) = JsTypedArray::from_object(source.clone()) {
        (typed.buffer(ctx)?, typed.byte_offset(ctx)?, typed.byte_length(ctx)?)
    } else if let Ok(view) = JsDataView::from_object(source.clone()) {
        (
            view.buffer(ctx)?,
            usize::try_from(view.byte_offset(ctx)?).unwrap_or(usize::MAX),
            usize::try_from(view.byte_length(ctx)?).unwrap_or(usize::MAX),
        )
    } else if is_buffer_source(source) {
        let length = source.get(js_string!("byteLength"), ctx)?.to_length(ctx)?;
        (source.clone().into(), 0, usize::try_from(length).unwrap_or(usize::MAX))
    } else {
        return Err(JsNativeError::typ()
            .with_message("expected an ArrayBuffer or ArrayBuffer view")
            .into());
    };

    let Some(buffer) = buffer.as_object() else {
        return Err(JsNativeError::typ().with_message("buffer source has no backing buffer").into());
    };

    if let Ok(array_buffer) = JsArrayBuffer::from_object(buffer.clone()) {
        let Some(data) = array_buffer.data() else {
            return Err(JsNativeError::typ().with_message("ArrayBuffer is detached").into());
        };
        let end = offset
            .checked_add(length)
            .filter(|end| *end <= data.len())
            .ok_or_else(|| JsNativeError::range().with_message("buffer view is out of bounds"))?;
        return Ok(data[offset..end].to_vec());
    }

    shared_buffer_bytes(&buffer, offset, length, ctx)
}

fn shared_buffer_bytes(buffer: &JsObject, offset: usize, length: usize, ctx: &mut Context) -> JsResult<Vec<u8>> {
    let constructor = ctx.intrinsics().constructors().typed_uint8_array().constructor();
    let view = constructor.construct(
        &[buffer.clone().into(), JsValue::new(offset as f64), JsValue::new(length as f64)],
        None,
        ctx,
    )?;

    let mut bytes = Vec::with_capacity(length);
    for index in 0..length {
        bytes.push(view.get(index, ctx)?.to_uint8(ctx)?);
    }
    Ok(bytes)
}

/// Bytes of one response body chunk: strings are UTF-8 encoded, buffer
/// sources copied. Anything else is a shape error.
pub fn body_chunk_bytes(chunk: &JsValue, ctx: &mut Context) -> Result<Vec<u8>> {
    if let Some(text) = chunk.as_string() {
        return Ok(text.to_std_string_lossy().into_bytes());
    }
    if let Some(object) = chunk.as_object() {
        if is_buffer_source(&object) {
            return buffer_source_bytes(&object, ctx)
                .map_err(|e| NanoError::JavaScriptExecution(format!("Failed to read body chunk: {}", e)));
        }
    }
    Err(NanoError::Shape(format!(
        "response body chunks must be strings or buffer sources, got {}",
        chunk.display()
    )))
}

/// The string form of a script value, as used for error responses.
///
/// Falls back to the engine's display form when `toString` itself throws.
pub fn value_to_string(value: &JsValue, ctx: &mut Context) -> String {
    match value.to_string(ctx) {
        Ok(text) => text.to_std_string_lossy(),
        Err(_) => value.display().to_string(),
    }
}
