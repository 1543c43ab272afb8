//! Chunk sizing for buffer accounting.
//!
//! Text is measured in UTF-8 encoded bytes and binary data by its
//! `byteLength`. Everything else (numbers, plain objects, `undefined`, ...)
//! is charged a fixed estimate, since its real footprint in the engine heap is
//! not observable from here.

use boa_engine::{
    Context, JsObject, JsResult, JsValue, js_string,
    object::builtins::{JsArrayBuffer, JsDataView, JsSharedArrayBuffer, JsTypedArray},
};

/// Size charged for chunks that are neither text nor binary data.
pub const OPAQUE_CHUNK_ESTIMATE: usize = 1024;

/// Returns the number of bytes `chunk` counts against a stream's buffer limit.
pub fn chunk_size(chunk: &JsValue, context: &mut Context) -> JsResult<usize> {
    if let Some(text) = chunk.as_string() {
        return Ok(text.to_std_string_lossy().len());
    }

    if let Some(object) = chunk.as_object() {
        if is_buffer_source(&object) {
            let length = object.get(js_string!("byteLength"), context)?.to_length(context)?;
            return Ok(usize::try_from(length).unwrap_or(usize::MAX));
        }
    }

    Ok(OPAQUE_CHUNK_ESTIMATE)
}

/// Whether `object` is an ArrayBuffer, SharedArrayBuffer, TypedArray or DataView.
pub(crate) fn is_buffer_source(object: &JsObject) -> bool {
    JsArrayBuffer::from_object(object.clone()).is_ok()
        || JsSharedArrayBuffer::from_object(object.clone()).is_ok()
        || JsTypedArray::from_object(object.clone()).is_ok()
        || JsDataView::from_object(object.clone()).is_ok()
}
