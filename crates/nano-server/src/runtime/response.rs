//! `Response` shim and response-shape extraction
//!
//! Handlers may resolve to an instance of the minimal `Response` class defined
//! here, or to any object with a numeric `status` between 200 and 599 (and
//! optional `headers` and `body`). Everything else is a shape error.

use boa_engine::{
    Context, JsArgs, JsData, JsNativeError, JsObject, JsResult, JsString, JsValue, NativeFunction,
    class::{Class, ClassBuilder},
    js_string,
    object::ObjectInitializer,
    property::Attribute,
};
use boa_gc::{Finalize, Trace};
use nano_common::error::{NanoError, Result};

use crate::runtime::conversions::{buffer_source_bytes, headers_from_js};
use crate::streams::chunk::is_buffer_source;
use crate::streams::readable::{ReadableHandle, ReadableStream};

/// Minimal WHATWG-style `Response`.
#[derive(Trace, Finalize, JsData)]
pub struct Response {
    #[unsafe_ignore_trace]
    status: u16,
    #[unsafe_ignore_trace]
    status_text: String,
    headers: JsObject,
    body: JsValue,
}

impl Response {
    fn this_response<R>(this: &JsValue, read: impl FnOnce(&Response) -> R) -> JsResult<R> {
        if let Some(object) = this.as_object() {
            if let Some(response) = object.downcast_ref::<Response>() {
                return Ok(read(&*response));
            }
        }
        Err(JsNativeError::typ().with_message("'this' is not a Response").into())
    }

    fn status(this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
        Self::this_response(this, |response| JsValue::new(i32::from(response.status)))
    }

    fn status_text(this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
        Self::this_response(this, |response| JsString::from(response.status_text.as_str()).into())
    }

    fn ok(this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
        Self::this_response(this, |response| (200..=299).contains(&response.status).into())
    }

    fn headers(this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
        Self::this_response(this, |response| response.headers.clone().into())
    }

    fn body(this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
        Self::this_response(this, |response| response.body.clone())
    }
}

impl Class for Response {
    const NAME: &'static str = "Response";
    const LENGTH: usize = 0;

    fn init(class: &mut ClassBuilder<'_>) -> JsResult<()> {
        let realm = class.context().realm().clone();
        let getters = [
            (js_string!("status"), NativeFunction::from_fn_ptr(Self::status)),
            (js_string!("statusText"), NativeFunction::from_fn_ptr(Self::status_text)),
            (js_string!("ok"), NativeFunction::from_fn_ptr(Self::ok)),
            (js_string!("headers"), NativeFunction::from_fn_ptr(Self::headers)),
            (js_string!("body"), NativeFunction::from_fn_ptr(Self::body)),
        ];
        for (name, getter) in getters {
            class.accessor(name, Some(getter.to_js_function(&realm)), None, Attribute::CONFIGURABLE);
        }
        Ok(())
    }

    fn data_constructor(_new_target: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<Self> {
        let body = match args.get_or_undefined(0) {
            value if value.is_undefined() => JsValue::null(),
            value => value.clone(),
        };

        let mut status = 200;
        let mut status_text = String::new();
        let mut headers = Vec::new();

        if let Some(init) = args.get_or_undefined(1).as_object() {
            let value = init.get(js_string!("status"), context)?;
            if !value.is_undefined() {
                let number = value.to_number(context)?;
                if number.fract() != 0.0 || !(200.0..=599.0).contains(&number) {
                    return Err(JsNativeError::range()
                        .with_message(format!("Response status {number} is outside 200..=599"))
                        .into());
                }
                status = number as u16;
            }

            let value = init.get(js_string!("statusText"), context)?;
            if !value.is_undefined() {
                status_text = value.to_string(context)?.to_std_string_lossy();
            }

            if let Some(object) = init.get(js_string!("headers"), context)?.as_object() {
                headers = headers_from_js(&object, context)?;
            }
        }

        for (name, _) in &mut headers {
            name.make_ascii_lowercase();
        }
        if body.is_string() && !headers.iter().any(|(name, _)| name == "content-type") {
            headers.push(("content-type".into(), "text/plain;charset=UTF-8".into()));
        }

        let mut object = ObjectInitializer::new(context);
        for (name, value) in &headers {
            object.property(JsString::from(name.as_str()), JsString::from(value.as_str()), Attribute::all());
        }
        let headers = object.build();

        Ok(Self {
            status,
            status_text,
            headers,
            body,
        })
    }
}

// ============================================================================
// Shape extraction
// ============================================================================

/// A response body before it is reduced to bytes.
pub(crate) enum ResponseBody {
    Bytes(Vec<u8>),
    /// Drained by the caller under the request's budget.
    Stream(ReadableHandle),
}

pub(crate) struct ResponseParts {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

/// Reduces a handler's fulfilment value to its status, headers and body.
///
/// # Errors
///
/// Returns [`NanoError::Shape`] when `value` is not Response-shaped, and
/// [`NanoError::JavaScriptExecution`] when reading its properties throws.
pub(crate) fn response_parts(value: &JsValue, context: &mut Context) -> Result<ResponseParts> {
    let js_err = |e: boa_engine::JsError| NanoError::JavaScriptExecution(e.to_string());

    let Some(object) = value.as_object() else {
        return Err(NanoError::Shape(value.display().to_string()));
    };

    let shim = object
        .downcast_ref::<Response>()
        .map(|response| (response.status, response.headers.clone(), response.body.clone()));

    let (status, headers, body) = match shim {
        Some((status, headers, body)) => {
            let headers = headers_from_js(&headers, context).map_err(js_err)?;
            (status, headers, body)
        }
        None => {
            let status = object.get(js_string!("status"), context).map_err(js_err)?;
            let status = status
                .as_number()
                .filter(|n| n.fract() == 0.0 && (200.0..=599.0).contains(n))
                .map(|n| n as u16)
                .ok_or_else(|| NanoError::Shape("object without a status in 200..=599".into()))?;

            let headers = match object.get(js_string!("headers"), context).map_err(js_err)?.as_object() {
                Some(headers) => headers_from_js(&headers, context).map_err(js_err)?,
                None => Vec::new(),
            };
            let body = object.get(js_string!("body"), context).map_err(js_err)?;
            (status, headers, body)
        }
    };

    let body = body_source(&body, context)?;
    Ok(ResponseParts { status, headers, body })
}

fn body_source(body: &JsValue, context: &mut Context) -> Result<ResponseBody> {
    if body.is_null_or_undefined() {
        return Ok(ResponseBody::Bytes(Vec::new()));
    }
    if let Some(text) = body.as_string() {
        return Ok(ResponseBody::Bytes(text.to_std_string_lossy().into_bytes()));
    }
    if let Some(object) = body.as_object() {
        if let Some(stream) = object.downcast_ref::<ReadableStream>() {
            return Ok(ResponseBody::Stream(stream.handle().clone()));
        }
        if is_buffer_source(&object) {
            let bytes = buffer_source_bytes(&object, context)
                .map_err(|e| NanoError::JavaScriptExecution(e.to_string()))?;
            return Ok(ResponseBody::Bytes(bytes));
        }
    }
    let text = body
        .to_string(context)
        .map_err(|e| NanoError::JavaScriptExecution(e.to_string()))?;
    Ok(ResponseBody::Bytes(text.to_std_string_lossy().into_bytes()))
}
