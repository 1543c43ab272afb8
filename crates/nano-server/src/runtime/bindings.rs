//! JavaScript bindings for NANO apps
//!
//! This module is the single place where host functionality is exposed to the
//! engine. Every app context gets:
//!
//! - The stream classes (`ReadableStream`, `WritableStream`, `TransformStream`
//!   and their controllers, readers and writers)
//! - A minimal `Response` class
//! - `console.log/info/debug/warn/error`, forwarded to `tracing` under the
//!   `nano::console` target

use boa_engine::{
    Context, JsResult, JsValue, js_string, native_function::NativeFunction,
    object::ObjectInitializer, property::Attribute,
};
use nano_common::error::{NanoError, Result};

use crate::runtime::response::Response;
use crate::streams::{StreamConfig, install_stream_api};

/// Install all NANO bindings into the Boa context.
///
/// # Arguments
///
/// * `ctx` - The app's engine context
/// * `config` - Stream settings for this app, recorded in the realm
///
/// # Errors
///
/// Returns [`NanoError::Script`] if any global cannot be registered.
pub(crate) fn install_bindings(ctx: &mut Context, config: StreamConfig) -> Result<()> {
    let js_err = |e: boa_engine::JsError| NanoError::Script(format!("Failed to install bindings: {}", e));

    install_stream_api(ctx, config).map_err(js_err)?;
    ctx.register_global_class::<Response>().map_err(js_err)?;
    install_console(ctx).map_err(js_err)?;
    Ok(())
}

fn install_console(ctx: &mut Context) -> JsResult<()> {
    let console = ObjectInitializer::new(ctx)
        .function(NativeFunction::from_fn_ptr(console_log), js_string!("log"), 0)
        .function(NativeFunction::from_fn_ptr(console_info), js_string!("info"), 0)
        .function(NativeFunction::from_fn_ptr(console_debug), js_string!("debug"), 0)
        .function(NativeFunction::from_fn_ptr(console_warn), js_string!("warn"), 0)
        .function(NativeFunction::from_fn_ptr(console_error), js_string!("error"), 0)
        .build();

    ctx.register_global_property(js_string!("console"), console, Attribute::all())
}

/// Joins console arguments the way browsers print them: strings verbatim,
/// everything else in its display form.
fn format_args(args: &[JsValue]) -> String {
    args.iter()
        .map(|arg| match arg.as_string() {
            Some(text) => text.to_std_string_lossy(),
            None => arg.display().to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn console_log(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    tracing::info!(target: "nano::console", "{}", format_args(args));
    Ok(JsValue::undefined())
}

fn console_info(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    tracing::info!(target: "nano::console", "{}", format_args(args));
    Ok(JsValue::undefined())
}

fn console_debug(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    tracing::debug!(target: "nano::console", "{}", format_args(args));
    Ok(JsValue::undefined())
}

fn console_warn(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    tracing::warn!(target: "nano::console", "{}", format_args(args));
    Ok(JsValue::undefined())
}

fn console_error(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    tracing::error!(target: "nano::console", "{}", format_args(args));
    Ok(JsValue::undefined())
}
