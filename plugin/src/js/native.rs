//! Native functions behind `_wsExt`.

use std::rc::Rc;

use boa_engine::{Context, JsError, JsNativeError, JsResult, JsString, JsValue, NativeFunction};
use boa_gc::{Finalize, Trace, empty_trace};

use crate::websocket::{ConnectionId, ConnectionRegistry};

/// Registry handle captured by the native closures.
#[derive(Clone, Finalize)]
struct SocketCaptures {
    registry: Rc<ConnectionRegistry>,
}

// The registry holds no GC-managed values.
unsafe impl Trace for SocketCaptures {
    empty_trace!();
}

/// Register `__ws_connect`, `__ws_send_to_server` and `__ws_client_close`.
pub(crate) fn register_socket_functions(
    context: &mut Context,
    registry: Rc<ConnectionRegistry>,
) -> JsResult<()> {
    let captures = SocketCaptures { registry };

    // __ws_connect(url: string) -> number
    context.register_global_callable(
        JsString::from("__ws_connect"),
        1,
        NativeFunction::from_copy_closure_with_captures(
            |_this: &JsValue, args: &[JsValue], captures: &SocketCaptures, ctx: &mut Context| {
                let url = string_arg(args, 0, ctx)?;
                let id = captures.registry.connect(&url);
                Ok(JsValue::from(id.get()))
            },
            captures.clone(),
        ),
    )?;

    // __ws_send_to_server(id: number, data: string) -> void
    context.register_global_callable(
        JsString::from("__ws_send_to_server"),
        2,
        NativeFunction::from_copy_closure_with_captures(
            |_this: &JsValue, args: &[JsValue], captures: &SocketCaptures, ctx: &mut Context| {
                let id = id_arg(args, ctx)?;
                let data = string_arg(args, 1, ctx)?;
                captures
                    .registry
                    .send_to_server(id, data)
                    .map_err(to_js_error)?;
                Ok(JsValue::undefined())
            },
            captures.clone(),
        ),
    )?;

    // __ws_client_close(id: number) -> void
    context.register_global_callable(
        JsString::from("__ws_client_close"),
        1,
        NativeFunction::from_copy_closure_with_captures(
            |_this: &JsValue, args: &[JsValue], captures: &SocketCaptures, ctx: &mut Context| {
                let id = id_arg(args, ctx)?;
                captures.registry.client_close(id).map_err(to_js_error)?;
                Ok(JsValue::undefined())
            },
            captures,
        ),
    )?;

    log::debug!("Registered WebSocket native functions");
    Ok(())
}

fn id_arg(args: &[JsValue], ctx: &mut Context) -> JsResult<ConnectionId> {
    let id = args
        .first()
        .cloned()
        .unwrap_or_else(JsValue::undefined)
        .to_u32(ctx)?;
    Ok(ConnectionId::from_raw(id))
}

fn string_arg(args: &[JsValue], index: usize, ctx: &mut Context) -> JsResult<String> {
    match args.get(index) {
        Some(value) => Ok(value.to_string(ctx)?.to_std_string_escaped()),
        None => Err(JsError::from_native(
            JsNativeError::typ().with_message(format!("missing argument {}", index)),
        )),
    }
}

fn to_js_error(e: impl std::fmt::Display) -> JsError {
    JsError::from_native(JsNativeError::error().with_message(e.to_string()))
}
