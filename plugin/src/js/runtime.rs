use std::rc::Rc;

use boa_engine::{Context, JsResult, JsValue, Source};
use boa_runtime::extensions::{ConsoleExtension, MicrotaskExtension};

use crate::js::native::register_socket_functions;
use crate::js::shim::{EXT_PRELUDE, WEBSOCKET_SHIM};
use crate::websocket::{ConnectionRegistry, ScriptEvent};

/// The script side of the emulated WebSockets.
///
/// Not `Send`: it is created by and stays with the [`Dispatcher`](crate::Dispatcher)
/// on the event-loop thread.
pub struct ScriptRuntime {
    context: Context,
}

impl ScriptRuntime {
    pub fn new(registry: Rc<ConnectionRegistry>) -> JsResult<Self> {
        let mut context = Context::builder().build()?;

        boa_runtime::register(
            (ConsoleExtension::default(), MicrotaskExtension {}),
            None,
            &mut context,
        )?;

        register_socket_functions(&mut context, registry)?;
        context.eval(Source::from_bytes(EXT_PRELUDE.as_bytes()))?;
        context.eval(Source::from_bytes(WEBSOCKET_SHIM.as_bytes()))?;

        log::info!("Script runtime initialized");
        Ok(Self { context })
    }

    /// Evaluate a script, then run the jobs it queued.
    pub fn eval(&mut self, source: &str) -> JsResult<JsValue> {
        let value = self.context.eval(Source::from_bytes(source.as_bytes()));
        self.run_jobs();
        value
    }

    /// Evaluate a script and convert the result to a string.
    pub fn eval_string(&mut self, source: &str) -> JsResult<String> {
        let value = self.eval(source)?;
        Ok(value.to_string(&mut self.context)?.to_std_string_escaped())
    }

    /// Raise `event` on its `_wsExt` channel.
    pub fn deliver(&mut self, event: &ScriptEvent) -> JsResult<()> {
        let payload = match event {
            ScriptEvent::Open(id) | ScriptEvent::Close(id) => {
                serde_json::json!([event.channel(), id.get()])
            }
            ScriptEvent::Message(id, data) => serde_json::json!([event.channel(), id.get(), data]),
        };

        log::debug!("[WebSocket {}] dispatching {} to script", event.id(), event.channel());
        let script = format!("__ws_ext_dispatch({});", payload);
        self.context.eval(Source::from_bytes(script.as_bytes()))?;
        Ok(())
    }

    /// Run pending promise jobs.
    pub fn run_jobs(&mut self) {
        if let Err(e) = self.context.run_jobs() {
            log::error!("Error running script jobs: {}", e);
        }
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }
}
