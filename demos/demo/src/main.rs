use std::time::Duration;

use bevy::log::LogPlugin;
use bevy::prelude::*;
use webview_dispatch::{
    DispatchConfig, DispatchLoop, DispatchPlugin, Dispatcher, Handler, Host, Intercept, ReplyEvent,
    ReplyId, Request, WebSocket,
};

const START_URL: &str = "http://foo/";

/// Serves one page and echoes every WebSocket frame back with a prefix.
struct ExampleHandler;

impl Handler for ExampleHandler {
    fn on_startup(&mut self, host: Host) {
        host.run_after(Duration::from_secs(3), |dispatcher: &mut Dispatcher| {
            dispatcher.request_close();
        });
    }

    fn on_request(&mut self, mut request: Request) {
        let page = format!(
            "<html><body><a href=\"foo\">requested {}</a></body></html>",
            request.path()
        );
        if let Err(e) = request.found(page, "text/html") {
            log::warn!("Failed to answer {}: {}", request.url(), e);
        }
    }

    fn on_connect(&mut self, socket: WebSocket) {
        log::info!("Websocket connect {:?}", socket);
        if let Err(e) = socket.connected() {
            log::warn!("Failed to accept {:?}: {}", socket, e);
        }
    }

    fn on_receive(&mut self, socket: WebSocket, data: String) {
        log::info!("Websocket recv {:?} {}", socket, data);
        if let Err(e) = socket.send(format!("my{}", data)) {
            log::warn!("Echo failed: {}", e);
        }
    }

    fn on_close(&mut self, socket: WebSocket) {
        log::info!("Websocket closed {:?}", socket);
    }
}

/// Stand-in for the embedded engine's page load.
#[derive(Default)]
struct PageLoad {
    reply: Option<ReplyId>,
    body: Vec<u8>,
}

fn main() {
    App::new()
        .add_plugins((MinimalPlugins, LogPlugin::default()))
        .add_plugins(DispatchPlugin::new(ExampleHandler, DispatchConfig::default()))
        .insert_non_send_resource(PageLoad::default())
        .add_systems(Startup, load_page)
        .add_systems(Update, poll_page)
        .run();
}

fn load_page(mut dispatch: NonSendMut<DispatchLoop>, mut page: NonSendMut<PageLoad>) {
    let dispatcher = dispatch.dispatcher_mut();
    match dispatcher.intercept("GET", START_URL, [("Accept", "text/html")], None) {
        Ok(Intercept::Local(id)) => page.reply = Some(id),
        Ok(Intercept::PassThrough) => log::info!("{} goes to the network", START_URL),
        Err(e) => log::error!("Failed to load {}: {}", START_URL, e),
    }

    if let Some(script) = dispatcher.script_mut() {
        let result = script.eval(
            r#"
            var ws = new WebSocket("ws://echo.local");
            ws.onopen = function() { console.log("websocket opened"); ws.send("echo"); };
            ws.onmessage = function(m) { console.log("websocket message " + m.data); };
            "#,
        );
        if let Err(e) = result {
            log::error!("Page script failed: {}", e);
        }
    }
}

fn poll_page(mut dispatch: NonSendMut<DispatchLoop>, mut page: NonSendMut<PageLoad>) {
    let Some(id) = page.reply else {
        return;
    };

    let dispatcher = dispatch.dispatcher_mut();
    while let Some(bytes) = dispatcher.read(id, 1024) {
        page.body.extend(bytes);
    }

    if dispatcher.take_events(id).contains(&ReplyEvent::Finished) {
        log::info!("Loaded {}: {}", START_URL, String::from_utf8_lossy(&page.body));
        dispatcher.release(id);
        page.reply = None;
    }
}
