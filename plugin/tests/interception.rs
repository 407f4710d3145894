use std::sync::mpsc::{self, Receiver, Sender};

use webview_dispatch::{
    DispatchConfig, Dispatcher, EventLoop, Handler, Intercept, Message, ReplyEvent, ReplyId,
    ReplyState, Request, Status,
};

/// Hands every request to the test thread.
struct Forward(Sender<Request>);

impl Handler for Forward {
    fn on_request(&mut self, request: Request) {
        self.0.send(request).unwrap();
    }
}

/// Answers `GET /a` with a 404.
struct Missing;

impl Handler for Missing {
    fn on_request(&mut self, mut request: Request) {
        assert_eq!(request.path(), "/a");
        request
            .respond(Status::new(404), Message::new().body("missing"))
            .unwrap();
    }
}

fn engine(handler: impl Handler) -> (EventLoop<Dispatcher>, Dispatcher) {
    let event_loop = EventLoop::new();
    let config = DispatchConfig::new().with_script_runtime(false);
    let mut dispatcher = Dispatcher::new(event_loop.bridge(), config);
    dispatcher.set_handler(handler);
    (event_loop, dispatcher)
}

fn get(dispatcher: &mut Dispatcher, url: &str) -> ReplyId {
    match dispatcher
        .intercept("GET", url, Vec::<(String, String)>::new(), None)
        .unwrap()
    {
        Intercept::Local(id) => id,
        Intercept::PassThrough => panic!("{} was not intercepted", url),
    }
}

fn forwarding() -> (EventLoop<Dispatcher>, Dispatcher, Receiver<Request>) {
    let (sender, receiver) = mpsc::channel();
    let (event_loop, dispatcher) = engine(Forward(sender));
    (event_loop, dispatcher, receiver)
}

fn read_all(dispatcher: &mut Dispatcher, id: ReplyId, chunk: usize) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(bytes) = dispatcher.read(id, chunk) {
        out.extend(bytes);
    }
    out
}

#[test]
fn not_found_scenario() {
    let (mut event_loop, mut dispatcher) = engine(Missing);
    let id = get(&mut dispatcher, "http://app.local/a");
    event_loop.run_pending(&mut dispatcher);

    let reply = dispatcher.reply(id).unwrap();
    let status = reply.status().unwrap();
    assert_eq!(status.code(), 404);
    assert_eq!(status.reason(), "Not Found");
    assert_eq!(reply.content_length(), Some(7));
    assert_eq!(read_all(&mut dispatcher, id, 2), b"missing");
    assert_eq!(
        dispatcher.take_events(id).last(),
        Some(&ReplyEvent::Finished)
    );
}

#[test]
fn unanswered_request_never_finishes() {
    let (mut event_loop, mut dispatcher, requests) = forwarding();
    let id = get(&mut dispatcher, "http://app.local/slow");
    event_loop.run_pending(&mut dispatcher);
    let _request = requests.try_recv().unwrap();

    for _ in 0..3 {
        event_loop.run_pending(&mut dispatcher);
        assert_eq!(dispatcher.bytes_available(id), 0);
        assert_eq!(dispatcher.read(id, 16), None);
        assert_eq!(dispatcher.reply(id).unwrap().state(), ReplyState::Pending);
    }
    assert!(dispatcher.take_events(id).is_empty());
}

#[test]
fn content_length_matches_body() {
    let (mut event_loop, mut dispatcher, requests) = forwarding();
    let ids: Vec<ReplyId> = (0..3)
        .map(|i| get(&mut dispatcher, &format!("http://app.local/{}", i)))
        .collect();
    event_loop.run_pending(&mut dispatcher);

    for (n, mut request) in [0usize, 1, 4096].into_iter().zip(requests.try_iter()) {
        request
            .respond(Status::default(), Message::new().body(vec![b'x'; n]))
            .unwrap();
    }
    event_loop.run_pending(&mut dispatcher);

    for (id, n) in ids.into_iter().zip([0u64, 1, 4096]) {
        let reply = dispatcher.reply(id).unwrap();
        assert_eq!(reply.content_length(), Some(n));
        assert_eq!(reply.headers().get("Content-Length"), Some(n.to_string().as_str()));
    }
}

#[test]
fn streamed_chunks_round_trip_once() {
    let (mut event_loop, mut dispatcher, requests) = forwarding();
    let id = get(&mut dispatcher, "http://app.local/stream");
    event_loop.run_pending(&mut dispatcher);
    let mut request = requests.try_recv().unwrap();

    let chunks = ["alpha", "", "beta", "gamma-delta", "e"];
    request.respond(Status::default(), Message::new()).unwrap();

    let mut received = Vec::new();
    let mut events = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        request.write(*chunk).unwrap();
        event_loop.run_pending(&mut dispatcher);
        received.extend(read_all(&mut dispatcher, id, i + 1));
        events.extend(dispatcher.take_events(id));
    }
    request.close().unwrap();
    event_loop.run_pending(&mut dispatcher);
    events.extend(dispatcher.take_events(id));

    assert_eq!(received, chunks.concat().as_bytes());
    assert_eq!(
        events.iter().filter(|e| **e == ReplyEvent::Finished).count(),
        1
    );
    assert_eq!(events.last(), Some(&ReplyEvent::Finished));
    assert_eq!(read_all(&mut dispatcher, id, 8), b"");
}

#[test]
fn abort_scenario() {
    let (mut event_loop, mut dispatcher, requests) = forwarding();
    let id = get(&mut dispatcher, "http://app.local/stream");
    event_loop.run_pending(&mut dispatcher);
    let mut request = requests.try_recv().unwrap();

    request.respond(Status::default(), Message::new()).unwrap();
    request.write("chunk").unwrap();
    event_loop.run_pending(&mut dispatcher);
    dispatcher.take_events(id);

    assert!(dispatcher.abort(id));
    assert_eq!(dispatcher.take_events(id), vec![ReplyEvent::Aborted]);

    assert!(request.write("more").unwrap_err().is_aborted());
    assert!(request.close().unwrap_err().is_aborted());
    event_loop.run_pending(&mut dispatcher);
    assert!(dispatcher.take_events(id).is_empty());
    assert_eq!(dispatcher.bytes_available(id), 0);
}

#[test]
fn write_racing_abort_is_discarded() {
    let (mut event_loop, mut dispatcher, requests) = forwarding();
    let id = get(&mut dispatcher, "http://app.local/stream");
    event_loop.run_pending(&mut dispatcher);
    let mut request = requests.try_recv().unwrap();

    request.respond(Status::default(), Message::new()).unwrap();
    // posted before the engine aborts, applied after
    request.write("late").unwrap();
    assert!(dispatcher.abort(id));
    event_loop.run_pending(&mut dispatcher);

    assert_eq!(dispatcher.read(id, 16), None);
    assert_eq!(dispatcher.take_events(id), vec![ReplyEvent::Aborted]);
}

#[test]
fn unhandled_requests_pass_through() {
    struct LocalOnly;
    impl Handler for LocalOnly {
        fn intercepts(&self, _method: &webview_dispatch::Method, url: &url::Url) -> bool {
            url.host_str() == Some("app.local")
        }
    }

    let (_event_loop, mut dispatcher) = engine(LocalOnly);
    let outcome = dispatcher
        .intercept("GET", "https://example.com/", Vec::<(String, String)>::new(), None)
        .unwrap();
    assert_eq!(outcome, Intercept::PassThrough);

    let event_loop = EventLoop::new();
    let mut bare = Dispatcher::new(
        event_loop.bridge(),
        DispatchConfig::new().with_script_runtime(false),
    );
    let outcome = bare
        .intercept("GET", "http://app.local/a", Vec::<(String, String)>::new(), None)
        .unwrap();
    assert_eq!(outcome, Intercept::PassThrough);
}

#[test]
fn request_body_is_copied_into_the_message() {
    let (mut event_loop, mut dispatcher, requests) = forwarding();
    let mut body = b"payload".to_vec();
    dispatcher
        .intercept(
            "POST",
            "http://app.local/submit",
            [("Content-Type", "text/plain")],
            Some(body.as_slice()),
        )
        .unwrap();
    body.clear();
    event_loop.run_pending(&mut dispatcher);

    let request = requests.try_recv().unwrap();
    assert_eq!(request.method(), &webview_dispatch::Method::Post);
    assert_eq!(request.message().body_bytes(), Some(&b"payload"[..]));
}

#[test]
fn non_text_header_is_rejected() {
    let (_event_loop, mut dispatcher, _requests) = forwarding();
    let err = dispatcher
        .intercept(
            "GET",
            "http://app.local/",
            [("X-Raw", vec![0xc3u8, 0x28])],
            None,
        )
        .unwrap_err();
    assert!(matches!(err, webview_dispatch::DispatchError::Message(_)));
    assert_eq!(dispatcher.live_replies(), 0);
}
