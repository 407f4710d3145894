use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::{Duration, Instant};

use webview_dispatch::{
    DispatchConfig, Dispatcher, Handler, Host, Intercept, LoopThread, Message, ReplyEvent,
    ReplyId, Request, Status,
};

/// Streams numbered chunks from a worker thread, like a slow backend.
struct Ticker {
    chunks: usize,
}

impl Handler for Ticker {
    fn on_request(&mut self, mut request: Request) {
        let chunks = self.chunks;
        thread::spawn(move || {
            request
                .respond(Status::new(200), Message::new().header("Content-Type", "text/plain").unwrap())
                .unwrap();
            for i in 0..chunks {
                thread::sleep(Duration::from_millis(5));
                request.write(format!("tick {}\n", i)).unwrap();
            }
            request.close().unwrap();
        });
    }
}

struct Forward(Sender<Request>);

impl Handler for Forward {
    fn on_request(&mut self, request: Request) {
        self.0.send(request).unwrap();
    }
}

fn config() -> DispatchConfig {
    DispatchConfig::new().with_script_runtime(false)
}

fn get(host: &LoopThread, url: &'static str) -> ReplyId {
    let outcome = host
        .call(move |dispatcher: &mut Dispatcher| {
            dispatcher.intercept("GET", url, Vec::<(String, String)>::new(), None)
        })
        .unwrap()
        .unwrap();
    match outcome {
        Intercept::Local(id) => id,
        Intercept::PassThrough => panic!("{} was not intercepted", url),
    }
}

/// Poll the reply like an engine would until it finishes.
fn read_to_end(host: &LoopThread, id: ReplyId) -> (Vec<u8>, Vec<ReplyEvent>) {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut body = Vec::new();
    let mut events = Vec::new();

    while !events.contains(&ReplyEvent::Finished) {
        assert!(Instant::now() < deadline, "reply did not finish in time");
        let (bytes, new_events) = host
            .call(move |dispatcher: &mut Dispatcher| {
                let mut bytes = Vec::new();
                while let Some(chunk) = dispatcher.read(id, 4) {
                    bytes.extend(chunk);
                }
                (bytes, dispatcher.take_events(id))
            })
            .unwrap();
        body.extend(bytes);
        events.extend(new_events);
        thread::sleep(Duration::from_millis(1));
    }
    (body, events)
}

#[test]
fn worker_thread_streams_into_the_reply() {
    let host = LoopThread::spawn(Ticker { chunks: 5 }, config()).unwrap();
    let id = get(&host, "http://app.local/ticks");

    let (body, events) = read_to_end(&host, id);
    let expected: String = (0..5).map(|i| format!("tick {}\n", i)).collect();
    assert_eq!(String::from_utf8(body).unwrap(), expected);
    assert_eq!(events.first(), Some(&ReplyEvent::MetaDataReady));
    assert_eq!(
        events.iter().filter(|e| **e == ReplyEvent::Finished).count(),
        1
    );

    let content_type = host
        .call(move |dispatcher: &mut Dispatcher| {
            dispatcher
                .reply(id)
                .and_then(|reply| reply.headers().get("Content-Type").map(str::to_string))
        })
        .unwrap();
    assert_eq!(content_type.as_deref(), Some("text/plain"));
    host.shutdown();
}

#[test]
fn host_close_stops_the_loop() {
    struct CloseSoon;

    impl Handler for CloseSoon {
        fn on_startup(&mut self, host: Host) {
            host.run_after(Duration::from_millis(10), |dispatcher: &mut Dispatcher| {
                dispatcher.request_close();
            });
        }
    }

    let host = LoopThread::spawn(CloseSoon, config()).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !host.is_finished() {
        assert!(Instant::now() < deadline, "loop did not stop");
        thread::sleep(Duration::from_millis(2));
    }
    assert!(host.post(|_| {}).is_err());
    host.join();
}

#[test]
fn run_later_executes_on_the_loop_thread() {
    struct Probe(Sender<bool>);

    impl Handler for Probe {
        fn on_startup(&mut self, host: Host) {
            let loop_thread = thread::current().id();
            let report = self.0.clone();
            host.run_later(move |_dispatcher: &mut Dispatcher| {
                report.send(thread::current().id() == loop_thread).unwrap();
            })
            .unwrap();
        }
    }

    let (sender, receiver) = mpsc::channel();
    let host = LoopThread::spawn(Probe(sender), config()).unwrap();
    assert!(receiver.recv_timeout(Duration::from_secs(5)).unwrap());
    host.shutdown();
}

#[test]
fn calls_fail_after_shutdown() {
    let (sender, _receiver) = mpsc::channel();
    let host = LoopThread::spawn(Forward(sender), config()).unwrap();
    let bridge = host.bridge();
    host.shutdown();
    assert!(bridge.post(|_| {}).is_err());
}

#[tokio::test]
async fn pipe_streams_an_async_source() {
    let (sender, receiver) = mpsc::channel();
    let host = LoopThread::spawn(Forward(sender), config()).unwrap();
    let id = get(&host, "http://app.local/piped");

    let request = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    let chunks = futures_util::stream::iter(vec!["one,", "two,", "three"]);
    request
        .pipe(Status::new(200), Message::new().body("zero,"), chunks)
        .await
        .unwrap();

    let (body, _) = read_to_end(&host, id);
    assert_eq!(body, b"zero,one,two,three");
    host.shutdown();
}

#[tokio::test]
async fn pipe_stops_when_the_engine_aborts() {
    let (sender, receiver) = mpsc::channel();
    let host = LoopThread::spawn(Forward(sender), config()).unwrap();
    let id = get(&host, "http://app.local/piped");
    let request = receiver.recv_timeout(Duration::from_secs(5)).unwrap();

    assert!(host.call(move |dispatcher: &mut Dispatcher| dispatcher.abort(id)).unwrap());

    let chunks = futures_util::stream::iter(vec!["never"]);
    let err = request
        .pipe(Status::new(200), Message::new(), chunks)
        .await
        .unwrap_err();
    assert!(err.is_aborted());
    host.shutdown();
}
