/*
 * http_engine.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * Integration tests for the HTTP control socket. Engines run against
 * scripted in-memory connections (tokio duplex pipes), so connection reuse,
 * handshake counts, ordering, and teardown are all observable and the suite
 * is deterministic without network access.
 */

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

use traghetto_core::net::{Connector, HttpStream};
use traghetto_core::protocol::http::{
    BufferWriter, ConnectDecision, FileTransferCommand, HeaderDecision, HttpControlSocket,
    HttpError, HttpPair, HttpRequest, HttpRequestResponse, HttpResponse, Method, PairHandle,
    ProtocolPair, RequestThrottler,
};
use traghetto_core::server::{Credentials, Server};
use traghetto_core::uri::Uri;

/// One scripted connection = the responses served over it, in order. After
/// the last response the server half closes.
type Script = Vec<Vec<u8>>;

#[derive(Clone)]
struct ScriptedConnector {
    connections: Arc<Mutex<VecDeque<Script>>>,
    connects: Arc<AtomicUsize>,
    /// "request" / "response" events in arrival order, across the whole run.
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl ScriptedConnector {
    fn new(connections: Vec<Script>) -> Self {
        Self {
            connections: Arc::new(Mutex::new(connections.into())),
            connects: Arc::new(AtomicUsize::new(0)),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Connector for ScriptedConnector {
    async fn connect(&mut self, _host: &str, _port: u16, _secure: bool) -> io::Result<HttpStream> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let script = self
            .connections
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionRefused, "no more scripts"))?;
        let (client, server) = duplex(256 * 1024);
        let log = Arc::clone(&self.log);
        tokio::spawn(serve(server, script, log));
        Ok(HttpStream::Mem(client))
    }
}

/// Read one request head (tests never send request bodies), then write the
/// next scripted response; close when the script runs out.
async fn serve(mut stream: DuplexStream, script: Script, log: Arc<Mutex<Vec<&'static str>>>) {
    for response in script {
        let mut head = Vec::new();
        let mut tmp = [0u8; 4096];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut tmp).await {
                Ok(0) | Err(_) => return,
                Ok(n) => head.extend_from_slice(&tmp[..n]),
            }
        }
        log.lock().unwrap().push("request");
        if stream.write_all(&response).await.is_err() {
            return;
        }
        log.lock().unwrap().push("response");
    }
}

fn response_bytes(status_line: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("{}\r\n", status_line);
    for (name, value) in headers {
        out.push_str(&format!("{}: {}\r\n", name, value));
    }
    out.push_str("\r\n");
    let mut out = out.into_bytes();
    out.extend_from_slice(body);
    out
}

fn engine(
    connections: Vec<Script>,
) -> (
    HttpControlSocket<ScriptedConnector>,
    ScriptedConnector,
    Arc<RequestThrottler>,
) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let connector = ScriptedConnector::new(connections);
    let throttler = Arc::new(RequestThrottler::new());
    let socket = HttpControlSocket::with_connector(connector.clone(), Arc::clone(&throttler));
    (socket, connector, throttler)
}

/// A GET pair whose response the test can inspect after completion.
fn get_pair(url: &str) -> (PairHandle, Arc<Mutex<HttpPair>>) {
    let request = HttpRequest::new(Method::Get, Uri::parse(url).unwrap());
    pair_for(request, HttpResponse::new())
}

fn pair_for(request: HttpRequest, response: HttpResponse) -> (PairHandle, Arc<Mutex<HttpPair>>) {
    let pair = Arc::new(Mutex::new(ProtocolPair::new(request, response)));
    let handle: Arc<Mutex<dyn HttpRequestResponse>> = pair.clone();
    (PairHandle::Shared(handle), pair)
}

#[tokio::test]
async fn buffered_small_body() {
    let body = b"exactly thirty-seven bytes of payload";
    assert_eq!(body.len(), 37);
    let (mut socket, _, _) = engine(vec![vec![response_bytes(
        "HTTP/1.1 200 OK",
        &[("Content-Length", "37")],
        body,
    )]]);
    let (handle, pair) = get_pair("https://a.example/x");
    socket.request(handle).await.unwrap();

    let pair = pair.lock().unwrap();
    let response = pair.response();
    assert!(response.success());
    assert!(response.got_header());
    assert!(response.got_body());
    assert_eq!(response.body, body);
}

#[tokio::test]
async fn not_modified_has_no_body() {
    let (mut socket, _, _) = engine(vec![vec![response_bytes(
        "HTTP/1.1 304 Not Modified",
        &[],
        b"",
    )]]);
    let writer = BufferWriter::new();
    let written = writer.handle();
    let header_calls = Arc::new(AtomicUsize::new(0));
    let header_calls2 = Arc::clone(&header_calls);

    let mut response = HttpResponse::with_writer(Box::new(writer));
    response.on_header = Some(Box::new(move |_| {
        header_calls2.fetch_add(1, Ordering::SeqCst);
        HeaderDecision::Continue
    }));
    let request = HttpRequest::new(Method::Get, Uri::parse("https://a.example/y").unwrap());
    let (handle, pair) = pair_for(request, response);
    socket.request(handle).await.unwrap();

    let pair = pair.lock().unwrap();
    let response = pair.response();
    assert!(response.no_body());
    assert!(!response.got_body());
    assert!(!response.success());
    assert_eq!(header_calls.load(Ordering::SeqCst), 1);
    // The body sink was never touched.
    assert!(written.lock().unwrap().is_empty());
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn throttle_visible_across_engines() {
    let throttler = Arc::new(RequestThrottler::new());
    let engine_a = HttpControlSocket::new(Arc::clone(&throttler));
    let engine_b = HttpControlSocket::new(Arc::clone(&throttler));

    engine_a
        .throttler()
        .throttle("b.example", std::time::Duration::from_secs(5));
    let seen = engine_b.throttler().get_throttle("b.example");
    assert!(seen > std::time::Duration::from_secs(4));
    assert!(seen <= std::time::Duration::from_secs(5));
}

#[tokio::test]
async fn connection_reuse_single_handshake() {
    let transfer_body = b"file contents";
    let (mut socket, connector, _) = engine(vec![vec![
        response_bytes("HTTP/1.1 200 OK", &[("Content-Length", "2")], b"ok"),
        response_bytes(
            "HTTP/1.1 200 OK",
            &[("Content-Length", "13")],
            transfer_body,
        ),
    ]]);

    let server = Server::new("c.example", 443, true);
    socket
        .connect(&server, &Credentials::anonymous())
        .await
        .unwrap();
    assert!(socket.is_connected());
    assert_eq!(socket.handshake_count(), 1);

    let (handle, _pair) = get_pair("https://c.example/a");
    socket.request(handle).await.unwrap();

    // Identical tuple: reuse, no new handshake.
    let decision = socket
        .internal_connect("c.example", 443, true, true)
        .await
        .unwrap();
    assert_eq!(decision, ConnectDecision::Reuse);

    let writer = BufferWriter::new();
    let written = writer.handle();
    socket
        .file_transfer(FileTransferCommand {
            uri: Uri::parse("https://c.example/file").unwrap(),
            writer: Box::new(writer),
            update_transfer_status: false,
        })
        .await
        .unwrap();

    assert_eq!(written.lock().unwrap().as_slice(), transfer_body);
    assert_eq!(socket.handshake_count(), 1);
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn oversized_body_aborts_connection() {
    // Content-Length above the 16 MiB default: the engine must abort as soon
    // as the buffered byte count crosses the bound.
    let body = vec![0x2eu8; 17_000_000];
    let (mut socket, _, _) = engine(vec![vec![response_bytes(
        "HTTP/1.1 200 OK",
        &[("Content-Length", "17000000")],
        &body,
    )]]);
    let (handle, _pair) = get_pair("https://a.example/big");
    let err = socket.request(handle).await.unwrap_err();
    assert!(matches!(err, HttpError::SizeExceeded));
    assert!(!socket.is_connected());
}

#[tokio::test]
async fn body_exactly_at_limit_succeeds() {
    let body = vec![b'a'; 1024];
    let (mut socket, _, _) = engine(vec![vec![response_bytes(
        "HTTP/1.1 200 OK",
        &[("Content-Length", "1024")],
        &body,
    )]]);
    let request = HttpRequest::new(Method::Get, Uri::parse("http://a.example/fit").unwrap());
    let mut response = HttpResponse::new();
    response.max_body_size = 1024;
    let (handle, pair) = pair_for(request, response);
    socket.request(handle).await.unwrap();
    assert_eq!(pair.lock().unwrap().response().body.len(), 1024);
}

#[tokio::test]
async fn body_one_byte_over_limit_fails() {
    let body = vec![b'a'; 1025];
    let (mut socket, _, _) = engine(vec![vec![response_bytes(
        "HTTP/1.1 200 OK",
        &[("Content-Length", "1025")],
        &body,
    )]]);
    let request = HttpRequest::new(Method::Get, Uri::parse("http://a.example/over").unwrap());
    let mut response = HttpResponse::new();
    response.max_body_size = 1024;
    let (handle, _pair) = pair_for(request, response);
    let err = socket.request(handle).await.unwrap_err();
    assert!(matches!(err, HttpError::SizeExceeded));
    assert!(!socket.is_connected());
}

#[tokio::test]
async fn busy_when_disconnect_forbidden() {
    let (mut socket, _, _) = engine(vec![vec![], vec![]]);
    socket
        .connect(&Server::new("a.example", 80, false), &Credentials::anonymous())
        .await
        .unwrap();

    // Different identity, disconnect forbidden: Busy, and the live
    // connection is untouched.
    let decision = socket
        .internal_connect("b.example", 80, false, false)
        .await
        .unwrap();
    assert_eq!(decision, ConnectDecision::Busy);
    assert_eq!(
        socket.connection_identity(),
        Some(("a.example".to_string(), 80, false))
    );
    assert_eq!(socket.handshake_count(), 1);

    // Same call with disconnect allowed composes a fresh connect.
    let decision = socket
        .internal_connect("b.example", 80, false, true)
        .await
        .unwrap();
    assert_eq!(decision, ConnectDecision::Compose);
    assert_eq!(
        socket.connection_identity(),
        Some(("b.example".to_string(), 80, false))
    );
    assert_eq!(socket.handshake_count(), 2);
}

#[tokio::test]
async fn batch_completes_in_submission_order() {
    let (mut socket, connector, _) = engine(vec![vec![
        response_bytes("HTTP/1.1 200 OK", &[("Content-Length", "6")], b"first!"),
        response_bytes("HTTP/1.1 200 OK", &[("Content-Length", "6")], b"second"),
    ]]);
    let (h1, p1) = get_pair("http://a.example/1");
    let (h2, p2) = get_pair("http://a.example/2");
    socket.request_many(vec![h1, h2]).await.unwrap();

    assert_eq!(p1.lock().unwrap().response().body, b"first!");
    assert_eq!(p2.lock().unwrap().response().body, b"second");
    // The second request only reached the wire after the first response was
    // fully written.
    let log = connector.log.lock().unwrap();
    assert_eq!(*log, vec!["request", "response", "request", "response"]);
}

#[tokio::test]
async fn skip_body_still_consumes_wire() {
    let (mut socket, _, _) = engine(vec![vec![
        response_bytes("HTTP/1.1 200 OK", &[("Content-Length", "5")], b"xxxxx"),
        response_bytes("HTTP/1.1 200 OK", &[("Content-Length", "4")], b"next"),
    ]]);

    let request = HttpRequest::new(Method::Get, Uri::parse("http://a.example/skip").unwrap());
    let mut response = HttpResponse::new();
    response.on_header = Some(Box::new(|_| HeaderDecision::SkipBody));
    let (h1, p1) = pair_for(request, response);
    let (h2, p2) = get_pair("http://a.example/keep");
    socket.request_many(vec![h1, h2]).await.unwrap();

    let p1 = p1.lock().unwrap();
    assert!(!p1.response().got_body());
    assert!(p1.response().body.is_empty());
    // The skipped body was drained from the wire: the next exchange on the
    // same connection parsed cleanly.
    assert_eq!(p2.lock().unwrap().response().body, b"next");
    assert_eq!(socket.handshake_count(), 1);
}

#[tokio::test]
async fn abort_decision_tears_down_connection() {
    let (mut socket, _, _) = engine(vec![vec![response_bytes(
        "HTTP/1.1 200 OK",
        &[("Content-Length", "5")],
        b"xxxxx",
    )]]);
    let request = HttpRequest::new(Method::Get, Uri::parse("http://a.example/abort").unwrap());
    let mut response = HttpResponse::new();
    response.on_header = Some(Box::new(|_| HeaderDecision::Abort));
    let (handle, _pair) = pair_for(request, response);
    let err = socket.request(handle).await.unwrap_err();
    assert!(matches!(err, HttpError::Aborted));
    assert!(!socket.is_connected());
}

#[tokio::test]
async fn chunked_body_is_decoded_before_the_sink() {
    let (mut socket, _, _) = engine(vec![vec![response_bytes(
        "HTTP/1.1 200 OK",
        &[("Transfer-Encoding", "chunked")],
        b"7\r\nchunked\r\n9\r\n transfer\r\n0\r\n\r\n",
    )]]);
    let (handle, pair) = get_pair("http://a.example/chunked");
    socket.request(handle).await.unwrap();
    let pair = pair.lock().unwrap();
    assert_eq!(pair.response().body, b"chunked transfer");
    assert!(pair.response().got_body());
}

#[tokio::test]
async fn close_terminated_body() {
    // No Content-Length, no chunked framing: the body ends when the peer
    // closes, and the connection is gone afterwards.
    let (mut socket, _, _) = engine(vec![vec![response_bytes(
        "HTTP/1.1 200 OK",
        &[],
        b"until close",
    )]]);
    let (handle, pair) = get_pair("http://a.example/stream");
    socket.request(handle).await.unwrap();
    let pair = pair.lock().unwrap();
    assert!(pair.response().success());
    assert_eq!(pair.response().body, b"until close");
    assert!(pair.response().got_body());
    assert!(!socket.is_connected());
}

#[tokio::test]
async fn head_response_ignores_framing_headers() {
    let (mut socket, _, _) = engine(vec![vec![response_bytes(
        "HTTP/1.1 200 OK",
        &[("Content-Length", "10")],
        b"",
    )]]);
    let request = HttpRequest::new(Method::Head, Uri::parse("http://a.example/head").unwrap());
    let (handle, pair) = pair_for(request, HttpResponse::new());
    socket.request(handle).await.unwrap();
    let pair = pair.lock().unwrap();
    assert!(pair.response().success());
    assert!(pair.response().no_body());
    assert!(!pair.response().got_body());
}

#[tokio::test]
async fn malformed_credentials_fail_before_connecting() {
    let (mut socket, connector, _) = engine(vec![]);
    let err = socket
        .connect(
            &Server::new("a.example", 80, false),
            &Credentials::new("user\r\nX-Evil: 1", "p"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HttpError::InvalidInput(_)));
    assert_eq!(connector.connects.load(Ordering::SeqCst), 0);

    let err = socket
        .connect(&Server::new("", 80, false), &Credentials::anonymous())
        .await
        .unwrap_err();
    assert!(matches!(err, HttpError::InvalidInput(_)));
    assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn retry_after_records_backoff_for_siblings() {
    let (mut socket, _, throttler) = engine(vec![vec![response_bytes(
        "HTTP/1.1 429 Too Many Requests",
        &[("Retry-After", "5"), ("Content-Length", "0")],
        b"",
    )]]);
    let (handle, pair) = get_pair("http://d.example/limited");
    // A non-2xx status is not an engine error.
    socket.request(handle).await.unwrap();
    assert!(!pair.lock().unwrap().response().success());
    assert!(throttler.get_throttle("d.example") > std::time::Duration::ZERO);
}

#[tokio::test]
async fn http_failure_keeps_connection_usable() {
    let (mut socket, _, _) = engine(vec![vec![
        response_bytes("HTTP/1.1 404 Not Found", &[("Content-Length", "9")], b"not found"),
        response_bytes("HTTP/1.1 200 OK", &[("Content-Length", "2")], b"ok"),
    ]]);
    let (h1, p1) = get_pair("http://a.example/missing");
    socket.request(h1).await.unwrap();
    {
        let p1 = p1.lock().unwrap();
        assert!(!p1.response().success());
        // Error bodies land in the internal buffer.
        assert_eq!(p1.response().body, b"not found");
    }
    assert!(socket.is_connected());

    let (h2, p2) = get_pair("http://a.example/found");
    socket.request(h2).await.unwrap();
    assert_eq!(p2.lock().unwrap().response().body, b"ok");
    assert_eq!(socket.handshake_count(), 1);
}

#[tokio::test]
async fn failed_file_transfer_reports_status() {
    let (mut socket, _, _) = engine(vec![vec![response_bytes(
        "HTTP/1.1 403 Forbidden",
        &[("Content-Length", "6")],
        b"denied",
    )]]);
    let writer = BufferWriter::new();
    let written = writer.handle();
    let err = socket
        .file_transfer(FileTransferCommand {
            uri: Uri::parse("http://a.example/secret").unwrap(),
            writer: Box::new(writer),
            update_transfer_status: false,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, HttpError::Status(403)));
    // The writer never saw the error body.
    assert!(written.lock().unwrap().is_empty());
}

#[tokio::test]
async fn transfer_status_notifications() {
    let body = vec![b'z'; 10_000];
    let (mut socket, _, _) = engine(vec![vec![response_bytes(
        "HTTP/1.1 200 OK",
        &[("Content-Length", "10000")],
        &body,
    )]]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = Arc::clone(&seen);
    socket.set_transfer_status_callback(move |bytes| {
        seen2.lock().unwrap().push(bytes);
    });
    let writer = BufferWriter::new();
    socket
        .file_transfer(FileTransferCommand {
            uri: Uri::parse("http://a.example/progress").unwrap(),
            writer: Box::new(writer),
            update_transfer_status: true,
        })
        .await
        .unwrap();
    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert_eq!(*seen.last().unwrap(), 10_000);
    // Cumulative counts never decrease.
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn connection_close_in_token_list_closes() {
    // "close" anywhere in the Connection token list means no keep-alive.
    let (mut socket, _, _) = engine(vec![vec![response_bytes(
        "HTTP/1.1 200 OK",
        &[("Content-Length", "2"), ("Connection", "close, te")],
        b"ok",
    )]]);
    let (handle, pair) = get_pair("http://a.example/x");
    socket.request(handle).await.unwrap();
    assert_eq!(pair.lock().unwrap().response().body, b"ok");
    assert!(!socket.is_connected());
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let (mut socket, _, _) = engine(vec![vec![response_bytes(
        "HTTP/1.1 200 OK",
        &[("Content-Length", "2")],
        b"ok",
    )]]);
    let (handle, _pair) = get_pair("http://a.example/x");
    socket.request(handle).await.unwrap();
    assert!(socket.is_connected());
    socket.disconnect();
    assert!(!socket.is_connected());
    socket.disconnect();
    assert!(!socket.is_connected());
}

#[tokio::test]
async fn protocol_error_fails_pair_and_connection() {
    let (mut socket, _, _) = engine(vec![vec![b"NOT HTTP AT ALL\r\n\r\n".to_vec()]]);
    let (handle, _pair) = get_pair("http://a.example/garbage");
    let err = socket.request(handle).await.unwrap_err();
    assert!(matches!(err, HttpError::Protocol(_)));
    assert!(!socket.is_connected());
}
