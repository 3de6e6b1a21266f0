/*
 * control.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Traghetto, a cross-platform file transfer client.
 *
 * Traghetto is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Traghetto is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Traghetto.  If not, see <http://www.gnu.org/licenses/>.
 */

//! HTTP control socket: drives an explicit stack of operation frames
//! (connect, internal connect, request, file transfer) over one connection.
//! Queued pairs complete strictly in submission order, at most one in flight;
//! composition is a frame pushing its prerequisite ahead of itself instead of
//! nesting callbacks. One engine instance per logical connection; the only
//! state shared between instances is the request throttler.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::net::{Connector, TcpConnector};
use crate::protocol::http::error::HttpError;
use crate::protocol::http::pair::{HttpRequestResponse, PairHandle, ProtocolPair};
use crate::protocol::http::parser::{ParseState, ResponseEvents, ResponseParser};
use crate::protocol::http::request::{HttpRequest, Method};
use crate::protocol::http::response::{
    HeaderDecision, HttpResponse, FLAG_GOT_BODY, FLAG_GOT_CODE, FLAG_GOT_HEADER, FLAG_IGNORE_BODY,
    FLAG_NO_BODY,
};
use crate::protocol::http::socket::ConnectionManager;
use crate::protocol::http::throttle::RequestThrottler;
use crate::protocol::http::writer::BodyWriter;
use crate::server::{Credentials, Server};
use crate::uri::{host_header, Uri};

/// Outcome of a connect-or-reuse decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectDecision {
    /// The live connection identity matches exactly; no new handshake.
    Reuse,
    /// A connect sequence was pushed ahead of the pending work.
    Compose,
    /// A different connection is live and disconnecting was forbidden; retry
    /// later. Not an error.
    Busy,
}

/// High-level download: GET the URL and stream the body to the writer.
pub struct FileTransferCommand {
    pub uri: Uri,
    pub writer: Box<dyn BodyWriter>,
    /// Raise transfer-status notifications while the body arrives.
    pub update_transfer_status: bool,
}

type TransferStatusCallback = Box<dyn FnMut(u64) + Send>;

/// Engine state below the frame stack: connection, shared throttler, and the
/// transfer-status notification sink.
struct EngineCore<C> {
    conn: ConnectionManager<C>,
    throttler: Arc<RequestThrottler>,
    on_transfer_status: Option<TransferStatusCallback>,
}

/// One unit of in-progress work on the engine's continuation stack.
enum OpFrame {
    Connect(ConnectOp),
    InternalConnect(InternalConnectOp),
    FileTransfer(FileTransferOp),
    Request(RequestOp),
}

/// What a frame wants after one step.
enum Verdict {
    /// Frame finished; pop it.
    Done,
    /// More steps needed; call advance again.
    Again,
    /// Push a prerequisite frame ahead of this one.
    Push(OpFrame),
}

impl OpFrame {
    async fn advance<C: Connector>(
        &mut self,
        core: &mut EngineCore<C>,
    ) -> Result<Verdict, HttpError> {
        match self {
            OpFrame::Connect(op) => op.advance(core),
            OpFrame::InternalConnect(op) => op.advance(core).await,
            OpFrame::FileTransfer(op) => op.advance(core),
            OpFrame::Request(op) => op.advance(core).await,
        }
    }
}

/// The HTTP(S) control socket engine. All operations take `&mut self` and run
/// to completion before returning, so per instance there is never more than
/// one exchange in flight; cancellation is `disconnect()` between drives.
pub struct HttpControlSocket<C = TcpConnector> {
    stack: Vec<OpFrame>,
    core: EngineCore<C>,
}

impl HttpControlSocket<TcpConnector> {
    /// Engine with the production TCP/TLS connector. The throttler is shared
    /// by every engine in the process; construct it once and clone the Arc.
    pub fn new(throttler: Arc<RequestThrottler>) -> Self {
        Self::with_connector(TcpConnector, throttler)
    }
}

impl<C: Connector> HttpControlSocket<C> {
    pub fn with_connector(connector: C, throttler: Arc<RequestThrottler>) -> Self {
        Self {
            stack: Vec::new(),
            core: EngineCore {
                conn: ConnectionManager::new(connector),
                throttler,
                on_transfer_status: None,
            },
        }
    }

    /// The shared per-host backoff coordinator. Backoff is advisory: consult
    /// `get_throttle` before submitting work; the engine never refuses on its
    /// own.
    pub fn throttler(&self) -> &Arc<RequestThrottler> {
        &self.core.throttler
    }

    /// Sink for transfer-status notifications (cumulative body bytes). Only
    /// requests with `update_transfer_status` set raise them.
    pub fn set_transfer_status_callback(&mut self, cb: impl FnMut(u64) + Send + 'static) {
        self.core.on_transfer_status = Some(Box::new(cb));
    }

    pub fn is_connected(&self) -> bool {
        self.core.conn.is_connected()
    }

    /// Identity of the live connection, if any.
    pub fn connection_identity(&self) -> Option<(String, u16, bool)> {
        self.core
            .conn
            .identity()
            .map(|(h, p, s)| (h.to_string(), p, s))
    }

    /// Handshakes performed since construction.
    pub fn handshake_count(&self) -> u64 {
        self.core.conn.handshake_count()
    }

    /// Establish a connection to the server. Fails immediately on
    /// structurally invalid input without touching the socket. HTTP itself is
    /// anonymous; credentials are validated here for callers that layer
    /// authentication headers onto their requests.
    pub async fn connect(
        &mut self,
        server: &Server,
        credentials: &Credentials,
    ) -> Result<(), HttpError> {
        server.validate().map_err(HttpError::InvalidInput)?;
        credentials.validate().map_err(HttpError::InvalidInput)?;
        self.stack.push(OpFrame::Connect(ConnectOp::new(
            &server.host,
            server.port,
            server.secure,
        )));
        self.drive().await
    }

    /// Process one pair to completion.
    pub async fn request(&mut self, pair: PairHandle) -> Result<(), HttpError> {
        self.request_many(vec![pair]).await
    }

    /// Process a batch of pairs strictly in order. The batch occupies a
    /// single frame, so its items are contiguous: nothing submitted through
    /// another call can interleave.
    pub async fn request_many(&mut self, pairs: Vec<PairHandle>) -> Result<(), HttpError> {
        if pairs.is_empty() {
            return Ok(());
        }
        self.stack
            .push(OpFrame::Request(RequestOp::new(pairs.into())));
        self.drive().await
    }

    /// Download the command's URL, streaming the body to its writer. A
    /// non-2xx terminal status is `HttpError::Status`; the error body, if
    /// any, was buffered rather than written.
    pub async fn file_transfer(&mut self, command: FileTransferCommand) -> Result<(), HttpError> {
        self.stack
            .push(OpFrame::FileTransfer(FileTransferOp::new(command)));
        self.drive().await
    }

    /// Connect-or-reuse decision for the given identity tuple. `Reuse` means
    /// the live connection matches exactly and no handshake happened. `Busy`
    /// means a different connection is live and `allow_disconnect` was false.
    /// `Compose` means a connect sequence ran (the pushed frame has already
    /// been driven to completion when this returns).
    pub async fn internal_connect(
        &mut self,
        host: &str,
        port: u16,
        secure: bool,
        allow_disconnect: bool,
    ) -> Result<ConnectDecision, HttpError> {
        if self.core.conn.matches(host, port, secure) {
            tracing::debug!(host, port, "reusing connection");
            return Ok(ConnectDecision::Reuse);
        }
        if self.core.conn.is_connected() && !allow_disconnect {
            return Ok(ConnectDecision::Busy);
        }
        self.stack
            .push(OpFrame::InternalConnect(InternalConnectOp::new(
                host.to_string(),
                port,
                secure,
            )));
        self.drive().await?;
        Ok(ConnectDecision::Compose)
    }

    /// Synchronous cancellation: clears the frame stack, drops any partially
    /// parsed response state, and releases the socket and TLS layer.
    /// Idempotent.
    pub fn disconnect(&mut self) {
        self.stack.clear();
        self.core.conn.reset();
    }

    /// Drive the frame stack until it drains. On a connection-fatal error the
    /// connection is torn down and every pending frame is discarded; the
    /// error is surfaced once.
    async fn drive(&mut self) -> Result<(), HttpError> {
        while let Some(frame) = self.stack.last_mut() {
            match frame.advance(&mut self.core).await {
                Ok(Verdict::Again) => {}
                Ok(Verdict::Done) => {
                    self.stack.pop();
                }
                Ok(Verdict::Push(next)) => self.stack.push(next),
                Err(e) => {
                    if e.is_fatal_to_connection() {
                        self.core.conn.reset();
                    }
                    self.stack.clear();
                    tracing::debug!(error = %e, "operation failed");
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

/// Caller-facing connect: reuse the live connection or push an internal
/// connect ahead of itself.
struct ConnectOp {
    host: String,
    port: u16,
    secure: bool,
    attempted: bool,
}

impl ConnectOp {
    fn new(host: &str, port: u16, secure: bool) -> Self {
        Self {
            host: host.to_string(),
            port,
            secure,
            attempted: false,
        }
    }

    fn advance<C: Connector>(&mut self, core: &mut EngineCore<C>) -> Result<Verdict, HttpError> {
        if core.conn.matches(&self.host, self.port, self.secure) {
            return Ok(Verdict::Done);
        }
        if self.attempted {
            // The pushed connect frame finished without errors yet the
            // identity still does not match.
            return Err(HttpError::Transport(io::Error::new(
                io::ErrorKind::Other,
                "connection not established",
            )));
        }
        self.attempted = true;
        Ok(Verdict::Push(OpFrame::InternalConnect(
            InternalConnectOp::new(self.host.clone(), self.port, self.secure),
        )))
    }
}

/// The actual connect sequence: TCP, then the TLS handshake when encrypted.
/// Whoever pushes this frame has already decided that disconnecting any live
/// connection is allowed.
struct InternalConnectOp {
    host: String,
    port: u16,
    secure: bool,
}

impl InternalConnectOp {
    fn new(host: String, port: u16, secure: bool) -> Self {
        Self { host, port, secure }
    }

    async fn advance<C: Connector>(
        &mut self,
        core: &mut EngineCore<C>,
    ) -> Result<Verdict, HttpError> {
        core.conn
            .establish(&self.host, self.port, self.secure)
            .await
            .map_err(HttpError::Transport)?;
        Ok(Verdict::Done)
    }
}

/// Compose connect-or-reuse with a GET request whose body streams to the
/// command's writer. Keeps a shared handle on the pair so the terminal status
/// can be checked once the request frame completes.
struct FileTransferOp {
    command: Option<FileTransferCommand>,
    result: Option<Arc<Mutex<ProtocolPair<HttpRequest, HttpResponse>>>>,
}

impl FileTransferOp {
    fn new(command: FileTransferCommand) -> Self {
        Self {
            command: Some(command),
            result: None,
        }
    }

    fn advance<C: Connector>(&mut self, _core: &mut EngineCore<C>) -> Result<Verdict, HttpError> {
        if let Some(command) = self.command.take() {
            let mut request = HttpRequest::new(Method::Get, command.uri);
            request.update_transfer_status = command.update_transfer_status;
            let response = HttpResponse::with_writer(command.writer);
            let pair = Arc::new(Mutex::new(ProtocolPair::new(request, response)));
            self.result = Some(Arc::clone(&pair));
            let handle: Arc<Mutex<dyn HttpRequestResponse>> = pair;
            return Ok(Verdict::Push(OpFrame::Request(RequestOp::new(
                VecDeque::from(vec![PairHandle::Shared(handle)]),
            ))));
        }
        // The request frame has completed; judge the terminal status.
        let pair = match self.result.take() {
            Some(p) => p,
            None => return Ok(Verdict::Done),
        };
        let guard = pair.lock().unwrap_or_else(|p| p.into_inner());
        let response = guard.response();
        if response.success() {
            Ok(Verdict::Done)
        } else {
            tracing::warn!(code = response.code, "file transfer rejected by server");
            Err(HttpError::Status(response.code))
        }
    }
}

enum RequestState {
    Connect,
    Send,
    Receive,
}

enum ReceiveOutcome {
    NeedMore,
    PairDone { close: bool },
}

/// Sequential processing of a queue of pairs over one (reused where possible)
/// connection.
struct RequestOp {
    pairs: VecDeque<PairHandle>,
    state: RequestState,
    parser: ResponseParser,
    header_handled: bool,
    body_received: u64,
}

impl RequestOp {
    fn new(pairs: VecDeque<PairHandle>) -> Self {
        Self {
            pairs,
            state: RequestState::Connect,
            parser: ResponseParser::new(),
            header_handled: false,
            body_received: 0,
        }
    }

    async fn advance<C: Connector>(
        &mut self,
        core: &mut EngineCore<C>,
    ) -> Result<Verdict, HttpError> {
        match self.state {
            RequestState::Connect => {
                let front = match self.pairs.front() {
                    Some(p) => p,
                    None => return Ok(Verdict::Done),
                };
                let (host, port, secure) = front.with(|p| {
                    let uri = &p.request().uri;
                    (uri.host.clone(), uri.effective_port(), uri.is_secure())
                });
                if core.conn.matches(&host, port, secure) {
                    self.state = RequestState::Send;
                    return Ok(Verdict::Again);
                }
                Ok(Verdict::Push(OpFrame::InternalConnect(
                    InternalConnectOp::new(host, port, secure),
                )))
            }
            RequestState::Send => {
                let front = match self.pairs.front_mut() {
                    Some(p) => p,
                    None => return Ok(Verdict::Done),
                };
                let wire = front.with_mut(|p| {
                    p.response_mut().reset();
                    serialize_request(p.request())
                });
                self.parser.reset();
                self.header_handled = false;
                self.body_received = 0;
                core.conn.send_all(&wire).await.map_err(HttpError::Transport)?;
                self.state = RequestState::Receive;
                Ok(Verdict::Again)
            }
            RequestState::Receive => match self.receive_step(core).await? {
                ReceiveOutcome::NeedMore => Ok(Verdict::Again),
                ReceiveOutcome::PairDone { close } => {
                    if close {
                        core.conn.reset();
                    }
                    // Owned pairs die here; shared pairs stay with the caller.
                    self.pairs.pop_front();
                    if self.pairs.is_empty() {
                        Ok(Verdict::Done)
                    } else {
                        self.state = RequestState::Connect;
                        self.parser.reset();
                        Ok(Verdict::Again)
                    }
                }
            },
        }
    }

    /// One receive suspension point: read (unless bytes are already
    /// buffered), feed the parser, and do the header/body bookkeeping.
    async fn receive_step<C: Connector>(
        &mut self,
        core: &mut EngineCore<C>,
    ) -> Result<ReceiveOutcome, HttpError> {
        let eof = if core.conn.read_buf.is_empty() {
            core.conn.recv().await.map_err(HttpError::Transport)? == 0
        } else {
            false
        };

        let Self {
            pairs,
            parser,
            header_handled,
            body_received,
            ..
        } = self;
        let EngineCore {
            conn,
            throttler,
            on_transfer_status,
        } = core;
        let front = match pairs.front_mut() {
            Some(p) => p,
            None => return Ok(ReceiveOutcome::NeedMore),
        };

        front.with_mut(|p| {
            let host = p.request().uri.host.clone();
            let update_status = p.request().update_transfer_status;
            let is_head = p.request().method == Method::Head;
            let resp = p.response_mut();

            {
                let mut sink = ResponseSink {
                    resp: &mut *resp,
                    update_status,
                    body_received: &mut *body_received,
                    progress: &mut *on_transfer_status,
                };
                if eof {
                    parser.finish_on_eof(&mut sink)?;
                } else {
                    parser.receive(&mut conn.read_buf, &mut sink)?;
                }
            }

            if parser.state() == ParseState::HeadersComplete && !*header_handled {
                *header_handled = true;
                resp.set_flag(FLAG_GOT_HEADER);
                if resp.code_prohibits_body() || is_head {
                    resp.set_flag(FLAG_NO_BODY);
                }
                record_retry_after(throttler, &host, resp);

                // Invoked exactly once, after the complete header.
                if let Some(mut cb) = resp.on_header.take() {
                    let decision = cb(resp);
                    resp.on_header = Some(cb);
                    match decision {
                        HeaderDecision::Continue => {}
                        HeaderDecision::SkipBody => resp.set_flag(FLAG_IGNORE_BODY),
                        HeaderDecision::Abort => return Err(HttpError::Aborted),
                    }
                }

                let content_length = match resp.find_header("Content-Length") {
                    Some(v) => Some(v.trim().parse::<u64>().map_err(|_| {
                        HttpError::Protocol(format!("malformed Content-Length: {:?}", v))
                    })?),
                    None => None,
                };
                let chunked = resp
                    .find_header("Transfer-Encoding")
                    .map(|v| v.to_ascii_lowercase().contains("chunked"))
                    .unwrap_or(false);

                let mut sink = ResponseSink {
                    resp: &mut *resp,
                    update_status,
                    body_received: &mut *body_received,
                    progress: &mut *on_transfer_status,
                };
                // Headers implying no body take precedence over framing.
                if sink.resp.no_body() {
                    parser.set_body_mode(Some(0), false, &mut sink)?;
                } else {
                    parser.set_body_mode(content_length, chunked, &mut sink)?;
                }
                parser.receive(&mut conn.read_buf, &mut sink)?;
            }

            if parser.state() == ParseState::Done {
                resp.set_flag(FLAG_GOT_BODY);
                if resp.success() && !resp.ignore_body() && !resp.no_body() {
                    if let Some(w) = resp.writer.as_mut() {
                        w.finish().map_err(HttpError::Transport)?;
                    }
                }
                // Connection is a comma-separated token list.
                let close = eof
                    || parser.is_http_10()
                    || resp
                        .find_header("Connection")
                        .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("close")))
                        .unwrap_or(false);
                tracing::debug!(code = resp.code, close, "response complete");
                return Ok(ReceiveOutcome::PairDone { close });
            }
            Ok(ReceiveOutcome::NeedMore)
        })
    }
}

/// On 429/503 with a numeric Retry-After, record a cooldown for the host so
/// sibling engines back off too.
fn record_retry_after(throttler: &Arc<RequestThrottler>, host: &str, resp: &HttpResponse) {
    if resp.code != 429 && resp.code != 503 {
        return;
    }
    if let Some(secs) = resp
        .find_header("Retry-After")
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        throttler.throttle(host, Duration::from_secs(secs));
    }
}

fn serialize_request(req: &HttpRequest) -> Vec<u8> {
    let mut head = format!(
        "{} {} HTTP/1.1\r\nHost: {}\r\n",
        req.method.as_str(),
        req.uri.path,
        host_header(&req.uri)
    );
    for (name, value) in &req.headers {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    if let Some(body) = &req.body {
        if req.find_header("Content-Length").is_none() {
            head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
    }
    if req.find_header("Connection").is_none() {
        head.push_str("Connection: keep-alive\r\n");
    }
    if req.find_header("User-Agent").is_none() {
        head.push_str("User-Agent: traghetto/0.1\r\n");
    }
    head.push_str("\r\n");
    let mut wire = head.into_bytes();
    if let Some(body) = &req.body {
        wire.extend_from_slice(body);
    }
    wire
}

/// Routes parser events into the current pair's response: flags, bounded
/// buffering or writer streaming, transfer-status notifications.
struct ResponseSink<'a> {
    resp: &'a mut HttpResponse,
    update_status: bool,
    body_received: &'a mut u64,
    progress: &'a mut Option<TransferStatusCallback>,
}

impl ResponseEvents for ResponseSink<'_> {
    fn status(&mut self, code: u16, _reason: Option<&str>) -> Result<(), HttpError> {
        self.resp.code = code;
        self.resp.set_flag(FLAG_GOT_CODE);
        Ok(())
    }

    fn header(&mut self, name: &str, value: &str) -> Result<(), HttpError> {
        self.resp.headers.push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn body_chunk(&mut self, data: &[u8]) -> Result<(), HttpError> {
        *self.body_received += data.len() as u64;
        if self.update_status {
            if let Some(cb) = self.progress.as_mut() {
                cb(*self.body_received);
            }
        }
        if self.resp.ignore_body() || self.resp.no_body() {
            // Consumed from the wire, discarded.
            return Ok(());
        }
        if self.resp.success() {
            if let Some(w) = self.resp.writer.as_mut() {
                return w.write(data).map_err(HttpError::Transport);
            }
        }
        // Error bodies, and success bodies without a writer, go to the
        // bounded internal buffer.
        if self.resp.body.len() + data.len() > self.resp.max_body_size {
            return Err(HttpError::SizeExceeded);
        }
        self.resp.body.extend_from_slice(data);
        Ok(())
    }

    fn end_body(&mut self) -> Result<(), HttpError> {
        Ok(())
    }
}
