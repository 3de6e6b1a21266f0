/*
 * parser.rs
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

//! HTTP/1.1 response push parser: status line, headers, body (Content-Length,
//! chunked, or read-until-close). Strict: a malformed status line, header, or
//! chunk frame is a protocol error, after which the connection is torn down.

use bytes::{Buf, BytesMut};

use crate::protocol::http::error::HttpError;

/// Callback for response tokens as they are parsed. `body_chunk` is fallible
/// so a sink can abort the exchange mid-stream (bounded buffer overflow,
/// writer error).
pub trait ResponseEvents {
    fn status(&mut self, code: u16, reason: Option<&str>) -> Result<(), HttpError>;
    fn header(&mut self, name: &str, value: &str) -> Result<(), HttpError>;
    fn body_chunk(&mut self, data: &[u8]) -> Result<(), HttpError>;
    fn end_body(&mut self) -> Result<(), HttpError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    StatusLine,
    Headers,
    /// Headers done; the engine must pick a body mode before parsing resumes.
    HeadersComplete,
    Body,
    ChunkSize,
    ChunkData,
    ChunkTrailer,
    Done,
}

/// Push parser for one HTTP/1.1 response. Feed bytes via `receive`; the
/// events sink is invoked as complete tokens are parsed. Partial tokens stay
/// in the buffer until more data arrives.
pub struct ResponseParser {
    state: ParseState,
    /// Content-Length when known (-1 for chunked or read-until-close).
    content_length: i64,
    bytes_received: i64,
    chunk_remaining: i64,
    http_10: bool,
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::StatusLine,
            content_length: -1,
            bytes_received: 0,
            chunk_remaining: 0,
            http_10: false,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// True when the body ends only when the peer closes the connection.
    pub fn reads_until_close(&self) -> bool {
        self.state == ParseState::Body && self.content_length < 0
    }

    /// True when the response declared HTTP/1.0, which implies no keep-alive.
    pub fn is_http_10(&self) -> bool {
        self.http_10
    }

    pub fn reset(&mut self) {
        self.state = ParseState::StatusLine;
        self.content_length = -1;
        self.bytes_received = 0;
        self.chunk_remaining = 0;
        self.http_10 = false;
    }

    fn find_crlf(buf: &[u8]) -> Option<usize> {
        let mut i = 0;
        while i + 1 < buf.len() {
            if buf[i] == b'\r' && buf[i + 1] == b'\n' {
                return Some(i);
            }
            i += 1;
        }
        None
    }

    fn take_line(buf: &mut BytesMut, line_end: usize) -> Result<String, HttpError> {
        let line = buf.split_to(line_end + 2); // include CRLF
        match std::str::from_utf8(&line[..line_end]) {
            Ok(s) => Ok(s.to_string()),
            Err(_) => Err(HttpError::Protocol("non-UTF-8 header data".to_string())),
        }
    }

    /// Consume and parse as much as possible from buf. Stops at
    /// HeadersComplete until the engine calls set_body_mode.
    pub fn receive(
        &mut self,
        buf: &mut BytesMut,
        events: &mut dyn ResponseEvents,
    ) -> Result<(), HttpError> {
        while !buf.is_empty() {
            match self.state {
                ParseState::StatusLine => {
                    let line_end = match Self::find_crlf(buf) {
                        Some(n) => n,
                        None => return Ok(()),
                    };
                    let line = Self::take_line(buf, line_end)?;
                    self.parse_status_line(&line, events)?;
                    self.state = ParseState::Headers;
                }
                ParseState::Headers => {
                    let line_end = match Self::find_crlf(buf) {
                        Some(n) => n,
                        None => return Ok(()),
                    };
                    if line_end == 0 {
                        buf.advance(2);
                        self.state = ParseState::HeadersComplete;
                        return Ok(());
                    }
                    let line = Self::take_line(buf, line_end)?;
                    let (name, value) = split_header(&line)?;
                    events.header(name, value)?;
                }
                ParseState::HeadersComplete => return Ok(()),
                ParseState::Body => {
                    if self.content_length >= 0 {
                        let remaining = (self.content_length - self.bytes_received) as usize;
                        let to_read = remaining.min(buf.len());
                        if to_read > 0 {
                            let chunk = buf.split_to(to_read);
                            events.body_chunk(&chunk)?;
                            self.bytes_received += to_read as i64;
                        }
                        if self.bytes_received >= self.content_length {
                            events.end_body()?;
                            self.state = ParseState::Done;
                        }
                    } else {
                        // Read until close: deliver everything available.
                        let chunk = buf.split_to(buf.len());
                        events.body_chunk(&chunk)?;
                        return Ok(());
                    }
                }
                ParseState::ChunkSize => {
                    let line_end = match Self::find_crlf(buf) {
                        Some(n) => n,
                        None => return Ok(()),
                    };
                    let line = Self::take_line(buf, line_end)?;
                    let hex_part = line.split(';').next().unwrap_or(&line).trim();
                    // Hex digits only; sign characters are not valid framing.
                    if hex_part.is_empty() || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
                        return Err(HttpError::Protocol(format!(
                            "malformed chunk size: {:?}",
                            hex_part
                        )));
                    }
                    let size = u64::from_str_radix(hex_part, 16).map_err(|_| {
                        HttpError::Protocol(format!("malformed chunk size: {:?}", hex_part))
                    })?;
                    if size > i64::MAX as u64 {
                        return Err(HttpError::Protocol(format!(
                            "chunk size too large: {:?}",
                            hex_part
                        )));
                    }
                    self.chunk_remaining = size as i64;
                    if self.chunk_remaining == 0 {
                        self.state = ParseState::ChunkTrailer;
                    } else {
                        self.state = ParseState::ChunkData;
                    }
                }
                ParseState::ChunkData => {
                    let to_read = (self.chunk_remaining as usize).min(buf.len());
                    if to_read > 0 {
                        let chunk = buf.split_to(to_read);
                        events.body_chunk(&chunk)?;
                        self.chunk_remaining -= to_read as i64;
                    }
                    if self.chunk_remaining == 0 {
                        if buf.len() >= 2 {
                            if &buf[..2] != b"\r\n" {
                                return Err(HttpError::Protocol(
                                    "missing CRLF after chunk data".to_string(),
                                ));
                            }
                            buf.advance(2);
                            self.state = ParseState::ChunkSize;
                        } else {
                            return Ok(());
                        }
                    } else {
                        return Ok(());
                    }
                }
                ParseState::ChunkTrailer => {
                    let line_end = match Self::find_crlf(buf) {
                        Some(n) => n,
                        None => return Ok(()),
                    };
                    if line_end == 0 {
                        buf.advance(2);
                        events.end_body()?;
                        self.state = ParseState::Done;
                    } else {
                        let line = Self::take_line(buf, line_end)?;
                        let (name, value) = split_header(&line)?;
                        events.header(name, value)?;
                    }
                }
                ParseState::Done => return Ok(()),
            }
        }
        Ok(())
    }

    fn parse_status_line(
        &mut self,
        line: &str,
        events: &mut dyn ResponseEvents,
    ) -> Result<(), HttpError> {
        // HTTP/1.1 200 OK (reason optional)
        let mut parts = line.splitn(3, ' ');
        let version = parts.next().unwrap_or("");
        if !version.starts_with("HTTP/1.") {
            return Err(HttpError::Protocol(format!(
                "malformed status line: {:?}",
                line
            )));
        }
        self.http_10 = version == "HTTP/1.0";
        let code = parts
            .next()
            .and_then(|s| s.parse::<u16>().ok())
            .filter(|c| (100..1000).contains(c))
            .ok_or_else(|| HttpError::Protocol(format!("malformed status line: {:?}", line)))?;
        events.status(code, parts.next())
    }

    /// Called by the engine after headers are received. Content-Length zero,
    /// like a prohibited body, short-circuits straight to Done.
    pub fn set_body_mode(
        &mut self,
        content_length: Option<u64>,
        chunked: bool,
        events: &mut dyn ResponseEvents,
    ) -> Result<(), HttpError> {
        if self.state != ParseState::HeadersComplete {
            return Ok(());
        }
        if chunked {
            self.content_length = -1;
            self.state = ParseState::ChunkSize;
        } else if let Some(cl) = content_length {
            if cl > i64::MAX as u64 {
                return Err(HttpError::Protocol(format!(
                    "unreasonable Content-Length: {}",
                    cl
                )));
            }
            self.content_length = cl as i64;
            self.bytes_received = 0;
            if cl == 0 {
                events.end_body()?;
                self.state = ParseState::Done;
            } else {
                self.state = ParseState::Body;
            }
        } else {
            self.content_length = -1;
            self.state = ParseState::Body; // read until close
        }
        Ok(())
    }

    /// End of stream from the transport. Legal only for a read-until-close
    /// body (which it completes) or an already-done response.
    pub fn finish_on_eof(&mut self, events: &mut dyn ResponseEvents) -> Result<(), HttpError> {
        match self.state {
            ParseState::Done => Ok(()),
            ParseState::Body if self.content_length < 0 => {
                events.end_body()?;
                self.state = ParseState::Done;
                Ok(())
            }
            _ => Err(HttpError::Protocol(
                "connection closed mid-response".to_string(),
            )),
        }
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

fn split_header(line: &str) -> Result<(&str, &str), HttpError> {
    match line.find(':') {
        Some(colon) => Ok((line[..colon].trim(), line[colon + 1..].trim())),
        None => Err(HttpError::Protocol(format!(
            "malformed header line: {:?}",
            line
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        code: u16,
        reason: Option<String>,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
        body_ended: bool,
    }

    impl ResponseEvents for Recorder {
        fn status(&mut self, code: u16, reason: Option<&str>) -> Result<(), HttpError> {
            self.code = code;
            self.reason = reason.map(|s| s.to_string());
            Ok(())
        }
        fn header(&mut self, name: &str, value: &str) -> Result<(), HttpError> {
            self.headers.push((name.to_string(), value.to_string()));
            Ok(())
        }
        fn body_chunk(&mut self, data: &[u8]) -> Result<(), HttpError> {
            self.body.extend_from_slice(data);
            Ok(())
        }
        fn end_body(&mut self) -> Result<(), HttpError> {
            self.body_ended = true;
            Ok(())
        }
    }

    fn feed(parser: &mut ResponseParser, rec: &mut Recorder, data: &[u8]) -> Result<(), HttpError> {
        let mut buf = BytesMut::from(data);
        parser.receive(&mut buf, rec)?;
        if parser.state() == ParseState::HeadersComplete {
            let content_length = rec
                .headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, v)| v.parse::<u64>().ok());
            let chunked = rec.headers.iter().any(|(k, v)| {
                k.eq_ignore_ascii_case("transfer-encoding") && v.contains("chunked")
            });
            parser.set_body_mode(content_length, chunked, rec)?;
            parser.receive(&mut buf, rec)?;
        }
        Ok(())
    }

    #[test]
    fn content_length_body() {
        let mut p = ResponseParser::new();
        let mut rec = Recorder::default();
        feed(
            &mut p,
            &mut rec,
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello",
        )
        .unwrap();
        assert_eq!(rec.code, 200);
        assert_eq!(rec.reason.as_deref(), Some("OK"));
        assert_eq!(rec.body, b"hello");
        assert!(rec.body_ended);
        assert_eq!(p.state(), ParseState::Done);
    }

    #[test]
    fn status_without_reason() {
        let mut p = ResponseParser::new();
        let mut rec = Recorder::default();
        feed(&mut p, &mut rec, b"HTTP/1.1 204\r\n\r\n").unwrap();
        assert_eq!(rec.code, 204);
        assert_eq!(rec.reason, None);
    }

    #[test]
    fn chunked_body_decoded() {
        let mut p = ResponseParser::new();
        let mut rec = Recorder::default();
        feed(
            &mut p,
            &mut rec,
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n",
        )
        .unwrap();
        assert_eq!(rec.body, b"Wikipedia");
        assert!(rec.body_ended);
        assert_eq!(p.state(), ParseState::Done);
    }

    #[test]
    fn chunked_trailers_reported_as_headers() {
        let mut p = ResponseParser::new();
        let mut rec = Recorder::default();
        feed(
            &mut p,
            &mut rec,
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\nX-Sum: 1\r\n\r\n",
        )
        .unwrap();
        assert_eq!(rec.body, b"abc");
        assert!(rec
            .headers
            .iter()
            .any(|(k, v)| k == "X-Sum" && v == "1"));
    }

    #[test]
    fn incremental_delivery() {
        let mut p = ResponseParser::new();
        let mut rec = Recorder::default();
        let full = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n0123456789";
        let mut buf = BytesMut::new();
        for byte in full.iter() {
            buf.extend_from_slice(&[*byte]);
            p.receive(&mut buf, &mut rec).unwrap();
            if p.state() == ParseState::HeadersComplete {
                p.set_body_mode(Some(10), false, &mut rec).unwrap();
            }
        }
        assert_eq!(rec.body, b"0123456789");
        assert_eq!(p.state(), ParseState::Done);
    }

    #[test]
    fn read_until_close_finishes_on_eof() {
        let mut p = ResponseParser::new();
        let mut rec = Recorder::default();
        feed(&mut p, &mut rec, b"HTTP/1.1 200 OK\r\n\r\nsome data").unwrap();
        assert!(p.reads_until_close());
        assert!(!rec.body_ended);
        p.finish_on_eof(&mut rec).unwrap();
        assert_eq!(rec.body, b"some data");
        assert!(rec.body_ended);
    }

    #[test]
    fn eof_mid_headers_is_protocol_error() {
        let mut p = ResponseParser::new();
        let mut rec = Recorder::default();
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-"[..]);
        p.receive(&mut buf, &mut rec).unwrap();
        assert!(matches!(
            p.finish_on_eof(&mut rec),
            Err(HttpError::Protocol(_))
        ));
    }

    #[test]
    fn malformed_status_line_rejected() {
        for line in [
            &b"ICY 200 OK\r\n\r\n"[..],
            &b"HTTP/1.1 xyz OK\r\n\r\n"[..],
            &b"HTTP/1.1\r\n\r\n"[..],
        ] {
            let mut p = ResponseParser::new();
            let mut rec = Recorder::default();
            let mut buf = BytesMut::from(line);
            assert!(
                matches!(p.receive(&mut buf, &mut rec), Err(HttpError::Protocol(_))),
                "{:?} should be rejected",
                line
            );
        }
    }

    #[test]
    fn header_without_colon_rejected() {
        let mut p = ResponseParser::new();
        let mut rec = Recorder::default();
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nbogus header line\r\n\r\n"[..]);
        assert!(matches!(
            p.receive(&mut buf, &mut rec),
            Err(HttpError::Protocol(_))
        ));
    }

    #[test]
    fn malformed_chunk_size_rejected() {
        let mut p = ResponseParser::new();
        let mut rec = Recorder::default();
        let res = feed(
            &mut p,
            &mut rec,
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\nabc\r\n",
        );
        assert!(matches!(res, Err(HttpError::Protocol(_))));
    }

    #[test]
    fn signed_chunk_size_rejected() {
        // A sign parses as an integer but is not valid chunk framing; nothing
        // after it may reach the sink as body data.
        for size in ["-5", "+5"] {
            let mut p = ResponseParser::new();
            let mut rec = Recorder::default();
            let wire = format!(
                "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n{}\r\nstray bytes\r\n",
                size
            );
            let res = feed(&mut p, &mut rec, wire.as_bytes());
            assert!(
                matches!(res, Err(HttpError::Protocol(_))),
                "{:?} should be rejected",
                size
            );
            assert!(rec.body.is_empty(), "{:?} leaked bytes to the sink", size);
        }
    }

    #[test]
    fn chunk_size_beyond_i64_rejected() {
        let mut p = ResponseParser::new();
        let mut rec = Recorder::default();
        let res = feed(
            &mut p,
            &mut rec,
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nffffffffffffffff\r\n",
        );
        assert!(matches!(res, Err(HttpError::Protocol(_))));
    }

    #[test]
    fn oversized_content_length_rejected() {
        let mut p = ResponseParser::new();
        let mut rec = Recorder::default();
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\n\r\n"[..]);
        p.receive(&mut buf, &mut rec).unwrap();
        assert_eq!(p.state(), ParseState::HeadersComplete);
        // Above i64 the length would truncate negative and silently become
        // read-until-close; it must be a protocol error instead.
        let res = p.set_body_mode(Some(u64::MAX), false, &mut rec);
        assert!(matches!(res, Err(HttpError::Protocol(_))));
        let res = p.set_body_mode(Some((i64::MAX as u64) + 1), false, &mut rec);
        assert!(matches!(res, Err(HttpError::Protocol(_))));
    }

    #[test]
    fn http_10_detected() {
        let mut p = ResponseParser::new();
        let mut rec = Recorder::default();
        feed(&mut p, &mut rec, b"HTTP/1.0 200 OK\r\nContent-Length: 0\r\n\r\n").unwrap();
        assert!(p.is_http_10());
        assert!(rec.body_ended);
    }
}
