/*
 * response.rs
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

//! HTTP response model: status code, headers, progress flag bitset, and the
//! body destination (caller-supplied writer or bounded internal buffer).

use crate::protocol::http::writer::BodyWriter;

/// Default bound on the internal body buffer. Use a writer if you need more.
pub const MAX_SIMPLE_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Flag bits tracking parse progress and body suppression.
pub const FLAG_GOT_CODE: u8 = 0x01;
pub const FLAG_GOT_HEADER: u8 = 0x02;
pub const FLAG_GOT_BODY: u8 = 0x04;
/// e.g. on HEAD requests, or 204/304 responses
pub const FLAG_NO_BODY: u8 = 0x08;
/// If set, body bytes are consumed from the wire but discarded.
pub const FLAG_IGNORE_BODY: u8 = 0x10;

/// Verdict from the header-received callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderDecision {
    /// All is well, proceed to the body.
    Continue,
    /// Not interested in the body; bytes are still consumed from the wire.
    SkipBody,
    /// Abort the connection.
    Abort,
}

/// Called once the complete header has been received.
pub type HeaderCallback = Box<dyn FnMut(&HttpResponse) -> HeaderDecision + Send>;

/// Accumulated HTTP response. Filled in incrementally by the engine as bytes
/// arrive; the caller inspects it once its pair completes.
pub struct HttpResponse {
    pub code: u16,
    flags: u8,
    pub headers: Vec<(String, String)>,
    /// Holds error bodies, and success bodies if there is no writer.
    pub body: Vec<u8>,
    pub max_body_size: usize,
    /// Writer isn't called if !success().
    pub writer: Option<Box<dyn BodyWriter>>,
    pub on_header: Option<HeaderCallback>,
}

impl HttpResponse {
    pub fn new() -> Self {
        Self {
            code: 0,
            flags: 0,
            headers: Vec::new(),
            body: Vec::new(),
            max_body_size: MAX_SIMPLE_BODY_SIZE,
            writer: None,
            on_header: None,
        }
    }

    pub fn with_writer(writer: Box<dyn BodyWriter>) -> Self {
        let mut r = Self::new();
        r.writer = Some(writer);
        r
    }

    pub(crate) fn set_flag(&mut self, flag: u8) {
        self.flags |= flag;
    }

    pub fn got_code(&self) -> bool {
        self.flags & FLAG_GOT_CODE != 0
    }

    pub fn got_header(&self) -> bool {
        self.flags & FLAG_GOT_HEADER != 0
    }

    /// True only if the body was received and neither no-body nor ignore-body applies.
    pub fn got_body(&self) -> bool {
        self.flags & (FLAG_GOT_BODY | FLAG_NO_BODY | FLAG_IGNORE_BODY) == FLAG_GOT_BODY
    }

    pub fn no_body(&self) -> bool {
        self.flags & FLAG_NO_BODY != 0
    }

    pub fn ignore_body(&self) -> bool {
        self.flags & FLAG_IGNORE_BODY != 0
    }

    pub fn success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// The protocol forbids a body regardless of framing headers.
    pub fn code_prohibits_body(&self) -> bool {
        (100..200).contains(&self.code) || self.code == 204 || self.code == 304
    }

    /// First header with the given name, case-insensitive.
    pub fn find_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Clear accumulated state back to pre-exchange; keeps writer, callback,
    /// and the configured size bound.
    pub fn reset(&mut self) {
        self.code = 0;
        self.flags = 0;
        self.headers.clear();
        self.body.clear();
    }
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}
