/*
 * error.rs
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

//! HTTP engine errors. Protocol, size, transport, and abort errors tear the
//! connection down; `Status` and `InvalidInput` leave it alone. "Busy" is a
//! connect decision, not an error.

use std::fmt;
use std::io;

/// Errors from the HTTP control socket and its parser.
#[derive(Debug)]
pub enum HttpError {
    /// Malformed status line, header, or chunk framing. Connection is not
    /// assumed salvageable afterwards.
    Protocol(String),
    /// The internal body buffer would exceed the response's max_body_size.
    SizeExceeded,
    /// Socket-level error reported by the transport.
    Transport(io::Error),
    /// The header callback requested abort, or the exchange was cancelled.
    Aborted,
    /// A file transfer completed with a non-2xx status. The error body, if
    /// any, is in the response's internal buffer.
    Status(u16),
    /// Structural validation failure (server descriptor, credentials, URL).
    InvalidInput(String),
}

impl HttpError {
    /// True for errors after which the connection must be torn down.
    pub fn is_fatal_to_connection(&self) -> bool {
        !matches!(self, HttpError::Status(_) | HttpError::InvalidInput(_))
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::Protocol(m) => write!(f, "protocol error: {}", m),
            HttpError::SizeExceeded => write!(f, "response body exceeds maximum size"),
            HttpError::Transport(e) => write!(f, "transport error: {}", e),
            HttpError::Aborted => write!(f, "aborted"),
            HttpError::Status(code) => write!(f, "server returned status {}", code),
            HttpError::InvalidInput(m) => write!(f, "invalid input: {}", m),
        }
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HttpError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for HttpError {
    fn from(e: io::Error) -> Self {
        HttpError::Transport(e)
    }
}
