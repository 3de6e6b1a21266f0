/*
 * mod.rs
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

//! HTTP(S) control socket for transfers.
//!
//! Design:
//! - Explicit operation-frame stack instead of nested callbacks: connect,
//!   internal connect, request, and file transfer are frames; composition
//!   pushes a prerequisite frame ahead of the dependent one.
//! - Push-parsed responses (`bytes` BytesMut parse buffer) with a bounded
//!   internal body buffer, or a caller writer for large/streamed bodies.
//! - Connection reuse on exact (host, port, encrypted) identity; per-host
//!   backoff shared process-wide through `RequestThrottler`.

pub mod control;
pub mod error;
pub mod pair;
pub mod parser;
pub mod request;
pub mod response;
pub mod socket;
pub mod throttle;
pub mod writer;

pub use control::{ConnectDecision, FileTransferCommand, HttpControlSocket};
pub use error::HttpError;
pub use pair::{HttpPair, HttpRequestResponse, PairHandle, ProtocolPair};
pub use request::{HttpRequest, Method};
pub use response::{HeaderDecision, HttpResponse, MAX_SIMPLE_BODY_SIZE};
pub use throttle::RequestThrottler;
pub use writer::{BodyWriter, BufferWriter, FileWriter};
