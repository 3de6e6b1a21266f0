/*
 * socket.rs
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

//! Connection manager: owns the transport stream (plain or TLS-wrapped) and
//! the identity of the live connection (host, port, encrypted). Reuse
//! eligibility is an exact identity match; any socket error or disconnect
//! clears the identity.

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::net::{Connector, HttpStream};

/// Owns the stream for one engine instance. Identity fields are only set
/// while a stream is live; reset() is idempotent.
pub struct ConnectionManager<C> {
    connector: C,
    stream: Option<HttpStream>,
    connected_host: String,
    connected_port: u16,
    connected_secure: bool,
    /// Bytes received but not yet consumed by the parser.
    pub read_buf: BytesMut,
    handshakes: u64,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            stream: None,
            connected_host: String::new(),
            connected_port: 0,
            connected_secure: false,
            read_buf: BytesMut::with_capacity(8192),
            handshakes: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Pure comparison against the live connection identity. False when there
    /// is no live connection.
    pub fn matches(&self, host: &str, port: u16, secure: bool) -> bool {
        self.stream.is_some()
            && self.connected_host == host
            && self.connected_port == port
            && self.connected_secure == secure
    }

    /// Identity of the live connection, if any.
    pub fn identity(&self) -> Option<(&str, u16, bool)> {
        self.stream
            .as_ref()
            .map(|_| (self.connected_host.as_str(), self.connected_port, self.connected_secure))
    }

    /// Number of handshakes performed over the lifetime of this manager.
    pub fn handshake_count(&self) -> u64 {
        self.handshakes
    }

    /// Establish a new connection, replacing any live one. On success the
    /// identity is recorded; on failure the manager is left reset.
    pub async fn establish(&mut self, host: &str, port: u16, secure: bool) -> std::io::Result<()> {
        self.reset();
        tracing::debug!(host, port, secure, "establishing connection");
        let stream = self.connector.connect(host, port, secure).await?;
        self.stream = Some(stream);
        self.connected_host = host.to_string();
        self.connected_port = port;
        self.connected_secure = secure;
        self.handshakes += 1;
        Ok(())
    }

    /// Clear identity and release the stream and any buffered bytes.
    pub fn reset(&mut self) {
        if self.stream.is_some() {
            tracing::debug!(host = %self.connected_host, "resetting connection");
        }
        self.stream = None;
        self.connected_host.clear();
        self.connected_port = 0;
        self.connected_secure = false;
        self.read_buf.clear();
    }

    /// Read once into the buffer. Returns the byte count; zero means the peer
    /// closed the connection. Errors reset the manager before propagating.
    pub async fn recv(&mut self) -> std::io::Result<usize> {
        let stream = match self.stream.as_mut() {
            Some(s) => s,
            None => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "not connected",
                ))
            }
        };
        let mut tmp = [0u8; 8192];
        match stream.read(&mut tmp).await {
            Ok(n) => {
                self.read_buf.extend_from_slice(&tmp[..n]);
                Ok(n)
            }
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    /// Write the whole buffer and flush. Errors reset the manager before
    /// propagating.
    pub async fn send_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        let stream = match self.stream.as_mut() {
            Some(s) => s,
            None => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "not connected",
                ))
            }
        };
        let result = async {
            stream.write_all(data).await?;
            stream.flush().await
        }
        .await;
        if let Err(e) = result {
            self.reset();
            return Err(e);
        }
        Ok(())
    }
}
