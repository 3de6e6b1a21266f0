/*
 * server.rs
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

//! Server descriptor and credentials as supplied by the caller (UI or FFI).
//! Only structural validation happens here; whether the credentials are
//! accepted is between the caller and the remote server.

/// Target server for a control socket connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub host: String,
    pub port: u16,
    /// Connect with TLS.
    pub secure: bool,
}

impl Server {
    pub fn new(host: impl Into<String>, port: u16, secure: bool) -> Self {
        Self {
            host: host.into(),
            port,
            secure,
        }
    }

    /// Structural validation: non-empty host without whitespace or control characters.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("empty host".to_string());
        }
        if self
            .host
            .chars()
            .any(|c| c.is_ascii_whitespace() || c.is_ascii_control())
        {
            return Err(format!("malformed host: {:?}", self.host));
        }
        if self.port == 0 {
            return Err("port must be non-zero".to_string());
        }
        Ok(())
    }
}

/// Caller-supplied credentials. Anonymous access is an empty user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Structural validation: CR, LF, and NUL would corrupt any wire protocol
    /// these credentials end up in, so they are rejected up front.
    pub fn validate(&self) -> Result<(), String> {
        for (what, value) in [("user", &self.user), ("password", &self.password)] {
            if value.chars().any(|c| c == '\r' || c == '\n' || c == '\0') {
                return Err(format!("control characters in {}", what));
            }
        }
        Ok(())
    }
}
