/*
 * uri.rs
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

//! HTTP URL model: scheme, host, port, path (with query). Only absolute http://
//! and https:// URLs; the Host header value is derived here so that non-default
//! ports are reflected and default ports are not.

use std::io;

/// Parsed absolute HTTP(S) URL. `path` keeps the query string; an empty path parses as "/".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    pub scheme: String,
    pub host: String,
    /// Explicit port from the URL, if any. Use effective_port() for the port to connect to.
    pub port: Option<u16>,
    pub path: String,
}

impl Uri {
    /// Parse an absolute http:// or https:// URL. Userinfo and fragments are rejected.
    pub fn parse(s: &str) -> io::Result<Self> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "not an absolute URL"))?;
        let scheme = scheme.to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported scheme: {}", scheme),
            ));
        }
        let (authority, path) = match rest.find(['/', '?']) {
            Some(i) if rest.as_bytes()[i] == b'/' => (&rest[..i], rest[i..].to_string()),
            Some(i) => (&rest[..i], format!("/{}", &rest[i..])),
            None => (rest, "/".to_string()),
        };
        if authority.contains('@') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "userinfo in URL not supported",
            ));
        }
        if path.contains('#') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "fragment in URL not supported",
            ));
        }
        // Bracketed IPv6 literal, else host[:port]
        let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
            let end = rest.find(']').ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "unterminated IPv6 literal")
            })?;
            let host = &rest[..end];
            let port = match rest[end + 1..].strip_prefix(':') {
                Some(p) => Some(parse_port(p)?),
                None if rest[end + 1..].is_empty() => None,
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "garbage after IPv6 literal",
                    ))
                }
            };
            (host.to_string(), port)
        } else {
            match authority.rsplit_once(':') {
                Some((h, p)) => (h.to_string(), Some(parse_port(p)?)),
                None => (authority.to_string(), None),
            }
        };
        if host.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty host"));
        }
        Ok(Self {
            scheme,
            host: host.to_ascii_lowercase(),
            port,
            path,
        })
    }

    pub fn is_secure(&self) -> bool {
        self.scheme == "https"
    }

    /// Scheme default port: 443 for https, 80 for http.
    pub fn default_port(&self) -> u16 {
        if self.is_secure() {
            443
        } else {
            80
        }
    }

    /// Port to connect to: explicit port if present, else the scheme default.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.default_port())
    }
}

fn parse_port(s: &str) -> io::Result<u16> {
    s.parse::<u16>()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid port: {}", s)))
}

/// Host header value for a URL: host alone on the scheme default port, host:port otherwise.
pub fn host_header(uri: &Uri) -> String {
    if uri.effective_port() == uri.default_port() {
        uri.host.clone()
    } else {
        format!("{}:{}", uri.host, uri.effective_port())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple() {
        let u = Uri::parse("https://a.example/x").unwrap();
        assert_eq!(u.scheme, "https");
        assert_eq!(u.host, "a.example");
        assert_eq!(u.port, None);
        assert_eq!(u.path, "/x");
        assert!(u.is_secure());
        assert_eq!(u.effective_port(), 443);
    }

    #[test]
    fn parse_explicit_port_and_query() {
        let u = Uri::parse("http://b.example:8080/y?q=1").unwrap();
        assert_eq!(u.effective_port(), 8080);
        assert_eq!(u.path, "/y?q=1");
        assert!(!u.is_secure());
    }

    #[test]
    fn parse_no_path() {
        let u = Uri::parse("http://c.example").unwrap();
        assert_eq!(u.path, "/");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Uri::parse("ftp://a.example/").is_err());
        assert!(Uri::parse("no-scheme").is_err());
        assert!(Uri::parse("http://user@a.example/").is_err());
        assert!(Uri::parse("http://a.example:notaport/").is_err());
        assert!(Uri::parse("http:///x").is_err());
    }

    #[test]
    fn host_header_default_port_omitted() {
        let u = Uri::parse("https://a.example/x").unwrap();
        assert_eq!(host_header(&u), "a.example");
        let u = Uri::parse("https://a.example:443/x").unwrap();
        assert_eq!(host_header(&u), "a.example");
        let u = Uri::parse("http://a.example:80/").unwrap();
        assert_eq!(host_header(&u), "a.example");
    }

    #[test]
    fn host_header_explicit_port_kept() {
        let u = Uri::parse("https://a.example:8443/x").unwrap();
        assert_eq!(host_header(&u), "a.example:8443");
        let u = Uri::parse("http://a.example:443/").unwrap();
        assert_eq!(host_header(&u), "a.example:443");
    }

    #[test]
    fn ipv6_literal() {
        let u = Uri::parse("http://[::1]:8080/z").unwrap();
        assert_eq!(u.host, "::1");
        assert_eq!(u.effective_port(), 8080);
    }
}
