/*
 * pair.rs
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

//! Request/response pairing: a capability view over heterogeneous concrete
//! request/response shapes, a concrete generic pair for storage, and the
//! owned/shared handle split. The engine only ever sees the trait and the
//! handle, never a concrete protocol-specific pair.

use std::sync::{Arc, Mutex};

use crate::protocol::http::request::HttpRequest;
use crate::protocol::http::response::HttpResponse;

/// Uniform access to one request bound with its response for a single exchange.
pub trait HttpRequestResponse: Send {
    fn request(&self) -> &HttpRequest;
    fn response(&self) -> &HttpResponse;
    fn response_mut(&mut self) -> &mut HttpResponse;
}

/// Concrete generic pair. Protocol-specific request/response types participate
/// by converting to the base HTTP shapes via AsRef/AsMut.
pub struct ProtocolPair<Q, S> {
    pub request: Q,
    pub response: S,
}

impl<Q, S> ProtocolPair<Q, S> {
    pub fn new(request: Q, response: S) -> Self {
        Self { request, response }
    }
}

impl<Q, S> HttpRequestResponse for ProtocolPair<Q, S>
where
    Q: AsRef<HttpRequest> + Send,
    S: AsRef<HttpResponse> + AsMut<HttpResponse> + Send,
{
    fn request(&self) -> &HttpRequest {
        self.request.as_ref()
    }

    fn response(&self) -> &HttpResponse {
        self.response.as_ref()
    }

    fn response_mut(&mut self) -> &mut HttpResponse {
        self.response.as_mut()
    }
}

impl AsRef<HttpRequest> for HttpRequest {
    fn as_ref(&self) -> &HttpRequest {
        self
    }
}

impl AsRef<HttpResponse> for HttpResponse {
    fn as_ref(&self) -> &HttpResponse {
        self
    }
}

impl AsMut<HttpResponse> for HttpResponse {
    fn as_mut(&mut self) -> &mut HttpResponse {
        self
    }
}

/// The plain HTTP pair.
pub type HttpPair = ProtocolPair<HttpRequest, HttpResponse>;

/// How a pair travels through the engine. `Owned` pairs are dropped when the
/// exchange completes; `Shared` pairs stay alive with the caller, who inspects
/// the response afterwards. The split is enforced here at the type level
/// rather than by convention.
pub enum PairHandle {
    Owned(Box<dyn HttpRequestResponse>),
    Shared(Arc<Mutex<dyn HttpRequestResponse>>),
}

impl PairHandle {
    pub fn owned(pair: impl HttpRequestResponse + 'static) -> Self {
        PairHandle::Owned(Box::new(pair))
    }

    pub fn shared(pair: Arc<Mutex<dyn HttpRequestResponse>>) -> Self {
        PairHandle::Shared(pair)
    }

    /// Run `f` with shared access to the pair, locking if necessary.
    pub fn with<R>(&self, f: impl FnOnce(&dyn HttpRequestResponse) -> R) -> R {
        match self {
            PairHandle::Owned(p) => f(p.as_ref()),
            PairHandle::Shared(p) => {
                let guard = p.lock().unwrap_or_else(|e| e.into_inner());
                f(&*guard)
            }
        }
    }

    /// Run `f` with exclusive access to the pair, locking if necessary.
    pub fn with_mut<R>(&mut self, f: impl FnOnce(&mut dyn HttpRequestResponse) -> R) -> R {
        match self {
            PairHandle::Owned(p) => f(p.as_mut()),
            PairHandle::Shared(p) => {
                let mut guard = p.lock().unwrap_or_else(|e| e.into_inner());
                f(&mut *guard)
            }
        }
    }
}
