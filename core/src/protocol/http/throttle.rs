/*
 * throttle.rs
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

//! Per-host backoff shared across control sockets. Advisory: protocol code
//! records cooldowns (e.g. from 429/503 responses) and callers consult the
//! remaining wait before submitting; the engine itself never refuses work.
//! Construct one throttler per process and pass it as Arc to every engine.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Mutex-guarded map from hostname to a do-not-retry-before deadline.
/// Deadlines are wall-clock; entries are pruned lazily on lookup. A second
/// throttle() for the same host keeps the later of the two deadlines.
pub struct RequestThrottler {
    backoff: Mutex<Vec<(String, DateTime<Utc>)>>,
}

impl RequestThrottler {
    pub fn new() -> Self {
        Self {
            backoff: Mutex::new(Vec::new()),
        }
    }

    /// Record that `hostname` should not be contacted again for `backoff`.
    pub fn throttle(&self, hostname: &str, backoff: Duration) {
        let deadline = Utc::now()
            + chrono::Duration::from_std(backoff).unwrap_or_else(|_| chrono::Duration::zero());
        let mut entries = self.backoff.lock().unwrap_or_else(|p| p.into_inner());
        match entries.iter_mut().find(|(h, _)| h == hostname) {
            Some((_, existing)) => {
                if deadline > *existing {
                    *existing = deadline;
                }
            }
            None => entries.push((hostname.to_string(), deadline)),
        }
        tracing::debug!(hostname, backoff_ms = backoff.as_millis() as u64, "throttled host");
    }

    /// Remaining wait for `hostname`; zero if none recorded or already
    /// elapsed. Elapsed entries are removed.
    pub fn get_throttle(&self, hostname: &str) -> Duration {
        let now = Utc::now();
        let mut entries = self.backoff.lock().unwrap_or_else(|p| p.into_inner());
        let Some(pos) = entries.iter().position(|(h, _)| h == hostname) else {
            return Duration::ZERO;
        };
        let remaining = entries[pos].1 - now;
        match remaining.to_std() {
            Ok(d) if !d.is_zero() => d,
            _ => {
                entries.swap_remove(pos);
                Duration::ZERO
            }
        }
    }
}

impl Default for RequestThrottler {
    fn default() -> Self {
        Self::new()
    }
}
