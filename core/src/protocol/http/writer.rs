/*
 * writer.rs
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

//! Body sink boundary: streamed response bytes go to a writer instead of the
//! response's bounded internal buffer. Writers are caller collaborators; the
//! two here cover downloads to disk and in-memory capture.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Streaming destination for response body bytes. `finish` is the completion
/// signal; a writer that was never written to may still be finished.
pub trait BodyWriter: Send {
    fn write(&mut self, data: &[u8]) -> io::Result<()>;
    fn finish(&mut self) -> io::Result<()>;
}

/// In-memory writer with a shared handle, so the caller can inspect the bytes
/// after the engine has consumed the writer itself.
pub struct BufferWriter {
    data: Arc<Mutex<Vec<u8>>>,
}

impl BufferWriter {
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle to the accumulated bytes; clones observe the same buffer.
    pub fn handle(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.data)
    }
}

impl Default for BufferWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BodyWriter for BufferWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.data
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend_from_slice(data);
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Download sink writing straight to a file. Created truncating; finish flushes.
pub struct FileWriter {
    file: File,
}

impl FileWriter {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            file: File::create(path)?,
        })
    }
}

impl BodyWriter for FileWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
