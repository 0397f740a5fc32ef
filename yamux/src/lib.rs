// Copyright (C) 2018-2019, Cloudflare, Inc.
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are
// met:
//
//     * Redistributions of source code must retain the above copyright notice,
//       this list of conditions and the following disclaimer.
//
//     * Redistributions in binary form must reproduce the above copyright
//       notice, this list of conditions and the following disclaimer in the
//       documentation and/or other materials provided with the distribution.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS
// IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO,
// THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR
// PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR
// CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL,
// EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO,
// PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR
// PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF
// LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING
// NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE OF THIS
// SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Per-stream core of the Yamux stream multiplexer.
//!
//! Yamux divides a single secure connection into many independent logical
//! streams. Each stream is a reliable, ordered, bidirectional byte channel
//! with its own credit-based flow control, half-close and reset.
//!
//! This crate implements a single such stream: the [`Stream`] state machine.
//! It does not parse frames, allocate stream IDs or route data between
//! streams; those are the job of the session that owns the streams. The
//! session talks to a stream through its connection-facing methods
//! ([`on_data_read()`], [`on_data_written()`],
//! [`on_send_window_increase()`] and [`closed_by_connection()`]), and the
//! stream talks back through the [`StreamFeedback`] trait.
//!
//! ## Configuring streams
//!
//! Flow control limits are taken from a [`Config`] object:
//!
//! ```
//! let mut config = yamux_stream::Config::new();
//! config.set_window_size(64 * 1024);
//! config.set_max_window_size(1024 * 1024);
//! ```
//!
//! ## Callbacks
//!
//! Client operations never block and never complete synchronously. Their
//! completion is scheduled through [`StreamFeedback::defer_call()`] and runs
//! once the session drains its deferred calls, for example with a
//! [`DeferQueue`]:
//!
//! ```no_run
//! # fn f(stream: &mut yamux_stream::Stream, queue: &yamux_stream::DeferQueue) {
//! stream.read(vec![0; 16], 16, |res, buf| match res {
//!     Ok(len) => println!("got {:?}", &buf[..len]),
//!     Err(e) => println!("read failed: {e}"),
//! });
//!
//! // Later, on the session's execution context.
//! queue.run();
//! # }
//! ```
//!
//! Once [`Stream::reset()`] is called, no further callback of that stream
//! runs, including those already scheduled.
//!
//! [`on_data_read()`]: Stream::on_data_read
//! [`on_data_written()`]: Stream::on_data_written
//! [`on_send_window_increase()`]: Stream::on_send_window_increase
//! [`closed_by_connection()`]: Stream::closed_by_connection

#![warn(missing_docs)]

#[macro_use]
extern crate log;

/// The default initial size of both stream windows, as defined by Yamux.
pub const DEFAULT_WINDOW_SIZE: usize = 256 * 1024;

/// The default maximum size of the receive window.
pub const DEFAULT_MAX_WINDOW_SIZE: usize = 16 * 1024 * 1024;

/// Stores configuration shared between multiple streams.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    window_size: usize,

    max_window_size: usize,

    write_queue_limit: usize,
}

impl Config {
    /// Creates a config object with the default Yamux limits.
    ///
    /// ## Examples:
    ///
    /// ```
    /// let config = yamux_stream::Config::new();
    /// assert_eq!(config.window_size(), yamux_stream::DEFAULT_WINDOW_SIZE);
    /// ```
    pub fn new() -> Config {
        Config {
            window_size: DEFAULT_WINDOW_SIZE,
            max_window_size: DEFAULT_MAX_WINDOW_SIZE,
            write_queue_limit: DEFAULT_MAX_WINDOW_SIZE,
        }
    }

    /// Sets the initial size of the send and receive windows.
    ///
    /// The default value is `DEFAULT_WINDOW_SIZE` (256KiB).
    pub fn set_window_size(&mut self, v: usize) {
        self.window_size = v;
    }

    /// Sets the maximum size of the receive window.
    ///
    /// This bounds both windows, and the value that
    /// [`Stream::adjust_window_size()`] accepts.
    ///
    /// The default value is `DEFAULT_MAX_WINDOW_SIZE` (16MiB).
    pub fn set_max_window_size(&mut self, v: usize) {
        self.max_window_size = v;
    }

    /// Sets the maximum number of bytes a stream buffers for sending,
    /// including bytes handed to the session but not yet written.
    ///
    /// Must not be lower than the maximum window size.
    ///
    /// The default value is `DEFAULT_MAX_WINDOW_SIZE` (16MiB).
    pub fn set_write_queue_limit(&mut self, v: usize) {
        self.write_queue_limit = v;
    }

    /// Returns the initial window size.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Returns the maximum window size.
    pub fn max_window_size(&self) -> usize {
        self.max_window_size
    }

    /// Returns the write queue limit.
    pub fn write_queue_limit(&self) -> usize {
        self.write_queue_limit
    }

    /// Checks that the limits are consistent with each other.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.window_size > self.max_window_size {
            return Err(Error::InvalidWindowSize);
        }

        if self.write_queue_limit < self.max_window_size {
            return Err(Error::InvalidArgument);
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::new()
    }
}

pub use crate::defer::DeferQueue;

pub use crate::error::Error;
pub use crate::error::Result;
pub use crate::error::WireErrorCode;

pub use crate::feedback::PeerId;
pub use crate::feedback::SecureConnection;
pub use crate::feedback::StreamFeedback;

pub use crate::stream::CloseCallback;
pub use crate::stream::DataFromConnectionResult;
pub use crate::stream::ReadCallback;
pub use crate::stream::Stream;
pub use crate::stream::WindowCallback;
pub use crate::stream::WriteCallback;

mod defer;
mod error;
mod feedback;
mod stream;

#[cfg(test)]
mod test_utils;
