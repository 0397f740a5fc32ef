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

use std::cmp;

use std::collections::VecDeque;

/// Receive-side stream buffer.
///
/// Data received from the peer that the application has not asked for yet is
/// kept here in arrival order, and handed out from the front on the next
/// read.
#[derive(Debug, Default)]
pub struct ReadBuf {
    /// Bytes received but not yet consumed.
    data: VecDeque<u8>,
}

impl ReadBuf {
    /// Creates a new, empty read buffer.
    pub fn new() -> ReadBuf {
        ReadBuf::default()
    }

    /// Appends the given bytes at the end of the buffer.
    pub fn add(&mut self, bytes: &[u8]) {
        self.data.extend(bytes);
    }

    /// Moves up to `out.len()` bytes from the front of the buffer into `out`.
    ///
    /// Returns the number of bytes moved.
    pub fn consume(&mut self, out: &mut [u8]) -> usize {
        let len = cmp::min(out.len(), self.data.len());

        let (front, back) = self.data.as_slices();

        let from_front = cmp::min(len, front.len());
        out[..from_front].copy_from_slice(&front[..from_front]);

        let from_back = len - from_front;
        out[from_front..len].copy_from_slice(&back[..from_back]);

        self.data.drain(..len);

        len
    }

    /// Appends `bytes` and then consumes into `out`.
    ///
    /// When the buffer is empty the bytes are copied straight into `out`, and
    /// only the part that doesn't fit is buffered.
    pub fn add_and_consume(&mut self, bytes: &[u8], out: &mut [u8]) -> usize {
        if !self.data.is_empty() {
            self.add(bytes);
            return self.consume(out);
        }

        let len = cmp::min(out.len(), bytes.len());
        out[..len].copy_from_slice(&bytes[..len]);

        self.add(&bytes[len..]);

        len
    }

    /// Returns the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if there are no buffered bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drops all buffered bytes.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}
