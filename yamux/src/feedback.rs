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

use std::net::SocketAddr;

use crate::Result;

/// The interface a stream uses to talk back to the session that owns it.
///
/// Every method is invoked synchronously from within a stream method. The
/// session must not call back into the stream from these methods; anything
/// that needs to run later goes through [`defer_call()`].
///
/// [`defer_call()`]: StreamFeedback::defer_call
pub trait StreamFeedback {
    /// Emits a DATA frame carrying `data` for the given stream.
    ///
    /// Once the bytes are physically written, the session reports them back
    /// through [`Stream::on_data_written()`].
    ///
    /// [`Stream::on_data_written()`]: crate::Stream::on_data_written
    fn write_stream_data(&self, stream_id: u32, data: &[u8], some: bool);

    /// Emits a WINDOW_UPDATE frame granting the peer `delta` more bytes.
    fn ack_received_bytes(&self, stream_id: u32, delta: usize);

    /// Emits a FIN for the given stream.
    fn stream_closed(&self, stream_id: u32);

    /// Emits a RST for the given stream and drops it from the routing table.
    fn reset_stream(&self, stream_id: u32);

    /// Schedules `f` to run later on the session's execution context.
    fn defer_call(&self, f: Box<dyn FnOnce()>);
}

/// Identity of a remote peer, as established by the secure transport.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PeerId(Vec<u8>);

impl PeerId {
    /// Creates a peer identity from its binary representation.
    pub fn from_bytes(bytes: &[u8]) -> PeerId {
        PeerId(bytes.to_vec())
    }

    /// Returns the binary representation of the identity.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// The secure connection that all streams of a session share.
///
/// Streams only use it to answer identity queries.
pub trait SecureConnection {
    /// Returns the identity of the remote peer.
    fn remote_peer(&self) -> Result<PeerId>;

    /// Returns true if the local endpoint initiated the connection.
    fn is_initiator(&self) -> Result<bool>;

    /// Returns the local address of the connection.
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Returns the remote address of the connection.
    fn remote_addr(&self) -> Result<SocketAddr>;
}
