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

/// A specialized [`Result`] type for Yamux stream operations.
///
/// This type is used throughout the crate's public API for any operation that
/// can produce an error.
///
/// [`Result`]: https://doc.rust-lang.org/std/result/enum.Result.html
pub type Result<T> = std::result::Result<T, Error>;

/// A Yamux stream error.
///
/// Errors are reported to the client through the callback of the operation
/// that produced them. Once a stream is closed, the terminal error is sticky
/// and every later operation completes with it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The arguments of the operation are invalid, e.g. a zero length or an
    /// output buffer shorter than the requested length.
    InvalidArgument,

    /// A read is already in progress on the stream.
    StreamIsReading,

    /// The stream was closed for reading by the peer.
    StreamNotReadable,

    /// The stream was closed for writing by the local endpoint.
    StreamNotWritable,

    /// The write would exceed the stream's write queue limit.
    StreamWriteBufferOverflow,

    /// The requested receive window is larger than the maximum window, or
    /// smaller than the current one.
    InvalidWindowSize,

    /// The peer sent more data than the advertised receive window allowed.
    ReceiveWindowOverflow,

    /// The stream was closed gracefully in both directions.
    StreamClosedByHost,

    /// The stream was reset by the local endpoint.
    StreamResetByHost,

    /// The stream was reset by the peer.
    StreamResetByPeer,

    /// Write accounting between the stream and its session went out of sync.
    InternalError,

    /// The session the stream belongs to was terminated.
    ///
    /// The session-level error code is provided as associated data.
    Connection(u32),
}

/// Yamux error codes sent on the wire in `GO_AWAY` frames.
///
/// As defined in the [Yamux specification](https://github.com/hashicorp/yamux/blob/master/spec.md).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WireErrorCode {
    /// Normal termination.
    NormalTermination = 0x0,
    /// The peer violated the protocol.
    ProtocolError     = 0x1,
    /// The endpoint encountered an internal error.
    InternalError     = 0x2,
}

impl Error {
    /// Returns the `GO_AWAY` code a session should use when it escalates this
    /// stream error to the whole connection.
    pub fn to_wire(self) -> u32 {
        match self {
            Error::StreamClosedByHost |
            Error::StreamResetByHost |
            Error::StreamResetByPeer => WireErrorCode::NormalTermination as u32,

            Error::ReceiveWindowOverflow => WireErrorCode::ProtocolError as u32,

            Error::Connection(code) => code,

            _ => WireErrorCode::InternalError as u32,
        }
    }

    /// Returns true if the error terminates the stream, rather than just
    /// rejecting a single operation.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Error::ReceiveWindowOverflow |
                Error::StreamClosedByHost |
                Error::StreamResetByHost |
                Error::StreamResetByPeer |
                Error::InternalError |
                Error::Connection(_)
        )
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes() {
        assert_eq!(Error::StreamResetByPeer.to_wire(), 0);
        assert_eq!(Error::ReceiveWindowOverflow.to_wire(), 1);
        assert_eq!(Error::InternalError.to_wire(), 2);
        assert_eq!(Error::InvalidArgument.to_wire(), 2);
        assert_eq!(Error::Connection(7).to_wire(), 7);
    }

    #[test]
    fn terminal_errors() {
        assert!(Error::StreamClosedByHost.is_terminal());
        assert!(Error::Connection(1).is_terminal());
        assert!(!Error::StreamIsReading.is_terminal());
        assert!(!Error::StreamWriteBufferOverflow.is_terminal());
    }

    #[test]
    fn display() {
        assert_eq!(Error::StreamNotWritable.to_string(), "StreamNotWritable");
        assert_eq!(Error::Connection(3).to_string(), "Connection(3)");
    }
}
