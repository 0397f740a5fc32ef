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

use std::cell::Cell;
use std::rc::Rc;

use std::net::SocketAddr;

use crate::Config;
use crate::Error;
use crate::PeerId;
use crate::Result;
use crate::SecureConnection;
use crate::StreamFeedback;

use self::read_buf::ReadBuf;
use self::write_queue::WriteQueue;

/// Completion callback of [`Stream::read()`] and [`Stream::read_some()`].
///
/// Receives the number of bytes read (or the error) and hands the output
/// buffer back to the caller.
pub type ReadCallback = Box<dyn FnOnce(Result<usize>, Vec<u8>)>;

/// Completion callback of [`Stream::write()`] and [`Stream::write_some()`].
///
/// On success, receives the length of the write.
pub type WriteCallback = Box<dyn FnOnce(Result<usize>)>;

/// Completion callback of [`Stream::close()`].
pub type CloseCallback = Box<dyn FnOnce(Result<()>)>;

/// Completion callback of [`Stream::adjust_window_size()`].
pub type WindowCallback = Box<dyn FnOnce(Result<()>)>;

/// What the session must do with a stream after dispatching a frame to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataFromConnectionResult {
    /// The stream stays in the routing table.
    KeepStream,

    /// The stream is done and must be removed from the routing table.
    RemoveStream,

    /// The stream must be removed, and a RST sent to the peer.
    RemoveStreamAndSendRst,
}

/// A client read waiting for data.
struct PendingRead {
    /// The caller's output buffer.
    out: Vec<u8>,

    /// How many bytes of `out` were filled so far.
    filled: usize,

    /// How many bytes the read asked for.
    len: usize,

    /// Whether the read completes with any amount of data.
    some: bool,

    cb: ReadCallback,
}

impl PendingRead {
    fn target(&mut self) -> &mut [u8] {
        &mut self.out[self.filled..self.len]
    }
}

/// A Yamux stream.
///
/// A stream is created by the session, either when the local application
/// opens it or when the peer does, and is shared between the session (which
/// routes frames to it) and the client (which reads and writes).
///
/// All methods are expected to be called from the session's execution
/// context. Client callbacks never run from within a stream method: they are
/// scheduled through [`StreamFeedback::defer_call()`].
pub struct Stream {
    /// The secure connection the stream's session runs on.
    connection: Rc<dyn SecureConnection>,

    /// The session's outbound interface.
    feedback: Rc<dyn StreamFeedback>,

    /// The stream ID on the wire.
    id: u32,

    /// Prefix used in log lines.
    trace_id: String,

    /// Bytes we may still send before the peer grants more credit.
    send_window: usize,

    /// Bytes the peer may still send before we grant more credit.
    recv_window: usize,

    /// Upper bound of both windows.
    max_window: usize,

    /// False once the peer sent FIN, or the stream is closed.
    is_readable: bool,

    /// False once the local endpoint half-closed, or the stream is closed.
    is_writable: bool,

    /// Whether the FIN was already handed to the session.
    fin_sent: bool,

    /// The terminal reason, set once the stream is closed.
    close_reason: Option<Error>,

    /// Mirrors `close_reason` for deferred window callbacks, which report
    /// it if the stream closed before they ran.
    closed_with: Rc<Cell<Option<Error>>>,

    /// Set once the client reset the stream, or the stream was dropped.
    ///
    /// Shared with every deferred callback, which check it when they run.
    no_more_callbacks: Rc<Cell<bool>>,

    /// Bytes received but not yet read by the client.
    read_buf: ReadBuf,

    /// The read in progress, if any.
    read: Option<PendingRead>,

    close_cb: Option<CloseCallback>,

    /// Writes waiting to be sent, or acked.
    write_queue: WriteQueue<WriteCallback>,
}

impl Stream {
    /// Creates a new stream with the given ID.
    ///
    /// Both windows start at the configured window size. Returns an error if
    /// the ID is zero, or the configured limits are inconsistent.
    pub fn new(
        id: u32, config: &Config, feedback: Rc<dyn StreamFeedback>,
        connection: Rc<dyn SecureConnection>,
    ) -> Result<Stream> {
        if id == 0 {
            return Err(Error::InvalidArgument);
        }

        config.validate()?;

        Ok(Stream {
            connection,
            feedback,
            id,
            trace_id: format!("yx-stream-{id}"),
            send_window: config.window_size(),
            recv_window: config.window_size(),
            max_window: config.max_window_size(),
            is_readable: true,
            is_writable: true,
            fin_sent: false,
            close_reason: None,
            closed_with: Rc::new(Cell::new(None)),
            no_more_callbacks: Rc::new(Cell::new(false)),
            read_buf: ReadBuf::new(),
            read: None,
            close_cb: None,
            write_queue: WriteQueue::new(config.write_queue_limit()),
        })
    }

    /// Reads exactly `len` bytes into `out`.
    ///
    /// `cb` is called once `len` bytes were read, or with the error that
    /// prevented it. The output buffer is handed back to `cb` either way.
    ///
    /// If the peer sends a FIN before `len` bytes arrived, `cb` gets the
    /// shorter count of bytes read so far, or [`Error::StreamNotReadable`]
    /// if there were none.
    ///
    /// Only one read may be in progress at a time; a second one fails with
    /// [`Error::StreamIsReading`].
    pub fn read<F>(&mut self, out: Vec<u8>, len: usize, cb: F)
    where
        F: FnOnce(Result<usize>, Vec<u8>) + 'static,
    {
        self.do_read(out, len, Box::new(cb), false);
    }

    /// Reads at most `len` bytes into `out`.
    ///
    /// Unlike [`read()`], `cb` is called as soon as any data is available.
    ///
    /// [`read()`]: Stream::read
    pub fn read_some<F>(&mut self, out: Vec<u8>, len: usize, cb: F)
    where
        F: FnOnce(Result<usize>, Vec<u8>) + 'static,
    {
        self.do_read(out, len, Box::new(cb), true);
    }

    /// Writes the first `len` bytes of `data`.
    ///
    /// The data is queued and sent as send credit allows. `cb` is called once
    /// all of it was written to the wire.
    ///
    /// On a closed stream the write fails with the reason the stream closed.
    /// A stream that is only closed for writes, after [`close()`], fails it
    /// with [`Error::StreamNotWritable`].
    ///
    /// [`close()`]: Stream::close
    pub fn write<F>(&mut self, data: &[u8], len: usize, cb: F)
    where
        F: FnOnce(Result<usize>) + 'static,
    {
        self.do_write_data(data, len, Box::new(cb), false);
    }

    /// Writes the first `len` bytes of `data`, allowing the session to send
    /// it in segments.
    pub fn write_some<F>(&mut self, data: &[u8], len: usize, cb: F)
    where
        F: FnOnce(Result<usize>) + 'static,
    {
        self.do_write_data(data, len, Box::new(cb), true);
    }

    /// Gracefully closes the stream for writing.
    ///
    /// Queued data is flushed first, then a FIN is sent. `cb` is called once
    /// the stream is closed in both directions: with success if that happened
    /// gracefully, with the terminal error otherwise.
    pub fn close<F>(&mut self, cb: F)
    where
        F: FnOnce(Result<()>) + 'static,
    {
        if let Some(reason) = self.close_reason {
            self.defer(move || cb(close_result(reason)));
            return;
        }

        if self.close_cb.is_some() {
            self.defer(move || cb(Err(Error::StreamNotWritable)));
            return;
        }

        self.close_cb = Some(Box::new(cb));

        if self.is_writable {
            trace!("{} closing for writes", self.trace_id);

            self.is_writable = false;

            // The FIN goes out once queued data is sent.
            self.do_write();
        }
    }

    /// Abruptly terminates the stream.
    ///
    /// Buffered data in both directions is dropped, a RST is sent, and no
    /// callback of this stream will run anymore, including ones that were
    /// already scheduled.
    pub fn reset(&mut self) {
        if self.close_reason == Some(Error::StreamResetByHost) {
            return;
        }

        trace!("{} reset by host", self.trace_id);

        self.is_readable = false;
        self.is_writable = false;
        self.no_more_callbacks.set(true);
        self.close_reason = Some(Error::StreamResetByHost);
        self.closed_with.set(self.close_reason);

        self.write_queue.clear();
        self.read_buf.clear();

        self.read = None;
        self.close_cb = None;

        self.feedback.reset_stream(self.id);
    }

    /// Grows the receive window to `new_size`.
    ///
    /// The peer is granted the difference right away, and the receive window
    /// grows with it, so `cb` does not wait for read traffic. `cb` is called
    /// with success, or with the terminal error if the stream closed before
    /// the callback ran.
    ///
    /// Fails with [`Error::InvalidWindowSize`] if `new_size` is above the
    /// maximum window size or below the current window.
    pub fn adjust_window_size<F>(&mut self, new_size: usize, cb: F)
    where
        F: FnOnce(Result<()>) + 'static,
    {
        if self.close_reason.is_some() ||
            new_size > self.max_window ||
            new_size < self.recv_window
        {
            let err = self.close_reason.unwrap_or(Error::InvalidWindowSize);
            self.defer(move || cb(Err(err)));
            return;
        }

        let delta = new_size - self.recv_window;

        if delta > 0 {
            self.feedback.ack_received_bytes(self.id, delta);
            self.recv_window = new_size;

            trace!(
                "{} recv window adjusted by {} to {}",
                self.trace_id,
                delta,
                self.recv_window
            );
        }

        let cb: WindowCallback = Box::new(cb);
        let closed_with = Rc::clone(&self.closed_with);

        self.defer(move || match closed_with.get() {
            Some(err) => cb(Err(err)),

            None => cb(Ok(())),
        });
    }

    /// Returns the stream ID.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns true if the stream is closed in both directions, gracefully
    /// or not.
    pub fn is_closed(&self) -> bool {
        self.close_reason.is_some()
    }

    /// Returns true if no more data can be read from the peer.
    pub fn is_closed_for_read(&self) -> bool {
        !self.is_readable
    }

    /// Returns true if no more data can be written.
    pub fn is_closed_for_write(&self) -> bool {
        !self.is_writable
    }

    /// Returns the reason the stream was closed with, if it was.
    pub fn close_reason(&self) -> Option<Error> {
        self.close_reason
    }

    /// Returns the remaining send credit.
    pub fn send_window(&self) -> usize {
        self.send_window
    }

    /// Returns the remaining receive credit of the peer.
    pub fn recv_window(&self) -> usize {
        self.recv_window
    }

    /// Returns the maximum window size.
    pub fn max_window(&self) -> usize {
        self.max_window
    }

    /// Returns the number of received bytes waiting to be read.
    pub fn bytes_buffered(&self) -> usize {
        self.read_buf.len()
    }

    /// Returns the number of written bytes not yet acked by the session.
    pub fn write_queue_len(&self) -> usize {
        self.write_queue.len()
    }

    /// Returns the identity of the remote peer.
    pub fn remote_peer_id(&self) -> Result<PeerId> {
        self.connection.remote_peer()
    }

    /// Returns true if the local endpoint initiated the underlying
    /// connection.
    pub fn is_initiator(&self) -> Result<bool> {
        self.connection.is_initiator()
    }

    /// Returns the local address of the underlying connection.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.connection.local_addr()
    }

    /// Returns the remote address of the underlying connection.
    pub fn remote_addr(&self) -> Result<SocketAddr> {
        self.connection.remote_addr()
    }

    /// Dispatches the body and flags of a frame received for this stream.
    ///
    /// Data is handed to the pending read if there is one, and buffered
    /// otherwise. The return value tells the session whether to keep routing
    /// frames to this stream.
    pub fn on_data_read(
        &mut self, bytes: &[u8], fin: bool, rst: bool,
    ) -> DataFromConnectionResult {
        trace!(
            "{} rx {} bytes fin={} rst={}",
            self.trace_id,
            bytes.len(),
            fin,
            rst
        );

        let mut overflow = false;
        let mut consumed = 0;

        if !bytes.is_empty() {
            overflow = bytes.len() > self.recv_window;
            self.recv_window = self.recv_window.saturating_sub(bytes.len());

            let mut read_completed = false;

            match self.read.as_mut() {
                Some(read) => {
                    debug_assert!(self.read_buf.is_empty());

                    consumed =
                        self.read_buf.add_and_consume(bytes, read.target());

                    read.filled += consumed;

                    read_completed = read.some || read.filled == read.len;
                },

                None => self.read_buf.add(bytes),
            }

            if read_completed {
                self.read_completed();
            }
        }

        if self.is_closed() {
            return DataFromConnectionResult::RemoveStreamAndSendRst;
        }

        if rst {
            trace!("{} reset by peer", self.trace_id);

            self.do_close(Error::StreamResetByPeer, false);
            return DataFromConnectionResult::RemoveStream;
        }

        if fin {
            trace!("{} closed for reads", self.trace_id);

            self.is_readable = false;

            // No more data is coming, so a read still waiting for some
            // completes with whatever it got.
            if let Some(read) = self.read.take() {
                let res = match read.filled {
                    0 => Err(Error::StreamNotReadable),
                    filled => Ok(filled),
                };

                self.defer_read_callback(res, read.out, read.cb);
            }

            if !self.is_writable {
                self.do_close(Error::StreamClosedByHost, false);
                return DataFromConnectionResult::RemoveStream;
            }

            return DataFromConnectionResult::KeepStream;
        }

        if overflow {
            debug!("{} receive window overflow", self.trace_id);

            // Data beyond the advertised window is not to be trusted.
            self.read_buf.clear();

            self.do_close(Error::ReceiveWindowOverflow, false);
            return DataFromConnectionResult::RemoveStreamAndSendRst;
        }

        // Only bytes handed to the client replenish the window. Buffered
        // ones do once a later read consumes them.
        if consumed > 0 {
            self.credit_recv_window(consumed);
        }

        DataFromConnectionResult::KeepStream
    }

    /// Reports that `len` bytes of this stream were written to the wire.
    ///
    /// Writes that are now fully written complete successfully. If `len` is
    /// more than what the stream handed to the session, the stream is reset
    /// with [`Error::InternalError`].
    pub fn on_data_written(&mut self, len: usize) {
        // Queued writes were already failed with the close reason.
        if self.is_closed() {
            return;
        }

        match self.write_queue.ack(len) {
            Ok(done) => {
                for (cb, written) in done {
                    self.defer_write_callback(Ok(written), cb);
                }
            },

            Err(e) => {
                error!(
                    "{} write queue ack of {} bytes failed, {} in flight",
                    self.trace_id,
                    len,
                    self.write_queue.in_flight()
                );

                self.feedback.reset_stream(self.id);
                self.do_close(e, true);
            },
        }
    }

    /// Adds `delta` bytes of send credit granted by the peer, and resumes
    /// sending queued data.
    pub fn on_send_window_increase(&mut self, delta: usize) {
        self.send_window =
            cmp::min(self.send_window.saturating_add(delta), self.max_window);

        trace!(
            "{} send window changed by {} to {}",
            self.trace_id,
            delta,
            self.send_window
        );

        self.do_write();
    }

    /// Terminates the stream because its session is gone.
    ///
    /// Every pending operation fails with `err`.
    pub fn closed_by_connection(&mut self, err: Error) {
        if self.is_closed() {
            return;
        }

        trace!("{} closed by connection: {:?}", self.trace_id, err);

        self.do_close(err, true);
    }

    fn do_read(
        &mut self, mut out: Vec<u8>, len: usize, cb: ReadCallback, some: bool,
    ) {
        if len == 0 || out.len() < len {
            return self.defer_read_callback(
                Err(Error::InvalidArgument),
                out,
                cb,
            );
        }

        // Data already buffered can be consumed right away.
        let available = self.read_buf.len();

        if available >= len || (some && available > 0) {
            let consumed = self.read_buf.consume(&mut out[..len]);

            if self.is_readable {
                self.credit_recv_window(consumed);
            }

            return self.defer_read_callback(Ok(consumed), out, cb);
        }

        if let Some(reason) = self.close_reason {
            return self.defer_read_callback(Err(reason), out, cb);
        }

        if self.read.is_some() {
            return self.defer_read_callback(
                Err(Error::StreamIsReading),
                out,
                cb,
            );
        }

        if !self.is_readable {
            return self.defer_read_callback(
                Err(Error::StreamNotReadable),
                out,
                cb,
            );
        }

        let mut read = PendingRead {
            out,
            filled: 0,
            len,
            some,
            cb,
        };

        if available > 0 {
            read.filled = self.read_buf.consume(read.target());
            self.credit_recv_window(read.filled);
        }

        self.read = Some(read);
    }

    fn read_completed(&mut self) {
        if let Some(read) = self.read.take() {
            self.defer_read_callback(Ok(read.filled), read.out, read.cb);
        }
    }

    fn do_write_data(
        &mut self, data: &[u8], len: usize, cb: WriteCallback, some: bool,
    ) {
        if len == 0 || data.len() < len {
            return self.defer_write_callback(Err(Error::InvalidArgument), cb);
        }

        if let Some(reason) = self.close_reason {
            return self.defer_write_callback(Err(reason), cb);
        }

        if !self.is_writable {
            return self
                .defer_write_callback(Err(Error::StreamNotWritable), cb);
        }

        if !self.write_queue.can_enqueue(len) {
            return self.defer_write_callback(
                Err(Error::StreamWriteBufferOverflow),
                cb,
            );
        }

        self.write_queue.enqueue(&data[..len], some, cb);

        self.do_write();
    }

    /// Sends as much queued data as the send window allows, then the FIN if
    /// the stream is closing for writes.
    fn do_write(&mut self) {
        while self.close_reason.is_none() {
            let (data, some, credit) =
                self.write_queue.dequeue(self.send_window);

            if data.is_empty() {
                break;
            }

            self.send_window = credit;

            trace!(
                "{} tx {} bytes, send window {}",
                self.trace_id,
                data.len(),
                self.send_window
            );

            self.feedback.write_stream_data(self.id, data, some);
        }

        if !self.is_writable &&
            !self.fin_sent &&
            self.close_reason.is_none() &&
            self.send_window > 0 &&
            self.write_queue.queued() == 0
        {
            trace!("{} tx fin", self.trace_id);

            self.fin_sent = true;
            self.feedback.stream_closed(self.id);

            if !self.is_readable {
                self.do_close(Error::StreamClosedByHost, false);
            } else {
                // Let the peer flush its side even if nobody reads.
                self.recv_window = self.max_window;
            }
        }
    }

    fn do_close(&mut self, err: Error, notify_read: bool) {
        debug_assert!(err.is_terminal());

        self.close_reason = Some(err);
        self.closed_with.set(Some(err));
        self.is_readable = false;
        self.is_writable = false;

        if notify_read {
            self.read_buf.clear();

            if let Some(read) = self.read.take() {
                self.defer_read_callback(Err(err), read.out, read.cb);
            }
        }

        if self.close_cb.is_some() {
            self.close_completed();
        }

        if !self.no_more_callbacks.get() && !self.write_queue.is_empty() {
            let feedback = &self.feedback;
            let guard = &self.no_more_callbacks;

            self.write_queue.broadcast(|cb| {
                defer(&**feedback, guard, move || cb(Err(err)));

                !guard.get()
            });

            self.write_queue.clear();
        }
    }

    fn close_completed(&mut self) {
        let reason = self.close_reason.unwrap_or(Error::StreamClosedByHost);

        if let Some(cb) = self.close_cb.take() {
            self.defer(move || cb(close_result(reason)));
        }
    }

    /// Grants the peer `len` more bytes after the client consumed them.
    fn credit_recv_window(&mut self, len: usize) {
        if len == 0 {
            return;
        }

        self.feedback.ack_received_bytes(self.id, len);
        self.recv_window = cmp::min(self.recv_window + len, self.max_window);

        trace!(
            "{} recv window changed by {} to {}",
            self.trace_id,
            len,
            self.recv_window
        );
    }

    fn defer_read_callback(
        &self, res: Result<usize>, out: Vec<u8>, cb: ReadCallback,
    ) {
        self.defer(move || cb(res, out));
    }

    fn defer_write_callback(&self, res: Result<usize>, cb: WriteCallback) {
        self.defer(move || cb(res));
    }

    fn defer<F: FnOnce() + 'static>(&self, f: F) {
        if self.no_more_callbacks.get() {
            debug!("{} callbacks disabled, dropping callback", self.trace_id);
            return;
        }

        defer(&*self.feedback, &self.no_more_callbacks, f);
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        // Callbacks still queued in the session must not outlive the stream.
        self.no_more_callbacks.set(true);
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("send_window", &self.send_window)
            .field("recv_window", &self.recv_window)
            .field("max_window", &self.max_window)
            .field("is_readable", &self.is_readable)
            .field("is_writable", &self.is_writable)
            .field("is_reading", &self.read.is_some())
            .field("close_reason", &self.close_reason)
            .field("bytes_buffered", &self.read_buf.len())
            .field("write_queue_len", &self.write_queue.len())
            .finish()
    }
}

/// Schedules `f` through the session, to run only if callbacks are still
/// enabled by then.
fn defer<F: FnOnce() + 'static>(
    feedback: &dyn StreamFeedback, guard: &Rc<Cell<bool>>, f: F,
) {
    let guard = Rc::clone(guard);

    feedback.defer_call(Box::new(move || {
        if !guard.get() {
            f();
        }
    }));
}

/// Maps a terminal reason to the result reported to close callbacks.
fn close_result(reason: Error) -> Result<()> {
    match reason {
        Error::StreamClosedByHost => Ok(()),

        e => Err(e),
    }
}


mod read_buf;
mod write_queue;
