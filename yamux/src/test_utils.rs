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

use std::cell::RefCell;
use std::rc::Rc;

use std::net::SocketAddr;

use crate::*;

/// A frame the stream asked the session to emit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Data {
        stream_id: u32,
        data: Vec<u8>,
        some: bool,
    },

    WindowUpdate {
        stream_id: u32,
        delta: usize,
    },

    Fin {
        stream_id: u32,
    },

    Rst {
        stream_id: u32,
    },
}

/// A session stand-in that records emitted frames and queues deferred calls.
#[derive(Debug, Default)]
pub struct Session {
    frames: RefCell<Vec<Frame>>,

    queue: DeferQueue,
}

impl Session {
    pub fn new() -> Rc<Session> {
        Rc::new(Session::default())
    }

    /// Returns and forgets the frames emitted so far.
    pub fn take_frames(&self) -> Vec<Frame> {
        std::mem::take(&mut *self.frames.borrow_mut())
    }

    /// Runs deferred calls, returning how many ran.
    pub fn run(&self) -> usize {
        self.queue.run()
    }

    pub fn pending_calls(&self) -> usize {
        self.queue.len()
    }
}

impl StreamFeedback for Session {
    fn write_stream_data(&self, stream_id: u32, data: &[u8], some: bool) {
        self.frames.borrow_mut().push(Frame::Data {
            stream_id,
            data: data.to_vec(),
            some,
        });
    }

    fn ack_received_bytes(&self, stream_id: u32, delta: usize) {
        self.frames
            .borrow_mut()
            .push(Frame::WindowUpdate { stream_id, delta });
    }

    fn stream_closed(&self, stream_id: u32) {
        self.frames.borrow_mut().push(Frame::Fin { stream_id });
    }

    fn reset_stream(&self, stream_id: u32) {
        self.frames.borrow_mut().push(Frame::Rst { stream_id });
    }

    fn defer_call(&self, f: Box<dyn FnOnce()>) {
        self.queue.defer(f);
    }
}

/// A secure connection between two fixed loopback addresses.
pub struct Loopback;

impl Loopback {
    pub fn local_addr() -> SocketAddr {
        "127.0.0.1:1234".parse().unwrap()
    }

    pub fn remote_addr() -> SocketAddr {
        "127.0.0.1:4321".parse().unwrap()
    }

    pub fn remote_peer() -> PeerId {
        PeerId::from_bytes(b"remote-peer")
    }
}

impl SecureConnection for Loopback {
    fn remote_peer(&self) -> Result<PeerId> {
        Ok(Loopback::remote_peer())
    }

    fn is_initiator(&self) -> Result<bool> {
        Ok(true)
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(Loopback::local_addr())
    }

    fn remote_addr(&self) -> Result<SocketAddr> {
        Ok(Loopback::remote_addr())
    }
}

/// Creates a stream with ID 1 and the given initial and maximum windows.
pub fn stream(window: usize, max_window: usize) -> (Rc<Session>, Stream) {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut config = Config::new();
    config.set_window_size(window);
    config.set_max_window_size(max_window);
    config.set_write_queue_limit(max_window);

    let session = Session::new();
    let stream =
        Stream::new(1, &config, session.clone(), Rc::new(Loopback)).unwrap();

    (session, stream)
}

/// Records the results delivered to callbacks, in order.
pub struct Recorder<T>(Rc<RefCell<Vec<T>>>);

impl<T: Clone + 'static> Recorder<T> {
    pub fn new() -> Recorder<T> {
        Recorder(Rc::new(RefCell::new(Vec::new())))
    }

    pub fn results(&self) -> Vec<T> {
        self.0.borrow().clone()
    }

    /// Returns a callback recording its single argument.
    pub fn cb(&self) -> impl FnOnce(T) + 'static {
        let seen = Rc::clone(&self.0);
        move |v| seen.borrow_mut().push(v)
    }
}

impl Recorder<(Result<usize>, Vec<u8>)> {
    /// Returns a read callback recording the result and the buffer.
    pub fn read_cb(&self) -> impl FnOnce(Result<usize>, Vec<u8>) + 'static {
        let seen = Rc::clone(&self.0);
        move |res, out| seen.borrow_mut().push((res, out))
    }
}
