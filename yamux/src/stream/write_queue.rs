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

use smallvec::SmallVec;

use crate::Error;
use crate::Result;

/// A single buffered write, together with whatever the stream needs to
/// complete it.
#[derive(Debug)]
struct WriteItem<C> {
    /// The payload of the write.
    data: Vec<u8>,

    /// The offset of the first byte of the payload within the stream.
    off: u64,

    /// Whether this was a partial (`write_some`) write.
    some: bool,

    /// Completion token, handed back once the whole payload is acked.
    cb: C,
}

impl<C> WriteItem<C> {
    fn max_off(&self) -> u64 {
        self.off + self.data.len() as u64
    }
}

/// Send-side stream buffer.
///
/// Writes are queued in FIFO order. Three offsets track the stream's output:
/// `off` is the end of everything enqueued, `emit_off` the end of what was
/// handed to the session, and `ack_off` the end of what the session reported
/// as written to the wire. Bytes between `emit_off` and `off` are queued,
/// bytes between `ack_off` and `emit_off` are in flight.
///
/// Each item carries a completion token of type `C`, returned by
/// [`ack()`](WriteQueue::ack) once the item's last byte is acked.
#[derive(Debug)]
pub struct WriteQueue<C> {
    /// Pending writes, ordered by offset.
    items: VecDeque<WriteItem<C>>,

    /// The index of the item that needs to be sent next.
    pos: usize,

    /// The maximum offset of data enqueued.
    off: u64,

    /// The maximum offset of data dequeued for sending.
    emit_off: u64,

    /// The maximum offset of data acked by the session.
    ack_off: u64,

    /// The maximum number of unacked bytes allowed in the queue.
    limit: usize,
}

impl<C> WriteQueue<C> {
    /// Creates a new write queue holding at most `limit` unacked bytes.
    pub fn new(limit: usize) -> WriteQueue<C> {
        WriteQueue {
            items: VecDeque::new(),
            pos: 0,
            off: 0,
            emit_off: 0,
            ack_off: 0,
            limit,
        }
    }

    /// Returns true if `len` more bytes fit under the queue limit.
    pub fn can_enqueue(&self, len: usize) -> bool {
        self.len().saturating_add(len) <= self.limit
    }

    /// Appends a write at the end of the queue.
    ///
    /// Callers are expected to check [`can_enqueue()`] first.
    ///
    /// [`can_enqueue()`]: WriteQueue::can_enqueue
    pub fn enqueue(&mut self, data: &[u8], some: bool, cb: C) {
        debug_assert!(self.can_enqueue(data.len()));

        self.items.push_back(WriteItem {
            data: data.to_vec(),
            off: self.off,
            some,
            cb,
        });

        self.off += data.len() as u64;
    }

    /// Takes the next chunk of at most `credit` bytes to be sent.
    ///
    /// A chunk never spans more than one item: if the next item is larger
    /// than `credit` only its first `credit` bytes are returned and the rest
    /// stays at the front of the queue.
    ///
    /// Returns the chunk (empty when there is nothing to send or no credit),
    /// the `some` flag of the item it belongs to, and the credit left.
    pub fn dequeue(&mut self, credit: usize) -> (&[u8], bool, usize) {
        if credit == 0 {
            return (&[], false, credit);
        }

        let item = match self.items.get(self.pos) {
            Some(v) => v,

            None => return (&[], false, credit),
        };

        let start = (self.emit_off - item.off) as usize;
        let len = cmp::min(credit, item.data.len() - start);

        self.emit_off += len as u64;

        if self.emit_off == item.max_off() {
            self.pos += 1;
        }

        (&item.data[start..start + len], item.some, credit - len)
    }

    /// Marks `len` in-flight bytes as written to the wire.
    ///
    /// Returns the completion tokens of the items that became fully acked, in
    /// FIFO order, each with the length of its write. A partially acked item
    /// stays queued.
    ///
    /// Acking more bytes than are in flight is an accounting error and
    /// returns [`Error::InternalError`] without changing the queue.
    pub fn ack(&mut self, len: usize) -> Result<SmallVec<[(C, usize); 4]>> {
        if len as u64 > self.in_flight() as u64 {
            return Err(Error::InternalError);
        }

        self.ack_off += len as u64;

        let mut done = SmallVec::new();

        while let Some(item) = self.items.front() {
            if item.max_off() > self.ack_off {
                break;
            }

            if let Some(item) = self.items.pop_front() {
                done.push((item.cb, item.data.len()));
            }

            self.pos = self.pos.saturating_sub(1);
        }

        Ok(done)
    }

    /// Hands the completion token of each remaining item to `f`, in FIFO
    /// order, until `f` returns false.
    ///
    /// Items whose token was visited are removed, the others are left for
    /// the caller to [`clear()`].
    ///
    /// [`clear()`]: WriteQueue::clear
    pub fn broadcast<F: FnMut(C) -> bool>(&mut self, mut f: F) {
        while let Some(item) = self.items.pop_front() {
            self.pos = self.pos.saturating_sub(1);
            self.ack_off = cmp::max(self.ack_off, item.max_off());
            self.emit_off = cmp::max(self.emit_off, self.ack_off);

            if !f(item.cb) {
                break;
            }
        }
    }

    /// Drops all remaining items without completing them.
    pub fn clear(&mut self) {
        self.items.clear();
        self.pos = 0;
        self.emit_off = self.off;
        self.ack_off = self.off;
    }

    /// Returns the number of enqueued bytes not yet acked.
    pub fn len(&self) -> usize {
        (self.off - self.ack_off) as usize
    }

    /// Returns true if there are no unacked bytes.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the number of bytes dequeued but not yet acked.
    pub fn in_flight(&self) -> usize {
        (self.emit_off - self.ack_off) as usize
    }

    /// Returns the number of bytes enqueued but not yet dequeued.
    pub fn queued(&self) -> usize {
        (self.off - self.emit_off) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(done: SmallVec<[(u32, usize); 4]>) -> Vec<(u32, usize)> {
        done.into_iter().collect()
    }

    #[test]
    fn admission() {
        let mut q = WriteQueue::new(10);

        assert!(q.can_enqueue(10));
        assert!(!q.can_enqueue(11));

        q.enqueue(b"abcdef", false, 1);
        assert!(q.can_enqueue(4));
        assert!(!q.can_enqueue(5));
        assert_eq!(q.len(), 6);
        assert_eq!(q.queued(), 6);

        // Dequeued but unacked bytes still count against the limit.
        let (chunk, ..) = q.dequeue(6);
        assert_eq!(chunk.len(), 6);
        assert!(!q.can_enqueue(5));

        assert_eq!(tags(q.ack(6).unwrap()), vec![(1, 6)]);
        assert!(q.can_enqueue(10));
    }

    #[test]
    fn dequeue_zero_credit() {
        let mut q = WriteQueue::new(10);
        q.enqueue(b"abc", false, 1);

        let (chunk, some, credit) = q.dequeue(0);
        assert!(chunk.is_empty());
        assert!(!some);
        assert_eq!(credit, 0);
        assert_eq!(q.queued(), 3);
    }

    #[test]
    fn dequeue_empty_queue() {
        let mut q: WriteQueue<u32> = WriteQueue::new(10);

        let (chunk, _, credit) = q.dequeue(5);
        assert!(chunk.is_empty());
        assert_eq!(credit, 5);
    }

    #[test]
    fn dequeue_splits_head() {
        let mut q = WriteQueue::new(16);
        q.enqueue(b"abcdef", false, 1);
        q.enqueue(b"gh", true, 2);

        let (chunk, some, credit) = q.dequeue(4);
        assert_eq!(chunk, b"abcd");
        assert!(!some);
        assert_eq!(credit, 0);

        let (chunk, some, credit) = q.dequeue(10);
        assert_eq!(chunk, b"ef");
        assert!(!some);
        assert_eq!(credit, 8);

        let (chunk, some, credit) = q.dequeue(credit);
        assert_eq!(chunk, b"gh");
        assert!(some);
        assert_eq!(credit, 6);

        let (chunk, _, credit) = q.dequeue(credit);
        assert!(chunk.is_empty());
        assert_eq!(credit, 6);

        assert_eq!(q.in_flight(), 8);
        assert_eq!(q.queued(), 0);
    }

    #[test]
    fn partial_ack_completes_nothing() {
        let mut q = WriteQueue::new(16);
        q.enqueue(b"abcdef", false, 1);
        q.dequeue(6);

        assert!(q.ack(4).unwrap().is_empty());
        assert_eq!(q.len(), 2);

        assert_eq!(tags(q.ack(2).unwrap()), vec![(1, 6)]);
        assert!(q.is_empty());
    }

    #[test]
    fn ack_completes_in_order() {
        let mut q = WriteQueue::new(32);
        q.enqueue(b"ab", false, 1);
        q.enqueue(b"cd", false, 2);
        q.enqueue(b"ef", false, 3);

        q.dequeue(32);
        q.dequeue(32);
        q.dequeue(32);

        assert_eq!(tags(q.ack(5).unwrap()), vec![(1, 2), (2, 2)]);
        assert_eq!(tags(q.ack(1).unwrap()), vec![(3, 2)]);
    }

    #[test]
    fn ack_more_than_in_flight() {
        let mut q = WriteQueue::new(16);
        q.enqueue(b"abcdef", false, 1);

        // Nothing was dequeued yet.
        assert_eq!(q.ack(1), Err(Error::InternalError));

        q.dequeue(3);
        assert_eq!(q.ack(4), Err(Error::InternalError));

        // The failed ack didn't change anything.
        assert_eq!(q.in_flight(), 3);
        assert!(q.ack(3).unwrap().is_empty());
    }

    #[test]
    fn enqueue_after_partial_dequeue() {
        let mut q = WriteQueue::new(16);
        q.enqueue(b"abc", false, 1);

        let (chunk, ..) = q.dequeue(2);
        assert_eq!(chunk, b"ab");

        q.enqueue(b"de", false, 2);

        let (chunk, ..) = q.dequeue(16);
        assert_eq!(chunk, b"c");

        let (chunk, ..) = q.dequeue(16);
        assert_eq!(chunk, b"de");

        assert_eq!(tags(q.ack(5).unwrap()), vec![(1, 3), (2, 2)]);
    }

    #[test]
    fn broadcast_all() {
        let mut q = WriteQueue::new(16);
        q.enqueue(b"a", false, 1);
        q.enqueue(b"b", false, 2);
        q.dequeue(1);

        let mut seen = Vec::new();
        q.broadcast(|cb| {
            seen.push(cb);
            true
        });

        assert_eq!(seen, vec![1, 2]);
        assert!(q.is_empty());
    }

    #[test]
    fn broadcast_stops_early() {
        let mut q = WriteQueue::new(16);
        q.enqueue(b"a", false, 1);
        q.enqueue(b"b", false, 2);
        q.enqueue(b"c", false, 3);

        let mut seen = Vec::new();
        q.broadcast(|cb| {
            seen.push(cb);
            cb != 2
        });

        assert_eq!(seen, vec![1, 2]);
        assert!(!q.is_empty());

        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn clear_drops_everything() {
        let mut q = WriteQueue::new(16);
        q.enqueue(b"abc", false, 1);
        q.dequeue(2);

        q.clear();

        assert!(q.is_empty());
        assert_eq!(q.in_flight(), 0);
        assert_eq!(q.queued(), 0);
        assert!(q.can_enqueue(16));
        assert_eq!(q.ack(1), Err(Error::InternalError));
    }
}
