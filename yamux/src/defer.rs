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

use std::collections::VecDeque;

/// A FIFO of calls deferred to a later point on the same thread.
///
/// This is the simplest way for a session to implement
/// [`StreamFeedback::defer_call()`]: push the call here, and drain the queue
/// with [`run()`] once the session is done dispatching the current event.
///
/// The queue is only borrowed while pushing or popping, so calls are free to
/// defer more calls while it is being drained.
///
/// [`StreamFeedback::defer_call()`]: crate::StreamFeedback::defer_call
/// [`run()`]: DeferQueue::run
#[derive(Default)]
pub struct DeferQueue {
    calls: RefCell<VecDeque<Box<dyn FnOnce()>>>,
}

impl DeferQueue {
    /// Creates an empty queue.
    pub fn new() -> DeferQueue {
        DeferQueue::default()
    }

    /// Appends a call at the end of the queue.
    pub fn defer(&self, f: Box<dyn FnOnce()>) {
        self.calls.borrow_mut().push_back(f);
    }

    /// Runs queued calls in order until the queue is empty, including calls
    /// deferred while running.
    ///
    /// Returns the number of calls that ran.
    pub fn run(&self) -> usize {
        let mut ran = 0;

        loop {
            let call = self.calls.borrow_mut().pop_front();

            match call {
                Some(f) => f(),

                None => break,
            }

            ran += 1;
        }

        ran
    }

    /// Returns the number of queued calls.
    pub fn len(&self) -> usize {
        self.calls.borrow().len()
    }

    /// Returns true if no calls are queued.
    pub fn is_empty(&self) -> bool {
        self.calls.borrow().is_empty()
    }
}

impl std::fmt::Debug for DeferQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("DeferQueue")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::rc::Rc;

    #[test]
    fn runs_in_order() {
        let queue = DeferQueue::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for i in 0..3 {
            let seen = Rc::clone(&seen);
            queue.defer(Box::new(move || seen.borrow_mut().push(i)));
        }

        assert_eq!(queue.len(), 3);
        assert!(seen.borrow().is_empty());

        assert_eq!(queue.run(), 3);
        assert_eq!(*seen.borrow(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn nested_defer() {
        let queue = Rc::new(DeferQueue::new());
        let seen = Rc::new(RefCell::new(Vec::new()));

        let inner_queue = Rc::clone(&queue);
        let inner_seen = Rc::clone(&seen);
        queue.defer(Box::new(move || {
            inner_seen.borrow_mut().push("outer");

            let seen = Rc::clone(&inner_seen);
            inner_queue
                .defer(Box::new(move || seen.borrow_mut().push("inner")));
        }));

        assert_eq!(queue.run(), 2);
        assert_eq!(*seen.borrow(), vec!["outer", "inner"]);
    }

    #[test]
    fn run_empty() {
        let queue = DeferQueue::new();
        assert_eq!(queue.run(), 0);
    }
}
