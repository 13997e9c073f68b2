// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The elastic buffer between ingress and the output sequencer.
//!
//! A circular queue of [`FIFO_DEPTH`] slots addressed by 4-bit read
//! and write pointers. It is full when advancing the write pointer
//! would make it equal to the read pointer, and empty when the two
//! are equal, so one slot is always unused.

/// The number of storage slots.
pub const FIFO_DEPTH: usize = 16;

/// The most entries the buffer can hold at once.
pub const FIFO_USABLE: usize = FIFO_DEPTH - 1;

const PTR_MASK: u8 = (FIFO_DEPTH - 1) as u8;

#[derive(Debug)]
pub struct ElasticBuffer<T> {
    slots: [Option<T>; FIFO_DEPTH],
    wr: u8,
    rd: u8,
}

/// What happened to the buffer across one clock edge.
#[derive(Debug, Eq, PartialEq)]
pub struct FifoCycle<T> {
    /// The offered entry was stored.
    pub accepted: bool,
    /// The entry handed to the consumer, if any.
    pub drained: Option<T>,
}

impl<T> Default for ElasticBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ElasticBuffer<T> {
    pub fn new() -> Self {
        Self { slots: core::array::from_fn(|_| None), wr: 0, rd: 0 }
    }

    #[inline]
    fn next(ptr: u8) -> u8 {
        ptr.wrapping_add(1) & PTR_MASK
    }

    pub fn is_empty(&self) -> bool {
        self.wr == self.rd
    }

    pub fn is_full(&self) -> bool {
        Self::next(self.wr) == self.rd
    }

    /// Upstream ready: deasserted exactly when the buffer is full.
    pub fn ready(&self) -> bool {
        !self.is_full()
    }

    pub fn len(&self) -> usize {
        usize::from(self.wr.wrapping_sub(self.rd) & PTR_MASK)
    }

    /// The entry the next drain would return.
    pub fn peek(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        self.slots[usize::from(self.rd)].as_ref()
    }

    /// Store `val`, or hand it back if the buffer is full.
    pub fn push(&mut self, val: T) -> Result<(), T> {
        if self.is_full() {
            return Err(val);
        }
        self.slots[usize::from(self.wr)] = Some(val);
        self.wr = Self::next(self.wr);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let val = self.slots[usize::from(self.rd)].take();
        self.rd = Self::next(self.rd);
        val
    }

    /// Advance one clock edge.
    ///
    /// Both the full and empty conditions are those at the start of
    /// the cycle: an entry drained this cycle does not make room for
    /// this cycle's offer, and an entry accepted this cycle cannot be
    /// drained until the next.
    pub fn cycle(&mut self, offer: Option<T>, drain: bool) -> FifoCycle<T> {
        let can_accept = self.ready();
        let can_drain = !self.is_empty();

        let drained = if drain && can_drain { self.pop() } else { None };
        let accepted = match offer {
            Some(val) if can_accept => self.push(val).is_ok(),
            _ => false,
        };

        FifoCycle { accepted, drained }
    }

    /// The raw (write, read) pointers.
    #[cfg(any(feature = "test-help", test))]
    pub fn pointers(&self) -> (u8, u8) {
        (self.wr, self.rd)
    }
}
