// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Pipeline counters.
//!
//! The pipeline is the only writer. Readers (a telemetry exporter, the
//! admin tool, tests) may hold an `Arc<PipelineStats>` on another
//! thread and read at any time; see [`StatsSnap`] for the consistency
//! caveat.

use crate::api::Priority;
use crate::api::StatsSnap;
use core::sync::atomic::AtomicU64;
use core::sync::atomic::Ordering;

/// A 64-bit unsigned counter which may be read from any thread.
#[derive(Debug, Default)]
pub struct StatU64 {
    value: AtomicU64,
}

impl StatU64 {
    pub const fn new() -> Self {
        Self { value: AtomicU64::new(0) }
    }

    #[inline]
    pub fn incr(&self) {
        self.add(1);
    }

    /// Add `n`, wrapping on overflow.
    #[inline]
    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn set(&self, val: u64) {
        self.value.store(val, Ordering::Relaxed);
    }

    #[inline]
    pub fn val(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct PipelineStats {
    /// The free-running cycle counter; wraps silently.
    cycles: StatU64,

    /// The number of end-of-packet beats accepted downstream.
    packets: StatU64,

    /// The number of completed packets emitted at or above
    /// [`Priority::HIGH_THRESHOLD`].
    high_prio_packets: StatU64,

    /// The value of `cycles` sampled at the most recent packet
    /// completion.
    last_completion_ts: StatU64,

    /// The number of beats accepted into the elastic buffer.
    ingress_accepted: StatU64,

    /// The number of offered beats refused by back-pressure.
    ingress_refused: StatU64,

    /// The number of configuration writes addressing a real register.
    cfg_applied: StatU64,

    /// The number of configuration writes addressing no register.
    cfg_dropped: StatU64,

    /// The number of packets cut short by the start of the next.
    truncated_packets: StatU64,

    /// The number of stall episodes flagged by the watchdog.
    stalls: StatU64,

    /// The number of beats forwarded on the bypass path.
    bypass_beats: StatU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the cycle counter and return the cycle being
    /// evaluated.
    pub(crate) fn tick(&self) -> u64 {
        self.cycles.value.fetch_add(1, Ordering::Relaxed)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.val()
    }

    /// Record a packet completion on the egress handshake at `now`.
    pub(crate) fn packet_done(&self, priority: Priority, now: u64) {
        self.packets.incr();
        if priority.is_high() {
            self.high_prio_packets.incr();
        }
        self.last_completion_ts.set(now);
    }

    pub(crate) fn ingress(&self, accepted: bool) {
        if accepted {
            self.ingress_accepted.incr();
        } else {
            self.ingress_refused.incr();
        }
    }

    pub(crate) fn cfg(&self, applied: bool) {
        if applied {
            self.cfg_applied.incr();
        } else {
            self.cfg_dropped.incr();
        }
    }

    pub(crate) fn truncated(&self) {
        self.truncated_packets.incr();
    }

    pub(crate) fn stall(&self) {
        self.stalls.incr();
    }

    pub(crate) fn bypass(&self) {
        self.bypass_beats.incr();
    }

    pub fn packets(&self) -> u64 {
        self.packets.val()
    }

    pub fn high_prio_packets(&self) -> u64 {
        self.high_prio_packets.val()
    }

    /// Return a snapshot of the stats. This is how you obtain a copy,
    /// as opposed to the traditional clone().
    pub fn snapshot(&self) -> StatsSnap {
        StatsSnap {
            cycles: self.cycles.val(),
            packets: self.packets.val(),
            high_prio_packets: self.high_prio_packets.val(),
            last_completion_ts: self.last_completion_ts.val(),
            ingress_accepted: self.ingress_accepted.val(),
            ingress_refused: self.ingress_refused.val(),
            cfg_applied: self.cfg_applied.val(),
            cfg_dropped: self.cfg_dropped.val(),
            truncated_packets: self.truncated_packets.val(),
            stalls: self.stalls.val(),
            bypass_beats: self.bypass_beats.val(),
        }
    }

    /// Preload the cycle counter, e.g. to exercise wrap-around.
    #[cfg(any(feature = "test-help", test))]
    pub fn set_cycles(&self, val: u64) {
        self.cycles.set(val);
    }
}
