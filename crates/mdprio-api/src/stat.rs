// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Types for reading pipeline counters and table state.

use super::prio::ExchangeRule;
use super::prio::Priority;
use alloc::vec::Vec;
use serde::Deserialize;
use serde::Serialize;

/// A point-in-time copy of the pipeline counters.
///
/// The individual values are each uncorrupted, but they are read one
/// at a time; taken as a group they may straddle a clock edge.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct StatsSnap {
    /// The free-running cycle counter.
    pub cycles: u64,
    /// Packets whose end-of-packet beat was accepted downstream.
    pub packets: u64,
    /// The subset of `packets` emitted at or above the high priority
    /// threshold.
    pub high_prio_packets: u64,
    /// The value of `cycles` at the most recent packet completion.
    pub last_completion_ts: u64,
    /// Beats accepted into the elastic buffer.
    pub ingress_accepted: u64,
    /// Offered beats refused because the elastic buffer was full.
    pub ingress_refused: u64,
    /// Configuration writes addressing a real register.
    pub cfg_applied: u64,
    /// Configuration writes naming no register.
    pub cfg_dropped: u64,
    /// Packets abandoned before their end-of-packet beat because the
    /// next packet's start arrived.
    pub truncated_packets: u64,
    /// Stall episodes flagged by the watchdog.
    pub stalls: u64,
    /// Beats forwarded by the bypass path.
    pub bypass_beats: u64,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RuleDump {
    pub slot: u8,
    pub rule: ExchangeRule,
}

/// The contents of the classification table at some epoch.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DumpRulesResp {
    pub epoch: u64,
    pub rules: Vec<RuleDump>,
}

/// One packet as it left the pipeline.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PacketRecord {
    /// The order in which the packet was offered, starting at 0.
    pub seq: u64,
    /// The number of beats the packet occupied.
    pub beats: u32,
    pub priority: Priority,
    /// The cycle on which the end-of-packet beat was accepted.
    pub done_at: u64,
}
