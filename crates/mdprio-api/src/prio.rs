// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Priority levels and exchange rules.

use super::ip::Ipv4Addr;
use alloc::string::String;
use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

/// The width of the priority tag, in bits.
pub const PRIORITY_BITS: u32 = 4;

/// Destination port carrying critical market data.
pub const PORT_CRITICAL_MD: u16 = 1234;

/// Destination port carrying order entry traffic.
pub const PORT_ORDER_ENTRY: u16 = 5678;

/// Destination port carrying market status traffic.
pub const PORT_MARKET_STATUS: u16 = 9012;

/// The urgency tag attached to a packet. Higher is more urgent.
///
/// The value always fits in [`PRIORITY_BITS`].
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const MIN: Self = Self(0);
    pub const MAX: Self = Self((1 << PRIORITY_BITS) as u8 - 1);

    /// The priority of a packet that matched neither an override
    /// port nor an exchange rule. It is also the priority of an
    /// unconfigured rule slot.
    pub const DEFAULT: Self = Self(1);

    /// Packets at or above this level count as high priority.
    pub const HIGH_THRESHOLD: Self = Self(12);

    pub const fn new(val: u8) -> Option<Self> {
        if val <= Self::MAX.0 { Some(Self(val)) } else { None }
    }

    /// Keep only the low [`PRIORITY_BITS`] of `raw`, the way a
    /// register of that width would.
    pub const fn from_bits_truncate(raw: u32) -> Self {
        Self((raw & Self::MAX.0 as u32) as u8)
    }

    pub const fn val(self) -> u8 {
        self.0
    }

    pub const fn is_high(self) -> bool {
        self.0 >= Self::HIGH_THRESHOLD.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        Self::new(val).ok_or_else(|| {
            format!("priority {val} exceeds maximum {}", Self::MAX.0)
        })
    }
}

impl From<Priority> for u8 {
    fn from(prio: Priority) -> u8 {
        prio.0
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The fixed priority of a well-known destination port, if any.
///
/// The ports are listed from most to least urgent.
pub const fn override_priority(dst_port: u16) -> Option<Priority> {
    match dst_port {
        PORT_CRITICAL_MD => Some(Priority(15)),
        PORT_ORDER_ENTRY => Some(Priority(14)),
        PORT_MARKET_STATUS => Some(Priority(13)),
        _ => None,
    }
}

/// One slot of the classification table: traffic to or from `addr`
/// on `port` is tagged with `priority`.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize,
)]
pub struct ExchangeRule {
    pub addr: Ipv4Addr,
    pub port: u16,
    pub priority: Priority,
}

impl Display for ExchangeRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{} => {}", self.addr, self.port, self.priority)
    }
}
