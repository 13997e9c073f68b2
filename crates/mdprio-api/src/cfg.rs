// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The register interface used to program the classification table.

use super::ip::Ipv4Addr;
use super::prio::ExchangeRule;
use super::prio::Priority;
use alloc::string::String;
use core::fmt;
use core::fmt::Display;
use core::str::FromStr;
use serde::Deserialize;
use serde::Serialize;

const CLASS_SHIFT: u16 = 8;
const SLOT_MASK: u16 = 0x00FF;

/// Which per-slot field a configuration write targets.
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
#[repr(u8)]
pub enum RegClass {
    Addr = 0,
    Port = 1,
    Priority = 2,
}

impl TryFrom<u8> for RegClass {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Addr),
            1 => Ok(Self::Port),
            2 => Ok(Self::Priority),
            _ => Err(raw),
        }
    }
}

impl FromStr for RegClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "addr" => Ok(Self::Addr),
            "port" => Ok(Self::Port),
            "priority" | "prio" => Ok(Self::Priority),
            _ => Err(format!("invalid register class: {s}")),
        }
    }
}

impl Display for RegClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Addr => "addr",
            Self::Port => "port",
            Self::Priority => "priority",
        };
        write!(f, "{s}")
    }
}

/// A configuration register address.
///
/// Bits 15..8 hold the [`RegClass`] and bits 7..0 hold the slot
/// index. Any 16-bit value is a representable address; whether it
/// names a real register is decided by the table it is written to.
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
pub struct CfgAddr(pub u16);

impl CfgAddr {
    pub const fn new(class: RegClass, slot: u8) -> Self {
        Self(((class as u16) << CLASS_SHIFT) | slot as u16)
    }

    /// Decode the register class, or return the raw class bits if
    /// they name no class.
    pub fn class(self) -> Result<RegClass, u8> {
        RegClass::try_from((self.0 >> CLASS_SHIFT) as u8)
    }

    pub const fn slot(self) -> u8 {
        (self.0 & SLOT_MASK) as u8
    }
}

impl Display for CfgAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.class() {
            Ok(class) => write!(f, "{class}[{}]", self.slot()),
            Err(raw) => write!(f, "?{raw:#04x}[{}]", self.slot()),
        }
    }
}

/// A single write presented on the configuration port.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize,
)]
pub struct CfgWrite {
    pub addr: CfgAddr,
    pub data: u32,
}

impl CfgWrite {
    pub fn new(class: RegClass, slot: u8, data: u32) -> Self {
        Self { addr: CfgAddr::new(class, slot), data }
    }

    /// The three writes which fully program `slot` with `rule`.
    pub fn for_rule(slot: u8, rule: &ExchangeRule) -> [Self; 3] {
        [
            Self::new(RegClass::Addr, slot, u32::from(rule.addr)),
            Self::new(RegClass::Port, slot, u32::from(rule.port)),
            Self::new(
                RegClass::Priority,
                slot,
                u32::from(rule.priority.val()),
            ),
        ]
    }
}

impl Display for CfgWrite {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} <- {:#010x}", self.addr, self.data)
    }
}

/// An operator-supplied definition of one trading venue's traffic.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ExchangeDef {
    /// A human-friendly name, e.g. "XNAS-ITCH".
    pub name: String,
    pub addr: Ipv4Addr,
    pub port: u16,
    pub priority: Priority,
}

impl ExchangeDef {
    pub fn rule(&self) -> ExchangeRule {
        ExchangeRule {
            addr: self.addr,
            port: self.port,
            priority: self.priority,
        }
    }
}
