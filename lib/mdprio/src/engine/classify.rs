// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The classification table and the priority classifier.
//!
//! The table is a fixed number of [`ExchangeRule`] slots. It is only
//! ever changed one field at a time, through the configuration port,
//! and every change is published as a new [`Snap`] of the whole rule
//! set. The classifier is a pure function of one snapshot and the
//! latched header fields.

use super::headers::HeaderFields;
use crate::api::CfgWrite;
use crate::api::DumpRulesResp;
use crate::api::ExchangeRule;
use crate::api::Ipv4Addr;
use crate::api::Priority;
use crate::api::RegClass;
use crate::api::RuleDump;
use crate::api::override_priority;
use crate::sync::Snap;
use crate::sync::SnapCell;
use core::fmt;
use core::fmt::Display;
use slog::Logger;
use slog::debug;

/// The default number of rule slots.
pub const DEF_NUM_RULES: usize = 8;

/// The most rule slots the 8-bit slot field of a register address
/// can reach.
pub const MAX_NUM_RULES: usize = 256;

/// Why a configuration write was dropped. Dropping is silent as far
/// as the data path is concerned; this exists for counters and logs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CfgDrop {
    /// The class bits name no register class.
    BadClass(u8),
    /// The slot index is beyond the end of the table.
    BadSlot(u8),
}

impl Display for CfgDrop {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::BadClass(c) => write!(f, "bad register class: {c}"),
            Self::BadSlot(s) => write!(f, "bad slot: {s}"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RuleSet {
    rules: Vec<ExchangeRule>,
}

impl RuleSet {
    /// A table of `num_rules` unconfigured slots.
    pub fn new(num_rules: usize) -> Self {
        Self { rules: vec![ExchangeRule::default(); num_rules] }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn get(&self, slot: u8) -> Option<&ExchangeRule> {
        self.rules.get(usize::from(slot))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExchangeRule> {
        self.rules.iter()
    }

    /// Apply one register write.
    ///
    /// Returns whether the write changed the table.
    pub fn write(&mut self, w: CfgWrite) -> Result<bool, CfgDrop> {
        let class = w.addr.class().map_err(CfgDrop::BadClass)?;
        let slot = w.addr.slot();
        let rule = self
            .rules
            .get_mut(usize::from(slot))
            .ok_or(CfgDrop::BadSlot(slot))?;
        let before = *rule;

        match class {
            RegClass::Addr => rule.addr = Ipv4Addr::from(w.data),
            // The port register is 16 bits wide.
            RegClass::Port => rule.port = w.data as u16,
            RegClass::Priority => {
                rule.priority = Priority::from_bits_truncate(w.data)
            }
        }

        Ok(*rule != before)
    }

    /// Find the first slot whose address matches either packet
    /// address and whose port matches either packet port.
    ///
    /// Lower slots win, regardless of how specific a later slot is.
    pub fn find_match(
        &self,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
    ) -> Option<(u8, &ExchangeRule)> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, r)| {
                (r.addr == src || r.addr == dst)
                    && (r.port == src_port || r.port == dst_port)
            })
            .map(|(i, r)| (i as u8, r))
    }
}

/// The classification table shared between the data path and the
/// configuration port.
#[derive(Debug)]
pub struct ClassTable {
    rules: SnapCell<RuleSet>,
    log: Logger,
}

impl ClassTable {
    pub fn new(num_rules: usize, log: Logger) -> Self {
        Self { rules: SnapCell::new(RuleSet::new(num_rules)), log }
    }

    pub fn snapshot(&self) -> Snap<RuleSet> {
        self.rules.snapshot()
    }

    pub fn epoch(&self) -> u64 {
        self.rules.epoch()
    }

    /// Apply a configuration write.
    ///
    /// A write which leaves the table as it was does not publish a
    /// new epoch.
    pub fn write(&self, w: CfgWrite) -> Result<bool, CfgDrop> {
        let mut outcome = Ok(false);
        let published = self.rules.update(|rs| match rs.write(w) {
            Ok(true) => Some(()),
            res => {
                outcome = res;
                None
            }
        });

        if published.is_some() {
            debug!(self.log, "cfg write applied"; "write" => %w);
            return Ok(true);
        }

        if let Err(e) = outcome {
            debug!(self.log, "cfg write dropped";
                "write" => %w, "reason" => %e);
        }
        outcome
    }

    /// Apply several writes and publish the result under one epoch, so
    /// no reader ever sees only some of them.
    ///
    /// Returns the outcome of each write, in order.
    pub fn write_all(&self, ws: &[CfgWrite]) -> Vec<Result<bool, CfgDrop>> {
        let mut outcomes = Vec::with_capacity(ws.len());
        self.rules.update(|rs| {
            outcomes.extend(ws.iter().map(|w| rs.write(*w)));
            outcomes.contains(&Ok(true)).then_some(())
        });

        for (w, res) in ws.iter().zip(&outcomes) {
            match res {
                Ok(_) => debug!(self.log, "cfg write applied"; "write" => %w),
                Err(e) => debug!(self.log, "cfg write dropped";
                    "write" => %w, "reason" => %e),
            }
        }
        outcomes
    }

    pub fn dump(&self) -> DumpRulesResp {
        let snap = self.snapshot();
        DumpRulesResp {
            epoch: snap.epoch(),
            rules: snap
                .iter()
                .enumerate()
                .map(|(i, rule)| RuleDump { slot: i as u8, rule: *rule })
                .collect(),
        }
    }
}

/// The reason a packet received its priority.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verdict {
    /// The destination port is one of the well-known override ports.
    Override { dst_port: u16, priority: Priority },
    /// The packet matched the rule in `slot`.
    Rule { slot: u8, priority: Priority },
    /// Nothing applied.
    Default,
}

impl Verdict {
    pub fn priority(&self) -> Priority {
        match self {
            Self::Override { priority, .. } => *priority,
            Self::Rule { priority, .. } => *priority,
            Self::Default => Priority::DEFAULT,
        }
    }
}

impl Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Override { dst_port, priority } => {
                write!(f, "override port {dst_port} => {priority}")
            }
            Self::Rule { slot, priority } => {
                write!(f, "rule {slot} => {priority}")
            }
            Self::Default => write!(f, "default => {}", Priority::DEFAULT),
        }
    }
}

/// Decide the priority of a packet.
///
/// Override ports are checked first and always win. The rule table is
/// consulted only when no override applies. Both require the latest
/// header sample to have carried IPv4 and TCP/UDP ports; anything else
/// gets the default.
pub fn classify(rules: &RuleSet, hdr: &HeaderFields) -> Verdict {
    let Some((src_port, dst_port)) = hdr.ports() else {
        return Verdict::Default;
    };

    if let Some(priority) = override_priority(dst_port) {
        return Verdict::Override { dst_port, priority };
    }

    match rules.find_match(hdr.src, hdr.dst, src_port, dst_port) {
        Some((slot, rule)) => Verdict::Rule { slot, priority: rule.priority },
        None => Verdict::Default,
    }
}
