// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The configuration port.
//!
//! A write-only register interface into the classification table. A
//! write either updates exactly one field of one slot or, if its
//! address names no register, is dropped. The writer gets no
//! acknowledgment either way; the outcome is visible only in the
//! `cfg_applied`/`cfg_dropped` counters.

use super::classify::ClassTable;
use super::stat::PipelineStats;
use crate::api::CfgWrite;
use crate::api::ExchangeRule;
use std::sync::Arc;

/// Apply one write, accounting for it in `stats`.
///
/// Writes which leave the table unchanged are still counted as
/// applied: they named a real register.
pub(crate) fn apply(table: &ClassTable, stats: &PipelineStats, w: CfgWrite) {
    stats.cfg(table.write(w).is_ok());
}

/// A handle onto a pipeline's configuration port.
///
/// The handle may be cloned and moved to another thread, e.g. a host
/// configuration loader. Writes through it never stall the data path,
/// and a classification in flight always observes the table either
/// wholly before or wholly after any given write.
#[derive(Clone, Debug)]
pub struct CfgPort {
    table: Arc<ClassTable>,
    stats: Arc<PipelineStats>,
}

impl CfgPort {
    pub(crate) fn new(table: Arc<ClassTable>, stats: Arc<PipelineStats>) -> Self {
        Self { table, stats }
    }

    /// Apply one write immediately.
    ///
    /// This is the host loader's path into the table. It is not paced
    /// by the clock: any number of writes may land between two ticks.
    /// The one-write-per-cycle port is [`TickIn::cfg`].
    ///
    /// [`TickIn::cfg`]: super::pipeline::TickIn::cfg
    pub fn write(&self, w: CfgWrite) {
        apply(&self.table, &self.stats, w);
    }

    /// Program all three fields of `slot`.
    ///
    /// The fields are published together: a classification sees the
    /// slot's old rule or its new one, never a mix of the two.
    pub fn program_rule(&self, slot: u8, rule: &ExchangeRule) {
        for res in self.table.write_all(&CfgWrite::for_rule(slot, rule)) {
            self.stats.cfg(res.is_ok());
        }
    }

    /// The number of slots behind this port.
    pub fn num_rules(&self) -> usize {
        self.table.snapshot().len()
    }
}
