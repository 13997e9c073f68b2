// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The top-level pipeline: one instance owns all table, buffer and
//! counter state.

use super::beat::Beat;
use super::beat::TaggedBeat;
use super::bypass::BypassCycle;
use super::bypass::BypassPath;
use super::bypass::DmaReq;
use super::bypass::DmaStub;
use super::cfg_port;
use super::cfg_port::CfgPort;
use super::classify::ClassTable;
use super::classify::RuleSet;
use super::classify::Verdict;
use super::fifo::ElasticBuffer;
use super::sequencer::SeqState;
use super::sequencer::Sequencer;
use super::stat::PipelineStats;
use crate::api::CfgWrite;
use crate::api::DumpRulesResp;
use crate::cfg::CfgError;
use crate::cfg::PipelineCfg;
use crate::sync::Snap;
use slog::Logger;
use slog::debug;
use slog::o;
use std::sync::Arc;

/// Everything driven into the pipeline for one clock edge.
#[derive(Clone, Copy, Debug, Default)]
pub struct TickIn {
    /// The beat offered on ingress, if upstream is valid.
    pub ingress: Option<Beat>,
    /// Downstream ready on egress.
    pub egress_ready: bool,
    /// The configuration write presented this cycle.
    pub cfg: Option<CfgWrite>,
    /// The beat offered on the bypass ingress.
    pub bypass_in: Option<Beat>,
    /// Downstream ready on the bypass egress.
    pub bypass_ready: bool,
}

impl TickIn {
    /// Offer `beat` on ingress with downstream in the given state.
    pub fn offer(beat: Beat, egress_ready: bool) -> Self {
        Self { ingress: Some(beat), egress_ready, ..Default::default() }
    }

    /// Drive nothing on ingress.
    pub fn idle(egress_ready: bool) -> Self {
        Self { egress_ready, ..Default::default() }
    }
}

/// Everything the pipeline drove during one clock edge.
#[derive(Clone, Copy, Debug)]
pub struct TickOut {
    /// The cycle counter value for this edge.
    pub cycle: u64,
    /// Ingress ready as seen by upstream during this cycle.
    pub in_ready: bool,
    /// The offered ingress beat was stored.
    pub accepted: bool,
    /// The tagged beat driven on egress this cycle.
    pub egress: Option<TaggedBeat>,
    /// Downstream took `egress`.
    pub egress_fired: bool,
    pub bypass: BypassCycle,
    pub dma: DmaReq,
    /// The sequencer state after the edge.
    pub state: SeqState,
}

impl TickOut {
    /// The beat handed downstream this cycle, if any.
    pub fn emitted(&self) -> Option<TaggedBeat> {
        if self.egress_fired { self.egress } else { None }
    }
}

pub struct Pipeline {
    fifo: ElasticBuffer<Beat>,
    seq: Sequencer,
    table: Arc<ClassTable>,
    stats: Arc<PipelineStats>,
    bypass: BypassPath,
    dma: DmaStub,
}

impl Pipeline {
    /// Build a pipeline in its reset state: every rule slot
    /// unconfigured, the buffer empty, the sequencer idle, and every
    /// counter zero.
    pub fn new(cfg: &PipelineCfg, log: Logger) -> Result<Self, CfgError> {
        cfg.validate()?;

        let table = Arc::new(ClassTable::new(
            cfg.num_rules,
            log.new(o!("component" => "classify")),
        ));
        let seq = Sequencer::new(
            cfg.stall_timeout,
            log.new(o!("component" => "sequencer")),
        );

        debug!(log, "pipeline created";
            "num_rules" => cfg.num_rules,
            "stall_timeout" => ?cfg.stall_timeout);

        Ok(Self {
            fifo: ElasticBuffer::new(),
            seq,
            table,
            stats: Arc::new(PipelineStats::new()),
            bypass: BypassPath::new(),
            dma: DmaStub,
        })
    }

    /// Evaluate one clock edge.
    ///
    /// All decisions are made from the state at the start of the
    /// cycle: ingress ready reflects the buffer before this cycle's
    /// drain, the sequencer sees the head before this cycle's
    /// accept, and a configuration write lands after this cycle's
    /// classification.
    pub fn tick(&mut self, input: TickIn) -> TickOut {
        let cycle = self.stats.tick();
        let in_ready = self.fifo.ready();

        let step =
            self.seq.step(self.fifo.peek(), input.egress_ready, &self.table);
        let fc = self.fifo.cycle(input.ingress, step.fired);
        debug_assert_eq!(fc.drained.is_some(), step.fired);

        if input.ingress.is_some() {
            self.stats.ingress(fc.accepted);
        }
        if let Some(priority) = step.completed {
            self.stats.packet_done(priority, cycle);
        }
        if step.truncated {
            self.stats.truncated();
        }
        if step.stall_detected {
            self.stats.stall();
        }

        if let Some(w) = input.cfg {
            cfg_port::apply(&self.table, &self.stats, w);
        }

        let bypass = self.bypass.cycle(input.bypass_in, input.bypass_ready);
        if bypass.fired {
            self.stats.bypass();
        }

        TickOut {
            cycle,
            in_ready,
            accepted: fc.accepted,
            egress: step.present,
            egress_fired: step.fired,
            bypass,
            dma: self.dma.cycle(),
            state: self.seq.state(),
        }
    }

    /// A handle for writing the classification table from outside the
    /// tick loop.
    pub fn cfg_port(&self) -> CfgPort {
        CfgPort::new(Arc::clone(&self.table), Arc::clone(&self.stats))
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// The currently published rule set.
    pub fn rules(&self) -> Snap<RuleSet> {
        self.table.snapshot()
    }

    pub fn dump_rules(&self) -> DumpRulesResp {
        self.table.dump()
    }

    pub fn state(&self) -> SeqState {
        self.seq.state()
    }

    pub fn verdict(&self) -> Verdict {
        self.seq.verdict()
    }

    /// Ingress ready for the next cycle.
    pub fn in_ready(&self) -> bool {
        self.fifo.ready()
    }

    /// The number of beats waiting in the elastic buffer.
    pub fn in_flight(&self) -> usize {
        self.fifo.len()
    }

    #[cfg(any(feature = "test-help", test))]
    pub fn fifo_pointers(&self) -> (u8, u8) {
        self.fifo.pointers()
    }
}
