// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The output sequencer.
//!
//! A state machine which looks at the beat at the head of the elastic
//! buffer, parses and classifies the packet it starts, and then hands
//! that packet's beats downstream one handshake at a time, each tagged
//! with the packet's priority.
//!
//! ```text
//!            sop at head          sampled          classified
//!   IDLE ----------------> PARSE_HEADER ----> CLASSIFY ----> OUTPUT
//!    ^  ^                                                     |  |
//!    |  |                    accepted, eop                    |  |
//!    |  +-----------------------------------------------------+  |
//!    |                                            accepted, !eop |
//!    |      accepted, eop; or sop at head                        v
//!    +------------------------------------------------------ WAIT_READY
//! ```
//!
//! A start-of-packet beat reaching the head in WAIT_READY means the
//! packet being sent lost its end-of-packet beat. That packet is
//! abandoned, uncounted, and the new one is parsed from IDLE so that
//! it gets its own tag.

use super::beat::Beat;
use super::beat::TaggedBeat;
use super::classify::ClassTable;
use super::classify::Verdict;
use super::classify::classify;
use super::headers::HeaderParser;
use crate::api::Priority;
use core::fmt;
use core::fmt::Display;
use slog::Logger;
use slog::debug;
use slog::trace;
use slog::warn;

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum SeqState {
    #[default]
    Idle,
    ParseHeader,
    Classify,
    Output,
    WaitReady,
}

impl Display for SeqState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::ParseHeader => "PARSE_HEADER",
            Self::Classify => "CLASSIFY",
            Self::Output => "OUTPUT",
            Self::WaitReady => "WAIT_READY",
        };
        write!(f, "{s}")
    }
}

/// The outcome of one sequencer step.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SeqStep {
    /// The beat driven on the egress interface this cycle.
    pub present: Option<TaggedBeat>,
    /// Downstream accepted `present`; the head must be drained.
    pub fired: bool,
    /// A packet finished this cycle, at this priority.
    pub completed: Option<Priority>,
    /// The stall watchdog tripped this cycle.
    pub stall_detected: bool,
    /// The packet being sent was abandoned before its end-of-packet
    /// beat because the next packet's start arrived.
    pub truncated: bool,
}

#[derive(Debug)]
pub struct Sequencer {
    state: SeqState,
    parser: HeaderParser,
    verdict: Verdict,
    stall_timeout: Option<u64>,
    stall_cycles: u64,
    stalled: bool,
    log: Logger,
}

impl Sequencer {
    pub fn new(stall_timeout: Option<u64>, log: Logger) -> Self {
        Self {
            state: SeqState::Idle,
            parser: HeaderParser::new(),
            verdict: Verdict::Default,
            stall_timeout,
            stall_cycles: 0,
            stalled: false,
            log,
        }
    }

    pub fn state(&self) -> SeqState {
        self.state
    }

    /// The verdict for the packet currently (or most recently) being
    /// sent.
    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    fn goto(&mut self, next: SeqState) {
        trace!(self.log, "state change";
            "from" => %self.state, "to" => %next);
        self.state = next;
    }

    /// Take one step.
    ///
    /// `head` is the beat at the front of the elastic buffer at the
    /// start of the cycle, and `ready` is the downstream ready for this
    /// cycle. The caller drains the head iff the returned step
    /// `fired`.
    pub fn step(
        &mut self,
        head: Option<&Beat>,
        ready: bool,
        table: &ClassTable,
    ) -> SeqStep {
        let mut step = SeqStep::default();

        match self.state {
            SeqState::Idle => match head {
                Some(b) if b.is_sop() => self.goto(SeqState::ParseHeader),

                // A beat with no start flag has no header to parse.
                // Forward it rather than hold up everything behind it.
                Some(_) => {
                    self.verdict = Verdict::Default;
                    self.goto(SeqState::Output);
                }

                None => {}
            },

            SeqState::ParseHeader => {
                if let Some(b) = head {
                    self.parser.sample(b);
                    self.goto(SeqState::Classify);
                }
            }

            SeqState::Classify => {
                let rules = table.snapshot();
                self.verdict = classify(&rules, self.parser.fields());
                trace!(self.log, "classified";
                    "verdict" => %self.verdict, "epoch" => rules.epoch());
                self.goto(SeqState::Output);
            }

            SeqState::WaitReady if head.is_some_and(Beat::is_sop) => {
                debug!(self.log, "packet truncated by next start";
                    "verdict" => %self.verdict);
                step.truncated = true;
                self.stall_cycles = 0;
                self.stalled = false;
                self.goto(SeqState::Idle);
            }

            SeqState::Output | SeqState::WaitReady => {
                if let Some(b) = head {
                    let priority = self.verdict.priority();
                    step.present = Some(TaggedBeat { beat: *b, priority });

                    if ready {
                        step.fired = true;
                        if b.is_eop() {
                            step.completed = Some(priority);
                            self.goto(SeqState::Idle);
                        } else if self.state == SeqState::Output {
                            self.goto(SeqState::WaitReady);
                        }
                    }
                }

                step.stall_detected = self.watchdog(step.fired);
            }
        }

        step
    }

    /// Track cycles spent sending a packet without a handshake.
    /// Returns true on the cycle a stall is first flagged; a stall is
    /// flagged once per episode.
    fn watchdog(&mut self, progressed: bool) -> bool {
        if progressed {
            self.stall_cycles = 0;
            self.stalled = false;
            return false;
        }

        self.stall_cycles = self.stall_cycles.saturating_add(1);
        match self.stall_timeout {
            Some(limit) if !self.stalled && self.stall_cycles >= limit => {
                self.stalled = true;
                warn!(self.log, "egress stalled";
                    "state" => %self.state,
                    "cycles" => self.stall_cycles);
                true
            }
            _ => false,
        }
    }
}
