// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Common routines for integration tests.

// This type of pedantry is more trouble than it's worth here.
#![allow(dead_code)]

pub mod pcap;

// Let's make our lives easier and pub use a bunch of stuff.
pub use mdprio::api::*;
pub use mdprio::cfg::PipelineCfg;
pub use mdprio::engine::Beat;
pub use mdprio::engine::BeatFlags;
pub use mdprio::engine::CfgPort;
pub use mdprio::engine::Pipeline;
pub use mdprio::engine::TaggedBeat;
pub use mdprio::engine::TickIn;
pub use mdprio::engine::TickOut;
pub use mdprio::engine::beat::BEAT_BYTES;
pub use mdprio::engine::fifo::FIFO_USABLE;
pub use mdprio::engine::sequencer::SeqState;

use mdprio::engine::headers::ETHER_HDR_SZ;
use mdprio::engine::headers::EtherHdrRaw;
use mdprio::engine::headers::IPV4_HDR_SZ;
use mdprio::engine::headers::Ipv4HdrRaw;
use mdprio::engine::headers::UlpPortsRaw;
use slog::Logger;
use std::collections::VecDeque;
use zerocopy::IntoBytes;

pub const SRC_MAC: [u8; 6] = [0x02, 0x08, 0x20, 0xd8, 0x35, 0xcf];
pub const DST_MAC: [u8; 6] = [0x01, 0x00, 0x5e, 0x00, 0x00, 0x01];

const TCP_HDR_SZ: usize = 20;
const UDP_HDR_SZ: usize = 8;

/// A logger which throws everything away.
pub fn log() -> Logger {
    Logger::root(slog::Discard, slog::o!())
}

/// A pipeline with the given configuration and a discarding logger.
pub fn pipeline(cfg: PipelineCfg) -> Pipeline {
    Pipeline::new(&cfg, log()).unwrap()
}

/// The addressing of a synthetic TCP or UDP frame.
#[derive(Clone, Copy, Debug)]
pub struct FlowSpec {
    pub proto: Protocol,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub sport: u16,
    pub dport: u16,
}

impl FlowSpec {
    pub fn udp(src: Ipv4Addr, dst: Ipv4Addr, sport: u16, dport: u16) -> Self {
        Self { proto: Protocol::UDP, src, dst, sport, dport }
    }

    pub fn tcp(src: Ipv4Addr, dst: Ipv4Addr, sport: u16, dport: u16) -> Self {
        Self { proto: Protocol::TCP, src, dst, sport, dport }
    }
}

/// Build an Ethernet/IPv4 frame for `flow` carrying `payload_len`
/// bytes of transport payload.
pub fn ulp_frame(flow: &FlowSpec, payload_len: usize) -> Vec<u8> {
    let ulp_hdr_sz = match flow.proto {
        Protocol::TCP => TCP_HDR_SZ,
        Protocol::UDP => UDP_HDR_SZ,
        p => panic!("no ports for protocol {p}"),
    };
    let ip_len = IPV4_HDR_SZ + ulp_hdr_sz + payload_len;

    let eth = EtherHdrRaw {
        dst: DST_MAC,
        src: SRC_MAC,
        ether_type: ETHER_TYPE_IPV4.to_be_bytes(),
    };
    let ip = Ipv4HdrRaw {
        ver_hdr_len: 0x45,
        dscp_ecn: 0,
        total_len: (ip_len as u16).to_be_bytes(),
        ident: [0; 2],
        frag_and_flags: [0x40, 0],
        ttl: 64,
        proto: u8::from(flow.proto),
        csum: [0; 2],
        src: flow.src.bytes(),
        dst: flow.dst.bytes(),
    };
    let ports = UlpPortsRaw {
        src_port: flow.sport.to_be_bytes(),
        dst_port: flow.dport.to_be_bytes(),
    };

    let mut frame = Vec::with_capacity(ETHER_HDR_SZ + ip_len);
    frame.extend_from_slice(eth.as_bytes());
    frame.extend_from_slice(ip.as_bytes());
    frame.extend_from_slice(ports.as_bytes());
    frame.resize(ETHER_HDR_SZ + IPV4_HDR_SZ + ulp_hdr_sz, 0);
    if flow.proto == Protocol::UDP {
        let udp_len = (ulp_hdr_sz + payload_len) as u16;
        let off = ETHER_HDR_SZ + IPV4_HDR_SZ + 4;
        frame[off..off + 2].copy_from_slice(&udp_len.to_be_bytes());
    } else {
        // Data offset of five words.
        frame[ETHER_HDR_SZ + IPV4_HDR_SZ + 12] = 0x50;
    }
    frame.extend((0..payload_len).map(|i| i as u8));
    frame
}

pub fn udp_frame(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    sport: u16,
    dport: u16,
) -> Vec<u8> {
    ulp_frame(&FlowSpec::udp(src, dst, sport, dport), 0)
}

pub fn tcp_frame(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    sport: u16,
    dport: u16,
) -> Vec<u8> {
    ulp_frame(&FlowSpec::tcp(src, dst, sport, dport), 0)
}

/// A minimal ARP request; anything but IPv4 will do.
pub fn arp_frame() -> Vec<u8> {
    let eth = EtherHdrRaw {
        dst: [0xFF; 6],
        src: SRC_MAC,
        ether_type: ETHER_TYPE_ARP.to_be_bytes(),
    };
    let mut frame = eth.as_bytes().to_vec();
    frame.resize(ETHER_HDR_SZ + 28, 0);
    frame
}

/// Drives a [`Pipeline`] from a queue of beats, honoring the ingress
/// handshake, and records what comes out of egress.
pub struct Harness {
    pub pipe: Pipeline,
    pending: VecDeque<Beat>,
    pub emitted: Vec<TaggedBeat>,
    pub offered: u64,
}

impl Harness {
    pub fn new(cfg: PipelineCfg) -> Self {
        Self {
            pipe: pipeline(cfg),
            pending: VecDeque::new(),
            emitted: Vec::new(),
            offered: 0,
        }
    }

    /// Queue a frame, split into beats, for ingress.
    pub fn enqueue_frame(&mut self, frame: &[u8]) {
        self.pending.extend(Beat::split_frame(frame));
    }

    pub fn enqueue_beat(&mut self, beat: Beat) {
        self.pending.push_back(beat);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Tick once, offering the next pending beat (if any).
    pub fn step(&mut self, egress_ready: bool) -> TickOut {
        self.step_with(TickIn::idle(egress_ready))
    }

    /// Tick once with `input`; if `input` carries no ingress beat the
    /// next pending one is offered.
    pub fn step_with(&mut self, mut input: TickIn) -> TickOut {
        let from_queue = input.ingress.is_none();
        if from_queue {
            input.ingress = self.pending.front().copied();
        }
        if input.ingress.is_some() {
            self.offered += 1;
        }

        let out = self.pipe.tick(input);
        if out.accepted && from_queue {
            self.pending.pop_front();
        }
        if let Some(tb) = out.emitted() {
            self.emitted.push(tb);
        }
        out
    }

    /// Tick with egress always ready until everything queued has come
    /// out and the sequencer is idle. Panics after `max` ticks.
    pub fn drain(&mut self, max: usize) -> usize {
        for n in 0..max {
            if self.pending.is_empty()
                && self.pipe.in_flight() == 0
                && self.pipe.state() == SeqState::Idle
            {
                return n;
            }
            self.step(true);
        }
        panic!("pipeline did not drain in {max} ticks");
    }

    /// The priority of each emitted packet, in order.
    pub fn packet_priorities(&self) -> Vec<Priority> {
        self.emitted
            .iter()
            .filter(|tb| tb.beat.is_eop())
            .map(|tb| tb.priority)
            .collect()
    }
}

/// Run a single frame through a fresh-ish pipeline with egress always
/// ready and return the priority it was tagged with.
pub fn classify_frame(h: &mut Harness, frame: &[u8]) -> Priority {
    let before = h.emitted.len();
    h.enqueue_frame(frame);
    h.drain(1000);
    let tagged = &h.emitted[before..];
    assert!(!tagged.is_empty(), "frame was never emitted");
    let prio = tagged[0].priority;
    assert!(tagged.iter().all(|tb| tb.priority == prio));
    prio
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn step_takes_accepted_beats_off_the_queue() {
        let mut h = Harness::new(PipelineCfg::default());
        h.enqueue_frame(&arp_frame());
        h.enqueue_frame(&arp_frame());

        assert!(h.step(false).accepted);
        assert_eq!(h.pending(), 1);
        assert!(h.step(false).accepted);
        assert_eq!(h.pending(), 0);
        assert_eq!(h.pipe.in_flight(), 2);

        // Nothing left to offer.
        assert!(!h.step(false).accepted);
        assert_eq!(h.offered, 2);

        h.drain(100);
        assert_eq!(h.emitted.len(), 2);
    }
}
