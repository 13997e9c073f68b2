// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Integration tests.
//!
//! These tests drive a whole [`Pipeline`] one clock edge at a time
//! and check what it does on its ingress, egress, configuration and
//! bypass interfaces.

use mdprio::engine::classify::Verdict;
use mdprio_test_utils::pcap::PcapBuilder;
use mdprio_test_utils::pcap::frames;
use mdprio_test_utils::*;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::sync::Barrier;
use std::thread;

const EXCH_A: Ipv4Addr = Ipv4Addr::from_const([233, 54, 12, 1]);
const EXCH_B: Ipv4Addr = Ipv4Addr::from_const([224, 0, 31, 1]);
const HOST: Ipv4Addr = Ipv4Addr::from_const([10, 0, 0, 7]);

fn prio(v: u8) -> Priority {
    Priority::new(v).unwrap()
}

fn rule(addr: Ipv4Addr, port: u16, p: u8) -> ExchangeRule {
    ExchangeRule { addr, port, priority: prio(p) }
}

// A single-beat packet to an override port walks every state once
// and comes out tagged with the override priority.
#[test]
fn single_beat_critical_packet() {
    let mut h = Harness::new(PipelineCfg::default());
    h.enqueue_frame(&udp_frame(EXCH_A, HOST, 40000, PORT_CRITICAL_MD));

    let mut states = vec![h.pipe.state()];
    let mut emitted = vec![];
    for _ in 0..5 {
        let out = h.step(false);
        states.push(out.state);
        if out.state == SeqState::Output {
            break;
        }
    }
    assert_eq!(
        states,
        vec![
            SeqState::Idle,
            SeqState::Idle,
            SeqState::ParseHeader,
            SeqState::Classify,
            SeqState::Output,
        ]
    );

    // Downstream now accepts.
    let out = h.step(true);
    assert_eq!(out.state, SeqState::Idle);
    emitted.extend(out.emitted());

    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].priority, prio(15));
    assert!(emitted[0].beat.is_sop() && emitted[0].beat.is_eop());

    let snap = h.pipe.stats().snapshot();
    assert_eq!(snap.packets, 1);
    assert_eq!(snap.high_prio_packets, 1);
    assert_eq!(snap.last_completion_ts, out.cycle);
}

// Sixteen packets offered back-to-back with downstream never ready:
// ingress ready drops after the fifteenth acceptance and the
// sixteenth is refused, not lost.
#[test]
fn back_pressure_refuses_sixteenth() {
    let mut h = Harness::new(PipelineCfg::default());
    for i in 0..16 {
        h.enqueue_frame(&udp_frame(EXCH_A, HOST, 1000 + i, 80));
    }

    for i in 0..FIFO_USABLE {
        let out = h.step(false);
        assert!(out.in_ready, "ready before acceptance {i}");
        assert!(out.accepted);
    }
    assert!(!h.pipe.in_ready());
    assert_eq!(h.pipe.in_flight(), FIFO_USABLE);

    // Hold the sixteenth for a while.
    for _ in 0..10 {
        let out = h.step(false);
        assert!(!out.in_ready);
        assert!(!out.accepted);
        assert_eq!(h.pipe.in_flight(), FIFO_USABLE);
    }
    assert_eq!(h.pending(), 1);
    assert_eq!(h.pipe.stats().snapshot().ingress_refused, 10);

    // Release downstream: everything comes out, in order.
    h.drain(1000);
    assert_eq!(h.emitted.len(), 16);
    for (i, tb) in h.emitted.iter().enumerate() {
        let sport = u16::from_be_bytes([tb.beat.data[34], tb.beat.data[35]]);
        assert_eq!(sport, 1000 + i as u16);
    }

    let snap = h.pipe.stats().snapshot();
    assert_eq!(snap.ingress_accepted, 16);
    assert_eq!(snap.packets, 16);
    assert_eq!(snap.high_prio_packets, 0);
}

// A configured exchange rule applies to the next matching packet.
#[test]
fn configured_rule_applies() {
    let mut h = Harness::new(PipelineCfg::default());
    let port = h.pipe.cfg_port();
    port.program_rule(2, &rule(EXCH_A, 443, 9));

    let pkt = tcp_frame(EXCH_A, HOST, 443, 55000);
    assert_eq!(classify_frame(&mut h, &pkt), prio(9));

    // The source side matches just the same.
    let pkt = tcp_frame(HOST, EXCH_A, 55000, 443);
    assert_eq!(classify_frame(&mut h, &pkt), prio(9));

    // Wrong address.
    let pkt = tcp_frame(EXCH_B, HOST, 443, 55000);
    assert_eq!(classify_frame(&mut h, &pkt), Priority::DEFAULT);

    assert_eq!(h.pipe.stats().snapshot().cfg_applied, 3);
}

#[test]
fn first_match_wins() {
    let mut h = Harness::new(PipelineCfg::default());
    let port = h.pipe.cfg_port();
    port.program_rule(5, &rule(EXCH_A, 443, 4));
    port.program_rule(3, &rule(EXCH_A, 443, 11));
    port.program_rule(7, &rule(EXCH_A, 443, 6));

    let pkt = udp_frame(EXCH_A, HOST, 443, 30000);
    assert_eq!(classify_frame(&mut h, &pkt), prio(11));
    assert_eq!(h.pipe.verdict(), Verdict::Rule { slot: 3, priority: prio(11) });
}

#[test]
fn override_beats_table() {
    let mut h = Harness::new(PipelineCfg::default());
    let port = h.pipe.cfg_port();
    port.program_rule(0, &rule(EXCH_A, PORT_ORDER_ENTRY, 2));
    port.program_rule(1, &rule(EXCH_A, PORT_MARKET_STATUS, 2));

    for (dport, want) in [
        (PORT_CRITICAL_MD, 15),
        (PORT_ORDER_ENTRY, 14),
        (PORT_MARKET_STATUS, 13),
    ] {
        let pkt = udp_frame(HOST, EXCH_A, 30000, dport);
        assert_eq!(classify_frame(&mut h, &pkt), prio(want));
    }

    // An override port as the source is just a port.
    let pkt = udp_frame(EXCH_A, HOST, PORT_ORDER_ENTRY, 30000);
    assert_eq!(classify_frame(&mut h, &pkt), prio(2));
}

#[test]
fn default_for_unclassifiable() {
    let mut h = Harness::new(PipelineCfg::default());
    // A rule which would match the stale fields of a prior packet.
    h.pipe.cfg_port().program_rule(0, &rule(EXCH_A, 443, 12));
    let pkt = tcp_frame(EXCH_A, HOST, 443, 3000);
    assert_eq!(classify_frame(&mut h, &pkt), prio(12));

    assert_eq!(classify_frame(&mut h, &arp_frame()), Priority::DEFAULT);

    let mut icmp = tcp_frame(EXCH_A, HOST, 443, 3000);
    icmp[23] = PROTO_ICMP;
    assert_eq!(classify_frame(&mut h, &icmp), Priority::DEFAULT);

    // Too short to even hold an ethernet header.
    assert_eq!(classify_frame(&mut h, &[0xAB; 8]), Priority::DEFAULT);

    let snap = h.pipe.stats().snapshot();
    assert_eq!(snap.packets, 4);
    assert_eq!(snap.high_prio_packets, 1);
}

#[test]
fn repeated_write_is_idempotent() {
    let h = Harness::new(PipelineCfg::default());
    let port = h.pipe.cfg_port();
    let r = rule(EXCH_B, 14310, 10);

    port.program_rule(1, &r);
    let once = h.pipe.dump_rules();
    port.program_rule(1, &r);
    let twice = h.pipe.dump_rules();

    assert_eq!(once, twice);
    assert_eq!(once.rules[1].rule, r);
}

#[test]
fn bad_writes_dropped() {
    let h = Harness::new(PipelineCfg { num_rules: 4, ..Default::default() });
    let port = h.pipe.cfg_port();
    let before = h.pipe.dump_rules();

    port.write(CfgWrite::new(RegClass::Port, 4, 443));
    port.write(CfgWrite { addr: CfgAddr(0x0300), data: 1 });

    assert_eq!(h.pipe.dump_rules(), before);
    let snap = h.pipe.stats().snapshot();
    assert_eq!(snap.cfg_dropped, 2);
    assert_eq!(snap.cfg_applied, 0);
}

// Every beat of a multi-beat packet carries the same tag, and the
// boundary flags come out exactly as they went in.
#[test]
fn multi_beat_packets() {
    let mut h = Harness::new(PipelineCfg::default());
    let big = ulp_frame(
        &FlowSpec::udp(EXCH_A, HOST, 40000, PORT_MARKET_STATUS),
        300,
    );
    let small = udp_frame(EXCH_A, HOST, 40000, 80);
    let expect: Vec<Beat> = Beat::split_frame(&big)
        .into_iter()
        .chain(Beat::split_frame(&small))
        .collect();
    assert!(expect.len() > 2);

    h.enqueue_frame(&big);
    h.enqueue_frame(&small);
    h.drain(1000);

    let beats: Vec<Beat> = h.emitted.iter().map(|tb| tb.beat).collect();
    assert_eq!(beats, expect);

    let nbig = expect.len() - 1;
    assert!(h.emitted[..nbig].iter().all(|tb| tb.priority == prio(13)));
    assert_eq!(h.emitted[nbig].priority, Priority::DEFAULT);
    assert_eq!(h.packet_priorities(), vec![prio(13), Priority::DEFAULT]);
    assert_eq!(h.pipe.stats().packets(), 2);
}

// A stray mid-packet fragment is forwarded at the default priority
// and the critical packet behind it still gets its own tag.
#[test]
fn fragment_then_critical_packet() {
    let mut h = Harness::new(PipelineCfg::default());
    h.enqueue_beat(Beat::new(&[0xEE; BEAT_BYTES], BeatFlags::empty()));
    h.enqueue_frame(&udp_frame(EXCH_A, HOST, 40000, PORT_CRITICAL_MD));
    h.drain(100);

    assert_eq!(h.emitted.len(), 2);
    assert!(!h.emitted[0].beat.is_sop() && !h.emitted[0].beat.is_eop());
    assert_eq!(h.emitted[0].priority, Priority::DEFAULT);
    assert!(h.emitted[1].beat.is_sop() && h.emitted[1].beat.is_eop());
    assert_eq!(h.emitted[1].priority, prio(15));

    let snap = h.pipe.stats().snapshot();
    assert_eq!(snap.packets, 1);
    assert_eq!(snap.high_prio_packets, 1);
    assert_eq!(snap.truncated_packets, 1);
}

// A packet which lost its end-of-packet beat ends where the next
// packet starts; the next packet is classified afresh.
#[test]
fn missing_eop_then_critical_packet() {
    let mut h = Harness::new(PipelineCfg::default());
    let mut cut =
        Beat::split_frame(&ulp_frame(&FlowSpec::udp(EXCH_A, HOST, 1, 80), 100));
    cut.pop();
    assert!(cut.len() >= 2);
    for b in cut {
        h.enqueue_beat(b);
    }
    h.enqueue_frame(&udp_frame(EXCH_A, HOST, 40000, PORT_CRITICAL_MD));
    h.drain(100);

    assert_eq!(h.packet_priorities(), vec![prio(15)]);
    let last = h.emitted.last().unwrap();
    assert!(last.beat.is_sop() && last.beat.is_eop());
    assert!(h.emitted[..h.emitted.len() - 1]
        .iter()
        .all(|tb| tb.priority == Priority::DEFAULT));

    let snap = h.pipe.stats().snapshot();
    assert_eq!(snap.packets, 1);
    assert_eq!(snap.high_prio_packets, 1);
    assert_eq!(snap.truncated_packets, 1);
}

// Push enough beats through to wrap the buffer pointers more than
// once; boundary flags stay with their data.
#[test]
fn flags_survive_pointer_wrap() {
    let mut h = Harness::new(PipelineCfg::default());
    let mut expect = vec![];
    for i in 0..12u16 {
        let frame = ulp_frame(
            &FlowSpec::tcp(EXCH_A, HOST, 2000 + i, 9000),
            usize::from(i) * 17,
        );
        expect.extend(Beat::split_frame(&frame));
        h.enqueue_frame(&frame);
    }
    assert!(expect.len() > 2 * 16);

    // Stall downstream on a fixed pattern to keep the buffer busy.
    let mut cycle = 0usize;
    while h.emitted.len() < expect.len() {
        h.step(cycle % 3 != 0);
        assert!(h.pipe.in_flight() <= FIFO_USABLE);
        cycle += 1;
        assert!(cycle < 10_000);
    }

    let got: Vec<BeatFlags> = h.emitted.iter().map(|tb| tb.beat.flags).collect();
    let want: Vec<BeatFlags> = expect.iter().map(|b| b.flags).collect();
    assert_eq!(got, want);

    let (wr, rd) = h.pipe.fifo_pointers();
    assert_eq!(wr, rd);
    assert_eq!(usize::from(wr), expect.len() % 16);
}

// Random ready patterns on egress: output order always equals input
// order and the buffer never holds more than fifteen beats.
#[test]
fn fifo_law_random_handshakes() {
    let mut rng = StdRng::seed_from_u64(0x6d64_7072_696f);

    for _ in 0..20 {
        let mut h = Harness::new(PipelineCfg::default());
        let mut expect = vec![];
        let npkts = rng.random_range(1..40);
        for i in 0..npkts {
            let dport = match rng.random_range(0..4) {
                0 => PORT_CRITICAL_MD,
                1 => PORT_ORDER_ENTRY,
                _ => rng.random_range(1..=u16::MAX),
            };
            let frame = ulp_frame(
                &FlowSpec::udp(EXCH_A, HOST, i, dport),
                rng.random_range(0..400),
            );
            expect.extend(Beat::split_frame(&frame));
            h.enqueue_frame(&frame);
        }

        let p_ready = rng.random_range(0.05..1.0);
        let mut ticks = 0;
        while h.emitted.len() < expect.len() {
            let ready = rng.random_bool(p_ready);
            let out = h.step(ready);
            if out.egress_fired {
                assert!(ready);
            }
            if !out.in_ready {
                assert!(!out.accepted);
            }
            assert!(h.pipe.in_flight() <= FIFO_USABLE);
            ticks += 1;
            assert!(ticks < 1_000_000);
        }

        let got: Vec<Beat> = h.emitted.iter().map(|tb| tb.beat).collect();
        assert_eq!(got, expect);
        assert_eq!(h.pipe.stats().packets(), u64::from(npkts));
    }
}

// A configuration write that lands while a packet sits in the buffer
// is seen by that packet's classification.
#[test]
fn write_before_classify_is_seen() {
    let mut h = Harness::new(PipelineCfg::default());
    h.enqueue_frame(&udp_frame(EXCH_B, HOST, 14310, 5000));

    // One field per cycle, starting on the cycle the packet is taken.
    for w in CfgWrite::for_rule(0, &rule(EXCH_B, 14310, 7)) {
        h.step_with(TickIn {
            egress_ready: true,
            cfg: Some(w),
            ..Default::default()
        });
    }
    assert_eq!(h.pipe.in_flight(), 1);
    assert_eq!(h.pipe.state(), SeqState::Classify);
    h.drain(100);
    assert_eq!(h.packet_priorities(), vec![prio(7)]);
}

// Readers on other threads only ever see whole published rule sets,
// and a snapshot never changes once taken.
#[test]
fn snapshots_are_isolated() {
    let h = Harness::new(PipelineCfg::default());
    let port = h.pipe.cfg_port();
    let before = h.pipe.rules();
    let nwrites = 2000u16;
    let start = Arc::new(Barrier::new(2));

    let writer = {
        let port = port.clone();
        let start = Arc::clone(&start);
        thread::spawn(move || {
            start.wait();
            for i in 1..=nwrites {
                port.write(CfgWrite::new(RegClass::Port, 0, u32::from(i)));
            }
        })
    };

    start.wait();
    let mut last_epoch = 0;
    loop {
        let snap = h.pipe.rules();
        assert!(snap.epoch() >= last_epoch);
        last_epoch = snap.epoch();
        // Each write bumps the epoch by one and sets the port to the
        // write's ordinal.
        assert_eq!(u64::from(snap.get(0).unwrap().port), snap.epoch() - 1);
        if snap.get(0).unwrap().port == nwrites {
            break;
        }
    }
    writer.join().unwrap();

    assert_eq!(before.epoch(), 1);
    assert_eq!(before.get(0).unwrap().port, 0);
    assert_eq!(h.pipe.stats().snapshot().cfg_applied, u64::from(nwrites));
}

#[test]
fn stall_watchdog() {
    let mut h = Harness::new(PipelineCfg {
        stall_timeout: Some(8),
        ..Default::default()
    });
    h.enqueue_frame(&udp_frame(EXCH_A, HOST, 1, 2));

    for _ in 0..40 {
        h.step(false);
    }
    assert_eq!(h.pipe.state(), SeqState::Output);
    assert_eq!(h.pipe.stats().snapshot().stalls, 1);

    // Nothing is evicted; the packet still comes out.
    h.drain(10);
    assert_eq!(h.emitted.len(), 1);

    h.enqueue_frame(&udp_frame(EXCH_A, HOST, 1, 2));
    for _ in 0..40 {
        h.step(false);
    }
    h.drain(10);
    assert_eq!(h.pipe.stats().snapshot().stalls, 2);
}

#[test]
fn bypass_and_dma() {
    let mut h = Harness::new(PipelineCfg::default());
    let beats: Vec<Beat> = (0..4u8).map(|i| Beat::single(&[i; 20])).collect();
    let mut out = vec![];

    // The bypass has one cycle of latency and ignores the main path,
    // which is stalled throughout.
    h.enqueue_frame(&udp_frame(EXCH_A, HOST, 1, PORT_CRITICAL_MD));
    for i in 0..6 {
        let o = h.step_with(TickIn {
            bypass_in: beats.get(i).copied(),
            bypass_ready: true,
            ..Default::default()
        });
        assert!(!o.dma.rd_en && !o.dma.wr_en);
        if i == 0 {
            assert_eq!(o.bypass.out, None);
        }
        if o.bypass.fired {
            out.push((i, o.bypass.out.unwrap()));
        }
    }

    let expect: Vec<(usize, Beat)> =
        beats.iter().enumerate().map(|(i, b)| (i + 1, *b)).collect();
    assert_eq!(out, expect);
    assert!(h.emitted.is_empty());
    let snap = h.pipe.stats().snapshot();
    assert_eq!(snap.bypass_beats, 4);
    assert_eq!(snap.packets, 0);
}

#[test]
fn cycle_counter_wraps() {
    let mut h = Harness::new(PipelineCfg::default());
    h.pipe.stats().set_cycles(u64::MAX - 1);
    h.enqueue_frame(&udp_frame(EXCH_A, HOST, 1, PORT_CRITICAL_MD));
    h.drain(100);

    let snap = h.pipe.stats().snapshot();
    assert!(snap.cycles < 10);
    assert!(snap.last_completion_ts < 10);
    assert_eq!(snap.packets, 1);
}

#[test]
fn loader_programs_slots_in_order() {
    let cfg = mdprio::cfg::Config::parse(
        r#"
        [pipeline]
        num_rules = 4

        [[exchange]]
        name = "XNAS-ITCH"
        addr = "233.54.12.1"
        port = 26400
        priority = 12

        [[exchange]]
        name = "XCME-MDP"
        addr = "224.0.31.1"
        port = 14310
        priority = 10
        "#,
    )
    .unwrap();

    let mut h = Harness::new(cfg.pipeline.clone());
    mdprio::cfg::load_exchanges(&h.pipe.cfg_port(), &cfg.exchanges, &log())
        .unwrap();

    let dump = h.pipe.dump_rules();
    assert_eq!(dump.rules.len(), 4);
    assert_eq!(dump.rules[0].rule, rule(EXCH_A, 26400, 12));
    assert_eq!(dump.rules[1].rule, rule(EXCH_B, 14310, 10));
    assert_eq!(dump.rules[2].rule, ExchangeRule::default());

    let pkt = udp_frame(HOST, EXCH_B, 5000, 14310);
    assert_eq!(classify_frame(&mut h, &pkt), prio(10));
}

#[test]
fn loader_rejects_overflow() {
    let h = Harness::new(PipelineCfg { num_rules: 1, ..Default::default() });
    let defs: Vec<ExchangeDef> = (0..2)
        .map(|i| ExchangeDef {
            name: format!("X{i}"),
            addr: EXCH_A,
            port: i,
            priority: prio(3),
        })
        .collect();

    let res =
        mdprio::cfg::load_exchanges(&h.pipe.cfg_port(), &defs, &log());
    assert!(matches!(
        res,
        Err(mdprio::cfg::CfgError::TooManyExchanges { count: 2, slots: 1 })
    ));
    assert_eq!(h.pipe.stats().snapshot().cfg_applied, 0);
}

// Frames read back from a capture are prioritized like any others.
#[test]
fn replay_capture() {
    let mut pcap = PcapBuilder::from_writer(Vec::new());
    let pkts = [
        udp_frame(EXCH_A, HOST, 1, PORT_CRITICAL_MD),
        arp_frame(),
        ulp_frame(&FlowSpec::tcp(HOST, EXCH_B, 2, 14310), 200),
        tcp_frame(HOST, EXCH_B, 2, PORT_ORDER_ENTRY),
    ];
    for p in &pkts {
        pcap.add_frame(p);
    }
    let bytes = pcap.finish();

    let mut h = Harness::new(PipelineCfg::default());
    h.pipe.cfg_port().program_rule(0, &rule(EXCH_B, 14310, 10));
    for f in frames(&bytes) {
        h.enqueue_frame(&f);
    }
    h.drain(1000);

    assert_eq!(
        h.packet_priorities(),
        vec![prio(15), Priority::DEFAULT, prio(10), prio(14)]
    );
    assert_eq!(h.pipe.stats().high_prio_packets(), 2);
}
