// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Workloads shared by the benchmarks.

use criterion::measurement::Measurement;
use criterion::measurement::WallTime;
use mdprio_test_utils::*;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Additional labelling information for [`Measurement`]s for
/// pretty-printing and grouping.
pub trait MeasurementInfo: Measurement {
    fn label() -> &'static str;
}

impl MeasurementInfo for WallTime {
    fn label() -> &'static str {
        "wallclock"
    }
}

/// The exchange rules used by every benchmark: `n` venues on
/// consecutive multicast groups, lowest slot most urgent.
pub fn exchange_rules(n: usize) -> Vec<ExchangeRule> {
    (0..n)
        .map(|i| ExchangeRule {
            addr: Ipv4Addr::from([233, 54, (i >> 8) as u8, i as u8]),
            port: 20000 + i as u16,
            priority: Priority::new(2 + (i % 10) as u8).unwrap_or_default(),
        })
        .collect()
}

/// A deterministic mix of `n` frames: override-port traffic, exchange
/// feeds matching `rules`, and unclassified noise, with payloads
/// spanning one to several beats.
pub fn market_mix(n: usize, rules: &[ExchangeRule]) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(0x6d64_7072_696f);
    let host = Ipv4Addr::from([10, 0, 0, 7]);

    (0..n)
        .map(|i| {
            let payload = rng.random_range(0..256);
            let flow = match rng.random_range(0..10) {
                0 => FlowSpec::udp(host, host, 40000, PORT_CRITICAL_MD),
                1 => FlowSpec::tcp(host, host, 40000, PORT_ORDER_ENTRY),
                2..=7 if !rules.is_empty() => {
                    let r = &rules[rng.random_range(0..rules.len())];
                    FlowSpec::udp(r.addr, host, r.port, 30000u16.wrapping_add(i as u16))
                }
                _ => FlowSpec::udp(host, host, 50000, 50000),
            };
            ulp_frame(&flow, payload)
        })
        .collect()
}
