// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Print table dumps and counters in a human-friendly manner.
//!
//! These live here so that both mdprioadm and the integration tests
//! can use them.

use crate::api::DumpRulesResp;
use crate::api::PacketRecord;
use crate::api::StatsSnap;
use crate::engine::classify::Verdict;
use std::io::Write;
use tabwriter::TabWriter;

/// Print a [`DumpRulesResp`].
pub fn print_rules(resp: &DumpRulesResp) -> std::io::Result<()> {
    print_rules_into(&mut std::io::stdout(), resp)
}

/// Print a [`DumpRulesResp`] into a given writer.
pub fn print_rules_into(
    writer: &mut impl Write,
    resp: &DumpRulesResp,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    writeln!(t, "Classification Rules (epoch {})", resp.epoch)?;
    write_hrb(&mut t)?;
    writeln!(t, "SLOT\tADDR\tPORT\tPRIORITY")?;
    for rd in &resp.rules {
        writeln!(
            t,
            "{}\t{}\t{}\t{}",
            rd.slot, rd.rule.addr, rd.rule.port, rd.rule.priority,
        )?;
    }
    t.flush()
}

/// Print a [`StatsSnap`].
pub fn print_stats(snap: &StatsSnap) -> std::io::Result<()> {
    print_stats_into(&mut std::io::stdout(), snap)
}

/// Print a [`StatsSnap`] into a given writer.
pub fn print_stats_into(
    writer: &mut impl Write,
    snap: &StatsSnap,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    writeln!(t, "Pipeline Statistics")?;
    write_hrb(&mut t)?;
    writeln!(t, "cycles\t{}", snap.cycles)?;
    writeln!(t, "packets\t{}", snap.packets)?;
    writeln!(t, "high_prio_packets\t{}", snap.high_prio_packets)?;
    writeln!(t, "last_completion_ts\t{}", snap.last_completion_ts)?;
    writeln!(t, "ingress_accepted\t{}", snap.ingress_accepted)?;
    writeln!(t, "ingress_refused\t{}", snap.ingress_refused)?;
    writeln!(t, "cfg_applied\t{}", snap.cfg_applied)?;
    writeln!(t, "cfg_dropped\t{}", snap.cfg_dropped)?;
    writeln!(t, "truncated_packets\t{}", snap.truncated_packets)?;
    writeln!(t, "stalls\t{}", snap.stalls)?;
    writeln!(t, "bypass_beats\t{}", snap.bypass_beats)?;
    t.flush()
}

/// Print the packets emitted by a replay.
pub fn print_packets(pkts: &[PacketRecord]) -> std::io::Result<()> {
    print_packets_into(&mut std::io::stdout(), pkts)
}

/// Print the packets emitted by a replay into a given writer.
pub fn print_packets_into(
    writer: &mut impl Write,
    pkts: &[PacketRecord],
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    writeln!(t, "SEQ\tBEATS\tPRIORITY\tDONE")?;
    write_hr(&mut t)?;
    for p in pkts {
        writeln!(t, "{}\t{}\t{}\t{}", p.seq, p.beats, p.priority, p.done_at)?;
    }
    t.flush()
}

/// Print a single classification [`Verdict`] into a given writer.
pub fn print_verdict_into(
    writer: &mut impl Write,
    verdict: &Verdict,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    writeln!(t, "PRIORITY\tREASON")?;
    writeln!(t, "{}\t{}", verdict.priority(), verdict)?;
    t.flush()
}

/// Write a horizontal rule in bold.
pub fn write_hrb(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:=<70}", "=")
}

/// Write a horizontal rule.
pub fn write_hr(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:-<70}", "-")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::ExchangeRule;
    use crate::api::Priority;
    use crate::api::RuleDump;

    #[test]
    fn rules_table() {
        let resp = DumpRulesResp {
            epoch: 4,
            rules: vec![
                RuleDump {
                    slot: 0,
                    rule: ExchangeRule {
                        addr: "233.54.12.1".parse().unwrap(),
                        port: 26400,
                        priority: Priority::new(12).unwrap(),
                    },
                },
                RuleDump { slot: 1, rule: ExchangeRule::default() },
            ],
        };

        let mut out = Vec::new();
        print_rules_into(&mut out, &resp).unwrap();
        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Classification Rules (epoch 4)");
        assert!(lines[2].starts_with("SLOT"));
        let row: Vec<&str> = lines[3].split_whitespace().collect();
        assert_eq!(row, vec!["0", "233.54.12.1", "26400", "12"]);
        let row: Vec<&str> = lines[4].split_whitespace().collect();
        assert_eq!(row, vec!["1", "0.0.0.0", "0", "1"]);
    }

    #[test]
    fn stats_table() {
        let snap = StatsSnap {
            packets: 7,
            high_prio_packets: 3,
            truncated_packets: 2,
            ..Default::default()
        };
        let mut out = Vec::new();
        print_stats_into(&mut out, &snap).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.lines().any(|l| {
            l.split_whitespace().collect::<Vec<_>>() == ["packets", "7"]
        }));
        assert!(out.lines().any(|l| {
            l.split_whitespace().collect::<Vec<_>>() == ["high_prio_packets", "3"]
        }));
        assert!(out.lines().any(|l| {
            l.split_whitespace().collect::<Vec<_>>() == ["truncated_packets", "2"]
        }));
    }
}
