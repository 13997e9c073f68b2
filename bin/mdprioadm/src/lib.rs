// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! mdprio administration library

use anyhow::Context;
use anyhow::anyhow;
use mdprio::api::PacketRecord;
use mdprio::api::StatsSnap;
use mdprio::cfg::Config;
use mdprio::cfg::load_exchanges;
use mdprio::engine::Beat;
use mdprio::engine::Pipeline;
use mdprio::engine::TickIn;
use pcap_parser::Linktype;
use pcap_parser::pcap;
use serde::Deserialize;
use serde::Serialize;
use slog::Logger;
use slog::info;
use std::collections::VecDeque;
use std::path::Path;

pub use mdprio::api::API_VERSION;
pub use mdprio::api::MAJOR_VERSION;

/// Give up on a replay if nothing leaves the pipeline for this many
/// consecutive cycles.
const REPLAY_IDLE_LIMIT: u64 = 1 << 20;

/// Build a pipeline from the configuration at `path`, with its
/// exchanges loaded.
pub fn build_pipeline(
    path: &Path,
    stall_timeout: Option<u64>,
    log: &Logger,
) -> anyhow::Result<Pipeline> {
    let mut cfg = mdprio::cfg::load_file(path)?;
    if stall_timeout.is_some() {
        cfg.pipeline.stall_timeout = stall_timeout;
    }
    pipeline_from(&cfg, log)
}

pub fn pipeline_from(cfg: &Config, log: &Logger) -> anyhow::Result<Pipeline> {
    let pipe = Pipeline::new(&cfg.pipeline, log.new(slog::o!()))?;
    load_exchanges(&pipe.cfg_port(), &cfg.exchanges, log)?;
    Ok(pipe)
}

/// Read every frame out of the Ethernet capture at `path`.
pub fn read_pcap(path: &Path) -> anyhow::Result<Vec<Vec<u8>>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_pcap(&bytes)
}

pub fn parse_pcap(bytes: &[u8]) -> anyhow::Result<Vec<Vec<u8>>> {
    let (mut rest, hdr) = pcap::parse_pcap_header(bytes)
        .map_err(|e| anyhow!("bad pcap header: {e:?}"))?;

    if hdr.network != Linktype::ETHERNET {
        return Err(anyhow!("unsupported link type: {:?}", hdr.network));
    }

    let mut frames = vec![];
    while !rest.is_empty() {
        let res = if hdr.is_bigendian() {
            pcap::parse_pcap_frame_be(rest)
        } else {
            pcap::parse_pcap_frame(rest)
        };
        let (next, block) = res.map_err(|e| {
            anyhow!("bad pcap frame {}: {e:?}", frames.len())
        })?;
        frames.push(block.data.to_vec());
        rest = next;
    }

    Ok(frames)
}

/// The outcome of replaying a capture.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ReplayResp {
    pub packets: Vec<PacketRecord>,
    pub stats: StatsSnap,
}

/// Feed `frames` through `pipe` back to back, with downstream ready on
/// every `ready_every`th cycle, until every frame has been emitted.
pub fn replay(
    pipe: &mut Pipeline,
    frames: &[Vec<u8>],
    ready_every: u32,
    log: &Logger,
) -> anyhow::Result<ReplayResp> {
    let ready_every = u64::from(ready_every.max(1));
    let mut beats: VecDeque<Beat> =
        frames.iter().flat_map(|f| Beat::split_frame(f)).collect();
    let total = frames.len();
    let mut packets = Vec::with_capacity(total);
    let mut beats_in_pkt = 0u32;
    let mut idle = 0u64;
    let mut tick = 0u64;

    while packets.len() < total {
        let out = pipe.tick(TickIn {
            ingress: beats.front().copied(),
            egress_ready: tick % ready_every == 0,
            ..Default::default()
        });
        tick += 1;

        if out.accepted {
            beats.pop_front();
        }

        match out.emitted() {
            Some(tb) => {
                idle = 0;
                beats_in_pkt += 1;
                if tb.beat.is_eop() {
                    packets.push(PacketRecord {
                        seq: packets.len() as u64,
                        beats: beats_in_pkt,
                        priority: tb.priority,
                        done_at: out.cycle,
                    });
                    beats_in_pkt = 0;
                }
            }

            None => {
                idle += 1;
                if idle >= REPLAY_IDLE_LIMIT {
                    return Err(anyhow!(
                        "pipeline made no progress for {idle} cycles \
                         ({} of {total} packets emitted)",
                        packets.len()
                    ));
                }
            }
        }
    }

    info!(log, "replay complete";
        "packets" => packets.len(),
        "cycles" => tick);

    Ok(ReplayResp { packets, stats: pipe.stats().snapshot() })
}

#[cfg(test)]
mod test {
    use super::*;
    use mdprio::api::Priority;
    use mdprio::cfg::PipelineCfg;
    use mdprio_test_utils::Ipv4Addr;
    use mdprio_test_utils::PORT_CRITICAL_MD;
    use mdprio_test_utils::arp_frame;
    use mdprio_test_utils::pcap::PcapBuilder;
    use mdprio_test_utils::udp_frame;

    fn log() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[test]
    fn replay_tags_every_packet() {
        let cfg = Config::parse(
            r#"
            [[exchange]]
            name = "XCME-MDP"
            addr = "224.0.31.1"
            port = 14310
            priority = 10
            "#,
        )
        .unwrap();
        let mut pipe = pipeline_from(&cfg, &log()).unwrap();

        let exch = Ipv4Addr::from([224, 0, 31, 1]);
        let host = Ipv4Addr::from([10, 0, 0, 7]);
        let mut pcap = PcapBuilder::from_writer(Vec::new());
        pcap.add_frame(&udp_frame(exch, host, 14310, 5000));
        pcap.add_frame(&arp_frame());
        pcap.add_frame(&udp_frame(host, exch, 5000, PORT_CRITICAL_MD));
        let frames = parse_pcap(&pcap.finish()).unwrap();
        assert_eq!(frames.len(), 3);

        let resp = replay(&mut pipe, &frames, 3, &log()).unwrap();
        let prios: Vec<u8> =
            resp.packets.iter().map(|p| p.priority.val()).collect();
        assert_eq!(prios, vec![10, Priority::DEFAULT.val(), 15]);
        assert!(resp.packets.iter().all(|p| p.beats == 1));
        assert!(resp.packets.windows(2).all(|w| w[0].done_at < w[1].done_at));
        assert_eq!(resp.stats.packets, 3);
        assert_eq!(resp.stats.high_prio_packets, 1);
    }

    #[test]
    fn replay_empty_capture() {
        let mut pipe = Pipeline::new(&PipelineCfg::default(), log()).unwrap();
        let frames = parse_pcap(&PcapBuilder::from_writer(Vec::new()).finish())
            .unwrap();
        let resp = replay(&mut pipe, &frames, 1, &log()).unwrap();
        assert!(resp.packets.is_empty());
    }

    #[test]
    fn garbage_pcap() {
        assert!(parse_pcap(&[1, 2, 3]).is_err());
    }
}
