// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use std::path::PathBuf;

use clap::Args;
use clap::Parser;
use slog::Drain;
use slog::Logger;

use mdprio::api::Ipv4Addr;
use mdprio::api::Protocol;
use mdprio::engine::classify::classify;
use mdprio::engine::headers::HeaderFields;
use mdprio::print::print_packets;
use mdprio::print::print_rules;
use mdprio::print::print_stats;
use mdprio::print::print_verdict_into;
use mdprioadm::API_VERSION;
use mdprioadm::MAJOR_VERSION;

/// Administer the market-data packet prioritizer
#[derive(Debug, Parser)]
#[command(version=mdprio_pkg_version())]
enum Command {
    /// Load a configuration and print the resulting rule table.
    ShowRules {
        #[arg(short)]
        config: PathBuf,
    },

    /// Print the verdict for a synthetic header.
    Classify {
        #[arg(short)]
        config: PathBuf,

        #[command(flatten)]
        hdr: HeaderArgs,
    },

    /// Feed a packet capture through the pipeline and print the tag
    /// of every packet.
    Replay {
        #[arg(short)]
        config: PathBuf,

        /// An Ethernet pcap file.
        #[arg(long)]
        pcap: PathBuf,

        /// Assert downstream ready once every N cycles.
        #[arg(
            long,
            default_value_t = 1,
            value_parser = clap::value_parser!(u32).range(1..)
        )]
        ready_every: u32,

        /// Override the configured stall watchdog, in cycles.
        #[arg(
            long,
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        stall_timeout: Option<u64>,

        /// Emit JSON instead of tables.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Clone, Copy, Debug)]
struct HeaderArgs {
    #[arg(long)]
    src: Ipv4Addr,

    #[arg(long)]
    dst: Ipv4Addr,

    #[arg(long)]
    sport: u16,

    #[arg(long)]
    dport: u16,

    /// tcp or udp
    #[arg(long, default_value = "udp")]
    proto: Protocol,
}

impl From<HeaderArgs> for HeaderFields {
    fn from(args: HeaderArgs) -> Self {
        Self {
            ether_type: mdprio::api::ETHER_TYPE_IPV4,
            proto: args.proto,
            src: args.src,
            dst: args.dst,
            src_port: args.sport,
            dst_port: args.dport,
            l3_valid: true,
            l4_valid: args.proto.has_ports(),
        }
    }
}

fn mdprio_pkg_version() -> String {
    format!("{MAJOR_VERSION}.{API_VERSION}.{}", env!("CARGO_PKG_VERSION"))
}

fn logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_envlogger::new(drain).ignore_res();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, slog::o!("component" => "mdprioadm"))
}

fn main() -> anyhow::Result<()> {
    let cmd = Command::parse();
    let log = logger();

    match cmd {
        Command::ShowRules { config } => {
            let pipe = mdprioadm::build_pipeline(&config, None, &log)?;
            print_rules(&pipe.dump_rules())?;
        }

        Command::Classify { config, hdr } => {
            let pipe = mdprioadm::build_pipeline(&config, None, &log)?;
            let verdict = classify(&pipe.rules(), &hdr.into());
            print_verdict_into(&mut std::io::stdout(), &verdict)?;
        }

        Command::Replay { config, pcap, ready_every, stall_timeout, json } => {
            let mut pipe =
                mdprioadm::build_pipeline(&config, stall_timeout, &log)?;
            let frames = mdprioadm::read_pcap(&pcap)?;
            let resp =
                mdprioadm::replay(&mut pipe, &frames, ready_every, &log)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&resp)?);
            } else {
                print_packets(&resp.packets)?;
                println!();
                print_stats(&resp.stats)?;
            }
        }
    }

    Ok(())
}
