// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Routines for building and reading packet capture files.

use pcap_parser::Linktype;
use pcap_parser::ToVec;
use pcap_parser::pcap;
use pcap_parser::pcap::LegacyPcapBlock;
use pcap_parser::pcap::PcapHeader;
use std::fs::File;
use std::io::Write;

/// Build a packet capture from a series of frames.
pub struct PcapBuilder<W: Write = File> {
    out: W,
    ts_usec: u32,
}

impl PcapBuilder<File> {
    /// Create a new pcap builder, writing all captures to `path`.
    pub fn new(path: &str) -> Self {
        Self::from_writer(File::create(path).unwrap())
    }
}

impl<W: Write> PcapBuilder<W> {
    pub fn from_writer(mut out: W) -> Self {
        let mut hdr = PcapHeader {
            magic_number: 0xa1b2c3d4,
            version_major: 2,
            version_minor: 4,
            thiszone: 0,
            sigfigs: 0,
            snaplen: 9216,
            network: Linktype::ETHERNET,
        };

        out.write_all(&hdr.to_vec().unwrap()).unwrap();

        Self { out, ts_usec: 0 }
    }

    /// Add a frame to the capture.
    pub fn add_frame(&mut self, frame: &[u8]) {
        let mut block = LegacyPcapBlock {
            ts_sec: 7777,
            ts_usec: self.ts_usec,
            caplen: frame.len() as u32,
            origlen: frame.len() as u32,
            data: frame,
        };
        self.ts_usec += 1;

        self.out.write_all(&block.to_vec().unwrap()).unwrap();
    }

    pub fn finish(mut self) -> W {
        self.out.flush().unwrap();
        self.out
    }
}

/// Read every frame out of a capture held in memory.
pub fn frames(mut bytes: &[u8]) -> Vec<Vec<u8>> {
    let hdr = match pcap::parse_pcap_header(bytes) {
        Ok((rest, hdr)) => {
            bytes = rest;
            hdr
        }
        Err(e) => panic!("failed to get header: {e:?}"),
    };
    assert_eq!(hdr.network, Linktype::ETHERNET);

    let mut out = Vec::new();
    while !bytes.is_empty() {
        match pcap::parse_pcap_frame(bytes) {
            Ok((rest, block)) => {
                // We always want access to the entire packet.
                assert_eq!(block.origlen, block.caplen);
                out.push(block.data.to_vec());
                bytes = rest;
            }

            Err(e) => panic!("failed to get next block: {e:?}"),
        }
    }
    out
}
