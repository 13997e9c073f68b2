// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Header parsing for the first beat of a packet.
//!
//! Only the fields the classifier needs are extracted: the ethernet
//! type, the IPv4 protocol and addresses, and the transport ports.
//! Nothing here ever fails. A header which is truncated, not IPv4, or
//! not TCP/UDP simply leaves the corresponding latched fields as they
//! were, and clears the validity flags so the classifier knows not to
//! trust them.

use super::beat::Beat;
use crate::api::ETHER_TYPE_IPV4;
use crate::api::Ipv4Addr;
use crate::api::Protocol;
use core::mem;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;

pub const ETHER_HDR_SZ: usize = mem::size_of::<EtherHdrRaw>();
pub const IPV4_HDR_SZ: usize = mem::size_of::<Ipv4HdrRaw>();
pub const ULP_PORTS_SZ: usize = mem::size_of::<UlpPortsRaw>();

pub const IPV4_HDR_LEN_MASK: u8 = 0x0F;
pub const IPV4_HDR_VER_SHIFT: u8 = 4;
pub const IPV4_VERSION: u8 = 4;

/// Note: For now we keep this unaligned to be safe.
#[repr(C)]
#[derive(
    Clone, Copy, Debug, FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
)]
pub struct EtherHdrRaw {
    pub dst: [u8; 6],
    pub src: [u8; 6],
    pub ether_type: [u8; 2],
}

#[repr(C)]
#[derive(
    Clone, Copy, Debug, FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
)]
pub struct Ipv4HdrRaw {
    pub ver_hdr_len: u8,
    pub dscp_ecn: u8,
    pub total_len: [u8; 2],
    pub ident: [u8; 2],
    pub frag_and_flags: [u8; 2],
    pub ttl: u8,
    pub proto: u8,
    pub csum: [u8; 2],
    pub src: [u8; 4],
    pub dst: [u8; 4],
}

impl Ipv4HdrRaw {
    fn version(&self) -> u8 {
        self.ver_hdr_len >> IPV4_HDR_VER_SHIFT
    }

    /// The header length in bytes, options included.
    fn hdr_len(&self) -> usize {
        usize::from(self.ver_hdr_len & IPV4_HDR_LEN_MASK) * 4
    }
}

/// The leading source/destination port pair shared by TCP and UDP.
#[repr(C)]
#[derive(
    Clone, Copy, Debug, FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
)]
pub struct UlpPortsRaw {
    pub src_port: [u8; 2],
    pub dst_port: [u8; 2],
}

/// The header fields latched by the parser.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HeaderFields {
    pub ether_type: u16,
    pub proto: Protocol,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    /// The most recent sample carried an IPv4 header.
    pub l3_valid: bool,
    /// The most recent sample carried TCP/UDP ports.
    pub l4_valid: bool,
}

impl HeaderFields {
    /// Return the transport ports, if the latest sample produced them.
    pub fn ports(&self) -> Option<(u16, u16)> {
        if self.l3_valid && self.l4_valid {
            Some((self.src_port, self.dst_port))
        } else {
            None
        }
    }
}

/// Latches [`HeaderFields`] from the start-of-packet beat.
#[derive(Debug, Default)]
pub struct HeaderParser {
    fields: HeaderFields,
}

impl HeaderParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &HeaderFields {
        &self.fields
    }

    /// Sample `beat` and update the latched fields.
    pub fn sample(&mut self, beat: &Beat) -> HeaderFields {
        Self::parse_into(&mut self.fields, beat.bytes());
        self.fields
    }

    fn parse_into(f: &mut HeaderFields, bytes: &[u8]) {
        f.l3_valid = false;
        f.l4_valid = false;

        let Ok((eth, rest)) = EtherHdrRaw::ref_from_prefix(bytes) else {
            return;
        };
        f.ether_type = u16::from_be_bytes(eth.ether_type);

        if f.ether_type != ETHER_TYPE_IPV4 {
            return;
        }

        let Ok((ip, _)) = Ipv4HdrRaw::ref_from_prefix(rest) else {
            return;
        };

        let hdr_len = ip.hdr_len();
        if ip.version() != IPV4_VERSION || hdr_len < IPV4_HDR_SZ {
            return;
        }

        f.proto = Protocol::from(ip.proto);
        f.src = Ipv4Addr::from(ip.src);
        f.dst = Ipv4Addr::from(ip.dst);
        f.l3_valid = true;

        if !f.proto.has_ports() {
            return;
        }

        // Options may push the ports past the end of the beat; headers
        // are never assembled across beats.
        let Some(ulp) = rest.get(hdr_len..) else {
            return;
        };
        let Ok((ports, _)) = UlpPortsRaw::ref_from_prefix(ulp) else {
            return;
        };

        f.src_port = u16::from_be_bytes(ports.src_port);
        f.dst_port = u16::from_be_bytes(ports.dst_port);
        f.l4_valid = true;
    }
}
