// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Beats: the fixed-width transfer unit of the streaming interface.

use crate::api::Priority;
use bitflags::bitflags;
use core::fmt;
use core::fmt::Debug;
use serde::Deserialize;
use serde::Serialize;

/// The width of the data bus, in bytes.
pub const BEAT_BYTES: usize = 64;

bitflags! {
    /// Packet boundary flags carried alongside each beat.
    #[derive(
        Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq,
        Serialize,
    )]
    pub struct BeatFlags: u8 {
        /// First beat of a packet.
        const SOP = 0x01;
        /// Last beat of a packet.
        const EOP = 0x02;
    }
}

/// One transfer on the streaming interface.
///
/// Validity is not a field: an interface that is not driving a beat
/// this cycle presents `None`.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Beat {
    pub data: [u8; BEAT_BYTES],
    /// The number of meaningful bytes in `data`. Only the last beat of
    /// a packet may be short.
    pub len: u8,
    pub flags: BeatFlags,
}

impl Beat {
    /// Build a beat from up to [`BEAT_BYTES`] of `bytes`, zero padding
    /// the rest.
    pub fn new(bytes: &[u8], flags: BeatFlags) -> Self {
        let len = bytes.len().min(BEAT_BYTES);
        let mut data = [0u8; BEAT_BYTES];
        data[..len].copy_from_slice(&bytes[..len]);
        Self { data, len: len as u8, flags }
    }

    /// A packet which fits in a single beat.
    pub fn single(bytes: &[u8]) -> Self {
        Self::new(bytes, BeatFlags::SOP | BeatFlags::EOP)
    }

    /// Cut a frame into the sequence of beats which carry it.
    ///
    /// An empty frame still occupies one (empty) beat so that the
    /// packet has its start and end flags.
    pub fn split_frame(frame: &[u8]) -> Vec<Self> {
        if frame.is_empty() {
            return vec![Self::single(&[])];
        }

        let n = frame.len().div_ceil(BEAT_BYTES);
        frame
            .chunks(BEAT_BYTES)
            .enumerate()
            .map(|(i, chunk)| {
                let mut flags = BeatFlags::empty();
                flags.set(BeatFlags::SOP, i == 0);
                flags.set(BeatFlags::EOP, i == n - 1);
                Self::new(chunk, flags)
            })
            .collect()
    }

    #[inline]
    pub fn is_sop(&self) -> bool {
        self.flags.contains(BeatFlags::SOP)
    }

    #[inline]
    pub fn is_eop(&self) -> bool {
        self.flags.contains(BeatFlags::EOP)
    }

    /// The meaningful bytes of this beat.
    pub fn bytes(&self) -> &[u8] {
        &self.data[..usize::from(self.len)]
    }
}

impl Debug for Beat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Beat")
            .field("len", &self.len)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// A beat as it leaves the pipeline, tagged with its packet's
/// priority.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TaggedBeat {
    pub beat: Beat,
    pub priority: Priority,
}
