// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The pipeline engine.
//!
//! Beats enter through the [`fifo::ElasticBuffer`], are parsed and
//! classified by the [`sequencer::Sequencer`] against the rules held
//! in [`classify::ClassTable`], and leave tagged with a priority.
//! [`pipeline::Pipeline`] wires these together and is the only thing
//! most consumers need.
pub mod beat;
pub mod bypass;
pub mod cfg_port;
pub mod classify;
pub mod fifo;
pub mod headers;
pub mod pipeline;
pub mod sequencer;
pub mod stat;

pub use beat::Beat;
pub use beat::BeatFlags;
pub use beat::TaggedBeat;
pub use cfg_port::CfgPort;
pub use pipeline::Pipeline;
pub use pipeline::TickIn;
pub use pipeline::TickOut;
