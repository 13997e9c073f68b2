// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! A cycle-accurate packet prioritization pipeline for market-data
//! traffic.
//!
//! Each call to [`engine::pipeline::Pipeline::tick`] is one clock
//! edge: a beat may be accepted from upstream, the output sequencer
//! takes one step, a beat may be handed downstream, and one
//! configuration write may land in the classification table.
#![allow(clippy::len_without_is_empty)]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

pub mod api;
pub mod cfg;
pub mod engine;
pub mod print;
pub mod sync;
