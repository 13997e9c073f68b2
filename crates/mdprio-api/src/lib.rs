// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

#![no_std]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

#[macro_use]
extern crate alloc;

pub mod cfg;
pub mod ip;
pub mod prio;
pub mod stat;

pub use cfg::*;
pub use ip::*;
pub use prio::*;
pub use stat::*;

/// The overall version of the API. Anytime an API type is added,
/// removed, or modified, this number should increment. The admin tool
/// prints it alongside its own version so that a mismatched build is
/// easy to spot.
pub const API_VERSION: u64 = 4;

/// Major version of the mdprio package.
pub const MAJOR_VERSION: u64 = 0;
