// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Versioned snapshots of shared state.
//!
//! A [`SnapCell`] holds an immutable value behind an `Arc`. Readers
//! take a [`Snap`] (a clone of the `Arc` plus the epoch it was
//! published at) and keep using it for as long as they like; they
//! never observe a value mid-update. Writers copy the current value,
//! modify the copy, and publish it under the next epoch. Writers are
//! serialized among themselves; readers only ever contend for the
//! instant it takes to clone the `Arc`.

use std::ops::Deref;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::RwLock;

/// An immutable, versioned view of a [`SnapCell`] value.
#[derive(Debug)]
pub struct Snap<T> {
    epoch: u64,
    val: Arc<T>,
}

impl<T> Snap<T> {
    /// The epoch at which this value was published. Epochs start at 1
    /// and move forward by one per publish.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl<T> Clone for Snap<T> {
    fn clone(&self) -> Self {
        Self { epoch: self.epoch, val: Arc::clone(&self.val) }
    }
}

impl<T> Deref for Snap<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.val
    }
}

#[derive(Debug)]
pub struct SnapCell<T> {
    current: RwLock<Snap<T>>,
    // Held for the whole read-copy-publish sequence so that two
    // writers never publish from the same base.
    writer: Mutex<()>,
}

impl<T: Clone> SnapCell<T> {
    pub fn new(val: T) -> Self {
        Self {
            current: RwLock::new(Snap { epoch: 1, val: Arc::new(val) }),
            writer: Mutex::new(()),
        }
    }

    /// Return the currently published value.
    pub fn snapshot(&self) -> Snap<T> {
        // A poisoned lock still guards a whole `Snap`: the only write
        // is a single assignment.
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn epoch(&self) -> u64 {
        self.snapshot().epoch
    }

    /// Apply `f` to a copy of the current value. If `f` returns
    /// `Some`, the copy is published under a new epoch.
    ///
    /// Returns the value produced by `f`, if any.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> Option<R>) -> Option<R> {
        let _w = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let base = self.snapshot();
        let mut next = T::clone(&base);
        let res = f(&mut next)?;

        let snap = Snap { epoch: base.epoch + 1, val: Arc::new(next) };
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snap;
        Some(res)
    }
}
