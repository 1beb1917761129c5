// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Byte-accurate file tailing.
//!
//! A [`Tailer`] owns one file and a read position. The committed offset is
//! advanced only when the caller signals that a complete logical event has
//! been shipped (or stashed); the position survives restarts through a
//! fixed-width [`PositionStore`] record keyed by inode.

pub mod position;
pub mod tailer;

pub use position::{Position, PositionStore};
pub use tailer::{StartPosition, TailRead, Tailer};
