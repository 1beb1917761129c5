// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod error;
pub mod event;
pub mod field;
pub mod timestamp;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use error::{ShipError, ShipErrorKind, ShipResult};
pub use event::Event;
pub use field::AddFieldRule;
pub use timestamp::TimestampCache;
