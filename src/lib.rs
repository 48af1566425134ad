/*
 * SPDX-FileCopyrightText: 2025 Inria
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

#![doc = include_str!("../README.md")]
#![deny(unstable_features)]
#![deny(trivial_casts)]
#![deny(unconditional_recursion)]
#![deny(clippy::empty_loop)]
#![deny(unreachable_code)]
#![deny(unreachable_patterns)]
#![deny(unused_macro_rules)]

pub mod codes;
pub mod error;
pub mod index;
pub mod utils;

/// Prelude module to import everything from this crate.
pub mod prelude {
    pub use crate::codes::*;
    pub use crate::error::{Error, Result};
    pub use crate::index::*;
    pub use crate::utils::*;
}
