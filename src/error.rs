/*
 * SPDX-FileCopyrightText: 2025 Inria
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Error types for cursor operations.

use crate::codes::Coding;

/// A specialized result type for cursor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The ways reading an inverted list can fail.
///
/// Any decoding error is fatal for the cursor that raised it; callers are
/// expected to drop the cursor and open a new one.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The index was built with a coding this reader flavor does not decode.
    #[error("the {component} coding {coding:?} is not supported by this reader")]
    UnsupportedCoding {
        coding: Coding,
        component: &'static str,
    },

    /// The index does not carry the requested per-document data at all.
    #[error("this index does not contain {0}")]
    UnsupportedFeature(&'static str),

    /// Positioning on a nonzero term requires an offsets table.
    #[error("an offsets table is required to position on term {0}")]
    MissingOffsets(u64),

    /// Term-string lookup requires a term map.
    #[error("this index has no term map")]
    MissingTermMap,

    /// The position coding needs the document size table, which is absent.
    #[error("the position coding {0:?} requires a document size table")]
    MissingSizes(Coding),

    /// The term ordinal is not smaller than the number of terms.
    #[error("term {0} out of range")]
    TermOutOfRange(u64),

    /// The cursor has been closed.
    #[error("this reader has been closed")]
    ReaderClosed,

    /// The bitstream violated a structural invariant.
    #[error("corrupt bitstream: {0}")]
    CorruptStream(&'static str),

    /// An error bubbled up from the underlying bitstream or byte source.
    #[error("bitstream error: {0}")]
    Bits(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub(crate) fn bits(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Bits(Box::new(e))
    }
}
