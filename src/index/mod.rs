/*
 * SPDX-FileCopyrightText: 2025 Inria
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Bitstream-compressed inverted indices.
//!
//! An index stores, for each term, its *inverted list*: the frequency, the
//! strictly increasing document pointers, and optionally per-document counts,
//! position lists and payloads, all gap-compressed with instantaneous codes
//! and interleaved with hierarchical skip towers. The reading machinery
//! revolves around [`IndexIterator`], a stateful cursor decoding one list
//! lazily; [`BitStreamIndex`] (and its high-performance split-stream sibling
//! [`BitStreamHPIndex`]) own the immutable data and hand out cursors.

use anyhow::Context;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use crate::codes::{CodeRead, CodeWrite, Coding};
use crate::utils::{int2nat, nat2int};
use dsi_bitstream::prelude::len_delta;
use dsi_bitstream::traits::{BitRead, BitWrite, Endianness};

pub mod params;

mod factories;
pub use factories::*;

mod tables;
pub use tables::*;

pub mod reader;
pub use reader::{BitStreamIndex, IndexIterator};

pub mod hp;
pub use hp::{BitStreamHPIndex, HPIndexIterator};

pub const INDEX_EXTENSION: &str = "index";
pub const POSITIONS_EXTENSION: &str = "positions";
pub const OFFSETS_EXTENSION: &str = "offsets";
pub const SIZES_EXTENSION: &str = "sizes";
pub const PROPERTIES_EXTENSION: &str = "properties";

/// Returned by [`IndexIterator::next_document`] when the current list is
/// exhausted. Distinct from every valid document pointer.
pub const END_OF_LIST: u64 = u64::MAX;

/// Returned by [`IndexIterator::next_position`] when the positions of the
/// current document are exhausted. Distinct from every valid position.
pub const END_OF_POSITIONS: u32 = u32::MAX;

/// The version of Elias–Fano we use for offset tables.
pub type EF = sux::dict::EliasFano<
    sux::rank_sel::SelectAdaptConst<sux::bits::BitVec<Box<[usize]>>, Box<[usize]>, 12, 4>,
    sux::bits::BitFieldVec<usize, Box<[usize]>>,
>;

/// Skip-structure parameters of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipParams {
    /// The number of document records between two skip towers. Zero means
    /// that each list chooses its own power-of-two quantum.
    pub quantum: u64,
    /// The maximum tower height; the top of a full-height tower skips
    /// `2^height` quanta.
    pub height: u32,
}

/// The kind of per-document payload an index carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// A signed 64-bit integer, stored as a zig-zag folded δ code.
    Int,
    /// An uninterpreted blob of the given number of bytes.
    Fixed(usize),
}

/// A decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadValue {
    Int(i64),
    Fixed(Vec<u8>),
}

impl PayloadKind {
    /// Decodes one payload from the given bitstream.
    pub fn read<E: Endianness, R: CodeRead<E>>(
        &self,
        reader: &mut R,
    ) -> Result<PayloadValue, <R as BitRead<E>>::Error> {
        match self {
            PayloadKind::Int => Ok(PayloadValue::Int(nat2int(reader.read_delta()?))),
            PayloadKind::Fixed(bytes) => {
                let mut data = Vec::with_capacity(*bytes);
                for _ in 0..*bytes {
                    data.push(reader.read_bits(8)? as u8);
                }
                Ok(PayloadValue::Fixed(data))
            }
        }
    }

    /// Encodes one payload, returning the number of written bits.
    pub fn write<E: Endianness, W: CodeWrite<E>>(
        &self,
        writer: &mut W,
        value: &PayloadValue,
    ) -> Result<usize, <W as BitWrite<E>>::Error> {
        match (self, value) {
            (PayloadKind::Int, PayloadValue::Int(x)) => writer.write_delta(int2nat(*x)),
            (PayloadKind::Fixed(bytes), PayloadValue::Fixed(data)) => {
                assert_eq!(*bytes, data.len());
                let mut written = 0;
                for byte in data {
                    written += writer.write_bits(*byte as u64, 8)?;
                }
                Ok(written)
            }
            _ => panic!("payload value does not match the declared kind"),
        }
    }

    /// The number of bits [`PayloadKind::write`] would emit.
    pub fn len(&self, value: &PayloadValue) -> usize {
        match (self, value) {
            (PayloadKind::Int, PayloadValue::Int(x)) => len_delta(int2nat(*x)),
            (PayloadKind::Fixed(bytes), PayloadValue::Fixed(_)) => bytes * 8,
            _ => panic!("payload value does not match the declared kind"),
        }
    }
}

/// What an interval iterator built on a cursor would enumerate.
///
/// Indices with positions support proper minimal-interval semantics; indices
/// with payloads but no positions degenerate to document-level matches, and
/// indices with neither support no interval semantics at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalSemantics {
    /// Intervals are derived from term positions.
    Positional,
    /// Every matching document yields a single degenerate whole-document
    /// interval.
    DocumentLevel,
    /// No interval semantics available.
    None,
}

/// The immutable shape of an index: sizes, feature set, and coding choices.
///
/// A descriptor is usually parsed from a `.properties` file; every reader of the
/// same index shares one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    /// The number of documents in the collection.
    pub documents: u64,
    /// The number of terms.
    pub terms: u64,
    /// The overall number of postings.
    pub occurrences: u64,
    /// The code used for frequencies.
    pub frequency_coding: Coding,
    /// The code used for document-pointer gaps.
    pub pointer_coding: Coding,
    /// The code used for counts, if the index has counts.
    pub count_coding: Option<Coding>,
    /// The code used for position gaps, if the index has positions.
    pub position_coding: Option<Coding>,
    /// The payload kind, if the index has payloads.
    pub payload: Option<PayloadKind>,
    /// The skip-structure parameters, if the index has skip towers.
    pub skips: Option<SkipParams>,
}

impl IndexDescriptor {
    pub fn has_counts(&self) -> bool {
        self.count_coding.is_some()
    }

    pub fn has_positions(&self) -> bool {
        self.position_coding.is_some()
    }

    pub fn has_payloads(&self) -> bool {
        self.payload.is_some()
    }

    pub fn has_skips(&self) -> bool {
        self.skips.is_some()
    }

    /// Checks internal consistency and coding legality.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::Error;
        use Coding::*;
        if !matches!(self.frequency_coding, Gamma | ShiftedGamma | Delta) {
            return Err(Error::UnsupportedCoding {
                coding: self.frequency_coding,
                component: "frequency",
            });
        }
        if !matches!(
            self.pointer_coding,
            Unary | Gamma | ShiftedGamma | Delta | Golomb
        ) {
            return Err(Error::UnsupportedCoding {
                coding: self.pointer_coding,
                component: "pointer",
            });
        }
        if let Some(coding) = self.count_coding {
            if !matches!(coding, Unary | Gamma | ShiftedGamma | Delta) {
                return Err(Error::UnsupportedCoding {
                    coding,
                    component: "count",
                });
            }
        }
        if let Some(coding) = self.position_coding {
            if !matches!(
                coding,
                Gamma | ShiftedGamma | Delta | Golomb | SkewedGolomb | Interpolative
            ) {
                return Err(Error::UnsupportedCoding {
                    coding,
                    component: "position",
                });
            }
            if !self.has_counts() {
                return Err(Error::CorruptStream("positions require counts"));
            }
        }
        if let Some(skips) = &self.skips {
            if skips.quantum != 0 && !skips.quantum.is_power_of_two() {
                return Err(Error::CorruptStream("skip quantum must be a power of two"));
            }
            if skips.height > 30 {
                return Err(Error::CorruptStream("skip height out of range"));
            }
        }
        Ok(())
    }

    /// Parses a descriptor from a Java-style `.properties` file.
    pub fn from_properties(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Could not open {}", path.display()))?;
        let map = java_properties::read(std::io::BufReader::new(file))
            .with_context(|| format!("cannot parse {} as a java properties file", path.display()))?;
        Self::from_properties_map(&map)
    }

    /// Parses a descriptor from an already loaded property map.
    pub fn from_properties_map(map: &HashMap<String, String>) -> anyhow::Result<Self> {
        fn get_u64(map: &HashMap<String, String>, key: &str) -> anyhow::Result<u64> {
            map.get(key)
                .with_context(|| format!("Missing '{}' property", key))?
                .parse::<u64>()
                .with_context(|| format!("Cannot parse '{}' as u64", key))
        }

        let documents = get_u64(map, "documents")?;
        let terms = get_u64(map, "terms")?;
        let occurrences = get_u64(map, "occurrences").unwrap_or(0);

        let mut frequency_coding = Coding::Gamma;
        let mut pointer_coding = Coding::Delta;
        let mut count_coding = None;
        let mut position_coding = None;
        if let Some(flags) = map.get("compressionflags") {
            for flag in flags.split('|').filter(|f| !f.is_empty()) {
                let (component, coding_name) = flag
                    .split_once('_')
                    .with_context(|| format!("Bad compression flag '{}'", flag))?;
                let coding = if coding_name == "NONE" {
                    None
                } else {
                    Some(Coding::from_flag_str(coding_name).with_context(|| {
                        format!("Unknown coding '{}' in flag '{}'", coding_name, flag)
                    })?)
                };
                match component {
                    "FREQUENCIES" => {
                        frequency_coding =
                            coding.context("frequencies cannot have coding NONE")?
                    }
                    "POINTERS" => {
                        pointer_coding = coding.context("pointers cannot have coding NONE")?
                    }
                    "COUNTS" => count_coding = coding,
                    "POSITIONS" => position_coding = coding,
                    _ => anyhow::bail!("Unknown compression flag component '{}'", component),
                }
            }
        }

        let payload = match map.get("payload").map(String::as_str) {
            None | Some("NONE") => None,
            Some("INT") => Some(PayloadKind::Int),
            Some(s) => {
                let bytes = s
                    .strip_prefix("FIXED_")
                    .with_context(|| format!("Unknown payload kind '{}'", s))?
                    .parse::<usize>()
                    .with_context(|| format!("Cannot parse payload kind '{}'", s))?;
                Some(PayloadKind::Fixed(bytes))
            }
        };

        let skips = match (map.get("skipquantum"), map.get("skipheight")) {
            (Some(q), Some(h)) => Some(SkipParams {
                quantum: q.parse::<u64>().context("Cannot parse 'skipquantum'")?,
                height: h.parse::<u32>().context("Cannot parse 'skipheight'")?,
            }),
            (None, None) => None,
            _ => anyhow::bail!("'skipquantum' and 'skipheight' must be both present or absent"),
        };

        let descriptor = IndexDescriptor {
            documents,
            terms,
            occurrences,
            frequency_coding,
            pointer_coding,
            count_coding,
            position_coding,
            payload,
            skips,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Renders the descriptor in `.properties` format.
    pub fn to_properties(&self) -> String {
        let mut s = String::new();
        s.push_str(&format!("documents={}\n", self.documents));
        s.push_str(&format!("terms={}\n", self.terms));
        s.push_str(&format!("occurrences={}\n", self.occurrences));
        s.push_str(&format!(
            "compressionflags=FREQUENCIES_{}|POINTERS_{}|COUNTS_{}|POSITIONS_{}\n",
            self.frequency_coding.to_flag_str(),
            self.pointer_coding.to_flag_str(),
            self.count_coding.map_or("NONE", Coding::to_flag_str),
            self.position_coding.map_or("NONE", Coding::to_flag_str),
        ));
        match self.payload {
            None => {}
            Some(PayloadKind::Int) => s.push_str("payload=INT\n"),
            Some(PayloadKind::Fixed(bytes)) => s.push_str(&format!("payload=FIXED_{}\n", bytes)),
        }
        if let Some(skips) = &self.skips {
            s.push_str(&format!("skipquantum={}\n", skips.quantum));
            s.push_str(&format!("skipheight={}\n", skips.height));
        }
        s
    }
}

/// Reads a `.properties` blob from any buffered source into a property map.
pub fn read_properties(reader: impl BufRead) -> anyhow::Result<HashMap<String, String>> {
    java_properties::read(reader).context("cannot parse java properties")
}
