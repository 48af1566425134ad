/*
 * SPDX-FileCopyrightText: 2025 Inria
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The side tables of an index: bit offsets of lists, document sizes, and
//! the term map.
//!
//! Offsets and sizes are stored on disk as γ-coded gap bitstreams; offsets
//! can be kept either as a plain array or as an Elias–Fano structure, which
//! costs a few percent of access time for a fraction of the memory.

use anyhow::Context;
use dsi_bitstream::impls::{BufBitReader, WordAdapter};
use dsi_bitstream::traits::{BitRead, Endianness};
use dsi_progress_logger::*;
use log::info;
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;
use sux::dict::EliasFanoBuilder;
use sux::rank_sel::SelectAdaptConst;
use sux::traits::IndexedSeq;

use super::EF;
use crate::codes::CodeRead;

/// The bit offsets of the inverted lists inside the document stream.
///
/// There are `terms + 1` offsets; the last one is the overall bit length of
/// the stream.
#[derive(Debug)]
pub enum BitOffsets {
    /// One word per offset.
    Plain(Box<[u64]>),
    /// Quasi-succinct.
    EliasFano(EF),
}

impl BitOffsets {
    /// The bit offset of the inverted list of `term`.
    pub fn get(&self, term: u64) -> u64 {
        match self {
            BitOffsets::Plain(offsets) => offsets[term as usize],
            BitOffsets::EliasFano(ef) => ef.get(term as usize) as u64,
        }
    }

    /// The number of stored offsets.
    pub fn len(&self) -> usize {
        match self {
            BitOffsets::Plain(offsets) => offsets.len(),
            BitOffsets::EliasFano(ef) => ef.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decodes `n` γ-coded offset gaps from a bitstream into absolute offsets.
pub fn read_offsets<E: Endianness, R: CodeRead<E>>(
    reader: &mut R,
    n: usize,
) -> Result<Vec<u64>, R::Error> {
    let mut offsets = Vec::with_capacity(n);
    let mut offset = 0u64;
    for _ in 0..n {
        offset += reader.read_gamma()?;
        offsets.push(offset);
    }
    Ok(offsets)
}

/// The buffered file reader the table loaders use.
type FileBitReader<E> = BufBitReader<E, WordAdapter<u32, BufReader<std::fs::File>>>;

fn open_bit_reader<E: Endianness>(path: &Path) -> anyhow::Result<FileBitReader<E>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Could not open {}", path.display()))?;
    Ok(BufBitReader::<E, _>::new(WordAdapter::<u32, _>::new(
        BufReader::new(file),
    )))
}

/// Loads an offsets file into a plain array.
pub fn load_offsets<E: Endianness>(
    path: impl AsRef<Path>,
    terms: u64,
) -> anyhow::Result<BitOffsets>
where
    FileBitReader<E>: CodeRead<E>,
    <FileBitReader<E> as BitRead<E>>::Error: std::error::Error + Send + Sync + 'static,
{
    let path = path.as_ref();
    let mut reader = open_bit_reader::<E>(path)?;
    let offsets = read_offsets(&mut reader, terms as usize + 1)
        .with_context(|| format!("Could not decode {}", path.display()))?;
    info!("Loaded {} offsets from {}", offsets.len(), path.display());
    Ok(BitOffsets::Plain(offsets.into_boxed_slice()))
}

/// Loads an offsets file into an Elias–Fano structure.
pub fn load_offsets_ef<E: Endianness>(
    path: impl AsRef<Path>,
    terms: u64,
) -> anyhow::Result<BitOffsets>
where
    FileBitReader<E>: CodeRead<E>,
    <FileBitReader<E> as BitRead<E>>::Error: std::error::Error + Send + Sync + 'static,
{
    let path = path.as_ref();
    let mut reader = open_bit_reader::<E>(path)?;
    let offsets = read_offsets(&mut reader, terms as usize + 1)
        .with_context(|| format!("Could not decode {}", path.display()))?;
    let upper_bound = *offsets.last().unwrap() as usize + 1;

    let mut pl = ProgressLogger::default();
    pl.item_name("offset").expected_updates(Some(offsets.len()));
    pl.start("Translating offsets to Elias-Fano...");
    let mut efb = EliasFanoBuilder::new(offsets.len(), upper_bound);
    for &offset in &offsets {
        efb.push(offset as usize);
        pl.light_update();
    }
    pl.done();

    let ef = efb.build();
    let ef: EF = unsafe { ef.map_high_bits(SelectAdaptConst::<_, _, 12, 4>::new) };
    Ok(BitOffsets::EliasFano(ef))
}

/// Decodes `n` γ-coded document sizes from a bitstream.
pub fn read_sizes<E: Endianness, R: CodeRead<E>>(
    reader: &mut R,
    n: usize,
) -> Result<Vec<u32>, R::Error> {
    let mut sizes = Vec::with_capacity(n);
    for _ in 0..n {
        sizes.push(reader.read_gamma()? as u32);
    }
    Ok(sizes)
}

/// Loads a sizes file (γ-coded, one value per document).
pub fn load_sizes<E: Endianness>(
    path: impl AsRef<Path>,
    documents: u64,
) -> anyhow::Result<Box<[u32]>>
where
    FileBitReader<E>: CodeRead<E>,
    <FileBitReader<E> as BitRead<E>>::Error: std::error::Error + Send + Sync + 'static,
{
    let path = path.as_ref();
    let mut reader = open_bit_reader::<E>(path)?;
    let sizes = read_sizes(&mut reader, documents as usize)
        .with_context(|| format!("Could not decode {}", path.display()))?;
    Ok(sizes.into_boxed_slice())
}

/// Resolves term strings to term ordinals.
pub trait TermMap {
    fn term_index(&self, term: &str) -> Option<u64>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TermMap for HashMap<String, u64> {
    fn term_index(&self, term: &str) -> Option<u64> {
        self.get(term).copied()
    }

    fn len(&self) -> usize {
        HashMap::len(self)
    }
}

/// Loads a terms file (one term per line, in ordinal order) into a map.
pub fn load_term_map(path: impl AsRef<Path>) -> anyhow::Result<HashMap<String, u64>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Could not open {}", path.display()))?;
    let mut map = HashMap::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let term = line.with_context(|| format!("Could not read {}", path.display()))?;
        map.insert(term, index as u64);
    }
    Ok(map)
}
