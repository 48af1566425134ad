/*
 * SPDX-FileCopyrightText: 2025 Inria
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Random access to a high-performance index, whose position lists live in
//! a second bitstream.
//!
//! In this layout the document stream interleaves pointers, towers and
//! counts only; each list is prefixed with the absolute bit offset of its
//! positions in the *positions stream*, and towers carry one more skip per
//! level measuring positions-stream bits. Position decoding is entirely
//! deferred: the cursor tracks how many bits of the positions stream the
//! current quantum starts at (`positions_bits_offset`, relative to the start
//! of the list) and how many position blocks inside the quantum still
//! separate it from the current document
//! (`positions_to_read_to_reach_current_position`); both are settled only
//! when positions are actually requested.
//!
//! Every update of the two counters is paired with a state transition of the
//! cursor: crossing a tower adds the positions bits of the quantum being
//! left, a tower leap adds the leapt level's positions skip and zeroes the
//! in-quantum counter, and reading a document inside a quantum adds the
//! count of the document being left.

use core::marker::PhantomData;

use crate::codes::{CodeRead, Coding};
use crate::error::{Error, Result};
use crate::utils::{ceil_log2, msb, nat2int};
use dsi_bitstream::traits::{BitRead, BitSeek, Endianness};
use log::info;

use super::params;
use super::reader::State;
use super::{
    BitOffsets, BitReaderFactory, IndexDescriptor, IntervalSemantics, TermMap, END_OF_LIST,
    END_OF_POSITIONS,
};

/// An index splitting document-level data and positions in two parallel
/// bitstreams.
///
/// High-performance indices always carry counts and positions, never
/// payloads, and their position coding must be γ, shifted γ, or δ.
pub struct BitStreamHPIndex<E: Endianness, F: BitReaderFactory<E>> {
    pub(crate) descriptor: IndexDescriptor,
    pub(crate) factory: F,
    pub(crate) positions_factory: F,
    pub(crate) offsets: Option<BitOffsets>,
    pub(crate) term_map: Option<Box<dyn TermMap + Send + Sync>>,
    pub(crate) _marker: PhantomData<E>,
}

impl<E: Endianness, F: BitReaderFactory<E>> BitStreamHPIndex<E, F> {
    /// Creates an index over the given document and positions data.
    pub fn new(factory: F, positions_factory: F, descriptor: IndexDescriptor) -> Result<Self> {
        descriptor.validate()?;
        if descriptor.has_payloads() {
            return Err(Error::UnsupportedFeature(
                "payloads in a high-performance index",
            ));
        }
        match descriptor.position_coding {
            Some(Coding::Gamma | Coding::ShiftedGamma | Coding::Delta) => {}
            Some(coding) => {
                return Err(Error::UnsupportedCoding {
                    coding,
                    component: "position",
                })
            }
            None => return Err(Error::UnsupportedFeature("positions")),
        }
        if !descriptor.has_counts() {
            return Err(Error::UnsupportedFeature("counts"));
        }
        if !descriptor.has_skips() {
            return Err(Error::UnsupportedFeature(
                "a high-performance index requires skip towers",
            ));
        }
        info!(
            "Opening high-performance index: {} documents, {} terms",
            descriptor.documents, descriptor.terms
        );
        Ok(Self {
            descriptor,
            factory,
            positions_factory,
            offsets: None,
            term_map: None,
            _marker: PhantomData,
        })
    }

    pub fn with_offsets(mut self, offsets: BitOffsets) -> Self {
        self.offsets = Some(offsets);
        self
    }

    pub fn with_term_map(mut self, term_map: impl TermMap + Send + Sync + 'static) -> Self {
        self.term_map = Some(Box::new(term_map));
        self
    }

    pub fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    pub fn num_documents(&self) -> u64 {
        self.descriptor.documents
    }

    pub fn num_terms(&self) -> u64 {
        self.descriptor.terms
    }
}

impl<E: Endianness, F: BitReaderFactory<E>> BitStreamHPIndex<E, F>
where
    for<'a> F::BitReader<'a>: CodeRead<E> + BitSeek,
    for<'a> <F::BitReader<'a> as BitRead<E>>::Error: std::error::Error + Send + Sync + 'static,
    for<'a> <F::BitReader<'a> as BitSeek>::Error: std::error::Error + Send + Sync + 'static,
{
    /// Returns an unpositioned cursor.
    pub fn reader(&self) -> Result<HPIndexIterator<'_, E, F::BitReader<'_>>> {
        Ok(HPIndexIterator::new(
            &self.descriptor,
            self.offsets.as_ref(),
            self.factory.new_reader(),
            self.positions_factory.new_reader(),
        ))
    }

    /// Returns a cursor positioned on the inverted list of `term`.
    pub fn documents(&self, term: u64) -> Result<HPIndexIterator<'_, E, F::BitReader<'_>>> {
        let mut iterator = self.reader()?;
        iterator.position(term)?;
        Ok(iterator)
    }

    /// Resolves a term string through the term map and positions a cursor on
    /// its list; `Ok(None)` if the term does not occur in the collection.
    pub fn documents_by_term(
        &self,
        term: &str,
    ) -> Result<Option<HPIndexIterator<'_, E, F::BitReader<'_>>>> {
        let term_map = self.term_map.as_ref().ok_or(Error::MissingTermMap)?;
        match term_map.term_index(term) {
            None => Ok(None),
            Some(index) => self.documents(index).map(Some),
        }
    }
}

/// A cursor over the inverted lists of a [`BitStreamHPIndex`].
pub struct HPIndexIterator<'a, E: Endianness, CR: CodeRead<E> + BitSeek> {
    descriptor: &'a IndexDescriptor,
    offsets: Option<&'a BitOffsets>,
    ibs: CR,
    positions: CR,
    closed: bool,

    current_term: i64,
    frequency: u64,
    has_pointers: bool,
    golomb_b: u64,
    golomb_log2b: u32,
    current_document: u64,
    number_of_document_record: i64,
    state: State,
    count: i64,
    position_cache: Vec<u32>,
    current_position: usize,
    /// Whether the positions of the current document have not been fetched
    /// yet.
    positions_unread: bool,
    /// The absolute bit offset of the current list in the positions stream.
    last_positions_offset: u64,

    variable_quanta: bool,
    height: u32,
    quantum: u64,
    quantum_modulo_mask: u64,
    quantum_division_shift: u32,
    w: u64,
    w_modulo_mask: u64,
    w_division_shift: u32,
    maxh: i32,
    s: i32,
    lowest: i32,
    tower_top_b: Box<[u64]>,
    tower_top_log2b: Box<[u32]>,
    tower_lower_b: Box<[u64]>,
    tower_lower_log2b: Box<[u32]>,
    pointer_prediction: Box<[i64]>,
    bit_skip: Box<[i64]>,
    pointer_skip: Box<[i64]>,
    positions_bit_skip: Box<[i64]>,
    read_bits_at_last_skip_tower: u64,
    pointer_at_last_skip_tower: u64,
    /// Bits of the positions stream, from the start of the list, before the
    /// first position record of the quantum being scanned.
    positions_bits_offset: i64,
    /// Position blocks inside the current quantum that still separate the
    /// positions stream from the current document.
    positions_to_read_to_reach_current_position: i64,
    /// The last increment added to `positions_bits_offset`.
    last_positions_increment: i64,
    quantum_bit_length: i64,
    positions_quantum_bit_length: i64,
    entry_bit_length: i64,

    _marker: PhantomData<E>,
}

impl<'a, E: Endianness, CR: CodeRead<E> + BitSeek> HPIndexIterator<'a, E, CR>
where
    <CR as BitRead<E>>::Error: std::error::Error + Send + Sync + 'static,
    <CR as BitSeek>::Error: std::error::Error + Send + Sync + 'static,
{
    pub(crate) fn new(
        descriptor: &'a IndexDescriptor,
        offsets: Option<&'a BitOffsets>,
        ibs: CR,
        positions: CR,
    ) -> Self {
        let (height, quantum, variable_quanta) = match descriptor.skips {
            Some(skips) => (skips.height, skips.quantum, skips.quantum == 0),
            None => (0, 0, false),
        };
        let levels = height as usize + 1;
        let mut iterator = Self {
            descriptor,
            offsets,
            ibs,
            positions,
            closed: false,
            current_term: -1,
            frequency: 0,
            has_pointers: false,
            golomb_b: 0,
            golomb_log2b: 0,
            current_document: 0,
            number_of_document_record: -1,
            state: State::BeforePointer,
            count: -1,
            position_cache: vec![0; 16],
            current_position: 0,
            positions_unread: false,
            last_positions_offset: 0,
            variable_quanta,
            height,
            quantum: 0,
            quantum_modulo_mask: 0,
            quantum_division_shift: 0,
            w: 0,
            w_modulo_mask: 0,
            w_division_shift: 0,
            maxh: -1,
            s: 0,
            lowest: i32::MAX,
            tower_top_b: vec![0; levels].into_boxed_slice(),
            tower_top_log2b: vec![0; levels].into_boxed_slice(),
            tower_lower_b: vec![0; levels].into_boxed_slice(),
            tower_lower_log2b: vec![0; levels].into_boxed_slice(),
            pointer_prediction: vec![0; levels].into_boxed_slice(),
            bit_skip: vec![0; levels + 1].into_boxed_slice(),
            pointer_skip: vec![0; levels + 1].into_boxed_slice(),
            positions_bit_skip: vec![0; levels + 1].into_boxed_slice(),
            read_bits_at_last_skip_tower: 0,
            pointer_at_last_skip_tower: 0,
            positions_bits_offset: 0,
            positions_to_read_to_reach_current_position: 0,
            last_positions_increment: 0,
            quantum_bit_length: -1,
            positions_quantum_bit_length: -1,
            entry_bit_length: -1,
            _marker: PhantomData,
        };
        if descriptor.has_skips() && !variable_quanta {
            iterator.quantum = quantum;
            iterator.quantum_modulo_mask = quantum - 1;
            iterator.quantum_division_shift = msb(quantum) as u32;
            iterator.w = quantum << height;
            iterator.w_modulo_mask = iterator.w - 1;
            iterator.w_division_shift = msb(iterator.w) as u32;
        }
        iterator
    }

    #[inline]
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::ReaderClosed)
        } else {
            Ok(())
        }
    }

    #[inline]
    fn bit_pos(&mut self) -> Result<u64> {
        self.ibs.bit_pos().map_err(Error::bits)
    }

    #[inline]
    fn skip_ahead(&mut self, n: i64) -> Result<()> {
        if n < 0 {
            return Err(Error::CorruptStream("negative bit skip"));
        }
        let pos = self.bit_pos()?;
        self.ibs.set_bit_pos(pos + n as u64).map_err(Error::bits)
    }

    /// Bits consumed in the positions stream, from the start of the current
    /// list.
    #[inline]
    fn positions_read_bits(&mut self) -> Result<i64> {
        let pos = self.positions.bit_pos().map_err(Error::bits)?;
        Ok(pos as i64 - self.last_positions_offset as i64)
    }

    fn has_current_document(&self) -> bool {
        self.number_of_document_record >= 0 && self.current_document != END_OF_LIST
    }

    /// Positions the cursor on the inverted list of a given term.
    ///
    /// Term 0 can always be reached, even without an offsets table.
    pub fn position(&mut self, term: u64) -> Result<()> {
        self.ensure_open()?;
        if term >= self.descriptor.terms {
            return Err(Error::TermOutOfRange(term));
        }
        if term == 0 {
            self.ibs.set_bit_pos(0).map_err(Error::bits)?;
        } else {
            let offsets = self.offsets.ok_or(Error::MissingOffsets(term))?;
            let offset = offsets.get(term);
            self.ibs.set_bit_pos(offset).map_err(Error::bits)?;
        }
        // Every list starts with the absolute offset of its positions.
        self.last_positions_offset = self.ibs.read_delta().map_err(Error::bits)?;
        self.positions
            .set_bit_pos(self.last_positions_offset)
            .map_err(Error::bits)?;
        self.current_term = term as i64;
        self.read_frequency()
    }

    /// Moves to the next term, exhausting the current list if necessary.
    /// Returns `false` when there is no next term.
    pub fn advance(&mut self) -> Result<bool> {
        self.ensure_open()?;
        if self.current_term == self.descriptor.terms as i64 - 1 {
            return Ok(false);
        }
        if self.current_term != -1 {
            // Exhausting the list leaves no garbage before the next header.
            self.skip_to(END_OF_LIST)?;
            self.next_document()?;
            self.positions_unread = false;
        }
        let next_positions_offset = self.ibs.read_delta().map_err(Error::bits)?;
        self.positions
            .set_bit_pos(next_positions_offset)
            .map_err(Error::bits)?;
        self.last_positions_offset = next_positions_offset;
        self.current_term += 1;
        self.read_frequency()?;
        Ok(true)
    }

    pub fn term_number(&self) -> Result<i64> {
        self.ensure_open()?;
        Ok(self.current_term)
    }

    pub fn frequency(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.frequency)
    }

    /// The last document returned by
    /// [`next_document`](HPIndexIterator::next_document), or [`END_OF_LIST`]
    /// past the end of the list. Unspecified before the first call.
    pub fn document(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.current_document)
    }

    pub fn may_have_next(&self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.number_of_document_record < self.frequency as i64 - 1)
    }

    pub fn interval_semantics(&self) -> IntervalSemantics {
        IntervalSemantics::Positional
    }

    /// Closes the cursor; all subsequent operations fail.
    pub fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn read_frequency(&mut self) -> Result<()> {
        let code = match self.descriptor.frequency_coding {
            Coding::Gamma => self.ibs.read_gamma().map_err(Error::bits)?,
            Coding::ShiftedGamma => self.ibs.read_shifted_gamma().map_err(Error::bits)?,
            Coding::Delta => self.ibs.read_delta().map_err(Error::bits)?,
            coding => {
                return Err(Error::UnsupportedCoding {
                    coding,
                    component: "frequency",
                })
            }
        };
        self.frequency = code + 1;
        if self.frequency > self.descriptor.documents {
            return Err(Error::CorruptStream("frequency exceeds number of documents"));
        }
        self.has_pointers = self.frequency < self.descriptor.documents;
        if self.descriptor.pointer_coding == Coding::Golomb && self.has_pointers {
            self.golomb_b = params::golomb_modulus(self.frequency, self.descriptor.documents);
            self.golomb_log2b = msb(self.golomb_b) as u32;
        }

        if self.descriptor.has_skips() {
            if self.variable_quanta {
                let mut shift: i64 = if self.frequency > 1 {
                    self.ibs.read_gamma().map_err(Error::bits)? as i64 - 1
                } else {
                    -1
                };
                if shift == -1 {
                    shift = ceil_log2(self.frequency) as i64 + 1;
                }
                self.quantum_division_shift = shift as u32;
                self.quantum = 1u64 << shift;
                self.quantum_modulo_mask = self.quantum - 1;
                self.w = self.quantum << self.height;
                self.w_modulo_mask = self.w - 1;
                self.w_division_shift = msb(self.w) as u32;
            }

            self.quantum_bit_length = -1;
            self.positions_quantum_bit_length = -1;
            self.entry_bit_length = -1;
            self.lowest = i32::MAX;
            self.maxh = -1;

            let sigma =
                params::quantum_sigma(self.frequency, self.descriptor.documents, self.quantum);
            let mut i =
                (self.height as i32).min(msb(self.frequency >> self.quantum_division_shift));
            while i >= 0 {
                let level = i as usize;
                self.tower_top_b[level] = params::gaussian_golomb_modulus(sigma, i as u32 + 1);
                self.tower_top_log2b[level] = msb(self.tower_top_b[level]) as u32;
                self.tower_lower_b[level] = params::gaussian_golomb_modulus(sigma, i as u32);
                self.tower_lower_log2b[level] = msb(self.tower_lower_b[level]) as u32;
                self.pointer_prediction[level] = ((self.quantum * (1u64 << i)
                    * self.descriptor.documents
                    + self.frequency / 2)
                    / self.frequency) as i64;
                i -= 1;
            }
        }

        self.count = -1;
        self.current_document = 0;
        self.number_of_document_record = -1;
        self.current_position = 0;
        self.positions_bits_offset = 0;
        // Avoids spurious tower updates on the first tower.
        self.positions_bit_skip[0] = 0;
        self.positions_to_read_to_reach_current_position = 0;
        self.last_positions_increment = 0;
        self.positions_unread = false;
        self.state = State::BeforePointer;
        Ok(())
    }

    fn read_pointer_code(&mut self) -> Result<u64> {
        match self.descriptor.pointer_coding {
            Coding::Unary => self.ibs.read_unary().map_err(Error::bits),
            Coding::Gamma => self.ibs.read_gamma().map_err(Error::bits),
            Coding::ShiftedGamma => self.ibs.read_shifted_gamma().map_err(Error::bits),
            Coding::Delta => self.ibs.read_delta().map_err(Error::bits),
            Coding::Golomb => self
                .ibs
                .read_golomb(self.golomb_b, self.golomb_log2b)
                .map_err(Error::bits),
            coding => Err(Error::UnsupportedCoding {
                coding,
                component: "pointer",
            }),
        }
    }

    fn read_count_code(&mut self) -> Result<u64> {
        let code = match self.descriptor.count_coding.unwrap() {
            Coding::Unary => self.ibs.read_unary().map_err(Error::bits)?,
            Coding::Gamma => self.ibs.read_gamma().map_err(Error::bits)?,
            Coding::ShiftedGamma => self.ibs.read_shifted_gamma().map_err(Error::bits)?,
            Coding::Delta => self.ibs.read_delta().map_err(Error::bits)?,
            coding => {
                return Err(Error::UnsupportedCoding {
                    coding,
                    component: "count",
                })
            }
        };
        Ok(code + 1)
    }

    /// Returns the next document containing the current term, or
    /// [`END_OF_LIST`].
    pub fn next_document(&mut self) -> Result<u64> {
        self.ensure_open()?;
        if self.state != State::BeforePointer {
            if self.state == State::BeforeTower {
                self.read_tower()?;
            }
            if self.state == State::BeforeCount {
                self.count = self.read_count_code()? as i64;
                self.state = State::BeforePointer;
            }
        }

        if self.number_of_document_record >= 0 && self.current_document == END_OF_LIST {
            return Ok(END_OF_LIST);
        }
        self.number_of_document_record += 1;
        if self.number_of_document_record as u64 == self.frequency {
            self.current_document = END_OF_LIST;
            return Ok(END_OF_LIST);
        }

        if self.has_pointers {
            let gap = self.read_pointer_code()?;
            self.current_document = if self.number_of_document_record == 0 {
                gap
            } else {
                self.current_document
                    .checked_add(gap + 1)
                    .ok_or(Error::CorruptStream("document pointer overflow"))?
            };
        } else {
            self.current_document = if self.number_of_document_record == 0 {
                0
            } else {
                self.current_document + 1
            };
        }
        if self.current_document >= self.descriptor.documents {
            return Err(Error::CorruptStream("document pointer out of range"));
        }

        if self.descriptor.has_skips()
            && (self.number_of_document_record as u64 & self.quantum_modulo_mask) == 0
        {
            self.state = State::BeforeTower;
            self.positions_to_read_to_reach_current_position = 0;
        } else {
            self.state = State::BeforeCount;
            // The count of the document we are leaving has necessarily been
            // decoded; its positions now separate us from the current one.
            if self.number_of_document_record > 0 {
                debug_assert!(self.count > 0);
                self.positions_to_read_to_reach_current_position += self.count;
            }
        }
        self.count = -1;
        self.positions_unread = true;
        Ok(self.current_document)
    }

    /// The count of the current document; decodes and caches it on first
    /// call.
    pub fn count(&mut self) -> Result<u64> {
        self.ensure_open()?;
        if self.count != -1 {
            return Ok(self.count as u64);
        }
        debug_assert!(self.has_current_document());
        if self.state == State::BeforeTower {
            self.read_tower()?;
        }
        debug_assert_eq!(self.state, State::BeforeCount);
        self.state = State::BeforePointer;
        self.count = self.read_count_code()? as i64;
        Ok(self.count as u64)
    }

    /// Returns the next position of the current term within the current
    /// document, or [`END_OF_POSITIONS`].
    pub fn next_position(&mut self) -> Result<u32> {
        self.ensure_open()?;
        debug_assert!(self.has_current_document());
        if self.positions_unread {
            self.update_position_cache()?;
        }
        if self.current_position == self.count as usize {
            return Ok(END_OF_POSITIONS);
        }
        let position = self.position_cache[self.current_position];
        self.current_position += 1;
        Ok(position)
    }

    /// Settles the positions stream on the current document and decodes its
    /// position block.
    fn update_position_cache(&mut self) -> Result<()> {
        self.positions_unread = false;
        self.current_position = 0;
        // Forces reading the tower, and thereby updating
        // `positions_bits_offset`, if necessary.
        let count = self.count()? as i64;

        let read = self.positions_read_bits()?;
        if self.positions_bits_offset > read {
            let skip = (self.positions_bits_offset - read) as u64;
            let pos = self.positions.bit_pos().map_err(Error::bits)?;
            self.positions.set_bit_pos(pos + skip).map_err(Error::bits)?;
        }

        if self.positions_to_read_to_reach_current_position < 0 {
            return Err(Error::CorruptStream("negative positions skip"));
        }
        if self.positions_to_read_to_reach_current_position > 0 {
            let to_skip = self.positions_to_read_to_reach_current_position as u64;
            match self.descriptor.position_coding.unwrap() {
                Coding::ShiftedGamma => self
                    .positions
                    .skip_shifted_gammas(to_skip)
                    .map_err(Error::bits)?,
                Coding::Gamma => self.positions.skip_gammas(to_skip).map_err(Error::bits)?,
                Coding::Delta => self.positions.skip_deltas(to_skip).map_err(Error::bits)?,
                coding => {
                    return Err(Error::UnsupportedCoding {
                        coding,
                        component: "position",
                    })
                }
            }
        }
        // Fixed up so that the next document within this quantum restores it
        // to zero.
        self.positions_to_read_to_reach_current_position = -count;

        let count = count as usize;
        if count > self.position_cache.len() {
            let new_len = (self.position_cache.len() * 2).max(count);
            self.position_cache.resize(new_len, 0);
        }
        match self.descriptor.position_coding.unwrap() {
            Coding::ShiftedGamma => self
                .positions
                .read_shifted_gammas(&mut self.position_cache[..count])
                .map_err(Error::bits)?,
            Coding::Gamma => self
                .positions
                .read_gammas(&mut self.position_cache[..count])
                .map_err(Error::bits)?,
            Coding::Delta => self
                .positions
                .read_deltas(&mut self.position_cache[..count])
                .map_err(Error::bits)?,
            coding => {
                return Err(Error::UnsupportedCoding {
                    coding,
                    component: "position",
                })
            }
        }
        for i in 1..count {
            self.position_cache[i] += self.position_cache[i - 1] + 1;
        }
        Ok(())
    }

    /// Reads the entire skip tower for the current position, assuming the
    /// tower was reached sequentially: the positions offset advances by the
    /// positions bits of the quantum just left.
    fn read_tower(&mut self) -> Result<()> {
        self.last_positions_increment = if self.maxh >= 0 {
            self.positions_bit_skip[0]
        } else {
            0
        };
        self.read_tower_up_to(-1)?;
        self.positions_bits_offset += self.last_positions_increment;
        Ok(())
    }

    /// Reads the skip tower for the current position, stopping as soon as a
    /// decoded entry does not overshoot `pointer` (use -1 to read the whole
    /// tower).
    ///
    /// On a partial read the state remains [`State::BeforeTower`] and the
    /// entries read so far are patched to count from the current stream
    /// position; on a full read the state advances to the count.
    fn read_tower_up_to(&mut self, pointer: i64) -> Result<()> {
        debug_assert!(self.number_of_document_record as u64 % self.quantum == 0);
        debug_assert_eq!(self.state, State::BeforeTower);

        let mut tower_length: i64 = 0;
        let mut truncated = false;

        let cache_offset = self.number_of_document_record as u64 & self.w_modulo_mask;
        let k = cache_offset >> self.quantum_division_shift;

        self.s = if k == 0 {
            self.height as i32
        } else {
            k.trailing_zeros() as i32
        };

        let mut cache =
            self.frequency - self.w * (self.number_of_document_record as u64 >> self.w_division_shift);
        if cache < self.w {
            self.maxh = msb((cache >> self.quantum_division_shift) - k);
            if self.maxh < self.s {
                self.s = self.maxh;
                truncated = true;
            } else {
                truncated = false;
            }
        } else {
            cache = self.w;
            self.maxh = self.height as i32;
            truncated = k == 0;
        }

        let mut i = self.s;
        let mut bits_at_tower_start: u64 = 0;

        if self.s >= 0 {
            if k == 0 {
                if self.quantum_bit_length < 0 {
                    self.quantum_bit_length = self.ibs.read_delta().map_err(Error::bits)? as i64;
                    self.positions_quantum_bit_length =
                        self.ibs.read_delta().map_err(Error::bits)? as i64;
                    self.entry_bit_length = self.ibs.read_delta().map_err(Error::bits)? as i64;
                } else {
                    self.quantum_bit_length +=
                        nat2int(self.ibs.read_delta().map_err(Error::bits)?);
                    self.positions_quantum_bit_length +=
                        nat2int(self.ibs.read_delta().map_err(Error::bits)?);
                    self.entry_bit_length += nat2int(self.ibs.read_delta().map_err(Error::bits)?);
                }
                if self.quantum_bit_length < 0
                    || self.positions_quantum_bit_length < 0
                    || self.entry_bit_length < 0
                {
                    return Err(Error::CorruptStream("negative block length"));
                }
            }

            if self.s > 0 {
                tower_length = self.entry_bit_length * (self.s as i64 + 1)
                    + nat2int(self.ibs.read_delta().map_err(Error::bits)?);
                if tower_length < 0 {
                    return Err(Error::CorruptStream("tower length out of band"));
                }
            }

            bits_at_tower_start = self.bit_pos()?;

            let top = self.s as usize;
            if truncated {
                // The tower top is stored explicitly.
                self.pointer_skip[top] = nat2int(
                    self.ibs
                        .read_golomb(self.tower_top_b[top], self.tower_top_log2b[top])
                        .map_err(Error::bits)?,
                ) + self.pointer_prediction[top];
                self.bit_skip[top] = self.quantum_bit_length * (1i64 << self.s)
                    + self.entry_bit_length * ((1i64 << (self.s + 1)) - self.s as i64 - 2)
                    + nat2int(self.ibs.read_delta().map_err(Error::bits)?);
                self.positions_bit_skip[top] = self.positions_quantum_bit_length
                    * (1i64 << self.s)
                    + nat2int(self.ibs.read_delta().map_err(Error::bits)?);
            } else {
                // The tower top is inherited from the lowest inherited entry
                // suitably updated; the positions skip additionally discounts
                // the span already covered at this level by an earlier tower.
                self.pointer_skip[top] = self.pointer_skip[top + 1]
                    - (self.current_document as i64 - self.pointer_at_last_skip_tower as i64);
                self.bit_skip[top] = self.bit_skip[top + 1]
                    - (bits_at_tower_start as i64 - self.read_bits_at_last_skip_tower as i64)
                    - tower_length;
                self.positions_bit_skip[top] =
                    self.positions_bit_skip[top + 1] - self.positions_bit_skip[top];
                if self.positions_bit_skip[top] <= 0 {
                    return Err(Error::CorruptStream("negative positions skip"));
                }
            }

            if self.current_document as i64 + self.pointer_skip[i as usize] > pointer {
                i = self.s - 1;
                while i >= 0 {
                    let level = i as usize;
                    self.pointer_skip[level] = nat2int(
                        self.ibs
                            .read_golomb(self.tower_lower_b[level], self.tower_lower_log2b[level])
                            .map_err(Error::bits)?,
                    ) + self.pointer_skip[level + 1] / 2;
                    self.bit_skip[level] = (self.bit_skip[level + 1]
                        - self.entry_bit_length * (i as i64 + 1))
                        / 2
                        - nat2int(self.ibs.read_delta().map_err(Error::bits)?);
                    self.positions_bit_skip[level] = self.positions_bit_skip[level + 1] / 2
                        - nat2int(self.ibs.read_delta().map_err(Error::bits)?);
                    if self.current_document as i64 + self.pointer_skip[level] <= pointer {
                        break;
                    }
                    i -= 1;
                }
            }
        }

        if i > 0 {
            // Partially decoded tower: fix the document-stream skips read so
            // far, which are offsets from the *end* of the tower.
            let fix = (self.bit_pos()? - bits_at_tower_start) as i64;
            let mut j = self.s;
            while j >= i {
                self.bit_skip[j as usize] += tower_length - fix;
                j -= 1;
            }
        } else {
            self.state = State::BeforeCount;
        }

        // Entries of towers before this one that populate the levels above
        // `s` are re-expressed from the new anchor.
        let delta_bits = self.bit_pos()? as i64 - self.read_bits_at_last_skip_tower as i64;
        let delta_pointers =
            self.current_document as i64 - self.pointer_at_last_skip_tower as i64;
        debug_assert!(self.last_positions_increment >= 0);
        let mut j = msb(k ^ (cache >> self.quantum_division_shift));
        while j >= self.s + 1 {
            self.bit_skip[j as usize] -= delta_bits;
            self.positions_bit_skip[j as usize] -= self.last_positions_increment;
            self.pointer_skip[j as usize] -= delta_pointers;
            j -= 1;
        }

        self.read_bits_at_last_skip_tower = self.bit_pos()?;
        self.pointer_at_last_skip_tower = self.current_document;
        self.lowest = if i < 0 { 0 } else { i };
        Ok(())
    }

    /// Advances to the first document whose pointer is at least `target`,
    /// leaping whole quanta through the skip towers where possible.
    ///
    /// A cursor already at or past `target` does not move.
    pub fn skip_to(&mut self, target: u64) -> Result<u64> {
        self.ensure_open()?;
        if self.number_of_document_record == -1 {
            self.next_document()?;
        }
        if self.current_document >= target {
            return Ok(self.current_document);
        }
        let pointer = if target == END_OF_LIST {
            i64::MAX
        } else {
            target as i64
        };

        if self.descriptor.has_skips() {
            if self.state == State::BeforeTower {
                self.last_positions_increment = if self.maxh >= 0 {
                    self.positions_bit_skip[0]
                } else {
                    0
                };
                self.read_tower_up_to(pointer)?;
                self.positions_bits_offset += self.last_positions_increment;
            }

            loop {
                if self.maxh < 0
                    || self.lowest == 0
                        && (self.pointer_at_last_skip_tower as i64 + self.pointer_skip[0])
                            > pointer
                {
                    break;
                }

                let cache_offset = self.number_of_document_record as u64 & self.w_modulo_mask;
                let k = cache_offset >> self.quantum_division_shift;
                let top = msb(k
                    ^ (self
                        .w
                        .min(self.frequency - self.number_of_document_record as u64 + cache_offset)
                        >> self.quantum_division_shift));

                let mut i = self.lowest;
                while i <= top {
                    if self.pointer_at_last_skip_tower as i64 + self.pointer_skip[i as usize]
                        > pointer
                    {
                        break;
                    }
                    i += 1;
                }
                i -= 1;
                if i < 0 {
                    break;
                }
                let level = i as usize;

                let consumed = self.bit_pos()? - self.read_bits_at_last_skip_tower;
                self.skip_ahead(self.bit_skip[level] - consumed as i64)?;
                // Accumulate the positions-stream bits needed to reach the
                // position block of the destination quantum.
                self.last_positions_increment = self.positions_bit_skip[level];
                self.positions_bits_offset += self.last_positions_increment;
                self.state = State::BeforeTower;
                self.current_document =
                    (self.pointer_at_last_skip_tower as i64 + self.pointer_skip[level]) as u64;
                self.number_of_document_record += (((k & (1u64 << i).wrapping_neg())
                    + (1u64 << i))
                    * self.quantum
                    - cache_offset) as i64;
                if self.number_of_document_record as u64 == self.frequency {
                    // We leapt right past the end of the list; the stream is
                    // before the next header, and nothing must be read.
                    self.current_document = END_OF_LIST;
                    self.positions_unread = false;
                    self.state = State::BeforePointer;
                } else {
                    self.positions_unread = true;
                    // On the destination quantum the tower is read in full.
                    self.read_tower_up_to(pointer)?;
                }
                self.count = -1;
                self.positions_to_read_to_reach_current_position = 0;
                if self.number_of_document_record as u64 >= self.frequency - 1 {
                    break;
                }
            }
        }

        while self.current_document < target {
            self.next_document()?;
        }
        Ok(self.current_document)
    }
}
