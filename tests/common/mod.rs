//! Test support: an in-memory writer producing index bitstreams, including
//! skip towers, plus helpers to read whole lists back.
//!
//! The writer is deliberately structured in two passes per list. Tower
//! entries are residuals against values that depend on the encoded size of
//! everything *downstream* of the anchor, so towers are computed from the
//! last anchor backwards (a tower never depends on towers before it); the
//! encoded blobs are then spliced into the stream left to right.

#![allow(dead_code)]

use dsi_bitstream::codes::{DeltaWrite, GammaWrite};
use dsi_bitstream::impls::{BufBitReader, BufBitWriter, MemWordReader, MemWordWriterVec};
use dsi_bitstream::prelude::{len_delta, len_gamma};
use dsi_bitstream::traits::{BitRead, BitSeek, BitWrite, Endianness};
use invix::codes::{
    len_golomb, len_interpolative, len_minimal_binary, len_shifted_gamma, len_skewed_golomb,
    len_unary, CodeRead, CodeWrite, Coding,
};
use invix::index::hp::HPIndexIterator;
use invix::index::params::{self, golomb_modulus};
use invix::index::reader::IndexIterator;
use invix::index::{IndexDescriptor, PayloadValue, END_OF_LIST, END_OF_POSITIONS};
use invix::utils::{ceil_log2, int2nat, msb};

/// Logger setup shared by the integration tests.
pub fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// One document record of a list, in decoded form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub document: u64,
    pub count: u64,
    pub positions: Vec<u32>,
    pub payload: Option<PayloadValue>,
}

impl Posting {
    pub fn plain(document: u64) -> Self {
        Posting {
            document,
            count: 1,
            positions: vec![],
            payload: None,
        }
    }
}

/// A bitstream kept as `u64` words but readable as `u32` words, the layout
/// bit readers expect.
pub struct WordBuf(pub Vec<u64>);

impl WordBuf {
    pub fn as_u32(&self) -> &[u32] {
        unsafe { self.0.align_to().1 }
    }

    /// Dumps the raw words to a file, so that memory- and mmap-based
    /// factories can load them back unchanged.
    pub fn write_to_file(&self, path: impl AsRef<std::path::Path>) -> std::io::Result<()> {
        let bytes: &[u8] = unsafe { self.0.align_to().1 };
        std::fs::write(path, bytes)
    }
}

impl AsRef<[u32]> for WordBuf {
    fn as_ref(&self) -> &[u32] {
        self.as_u32()
    }
}

/// The output of the writer: the document stream, the positions stream for
/// the high-performance layout, and the list offsets.
pub struct BuiltIndex {
    pub index: WordBuf,
    pub positions: Option<WordBuf>,
    /// `terms + 1` bit offsets into the document stream.
    pub offsets: Vec<u64>,
}

fn words_as_u32(words: &[u64]) -> &[u32] {
    unsafe { words.align_to().1 }
}

/// A bit writer over a borrowed word buffer that keeps track of how many
/// bits it has emitted.
struct Bits<'v, E: Endianness>
where
    BufBitWriter<E, MemWordWriterVec<u64, &'v mut Vec<u64>>>: CodeWrite<E>,
{
    writer: BufBitWriter<E, MemWordWriterVec<u64, &'v mut Vec<u64>>>,
    written: u64,
}

impl<'v, E: Endianness> Bits<'v, E>
where
    BufBitWriter<E, MemWordWriterVec<u64, &'v mut Vec<u64>>>: CodeWrite<E>,
{
    fn new(buffer: &'v mut Vec<u64>) -> Self {
        Bits {
            writer: BufBitWriter::<E, _>::new(MemWordWriterVec::new(buffer)),
            written: 0,
        }
    }

    fn unary(&mut self, x: u64) {
        self.written += self.writer.write_unary(x).unwrap() as u64;
    }

    fn gamma(&mut self, x: u64) {
        self.written += self.writer.write_gamma(x).unwrap() as u64;
    }

    fn delta(&mut self, x: u64) {
        self.written += self.writer.write_delta(x).unwrap() as u64;
    }

    fn shifted_gamma(&mut self, x: u64) {
        self.written += self.writer.write_shifted_gamma(x).unwrap() as u64;
    }

    fn golomb(&mut self, x: u64, b: u64) {
        self.written += self.writer.write_golomb(x, b).unwrap() as u64;
    }

    fn skewed_golomb(&mut self, x: u64, b: u64) {
        self.written += self.writer.write_skewed_golomb(x, b).unwrap() as u64;
    }

    fn minimal_binary(&mut self, x: u64, b: u64) {
        self.written += self.writer.write_minimal_binary(x, b).unwrap() as u64;
    }

    fn bits(&mut self, x: u64, n: usize) {
        if n > 0 {
            self.written += self.writer.write_bits(x, n).unwrap() as u64;
        }
    }

    fn interpolative(&mut self, data: &[u32], lo: u64, hi: u64) {
        self.written += self.writer.write_interpolative(data, lo, hi).unwrap() as u64;
    }

    fn payload(&mut self, kind: invix::index::PayloadKind, value: &PayloadValue) {
        self.written += kind.write(&mut self.writer, value).unwrap() as u64;
    }

    fn coded(&mut self, coding: Coding, x: u64) {
        match coding {
            Coding::Unary => self.unary(x),
            Coding::Gamma => self.gamma(x),
            Coding::ShiftedGamma => self.shifted_gamma(x),
            Coding::Delta => self.delta(x),
            _ => panic!("{:?} needs parameters", coding),
        }
    }

    /// Copies `bits` bits out of `words` verbatim.
    fn splice(&mut self, words: &[u64], bits: u64)
    where
        for<'a> BufBitReader<E, MemWordReader<u32, &'a [u32]>>: CodeRead<E>,
    {
        let mut reader = BufBitReader::<E, _>::new(MemWordReader::new(words_as_u32(words)));
        let mut left = bits;
        while left > 0 {
            let chunk = left.min(32) as usize;
            let value = reader.read_bits(chunk).unwrap();
            self.bits(value, chunk);
            left -= chunk as u64;
        }
    }

    /// Flushes and returns the number of bits written; the borrowed buffer
    /// then holds them, zero-padded to a word boundary.
    fn finish(mut self) -> u64 {
        self.writer.flush().unwrap();
        self.written
    }
}

fn len_coded(coding: Coding, x: u64) -> u64 {
    (match coding {
        Coding::Unary => len_unary(x),
        Coding::Gamma => len_gamma(x),
        Coding::ShiftedGamma => len_shifted_gamma(x),
        Coding::Delta => len_delta(x),
        _ => panic!("{:?} needs parameters", coding),
    }) as u64
}

/// The skewed-Golomb modulus our writer picks for a position block.
fn skewed_modulus(count: u64, doc_size: u64) -> u64 {
    (doc_size / (2 * count)).max(1)
}

fn position_gaps(positions: &[u32]) -> Vec<u64> {
    let mut gaps = Vec::with_capacity(positions.len());
    let mut prev: i64 = -1;
    for &position in positions {
        gaps.push((position as i64 - prev - 1) as u64);
        prev = position as i64;
    }
    gaps
}

fn position_block_len(coding: Coding, positions: &[u32], doc_size: Option<u64>) -> u64 {
    let count = positions.len() as u64;
    match coding {
        Coding::Gamma | Coding::ShiftedGamma | Coding::Delta => position_gaps(positions)
            .iter()
            .map(|&gap| len_coded(coding, gap))
            .sum(),
        Coding::Golomb => {
            let doc_size = doc_size.unwrap();
            if count < 3 {
                positions
                    .iter()
                    .map(|&position| len_minimal_binary(position as u64, doc_size) as u64)
                    .sum()
            } else {
                let b = golomb_modulus(count, doc_size);
                if b == 0 {
                    0
                } else {
                    position_gaps(positions)
                        .iter()
                        .map(|&gap| len_golomb(gap, b) as u64)
                        .sum()
                }
            }
        }
        Coding::SkewedGolomb => {
            let doc_size = doc_size.unwrap();
            if count < 3 {
                positions
                    .iter()
                    .map(|&position| len_minimal_binary(position as u64, doc_size) as u64)
                    .sum()
            } else {
                let b = skewed_modulus(count, doc_size);
                len_minimal_binary(b - 1, doc_size) as u64
                    + position_gaps(positions)
                        .iter()
                        .map(|&gap| len_skewed_golomb(gap, b) as u64)
                        .sum::<u64>()
            }
        }
        Coding::Interpolative => {
            let doc_size = doc_size.unwrap();
            len_interpolative(positions, 0, doc_size - 1) as u64
        }
        coding => panic!("{:?} cannot code positions", coding),
    }
}

fn write_position_block<'v, E: Endianness>(
    b: &mut Bits<'v, E>,
    coding: Coding,
    positions: &[u32],
    doc_size: Option<u64>,
) where
    BufBitWriter<E, MemWordWriterVec<u64, &'v mut Vec<u64>>>: CodeWrite<E>,
{
    let count = positions.len() as u64;
    match coding {
        Coding::Gamma | Coding::ShiftedGamma | Coding::Delta => {
            for gap in position_gaps(positions) {
                b.coded(coding, gap);
            }
        }
        Coding::Golomb => {
            let doc_size = doc_size.unwrap();
            if count < 3 {
                for &position in positions {
                    b.minimal_binary(position as u64, doc_size);
                }
            } else {
                let modulus = golomb_modulus(count, doc_size);
                if modulus == 0 {
                    // The degenerate code stores nothing: the positions are
                    // forced to 0, 1, …, count - 1.
                    for (i, &position) in positions.iter().enumerate() {
                        assert_eq!(position as usize, i);
                    }
                } else {
                    for gap in position_gaps(positions) {
                        b.golomb(gap, modulus);
                    }
                }
            }
        }
        Coding::SkewedGolomb => {
            let doc_size = doc_size.unwrap();
            if count < 3 {
                for &position in positions {
                    b.minimal_binary(position as u64, doc_size);
                }
            } else {
                let modulus = skewed_modulus(count, doc_size);
                b.minimal_binary(modulus - 1, doc_size);
                for gap in position_gaps(positions) {
                    b.skewed_golomb(gap, modulus);
                }
            }
        }
        Coding::Interpolative => {
            let doc_size = doc_size.unwrap();
            b.interpolative(positions, 0, doc_size - 1);
        }
        coding => panic!("{:?} cannot code positions", coding),
    }
}

/// Everything needed to lay out the towers of one list.
struct TowerLayout {
    frequency: u64,
    documents: u64,
    quantum: u64,
    shift: u32,
    w: u64,
    w_shift: u32,
    height: u32,
    hp: bool,
    quantum_bit_length: i64,
    positions_quantum_bit_length: i64,
    entry_bit_length: i64,
    first_block_anchor: Option<usize>,
    tower_top_b: Vec<u64>,
    tower_lower_b: Vec<u64>,
    pointer_prediction: Vec<i64>,
    /// Document-stream data bits of each quantum (gaps, payloads, counts,
    /// and, in the single-stream layout, position blocks) excluding towers.
    quantum_data: Vec<u64>,
    /// Positions-stream bits of each quantum (high-performance layout).
    quantum_pos: Vec<u64>,
    /// Gap-code bits of each anchor record.
    anchor_gap: Vec<u64>,
    /// Document pointer of each anchor record.
    anchor_doc: Vec<u64>,
    /// Encoded size in bits of each tower; filled right to left.
    tower_size: Vec<u64>,
    anchors: usize,
}

impl TowerLayout {
    /// `(k, s, maxh, truncated)` of the tower at anchor `j`, mirroring the
    /// reader's derivation.
    fn shape(&self, j: usize) -> (u64, i32, i32, bool) {
        let record = j as u64 * self.quantum;
        let cache_offset = record & (self.w - 1);
        let k = cache_offset >> self.shift;
        let mut s = if k == 0 {
            self.height as i32
        } else {
            k.trailing_zeros() as i32
        };
        let cache = self.frequency - self.w * (record >> self.w_shift);
        let maxh;
        let truncated;
        if cache < self.w {
            maxh = msb((cache >> self.shift) - k);
            if maxh < s {
                s = maxh;
                truncated = true;
            } else {
                truncated = false;
            }
        } else {
            maxh = self.height as i32;
            truncated = k == 0;
        }
        (k, s, maxh, truncated)
    }

    /// The document-pointer span of level `i` of the tower at anchor `j`;
    /// a level reaching exactly the end of the list targets the virtual
    /// document `documents`.
    fn pointer_skip(&self, j: usize, i: u32) -> i64 {
        let m = j + (1 << i);
        let target = if m == self.anchors {
            self.documents
        } else {
            self.anchor_doc[m]
        };
        target as i64 - self.anchor_doc[j] as i64
    }

    /// Document-stream bits from the end of the tower at anchor `j` to the
    /// start of the tower at anchor `j + 2^i` (or to the end of the list).
    fn bit_skip(&self, j: usize, i: u32) -> i64 {
        let m = j + (1 << i);
        let mut total: i64 = -(self.anchor_gap[j] as i64);
        for x in j..m {
            total += self.quantum_data[x] as i64;
        }
        for x in j + 1..m {
            total += self.tower_size[x] as i64;
        }
        if m < self.anchors {
            total += self.anchor_gap[m] as i64;
        }
        total
    }

    /// Positions-stream bits covered by level `i` of the tower at anchor
    /// `j`.
    fn positions_skip(&self, j: usize, i: u32) -> i64 {
        let m = j + (1 << i);
        self.quantum_pos[j..m].iter().map(|&bits| bits as i64).sum()
    }

    /// Encodes the tower at anchor `j`; returns its blob and bit length.
    fn encode_tower<E: Endianness>(&self, j: usize) -> (Vec<u64>, u64)
    where
        for<'v> BufBitWriter<E, MemWordWriterVec<u64, &'v mut Vec<u64>>>: CodeWrite<E>,
        for<'a> BufBitReader<E, MemWordReader<u32, &'a [u32]>>: CodeRead<E>,
    {
        let (k, s, _maxh, truncated) = self.shape(j);

        // Entries first: the length field stores their size.
        let mut entry_words = Vec::new();
        let mut entry_bits = 0;
        if s >= 0 {
            let mut entries = Bits::<E>::new(&mut entry_words);
            let top = s as usize;
            if truncated {
                let residual = self.pointer_skip(j, s as u32) - self.pointer_prediction[top];
                entries.golomb(int2nat(residual), self.tower_top_b[top]);
                let expected = self.quantum_bit_length * (1i64 << s)
                    + self.entry_bit_length * ((1i64 << (s + 1)) - s as i64 - 2);
                entries.delta(int2nat(self.bit_skip(j, s as u32) - expected));
                if self.hp {
                    let expected = self.positions_quantum_bit_length * (1i64 << s);
                    entries.delta(int2nat(self.positions_skip(j, s as u32) - expected));
                }
            }
            let mut i = s - 1;
            while i >= 0 {
                let level = i as usize;
                let pointer_up = self.pointer_skip(j, i as u32 + 1);
                entries.golomb(
                    int2nat(self.pointer_skip(j, i as u32) - pointer_up / 2),
                    self.tower_lower_b[level],
                );
                let bits_up = self.bit_skip(j, i as u32 + 1);
                entries.delta(int2nat(
                    (bits_up - self.entry_bit_length * (i as i64 + 1)) / 2
                        - self.bit_skip(j, i as u32),
                ));
                if self.hp {
                    entries.delta(int2nat(
                        self.positions_skip(j, i as u32 + 1) / 2
                            - self.positions_skip(j, i as u32),
                    ));
                }
                i -= 1;
            }
            entry_bits = entries.finish();
        }

        let mut tower_words = Vec::new();
        let mut tower = Bits::<E>::new(&mut tower_words);
        if s >= 0 {
            if k == 0 {
                if Some(j) == self.first_block_anchor {
                    tower.delta(self.quantum_bit_length as u64);
                    if self.hp {
                        tower.delta(self.positions_quantum_bit_length as u64);
                    }
                    tower.delta(self.entry_bit_length as u64);
                } else {
                    // Block lengths are constant within a list, so later
                    // super-blocks store zero deltas.
                    tower.delta(int2nat(0));
                    if self.hp {
                        tower.delta(int2nat(0));
                    }
                    tower.delta(int2nat(0));
                }
            }
            if s > 0 {
                tower.delta(int2nat(
                    entry_bits as i64 - self.entry_bit_length * (s as i64 + 1),
                ));
            }
            tower.splice(&entry_words, entry_bits);
        }
        let bits = tower.finish();
        (tower_words, bits)
    }
}

/// Writer options beyond what the descriptor carries.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// With variable quanta, store the sentinel instead of an explicit
    /// quantum shift (each list then spans a single, towerless quantum).
    pub sentinel_quanta: bool,
}

pub fn build_index<E: Endianness>(
    descriptor: &IndexDescriptor,
    lists: &[Vec<Posting>],
    sizes: Option<&[u32]>,
) -> BuiltIndex
where
    for<'v> BufBitWriter<E, MemWordWriterVec<u64, &'v mut Vec<u64>>>: CodeWrite<E>,
    for<'a> BufBitReader<E, MemWordReader<u32, &'a [u32]>>: CodeRead<E>,
{
    build(descriptor, lists, sizes, false, BuildOptions::default())
}

pub fn build_index_with<E: Endianness>(
    descriptor: &IndexDescriptor,
    lists: &[Vec<Posting>],
    sizes: Option<&[u32]>,
    options: BuildOptions,
) -> BuiltIndex
where
    for<'v> BufBitWriter<E, MemWordWriterVec<u64, &'v mut Vec<u64>>>: CodeWrite<E>,
    for<'a> BufBitReader<E, MemWordReader<u32, &'a [u32]>>: CodeRead<E>,
{
    build(descriptor, lists, sizes, false, options)
}

pub fn build_hp_index<E: Endianness>(descriptor: &IndexDescriptor, lists: &[Vec<Posting>]) -> BuiltIndex
where
    for<'v> BufBitWriter<E, MemWordWriterVec<u64, &'v mut Vec<u64>>>: CodeWrite<E>,
    for<'a> BufBitReader<E, MemWordReader<u32, &'a [u32]>>: CodeRead<E>,
{
    build(descriptor, lists, None, true, BuildOptions::default())
}

fn build<E: Endianness>(
    descriptor: &IndexDescriptor,
    lists: &[Vec<Posting>],
    sizes: Option<&[u32]>,
    hp: bool,
    options: BuildOptions,
) -> BuiltIndex
where
    for<'v> BufBitWriter<E, MemWordWriterVec<u64, &'v mut Vec<u64>>>: CodeWrite<E>,
    for<'a> BufBitReader<E, MemWordReader<u32, &'a [u32]>>: CodeRead<E>,
{
    assert_eq!(lists.len() as u64, descriptor.terms);
    let size_dependent = matches!(
        descriptor.position_coding,
        Some(Coding::Golomb | Coding::SkewedGolomb | Coding::Interpolative)
    );
    if size_dependent {
        assert!(sizes.is_some(), "this position coding needs document sizes");
    }

    let mut index_words: Vec<u64> = Vec::new();
    let mut positions_words: Vec<u64> = Vec::new();
    let mut doc_stream = Bits::<E>::new(&mut index_words);
    let mut pos_stream = Bits::<E>::new(&mut positions_words);
    let mut offsets = Vec::with_capacity(lists.len() + 1);

    for postings in lists {
        let frequency = postings.len() as u64;
        assert!(frequency >= 1 && frequency <= descriptor.documents);
        offsets.push(doc_stream.written);

        let has_pointers = frequency < descriptor.documents;
        let pointer_golomb = if descriptor.pointer_coding == Coding::Golomb && has_pointers {
            golomb_modulus(frequency, descriptor.documents)
        } else {
            0
        };
        let gap_len = |gap: u64| -> u64 {
            if !has_pointers {
                return 0;
            }
            if descriptor.pointer_coding == Coding::Golomb {
                len_golomb(gap, pointer_golomb) as u64
            } else {
                len_coded(descriptor.pointer_coding, gap)
            }
        };

        // Per-record sanity checks and encoded sizes.
        let mut previous: i64 = -1;
        let mut gap_codes = Vec::with_capacity(postings.len());
        let mut record_doc_bits = Vec::with_capacity(postings.len());
        let mut record_pos_bits = Vec::with_capacity(postings.len());
        for posting in postings {
            assert!((posting.document as i64) > previous);
            assert!(posting.document < descriptor.documents);
            let gap = (posting.document as i64 - previous - 1) as u64;
            previous = posting.document as i64;
            gap_codes.push(gap);

            let mut doc_bits = gap_len(gap);
            if let Some(kind) = descriptor.payload {
                let payload = posting.payload.as_ref().expect("missing payload");
                doc_bits += kind.len(payload) as u64;
            }
            if descriptor.has_counts() {
                assert!(posting.count >= 1);
                doc_bits += len_coded(descriptor.count_coding.unwrap(), posting.count - 1);
            }
            let mut pos_bits = 0;
            if let Some(coding) = descriptor.position_coding {
                assert_eq!(posting.count as usize, posting.positions.len());
                let doc_size = sizes.map(|sizes| {
                    let doc_size = sizes[posting.document as usize] as u64;
                    assert!(posting.positions.iter().all(|&p| (p as u64) < doc_size));
                    doc_size
                });
                let block = position_block_len(coding, &posting.positions, doc_size);
                if hp {
                    pos_bits = block;
                } else {
                    doc_bits += block;
                }
            }
            record_doc_bits.push(doc_bits);
            record_pos_bits.push(pos_bits);
        }

        // Variable-quanta shift selection; the sentinel remap must match the
        // reader's.
        let (shift_code, shift) = match descriptor.skips {
            Some(skips) if skips.quantum == 0 => {
                if frequency == 1 {
                    (None, ceil_log2(frequency) + 1)
                } else if options.sentinel_quanta {
                    (Some(0), ceil_log2(frequency) + 1)
                } else {
                    let shift = (msb(frequency) as u32) / 2;
                    (Some(shift + 1), shift)
                }
            }
            Some(skips) => (None, msb(skips.quantum) as u32),
            None => (None, 0),
        };

        // Tower layout and blobs, computed right to left.
        let layout = descriptor.skips.map(|skips| {
            let quantum = 1u64 << shift;
            let height = skips.height;
            let w = quantum << height;
            let anchors = frequency.div_ceil(quantum) as usize;

            let mut quantum_data = vec![0u64; anchors];
            let mut quantum_pos = vec![0u64; anchors];
            let mut anchor_gap = vec![0u64; anchors];
            let mut anchor_doc = vec![0u64; anchors];
            for (r, posting) in postings.iter().enumerate() {
                let j = r / quantum as usize;
                quantum_data[j] += record_doc_bits[r];
                quantum_pos[j] += record_pos_bits[r];
                if r as u64 % quantum == 0 {
                    anchor_gap[j] = gap_len(gap_codes[r]);
                    anchor_doc[j] = posting.document;
                }
            }

            let sigma = params::quantum_sigma(frequency, descriptor.documents, quantum);
            let levels = height as usize + 1;
            let mut tower_top_b = vec![0u64; levels];
            let mut tower_lower_b = vec![0u64; levels];
            let mut pointer_prediction = vec![0i64; levels];
            let top = (height as i32).min(msb(frequency >> shift));
            let mut i = 0;
            while i <= top {
                let level = i as usize;
                tower_top_b[level] = params::gaussian_golomb_modulus(sigma, i as u32 + 1);
                tower_lower_b[level] = params::gaussian_golomb_modulus(sigma, i as u32);
                pointer_prediction[level] = ((quantum * (1u64 << i) * descriptor.documents
                    + frequency / 2)
                    / frequency) as i64;
                i += 1;
            }

            let total_data: u64 = quantum_data.iter().sum();
            let total_pos: u64 = quantum_pos.iter().sum();
            let mut layout = TowerLayout {
                frequency,
                documents: descriptor.documents,
                quantum,
                shift,
                w,
                w_shift: msb(w) as u32,
                height,
                hp,
                quantum_bit_length: (total_data / anchors as u64) as i64,
                positions_quantum_bit_length: (total_pos / anchors as u64) as i64,
                entry_bit_length: 8,
                first_block_anchor: None,
                tower_top_b,
                tower_lower_b,
                pointer_prediction,
                quantum_data,
                quantum_pos,
                anchor_gap,
                anchor_doc,
                tower_size: vec![0u64; anchors],
                anchors,
            };
            // The first super-block opener with a tower stores the block
            // lengths absolutely; a list shorter than its quantum never
            // stores them.
            if layout.shape(0).2 >= 0 {
                layout.first_block_anchor = Some(0);
            }

            let mut blobs = vec![(Vec::new(), 0u64); anchors];
            for j in (0..anchors).rev() {
                let (words, bits) = layout.encode_tower::<E>(j);
                layout.tower_size[j] = bits;
                blobs[j] = (words, bits);
            }
            (layout, blobs)
        });

        // Emission.
        if hp {
            doc_stream.delta(pos_stream.written);
        }
        doc_stream.coded(descriptor.frequency_coding, frequency - 1);
        if let Some(code) = shift_code {
            doc_stream.gamma(code.into());
        }

        for (r, posting) in postings.iter().enumerate() {
            if has_pointers {
                if descriptor.pointer_coding == Coding::Golomb {
                    doc_stream.golomb(gap_codes[r], pointer_golomb);
                } else {
                    doc_stream.coded(descriptor.pointer_coding, gap_codes[r]);
                }
            }
            if let Some((layout, blobs)) = &layout {
                if r as u64 % layout.quantum == 0 {
                    let (words, bits) = &blobs[r / layout.quantum as usize];
                    let before = doc_stream.written;
                    doc_stream.splice(words, *bits);
                    assert_eq!(doc_stream.written - before, *bits);
                }
            }
            if let Some(kind) = descriptor.payload {
                doc_stream.payload(kind, posting.payload.as_ref().unwrap());
            }
            if descriptor.has_counts() {
                doc_stream.coded(descriptor.count_coding.unwrap(), posting.count - 1);
            }
            if let Some(coding) = descriptor.position_coding {
                let doc_size = sizes.map(|sizes| sizes[posting.document as usize] as u64);
                if hp {
                    write_position_block(&mut pos_stream, coding, &posting.positions, doc_size);
                } else {
                    write_position_block(&mut doc_stream, coding, &posting.positions, doc_size);
                }
            }
        }
    }

    offsets.push(doc_stream.written);
    doc_stream.finish();
    pos_stream.finish();

    // Tail padding so buffered readers can prefetch past the end.
    index_words.extend_from_slice(&[0, 0]);
    let positions = if hp {
        positions_words.extend_from_slice(&[0, 0]);
        Some(WordBuf(positions_words))
    } else {
        None
    };

    BuiltIndex {
        index: WordBuf(index_words),
        positions,
        offsets,
    }
}

/// Reads one whole list through the public cursor surface.
pub fn collect_list<E: Endianness, CR: CodeRead<E> + BitSeek>(
    iterator: &mut IndexIterator<E, CR>,
    descriptor: &IndexDescriptor,
) -> Vec<Posting>
where
    <CR as BitRead<E>>::Error: std::error::Error + Send + Sync + 'static,
    <CR as BitSeek>::Error: std::error::Error + Send + Sync + 'static,
{
    let mut postings = Vec::new();
    loop {
        let document = iterator.next_document().unwrap();
        if document == END_OF_LIST {
            break;
        }
        let mut posting = Posting::plain(document);
        if descriptor.has_counts() {
            posting.count = iterator.count().unwrap();
        }
        if descriptor.has_payloads() {
            posting.payload = Some(iterator.payload().unwrap());
        }
        if descriptor.has_positions() {
            loop {
                let position = iterator.next_position().unwrap();
                if position == END_OF_POSITIONS {
                    break;
                }
                posting.positions.push(position);
            }
        }
        postings.push(posting);
    }
    postings
}

/// Reads one whole list through the high-performance cursor surface.
pub fn collect_hp_list<E: Endianness, CR: CodeRead<E> + BitSeek>(
    iterator: &mut HPIndexIterator<E, CR>,
) -> Vec<Posting>
where
    <CR as BitRead<E>>::Error: std::error::Error + Send + Sync + 'static,
    <CR as BitSeek>::Error: std::error::Error + Send + Sync + 'static,
{
    let mut postings = Vec::new();
    loop {
        let document = iterator.next_document().unwrap();
        if document == END_OF_LIST {
            break;
        }
        let mut posting = Posting::plain(document);
        posting.count = iterator.count().unwrap();
        loop {
            let position = iterator.next_position().unwrap();
            if position == END_OF_POSITIONS {
                break;
            }
            posting.positions.push(position);
        }
        postings.push(posting);
    }
    postings
}
