/*
 * SPDX-FileCopyrightText: 2025 Inria
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

/*!

Factories for bit readers.

Every cursor owns its bit readers, so an index must be able to mint a fresh
reader over its data for each cursor it hands out. Implementations of
[`BitReaderFactory`] provide exactly that:

- [`MemoryFactory`] creates bit readers from a slice of memory, either
  [allocated](MemoryFactory::new_mem) or [mapped](MemoryFactory::new_mmap);
- [`FileFactory`] creates buffered bit readers over a [`std::fs::File`],
  useful for sequential term-by-term scans.

*/

use anyhow::{ensure, Context};
use bitflags::bitflags;
use common_traits::UnsignedInt;
use dsi_bitstream::impls::{BufBitReader, MemWordReader, WordAdapter};
use dsi_bitstream::traits::Endianness;
use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

/// Mints bit readers over an immutable chunk of data.
pub trait BitReaderFactory<E: Endianness> {
    type BitReader<'a>
    where
        Self: 'a;
    fn new_reader(&self) -> Self::BitReader<'_>;
}

bitflags! {
    /// Flags for [`MemoryFactory`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct MemoryFlags: u32 {
        /// Suggest to map a region using transparent huge pages.
        ///
        /// This flag is only a suggestion, and it is ignored if the kernel does not
        /// support transparent huge pages. It is mainly useful to support
        /// `madvise()`-based huge pages on Linux.
        const TRANSPARENT_HUGE_PAGES = 1 << 0;
        /// Suggest that the mapped region will be accessed sequentially.
        const SEQUENTIAL = 1 << 1;
        /// Suggest that the mapped region will be accessed randomly.
        const RANDOM_ACCESS = 1 << 2;
    }
}

/// Empty flags.
impl core::default::Default for MemoryFlags {
    fn default() -> Self {
        MemoryFlags::empty()
    }
}

impl From<MemoryFlags> for mmap_rs::MmapFlags {
    fn from(flags: MemoryFlags) -> Self {
        let mut mmap_flags = mmap_rs::MmapFlags::empty();
        if flags.contains(MemoryFlags::SEQUENTIAL) {
            mmap_flags |= mmap_rs::MmapFlags::SEQUENTIAL;
        }
        if flags.contains(MemoryFlags::RANDOM_ACCESS) {
            mmap_flags |= mmap_rs::MmapFlags::RANDOM_ACCESS;
        }
        if flags.contains(MemoryFlags::TRANSPARENT_HUGE_PAGES) {
            mmap_flags |= mmap_rs::MmapFlags::TRANSPARENT_HUGE_PAGES;
        }
        mmap_flags
    }
}

/// A factory serving bit readers over in-memory words.
#[derive(Debug, Clone)]
pub struct MemoryFactory<E: Endianness, M: AsRef<[u32]>> {
    data: M,
    _marker: core::marker::PhantomData<E>,
}

impl<E: Endianness, T: AsRef<[u32]>> MemoryFactory<E, T> {
    pub fn from_data(data: T) -> Self {
        Self {
            data,
            _marker: core::marker::PhantomData,
        }
    }
}

impl<E: Endianness> MemoryFactory<E, Box<[u32]>> {
    /// Reads a whole bitstream file into freshly allocated, 16-byte-aligned
    /// memory, zero-extending to the alignment boundary.
    pub fn new_mem(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file_len = path
            .metadata()
            .with_context(|| format!("Could not stat {}", path.display()))?
            .len() as usize;
        let mut file = std::fs::File::open(path)
            .with_context(|| format!("Could not open {}", path.display()))?;
        let capacity = file_len.align_to(16);

        // The tail words beyond the file length stay zero, guaranteeing
        // zero-extension semantics for the bit reader.
        let mut data = vec![0u32; capacity / core::mem::size_of::<u32>()];
        {
            // SAFETY: plain old data, and `u32` is stricter aligned than
            // `u8`, so the whole buffer is viewable as bytes.
            let bytes: &mut [u8] = unsafe { data.align_to_mut().1 };
            file.read_exact(&mut bytes[..file_len])
                .with_context(|| format!("Could not read {}", path.display()))?;
        }
        Ok(Self {
            data: data.into_boxed_slice(),
            _marker: core::marker::PhantomData,
        })
    }
}

impl<E: Endianness> MemoryFactory<E, MmapBackend> {
    /// Reads a whole bitstream file into an anonymous memory mapping,
    /// zero-extending to the alignment boundary.
    pub fn new_mmap(path: impl AsRef<Path>, flags: MemoryFlags) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file_len = path
            .metadata()
            .with_context(|| format!("Could not stat {}", path.display()))?
            .len() as usize;
        let mut file = std::fs::File::open(path)
            .with_context(|| format!("Could not open {}", path.display()))?;
        let capacity = file_len.align_to(16);

        let mut mmap = mmap_rs::MmapOptions::new(capacity)?
            .with_flags(flags.into())
            .map_mut()
            .context("Could not create anonymous mmap")?;
        file.read_exact(&mut mmap[..file_len])
            .with_context(|| format!("Could not read {}", path.display()))?;
        mmap[file_len..].fill(0);

        Ok(Self {
            data: MmapBackend::new(
                mmap.make_read_only()
                    .map_err(|(_, err)| err)
                    .context("Could not make memory read-only")?,
            )?,
            _marker: core::marker::PhantomData,
        })
    }
}

impl<E: Endianness, M: AsRef<[u32]>> BitReaderFactory<E> for MemoryFactory<E, M> {
    type BitReader<'a>
        = BufBitReader<E, MemWordReader<u32, &'a [u32]>>
    where
        Self: 'a;

    fn new_reader(&self) -> Self::BitReader<'_> {
        BufBitReader::<E, _>::new(MemWordReader::new(self.data.as_ref()))
    }
}

/// A read-only memory mapping viewed as a `u32` slice.
#[derive(Debug)]
pub struct MmapBackend {
    mmap: mmap_rs::Mmap,
}

impl MmapBackend {
    fn new(mmap: mmap_rs::Mmap) -> anyhow::Result<Self> {
        ensure!(
            mmap.len() % core::mem::size_of::<u32>() == 0,
            "mmap length is not a multiple of the word size"
        );
        Ok(Self { mmap })
    }
}

impl AsRef<[u32]> for MmapBackend {
    fn as_ref(&self) -> &[u32] {
        // SAFETY: mappings are page aligned and the length was checked at
        // construction time.
        unsafe {
            core::slice::from_raw_parts(
                self.mmap.as_ptr() as *const u32,
                self.mmap.len() / core::mem::size_of::<u32>(),
            )
        }
    }
}

/// A factory serving buffered bit readers over a file.
#[derive(Debug, Clone)]
pub struct FileFactory<E: Endianness> {
    path: Box<Path>,
    _marker: core::marker::PhantomData<E>,
}

impl<E: Endianness> FileFactory<E> {
    pub fn new(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path: Box<Path> = path.as_ref().into();
        let metadata = std::fs::metadata(&path)
            .with_context(|| format!("Could not stat {}", path.display()))?;
        ensure!(metadata.is_file(), "File {} is not a file", path.display());

        Ok(Self {
            path,
            _marker: core::marker::PhantomData,
        })
    }
}

impl<E: Endianness> BitReaderFactory<E> for FileFactory<E> {
    type BitReader<'a>
        = BufBitReader<E, WordAdapter<u32, BufReader<File>>>
    where
        Self: 'a;

    fn new_reader(&self) -> Self::BitReader<'_> {
        BufBitReader::<E, _>::new(WordAdapter::<u32, _>::new(BufReader::new(
            File::open(&self.path).unwrap(),
        )))
    }
}
