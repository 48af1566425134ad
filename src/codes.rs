/*
 * SPDX-FileCopyrightText: 2025 Inria
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Reading and writing primitives for the universal codes used by inverted
//! lists.
//!
//! γ, δ, and unary codes come straight from [`dsi_bitstream`]; this module
//! adds the codes that crate does not provide (shifted γ, minimal binary,
//! Golomb with a precomputed most significant bit, skewed Golomb, and binary
//! interpolative coding) as extension traits with blanket implementations,
//! so that any [`BitRead`]/[`BitWrite`] backend gets them for free.

use crate::utils::msb;
use dsi_bitstream::codes::{DeltaRead, DeltaWrite, GammaRead, GammaWrite};
use dsi_bitstream::traits::{BitRead, BitWrite, Endianness};

/// The instantaneous codes an index may use for its components.
///
/// Which codes are legal depends on the component: frequencies may use
/// γ, shifted γ, or δ; pointers anything but interpolative; counts
/// unary, γ, shifted γ, or δ; positions anything but unary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Coding {
    Unary,
    Gamma,
    ShiftedGamma,
    Delta,
    Golomb,
    SkewedGolomb,
    Interpolative,
}

impl Coding {
    /// Parses a coding name as it appears in the `compressionflags`
    /// property (e.g. `SHIFTED_GAMMA`).
    pub fn from_flag_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "UNARY" => Some(Self::Unary),
            "GAMMA" => Some(Self::Gamma),
            "SHIFTED_GAMMA" => Some(Self::ShiftedGamma),
            "DELTA" => Some(Self::Delta),
            "GOLOMB" => Some(Self::Golomb),
            "SKEWED_GOLOMB" => Some(Self::SkewedGolomb),
            "INTERPOLATIVE" => Some(Self::Interpolative),
            _ => None,
        }
    }

    /// The inverse of [`Coding::from_flag_str`].
    pub fn to_flag_str(self) -> &'static str {
        match self {
            Self::Unary => "UNARY",
            Self::Gamma => "GAMMA",
            Self::ShiftedGamma => "SHIFTED_GAMMA",
            Self::Delta => "DELTA",
            Self::Golomb => "GOLOMB",
            Self::SkewedGolomb => "SKEWED_GOLOMB",
            Self::Interpolative => "INTERPOLATIVE",
        }
    }
}

/// Read extensions for the codes of an inverted index.
///
/// All methods decode natural numbers; mapping to signed residuals is the
/// caller's business (see [`nat2int`](crate::utils::nat2int)).
pub trait CodeRead<E: Endianness>: BitRead<E> + GammaRead<E> + DeltaRead<E> {
    /// Reads a minimal binary code for a value in `[0..b)`.
    #[inline]
    fn read_minimal_binary(&mut self, b: u64) -> Result<u64, Self::Error> {
        debug_assert!(b > 0);
        self.read_minimal_binary_param(b, msb(b) as u32)
    }

    /// Reads a minimal binary code for a value in `[0..b)`, with the most
    /// significant bit of `b` precomputed by the caller.
    #[inline]
    fn read_minimal_binary_param(&mut self, b: u64, log2b: u32) -> Result<u64, Self::Error> {
        let m = (1u64 << (log2b + 1)) - b;
        let x = if log2b == 0 {
            0
        } else {
            self.read_bits(log2b as usize)?
        };
        if x < m {
            Ok(x)
        } else {
            Ok((x << 1) + self.read_bits(1)? - m)
        }
    }

    /// Reads a Golomb code of given modulus; `log2b` must be the most
    /// significant bit of `b`.
    ///
    /// A zero modulus denotes the degenerate code in which every value is
    /// zero and no bits are consumed.
    #[inline]
    fn read_golomb(&mut self, b: u64, log2b: u32) -> Result<u64, Self::Error> {
        if b == 0 {
            return Ok(0);
        }
        let q = self.read_unary()?;
        Ok(q * b + self.read_minimal_binary_param(b, log2b)?)
    }

    /// Reads a skewed Golomb code of given modulus: value buckets have
    /// sizes `b`, `2b`, `4b`, …, each prefixed by the unary bucket index.
    #[inline]
    fn read_skewed_golomb(&mut self, b: u64) -> Result<u64, Self::Error> {
        if b == 0 {
            return Ok(0);
        }
        let l = self.read_unary()?;
        let cap = ((1u64 << (l + 1)) - 1) * b;
        let lower = (cap / (2 * b)) * b;
        Ok(lower + self.read_minimal_binary(cap - lower)?)
    }

    /// Reads a shifted γ code, which represents zero in one bit at the price
    /// of one additional bit on all other values.
    #[inline]
    fn read_shifted_gamma(&mut self) -> Result<u64, Self::Error> {
        let len = self.read_unary()?;
        if len == 0 {
            return Ok(0);
        }
        let m = (len - 1) as usize;
        if m == 0 {
            Ok(1)
        } else {
            Ok((1 << m) | self.read_bits(m)?)
        }
    }

    /// Discards `n` γ codes.
    #[inline]
    fn skip_gammas(&mut self, n: u64) -> Result<(), Self::Error> {
        for _ in 0..n {
            self.read_gamma()?;
        }
        Ok(())
    }

    /// Discards `n` δ codes.
    #[inline]
    fn skip_deltas(&mut self, n: u64) -> Result<(), Self::Error> {
        for _ in 0..n {
            self.read_delta()?;
        }
        Ok(())
    }

    /// Discards `n` shifted γ codes.
    #[inline]
    fn skip_shifted_gammas(&mut self, n: u64) -> Result<(), Self::Error> {
        for _ in 0..n {
            self.read_shifted_gamma()?;
        }
        Ok(())
    }

    /// Fills `dst` with consecutive γ codes.
    #[inline]
    fn read_gammas(&mut self, dst: &mut [u32]) -> Result<(), Self::Error> {
        for x in dst.iter_mut() {
            *x = self.read_gamma()? as u32;
        }
        Ok(())
    }

    /// Fills `dst` with consecutive δ codes.
    #[inline]
    fn read_deltas(&mut self, dst: &mut [u32]) -> Result<(), Self::Error> {
        for x in dst.iter_mut() {
            *x = self.read_delta()? as u32;
        }
        Ok(())
    }

    /// Fills `dst` with consecutive shifted γ codes.
    #[inline]
    fn read_shifted_gammas(&mut self, dst: &mut [u32]) -> Result<(), Self::Error> {
        for x in dst.iter_mut() {
            *x = self.read_shifted_gamma()? as u32;
        }
        Ok(())
    }

    /// Decodes `dst.len()` interpolatively coded increasing values in
    /// `[lo..=hi]` into `dst`.
    fn read_interpolative(&mut self, dst: &mut [u32], lo: u64, hi: u64) -> Result<(), Self::Error> {
        let m = dst.len();
        if m == 0 {
            return Ok(());
        }
        let h = m / 2;
        let x = lo + h as u64 + self.read_minimal_binary(hi - lo - m as u64 + 2)?;
        let (left, rest) = dst.split_at_mut(h);
        let (mid, right) = rest.split_at_mut(1);
        mid[0] = x as u32;
        if !left.is_empty() {
            self.read_interpolative(left, lo, x - 1)?;
        }
        if !right.is_empty() {
            self.read_interpolative(right, x + 1, hi)?;
        }
        Ok(())
    }
}

impl<E: Endianness, B: BitRead<E> + GammaRead<E> + DeltaRead<E>> CodeRead<E> for B {}

/// Write extensions matching [`CodeRead`]. All methods return the number of
/// written bits.
pub trait CodeWrite<E: Endianness>: BitWrite<E> + GammaWrite<E> + DeltaWrite<E> {
    /// Writes `x < b` in minimal binary.
    #[inline]
    fn write_minimal_binary(&mut self, x: u64, b: u64) -> Result<usize, Self::Error> {
        debug_assert!(x < b);
        let log2b = msb(b) as u32;
        let m = (1u64 << (log2b + 1)) - b;
        if x < m {
            if log2b == 0 {
                Ok(0)
            } else {
                self.write_bits(x, log2b as usize)
            }
        } else {
            self.write_bits(x + m, log2b as usize + 1)
        }
    }

    /// Writes `x` in Golomb code of given modulus; `b == 0` writes nothing
    /// and requires `x == 0`.
    #[inline]
    fn write_golomb(&mut self, x: u64, b: u64) -> Result<usize, Self::Error> {
        if b == 0 {
            debug_assert!(x == 0);
            return Ok(0);
        }
        let written = self.write_unary(x / b)?;
        Ok(written + self.write_minimal_binary(x % b, b)?)
    }

    /// Writes `x` in skewed Golomb code of given modulus.
    #[inline]
    fn write_skewed_golomb(&mut self, x: u64, b: u64) -> Result<usize, Self::Error> {
        if b == 0 {
            debug_assert!(x == 0);
            return Ok(0);
        }
        let mut l = 0u64;
        let mut lower = 0u64;
        while x >= lower + (b << l) {
            lower += b << l;
            l += 1;
        }
        let written = self.write_unary(l)?;
        Ok(written + self.write_minimal_binary(x - lower, b << l)?)
    }

    /// Writes `x` in shifted γ code.
    #[inline]
    fn write_shifted_gamma(&mut self, x: u64) -> Result<usize, Self::Error> {
        let t = msb(x);
        let written = self.write_unary((t + 1) as u64)?;
        if t > 0 {
            Ok(written + self.write_bits(x & ((1 << t) - 1), t as usize)?)
        } else {
            Ok(written)
        }
    }

    /// Writes the strictly increasing values of `data`, all in `[lo..=hi]`,
    /// in binary interpolative code.
    fn write_interpolative(&mut self, data: &[u32], lo: u64, hi: u64) -> Result<usize, Self::Error> {
        let m = data.len();
        if m == 0 {
            return Ok(0);
        }
        let h = m / 2;
        let x = data[h] as u64;
        let mut written = self.write_minimal_binary(x - lo - h as u64, hi - lo - m as u64 + 2)?;
        if h > 0 {
            written += self.write_interpolative(&data[..h], lo, x - 1)?;
        }
        if m - h - 1 > 0 {
            written += self.write_interpolative(&data[h + 1..], x + 1, hi)?;
        }
        Ok(written)
    }
}

impl<E: Endianness, B: BitWrite<E> + GammaWrite<E> + DeltaWrite<E>> CodeWrite<E> for B {}

/// The length in bits of the unary code for `x`.
pub fn len_unary(x: u64) -> usize {
    x as usize + 1
}

/// The length in bits of the minimal binary code for `x` in `[0..b)`.
pub fn len_minimal_binary(x: u64, b: u64) -> usize {
    debug_assert!(x < b);
    let log2b = msb(b) as u32;
    let m = (1u64 << (log2b + 1)) - b;
    if x < m {
        log2b as usize
    } else {
        log2b as usize + 1
    }
}

/// The length in bits of the Golomb code for `x` with modulus `b`.
pub fn len_golomb(x: u64, b: u64) -> usize {
    if b == 0 {
        return 0;
    }
    len_unary(x / b) + len_minimal_binary(x % b, b)
}

/// The length in bits of the skewed Golomb code for `x` with modulus `b`.
pub fn len_skewed_golomb(x: u64, b: u64) -> usize {
    if b == 0 {
        return 0;
    }
    let mut l = 0u64;
    let mut lower = 0u64;
    while x >= lower + (b << l) {
        lower += b << l;
        l += 1;
    }
    len_unary(l) + len_minimal_binary(x - lower, b << l)
}

/// The length in bits of the shifted γ code for `x`.
pub fn len_shifted_gamma(x: u64) -> usize {
    let t = msb(x);
    len_unary((t + 1) as u64) + if t > 0 { t as usize } else { 0 }
}

/// The length in bits of the binary interpolative code for the strictly
/// increasing values of `data`, all in `[lo..=hi]`.
pub fn len_interpolative(data: &[u32], lo: u64, hi: u64) -> usize {
    let m = data.len();
    if m == 0 {
        return 0;
    }
    let h = m / 2;
    let x = data[h] as u64;
    let mut len = len_minimal_binary(x - lo - h as u64, hi - lo - m as u64 + 2);
    if h > 0 {
        len += len_interpolative(&data[..h], lo, x - 1);
    }
    if m - h - 1 > 0 {
        len += len_interpolative(&data[h + 1..], x + 1, hi);
    }
    len
}
