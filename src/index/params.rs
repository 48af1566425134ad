/*
 * SPDX-FileCopyrightText: 2025 Inria
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Derivation of code parameters from list statistics.
//!
//! Readers and writers of the same index must agree bit for bit, so every
//! modulus is derived here and nowhere else.

/// The Golomb modulus for gaps of a term appearing in `frequency` documents
/// out of `n`, i.e. `⌈−log 2 / log(1 − frequency/n)⌉`.
///
/// The result is zero when `frequency == n`: in that degenerate case every
/// gap is forced and the code emits no bits.
pub fn golomb_modulus(frequency: u64, n: u64) -> u64 {
    debug_assert!(frequency >= 1 && frequency <= n);
    let p = frequency as f64 / n as f64;
    (-std::f64::consts::LN_2 / (1.0 - p).ln()).ceil() as u64
}

/// The standard deviation of the gap spanned by `quantum` postings of a term
/// appearing in `frequency` documents out of `n`, under the usual Bernoulli
/// model: `√(quantum · (1 − p)) / p` with `p = frequency/n`.
pub fn quantum_sigma(frequency: u64, n: u64, quantum: u64) -> u64 {
    debug_assert!(frequency >= 1 && frequency <= n);
    let p = frequency as f64 / n as f64;
    ((quantum as f64 * (1.0 - p)).sqrt() / p) as u64
}

/// The Golomb modulus for a skip-tower residual at height `shift`, assuming
/// a Gaussian residual whose variance doubles at each tower level.
///
/// `sigma` is the per-quantum deviation computed by [`quantum_sigma`]; the
/// modulus approximates the optimal parameter for the zig-zag folding of a
/// centered Gaussian with deviation `sigma · 2^(shift/2)`, and is never zero.
pub fn gaussian_golomb_modulus(sigma: u64, shift: u32) -> u64 {
    const FOLDING: f64 = 1.106_047_583_709_620_4; // 2 ln 2 √(2/π)
    let dev = sigma as f64 * 2f64.powf(shift as f64 / 2.0);
    ((FOLDING * dev).ceil() as u64).max(1)
}
