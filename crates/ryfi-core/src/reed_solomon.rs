//! Reed-Solomon (255,223) outer code.
//!
//! Systematic RS over GF(2^8) with primitive polynomial 0x11D and
//! generator roots alpha^1..alpha^32, correcting up to 16 byte errors per
//! 255-byte codeword. A frame is an exact number of codewords, so the
//! encoder and decoder also come in frame-sized flavors that walk the
//! blocks back to back. The code carries no state between frames.
//!
//! Decoding is Berlekamp-Massey for the error locator, Chien search for
//! the error positions and the Forney formula for the magnitudes.
//!
//! ## Example
//!
//! ```rust
//! use ryfi_core::reed_solomon::{rs_decode, rs_encode, RS_K, RS_N};
//!
//! let data: Vec<u8> = (0..RS_K as u8).map(|i| i).collect();
//! let mut codeword = rs_encode(&data);
//! assert_eq!(codeword.len(), RS_N);
//!
//! codeword[5] ^= 0x5A;
//! codeword[200] ^= 0xC3;
//! assert_eq!(rs_decode(&mut codeword).unwrap(), 2);
//! assert_eq!(&codeword[..RS_K], &data[..]);
//! ```

use thiserror::Error;

/// Codeword length in bytes.
pub const RS_N: usize = 255;

/// Data bytes per codeword.
pub const RS_K: usize = 223;

/// Parity bytes per codeword.
pub const RS_PARITY: usize = RS_N - RS_K;

/// Correctable byte errors per codeword.
pub const RS_T: usize = RS_PARITY / 2;

const PRIM_POLY: u16 = 0x11D;
const GF_ORDER: usize = 255;

/// Exponential table, doubled so products never need a modulo.
static GF_EXP: [u8; 512] = {
    let mut t = [0u8; 512];
    let mut v: u16 = 1;
    let mut i = 0;
    while i < 512 {
        t[i] = v as u8;
        v <<= 1;
        if v & 0x100 != 0 {
            v ^= PRIM_POLY;
        }
        i += 1;
    }
    t
};

/// Log table; index 0 is never consulted.
static GF_LOG: [u8; 256] = {
    let mut t = [0u8; 256];
    let mut i = 0;
    while i < GF_ORDER {
        t[GF_EXP[i] as usize] = i as u8;
        i += 1;
    }
    t
};

#[inline(always)]
fn gf_mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        0
    } else {
        GF_EXP[GF_LOG[a as usize] as usize + GF_LOG[b as usize] as usize]
    }
}

#[inline]
fn gf_div(a: u8, b: u8) -> u8 {
    debug_assert_ne!(b, 0, "GF division by zero");
    if a == 0 {
        0
    } else {
        GF_EXP[(GF_LOG[a as usize] as usize + GF_ORDER - GF_LOG[b as usize] as usize) % GF_ORDER]
    }
}

#[inline]
fn gf_pow(n: usize) -> u8 {
    GF_EXP[n % GF_ORDER]
}

/// Evaluate a polynomial (ascending coefficients) at `x`.
fn poly_eval(p: &[u8], x: u8) -> u8 {
    let mut acc = 0u8;
    for &c in p.iter().rev() {
        acc = gf_mul(acc, x) ^ c;
    }
    acc
}

/// Generator polynomial g(x) = prod_{i=1..32} (x - alpha^i), ascending.
fn generator() -> [u8; RS_PARITY + 1] {
    let mut g = [0u8; RS_PARITY + 1];
    g[0] = gf_pow(1);
    g[1] = 1;
    let mut deg = 1;
    for i in 2..=RS_PARITY {
        // Multiply g by (x + alpha^i).
        let root = gf_pow(i);
        let mut next = [0u8; RS_PARITY + 1];
        for j in 0..=deg {
            next[j] ^= gf_mul(g[j], root);
            next[j + 1] ^= g[j];
        }
        deg += 1;
        g = next;
    }
    g
}

/// RS decoding failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RsError {
    /// More than [`RS_T`] byte errors in a codeword.
    #[error("uncorrectable codeword")]
    Uncorrectable,
    /// Input is not a whole number of codewords / data blocks.
    #[error("bad block length: expected {expected}, got {got}")]
    BadLength { expected: usize, got: usize },
}

/// Encode one 223-byte data block into a 255-byte systematic codeword.
///
/// # Panics
///
/// Panics when `data` is not exactly [`RS_K`] bytes.
pub fn rs_encode(data: &[u8]) -> Vec<u8> {
    assert_eq!(data.len(), RS_K, "RS data block must be {} bytes", RS_K);
    let gen = generator();

    // Feedback shift register division of M(x) * x^32 by g(x); the
    // register remainder is the parity.
    let mut reg = [0u8; RS_PARITY];
    for &byte in data {
        let d = byte ^ reg[RS_PARITY - 1];
        for j in (1..RS_PARITY).rev() {
            reg[j] = reg[j - 1] ^ gf_mul(d, gen[j]);
        }
        reg[0] = gf_mul(d, gen[0]);
    }

    let mut codeword = Vec::with_capacity(RS_N);
    codeword.extend_from_slice(data);
    for j in (0..RS_PARITY).rev() {
        codeword.push(reg[j]);
    }
    codeword
}

/// Correct a 255-byte codeword in place. Returns the number of corrected
/// byte errors, or [`RsError::Uncorrectable`] when the error count exceeds
/// [`RS_T`].
pub fn rs_decode(codeword: &mut [u8]) -> Result<usize, RsError> {
    if codeword.len() != RS_N {
        return Err(RsError::BadLength {
            expected: RS_N,
            got: codeword.len(),
        });
    }

    // Syndromes S_j = r(alpha^j), j = 1..=32. The codeword polynomial has
    // codeword[0] as the x^(n-1) coefficient.
    let mut synd = [0u8; RS_PARITY];
    let mut clean = true;
    for (j, s) in synd.iter_mut().enumerate() {
        let a = gf_pow(j + 1);
        let mut val = 0u8;
        for &r in codeword.iter() {
            val = gf_mul(val, a) ^ r;
        }
        *s = val;
        clean &= val == 0;
    }
    if clean {
        return Ok(0);
    }

    // Berlekamp-Massey: error locator sigma(x), ascending, sigma[0] = 1.
    let mut sigma = vec![1u8];
    let mut prev = vec![1u8];
    let mut l = 0usize;
    let mut prev_delta = 1u8;
    let mut gap = 1usize;

    for step in 0..RS_PARITY {
        let mut delta = synd[step];
        for i in 1..sigma.len() {
            if step >= i {
                delta ^= gf_mul(sigma[i], synd[step - i]);
            }
        }

        if delta == 0 {
            gap += 1;
        } else if 2 * l <= step {
            let factor = gf_div(delta, prev_delta);
            let mut shifted = vec![0u8; gap];
            shifted.extend(prev.iter().map(|&c| gf_mul(c, factor)));
            let next = xor_polys(&sigma, &shifted);
            prev = sigma;
            sigma = next;
            l = step + 1 - l;
            prev_delta = delta;
            gap = 1;
        } else {
            let factor = gf_div(delta, prev_delta);
            let mut shifted = vec![0u8; gap];
            shifted.extend(prev.iter().map(|&c| gf_mul(c, factor)));
            sigma = xor_polys(&sigma, &shifted);
            gap += 1;
        }
    }
    while sigma.len() > 1 && *sigma.last().unwrap() == 0 {
        sigma.pop();
    }

    let num_errors = sigma.len() - 1;
    if num_errors == 0 || num_errors > RS_T {
        return Err(RsError::Uncorrectable);
    }

    // Chien search over every position. Position `pos` holds the
    // coefficient of x^(n-1-pos), so its locator inverse is
    // alpha^(pos - (n-1)) mod 255.
    let mut positions = Vec::with_capacity(num_errors);
    let mut x_invs = Vec::with_capacity(num_errors);
    for pos in 0..RS_N {
        let x_inv = gf_pow(pos + GF_ORDER - (RS_N - 1));
        if poly_eval(&sigma, x_inv) == 0 {
            positions.push(pos);
            x_invs.push(x_inv);
        }
    }
    if positions.len() != num_errors {
        return Err(RsError::Uncorrectable);
    }

    // Forney: Omega(x) = S(x) sigma(x) mod x^32, magnitude at each
    // location is Omega(X^-1) / sigma'(X^-1).
    let mut omega = vec![0u8; RS_PARITY];
    for (i, &si) in sigma.iter().enumerate() {
        if si == 0 {
            continue;
        }
        for (j, &sj) in synd.iter().enumerate() {
            if i + j < RS_PARITY {
                omega[i + j] ^= gf_mul(si, sj);
            }
        }
    }

    // Formal derivative: only odd-degree terms survive in GF(2^m).
    let mut sigma_prime = vec![0u8; sigma.len().saturating_sub(1).max(1)];
    for i in (1..sigma.len()).step_by(2) {
        sigma_prime[i - 1] = sigma[i];
    }

    for (idx, &pos) in positions.iter().enumerate() {
        let x_inv = x_invs[idx];
        let denom = poly_eval(&sigma_prime, x_inv);
        if denom == 0 {
            return Err(RsError::Uncorrectable);
        }
        let magnitude = gf_div(poly_eval(&omega, x_inv), denom);
        codeword[pos] ^= magnitude;
    }

    Ok(positions.len())
}

fn xor_polys(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; a.len().max(b.len())];
    for (i, &v) in a.iter().enumerate() {
        out[i] ^= v;
    }
    for (i, &v) in b.iter().enumerate() {
        out[i] ^= v;
    }
    out
}

/// Encode a whole frame of data blocks back to back.
///
/// `data.len()` must be a multiple of [`RS_K`]; the output is the same
/// number of [`RS_N`]-byte codewords.
pub fn rs_encode_blocks(data: &[u8]) -> Vec<u8> {
    assert!(
        data.len() % RS_K == 0,
        "frame must be a whole number of RS data blocks"
    );
    let mut out = Vec::with_capacity(data.len() / RS_K * RS_N);
    for block in data.chunks_exact(RS_K) {
        out.extend_from_slice(&rs_encode(block));
    }
    out
}

/// Decode a whole frame of codewords. Returns the concatenated data blocks
/// and the total corrected error count, or [`RsError::Uncorrectable`] when
/// any single block fails; the caller then treats the whole frame as
/// corrupt.
pub fn rs_decode_blocks(coded: &mut [u8]) -> Result<(Vec<u8>, usize), RsError> {
    if coded.len() % RS_N != 0 {
        return Err(RsError::BadLength {
            expected: RS_N,
            got: coded.len() % RS_N,
        });
    }
    let mut data = Vec::with_capacity(coded.len() / RS_N * RS_K);
    let mut corrected = 0;
    for block in coded.chunks_exact_mut(RS_N) {
        corrected += rs_decode(block)?;
        data.extend_from_slice(&block[..RS_K]);
    }
    Ok((data, corrected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn sample_block(seed: u8) -> Vec<u8> {
        (0..RS_K).map(|i| (i as u8).wrapping_mul(31) ^ seed).collect()
    }

    #[test]
    fn test_gf_inverses() {
        for a in 1..=255u8 {
            let inv = gf_div(1, a);
            assert_eq!(gf_mul(a, inv), 1, "inverse failed for {}", a);
        }
    }

    #[test]
    fn test_systematic_roundtrip() {
        let data = sample_block(0x5C);
        let mut codeword = rs_encode(&data);
        assert_eq!(&codeword[..RS_K], &data[..]);
        assert_eq!(rs_decode(&mut codeword).unwrap(), 0);
        assert_eq!(&codeword[..RS_K], &data[..]);
    }

    #[test]
    fn test_single_error_every_position() {
        let data = sample_block(0x11);
        let clean = rs_encode(&data);
        for pos in (0..RS_N).step_by(17) {
            let mut received = clean.clone();
            received[pos] ^= 0xA5;
            assert_eq!(rs_decode(&mut received).unwrap(), 1, "pos {}", pos);
            assert_eq!(&received[..RS_K], &data[..], "pos {}", pos);
        }
    }

    #[test]
    fn test_corrects_full_budget() {
        let data = sample_block(0x42);
        let mut received = rs_encode(&data);
        for i in 0..RS_T {
            received[i * 15] ^= (i as u8 + 1) | 0x80;
        }
        assert_eq!(rs_decode(&mut received).unwrap(), RS_T);
        assert_eq!(&received[..RS_K], &data[..]);
    }

    #[test]
    fn test_over_budget_detected() {
        let mut rng = StdRng::seed_from_u64(0xC0DE);
        let data = sample_block(0x99);
        let clean = rs_encode(&data);

        let mut detected = 0;
        for _ in 0..100 {
            let mut received = clean.clone();
            // Corrupt 17 distinct positions.
            let mut hit = [false; RS_N];
            let mut flipped = 0;
            while flipped < RS_T + 1 {
                let pos = rng.gen_range(0..RS_N);
                if hit[pos] {
                    continue;
                }
                hit[pos] = true;
                received[pos] ^= rng.gen_range(1..=255u8);
                flipped += 1;
            }
            match rs_decode(&mut received) {
                Err(RsError::Uncorrectable) => detected += 1,
                // A miscorrection is possible but must not dominate.
                _ => {}
            }
        }
        assert!(detected >= 1, "17-error patterns never flagged");
    }

    #[test]
    fn test_blocks_roundtrip() {
        let mut data = Vec::new();
        for seed in 0..9u8 {
            data.extend(sample_block(seed));
        }
        let mut coded = rs_encode_blocks(&data);
        assert_eq!(coded.len(), 9 * RS_N);

        coded[10] ^= 0xFF;
        coded[300] ^= 0x0F;
        coded[9 * RS_N - 1] ^= 0x71;
        let (decoded, corrected) = rs_decode_blocks(&mut coded).unwrap();
        assert_eq!(decoded, data);
        assert_eq!(corrected, 3);
    }

    #[test]
    fn test_one_bad_block_poisons_frame() {
        let mut data = Vec::new();
        for seed in 0..3u8 {
            data.extend(sample_block(seed));
        }
        let mut coded = rs_encode_blocks(&data);
        // Destroy the middle codeword well past the correction budget.
        for b in coded[RS_N..RS_N + 60].iter_mut() {
            *b ^= 0xDB;
        }
        assert_eq!(rs_decode_blocks(&mut coded), Err(RsError::Uncorrectable));
    }

    #[test]
    fn test_bad_length() {
        let mut short = vec![0u8; RS_N - 1];
        assert!(matches!(
            rs_decode(&mut short),
            Err(RsError::BadLength { .. })
        ));
    }
}
