//! GF(256) arithmetic and a systematic Cauchy Reed-Solomon code, used
//! by the erasure-coded blob store to split a blob into `D` data
//! shards and `P` parity shards such that any `D` of the `D + P`
//! shards suffice to reconstruct it.
//!
//! The encoding matrix is `[I_D; C]` where `C` is a `P x D` Cauchy
//! matrix over GF(256) with `C[j][i] = 1 / (x_j + y_i)`, `x_j = D + j`,
//! `y_i = i`. Any `D` rows of a matrix built this way are linearly
//! independent, so decoding from any `D` surviving shards is a matter
//! of inverting the corresponding `D x D` submatrix.

use ordb_core::error::{Error, Result};
use once_cell::sync::Lazy;

const POLY: u16 = 0x11D;

struct Tables {
    exp: [u8; 512],
    log: [u8; 256],
}

static TABLES: Lazy<Tables> = Lazy::new(|| {
    let mut exp = [0u8; 512];
    let mut log = [0u8; 256];
    let mut x: u16 = 1;
    for i in 0..255usize {
        exp[i] = x as u8;
        log[x as usize] = i as u8;
        x <<= 1;
        if x & 0x100 != 0 {
            x ^= POLY;
        }
    }
    for i in 255..512 {
        exp[i] = exp[i - 255];
    }
    Tables { exp, log }
});

fn gf_mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    let t = &*TABLES;
    let log_sum = t.log[a as usize] as usize + t.log[b as usize] as usize;
    t.exp[log_sum]
}

fn gf_inv(a: u8) -> u8 {
    assert!(a != 0, "GF(256) has no inverse of zero");
    let t = &*TABLES;
    t.exp[255 - t.log[a as usize] as usize]
}

/// The `(D + P) x D` Cauchy encoding matrix: identity rows for the data
/// shards, then `P` Cauchy rows for the parity shards.
fn encoding_matrix(data_shards: usize, parity_shards: usize) -> Vec<Vec<u8>> {
    let mut rows = Vec::with_capacity(data_shards + parity_shards);
    for i in 0..data_shards {
        let mut row = vec![0u8; data_shards];
        row[i] = 1;
        rows.push(row);
    }
    for j in 0..parity_shards {
        let x = (data_shards + j) as u8;
        let mut row = Vec::with_capacity(data_shards);
        for i in 0..data_shards {
            let y = i as u8;
            row.push(gf_inv(x ^ y));
        }
        rows.push(row);
    }
    rows
}

/// Split `data` into `data_shards` equal-length shards (zero-padded to
/// a common length) and compute `parity_shards` parity shards from
/// them.
pub fn encode(data: &[u8], data_shards: usize, parity_shards: usize) -> Vec<Vec<u8>> {
    let shard_len = ((data.len() + data_shards - 1) / data_shards).max(1);
    let mut shards: Vec<Vec<u8>> = (0..data_shards)
        .map(|i| {
            let start = i * shard_len;
            let end = (start + shard_len).min(data.len());
            let mut shard = vec![0u8; shard_len];
            if start < data.len() {
                shard[..end - start].copy_from_slice(&data[start..end]);
            }
            shard
        })
        .collect();

    let matrix = encoding_matrix(data_shards, parity_shards);
    for j in 0..parity_shards {
        let row = &matrix[data_shards + j];
        let mut parity = vec![0u8; shard_len];
        for (i, shard) in shards.iter().enumerate().take(data_shards) {
            let coeff = row[i];
            if coeff == 0 {
                continue;
            }
            for (p, &b) in parity.iter_mut().zip(shard.iter()) {
                *p ^= gf_mul(coeff, b);
            }
        }
        shards.push(parity);
    }
    shards
}

/// Reconstruct the original `data_len` bytes from any `data_shards`
/// surviving shards out of `data_shards + parity_shards`, given as
/// `(shard_index, shard_bytes)` pairs.
pub fn decode(
    surviving: &[(usize, Vec<u8>)],
    data_shards: usize,
    parity_shards: usize,
    data_len: usize,
) -> Result<Vec<u8>> {
    if surviving.len() < data_shards {
        return Err(Error::CorruptedStore(format!(
            "erasure decode needs {data_shards} shards, only {} available",
            surviving.len()
        )));
    }
    let shard_len = surviving[0].1.len();
    let matrix = encoding_matrix(data_shards, parity_shards);

    let chosen = &surviving[..data_shards];
    let sub: Vec<Vec<u8>> = chosen.iter().map(|(idx, _)| matrix[*idx].clone()).collect();
    let inverse = invert(&sub)?;

    let mut data = vec![0u8; data_shards * shard_len];
    for (out_row, inv_row) in inverse.iter().enumerate() {
        let mut acc = vec![0u8; shard_len];
        for (coeff, (_, shard)) in inv_row.iter().zip(chosen.iter()) {
            if *coeff == 0 {
                continue;
            }
            for (a, &b) in acc.iter_mut().zip(shard.iter()) {
                *a ^= gf_mul(*coeff, b);
            }
        }
        data[out_row * shard_len..(out_row + 1) * shard_len].copy_from_slice(&acc);
    }
    data.truncate(data_len);
    Ok(data)
}

/// Gauss-Jordan inversion of a square matrix over GF(256).
fn invert(matrix: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
    let n = matrix.len();
    let mut aug: Vec<Vec<u8>> = matrix
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut r = row.clone();
            r.resize(2 * n, 0);
            r[n + i] = 1;
            r
        })
        .collect();

    for col in 0..n {
        let pivot = (col..n).find(|&r| aug[r][col] != 0).ok_or_else(|| {
            Error::CorruptedStore("erasure decode matrix is singular".to_string())
        })?;
        aug.swap(col, pivot);

        let inv = gf_inv(aug[col][col]);
        for v in aug[col].iter_mut() {
            *v = gf_mul(*v, inv);
        }

        for r in 0..n {
            if r == col {
                continue;
            }
            let factor = aug[r][col];
            if factor == 0 {
                continue;
            }
            for c in 0..2 * n {
                let sub = gf_mul(factor, aug[col][c]);
                aug[r][c] ^= sub;
            }
        }
    }

    Ok(aug.into_iter().map(|row| row[n..].to_vec()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_with_no_loss() {
        let data = b"the quick brown fox jumps over the lazy dog".to_vec();
        let shards = encode(&data, 4, 2);
        let surviving: Vec<(usize, Vec<u8>)> =
            shards.iter().cloned().enumerate().collect();
        let back = decode(&surviving, 4, 2, data.len()).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn decode_tolerates_losing_up_to_parity_shards() {
        let data = b"0123456789abcdef0123456789abcdef".to_vec();
        let shards = encode(&data, 4, 2);
        let surviving: Vec<(usize, Vec<u8>)> = shards
            .iter()
            .cloned()
            .enumerate()
            .filter(|(i, _)| *i != 0 && *i != 4)
            .collect();
        let back = decode(&surviving, 4, 2, data.len()).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn decode_fails_with_too_few_shards() {
        let data = b"hello world".to_vec();
        let shards = encode(&data, 4, 2);
        let surviving: Vec<(usize, Vec<u8>)> =
            shards.into_iter().enumerate().take(3).collect();
        assert!(decode(&surviving, 4, 2, data.len()).is_err());
    }

    #[test]
    fn decode_from_parity_only_shards_still_recovers_data() {
        let data = b"erasure coded blob storage survives drive loss".to_vec();
        let shards = encode(&data, 3, 3);
        let surviving: Vec<(usize, Vec<u8>)> = shards
            .iter()
            .cloned()
            .enumerate()
            .skip(1) // drop shard 0, keep shards 1,2 (data) + all 3 parity
            .collect();
        let back = decode(&surviving, 3, 3, data.len()).unwrap();
        assert_eq!(back, data);
    }
}
