//! Bit matrix transposition, the inner kernel of the residual codec.
//!
//! A packed residual block stores `bits` rows of `count / 8` bytes,
//! row major, MSB first within each byte. Column `j` read from top to
//! bottom forms a `bits` bit two's complement integer; [transpose]
//! recovers the `count` column values sign extended to 64 bits, and
//! [pack] is its inverse on the writer side.
//!
//! The generic implementation is the correctness reference. Specialized
//! implementations are pure optimizations selected at startup from the
//! `TRANSPOSE_FORCE` environment variable (by name) or, when it is
//! unset, from the target architecture.

use std::sync::OnceLock;

mod generic;
#[cfg(target_arch = "x86_64")]
mod x86;

/// Valid column counts for a packed block.
pub const COUNTS: [usize; 3] = [8, 16, 32];

/// Implementation signature: `count = out.len()` columns, `bits` rows.
/// `input` must hold at least `bits * count / 8` bytes.
pub type TransposeFn = fn(out: &mut [i64], input: &[u8], bits: usize);

/// Environment variable naming the implementation to force.
pub const FORCE_ENV: &str = "TRANSPOSE_FORCE";

/// Named implementations available on this build.
pub fn implementations() -> &'static [(&'static str, TransposeFn)] {
    &[
        ("generic", generic::transpose as TransposeFn),
        #[cfg(target_arch = "x86_64")]
        ("sse2", x86::transpose as TransposeFn),
    ]
}

fn preferred() -> TransposeFn {
    #[cfg(target_arch = "x86_64")]
    {
        x86::transpose
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        generic::transpose
    }
}

fn selected() -> TransposeFn {
    static SELECTED: OnceLock<TransposeFn> = OnceLock::new();
    *SELECTED.get_or_init(|| match std::env::var(FORCE_ENV) {
        Ok(name) => match implementations()
            .iter()
            .find(|(tag, _)| *tag == name)
        {
            Some((_, f)) => *f,
            None => {
                log::warn!("unknown {} value {:?}, using default", FORCE_ENV, name);
                preferred()
            },
        },
        Err(_) => preferred(),
    })
}

/// Transposes `bits` rows of `out.len()` columns from `input` into
/// sign extended column values.
///
/// `out.len()` must be 8, 16 or 32 and `bits` in `1..=32`; `input`
/// must hold `bits * out.len() / 8` bytes.
pub fn transpose(out: &mut [i64], input: &[u8], bits: usize) {
    debug_assert!(COUNTS.contains(&out.len()));
    debug_assert!((1..=32).contains(&bits));
    debug_assert!(input.len() >= bits * out.len() / 8);
    selected()(out, input, bits)
}

/// Packs `values.len()` column values of `bits` significant bits each
/// into `bits` rows appended to `out`. Inverse of [transpose]: every
/// value must be representable as a `bits` bit two's complement
/// integer.
pub fn pack(out: &mut Vec<u8>, values: &[i64], bits: usize) {
    let count = values.len();
    debug_assert!(COUNTS.contains(&count));
    let stride = count / 8;
    let base = out.len();
    out.resize(base + bits * stride, 0);
    for (jj, &value) in values.iter().enumerate() {
        let byte = jj / 8;
        let mask = 1u8 << (7 - (jj & 7));
        for row in 0..bits {
            if (value >> (bits - 1 - row)) & 1 != 0 {
                out[base + row * stride + byte] |= mask;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    /// Ground truth column values: transposing the packed form of this
    /// vector must recover it for every width.
    const TRUTH: [u32; 32] = [
        0x55555555, 0x33333333, 0x0f0f0f0f, 0x00ff00ff, 0x0000ffff, 0xaaaaaaaa, 0xcccccccc,
        0xf0f0f0f0, 0xff00ff00, 0xffff0000, 0x0000ffff, 0x00ffff00, 0x0ff00ff0, 0x3c3c3c3c,
        0x66666666, 0xffffffff, 0x12345678, 0x31415927, 0xcafebabe, 0xcafed00d, 0x47494638,
        0x89504e47, 0x4d546864, 0x2321202f, 0x7f454c46, 0x25504446, 0x19540119, 0x4a6f7921,
        0x49492a00, 0x4d4d002a, 0x57414433, 0xd0cf11e0,
    ];

    /// Row major, MSB first rendition of [TRUTH]: byte r*4+b holds bit
    /// (31-r) of columns 8b..8b+8.
    fn truth_rows() -> [u8; 128] {
        let mut rows = [0u8; 128];
        for (jj, &column) in TRUTH.iter().enumerate() {
            for row in 0..32 {
                if (column >> (31 - row)) & 1 != 0 {
                    rows[row * 4 + jj / 8] |= 1 << (7 - (jj & 7));
                }
            }
        }
        rows
    }

    fn check_impl(name: &str, f: TransposeFn) {
        let rows = truth_rows();
        for count in COUNTS {
            // keep the leading `count` columns of each row
            let stride = count / 8;
            let mut input = vec![0u8; 32 * stride];
            for row in 0..32 {
                input[row * stride..(row + 1) * stride]
                    .copy_from_slice(&rows[row * 4..row * 4 + stride]);
            }
            for bits in 1..=32usize {
                let mut out = vec![0i64; count];
                f(&mut out, &input, bits);
                for jj in 0..count {
                    let expect = (TRUTH[jj] as i32) >> (32 - bits);
                    assert_eq!(
                        out[jj], expect as i64,
                        "{}: count {} bits {} column {}",
                        name, count, bits, jj
                    );
                }
            }
        }
    }

    #[test]
    fn ground_truth_all_implementations() {
        for (name, f) in implementations() {
            check_impl(name, *f);
        }
    }

    #[test]
    fn pack_transpose_roundtrip() {
        let mut rng = StdRng::seed_from_u64(0x5ca1ab1e);
        for (name, f) in implementations() {
            for count in COUNTS {
                for bits in 1..=32usize {
                    let lo = -(1i64 << (bits - 1));
                    let hi = (1i64 << (bits - 1)) - 1;
                    let values: Vec<i64> =
                        (0..count).map(|_| rng.gen_range(lo..=hi)).collect();
                    let mut packed = Vec::new();
                    pack(&mut packed, &values, bits);
                    assert_eq!(packed.len(), bits * count / 8);
                    let mut out = vec![0i64; count];
                    f(&mut out, &packed, bits);
                    assert_eq!(out, values, "{}: count {} bits {}", name, count, bits);
                }
            }
        }
    }
}
