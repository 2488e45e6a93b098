//! Recovery functions
//!
//! A recovery function fills `dst` (first `size` bytes) from the
//! concatenated source units in `src`. It has no way to report failure.

use std::sync::Arc;

/// `(dst, src, size)`
pub type RecoverFunc = Arc<dyn Fn(&mut [u8], &[u8], usize) + Send + Sync>;

/// Mirror recovery: the first source unit is the lost data
pub fn mirror_copy() -> RecoverFunc {
    Arc::new(|dst: &mut [u8], src: &[u8], size: usize| {
        dst[..size].copy_from_slice(&src[..size]);
    })
}

/// Parity recovery: the lost unit is the XOR of every source unit
pub fn xor_recover() -> RecoverFunc {
    Arc::new(|dst: &mut [u8], src: &[u8], size: usize| {
        if size == 0 {
            return;
        }
        let dst = &mut dst[..size];
        dst.fill(0);
        for unit in src.chunks_exact(size) {
            for (d, s) in dst.iter_mut().zip(unit) {
                *d ^= *s;
            }
        }
    })
}
