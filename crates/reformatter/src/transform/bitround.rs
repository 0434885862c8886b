//! IEEE 754 mantissa rounding.
//!
//! Keeping fewer mantissa bits leaves trailing zeros that compress far
//! better, at a bounded relative error of `2^-(keep_bits + 1)`.

const MANTISSA_BITS: u32 = 23;

/// Round `value` to `keep_bits` mantissa bits, ties to even.
///
/// NaN and infinities pass through unchanged.
pub fn bitround(value: f32, keep_bits: u32) -> f32 {
    if keep_bits >= MANTISSA_BITS || !value.is_finite() {
        return value;
    }

    let drop = MANTISSA_BITS - keep_bits;
    let bits = value.to_bits();
    let mask = !0u32 << drop;
    let half_minus_one = (1u32 << (drop - 1)) - 1;
    let lowest_kept = (bits >> drop) & 1;

    f32::from_bits(bits.wrapping_add(half_minus_one + lowest_kept) & mask)
}

/// Apply [`bitround`] to every value in place.
pub fn bitround_slice(values: &mut [f32], keep_bits: u32) {
    if keep_bits >= MANTISSA_BITS {
        return;
    }
    for v in values.iter_mut() {
        *v = bitround(*v, keep_bits);
    }
}
