//! Numeric helpers shared by tiling, aggregation and verification.

/// Hashable key of a coordinate rounded to a fixed number of decimals.
///
/// Ties round to even so keys agree with the usual array-rounding convention.
/// The key is the bit pattern of the rounded `f64`, so large precisions keep
/// distinct values apart instead of saturating an integer.
pub(crate) fn quantize(value: f32, decimals: u32) -> u64 {
    let scale = 10f64.powi(decimals.min(i32::MAX as u32) as i32);
    // `+ 0.0` folds -0.0 into 0.0.
    ((f64::from(value) * scale).round_ties_even() + 0.0).to_bits()
}

/// Integer ceiling division for positive divisors.
pub(crate) fn ceil_div(value: usize, divisor: usize) -> usize {
    debug_assert!(divisor > 0);
    value.div_ceil(divisor)
}

/// Number of windows of size `window` with stride `step` needed to cover `len`.
pub(crate) fn window_count(len: usize, window: usize, step: usize) -> usize {
    if len <= window {
        return 1;
    }
    1 + ceil_div(len - window, step)
}
