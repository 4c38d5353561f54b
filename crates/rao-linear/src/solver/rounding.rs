//! Mantissa rounding of bounds and coefficients.
//!
//! Sensitivities recomputed between iterations differ in their last bits
//! even when nothing physical changed. Zeroing the low mantissa bits before
//! a value reaches the backend makes two such models byte-identical, so the
//! backend takes the same path through them.

/// Default number of mantissa bits zeroed.
pub const DEFAULT_ROUNDING_BITS: u32 = 30;

/// Round `value` to the nearest float whose `bits` lowest mantissa bits are
/// zero (ties away from zero). Non-finite values and `bits == 0` pass
/// through.
pub fn round_to_precision(value: f64, bits: u32) -> f64 {
    if bits == 0 || !value.is_finite() {
        return value;
    }
    let bits = bits.min(52);
    let raw = value.to_bits();
    let mask = (1u64 << bits) - 1;
    let rounded = f64::from_bits((raw + (1u64 << (bits - 1))) & !mask);
    if rounded.is_finite() {
        rounded
    } else {
        // Rounding up overflowed into the exponent of infinity.
        f64::from_bits(raw & !mask)
    }
}
