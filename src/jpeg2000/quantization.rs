//! Scalar dead-zone quantization (ISO/IEC 15444-1 §E.1) and DC level
//! shifting (§G.1.2).

/// DC level shift applied before the forward transform to unsigned
/// components: centers an unsigned `depth`-bit sample on zero.
pub fn level_shift_forward(sample: i32, depth: u8, is_signed: bool) -> i32 {
    if is_signed {
        sample
    } else {
        sample - (1 << (depth - 1))
    }
}

/// Inverse of [`level_shift_forward`], applied after the inverse transform.
pub fn level_shift_inverse(sample: i32, depth: u8, is_signed: bool) -> i32 {
    if is_signed {
        sample
    } else {
        sample + (1 << (depth - 1))
    }
}

/// Quantization step size for a subband, Δ_b = 2^(R_b - ε_b) * (1 + μ_b / 2048)
/// (Eq. E-3), where `range_bits` R_b is the nominal dynamic range of the
/// subband (component depth + subband gain) and `(exponent, mantissa)` are
/// read straight from the QCD/QCC marker.
pub fn step_size(range_bits: u8, exponent: u8, mantissa: u16) -> f32 {
    let base = 2f32.powi(range_bits as i32 - exponent as i32);
    base * (1.0 + (mantissa as f32) / 2048.0)
}

/// Nominal dynamic range R_b of a subband: component bit depth plus the
/// subband's analysis gain (Table E.1: LL/HH +0 or +1 per decomposition
/// level depending on orientation, accumulated across levels).
pub fn subband_range_bits(component_depth: u8, gain_bits: u8) -> u8 {
    component_depth + gain_bits
}

/// Dead-zone scalar quantization: q = sign(x) * floor(|x| / Δ).
pub fn quantize_scalar(coeff: f32, step: f32) -> i32 {
    if step <= 0.0 {
        return coeff.round() as i32;
    }
    let sign = if coeff >= 0.0 { 1 } else { -1 };
    sign * (coeff.abs() / step).floor() as i32
}

/// Reconstruction from a quantization index: midpoint of the quantization
/// bin, 0 for q == 0 (the dead zone itself reconstructs to zero).
pub fn dequantize_scalar(q: i32, step: f32) -> f32 {
    if q == 0 {
        return 0.0;
    }
    let sign = if q > 0 { 1.0 } else { -1.0 };
    (q.abs() as f32 + 0.5) * step * sign
}

/// For the 5/3 reversible path, quantization is the identity transform
/// (coefficients are already integers, no loss is introduced here — the
/// guard bits belong to the bit-plane count, not a multiplicative step).
pub fn quantize_reversible(coeff: i32) -> i32 {
    coeff
}

pub fn dequantize_reversible(q: i32) -> i32 {
    q
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantization_roundtrip_within_one_step() {
        let val = 10.5;
        let step = 2.0;
        let q = quantize_scalar(val, step);
        assert_eq!(q, 5);
        let recon = dequantize_scalar(q, step);
        assert!((val - recon).abs() <= step);
    }

    #[test]
    fn dead_zone_maps_small_values_to_zero() {
        assert_eq!(quantize_scalar(0.4, 2.0), 0);
        assert_eq!(dequantize_scalar(0, 2.0), 0.0);
    }

    #[test]
    fn level_shift_roundtrips_unsigned_sample() {
        let shifted = level_shift_forward(200, 8, false);
        assert_eq!(shifted, 200 - 128);
        assert_eq!(level_shift_inverse(shifted, 8, false), 200);
    }

    #[test]
    fn step_size_matches_formula() {
        // R_b=8, eps=8, mu=0 -> Delta = 2^0 * 1.0 = 1.0
        assert!((step_size(8, 8, 0) - 1.0).abs() < 1e-6);
    }
}
