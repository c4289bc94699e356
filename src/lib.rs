/*!
# j2k-codec-rs

A pure-Rust encoder/decoder for the JPEG 2000 Part 1 (ISO/IEC 15444-1)
codestream: DWT (5/3 reversible, 9/7 irreversible), scalar quantization,
EBCOT Tier-1 bit-plane coding over the MQ arithmetic coder, Tier-2
packet/tag-tree assembly with simple and PCRD layer allocation, and the five
progression orders. Tier-1 is behind a pluggable `BlockCoder` trait so an
HTJ2K (Part 15) block coder can stand in for EBCOT without touching Tier-2.

Primarily aimed at medical (DICOM) use: the lossless path is bit-exact and
the lossy path has predictable rate/quality behavior (`EncoderOptions`).

## Modules

- `jpeg2000`: the codec itself (DWT, quantization, T1, T2, framing, ROI,
  rate control, MCT, HTJ2K).
- `error`: the crate-wide `J2kError`.
*/

pub mod error;
pub mod jpeg2000;

pub use error::J2kError;

use jpeg2000::roi::{RoiGeometry, RoiStyle};

/// Basic information about an image frame handed to the encoder or returned
/// by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    /// Bits per sample (1-16).
    pub bits_per_sample: i32,
    pub component_count: i32,
}

/// The five packet progression orders (spec.md §4.4), in their COD.Scod
/// wire-value order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressionOrder {
    #[default]
    Lrcp,
    Rlcp,
    Rpcl,
    Pcrl,
    Cprl,
}

impl ProgressionOrder {
    pub fn to_wire(self) -> u8 {
        match self {
            ProgressionOrder::Lrcp => 0,
            ProgressionOrder::Rlcp => 1,
            ProgressionOrder::Rpcl => 2,
            ProgressionOrder::Pcrl => 3,
            ProgressionOrder::Cprl => 4,
        }
    }

    pub fn from_wire(value: u8) -> Result<Self, J2kError> {
        match value {
            0 => Ok(ProgressionOrder::Lrcp),
            1 => Ok(ProgressionOrder::Rlcp),
            2 => Ok(ProgressionOrder::Rpcl),
            3 => Ok(ProgressionOrder::Pcrl),
            4 => Ok(ProgressionOrder::Cprl),
            other => Err(J2kError::UnsupportedFeature(format!(
                "unknown progression order {other}"
            ))),
        }
    }
}

/// Region-of-interest configuration: geometry plus the shift applied to the
/// coefficients it covers (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct RoiConfig {
    pub geometry: RoiGeometry,
    pub style: RoiStyle,
    pub shift: u8,
}

/// A Part 2 MCC/MCO binding supplied by the caller (spec.md §4.8): opaque
/// component-index set plus the matrix applied/undone around the DWT stage.
pub type MctBinding = jpeg2000::mct::McxBinding;

/// Encode-time configuration. `Default` matches the documented defaults in
/// spec.md §6. Validated fail-fast by [`EncoderOptions::validate`] before any
/// byte is touched, per the §7 propagation policy.
#[derive(Debug, Clone)]
pub struct EncoderOptions {
    pub num_levels: u8,
    pub lossless: bool,
    pub code_block_w: u32,
    pub code_block_h: u32,
    /// `(PPx, PPy)` explicit precinct exponents; `None` means one precinct
    /// per resolution (COD.Scod bit 0 left clear).
    pub precinct_w: Option<u8>,
    pub precinct_h: Option<u8>,
    pub quality: u8,
    pub num_layers: u16,
    pub progression_order: ProgressionOrder,
    /// 0 disables TargetRatio allocation; PCRD against `num_layers` equal
    /// budgets is used instead.
    pub target_ratio: f64,
    /// 0 means a single tile spanning the whole image.
    pub tile_w: u32,
    pub tile_h: u32,
    pub roi: Option<RoiConfig>,
    /// Applies the standard Part 1 MCT (RCT if lossless, ICT if lossy) to the
    /// first three components before `mct_bindings` are applied. Ignored
    /// below 3 components.
    pub mct: bool,
    pub mct_bindings: Vec<MctBinding>,
    /// Forced on whenever `lossless && num_layers > 1` (Open Question ii):
    /// arbitrary layer truncation requires every pass to end on an
    /// independently decodable byte boundary.
    pub term_all_passes: bool,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            num_levels: 5,
            lossless: true,
            code_block_w: 64,
            code_block_h: 64,
            precinct_w: None,
            precinct_h: None,
            quality: 80,
            num_layers: 1,
            progression_order: ProgressionOrder::Lrcp,
            target_ratio: 0.0,
            tile_w: 0,
            tile_h: 0,
            roi: None,
            mct: true,
            mct_bindings: Vec::new(),
            term_all_passes: false,
        }
    }
}

impl EncoderOptions {
    /// Resolves `term_all_passes` from `lossless`/`num_layers` and checks
    /// every field is in range, returning `InvalidParameters` on the first
    /// violation found.
    pub fn validate(&mut self) -> Result<(), J2kError> {
        if self.lossless && self.num_layers > 1 {
            self.term_all_passes = true;
        }
        if self.num_levels > 32 {
            return Err(J2kError::InvalidParameters("num_levels must be <= 32".into()));
        }
        if !self.code_block_w.is_power_of_two()
            || !(4..=1024).contains(&self.code_block_w)
            || !self.code_block_h.is_power_of_two()
            || !(4..=1024).contains(&self.code_block_h)
        {
            return Err(J2kError::InvalidParameters(
                "code_block_w/h must be a power of two in [4, 1024]".into(),
            ));
        }
        let cb_w_exp = self.code_block_w.trailing_zeros();
        let cb_h_exp = self.code_block_h.trailing_zeros();
        if cb_w_exp + cb_h_exp > 12 {
            return Err(J2kError::InvalidParameters(
                "log2(code_block_w) + log2(code_block_h) must be <= 12".into(),
            ));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(J2kError::InvalidParameters("quality must be in [1, 100]".into()));
        }
        if self.num_layers == 0 {
            return Err(J2kError::InvalidParameters("num_layers must be >= 1".into()));
        }
        if self.target_ratio < 0.0 {
            return Err(J2kError::InvalidParameters("target_ratio must be >= 0".into()));
        }
        Ok(())
    }
}

/// Decode-time configuration: the strict/resilient switch from spec.md §7.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecoderOptions {
    /// Strict mode aborts on `MalformedStream`/`T1Inconsistency`/`Truncated`.
    /// Resilient mode logs a warning and continues with zero-filled
    /// remainders.
    pub strict: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_encoder_options_validate() {
        let mut opts = EncoderOptions::default();
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn lossless_multi_layer_forces_term_all_passes() {
        let mut opts = EncoderOptions {
            lossless: true,
            num_layers: 3,
            ..Default::default()
        };
        opts.validate().unwrap();
        assert!(opts.term_all_passes);
    }

    #[test]
    fn rejects_non_power_of_two_codeblock() {
        let mut opts = EncoderOptions { code_block_w: 50, ..Default::default() };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn progression_order_wire_roundtrips() {
        for &order in &[
            ProgressionOrder::Lrcp,
            ProgressionOrder::Rlcp,
            ProgressionOrder::Rpcl,
            ProgressionOrder::Pcrl,
            ProgressionOrder::Cprl,
        ] {
            assert_eq!(ProgressionOrder::from_wire(order.to_wire()).unwrap(), order);
        }
    }
}
