//! Pluggable code-block entropy coder: the EBCOT/MQ path (`bit_plane_coder`)
//! and the HTJ2K MEL/MagSgn/VLC path (`ht_block_coder`) both produce a
//! compressed byte buffer from a block of coefficients and consume one back,
//! so the rest of the pipeline (rate control, packet assembly) can stay
//! agnostic to which one a tile uses (selected by the CAP marker's HTJ2K bit).

use super::image::SubbandOrientation;
use super::rate_control::PassInfo;
use crate::error::J2kError;

pub trait BlockCoder {
    /// Encodes `coefficients` (row-major, `width * height`) down to
    /// `max_bit_plane`, returning the compressed byte stream plus each
    /// coding pass's incremental byte cost and distortion-reduction
    /// estimate, in coding order, for T2 rate control to truncate against.
    fn encode_block(
        &mut self,
        coefficients: &[i32],
        width: u32,
        height: u32,
        orientation: SubbandOrientation,
        max_bit_plane: u8,
    ) -> (Vec<u8>, Vec<PassInfo>);

    /// Decodes a compressed byte stream back into `width * height`
    /// coefficients. `pass_lengths` gives the byte length of each
    /// per-pass-terminated segment present in `compressed`, in coding order.
    fn decode_block(
        &mut self,
        compressed: &[u8],
        width: u32,
        height: u32,
        orientation: SubbandOrientation,
        max_bit_plane: u8,
        pass_lengths: &[u32],
    ) -> Result<Vec<i32>, J2kError>;
}

pub struct EbcotBlockCoder;

impl BlockCoder for EbcotBlockCoder {
    fn encode_block(
        &mut self,
        coefficients: &[i32],
        width: u32,
        height: u32,
        orientation: SubbandOrientation,
        max_bit_plane: u8,
    ) -> (Vec<u8>, Vec<PassInfo>) {
        let mut coder = super::bit_plane_coder::BitPlaneCoder::new(width, height, orientation);
        coder.encode_codeblock(coefficients, max_bit_plane)
    }

    fn decode_block(
        &mut self,
        compressed: &[u8],
        width: u32,
        height: u32,
        orientation: SubbandOrientation,
        max_bit_plane: u8,
        pass_lengths: &[u32],
    ) -> Result<Vec<i32>, J2kError> {
        let mut coder = super::bit_plane_coder::BitPlaneCoder::new(width, height, orientation);
        coder.decode_codeblock(compressed, max_bit_plane, pass_lengths)
    }
}

pub struct HtBlockCoder;

impl BlockCoder for HtBlockCoder {
    /// HTJ2K's MEL/MagSgn path codes a whole block as one unit (no
    /// per-pass termination), so it always reports exactly one pass: the
    /// budget/convex-hull machinery in `rate_control` already always
    /// includes a block's first pass unconditionally, which for HTJ2K means
    /// "included or not" rather than truncated mid-block.
    fn encode_block(
        &mut self,
        coefficients: &[i32],
        _width: u32,
        _height: u32,
        _orientation: SubbandOrientation,
        max_bit_plane: u8,
    ) -> (Vec<u8>, Vec<PassInfo>) {
        let bytes = super::ht_block_coder::encoder::HTBlockEncoder::new().encode(coefficients, max_bit_plane);
        let energy: f64 = coefficients.iter().map(|&v| (v as f64) * (v as f64)).sum();
        let passes = vec![PassInfo { rate: bytes.len() as u32, distortion_reduction: energy }];
        (bytes, passes)
    }

    fn decode_block(
        &mut self,
        compressed: &[u8],
        width: u32,
        height: u32,
        _orientation: SubbandOrientation,
        max_bit_plane: u8,
        _pass_lengths: &[u32],
    ) -> Result<Vec<i32>, J2kError> {
        super::ht_block_coder::coder::HTBlockCoder::new(width as usize, height as usize)
            .decode(compressed, max_bit_plane)
    }
}

/// Picks the block coder for a tile from the CAP marker (Part 15 signalling).
pub fn block_coder_for(is_htj2k: bool) -> Box<dyn BlockCoder> {
    if is_htj2k {
        Box::new(HtBlockCoder)
    } else {
        Box::new(EbcotBlockCoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ebcot_path_roundtrips_through_the_trait_object() {
        let data = vec![5, 0, 0, -3, 0, 0, 0, 0, 1];
        let mut coder = block_coder_for(false);
        let (bytes, passes) = coder.encode_block(&data, 3, 3, SubbandOrientation::LL, 4);
        let pass_lengths: Vec<u32> = passes.iter().map(|p| p.rate).collect();
        let out = coder
            .decode_block(&bytes, 3, 3, SubbandOrientation::LL, 4, &pass_lengths)
            .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn ht_path_reports_a_single_whole_block_pass() {
        let data = vec![5, 0, 0, -3, 0, 0, 0, 0, 1];
        let mut coder = block_coder_for(true);
        let (bytes, passes) = coder.encode_block(&data, 3, 3, SubbandOrientation::LL, 4);
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].rate, bytes.len() as u32);
        let out = coder.decode_block(&bytes, 3, 3, SubbandOrientation::LL, 4, &[]).unwrap();
        assert_eq!(out, data);
    }
}
