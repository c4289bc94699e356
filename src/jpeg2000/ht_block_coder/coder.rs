//! HTJ2K (High-Throughput JPEG 2000) block decoder, the counterpart to
//! `encoder::HTBlockEncoder`'s simplified per-sample MEL/MagSgn scheme.

use super::mag_sgn::MagSgnDecoder;
use super::mel::MelDecoder;
use crate::error::J2kError;

pub struct HTBlockCoder {
    width: usize,
    height: usize,
}

impl HTBlockCoder {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn decode(&mut self, data: &[u8], max_bit_plane: u8) -> Result<Vec<i32>, J2kError> {
        if data.len() < 4 {
            return Err(J2kError::Truncated("HT block missing MagSgn length prefix".into()));
        }
        let magsgn_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        let rest = &data[4..];
        if magsgn_len > rest.len() {
            return Err(J2kError::MalformedStream("HT block MagSgn length out of range".into()));
        }
        let (magsgn_data, mel_data) = rest.split_at(magsgn_len);

        let mut mel = MelDecoder::new(mel_data);
        let mut magsgn = MagSgnDecoder::new(magsgn_data);
        let magnitude_bits = max_bit_plane as u8 + 1;

        let size = self.width * self.height;
        let mut out = vec![0i32; size];
        for sample in out.iter_mut() {
            if mel.decode() {
                let sign = magsgn
                    .read_bit()
                    .ok_or_else(|| J2kError::Truncated("MagSgn stream exhausted".into()))?;
                let magnitude = magsgn
                    .read_bits(magnitude_bits)
                    .ok_or_else(|| J2kError::Truncated("MagSgn stream exhausted".into()))?;
                *sample = if sign == 1 {
                    -(magnitude as i32)
                } else {
                    magnitude as i32
                };
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::super::encoder::HTBlockEncoder;
    use super::*;

    #[test]
    fn roundtrips_sparse_block() {
        let data = vec![0, 5, 0, -3, 0, 0, 1, 0, 0];
        let bytes = HTBlockEncoder::new().encode(&data, 5);
        let out = HTBlockCoder::new(3, 3).decode(&bytes, 5).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn roundtrips_all_zero_block() {
        let data = vec![0; 16];
        let bytes = HTBlockEncoder::new().encode(&data, 3);
        let out = HTBlockCoder::new(4, 4).decode(&bytes, 3).unwrap();
        assert_eq!(out, data);
    }
}
