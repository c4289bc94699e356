//! EBCOT Tier-1: bit-plane coding of a single code-block (ISO/IEC 15444-1
//! Annex D), driven by the MQ arithmetic coder over 19 adaptive contexts:
//! ZC (0-8, zero coding, one of three tables chosen by subband orientation),
//! SC (9-13, sign coding), MR (14-16, magnitude refinement), RL (17,
//! run-length) and UNI (18, near-uniform, used for run-length pointer bits).
//!
//! Each bit-plane is coded in three passes over the block in 4-row stripes,
//! columns inner: significance propagation (only for samples with at least
//! one significant neighbor), magnitude refinement (already-significant
//! samples), and cleanup (everything else, with run-length coding for
//! all-insignificant, no-neighbor 4-sample columns).

use super::image::SubbandOrientation;
use super::mq_coder::MqCoder;
use super::rate_control::PassInfo;

const SIG: u8 = 1 << 0;
const VISITED: u8 = 1 << 1;
const REFINED: u8 = 1 << 2;
const SIGN: u8 = 1 << 3;

pub const NUM_CONTEXTS: usize = 19;
const CX_RUN_LENGTH: usize = 17;
const CX_UNIFORM: usize = 18;

pub struct BitPlaneCoder {
    width: u32,
    height: u32,
    orientation: SubbandOrientation,
    state: Vec<u8>,
    mq: MqCoder,
    /// Squared-error weight of the bit-plane currently being coded, used to
    /// accumulate each pass's distortion-reduction estimate.
    pass_weight: f64,
    pass_distortion: f64,
}

impl BitPlaneCoder {
    pub fn new(width: u32, height: u32, orientation: SubbandOrientation) -> Self {
        let size = (width * height) as usize;
        let mut mq = MqCoder::new();
        mq.init_contexts(NUM_CONTEXTS);
        mq.set_context(CX_UNIFORM, 46, 0);
        mq.set_context(CX_RUN_LENGTH, 3, 0);
        Self {
            width,
            height,
            orientation,
            state: vec![0; size],
            mq,
            pass_weight: 0.0,
            pass_distortion: 0.0,
        }
    }

    fn idx(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            None
        } else {
            Some((y as u32 * self.width + x as u32) as usize)
        }
    }

    fn is_sig(&self, x: i32, y: i32) -> bool {
        self.idx(x, y)
            .map(|i| self.state[i] & SIG != 0)
            .unwrap_or(false)
    }

    fn sign_of(&self, x: i32, y: i32) -> i32 {
        match self.idx(x, y) {
            Some(i) if self.state[i] & SIG != 0 => {
                if self.state[i] & SIGN != 0 {
                    -1
                } else {
                    1
                }
            }
            _ => 0,
        }
    }

    /// Horizontal/vertical/diagonal significant-neighbor counts (Annex D.3.1).
    fn neighbor_counts(&self, x: i32, y: i32) -> (u8, u8, u8) {
        let h = self.is_sig(x - 1, y) as u8 + self.is_sig(x + 1, y) as u8;
        let v = self.is_sig(x, y - 1) as u8 + self.is_sig(x, y + 1) as u8;
        let d = self.is_sig(x - 1, y - 1) as u8
            + self.is_sig(x + 1, y - 1) as u8
            + self.is_sig(x - 1, y + 1) as u8
            + self.is_sig(x + 1, y + 1) as u8;
        (h, v, d)
    }

    fn any_neighbor_significant(&self, x: i32, y: i32) -> bool {
        let (h, v, d) = self.neighbor_counts(x, y);
        h > 0 || v > 0 || d > 0
    }

    /// Zero-coding context, Tables D.1 (LL/LH), D.2 (HL) and D.3 (HH).
    fn zc_context(&self, x: i32, y: i32) -> usize {
        let (h, v, d) = self.neighbor_counts(x, y);
        match self.orientation {
            SubbandOrientation::LL | SubbandOrientation::LH => Self::zc_table_hv(h, v, d),
            SubbandOrientation::HL => Self::zc_table_hv(v, h, d),
            SubbandOrientation::HH => Self::zc_table_hh(h, v, d),
        }
    }

    fn zc_table_hv(h: u8, v: u8, d: u8) -> usize {
        match (h, v, d) {
            (2, _, _) => 8,
            (1, v, _) if v >= 1 => 7,
            (1, 0, d) if d >= 1 => 6,
            (1, 0, 0) => 5,
            (0, 2, _) => 4,
            (0, 1, _) => 3,
            (0, 0, d) if d >= 2 => 2,
            (0, 0, 1) => 1,
            _ => 0,
        }
    }

    fn zc_table_hh(h: u8, v: u8, d: u8) -> usize {
        let hv = h + v;
        match (d, hv) {
            (d, _) if d >= 3 => 8,
            (2, hv) if hv >= 1 => 7,
            (2, 0) => 6,
            (1, hv) if hv >= 2 => 5,
            (1, 1) => 4,
            (1, 0) => 3,
            (0, hv) if hv >= 2 => 2,
            (0, 1) => 1,
            _ => 0,
        }
    }

    /// Sign-coding context and expected-sign XOR bit (Annex D.3.2 Table D.4).
    fn sc_context(&self, x: i32, y: i32) -> (usize, u8) {
        let h_contrib = self.sign_of(x - 1, y) + self.sign_of(x + 1, y);
        let v_contrib = self.sign_of(x, y - 1) + self.sign_of(x, y + 1);
        let h = h_contrib.clamp(-1, 1);
        let v = v_contrib.clamp(-1, 1);
        match (h, v) {
            (1, 1) => (13, 0),
            (1, 0) => (12, 0),
            (1, -1) => (11, 0),
            (0, 1) => (10, 0),
            (0, 0) => (9, 0),
            (0, -1) => (10, 1),
            (-1, 1) => (11, 1),
            (-1, 0) => (12, 1),
            (-1, -1) => (13, 1),
            _ => unreachable!(),
        }
    }

    /// Magnitude-refinement context (Annex D.3.3 Table D.5).
    fn mr_context(&self, x: i32, y: i32) -> usize {
        let idx = self.idx(x, y).expect("in-bounds sample");
        if self.state[idx] & REFINED != 0 {
            16
        } else if self.any_neighbor_significant(x, y) {
            15
        } else {
            14
        }
    }

    // ---- Encoder ----

    /// Encodes `data` (coefficient magnitudes with sign) from bit-plane
    /// `max_bit_plane` down to 0, terminating the MQ codeword after every
    /// coding pass (Annex D.4.2 TERMALL) so T2 rate control can truncate at
    /// an exact per-pass byte boundary. Returns the concatenated byte stream
    /// plus each pass's incremental byte cost and distortion-reduction
    /// estimate, in coding order (significance, refinement, cleanup per
    /// bit-plane, high to low).
    pub fn encode_codeblock(&mut self, data: &[i32], max_bit_plane: u8) -> (Vec<u8>, Vec<PassInfo>) {
        let mut passes = Vec::with_capacity(3 * (max_bit_plane as usize + 1));
        let mut prev_len = 0u32;
        for bp in (0..=max_bit_plane).rev() {
            for s in &mut self.state {
                *s &= !VISITED;
            }
            self.pass_weight = ((1u64 << bp) * (1u64 << bp)) as f64;

            self.begin_pass();
            self.encode_significance_propagation(data, bp);
            passes.push(self.finish_pass(&mut prev_len));

            self.begin_pass();
            self.encode_magnitude_refinement(data, bp);
            passes.push(self.finish_pass(&mut prev_len));

            self.begin_pass();
            self.encode_cleanup(data, bp);
            passes.push(self.finish_pass(&mut prev_len));
        }
        (self.mq.get_buffer().to_vec(), passes)
    }

    fn begin_pass(&mut self) {
        self.mq.reset_pass_bits();
        self.pass_distortion = 0.0;
    }

    /// Terminates the just-coded pass (unless it coded nothing, in which
    /// case there's no codeword to cut) and returns its incremental
    /// byte/distortion contribution.
    fn finish_pass(&mut self, prev_len: &mut u32) -> PassInfo {
        if self.mq.pass_bits() == 0 {
            return PassInfo { rate: 0, distortion_reduction: 0.0 };
        }
        self.mq.terminate_pass();
        let total = self.mq.get_buffer().len() as u32;
        let rate = total - *prev_len;
        *prev_len = total;
        PassInfo { rate, distortion_reduction: self.pass_distortion }
    }

    fn encode_significance_propagation(&mut self, data: &[i32], bp: u8) {
        let (w, h) = (self.width, self.height);
        for y0 in (0..h).step_by(4) {
            let rows = 4.min(h - y0);
            for x in 0..w {
                for dy in 0..rows {
                    let y = y0 + dy;
                    let idx = (y * w + x) as usize;
                    if self.state[idx] & (SIG | VISITED) != 0 {
                        continue;
                    }
                    if !self.any_neighbor_significant(x as i32, y as i32) {
                        continue;
                    }
                    self.encode_significance_bit(data, x, y, idx, bp);
                    self.state[idx] |= VISITED;
                }
            }
        }
    }

    fn encode_significance_bit(&mut self, data: &[i32], x: u32, y: u32, idx: usize, bp: u8) {
        let val = data[idx];
        let bit = ((val.unsigned_abs() >> bp) & 1) as u8;
        let cx = self.zc_context(x as i32, y as i32);
        self.mq.encode(bit, cx);
        if bit == 1 {
            self.state[idx] |= SIG;
            self.pass_distortion += self.pass_weight;
            let sign = (val < 0) as u8;
            if sign == 1 {
                self.state[idx] |= SIGN;
            }
            let (sc_cx, xor) = self.sc_context(x as i32, y as i32);
            self.mq.encode(sign ^ xor, sc_cx);
        }
    }

    fn encode_magnitude_refinement(&mut self, data: &[i32], bp: u8) {
        let (w, h) = (self.width, self.height);
        for y in 0..h {
            for x in 0..w {
                let idx = (y * w + x) as usize;
                if self.state[idx] & SIG == 0 || self.state[idx] & VISITED != 0 {
                    continue;
                }
                let mr_cx = self.mr_context(x as i32, y as i32);
                self.state[idx] |= VISITED;
                let bit = ((data[idx].unsigned_abs() >> bp) & 1) as u8;
                self.mq.encode(bit, mr_cx);
                self.pass_distortion += self.pass_weight;
                self.state[idx] |= REFINED;
            }
        }
    }

    fn encode_cleanup(&mut self, data: &[i32], bp: u8) {
        let (w, h) = (self.width, self.height);
        for y0 in (0..h).step_by(4) {
            let rows = 4.min(h - y0);
            for x in 0..w {
                if rows == 4 && self.column_run_eligible(x, y0) {
                    let any_significant = (0..4).any(|dy| {
                        let y = y0 + dy;
                        let idx = (y * w + x) as usize;
                        (data[idx].unsigned_abs() >> bp) & 1 != 0
                    });
                    self.mq.encode(any_significant as u8, CX_RUN_LENGTH);
                    if !any_significant {
                        for dy in 0..4 {
                            let idx = ((y0 + dy) * w + x) as usize;
                            self.state[idx] &= !VISITED;
                        }
                        continue;
                    }
                    let first = (0..4)
                        .find(|&dy| {
                            let idx = ((y0 + dy) * w + x) as usize;
                            (data[idx].unsigned_abs() >> bp) & 1 != 0
                        })
                        .unwrap();
                    self.mq.write_uniform(first as u32, 2, CX_UNIFORM);
                    for dy in 0..4 {
                        let y = y0 + dy;
                        let idx = (y * w + x) as usize;
                        if dy < first {
                            continue;
                        }
                        if dy == first {
                            self.state[idx] |= SIG;
                            self.pass_distortion += self.pass_weight;
                            let val = data[idx];
                            let sign = (val < 0) as u8;
                            if sign == 1 {
                                self.state[idx] |= SIGN;
                            }
                            let (sc_cx, xor) = self.sc_context(x as i32, y as i32);
                            self.mq.encode(sign ^ xor, sc_cx);
                        } else {
                            self.encode_significance_bit(data, x, y, idx, bp);
                        }
                    }
                    continue;
                }
                for dy in 0..rows {
                    let y = y0 + dy;
                    let idx = (y * w + x) as usize;
                    if self.state[idx] & VISITED != 0 {
                        continue;
                    }
                    self.encode_significance_bit(data, x, y, idx, bp);
                }
            }
        }
        for s in &mut self.state {
            *s &= !VISITED;
        }
    }

    fn column_run_eligible(&self, x: u32, y0: u32) -> bool {
        (0..4).all(|dy| {
            let y = y0 + dy;
            let idx = (y * self.width + x) as usize;
            self.state[idx] & (SIG | VISITED) == 0
                && !self.any_neighbor_significant(x as i32, y as i32)
        })
    }

    // ---- Decoder ----

    /// Decodes a per-pass-terminated byte stream. `pass_lengths` gives each
    /// pass's incremental byte count in the same order `encode_codeblock`
    /// produced them; a pass whose length is 0 coded nothing and is skipped
    /// without touching the MQ decoder (mirroring the encoder skipping
    /// termination for it).
    pub fn decode_codeblock(
        &mut self,
        compressed: &[u8],
        max_bit_plane: u8,
        pass_lengths: &[u32],
    ) -> Result<Vec<i32>, super::super::error::J2kError> {
        let size = (self.width * self.height) as usize;
        let mut out = vec![0i32; size];
        let mut cursor = 0usize;
        let mut pass_idx = 0usize;

        for bp in (0..=max_bit_plane).rev() {
            for s in &mut self.state {
                *s &= !VISITED;
            }

            cursor = self.start_pass(compressed, cursor, pass_lengths, &mut pass_idx);
            self.decode_significance_propagation(bp, &mut out);

            cursor = self.start_pass(compressed, cursor, pass_lengths, &mut pass_idx);
            self.decode_magnitude_refinement(bp, &mut out);

            cursor = self.start_pass(compressed, cursor, pass_lengths, &mut pass_idx);
            self.decode_cleanup(bp, &mut out);
        }
        Ok(out)
    }

    /// Re-initializes the MQ decoder on the next pass's byte slice (if it
    /// coded anything), leaving `contexts` untouched, and returns the
    /// advanced cursor.
    fn start_pass(&mut self, compressed: &[u8], cursor: usize, pass_lengths: &[u32], pass_idx: &mut usize) -> usize {
        let len = pass_lengths.get(*pass_idx).copied().unwrap_or(0) as usize;
        *pass_idx += 1;
        if len == 0 {
            return cursor;
        }
        let end = (cursor + len).min(compressed.len());
        self.mq.init_decoder(&compressed[cursor..end]);
        end
    }

    fn apply_significance_bit(&mut self, x: u32, y: u32, idx: usize, bp: u8, out: &mut [i32]) -> u8 {
        let cx = self.zc_context(x as i32, y as i32);
        let bit = self.mq.decode_bit(cx);
        if bit == 1 {
            self.state[idx] |= SIG;
            let (sc_cx, xor) = self.sc_context(x as i32, y as i32);
            let coded = self.mq.decode_bit(sc_cx);
            let sign = coded ^ xor;
            if sign == 1 {
                self.state[idx] |= SIGN;
            }
            out[idx] = 1 << bp;
        }
        bit
    }

    fn decode_significance_propagation(&mut self, bp: u8, out: &mut [i32]) {
        let (w, h) = (self.width, self.height);
        for y0 in (0..h).step_by(4) {
            let rows = 4.min(h - y0);
            for x in 0..w {
                for dy in 0..rows {
                    let y = y0 + dy;
                    let idx = (y * w + x) as usize;
                    if self.state[idx] & (SIG | VISITED) != 0 {
                        continue;
                    }
                    if !self.any_neighbor_significant(x as i32, y as i32) {
                        continue;
                    }
                    self.apply_significance_bit(x, y, idx, bp, out);
                    self.state[idx] |= VISITED;
                }
            }
        }
    }

    fn decode_magnitude_refinement(&mut self, bp: u8, out: &mut [i32]) {
        let (w, h) = (self.width, self.height);
        for y in 0..h {
            for x in 0..w {
                let idx = (y * w + x) as usize;
                if self.state[idx] & SIG == 0 || self.state[idx] & VISITED != 0 {
                    continue;
                }
                let mr_cx = self.mr_context(x as i32, y as i32);
                self.state[idx] |= VISITED;
                let bit = self.mq.decode_bit(mr_cx);
                if bit != 0 {
                    let sign = if self.state[idx] & SIGN != 0 { -1 } else { 1 };
                    out[idx] += sign * (1 << bp);
                }
                self.state[idx] |= REFINED;
            }
        }
    }

    fn decode_cleanup(&mut self, bp: u8, out: &mut [i32]) {
        let (w, h) = (self.width, self.height);
        for y0 in (0..h).step_by(4) {
            let rows = 4.min(h - y0);
            for x in 0..w {
                if rows == 4 && self.column_run_eligible(x, y0) {
                    let any_significant = self.mq.decode_bit(CX_RUN_LENGTH);
                    if any_significant == 0 {
                        continue;
                    }
                    let first = self.mq.read_uniform(2, CX_UNIFORM);
                    for dy in 0..4u32 {
                        let y = y0 + dy;
                        let idx = (y * w + x) as usize;
                        if dy < first {
                            continue;
                        }
                        if dy == first {
                            self.state[idx] |= SIG;
                            let (sc_cx, xor) = self.sc_context(x as i32, y as i32);
                            let coded = self.mq.decode_bit(sc_cx);
                            let sign = coded ^ xor;
                            if sign == 1 {
                                self.state[idx] |= SIGN;
                            }
                            out[idx] = 1 << bp;
                        } else {
                            self.apply_significance_bit(x, y, idx, bp, out);
                        }
                    }
                    continue;
                }
                for dy in 0..rows {
                    let y = y0 + dy;
                    let idx = (y * w + x) as usize;
                    if self.state[idx] & VISITED != 0 {
                        continue;
                    }
                    self.apply_significance_bit(x, y, idx, bp, out);
                }
            }
        }
        for s in &mut self.state {
            *s &= !VISITED;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass_lengths(passes: &[PassInfo]) -> Vec<u32> {
        passes.iter().map(|p| p.rate).collect()
    }

    #[test]
    fn single_coefficient_roundtrips() {
        let data = vec![0, 0, 0, 0, 0, 42, 0, 0, 0];
        let mut enc = BitPlaneCoder::new(3, 3, SubbandOrientation::LL);
        let (bytes, passes) = enc.encode_codeblock(&data, 6);

        let mut dec = BitPlaneCoder::new(3, 3, SubbandOrientation::LL);
        let out = dec.decode_codeblock(&bytes, 6, &pass_lengths(&passes)).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn sparse_block_roundtrips() {
        let data = vec![10, 0, 0, 0, 0, 5, 0, 0, 0, 0, -3, 0, 0, 0, 0, 1];
        let mut enc = BitPlaneCoder::new(4, 4, SubbandOrientation::LH);
        let (bytes, passes) = enc.encode_codeblock(&data, 5);

        let mut dec = BitPlaneCoder::new(4, 4, SubbandOrientation::LH);
        let out = dec.decode_codeblock(&bytes, 5, &pass_lengths(&passes)).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn dense_block_roundtrips_across_orientations() {
        let data: Vec<i32> = (0..64).map(|i| ((i as i32 * 7) % 23) - 11).collect();
        for orientation in [
            SubbandOrientation::LL,
            SubbandOrientation::HL,
            SubbandOrientation::LH,
            SubbandOrientation::HH,
        ] {
            let mut enc = BitPlaneCoder::new(8, 8, orientation);
            let (bytes, passes) = enc.encode_codeblock(&data, 5);
            let mut dec = BitPlaneCoder::new(8, 8, orientation);
            let out = dec.decode_codeblock(&bytes, 5, &pass_lengths(&passes)).unwrap();
            assert_eq!(out, data, "orientation {orientation:?}");
        }
    }

    #[test]
    fn all_zero_block_produces_minimal_output() {
        let data = vec![0; 16];
        let mut enc = BitPlaneCoder::new(4, 4, SubbandOrientation::HH);
        let (bytes, passes) = enc.encode_codeblock(&data, 4);
        let mut dec = BitPlaneCoder::new(4, 4, SubbandOrientation::HH);
        let out = dec.decode_codeblock(&bytes, 4, &pass_lengths(&passes)).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn per_pass_lengths_sum_to_the_full_buffer() {
        let data: Vec<i32> = (0..64).map(|i| ((i as i32 * 11) % 29) - 14).collect();
        let mut enc = BitPlaneCoder::new(8, 8, SubbandOrientation::LH);
        let (bytes, passes) = enc.encode_codeblock(&data, 5);
        let total: u32 = passes.iter().map(|p| p.rate).sum();
        assert_eq!(total, bytes.len() as u32);
        assert!(passes.iter().any(|p| p.distortion_reduction > 0.0));
    }
}
