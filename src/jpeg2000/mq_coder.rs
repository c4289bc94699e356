//! MQ arithmetic coder (ISO/IEC 15444-1 Annex C).
//!
//! Follows the widely used renormalization convention (matching the
//! probability-estimation state machine of Table C-2 and the conditional
//! exchange rule of C.3.2/C.2.6): MPS occupies the lower `[0, A-Qe)`
//! sub-interval and LPS the upper `[A-Qe, A)`, so the encoder adds `A` to
//! `C` on a non-exchanged LPS and the decoder compares `Chigh` against the
//! post-subtraction `A`.

use log::trace;

#[derive(Clone, Copy)]
struct MqContextState {
    qe: u16,
    nmps: u8,
    nlps: u8,
    switch: u8,
}

/// ISO/IEC 15444-1 Table C-2, the standard 47-state Qe table.
const MQ_TABLE: [MqContextState; 47] = [
    MqContextState { qe: 0x5601, nmps: 1, nlps: 1, switch: 1 },
    MqContextState { qe: 0x3401, nmps: 2, nlps: 6, switch: 0 },
    MqContextState { qe: 0x1801, nmps: 3, nlps: 9, switch: 0 },
    MqContextState { qe: 0x0AC1, nmps: 4, nlps: 12, switch: 0 },
    MqContextState { qe: 0x0521, nmps: 5, nlps: 29, switch: 0 },
    MqContextState { qe: 0x0221, nmps: 38, nlps: 33, switch: 0 },
    MqContextState { qe: 0x5601, nmps: 7, nlps: 6, switch: 1 },
    MqContextState { qe: 0x5401, nmps: 8, nlps: 14, switch: 0 },
    MqContextState { qe: 0x4801, nmps: 9, nlps: 14, switch: 0 },
    MqContextState { qe: 0x3801, nmps: 10, nlps: 14, switch: 0 },
    MqContextState { qe: 0x3001, nmps: 11, nlps: 17, switch: 0 },
    MqContextState { qe: 0x2401, nmps: 12, nlps: 18, switch: 0 },
    MqContextState { qe: 0x1C01, nmps: 13, nlps: 20, switch: 0 },
    MqContextState { qe: 0x1601, nmps: 29, nlps: 21, switch: 0 },
    MqContextState { qe: 0x5601, nmps: 15, nlps: 14, switch: 1 },
    MqContextState { qe: 0x5401, nmps: 16, nlps: 14, switch: 0 },
    MqContextState { qe: 0x5101, nmps: 17, nlps: 15, switch: 0 },
    MqContextState { qe: 0x4801, nmps: 18, nlps: 16, switch: 0 },
    MqContextState { qe: 0x3801, nmps: 19, nlps: 17, switch: 0 },
    MqContextState { qe: 0x3401, nmps: 20, nlps: 18, switch: 0 },
    MqContextState { qe: 0x3001, nmps: 21, nlps: 19, switch: 0 },
    MqContextState { qe: 0x2801, nmps: 22, nlps: 19, switch: 0 },
    MqContextState { qe: 0x2401, nmps: 23, nlps: 19, switch: 0 },
    MqContextState { qe: 0x2201, nmps: 24, nlps: 19, switch: 0 },
    MqContextState { qe: 0x1C01, nmps: 25, nlps: 20, switch: 0 },
    MqContextState { qe: 0x1801, nmps: 26, nlps: 21, switch: 0 },
    MqContextState { qe: 0x1601, nmps: 27, nlps: 22, switch: 0 },
    MqContextState { qe: 0x1401, nmps: 28, nlps: 23, switch: 0 },
    MqContextState { qe: 0x1201, nmps: 29, nlps: 24, switch: 0 },
    MqContextState { qe: 0x1101, nmps: 30, nlps: 25, switch: 0 },
    MqContextState { qe: 0x0AC1, nmps: 31, nlps: 26, switch: 0 },
    MqContextState { qe: 0x09C1, nmps: 32, nlps: 27, switch: 0 },
    MqContextState { qe: 0x08A1, nmps: 33, nlps: 28, switch: 0 },
    MqContextState { qe: 0x0521, nmps: 34, nlps: 29, switch: 0 },
    MqContextState { qe: 0x0441, nmps: 35, nlps: 30, switch: 0 },
    MqContextState { qe: 0x02A1, nmps: 36, nlps: 31, switch: 0 },
    MqContextState { qe: 0x0221, nmps: 37, nlps: 32, switch: 0 },
    MqContextState { qe: 0x0141, nmps: 38, nlps: 33, switch: 0 },
    MqContextState { qe: 0x0111, nmps: 39, nlps: 34, switch: 0 },
    MqContextState { qe: 0x0085, nmps: 40, nlps: 35, switch: 0 },
    MqContextState { qe: 0x0049, nmps: 41, nlps: 36, switch: 0 },
    MqContextState { qe: 0x0025, nmps: 42, nlps: 37, switch: 0 },
    MqContextState { qe: 0x0015, nmps: 43, nlps: 38, switch: 0 },
    MqContextState { qe: 0x0009, nmps: 44, nlps: 39, switch: 0 },
    MqContextState { qe: 0x0005, nmps: 45, nlps: 40, switch: 0 },
    MqContextState { qe: 0x0001, nmps: 45, nlps: 41, switch: 0 },
    MqContextState { qe: 0x5601, nmps: 46, nlps: 46, switch: 0 },
];

pub struct MqCoder {
    a: u16,
    c: u32,

    bp: Vec<u8>,
    ct: u8,

    source: Vec<u8>,
    src_pos: usize,

    contexts: Vec<u8>,

    /// Number of `encode`/`decode_bit` calls since the last
    /// [`reset_pass_bits`](Self::reset_pass_bits), used to tell an empty
    /// coding pass (nothing to terminate) from one that coded real bits.
    pass_bits: u32,
}

impl Default for MqCoder {
    fn default() -> Self {
        Self {
            a: 0x8000,
            c: 0,
            bp: Vec::new(),
            ct: 12,
            contexts: vec![0; 19],
            source: Vec::new(),
            src_pos: 0,
            pass_bits: 0,
        }
    }
}

impl MqCoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init_contexts(&mut self, size: usize) {
        self.contexts = vec![0; size];
    }

    /// Sets context `cx` to state `state_idx` (an index into Table C-2)
    /// with the given initial MPS value, per Table C-1's preset contexts.
    pub fn set_context(&mut self, cx: usize, state_idx: u8, mps: u8) {
        if cx < self.contexts.len() {
            self.contexts[cx] = (state_idx << 1) | (mps & 1);
        }
    }

    pub fn init_decoder(&mut self, data: &[u8]) {
        self.source = data.to_vec();
        self.src_pos = 0;
        self.ct = 0;

        self.c = if data.is_empty() {
            0xFF << 16
        } else {
            (data[0] as u32) << 16
        };

        self.byte_in();
        self.c <<= 7;
        self.ct = self.ct.saturating_sub(7);
        self.a = 0x8000;
    }

    fn byte_in(&mut self) {
        if self.src_pos >= self.source.len() {
            trace!("byte_in: end of stream at {}, injecting 0xFF00", self.src_pos);
            self.c += 0xFF00;
            self.ct = 8;
            return;
        }

        let current = self.source[self.src_pos];
        if current == 0xFF {
            let next = self
                .source
                .get(self.src_pos + 1)
                .copied()
                .unwrap_or(0xFF);
            if next > 0x8F {
                trace!("byte_in: marker at {}, injecting 0xFF00", self.src_pos);
                self.c += 0xFF00;
                self.ct = 8;
            } else {
                self.src_pos += 1;
                self.c += (self.source[self.src_pos] as u32) << 9;
                self.ct = 7;
            }
        } else {
            self.src_pos += 1;
            if let Some(&byte) = self.source.get(self.src_pos) {
                self.c += (byte as u32) << 8;
                self.ct = 8;
            } else {
                self.c += 0xFF00;
                self.ct = 8;
            }
        }
    }

    /// Decodes one symbol in context `cx` (ISO C.3.2 `DECODE`).
    pub fn decode_bit(&mut self, cx: usize) -> u8 {
        self.pass_bits += 1;
        let ctx = self.contexts[cx];
        let idx = (ctx >> 1) as usize;
        let mps = ctx & 1;
        let qe = MQ_TABLE[idx].qe;

        trace!("decode cx={cx} idx={idx} mps={mps} qe={qe:#06x} a={:#06x}", self.a);

        self.a -= qe;
        let chigh = (self.c >> 16) as u16;

        let d;
        if chigh >= self.a {
            self.c -= (self.a as u32) << 16;
            if self.a < qe {
                d = mps;
                self.contexts[cx] = (MQ_TABLE[idx].nmps << 1) | mps;
            } else {
                d = 1 - mps;
                let switch = MQ_TABLE[idx].switch;
                let next_mps = if switch == 1 { 1 - mps } else { mps };
                self.contexts[cx] = (MQ_TABLE[idx].nlps << 1) | next_mps;
            }
            self.a = qe;
            self.renormalize_input();
            d
        } else if self.a < 0x8000 {
            if self.a < qe {
                d = 1 - mps;
                let switch = MQ_TABLE[idx].switch;
                let next_mps = if switch == 1 { 1 - mps } else { mps };
                self.contexts[cx] = (MQ_TABLE[idx].nlps << 1) | next_mps;
                self.a = qe;
            } else {
                d = mps;
                self.contexts[cx] = (MQ_TABLE[idx].nmps << 1) | mps;
            }
            self.renormalize_input();
            d
        } else {
            mps
        }
    }

    fn renormalize_input(&mut self) {
        loop {
            if self.ct == 0 {
                self.byte_in();
            }
            self.a <<= 1;
            self.c <<= 1;
            self.ct = self.ct.saturating_sub(1);
            if self.a >= 0x8000 {
                break;
            }
        }
    }

    /// Encodes symbol `d` in context `cx` (ISO C.2 `CODE0`/`CODE1`).
    pub fn encode(&mut self, d: u8, cx: usize) {
        self.pass_bits += 1;
        let ctx = self.contexts[cx];
        let idx = (ctx >> 1) as usize;
        let mps = ctx & 1;
        let qe = MQ_TABLE[idx].qe;

        trace!("encode cx={cx} d={d} idx={idx} mps={mps} qe={qe:#06x} a={:#06x}", self.a);

        self.a -= qe;

        if d == mps {
            if self.a < 0x8000 {
                if self.a < qe {
                    self.c += self.a as u32;
                    self.a = qe;
                }
                self.contexts[cx] = (MQ_TABLE[idx].nmps << 1) | mps;
                self.renormalize();
            }
        } else if qe > self.a {
            self.a = qe;
            let switch = MQ_TABLE[idx].switch;
            let next_mps = if switch == 1 { 1 - mps } else { mps };
            self.contexts[cx] = (MQ_TABLE[idx].nlps << 1) | next_mps;
            self.renormalize();
        } else {
            self.c += self.a as u32;
            self.a = qe;
            let switch = MQ_TABLE[idx].switch;
            let next_mps = if switch == 1 { 1 - mps } else { mps };
            self.contexts[cx] = (MQ_TABLE[idx].nlps << 1) | next_mps;
            self.renormalize();
        }
    }

    fn renormalize(&mut self) {
        loop {
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;
            if self.ct == 0 {
                self.byte_out();
                self.ct = 8;
            }
            if self.a >= 0x8000 {
                break;
            }
        }
    }

    fn byte_out(&mut self) {
        let b_out = (self.c >> 19) as u8;
        if b_out == 0xFF {
            self.ct = 7;
        }
        self.c &= 0x7FFFF;
        self.bp.push(b_out);
    }

    /// Flushes the final codeword (ISO C.2.9 `FLUSH`).
    pub fn flush(&mut self) {
        let temp = self.c + self.a as u32;
        self.c |= 0xFFFF;
        if self.c >= temp {
            self.c -= 0x8000;
        }

        for _ in 0..4 {
            self.c <<= self.ct;
            self.byte_out();
            if self.c == 0 {
                break;
            }
        }

        while self.bp.len() > 1 && *self.bp.last().unwrap_or(&0) == 0xFF {
            self.bp.pop();
        }
    }

    pub fn get_buffer(&self) -> &[u8] {
        &self.bp
    }

    /// Terminates the current coding pass's codeword (Annex D.4.2 TERMALL)
    /// and restarts the arithmetic coder for the next pass. `contexts` is
    /// left untouched, so probability state carries across the boundary —
    /// this is termination without context reset.
    pub fn terminate_pass(&mut self) {
        self.flush();
        self.a = 0x8000;
        self.c = 0;
        self.ct = 12;
    }

    /// Number of `encode`/`decode_bit` calls since the last
    /// [`reset_pass_bits`](Self::reset_pass_bits).
    pub fn pass_bits(&self) -> u32 {
        self.pass_bits
    }

    pub fn reset_pass_bits(&mut self) {
        self.pass_bits = 0;
    }

    /// Encodes the low `bits` bits of `value`, MSB first, each bit coded in
    /// context `cx` (used for the near-uniform run-length pointer, Annex
    /// D.4's `UNI` context).
    pub fn write_uniform(&mut self, value: u32, bits: u32, cx: usize) {
        for i in (0..bits).rev() {
            let bit = ((value >> i) & 1) as u8;
            self.encode(bit, cx);
        }
    }

    /// Inverse of [`write_uniform`].
    pub fn read_uniform(&mut self, bits: u32, cx: usize) -> u32 {
        let mut value = 0u32;
        for _ in 0..bits {
            value = (value << 1) | self.decode_bit(cx) as u32;
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_state() {
        let mq = MqCoder::new();
        assert_eq!(mq.a, 0x8000);
        assert_eq!(mq.ct, 12);
    }

    #[test]
    fn encode_renormalizes() {
        let mut mq = MqCoder::new();
        mq.init_contexts(5);
        mq.encode(0, 0);
        assert!(mq.a >= 0x8000);
    }

    #[test]
    fn encode_decode_roundtrip_single_context() {
        let mut enc = MqCoder::new();
        enc.init_contexts(3);
        let bits: Vec<u8> = vec![0, 0, 1, 0, 1, 1, 0, 1, 0, 0];
        for &b in &bits {
            enc.encode(b, 0);
        }
        enc.flush();
        let encoded = enc.get_buffer().to_vec();

        let mut dec = MqCoder::new();
        dec.init_contexts(3);
        dec.init_decoder(&encoded);
        let decoded: Vec<u8> = (0..bits.len()).map(|_| dec.decode_bit(0)).collect();
        assert_eq!(bits, decoded);
    }

    #[test]
    fn encode_decode_roundtrip_multi_context() {
        let mut enc = MqCoder::new();
        enc.init_contexts(19);
        enc.set_context(17, 3, 0);
        enc.set_context(18, 46, 0);

        let ops: Vec<(u8, usize)> = vec![(0, 17), (0, 17), (1, 17), (0, 17), (1, 18), (0, 18)];
        for &(bit, ctx) in &ops {
            enc.encode(bit, ctx);
        }
        enc.flush();
        let encoded = enc.get_buffer().to_vec();

        let mut dec = MqCoder::new();
        dec.init_contexts(19);
        dec.set_context(17, 3, 0);
        dec.set_context(18, 46, 0);
        dec.init_decoder(&encoded);

        for &(expected, ctx) in &ops {
            assert_eq!(dec.decode_bit(ctx), expected, "ctx {ctx}");
        }
    }

    #[test]
    fn long_run_roundtrips_with_renormalization_cascades() {
        let mut enc = MqCoder::new();
        enc.init_contexts(1);
        let bits: Vec<u8> = (0..500).map(|i| ((i * 37) % 7 == 0) as u8).collect();
        for &b in &bits {
            enc.encode(b, 0);
        }
        enc.flush();
        let encoded = enc.get_buffer().to_vec();

        let mut dec = MqCoder::new();
        dec.init_contexts(1);
        dec.init_decoder(&encoded);
        let decoded: Vec<u8> = (0..bits.len()).map(|_| dec.decode_bit(0)).collect();
        assert_eq!(bits, decoded);
    }
}
