//! HTJ2K (High-Throughput JPEG 2000) Block Encoder
//! Implements encoding for ISO/IEC 15444-15

/// MEL (Magnitude Exponent Logic) encoder
/// Encodes run-lengths of insignificant quads
pub struct MelEncoder {
    buffer: Vec<u8>,
    current_byte: u8,
    bits_in_byte: u8,
    k: i32, // State index (exponent)
}

impl MelEncoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            current_byte: 0,
            bits_in_byte: 0,
            k: 0,
        }
    }

    /// Write a single bit
    fn write_bit(&mut self, bit: u8) {
        self.current_byte = (self.current_byte << 1) | (bit & 1);
        self.bits_in_byte += 1;

        if self.bits_in_byte == 8 {
            // Handle 0xFF byte stuffing
            if self.current_byte == 0xFF {
                self.buffer.push(0xFF);
                self.buffer.push(0x00);
            } else {
                self.buffer.push(self.current_byte);
            }
            self.current_byte = 0;
            self.bits_in_byte = 0;
        }
    }

    /// Encode a MEL symbol (significant or not)
    /// Returns false if still in a run, true if this ends a run
    pub fn encode(&mut self, is_significant: bool) {
        if is_significant {
            // End of run - write 1, decrease k
            self.write_bit(1);
            self.k = (self.k - 1).max(0);
        } else {
            // Start/continue run - write 0, increase k
            self.write_bit(0);
            self.k = (self.k + 1).min(12);
        }
    }

    /// Flush remaining bits to buffer
    pub fn flush(&mut self) {
        if self.bits_in_byte > 0 {
            // Pad with zeros
            let padding = 8 - self.bits_in_byte;
            self.current_byte <<= padding;
            self.buffer.push(self.current_byte);
        }
    }

    /// Get the encoded buffer
    pub fn get_buffer(&self) -> &[u8] {
        &self.buffer
    }
}

impl Default for MelEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// MagSgn (Magnitude and Sign) encoder
/// Encodes sign bits and magnitude refinement bits
pub struct MagSgnEncoder {
    buffer: Vec<u8>,
    current_byte: u8,
    bits_in_byte: u8,
}

impl MagSgnEncoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            current_byte: 0,
            bits_in_byte: 0,
        }
    }

    /// Write a single bit
    pub fn write_bit(&mut self, bit: u8) {
        self.current_byte = (self.current_byte << 1) | (bit & 1);
        self.bits_in_byte += 1;

        if self.bits_in_byte == 8 {
            self.buffer.push(self.current_byte);
            self.current_byte = 0;
            self.bits_in_byte = 0;
        }
    }

    /// Write multiple bits (MSB first)
    pub fn write_bits(&mut self, value: u32, count: u8) {
        for i in (0..count).rev() {
            self.write_bit(((value >> i) & 1) as u8);
        }
    }

    /// Flush remaining bits to buffer
    pub fn flush(&mut self) {
        if self.bits_in_byte > 0 {
            let padding = 8 - self.bits_in_byte;
            self.current_byte <<= padding;
            self.buffer.push(self.current_byte);
        }
    }

    /// Get the encoded buffer
    pub fn get_buffer(&self) -> &[u8] {
        &self.buffer
    }
}

impl Default for MagSgnEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// High Throughput Block Encoder (HTJ2K Part 15), simplified to per-sample
/// (rather than per-quad/VLC) significance signalling: MEL still carries the
/// run-length-coded significance flags, MagSgn still carries sign and
/// magnitude, but each coefficient is visited individually instead of
/// through the quad/VLC context machinery of the full standard.
pub struct HTBlockEncoder {
    mel_encoder: MelEncoder,
    magsgn_encoder: MagSgnEncoder,
}

impl Default for HTBlockEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HTBlockEncoder {
    pub fn new() -> Self {
        Self {
            mel_encoder: MelEncoder::new(),
            magsgn_encoder: MagSgnEncoder::new(),
        }
    }

    /// Encodes `coefficients` (row-major) into a single framed byte buffer:
    /// a 4-byte big-endian length of the MagSgn segment, the MagSgn segment,
    /// then the MEL segment.
    pub fn encode(&mut self, coefficients: &[i32], max_bit_plane: u8) -> Vec<u8> {
        let magnitude_bits = max_bit_plane as u32 + 1;
        for &coeff in coefficients {
            let significant = coeff != 0;
            self.mel_encoder.encode(significant);
            if significant {
                self.magsgn_encoder.write_bit((coeff < 0) as u8);
                self.magsgn_encoder
                    .write_bits(coeff.unsigned_abs(), magnitude_bits as u8);
            }
        }
        self.mel_encoder.flush();
        self.magsgn_encoder.flush();

        let magsgn_data = self.magsgn_encoder.get_buffer();
        let mel_data = self.mel_encoder.get_buffer();

        let mut output = Vec::with_capacity(4 + magsgn_data.len() + mel_data.len());
        output.extend_from_slice(&(magsgn_data.len() as u32).to_be_bytes());
        output.extend_from_slice(magsgn_data);
        output.extend_from_slice(mel_data);
        output
    }
}
