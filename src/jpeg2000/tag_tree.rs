//! Tag tree coding (ISO/IEC 15444-1 Annex B.10.2), used for packet-header
//! inclusion and zero-bit-plane signalling.
//!
//! A tag tree over a `w x h` leaf grid stores, per node, the minimum value
//! of its children. Decoding a leaf against a `threshold` reveals, one
//! level at a time, whether the true value at that leaf is `< threshold`:
//! each level emits `1` bits while the running lower bound stays below the
//! node's true value and a final `0` once it's known, skipping levels
//! already resolved by a previous call at a lower threshold.

use super::bit_io::{J2kBitReader, J2kBitWriter};

const UNKNOWN: i32 = i32::MAX;

struct Level {
    width: usize,
    height: usize,
    /// Current known value per node (min of children), `UNKNOWN` until
    /// established at this level's resolution.
    values: Vec<i32>,
    /// Lower bound already proven to the decoder for this node.
    known_lower_bound: Vec<i32>,
}

pub struct TagTree {
    levels: Vec<Level>,
    width: usize,
    height: usize,
}

impl TagTree {
    pub fn new(width: usize, height: usize) -> Self {
        let mut levels = Vec::new();
        let (mut w, mut h) = (width.max(1), height.max(1));
        loop {
            levels.push(Level {
                width: w,
                height: h,
                values: vec![UNKNOWN; w * h],
                known_lower_bound: vec![0; w * h],
            });
            if w == 1 && h == 1 {
                break;
            }
            w = w.div_ceil(2);
            h = h.div_ceil(2);
        }
        Self {
            levels,
            width,
            height,
        }
    }

    /// Resets decode/encode progress (e.g. when moving to a new precinct)
    /// without discarding the leaf values set by `set_value`.
    pub fn reset(&mut self) {
        for level in &mut self.levels {
            for v in &mut level.known_lower_bound {
                *v = 0;
            }
        }
    }

    /// Sets the true leaf value used by `encode`, and propagates the min
    /// upward so internal nodes reflect Annex B.10.2's node values.
    pub fn set_value(&mut self, x: usize, y: usize, value: i32) {
        if self.levels.is_empty() {
            return;
        }
        self.levels[0].values[y * self.levels[0].width + x] = value;
        for i in 0..self.levels.len().saturating_sub(1) {
            let (lower, upper) = self.levels.split_at_mut(i + 1);
            let child = &lower[i];
            let parent = &mut upper[0];
            for py in 0..parent.height {
                for px in 0..parent.width {
                    let mut min = UNKNOWN;
                    for dy in 0..2 {
                        for dx in 0..2 {
                            let cx = px * 2 + dx;
                            let cy = py * 2 + dy;
                            if cx < child.width && cy < child.height {
                                min = min.min(child.values[cy * child.width + cx]);
                            }
                        }
                    }
                    parent.values[py * parent.width + px] = min;
                }
            }
        }
    }

    /// Decodes whether the leaf `(x, y)`'s value is `< threshold`.
    pub fn decode(
        &mut self,
        reader: &mut J2kBitReader,
        x: usize,
        y: usize,
        threshold: i32,
    ) -> Result<bool, super::bit_io::BitIoError> {
        let num_levels = self.levels.len();
        let (mut px, mut py) = (x, y);
        let mut path = Vec::with_capacity(num_levels);
        for _ in 0..num_levels {
            path.push((px, py));
            px /= 2;
            py /= 2;
        }

        let mut result = true;
        for depth in (0..num_levels).rev() {
            let (nx, ny) = path[depth];
            let level = &mut self.levels[depth];
            let idx = ny * level.width + nx;
            let mut lower = level.known_lower_bound[idx];
            if lower >= threshold {
                continue;
            }
            loop {
                if lower >= threshold {
                    level.known_lower_bound[idx] = lower;
                    result = false;
                    break;
                }
                let bit = reader.read_bit()?;
                if bit == 1 {
                    lower += 1;
                } else {
                    level.known_lower_bound[idx] = lower;
                    if level.values[idx] == UNKNOWN {
                        level.values[idx] = lower;
                    }
                    result = lower < threshold;
                    break;
                }
            }
            if !result {
                return Ok(false);
            }
        }
        Ok(result)
    }

    /// Encodes the bits that would make `decode` reveal the true value at
    /// `(x, y)` against `threshold`, using the value set via `set_value`.
    pub fn encode(&mut self, writer: &mut J2kBitWriter, x: usize, y: usize, threshold: i32) {
        let num_levels = self.levels.len();
        let (mut px, mut py) = (x, y);
        let mut path = Vec::with_capacity(num_levels);
        for _ in 0..num_levels {
            path.push((px, py));
            px /= 2;
            py /= 2;
        }

        for depth in (0..num_levels).rev() {
            let (nx, ny) = path[depth];
            let level = &mut self.levels[depth];
            let idx = ny * level.width + nx;
            let true_value = level.values[idx];
            let mut lower = level.known_lower_bound[idx];
            if lower >= threshold {
                continue;
            }
            while lower < true_value && lower < threshold {
                writer.write_bit(1);
                lower += 1;
            }
            if lower < threshold {
                writer.write_bit(0);
            }
            level.known_lower_bound[idx] = lower;
        }
    }

    /// Decodes the true integer value at `(x, y)` by probing increasing
    /// thresholds until it's revealed (Annex B.10.2's tag-tree decoding
    /// procedure, used directly for zero-bit-plane and Lblock counts rather
    /// than the < threshold boolean used for inclusion).
    pub fn decode_value(
        &mut self,
        reader: &mut J2kBitReader,
        x: usize,
        y: usize,
    ) -> Result<i32, super::bit_io::BitIoError> {
        let mut threshold = 1;
        loop {
            if self.decode(reader, x, y, threshold)? {
                return Ok(threshold - 1);
            }
            threshold += 1;
        }
    }

    /// Encodes the bits that reveal the value previously set via
    /// `set_value`, using the same threshold sequence as `decode_value`.
    pub fn encode_value(&mut self, writer: &mut J2kBitWriter, x: usize, y: usize, value: i32) {
        let mut threshold = 1;
        loop {
            self.encode(writer, x, y, threshold);
            if threshold - 1 >= value {
                break;
            }
            threshold += 1;
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_leaf_roundtrip() {
        let mut enc = TagTree::new(1, 1);
        enc.set_value(0, 0, 3);
        let mut w = J2kBitWriter::new();
        enc.encode(&mut w, 0, 0, 4);
        let bytes = w.finish();

        let mut dec = TagTree::new(1, 1);
        let mut r = J2kBitReader::new(&bytes);
        assert!(dec.decode(&mut r, 0, 0, 4).unwrap());
    }

    #[test]
    fn grid_roundtrip_with_progressive_thresholds() {
        let values = [[0, 2], [1, 3]];
        let mut enc = TagTree::new(2, 2);
        for y in 0..2 {
            for x in 0..2 {
                enc.set_value(x, y, values[y][x]);
            }
        }

        let mut w = J2kBitWriter::new();
        for threshold in 1..=4 {
            for y in 0..2 {
                for x in 0..2 {
                    enc.encode(&mut w, x, y, threshold);
                }
            }
        }
        let bytes = w.finish();

        let mut dec = TagTree::new(2, 2);
        let mut r = J2kBitReader::new(&bytes);
        let mut revealed = [[false; 2]; 2];
        for threshold in 1..=4 {
            for y in 0..2 {
                for x in 0..2 {
                    if !revealed[y][x] {
                        revealed[y][x] = dec.decode(&mut r, x, y, threshold).unwrap();
                    }
                }
            }
        }
        for y in 0..2 {
            for x in 0..2 {
                assert!(revealed[y][x], "leaf ({x},{y}) never revealed");
            }
        }
    }

    #[test]
    fn not_yet_included_stays_false_below_true_value() {
        let mut enc = TagTree::new(1, 1);
        enc.set_value(0, 0, 5);
        let mut w = J2kBitWriter::new();
        enc.encode(&mut w, 0, 0, 2);
        let bytes = w.finish();

        let mut dec = TagTree::new(1, 1);
        let mut r = J2kBitReader::new(&bytes);
        assert!(!dec.decode(&mut r, 0, 0, 2).unwrap());
    }
}
