//! Discrete Wavelet Transforms for JPEG 2000 (ISO/IEC 15444-1 Annex F).
//!
//! Both kernels are parity-aware: the caller passes the absolute grid
//! coordinate of the first sample (`x0`), because Annex F.3.8's symmetric
//! extension and the even/odd lattice split are defined relative to the
//! image/tile-component origin, not the local buffer index. A tile that
//! starts on an odd grid line decomposes differently than one that starts
//! on an even line, even for identical sample values.

fn reflect(i: i64, len: i64) -> i64 {
    if len <= 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let mut m = i % period;
    if m < 0 {
        m += period;
    }
    if m >= len { period - m } else { m }
}

/// 5/3 reversible integer wavelet (lossless path).
pub struct Dwt53;

impl Dwt53 {
    /// Forward transform of one row/column. `x0` is the absolute grid
    /// coordinate of `signal[0]`; splits into low-pass (even grid
    /// positions) and high-pass (odd grid positions) coefficients.
    pub fn forward_1d(signal: &[i32], x0: i64) -> (Vec<i32>, Vec<i32>) {
        let len = signal.len() as i64;
        if len == 0 {
            return (Vec::new(), Vec::new());
        }
        let at = |i: i64| -> i32 { signal[reflect(i, len) as usize] };
        let is_odd = |i: i64| (x0 + i).rem_euclid(2) == 1;

        let mut d = signal.to_vec();
        for i in 0..len {
            if is_odd(i) {
                d[i as usize] = signal[i as usize] - ((at(i - 1) + at(i + 1)) >> 1);
            }
        }
        let at_d = |i: i64| -> i32 { d[reflect(i, len) as usize] };
        let mut out = d.clone();
        for i in 0..len {
            if !is_odd(i) {
                out[i as usize] = d[i as usize] + ((at_d(i - 1) + at_d(i + 1) + 2) >> 2);
            }
        }

        let mut low = Vec::new();
        let mut high = Vec::new();
        for i in 0..len {
            if is_odd(i) {
                high.push(out[i as usize]);
            } else {
                low.push(out[i as usize]);
            }
        }
        (low, high)
    }

    /// Inverse of [`Self::forward_1d`]. `x0` must match the value used to
    /// produce `low`/`high`.
    pub fn inverse_1d(low: &[i32], high: &[i32], x0: i64, len: usize) -> Vec<i32> {
        let len = len as i64;
        let is_odd = |i: i64| (x0 + i).rem_euclid(2) == 1;

        let mut merged = vec![0i32; len as usize];
        let (mut li, mut hi) = (0usize, 0usize);
        for i in 0..len {
            if is_odd(i) {
                merged[i as usize] = high[hi];
                hi += 1;
            } else {
                merged[i as usize] = low[li];
                li += 1;
            }
        }

        let at = |m: &[i32], i: i64| -> i32 { m[reflect(i, len) as usize] };
        let mut s = merged.clone();
        for i in 0..len {
            if !is_odd(i) {
                s[i as usize] = merged[i as usize] - ((at(&merged, i - 1) + at(&merged, i + 1) + 2) >> 2);
            }
        }
        let mut out = s.clone();
        for i in 0..len {
            if is_odd(i) {
                out[i as usize] = s[i as usize] + ((at(&s, i - 1) + at(&s, i + 1)) >> 1);
            }
        }
        out
    }

    /// One-level forward 2D transform of a `w x h` buffer at grid origin
    /// `(x0, y0)`, rows then columns, returning `(ll, hl, lh, hh)`.
    pub fn forward_2d(
        data: &[i32],
        width: u32,
        height: u32,
        x0: u32,
        y0: u32,
    ) -> (Vec<i32>, Vec<i32>, Vec<i32>, Vec<i32>) {
        let (w, h) = (width as usize, height as usize);
        let mut low_rows = vec![0i32; w.div_ceil(2) * h];
        let mut high_rows = vec![0i32; (w / 2) * h];
        let low_w = w.div_ceil(2);
        let high_w = w / 2;

        for y in 0..h {
            let row = &data[y * w..(y + 1) * w];
            let (l, hi) = Self::forward_1d(row, x0 as i64);
            low_rows[y * low_w..y * low_w + l.len()].copy_from_slice(&l);
            high_rows[y * high_w..y * high_w + hi.len()].copy_from_slice(&hi);
        }

        let low_h = h.div_ceil(2);
        let high_h = h / 2;
        let mut ll = vec![0i32; low_w * low_h];
        let mut hl = vec![0i32; high_w * low_h];
        let mut lh = vec![0i32; low_w * high_h];
        let mut hh = vec![0i32; high_w * high_h];

        for x in 0..low_w {
            let col: Vec<i32> = (0..h).map(|y| low_rows[y * low_w + x]).collect();
            let (l, hi) = Self::forward_1d(&col, y0 as i64);
            for (y, v) in l.into_iter().enumerate() {
                ll[y * low_w + x] = v;
            }
            for (y, v) in hi.into_iter().enumerate() {
                lh[y * low_w + x] = v;
            }
        }
        for x in 0..high_w {
            let col: Vec<i32> = (0..h).map(|y| high_rows[y * high_w + x]).collect();
            let (l, hi) = Self::forward_1d(&col, y0 as i64);
            for (y, v) in l.into_iter().enumerate() {
                hl[y * high_w + x] = v;
            }
            for (y, v) in hi.into_iter().enumerate() {
                hh[y * high_w + x] = v;
            }
        }
        (ll, hl, lh, hh)
    }

    pub fn inverse_2d(
        ll: &[i32],
        hl: &[i32],
        lh: &[i32],
        hh: &[i32],
        width: u32,
        height: u32,
        x0: u32,
        y0: u32,
        output: &mut [i32],
    ) {
        let (w, h) = (width as usize, height as usize);
        let low_w = w.div_ceil(2);
        let high_w = w / 2;
        let low_h = h.div_ceil(2);
        let high_h = h / 2;

        let mut low_rows = vec![0i32; low_w * h];
        let mut high_rows = vec![0i32; high_w * h];

        for x in 0..low_w {
            let l: Vec<i32> = (0..low_h).map(|y| ll[y * low_w + x]).collect();
            let hi: Vec<i32> = (0..high_h).map(|y| lh[y * low_w + x]).collect();
            let col = Self::inverse_1d(&l, &hi, y0 as i64, h);
            for (y, v) in col.into_iter().enumerate() {
                low_rows[y * low_w + x] = v;
            }
        }
        for x in 0..high_w {
            let l: Vec<i32> = (0..low_h).map(|y| hl[y * high_w + x]).collect();
            let hi: Vec<i32> = (0..high_h).map(|y| hh[y * high_w + x]).collect();
            let col = Self::inverse_1d(&l, &hi, y0 as i64, h);
            for (y, v) in col.into_iter().enumerate() {
                high_rows[y * high_w + x] = v;
            }
        }

        for y in 0..h {
            let l = &low_rows[y * low_w..(y + 1) * low_w];
            let hi = &high_rows[y * high_w..(y + 1) * high_w];
            let row = Self::inverse_1d(l, hi, x0 as i64, w);
            output[y * w..(y + 1) * w].copy_from_slice(&row);
        }
    }
}

/// 9/7 irreversible floating-point wavelet (lossy path).
pub struct Dwt97;

impl Dwt97 {
    const ALPHA: f32 = -1.586134342;
    const BETA: f32 = -0.052980118;
    const GAMMA: f32 = 0.882911075;
    const DELTA: f32 = 0.443506852;
    const K: f32 = 1.230174105;
    const INV_K: f32 = 1.0 / 1.230174105;

    pub fn forward_1d(signal: &[f32], x0: i64) -> (Vec<f32>, Vec<f32>) {
        let len = signal.len() as i64;
        if len == 0 {
            return (Vec::new(), Vec::new());
        }
        let is_odd = |i: i64| (x0 + i).rem_euclid(2) == 1;
        let mut x = signal.to_vec();
        let at = |buf: &[f32], i: i64| -> f32 { buf[reflect(i, len) as usize] };

        macro_rules! lift {
            ($coef:expr, $target_odd:expr) => {
                let snapshot = x.clone();
                for i in 0..len {
                    if is_odd(i) == $target_odd {
                        x[i as usize] += $coef * (at(&snapshot, i - 1) + at(&snapshot, i + 1));
                    }
                }
            };
        }
        lift!(Self::ALPHA, true);
        lift!(Self::BETA, false);
        lift!(Self::GAMMA, true);
        lift!(Self::DELTA, false);

        for i in 0..len {
            x[i as usize] *= if is_odd(i) { Self::K } else { Self::INV_K };
        }

        let mut low = Vec::new();
        let mut high = Vec::new();
        for i in 0..len {
            if is_odd(i) {
                high.push(x[i as usize]);
            } else {
                low.push(x[i as usize]);
            }
        }
        (low, high)
    }

    pub fn inverse_1d(low: &[f32], high: &[f32], x0: i64, len: usize) -> Vec<f32> {
        let len = len as i64;
        let is_odd = |i: i64| (x0 + i).rem_euclid(2) == 1;
        let mut x = vec![0.0f32; len as usize];
        let (mut li, mut hi) = (0usize, 0usize);
        for i in 0..len {
            if is_odd(i) {
                x[i as usize] = high[hi];
                hi += 1;
            } else {
                x[i as usize] = low[li];
                li += 1;
            }
        }
        for i in 0..len {
            x[i as usize] *= if is_odd(i) { Self::INV_K } else { Self::K };
        }

        let at = |buf: &[f32], i: i64| -> f32 { buf[reflect(i, len) as usize] };
        macro_rules! unlift {
            ($coef:expr, $target_odd:expr) => {
                let snapshot = x.clone();
                for i in 0..len {
                    if is_odd(i) == $target_odd {
                        x[i as usize] -= $coef * (at(&snapshot, i - 1) + at(&snapshot, i + 1));
                    }
                }
            };
        }
        unlift!(Self::DELTA, false);
        unlift!(Self::GAMMA, true);
        unlift!(Self::BETA, false);
        unlift!(Self::ALPHA, true);
        x
    }

    pub fn forward_2d(
        data: &[f32],
        width: u32,
        height: u32,
        x0: u32,
        y0: u32,
    ) -> (Vec<f32>, Vec<f32>, Vec<f32>, Vec<f32>) {
        let (w, h) = (width as usize, height as usize);
        let low_w = w.div_ceil(2);
        let high_w = w / 2;
        let mut low_rows = vec![0.0f32; low_w * h];
        let mut high_rows = vec![0.0f32; high_w * h];

        for y in 0..h {
            let row = &data[y * w..(y + 1) * w];
            let (l, hi) = Self::forward_1d(row, x0 as i64);
            low_rows[y * low_w..y * low_w + l.len()].copy_from_slice(&l);
            high_rows[y * high_w..y * high_w + hi.len()].copy_from_slice(&hi);
        }

        let low_h = h.div_ceil(2);
        let high_h = h / 2;
        let mut ll = vec![0.0f32; low_w * low_h];
        let mut hl = vec![0.0f32; high_w * low_h];
        let mut lh = vec![0.0f32; low_w * high_h];
        let mut hh = vec![0.0f32; high_w * high_h];

        for x in 0..low_w {
            let col: Vec<f32> = (0..h).map(|y| low_rows[y * low_w + x]).collect();
            let (l, hi) = Self::forward_1d(&col, y0 as i64);
            for (y, v) in l.into_iter().enumerate() {
                ll[y * low_w + x] = v;
            }
            for (y, v) in hi.into_iter().enumerate() {
                lh[y * low_w + x] = v;
            }
        }
        for x in 0..high_w {
            let col: Vec<f32> = (0..h).map(|y| high_rows[y * high_w + x]).collect();
            let (l, hi) = Self::forward_1d(&col, y0 as i64);
            for (y, v) in l.into_iter().enumerate() {
                hl[y * high_w + x] = v;
            }
            for (y, v) in hi.into_iter().enumerate() {
                hh[y * high_w + x] = v;
            }
        }
        (ll, hl, lh, hh)
    }

    pub fn inverse_2d(
        ll: &[f32],
        hl: &[f32],
        lh: &[f32],
        hh: &[f32],
        width: u32,
        height: u32,
        x0: u32,
        y0: u32,
        output: &mut [f32],
    ) {
        let (w, h) = (width as usize, height as usize);
        let low_w = w.div_ceil(2);
        let high_w = w / 2;
        let low_h = h.div_ceil(2);
        let high_h = h / 2;

        let mut low_rows = vec![0.0f32; low_w * h];
        let mut high_rows = vec![0.0f32; high_w * h];

        for x in 0..low_w {
            let l: Vec<f32> = (0..low_h).map(|y| ll[y * low_w + x]).collect();
            let hi: Vec<f32> = (0..high_h).map(|y| lh[y * low_w + x]).collect();
            let col = Self::inverse_1d(&l, &hi, y0 as i64, h);
            for (y, v) in col.into_iter().enumerate() {
                low_rows[y * low_w + x] = v;
            }
        }
        for x in 0..high_w {
            let l: Vec<f32> = (0..low_h).map(|y| hl[y * high_w + x]).collect();
            let hi: Vec<f32> = (0..high_h).map(|y| hh[y * high_w + x]).collect();
            let col = Self::inverse_1d(&l, &hi, y0 as i64, h);
            for (y, v) in col.into_iter().enumerate() {
                high_rows[y * high_w + x] = v;
            }
        }

        for y in 0..h {
            let l = &low_rows[y * low_w..(y + 1) * low_w];
            let hi = &high_rows[y * high_w..(y + 1) * high_w];
            let row = Self::inverse_1d(l, hi, x0 as i64, w);
            output[y * w..(y + 1) * w].copy_from_slice(&row);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dwt53_1d_roundtrip_even_origin() {
        let input = [10, 20, 30, 40, 50, 60, 70, 80];
        let (l, h) = Dwt53::forward_1d(&input, 0);
        let out = Dwt53::inverse_1d(&l, &h, 0, input.len());
        assert_eq!(out, input);
    }

    #[test]
    fn dwt53_1d_roundtrip_odd_origin() {
        let input = [10, 20, 30, 40, 50];
        let (l, h) = Dwt53::forward_1d(&input, 1);
        let out = Dwt53::inverse_1d(&l, &h, 1, input.len());
        assert_eq!(out, input);
    }

    #[test]
    fn dwt53_2d_roundtrip() {
        let w = 8u32;
        let h = 6u32;
        let data: Vec<i32> = (0..(w * h) as i32).collect();
        let (ll, hl, lh, hh) = Dwt53::forward_2d(&data, w, h, 0, 0);
        let mut out = vec![0i32; (w * h) as usize];
        Dwt53::inverse_2d(&ll, &hl, &lh, &hh, w, h, 0, 0, &mut out);
        assert_eq!(out, data);
    }

    #[test]
    fn dwt97_2d_roundtrip_within_tolerance() {
        let w = 8u32;
        let h = 8u32;
        let data: Vec<f32> = (0..(w * h)).map(|i| (i as f32) * 1.5 - 20.0).collect();
        let (ll, hl, lh, hh) = Dwt97::forward_2d(&data, w, h, 0, 0);
        let mut out = vec![0.0f32; (w * h) as usize];
        Dwt97::inverse_2d(&ll, &hl, &lh, &hh, w, h, 0, 0, &mut out);
        for (a, b) in data.iter().zip(out.iter()) {
            assert!((a - b).abs() < 1e-2, "{a} vs {b}");
        }
    }
}
