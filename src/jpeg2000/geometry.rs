//! Tile / resolution / precinct / code-block partition math.
//!
//! Pure geometry, grounded directly on the coordinate formulas in ISO/IEC
//! 15444-1 Annex B: nothing here touches the bitstream.

/// Ceiling division for non-negative integers, used throughout Annex B's
/// coordinate formulas (`ceil(a / b)`).
pub fn ceil_div(a: i64, b: i64) -> i64 {
    if b == 0 { 0 } else { (a + b - 1) / b }
}

/// Top-left/bottom-right tile bounds on the reference grid for tile `(p, q)`.
pub fn tile_bounds(
    image_x0: u32,
    image_y0: u32,
    image_x1: u32,
    image_y1: u32,
    tile_x0: u32,
    tile_y0: u32,
    tile_w: u32,
    tile_h: u32,
    p: u32,
    q: u32,
) -> (u32, u32, u32, u32) {
    let tx0 = (tile_x0 + p * tile_w).max(image_x0);
    let ty0 = (tile_y0 + q * tile_h).max(image_y0);
    let tx1 = (tile_x0 + (p + 1) * tile_w).min(image_x1);
    let ty1 = (tile_y0 + (q + 1) * tile_h).min(image_y1);
    (tx0, ty0, tx1, ty1)
}

/// Component-domain bounds obtained from tile bounds by sub-sampling
/// (Annex B.2, `ceil(a / XRsiz)`).
pub fn component_bounds(tx0: u32, ty0: u32, tx1: u32, ty1: u32, dx: u8, dy: u8) -> (u32, u32, u32, u32) {
    let dx = dx.max(1) as i64;
    let dy = dy.max(1) as i64;
    (
        ceil_div(tx0 as i64, dx) as u32,
        ceil_div(ty0 as i64, dy) as u32,
        ceil_div(tx1 as i64, dx) as u32,
        ceil_div(ty1 as i64, dy) as u32,
    )
}

/// Resolution-`r` bounds of a tile-component spanning `(x0, y0, x1, y1)` at
/// `levels` total decomposition levels (Annex B.5 Eq. B-15).
pub fn resolution_bounds(x0: u32, y0: u32, x1: u32, y1: u32, levels: u8, r: u8) -> (u32, u32, u32, u32) {
    let shift = (levels - r) as i64;
    let div = 1i64 << shift;
    (
        ceil_div(x0 as i64, div) as u32,
        ceil_div(y0 as i64, div) as u32,
        ceil_div(x1 as i64, div) as u32,
        ceil_div(y1 as i64, div) as u32,
    )
}

/// Splits a resolution's extent into LL (r == 0) or HL/LH/HH subband bounds
/// per Annex B.5 Eq. B-16/B-17. Returns `(x0, y0, x1, y1)` in the subband's
/// own coordinate system (already divided by 2 relative to the resolution
/// before this level).
pub fn subband_bounds(
    parent_x0: u32,
    parent_y0: u32,
    parent_x1: u32,
    parent_y1: u32,
    horizontal_high: bool,
    vertical_high: bool,
) -> (u32, u32, u32, u32) {
    let split = |lo: u32, hi: u32, is_high: bool| -> (u32, u32) {
        let offset = if is_high { 1 } else { 0 };
        let new_lo = ceil_div((lo as i64) - offset as i64, 2).max(0) as u32;
        let new_hi = ceil_div((hi as i64) - offset as i64, 2).max(0) as u32;
        (new_lo, new_hi)
    };
    let (x0, x1) = split(parent_x0, parent_x1, horizontal_high);
    let (y0, y1) = split(parent_y0, parent_y1, vertical_high);
    (x0, y0, x1, y1)
}

/// Number of code-blocks covering a subband of size `w x h` with nominal
/// code-block size `cb_w x cb_h` (a power of two, 4..=1024 per Table A.18).
pub fn codeblock_grid(w: u32, h: u32, cb_w: u32, cb_h: u32) -> (u32, u32) {
    if w == 0 || h == 0 {
        (0, 0)
    } else {
        (w.div_ceil(cb_w), h.div_ceil(cb_h))
    }
}

/// Precinct grid dimensions covering a resolution of size `w x h`.
pub fn precinct_grid(w: u32, h: u32, ppx: u8, ppy: u8) -> (u32, u32) {
    let pw = 1u32 << ppx;
    let ph = 1u32 << ppy;
    if w == 0 || h == 0 {
        (0, 0)
    } else {
        (w.div_ceil(pw), h.div_ceil(ph))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_bounds_top_level_matches_tile() {
        let r = resolution_bounds(0, 0, 512, 512, 5, 5);
        assert_eq!(r, (0, 0, 512, 512));
    }

    #[test]
    fn resolution_bounds_halves_each_level_down() {
        let r = resolution_bounds(0, 0, 512, 512, 5, 4);
        assert_eq!(r, (0, 0, 256, 256));
    }

    #[test]
    fn codeblock_grid_exact_and_partial() {
        assert_eq!(codeblock_grid(128, 128, 64, 64), (2, 2));
        assert_eq!(codeblock_grid(130, 65, 64, 64), (3, 2));
    }
}
