//! Region of Interest coding (ISO/IEC 15444-1 §G, spec.md §4.6): MaxShift and
//! General Scaling. Geometry is resolved to a per-component boolean mask
//! before any code-block intersection test; the mask itself may come from a
//! rectangle, a polygon (even-odd rule), or an explicit caller-supplied mask.

use super::image::SubbandOrientation;
use crate::error::J2kError;

/// ROI geometry as supplied by the caller, before rasterization.
#[derive(Debug, Clone)]
pub enum RoiGeometry {
    Rectangle { x0: u32, y0: u32, x1: u32, y1: u32 },
    Polygon { vertices: Vec<(f64, f64)> },
    Mask { width: u32, height: u32, mask: Vec<bool> },
}

/// How ROI coefficients are favored relative to the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoiStyle {
    /// Srgn=0: ROI coefficients are shifted left by `shift` bits before T1
    /// so their most significant bits are coded before any background bit.
    MaxShift,
    /// Srgn=1: ROI coefficients are scaled by `2^shift`; background is left
    /// untouched.
    GeneralScaling,
}

/// A fully rasterized per-component mask plus the style/shift to apply.
#[derive(Debug, Clone)]
pub struct RoiMask {
    pub width: u32,
    pub height: u32,
    pub mask: Vec<bool>,
    pub style: RoiStyle,
    pub shift: u8,
}

impl RoiMask {
    pub fn is_roi(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.mask[(y * self.width + x) as usize]
    }

    /// True if any sample in `[x0, x1) x [y0, y1)` belongs to the ROI —
    /// used to decide whether a code-block needs the shift applied at all.
    pub fn intersects(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> bool {
        let x1 = x1.min(self.width);
        let y1 = y1.min(self.height);
        for y in y0..y1 {
            for x in x0..x1 {
                if self.is_roi(x, y) {
                    return true;
                }
            }
        }
        false
    }
}

/// Rasterizes `geometry` into a `width x height` boolean mask.
pub fn rasterize(geometry: &RoiGeometry, width: u32, height: u32) -> Result<Vec<bool>, J2kError> {
    match geometry {
        RoiGeometry::Rectangle { x0, y0, x1, y1 } => {
            if x0 > x1 || y0 > y1 {
                return Err(J2kError::InvalidParameters(
                    "ROI rectangle has inverted bounds".into(),
                ));
            }
            let mut mask = vec![false; (width as usize) * (height as usize)];
            let x1 = (*x1).min(width);
            let y1 = (*y1).min(height);
            for y in *y0..y1 {
                for x in *x0..x1 {
                    mask[(y * width + x) as usize] = true;
                }
            }
            Ok(mask)
        }
        RoiGeometry::Polygon { vertices } => {
            if vertices.len() < 3 {
                return Err(J2kError::InvalidParameters(
                    "ROI polygon needs at least 3 vertices".into(),
                ));
            }
            let mut mask = vec![false; (width as usize) * (height as usize)];
            for y in 0..height {
                let yf = y as f64 + 0.5;
                for x in 0..width {
                    let xf = x as f64 + 0.5;
                    if point_in_polygon_even_odd(vertices, xf, yf) {
                        mask[(y * width + x) as usize] = true;
                    }
                }
            }
            Ok(mask)
        }
        RoiGeometry::Mask {
            width: mw,
            height: mh,
            mask,
        } => {
            if *mw != width || *mh != height {
                return Err(J2kError::InvalidParameters(format!(
                    "explicit ROI mask is {mw}x{mh}, expected {width}x{height}"
                )));
            }
            Ok(mask.clone())
        }
    }
}

/// Even-odd rule point-in-polygon test (ray casting along +x).
fn point_in_polygon_even_odd(vertices: &[(f64, f64)], x: f64, y: f64) -> bool {
    let mut inside = false;
    let n = vertices.len();
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = vertices[i];
        let (xj, yj) = vertices[j];
        if (yi > y) != (yj > y) {
            let x_intersect = xi + (y - yi) * (xj - xi) / (yj - yi);
            if x < x_intersect {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Maps a subband-local coefficient coordinate to the tile-component
/// coordinate it covers at full resolution, so a mask rasterized at image
/// resolution can be tested against coefficients of any subband. `level` is
/// the subband's resolution level (`J2kResolution::level`, 1..=`levels`, the
/// coarsest detail band at 1 and the finest at `levels`; the LL band sits
/// alone at resolution 0 and is passed as `level == 0`).
pub fn subband_to_full_res(x: u32, y: u32, level: u8, levels: u8, orientation: SubbandOrientation) -> (u32, u32) {
    match orientation {
        SubbandOrientation::LL => {
            let scale = 1u32 << levels;
            (x * scale, y * scale)
        }
        _ => {
            let (hx, hy) = match orientation {
                SubbandOrientation::HL => (1, 0),
                SubbandOrientation::LH => (0, 1),
                SubbandOrientation::HH => (1, 1),
                SubbandOrientation::LL => unreachable!(),
            };
            let scale = 1u32 << (levels - level);
            ((2 * x + hx) * scale, (2 * y + hy) * scale)
        }
    }
}

/// Applies MaxShift / General Scaling to one code-block's coefficients
/// before T1, in place, testing each coefficient against `mask` (rasterized
/// at full image resolution) through [`subband_to_full_res`] rather than
/// assuming the block's subband-local coordinates are already full-resolution
/// ones.
#[allow(clippy::too_many_arguments)]
pub fn apply_forward_mapped(
    coefficients: &mut [i32],
    width: u32,
    height: u32,
    block_x0: u32,
    block_y0: u32,
    level: u8,
    levels: u8,
    orientation: SubbandOrientation,
    mask: &RoiMask,
) {
    for y in 0..height {
        for x in 0..width {
            let (fx, fy) = subband_to_full_res(block_x0 + x, block_y0 + y, level, levels, orientation);
            if mask.is_roi(fx, fy) {
                let idx = (y * width + x) as usize;
                coefficients[idx] = scale_up(coefficients[idx], mask.shift);
            }
        }
    }
}

/// Maps `block_x0/y0`'s subband-local rectangle to the full-resolution
/// rectangle it covers, so `RoiMask::intersects` can be used as a cheap
/// pre-check before [`apply_forward_mapped`] scans every coefficient.
pub fn mapped_bounds(
    block_x0: u32,
    block_y0: u32,
    width: u32,
    height: u32,
    level: u8,
    levels: u8,
    orientation: SubbandOrientation,
) -> (u32, u32, u32, u32) {
    let (fx0, fy0) = subband_to_full_res(block_x0, block_y0, level, levels, orientation);
    let (fx1, fy1) = subband_to_full_res(block_x0 + width, block_y0 + height, level, levels, orientation);
    (fx0, fy0, fx1, fy1)
}

/// MaxShift decode (Srgn=0): no geometry is ever transmitted, so ROI
/// coefficients are identified purely by magnitude — any coefficient whose
/// absolute value is at least `2^shift` was shifted up by the encoder and
/// must be shifted back down; background coefficients were never touched
/// and never reach that magnitude for a correctly chosen shift (ISO Annex
/// H.1.3).
pub fn apply_inverse_by_magnitude(coefficients: &mut [i32], shift: u8) {
    if shift == 0 {
        return;
    }
    let threshold = 1u32 << shift;
    for v in coefficients.iter_mut() {
        if v.unsigned_abs() >= threshold {
            *v = scale_down(*v, shift);
        }
    }
}

fn scale_up(value: i32, shift: u8) -> i32 {
    if value >= 0 {
        value << shift
    } else {
        -((-value) << shift)
    }
}

fn scale_down(value: i32, shift: u8) -> i32 {
    if value >= 0 {
        value >> shift
    } else {
        -((-value) >> shift)
    }
}

/// Validates that every configured ROI region shares the same shift value;
/// Part 1 (§4.6) requires a single per-component shift when regions overlap,
/// so mixed shifts are rejected rather than silently picking one.
pub fn validate_uniform_shift(masks: &[RoiMask]) -> Result<(), J2kError> {
    let mut shifts = masks.iter().map(|m| m.shift);
    let Some(first) = shifts.next() else {
        return Ok(());
    };
    if shifts.all(|s| s == first) {
        Ok(())
    } else {
        Err(J2kError::InvalidParameters(
            "overlapping ROI regions must share one shift value per component".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangle_rasterizes_to_expected_mask() {
        let geom = RoiGeometry::Rectangle { x0: 1, y0: 1, x1: 3, y1: 3 };
        let mask = rasterize(&geom, 4, 4).unwrap();
        assert!(mask[1 * 4 + 1]);
        assert!(!mask[0]);
        assert_eq!(mask.iter().filter(|&&b| b).count(), 4);
    }

    #[test]
    fn polygon_even_odd_contains_triangle_center() {
        let geom = RoiGeometry::Polygon {
            vertices: vec![(0.0, 0.0), (8.0, 0.0), (4.0, 8.0)],
        };
        let mask = rasterize(&geom, 8, 8).unwrap();
        assert!(mask[4 * 8 + 4]);
        assert!(!mask[0]);
    }

    #[test]
    fn max_shift_round_trips_through_mapped_forward_and_magnitude_inverse() {
        let mask = RoiMask {
            width: 2,
            height: 2,
            mask: vec![true, false, false, false],
            style: RoiStyle::MaxShift,
            shift: 3,
        };
        let mut coeffs = vec![5, -7, 2, -6];
        apply_forward_mapped(&mut coeffs, 2, 2, 0, 0, 0, 0, SubbandOrientation::LL, &mask);
        assert_eq!(coeffs[0], 5 << 3);
        apply_inverse_by_magnitude(&mut coeffs, mask.shift);
        assert_eq!(coeffs, vec![5, -7, 2, -6]);
    }

    #[test]
    fn mismatched_shifts_are_rejected() {
        let a = RoiMask { width: 1, height: 1, mask: vec![true], style: RoiStyle::MaxShift, shift: 3 };
        let b = RoiMask { width: 1, height: 1, mask: vec![true], style: RoiStyle::MaxShift, shift: 4 };
        assert!(validate_uniform_shift(&[a, b]).is_err());
    }

    #[test]
    fn subband_mapping_doubles_finest_detail_coordinates() {
        let (fx, fy) = subband_to_full_res(3, 5, 2, 2, SubbandOrientation::HL);
        assert_eq!((fx, fy), (7, 10));
    }

    #[test]
    fn subband_mapping_scales_ll_band_by_full_decimation() {
        let (fx, fy) = subband_to_full_res(2, 1, 0, 3, SubbandOrientation::LL);
        assert_eq!((fx, fy), (16, 8));
    }

    #[test]
    fn magnitude_threshold_decode_only_touches_shifted_coefficients() {
        let mut coeffs = vec![5 << 3, 7, -(2 << 3), -1];
        apply_inverse_by_magnitude(&mut coeffs, 3);
        assert_eq!(coeffs, vec![5, 7, -2, -1]);
    }
}
