//! Inter-component transforms: the Part 1 MCT (RCT for reversible, ICT for
//! irreversible coding, first three components only) plus Part 2 MCC/MCO
//! generalized bindings modeled as opaque `(component_indices, matrix)`
//! pairs applied/undone around the DWT stage.

/// Reversible Color Transform (Annex G.2), used with the 5/3 lossless path.
/// Operates on three components in place: `[Y, Cb, Cr]` overwrite `[R, G, B]`.
pub fn forward_rct(r: &mut [i32], g: &mut [i32], b: &mut [i32]) {
    for i in 0..r.len() {
        let (rv, gv, bv) = (r[i], g[i], b[i]);
        let y = (rv + 2 * gv + bv) >> 2;
        let cb = bv - gv;
        let cr = rv - gv;
        r[i] = y;
        g[i] = cb;
        b[i] = cr;
    }
}

/// Inverse of [`forward_rct`].
pub fn inverse_rct(y: &mut [i32], cb: &mut [i32], cr: &mut [i32]) {
    for i in 0..y.len() {
        let (yv, cbv, crv) = (y[i], cb[i], cr[i]);
        let g = yv - ((cbv + crv) >> 2);
        let r = crv + g;
        let b = cbv + g;
        y[i] = r;
        cb[i] = g;
        cr[i] = b;
    }
}

/// Irreversible Color Transform (Annex G.3), used with the 9/7 lossy path.
pub fn forward_ict(r: &[i32], g: &[i32], b: &[i32]) -> (Vec<f32>, Vec<f32>, Vec<f32>) {
    let n = r.len();
    let mut y = Vec::with_capacity(n);
    let mut cb = Vec::with_capacity(n);
    let mut cr = Vec::with_capacity(n);
    for i in 0..n {
        let (rv, gv, bv) = (r[i] as f32, g[i] as f32, b[i] as f32);
        y.push(0.299 * rv + 0.587 * gv + 0.114 * bv);
        cb.push(-0.168_736 * rv - 0.331_264 * gv + 0.5 * bv);
        cr.push(0.5 * rv - 0.418_688 * gv - 0.081_312 * bv);
    }
    (y, cb, cr)
}

/// Inverse of [`forward_ict`], rounding back to integer samples.
pub fn inverse_ict(y: &[f32], cb: &[f32], cr: &[f32]) -> (Vec<i32>, Vec<i32>, Vec<i32>) {
    let n = y.len();
    let mut r = Vec::with_capacity(n);
    let mut g = Vec::with_capacity(n);
    let mut b = Vec::with_capacity(n);
    for i in 0..n {
        let (yv, cbv, crv) = (y[i], cb[i], cr[i]);
        r.push((yv + 1.402 * crv).round() as i32);
        g.push((yv - 0.344_136 * cbv - 0.714_136 * crv).round() as i32);
        b.push((yv + 1.772 * cbv).round() as i32);
    }
    (r, g, b)
}

/// A Part 2 MCC/MCO binding: an ordered set of component indices and the
/// square matrix applied across them (row-major, `indices.len()^2` entries).
#[derive(Debug, Clone)]
pub struct McxBinding {
    pub component_indices: Vec<u32>,
    pub matrix: Vec<f64>,
}

/// Applies `binding.matrix` to the selected components' samples, in place,
/// one pixel position at a time. Samples outside the binding are untouched.
pub fn apply_mcx_forward(components: &mut [Vec<i32>], binding: &McxBinding) {
    let n = binding.component_indices.len();
    if n == 0 {
        return;
    }
    let len = components[binding.component_indices[0] as usize].len();
    for pos in 0..len {
        let input: Vec<f64> = binding
            .component_indices
            .iter()
            .map(|&c| components[c as usize][pos] as f64)
            .collect();
        for (row, &c) in binding.component_indices.iter().enumerate() {
            let mut acc = 0.0;
            for (col, &v) in input.iter().enumerate() {
                acc += binding.matrix[row * n + col] * v;
            }
            components[c as usize][pos] = acc.round() as i32;
        }
    }
}

/// Undoes [`apply_mcx_forward`] using the matrix inverse. Only exact for
/// matrices the caller knows to be invertible; Part 2 bindings are opaque
/// data here, so callers are responsible for supplying invertible matrices.
pub fn apply_mcx_inverse(components: &mut [Vec<i32>], binding: &McxBinding, inverse_matrix: &[f64]) {
    let inverse = McxBinding {
        component_indices: binding.component_indices.clone(),
        matrix: inverse_matrix.to_vec(),
    };
    apply_mcx_forward(components, &inverse);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rct_roundtrips_exactly() {
        let mut r = vec![120, 10, 255];
        let mut g = vec![80, 200, 0];
        let mut b = vec![40, 5, 255];
        let (orig_r, orig_g, orig_b) = (r.clone(), g.clone(), b.clone());
        forward_rct(&mut r, &mut g, &mut b);
        inverse_rct(&mut r, &mut g, &mut b);
        assert_eq!(r, orig_r);
        assert_eq!(g, orig_g);
        assert_eq!(b, orig_b);
    }

    #[test]
    fn ict_roundtrips_within_rounding_tolerance() {
        let r = vec![120, 10, 255];
        let g = vec![80, 200, 0];
        let b = vec![40, 5, 255];
        let (y, cb, cr) = forward_ict(&r, &g, &b);
        let (r2, g2, b2) = inverse_ict(&y, &cb, &cr);
        for i in 0..r.len() {
            assert!((r[i] - r2[i]).abs() <= 1);
            assert!((g[i] - g2[i]).abs() <= 1);
            assert!((b[i] - b2[i]).abs() <= 1);
        }
    }

    #[test]
    fn mcx_identity_matrix_is_a_no_op() {
        let mut components = vec![vec![1, 2, 3], vec![4, 5, 6]];
        let binding = McxBinding {
            component_indices: vec![0, 1],
            matrix: vec![1.0, 0.0, 0.0, 1.0],
        };
        let before = components.clone();
        apply_mcx_forward(&mut components, &binding);
        assert_eq!(components, before);
    }
}
