//! Sub-pixel peak localisation on a 3x3 score neighbourhood.

/// Vertex offset of the parabola through samples at `-1, 0, +1`.
///
/// Returns `None` unless the parabola is concave and its vertex lies within
/// one sample of the centre.
pub(crate) fn parabola_vertex(fm: f32, f0: f32, fp: f32) -> Option<f32> {
    if !(fm.is_finite() && f0.is_finite() && fp.is_finite()) {
        return None;
    }
    let curvature = fm - 2.0 * f0 + fp;
    if curvature > -1e-6 {
        return None;
    }
    let offset = 0.5 * (fm - fp) / curvature;
    (offset.is_finite() && offset.abs() <= 1.0).then_some(offset)
}

/// Separable sub-pixel offset `(dx, dy)` of the peak at `s[1][1]`.
///
/// `s[row][col]`; an ill-conditioned axis contributes a zero offset.
pub(crate) fn peak_offset(s: [[f32; 3]; 3]) -> (f32, f32) {
    let dx = parabola_vertex(s[1][0], s[1][1], s[1][2]).unwrap_or(0.0);
    let dy = parabola_vertex(s[0][1], s[1][1], s[2][1]).unwrap_or(0.0);
    (dx, dy)
}
