//! Linear two-view model estimation with Hartley normalization.

use crate::correspondence::Point2;
use nalgebra::{DMatrix, Matrix3, Vector3};

/// A fitted two-view model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GeometricModel {
    /// `x1^T F x0 = 0`.
    Fundamental(Matrix3<f64>),
    /// `x1 ~ H x0`.
    Homography(Matrix3<f64>),
}

impl GeometricModel {
    /// The 3x3 model matrix.
    pub fn matrix(&self) -> &Matrix3<f64> {
        match self {
            GeometricModel::Fundamental(m) | GeometricModel::Homography(m) => m,
        }
    }

    /// Squared pixel residual of one correspondence.
    pub fn error(&self, p0: Point2, p1: Point2) -> f64 {
        match self {
            GeometricModel::Fundamental(f) => sampson_error(f, p0, p1),
            GeometricModel::Homography(h) => homography_transfer_error(h, p0, p1),
        }
    }
}

fn homogeneous(p: Point2) -> Vector3<f64> {
    Vector3::new(f64::from(p.x), f64::from(p.y), 1.0)
}

/// Translates points to zero mean and scales them to mean distance sqrt(2).
fn normalize(points: &[Point2]) -> Option<(Vec<Vector3<f64>>, Matrix3<f64>)> {
    let n = points.len() as f64;
    let mx = points.iter().map(|p| f64::from(p.x)).sum::<f64>() / n;
    let my = points.iter().map(|p| f64::from(p.y)).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| (f64::from(p.x) - mx).hypot(f64::from(p.y) - my))
        .sum::<f64>()
        / n;
    if !(mean_dist > 1e-12) {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    let t = Matrix3::new(s, 0.0, -s * mx, 0.0, s, -s * my, 0.0, 0.0, 1.0);
    Some((points.iter().map(|&p| t * homogeneous(p)).collect(), t))
}

/// Unit vector minimizing `|A h|`, as a row-major 3x3 matrix.
fn null_vector(mut a: DMatrix<f64>) -> Option<Matrix3<f64>> {
    // A wide matrix loses its null space row in the thin SVD.
    if a.nrows() < a.ncols() {
        let cols = a.ncols();
        a = a.resize_vertically(cols, 0.0);
    }
    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let row = v_t.row(svd.singular_values.imin());
    let m = Matrix3::from_row_slice(&row.iter().copied().collect::<Vec<_>>());
    m.iter().all(|v| v.is_finite()).then_some(m)
}

/// Direct linear transform homography from at least four correspondences.
pub fn fit_homography(points0: &[Point2], points1: &[Point2]) -> Option<Matrix3<f64>> {
    if points0.len() < 4 || points0.len() != points1.len() {
        return None;
    }
    let (n0, t0) = normalize(points0)?;
    let (n1, t1) = normalize(points1)?;

    let mut a = DMatrix::<f64>::zeros(2 * n0.len(), 9);
    for (i, (p, q)) in n0.iter().zip(n1.iter()).enumerate() {
        let (x, y) = (p.x, p.y);
        let (u, v) = (q.x, q.y);
        let r = 2 * i;
        a[(r, 0)] = -x;
        a[(r, 1)] = -y;
        a[(r, 2)] = -1.0;
        a[(r, 6)] = u * x;
        a[(r, 7)] = u * y;
        a[(r, 8)] = u;
        a[(r + 1, 3)] = -x;
        a[(r + 1, 4)] = -y;
        a[(r + 1, 5)] = -1.0;
        a[(r + 1, 6)] = v * x;
        a[(r + 1, 7)] = v * y;
        a[(r + 1, 8)] = v;
    }
    let h_norm = null_vector(a)?;
    let h = t1.try_inverse()? * h_norm * t0;
    let scale = h[(2, 2)];
    if scale.abs() > 1e-12 {
        Some(h / scale)
    } else {
        Some(h)
    }
}

/// Normalized eight-point fundamental matrix with rank-2 enforcement.
pub fn fit_fundamental(points0: &[Point2], points1: &[Point2]) -> Option<Matrix3<f64>> {
    if points0.len() < 8 || points0.len() != points1.len() {
        return None;
    }
    let (n0, t0) = normalize(points0)?;
    let (n1, t1) = normalize(points1)?;

    let mut a = DMatrix::<f64>::zeros(n0.len(), 9);
    for (i, (p, q)) in n0.iter().zip(n1.iter()).enumerate() {
        let (x0, y0) = (p.x, p.y);
        let (x1, y1) = (q.x, q.y);
        a[(i, 0)] = x1 * x0;
        a[(i, 1)] = x1 * y0;
        a[(i, 2)] = x1;
        a[(i, 3)] = y1 * x0;
        a[(i, 4)] = y1 * y0;
        a[(i, 5)] = y1;
        a[(i, 6)] = x0;
        a[(i, 7)] = y0;
        a[(i, 8)] = 1.0;
    }
    let f_norm = null_vector(a)?;

    let svd = f_norm.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let mut sigma = svd.singular_values;
    let smallest = sigma.imin();
    sigma[smallest] = 0.0;
    let f_rank2 = u * Matrix3::from_diagonal(&sigma) * v_t;
    Some(t1.transpose() * f_rank2 * t0)
}

/// Squared forward transfer error `|p1 - H p0|^2`.
pub fn homography_transfer_error(h: &Matrix3<f64>, p0: Point2, p1: Point2) -> f64 {
    let proj = h * homogeneous(p0);
    if proj.z.abs() < 1e-12 {
        return f64::INFINITY;
    }
    let dx = proj.x / proj.z - f64::from(p1.x);
    let dy = proj.y / proj.z - f64::from(p1.y);
    dx * dx + dy * dy
}

/// First-order (Sampson) squared distance of a pair to the epipolar geometry.
pub fn sampson_error(f: &Matrix3<f64>, p0: Point2, p1: Point2) -> f64 {
    let x0 = homogeneous(p0);
    let x1 = homogeneous(p1);
    let fx0 = f * x0;
    let ftx1 = f.transpose() * x1;
    let num = x1.dot(&fx0);
    let denom = fx0.x * fx0.x + fx0.y * fx0.y + ftx1.x * ftx1.x + ftx1.y * ftx1.y;
    if denom <= 1e-18 {
        // Both epipolar lines vanish only when the residual does too.
        return if num.abs() <= 1e-12 { 0.0 } else { f64::INFINITY };
    }
    num * num / denom
}
