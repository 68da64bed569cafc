//! Double precision 3×3 Singular Value Decomposition (SVD).
//!
//! ```text
//! A = U Σ Vᵀ
//! ```
//!
//! where:
//! * U ∈ ℝ³ˣ³ is an orthogonal matrix (left singular vectors)
//! * Σ = diag(σ₁, σ₂, σ₃) with σ₁ ≥ σ₂ ≥ σ₃ ≥ 0
//! * V ∈ ℝ³ˣ³ is an orthogonal matrix (right singular vectors)
//!
//! # Implementation Details
//!
//! * cyclic Jacobi eigenanalysis of the symmetric matrix AᵀA gives V
//! * the columns of B = A V are sorted by decreasing norm
//! * a Givens QR decomposition of B gives U = Q and Σ = diag(R)
//!
//! U stays orthogonal when A is rank deficient, e.g. for planar or collinear
//! correspondences.
//!
//! # Example
//!
//! ```
//! use glam::{DMat3, DVec3};
//! use spatia_linalg::svd::svd3;
//!
//! let a = DMat3::from_diagonal(DVec3::new(1.0, 2.0, 3.0));
//! let svd = svd3(&a);
//! assert!((svd.s().x - 3.0).abs() < 1e-12);
//! ```
//!
//! # References
//!
//! * McAdams, Selle, Tamstorf, Teran, and Sifakis (2011).
//!   "Computing the Singular Value Decomposition of 3x3 matrices with minimal
//!   branching and elementary floating point operations."
//!   University of Wisconsin-Madison Technical Report TR1690.
use glam::{DMat3, DVec3};

/// Relative off-diagonal magnitude at which the Jacobi sweeps stop.
const JACOBI_TOLERANCE: f64 = 1e-15;
const MAX_SWEEPS: usize = 16;

const IDENTITY_ROWS: Rows = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Row-major scratch storage used by the sweeps.
type Rows = [[f64; 3]; 3];

/// Result of [`svd3`], such that `a = u * diag(s) * vᵀ`.
#[derive(Debug, Clone, Copy)]
pub struct Svd3 {
    u: DMat3,
    s: DVec3,
    v: DMat3,
}

impl Svd3 {
    /// Get the left singular vectors as the columns of U.
    #[inline]
    pub fn u(&self) -> &DMat3 {
        &self.u
    }

    /// Get the singular values, sorted in decreasing order.
    #[inline]
    pub fn s(&self) -> &DVec3 {
        &self.s
    }

    /// Get the right singular vectors as the columns of V.
    #[inline]
    pub fn v(&self) -> &DMat3 {
        &self.v
    }

    /// Get the singular values as a diagonal matrix.
    pub fn s_mat(&self) -> DMat3 {
        DMat3::from_diagonal(self.s)
    }
}

fn to_rows(m: &DMat3) -> Rows {
    [m.row(0).to_array(), m.row(1).to_array(), m.row(2).to_array()]
}

fn from_rows(rows: &Rows) -> DMat3 {
    DMat3::from_cols_array_2d(rows).transpose()
}

/// Apply the Jacobi rotation that zeroes `s[p][q]`, accumulating it into `v`.
fn jacobi_rotate(s: &mut Rows, v: &mut Rows, p: usize, q: usize) {
    let s_pq = s[p][q];
    if s_pq == 0.0 {
        return;
    }

    let theta = (s[q][q] - s[p][p]) / (2.0 * s_pq);
    let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
    let cos_theta = 1.0 / (t * t + 1.0).sqrt();
    let sin_theta = t * cos_theta;

    // S <- S J
    for row in s.iter_mut() {
        let (kp, kq) = (row[p], row[q]);
        row[p] = cos_theta * kp - sin_theta * kq;
        row[q] = sin_theta * kp + cos_theta * kq;
    }
    // S <- Jᵀ S
    for k in 0..3 {
        let (pk, qk) = (s[p][k], s[q][k]);
        s[p][k] = cos_theta * pk - sin_theta * qk;
        s[q][k] = sin_theta * pk + cos_theta * qk;
    }
    // V <- V J
    for row in v.iter_mut() {
        let (kp, kq) = (row[p], row[q]);
        row[p] = cos_theta * kp - sin_theta * kq;
        row[q] = sin_theta * kp + cos_theta * kq;
    }
}

/// Eigenvectors of a symmetric matrix, returned as the columns of the result.
fn jacobi_eigenanalysis(s: &mut Rows) -> Rows {
    let mut v = IDENTITY_ROWS;
    for _ in 0..MAX_SWEEPS {
        let off = s[0][1] * s[0][1] + s[0][2] * s[0][2] + s[1][2] * s[1][2];
        let diag = s[0][0] * s[0][0] + s[1][1] * s[1][1] + s[2][2] * s[2][2];
        if off <= JACOBI_TOLERANCE * JACOBI_TOLERANCE * diag {
            break;
        }
        for (p, q) in [(0, 1), (0, 2), (1, 2)] {
            jacobi_rotate(s, &mut v, p, q);
        }
    }
    v
}

fn column_norm_squared(m: &Rows, j: usize) -> f64 {
    m.iter().map(|row| row[j] * row[j]).sum()
}

fn swap_columns(m: &mut Rows, i: usize, j: usize) {
    for row in m.iter_mut() {
        row.swap(i, j);
    }
}

/// Sort the columns of `b` by decreasing norm, permuting `v` alongside.
fn sort_singular_values(b: &mut Rows, v: &mut Rows) {
    for (i, j) in [(0, 1), (0, 2), (1, 2)] {
        if column_norm_squared(b, i) < column_norm_squared(b, j) {
            swap_columns(b, i, j);
            swap_columns(v, i, j);
        }
    }
}

/// In-place Givens QR: `r` becomes upper triangular and Q is returned.
fn qr_decomposition(r: &mut Rows) -> Rows {
    let mut q = IDENTITY_ROWS;
    for (i, j) in [(1, 0), (2, 0), (2, 1)] {
        let (a, b) = (r[j][j], r[i][j]);
        let rho = a.hypot(b);
        if rho == 0.0 {
            continue;
        }
        let (cos_theta, sin_theta) = (a / rho, b / rho);

        for k in 0..3 {
            let (rj, ri) = (r[j][k], r[i][k]);
            r[j][k] = cos_theta * rj + sin_theta * ri;
            r[i][k] = -sin_theta * rj + cos_theta * ri;
        }
        for row in q.iter_mut() {
            let (qj, qi) = (row[j], row[i]);
            row[j] = cos_theta * qj + sin_theta * qi;
            row[i] = -sin_theta * qj + cos_theta * qi;
        }
    }
    q
}

/// Compute the singular value decomposition of a 3x3 matrix.
///
/// The decomposition is total: zero and rank deficient inputs still yield
/// orthogonal `u` and `v` and non-negative sorted singular values.
pub fn svd3(a: &DMat3) -> Svd3 {
    let mut ata = to_rows(&(a.transpose() * *a));
    let mut v = jacobi_eigenanalysis(&mut ata);

    let mut b = to_rows(&(*a * from_rows(&v)));
    sort_singular_values(&mut b, &mut v);

    let q = qr_decomposition(&mut b);

    let mut u = from_rows(&q);
    let mut s = DVec3::new(b[0][0], b[1][1], b[2][2]);
    for i in 0..3 {
        if s[i] < 0.0 {
            s[i] = -s[i];
            let col = u.col(i);
            *u.col_mut(i) = -col;
        }
    }

    Svd3 {
        u,
        s,
        v: from_rows(&v),
    }
}
