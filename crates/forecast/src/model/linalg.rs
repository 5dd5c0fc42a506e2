//! Penalised least squares on top of nalgebra's Cholesky factorisation.

use nalgebra::{DMatrix, DVector};

/// Solution of `(XᵀX + diag(λ)) β = Xᵀy`.
#[derive(Debug, Clone)]
pub(crate) struct RidgeSolution {
    pub coefficients: Vec<f64>,
    /// Lower Cholesky factor of `XᵀX + diag(λ)`, column-major `p × p`.
    pub lower: Vec<f64>,
    pub rss: f64,
}

/// `None` when the penalised normal matrix is not positive definite.
pub(crate) fn ridge(rows: &[Vec<f64>], y: &[f64], penalties: &[f64]) -> Option<RidgeSolution> {
    let n = rows.len();
    let p = penalties.len();
    if n == 0 || p == 0 || y.len() != n || rows.iter().any(|r| r.len() != p) {
        return None;
    }

    let x = DMatrix::from_fn(n, p, |i, j| rows[i][j]);
    let yv = DVector::from_column_slice(y);
    let xt = x.transpose();

    let mut normal = &xt * &x;
    for (j, lambda) in penalties.iter().enumerate() {
        normal[(j, j)] += lambda;
    }
    let chol = normal.cholesky()?;
    let beta = chol.solve(&(&xt * &yv));
    if beta.iter().any(|b| !b.is_finite()) {
        return None;
    }

    let residuals = &yv - &x * &beta;
    Some(RidgeSolution {
        coefficients: beta.iter().copied().collect(),
        lower: chol.l().as_slice().to_vec(),
        rss: residuals.norm_squared(),
    })
}

/// `xᵀ A⁻¹ x` given the lower Cholesky factor `L` of `A`.
pub(crate) fn inverse_quadratic_form(lower: &[f64], x: &[f64]) -> Option<f64> {
    let p = x.len();
    if lower.len() != p * p {
        return None;
    }
    let l = DMatrix::from_column_slice(p, p, lower);
    let v = l.solve_lower_triangular(&DVector::from_column_slice(x))?;
    Some(v.norm_squared())
}
