//! Normal-equation least squares shared by the global and local IWLS paths.
//!
//! Both entry points funnel into `solve_normal_equations`, which optionally
//! folds a local weight matrix into `X'` before forming `X'WX`.

use crate::iwls::IwlsError;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_linalg::error::LinalgError;
use ndarray_linalg::{FactorizeInto, InverseInto, ReciprocalConditionNum};

/// Below this reciprocal condition estimate `X'WX` is treated as singular.
const RCOND_FLOOR: f64 = f64::EPSILON;

/// Spatial weights for one regression location.
#[derive(Debug, Clone, Copy)]
pub enum LocalWeights<'a> {
    /// The diagonal of `W`, one kernel weight per observation.
    Diagonal(ArrayView1<'a, f64>),
    /// A full `n x n` weight matrix.
    Dense(ArrayView2<'a, f64>),
}

impl LocalWeights<'_> {
    /// Returns `X'W` for a design with `n` rows.
    fn weighted_transpose(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, IwlsError> {
        let n = x.nrows();
        match self {
            LocalWeights::Diagonal(w) => {
                if w.len() != n {
                    return Err(IwlsError::DimensionMismatch {
                        what: "local weight vector",
                        expected: n,
                        found: w.len(),
                    });
                }
                check_non_negative(w.iter())?;
                Ok(&x.t() * &w.view().insert_axis(Axis(0)))
            }
            LocalWeights::Dense(w) => {
                if w.nrows() != n || w.ncols() != n {
                    return Err(IwlsError::DimensionMismatch {
                        what: "local weight matrix",
                        expected: n,
                        found: if w.nrows() != n { w.nrows() } else { w.ncols() },
                    });
                }
                check_non_negative(w.iter())?;
                Ok(x.t().dot(w))
            }
        }
    }
}

fn check_non_negative<'a>(values: impl Iterator<Item = &'a f64>) -> Result<(), IwlsError> {
    for (index, &value) in values.enumerate() {
        if value < 0.0 || value.is_nan() {
            return Err(IwlsError::NegativeLocalWeight { index, value });
        }
    }
    Ok(())
}

/// Ordinary least squares through the normal equations.
///
/// Returns the coefficients together with `(X'WX)^-1 X'W`, where `W` is the
/// identity when no local weights are supplied.
pub fn solve_normal_equations(
    y: ArrayView1<f64>,
    x: ArrayView2<f64>,
    local_weights: Option<LocalWeights<'_>>,
) -> Result<(Array1<f64>, Array2<f64>), IwlsError> {
    if y.len() != x.nrows() {
        return Err(IwlsError::DimensionMismatch {
            what: "response length",
            expected: x.nrows(),
            found: y.len(),
        });
    }

    let xt = match local_weights {
        Some(weights) => weights.weighted_transpose(x)?,
        None => x.t().to_owned(),
    };
    let xtx = xt.dot(&x);
    let xtx_inv = invert_checked(xtx)?;
    let xtx_inv_xt = xtx_inv.dot(&xt);
    let betas = xtx_inv_xt.dot(&y);
    Ok((betas, xtx_inv_xt))
}

/// Coefficients of the unweighted regression of `y` on `x`.
pub fn compute_betas(y: ArrayView1<f64>, x: ArrayView2<f64>) -> Result<Array1<f64>, IwlsError> {
    solve_normal_equations(y, x, None).map(|(betas, _)| betas)
}

/// Coefficients of the locally weighted regression plus the hat-matrix factor.
pub fn compute_betas_local(
    y: ArrayView1<f64>,
    x: ArrayView2<f64>,
    weights: LocalWeights<'_>,
) -> Result<(Array1<f64>, Array2<f64>), IwlsError> {
    solve_normal_equations(y, x, Some(weights))
}

/// Inverts `X'WX` from a single LU factorization, which also supplies the
/// reciprocal condition estimate.
fn invert_checked(xtx: Array2<f64>) -> Result<Array2<f64>, IwlsError> {
    let columns = xtx.ncols();
    let singular = |rcond: f64| IwlsError::SingularMatrix { columns, rcond };

    if columns == 0 {
        return Err(singular(0.0));
    }

    let lu = match xtx.factorize_into() {
        Ok(lu) => lu,
        Err(LinalgError::Lapack(_)) => return Err(singular(0.0)),
        Err(e) => return Err(IwlsError::LinearSystemSolveFailed(e)),
    };
    let rcond = match lu.rcond() {
        Ok(rcond) => rcond,
        Err(LinalgError::Lapack(_)) => return Err(singular(0.0)),
        Err(e) => return Err(IwlsError::LinearSystemSolveFailed(e)),
    };
    if !rcond.is_finite() || rcond < RCOND_FLOOR {
        return Err(singular(rcond));
    }

    match lu.inv_into() {
        Ok(inverse) => Ok(inverse),
        Err(LinalgError::Lapack(_)) => Err(singular(rcond)),
        Err(e) => Err(IwlsError::LinearSystemSolveFailed(e)),
    }
}
