//! # Iteratively Reweighted Least Squares
//!
//! The engine fits a generalized linear model by repeatedly linearizing the
//! inverse link around the current mean estimate and re-solving a weighted
//! least-squares problem:
//!
//! 1. Transform the response with the link, clean it when the family asks for
//!    it (binomial) and bootstrap the coefficients with an ordinary
//!    least-squares fit (unless starting values are supplied).
//! 2. Until the coefficients settle or the iteration budget runs out:
//!    compute `mu`, the working weights `w` and the working response
//!    `z = v + g'(mu) (y - mu)`, then regress `sqrt(w) z` on `sqrt(w) X`.
//!    On the local path the regression is additionally weighted by the
//!    location's kernel weights.
//! 3. Report the family's fitted values for the last linear predictor.
//!
//! Exhausting the budget is not an error. The returned `IwlsStatus` tells the
//! caller which terminal state was reached.
//!
//! A run is a pure function of its inputs, so independent locations can be fit
//! concurrently (see `surface`).

use crate::config::{DiffReduction, IwlsConfig};
use crate::family::Family;
use crate::linalg::{LocalWeights, compute_betas, compute_betas_local};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Initial value of the convergence measure, large enough to enter the loop.
const DIFF_SENTINEL: f64 = 1.0e6;

/// A comprehensive error type for a single IWLS run.
#[derive(Error, Debug)]
pub enum IwlsError {
    #[error(
        "The normal-equations matrix X'WX ({columns} x {columns}) is singular (reciprocal condition estimate {rcond:.3e}). The design may be rank deficient, have collinear columns, or have too few observations with non-zero weight."
    )]
    SingularMatrix { columns: usize, rcond: f64 },

    #[error("Dimension mismatch for {what}: expected {expected}, found {found}.")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Local weights must be non-negative, but entry {index} is {value}.")]
    NegativeLocalWeight { index: usize, value: f64 },

    #[error(
        "IWLS produced non-finite coefficients at iteration {iteration}. Check the response and design for NaN or infinite values."
    )]
    NonFiniteCoefficients { iteration: usize },

    #[error("A linear system solve failed: {0}")]
    LinearSystemSolveFailed(ndarray_linalg::error::LinalgError),
}

/// The terminal state of an IWLS run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IwlsStatus {
    /// The convergence measure dropped to the tolerance.
    Converged,
    /// The iteration budget ran out first. The coefficients are the last fit.
    BudgetExhausted,
}

/// Inputs of one IWLS run. All arrays are borrowed.
#[derive(Debug, Clone, Copy)]
pub struct IwlsRequest<'a> {
    pub y: ArrayView1<'a, f64>,
    pub x: ArrayView2<'a, f64>,
    pub family: Family,
    /// Known additive component of the linear predictor (for example a log exposure).
    pub offset: Option<ArrayView1<'a, f64>>,
    /// Fixed part of the linear predictor contributed by terms held constant.
    pub y_fix: Option<ArrayView1<'a, f64>>,
    /// Starting coefficients; when absent they are bootstrapped by OLS.
    pub ini_betas: Option<ArrayView1<'a, f64>>,
    /// Kernel weights of the regression location; absent on the global path.
    pub local_weights: Option<LocalWeights<'a>>,
}

impl<'a> IwlsRequest<'a> {
    pub fn new(y: ArrayView1<'a, f64>, x: ArrayView2<'a, f64>, family: Family) -> Self {
        Self {
            y,
            x,
            family,
            offset: None,
            y_fix: None,
            ini_betas: None,
            local_weights: None,
        }
    }

    pub fn with_offset(mut self, offset: ArrayView1<'a, f64>) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_y_fix(mut self, y_fix: ArrayView1<'a, f64>) -> Self {
        self.y_fix = Some(y_fix);
        self
    }

    pub fn with_ini_betas(mut self, ini_betas: ArrayView1<'a, f64>) -> Self {
        self.ini_betas = Some(ini_betas);
        self
    }

    pub fn with_local_weights(mut self, weights: LocalWeights<'a>) -> Self {
        self.local_weights = Some(weights);
        self
    }

    fn validate(&self) -> Result<(), IwlsError> {
        let n = self.x.nrows();
        let p = self.x.ncols();
        if self.y.len() != n {
            return Err(IwlsError::DimensionMismatch {
                what: "response length",
                expected: n,
                found: self.y.len(),
            });
        }
        for (what, values) in [("offset length", self.offset), ("y_fix length", self.y_fix)] {
            if let Some(values) = values {
                if values.len() != n {
                    return Err(IwlsError::DimensionMismatch {
                        what,
                        expected: n,
                        found: values.len(),
                    });
                }
            }
        }
        if let Some(betas) = self.ini_betas {
            if betas.len() != p {
                return Err(IwlsError::DimensionMismatch {
                    what: "initial coefficient count",
                    expected: p,
                    found: betas.len(),
                });
            }
        }
        Ok(())
    }

    /// The offset and y_fix summed into one fixed predictor component.
    fn fixed_predictor(&self) -> Option<Array1<f64>> {
        match (self.offset, self.y_fix) {
            (None, None) => None,
            (Some(offset), None) => Some(offset.to_owned()),
            (None, Some(y_fix)) => Some(y_fix.to_owned()),
            (Some(offset), Some(y_fix)) => Some(&offset + &y_fix),
        }
    }
}

/// Holds the result of an IWLS run.
///
/// * `betas`: the last accepted coefficient vector.
/// * `fitted`: the family's fitted values for the final linear predictor.
/// * `linear_predictor`: `X betas` plus any offset and y_fix, so it differs
///   from `X betas` whenever either is given.
/// * `working_weights`: final IWLS weights `w` (not square-rooted). Present on
///   the global path once at least one iteration ran.
/// * `hat_factor`: `(X'WX)^-1 X'W` from the last local solve, `p x n`. Present on
///   the local path once at least one iteration ran.
/// * `iterations`: number of iterations performed, at most `max_iter`.
/// * `diff`: the last value of the convergence measure.
#[derive(Clone, Debug)]
pub struct IwlsResult {
    pub betas: Array1<f64>,
    pub fitted: Array1<f64>,
    pub linear_predictor: Array1<f64>,
    pub working_weights: Option<Array1<f64>>,
    pub hat_factor: Option<Array2<f64>>,
    pub iterations: usize,
    pub diff: f64,
    pub status: IwlsStatus,
}

impl IwlsResult {
    pub fn converged(&self) -> bool {
        self.status == IwlsStatus::Converged
    }
}

/// Fits the model described by `request` with iteratively reweighted least squares.
pub fn iwls(request: &IwlsRequest<'_>, config: &IwlsConfig) -> Result<IwlsResult, IwlsError> {
    request.validate()?;

    let family = request.family;
    let link = family.link();
    let y = request.y;
    let x = request.x;
    let fixed = request.fixed_predictor();

    log::debug!(
        "Starting IWLS: family {}, {} observations, {} coefficients, local weights: {}",
        family,
        x.nrows(),
        x.ncols(),
        request.local_weights.is_some()
    );

    // --- Initialization ---
    let mut betas = match request.ini_betas {
        Some(ini) => ini.to_owned(),
        None => {
            let mut link_y = link.apply(link.starting_response(y).view());
            if family.cleans_initial_response() {
                link_y = link.clean(link_y.view());
            }
            let target = subtract_fixed(link_y, fixed.as_ref());
            compute_betas(target.view(), x)?
        }
    };
    ensure_finite(&betas, 0)?;
    let mut v = add_fixed(x.dot(&betas), fixed.as_ref());

    let mut diff = DIFF_SENTINEL;
    let mut n_iter = 0;
    let mut working_weights = None;
    let mut hat_factor = None;

    // --- Fixed-point iteration ---
    while diff > config.tol && n_iter < config.max_iter {
        n_iter += 1;

        let mu = link.inverse(v.view());
        let w = family.weights(mu.view());
        let deriv = link.deriv(mu.view());
        let z = Zip::from(&v)
            .and(&deriv)
            .and(&y)
            .and(&mu)
            .map_collect(|&vi, &di, &yi, &mui| vi + di * (yi - mui));

        let sqrt_w = w.mapv(f64::sqrt);
        let wx = &x * &sqrt_w.view().insert_axis(Axis(1));
        let wz = subtract_fixed(z, fixed.as_ref()) * &sqrt_w;

        let n_betas = match request.local_weights {
            None => {
                working_weights = Some(w);
                compute_betas(wz.view(), wx.view())?
            }
            Some(weights) => {
                let (n_betas, xtx_inv_xt) = compute_betas_local(wz.view(), wx.view(), weights)?;
                hat_factor = Some(xtx_inv_xt);
                n_betas
            }
        };
        ensure_finite(&n_betas, n_iter)?;
        let v_new = add_fixed(x.dot(&n_betas), fixed.as_ref());

        diff = reduce_change(&n_betas, &betas, config.reduction);
        log::debug!("IWLS iteration {n_iter}: diff = {diff:.6e}");

        v = v_new;
        betas = n_betas;
    }

    let status = if diff <= config.tol {
        IwlsStatus::Converged
    } else {
        IwlsStatus::BudgetExhausted
    };
    if status == IwlsStatus::BudgetExhausted {
        log::warn!(
            "IWLS used its full budget of {} iterations; last coefficient change {:.6e} exceeds tolerance {:.1e}.",
            config.max_iter,
            diff,
            config.tol
        );
    }

    Ok(IwlsResult {
        fitted: family.fitted(v.view()),
        betas,
        linear_predictor: v,
        working_weights,
        hat_factor,
        iterations: n_iter,
        diff,
        status,
    })
}

/// Reduces the per-coefficient absolute change to one convergence measure.
///
/// A NaN change yields NaN under every policy, which never passes `<= tol`.
pub fn reduce_change(next: &Array1<f64>, previous: &Array1<f64>, reduction: DiffReduction) -> f64 {
    let changes = Zip::from(next)
        .and(previous)
        .map_collect(|&a, &b| (a - b).abs());
    if changes.iter().any(|c| c.is_nan()) {
        return f64::NAN;
    }
    match reduction {
        DiffReduction::Max => changes.iter().copied().fold(0.0, f64::max),
        DiffReduction::Min => changes.iter().copied().fold(f64::INFINITY, f64::min),
        DiffReduction::L2 => changes.dot(&changes).sqrt(),
    }
}

fn ensure_finite(betas: &Array1<f64>, iteration: usize) -> Result<(), IwlsError> {
    if betas.iter().all(|b| b.is_finite()) {
        Ok(())
    } else {
        Err(IwlsError::NonFiniteCoefficients { iteration })
    }
}

fn add_fixed(eta: Array1<f64>, fixed: Option<&Array1<f64>>) -> Array1<f64> {
    match fixed {
        Some(fixed) => eta + fixed,
        None => eta,
    }
}

fn subtract_fixed(values: Array1<f64>, fixed: Option<&Array1<f64>>) -> Array1<f64> {
    match fixed {
        Some(fixed) => values - fixed,
        None => values,
    }
}
