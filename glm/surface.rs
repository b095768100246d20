//! Fans independent locally weighted IWLS runs out across regression locations.
//!
//! Each row of the location weight matrix holds the kernel weights of one
//! location over all observations. Runs share only the immutable inputs, so
//! they are executed in parallel with rayon.

use crate::config::IwlsConfig;
use crate::family::Family;
use crate::iwls::{IwlsError, IwlsRequest, IwlsStatus, iwls};
use crate::linalg::LocalWeights;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

/// Per-location estimates of a locally weighted model.
#[derive(Clone, Debug)]
pub struct LocalSurface {
    /// One coefficient row per location, shape `[n_locations, n_coefficients]`.
    pub betas: Array2<f64>,
    pub iterations: Vec<usize>,
    pub statuses: Vec<IwlsStatus>,
    /// When locations coincide with observations, entry `i` is the fitted
    /// value of observation `i` under location `i`'s own model.
    pub fitted: Option<Array1<f64>>,
}

impl LocalSurface {
    pub fn n_locations(&self) -> usize {
        self.betas.nrows()
    }

    pub fn all_converged(&self) -> bool {
        self.statuses.iter().all(|s| *s == IwlsStatus::Converged)
    }
}

/// Coefficients, own fitted value, iteration count and status of one location.
type LocationFit = (Array1<f64>, Option<f64>, usize, IwlsStatus);

/// Fits one locally weighted model per row of `location_weights`.
///
/// With `seed_from_global` the unweighted fit is computed first and its
/// coefficients start every local run.
pub fn fit_local_surface<'a>(
    y: ArrayView1<'a, f64>,
    x: ArrayView2<'a, f64>,
    family: Family,
    location_weights: ArrayView2<'a, f64>,
    config: &IwlsConfig,
    seed_from_global: bool,
) -> Result<LocalSurface, IwlsError> {
    let n = x.nrows();
    if location_weights.ncols() != n {
        return Err(IwlsError::DimensionMismatch {
            what: "location weight row length",
            expected: n,
            found: location_weights.ncols(),
        });
    }

    let global = if seed_from_global {
        Some(iwls(&IwlsRequest::new(y, x, family), config)?.betas)
    } else {
        None
    };

    let n_locations = location_weights.nrows();
    log::info!(
        "Fitting {} local {} models over {} observations",
        n_locations,
        family,
        n
    );

    let runs: Vec<Result<LocationFit, IwlsError>> = (0..n_locations)
        .into_par_iter()
        .map(|location| {
            // Views are invariant in their lifetime, so every input is
            // reborrowed down to the borrow of the seeding coefficients.
            let weights = location_weights.index_axis_move(Axis(0), location);
            let mut request = IwlsRequest::new(y.reborrow(), x.reborrow(), family)
                .with_local_weights(LocalWeights::Diagonal(weights.reborrow()));
            if let Some(global) = &global {
                request = request.with_ini_betas(global.view());
            }
            let result = iwls(&request, config)?;
            let own_fitted = (n_locations == n).then(|| result.fitted[location]);
            Ok((result.betas, own_fitted, result.iterations, result.status))
        })
        .collect();

    let p = x.ncols();
    let mut betas = Array2::zeros((n_locations, p));
    let mut iterations = Vec::with_capacity(n_locations);
    let mut statuses = Vec::with_capacity(n_locations);
    let mut fitted = (n_locations == n).then(|| Array1::zeros(n));

    for (location, run) in runs.into_iter().enumerate() {
        let (local_betas, own_fitted, n_iter, status) = run?;
        betas.row_mut(location).assign(&local_betas);
        iterations.push(n_iter);
        statuses.push(status);
        if let (Some(fitted), Some(value)) = (fitted.as_mut(), own_fitted) {
            fitted[location] = value;
        }
    }

    let exhausted = statuses
        .iter()
        .filter(|s| **s == IwlsStatus::BudgetExhausted)
        .count();
    if exhausted > 0 {
        log::warn!("{exhausted} of {n_locations} local fits exhausted their iteration budget.");
    }

    Ok(LocalSurface {
        betas,
        iterations,
        statuses,
        fitted,
    })
}
