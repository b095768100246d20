//! # Exponential Families and Link Functions
//!
//! A `Family` bundles everything the IWLS engine needs to know about a response
//! distribution: the link that maps the mean onto the additive scale, the
//! variance function, the working weights derived from both, and the mapping
//! used to report fitted values.
//!
//! Both enums are closed sets. The engine resolves the link once per call and
//! applies each capability to whole arrays, so there is no per-element
//! dispatch in the iteration loop.

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Distance kept from the edges of a link's domain when cleaning values.
pub const DOMAIN_EPS: f64 = f64::EPSILON;

/// Defines the link function, connecting the linear predictor to the mean response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Link {
    /// g(mu) = mu, for continuous outcomes.
    Identity,
    /// g(mu) = ln(mu), for counts. Maps (0, inf) to the real line.
    Log,
    /// g(mu) = ln(mu / (1 - mu)), for binary or proportional outcomes.
    /// Maps probabilities (0, 1) to the real line.
    Logit,
}

impl Link {
    /// Forward link on the mean (or raw response) scale.
    ///
    /// The log link floors its input at `DOMAIN_EPS`, so a zero count maps to a
    /// large negative but finite value. The logit is taken as-is, so exact 0
    /// and 1 map to infinities that `clean` clamps afterwards.
    pub fn apply(self, mu: ArrayView1<f64>) -> Array1<f64> {
        match self {
            Link::Identity => mu.to_owned(),
            Link::Log => mu.mapv(|m| m.max(DOMAIN_EPS).ln()),
            Link::Logit => mu.mapv(|p| (p / (1.0 - p)).ln()),
        }
    }

    /// Maps the linear predictor back to the mean scale.
    pub fn inverse(self, eta: ArrayView1<f64>) -> Array1<f64> {
        match self {
            Link::Identity => eta.to_owned(),
            Link::Log => eta.mapv(f64::exp),
            Link::Logit => eta.mapv(logistic),
        }
    }

    /// Derivative of the link, g'(mu), evaluated at the current mean estimate.
    pub fn deriv(self, mu: ArrayView1<f64>) -> Array1<f64> {
        match self {
            Link::Identity => Array1::ones(mu.len()),
            Link::Log => self.clean(mu).mapv(|m| 1.0 / m),
            Link::Logit => self.clean(mu).mapv(|p| 1.0 / (p * (1.0 - p))),
        }
    }

    /// The response as handed to `apply` for the bootstrap fit.
    ///
    /// Under the log link a zero count would enter as `ln(eps)`, far enough out
    /// that the first reweighted step overflows, so counts are averaged with
    /// their mean first. Other links see the response unchanged.
    pub fn starting_response(self, y: ArrayView1<f64>) -> Array1<f64> {
        match self {
            Link::Log => {
                let mean = y.mean().unwrap_or(0.0);
                y.mapv(|v| 0.5 * (v + mean))
            }
            Link::Identity | Link::Logit => y.to_owned(),
        }
    }

    /// Clamps values into the open domain of the link.
    ///
    /// Logit values land in `[eps, 1 - eps]`, log values in `[eps, inf)`.
    /// The identity link has no boundary and returns its input unchanged.
    pub fn clean(self, values: ArrayView1<f64>) -> Array1<f64> {
        match self {
            Link::Identity => values.to_owned(),
            Link::Log => values.mapv(|v| v.max(DOMAIN_EPS)),
            Link::Logit => values.mapv(|v| v.clamp(DOMAIN_EPS, 1.0 - DOMAIN_EPS)),
        }
    }
}

/// Numerically stable logistic function.
#[inline]
fn logistic(eta: f64) -> f64 {
    if eta >= 0.0 {
        1.0 / (1.0 + (-eta).exp())
    } else {
        let e = eta.exp();
        e / (1.0 + e)
    }
}

/// The response distribution of a generalized linear model.
///
/// Each variant carries its canonical link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// Normal errors with constant variance and the identity link.
    Gaussian,
    /// Counts with V(mu) = mu and the log link.
    Poisson,
    /// Proportions with V(mu) = mu (1 - mu) and the logit link.
    Binomial,
}

impl Family {
    pub fn link(self) -> Link {
        match self {
            Family::Gaussian => Link::Identity,
            Family::Poisson => Link::Log,
            Family::Binomial => Link::Logit,
        }
    }

    /// Whether the transformed response is cleaned before the bootstrap fit.
    ///
    /// Only the binomial family needs it: the logit of an exact 0 or 1 is
    /// infinite, and cleaning clamps those values back into `[eps, 1 - eps]`.
    pub fn cleans_initial_response(self) -> bool {
        matches!(self, Family::Binomial)
    }

    /// The variance function V(mu), evaluated on the cleaned mean.
    pub fn variance(self, mu: ArrayView1<f64>) -> Array1<f64> {
        match self {
            Family::Gaussian => Array1::ones(mu.len()),
            Family::Poisson => self.link().clean(mu),
            Family::Binomial => self.link().clean(mu).mapv(|p| p * (1.0 - p)),
        }
    }

    /// IWLS working weights, `1 / (g'(mu)^2 V(mu))`.
    pub fn weights(self, mu: ArrayView1<f64>) -> Array1<f64> {
        let deriv = self.link().deriv(mu);
        let variance = self.variance(mu);
        ndarray::Zip::from(&deriv)
            .and(&variance)
            .map_collect(|&d, &v| 1.0 / (d * d * v))
    }

    /// Maps the final linear predictor to the reported fitted values.
    ///
    /// Binomial probabilities are kept strictly inside (0, 1).
    pub fn fitted(self, eta: ArrayView1<f64>) -> Array1<f64> {
        let mu = self.link().inverse(eta);
        match self {
            Family::Gaussian | Family::Poisson => mu,
            Family::Binomial => self.link().clean(mu.view()),
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Family::Gaussian => "gaussian",
            Family::Poisson => "poisson",
            Family::Binomial => "binomial",
        };
        f.write_str(name)
    }
}
