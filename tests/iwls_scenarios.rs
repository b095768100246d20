use approx::assert_abs_diff_eq;
use gwglm::{
    DiffReduction, Family, IwlsConfig, IwlsError, IwlsRequest, IwlsStatus, LocalWeights, iwls,
};
use ndarray::{Array1, Array2, array};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson};

fn with_intercept(covariate: &Array1<f64>) -> Array2<f64> {
    Array2::from_shape_fn((covariate.len(), 2), |(i, j)| {
        if j == 0 { 1.0 } else { covariate[i] }
    })
}

fn simulate_poisson(n: usize, intercept: f64, slope: f64, seed: u64) -> (Array1<f64>, Array2<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let covariate = Array1::from_shape_fn(n, |_| rng.gen_range(-1.0..1.0));
    let y = covariate.mapv(|c| {
        let rate = (intercept + slope * c).exp();
        Poisson::new(rate).unwrap().sample(&mut rng)
    });
    (y, with_intercept(&covariate))
}

fn tight() -> IwlsConfig {
    IwlsConfig {
        tol: 1e-10,
        ..IwlsConfig::default()
    }
}

#[test]
fn gaussian_intercept_only_recovers_the_mean() {
    let y = array![2.0, 4.0, 6.0, 8.0];
    let x = Array2::ones((4, 1));
    let result = iwls(
        &IwlsRequest::new(y.view(), x.view(), Family::Gaussian),
        &IwlsConfig::default(),
    )
    .unwrap();

    assert_abs_diff_eq!(result.betas[0], 5.0, epsilon = 1e-12);
    assert_eq!(result.iterations, 1);
    assert!(result.converged());
}

#[test]
fn poisson_recovers_simulated_coefficients() {
    let (y, x) = simulate_poisson(400, 0.5, 0.8, 17);
    let result = iwls(
        &IwlsRequest::new(y.view(), x.view(), Family::Poisson),
        &IwlsConfig::default(),
    )
    .unwrap();

    assert!(result.converged());
    assert!(result.iterations < 25);
    assert!((result.betas[0] - 0.5).abs() < 0.25, "intercept {}", result.betas[0]);
    assert!((result.betas[1] - 0.8).abs() < 0.25, "slope {}", result.betas[1]);
    assert!(result.fitted.iter().all(|&m| m > 0.0));

    // The canonical Poisson weights are the fitted means.
    let weights = result.working_weights.unwrap();
    for (w, m) in weights.iter().zip(result.fitted.iter()) {
        assert_abs_diff_eq!(*w, *m, epsilon = 1e-4 * m.max(1.0));
    }
}

#[test]
fn restarting_from_converged_coefficients_is_idempotent() {
    let (y, x) = simulate_poisson(150, 0.2, -0.6, 3);
    let config = tight();
    let first = iwls(&IwlsRequest::new(y.view(), x.view(), Family::Poisson), &config).unwrap();
    assert!(first.converged());

    let second = iwls(
        &IwlsRequest::new(y.view(), x.view(), Family::Poisson).with_ini_betas(first.betas.view()),
        &config,
    )
    .unwrap();
    assert!(second.converged());
    assert!(second.iterations <= 1);
    for (a, b) in first.betas.iter().zip(second.betas.iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-9);
    }
}

#[test]
fn iteration_count_respects_the_budget() {
    let (counts, x) = simulate_poisson(60, 1.0, 0.5, 11);
    let binary = counts.mapv(|c| if c > 2.0 { 1.0 } else { 0.0 });

    for (family, y) in [
        (Family::Gaussian, &counts),
        (Family::Poisson, &counts),
        (Family::Binomial, &binary),
    ] {
        for max_iter in 1..=4 {
            let config = IwlsConfig {
                tol: 1e-14,
                max_iter,
                reduction: DiffReduction::Max,
            };
            let result = iwls(&IwlsRequest::new(y.view(), x.view(), family), &config).unwrap();
            assert!(
                (1..=max_iter).contains(&result.iterations),
                "{family}: {} iterations with a budget of {max_iter}",
                result.iterations
            );
            if result.status == IwlsStatus::BudgetExhausted {
                assert_eq!(result.iterations, max_iter);
            }
        }
    }
}

#[test]
fn separated_binomial_design_keeps_probabilities_inside_the_unit_interval() {
    // The indicator separates the outcomes exactly. The estimates run off until
    // the fitted values saturate against the cleaning bounds.
    let y = array![0.0, 1.0, 0.0, 1.0, 1.0];
    let indicator = array![0.0, 1.0, 0.0, 1.0, 1.0];
    let x = with_intercept(&indicator);
    let config = IwlsConfig {
        max_iter: 50,
        ..IwlsConfig::default()
    };
    let result = iwls(&IwlsRequest::new(y.view(), x.view(), Family::Binomial), &config).unwrap();

    assert!(result.iterations <= 50);
    assert!(result.fitted.iter().all(|&p| p > 0.0 && p < 1.0));
    assert!(result.betas.iter().all(|b| b.is_finite()));

    let fitted = &result.fitted;
    assert_abs_diff_eq!(fitted[0], fitted[2], epsilon = 1e-12);
    assert_abs_diff_eq!(fitted[1], fitted[3], epsilon = 1e-12);
    assert_abs_diff_eq!(fitted[3], fitted[4], epsilon = 1e-12);
    assert!(fitted[0] < 0.01);
    assert!(fitted[1] > 0.99);
}

#[test]
fn binomial_bootstrap_regresses_the_cleaned_logits() {
    // The logits of 0 and 1 are infinite; cleaning clamps them to eps and
    // 1 - eps, so the bootstrap is a linear-probability fit of the indicator.
    let y = array![0.0, 1.0, 0.0, 1.0, 1.0];
    let x = with_intercept(&y);
    let config = IwlsConfig {
        max_iter: 0,
        ..IwlsConfig::default()
    };
    let result = iwls(&IwlsRequest::new(y.view(), x.view(), Family::Binomial), &config).unwrap();

    assert_eq!(result.iterations, 0);
    assert_eq!(result.status, IwlsStatus::BudgetExhausted);
    assert_abs_diff_eq!(result.betas[0], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(result.betas[1], 1.0, epsilon = 1e-12);
    assert!(result.linear_predictor.iter().all(|v| v.is_finite()));
    assert!(result.fitted.iter().all(|&p| p > 0.0 && p < 1.0));
}

#[test]
fn binomial_fitted_values_match_group_proportions() {
    let indicator = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0];
    let y = array![0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0];
    let x = with_intercept(&indicator);
    let result = iwls(
        &IwlsRequest::new(y.view(), x.view(), Family::Binomial),
        &IwlsConfig::default(),
    )
    .unwrap();

    assert!(result.converged());
    for i in 0..4 {
        assert_abs_diff_eq!(result.fitted[i], 0.25, epsilon = 1e-6);
    }
    for i in 4..9 {
        assert_abs_diff_eq!(result.fitted[i], 0.8, epsilon = 1e-6);
    }
    let logit = |p: f64| (p / (1.0 - p)).ln();
    assert_abs_diff_eq!(result.betas[0], logit(0.25), epsilon = 1e-5);
    assert_abs_diff_eq!(result.betas[1], logit(0.8) - logit(0.25), epsilon = 1e-5);
}

#[test]
fn constant_offset_shifts_only_the_intercept() {
    let (y, x) = simulate_poisson(120, 0.3, 0.4, 29);
    let exposure = Array1::from_elem(y.len(), 1.5);
    let config = tight();

    let plain = iwls(&IwlsRequest::new(y.view(), x.view(), Family::Poisson), &config).unwrap();
    let shifted = iwls(
        &IwlsRequest::new(y.view(), x.view(), Family::Poisson).with_offset(exposure.view()),
        &config,
    )
    .unwrap();

    assert_abs_diff_eq!(shifted.betas[0], plain.betas[0] - 1.5, epsilon = 1e-8);
    assert_abs_diff_eq!(shifted.betas[1], plain.betas[1], epsilon = 1e-8);
    for (a, b) in plain.fitted.iter().zip(shifted.fitted.iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-8 * a.max(1.0));
    }
}

#[test]
fn duplicated_columns_are_singular_for_every_family() {
    let covariate = array![0.5, 1.0, 1.5, 2.0, 2.5, 3.0];
    let x = Array2::from_shape_fn((6, 3), |(i, j)| if j == 0 { 1.0 } else { covariate[i] });
    let counts = array![1.0, 0.0, 2.0, 3.0, 2.0, 5.0];
    let binary = array![0.0, 1.0, 0.0, 1.0, 1.0, 0.0];

    for (family, y) in [
        (Family::Gaussian, &counts),
        (Family::Poisson, &counts),
        (Family::Binomial, &binary),
    ] {
        let err = iwls(&IwlsRequest::new(y.view(), x.view(), family), &IwlsConfig::default())
            .unwrap_err();
        assert!(
            matches!(err, IwlsError::SingularMatrix { columns: 3, .. }),
            "{family}: {err}"
        );
    }
}

#[test]
fn identity_local_weights_reproduce_the_global_fit() {
    let (y, x) = simulate_poisson(80, 0.7, 0.3, 5);
    let n = y.len();
    let ones = Array1::ones(n);
    let identity = Array2::eye(n);
    let config = tight();

    let global = iwls(&IwlsRequest::new(y.view(), x.view(), Family::Poisson), &config).unwrap();
    for weights in [
        LocalWeights::Diagonal(ones.view()),
        LocalWeights::Dense(identity.view()),
    ] {
        let local = iwls(
            &IwlsRequest::new(y.view(), x.view(), Family::Poisson).with_local_weights(weights),
            &config,
        )
        .unwrap();
        assert!(local.converged());
        assert!(local.working_weights.is_none());
        assert_eq!(local.hat_factor.as_ref().unwrap().dim(), (2, n));
        for (a, b) in global.betas.iter().zip(local.betas.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-8);
        }
    }
}

#[test]
fn min_reduction_never_needs_more_iterations_than_max() {
    let (y, x) = simulate_poisson(100, 0.1, 1.2, 41);
    let run = |reduction| {
        let config = IwlsConfig {
            reduction,
            ..IwlsConfig::default()
        };
        iwls(&IwlsRequest::new(y.view(), x.view(), Family::Poisson), &config).unwrap()
    };

    let max = run(DiffReduction::Max);
    let min = run(DiffReduction::Min);
    let l2 = run(DiffReduction::L2);
    assert!(max.converged() && min.converged() && l2.converged());
    assert!(min.iterations <= max.iterations);
    assert!(max.iterations <= l2.iterations);
}
