use galerkin_quadrature::univariate::{gauss, segment};
use galerkin_quadrature::{integrate, Error, MAX_DEGREE};

use matrixcompare::assert_scalar_eq;

fn monomial_integral_1d(alpha: i32) -> f64 {
    (1.0 - (-1.0f64).powi(alpha + 1)) / (alpha as f64 + 1.0)
}

#[test]
fn gauss_rules_satisfy_expected_accuracy() {
    for n in 1..=40 {
        let expected_polynomial_degree = 2 * n - 1;
        let rule = gauss(n);

        assert_eq!(rule.0.len(), n);
        assert!(rule.0.iter().all(|&w| w > 0.0));
        assert!(rule.1.windows(2).all(|pair| pair[0][0] < pair[1][0]));

        for alpha in 0..=expected_polynomial_degree as i32 {
            let estimated = integrate(&rule, |x| x[0].powi(alpha));
            assert_scalar_eq!(estimated, monomial_integral_1d(alpha), comp = abs, tol = 1e-13);
        }
    }
}

#[test]
fn segment_rule_uses_fewest_points() {
    assert_eq!(segment(0).unwrap().0.len(), 1);
    assert_eq!(segment(1).unwrap().0.len(), 1);
    assert_eq!(segment(2).unwrap().0.len(), 2);
    assert_eq!(segment(3).unwrap().0.len(), 2);
    assert_eq!(segment(4).unwrap().0.len(), 3);
}

#[test]
fn segment_rule_rejects_absurd_degree() {
    assert_eq!(
        segment(MAX_DEGREE + 1),
        Err(Error::NoRuleAvailable { degree: MAX_DEGREE + 1 })
    );
}

#[test]
#[should_panic]
fn gauss_with_zero_points_panics() {
    gauss(0);
}
