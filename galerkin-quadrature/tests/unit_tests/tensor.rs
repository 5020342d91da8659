use galerkin_quadrature::integrate;
use galerkin_quadrature::tensor::{quadrilateral, quadrilateral_gauss};

use matrixcompare::assert_scalar_eq;

fn monomial_integral_1d(alpha: i32) -> f64 {
    (1.0 - (-1.0f64).powi(alpha + 1)) / (alpha as f64 + 1.0)
}

#[test]
fn quadrilateral_gauss_integrates_tensor_monomials() {
    for n in 1..=6 {
        let rule = quadrilateral_gauss(n);
        assert_eq!(rule.0.len(), n * n);
        let max_degree = (2 * n - 1) as i32;
        for alpha in 0..=max_degree {
            for beta in 0..=max_degree {
                let estimated = integrate(&rule, |p| p[0].powi(alpha) * p[1].powi(beta));
                let expected = monomial_integral_1d(alpha) * monomial_integral_1d(beta);
                assert_scalar_eq!(estimated, expected, comp = abs, tol = 1e-13);
            }
        }
    }
}

#[test]
fn quadrilateral_rule_area() {
    for degree in 0..10 {
        let rule = quadrilateral(degree).unwrap();
        let area: f64 = rule.0.iter().sum();
        assert_scalar_eq!(area, 4.0, comp = abs, tol = 1e-13);
    }
}
