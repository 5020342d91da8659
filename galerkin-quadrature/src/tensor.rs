//! Quadrilateral rules formed as tensor products of Gauss rules.

use crate::univariate::gauss;
use crate::{check_degree, gauss_points_for_degree, Error, Rule};

/// A Gauss quadrature rule for the reference quadrilateral `[-1, 1]^2`.
///
/// The rule is constructed as a tensor product from 1D rules, with the provided number of
/// points per dimension.
pub fn quadrilateral_gauss(num_points_per_dim: usize) -> Rule<2> {
    let (weights1d, points1d) = gauss(num_points_per_dim);
    let n = weights1d.len();
    let mut weights = Vec::with_capacity(n * n);
    let mut points = Vec::with_capacity(n * n);

    for (&wy, &[y]) in weights1d.iter().zip(&points1d) {
        for (&wx, &[x]) in weights1d.iter().zip(&points1d) {
            weights.push(wx * wy);
            points.push([x, y]);
        }
    }

    (weights, points)
}

/// A rule for the reference quadrilateral that integrates every polynomial of degree at most
/// `degree` in each variable exactly.
pub fn quadrilateral(degree: usize) -> Result<Rule<2>, Error> {
    check_degree(degree)?;
    Ok(quadrilateral_gauss(gauss_points_for_degree(degree)))
}
