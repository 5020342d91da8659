//! Rules for the reference triangle with corners `(-1, -1)`, `(1, -1)` and `(-1, 1)`.
//!
//! Rules are obtained by collapsing the square `[-1, 1]^2` onto the triangle
//! (the Duffy transformation)
//!
//! ```text
//! xi  = (1 + a)(1 - b) / 2 - 1
//! eta = b
//! ```
//!
//! whose Jacobian determinant is `(1 - b) / 2`. A polynomial of total degree `d` in `(xi, eta)`
//! pulls back to a polynomial of degree `d` in `a` and `d + 1` in `b`, so tensor Gauss rules with
//! the matching number of points integrate it exactly. The rules are not minimal, but they exist
//! for every degree and all weights are positive.

use crate::univariate::gauss;
use crate::{check_degree, gauss_points_for_degree, Error, Rule};

/// A rule on the reference triangle that integrates polynomials of total degree at most `degree`
/// exactly.
pub fn triangle(degree: usize) -> Result<Rule<2>, Error> {
    check_degree(degree)?;
    let (weights_a, points_a) = gauss(gauss_points_for_degree(degree));
    let (weights_b, points_b) = gauss(gauss_points_for_degree(degree + 1));

    let mut weights = Vec::with_capacity(weights_a.len() * weights_b.len());
    let mut points = Vec::with_capacity(weights.capacity());
    for (&wb, &[b]) in weights_b.iter().zip(&points_b) {
        for (&wa, &[a]) in weights_a.iter().zip(&points_a) {
            let xi = 0.5 * (1.0 + a) * (1.0 - b) - 1.0;
            weights.push(wa * wb * 0.5 * (1.0 - b));
            points.push([xi, b]);
        }
    }

    Ok((weights, points))
}
