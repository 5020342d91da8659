//! Functionality for error estimation.
use crate::field::DiscreteField;
use crate::nalgebra::{Matrix2, Point2, Vector2};
use crate::Real;

/// Estimate the squared $L^2$ error $\norm{u_h - u}^2_{L^2}$ of one field of a discrete solution.
///
/// Both values are compared in all their components.
#[allow(non_snake_case)]
pub fn estimate_L2_error_squared<T: Real>(
    u_h: &DiscreteField<T>,
    field: usize,
    u: impl Fn(&Point2<T>) -> Vector2<T>,
    quadrature_degree: usize,
) -> eyre::Result<T> {
    u_h.integrate_with(field, quadrature_degree, |x, point| {
        let e = point.value - u(x);
        e.dot(&e)
    })
}

/// Estimate the $L^2$ error $\norm{u_h - u}_{L^2}$ of one field of a discrete solution.
#[allow(non_snake_case)]
pub fn estimate_L2_error<T: Real>(
    u_h: &DiscreteField<T>,
    field: usize,
    u: impl Fn(&Point2<T>) -> Vector2<T>,
    quadrature_degree: usize,
) -> eyre::Result<T> {
    Ok(estimate_L2_error_squared(u_h, field, u, quadrature_degree)?.sqrt())
}

/// Estimate the squared $H^1$ seminorm error $\norm{\nabla u_h - \nabla u}^2_{L^2}$.
///
/// `u_grad` returns the gradient with `grad[(i, j)] = d u_i / d x_j`; scalar fields use the first
/// row only.
#[allow(non_snake_case)]
pub fn estimate_H1_seminorm_error_squared<T: Real>(
    u_h: &DiscreteField<T>,
    field: usize,
    u_grad: impl Fn(&Point2<T>) -> Matrix2<T>,
    quadrature_degree: usize,
) -> eyre::Result<T> {
    u_h.integrate_with(field, quadrature_degree, |x, point| {
        (point.grad - u_grad(x)).norm_squared()
    })
}

#[allow(non_snake_case)]
pub fn estimate_H1_seminorm_error<T: Real>(
    u_h: &DiscreteField<T>,
    field: usize,
    u_grad: impl Fn(&Point2<T>) -> Matrix2<T>,
    quadrature_degree: usize,
) -> eyre::Result<T> {
    Ok(estimate_H1_seminorm_error_squared(u_h, field, u_grad, quadrature_degree)?.sqrt())
}
