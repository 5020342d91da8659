//! Quadrature rules on reference cells, converted to the scalar type in use.
use crate::connectivity::CellKind;
use crate::nalgebra::{Point2, Scalar};
use crate::Real;
use galerkin_traits::real;
use num::Zero;
use std::ops::{AddAssign, Mul};

/// Errors returned by quadrature methods.
pub use galerkin_quadrature::Error as QuadratureError;

pub type QuadraturePair1d<T> = (Vec<T>, Vec<T>);

/// A two-dimensional quadrature rule on a reference cell.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureRule<T: Scalar> {
    weights: Vec<T>,
    points: Vec<Point2<T>>,
}

impl<T: Real> QuadratureRule<T> {
    /// A rule for the reference cell of the given kind that integrates polynomials of the given
    /// total degree exactly.
    pub fn for_cell(kind: CellKind, degree: usize) -> Result<Self, QuadratureError> {
        let (weights, points) = match kind {
            CellKind::Triangle => galerkin_quadrature::triangle::triangle(degree)?,
            CellKind::Quadrilateral => galerkin_quadrature::tensor::quadrilateral(degree)?,
        };
        Ok(Self {
            weights: weights.into_iter().map(real).collect(),
            points: points
                .into_iter()
                .map(|[x, y]| Point2::new(real(x), real(y)))
                .collect(),
        })
    }

    pub fn weights(&self) -> &[T] {
        &self.weights
    }

    pub fn points(&self) -> &[Point2<T>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Approximates the integral of the given function over the reference cell.
    pub fn integrate<U, Function>(&self, f: Function) -> U
    where
        Function: Fn(&Point2<T>) -> U,
        U: Zero + Mul<T, Output = U> + AddAssign<U>,
    {
        let mut integral = U::zero();
        for (w, p) in self.weights.iter().zip(&self.points) {
            integral += f(p) * *w;
        }
        integral
    }
}

/// Gauss-Legendre rule with the given number of points on `[-1, 1]`.
pub fn gauss_segment<T: Real>(num_points: usize) -> QuadraturePair1d<T> {
    let (weights, points) = galerkin_quadrature::univariate::gauss(num_points);
    (
        weights.into_iter().map(real).collect(),
        points.into_iter().map(|[t]| real(t)).collect(),
    )
}

/// Gauss-Legendre rule on `[-1, 1]` exact for polynomials of the given degree.
pub fn segment_for_degree<T: Real>(degree: usize) -> Result<QuadraturePair1d<T>, QuadratureError> {
    let (weights, points) = galerkin_quadrature::univariate::segment(degree)?;
    Ok((
        weights.into_iter().map(real).collect(),
        points.into_iter().map(|[t]| real(t)).collect(),
    ))
}
