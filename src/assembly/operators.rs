//! Weak forms of common model problems.
use crate::nalgebra::{Point2, Scalar, Vector2};
use crate::space::FieldFunction;
use crate::Real;
use std::sync::Arc;

mod darcy;
mod elasticity;
mod heat;
mod laplace;
mod navier_stokes;
mod p_laplace;
mod stokes;

pub use darcy::*;
pub use elasticity::*;
pub use heat::*;
pub use laplace::*;
pub use navier_stokes::*;
pub use p_laplace::*;
pub use stokes::*;

/// How the Jacobian of a nonlinear form is computed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum JacobianMode {
    /// Hand-coded linearization.
    Explicit,
    /// Forward-mode automatic differentiation of the residual.
    #[default]
    AutomaticDifferentiation,
}

/// Wraps a scalar function of space and time as a [`FieldFunction`].
pub fn scalar_function<T: Real>(f: impl Fn(&Point2<T>, T) -> T + Send + Sync + 'static) -> FieldFunction<T> {
    Arc::new(move |x, t| Vector2::new(f(x, t), T::zero()))
}

/// Wraps a vector-valued function of space and time as a [`FieldFunction`].
pub fn vector_function<T: Real>(
    f: impl Fn(&Point2<T>, T) -> Vector2<T> + Send + Sync + 'static,
) -> FieldFunction<T> {
    Arc::new(f)
}

/// Natural boundary data, one function per boundary tag.
pub(crate) type BoundaryData<T> = Vec<(String, FieldFunction<T>)>;

pub(crate) fn boundary_tags<T: Scalar>(data: &BoundaryData<T>) -> Vec<String> {
    data.iter().map(|(tag, _)| tag.clone()).collect()
}

/// Evaluates the boundary function of the given tag, or zero if the tag carries no data.
pub(crate) fn boundary_value<T: Real>(data: &BoundaryData<T>, tag: &str, x: &Point2<T>, t: T) -> Vector2<T> {
    data.iter()
        .filter(|(name, _)| name == tag)
        .fold(Vector2::zeros(), |acc, (_, g)| acc + g(x, t))
}
