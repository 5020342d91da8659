//! Quadrature rules for finite element reference domains.
//!
//! Rules are plain `f64` data so that they can be used independently of `galerkin`. The reference
//! domains are
//!
//! - the interval `[-1, 1]`,
//! - the quadrilateral `[-1, 1]^2`,
//! - the triangle with corners `(-1, -1)`, `(1, -1)` and `(-1, 1)`.
//!
//! Rules are selected by the polynomial *degree* they must integrate exactly, which is the
//! quantity a finite element assembler actually knows about.

use std::fmt;
use std::fmt::{Display, Formatter};

pub mod tensor;
pub mod triangle;
pub mod univariate;

/// Library-wide error type.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Indicates that a rule satisfying the given requirements is not available.
    NoRuleAvailable { degree: usize },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRuleAvailable { degree } => {
                write!(f, "There is no quadrature rule of degree {} available", degree)
            }
        }
    }
}

impl std::error::Error for Error {}

/// Maximum polynomial degree for which rules are generated.
///
/// Gauss rules with many points are perfectly well-defined, but a degree this high in an
/// assembly context is almost certainly a bug in the caller.
pub const MAX_DEGREE: usize = 60;

/// A D-dimensional point.
pub type Point<const D: usize> = [f64; D];

/// A D-dimensional rule, stored as `(weights, points)`.
pub type Rule<const D: usize> = (Vec<f64>, Vec<Point<D>>);

/// A one-dimensional rule.
pub type Rule1d = Rule<1>;

/// A two-dimensional rule.
pub type Rule2d = Rule<2>;

/// Integrates `f` with the given rule.
pub fn integrate<const D: usize>(rule: &Rule<D>, f: impl Fn(&Point<D>) -> f64) -> f64 {
    let (weights, points) = rule;
    weights
        .iter()
        .zip(points)
        .map(|(w, p)| w * f(p))
        .sum()
}

/// The number of Gauss points needed to integrate polynomials of the given degree exactly.
pub fn gauss_points_for_degree(degree: usize) -> usize {
    // n Gauss points integrate degree 2n - 1 exactly
    (degree + 2) / 2
}

pub(crate) fn check_degree(degree: usize) -> Result<(), Error> {
    if degree > MAX_DEGREE {
        Err(Error::NoRuleAvailable { degree })
    } else {
        Ok(())
    }
}
