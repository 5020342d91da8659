//! Forward-mode automatic differentiation.
//!
//! Weak forms are written generically over a [`FormScalar`], so that the same pointwise residual
//! can be evaluated on plain real numbers and on dual numbers `a + b eps` with `eps^2 = 0`.
//! Evaluating a residual at `u + eps du` yields its directional derivative in the `eps` part.
use crate::nalgebra::{ClosedAdd, ClosedDiv, ClosedMul, ClosedSub, ComplexField, Scalar};
use crate::Real;
use galerkin_traits::real;
use num::{One, Zero};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// Scalar type a weak form can be evaluated on.
pub trait FormScalar<T: Real>:
    Scalar + Copy + Zero + One + ClosedAdd + ClosedSub + ClosedMul + ClosedDiv + Neg<Output = Self> + Send + Sync
{
    fn from_real(value: T) -> Self;

    /// The value with any derivative information discarded.
    fn real(&self) -> T;

    fn sqrt(self) -> Self;

    fn powf(self, exponent: T) -> Self;

    /// Convenience conversion of `f64` constants.
    fn constant(value: f64) -> Self {
        Self::from_real(real(value))
    }
}

impl<T: Real> FormScalar<T> for T {
    fn from_real(value: T) -> Self {
        value
    }

    fn real(&self) -> T {
        *self
    }

    fn sqrt(self) -> Self {
        <T as ComplexField>::sqrt(self)
    }

    fn powf(self, exponent: T) -> Self {
        <T as ComplexField>::powf(self, exponent)
    }
}

/// A dual number `re + eps * eps_unit`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Dual<T> {
    pub re: T,
    pub eps: T,
}

impl<T: Real> Dual<T> {
    pub fn new(re: T, eps: T) -> Self {
        Self { re, eps }
    }

    /// A dual number without derivative part.
    pub fn constant(re: T) -> Self {
        Self { re, eps: T::zero() }
    }
}

impl<T: Real> Display for Dual<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} + {}eps", self.re, self.eps)
    }
}

impl<T: Real> Add for Dual<T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.re + rhs.re, self.eps + rhs.eps)
    }
}

impl<T: Real> Sub for Dual<T> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.re - rhs.re, self.eps - rhs.eps)
    }
}

impl<T: Real> Mul for Dual<T> {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::new(self.re * rhs.re, self.re * rhs.eps + self.eps * rhs.re)
    }
}

impl<T: Real> Div for Dual<T> {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        let re = self.re / rhs.re;
        Self::new(re, (self.eps - re * rhs.eps) / rhs.re)
    }
}

impl<T: Real> Neg for Dual<T> {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.re, -self.eps)
    }
}

impl<T: Real> AddAssign for Dual<T> {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<T: Real> SubAssign for Dual<T> {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<T: Real> MulAssign for Dual<T> {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl<T: Real> DivAssign for Dual<T> {
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

impl<T: Real> Zero for Dual<T> {
    fn zero() -> Self {
        Self::constant(T::zero())
    }

    fn is_zero(&self) -> bool {
        self.re.is_zero() && self.eps.is_zero()
    }
}

impl<T: Real> One for Dual<T> {
    fn one() -> Self {
        Self::constant(T::one())
    }
}

impl<T: Real> FormScalar<T> for Dual<T> {
    fn from_real(value: T) -> Self {
        Self::constant(value)
    }

    fn real(&self) -> T {
        self.re
    }

    fn sqrt(self) -> Self {
        let root = <T as ComplexField>::sqrt(self.re);
        Self::new(root, self.eps / (root + root))
    }

    fn powf(self, exponent: T) -> Self {
        let power = <T as ComplexField>::powf(self.re, exponent - T::one());
        Self::new(power * self.re, exponent * power * self.eps)
    }
}
