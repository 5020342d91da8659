//! Pointwise weak forms.
//!
//! A weak form is described by its residual density in the "f0/f1" convention. For test
//! functions `v_f` of each field `f`, the residual is
//!
//! ```text
//! r(u)(v) = sum_f int f0_f(x, u, grad u) . v_f + f1_f(x, u, grad u) : grad v_f dx
//!         + sum_tags int_tag g0_f(x, u, grad u, n) . v_f ds,
//! ```
//!
//! where `u` collects the values and gradients of all fields at the point. Forms implement
//! [`WeakForm::residual`] generically over a [`FormScalar`], which gives the Jacobian by
//! forward-mode automatic differentiation unless [`WeakForm::linearized`] is overridden.
use crate::dual::{Dual, FormScalar};
use crate::nalgebra::{ClosedAdd, ClosedDiv, ClosedMul, ClosedSub, Matrix2, Point2, Scalar, Vector2};
use crate::Real;
use num::{One, Zero};
use std::ops::{Add, Mul, Sub};

pub mod expression;

/// Value and gradient of a (scalar or two-component) field at a point.
///
/// Scalar fields store their value in the first component and their gradient in the first row,
/// so `grad[(i, j)] = d value_i / d x_j` holds in both cases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldPoint<S: Scalar> {
    pub value: Vector2<S>,
    pub grad: Matrix2<S>,
}

impl<S> FieldPoint<S>
where
    S: Scalar + Copy + Zero + One + ClosedAdd + ClosedSub + ClosedMul + ClosedDiv,
{
    pub fn zero() -> Self {
        Self {
            value: Vector2::zeros(),
            grad: Matrix2::zeros(),
        }
    }

    pub fn from_scalar(value: S, gradient: Vector2<S>) -> Self {
        Self {
            value: Vector2::new(value, S::zero()),
            grad: Matrix2::new(gradient.x, gradient.y, S::zero(), S::zero()),
        }
    }

    pub fn scalar(&self) -> S {
        self.value.x
    }

    pub fn scalar_grad(&self) -> Vector2<S> {
        Vector2::new(self.grad[(0, 0)], self.grad[(0, 1)])
    }

    pub fn div(&self) -> S {
        self.grad[(0, 0)] + self.grad[(1, 1)]
    }

    pub fn sym_grad(&self) -> Matrix2<S> {
        let two = S::one() + S::one();
        (self.grad + self.grad.transpose()) / two
    }

    /// Places the first component of a scalar point into the given component.
    pub fn into_component(self, component: usize) -> Self {
        let mut point = Self::zero();
        point.value[component] = self.value.x;
        point.grad.set_row(component, &self.grad.row(0));
        point
    }
}

impl<T: Real> FieldPoint<T> {
    /// Converts to a point over another form scalar, without derivative information.
    pub fn lift<S: FormScalar<T>>(&self) -> FieldPoint<S> {
        FieldPoint {
            value: self.value.map(S::from_real),
            grad: self.grad.map(S::from_real),
        }
    }

    /// The dual point `self + eps * direction`.
    pub fn with_direction(&self, direction: &FieldPoint<T>) -> FieldPoint<Dual<T>> {
        FieldPoint {
            value: self.value.zip_map(&direction.value, Dual::new),
            grad: self.grad.zip_map(&direction.grad, Dual::new),
        }
    }
}

impl<S> Add for FieldPoint<S>
where
    S: Scalar + ClosedAdd,
{
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            value: self.value + rhs.value,
            grad: self.grad + rhs.grad,
        }
    }
}

impl<S> Sub for FieldPoint<S>
where
    S: Scalar + ClosedSub,
{
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            value: self.value - rhs.value,
            grad: self.grad - rhs.grad,
        }
    }
}

impl<S> Mul<S> for FieldPoint<S>
where
    S: Scalar + Copy + ClosedMul,
{
    type Output = Self;

    fn mul(self, rhs: S) -> Self {
        Self {
            value: self.value * rhs,
            grad: self.grad * rhs,
        }
    }
}

/// The coefficients `(f0, f1)` multiplying a test function and its gradient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestCoefficients<S: Scalar> {
    pub f0: Vector2<S>,
    pub f1: Matrix2<S>,
}

impl<S> TestCoefficients<S>
where
    S: Scalar + Copy + Zero + One + ClosedAdd + ClosedSub + ClosedMul + ClosedDiv,
{
    pub fn zero() -> Self {
        Self {
            f0: Vector2::zeros(),
            f1: Matrix2::zeros(),
        }
    }

    /// Sets the coefficients of a scalar test function.
    pub fn set_scalar(&mut self, f0: S, f1: Vector2<S>) {
        *self = FieldPoint::from_scalar(f0, f1).into();
    }

    /// `f0 . v + f1 : grad v`.
    pub fn contract(&self, test: &FieldPoint<S>) -> S {
        self.f0.dot(&test.value) + self.f1.component_mul(&test.grad).sum()
    }
}

impl<S: Scalar> From<FieldPoint<S>> for TestCoefficients<S> {
    fn from(point: FieldPoint<S>) -> Self {
        Self {
            f0: point.value,
            f1: point.grad,
        }
    }
}

impl<T: Real> TestCoefficients<Dual<T>> {
    pub fn real_part(&self) -> TestCoefficients<T> {
        TestCoefficients {
            f0: self.f0.map(|d| d.re),
            f1: self.f1.map(|d| d.re),
        }
    }

    pub fn eps_part(&self) -> TestCoefficients<T> {
        TestCoefficients {
            f0: self.f0.map(|d| d.eps),
            f1: self.f1.map(|d| d.eps),
        }
    }
}

/// Data known at a quadrature point, independently of the unknowns.
#[derive(Debug, Clone, Copy)]
pub struct PointContext<'a, T: Scalar> {
    /// Physical coordinates.
    pub x: Point2<T>,
    pub time: T,
    pub cell: usize,
    /// Auxiliary fields (previous time steps, coefficients). Set `k` of the auxiliary coefficient
    /// vectors occupies `aux[k * num_fields..(k + 1) * num_fields]`.
    pub aux: &'a [FieldPoint<T>],
}

/// A residual form over one or more fields.
pub trait WeakForm<T: Real>: Sync {
    /// Number of fields the form couples. Must match the space it is assembled on.
    fn num_fields(&self) -> usize;

    /// Minimum quadrature degree needed to integrate the form accurately, if known.
    fn quadrature_degree(&self) -> Option<usize> {
        None
    }

    /// Evaluates `(f0, f1)` for every field.
    fn residual<S: FormScalar<T>>(&self, ctx: &PointContext<T>, u: &[FieldPoint<S>], f: &mut [TestCoefficients<S>]);

    /// Directional derivative of [`residual`](Self::residual) at `u` in the direction `du`.
    ///
    /// Computed by automatic differentiation unless overridden.
    fn linearized(
        &self,
        ctx: &PointContext<T>,
        u: &[FieldPoint<T>],
        du: &[FieldPoint<T>],
        df: &mut [TestCoefficients<T>],
    ) {
        linearize_by_ad(self, ctx, u, du, df)
    }

    /// Tags of the boundary parts carrying natural (Neumann) terms.
    fn boundary_tags(&self) -> Vec<String> {
        Vec::new()
    }

    /// Boundary density on the tagged edge. Only `f0` is used.
    #[allow(unused_variables)]
    fn boundary_residual<S: FormScalar<T>>(
        &self,
        tag: &str,
        ctx: &PointContext<T>,
        normal: &Vector2<T>,
        u: &[FieldPoint<S>],
        f: &mut [TestCoefficients<S>],
    ) {
    }
}

/// Linearizes the residual of a form by forward-mode automatic differentiation.
pub fn linearize_by_ad<T, F>(
    form: &F,
    ctx: &PointContext<T>,
    u: &[FieldPoint<T>],
    du: &[FieldPoint<T>],
    df: &mut [TestCoefficients<T>],
) where
    T: Real,
    F: WeakForm<T> + ?Sized,
{
    let u_dual: Vec<_> = u.iter().zip(du).map(|(u, du)| u.with_direction(du)).collect();
    let mut f_dual = vec![TestCoefficients::zero(); df.len()];
    form.residual(ctx, &u_dual, &mut f_dual);
    for (df, f) in df.iter_mut().zip(&f_dual) {
        *df = f.eps_part();
    }
}

/// Linearizes the boundary residual of a form by forward-mode automatic differentiation.
pub fn linearize_boundary_by_ad<T, F>(
    form: &F,
    tag: &str,
    ctx: &PointContext<T>,
    normal: &Vector2<T>,
    u: &[FieldPoint<T>],
    du: &[FieldPoint<T>],
    df: &mut [TestCoefficients<T>],
) where
    T: Real,
    F: WeakForm<T> + ?Sized,
{
    let u_dual: Vec<_> = u.iter().zip(du).map(|(u, du)| u.with_direction(du)).collect();
    let mut f_dual = vec![TestCoefficients::zero(); df.len()];
    form.boundary_residual(tag, ctx, normal, &u_dual, &mut f_dual);
    for (df, f) in df.iter_mut().zip(&f_dual) {
        *df = f.eps_part();
    }
}

impl<'a, T: Real, F: WeakForm<T>> WeakForm<T> for &'a F {
    fn num_fields(&self) -> usize {
        F::num_fields(self)
    }

    fn quadrature_degree(&self) -> Option<usize> {
        F::quadrature_degree(self)
    }

    fn residual<S: FormScalar<T>>(&self, ctx: &PointContext<T>, u: &[FieldPoint<S>], f: &mut [TestCoefficients<S>]) {
        F::residual(self, ctx, u, f)
    }

    fn linearized(
        &self,
        ctx: &PointContext<T>,
        u: &[FieldPoint<T>],
        du: &[FieldPoint<T>],
        df: &mut [TestCoefficients<T>],
    ) {
        F::linearized(self, ctx, u, du, df)
    }

    fn boundary_tags(&self) -> Vec<String> {
        F::boundary_tags(self)
    }

    fn boundary_residual<S: FormScalar<T>>(
        &self,
        tag: &str,
        ctx: &PointContext<T>,
        normal: &Vector2<T>,
        u: &[FieldPoint<S>],
        f: &mut [TestCoefficients<S>],
    ) {
        F::boundary_residual(self, tag, ctx, normal, u, f)
    }
}
