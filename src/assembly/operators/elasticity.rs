use crate::assembly::operators::{boundary_tags, boundary_value, BoundaryData};
use crate::dual::FormScalar;
use crate::form::{FieldPoint, PointContext, TestCoefficients, WeakForm};
use crate::nalgebra::{Matrix2, Point2, Scalar, Vector2};
use crate::space::FieldFunction;
use crate::Real;
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Lamé parameters of an isotropic linear elastic material.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct LameParameters<T> {
    pub lambda: T,
    pub mu: T,
}

impl<T: Real> LameParameters<T> {
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn from_young_poisson(young: T, poisson: T) -> Self {
        Self {
            lambda: young * poisson / ((1.0 + poisson) * (1.0 - 2.0 * poisson)),
            mu: young / (2.0 * (1.0 + poisson)),
        }
    }
}

/// Linear elasticity `-div(sigma(u)) = b` with `sigma = lambda tr(eps) I + 2 mu eps` and
/// `eps = sym(grad u)`, for a two-component displacement field.
///
/// Tractions `sigma n = t` may be prescribed on tagged boundaries.
#[derive(Clone)]
pub struct LinearElasticityForm<T: Scalar> {
    parameters: LameParameters<T>,
    body_force: Option<FieldFunction<T>>,
    traction: BoundaryData<T>,
}

impl<T: Real> Debug for LinearElasticityForm<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearElasticityForm")
            .field("parameters", &self.parameters)
            .field("traction_tags", &boundary_tags(&self.traction))
            .finish_non_exhaustive()
    }
}

impl<T: Real> LinearElasticityForm<T> {
    pub fn new(parameters: LameParameters<T>) -> Self {
        Self {
            parameters,
            body_force: None,
            traction: Vec::new(),
        }
    }

    pub fn with_body_force(mut self, b: impl Fn(&Point2<T>, T) -> Vector2<T> + Send + Sync + 'static) -> Self {
        self.body_force = Some(Arc::new(b));
        self
    }

    pub fn with_traction(
        mut self,
        tag: impl Into<String>,
        t: impl Fn(&Point2<T>, T) -> Vector2<T> + Send + Sync + 'static,
    ) -> Self {
        self.traction.push((tag.into(), Arc::new(t)));
        self
    }

    pub fn parameters(&self) -> &LameParameters<T> {
        &self.parameters
    }

    pub fn stress<S: FormScalar<T>>(&self, grad_u: &Matrix2<S>) -> Matrix2<S> {
        let lambda = S::from_real(self.parameters.lambda);
        let mu = S::from_real(self.parameters.mu);
        let two = S::constant(2.0);
        let strain = (grad_u + grad_u.transpose()) / two;
        Matrix2::identity() * (lambda * strain.trace()) + strain * (two * mu)
    }
}

impl<T: Real> WeakForm<T> for LinearElasticityForm<T> {
    fn num_fields(&self) -> usize {
        1
    }

    fn residual<S: FormScalar<T>>(&self, ctx: &PointContext<T>, u: &[FieldPoint<S>], f: &mut [TestCoefficients<S>]) {
        let b = self
            .body_force
            .as_ref()
            .map(|b| b(&ctx.x, ctx.time))
            .unwrap_or_else(Vector2::zeros);
        f[0].f0 = -b.map(S::from_real);
        f[0].f1 = self.stress(&u[0].grad);
    }

    fn linearized(
        &self,
        _ctx: &PointContext<T>,
        _u: &[FieldPoint<T>],
        du: &[FieldPoint<T>],
        df: &mut [TestCoefficients<T>],
    ) {
        df[0].f0 = Vector2::zeros();
        df[0].f1 = self.stress(&du[0].grad);
    }

    fn boundary_tags(&self) -> Vec<String> {
        boundary_tags(&self.traction)
    }

    fn boundary_residual<S: FormScalar<T>>(
        &self,
        tag: &str,
        ctx: &PointContext<T>,
        _normal: &Vector2<T>,
        _u: &[FieldPoint<S>],
        f: &mut [TestCoefficients<S>],
    ) {
        f[0].f0 = -boundary_value(&self.traction, tag, &ctx.x, ctx.time).map(S::from_real);
    }
}
