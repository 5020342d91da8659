use crate::dual::FormScalar;
use crate::form::{FieldPoint, PointContext, TestCoefficients, WeakForm};
use crate::nalgebra::{Matrix2, Point2, Scalar, Vector2};
use crate::space::FieldFunction;
use crate::Real;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Steady Stokes flow on the fields `[velocity, pressure]`:
///
/// ```text
/// int nu grad u : grad v - p div v - f . v dx = 0,
/// int -q div u dx = 0.
/// ```
#[derive(Clone)]
pub struct StokesForm<T: Scalar> {
    viscosity: T,
    body_force: Option<FieldFunction<T>>,
}

impl<T: Real> Debug for StokesForm<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("StokesForm")
            .field("viscosity", &self.viscosity)
            .field("has_body_force", &self.body_force.is_some())
            .finish()
    }
}

impl<T: Real> StokesForm<T> {
    pub fn new(viscosity: T) -> Self {
        Self {
            viscosity,
            body_force: None,
        }
    }

    pub fn with_body_force(mut self, f: impl Fn(&Point2<T>, T) -> Vector2<T> + Send + Sync + 'static) -> Self {
        self.body_force = Some(Arc::new(f));
        self
    }

    pub fn viscosity(&self) -> T {
        self.viscosity
    }
}

/// Body force at the point, as a form scalar.
pub(crate) fn body_force_at<T: Real, S: FormScalar<T>>(force: &Option<FieldFunction<T>>, ctx: &PointContext<T>) -> Vector2<S> {
    force
        .as_ref()
        .map(|f| f(&ctx.x, ctx.time))
        .unwrap_or_else(Vector2::zeros)
        .map(S::from_real)
}

/// The viscous stress and incompressibility terms shared by Stokes and Navier-Stokes.
pub(crate) fn stokes_terms<T: Real, S: FormScalar<T>>(
    viscosity: T,
    velocity: &FieldPoint<S>,
    pressure: &FieldPoint<S>,
    f: &mut [TestCoefficients<S>],
) {
    let nu = S::from_real(viscosity);
    f[0].f1 = velocity.grad * nu - Matrix2::identity() * pressure.scalar();
    f[1].set_scalar(-velocity.div(), Vector2::zeros());
}

impl<T: Real> WeakForm<T> for StokesForm<T> {
    fn num_fields(&self) -> usize {
        2
    }

    fn residual<S: FormScalar<T>>(&self, ctx: &PointContext<T>, u: &[FieldPoint<S>], f: &mut [TestCoefficients<S>]) {
        stokes_terms(self.viscosity, &u[0], &u[1], f);
        f[0].f0 = -body_force_at::<T, S>(&self.body_force, ctx);
    }

    fn linearized(
        &self,
        _ctx: &PointContext<T>,
        _u: &[FieldPoint<T>],
        du: &[FieldPoint<T>],
        df: &mut [TestCoefficients<T>],
    ) {
        stokes_terms(self.viscosity, &du[0], &du[1], df);
        df[0].f0 = Vector2::zeros();
    }
}
