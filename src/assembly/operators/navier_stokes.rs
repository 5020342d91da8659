use crate::assembly::operators::stokes::{body_force_at, stokes_terms};
use crate::dual::FormScalar;
use crate::form::{FieldPoint, PointContext, TestCoefficients, WeakForm};
use crate::nalgebra::{Point2, Scalar, Vector2};
use crate::space::FieldFunction;
use crate::Real;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Steady incompressible Navier-Stokes flow on the fields `[velocity, pressure]`.
///
/// Extends [`StokesForm`](super::StokesForm) by the convective term `((grad u) u) . v`. The
/// Jacobian is obtained by automatic differentiation, which gives the full Newton linearization
/// `(grad du) u + (grad u) du`.
#[derive(Clone)]
pub struct NavierStokesForm<T: Scalar> {
    viscosity: T,
    body_force: Option<FieldFunction<T>>,
}

impl<T: Real> Debug for NavierStokesForm<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavierStokesForm")
            .field("viscosity", &self.viscosity)
            .field("has_body_force", &self.body_force.is_some())
            .finish()
    }
}

impl<T: Real> NavierStokesForm<T> {
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

impl<T: Real> WeakForm<T> for NavierStokesForm<T> {
    fn num_fields(&self) -> usize {
        2
    }

    fn residual<S: FormScalar<T>>(&self, ctx: &PointContext<T>, u: &[FieldPoint<S>], f: &mut [TestCoefficients<S>]) {
        let velocity = &u[0];
        stokes_terms(self.viscosity, velocity, &u[1], f);
        let convection = velocity.grad * velocity.value;
        f[0].f0 = convection - body_force_at::<T, S>(&self.body_force, ctx);
    }
}
