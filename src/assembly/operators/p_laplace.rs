use crate::assembly::operators::JacobianMode;
use crate::dual::FormScalar;
use crate::form::{linearize_by_ad, FieldPoint, PointContext, TestCoefficients, WeakForm};
use crate::nalgebra::{Point2, Scalar, Vector2};
use crate::space::FieldFunction;
use crate::Real;
use galerkin_traits::real;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// The regularized p-Laplacian `-div((eps^2 + |grad u|^2)^((p - 2) / 2) grad u) = f`.
#[derive(Clone)]
pub struct PLaplaceForm<T: Scalar> {
    p: T,
    epsilon: T,
    source: Option<FieldFunction<T>>,
    jacobian: JacobianMode,
}

impl<T: Real> Debug for PLaplaceForm<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PLaplaceForm")
            .field("p", &self.p)
            .field("epsilon", &self.epsilon)
            .field("jacobian", &self.jacobian)
            .finish_non_exhaustive()
    }
}

impl<T: Real> PLaplaceForm<T> {
    pub fn new(p: T) -> Self {
        Self {
            p,
            epsilon: real(1e-3),
            source: None,
            jacobian: JacobianMode::default(),
        }
    }

    pub fn with_regularization(mut self, epsilon: T) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_source(mut self, f: impl Fn(&Point2<T>, T) -> T + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(move |x, t| Vector2::new(f(x, t), T::zero())));
        self
    }

    pub fn with_jacobian(mut self, mode: JacobianMode) -> Self {
        self.jacobian = mode;
        self
    }

    pub fn p(&self) -> T {
        self.p
    }

    /// The diffusion coefficient `(eps^2 + |grad u|^2)^((p - 2) / 2)`.
    fn coefficient<S: FormScalar<T>>(&self, grad_u: &Vector2<S>) -> S {
        let epsilon = S::from_real(self.epsilon);
        let exponent = (self.p - real(2.0)) * real(0.5);
        (epsilon * epsilon + grad_u.dot(grad_u)).powf(exponent)
    }
}

impl<T: Real> WeakForm<T> for PLaplaceForm<T> {
    fn num_fields(&self) -> usize {
        1
    }

    fn residual<S: FormScalar<T>>(&self, ctx: &PointContext<T>, u: &[FieldPoint<S>], f: &mut [TestCoefficients<S>]) {
        let grad_u = u[0].scalar_grad();
        let source = self
            .source
            .as_ref()
            .map(|f| f(&ctx.x, ctx.time).x)
            .unwrap_or_else(T::zero);
        f[0].set_scalar(-S::from_real(source), grad_u * self.coefficient(&grad_u));
    }

    fn linearized(
        &self,
        ctx: &PointContext<T>,
        u: &[FieldPoint<T>],
        du: &[FieldPoint<T>],
        df: &mut [TestCoefficients<T>],
    ) {
        match self.jacobian {
            JacobianMode::AutomaticDifferentiation => linearize_by_ad(self, ctx, u, du, df),
            JacobianMode::Explicit => {
                // d/du [a(s) g] with s = eps^2 + |g|^2 and a(s) = s^((p - 2) / 2)
                let g = u[0].scalar_grad();
                let dg = du[0].scalar_grad();
                let s = self.epsilon * self.epsilon + g.dot(&g);
                let a = self.coefficient(&g);
                let da_ds = (self.p - real(2.0)) * real(0.5) * a / s;
                let d_flux = dg * a + g * (da_ds * real(2.0) * g.dot(&dg));
                df[0].set_scalar(T::zero(), d_flux);
            }
        }
    }
}
