use crate::dual::FormScalar;
use crate::form::{FieldPoint, PointContext, TestCoefficients};
use crate::nalgebra::{Point2, Scalar, Vector2};
use crate::space::FieldFunction;
use crate::timestep::TransientForm;
use crate::Real;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// The heat equation `u_t - div(k grad u) = f`.
#[derive(Clone)]
pub struct HeatForm<T: Scalar> {
    diffusivity: T,
    source: Option<FieldFunction<T>>,
}

impl<T: Real> Debug for HeatForm<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeatForm")
            .field("diffusivity", &self.diffusivity)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

impl<T: Real> HeatForm<T> {
    pub fn new(diffusivity: T) -> Self {
        Self {
            diffusivity,
            source: None,
        }
    }

    /// Sets a source term, which may depend on time.
    pub fn with_source(mut self, f: impl Fn(&Point2<T>, T) -> T + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(move |x, t| Vector2::new(f(x, t), T::zero())));
        self
    }

    pub fn diffusivity(&self) -> T {
        self.diffusivity
    }
}

impl<T: Real> TransientForm<T> for HeatForm<T> {
    fn num_fields(&self) -> usize {
        1
    }

    fn residual<S: FormScalar<T>>(
        &self,
        ctx: &PointContext<T>,
        u: &[FieldPoint<S>],
        u_t: &[FieldPoint<S>],
        f: &mut [TestCoefficients<S>],
    ) {
        let source = self
            .source
            .as_ref()
            .map(|f| f(&ctx.x, ctx.time).x)
            .unwrap_or_else(T::zero);
        let k = S::from_real(self.diffusivity);
        f[0].set_scalar(u_t[0].scalar() - S::from_real(source), u[0].scalar_grad() * k);
    }
}
