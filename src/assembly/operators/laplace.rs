use crate::assembly::operators::{boundary_tags, boundary_value, BoundaryData};
use crate::dual::FormScalar;
use crate::form::{FieldPoint, PointContext, TestCoefficients, WeakForm};
use crate::nalgebra::{Point2, Scalar, Vector2};
use crate::space::FieldFunction;
use crate::Real;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// The Poisson problem `-div(k grad u) = f` with flux data `k du/dn = g` on tagged boundaries.
///
/// Residual density: `f0 = -f`, `f1 = k grad u`, and `-g` on the boundary.
#[derive(Clone)]
pub struct LaplaceForm<T: Scalar> {
    diffusivity: T,
    source: Option<FieldFunction<T>>,
    neumann: BoundaryData<T>,
}

impl<T: Real> Default for LaplaceForm<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> Debug for LaplaceForm<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaplaceForm")
            .field("diffusivity", &self.diffusivity)
            .field("has_source", &self.source.is_some())
            .field("neumann_tags", &boundary_tags(&self.neumann))
            .finish()
    }
}

impl<T: Real> LaplaceForm<T> {
    pub fn new() -> Self {
        Self {
            diffusivity: T::one(),
            source: None,
            neumann: Vec::new(),
        }
    }

    pub fn with_diffusivity(mut self, diffusivity: T) -> Self {
        self.diffusivity = diffusivity;
        self
    }

    pub fn with_source(mut self, f: impl Fn(&Point2<T>, T) -> T + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(move |x, t| Vector2::new(f(x, t), T::zero())));
        self
    }

    /// Prescribes the outward flux `k du/dn = g` on the tagged boundary.
    pub fn with_neumann(mut self, tag: impl Into<String>, g: impl Fn(&Point2<T>, T) -> T + Send + Sync + 'static) -> Self {
        self.neumann
            .push((tag.into(), Arc::new(move |x, t| Vector2::new(g(x, t), T::zero()))));
        self
    }

    pub fn diffusivity(&self) -> T {
        self.diffusivity
    }

    pub(crate) fn source_value(&self, x: &Point2<T>, t: T) -> T {
        self.source
            .as_ref()
            .map(|f| f(x, t).x)
            .unwrap_or_else(T::zero)
    }
}

impl<T: Real> WeakForm<T> for LaplaceForm<T> {
    fn num_fields(&self) -> usize {
        1
    }

    fn residual<S: FormScalar<T>>(&self, ctx: &PointContext<T>, u: &[FieldPoint<S>], f: &mut [TestCoefficients<S>]) {
        let k = S::from_real(self.diffusivity);
        let source = S::from_real(self.source_value(&ctx.x, ctx.time));
        f[0].set_scalar(-source, u[0].scalar_grad() * k);
    }

    fn linearized(
        &self,
        _ctx: &PointContext<T>,
        _u: &[FieldPoint<T>],
        du: &[FieldPoint<T>],
        df: &mut [TestCoefficients<T>],
    ) {
        df[0].set_scalar(T::zero(), du[0].scalar_grad() * self.diffusivity);
    }

    fn boundary_tags(&self) -> Vec<String> {
        boundary_tags(&self.neumann)
    }

    fn boundary_residual<S: FormScalar<T>>(
        &self,
        tag: &str,
        ctx: &PointContext<T>,
        _normal: &Vector2<T>,
        _u: &[FieldPoint<S>],
        f: &mut [TestCoefficients<S>],
    ) {
        let g = boundary_value(&self.neumann, tag, &ctx.x, ctx.time).x;
        f[0].f0.x = -S::from_real(g);
    }
}
