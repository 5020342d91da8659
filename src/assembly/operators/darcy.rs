use crate::assembly::operators::{boundary_tags, boundary_value, BoundaryData};
use crate::dual::FormScalar;
use crate::form::{FieldPoint, PointContext, TestCoefficients, WeakForm};
use crate::nalgebra::{Matrix2, Point2, Scalar, Vector2};
use crate::space::FieldFunction;
use crate::Real;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Mixed Darcy flow on the fields `[flux, pressure]`, with `sigma = -k grad p` and
/// `div sigma = f`:
///
/// ```text
/// int k^-1 sigma . tau - p div tau dx + int_tag g tau . n ds = 0,
/// int (div sigma - f) q dx = 0.
/// ```
///
/// The pressure `g` on the boundary is natural; untagged boundaries have zero pressure. The
/// flux is discretized with Raviart-Thomas elements and the pressure with discontinuous elements.
#[derive(Clone)]
pub struct DarcyForm<T: Scalar> {
    permeability: T,
    source: Option<FieldFunction<T>>,
    pressure: BoundaryData<T>,
}

impl<T: Real> Debug for DarcyForm<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DarcyForm")
            .field("permeability", &self.permeability)
            .field("pressure_tags", &boundary_tags(&self.pressure))
            .finish_non_exhaustive()
    }
}

impl<T: Real> DarcyForm<T> {
    pub fn new(permeability: T) -> Self {
        Self {
            permeability,
            source: None,
            pressure: Vec::new(),
        }
    }

    pub fn with_source(mut self, f: impl Fn(&Point2<T>, T) -> T + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(move |x, t| Vector2::new(f(x, t), T::zero())));
        self
    }

    /// Prescribes the pressure on the tagged boundary.
    pub fn with_boundary_pressure(
        mut self,
        tag: impl Into<String>,
        g: impl Fn(&Point2<T>, T) -> T + Send + Sync + 'static,
    ) -> Self {
        self.pressure
            .push((tag.into(), Arc::new(move |x, t| Vector2::new(g(x, t), T::zero()))));
        self
    }

    pub fn permeability(&self) -> T {
        self.permeability
    }

    pub(crate) fn source_value(&self, x: &Point2<T>, t: T) -> T {
        self.source
            .as_ref()
            .map(|f| f(x, t).x)
            .unwrap_or_else(T::zero)
    }
}

impl<T: Real> WeakForm<T> for DarcyForm<T> {
    fn num_fields(&self) -> usize {
        2
    }

    fn residual<S: FormScalar<T>>(&self, ctx: &PointContext<T>, u: &[FieldPoint<S>], f: &mut [TestCoefficients<S>]) {
        let (flux, pressure) = (&u[0], &u[1]);
        let resistance = S::from_real(T::one() / self.permeability);
        f[0].f0 = flux.value * resistance;
        f[0].f1 = Matrix2::identity() * (-pressure.scalar());
        let source = S::from_real(self.source_value(&ctx.x, ctx.time));
        f[1].set_scalar(flux.div() - source, Vector2::zeros());
    }

    fn linearized(
        &self,
        _ctx: &PointContext<T>,
        _u: &[FieldPoint<T>],
        du: &[FieldPoint<T>],
        df: &mut [TestCoefficients<T>],
    ) {
        let (flux, pressure) = (&du[0], &du[1]);
        df[0].f0 = flux.value / self.permeability;
        df[0].f1 = Matrix2::identity() * (-pressure.scalar());
        df[1].set_scalar(flux.div(), Vector2::zeros());
    }

    fn boundary_tags(&self) -> Vec<String> {
        boundary_tags(&self.pressure)
    }

    fn boundary_residual<S: FormScalar<T>>(
        &self,
        tag: &str,
        ctx: &PointContext<T>,
        normal: &Vector2<T>,
        _u: &[FieldPoint<S>],
        f: &mut [TestCoefficients<S>],
    ) {
        let g = boundary_value(&self.pressure, tag, &ctx.x, ctx.time).x;
        f[0].f0 = (normal * g).map(S::from_real);
    }
}
