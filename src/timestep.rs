//! Time integration of transient problems with the θ-method.
use crate::assembly::SystemAssembler;
use crate::dual::FormScalar;
use crate::field::DiscreteField;
use crate::form::{FieldPoint, PointContext, TestCoefficients, WeakForm};
use crate::nalgebra::{DVector, Vector2};
use crate::solve::{solve_nonlinear_problem, SolveError, SolverSettings};
use crate::space::MixedSpace;
use crate::Real;
use galerkin_traits::real;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// A residual form for `M(u_t) + A(u) = 0`, depending on the unknowns and their time derivative.
pub trait TransientForm<T: Real>: Sync {
    fn num_fields(&self) -> usize;

    fn quadrature_degree(&self) -> Option<usize> {
        None
    }

    /// Evaluates `(f0, f1)` for every field, given the fields and their time derivatives.
    fn residual<S: FormScalar<T>>(
        &self,
        ctx: &PointContext<T>,
        u: &[FieldPoint<S>],
        u_t: &[FieldPoint<S>],
        f: &mut [TestCoefficients<S>],
    );

    fn boundary_tags(&self) -> Vec<String> {
        Vec::new()
    }

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

/// The residual of a single θ-step from `t_n` to `t_n + dt`, in the unknown `w = u^{n+1}`.
///
/// The transient residual is evaluated at `t_n + θ dt` with `u = θ w + (1 - θ) u^n` and
/// `u_t = (w - u^n) / dt`. The previous state `u^n` is expected as the first auxiliary set;
/// further auxiliary sets are passed on to the transient form.
#[derive(Debug, Clone, Copy)]
pub struct ThetaForm<'f, T, F> {
    form: &'f F,
    theta: T,
    time: T,
    dt: T,
}

impl<'f, T: Real, F: TransientForm<T>> ThetaForm<'f, T, F> {
    pub fn new(form: &'f F, theta: T, time: T, dt: T) -> Self {
        assert!(dt > T::zero(), "Time step must be positive");
        Self { form, theta, time, dt }
    }

    fn stage_time(&self) -> T {
        self.time + self.theta * self.dt
    }

    fn stage<S: FormScalar<T>>(&self, ctx: &PointContext<T>, w: &[FieldPoint<S>]) -> (Vec<FieldPoint<S>>, Vec<FieldPoint<S>>) {
        let theta = S::from_real(self.theta);
        let one_minus_theta = S::from_real(T::one() - self.theta);
        let inv_dt = S::from_real(T::one() / self.dt);
        w.iter()
            .zip(&ctx.aux[..w.len()])
            .map(|(w, previous)| {
                let previous = previous.lift::<S>();
                (*w * theta + previous * one_minus_theta, (*w - previous) * inv_dt)
            })
            .unzip()
    }
}

impl<'f, T: Real, F: TransientForm<T>> WeakForm<T> for ThetaForm<'f, T, F> {
    fn num_fields(&self) -> usize {
        self.form.num_fields()
    }

    fn quadrature_degree(&self) -> Option<usize> {
        self.form.quadrature_degree()
    }

    fn residual<S: FormScalar<T>>(&self, ctx: &PointContext<T>, u: &[FieldPoint<S>], f: &mut [TestCoefficients<S>]) {
        let (u_theta, u_t) = self.stage(ctx, u);
        let stage_ctx = PointContext {
            time: self.stage_time(),
            aux: &ctx.aux[u.len()..],
            ..*ctx
        };
        self.form.residual(&stage_ctx, &u_theta, &u_t, f);
    }

    fn boundary_tags(&self) -> Vec<String> {
        self.form.boundary_tags()
    }

    fn boundary_residual<S: FormScalar<T>>(
        &self,
        tag: &str,
        ctx: &PointContext<T>,
        normal: &Vector2<T>,
        u: &[FieldPoint<S>],
        f: &mut [TestCoefficients<S>],
    ) {
        let (u_theta, _) = self.stage(ctx, u);
        let stage_ctx = PointContext {
            time: self.stage_time(),
            aux: &ctx.aux[u.len()..],
            ..*ctx
        };
        self.form
            .boundary_residual(tag, &stage_ctx, normal, &u_theta, f);
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, bound(deserialize = "T: Real + Deserialize<'de>"))]
pub struct ThetaSettings<T> {
    /// 1 for backward Euler, 1/2 for Crank-Nicolson, 0 for forward Euler.
    pub theta: T,
    pub dt: T,
    pub start_time: T,
    pub final_time: T,
}

impl<T: Real> Default for ThetaSettings<T> {
    fn default() -> Self {
        Self {
            theta: T::one(),
            dt: real(0.01),
            start_time: T::zero(),
            final_time: T::one(),
        }
    }
}

/// A time step failed.
#[derive(Debug)]
pub struct StepFailure<T> {
    /// The time the failed step started from.
    pub time: T,
    /// Index of the failed step, starting at zero.
    pub step: usize,
    pub source: SolveError<T>,
}

impl<T: Display> Display for StepFailure<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "time step {} from t = {} failed: {}", self.step, self.time, self.source)
    }
}

impl<T: Debug + Display + 'static> Error for StepFailure<T> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum StepperState {
    Running,
    Finished,
    Cancelled,
    Failed,
}

/// Lazily advances a transient problem with the θ-method.
///
/// Yields `(field, t)` after every step, starting with the first step (the initial state is not
/// yielded), until the final time is reached. The last step is shortened to land exactly on the
/// final time. After a failed step the iterator yields the failure and then ends.
pub struct ThetaStepper<T: Real, F> {
    space: Arc<MixedSpace<T>>,
    form: F,
    settings: ThetaSettings<T>,
    solver: SolverSettings<T>,
    initial: DVector<T>,
    current: DVector<T>,
    aux: Vec<DVector<T>>,
    time: T,
    step: usize,
    state: StepperState,
}

impl<T: Real, F: TransientForm<T>> ThetaStepper<T, F> {
    pub fn new(initial: DiscreteField<T>, form: F, settings: ThetaSettings<T>, solver: SolverSettings<T>) -> Self {
        assert!(settings.dt > T::zero(), "Time step must be positive");
        assert!(
            settings.theta >= T::zero() && settings.theta <= T::one(),
            "theta must lie in [0, 1]"
        );
        let space = Arc::clone(initial.space());
        let initial = initial.into_coefficients();
        Self {
            space,
            form,
            settings,
            solver,
            current: initial.clone(),
            initial,
            aux: Vec::new(),
            time: settings.start_time,
            step: 0,
            state: StepperState::Running,
        }
    }

    /// Additional auxiliary coefficient vectors passed to the form after the previous state.
    pub fn with_aux(mut self, aux: Vec<DVector<T>>) -> Self {
        self.aux = aux;
        self
    }

    pub fn time(&self) -> T {
        self.time
    }

    pub fn steps_taken(&self) -> usize {
        self.step
    }

    pub fn current(&self) -> DiscreteField<T> {
        DiscreteField::new(Arc::clone(&self.space), self.current.clone())
    }

    /// Stops the iteration. Subsequent calls to `next` return `None`.
    pub fn cancel(&mut self) {
        self.state = StepperState::Cancelled;
    }

    /// Resets to the initial state and time.
    pub fn restart(&mut self) {
        self.current = self.initial.clone();
        self.time = self.settings.start_time;
        self.step = 0;
        self.state = StepperState::Running;
    }

    /// Runs all remaining steps and collects their results.
    pub fn collect_all(&mut self) -> Result<Vec<(DiscreteField<T>, T)>, StepFailure<T>> {
        self.by_ref().collect()
    }

    fn remaining(&self) -> T {
        self.settings.final_time - self.time
    }

    fn is_finished(&self) -> bool {
        let tolerance = self.settings.dt * real(1e-10);
        self.remaining() <= tolerance
    }

    fn advance(&mut self) -> Result<(DiscreteField<T>, T), SolveError<T>> {
        let remaining = self.remaining();
        // Avoid a sliver step when the remainder is barely larger than dt
        let dt = if remaining <= self.settings.dt * real(1.0 + 1e-10) {
            remaining
        } else {
            self.settings.dt
        };
        let next_time = if dt == remaining {
            self.settings.final_time
        } else {
            self.time + dt
        };

        let theta_form = ThetaForm::new(&self.form, self.settings.theta, self.time, dt);
        let mut assembler = SystemAssembler::new(&self.space, theta_form, self.solver.assembly)?;
        assembler.set_time(next_time);
        let mut aux = Vec::with_capacity(self.aux.len() + 1);
        aux.push(self.current.clone());
        aux.extend(self.aux.iter().cloned());
        assembler.set_aux(aux);

        let mut w = self.current.clone();
        let outcome = solve_nonlinear_problem(&assembler, &mut w, &self.solver)?;
        debug!("Time step {} took {} Newton iterations", self.step, outcome.iterations);

        self.current = w;
        self.time = next_time;
        self.step += 1;
        info!("Completed time step {} (t = {}, dt = {})", self.step, self.time, dt);
        Ok((self.current(), self.time))
    }
}

impl<T: Real, F: TransientForm<T>> Iterator for ThetaStepper<T, F> {
    type Item = Result<(DiscreteField<T>, T), StepFailure<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state != StepperState::Running {
            return None;
        }
        if self.is_finished() {
            self.state = StepperState::Finished;
            return None;
        }
        let (time, step) = (self.time, self.step);
        match self.advance() {
            Ok(result) => Some(Ok(result)),
            Err(source) => {
                self.state = StepperState::Failed;
                Some(Err(StepFailure { time, step, source }))
            }
        }
    }
}

impl<T: Real, F: TransientForm<T>> std::iter::FusedIterator for ThetaStepper<T, F> {}
