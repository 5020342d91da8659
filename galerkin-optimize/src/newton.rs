use crate::calculus::{DifferentiableVectorFunction, FunctionError, VectorFunction};
use galerkin_traits::Real;
use itertools::iterate;
use log::{debug, info, warn};
use nalgebra::{DVector, DVectorView, DVectorViewMut, Scalar};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display};

/// Settings controlling termination of Newton's method.
///
/// The iteration has converged once
/// `|F(x_k)| <= max(absolute_tolerance, relative_tolerance * |F(x_0)|)`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewtonSettings<T> {
    /// Hard cap on the number of Newton steps.
    pub max_iterations: usize,
    pub absolute_tolerance: T,
    pub relative_tolerance: T,
    /// The iteration is declared divergent once the residual norm exceeds
    /// `divergence_factor` times the initial residual norm (or becomes non-finite).
    pub divergence_factor: T,
}

impl<T: Real> Default for NewtonSettings<T> {
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn default() -> Self {
        Self {
            max_iterations: 20,
            absolute_tolerance: 1e-10,
            relative_tolerance: 1e-10,
            divergence_factor: 1e10,
        }
    }
}

impl<T: Real> NewtonSettings<T> {
    /// The effective tolerance given the norm of the initial residual.
    pub fn tolerance(&self, initial_residual_norm: T) -> T {
        self.absolute_tolerance
            .max(self.relative_tolerance * initial_residual_norm)
    }
}

/// Life cycle of a Newton solve.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NewtonState {
    Initialized,
    Iterating,
    Converged,
    /// Terminated without convergence before the iteration cap: the residual blew up,
    /// the Jacobian system could not be solved or the line search found no acceptable step.
    Diverged,
    MaxIterExceeded,
}

/// Summary of a successful Newton solve.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NewtonOutcome<T> {
    pub iterations: usize,
    pub initial_residual_norm: T,
    pub residual_norm: T,
    pub tolerance: T,
}

#[derive(Debug)]
pub enum NewtonError<T> {
    /// The procedure failed because the maximum number of iterations was reached.
    MaximumIterationsReached {
        iterations: usize,
        residual_norm: T,
        tolerance: T,
    },
    /// The residual norm grew beyond the divergence threshold or became non-finite.
    Diverged {
        iterations: usize,
        residual_norm: T,
        tolerance: T,
    },
    /// Evaluating the function itself failed.
    FunctionError { iterations: usize, source: FunctionError },
    /// The procedure failed because solving the Jacobian system failed.
    JacobianError {
        iterations: usize,
        residual_norm: T,
        tolerance: T,
        source: FunctionError,
    },
    /// The line search failed to produce a valid step.
    LineSearchError {
        iterations: usize,
        residual_norm: T,
        tolerance: T,
        source: FunctionError,
    },
}

impl<T> NewtonError<T> {
    pub fn iterations(&self) -> usize {
        match self {
            Self::MaximumIterationsReached { iterations, .. }
            | Self::Diverged { iterations, .. }
            | Self::FunctionError { iterations, .. }
            | Self::JacobianError { iterations, .. }
            | Self::LineSearchError { iterations, .. } => *iterations,
        }
    }

    /// The residual norm and tolerance at the time of failure, if the residual was available.
    pub fn residual_and_tolerance(&self) -> Option<(&T, &T)> {
        match self {
            Self::MaximumIterationsReached {
                residual_norm, tolerance, ..
            }
            | Self::Diverged {
                residual_norm, tolerance, ..
            }
            | Self::JacobianError {
                residual_norm, tolerance, ..
            }
            | Self::LineSearchError {
                residual_norm, tolerance, ..
            } => Some((residual_norm, tolerance)),
            Self::FunctionError { .. } => None,
        }
    }

    pub fn state(&self) -> NewtonState {
        match self {
            Self::MaximumIterationsReached { .. } => NewtonState::MaxIterExceeded,
            _ => NewtonState::Diverged,
        }
    }
}

impl<T: Display> Display for NewtonError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::MaximumIterationsReached {
                iterations,
                residual_norm,
                tolerance,
            } => write!(
                f,
                "Failed to converge within maximum number of iterations ({}): residual {} > tolerance {}.",
                iterations, residual_norm, tolerance
            ),
            Self::Diverged {
                iterations,
                residual_norm,
                tolerance,
            } => write!(
                f,
                "Newton iteration diverged after {} iterations: residual {} (tolerance {}).",
                iterations, residual_norm, tolerance
            ),
            Self::FunctionError { iterations, source } => {
                write!(f, "Function evaluation failed at iteration {}. Error: {}", iterations, source)
            }
            Self::JacobianError {
                iterations,
                residual_norm,
                tolerance,
                source,
            } => write!(
                f,
                "Failed to solve Jacobian system at iteration {} (residual {}, tolerance {}). Error: {}",
                iterations, residual_norm, tolerance, source
            ),
            Self::LineSearchError {
                iterations,
                residual_norm,
                tolerance,
                source,
            } => write!(
                f,
                "Line search failed at iteration {} (residual {}, tolerance {}). Error: {}",
                iterations, residual_norm, tolerance, source
            ),
        }
    }
}

impl<T: Debug + Display> Error for NewtonError<T> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::FunctionError { source, .. }
            | Self::JacobianError { source, .. }
            | Self::LineSearchError { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Newton's method for `F(x) = 0` with a pluggable line search.
///
/// Each iteration solves `J(x_k) dx_k = -F(x_k)` and sets `x_{k+1} = x_k + alpha_k dx_k`,
/// where `alpha_k` is chosen by the line search.
#[derive(Debug)]
pub struct Newton<T: Scalar, F, L> {
    function: F,
    line_search: L,
    settings: NewtonSettings<T>,
    state: NewtonState,
    f: DVector<T>,
    dx: DVector<T>,
}

impl<T: Real, F: DifferentiableVectorFunction<T>> Newton<T, F, NoLineSearch> {
    pub fn new(function: F, settings: NewtonSettings<T>) -> Self {
        let n = function.dimension();
        Self {
            function,
            line_search: NoLineSearch,
            settings,
            state: NewtonState::Initialized,
            f: DVector::zeros(n),
            dx: DVector::zeros(n),
        }
    }
}

impl<T, F, L> Newton<T, F, L>
where
    T: Real,
    F: DifferentiableVectorFunction<T>,
    L: LineSearch<T, F>,
{
    pub fn with_line_search<L2: LineSearch<T, F>>(self, line_search: L2) -> Newton<T, F, L2> {
        Newton {
            function: self.function,
            line_search,
            settings: self.settings,
            state: self.state,
            f: self.f,
            dx: self.dx,
        }
    }

    pub fn state(&self) -> NewtonState {
        self.state
    }

    pub fn settings(&self) -> &NewtonSettings<T> {
        &self.settings
    }

    pub fn function(&self) -> &F {
        &self.function
    }

    pub fn into_function(self) -> F {
        self.function
    }

    /// The residual `F(x)` at the last accepted iterate.
    pub fn residual(&self) -> &DVector<T> {
        &self.f
    }

    /// Runs the iteration, starting from and updating `x` in place.
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn solve<'a>(&mut self, x: impl Into<DVectorViewMut<'a, T>>) -> Result<NewtonOutcome<T>, NewtonError<T>> {
        let mut x = x.into();
        let n = x.nrows();
        assert_eq!(n, self.function.dimension(), "Dimension of x must match function dimension");
        self.f.resize_vertically_mut(n, T::zero());
        self.dx.resize_vertically_mut(n, T::zero());

        self.state = NewtonState::Iterating;
        let result = self.iterate(&mut x);
        self.state = match &result {
            Ok(_) => NewtonState::Converged,
            Err(err) => err.state(),
        };
        result
    }

    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn iterate(&mut self, x: &mut DVectorViewMut<T>) -> Result<NewtonOutcome<T>, NewtonError<T>> {
        let settings = self.settings;
        self.function
            .eval_into(&mut DVectorViewMut::from(&mut self.f), &DVectorView::from(&*x))
            .map_err(|source| NewtonError::FunctionError { iterations: 0, source })?;

        let initial_residual_norm = self.f.norm();
        let tolerance = settings.tolerance(initial_residual_norm);
        let mut residual_norm = initial_residual_norm;
        let mut iterations = 0;
        debug!("Newton initial residual: {}, tolerance: {}", residual_norm, tolerance);

        while residual_norm > tolerance {
            if !residual_norm.is_finite() || residual_norm > settings.divergence_factor * initial_residual_norm {
                warn!("Newton iteration diverged at iteration {}: residual {}", iterations, residual_norm);
                return Err(NewtonError::Diverged {
                    iterations,
                    residual_norm,
                    tolerance,
                });
            }

            if iterations == settings.max_iterations {
                warn!(
                    "Newton reached the iteration cap ({}) with residual {} > {}",
                    iterations, residual_norm, tolerance
                );
                return Err(NewtonError::MaximumIterationsReached {
                    iterations,
                    residual_norm,
                    tolerance,
                });
            }

            // Solve J (-dx) = f, then flip the sign
            let mut minus_dx = DVectorViewMut::from(&mut self.dx);
            self.function
                .solve_jacobian_system(&mut minus_dx, &DVectorView::from(&*x), &DVectorView::from(&self.f))
                .map_err(|source| NewtonError::JacobianError {
                    iterations,
                    residual_norm,
                    tolerance,
                    source,
                })?;
            self.dx *= -1.0;

            let step_length = self
                .line_search
                .step(
                    &mut self.function,
                    DVectorViewMut::from(&mut self.f),
                    DVectorViewMut::from(&mut *x),
                    DVectorView::from(&self.dx),
                )
                .map_err(|source| NewtonError::LineSearchError {
                    iterations,
                    residual_norm,
                    tolerance,
                    source,
                })?;

            iterations += 1;
            residual_norm = self.f.norm();
            debug!(
                "Newton iteration {}: step length {}, residual {}",
                iterations, step_length, residual_norm
            );
        }

        info!("Newton converged in {} iterations (residual {})", iterations, residual_norm);
        Ok(NewtonOutcome {
            iterations,
            initial_residual_norm,
            residual_norm,
            tolerance,
        })
    }
}

/// Attempts to solve the non-linear equation `F(u) = 0` with full Newton steps.
pub fn newton<'a, T, F>(
    function: F,
    x: impl Into<DVectorViewMut<'a, T>>,
    settings: NewtonSettings<T>,
) -> Result<NewtonOutcome<T>, NewtonError<T>>
where
    T: Real,
    F: DifferentiableVectorFunction<T>,
{
    Newton::new(function, settings).solve(x)
}

/// Same as [`newton`], but allows specifying a line search.
pub fn newton_line_search<'a, T, F, L>(
    function: F,
    x: impl Into<DVectorViewMut<'a, T>>,
    settings: NewtonSettings<T>,
    line_search: L,
) -> Result<NewtonOutcome<T>, NewtonError<T>>
where
    T: Real,
    F: DifferentiableVectorFunction<T>,
    L: LineSearch<T, F>,
{
    Newton::new(function, settings)
        .with_line_search(line_search)
        .solve(x)
}

pub trait LineSearch<T: Scalar, F: VectorFunction<T>> {
    /// Moves `x` along `direction` and leaves `F(x)` of the accepted point in `f`.
    ///
    /// Returns the accepted step length.
    fn step(
        &mut self,
        function: &mut F,
        f: DVectorViewMut<T>,
        x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, FunctionError>;
}

/// Trivial implementation of line search. Equivalent to a single, full Newton step.
#[derive(Clone, Debug)]
pub struct NoLineSearch;

impl<T, F> LineSearch<T, F> for NoLineSearch
where
    T: Real,
    F: VectorFunction<T>,
{
    fn step(
        &mut self,
        function: &mut F,
        mut f: DVectorViewMut<T>,
        mut x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, FunctionError> {
        x.axpy(T::one(), &direction, T::one());
        function.eval_into(&mut f, &DVectorView::from(&x))?;
        Ok(T::one())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSearchSettings<T> {
    /// The constant `c` in the sufficient decrease condition.
    pub sufficient_decrease: T,
    /// Smallest step length tried before giving up.
    pub min_step: T,
}

impl<T: Real> Default for LineSearchSettings<T> {
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn default() -> Self {
        Self {
            sufficient_decrease: 1e-4,
            min_step: 1e-6,
        }
    }
}

/// Backtracking line search using the Armijo condition on `g(x) = |F(x)|^2 / 2`.
///
/// See Nocedal & Wright (2006), Numerical Optimization, Chapter 3.1.
#[derive(Clone, Debug)]
pub struct BacktrackingLineSearch<T> {
    pub settings: LineSearchSettings<T>,
}

impl<T: Real> Default for BacktrackingLineSearch<T> {
    fn default() -> Self {
        Self::new(LineSearchSettings::default())
    }
}

impl<T> BacktrackingLineSearch<T> {
    pub fn new(settings: LineSearchSettings<T>) -> Self {
        Self { settings }
    }
}

impl<T, F> LineSearch<T, F> for BacktrackingLineSearch<T>
where
    T: Real,
    F: VectorFunction<T>,
{
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn step(
        &mut self,
        function: &mut F,
        mut f: DVectorViewMut<T>,
        mut x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, FunctionError> {
        // With grad g = J^T F and J p = -F for the Newton direction p, the sufficient
        // decrease condition
        //  g(x + alpha p) <= g(x) + c alpha grad g^T p
        // becomes
        //  g(x + alpha p) <= (1 - 2 c alpha) g(x).
        let c = self.settings.sufficient_decrease;
        let alpha_min = self.settings.min_step;
        let g_initial = 0.5 * f.magnitude_squared();

        // Decrease slowly at first, then much faster if the first few steps are rejected
        let mut alphas = [1.0, 0.75, 0.5]
            .into_iter()
            .chain(iterate(0.25, |alpha| 0.25 * *alpha));

        let mut alpha_prev = 0.0;
        loop {
            let alpha = alphas
                .next()
                .expect("Step length sequence is infinite");
            // x_alpha = x_0 + alpha p = x_{alpha_prev} + (alpha - alpha_prev) p
            x.axpy(alpha - alpha_prev, &direction, T::one());
            alpha_prev = alpha;
            function.eval_into(&mut f, &DVectorView::from(&x))?;

            let g = 0.5 * f.magnitude_squared();
            if g <= (1.0 - 2.0 * c * alpha) * g_initial {
                if alpha < 1.0 {
                    debug!("Line search accepted reduced step length {}", alpha);
                }
                return Ok(alpha);
            } else if alpha < alpha_min {
                // Restore the initial iterate so that the caller sees a consistent state
                x.axpy(-alpha, &direction, T::one());
                function.eval_into(&mut f, &DVectorView::from(&x))?;
                return Err(Box::from(format!(
                    "Failed to produce valid step. Step length {} is smaller than minimum allowed step {}.",
                    alpha, alpha_min
                )));
            }
        }
    }
}
