//! Linear and nonlinear solvers for assembled systems.
use crate::assembly::{AssemblyError, AssemblySettings, DimensionMismatchError, SystemAssembler};
use crate::field::DiscreteField;
use crate::form::WeakForm;
use crate::nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use crate::optimize::calculus::{DifferentiableVectorFunction, FunctionError, VectorFunction};
use crate::optimize::newton::{
    newton, newton_line_search, BacktrackingLineSearch, LineSearchSettings, NewtonError, NewtonOutcome,
    NewtonSettings, NewtonState,
};
use crate::space::MixedSpace;
use crate::Real;
use galerkin_traits::real;
use log::{debug, info};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CscMatrix, CsrMatrix};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// Direct factorization used for linear systems.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DirectSolver {
    /// Dense LU factorization with partial pivoting.
    #[default]
    Lu,
    /// Sparse Cholesky factorization, for symmetric positive definite systems.
    Cholesky,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, bound(deserialize = "T: Real + Deserialize<'de>"))]
pub struct LinearSolverSettings<T> {
    pub solver: DirectSolver,
    /// Pivots of the equilibrated matrix whose magnitude does not exceed `pivot_tolerance` are
    /// treated as zero.
    pub pivot_tolerance: T,
}

impl<T: Real> Default for LinearSolverSettings<T> {
    fn default() -> Self {
        Self {
            solver: DirectSolver::default(),
            pivot_tolerance: real(1e-10),
        }
    }
}

/// Settings for solving linear and nonlinear problems.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, bound(deserialize = "T: Real + Deserialize<'de>"))]
pub struct SolverSettings<T> {
    pub newton: NewtonSettings<T>,
    /// Backtracking line search for Newton's method, or full steps if `None`.
    pub line_search: Option<LineSearchSettings<T>>,
    pub linear: LinearSolverSettings<T>,
    pub assembly: AssemblySettings,
}

impl<T: Real> Default for SolverSettings<T> {
    fn default() -> Self {
        Self {
            newton: NewtonSettings::default(),
            line_search: Some(LineSearchSettings::default()),
            linear: LinearSolverSettings::default(),
            assembly: AssemblySettings::default(),
        }
    }
}

/// The matrix of a linear system is (numerically) singular.
#[derive(Debug, Clone, PartialEq)]
pub struct SingularMatrixError<T> {
    /// The row in which the factorization broke down, if known.
    pub row: Option<usize>,
    pub pivot: T,
    pub threshold: T,
}

impl<T: Display> Display for SingularMatrixError<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.row {
            Some(row) => write!(
                f,
                "matrix is singular: pivot {} in row {} does not exceed threshold {}",
                self.pivot, row, self.threshold
            ),
            None => write!(f, "matrix is singular or not positive definite"),
        }
    }
}

impl<T: Debug + Display> Error for SingularMatrixError<T> {}

/// Newton's method failed to converge.
#[derive(Debug)]
pub struct ConvergenceFailure<T> {
    pub state: NewtonState,
    pub iterations: usize,
    /// Residual norm at the time of failure, if it could be evaluated.
    pub residual: Option<T>,
    pub tolerance: Option<T>,
    pub source: NewtonError<T>,
}

impl<T: Copy> From<NewtonError<T>> for ConvergenceFailure<T> {
    fn from(source: NewtonError<T>) -> Self {
        let (residual, tolerance) = match source.residual_and_tolerance() {
            Some((&residual, &tolerance)) => (Some(residual), Some(tolerance)),
            None => (None, None),
        };
        Self {
            state: source.state(),
            iterations: source.iterations(),
            residual,
            tolerance,
            source,
        }
    }
}

impl<T: Display> Display for ConvergenceFailure<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Newton solver failed after {} iterations", self.iterations)?;
        if let (Some(residual), Some(tolerance)) = (&self.residual, &self.tolerance) {
            write!(f, " (residual {}, tolerance {})", residual, tolerance)?;
        }
        write!(f, ": {}", self.source)
    }
}

impl<T: Debug + Display + 'static> Error for ConvergenceFailure<T> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

#[derive(Debug)]
pub enum SolveError<T> {
    Assembly(AssemblyError),
    /// The matrix is not square, or the right-hand side does not match it.
    DimensionMismatch(DimensionMismatchError),
    Singular(SingularMatrixError<T>),
    Convergence(ConvergenceFailure<T>),
}

impl<T: Display> Display for SolveError<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assembly(err) => write!(f, "{}", err),
            Self::DimensionMismatch(err) => write!(f, "{}", err),
            Self::Singular(err) => write!(f, "{}", err),
            Self::Convergence(err) => write!(f, "{}", err),
        }
    }
}

impl<T: Debug + Display + 'static> Error for SolveError<T> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Assembly(err) => Some(err),
            Self::DimensionMismatch(err) => Some(err),
            Self::Singular(err) => Some(err),
            Self::Convergence(err) => Some(err),
        }
    }
}

impl<T> From<AssemblyError> for SolveError<T> {
    fn from(err: AssemblyError) -> Self {
        Self::Assembly(err)
    }
}

impl<T> From<DimensionMismatchError> for SolveError<T> {
    fn from(err: DimensionMismatchError) -> Self {
        Self::DimensionMismatch(err)
    }
}

impl<T> From<SingularMatrixError<T>> for SolveError<T> {
    fn from(err: SingularMatrixError<T>) -> Self {
        Self::Singular(err)
    }
}

impl<T> From<ConvergenceFailure<T>> for SolveError<T> {
    fn from(err: ConvergenceFailure<T>) -> Self {
        Self::Convergence(err)
    }
}

impl<T: Copy> From<NewtonError<T>> for SolveError<T> {
    fn from(err: NewtonError<T>) -> Self {
        Self::Convergence(err.into())
    }
}

/// Solves `A x = b` with a direct factorization.
///
/// LU factorizations operate on an equilibrated matrix `D_r A D_c`, where the row and column
/// scalings give every row and column a largest entry of unit magnitude. Pivots are compared
/// against `pivot_tolerance` after this scaling, so that badly scaled but nonsingular systems
/// are accepted.
pub fn solve_linear_system<T: Real>(
    matrix: &CsrMatrix<T>,
    rhs: &DVector<T>,
    settings: &LinearSolverSettings<T>,
) -> Result<DVector<T>, SolveError<T>> {
    DimensionMismatchError::check("matrix columns", matrix.nrows(), matrix.ncols())?;
    DimensionMismatchError::check("right-hand side", matrix.nrows(), rhs.len())?;

    let threshold = settings.pivot_tolerance;
    let singular_at = |row| SingularMatrixError {
        row: Some(row),
        pivot: T::zero(),
        threshold,
    };

    let row_scaling: Vec<T> = matrix
        .row_iter()
        .map(|row| row.values().iter().fold(T::zero(), |max, x| max.max(x.abs())))
        .collect();
    if let Some(row) = row_scaling.iter().position(|max| max.is_zero()) {
        return Err(singular_at(row).into());
    }

    match settings.solver {
        DirectSolver::Lu => {
            let mut scaled = DMatrix::from(matrix);
            for (i, max) in row_scaling.iter().enumerate() {
                let mut row = scaled.row_mut(i);
                row /= *max;
            }
            let mut column_scaling = Vec::with_capacity(scaled.ncols());
            for (j, mut column) in scaled.column_iter_mut().enumerate() {
                let max = column.amax();
                if max.is_zero() {
                    return Err(singular_at(j).into());
                }
                column /= max;
                column_scaling.push(max);
            }

            let lu = scaled.lu();
            if let Some((row, &pivot)) = lu
                .u()
                .diagonal()
                .iter()
                .enumerate()
                .find(|(_, pivot)| pivot.abs() <= threshold)
            {
                return Err(SingularMatrixError {
                    row: Some(row),
                    pivot,
                    threshold,
                }
                .into());
            }

            let scaled_rhs = rhs.component_div(&DVector::from_vec(row_scaling));
            let y = lu.solve(&scaled_rhs).ok_or(SingularMatrixError {
                row: None,
                pivot: T::zero(),
                threshold,
            })?;
            Ok(y.component_div(&DVector::from_vec(column_scaling)))
        }
        DirectSolver::Cholesky => {
            let cholesky = CscCholesky::factor(&CscMatrix::from(matrix)).map_err(|_| SingularMatrixError {
                row: None,
                pivot: T::zero(),
                threshold,
            })?;
            let b = DMatrix::from_column_slice(rhs.len(), 1, rhs.as_slice());
            Ok(cholesky.solve(&b).column(0).into_owned())
        }
    }
}

/// Solves the linear system obtained by linearizing the form about its Dirichlet lift.
///
/// Returns the full coefficient vector, including Dirichlet values and multipliers.
pub fn solve_linear_problem<T, F>(
    assembler: &SystemAssembler<T, F>,
    settings: &LinearSolverSettings<T>,
) -> Result<DVector<T>, SolveError<T>>
where
    T: Real,
    F: WeakForm<T>,
{
    let system = assembler.linear_system()?;
    let increment = solve_linear_system(&system.matrix, &system.rhs, settings)?;
    info!(
        "Solved linear system with {} unknowns and {} nonzeros",
        system.rhs.len(),
        system.matrix.nnz()
    );
    Ok(system.lift + increment)
}

/// The residual of an assembled form as a differentiable vector function for Newton's method.
///
/// Dirichlet rows are replaced by `u_d - g_d`, so iterates satisfying the constraints keep doing so.
pub struct NonlinearProblem<'s, 'a, T: Real, F> {
    assembler: &'s SystemAssembler<'a, T, F>,
    linear: LinearSolverSettings<T>,
}

impl<'s, 'a, T: Real, F: WeakForm<T>> NonlinearProblem<'s, 'a, T, F> {
    pub fn new(assembler: &'s SystemAssembler<'a, T, F>, linear: LinearSolverSettings<T>) -> Self {
        Self { assembler, linear }
    }
}

impl<'s, 'a, T: Real, F: WeakForm<T>> VectorFunction<T> for NonlinearProblem<'s, 'a, T, F> {
    fn dimension(&self) -> usize {
        self.assembler.space().system_size()
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>) -> Result<(), FunctionError> {
        let residual = self.assembler.constrained_residual(&x.clone_owned())?;
        f.copy_from(&residual);
        Ok(())
    }
}

impl<'s, 'a, T: Real, F: WeakForm<T>> DifferentiableVectorFunction<T> for NonlinearProblem<'s, 'a, T, F> {
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<T>,
        x: &DVectorView<T>,
        rhs: &DVectorView<T>,
    ) -> Result<(), FunctionError> {
        let jacobian = self.assembler.constrained_jacobian(&x.clone_owned())?;
        let solution = solve_linear_system(&jacobian, &rhs.clone_owned(), &self.linear)?;
        sol.copy_from(&solution);
        Ok(())
    }
}

/// Solves the nonlinear problem defined by the assembler with Newton's method, starting from `u`.
///
/// The Dirichlet values of `u` are overwritten before the first iteration.
pub fn solve_nonlinear_problem<T, F>(
    assembler: &SystemAssembler<T, F>,
    u: &mut DVector<T>,
    settings: &SolverSettings<T>,
) -> Result<NewtonOutcome<T>, SolveError<T>>
where
    T: Real,
    F: WeakForm<T>,
{
    assembler.impose_dirichlet(u);
    let problem = NonlinearProblem::new(assembler, settings.linear);
    let outcome = match settings.line_search {
        Some(line_search) => newton_line_search(
            problem,
            &mut *u,
            settings.newton,
            BacktrackingLineSearch::new(line_search),
        ),
        None => newton(problem, &mut *u, settings.newton),
    }?;
    debug!(
        "Nonlinear solve converged in {} iterations (residual {})",
        outcome.iterations, outcome.residual_norm
    );
    Ok(outcome)
}

/// Assembles and solves a problem that is affine in the unknowns.
pub fn solve_linear<T, F>(
    space: &Arc<MixedSpace<T>>,
    form: F,
    settings: &SolverSettings<T>,
) -> Result<DiscreteField<T>, SolveError<T>>
where
    T: Real,
    F: WeakForm<T>,
{
    let assembler = SystemAssembler::new(space, form, settings.assembly)?;
    let coefficients = solve_linear_problem(&assembler, &settings.linear)?;
    Ok(DiscreteField::new(Arc::clone(space), coefficients))
}

/// Assembles and solves a nonlinear problem with Newton's method, starting from `initial`.
pub fn solve_nonlinear<T, F>(
    space: &Arc<MixedSpace<T>>,
    form: F,
    initial: DVector<T>,
    settings: &SolverSettings<T>,
) -> Result<(DiscreteField<T>, NewtonOutcome<T>), SolveError<T>>
where
    T: Real,
    F: WeakForm<T>,
{
    let assembler = SystemAssembler::new(space, form, settings.assembly)?;
    let mut u = initial;
    let outcome = solve_nonlinear_problem(&assembler, &mut u, settings)?;
    Ok((DiscreteField::new(Arc::clone(space), u), outcome))
}
