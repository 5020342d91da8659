use galerkin_traits::Real;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut, Scalar};
use numeric_literals::replace_float_literals;
use std::error::Error;

/// Error type returned by fallible vector function evaluations.
pub type FunctionError = Box<dyn Error + Send + Sync>;

/// A function `F: R^n -> R^m` whose evaluation may fail.
///
/// In a finite element context evaluation means assembling a residual, which can fail for
/// reasons such as degenerate cells.
pub trait VectorFunction<T>
where
    T: Scalar,
{
    fn dimension(&self) -> usize;
    fn eval_into(&mut self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>) -> Result<(), FunctionError>;
}

impl<T, X> VectorFunction<T> for &mut X
where
    T: Scalar,
    X: VectorFunction<T>,
{
    fn dimension(&self) -> usize {
        X::dimension(self)
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>) -> Result<(), FunctionError> {
        X::eval_into(self, f, x)
    }
}

pub trait DifferentiableVectorFunction<T>: VectorFunction<T>
where
    T: Scalar,
{
    /// Solves `J(x) sol = rhs`, where `J(x)` is the Jacobian of the function at `x`.
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<T>,
        x: &DVectorView<T>,
        rhs: &DVectorView<T>,
    ) -> Result<(), FunctionError>;
}

impl<T, X> DifferentiableVectorFunction<T> for &mut X
where
    T: Scalar,
    X: DifferentiableVectorFunction<T>,
{
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<T>,
        x: &DVectorView<T>,
        rhs: &DVectorView<T>,
    ) -> Result<(), FunctionError> {
        X::solve_jacobian_system(self, sol, x, rhs)
    }
}

#[derive(Debug, Clone)]
pub struct VectorFunctionBuilder {
    dimension: usize,
}

/// A vector function assembled from closures.
#[derive(Debug, Clone)]
pub struct ConcreteVectorFunction<F, J> {
    dimension: usize,
    function: F,
    jacobian_solver: J,
}

impl VectorFunctionBuilder {
    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn with_function<F, T>(self, function: F) -> ConcreteVectorFunction<F, ()>
    where
        T: Scalar,
        F: FnMut(&mut DVectorViewMut<T>, &DVectorView<T>) -> Result<(), FunctionError>,
    {
        ConcreteVectorFunction {
            dimension: self.dimension,
            function,
            jacobian_solver: (),
        }
    }
}

impl<F> ConcreteVectorFunction<F, ()> {
    pub fn with_jacobian_solver<J, T>(self, jacobian_solver: J) -> ConcreteVectorFunction<F, J>
    where
        T: Scalar,
        J: FnMut(&mut DVectorViewMut<T>, &DVectorView<T>, &DVectorView<T>) -> Result<(), FunctionError>,
    {
        ConcreteVectorFunction {
            dimension: self.dimension,
            function: self.function,
            jacobian_solver,
        }
    }
}

impl<F, J, T> VectorFunction<T> for ConcreteVectorFunction<F, J>
where
    T: Scalar,
    F: FnMut(&mut DVectorViewMut<T>, &DVectorView<T>) -> Result<(), FunctionError>,
{
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>) -> Result<(), FunctionError> {
        (self.function)(f, x)
    }
}

impl<F, J, T> DifferentiableVectorFunction<T> for ConcreteVectorFunction<F, J>
where
    T: Scalar,
    F: FnMut(&mut DVectorViewMut<T>, &DVectorView<T>) -> Result<(), FunctionError>,
    J: FnMut(&mut DVectorViewMut<T>, &DVectorView<T>, &DVectorView<T>) -> Result<(), FunctionError>,
{
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<T>,
        x: &DVectorView<T>,
        rhs: &DVectorView<T>,
    ) -> Result<(), FunctionError> {
        (self.jacobian_solver)(sol, x, rhs)
    }
}

/// Approximates the Jacobian of a vector function evaluated at `x`, using
/// central finite differences with resolution `h`.
///
/// The Jacobian is the `m x n` matrix with entries `J_ij = d f_i / d x_j`.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn approximate_jacobian<T>(mut f: impl VectorFunction<T>, x: &DVector<T>, h: T) -> Result<DMatrix<T>, FunctionError>
where
    T: Real,
{
    let out_dim = f.dimension();
    let in_dim = x.len();

    let mut jacobian = DMatrix::zeros(out_dim, in_dim);
    let mut x_perturbed = x.clone();
    let mut f_plus = DVector::zeros(out_dim);
    let mut f_minus = DVector::zeros(out_dim);

    for j in 0..in_dim {
        let x_j = x[j];
        x_perturbed[j] = x_j + h;
        f.eval_into(&mut DVectorViewMut::from(&mut f_plus), &DVectorView::from(&x_perturbed))?;
        x_perturbed[j] = x_j - h;
        f.eval_into(&mut DVectorViewMut::from(&mut f_minus), &DVectorView::from(&x_perturbed))?;
        x_perturbed[j] = x_j;

        // J[.., j] = (f(x + h e_j) - f(x - h e_j)) / 2h
        let mut column_j = jacobian.column_mut(j);
        column_j.copy_from(&f_plus);
        column_j -= &f_minus;
        column_j /= 2.0 * h;
    }

    Ok(jacobian)
}
