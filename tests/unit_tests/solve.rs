use galerkin::assembly::operators::LaplaceForm;
use galerkin::element::LagrangeElement;
use galerkin::form::expression::{Expr, ExpressionForm};
use galerkin::mesh::procedural::create_unit_square_uniform_tri_mesh_2d;
use galerkin::nalgebra::{DVector, Point2, Vector2};
use galerkin::nalgebra_sparse::{CooMatrix, CsrMatrix};
use galerkin::optimize::newton::{NewtonSettings, NewtonState};
use galerkin::solve::{
    solve_linear, solve_linear_system, solve_nonlinear, DirectSolver, LinearSolverSettings, SingularMatrixError,
    SolveError, SolverSettings,
};
use galerkin::space::{FunctionSpaceBuilder, MixedSpace};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use std::sync::Arc;

fn csr_from_dense(n: usize, entries: &[f64]) -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(n, n);
    for i in 0..n {
        for j in 0..n {
            let value = entries[n * i + j];
            if value != 0.0 {
                coo.push(i, j, value);
            }
        }
    }
    // Keep every diagonal entry structurally present
    for i in 0..n {
        coo.push(i, i, 0.0);
    }
    CsrMatrix::from(&coo)
}

fn spd_matrix() -> CsrMatrix<f64> {
    csr_from_dense(3, &[4.0, -1.0, 0.0, -1.0, 4.0, -1.0, 0.0, -1.0, 4.0])
}

fn settings(solver: DirectSolver) -> LinearSolverSettings<f64> {
    LinearSolverSettings {
        solver,
        ..LinearSolverSettings::default()
    }
}

fn singular(result: Result<DVector<f64>, SolveError<f64>>) -> SingularMatrixError<f64> {
    match result {
        Err(SolveError::Singular(err)) => err,
        other => panic!("expected a singular matrix error, got {:?}", other),
    }
}

fn p1_space(n: usize, boundary: bool) -> Arc<MixedSpace<f64>> {
    let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(n));
    let mut builder = FunctionSpaceBuilder::new(mesh, LagrangeElement::p1());
    if boundary {
        builder = builder.dirichlet("boundary", |x, _| 1.0 + x.x - 2.0 * x.y);
    }
    Arc::new(MixedSpace::single(builder.build().unwrap()))
}

#[test]
fn direct_solvers_solve_spd_systems() {
    let matrix = spd_matrix();
    let expected = DVector::from_column_slice(&[1.0, -2.0, 0.5]);
    let rhs = &matrix * &expected;
    for solver in [DirectSolver::Lu, DirectSolver::Cholesky] {
        let x = solve_linear_system(&matrix, &rhs, &settings(solver)).unwrap();
        assert_matrix_eq!(x, expected, comp = abs, tol = 1e-12);
    }
}

#[test]
fn zero_rows_are_reported_as_singular() {
    let matrix = csr_from_dense(3, &[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2.0]);
    let rhs = DVector::from_element(3, 1.0);
    let err = singular(solve_linear_system(&matrix, &rhs, &settings(DirectSolver::Lu)));
    assert_eq!(err.row, Some(1));
    assert_eq!(err.pivot, 0.0);
}

#[test]
fn rank_deficient_matrix_is_singular() {
    let matrix = csr_from_dense(2, &[1.0, 1.0, 1.0, 1.0]);
    let rhs = DVector::from_element(2, 1.0);
    let err = singular(solve_linear_system(&matrix, &rhs, &settings(DirectSolver::Lu)));
    assert_eq!(err.row, Some(1));
    assert!(err.pivot.abs() <= err.threshold);
    assert_scalar_eq!(err.threshold, 1e-10, comp = abs, tol = 1e-20);
}

#[test]
fn cholesky_rejects_indefinite_matrix() {
    let matrix = csr_from_dense(2, &[1.0, 0.0, 0.0, -1.0]);
    let rhs = DVector::from_element(2, 1.0);
    let err = singular(solve_linear_system(&matrix, &rhs, &settings(DirectSolver::Cholesky)));
    assert_eq!(err.row, None);
    assert!(err.to_string().contains("singular"));
}

#[test]
fn badly_scaled_diagonal_system_is_solved() {
    let matrix = csr_from_dense(2, &[1e12, 0.0, 0.0, 1.0]);
    let rhs = DVector::from_column_slice(&[2e12, 3.0]);
    let expected = DVector::from_column_slice(&[2.0, 3.0]);
    for solver in [DirectSolver::Lu, DirectSolver::Cholesky] {
        let x = solve_linear_system(&matrix, &rhs, &settings(solver)).unwrap();
        assert_matrix_eq!(x, expected, comp = abs, tol = 1e-12);
    }
}

#[test]
fn badly_scaled_coupled_system_is_solved() {
    // Rows of very different magnitude, with a small but nonzero Schur complement
    let matrix = csr_from_dense(3, &[1e9, 1.0, 0.0, 1.0, 0.0, 1e-3, 0.0, 1e-3, 1e-15]);
    let expected = DVector::from_column_slice(&[1e-9, 1.0, -2.0]);
    let rhs = &matrix * &expected;
    let x = solve_linear_system(&matrix, &rhs, &settings(DirectSolver::Lu)).unwrap();
    for i in 0..3 {
        assert_scalar_eq!(x[i], expected[i], comp = abs, tol = 1e-6 * expected[i].abs());
    }
}

#[test]
fn singular_matrix_stays_singular_under_scaling() {
    let matrix = csr_from_dense(2, &[1e12, 2e12, 1e-6, 2e-6]);
    let rhs = DVector::from_element(2, 1.0);
    let err = singular(solve_linear_system(&matrix, &rhs, &settings(DirectSolver::Lu)));
    assert_eq!(err.row, Some(1));
}

#[test]
fn mismatched_dimensions_are_reported() {
    let matrix = spd_matrix();
    let result = solve_linear_system(&matrix, &DVector::zeros(2), &settings(DirectSolver::Lu));
    match result {
        Err(SolveError::DimensionMismatch(err)) => {
            assert_eq!(err.context, "right-hand side");
            assert_eq!(err.expected, 3);
            assert_eq!(err.actual, 2);
        }
        other => panic!("expected a dimension mismatch, got {:?}", other),
    }

    let mut coo = CooMatrix::new(2, 3);
    coo.push(0, 0, 1.0);
    let rectangular = CsrMatrix::from(&coo);
    let result = solve_linear_system(&rectangular, &DVector::zeros(2), &settings(DirectSolver::Lu));
    assert!(matches!(result, Err(SolveError::DimensionMismatch(_))));
}

#[test]
fn linear_dirichlet_problem_reproduces_affine_solution() {
    let space = p1_space(4, true);
    let exact = space.interpolate(&[&|x: &Point2<f64>| Vector2::new(1.0 + x.x - 2.0 * x.y, 0.0)]);
    for solver in [DirectSolver::Lu, DirectSolver::Cholesky] {
        let mut settings = SolverSettings::default();
        settings.linear.solver = solver;
        let u = solve_linear(&space, LaplaceForm::new(), &settings).unwrap();
        assert_matrix_eq!(u.coefficients().clone(), exact.clone(), comp = abs, tol = 1e-10);
    }
}

#[test]
fn pure_neumann_problem_without_constraint_is_singular() {
    let space = p1_space(2, false);
    let result = solve_linear(&space, LaplaceForm::new(), &SolverSettings::default());
    assert!(matches!(result, Err(SolveError::Singular(_))));
}

#[test]
fn newton_solves_linear_problem_in_one_step() {
    let space = p1_space(3, true);
    let initial = DVector::zeros(space.system_size());
    let (u, outcome) = solve_nonlinear(&space, LaplaceForm::new(), initial, &SolverSettings::default()).unwrap();
    assert_eq!(outcome.iterations, 1);
    assert!(outcome.residual_norm <= outcome.tolerance);

    let exact = space.interpolate(&[&|x: &Point2<f64>| Vector2::new(1.0 + x.x - 2.0 * x.y, 0.0)]);
    assert_matrix_eq!(u.coefficients().clone(), exact.clone(), comp = abs, tol = 1e-10);
}

fn cubic_form() -> ExpressionForm<f64> {
    let u = || Expr::<f64>::value(0);
    ExpressionForm::new(1).f0(0, 0, u().powf(3.0) + u() - Expr::constant(1.0))
}

#[test]
fn newton_converges_for_pointwise_nonlinearity() {
    let space = p1_space(3, false);
    let initial = DVector::zeros(space.system_size());
    let (u, outcome) = solve_nonlinear(&space, cubic_form(), initial, &SolverSettings::default()).unwrap();
    assert!(outcome.iterations > 1);

    // The real root of c^3 + c - 1
    let root = 0.682_327_803_828_019_3;
    for &c in u.coefficients().iter() {
        assert_scalar_eq!(c, root, comp = abs, tol = 1e-9);
    }
}

#[test]
fn newton_reports_iteration_cap() {
    let space = p1_space(3, false);
    let settings = SolverSettings {
        newton: NewtonSettings {
            max_iterations: 1,
            ..NewtonSettings::default()
        },
        line_search: None,
        ..SolverSettings::default()
    };
    let initial = DVector::zeros(space.system_size());
    match solve_nonlinear(&space, cubic_form(), initial, &settings) {
        Err(SolveError::Convergence(failure)) => {
            assert_eq!(failure.state, NewtonState::MaxIterExceeded);
            assert_eq!(failure.iterations, 1);
            let (residual, tolerance) = (failure.residual.unwrap(), failure.tolerance.unwrap());
            assert!(residual > tolerance);
            assert!(failure.to_string().contains("1 iterations"));
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("Newton should not converge in a single step"),
    }
}

#[test]
fn solver_settings_from_partial_json() {
    let defaults: SolverSettings<f64> = serde_json::from_str("{}").unwrap();
    assert_eq!(defaults, SolverSettings::default());

    let json = r#"{
        "newton": {
            "max_iterations": 5,
            "absolute_tolerance": 1e-8,
            "relative_tolerance": 0.0,
            "divergence_factor": 100.0
        },
        "line_search": null,
        "linear": { "solver": "Cholesky" },
        "assembly": { "parallel": true }
    }"#;
    let settings: SolverSettings<f64> = serde_json::from_str(json).unwrap();
    assert_eq!(settings.newton.max_iterations, 5);
    assert_eq!(settings.newton.absolute_tolerance, 1e-8);
    assert_eq!(settings.line_search, None);
    assert_eq!(settings.linear.solver, DirectSolver::Cholesky);
    assert_eq!(settings.linear.pivot_tolerance, 1e-10);
    assert!(settings.assembly.parallel);
    assert_eq!(settings.assembly.quadrature_degree, None);
}
