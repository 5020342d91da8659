use galerkin::assembly::operators::LaplaceForm;
use galerkin::assembly::buffers::CellBuffer;
use galerkin::assembly::global::{assemble_matrix_into_csr, assemble_pattern, assemble_vector_into};
use galerkin::assembly::local::{ElementConnectivityAssembler, ElementMatrixAssembler, ElementVectorAssembler};
use galerkin::assembly::{AssemblyError, AssemblySettings, SystemAssembler};
use galerkin::element::LagrangeElement;
use galerkin::mesh::procedural::{create_unit_square_uniform_quad_mesh_2d, create_unit_square_uniform_tri_mesh_2d};
use galerkin::nalgebra::{DMatrix, DVector};
use galerkin::nalgebra_sparse::CsrMatrix;
use galerkin::proptest::permutation;
use galerkin::space::{FunctionSpaceBuilder, MixedSpace};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use proptest::prelude::*;
use std::sync::Arc;

fn p1_space(n: usize) -> MixedSpace<f64> {
    let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(n));
    let space = FunctionSpaceBuilder::new(mesh, LagrangeElement::p1())
        .build()
        .unwrap();
    MixedSpace::single(space)
}

fn p1_space_with_boundary(n: usize) -> MixedSpace<f64> {
    let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(n));
    let space = FunctionSpaceBuilder::new(mesh, LagrangeElement::p1())
        .dirichlet("boundary", |x, _| x.x - 2.0 * x.y)
        .build()
        .unwrap();
    MixedSpace::single(space)
}

fn sample_state(n: usize) -> DVector<f64> {
    DVector::from_fn(n, |i, _| f64::sin(0.37 * i as f64) + 0.1 * i as f64)
}

#[test]
fn pattern_contains_diagonal_and_is_symmetric() {
    let space = p1_space(3);
    let assembler = SystemAssembler::new(&space, LaplaceForm::new(), AssemblySettings::default()).unwrap();
    let pattern = assembler.pattern();
    assert_eq!(pattern.major_dim(), space.system_size());
    for i in 0..pattern.major_dim() {
        assert!(pattern.lane(i).contains(&i));
        for &j in pattern.lane(i) {
            assert!(pattern.lane(j).contains(&i));
        }
    }
}

#[test]
fn laplace_stiffness_is_symmetric_with_zero_row_sums() {
    let space = p1_space(4);
    let assembler = SystemAssembler::new(&space, LaplaceForm::new(), AssemblySettings::default()).unwrap();
    let u = DVector::zeros(space.system_size());
    let k = DMatrix::from(&assembler.jacobian(&u).unwrap());

    assert_matrix_eq!(k, k.transpose(), comp = abs, tol = 1e-12);
    for i in 0..k.nrows() {
        assert_scalar_eq!(k.row(i).sum(), 0.0, comp = abs, tol = 1e-12);
        assert!(k[(i, i)] > 0.0);
    }
}

#[test]
fn residual_of_linear_form_is_jacobian_times_state() {
    let space = p1_space(3);
    let assembler = SystemAssembler::new(&space, LaplaceForm::new(), AssemblySettings::default()).unwrap();
    let u = sample_state(space.system_size());
    let residual = assembler.residual(&u).unwrap();
    let jacobian = assembler.jacobian(&u).unwrap();
    let expected = &jacobian * &u;
    assert_matrix_eq!(residual, expected, comp = abs, tol = 1e-12);
}

#[test]
fn source_and_flux_loads_integrate_to_their_totals() {
    let space = p1_space(4);
    let form = LaplaceForm::<f64>::new()
        .with_source(|_, _| 2.0)
        .with_neumann("right", |_, _| 3.0);
    let assembler = SystemAssembler::new(&space, form, AssemblySettings::default()).unwrap();
    let residual = assembler
        .residual(&DVector::zeros(space.system_size()))
        .unwrap();
    // -(int f) - (int_right g)
    assert_scalar_eq!(residual.sum(), -5.0, comp = abs, tol = 1e-12);
}

#[test]
fn parallel_assembly_is_identical_to_serial() {
    let mesh = Arc::new(create_unit_square_uniform_quad_mesh_2d::<f64>(8));
    let field = FunctionSpaceBuilder::new(mesh, LagrangeElement::q2())
        .build()
        .unwrap();
    let space = MixedSpace::single(field);
    let form = || LaplaceForm::<f64>::new().with_source(|x, _| x.x * x.y);
    let serial = SystemAssembler::new(&space, form(), AssemblySettings::default()).unwrap();
    let parallel_settings = AssemblySettings {
        parallel: true,
        ..AssemblySettings::default()
    };
    let parallel = SystemAssembler::new(&space, form(), parallel_settings).unwrap();

    let u = sample_state(space.system_size());
    assert_eq!(serial.residual(&u).unwrap(), parallel.residual(&u).unwrap());
    let serial_jacobian = serial.jacobian(&u).unwrap();
    let parallel_jacobian = parallel.jacobian(&u).unwrap();
    assert_eq!(serial_jacobian.values(), parallel_jacobian.values());
    assert_eq!(serial_jacobian.col_indices(), parallel_jacobian.col_indices());
}

#[test]
fn dirichlet_rows_become_scaled_identity_rows() {
    let space = p1_space_with_boundary(3);
    let assembler = SystemAssembler::new(&space, LaplaceForm::new(), AssemblySettings::default()).unwrap();
    let u = sample_state(space.system_size());
    let jacobian = DMatrix::from(&assembler.constrained_jacobian(&u).unwrap());
    let residual = assembler.constrained_residual(&u).unwrap();

    let mask = space.dirichlet_mask();
    let values: Vec<_> = assembler.dirichlet_values();
    assert_eq!(values.len(), 12);
    let scale = jacobian[(values[0].0, values[0].0)];
    assert!(scale > 0.0);

    for &(dof, g) in &values {
        assert_eq!(residual[dof], u[dof] - g);
        for j in 0..jacobian.ncols() {
            let expected = if j == dof { scale } else { 0.0 };
            assert_eq!(jacobian[(dof, j)], expected);
            if j != dof {
                assert_eq!(jacobian[(j, dof)], 0.0);
            }
        }
    }
    let free = (0..mask.len()).find(|&i| !mask[i]).unwrap();
    assert!(jacobian[(free, free)] > 0.0);
}

#[test]
fn lift_holds_dirichlet_values_only() {
    let space = p1_space_with_boundary(2);
    let assembler = SystemAssembler::new(&space, LaplaceForm::new(), AssemblySettings::default()).unwrap();
    let lift = assembler.lift();
    let mask = space.dirichlet_mask();
    for (dof, g) in assembler.dirichlet_values() {
        assert_eq!(lift[dof], g);
    }
    for (i, constrained) in mask.iter().enumerate() {
        if !constrained {
            assert_eq!(lift[i], 0.0);
        }
    }
}

#[test]
fn state_of_wrong_length_is_rejected() {
    let space = p1_space(2);
    let assembler = SystemAssembler::new(&space, LaplaceForm::new(), AssemblySettings::default()).unwrap();
    let u = DVector::zeros(space.system_size() + 1);
    match assembler.residual(&u) {
        Err(AssemblyError::DimensionMismatch(err)) => {
            assert_eq!(err.expected, space.system_size());
            assert_eq!(err.actual, space.system_size() + 1);
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(matches!(
        assembler.jacobian(&u),
        Err(AssemblyError::DimensionMismatch(_))
    ));
}

#[test]
fn form_must_match_number_of_fields() {
    let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(2));
    let field = || {
        FunctionSpaceBuilder::new(mesh.clone(), LagrangeElement::p1())
            .build()
            .unwrap()
    };
    let space = MixedSpace::new(vec![field(), field()]);
    let result = SystemAssembler::new(&space, LaplaceForm::new(), AssemblySettings::default());
    assert!(matches!(result, Err(AssemblyError::DimensionMismatch(_))));
}

#[test]
fn unknown_neumann_tag_is_rejected() {
    let space = p1_space(2);
    let form = LaplaceForm::<f64>::new().with_neumann("outlet", |_, _| 1.0);
    match SystemAssembler::new(&space, form, AssemblySettings::default()) {
        Err(AssemblyError::InvalidTag(err)) => assert_eq!(err.tag, "outlet"),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("assembler construction should fail"),
    }
}

#[test]
fn zero_mean_multiplier_couples_to_cell_integrals() {
    let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(3));
    let field = FunctionSpaceBuilder::new(mesh, LagrangeElement::p1())
        .zero_mean()
        .build()
        .unwrap();
    let space = MixedSpace::single(field);
    let lambda = space.multiplier(0).unwrap();
    assert_eq!(lambda, space.system_size() - 1);

    let assembler = SystemAssembler::new(&space, LaplaceForm::new(), AssemblySettings::default()).unwrap();
    let mut u = DVector::zeros(space.system_size());
    u.rows_range_mut(space.field_range(0)).fill(1.0);
    u[lambda] = 0.5;

    let jacobian = DMatrix::from(&assembler.jacobian(&u).unwrap());
    // The basis functions sum to one, so the multiplier row integrates the unit function
    assert_scalar_eq!(jacobian.row(lambda).sum(), 1.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(jacobian.column(lambda).sum(), 1.0, comp = abs, tol = 1e-12);
    assert_eq!(jacobian[(lambda, lambda)], 0.0);

    let residual = assembler.residual(&u).unwrap();
    assert_scalar_eq!(residual[lambda], 1.0, comp = abs, tol = 1e-12);
    let field_residual: f64 = residual.rows_range(space.field_range(0)).sum();
    assert_scalar_eq!(field_residual, 0.5, comp = abs, tol = 1e-12);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]
    #[test]
    fn cell_traversal_order_does_not_change_result(order in permutation(18)) {
        let space = p1_space(3);
        let form = LaplaceForm::<f64>::new().with_source(|x, _| x.x - x.y);
        let assembler = SystemAssembler::new(&space, form, AssemblySettings::default()).unwrap();
        let u = sample_state(space.system_size());

        let reference = assembler.residual(&u).unwrap();
        let permuted = assembler.residual_for_cells(&u, &order).unwrap();
        prop_assert!((reference - permuted).amax() < 1e-12);

        let reference = DMatrix::from(&assembler.jacobian(&u).unwrap());
        let permuted = DMatrix::from(&assembler.jacobian_for_cells(&u, &order).unwrap());
        prop_assert!((reference - permuted).amax() < 1e-12);
    }
}

/// Two overlapping elements on a path of three DOFs, where the second element reports a local
/// contribution with one row or entry too many.
struct OversizedSecondElement;

impl ElementConnectivityAssembler for OversizedSecondElement {
    fn num_elements(&self) -> usize {
        2
    }

    fn system_size(&self) -> usize {
        3
    }

    fn populate_element_dofs(&self, element: usize, dofs: &mut Vec<usize>) {
        dofs.clear();
        dofs.extend_from_slice(&[element, element + 1]);
    }
}

impl ElementMatrixAssembler<f64> for OversizedSecondElement {
    fn assemble_element_matrix(&self, element: usize, buffer: &mut CellBuffer<f64>) -> eyre::Result<()> {
        let rows = if element == 1 { 3 } else { 2 };
        buffer.set_matrix_contribution(&[element, element + 1], DMatrix::repeat(rows, 2, 1.0));
        Ok(())
    }
}

impl ElementVectorAssembler<f64> for OversizedSecondElement {
    fn assemble_element_vector(&self, element: usize, buffer: &mut CellBuffer<f64>) -> eyre::Result<()> {
        let len = if element == 1 { 3 } else { 2 };
        buffer.set_vector_contribution(&[element, element + 1], DVector::repeat(len, 1.0));
        Ok(())
    }
}

#[test]
fn element_contributions_of_wrong_shape_are_rejected() {
    let pattern = assemble_pattern(&OversizedSecondElement);
    for parallel in [false, true] {
        let nnz = pattern.nnz();
        let mut csr = CsrMatrix::try_from_pattern_and_values(pattern.clone(), vec![0.0; nnz]).unwrap();
        match assemble_matrix_into_csr(&mut csr, &OversizedSecondElement, &[0, 1], parallel) {
            Err(AssemblyError::DimensionMismatch(err)) => {
                assert_eq!(err.context, "element matrix rows");
                assert_eq!(err.expected, 2);
                assert_eq!(err.actual, 3);
            }
            other => panic!("expected a dimension mismatch, got {:?}", other),
        }

        let mut vector = DVector::zeros(3);
        match assemble_vector_into(&mut vector, &OversizedSecondElement, &[0, 1], parallel) {
            Err(AssemblyError::DimensionMismatch(err)) => {
                assert_eq!(err.context, "element vector");
                assert_eq!(err.expected, 2);
                assert_eq!(err.actual, 3);
            }
            other => panic!("expected a dimension mismatch, got {:?}", other),
        }
    }
}

#[test]
fn element_contributions_of_correct_shape_are_scattered() {
    let pattern = assemble_pattern(&OversizedSecondElement);
    let nnz = pattern.nnz();
    let mut csr = CsrMatrix::try_from_pattern_and_values(pattern, vec![0.0; nnz]).unwrap();
    assemble_matrix_into_csr(&mut csr, &OversizedSecondElement, &[0], false).unwrap();
    let expected = DMatrix::from_row_slice(3, 3, &[1.0, 1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
    assert_matrix_eq!(DMatrix::from(&csr), expected);
}
