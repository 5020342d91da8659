use galerkin::connectivity::CellKind;
use galerkin::element::raviart_thomas::RaviartThomas0;
use galerkin::element::LagrangeElement;
use galerkin::mesh::procedural::{create_unit_square_uniform_quad_mesh_2d, create_unit_square_uniform_tri_mesh_2d};
use galerkin::mesh::Mesh;
use galerkin::nalgebra::{Point2, Vector2};
use galerkin::space::{FunctionSpaceBuilder, MixedSpace};
use matrixcompare::assert_scalar_eq;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

fn tri_mesh(n: usize) -> Arc<Mesh<f64>> {
    Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(n))
}

fn quad_mesh(n: usize) -> Arc<Mesh<f64>> {
    Arc::new(create_unit_square_uniform_quad_mesh_2d::<f64>(n))
}

#[test]
fn dof_counts_of_standard_spaces() {
    let tri = tri_mesh(2);
    let quad = quad_mesh(2);

    let p1 = FunctionSpaceBuilder::new(tri.clone(), LagrangeElement::p1())
        .build()
        .unwrap();
    assert_eq!(p1.num_dofs(), 9);
    assert_eq!(p1.local_size(), 3);

    let p2 = FunctionSpaceBuilder::new(tri.clone(), LagrangeElement::p2())
        .build()
        .unwrap();
    assert_eq!(p2.num_dofs(), 9 + 16);

    let q2 = FunctionSpaceBuilder::new(quad.clone(), LagrangeElement::q2())
        .build()
        .unwrap();
    assert_eq!(q2.num_dofs(), 9 + 12 + 4);

    let q1_vector = FunctionSpaceBuilder::new(quad, LagrangeElement::q1())
        .components(2)
        .build()
        .unwrap();
    assert_eq!(q1_vector.num_dofs(), 18);
    assert_eq!(q1_vector.local_size(), 8);
    assert_eq!(q1_vector.value_components(), 2);

    let rt0 = FunctionSpaceBuilder::new(tri.clone(), RaviartThomas0)
        .build()
        .unwrap();
    assert_eq!(rt0.num_dofs(), tri.num_edges());
    assert_eq!(rt0.value_components(), 2);

    let p0 = FunctionSpaceBuilder::new(tri.clone(), LagrangeElement::discontinuous(CellKind::Triangle, 0))
        .build()
        .unwrap();
    assert_eq!(p0.num_dofs(), tri.num_cells());
}

#[test]
fn cell_dofs_cover_all_dofs_exactly_once_per_cell() {
    let space = FunctionSpaceBuilder::new(tri_mesh(3), LagrangeElement::p2())
        .build()
        .unwrap();
    let mut seen = BTreeSet::new();
    for cell in 0..space.num_cells() {
        let dofs = space.cell_dofs(cell);
        let unique: BTreeSet<_> = dofs.iter().copied().collect();
        assert_eq!(unique.len(), dofs.len());
        assert!(dofs.iter().all(|&dof| dof < space.num_dofs()));
        seen.extend(unique);
    }
    assert_eq!(seen.len(), space.num_dofs());
}

#[test]
fn vector_spaces_interleave_components() {
    let space = FunctionSpaceBuilder::new(quad_mesh(1), LagrangeElement::q1())
        .components(2)
        .build()
        .unwrap();
    let dofs = space.cell_dofs(0);
    for pair in dofs.chunks(2) {
        assert_eq!(pair[0] % 2, 0);
        assert_eq!(pair[1], pair[0] + 1);
    }
}

#[test]
fn boundary_dofs_are_constrained() {
    let p1 = FunctionSpaceBuilder::new(tri_mesh(2), LagrangeElement::p1())
        .dirichlet("boundary", |_, _| 0.0)
        .build()
        .unwrap();
    assert_eq!(p1.num_dirichlet_dofs(), 8);

    let p2 = FunctionSpaceBuilder::new(tri_mesh(2), LagrangeElement::p2())
        .dirichlet("boundary", |_, _| 0.0)
        .build()
        .unwrap();
    assert_eq!(p2.num_dirichlet_dofs(), 16);

    let dofs: Vec<_> = p2.dirichlet_dofs().collect();
    assert!(dofs.windows(2).all(|w| w[0] < w[1]));
    assert!(dofs.iter().all(|&dof| p2.is_constrained(dof)));
}

#[test]
fn unknown_dirichlet_tag_is_an_error() {
    let result = FunctionSpaceBuilder::new(tri_mesh(1), LagrangeElement::p1())
        .dirichlet("inlet", |_, _| 0.0)
        .build();
    let err = result.unwrap_err();
    assert_eq!(err.tag, "inlet");
    assert!(err.available.contains(&"boundary".to_string()));
}

#[test]
fn first_dirichlet_condition_takes_precedence() {
    let space = FunctionSpaceBuilder::new(quad_mesh(2), LagrangeElement::q1())
        .dirichlet("left", |_, _| 1.0)
        .dirichlet("boundary", |_, _| 2.0)
        .build()
        .unwrap();
    let values: BTreeMap<_, _> = space.dirichlet_values(0.0).into_iter().collect();
    assert_eq!(values.len(), 8);
    assert_eq!(values.values().filter(|&&v| v == 1.0).count(), 3);
    assert_eq!(values.values().filter(|&&v| v == 2.0).count(), 5);
}

#[test]
fn dirichlet_values_depend_on_time() {
    let space = FunctionSpaceBuilder::new(tri_mesh(3), LagrangeElement::p1())
        .dirichlet("boundary", |x, t| t * x.x + x.y)
        .build()
        .unwrap();
    let expected = space.interpolate(&|x: &Point2<f64>| Vector2::new(2.0 * x.x + x.y, 0.0));
    for (dof, value) in space.dirichlet_values(2.0) {
        assert_scalar_eq!(value, expected[dof], comp = abs, tol = 1e-14);
    }
}

#[test]
fn vector_dirichlet_data_constrains_every_component() {
    let space = FunctionSpaceBuilder::new(quad_mesh(2), LagrangeElement::q1())
        .components(2)
        .dirichlet_vector("top", |_, _| Vector2::new(1.0, -1.0))
        .build()
        .unwrap();
    let values = space.dirichlet_values(0.0);
    assert_eq!(values.len(), 6);
    for (dof, value) in values {
        let expected = if dof % 2 == 0 { 1.0 } else { -1.0 };
        assert_eq!(value, expected);
    }
}

#[test]
fn mixed_space_numbers_fields_then_multipliers() {
    let mesh = quad_mesh(2);
    let velocity = FunctionSpaceBuilder::new(mesh.clone(), LagrangeElement::q2())
        .components(2)
        .dirichlet_vector("boundary", |_, _| Vector2::zeros())
        .build()
        .unwrap();
    let pressure = FunctionSpaceBuilder::new(mesh, LagrangeElement::q1())
        .zero_mean()
        .build()
        .unwrap();
    let (nv, np) = (velocity.num_dofs(), pressure.num_dofs());
    let space = MixedSpace::new(vec![velocity, pressure]);

    assert_eq!(space.num_fields(), 2);
    assert_eq!(space.field_range(0), 0..nv);
    assert_eq!(space.field_range(1), nv..nv + np);
    assert_eq!(space.num_dofs(), nv + np);
    assert_eq!(space.system_size(), nv + np + 1);
    assert_eq!(space.multiplier(0), None);
    assert_eq!(space.multiplier(1), Some(nv + np));
    assert_eq!(space.local_offsets(), &[0, 18, 22]);

    let mask = space.dirichlet_mask();
    assert_eq!(mask.len(), space.system_size());
    assert_eq!(mask.iter().filter(|&&m| m).count(), 2 * 16);
    assert!(!mask[nv + np]);

    let mut dofs = Vec::new();
    space.populate_cell_dofs(3, &mut dofs);
    assert_eq!(dofs.len(), space.local_size());
    assert!(dofs[18..].iter().all(|dof| space.field_range(1).contains(dof)));
}

#[test]
fn mixed_interpolation_fills_each_field() {
    let mesh = tri_mesh(2);
    let u = FunctionSpaceBuilder::new(mesh.clone(), LagrangeElement::p1())
        .build()
        .unwrap();
    let p = FunctionSpaceBuilder::new(mesh, LagrangeElement::p1())
        .zero_mean()
        .build()
        .unwrap();
    let space = MixedSpace::new(vec![u, p]);
    let coefficients = space.interpolate(&[&|_: &Point2<f64>| Vector2::new(3.0, 0.0), &|_: &Point2<f64>| Vector2::new(-1.0, 0.0)]);
    assert!(coefficients.rows_range(space.field_range(0)).iter().all(|&c| c == 3.0));
    assert!(coefficients.rows_range(space.field_range(1)).iter().all(|&c| c == -1.0));
    assert_eq!(coefficients[space.system_size() - 1], 0.0);
}

#[test]
#[should_panic]
fn zero_mean_vector_spaces_are_rejected() {
    let _ = FunctionSpaceBuilder::new(quad_mesh(1), LagrangeElement::q1())
        .components(2)
        .zero_mean()
        .build();
}

#[test]
#[should_panic]
fn element_must_match_cell_kind() {
    let _ = FunctionSpaceBuilder::new(quad_mesh(1), LagrangeElement::p1()).build();
}
