use galerkin::element::raviart_thomas::RaviartThomas0;
use galerkin::element::LagrangeElement;
use galerkin::field::DiscreteField;
use galerkin::mesh::procedural::{create_unit_square_uniform_quad_mesh_2d, create_unit_square_uniform_tri_mesh_2d};
use galerkin::nalgebra::{DVector, Matrix2, Point2, Vector2};
use galerkin::space::{FunctionSpaceBuilder, MixedSpace};
use matrixcompare::assert_scalar_eq;
use std::sync::Arc;

fn affine(x: &Point2<f64>) -> f64 {
    1.0 + 2.0 * x.x - x.y
}

fn reference_points() -> Vec<Point2<f64>> {
    vec![
        Point2::new(-0.5, -0.5),
        Point2::new(-0.8, 0.2),
        Point2::new(0.3, -0.9),
    ]
}

fn p1_field() -> DiscreteField<f64> {
    let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(3));
    let space = FunctionSpaceBuilder::new(mesh, LagrangeElement::p1())
        .build()
        .unwrap();
    DiscreteField::interpolate(Arc::new(MixedSpace::single(space)), &[&|x: &Point2<f64>| Vector2::new(affine(x), 0.0)])
}

#[test]
fn interpolated_affine_field_is_exact_everywhere() {
    let u = p1_field();
    let mesh = u.space().mesh().clone();
    for cell in 0..mesh.num_cells() {
        let geometry = mesh.cell_geometry(cell);
        for xi in reference_points() {
            let x = geometry.map_reference_coords(&xi);
            let point = u.evaluate(0, cell, &xi).unwrap();
            assert_scalar_eq!(point.scalar(), affine(&x), comp = abs, tol = 1e-12);
            assert!((point.scalar_grad() - Vector2::new(2.0, -1.0)).norm() < 1e-12);
        }
    }
}

#[test]
fn integrals_and_means() {
    let u = p1_field();
    assert_scalar_eq!(u.integrate(0).unwrap(), 1.5, comp = abs, tol = 1e-12);
    assert_scalar_eq!(u.mean(0).unwrap(), 1.5, comp = abs, tol = 1e-12);

    let squared = u
        .integrate_with(0, 4, |_, point| point.scalar() * point.scalar())
        .unwrap();
    // int (1 + 2x - y)^2 over the unit square
    assert_scalar_eq!(squared, 8.0 / 3.0, comp = abs, tol = 1e-12);
}

#[test]
fn nodal_and_cell_values_sample_the_field() {
    let u = p1_field();
    let mesh = u.space().mesh().clone();

    let nodal = u.nodal_values(0).unwrap();
    assert_eq!(nodal.len(), mesh.vertices().len());
    for (value, vertex) in nodal.iter().zip(mesh.vertices()) {
        assert_scalar_eq!(value.x, affine(vertex), comp = abs, tol = 1e-12);
    }

    let cell_values = u.cell_values(0).unwrap();
    assert_eq!(cell_values.len(), mesh.num_cells());
    for (cell, value) in cell_values.iter().enumerate() {
        let centroid = mesh.cell_geometry(cell).centroid();
        assert_scalar_eq!(value.x, affine(&centroid), comp = abs, tol = 1e-12);
    }
}

#[test]
fn vector_lagrange_field_has_full_gradient() {
    let mesh = Arc::new(create_unit_square_uniform_quad_mesh_2d::<f64>(2));
    let space = FunctionSpaceBuilder::new(mesh, LagrangeElement::q1())
        .components(2)
        .build()
        .unwrap();
    let space = Arc::new(MixedSpace::single(space));
    let u = DiscreteField::interpolate(space, &[&|x: &Point2<f64>| Vector2::new(x.x + 2.0 * x.y, -x.x)]);

    let expected_gradient = Matrix2::new(1.0, 2.0, -1.0, 0.0);
    for cell in 0..4 {
        let point = u.evaluate(0, cell, &Point2::new(0.25, -0.6)).unwrap();
        assert!((point.grad - expected_gradient).norm() < 1e-12);
        assert_scalar_eq!(point.div(), 1.0, comp = abs, tol = 1e-12);
    }
}

#[test]
fn raviart_thomas_field_reproduces_constant_fields() {
    let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(3));
    let space = FunctionSpaceBuilder::new(mesh, RaviartThomas0)
        .build()
        .unwrap();
    let space = Arc::new(MixedSpace::single(space));
    let constant = Vector2::new(0.3, -1.2);
    let sigma = DiscreteField::interpolate(space.clone(), &[&|_: &Point2<f64>| constant]);

    for cell in 0..space.num_cells() {
        for xi in reference_points() {
            let point = sigma.evaluate(0, cell, &xi).unwrap();
            assert!((point.value - constant).norm() < 1e-12);
            assert_scalar_eq!(point.div(), 0.0, comp = abs, tol = 1e-11);
        }
    }
}

#[test]
fn multipliers_and_field_blocks() {
    let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(2));
    let velocity = FunctionSpaceBuilder::new(mesh.clone(), LagrangeElement::p2())
        .components(2)
        .build()
        .unwrap();
    let pressure = FunctionSpaceBuilder::new(mesh, LagrangeElement::p1())
        .zero_mean()
        .build()
        .unwrap();
    let space = Arc::new(MixedSpace::new(vec![velocity, pressure]));
    let n = space.system_size();
    let field = DiscreteField::new(space.clone(), DVector::from_fn(n, |i, _| i as f64));

    assert_eq!(field.multiplier(0), None);
    assert_eq!(field.multiplier(1), Some((n - 1) as f64));
    assert_eq!(field.field_coefficients(0).len(), 50);
    assert_eq!(field.field_coefficients(1).len(), 9);
    assert_eq!(field.field_coefficients(1)[0], 50.0);

    let zeros = DiscreteField::zeros(space);
    assert!(zeros.coefficients().iter().all(|&c| c == 0.0));
}

#[test]
#[should_panic]
fn coefficient_length_must_match_space() {
    let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(1));
    let space = FunctionSpaceBuilder::new(mesh, LagrangeElement::p1())
        .build()
        .unwrap();
    let _ = DiscreteField::new(Arc::new(MixedSpace::single(space)), DVector::zeros(3));
}
