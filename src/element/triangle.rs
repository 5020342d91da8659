//! Lagrange basis functions on the reference triangle.
//!
//! The reference element is chosen to be the triangle defined by the corners
//! (-1, -1), (1, -1), (-1, 1). This perhaps unorthodox choice is due to the quadrature rules
//! we employ.
use crate::nalgebra::{Matrix1x3, Matrix1x6, Matrix2x3, Matrix2x6, Point2, Vector2};
use crate::Real;
use numeric_literals::replace_float_literals;

/// Barycentric coordinates of a point in the reference triangle.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn tri3_basis<T: Real>(xi: &Point2<T>) -> Matrix1x3<T> {
    Matrix1x3::new(-0.5 * xi.x - 0.5 * xi.y, 0.5 * xi.x + 0.5, 0.5 * xi.y + 0.5)
}

#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn tri3_gradients<T: Real>(_xi: &Point2<T>) -> Matrix2x3<T> {
    Matrix2x3::from_columns(&[Vector2::new(-0.5, -0.5), Vector2::new(0.5, 0.0), Vector2::new(0.0, 0.5)])
}

/// Quadratic basis: vertex functions followed by the edge functions of `(0, 1)`, `(1, 2)`, `(2, 0)`.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn tri6_basis<T: Real>(xi: &Point2<T>) -> Matrix1x6<T> {
    let psi = tri3_basis(xi);
    let vertex = |i: usize| psi[i] * (2.0 * psi[i] - 1.0);
    let edge = |i: usize, j: usize| 4.0 * psi[i] * psi[j];
    Matrix1x6::from_row_slice(&[vertex(0), vertex(1), vertex(2), edge(0, 1), edge(1, 2), edge(2, 0)])
}

#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn tri6_gradients<T: Real>(xi: &Point2<T>) -> Matrix2x6<T> {
    // Product rule on the barycentric coordinates
    let psi = tri3_basis(xi);
    let g = tri3_gradients(xi);

    let vertex_gradient = |i: usize| g.column(i) * (4.0 * psi[i] - 1.0);
    let edge_gradient = |i: usize, j: usize| g.column(i) * (4.0 * psi[j]) + g.column(j) * (4.0 * psi[i]);

    Matrix2x6::from_columns(&[
        vertex_gradient(0),
        vertex_gradient(1),
        vertex_gradient(2),
        edge_gradient(0, 1),
        edge_gradient(1, 2),
        edge_gradient(2, 0),
    ])
}

/// Reference coordinates of the Tri6 nodes, in basis order.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn tri6_nodes<T: Real>() -> [Point2<T>; 6] {
    [
        Point2::new(-1.0, -1.0),
        Point2::new(1.0, -1.0),
        Point2::new(-1.0, 1.0),
        Point2::new(0.0, -1.0),
        Point2::new(0.0, 0.0),
        Point2::new(-1.0, 0.0),
    ]
}

#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn reference_centroid<T: Real>() -> Point2<T> {
    Point2::new(-1.0 / 3.0, -1.0 / 3.0)
}
