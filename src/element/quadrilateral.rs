//! Lagrange basis functions on the reference quadrilateral `[-1, 1]^2`.
use crate::nalgebra::{Matrix1x4, Matrix2x4, OMatrix, Point2, Vector2, U1, U2, U9};
use crate::Real;
use numeric_literals::replace_float_literals;

pub type Matrix1x9<T> = OMatrix<T, U1, U9>;
pub type Matrix2x9<T> = OMatrix<T, U2, U9>;

/// Reference coordinates of the Quad9 nodes: vertices, edge midpoints of
/// `(0, 1)`, `(1, 2)`, `(2, 3)`, `(3, 0)`, and the center.
///
/// ```text
/// 3____6____2
/// |         |
/// 7    8    5
/// |         |
/// 0____4____1
/// ```
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn quad9_nodes<T: Real>() -> [Point2<T>; 9] {
    [
        Point2::new(-1.0, -1.0),
        Point2::new(1.0, -1.0),
        Point2::new(1.0, 1.0),
        Point2::new(-1.0, 1.0),
        Point2::new(0.0, -1.0),
        Point2::new(1.0, 0.0),
        Point2::new(0.0, 1.0),
        Point2::new(-1.0, 0.0),
        Point2::new(0.0, 0.0),
    ]
}

#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn quad4_basis<T: Real>(xi: &Point2<T>) -> Matrix1x4<T> {
    let phi = |alpha: T, beta: T| 0.25 * (1.0 + alpha * xi.x) * (1.0 + beta * xi.y);
    Matrix1x4::new(phi(-1.0, -1.0), phi(1.0, -1.0), phi(1.0, 1.0), phi(-1.0, 1.0))
}

#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn quad4_gradients<T: Real>(xi: &Point2<T>) -> Matrix2x4<T> {
    let phi_grad = |alpha: T, beta: T| {
        Vector2::new(
            0.25 * alpha * (1.0 + beta * xi.y),
            0.25 * beta * (1.0 + alpha * xi.x),
        )
    };

    Matrix2x4::from_columns(&[
        phi_grad(-1.0, -1.0),
        phi_grad(1.0, -1.0),
        phi_grad(1.0, 1.0),
        phi_grad(-1.0, 1.0),
    ])
}

/// One-dimensional quadratic Lagrange polynomial for the node `node` in `{-1, 0, 1}`,
/// returning the value and derivative at `s`.
#[replace_float_literals(T::from_f64(literal).unwrap())]
fn quadratic_1d<T: Real>(node: T, s: T) -> (T, T) {
    if node == 0.0 {
        (1.0 - s * s, -2.0 * s)
    } else {
        // node * s * (1 + node * s) / 2, using node^2 = 1
        (0.5 * s * (s + node), s + 0.5 * node)
    }
}

pub fn quad9_basis<T: Real>(xi: &Point2<T>) -> Matrix1x9<T> {
    let nodes = quad9_nodes::<T>();
    Matrix1x9::from_fn(|_, i| {
        let (phi_x, _) = quadratic_1d(nodes[i].x, xi.x);
        let (phi_y, _) = quadratic_1d(nodes[i].y, xi.y);
        phi_x * phi_y
    })
}

pub fn quad9_gradients<T: Real>(xi: &Point2<T>) -> Matrix2x9<T> {
    let nodes = quad9_nodes::<T>();
    let mut gradients = Matrix2x9::zeros();
    for (i, node) in nodes.iter().enumerate() {
        let (phi_x, dphi_x) = quadratic_1d(node.x, xi.x);
        let (phi_y, dphi_y) = quadratic_1d(node.y, xi.y);
        gradients[(0, i)] = dphi_x * phi_y;
        gradients[(1, i)] = phi_x * dphi_y;
    }
    gradients
}
