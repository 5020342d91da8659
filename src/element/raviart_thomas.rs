use crate::connectivity::CellKind;
use crate::element::{CellGeometry, Conformity, DofLayout, ReferenceElement};
use crate::form::FieldPoint;
use crate::nalgebra::{Matrix2, Point2, Vector2};
use crate::quadrature::gauss_segment;
use crate::Real;
use eyre::eyre;
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};

/// Lowest-order Raviart-Thomas element on triangles.
///
/// The basis function associated with local edge `i` is
///
/// ```text
/// phi_i(x) = s_i |e_i| / (2 |K|) (x - p_i),
/// ```
///
/// where `p_i` is the vertex opposite the edge and `s_i` the edge orientation sign. Its normal
/// component is `s_i` on edge `i` and zero on the other edges, so the DOF functional is the
/// signed mean normal flux `(s_i / |e_i|) int_{e_i} v . n ds`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaviartThomas0;

/// Local index of the vertex opposite to the given local edge of a triangle.
fn opposite_vertex(local_edge: usize) -> usize {
    (local_edge + 2) % 3
}

impl<T: Real> ReferenceElement<T> for RaviartThomas0 {
    fn cell_kind(&self) -> CellKind {
        CellKind::Triangle
    }

    fn conformity(&self) -> Conformity {
        Conformity::HDiv
    }

    fn degree(&self) -> usize {
        1
    }

    fn num_basis(&self) -> usize {
        3
    }

    fn value_components(&self) -> usize {
        2
    }

    fn dof_layout(&self) -> DofLayout {
        DofLayout {
            per_vertex: 0,
            per_edge: 1,
            per_cell: 0,
        }
    }

    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn populate_basis(
        &self,
        cell: &CellGeometry<T>,
        signs: &[T],
        xi: &Point2<T>,
        basis: &mut [FieldPoint<T>],
    ) -> eyre::Result<()> {
        assert_eq!(basis.len(), 3);
        assert_eq!(signs.len(), 3);
        let vertices = match cell {
            CellGeometry::Triangle(vertices) => vertices,
            CellGeometry::Quadrilateral(_) => return Err(eyre!("Raviart-Thomas elements require triangular cells")),
        };
        let area = cell.area();
        if area <= 0.0 {
            return Err(eyre!("Singular element Jacobian encountered (area = {})", area));
        }

        let x = cell.map_reference_coords(xi);
        for (i, point) in basis.iter_mut().enumerate() {
            let scale = signs[i] * cell.edge_length(i) / (2.0 * area);
            let p = vertices[opposite_vertex(i)];
            *point = FieldPoint {
                value: (x - p) * scale,
                grad: Matrix2::identity() * scale,
            };
        }
        Ok(())
    }

    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn evaluate_dof(
        &self,
        cell: &CellGeometry<T>,
        signs: &[T],
        local_index: usize,
        f: &dyn Fn(&Point2<T>) -> Vector2<T>,
    ) -> T {
        // (s / |e|) int_e f . n ds, where ds = |e| / 2 dt on the parametrization t in [-1, 1]
        let normal = cell.outward_normal(local_index);
        let (weights, points) = gauss_segment::<T>(3);
        let flux: T = weights
            .iter()
            .zip(&points)
            .map(|(&w, &t)| {
                let xi = cell.reference_edge_point(local_index, t);
                w * f(&cell.map_reference_coords(&xi)).dot(&normal)
            })
            .fold(0.0, |acc, term| acc + term);
        signs[local_index] * 0.5 * flux
    }
}
