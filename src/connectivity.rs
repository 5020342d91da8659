use crate::Real;
use galerkin_traits::real;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// The shape of the cells in a mesh.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellKind {
    /// Straight-sided triangle, reference domain with corners `(-1, -1)`, `(1, -1)`, `(-1, 1)`.
    Triangle,
    /// Bilinear quadrilateral, reference domain `[-1, 1]^2`.
    Quadrilateral,
}

const TRIANGLE_EDGES: [[usize; 2]; 3] = [[0, 1], [1, 2], [2, 0]];
const QUADRILATERAL_EDGES: [[usize; 2]; 4] = [[0, 1], [1, 2], [2, 3], [3, 0]];

impl CellKind {
    pub fn num_vertices(&self) -> usize {
        match self {
            Self::Triangle => 3,
            Self::Quadrilateral => 4,
        }
    }

    pub fn num_edges(&self) -> usize {
        self.num_vertices()
    }

    /// Local vertex indices of the given local edge, in counter-clockwise order.
    pub fn edge_vertices(&self, local_edge: usize) -> [usize; 2] {
        match self {
            Self::Triangle => TRIANGLE_EDGES[local_edge],
            Self::Quadrilateral => QUADRILATERAL_EDGES[local_edge],
        }
    }

    /// Vertices of the reference cell.
    pub fn reference_vertices<T: Real>(&self) -> Vec<Point2<T>> {
        let coords: &[[f64; 2]] = match self {
            Self::Triangle => &[[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0]],
            Self::Quadrilateral => &[[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]],
        };
        coords
            .iter()
            .map(|&[x, y]| Point2::new(real(x), real(y)))
            .collect()
    }
}

/// Connectivity of a cell: the indices of its vertices in the mesh vertex array.
pub trait Connectivity: Clone {
    const KIND: CellKind;

    fn vertex_indices(&self) -> &[usize];

    fn vertex_indices_mut(&mut self) -> &mut [usize];
}

/// Connectivity for a two-dimensional Tri3 element.
///
/// ```text
/// 2
/// | \
/// |   \
/// 0 ___ 1
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tri3d2Connectivity(pub [usize; 3]);

/// Connectivity for a two-dimensional Quad4 element.
///
/// ```text
/// 3____2
/// |    |
/// 0____1
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quad4d2Connectivity(pub [usize; 4]);

impl Connectivity for Tri3d2Connectivity {
    const KIND: CellKind = CellKind::Triangle;

    fn vertex_indices(&self) -> &[usize] {
        &self.0
    }

    fn vertex_indices_mut(&mut self) -> &mut [usize] {
        &mut self.0
    }
}

impl Connectivity for Quad4d2Connectivity {
    const KIND: CellKind = CellKind::Quadrilateral;

    fn vertex_indices(&self) -> &[usize] {
        &self.0
    }

    fn vertex_indices_mut(&mut self) -> &mut [usize] {
        &mut self.0
    }
}

impl Deref for Tri3d2Connectivity {
    type Target = [usize];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Deref for Quad4d2Connectivity {
    type Target = [usize];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Quad4d2Connectivity {
    /// Splits the quadrilateral into two triangles along the diagonal `0 - 2`.
    pub fn split_into_triangles(&self) -> [Tri3d2Connectivity; 2] {
        let [a, b, c, d] = self.0;
        [Tri3d2Connectivity([a, b, c]), Tri3d2Connectivity([a, c, d])]
    }
}
