use crate::connectivity::CellKind;
use crate::form::FieldPoint;
use crate::mesh::signed_area;
use crate::nalgebra::{Matrix2, Point2, Scalar, Vector2};
use crate::Real;
use eyre::eyre;
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

pub mod quadrilateral;
pub mod raviart_thomas;
pub mod triangle;

pub use raviart_thomas::RaviartThomas0;

/// Continuity class guaranteed by a finite element space across cell boundaries.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Conformity {
    /// Continuous.
    H1,
    /// Discontinuous.
    L2,
    /// Continuous normal component.
    HDiv,
}

/// Number of degrees of freedom attached to each kind of mesh entity.
///
/// Local basis functions are ordered accordingly: first the vertex functions in local vertex
/// order, then edge functions in local edge order, then interior functions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DofLayout {
    pub per_vertex: usize,
    pub per_edge: usize,
    pub per_cell: usize,
}

/// The geometry of a single straight-sided cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellGeometry<T: Scalar> {
    Triangle([Point2<T>; 3]),
    Quadrilateral([Point2<T>; 4]),
}

impl<T: Real> CellGeometry<T> {
    pub fn kind(&self) -> CellKind {
        match self {
            Self::Triangle(_) => CellKind::Triangle,
            Self::Quadrilateral(_) => CellKind::Quadrilateral,
        }
    }

    pub fn vertices(&self) -> &[Point2<T>] {
        match self {
            Self::Triangle(vertices) => vertices,
            Self::Quadrilateral(vertices) => vertices,
        }
    }

    #[allow(non_snake_case)]
    pub fn map_reference_coords(&self, xi: &Point2<T>) -> Point2<T> {
        let (N, vertices) = match self {
            Self::Triangle(v) => (triangle::tri3_basis(xi).as_slice().to_vec(), v.as_slice()),
            Self::Quadrilateral(v) => (quadrilateral::quad4_basis(xi).as_slice().to_vec(), v.as_slice()),
        };
        let mut x = Vector2::zeros();
        for (n_i, v_i) in N.iter().zip(vertices) {
            x += v_i.coords * *n_i;
        }
        Point2::from(x)
    }

    /// Jacobian `dx/dxi` of the reference map, with `J_ij = dx_i / dxi_j`.
    #[allow(non_snake_case)]
    pub fn reference_jacobian(&self, xi: &Point2<T>) -> Matrix2<T> {
        let mut J = Matrix2::zeros();
        let mut accumulate = |vertex: &Point2<T>, gradient: Vector2<T>| {
            J += vertex.coords * gradient.transpose();
        };
        match self {
            Self::Triangle(v) => {
                let G = triangle::tri3_gradients(xi);
                v.iter()
                    .enumerate()
                    .for_each(|(i, v_i)| accumulate(v_i, G.column(i).into_owned()));
            }
            Self::Quadrilateral(v) => {
                let G = quadrilateral::quad4_gradients(xi);
                v.iter()
                    .enumerate()
                    .for_each(|(i, v_i)| accumulate(v_i, G.column(i).into_owned()));
            }
        }
        J
    }

    /// The reference Jacobian together with its inverse and determinant.
    ///
    /// Fails for singular or inverted maps.
    #[allow(non_snake_case)]
    pub fn inverse_jacobian(&self, xi: &Point2<T>) -> eyre::Result<(Matrix2<T>, Matrix2<T>, T)> {
        let J = self.reference_jacobian(xi);
        let det = J.determinant();
        if det <= T::zero() {
            return Err(eyre!("Singular element Jacobian encountered (det J = {})", det));
        }
        let J_inv = J
            .try_inverse()
            .ok_or_else(|| eyre!("Singular element Jacobian encountered"))?;
        Ok((J, J_inv, det))
    }

    pub fn area(&self) -> T {
        signed_area(self.vertices())
    }

    pub fn edge_endpoints(&self, local_edge: usize) -> (Point2<T>, Point2<T>) {
        let [a, b] = self.kind().edge_vertices(local_edge);
        let vertices = self.vertices();
        (vertices[a], vertices[b])
    }

    pub fn edge_length(&self, local_edge: usize) -> T {
        let (a, b) = self.edge_endpoints(local_edge);
        (b - a).norm()
    }

    /// Outward unit normal of the local edge. Cells are counter-clockwise.
    pub fn outward_normal(&self, local_edge: usize) -> Vector2<T> {
        let (a, b) = self.edge_endpoints(local_edge);
        let t = b - a;
        Vector2::new(t.y, -t.x).normalize()
    }

    /// Reference coordinates of the point with parameter `s` in `[-1, 1]` along the local edge.
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn reference_edge_point(&self, local_edge: usize, s: T) -> Point2<T> {
        let [a, b] = self.kind().edge_vertices(local_edge);
        let reference = self.kind().reference_vertices::<T>();
        Point2::from(reference[a].coords * (0.5 * (1.0 - s)) + reference[b].coords * (0.5 * (1.0 + s)))
    }

    pub fn centroid(&self) -> Point2<T> {
        let vertices = self.vertices();
        let n = T::from_usize(vertices.len()).expect("Must be able to fit usize in T");
        let sum = vertices
            .iter()
            .fold(Vector2::zeros(), |acc, v| acc + v.coords);
        Point2::from(sum / n)
    }

    pub fn diameter(&self) -> T {
        let vertices = self.vertices();
        let mut diameter = T::zero();
        for (i, a) in vertices.iter().enumerate() {
            for b in &vertices[i + 1..] {
                diameter = diameter.max((b - a).norm());
            }
        }
        diameter
    }
}

/// A reference finite element shared by all cells of a function space.
///
/// Basis functions are evaluated directly in physical coordinates, so that elements which are
/// not affine-equivalent (such as Raviart-Thomas) fit the same interface. `signs` holds the
/// orientation of each local edge of the cell (see [`Mesh::cell_edge_sign`](crate::mesh::Mesh::cell_edge_sign)).
pub trait ReferenceElement<T: Real>: Debug + Send + Sync {
    fn cell_kind(&self) -> CellKind;

    fn conformity(&self) -> Conformity;

    /// Polynomial degree of the basis.
    fn degree(&self) -> usize;

    fn num_basis(&self) -> usize;

    /// Number of components of a basis function value, 1 for scalar elements.
    fn value_components(&self) -> usize;

    fn dof_layout(&self) -> DofLayout;

    /// Evaluates all basis functions and their physical gradients at the reference point `xi`.
    fn populate_basis(
        &self,
        cell: &CellGeometry<T>,
        signs: &[T],
        xi: &Point2<T>,
        basis: &mut [FieldPoint<T>],
    ) -> eyre::Result<()>;

    /// Applies the DOF functional of the given local basis function to `f`.
    fn evaluate_dof(&self, cell: &CellGeometry<T>, signs: &[T], local_index: usize, f: &dyn Fn(&Point2<T>) -> Vector2<T>)
        -> T;

    /// Local interpolation: applies every DOF functional to `f`.
    fn interpolate(&self, cell: &CellGeometry<T>, signs: &[T], f: &dyn Fn(&Point2<T>) -> Vector2<T>, dofs: &mut [T]) {
        assert_eq!(dofs.len(), self.num_basis());
        for (i, dof) in dofs.iter_mut().enumerate() {
            *dof = self.evaluate_dof(cell, signs, i, f);
        }
    }
}

/// Lagrange elements: continuous P1/P2 on triangles, Q1/Q2 on quadrilaterals, and their
/// discontinuous counterparts including the piecewise constant P0/Q0.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LagrangeElement {
    kind: CellKind,
    degree: usize,
    continuous: bool,
}

impl LagrangeElement {
    /// Continuous Lagrange element of degree 1 or 2.
    pub fn new(kind: CellKind, degree: usize) -> Self {
        assert!((1..=2).contains(&degree), "Continuous Lagrange elements of degree {} are not supported", degree);
        Self {
            kind,
            degree,
            continuous: true,
        }
    }

    /// Discontinuous Lagrange element of degree 0, 1 or 2.
    pub fn discontinuous(kind: CellKind, degree: usize) -> Self {
        assert!(degree <= 2, "Discontinuous Lagrange elements of degree {} are not supported", degree);
        Self {
            kind,
            degree,
            continuous: false,
        }
    }

    pub fn p1() -> Self {
        Self::new(CellKind::Triangle, 1)
    }

    pub fn p2() -> Self {
        Self::new(CellKind::Triangle, 2)
    }

    pub fn q1() -> Self {
        Self::new(CellKind::Quadrilateral, 1)
    }

    pub fn q2() -> Self {
        Self::new(CellKind::Quadrilateral, 2)
    }

    /// Reference coordinates of the nodes, in basis order.
    pub fn reference_nodes<T: Real>(&self) -> Vec<Point2<T>> {
        match (self.kind, self.degree) {
            (CellKind::Triangle, 0) => vec![triangle::reference_centroid()],
            (CellKind::Quadrilateral, 0) => vec![Point2::origin()],
            (kind, 1) => kind.reference_vertices(),
            (CellKind::Triangle, _) => triangle::tri6_nodes().to_vec(),
            (CellKind::Quadrilateral, _) => quadrilateral::quad9_nodes().to_vec(),
        }
    }

    /// Evaluates the basis and its gradients on the reference cell.
    pub fn reference_basis<T: Real>(&self, xi: &Point2<T>, values: &mut [T], gradients: &mut [Vector2<T>]) {
        let n = <Self as ReferenceElement<T>>::num_basis(self);
        assert_eq!(values.len(), n);
        assert_eq!(gradients.len(), n);
        match (self.kind, self.degree) {
            (_, 0) => {
                values[0] = T::one();
                gradients[0] = Vector2::zeros();
            }
            (CellKind::Triangle, 1) => {
                copy_basis(triangle::tri3_basis(xi).as_slice(), triangle::tri3_gradients(xi).as_slice(), values, gradients)
            }
            (CellKind::Quadrilateral, 1) => copy_basis(
                quadrilateral::quad4_basis(xi).as_slice(),
                quadrilateral::quad4_gradients(xi).as_slice(),
                values,
                gradients,
            ),
            (CellKind::Triangle, _) => {
                copy_basis(triangle::tri6_basis(xi).as_slice(), triangle::tri6_gradients(xi).as_slice(), values, gradients)
            }
            (CellKind::Quadrilateral, _) => copy_basis(
                quadrilateral::quad9_basis(xi).as_slice(),
                quadrilateral::quad9_gradients(xi).as_slice(),
                values,
                gradients,
            ),
        }
    }
}

/// Copies column-major basis data (values `1 x n`, gradients `2 x n`) into slices.
fn copy_basis<T: Real>(basis: &[T], basis_gradients: &[T], values: &mut [T], gradients: &mut [Vector2<T>]) {
    values.copy_from_slice(basis);
    for (i, gradient) in gradients.iter_mut().enumerate() {
        *gradient = Vector2::new(basis_gradients[2 * i], basis_gradients[2 * i + 1]);
    }
}

impl<T: Real> ReferenceElement<T> for LagrangeElement {
    fn cell_kind(&self) -> CellKind {
        self.kind
    }

    fn conformity(&self) -> Conformity {
        if self.continuous {
            Conformity::H1
        } else {
            Conformity::L2
        }
    }

    fn degree(&self) -> usize {
        self.degree
    }

    fn num_basis(&self) -> usize {
        match (self.kind, self.degree) {
            (_, 0) => 1,
            (kind, 1) => kind.num_vertices(),
            (CellKind::Triangle, _) => 6,
            (CellKind::Quadrilateral, _) => 9,
        }
    }

    fn value_components(&self) -> usize {
        1
    }

    fn dof_layout(&self) -> DofLayout {
        let n = <Self as ReferenceElement<T>>::num_basis(self);
        match (self.continuous, self.kind, self.degree) {
            (false, _, _) => DofLayout {
                per_vertex: 0,
                per_edge: 0,
                per_cell: n,
            },
            (true, _, 1) => DofLayout {
                per_vertex: 1,
                per_edge: 0,
                per_cell: 0,
            },
            (true, CellKind::Triangle, _) => DofLayout {
                per_vertex: 1,
                per_edge: 1,
                per_cell: 0,
            },
            (true, CellKind::Quadrilateral, _) => DofLayout {
                per_vertex: 1,
                per_edge: 1,
                per_cell: 1,
            },
        }
    }

    #[allow(non_snake_case)]
    fn populate_basis(
        &self,
        cell: &CellGeometry<T>,
        _signs: &[T],
        xi: &Point2<T>,
        basis: &mut [FieldPoint<T>],
    ) -> eyre::Result<()> {
        let n = <Self as ReferenceElement<T>>::num_basis(self);
        assert_eq!(basis.len(), n);
        let mut values = [T::zero(); 9];
        let mut gradients = [Vector2::zeros(); 9];
        self.reference_basis(xi, &mut values[..n], &mut gradients[..n]);

        let (_, J_inv, _) = cell.inverse_jacobian(xi)?;
        let J_inv_t = J_inv.transpose();
        for ((point, value), gradient) in basis.iter_mut().zip(&values).zip(&gradients) {
            *point = FieldPoint::from_scalar(*value, J_inv_t * gradient);
        }
        Ok(())
    }

    fn evaluate_dof(
        &self,
        cell: &CellGeometry<T>,
        _signs: &[T],
        local_index: usize,
        f: &dyn Fn(&Point2<T>) -> Vector2<T>,
    ) -> T {
        let node = self.reference_nodes::<T>()[local_index];
        f(&cell.map_reference_coords(&node))[0]
    }

    fn interpolate(&self, cell: &CellGeometry<T>, _signs: &[T], f: &dyn Fn(&Point2<T>) -> Vector2<T>, dofs: &mut [T]) {
        let nodes = self.reference_nodes::<T>();
        assert_eq!(dofs.len(), nodes.len());
        for (dof, node) in dofs.iter_mut().zip(&nodes) {
            *dof = f(&cell.map_reference_coords(node))[0];
        }
    }
}
