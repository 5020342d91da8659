//! Discrete fields: coefficient vectors interpreted through a function space.
use crate::assembly::buffers::gather_global_to_local;
use crate::form::FieldPoint;
use crate::nalgebra::{DVector, DVectorView, Point2, Vector2};
use crate::quadrature::QuadratureRule;
use crate::space::MixedSpace;
use crate::Real;
use std::sync::Arc;

/// The coefficients of all fields of a [`MixedSpace`], including zero-mean multipliers.
#[derive(Debug, Clone)]
pub struct DiscreteField<T: Real> {
    space: Arc<MixedSpace<T>>,
    coefficients: DVector<T>,
}

impl<T: Real> DiscreteField<T> {
    pub fn new(space: Arc<MixedSpace<T>>, coefficients: DVector<T>) -> Self {
        assert_eq!(
            coefficients.len(),
            space.system_size(),
            "Coefficient vector must match the system size of the space"
        );
        Self { space, coefficients }
    }

    pub fn zeros(space: Arc<MixedSpace<T>>) -> Self {
        let n = space.system_size();
        Self::new(space, DVector::zeros(n))
    }

    /// Interpolates one function per field.
    pub fn interpolate(space: Arc<MixedSpace<T>>, functions: &[&dyn Fn(&Point2<T>) -> Vector2<T>]) -> Self {
        let coefficients = space.interpolate(functions);
        Self::new(space, coefficients)
    }

    pub fn space(&self) -> &Arc<MixedSpace<T>> {
        &self.space
    }

    pub fn coefficients(&self) -> &DVector<T> {
        &self.coefficients
    }

    pub fn into_coefficients(self) -> DVector<T> {
        self.coefficients
    }

    /// Coefficients of a single field.
    pub fn field_coefficients(&self, field: usize) -> DVectorView<T> {
        let range = self.space.field_range(field);
        self.coefficients.rows_range(range)
    }

    /// Value of the zero-mean multiplier of the field, if it has one.
    pub fn multiplier(&self, field: usize) -> Option<T> {
        self.space
            .multiplier(field)
            .map(|index| self.coefficients[index])
    }

    /// Evaluates a field at the reference point `xi` of a cell.
    pub fn evaluate(&self, field: usize, cell: usize, xi: &Point2<T>) -> eyre::Result<FieldPoint<T>> {
        let space = self.space.field(field);
        let offset = self.space.field_range(field).start;
        let geometry = space.mesh().cell_geometry(cell);

        let dofs: Vec<usize> = space
            .cell_dofs(cell)
            .iter()
            .map(|dof| dof + offset)
            .collect();
        let mut local = DVector::zeros(dofs.len());
        gather_global_to_local(&self.coefficients, &mut local, &dofs);

        let mut basis = vec![FieldPoint::zero(); dofs.len()];
        let mut scratch = Vec::new();
        space.populate_cell_basis(cell, &geometry, xi, &mut scratch, &mut basis)?;

        let mut result = FieldPoint::zero();
        for (phi, &c) in basis.iter().zip(local.iter()) {
            result.value += phi.value * c;
            result.grad += phi.grad * c;
        }
        Ok(result)
    }

    /// Field values at the mesh vertices, for export.
    ///
    /// Each vertex takes the value from the last cell containing it, so that discontinuous
    /// fields are sampled from one side.
    pub fn nodal_values(&self, field: usize) -> eyre::Result<Vec<Vector2<T>>> {
        let mesh = self.space.mesh();
        let reference = mesh.cell_kind().reference_vertices::<T>();
        let mut values = vec![Vector2::zeros(); mesh.vertices().len()];
        for cell in 0..mesh.num_cells() {
            for (&vertex, xi) in mesh.cell_vertices(cell).iter().zip(&reference) {
                values[vertex] = self.evaluate(field, cell, xi)?.value;
            }
        }
        Ok(values)
    }

    /// Field values at the cell centroids, for export.
    pub fn cell_values(&self, field: usize) -> eyre::Result<Vec<Vector2<T>>> {
        let mesh = self.space.mesh();
        let reference = mesh.cell_kind().reference_vertices::<T>();
        let centroid = centroid(&reference);
        (0..mesh.num_cells())
            .map(|cell| Ok(self.evaluate(field, cell, &centroid)?.value))
            .collect()
    }

    /// Integrates a quantity derived from the field value and gradient over the domain.
    pub fn integrate_with(
        &self,
        field: usize,
        quadrature_degree: usize,
        mut integrand: impl FnMut(&Point2<T>, &FieldPoint<T>) -> T,
    ) -> eyre::Result<T> {
        let mesh = self.space.mesh();
        let rule = QuadratureRule::for_cell(mesh.cell_kind(), quadrature_degree)?;
        let mut integral = T::zero();
        for cell in 0..mesh.num_cells() {
            let geometry = mesh.cell_geometry(cell);
            for (&w, xi) in rule.weights().iter().zip(rule.points()) {
                let (_, _, det) = geometry.inverse_jacobian(xi)?;
                let x = geometry.map_reference_coords(xi);
                let point = self.evaluate(field, cell, xi)?;
                integral += w * det * integrand(&x, &point);
            }
        }
        Ok(integral)
    }

    /// Integral of the first component of the field.
    pub fn integrate(&self, field: usize) -> eyre::Result<T> {
        let degree = self.default_quadrature_degree(field);
        self.integrate_with(field, degree, |_, point| point.value.x)
    }

    /// Mean value of the first component of the field over the domain.
    pub fn mean(&self, field: usize) -> eyre::Result<T> {
        let mesh = self.space.mesh();
        let area = (0..mesh.num_cells())
            .map(|cell| mesh.cell_geometry(cell).area())
            .fold(T::zero(), |acc, a| acc + a);
        Ok(self.integrate(field)? / area)
    }

    pub(crate) fn default_quadrature_degree(&self, field: usize) -> usize {
        2 * self.space.field(field).element().degree() + 2
    }
}

fn centroid<T: Real>(points: &[Point2<T>]) -> Point2<T> {
    let n = T::from_usize(points.len()).expect("Must be able to fit usize in T");
    let sum = points
        .iter()
        .fold(Vector2::zeros(), |acc, p| acc + p.coords);
    Point2::from(sum / n)
}
