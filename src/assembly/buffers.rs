use crate::element::CellGeometry;
use crate::form::{FieldPoint, TestCoefficients};
use crate::nalgebra::{DMatrix, DVector, Point2};
use crate::space::MixedSpace;
use crate::Real;
use itertools::izip;

/// Per-cell scratch data, reused across cells so that assembly allocates only once per thread.
///
/// The local DOF list of a cell consists of the DOFs of every field, in field order, followed by
/// the multipliers of zero-mean fields. Element matrices and vectors follow the same order.
#[derive(Debug, Clone)]
pub struct CellBuffer<T: Real> {
    pub(crate) dofs: Vec<usize>,
    pub(crate) u_local: DVector<T>,
    pub(crate) aux_local: Vec<DVector<T>>,
    pub(crate) basis: Vec<FieldPoint<T>>,
    pub(crate) scratch: Vec<FieldPoint<T>>,
    pub(crate) u_points: Vec<FieldPoint<T>>,
    pub(crate) du_points: Vec<FieldPoint<T>>,
    pub(crate) aux_points: Vec<FieldPoint<T>>,
    pub(crate) coefficients: Vec<TestCoefficients<T>>,
    pub(crate) means: DVector<T>,
    pub(crate) element_matrix: DMatrix<T>,
    pub(crate) element_vector: DVector<T>,
}

impl<T: Real> Default for CellBuffer<T> {
    fn default() -> Self {
        Self {
            dofs: Vec::new(),
            u_local: DVector::zeros(0),
            aux_local: Vec::new(),
            basis: Vec::new(),
            scratch: Vec::new(),
            u_points: Vec::new(),
            du_points: Vec::new(),
            aux_points: Vec::new(),
            coefficients: Vec::new(),
            means: DVector::zeros(0),
            element_matrix: DMatrix::zeros(0, 0),
            element_vector: DVector::zeros(0),
        }
    }
}

/// Appends the global DOFs of the cell, followed by the multipliers of zero-mean fields.
pub fn populate_element_dofs<T: Real>(space: &MixedSpace<T>, cell: usize, dofs: &mut Vec<usize>) {
    space.populate_cell_dofs(cell, dofs);
    dofs.extend((0..space.num_fields()).filter_map(|field| space.multiplier(field)));
}

impl<T: Real> CellBuffer<T> {
    /// Global DOFs of the current contribution.
    pub fn dofs(&self) -> &[usize] {
        &self.dofs
    }

    pub fn element_matrix(&self) -> &DMatrix<T> {
        &self.element_matrix
    }

    pub fn element_vector(&self) -> &DVector<T> {
        &self.element_vector
    }

    /// Replaces the current contribution by a matrix over the given global DOFs.
    ///
    /// The shape of the matrix is checked against the DOFs when the contribution is added to the
    /// global matrix.
    pub fn set_matrix_contribution(&mut self, dofs: &[usize], matrix: DMatrix<T>) {
        self.dofs.clear();
        self.dofs.extend_from_slice(dofs);
        self.element_matrix = matrix;
    }

    /// Replaces the current contribution by a vector over the given global DOFs.
    pub fn set_vector_contribution(&mut self, dofs: &[usize], vector: DVector<T>) {
        self.dofs.clear();
        self.dofs.extend_from_slice(dofs);
        self.element_vector = vector;
    }

    /// Gathers the DOFs and local coefficients of the cell and sizes all buffers accordingly.
    pub fn prepare_cell(&mut self, space: &MixedSpace<T>, cell: usize, u: &DVector<T>, aux: &[DVector<T>]) {
        populate_element_dofs(space, cell, &mut self.dofs);
        let n = self.dofs.len();
        let num_fields = space.num_fields();

        self.u_local.resize_vertically_mut(n, T::zero());
        gather_global_to_local(u, &mut self.u_local, &self.dofs);

        self.aux_local.resize(aux.len(), DVector::zeros(n));
        for (local, global) in self.aux_local.iter_mut().zip(aux) {
            local.resize_vertically_mut(n, T::zero());
            gather_global_to_local(global, local, &self.dofs);
        }

        self.basis.resize(space.local_size(), FieldPoint::zero());
        self.u_points.resize(num_fields, FieldPoint::zero());
        self.du_points.resize(num_fields, FieldPoint::zero());
        self.aux_points
            .resize(aux.len() * num_fields, FieldPoint::zero());
        self.coefficients
            .resize(num_fields, TestCoefficients::zero());
        self.means.resize_vertically_mut(space.local_size(), T::zero());
        self.means.fill(T::zero());
        self.element_matrix.resize_mut(n, n, T::zero());
        self.element_matrix.fill(T::zero());
        self.element_vector.resize_vertically_mut(n, T::zero());
        self.element_vector.fill(T::zero());
    }

    /// Evaluates the basis functions of every field at the reference point, then interpolates
    /// the unknowns and auxiliary fields there.
    pub fn populate_point(
        &mut self,
        space: &MixedSpace<T>,
        cell: usize,
        geometry: &CellGeometry<T>,
        xi: &Point2<T>,
    ) -> eyre::Result<()> {
        let offsets = space.local_offsets();
        for (index, field) in space.fields().iter().enumerate() {
            let block = &mut self.basis[offsets[index]..offsets[index + 1]];
            field.populate_cell_basis(cell, geometry, xi, &mut self.scratch, block)?;
        }

        interpolate_fields(offsets, &self.basis, &self.u_local, &mut self.u_points);
        let num_fields = space.num_fields();
        for (k, coefficients) in self.aux_local.iter().enumerate() {
            let points = &mut self.aux_points[k * num_fields..(k + 1) * num_fields];
            interpolate_fields(offsets, &self.basis, coefficients, points);
        }
        Ok(())
    }
}

fn interpolate_fields<T: Real>(
    offsets: &[usize],
    basis: &[FieldPoint<T>],
    coefficients: &DVector<T>,
    points: &mut [FieldPoint<T>],
) {
    for (index, point) in points.iter_mut().enumerate() {
        let range = offsets[index]..offsets[index + 1];
        let mut result = FieldPoint::zero();
        for (phi, &c) in izip!(&basis[range.clone()], &coefficients.as_slice()[range]) {
            result.value += phi.value * c;
            result.grad += phi.grad * c;
        }
        *point = result;
    }
}

pub fn gather_global_to_local<T: Real>(global: &DVector<T>, local: &mut DVector<T>, indices: &[usize]) {
    assert_eq!(local.len(), indices.len());
    for (local_value, &global_index) in local.iter_mut().zip(indices) {
        *local_value = global[global_index];
    }
}
