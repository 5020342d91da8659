//! Global assembly into sparse matrices and vectors, and application of constraints.
use crate::assembly::buffers::CellBuffer;
use crate::assembly::local::{
    ElementConnectivityAssembler, ElementFormAssembler, ElementMatrixAssembler, ElementVectorAssembler,
    QuadratureTable,
};
use crate::assembly::{AssemblyError, AssemblySettings, DimensionMismatchError};
use crate::form::WeakForm;
use crate::mesh::Tag;
use crate::nalgebra::{DMatrix, DVector};
use crate::space::MixedSpace;
use crate::Real;
use log::debug;
use nalgebra_sparse::csr::CsrRowMut;
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::CsrMatrix;
use rayon::prelude::*;
use std::collections::BTreeSet;

/// Builds the sparsity pattern of the given elements.
///
/// The diagonal is always part of the pattern, so that constrained rows can be replaced by
/// scaled identity rows.
pub fn assemble_pattern(element_assembler: &dyn ElementConnectivityAssembler) -> SparsityPattern {
    // Collecting into a BTreeSet stores each entry exactly once, at the cost of some speed
    let n = element_assembler.system_size();
    let mut matrix_entries: BTreeSet<(usize, usize)> = (0..n).map(|i| (i, i)).collect();
    let mut dofs = Vec::new();
    for element in 0..element_assembler.num_elements() {
        element_assembler.populate_element_dofs(element, &mut dofs);
        for &i in &dofs {
            for &j in &dofs {
                matrix_entries.insert((i, j));
            }
        }
    }

    let mut offsets = Vec::with_capacity(n + 1);
    let mut column_indices = Vec::with_capacity(matrix_entries.len());
    offsets.push(0);
    for (i, j) in matrix_entries {
        while i + 1 > offsets.len() {
            offsets.push(column_indices.len());
        }
        column_indices.push(j);
    }
    while offsets.len() < n + 1 {
        offsets.push(column_indices.len());
    }

    SparsityPattern::try_from_offsets_and_indices(n, n, offsets, column_indices)
        .expect("Pattern built from sorted unique entries is always valid")
}

/// Adds the element matrices of the given elements to a CSR matrix.
///
/// Element contributions are scattered in the order the elements are given. With `parallel`,
/// element matrices are computed on the rayon thread pool but scattered in the same order, so
/// that the result is identical to serial assembly.
pub fn assemble_matrix_into_csr<T: Real>(
    csr: &mut CsrMatrix<T>,
    element_assembler: &dyn ElementMatrixAssembler<T>,
    elements: &[usize],
    parallel: bool,
) -> Result<(), AssemblyError> {
    DimensionMismatchError::check("matrix rows", element_assembler.system_size(), csr.nrows())?;
    if parallel {
        let contributions = elements
            .par_iter()
            .map_init(CellBuffer::default, |buffer, &element| {
                element_assembler
                    .assemble_element_matrix(element, buffer)
                    .map_err(|source| AssemblyError::Element { cell: element, source })?;
                Ok((buffer.dofs.clone(), buffer.element_matrix.clone()))
            })
            .collect::<Result<Vec<_>, AssemblyError>>()?;
        for (dofs, element_matrix) in &contributions {
            add_element_matrix_to_csr(csr, dofs, element_matrix)?;
        }
    } else {
        let mut buffer = CellBuffer::default();
        for &element in elements {
            element_assembler
                .assemble_element_matrix(element, &mut buffer)
                .map_err(|source| AssemblyError::Element { cell: element, source })?;
            add_element_matrix_to_csr(csr, &buffer.dofs, &buffer.element_matrix)?;
        }
    }
    Ok(())
}

/// Adds the element vectors of the given elements to a global vector.
pub fn assemble_vector_into<T: Real>(
    vector: &mut DVector<T>,
    element_assembler: &dyn ElementVectorAssembler<T>,
    elements: &[usize],
    parallel: bool,
) -> Result<(), AssemblyError> {
    DimensionMismatchError::check("vector length", element_assembler.system_size(), vector.len())?;
    if parallel {
        let contributions = elements
            .par_iter()
            .map_init(CellBuffer::default, |buffer, &element| {
                element_assembler
                    .assemble_element_vector(element, buffer)
                    .map_err(|source| AssemblyError::Element { cell: element, source })?;
                Ok((buffer.dofs.clone(), buffer.element_vector.clone()))
            })
            .collect::<Result<Vec<_>, AssemblyError>>()?;
        for (dofs, element_vector) in &contributions {
            add_element_vector(vector, dofs, element_vector)?;
        }
    } else {
        let mut buffer = CellBuffer::default();
        for &element in elements {
            element_assembler
                .assemble_element_vector(element, &mut buffer)
                .map_err(|source| AssemblyError::Element { cell: element, source })?;
            add_element_vector(vector, &buffer.dofs, &buffer.element_vector)?;
        }
    }
    Ok(())
}

fn add_element_vector<T: Real>(
    vector: &mut DVector<T>,
    dofs: &[usize],
    element_vector: &DVector<T>,
) -> Result<(), DimensionMismatchError> {
    DimensionMismatchError::check("element vector", dofs.len(), element_vector.len())?;
    for (&dof, &value) in dofs.iter().zip(element_vector.iter()) {
        vector[dof] += value;
    }
    Ok(())
}

fn add_element_matrix_to_csr<T: Real>(
    csr: &mut CsrMatrix<T>,
    dofs: &[usize],
    element_matrix: &DMatrix<T>,
) -> Result<(), DimensionMismatchError> {
    DimensionMismatchError::check("element matrix rows", dofs.len(), element_matrix.nrows())?;
    DimensionMismatchError::check("element matrix columns", dofs.len(), element_matrix.ncols())?;

    let mut sorted_permutation: Vec<usize> = (0..dofs.len()).collect();
    sorted_permutation.sort_unstable_by_key(|&i| dofs[i]);
    for (local_row, &global_row) in dofs.iter().enumerate() {
        let mut csr_row = csr.row_mut(global_row);
        add_element_row_to_csr_row(&mut csr_row, dofs, &sorted_permutation, element_matrix, local_row);
    }
    Ok(())
}

/// Adds a row of an element matrix to a CSR row.
///
/// `sorted_permutation` orders the local DOFs by increasing global index, so that the CSR columns
/// can be found with a single forward scan.
fn add_element_row_to_csr_row<T: Real>(
    row: &mut CsrRowMut<T>,
    dofs: &[usize],
    sorted_permutation: &[usize],
    element_matrix: &DMatrix<T>,
    local_row: usize,
) {
    let (column_indices, values) = row.cols_and_values_mut();
    let mut csr_col_iter = column_indices.iter().copied().enumerate();
    for &local_col in sorted_permutation {
        let global_col = dofs[local_col];
        // TODO: Use exponential search for rows with many entries
        let (csr_index, _) = csr_col_iter
            .find(|&(_, col)| col == global_col)
            .expect("Could not find column index associated with DOF in CSR row");
        values[csr_index] += element_matrix[(local_row, local_col)];
    }
}

/// Replaces the rows and columns of constrained DOFs by identity rows.
///
/// The diagonal is set to the magnitude of the first non-zero diagonal entry of the matrix, so that
/// the scaling of the remaining entries is preserved.
pub fn apply_dirichlet_bc_csr<T: Real>(matrix: &mut CsrMatrix<T>, constrained: &[bool]) {
    assert_eq!(constrained.len(), matrix.nrows());
    let scale = matrix
        .diagonal_as_csr()
        .values()
        .iter()
        .copied()
        .find(|&x| x != T::zero())
        .map(|x| x.abs())
        .unwrap_or(T::one());

    for (row_index, mut row) in matrix.row_iter_mut().enumerate() {
        let row_is_constrained = constrained[row_index];
        let (cols, values) = row.cols_and_values_mut();
        for (&col, value) in cols.iter().zip(values) {
            if row_is_constrained {
                *value = if col == row_index { scale } else { T::zero() };
            } else if constrained[col] {
                *value = T::zero();
            }
        }
    }
}

/// Sets the residual of constrained DOFs to `u_d - g_d`.
pub fn apply_dirichlet_bc_residual<T: Real>(residual: &mut DVector<T>, u: &DVector<T>, values: &[(usize, T)]) {
    for &(dof, g) in values {
        residual[dof] = u[dof] - g;
    }
}

/// A linear system `A x = b` obtained by linearizing a form about the lift of its Dirichlet data.
///
/// The solution of the form is `lift + x`.
#[derive(Debug, Clone)]
pub struct LinearSystem<T: Real> {
    pub matrix: CsrMatrix<T>,
    pub rhs: DVector<T>,
    pub lift: DVector<T>,
}

/// Assembles residuals and Jacobians of a weak form on a mixed space.
///
/// The assembler holds the quadrature, the sparsity pattern and the resolved boundary tags, so
/// that repeated assembly (in Newton iterations or time steps) only recomputes values.
#[derive(Debug)]
pub struct SystemAssembler<'a, T: Real, F> {
    space: &'a MixedSpace<T>,
    form: F,
    settings: AssemblySettings,
    quadrature: QuadratureTable<T>,
    boundary: Vec<(String, Tag)>,
    pattern: SparsityPattern,
    all_cells: Vec<usize>,
    time: T,
    aux: Vec<DVector<T>>,
}

/// Quadrature degree used when none is configured.
pub fn default_quadrature_degree<T: Real>(space: &MixedSpace<T>) -> usize {
    let max_degree = space
        .fields()
        .iter()
        .map(|field| field.element().degree())
        .max()
        .unwrap_or(1);
    2 * max_degree + 2
}

impl<'a, T: Real, F: WeakForm<T>> SystemAssembler<'a, T, F> {
    pub fn new(space: &'a MixedSpace<T>, form: F, settings: AssemblySettings) -> Result<Self, AssemblyError> {
        DimensionMismatchError::check("number of fields", space.num_fields(), form.num_fields())?;

        let degree = settings
            .quadrature_degree
            .unwrap_or_else(|| default_quadrature_degree(space));
        if let Some(required) = form.quadrature_degree() {
            debug_assert!(
                degree >= required,
                "Quadrature degree {} is too low for a form requiring degree {}",
                degree,
                required
            );
        }
        let quadrature = QuadratureTable::new(space.mesh().cell_kind(), degree)?;

        let mesh = space.mesh();
        let boundary = form
            .boundary_tags()
            .into_iter()
            .map(|name| {
                let tag = mesh.tag(&name)?.clone();
                Ok((name, tag))
            })
            .collect::<Result<Vec<_>, AssemblyError>>()?;

        let mut assembler = Self {
            space,
            form,
            settings,
            quadrature,
            boundary,
            pattern: SparsityPattern::zeros(0, 0),
            all_cells: (0..space.num_cells()).collect(),
            time: T::zero(),
            aux: Vec::new(),
        };
        let empty = DVector::zeros(space.system_size());
        assembler.pattern = assemble_pattern(&assembler.element_assembler(&empty));
        debug!(
            "Created system assembler: {} unknowns, {} nonzeros, quadrature degree {}",
            space.system_size(),
            assembler.pattern.nnz(),
            degree
        );
        Ok(assembler)
    }

    pub fn space(&self) -> &'a MixedSpace<T> {
        self.space
    }

    pub fn form(&self) -> &F {
        &self.form
    }

    pub fn settings(&self) -> &AssemblySettings {
        &self.settings
    }

    pub fn pattern(&self) -> &SparsityPattern {
        &self.pattern
    }

    pub fn time(&self) -> T {
        self.time
    }

    /// Sets the time passed to the form and used for Dirichlet data.
    pub fn set_time(&mut self, time: T) {
        self.time = time;
    }

    /// Sets the auxiliary coefficient vectors, each of system size.
    pub fn set_aux(&mut self, aux: Vec<DVector<T>>) {
        self.aux = aux;
    }

    pub fn aux(&self) -> &[DVector<T>] {
        &self.aux
    }

    fn element_assembler<'b>(&'b self, u: &'b DVector<T>) -> ElementFormAssembler<'b, T, F> {
        ElementFormAssembler {
            space: self.space,
            form: &self.form,
            quadrature: &self.quadrature,
            boundary: &self.boundary,
            u,
            aux: &self.aux,
            time: self.time,
        }
    }

    fn check_state(&self, u: &DVector<T>) -> Result<(), DimensionMismatchError> {
        let n = self.space.system_size();
        DimensionMismatchError::check("state vector", n, u.len())?;
        for aux in &self.aux {
            DimensionMismatchError::check("auxiliary vector", n, aux.len())?;
        }
        Ok(())
    }

    /// Residual of the form over the given cells, without constraints applied.
    pub fn residual_for_cells(&self, u: &DVector<T>, cells: &[usize]) -> Result<DVector<T>, AssemblyError> {
        self.check_state(u)?;
        let mut residual = DVector::zeros(self.space.system_size());
        assemble_vector_into(&mut residual, &self.element_assembler(u), cells, self.settings.parallel)?;
        Ok(residual)
    }

    /// Jacobian of the form over the given cells, without constraints applied.
    pub fn jacobian_for_cells(&self, u: &DVector<T>, cells: &[usize]) -> Result<CsrMatrix<T>, AssemblyError> {
        self.check_state(u)?;
        let values = vec![T::zero(); self.pattern.nnz()];
        let mut matrix = CsrMatrix::try_from_pattern_and_values(self.pattern.clone(), values)
            .expect("Value count matches the pattern");
        assemble_matrix_into_csr(&mut matrix, &self.element_assembler(u), cells, self.settings.parallel)?;
        Ok(matrix)
    }

    pub fn residual(&self, u: &DVector<T>) -> Result<DVector<T>, AssemblyError> {
        self.residual_for_cells(u, &self.all_cells)
    }

    pub fn jacobian(&self, u: &DVector<T>) -> Result<CsrMatrix<T>, AssemblyError> {
        self.jacobian_for_cells(u, &self.all_cells)
    }

    /// Global indices and values of the Dirichlet DOFs at the current time.
    pub fn dirichlet_values(&self) -> Vec<(usize, T)> {
        self.space.dirichlet_values(self.time)
    }

    /// Overwrites the Dirichlet DOFs of `u` with their prescribed values at the current time.
    pub fn impose_dirichlet(&self, u: &mut DVector<T>) {
        for (dof, value) in self.dirichlet_values() {
            u[dof] = value;
        }
    }

    /// The vector that is zero except at Dirichlet DOFs, where it takes the prescribed values.
    pub fn lift(&self) -> DVector<T> {
        let mut u = DVector::zeros(self.space.system_size());
        self.impose_dirichlet(&mut u);
        u
    }

    /// Applies the Dirichlet constraints to an assembled residual.
    pub fn constrain_residual(&self, u: &DVector<T>, residual: &mut DVector<T>) {
        apply_dirichlet_bc_residual(residual, u, &self.dirichlet_values());
    }

    /// Applies the Dirichlet constraints to an assembled Jacobian.
    pub fn constrain_jacobian(&self, jacobian: &mut CsrMatrix<T>) {
        apply_dirichlet_bc_csr(jacobian, &self.space.dirichlet_mask());
    }

    pub fn constrained_residual(&self, u: &DVector<T>) -> Result<DVector<T>, AssemblyError> {
        let mut residual = self.residual(u)?;
        self.constrain_residual(u, &mut residual);
        Ok(residual)
    }

    pub fn constrained_jacobian(&self, u: &DVector<T>) -> Result<CsrMatrix<T>, AssemblyError> {
        let mut jacobian = self.jacobian(u)?;
        self.constrain_jacobian(&mut jacobian);
        Ok(jacobian)
    }

    /// Linearizes the form about the Dirichlet lift `u0`, giving `J(u0) x = -F(u0)`.
    ///
    /// For forms that are affine in the unknowns, `u0 + x` is the exact discrete solution.
    pub fn linear_system(&self) -> Result<LinearSystem<T>, AssemblyError> {
        let lift = self.lift();
        let matrix = self.constrained_jacobian(&lift)?;
        let rhs = -self.constrained_residual(&lift)?;
        Ok(LinearSystem { matrix, rhs, lift })
    }
}
