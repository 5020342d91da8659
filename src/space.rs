//! Function spaces: degree-of-freedom numbering, Dirichlet constraints and products of spaces.
use crate::element::{CellGeometry, ReferenceElement};
use crate::form::FieldPoint;
use crate::mesh::{InvalidTagError, Mesh};
use crate::nalgebra::{DVector, Point2, Scalar, Vector2};
use crate::Real;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::ops::Range;
use std::sync::Arc;

/// A function of space and time, returning a field value.
///
/// Scalar functions return their value in the first component.
pub type FieldFunction<T> = Arc<dyn Fn(&Point2<T>, T) -> Vector2<T> + Send + Sync>;

/// Essential boundary condition on a tagged part of the boundary.
#[derive(Clone)]
pub struct DirichletCondition<T: Scalar> {
    tag: String,
    function: FieldFunction<T>,
}

impl<T: Scalar> DirichletCondition<T> {
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl<T: Scalar> Debug for DirichletCondition<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirichletCondition")
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

/// A degree of freedom fixed by a Dirichlet condition, together with a cell through which its
/// DOF functional can be evaluated.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct ConstrainedDof {
    dof: usize,
    cell: usize,
    scalar_local: usize,
    component: usize,
    condition: usize,
}

/// Builds a [`FunctionSpace`] from a mesh, a reference element and boundary conditions.
#[derive(Debug)]
pub struct FunctionSpaceBuilder<T: Real> {
    mesh: Arc<Mesh<T>>,
    element: Arc<dyn ReferenceElement<T>>,
    components: usize,
    dirichlet: Vec<DirichletCondition<T>>,
    zero_mean: bool,
}

impl<T: Real> FunctionSpaceBuilder<T> {
    pub fn new(mesh: Arc<Mesh<T>>, element: impl ReferenceElement<T> + 'static) -> Self {
        Self::with_shared_element(mesh, Arc::new(element))
    }

    pub fn with_shared_element(mesh: Arc<Mesh<T>>, element: Arc<dyn ReferenceElement<T>>) -> Self {
        Self {
            mesh,
            element,
            components: 1,
            dirichlet: Vec::new(),
            zero_mean: false,
        }
    }

    /// Number of copies of a scalar element, e.g. 2 for a vector-valued Lagrange space.
    pub fn components(mut self, components: usize) -> Self {
        self.components = components;
        self
    }

    /// Prescribes the value of a scalar field on the tagged boundary.
    pub fn dirichlet(mut self, tag: impl Into<String>, g: impl Fn(&Point2<T>, T) -> T + Send + Sync + 'static) -> Self {
        self.dirichlet.push(DirichletCondition {
            tag: tag.into(),
            function: Arc::new(move |x, t| Vector2::new(g(x, t), T::zero())),
        });
        self
    }

    /// Prescribes a vector-valued field on the tagged boundary.
    ///
    /// For Raviart-Thomas spaces only the normal component is imposed.
    pub fn dirichlet_vector(
        mut self,
        tag: impl Into<String>,
        g: impl Fn(&Point2<T>, T) -> Vector2<T> + Send + Sync + 'static,
    ) -> Self {
        self.dirichlet.push(DirichletCondition {
            tag: tag.into(),
            function: Arc::new(g),
        });
        self
    }

    /// Constrains the field to have zero mean, enforced with a Lagrange multiplier.
    pub fn zero_mean(mut self) -> Self {
        self.zero_mean = true;
        self
    }

    pub fn build(self) -> Result<FunctionSpace<T>, InvalidTagError> {
        let FunctionSpaceBuilder {
            mesh,
            element,
            components,
            dirichlet,
            zero_mean,
        } = self;

        assert_eq!(
            mesh.cell_kind(),
            element.cell_kind(),
            "Element cell kind must match the mesh cell kind"
        );
        assert!(components >= 1, "A space must have at least one component");
        assert!(
            element.value_components() == 1 || components == 1,
            "Vector-valued elements can not be replicated into components"
        );
        assert!(
            !zero_mean || (element.value_components() == 1 && components == 1),
            "Zero-mean constraints are only supported for scalar fields"
        );

        // Resolve tags first, so that construction fails before doing any work
        let tags = dirichlet
            .iter()
            .map(|condition| mesh.tag(&condition.tag))
            .collect::<Result<Vec<_>, _>>()?;

        let kind = mesh.cell_kind();
        let layout = element.dof_layout();
        let num_vertices = kind.num_vertices();
        let num_edges = kind.num_edges();
        assert!(layout.per_edge <= 1, "Oriented edge DOFs are not supported");
        assert_eq!(
            num_vertices * layout.per_vertex + num_edges * layout.per_edge + layout.per_cell,
            element.num_basis(),
            "DOF layout must account for every basis function"
        );

        // Scalar DOFs are numbered in order of first encounter while traversing cells
        let mut vertex_dofs = vec![usize::MAX; mesh.vertices().len()];
        let mut edge_dofs = vec![usize::MAX; mesh.num_edges()];
        let mut num_scalar_dofs = 0;
        let mut next = |count: usize| {
            let first = num_scalar_dofs;
            num_scalar_dofs += count;
            first
        };

        let num_scalar_basis = element.num_basis();
        let local_size = components * num_scalar_basis;
        let mut cell_dofs = Vec::with_capacity(mesh.num_cells() * local_size);
        let mut cell_signs = Vec::with_capacity(mesh.num_cells() * num_edges);
        let mut scalar_dofs = Vec::with_capacity(num_scalar_basis);
        for cell in 0..mesh.num_cells() {
            scalar_dofs.clear();
            for &v in mesh.cell_vertices(cell) {
                if layout.per_vertex > 0 && vertex_dofs[v] == usize::MAX {
                    vertex_dofs[v] = next(layout.per_vertex);
                }
                scalar_dofs.extend((0..layout.per_vertex).map(|j| vertex_dofs[v] + j));
            }
            for &e in mesh.cell_edges(cell) {
                if layout.per_edge > 0 && edge_dofs[e] == usize::MAX {
                    edge_dofs[e] = next(layout.per_edge);
                }
                scalar_dofs.extend((0..layout.per_edge).map(|j| edge_dofs[e] + j));
            }
            let interior = next(layout.per_cell);
            scalar_dofs.extend(interior..interior + layout.per_cell);

            for &scalar_dof in &scalar_dofs {
                cell_dofs.extend((0..components).map(|c| components * scalar_dof + c));
            }
            cell_signs.extend((0..num_edges).map(|local_edge| mesh.cell_edge_sign(cell, local_edge)));
        }
        let num_dofs = components * num_scalar_dofs;

        let mut constrained = BTreeMap::new();
        for (condition_index, tag) in tags.iter().enumerate() {
            let mut count = 0;
            for cell in 0..mesh.num_cells() {
                let vertex_locals = mesh
                    .cell_vertices(cell)
                    .iter()
                    .enumerate()
                    .filter(|&(_, &v)| tag.contains_vertex(v))
                    .flat_map(|(lv, _)| (0..layout.per_vertex).map(move |j| lv * layout.per_vertex + j));
                let edge_offset = num_vertices * layout.per_vertex;
                let edge_locals = mesh
                    .cell_edges(cell)
                    .iter()
                    .enumerate()
                    .filter(|&(_, &e)| tag.contains_edge(e))
                    .flat_map(|(le, _)| (0..layout.per_edge).map(move |j| edge_offset + le * layout.per_edge + j));

                for scalar_local in vertex_locals.chain(edge_locals) {
                    for component in 0..components {
                        let local = components * scalar_local + component;
                        let dof = cell_dofs[cell * local_size + local];
                        // The first condition to claim a DOF takes precedence
                        constrained.entry(dof).or_insert_with(|| {
                            count += 1;
                            ConstrainedDof {
                                dof,
                                cell,
                                scalar_local,
                                component,
                                condition: condition_index,
                            }
                        });
                    }
                }
            }
            if count == 0 {
                warn!(
                    "Dirichlet condition on tag \"{}\" does not constrain any degrees of freedom",
                    dirichlet[condition_index].tag
                );
            }
        }

        debug!(
            "Built function space: {} DOFs ({} constrained) on {} cells",
            num_dofs,
            constrained.len(),
            mesh.num_cells()
        );

        Ok(FunctionSpace {
            mesh,
            element,
            components,
            num_dofs,
            cell_dofs,
            cell_signs,
            dirichlet,
            constrained: constrained.into_values().collect(),
            zero_mean,
        })
    }
}

/// A finite element space on a mesh.
///
/// Maps every (cell, local basis function) pair to a global DOF. Global DOFs are unique and
/// contiguous in `0..num_dofs()`. Vector-valued Lagrange spaces interleave their components, so
/// that component `c` of scalar DOF `k` is global DOF `components * k + c`, and local basis
/// function `components * a + c` is component `c` of scalar basis function `a`.
#[derive(Debug, Clone)]
pub struct FunctionSpace<T: Real> {
    mesh: Arc<Mesh<T>>,
    element: Arc<dyn ReferenceElement<T>>,
    components: usize,
    num_dofs: usize,
    cell_dofs: Vec<usize>,
    cell_signs: Vec<T>,
    dirichlet: Vec<DirichletCondition<T>>,
    constrained: Vec<ConstrainedDof>,
    zero_mean: bool,
}

impl<T: Real> FunctionSpace<T> {
    pub fn mesh(&self) -> &Arc<Mesh<T>> {
        &self.mesh
    }

    pub fn element(&self) -> &Arc<dyn ReferenceElement<T>> {
        &self.element
    }

    pub fn components(&self) -> usize {
        self.components
    }

    /// Number of components of the field values, accounting for vector-valued elements.
    pub fn value_components(&self) -> usize {
        self.components * self.element.value_components()
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    pub fn num_cells(&self) -> usize {
        self.mesh.num_cells()
    }

    /// Number of local basis functions per cell.
    pub fn local_size(&self) -> usize {
        self.components * self.element.num_basis()
    }

    pub fn cell_dofs(&self, cell: usize) -> &[usize] {
        let n = self.local_size();
        &self.cell_dofs[n * cell..n * (cell + 1)]
    }

    /// Edge orientation signs of the cell, in local edge order.
    pub fn cell_signs(&self, cell: usize) -> &[T] {
        let n = self.mesh.cell_kind().num_edges();
        &self.cell_signs[n * cell..n * (cell + 1)]
    }

    pub fn has_zero_mean(&self) -> bool {
        self.zero_mean
    }

    pub fn dirichlet_conditions(&self) -> &[DirichletCondition<T>] {
        &self.dirichlet
    }

    /// Sorted global indices of DOFs fixed by Dirichlet conditions.
    pub fn dirichlet_dofs(&self) -> impl Iterator<Item = usize> + '_ {
        self.constrained.iter().map(|c| c.dof)
    }

    pub fn num_dirichlet_dofs(&self) -> usize {
        self.constrained.len()
    }

    pub fn is_constrained(&self, dof: usize) -> bool {
        self.constrained
            .binary_search_by_key(&dof, |c| c.dof)
            .is_ok()
    }

    /// Values of the constrained DOFs at time `t`, computed with the element's DOF functionals.
    pub fn dirichlet_values(&self, t: T) -> Vec<(usize, T)> {
        self.constrained
            .iter()
            .map(|c| {
                let g = &self.dirichlet[c.condition].function;
                let geometry = self.mesh.cell_geometry(c.cell);
                let value = self.evaluate_dof(&geometry, c.cell, c.scalar_local, c.component, &|x| g(x, t));
                (c.dof, value)
            })
            .collect()
    }

    fn evaluate_dof(
        &self,
        geometry: &CellGeometry<T>,
        cell: usize,
        scalar_local: usize,
        component: usize,
        f: &dyn Fn(&Point2<T>) -> Vector2<T>,
    ) -> T {
        let signs = self.cell_signs(cell);
        if self.components == 1 {
            self.element.evaluate_dof(geometry, signs, scalar_local, f)
        } else {
            let component_function = |x: &Point2<T>| Vector2::new(f(x)[component], T::zero());
            self.element
                .evaluate_dof(geometry, signs, scalar_local, &component_function)
        }
    }

    /// Interpolates `f` into the space by applying every DOF functional.
    pub fn interpolate(&self, f: &dyn Fn(&Point2<T>) -> Vector2<T>) -> DVector<T> {
        let mut coefficients = DVector::zeros(self.num_dofs);
        for cell in 0..self.num_cells() {
            let geometry = self.mesh.cell_geometry(cell);
            for (local, &dof) in self.cell_dofs(cell).iter().enumerate() {
                let (scalar_local, component) = (local / self.components, local % self.components);
                coefficients[dof] = self.evaluate_dof(&geometry, cell, scalar_local, component, f);
            }
        }
        coefficients
    }

    /// Evaluates all local basis functions of the cell at the reference point `xi`.
    ///
    /// `scratch` holds the scalar basis of replicated elements between calls.
    pub fn populate_cell_basis(
        &self,
        cell: usize,
        geometry: &CellGeometry<T>,
        xi: &Point2<T>,
        scratch: &mut Vec<FieldPoint<T>>,
        basis: &mut [FieldPoint<T>],
    ) -> eyre::Result<()> {
        assert_eq!(basis.len(), self.local_size());
        let signs = self.cell_signs(cell);
        if self.components == 1 {
            return self.element.populate_basis(geometry, signs, xi, basis);
        }

        scratch.resize(self.element.num_basis(), FieldPoint::zero());
        self.element.populate_basis(geometry, signs, xi, scratch)?;
        for (a, scalar) in scratch.iter().enumerate() {
            for c in 0..self.components {
                basis[self.components * a + c] = scalar.into_component(c);
            }
        }
        Ok(())
    }
}

/// An ordered product of function spaces on the same mesh, such as velocity and pressure.
///
/// The global system numbers the DOFs of each field contiguously, in field order, followed by
/// one Lagrange multiplier for every field with a zero-mean constraint.
#[derive(Debug, Clone)]
pub struct MixedSpace<T: Real> {
    fields: Vec<FunctionSpace<T>>,
    offsets: Vec<usize>,
    local_offsets: Vec<usize>,
    multipliers: Vec<Option<usize>>,
    system_size: usize,
}

impl<T: Real> MixedSpace<T> {
    pub fn new(fields: Vec<FunctionSpace<T>>) -> Self {
        assert!(!fields.is_empty(), "A mixed space needs at least one field");
        let mesh = fields[0].mesh();
        assert!(
            fields.iter().all(|field| Arc::ptr_eq(field.mesh(), mesh)),
            "All fields of a mixed space must share the same mesh"
        );

        let mut offsets = Vec::with_capacity(fields.len() + 1);
        let mut local_offsets = Vec::with_capacity(fields.len() + 1);
        offsets.push(0);
        local_offsets.push(0);
        for field in &fields {
            offsets.push(offsets.last().unwrap() + field.num_dofs());
            local_offsets.push(local_offsets.last().unwrap() + field.local_size());
        }

        let mut system_size = *offsets.last().unwrap();
        let multipliers = fields
            .iter()
            .map(|field| {
                field.has_zero_mean().then(|| {
                    system_size += 1;
                    system_size - 1
                })
            })
            .collect();

        Self {
            fields,
            offsets,
            local_offsets,
            multipliers,
            system_size,
        }
    }

    pub fn single(field: FunctionSpace<T>) -> Self {
        Self::new(vec![field])
    }

    pub fn mesh(&self) -> &Arc<Mesh<T>> {
        self.fields[0].mesh()
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> &[FunctionSpace<T>] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> &FunctionSpace<T> {
        &self.fields[index]
    }

    pub fn num_cells(&self) -> usize {
        self.mesh().num_cells()
    }

    /// Global DOF range of the field, excluding multipliers.
    pub fn field_range(&self, index: usize) -> Range<usize> {
        self.offsets[index]..self.offsets[index + 1]
    }

    /// Global index of the zero-mean multiplier of the field, if it has one.
    pub fn multiplier(&self, index: usize) -> Option<usize> {
        self.multipliers[index]
    }

    /// Number of field DOFs, excluding multipliers.
    pub fn num_dofs(&self) -> usize {
        *self.offsets.last().unwrap()
    }

    /// Size of the assembled system: field DOFs and multipliers.
    pub fn system_size(&self) -> usize {
        self.system_size
    }

    /// Offsets of each field's block in a cell's local vector.
    pub fn local_offsets(&self) -> &[usize] {
        &self.local_offsets
    }

    pub fn local_size(&self) -> usize {
        *self.local_offsets.last().unwrap()
    }

    pub fn populate_cell_dofs(&self, cell: usize, dofs: &mut Vec<usize>) {
        dofs.clear();
        for (field, offset) in self.fields.iter().zip(&self.offsets) {
            dofs.extend(field.cell_dofs(cell).iter().map(|dof| dof + offset));
        }
    }

    /// Global indices and values of all Dirichlet DOFs at time `t`.
    pub fn dirichlet_values(&self, t: T) -> Vec<(usize, T)> {
        self.fields
            .iter()
            .zip(&self.offsets)
            .flat_map(|(field, offset)| {
                field
                    .dirichlet_values(t)
                    .into_iter()
                    .map(move |(dof, value)| (dof + offset, value))
            })
            .collect()
    }

    /// Membership mask of Dirichlet DOFs over the whole system.
    pub fn dirichlet_mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.system_size];
        for (field, offset) in self.fields.iter().zip(&self.offsets) {
            for dof in field.dirichlet_dofs() {
                mask[dof + offset] = true;
            }
        }
        mask
    }

    /// Interpolates one function per field into a global coefficient vector.
    ///
    /// Multipliers are set to zero.
    pub fn interpolate(&self, functions: &[&dyn Fn(&Point2<T>) -> Vector2<T>]) -> DVector<T> {
        assert_eq!(functions.len(), self.num_fields(), "Need one function per field");
        let mut coefficients = DVector::zeros(self.system_size);
        for (index, (field, f)) in self.fields.iter().zip(functions).enumerate() {
            coefficients
                .rows_range_mut(self.field_range(index))
                .copy_from(&field.interpolate(*f));
        }
        coefficients
    }
}
