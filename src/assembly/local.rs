//! Element-level assembly of weak forms.
use crate::assembly::buffers::{populate_element_dofs, CellBuffer};
use crate::connectivity::CellKind;
use crate::form::{linearize_boundary_by_ad, FieldPoint, PointContext, TestCoefficients, WeakForm};
use crate::mesh::Tag;
use crate::nalgebra::{DVector, Scalar};
use crate::quadrature::{segment_for_degree, QuadraturePair1d, QuadratureError, QuadratureRule};
use crate::space::MixedSpace;
use crate::Real;
use galerkin_traits::real;

/// Provides the DOFs associated with each element of an assembly.
pub trait ElementConnectivityAssembler {
    fn num_elements(&self) -> usize;

    /// Dimension of the assembled vectors and matrices.
    fn system_size(&self) -> usize;

    fn populate_element_dofs(&self, element: usize, dofs: &mut Vec<usize>);
}

/// Computes element matrices into a [`CellBuffer`].
pub trait ElementMatrixAssembler<T: Real>: ElementConnectivityAssembler + Sync {
    /// On success, `buffer.dofs()` and `buffer.element_matrix()` hold the element contribution.
    fn assemble_element_matrix(&self, element: usize, buffer: &mut CellBuffer<T>) -> eyre::Result<()>;
}

/// Computes element vectors into a [`CellBuffer`].
pub trait ElementVectorAssembler<T: Real>: ElementConnectivityAssembler + Sync {
    /// On success, `buffer.dofs()` and `buffer.element_vector()` hold the element contribution.
    fn assemble_element_vector(&self, element: usize, buffer: &mut CellBuffer<T>) -> eyre::Result<()>;
}

/// Quadrature rules for the cells and edges of a mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureTable<T: Scalar> {
    degree: usize,
    cell: QuadratureRule<T>,
    edge: QuadraturePair1d<T>,
}

impl<T: Real> QuadratureTable<T> {
    pub fn new(kind: CellKind, degree: usize) -> Result<Self, QuadratureError> {
        Ok(Self {
            degree,
            cell: QuadratureRule::for_cell(kind, degree)?,
            edge: segment_for_degree(degree)?,
        })
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn cell_rule(&self) -> &QuadratureRule<T> {
        &self.cell
    }

    pub fn edge_rule(&self) -> &QuadraturePair1d<T> {
        &self.edge
    }
}

/// Evaluates element residuals and Jacobians of a weak form at a given state.
///
/// Zero-mean fields contribute the multiplier terms `lambda * int v` to their residual and
/// `int u` to the multiplier row.
#[derive(Debug)]
pub struct ElementFormAssembler<'a, T: Real, F> {
    pub space: &'a MixedSpace<T>,
    pub form: &'a F,
    pub quadrature: &'a QuadratureTable<T>,
    /// Boundary parts carrying natural terms of the form.
    pub boundary: &'a [(String, Tag)],
    pub u: &'a DVector<T>,
    pub aux: &'a [DVector<T>],
    pub time: T,
}

impl<'a, T: Real, F: WeakForm<T>> ElementFormAssembler<'a, T, F> {
    fn local_range(&self, field: usize) -> std::ops::Range<usize> {
        let offsets = self.space.local_offsets();
        offsets[field]..offsets[field + 1]
    }

    /// Local indices of the multipliers in the element DOF list, per field.
    fn local_multipliers(&self) -> Vec<Option<usize>> {
        let mut next = self.space.local_size();
        (0..self.space.num_fields())
            .map(|field| {
                self.space.multiplier(field).map(|_| {
                    next += 1;
                    next - 1
                })
            })
            .collect()
    }

    fn assemble_cell(&self, cell: usize, buffer: &mut CellBuffer<T>, matrix: bool) -> eyre::Result<()> {
        let space = self.space;
        let num_fields = space.num_fields();
        buffer.prepare_cell(space, cell, self.u, self.aux);

        let geometry = space.mesh().cell_geometry(cell);
        let rule = self.quadrature.cell_rule();
        for (&w, xi) in rule.weights().iter().zip(rule.points()) {
            buffer.populate_point(space, cell, &geometry, xi)?;
            let (_, _, det) = geometry.inverse_jacobian(xi)?;
            let weight = w * det;
            let ctx = PointContext {
                x: geometry.map_reference_coords(xi),
                time: self.time,
                cell,
                aux: &buffer.aux_points,
            };

            if matrix {
                for g in 0..num_fields {
                    for j in self.local_range(g) {
                        buffer.du_points.fill(FieldPoint::zero());
                        buffer.du_points[g] = buffer.basis[j];
                        buffer.coefficients.fill(TestCoefficients::zero());
                        self.form
                            .linearized(&ctx, &buffer.u_points, &buffer.du_points, &mut buffer.coefficients);
                        for (f, coefficients) in buffer.coefficients.iter().enumerate() {
                            for i in self.local_range(f) {
                                buffer.element_matrix[(i, j)] += weight * coefficients.contract(&buffer.basis[i]);
                            }
                        }
                    }
                }
            } else {
                buffer.coefficients.fill(TestCoefficients::zero());
                self.form
                    .residual(&ctx, &buffer.u_points, &mut buffer.coefficients);
                for (f, coefficients) in buffer.coefficients.iter().enumerate() {
                    for i in self.local_range(f) {
                        buffer.element_vector[i] += weight * coefficients.contract(&buffer.basis[i]);
                    }
                }
            }

            for field in (0..num_fields).filter(|&field| space.multiplier(field).is_some()) {
                for i in self.local_range(field) {
                    buffer.means[i] += weight * buffer.basis[i].scalar();
                }
            }
        }

        if !self.boundary.is_empty() {
            self.assemble_boundary_edges(cell, buffer, matrix)?;
        }
        self.add_multiplier_terms(buffer, matrix);
        Ok(())
    }

    fn assemble_boundary_edges(&self, cell: usize, buffer: &mut CellBuffer<T>, matrix: bool) -> eyre::Result<()> {
        let space = self.space;
        let mesh = space.mesh();
        let geometry = mesh.cell_geometry(cell);
        let (weights, points) = self.quadrature.edge_rule();

        for (local_edge, &edge) in mesh.cell_edges(cell).iter().enumerate() {
            if mesh.edge_cells(edge).1.is_some() {
                continue;
            }
            let half_length = geometry.edge_length(local_edge) * real(0.5);
            let normal = geometry.outward_normal(local_edge);

            for (name, _) in self.boundary.iter().filter(|(_, tag)| tag.contains_edge(edge)) {
                for (&w, &s) in weights.iter().zip(points) {
                    let xi = geometry.reference_edge_point(local_edge, s);
                    buffer.populate_point(space, cell, &geometry, &xi)?;
                    let weight = w * half_length;
                    let ctx = PointContext {
                        x: geometry.map_reference_coords(&xi),
                        time: self.time,
                        cell,
                        aux: &buffer.aux_points,
                    };

                    if matrix {
                        for g in 0..space.num_fields() {
                            for j in self.local_range(g) {
                                buffer.du_points.fill(FieldPoint::zero());
                                buffer.du_points[g] = buffer.basis[j];
                                buffer.coefficients.fill(TestCoefficients::zero());
                                linearize_boundary_by_ad(
                                    self.form,
                                    name,
                                    &ctx,
                                    &normal,
                                    &buffer.u_points,
                                    &buffer.du_points,
                                    &mut buffer.coefficients,
                                );
                                for (f, coefficients) in buffer.coefficients.iter().enumerate() {
                                    for i in self.local_range(f) {
                                        buffer.element_matrix[(i, j)] +=
                                            weight * coefficients.f0.dot(&buffer.basis[i].value);
                                    }
                                }
                            }
                        }
                    } else {
                        buffer.coefficients.fill(TestCoefficients::zero());
                        self.form.boundary_residual(
                            name,
                            &ctx,
                            &normal,
                            &buffer.u_points,
                            &mut buffer.coefficients,
                        );
                        for (f, coefficients) in buffer.coefficients.iter().enumerate() {
                            for i in self.local_range(f) {
                                buffer.element_vector[i] += weight * coefficients.f0.dot(&buffer.basis[i].value);
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn add_multiplier_terms(&self, buffer: &mut CellBuffer<T>, matrix: bool) {
        let multipliers = self.local_multipliers();
        for (field, lambda) in multipliers.into_iter().enumerate().filter_map(|(f, m)| Some((f, m?))) {
            for i in self.local_range(field) {
                let m = buffer.means[i];
                if matrix {
                    buffer.element_matrix[(i, lambda)] += m;
                    buffer.element_matrix[(lambda, i)] += m;
                } else {
                    buffer.element_vector[i] += buffer.u_local[lambda] * m;
                    buffer.element_vector[lambda] += m * buffer.u_local[i];
                }
            }
        }
    }
}

impl<'a, T: Real, F: WeakForm<T>> ElementConnectivityAssembler for ElementFormAssembler<'a, T, F> {
    fn num_elements(&self) -> usize {
        self.space.num_cells()
    }

    fn system_size(&self) -> usize {
        self.space.system_size()
    }

    fn populate_element_dofs(&self, element: usize, dofs: &mut Vec<usize>) {
        populate_element_dofs(self.space, element, dofs);
    }
}

impl<'a, T: Real, F: WeakForm<T>> ElementMatrixAssembler<T> for ElementFormAssembler<'a, T, F> {
    fn assemble_element_matrix(&self, element: usize, buffer: &mut CellBuffer<T>) -> eyre::Result<()> {
        self.assemble_cell(element, buffer, true)
    }
}

impl<'a, T: Real, F: WeakForm<T>> ElementVectorAssembler<T> for ElementFormAssembler<'a, T, F> {
    fn assemble_element_vector(&self, element: usize, buffer: &mut CellBuffer<T>) -> eyre::Result<()> {
        self.assemble_cell(element, buffer, false)
    }
}
