use crate::mesh::procedural::{create_rectangular_uniform_quad_mesh_2d, create_rectangular_uniform_tri_mesh_2d};
use crate::mesh::Mesh;
use ::proptest::prelude::*;
use nalgebra::Vector2;
use std::cmp::max;

/// A uniformly random permutation of `0..n`.
pub fn permutation(n: usize) -> impl Strategy<Value = Vec<usize>> {
    Just((0..n).collect::<Vec<_>>()).prop_shuffle()
}

// Returns a strategy in which each value is a triplet (cells_per_unit, units_x, units_y)
// such that cells_per_unit^2 * units_x * units_y <= max_cells and the mesh is non-empty
fn rectangular_uniform_mesh_cell_distribution_strategy(
    max_cells: usize,
) -> impl Strategy<Value = (usize, usize, usize)> {
    let max_cells = max(1, max_cells);
    let max_cells_per_unit = f64::floor(f64::sqrt(max_cells as f64)) as usize;
    (1..=max(1, max_cells_per_unit))
        .prop_flat_map(move |cells_per_unit| (Just(cells_per_unit), 1..=max_cells / (cells_per_unit * cells_per_unit)))
        .prop_flat_map(move |(cells_per_unit, units_x)| {
            let units_y_strategy = 1..=max(1, max_cells / (cells_per_unit * cells_per_unit * units_x));
            (Just(cells_per_unit), Just(units_x), units_y_strategy)
        })
}

/// Quadrilateral meshes with at most `max_cells` cells.
pub fn rectangular_uniform_quad_mesh_strategy(unit_length: f64, max_cells: usize) -> impl Strategy<Value = Mesh<f64>> {
    rectangular_uniform_mesh_cell_distribution_strategy(max_cells).prop_map(
        move |(cells_per_unit, units_x, units_y)| {
            create_rectangular_uniform_quad_mesh_2d(
                unit_length,
                units_x,
                units_y,
                cells_per_unit,
                &Vector2::new(0.0, 0.0),
            )
        },
    )
}

/// Triangle meshes with at most `2 * max_cells` cells.
pub fn rectangular_uniform_tri_mesh_strategy(unit_length: f64, max_cells: usize) -> impl Strategy<Value = Mesh<f64>> {
    rectangular_uniform_mesh_cell_distribution_strategy(max_cells).prop_map(
        move |(cells_per_unit, units_x, units_y)| {
            create_rectangular_uniform_tri_mesh_2d(
                unit_length,
                units_x,
                units_y,
                cells_per_unit,
                &Vector2::new(0.0, 0.0),
            )
        },
    )
}
