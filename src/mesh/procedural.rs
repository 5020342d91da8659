//! Structured meshes of rectangular domains.
//!
//! All meshes produced here carry the tags `bottom`, `right`, `top`, `left` (the sides of the
//! rectangle) in addition to the `boundary` tag.
use crate::connectivity::{Quad4d2Connectivity, Tri3d2Connectivity};
use crate::mesh::{Mesh, MeshBuilder};
use crate::Real;
use nalgebra::{Point2, Vector2};
use numeric_literals::replace_float_literals;

pub fn create_unit_square_uniform_quad_mesh_2d<T>(cells_per_dim: usize) -> Mesh<T>
where
    T: Real,
{
    create_rectangular_uniform_quad_mesh_2d(T::one(), 1, 1, cells_per_dim, &Vector2::new(T::zero(), T::one()))
}

/// Unit square mesh where every square cell is split into two triangles.
pub fn create_unit_square_uniform_tri_mesh_2d<T>(cells_per_dim: usize) -> Mesh<T>
where
    T: Real,
{
    create_rectangular_uniform_tri_mesh_2d(T::one(), 1, 1, cells_per_dim, &Vector2::new(T::zero(), T::one()))
}

/// Generates an axis-aligned rectangular uniform mesh given a unit length,
/// dimensions as multipliers of the unit length and the number of cells per unit length.
pub fn create_rectangular_uniform_quad_mesh_2d<T>(
    unit_length: T,
    units_x: usize,
    units_y: usize,
    cells_per_unit: usize,
    top_left: &Vector2<T>,
) -> Mesh<T>
where
    T: Real,
{
    let (vertices, cells) = rectangular_grid(unit_length, units_x, units_y, cells_per_unit, top_left);
    let builder = MeshBuilder::from_vertices_and_connectivity(vertices, cells);
    tag_rectangle_sides(builder, unit_length, units_x, units_y, cells_per_unit, top_left)
}

pub fn create_rectangular_uniform_tri_mesh_2d<T>(
    unit_length: T,
    units_x: usize,
    units_y: usize,
    cells_per_unit: usize,
    top_left: &Vector2<T>,
) -> Mesh<T>
where
    T: Real,
{
    let (vertices, quads) = rectangular_grid(unit_length, units_x, units_y, cells_per_unit, top_left);
    let triangles: Vec<Tri3d2Connectivity> = quads
        .iter()
        .flat_map(Quad4d2Connectivity::split_into_triangles)
        .collect();
    let builder = MeshBuilder::from_vertices_and_connectivity(vertices, triangles);
    tag_rectangle_sides(builder, unit_length, units_x, units_y, cells_per_unit, top_left)
}

fn rectangular_grid<T: Real>(
    unit_length: T,
    units_x: usize,
    units_y: usize,
    cells_per_unit: usize,
    top_left: &Vector2<T>,
) -> (Vec<Point2<T>>, Vec<Quad4d2Connectivity>) {
    let mut vertices = Vec::new();
    let mut cells = Vec::new();
    if cells_per_unit == 0 || units_x == 0 || units_y == 0 {
        return (vertices, cells);
    }

    let cell_size = unit_length / T::from_usize(cells_per_unit).expect("Must be able to fit usize in T");
    let num_cells_x = units_x * cells_per_unit;
    let num_cells_y = units_y * cells_per_unit;

    let to_global_vertex_index = |i, j| (num_cells_x + 1) * j + i;

    for j in 0..=num_cells_y {
        for i in 0..=num_cells_x {
            let i_as_t = T::from_usize(i).expect("Must be able to fit usize in T");
            let j_as_t = T::from_usize(j).expect("Must be able to fit usize in T");
            let v = top_left + Vector2::new(i_as_t, -j_as_t) * cell_size;
            vertices.push(Point2::from(v));
        }
    }

    for j in 0..num_cells_y {
        for i in 0..num_cells_x {
            let quad = Quad4d2Connectivity([
                to_global_vertex_index(i, j + 1),
                to_global_vertex_index(i + 1, j + 1),
                to_global_vertex_index(i + 1, j),
                to_global_vertex_index(i, j),
            ]);
            cells.push(quad);
        }
    }

    (vertices, cells)
}

#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
fn tag_rectangle_sides<T: Real>(
    builder: MeshBuilder<T>,
    unit_length: T,
    units_x: usize,
    units_y: usize,
    cells_per_unit: usize,
    top_left: &Vector2<T>,
) -> Mesh<T> {
    let width = unit_length * T::from_usize(units_x).expect("Must be able to fit usize in T");
    let height = unit_length * T::from_usize(units_y).expect("Must be able to fit usize in T");
    // Midpoints of boundary edges lie exactly on a side, but use a tolerance well below the
    // cell size to be robust against rounding
    let tol = 0.25 * unit_length / T::from_usize(cells_per_unit.max(1)).expect("Must be able to fit usize in T");
    let (x_min, y_max) = (top_left.x, top_left.y);
    let (x_max, y_min) = (x_min + width, y_max - height);

    builder
        .tag_boundary_where("bottom", move |p| (p.y - y_min).abs() < tol)
        .tag_boundary_where("right", move |p| (p.x - x_max).abs() < tol)
        .tag_boundary_where("top", move |p| (p.y - y_max).abs() < tol)
        .tag_boundary_where("left", move |p| (p.x - x_min).abs() < tol)
        .build()
        .expect("Structured meshes are always valid")
}
