use crate::connectivity::{CellKind, Connectivity};
use crate::element::CellGeometry;
use crate::Real;
use log::debug;
use nalgebra::{Point2, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

pub mod procedural;

/// Name of the tag that every mesh carries, containing all boundary edges.
pub const BOUNDARY_TAG: &str = "boundary";

/// A named set of mesh entities.
///
/// The vertex set always contains the end points of the tagged edges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    edges: Vec<usize>,
    vertices: Vec<usize>,
}

impl Tag {
    fn from_sets(edges: BTreeSet<usize>, vertices: BTreeSet<usize>) -> Self {
        Self {
            edges: edges.into_iter().collect(),
            vertices: vertices.into_iter().collect(),
        }
    }

    /// Sorted indices of the tagged edges.
    pub fn edges(&self) -> &[usize] {
        &self.edges
    }

    /// Sorted indices of the tagged vertices.
    pub fn vertices(&self) -> &[usize] {
        &self.vertices
    }

    pub fn contains_edge(&self, edge: usize) -> bool {
        self.edges.binary_search(&edge).is_ok()
    }

    pub fn contains_vertex(&self, vertex: usize) -> bool {
        self.vertices.binary_search(&vertex).is_ok()
    }
}

/// Immutable labeling of mesh entities, fixed when the mesh is constructed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet {
    tags: BTreeMap<String, Tag>,
}

impl TagSet {
    pub fn get(&self, name: &str) -> Result<&Tag, InvalidTagError> {
        self.tags
            .get(name)
            .ok_or_else(|| InvalidTagError::new(name, self.names()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tags.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tag)> {
        self.tags.iter().map(|(name, tag)| (name.as_str(), tag))
    }
}

/// A tag was referenced that the mesh labeling does not contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTagError {
    pub tag: String,
    pub available: Vec<String>,
}

impl InvalidTagError {
    pub fn new(tag: impl Into<String>, available: Vec<String>) -> Self {
        Self {
            tag: tag.into(),
            available,
        }
    }
}

impl Display for InvalidTagError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tag \"{}\" does not exist in the mesh. Available tags: [{}]",
            self.tag,
            self.available.join(", ")
        )
    }
}

impl Error for InvalidTagError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshError {
    InvalidVertexIndex { cell: usize, vertex: usize },
    DegenerateCell { cell: usize },
    /// An edge is shared by more than two cells.
    NonManifoldEdge { vertices: [usize; 2] },
    UnknownEdge { vertices: [usize; 2] },
    InvalidTaggedVertex { tag: String, vertex: usize },
    InvalidTag(InvalidTagError),
}

impl Display for MeshError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidVertexIndex { cell, vertex } => {
                write!(f, "Cell {} references vertex {}, which is out of bounds", cell, vertex)
            }
            Self::DegenerateCell { cell } => write!(f, "Cell {} has zero area", cell),
            Self::NonManifoldEdge { vertices } => write!(
                f,
                "Edge ({}, {}) is shared by more than two cells",
                vertices[0], vertices[1]
            ),
            Self::UnknownEdge { vertices } => write!(f, "({}, {}) is not an edge of the mesh", vertices[0], vertices[1]),
            Self::InvalidTaggedVertex { tag, vertex } => {
                write!(f, "Tag \"{}\" references vertex {}, which is out of bounds", tag, vertex)
            }
            Self::InvalidTag(err) => write!(f, "{}", err),
        }
    }
}

impl Error for MeshError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidTag(err) => Some(err),
            _ => None,
        }
    }
}

impl From<InvalidTagError> for MeshError {
    fn from(err: InvalidTagError) -> Self {
        Self::InvalidTag(err)
    }
}

/// Conforming two-dimensional mesh with a single cell kind and derived edge topology.
///
/// Cells are stored with counter-clockwise vertex order. Meshes are immutable: new tags are added
/// by constructing a new mesh through [`Mesh::with_tags`].
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh<T: Scalar> {
    vertices: Vec<Point2<T>>,
    kind: CellKind,
    cells: Vec<usize>,
    edges: Vec<[usize; 2]>,
    cell_edges: Vec<usize>,
    edge_cells: Vec<(usize, Option<usize>)>,
    boundary_edges: Vec<usize>,
    tags: TagSet,
}

impl<T: Real> Mesh<T> {
    /// Construct a mesh from vertices and cell connectivity.
    ///
    /// Cells given in clockwise order are reoriented. The mesh carries the [`BOUNDARY_TAG`] tag.
    pub fn from_vertices_and_connectivity<C: Connectivity>(
        vertices: Vec<Point2<T>>,
        connectivity: Vec<C>,
    ) -> Result<Self, MeshError> {
        MeshBuilder::from_vertices_and_connectivity(vertices, connectivity).build()
    }

    /// Starts a builder for a new mesh with the same geometry and tags as this mesh.
    pub fn with_tags(&self) -> MeshBuilder<T> {
        MeshBuilder {
            vertices: self.vertices.clone(),
            kind: self.kind,
            cells: self.cells.clone(),
            base_tags: self.tags.clone(),
            rules: Vec::new(),
        }
    }

    pub fn vertices(&self) -> &[Point2<T>] {
        &self.vertices
    }

    pub fn cell_kind(&self) -> CellKind {
        self.kind
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len() / self.kind.num_vertices()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn cell_vertices(&self, cell: usize) -> &[usize] {
        let n = self.kind.num_vertices();
        &self.cells[n * cell..n * (cell + 1)]
    }

    /// Global edge indices of the cell, in local edge order.
    pub fn cell_edges(&self, cell: usize) -> &[usize] {
        let n = self.kind.num_edges();
        &self.cell_edges[n * cell..n * (cell + 1)]
    }

    /// Global vertex indices of every edge, with the lower index first.
    pub fn edges(&self) -> &[[usize; 2]] {
        &self.edges
    }

    /// The (one or two) cells adjacent to the edge.
    pub fn edge_cells(&self, edge: usize) -> (usize, Option<usize>) {
        self.edge_cells[edge]
    }

    pub fn boundary_edges(&self) -> &[usize] {
        &self.boundary_edges
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn tag(&self, name: &str) -> Result<&Tag, InvalidTagError> {
        self.tags.get(name)
    }

    /// Orientation of a local edge relative to its global orientation.
    ///
    /// Returns `1` if the counter-clockwise local edge runs from the lower to the higher global
    /// vertex index, `-1` otherwise.
    pub fn cell_edge_sign(&self, cell: usize, local_edge: usize) -> T {
        let [a, b] = self.kind.edge_vertices(local_edge);
        let vertices = self.cell_vertices(cell);
        if vertices[a] < vertices[b] {
            T::one()
        } else {
            -T::one()
        }
    }

    pub fn cell_geometry(&self, cell: usize) -> CellGeometry<T> {
        let v = self.cell_vertices(cell);
        let p = |i: usize| self.vertices[v[i]];
        match self.kind {
            CellKind::Triangle => CellGeometry::Triangle([p(0), p(1), p(2)]),
            CellKind::Quadrilateral => CellGeometry::Quadrilateral([p(0), p(1), p(2), p(3)]),
        }
    }

    /// Midpoint of the given edge.
    pub fn edge_midpoint(&self, edge: usize) -> Point2<T> {
        let [a, b] = self.edges[edge];
        nalgebra::center(&self.vertices[a], &self.vertices[b])
    }
}

enum TagRule<T: Scalar> {
    BoundaryWhere(Box<dyn Fn(&Point2<T>) -> bool>),
    Edges(Vec<[usize; 2]>),
    Vertices(Vec<usize>),
    Union(Vec<String>),
}

/// Builds a [`Mesh`] together with its tag set.
///
/// Tags are resolved in the order they are declared once the edge topology is known, so that
/// a union may refer to tags declared before it.
pub struct MeshBuilder<T: Scalar> {
    vertices: Vec<Point2<T>>,
    kind: CellKind,
    cells: Vec<usize>,
    base_tags: TagSet,
    rules: Vec<(String, TagRule<T>)>,
}

impl<T: Real> MeshBuilder<T> {
    pub fn from_vertices_and_connectivity<C: Connectivity>(vertices: Vec<Point2<T>>, connectivity: Vec<C>) -> Self {
        let cells = connectivity
            .iter()
            .flat_map(|c| c.vertex_indices().iter().copied())
            .collect();
        Self {
            vertices,
            kind: C::KIND,
            cells,
            base_tags: TagSet::default(),
            rules: Vec::new(),
        }
    }

    /// Tags the boundary edges whose midpoint satisfies the predicate.
    pub fn tag_boundary_where(mut self, name: impl Into<String>, predicate: impl Fn(&Point2<T>) -> bool + 'static) -> Self {
        self.rules
            .push((name.into(), TagRule::BoundaryWhere(Box::new(predicate))));
        self
    }

    /// Tags the edges given by their end points. Each pair must be an edge of the mesh.
    pub fn tag_edges(mut self, name: impl Into<String>, edges: Vec<[usize; 2]>) -> Self {
        self.rules.push((name.into(), TagRule::Edges(edges)));
        self
    }

    pub fn tag_vertices(mut self, name: impl Into<String>, vertices: Vec<usize>) -> Self {
        self.rules.push((name.into(), TagRule::Vertices(vertices)));
        self
    }

    /// Tags the union of previously declared or inherited tags.
    pub fn tag_union<S: AsRef<str>>(mut self, name: impl Into<String>, tags: &[S]) -> Self {
        let tags = tags.iter().map(|s| s.as_ref().to_string()).collect();
        self.rules.push((name.into(), TagRule::Union(tags)));
        self
    }

    pub fn build(self) -> Result<Mesh<T>, MeshError> {
        let MeshBuilder {
            vertices,
            kind,
            mut cells,
            base_tags,
            rules,
        } = self;

        let n = kind.num_vertices();
        for (cell_index, cell) in cells.chunks_exact_mut(n).enumerate() {
            if let Some(&vertex) = cell.iter().find(|&&v| v >= vertices.len()) {
                return Err(MeshError::InvalidVertexIndex { cell: cell_index, vertex });
            }
            let area = signed_area(cell.iter().map(|&v| &vertices[v]));
            if area == T::zero() {
                return Err(MeshError::DegenerateCell { cell: cell_index });
            } else if area < T::zero() {
                // Reverse all but the first vertex to obtain counter-clockwise order
                cell[1..].reverse();
            }
        }

        let mut edge_map = BTreeMap::new();
        let mut edges = Vec::new();
        let mut edge_cells: Vec<(usize, Option<usize>)> = Vec::new();
        let mut cell_edges = Vec::with_capacity(cells.len());
        for (cell_index, cell) in cells.chunks_exact(n).enumerate() {
            for local_edge in 0..kind.num_edges() {
                let [a, b] = kind.edge_vertices(local_edge);
                let key = [cell[a].min(cell[b]), cell[a].max(cell[b])];
                let edge_index = *edge_map.entry(key).or_insert_with(|| {
                    edges.push(key);
                    edge_cells.push((cell_index, None));
                    edges.len() - 1
                });
                let adjacency = &mut edge_cells[edge_index];
                if adjacency.0 != cell_index {
                    if adjacency.1.is_some() {
                        return Err(MeshError::NonManifoldEdge { vertices: key });
                    }
                    adjacency.1 = Some(cell_index);
                }
                cell_edges.push(edge_index);
            }
        }

        let boundary_edges: Vec<usize> = edge_cells
            .iter()
            .enumerate()
            .filter(|(_, (_, other))| other.is_none())
            .map(|(edge, _)| edge)
            .collect();

        let mut tags = base_tags.tags;
        let edge_tag = |edge_set: BTreeSet<usize>, mut vertex_set: BTreeSet<usize>| {
            for &e in &edge_set {
                vertex_set.extend(edges[e]);
            }
            Tag::from_sets(edge_set, vertex_set)
        };

        tags.insert(
            BOUNDARY_TAG.to_string(),
            edge_tag(boundary_edges.iter().copied().collect(), BTreeSet::new()),
        );

        for (name, rule) in rules {
            let tag = match rule {
                TagRule::BoundaryWhere(predicate) => {
                    let selected = boundary_edges
                        .iter()
                        .copied()
                        .filter(|&e| {
                            let [a, b] = edges[e];
                            predicate(&nalgebra::center(&vertices[a], &vertices[b]))
                        })
                        .collect();
                    edge_tag(selected, BTreeSet::new())
                }
                TagRule::Edges(pairs) => {
                    let mut selected = BTreeSet::new();
                    for [a, b] in pairs {
                        let key = [a.min(b), a.max(b)];
                        let edge = edge_map
                            .get(&key)
                            .ok_or(MeshError::UnknownEdge { vertices: key })?;
                        selected.insert(*edge);
                    }
                    edge_tag(selected, BTreeSet::new())
                }
                TagRule::Vertices(vertex_list) => {
                    if let Some(&vertex) = vertex_list.iter().find(|&&v| v >= vertices.len()) {
                        return Err(MeshError::InvalidTaggedVertex { tag: name, vertex });
                    }
                    edge_tag(BTreeSet::new(), vertex_list.into_iter().collect())
                }
                TagRule::Union(names) => {
                    let mut edge_set = BTreeSet::new();
                    let mut vertex_set = BTreeSet::new();
                    for other in &names {
                        let tag = tags
                            .get(other)
                            .ok_or_else(|| InvalidTagError::new(other.as_str(), tags.keys().cloned().collect()))?;
                        edge_set.extend(tag.edges.iter().copied());
                        vertex_set.extend(tag.vertices.iter().copied());
                    }
                    edge_tag(edge_set, vertex_set)
                }
            };
            debug!(
                "Tag \"{}\": {} edges, {} vertices",
                name,
                tag.edges.len(),
                tag.vertices.len()
            );
            tags.insert(name, tag);
        }

        Ok(Mesh {
            vertices,
            kind,
            cells,
            edges,
            cell_edges,
            edge_cells,
            boundary_edges,
            tags: TagSet { tags },
        })
    }
}

/// Signed area of a simple polygon, positive for counter-clockwise vertex order.
pub fn signed_area<'a, T: Real>(polygon: impl IntoIterator<Item = &'a Point2<T>>) -> T {
    let points: Vec<_> = polygon.into_iter().collect();
    let n = points.len();
    let mut twice_area = T::zero();
    for i in 0..n {
        let p = points[i];
        let q = points[(i + 1) % n];
        twice_area += p.x * q.y - q.x * p.y;
    }
    twice_area / (T::one() + T::one())
}
