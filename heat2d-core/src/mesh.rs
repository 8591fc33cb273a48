//! Mesh data structure with hierarchical refinement.
//!
//! Stores vertex coordinates, element connectivity with region markers and
//! boundary edges with boundary markers. Elements are refined into four sons;
//! refined elements stay in the mesh as inactive parents so element ids are
//! stable and the refinement history can be replayed.
//!
//! Hanging vertices of any level are allowed: a vertex created on an edge
//! that still belongs to an active (coarser) element is constrained by that
//! element's edge. The space resolves those constraints.

use crate::element::RefMap;
use crate::error::{Error, Result};
use crate::types::{ElementKind, Point2};
use std::collections::HashMap;

pub mod xml;

pub use xml::MeshReaderXml;

/// Undirected edge identified by its two vertex indices, smaller first.
pub type EdgeKey = (usize, usize);

/// Build the key of the edge between two vertices.
pub fn edge_key(a: usize, b: usize) -> EdgeKey {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// A mesh element.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Element id (index into the mesh's element storage).
    pub id: usize,
    /// Triangle or quadrilateral.
    pub kind: ElementKind,
    /// Vertex indices, counter-clockwise.
    pub vertices: Vec<usize>,
    /// Region marker index.
    pub marker: usize,
    /// Element this one was created from by refinement.
    pub parent: Option<usize>,
    /// Sons, once refined.
    pub sons: Option<[usize; 4]>,
    /// Whether the element is a leaf taking part in computation.
    pub active: bool,
    /// Refinement depth below the base mesh.
    pub level: usize,
}

impl Element {
    /// Vertex pairs of the local edges, edge `i` running from vertex `i` to `i + 1`.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }
}

/// Interned marker names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Markers {
    names: Vec<String>,
}

impl Markers {
    /// Index of `name`, inserting it if new.
    pub fn intern(&mut self, name: &str) -> usize {
        match self.find(name) {
            Some(idx) => idx,
            None => {
                self.names.push(name.to_string());
                self.names.len() - 1
            }
        }
    }

    /// Index of an existing marker.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Name of a marker index.
    pub fn name(&self, idx: usize) -> Option<&str> {
        self.names.get(idx).map(String::as_str)
    }

    /// All names in interning order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Finite element mesh.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    /// Vertex coordinates.
    vertices: Vec<Point2>,
    /// All elements ever created, active or not.
    elements: Vec<Element>,
    /// Region names.
    regions: Markers,
    /// Boundary marker names.
    boundary_markers: Markers,
    /// Marked edges, including the halves of split marked edges.
    boundary: HashMap<EdgeKey, usize>,
    /// Vertex created at the midpoint of a split edge.
    midpoints: HashMap<EdgeKey, usize>,
    /// Edge a half edge was split from.
    edge_parents: HashMap<EdgeKey, EdgeKey>,
    /// Split edge a midpoint vertex belongs to.
    midpoint_edges: HashMap<usize, EdgeKey>,
    /// Active elements per edge.
    edge_elements: HashMap<EdgeKey, Vec<usize>>,
    /// Vertices and elements loaded before any refinement.
    n_base_vertices: usize,
    n_base_elements: usize,
    /// Ids of refined elements, in refinement order.
    refinements: Vec<usize>,
}

impl Mesh {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex to the mesh, returning its index.
    ///
    /// Vertices belong to the base mesh until the first refinement.
    pub fn add_vertex(&mut self, point: Point2) -> usize {
        let idx = self.vertices.len();
        self.vertices.push(point);
        if self.refinements.is_empty() {
            self.n_base_vertices = self.vertices.len();
        }
        idx
    }

    /// Add a base element with the given region marker.
    ///
    /// Vertices must be listed counter-clockwise and form a non-degenerate shape.
    pub fn add_element(&mut self, kind: ElementKind, vertices: Vec<usize>, region: &str) -> Result<usize> {
        if !self.refinements.is_empty() {
            return Err(Error::Mesh("elements cannot be added after refinement".into()));
        }

        // Validate vertex count
        if vertices.len() != kind.n_vertices() {
            return Err(Error::Mesh(format!(
                "element type {:?} requires {} vertices, got {}",
                kind,
                kind.n_vertices(),
                vertices.len()
            )));
        }

        // Validate vertex indices
        for &v in &vertices {
            if v >= self.vertices.len() {
                return Err(Error::Mesh(format!(
                    "vertex index {} out of bounds (mesh has {} vertices)",
                    v,
                    self.vertices.len()
                )));
            }
        }

        let map = RefMap::new(kind, vertices.iter().map(|&v| self.vertices[v]).collect());
        let signed_area = signed_area(map.vertices());
        if signed_area <= 0.0 {
            return Err(Error::Mesh(format!(
                "element with vertices {:?} is degenerate or clockwise",
                vertices
            )));
        }

        let marker = self.regions.intern(region);
        let id = self.elements.len();
        self.elements.push(Element {
            id,
            kind,
            vertices,
            marker,
            parent: None,
            sons: None,
            active: true,
            level: 0,
        });
        self.register_active(id);
        self.n_base_elements = self.elements.len();
        Ok(id)
    }

    /// Mark the edge between two vertices with a boundary marker.
    ///
    /// The edge must be an edge of an active element.
    pub fn add_boundary_edge(&mut self, a: usize, b: usize, marker: &str) -> Result<()> {
        let key = edge_key(a, b);
        if !self.edge_elements.contains_key(&key) {
            return Err(Error::Mesh(format!(
                "boundary edge ({}, {}) is not an element edge",
                a, b
            )));
        }
        let idx = self.boundary_markers.intern(marker);
        self.boundary.insert(key, idx);
        Ok(())
    }

    /// Number of vertices.
    pub fn n_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of elements, including inactive parents.
    pub fn n_elements(&self) -> usize {
        self.elements.len()
    }

    /// Number of active elements.
    pub fn n_active_elements(&self) -> usize {
        self.elements.iter().filter(|e| e.active).count()
    }

    /// Number of active elements in a region.
    pub fn n_active_elements_in(&self, region: &str) -> usize {
        match self.regions.find(region) {
            Some(marker) => self
                .active_elements()
                .filter(|e| e.marker == marker)
                .count(),
            None => 0,
        }
    }

    /// Vertex coordinates.
    pub fn vertices(&self) -> &[Point2] {
        &self.vertices
    }

    /// A vertex's coordinates.
    pub fn vertex(&self, idx: usize) -> Option<&Point2> {
        self.vertices.get(idx)
    }

    /// An element by id.
    pub fn element(&self, id: usize) -> Option<&Element> {
        self.elements.get(id)
    }

    /// All elements, active or not.
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Active elements in id order.
    pub fn active_elements(&self) -> impl Iterator<Item = &Element> + '_ {
        self.elements.iter().filter(|e| e.active)
    }

    /// Region names.
    pub fn regions(&self) -> &Markers {
        &self.regions
    }

    /// Boundary marker names.
    pub fn boundary_markers(&self) -> &Markers {
        &self.boundary_markers
    }

    /// Region name of an element.
    pub fn region_of(&self, element: &Element) -> &str {
        self.regions.name(element.marker).unwrap_or("")
    }

    /// Boundary marker index of an edge, if marked.
    pub fn boundary_marker(&self, key: EdgeKey) -> Option<usize> {
        self.boundary.get(&key).copied()
    }

    /// Marked edges.
    pub fn boundary_edges(&self) -> impl Iterator<Item = (EdgeKey, usize)> + '_ {
        self.boundary.iter().map(|(&k, &m)| (k, m))
    }

    /// Active elements having `key` as a whole edge.
    pub fn edge_elements(&self, key: EdgeKey) -> &[usize] {
        self.edge_elements.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Edge that `key` is a half of.
    pub fn edge_parent(&self, key: EdgeKey) -> Option<EdgeKey> {
        self.edge_parents.get(&key).copied()
    }

    /// Midpoint vertex of a split edge.
    pub fn midpoint(&self, key: EdgeKey) -> Option<usize> {
        self.midpoints.get(&key).copied()
    }

    /// Edge whose split created vertex `v`.
    pub fn split_edge_of(&self, v: usize) -> Option<EdgeKey> {
        self.midpoint_edges.get(&v).copied()
    }

    /// Geometry map of an element.
    pub fn ref_map(&self, element: &Element) -> RefMap {
        RefMap::new(
            element.kind,
            element.vertices.iter().map(|&v| self.vertices[v]).collect(),
        )
    }

    /// Vertices and elements of the unrefined mesh.
    pub fn base_counts(&self) -> (usize, usize) {
        (self.n_base_vertices, self.n_base_elements)
    }

    /// Ids of refined elements, in refinement order.
    pub fn refinements(&self) -> &[usize] {
        &self.refinements
    }

    /// Bounding box of all vertices.
    pub fn bounds(&self) -> Option<(Point2, Point2)> {
        let first = self.vertices.first()?;
        let mut min = *first;
        let mut max = *first;
        for v in &self.vertices[1..] {
            for i in 0..2 {
                min[i] = min[i].min(v[i]);
                max[i] = max[i].max(v[i]);
            }
        }
        Some((min, max))
    }

    /// Whether two meshes have the same vertices, elements and boundary markers.
    pub fn same_structure(&self, other: &Mesh) -> bool {
        self.vertices == other.vertices
            && self.regions.names() == other.regions.names()
            && self.boundary_markers.names() == other.boundary_markers.names()
            && self.boundary == other.boundary
            && self.elements.len() == other.elements.len()
            && self.elements.iter().zip(&other.elements).all(|(a, b)| {
                a.kind == b.kind
                    && a.active == b.active
                    && a.marker == b.marker
                    && a.vertices == b.vertices
            })
    }

    /// Refine one active element into four sons.
    ///
    /// Refining an element is a no-op if it is already refined.
    pub fn refine_element(&mut self, id: usize) -> Result<()> {
        let element = self
            .elements
            .get(id)
            .ok_or_else(|| Error::Mesh(format!("element {} does not exist", id)))?;
        if !element.active {
            return Ok(());
        }
        let element = element.clone();

        let mids: Vec<usize> = element
            .edges()
            .collect::<Vec<_>>()
            .into_iter()
            .map(|(a, b)| self.split_edge(a, b))
            .collect();
        let v = &element.vertices;

        let sons_vertices: Vec<Vec<usize>> = match element.kind {
            ElementKind::Triangle => vec![
                vec![v[0], mids[0], mids[2]],
                vec![mids[0], v[1], mids[1]],
                vec![mids[2], mids[1], v[2]],
                vec![mids[1], mids[2], mids[0]],
            ],
            ElementKind::Quad => {
                let center = self.add_refinement_vertex(
                    v.iter().map(|&i| self.vertices[i]).sum::<Point2>() / 4.0,
                );
                vec![
                    vec![v[0], mids[0], center, mids[3]],
                    vec![mids[0], v[1], mids[1], center],
                    vec![center, mids[1], v[2], mids[2]],
                    vec![mids[3], center, mids[2], v[3]],
                ]
            }
        };

        self.unregister_active(id);
        let mut sons = [0usize; 4];
        for (slot, vertices) in sons.iter_mut().zip(sons_vertices) {
            let son_id = self.elements.len();
            self.elements.push(Element {
                id: son_id,
                kind: element.kind,
                vertices,
                marker: element.marker,
                parent: Some(id),
                sons: None,
                active: true,
                level: element.level + 1,
            });
            self.register_active(son_id);
            *slot = son_id;
        }

        let parent = &mut self.elements[id];
        parent.active = false;
        parent.sons = Some(sons);
        self.refinements.push(id);
        Ok(())
    }

    /// Refine every active element once.
    pub fn refine_all_elements(&mut self) -> Result<()> {
        let ids: Vec<usize> = self.active_elements().map(|e| e.id).collect();
        for id in ids {
            self.refine_element(id)?;
        }
        Ok(())
    }

    /// Refine every active element of one region once.
    pub fn refine_in_area(&mut self, region: &str) -> Result<()> {
        let marker = self.regions.find(region).ok_or_else(|| {
            Error::Config(format!("region '{}' does not exist in the mesh", region))
        })?;
        let ids: Vec<usize> = self
            .active_elements()
            .filter(|e| e.marker == marker)
            .map(|e| e.id)
            .collect();
        for id in ids {
            self.refine_element(id)?;
        }
        log::debug!(
            "refined region '{}': {} active elements",
            region,
            self.n_active_elements_in(region)
        );
        Ok(())
    }

    /// Refine the elements of several regions `levels` times.
    pub fn refine_in_areas<S: AsRef<str>>(&mut self, regions: &[S], levels: usize) -> Result<()> {
        // Validate all names before touching the mesh
        for region in regions {
            if self.regions.find(region.as_ref()).is_none() {
                return Err(Error::Config(format!(
                    "region '{}' does not exist in the mesh",
                    region.as_ref()
                )));
            }
        }
        for _ in 0..levels {
            for region in regions {
                self.refine_in_area(region.as_ref())?;
            }
        }
        Ok(())
    }

    fn add_refinement_vertex(&mut self, point: Point2) -> usize {
        let idx = self.vertices.len();
        self.vertices.push(point);
        idx
    }

    /// Midpoint vertex of edge (a, b), created on first use.
    fn split_edge(&mut self, a: usize, b: usize) -> usize {
        let key = edge_key(a, b);
        if let Some(&m) = self.midpoints.get(&key) {
            return m;
        }
        let m = self.add_refinement_vertex((self.vertices[a] + self.vertices[b]) * 0.5);
        self.midpoints.insert(key, m);
        self.midpoint_edges.insert(m, key);
        for half in [edge_key(key.0, m), edge_key(m, key.1)] {
            self.edge_parents.insert(half, key);
            if let Some(&marker) = self.boundary.get(&key) {
                self.boundary.insert(half, marker);
            }
        }
        m
    }

    fn register_active(&mut self, id: usize) {
        let edges: Vec<(usize, usize)> = self.elements[id].edges().collect();
        for (a, b) in edges {
            self.edge_elements.entry(edge_key(a, b)).or_default().push(id);
        }
    }

    fn unregister_active(&mut self, id: usize) {
        let edges: Vec<(usize, usize)> = self.elements[id].edges().collect();
        for (a, b) in edges {
            let key = edge_key(a, b);
            if let Some(list) = self.edge_elements.get_mut(&key) {
                list.retain(|&e| e != id);
                if list.is_empty() {
                    self.edge_elements.remove(&key);
                }
            }
        }
    }
}

/// Signed area of a polygon (positive when counter-clockwise).
fn signed_area(points: &[Point2]) -> f64 {
    let n = points.len();
    0.5 * (0..n)
        .map(|i| {
            let (p, q) = (points[i], points[(i + 1) % n]);
            p[0] * q[1] - q[0] * p[1]
        })
        .sum::<f64>()
}
