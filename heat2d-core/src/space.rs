//! H1 function space over a mesh.
//!
//! A [`Space`] owns its mesh and boundary conditions and assigns a
//! polynomial order to every active element. From that it derives the DOF
//! layout:
//!
//! 1. vertex functions, one per non-hanging vertex not on a Dirichlet marker,
//! 2. edge functions of degree `2..=p_edge` per edge, `p_edge` being the
//!    smallest order of the elements touching the edge,
//! 3. bubble functions per element.
//!
//! Each pass walks the active elements in id order. Vertices lying inside a
//! coarser element's edge (hanging vertices) and the halves of such an edge
//! carry no DOFs of their own; their local functions are expressed through
//! the coarse edge's vertex and edge functions, recursively when the coarse
//! edge's own vertices hang.

use crate::bc::EssentialBcs;
use crate::element::gauss::gauss_1d;
use crate::element::lobatto::{lobatto, lobatto_derivative};
use crate::element::shapeset::bubble_indices;
use crate::element::{RefMap, ShapeFn};
use crate::error::{Error, Result};
use crate::mesh::{edge_key, EdgeKey, Element, Mesh};
use crate::types::{is_valid_order, ElementKind, MAX_ORDER};
use std::collections::HashMap;

/// Coefficients below this are dropped from constraint lists.
const COEF_TOLERANCE: f64 = 1e-14;

/// Hanging vertices may depend on each other at most this deep.
const MAX_CONSTRAINT_DEPTH: usize = 64;

/// Target of a local function's coefficient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dof {
    /// Unknown with the given global index.
    Free(usize),
    /// Known value (Dirichlet lift).
    Fixed(f64),
}

/// Local shape functions of one active element and their global expansion.
///
/// Local function `i` contributes `Σ c · dof` over `terms[i]`.
#[derive(Debug, Clone)]
pub struct AsmList {
    pub element_id: usize,
    pub kind: ElementKind,
    pub marker: usize,
    pub order: usize,
    pub map: RefMap,
    pub shapes: Vec<ShapeFn>,
    pub terms: Vec<Vec<(Dof, f64)>>,
}

impl AsmList {
    /// Local coefficients of a global coefficient vector.
    pub fn local_coefficients(&self, coeffs: &[f64]) -> Vec<f64> {
        self.terms
            .iter()
            .map(|terms| {
                terms
                    .iter()
                    .map(|&(dof, c)| match dof {
                        Dof::Free(i) => c * coeffs[i],
                        Dof::Fixed(g) => c * g,
                    })
                    .sum()
            })
            .collect()
    }
}

/// DOF numbering of a space.
#[derive(Debug, Clone, Default)]
struct DofLayout {
    asm_lists: Vec<AsmList>,
    n_vertex: usize,
    n_edge: usize,
    n_bubble: usize,
}

/// H1 space with per-element polynomial order.
#[derive(Debug, Clone)]
pub struct Space {
    mesh: Mesh,
    bcs: EssentialBcs,
    /// Order per element id; 0 for inactive elements.
    orders: Vec<usize>,
    layout: DofLayout,
}

impl Space {
    /// Create a space of uniform order `order` over `mesh`.
    pub fn new(mesh: Mesh, bcs: EssentialBcs, order: usize) -> Result<Self> {
        check_order(order)?;
        bcs.validate(&mesh)?;
        if mesh.n_active_elements() == 0 {
            return Err(Error::Mesh("mesh has no elements".into()));
        }
        let orders: Vec<usize> = mesh
            .elements()
            .iter()
            .map(|e| if e.active { order } else { 0 })
            .collect();
        let layout = build_layout(&mesh, &bcs, &orders)?;
        let space = Self {
            mesh,
            bcs,
            orders,
            layout,
        };
        log::debug!(
            "space created: order {}, {} active elements, {} DOFs",
            order,
            space.mesh.n_active_elements(),
            space.num_dofs()
        );
        Ok(space)
    }

    /// Independent copy of this space with its own mesh.
    pub fn copy(&self) -> Space {
        self.clone()
    }

    /// Copy of this space bound to `target`.
    ///
    /// `target` must have the same element structure as this space's mesh.
    pub fn copy_onto(&self, target: Mesh) -> Result<Space> {
        if !self.mesh.same_structure(&target) {
            return Err(Error::Space(
                "target mesh does not match the element structure of the space".into(),
            ));
        }
        self.bcs.validate(&target)?;
        let layout = build_layout(&target, &self.bcs, &self.orders)?;
        Ok(Space {
            mesh: target,
            bcs: self.bcs.clone(),
            orders: self.orders.clone(),
            layout,
        })
    }

    /// Give the mesh back, dropping the space.
    pub fn into_mesh(self) -> Mesh {
        self.mesh
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn bcs(&self) -> &EssentialBcs {
        &self.bcs
    }

    /// Set the order of one active element and renumber.
    pub fn set_element_order(&mut self, id: usize, order: usize) -> Result<()> {
        check_order(order)?;
        match self.mesh.element(id) {
            Some(e) if e.active => {}
            Some(_) => return Err(Error::Space(format!("element {} is not active", id))),
            None => return Err(Error::Space(format!("element {} does not exist", id))),
        }
        if self.orders[id] == order {
            return Ok(());
        }
        self.orders[id] = order;
        self.layout = build_layout(&self.mesh, &self.bcs, &self.orders)?;
        Ok(())
    }

    /// Set the same order on all active elements.
    pub fn set_uniform_order(&mut self, order: usize) -> Result<()> {
        check_order(order)?;
        for (o, e) in self.orders.iter_mut().zip(self.mesh.elements()) {
            *o = if e.active { order } else { 0 };
        }
        self.layout = build_layout(&self.mesh, &self.bcs, &self.orders)?;
        Ok(())
    }

    /// Order of an active element.
    pub fn element_order(&self, id: usize) -> Option<usize> {
        self.orders.get(id).copied().filter(|&o| o > 0)
    }

    /// Ids of the active elements, in creation order.
    pub fn active_element_ids(&self) -> Vec<usize> {
        self.mesh.active_elements().map(|e| e.id).collect()
    }

    pub fn num_dofs(&self) -> usize {
        self.layout.n_vertex + self.layout.n_edge + self.layout.n_bubble
    }

    pub fn vertex_functions_count(&self) -> usize {
        self.layout.n_vertex
    }

    pub fn edge_functions_count(&self) -> usize {
        self.layout.n_edge
    }

    pub fn bubble_functions_count(&self) -> usize {
        self.layout.n_bubble
    }

    /// Assembly lists of all active elements, in id order.
    pub fn asm_lists(&self) -> &[AsmList] {
        &self.layout.asm_lists
    }

    /// Assembly list of one active element.
    pub fn asm_list(&self, id: usize) -> Option<&AsmList> {
        self.layout
            .asm_lists
            .binary_search_by_key(&id, |a| a.element_id)
            .ok()
            .map(|idx| &self.layout.asm_lists[idx])
    }
}

fn check_order(order: usize) -> Result<()> {
    if is_valid_order(order) {
        Ok(())
    } else {
        Err(Error::Space(format!(
            "polynomial order {} outside 1..={}",
            order, MAX_ORDER
        )))
    }
}

/// DOF data of an edge that owns functions.
#[derive(Debug, Clone)]
struct EdgeInfo {
    order: usize,
    fixed: bool,
    first: Option<usize>,
}

impl EdgeInfo {
    fn terms(&self, degree: usize) -> Vec<(Dof, f64)> {
        match self.first {
            Some(first) if !self.fixed && (2..=self.order).contains(&degree) => {
                vec![(Dof::Free(first + degree - 2), 1.0)]
            }
            _ => Vec::new(),
        }
    }
}

/// Nearest coarser edge with an active element that contains `key`.
fn constraining_edge(mesh: &Mesh, key: EdgeKey) -> Option<EdgeKey> {
    if mesh.edge_elements(key).len() > 1 {
        return None;
    }
    let mut current = key;
    while let Some(parent) = mesh.edge_parent(current) {
        if !mesh.edge_elements(parent).is_empty() {
            return Some(parent);
        }
        current = parent;
    }
    None
}

/// Edge of an active element whose interior contains vertex `v`.
fn hanging_on(mesh: &Mesh, v: usize) -> Option<EdgeKey> {
    let mut current = mesh.split_edge_of(v)?;
    loop {
        if !mesh.edge_elements(current).is_empty() {
            return Some(current);
        }
        current = mesh.edge_parent(current)?;
    }
}

/// Parameter of vertex `v` along `key`, -1 at `key.0` and 1 at `key.1`.
fn edge_parameter(mesh: &Mesh, v: usize, key: EdgeKey) -> f64 {
    let vertices = mesh.vertices();
    let (a, b, p) = (vertices[key.0], vertices[key.1], vertices[v]);
    let d = b - a;
    2.0 * (p - a).dot(&d) / d.norm_squared() - 1.0
}

/// Combine duplicate unknowns and fold fixed values into one lift term.
fn merge(terms: Vec<(Dof, f64)>) -> Vec<(Dof, f64)> {
    let mut lift = 0.0;
    let mut out: Vec<(Dof, f64)> = Vec::with_capacity(terms.len());
    for (dof, c) in terms {
        match dof {
            Dof::Fixed(g) => lift += c * g,
            Dof::Free(_) => match out.iter_mut().find(|(d, _)| *d == dof) {
                Some(entry) => entry.1 += c,
                None => out.push((dof, c)),
            },
        }
    }
    out.retain(|&(_, c)| c.abs() > COEF_TOLERANCE);
    if lift != 0.0 {
        out.push((Dof::Fixed(lift), 1.0));
    }
    out
}

struct LayoutBuilder<'a> {
    mesh: &'a Mesh,
    edges: HashMap<EdgeKey, EdgeInfo>,
    vertex_dofs: HashMap<usize, Dof>,
    hanging: HashMap<usize, (EdgeKey, f64)>,
    rule: Vec<(f64, f64)>,
}

impl LayoutBuilder<'_> {
    fn edge(&self, key: EdgeKey) -> Result<&EdgeInfo> {
        self.edges
            .get(&key)
            .ok_or_else(|| Error::Mesh(format!("edge {:?} has no owner element", key)))
    }

    /// Global expansion of the vertex function at `v`.
    fn vertex_terms(
        &self,
        v: usize,
        depth: usize,
        cache: &mut HashMap<usize, Vec<(Dof, f64)>>,
    ) -> Result<Vec<(Dof, f64)>> {
        if let Some(terms) = cache.get(&v) {
            return Ok(terms.clone());
        }
        if depth > MAX_CONSTRAINT_DEPTH {
            return Err(Error::Mesh(format!(
                "constraint chain at vertex {} is too deep",
                v
            )));
        }
        let terms = match self.hanging.get(&v) {
            Some(&(key, s)) => {
                let mut acc = Vec::new();
                for (end, weight) in [(key.0, lobatto(0, s)), (key.1, lobatto(1, s))] {
                    let end_terms = self.vertex_terms(end, depth + 1, cache)?;
                    acc.extend(end_terms.into_iter().map(|(d, c)| (d, c * weight)));
                }
                let info = self.edge(key)?;
                for k in 2..=info.order {
                    let weight = lobatto(k, s);
                    acc.extend(info.terms(k).into_iter().map(|(d, c)| (d, c * weight)));
                }
                merge(acc)
            }
            None => {
                let dof = self.vertex_dofs.get(&v).copied().ok_or_else(|| {
                    Error::Mesh(format!("vertex {} is not part of an active element", v))
                })?;
                merge(vec![(dof, 1.0)])
            }
        };
        cache.insert(v, terms.clone());
        Ok(terms)
    }

    /// `∫ (d/dt) l_k(s(t)) l_j'(t) dt` for the sub-interval `[s0, s1]` of a coarse edge.
    fn projection(&self, k: usize, j: usize, s0: f64, s1: f64) -> f64 {
        let half = 0.5 * (s1 - s0);
        self.rule
            .iter()
            .map(|&(t, w)| {
                w * lobatto_derivative(k, s0 + (t + 1.0) * half) * half * lobatto_derivative(j, t)
            })
            .sum()
    }

    fn asm_list(
        &self,
        element: &Element,
        order: usize,
        first_bubble: usize,
        constrained: &HashMap<EdgeKey, EdgeKey>,
        cache: &mut HashMap<usize, Vec<(Dof, f64)>>,
    ) -> Result<AsmList> {
        let mut shapes = Vec::new();
        let mut terms = Vec::new();

        for (i, &v) in element.vertices.iter().enumerate() {
            let t = self.vertex_terms(v, 0, cache)?;
            if !t.is_empty() {
                shapes.push(ShapeFn::Vertex(i));
                terms.push(t);
            }
        }

        for (local, (a, b)) in element.edges().enumerate() {
            let key = edge_key(a, b);
            let flipped = a > b;
            match constrained.get(&key) {
                None => {
                    let info = self.edge(key)?;
                    for degree in 2..=info.order {
                        let t = info.terms(degree);
                        if !t.is_empty() {
                            shapes.push(ShapeFn::Edge {
                                edge: local,
                                degree,
                                flipped,
                            });
                            terms.push(t);
                        }
                    }
                }
                Some(&owner) => {
                    let info = self.edge(owner)?;
                    if info.fixed || info.first.is_none() {
                        continue;
                    }
                    let s0 = edge_parameter(self.mesh, key.0, owner);
                    let s1 = edge_parameter(self.mesh, key.1, owner);
                    for degree in 2..=info.order {
                        let mut acc = Vec::new();
                        for k in 2..=info.order {
                            let c = self.projection(k, degree, s0, s1);
                            acc.extend(info.terms(k).into_iter().map(|(d, x)| (d, x * c)));
                        }
                        let t = merge(acc);
                        if !t.is_empty() {
                            shapes.push(ShapeFn::Edge {
                                edge: local,
                                degree,
                                flipped,
                            });
                            terms.push(t);
                        }
                    }
                }
            }
        }

        for (idx, (i, j)) in bubble_indices(element.kind, order).into_iter().enumerate() {
            shapes.push(ShapeFn::Bubble(i, j));
            terms.push(vec![(Dof::Free(first_bubble + idx), 1.0)]);
        }

        Ok(AsmList {
            element_id: element.id,
            kind: element.kind,
            marker: element.marker,
            order,
            map: self.mesh.ref_map(element),
            shapes,
            terms,
        })
    }
}

fn build_layout(mesh: &Mesh, bcs: &EssentialBcs, orders: &[usize]) -> Result<DofLayout> {
    let bc_values = bcs.values_by_marker(mesh);
    let active: Vec<&Element> = mesh.active_elements().collect();

    // Edges owning functions, with the minimum rule; halves point to their owner
    let mut constrained: HashMap<EdgeKey, EdgeKey> = HashMap::new();
    let mut edges: HashMap<EdgeKey, EdgeInfo> = HashMap::new();
    let mut owners: Vec<EdgeKey> = Vec::new();
    for e in &active {
        let p = orders[e.id];
        for (a, b) in e.edges() {
            let key = edge_key(a, b);
            let owner = match constraining_edge(mesh, key) {
                Some(parent) => {
                    constrained.insert(key, parent);
                    parent
                }
                None => key,
            };
            let info = edges.entry(owner).or_insert_with(|| {
                owners.push(owner);
                EdgeInfo {
                    order: p,
                    fixed: false,
                    first: None,
                }
            });
            info.order = info.order.min(p);
        }
    }

    // Dirichlet edges fix their end vertices; later conditions win at shared vertices
    let mut vertex_fixed: HashMap<usize, f64> = HashMap::new();
    for owner in &owners {
        let value = mesh.boundary_marker(*owner).and_then(|m| bc_values[m]);
        if let (Some(g), Some(info)) = (value, edges.get_mut(owner)) {
            info.fixed = true;
            vertex_fixed.insert(owner.0, g);
            vertex_fixed.insert(owner.1, g);
        }
    }

    let mut hanging: HashMap<usize, (EdgeKey, f64)> = HashMap::new();
    let mut vertex_dofs: HashMap<usize, Dof> = HashMap::new();
    let mut next = 0;

    // Vertex pass
    for e in &active {
        for &v in &e.vertices {
            if vertex_dofs.contains_key(&v) || hanging.contains_key(&v) {
                continue;
            }
            if let Some(key) = hanging_on(mesh, v) {
                hanging.insert(v, (key, edge_parameter(mesh, v, key)));
                continue;
            }
            let dof = match vertex_fixed.get(&v) {
                Some(&g) => Dof::Fixed(g),
                None => {
                    next += 1;
                    Dof::Free(next - 1)
                }
            };
            vertex_dofs.insert(v, dof);
        }
    }
    let n_vertex = next;

    // Edge pass
    for e in &active {
        for (a, b) in e.edges() {
            let key = edge_key(a, b);
            if constrained.contains_key(&key) {
                continue;
            }
            if let Some(info) = edges.get_mut(&key) {
                if !info.fixed && info.first.is_none() && info.order >= 2 {
                    info.first = Some(next);
                    next += info.order - 1;
                }
            }
        }
    }
    let n_edge = next - n_vertex;

    // Bubble pass
    let mut first_bubble = Vec::with_capacity(active.len());
    for e in &active {
        first_bubble.push(next);
        next += e.kind.n_bubbles(orders[e.id]);
    }
    let n_bubble = next - n_vertex - n_edge;

    let builder = LayoutBuilder {
        mesh,
        edges,
        vertex_dofs,
        hanging,
        rule: gauss_1d(MAX_ORDER + 1),
    };
    let mut cache = HashMap::new();
    let asm_lists = active
        .iter()
        .zip(first_bubble)
        .map(|(e, first)| builder.asm_list(e, orders[e.id], first, &constrained, &mut cache))
        .collect::<Result<Vec<_>>>()?;

    log::debug!(
        "DOF layout: {} vertex, {} edge, {} bubble functions ({} hanging vertices)",
        n_vertex,
        n_edge,
        n_bubble,
        builder.hanging.len()
    );

    Ok(DofLayout {
        asm_lists,
        n_vertex,
        n_edge,
        n_bubble,
    })
}
