//! Hierarchic H1 shapeset for triangles and quadrilaterals.
//!
//! Every local basis function is one of:
//! - a vertex function (value 1 at one vertex, linear along its edges),
//! - an edge function of degree `k >= 2`, whose trace on its edge is the
//!   Lobatto function `l_k(s)` and which vanishes on the other edges,
//! - a bubble function vanishing on the whole element boundary.
//!
//! # Reference Elements
//!
//! ```text
//!  quad                      triangle
//!  3-----2                   2
//!  |     |                   | \
//!  |     |                   |   \
//!  0-----1                   0-----1
//! ```
//!
//! Quad: [-1, 1]², triangle: (-1,-1), (1,-1), (-1,1). Local edge `e` runs
//! from vertex `e` to vertex `e + 1` (mod n). An edge function marked
//! `flipped` uses the opposite direction, which multiplies odd degrees by -1
//! and makes traces agree between neighbours that see the edge reversed.

use crate::element::lobatto::{kernel, legendre, lobatto, lobatto_derivative};
use crate::types::ElementKind;

/// A local basis function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeFn {
    /// Vertex function of local vertex `0..n`.
    Vertex(usize),
    /// Edge function of polynomial degree `degree >= 2`.
    Edge {
        edge: usize,
        degree: usize,
        flipped: bool,
    },
    /// Bubble function. Quad: `l_i(ξ) l_j(η)` with `i, j >= 2`.
    /// Triangle: `λ0 λ1 λ2 P_i(λ1 - λ0) P_j(λ2 - λ1)`.
    Bubble(usize, usize),
}

impl ShapeFn {
    /// Value and reference gradient at (ξ, η).
    pub fn eval(&self, kind: ElementKind, xi: f64, eta: f64) -> (f64, [f64; 2]) {
        match kind {
            ElementKind::Quad => self.eval_quad(xi, eta),
            ElementKind::Triangle => self.eval_triangle(xi, eta),
        }
    }

    /// Value at (ξ, η).
    pub fn value(&self, kind: ElementKind, xi: f64, eta: f64) -> f64 {
        self.eval(kind, xi, eta).0
    }

    fn eval_quad(&self, xi: f64, eta: f64) -> (f64, [f64; 2]) {
        match *self {
            ShapeFn::Vertex(v) => {
                let (i, j) = match v {
                    0 => (0, 0),
                    1 => (1, 0),
                    2 => (1, 1),
                    _ => (0, 1),
                };
                tensor(i, j, xi, eta)
            }
            ShapeFn::Edge {
                edge,
                degree,
                flipped,
            } => {
                let sigma = if flipped { -1.0 } else { 1.0 };
                match edge {
                    // s = ξ along η = -1
                    0 => edge_tensor(degree, sigma, xi, 0, eta, false),
                    // s = η along ξ = 1
                    1 => edge_tensor(degree, sigma, eta, 1, xi, true),
                    // s = -ξ along η = 1
                    2 => edge_tensor(degree, -sigma, xi, 1, eta, false),
                    // s = -η along ξ = -1
                    _ => edge_tensor(degree, -sigma, eta, 0, xi, true),
                }
            }
            ShapeFn::Bubble(i, j) => tensor(i, j, xi, eta),
        }
    }

    fn eval_triangle(&self, xi: f64, eta: f64) -> (f64, [f64; 2]) {
        let lambda = [-(xi + eta) * 0.5, (1.0 + xi) * 0.5, (1.0 + eta) * 0.5];
        let grad = [[-0.5, -0.5], [0.5, 0.0], [0.0, 0.5]];

        match *self {
            ShapeFn::Vertex(v) => (lambda[v], grad[v]),
            ShapeFn::Edge {
                edge,
                degree,
                flipped,
            } => {
                let (mut a, mut b) = (edge, (edge + 1) % 3);
                if flipped {
                    std::mem::swap(&mut a, &mut b);
                }
                let s = lambda[b] - lambda[a];
                let (k, dk) = kernel(degree, s);
                let value = lambda[a] * lambda[b] * k;
                let mut g = [0.0; 2];
                for d in 0..2 {
                    g[d] = grad[a][d] * lambda[b] * k
                        + lambda[a] * grad[b][d] * k
                        + lambda[a] * lambda[b] * dk * (grad[b][d] - grad[a][d]);
                }
                (value, g)
            }
            ShapeFn::Bubble(n1, n2) => {
                let cube = lambda[0] * lambda[1] * lambda[2];
                let mut dcube = [0.0; 2];
                for d in 0..2 {
                    dcube[d] = grad[0][d] * lambda[1] * lambda[2]
                        + lambda[0] * grad[1][d] * lambda[2]
                        + lambda[0] * lambda[1] * grad[2][d];
                }
                let (p1, dp1, _) = legendre(n1, lambda[1] - lambda[0]);
                let (p2, dp2, _) = legendre(n2, lambda[2] - lambda[1]);
                let value = cube * p1 * p2;
                let mut g = [0.0; 2];
                for d in 0..2 {
                    g[d] = dcube[d] * p1 * p2
                        + cube * dp1 * (grad[1][d] - grad[0][d]) * p2
                        + cube * p1 * dp2 * (grad[2][d] - grad[1][d]);
                }
                (value, g)
            }
        }
    }
}

/// `l_i(ξ) l_j(η)` with gradient.
fn tensor(i: usize, j: usize, xi: f64, eta: f64) -> (f64, [f64; 2]) {
    let (fx, fy) = (lobatto(i, xi), lobatto(j, eta));
    (
        fx * fy,
        [lobatto_derivative(i, xi) * fy, fx * lobatto_derivative(j, eta)],
    )
}

/// `l_k(sign * t) * l_side(u)` where `t` is the coordinate along the edge and
/// `u` the transversal one. `t_is_eta` says which reference axis `t` is.
fn edge_tensor(
    degree: usize,
    sign: f64,
    t: f64,
    side: usize,
    u: f64,
    t_is_eta: bool,
) -> (f64, [f64; 2]) {
    let along = lobatto(degree, sign * t);
    let d_along = sign * lobatto_derivative(degree, sign * t);
    let across = lobatto(side, u);
    let d_across = lobatto_derivative(side, u);
    let value = along * across;
    if t_is_eta {
        (value, [along * d_across, d_along * across])
    } else {
        (value, [d_along * across, along * d_across])
    }
}

/// Bubble index pairs of an element of the given shape and order.
pub fn bubble_indices(kind: ElementKind, order: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::with_capacity(kind.n_bubbles(order));
    match kind {
        ElementKind::Quad => {
            for i in 2..=order {
                for j in 2..=order {
                    out.push((i, j));
                }
            }
        }
        ElementKind::Triangle => {
            if order >= 3 {
                let m = order - 3;
                for n1 in 0..=m {
                    for n2 in 0..=(m - n1) {
                        out.push((n1, n2));
                    }
                }
            }
        }
    }
    out
}

/// Reference coordinates of the local vertices.
pub fn reference_vertices(kind: ElementKind) -> &'static [[f64; 2]] {
    match kind {
        ElementKind::Quad => &[[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]],
        ElementKind::Triangle => &[[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0]],
    }
}

/// Reference point on local edge `edge` at parameter `s` in [-1, 1] (local direction).
pub fn reference_edge_point(kind: ElementKind, edge: usize, s: f64) -> [f64; 2] {
    let verts = reference_vertices(kind);
    let n = verts.len();
    let a = verts[edge];
    let b = verts[(edge + 1) % n];
    let t = 0.5 * (1.0 + s);
    [a[0] + t * (b[0] - a[0]), a[1] + t * (b[1] - a[1])]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const KINDS: [ElementKind; 2] = [ElementKind::Triangle, ElementKind::Quad];

    #[test]
    fn test_vertex_functions_are_nodal() {
        for kind in KINDS {
            let verts = reference_vertices(kind);
            for (i, _) in verts.iter().enumerate() {
                for (j, v) in verts.iter().enumerate() {
                    let expected = if i == j { 1.0 } else { 0.0 };
                    assert_relative_eq!(
                        ShapeFn::Vertex(i).value(kind, v[0], v[1]),
                        expected,
                        epsilon = 1e-14
                    );
                }
            }
        }
    }

    #[test]
    fn test_vertex_functions_partition_unity() {
        for kind in KINDS {
            let n = kind.n_vertices();
            let (x, y) = (-0.3, -0.2);
            let sum: f64 = (0..n).map(|v| ShapeFn::Vertex(v).value(kind, x, y)).sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_edge_function_trace_is_lobatto() {
        for kind in KINDS {
            for edge in 0..kind.n_vertices() {
                for degree in 2..=6 {
                    for flipped in [false, true] {
                        let f = ShapeFn::Edge {
                            edge,
                            degree,
                            flipped,
                        };
                        for &s in &[-0.8, -0.1, 0.35, 0.9] {
                            let p = reference_edge_point(kind, edge, s);
                            let s_dir = if flipped { -s } else { s };
                            assert_relative_eq!(
                                f.value(kind, p[0], p[1]),
                                lobatto(degree, s_dir),
                                epsilon = 1e-12
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_edge_function_vanishes_on_other_edges() {
        for kind in KINDS {
            let n = kind.n_vertices();
            for edge in 0..n {
                let f = ShapeFn::Edge {
                    edge,
                    degree: 3,
                    flipped: false,
                };
                for other in (0..n).filter(|&o| o != edge) {
                    let p = reference_edge_point(kind, other, 0.27);
                    assert_relative_eq!(f.value(kind, p[0], p[1]), 0.0, epsilon = 1e-13);
                }
            }
        }
    }

    #[test]
    fn test_bubbles_vanish_on_boundary() {
        for kind in KINDS {
            for (i, j) in bubble_indices(kind, 5) {
                let f = ShapeFn::Bubble(i, j);
                for edge in 0..kind.n_vertices() {
                    let p = reference_edge_point(kind, edge, -0.43);
                    assert_relative_eq!(f.value(kind, p[0], p[1]), 0.0, epsilon = 1e-13);
                }
            }
        }
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        let h = 1e-6;
        let (x, y) = (-0.4, -0.25);
        for kind in KINDS {
            let mut fns = vec![ShapeFn::Vertex(1)];
            for edge in 0..kind.n_vertices() {
                fns.push(ShapeFn::Edge {
                    edge,
                    degree: 4,
                    flipped: edge % 2 == 1,
                });
            }
            fns.extend(bubble_indices(kind, 4).into_iter().map(|(i, j)| ShapeFn::Bubble(i, j)));
            for f in fns {
                let (_, g) = f.eval(kind, x, y);
                let gx = (f.value(kind, x + h, y) - f.value(kind, x - h, y)) / (2.0 * h);
                let gy = (f.value(kind, x, y + h) - f.value(kind, x, y - h)) / (2.0 * h);
                assert_relative_eq!(g[0], gx, epsilon = 1e-6);
                assert_relative_eq!(g[1], gy, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_bubble_counts_match_kind() {
        for kind in KINDS {
            for order in 1..=8 {
                assert_eq!(bubble_indices(kind, order).len(), kind.n_bubbles(order));
            }
        }
    }
}
