//! Reference elements, geometry maps and element matrices.
//!
//! Elements are straight-sided triangles (affine map) and quadrilaterals
//! (bilinear map). The local basis comes from [`shapeset`]; which functions an
//! element carries is decided by the space.
//!
//! # Submodules
//!
//! - [`gauss`] - Gauss quadrature rules for numerical integration
//! - [`lobatto`] - Legendre/Lobatto polynomials
//! - [`shapeset`] - Hierarchic H1 shape functions

use crate::types::{ElementKind, Point2};
use nalgebra::{DMatrix, DVector, Matrix2, Vector2};

pub mod gauss;
pub mod lobatto;
pub mod shapeset;

pub use gauss::{gauss_1d, gauss_quad, gauss_tri, GaussPoint};
pub use shapeset::ShapeFn;

/// Tolerance for "inside the reference element" tests.
const REF_TOLERANCE: f64 = 1e-10;

/// Map from the reference element to a physical element.
#[derive(Debug, Clone, PartialEq)]
pub struct RefMap {
    kind: ElementKind,
    vertices: Vec<Point2>,
}

impl RefMap {
    /// Create a map from the physical vertex coordinates (counter-clockwise).
    pub fn new(kind: ElementKind, vertices: Vec<Point2>) -> Self {
        debug_assert_eq!(vertices.len(), kind.n_vertices());
        Self { kind, vertices }
    }

    /// Element shape.
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Physical vertex coordinates.
    pub fn vertices(&self) -> &[Point2] {
        &self.vertices
    }

    /// Physical point of reference coordinates (ξ, η).
    pub fn forward(&self, xi: f64, eta: f64) -> Point2 {
        let v = &self.vertices;
        match self.kind {
            ElementKind::Triangle => {
                v[0] + (v[1] - v[0]) * (0.5 * (xi + 1.0)) + (v[2] - v[0]) * (0.5 * (eta + 1.0))
            }
            ElementKind::Quad => {
                let (a0, a1) = (0.5 * (1.0 - xi), 0.5 * (1.0 + xi));
                let (b0, b1) = (0.5 * (1.0 - eta), 0.5 * (1.0 + eta));
                v[0] * (a0 * b0) + v[1] * (a1 * b0) + v[2] * (a1 * b1) + v[3] * (a0 * b1)
            }
        }
    }

    /// Jacobian `d(x, y)/d(ξ, η)`; columns are the reference directions.
    pub fn jacobian(&self, xi: f64, eta: f64) -> Matrix2<f64> {
        let v = &self.vertices;
        let (dxi, deta) = match self.kind {
            ElementKind::Triangle => ((v[1] - v[0]) * 0.5, (v[2] - v[0]) * 0.5),
            ElementKind::Quad => {
                let dxi = (v[1] - v[0]) * (0.25 * (1.0 - eta)) + (v[2] - v[3]) * (0.25 * (1.0 + eta));
                let deta = (v[3] - v[0]) * (0.25 * (1.0 - xi)) + (v[2] - v[1]) * (0.25 * (1.0 + xi));
                (dxi, deta)
            }
        };
        Matrix2::new(dxi[0], deta[0], dxi[1], deta[1])
    }

    /// Whether reference coordinates lie in the reference element.
    pub fn contains_reference(&self, xi: f64, eta: f64) -> bool {
        let t = REF_TOLERANCE;
        match self.kind {
            ElementKind::Triangle => xi >= -1.0 - t && eta >= -1.0 - t && xi + eta <= t,
            ElementKind::Quad => xi.abs() <= 1.0 + t && eta.abs() <= 1.0 + t,
        }
    }

    /// Reference coordinates of a physical point, if it lies in the element.
    pub fn inverse(&self, point: &Point2) -> Option<(f64, f64)> {
        let (xi, eta) = match self.kind {
            ElementKind::Triangle => {
                let j = self.jacobian(0.0, 0.0);
                let r = j.try_inverse()? * (point - self.forward(-1.0, -1.0));
                (r[0] - 1.0, r[1] - 1.0)
            }
            ElementKind::Quad => {
                let mut r = Vector2::new(0.0, 0.0);
                for _ in 0..30 {
                    let residual = self.forward(r[0], r[1]) - point;
                    let step = self.jacobian(r[0], r[1]).try_inverse()? * residual;
                    r -= step;
                    if step.norm() < 1e-13 {
                        break;
                    }
                }
                (r[0], r[1])
            }
        };
        self.contains_reference(xi, eta).then_some((xi, eta))
    }

    /// Physical area.
    pub fn area(&self) -> f64 {
        let rule = match self.kind {
            ElementKind::Triangle => gauss_tri(1),
            ElementKind::Quad => gauss_quad(2),
        };
        rule.iter()
            .map(|gp| gp.weight * self.jacobian(gp.xi(), gp.eta()).determinant())
            .sum()
    }

    /// Quadrature rule suited to shape functions of order `order`.
    pub fn quadrature(&self, order: usize) -> Vec<GaussPoint> {
        let n = gauss::points_for_order(order);
        match self.kind {
            ElementKind::Triangle => gauss_tri(n),
            ElementKind::Quad => gauss_quad(n),
        }
    }
}

/// Dense stiffness matrix and load vector of one element.
#[derive(Debug, Clone)]
pub struct ElementMatrices {
    /// `∫ λ ∇φ_i · ∇φ_j`.
    pub stiffness: DMatrix<f64>,
    /// `∫ q φ_i`.
    pub load: DVector<f64>,
}

/// Compute the element stiffness matrix and load vector.
///
/// # Arguments
///
/// * `map` - Geometry map of the element
/// * `shapes` - Local basis functions
/// * `order` - Highest polynomial order among `shapes`
/// * `conductivity` - Thermal conductivity λ of the element's region
/// * `source` - Volumetric heat source q
pub fn element_matrices(
    map: &RefMap,
    shapes: &[ShapeFn],
    order: usize,
    conductivity: f64,
    source: f64,
) -> ElementMatrices {
    let n = shapes.len();
    let mut stiffness = DMatrix::zeros(n, n);
    let mut load = DVector::zeros(n);
    let mut values = vec![0.0; n];
    let mut grads = vec![Vector2::zeros(); n];

    for gp in map.quadrature(order) {
        let j = map.jacobian(gp.xi(), gp.eta());
        let det = j.determinant();
        let Some(j_inv_t) = j.try_inverse().map(|m| m.transpose()) else {
            continue;
        };
        let w = gp.weight * det.abs();

        for (i, shape) in shapes.iter().enumerate() {
            let (v, g) = shape.eval(map.kind(), gp.xi(), gp.eta());
            values[i] = v;
            grads[i] = j_inv_t * Vector2::new(g[0], g[1]);
        }

        for i in 0..n {
            load[i] += w * source * values[i];
            for k in i..n {
                let kij = w * conductivity * grads[i].dot(&grads[k]);
                stiffness[(i, k)] += kij;
                if k != i {
                    stiffness[(k, i)] += kij;
                }
            }
        }
    }

    ElementMatrices { stiffness, load }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_square() -> RefMap {
        RefMap::new(
            ElementKind::Quad,
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 0.0),
                Point2::new(1.0, 1.0),
                Point2::new(0.0, 1.0),
            ],
        )
    }

    fn skewed_quad() -> RefMap {
        RefMap::new(
            ElementKind::Quad,
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(2.0, 0.2),
                Point2::new(2.3, 1.5),
                Point2::new(-0.1, 1.1),
            ],
        )
    }

    #[test]
    fn test_forward_maps_vertices() {
        let map = skewed_quad();
        for (v, r) in map.vertices().iter().zip(shapeset::reference_vertices(ElementKind::Quad)) {
            let p = map.forward(r[0], r[1]);
            assert_relative_eq!(p[0], v[0], epsilon = 1e-14);
            assert_relative_eq!(p[1], v[1], epsilon = 1e-14);
        }
    }

    #[test]
    fn test_inverse_roundtrip_quad() {
        let map = skewed_quad();
        let p = map.forward(0.3, -0.6);
        let (xi, eta) = map.inverse(&p).unwrap();
        assert_relative_eq!(xi, 0.3, epsilon = 1e-10);
        assert_relative_eq!(eta, -0.6, epsilon = 1e-10);
        assert!(map.inverse(&Point2::new(5.0, 5.0)).is_none());
    }

    #[test]
    fn test_inverse_triangle() {
        let map = RefMap::new(
            ElementKind::Triangle,
            vec![Point2::new(0.0, 0.0), Point2::new(2.0, 0.0), Point2::new(0.0, 2.0)],
        );
        let (xi, eta) = map.inverse(&Point2::new(0.5, 0.5)).unwrap();
        assert_relative_eq!(xi, -0.5, epsilon = 1e-14);
        assert_relative_eq!(eta, -0.5, epsilon = 1e-14);
        assert!(map.inverse(&Point2::new(1.5, 1.5)).is_none());
    }

    #[test]
    fn test_area() {
        assert_relative_eq!(unit_square().area(), 1.0, epsilon = 1e-14);
        let tri = RefMap::new(
            ElementKind::Triangle,
            vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.0, 1.0)],
        );
        assert_relative_eq!(tri.area(), 0.5, epsilon = 1e-14);
    }

    #[test]
    fn test_stiffness_annihilates_constants() {
        // Vertex functions sum to one, so K * [1, 1, 1, 1] = 0
        let map = skewed_quad();
        let shapes: Vec<ShapeFn> = (0..4).map(ShapeFn::Vertex).collect();
        let m = element_matrices(&map, &shapes, 1, 3.0, 0.0);
        let ones = DVector::from_element(4, 1.0);
        let r = &m.stiffness * ones;
        for i in 0..4 {
            assert_relative_eq!(r[i], 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_stiffness_symmetric_positive_diagonal() {
        let map = skewed_quad();
        let mut shapes: Vec<ShapeFn> = (0..4).map(ShapeFn::Vertex).collect();
        shapes.push(ShapeFn::Edge {
            edge: 0,
            degree: 2,
            flipped: false,
        });
        shapes.push(ShapeFn::Bubble(2, 2));
        let m = element_matrices(&map, &shapes, 2, 1.0, 1.0);
        for i in 0..shapes.len() {
            assert!(m.stiffness[(i, i)] > 0.0);
            for j in 0..shapes.len() {
                assert_relative_eq!(m.stiffness[(i, j)], m.stiffness[(j, i)], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_load_of_vertex_functions_sums_to_area() {
        let map = skewed_quad();
        let shapes: Vec<ShapeFn> = (0..4).map(ShapeFn::Vertex).collect();
        let m = element_matrices(&map, &shapes, 1, 1.0, 2.0);
        assert_relative_eq!(m.load.sum(), 2.0 * map.area(), epsilon = 1e-12);
    }
}
