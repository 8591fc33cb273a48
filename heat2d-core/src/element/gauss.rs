//! Gauss quadrature rules for numerical integration.
//!
//! This module provides Gauss-Legendre quadrature rules for:
//! - 1D line integration on [-1, 1]
//! - the reference quadrilateral [-1, 1]²
//! - the reference triangle with vertices (-1,-1), (1,-1), (-1,1)
//!
//! # Usage
//!
//! ```
//! use heat2d_core::element::gauss::{gauss_1d, gauss_quad, gauss_tri};
//!
//! // 2-point 1D rule
//! for (xi, w) in gauss_1d(2) {
//!     // integrate at point xi with weight w
//! }
//!
//! // collapsed triangle rule, exact up to degree 2n - 2
//! for gp in gauss_tri(4) {
//!     let (xi, eta) = (gp.xi(), gp.eta());
//! }
//! ```

use crate::element::lobatto::legendre;

/// Largest number of points per direction.
pub const MAX_POINTS: usize = 20;

/// A Gauss quadrature point with reference coordinates and weight.
#[derive(Debug, Clone, Copy)]
pub struct GaussPoint {
    /// Reference coordinates (ξ, η).
    pub coords: [f64; 2],
    /// Integration weight.
    pub weight: f64,
}

impl GaussPoint {
    /// Create a new Gauss point.
    pub fn new(coords: [f64; 2], weight: f64) -> Self {
        Self { coords, weight }
    }

    /// Get ξ (first reference coordinate).
    #[inline]
    pub fn xi(&self) -> f64 {
        self.coords[0]
    }

    /// Get η (second reference coordinate).
    #[inline]
    pub fn eta(&self) -> f64 {
        self.coords[1]
    }
}

/// 1D Gauss-Legendre quadrature points and weights.
///
/// Returns (point, weight) pairs for integration on [-1, 1], sorted by point.
/// The rule with `n` points is exact for polynomials of degree `2n - 1`.
///
/// # Panics
///
/// Panics if `n` is not in `1..=MAX_POINTS`.
pub fn gauss_1d(n: usize) -> Vec<(f64, f64)> {
    if !(1..=MAX_POINTS).contains(&n) {
        panic!("gauss_1d: n must be in 1..={}, got {}", MAX_POINTS, n);
    }

    let nf = n as f64;
    let mut rule = Vec::with_capacity(n);
    for i in 0..n {
        // Newton iteration from the Chebyshev-like initial guess
        let mut x = (std::f64::consts::PI * (i as f64 + 0.75) / (nf + 0.5)).cos();
        for _ in 0..100 {
            let (p, dp, _) = legendre(n, x);
            let dx = p / dp;
            x -= dx;
            if dx.abs() < 1e-15 {
                break;
            }
        }
        let (_, dp, _) = legendre(n, x);
        let w = 2.0 / ((1.0 - x * x) * dp * dp);
        rule.push((x, w));
    }
    rule.sort_by(|a, b| a.0.total_cmp(&b.0));
    rule
}

/// Quadrilateral Gauss quadrature points.
///
/// Tensor product of 1D Gauss-Legendre rules on [-1, 1]². Returns n² points.
pub fn gauss_quad(n: usize) -> Vec<GaussPoint> {
    let rule_1d = gauss_1d(n);
    let mut points = Vec::with_capacity(n * n);

    for &(xi, w_xi) in &rule_1d {
        for &(eta, w_eta) in &rule_1d {
            points.push(GaussPoint::new([xi, eta], w_xi * w_eta));
        }
    }

    points
}

/// Triangle quadrature points on the reference triangle (-1,-1), (1,-1), (-1,1).
///
/// Collapsed (Duffy) tensor rule: the square [-1, 1]² is mapped onto the
/// triangle by `x = (1 + u)(1 - v)/2 - 1`, `y = v`. Weights sum to the
/// triangle area 2. Returns n² points, exact for degree `2n - 2`.
pub fn gauss_tri(n: usize) -> Vec<GaussPoint> {
    let rule_1d = gauss_1d(n);
    let mut points = Vec::with_capacity(n * n);

    for &(u, w_u) in &rule_1d {
        for &(v, w_v) in &rule_1d {
            let x = 0.5 * (1.0 + u) * (1.0 - v) - 1.0;
            points.push(GaussPoint::new([x, v], w_u * w_v * 0.5 * (1.0 - v)));
        }
    }

    points
}

/// Number of points per direction that integrates a stiffness term of
/// polynomial order `order` with margin for non-affine quadrilaterals.
pub fn points_for_order(order: usize) -> usize {
    (order + 2).min(MAX_POINTS)
}
