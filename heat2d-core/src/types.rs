//! Core data types shared across the crate.
//!
//! - Geometric primitives (points in the plane)
//! - Element shapes
//! - Polynomial order bounds

use nalgebra::Vector2;

/// A point in the plane.
pub type Point2 = Vector2<f64>;

/// Lowest polynomial order of an H1 element.
pub const MIN_ORDER: usize = 1;

/// Highest polynomial order supported by the Lobatto shapeset.
pub const MAX_ORDER: usize = 10;

/// Supported element shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// 3-vertex triangle.
    Triangle,
    /// 4-vertex quadrilateral.
    Quad,
}

impl ElementKind {
    /// Number of vertices (and edges) of this shape.
    pub fn n_vertices(self) -> usize {
        match self {
            ElementKind::Triangle => 3,
            ElementKind::Quad => 4,
        }
    }

    /// Number of interior (bubble) functions at polynomial order `order`.
    pub fn n_bubbles(self, order: usize) -> usize {
        match self {
            ElementKind::Triangle if order >= 3 => (order - 1) * (order - 2) / 2,
            ElementKind::Triangle => 0,
            ElementKind::Quad if order >= 2 => (order - 1) * (order - 1),
            ElementKind::Quad => 0,
        }
    }

    /// VTK cell type code.
    pub fn vtk_cell_type(self) -> u8 {
        match self {
            ElementKind::Triangle => 5,
            ElementKind::Quad => 9,
        }
    }
}

/// Check a polynomial order against the supported range.
pub fn is_valid_order(order: usize) -> bool {
    (MIN_ORDER..=MAX_ORDER).contains(&order)
}
