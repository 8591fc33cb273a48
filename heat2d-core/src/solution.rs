//! Solutions reconstructed from coefficient vectors.

use crate::element::{RefMap, ShapeFn};
use crate::error::{Error, Result};
use crate::space::Space;
use crate::types::{ElementKind, Point2};

/// Field restricted to one active element.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementField {
    pub element_id: usize,
    pub order: usize,
    pub map: RefMap,
    shapes: Vec<ShapeFn>,
    coeffs: Vec<f64>,
}

impl ElementField {
    pub fn kind(&self) -> ElementKind {
        self.map.kind()
    }

    /// Value at reference coordinates.
    pub fn value(&self, xi: f64, eta: f64) -> f64 {
        let kind = self.kind();
        self.shapes
            .iter()
            .zip(&self.coeffs)
            .map(|(s, c)| c * s.value(kind, xi, eta))
            .sum()
    }

    /// Reference points of a uniform `n x n` sampling grid, element vertices included.
    pub fn sample_points(&self, n: usize) -> Vec<[f64; 2]> {
        let n = n.max(2);
        let step = 2.0 / (n - 1) as f64;
        let mut points = Vec::with_capacity(n * n);
        for i in 0..n {
            for j in 0..n {
                let (xi, eta) = (-1.0 + i as f64 * step, -1.0 + j as f64 * step);
                if self.map.contains_reference(xi, eta) {
                    points.push([xi, eta]);
                }
            }
        }
        points
    }
}

/// Scalar field over the active elements of a space.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    elements: Vec<ElementField>,
}

impl Solution {
    /// Build the field of coefficient vector `coeffs` over `space`.
    pub fn vector_to_solution(coeffs: &[f64], space: &Space) -> Result<Solution> {
        if coeffs.len() != space.num_dofs() {
            return Err(Error::State(format!(
                "coefficient vector has {} entries, space has {} DOFs",
                coeffs.len(),
                space.num_dofs()
            )));
        }
        let elements = space
            .asm_lists()
            .iter()
            .map(|list| ElementField {
                element_id: list.element_id,
                order: list.order,
                map: list.map.clone(),
                shapes: list.shapes.clone(),
                coeffs: list.local_coefficients(coeffs),
            })
            .collect();
        Ok(Solution { elements })
    }

    /// Per-element fields, in element id order.
    pub fn elements(&self) -> &[ElementField] {
        &self.elements
    }

    /// Value at a physical point, if it lies in the mesh.
    pub fn value(&self, x: f64, y: f64) -> Option<f64> {
        let point = Point2::new(x, y);
        self.elements.iter().find_map(|field| {
            field
                .map
                .inverse(&point)
                .map(|(xi, eta)| field.value(xi, eta))
        })
    }

    /// Value at reference coordinates of one element.
    pub fn value_in_element(&self, element_id: usize, xi: f64, eta: f64) -> Option<f64> {
        let idx = self
            .elements
            .binary_search_by_key(&element_id, |f| f.element_id)
            .ok()?;
        Some(self.elements[idx].value(xi, eta))
    }

    /// Smallest and largest sampled value.
    pub fn min_max(&self) -> (f64, f64) {
        let mut range = (f64::INFINITY, f64::NEG_INFINITY);
        for field in &self.elements {
            for [xi, eta] in field.sample_points(field.order + 2) {
                let v = field.value(xi, eta);
                range.0 = range.0.min(v);
                range.1 = range.1.max(v);
            }
        }
        range
    }
}
