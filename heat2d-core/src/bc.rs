//! Essential (Dirichlet) boundary conditions.
//!
//! Each condition fixes the temperature to a constant on a set of named
//! boundary markers. Markers without a condition get the natural
//! (zero-flux) condition.

use crate::error::{Error, Result};
use crate::mesh::Mesh;

/// Constant value on a set of boundary markers.
#[derive(Debug, Clone, PartialEq)]
pub struct EssentialBc {
    pub markers: Vec<String>,
    pub value: f64,
}

impl EssentialBc {
    /// Fixed value `value` on the given markers.
    pub fn constant<S: AsRef<str>>(markers: &[S], value: f64) -> Self {
        Self {
            markers: markers.iter().map(|m| m.as_ref().to_string()).collect(),
            value,
        }
    }
}

/// A set of essential boundary conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EssentialBcs {
    conditions: Vec<EssentialBc>,
}

impl EssentialBcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition.
    pub fn add(&mut self, bc: EssentialBc) {
        self.conditions.push(bc);
    }

    /// Builder form of [`EssentialBcs::add`].
    pub fn with(mut self, bc: EssentialBc) -> Self {
        self.add(bc);
        self
    }

    pub fn conditions(&self) -> &[EssentialBc] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Fixed value on a marker, if any. Later conditions override earlier ones.
    pub fn value_on(&self, marker: &str) -> Option<f64> {
        self.conditions
            .iter()
            .rev()
            .find(|bc| bc.markers.iter().any(|m| m == marker))
            .map(|bc| bc.value)
    }

    /// Check every marker exists in the mesh and every value is finite.
    pub fn validate(&self, mesh: &Mesh) -> Result<()> {
        for bc in &self.conditions {
            if !bc.value.is_finite() {
                return Err(Error::Config(format!(
                    "boundary value {} is not finite",
                    bc.value
                )));
            }
            for marker in &bc.markers {
                if mesh.boundary_markers().find(marker).is_none() {
                    return Err(Error::Config(format!(
                        "boundary marker '{}' does not exist in the mesh",
                        marker
                    )));
                }
            }
        }
        Ok(())
    }

    /// Fixed value per boundary marker index of `mesh`.
    pub(crate) fn values_by_marker(&self, mesh: &Mesh) -> Vec<Option<f64>> {
        mesh.boundary_markers()
            .names()
            .iter()
            .map(|name| self.value_on(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::tests::two_quads;

    #[test]
    fn test_value_on() {
        let bcs = EssentialBcs::new()
            .with(EssentialBc::constant(&["Bottom", "Left"], 20.0))
            .with(EssentialBc::constant(&["Left"], 30.0));
        assert_eq!(bcs.value_on("Bottom"), Some(20.0));
        assert_eq!(bcs.value_on("Left"), Some(30.0));
        assert_eq!(bcs.value_on("Top"), None);
    }

    #[test]
    fn test_validate_unknown_marker() {
        let mesh = two_quads();
        let ok = EssentialBcs::new().with(EssentialBc::constant(&["Wall"], 1.0));
        assert!(ok.validate(&mesh).is_ok());
        let bad = EssentialBcs::new().with(EssentialBc::constant(&["Outer"], 1.0));
        assert!(matches!(bad.validate(&mesh), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_non_finite_value() {
        let mesh = two_quads();
        let bad = EssentialBcs::new().with(EssentialBc::constant(&["Wall"], f64::NAN));
        assert!(matches!(bad.validate(&mesh), Err(Error::Config(_))));
    }
}
