//! Weak form of stationary heat conduction.
//!
//! ```text
//! ∫ λ_r ∇u · ∇v dx = ∫ q v dx
//! ```
//!
//! with a constant conductivity `λ_r` per material region and one global
//! volumetric source `q`.

use crate::error::{Error, Result};
use crate::mesh::Mesh;
use std::collections::BTreeMap;

/// Per-region conductivities and a volumetric heat source.
#[derive(Debug, Clone, PartialEq)]
pub struct WeakForm {
    conductivities: BTreeMap<String, f64>,
    volume_heat_src: f64,
}

impl WeakForm {
    /// Weak form with the given source and no regions yet.
    pub fn new(volume_heat_src: f64) -> Self {
        Self {
            conductivities: BTreeMap::new(),
            volume_heat_src,
        }
    }

    /// Add (or replace) the conductivity of a region.
    pub fn with_region(mut self, region: &str, conductivity: f64) -> Result<Self> {
        if !conductivity.is_finite() || conductivity <= 0.0 {
            return Err(Error::Config(format!(
                "conductivity of region '{}' must be positive, got {}",
                region, conductivity
            )));
        }
        self.conductivities.insert(region.to_string(), conductivity);
        Ok(self)
    }

    pub fn volume_heat_src(&self) -> f64 {
        self.volume_heat_src
    }

    pub fn conductivity(&self, region: &str) -> Option<f64> {
        self.conductivities.get(region).copied()
    }

    pub fn regions(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.conductivities.iter().map(|(k, &v)| (k.as_str(), v))
    }

    /// Conductivity per region marker index of `mesh`.
    ///
    /// Fails if a region of the form is not in the mesh, if the source is not
    /// finite, or if an active element's region has no conductivity.
    pub fn conductivity_by_marker(&self, mesh: &Mesh) -> Result<Vec<Option<f64>>> {
        if !self.volume_heat_src.is_finite() {
            return Err(Error::Config(format!(
                "volumetric heat source {} is not finite",
                self.volume_heat_src
            )));
        }
        for region in self.conductivities.keys() {
            if mesh.regions().find(region).is_none() {
                return Err(Error::Config(format!(
                    "region '{}' does not exist in the mesh",
                    region
                )));
            }
        }
        let table: Vec<Option<f64>> = mesh
            .regions()
            .names()
            .iter()
            .map(|name| self.conductivity(name))
            .collect();
        if let Some(e) = mesh.active_elements().find(|e| table[e.marker].is_none()) {
            return Err(Error::Config(format!(
                "region '{}' has no conductivity",
                mesh.region_of(e)
            )));
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::tests::two_quads;

    #[test]
    fn test_with_region() {
        let wf = WeakForm::new(500.0)
            .with_region("Aluminum", 236.0)
            .unwrap()
            .with_region("Copper", 386.0)
            .unwrap();
        assert_eq!(wf.conductivity("Copper"), Some(386.0));
        assert_eq!(wf.conductivity("Steel"), None);
        assert_eq!(wf.volume_heat_src(), 500.0);
    }

    #[test]
    fn test_invalid_conductivity() {
        assert!(WeakForm::new(0.0).with_region("A", 0.0).is_err());
        assert!(WeakForm::new(0.0).with_region("A", -1.0).is_err());
        assert!(WeakForm::new(0.0).with_region("A", f64::INFINITY).is_err());
    }

    #[test]
    fn test_conductivity_by_marker() {
        let mesh = two_quads();
        let wf = WeakForm::new(1.0)
            .with_region("Left", 2.0)
            .unwrap()
            .with_region("Right", 3.0)
            .unwrap();
        assert_eq!(wf.conductivity_by_marker(&mesh).unwrap(), vec![Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_unknown_and_missing_regions() {
        let mesh = two_quads();
        let unknown = WeakForm::new(1.0)
            .with_region("Left", 2.0)
            .unwrap()
            .with_region("Right", 3.0)
            .unwrap()
            .with_region("Copper", 1.0)
            .unwrap();
        assert!(matches!(unknown.conductivity_by_marker(&mesh), Err(Error::Config(_))));

        let missing = WeakForm::new(1.0).with_region("Left", 2.0).unwrap();
        assert!(matches!(missing.conductivity_by_marker(&mesh), Err(Error::Config(_))));
    }
}
