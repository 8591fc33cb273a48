//! Run configuration of the heat-transfer pipeline.
//!
//! Every field has a default, so a JSON file only needs to name the values
//! it changes.

use crate::bc::{EssentialBc, EssentialBcs};
use crate::error::{Error, Result};
use crate::solver::SolverConfig;
use crate::types::is_valid_order;
use crate::vtk::Epsilon;
use crate::weakform::WeakForm;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Thermal conductivity of one mesh region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionConfig {
    pub name: String,
    pub conductivity: f64,
}

impl RegionConfig {
    pub fn new(name: impl Into<String>, conductivity: f64) -> Self {
        Self {
            name: name.into(),
            conductivity,
        }
    }
}

/// Linearization accuracy as written in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VtkAccuracy {
    #[default]
    Low,
    Normal,
    High,
    VeryHigh,
}

impl From<VtkAccuracy> for Epsilon {
    fn from(a: VtkAccuracy) -> Self {
        match a {
            VtkAccuracy::Low => Epsilon::Low,
            VtkAccuracy::Normal => Epsilon::Normal,
            VtkAccuracy::High => Epsilon::High,
            VtkAccuracy::VeryHigh => Epsilon::VeryHigh,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Mesh file in the XML format.
    pub mesh: PathBuf,
    /// Write the loaded mesh back to this file before refining.
    pub save_mesh: Option<PathBuf>,
    /// Directory of the VTK outputs.
    pub output_dir: PathBuf,

    /// Show terminal views and wait for Enter.
    pub viewer: bool,
    /// Write `sln.vtk`, `mesh.vtk` and `ord.vtk`.
    pub vtk: bool,
    pub vtk_accuracy: VtkAccuracy,
    /// Use the solution value as z coordinate in `sln.vtk`.
    pub vtk_3d: bool,
    /// Width of the terminal views in characters.
    pub view_columns: usize,

    pub p_init: usize,
    /// Passes of refinement over `refine_regions`.
    pub init_ref_num: usize,
    pub refine_regions: Vec<String>,
    /// Regions refined once more after the initial passes.
    pub extra_refine_regions: Vec<String>,
    /// Assign orders 2, 3, 4, 1, ... to the active elements in id order.
    pub cycle_orders: bool,

    pub regions: Vec<RegionConfig>,
    pub volume_heat_src: f64,
    pub fixed_bdy_temp: f64,
    pub fixed_bdy_markers: Vec<String>,

    pub solver: SolverConfig,
    /// Exit with a failure status when the solve fails.
    pub strict_exit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mesh: PathBuf::from("domain.xml"),
            save_mesh: None,
            output_dir: PathBuf::from("."),
            viewer: true,
            vtk: false,
            vtk_accuracy: VtkAccuracy::Low,
            vtk_3d: false,
            view_columns: 80,
            p_init: 2,
            init_ref_num: 1,
            refine_regions: vec!["Aluminum".into(), "Copper".into()],
            extra_refine_regions: vec!["Aluminum".into()],
            cycle_orders: true,
            regions: vec![
                RegionConfig::new("Aluminum", 236.0),
                RegionConfig::new("Copper", 386.0),
            ],
            volume_heat_src: 500.0,
            fixed_bdy_temp: 20.0,
            fixed_bdy_markers: ["Bottom", "Inner", "Outer", "Left"]
                .into_iter()
                .map(String::from)
                .collect(),
            solver: SolverConfig::default(),
            strict_exit: false,
        }
    }
}

impl Config {
    /// Read a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Check values that do not depend on the mesh.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_order(self.p_init) {
            return Err(Error::Config(format!(
                "p_init = {} is outside the supported order range",
                self.p_init
            )));
        }
        if self.view_columns == 0 {
            return Err(Error::Config("view_columns must be positive".into()));
        }
        if !self.fixed_bdy_temp.is_finite() {
            return Err(Error::Config("fixed_bdy_temp must be finite".into()));
        }
        Ok(())
    }

    pub fn weak_form(&self) -> Result<WeakForm> {
        self.regions
            .iter()
            .try_fold(WeakForm::new(self.volume_heat_src), |wf, r| {
                wf.with_region(&r.name, r.conductivity)
            })
    }

    pub fn essential_bcs(&self) -> EssentialBcs {
        if self.fixed_bdy_markers.is_empty() {
            return EssentialBcs::new();
        }
        EssentialBcs::new().with(EssentialBc::constant(
            &self.fixed_bdy_markers,
            self.fixed_bdy_temp,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::SolverBackend;
    use approx::assert_relative_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.viewer);
        assert!(!config.vtk);
        assert_eq!(config.p_init, 2);
        assert_eq!(config.init_ref_num, 1);
        assert_eq!(config.solver.num_threads, 8);
        assert!(!config.strict_exit);
        config.validate().unwrap();

        let wf = config.weak_form().unwrap();
        assert_relative_eq!(wf.conductivity("Aluminum").unwrap(), 236.0);
        assert_relative_eq!(wf.conductivity("Copper").unwrap(), 386.0);
        assert_relative_eq!(wf.volume_heat_src(), 500.0);

        let bcs = config.essential_bcs();
        assert_eq!(bcs.value_on("Inner"), Some(20.0));
        assert_eq!(bcs.value_on("Wall"), None);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"p_init": 3, "vtk": true, "solver": {{"backend": "dense_lu"}}}}"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.p_init, 3);
        assert!(config.vtk);
        assert_eq!(config.solver.backend, SolverBackend::DenseLu);
        assert_eq!(config.solver.num_threads, 8);
        assert_eq!(config.regions.len(), 2);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.vtk_accuracy = VtkAccuracy::VeryHigh;
        config.save_mesh = Some(PathBuf::from("saved.xml"));
        config.to_file(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_bad_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(Config::from_file(file.path()), Err(Error::Json(_))));
        assert!(matches!(
            Config::from_file("/nonexistent/config.json"),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_invalid_values() {
        let config = Config {
            p_init: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = Config {
            regions: vec![RegionConfig::new("Aluminum", -1.0)],
            ..Config::default()
        };
        assert!(matches!(config.weak_form(), Err(Error::Config(_))));
    }
}
