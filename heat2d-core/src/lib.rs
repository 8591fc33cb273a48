//! Heat2D Core - stationary heat transfer with hierarchic finite elements
//!
//! Solves `-div(λ ∇u) = q` on 2D meshes of triangles and quadrilaterals with:
//! - XML mesh loading, saving and red refinement with hanging nodes
//! - H1 spaces of hierarchic Lobatto functions with per-element orders
//! - Parallel assembly using Rayon
//! - Sparse Cholesky and dense LU solvers
//! - Legacy VTK export and terminal views
//!
//! # Architecture
//!
//! The run is a straight line of owned values:
//!
//! - [`Mesh`]: vertices, elements, regions and boundary markers
//! - [`Space`]: owns a mesh and the essential conditions, numbers the DOFs
//! - [`WeakForm`]: per-region conductivity and the volume source
//! - [`LinearSolver`]: assembles and solves, yields the coefficient vector
//! - [`Solution`]: the field rebuilt from the coefficients
//!
//! [`pipeline::run`] chains them as configured by [`Config`].

pub mod types;
pub mod element;
pub mod mesh;
pub mod bc;
pub mod weakform;
pub mod space;
pub mod sparse;
pub mod assembly;
pub mod solver;
pub mod linear;
pub mod solution;
pub mod vtk;
pub mod views;
pub mod config;
pub mod pipeline;
pub mod error;

pub use types::{ElementKind, Point2};
pub use mesh::{Mesh, MeshReaderXml};
pub use bc::{EssentialBc, EssentialBcs};
pub use weakform::WeakForm;
pub use space::Space;
pub use sparse::CsrMatrix;
pub use solver::{Solver, SolverBackend, SolverConfig};
pub use linear::LinearSolver;
pub use solution::Solution;
pub use config::Config;
pub use error::{Error, Result};
