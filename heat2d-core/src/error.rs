//! Error types for heat2d operations.

use thiserror::Error;

/// Result type alias using heat2d Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, discretising or solving a problem.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors (mesh files, VTK output).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed mesh file or mesh schema violation.
    #[error("mesh file format error: {0}")]
    FileFormat(String),

    /// Mesh topology errors (irregular refinement, unknown elements).
    #[error("mesh error: {0}")]
    Mesh(String),

    /// Names that reference nothing in the mesh, invalid coefficients.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file that is not valid JSON for [`crate::config::Config`].
    #[error("configuration file error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid polynomial orders or element ids in a space.
    #[error("space error: {0}")]
    Space(String),

    /// Assembly errors.
    #[error("assembly error: {0}")]
    Assembly(String),

    /// Solver errors.
    #[error("solver error: {0}")]
    Solver(String),

    /// Matrix singularity or conditioning issues.
    #[error("singular matrix: {0}")]
    SingularMatrix(String),

    /// Operation requested out of order, e.g. results before a solve.
    #[error("invalid state: {0}")]
    State(String),

    /// Viewer failures.
    #[error("view error: {0}")]
    View(String),
}

impl Error {
    /// Whether this error originates from assembling or solving the system.
    pub fn is_solver_failure(&self) -> bool {
        matches!(
            self,
            Error::Assembly(_) | Error::Solver(_) | Error::SingularMatrix(_)
        )
    }
}
