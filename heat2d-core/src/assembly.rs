//! Parallel finite element assembly.
//!
//! Assembles the global stiffness matrix and load vector from element contributions
//! using Rayon for shared-memory parallelism. Dirichlet values enter through
//! the fixed terms of the assembly lists and are moved to the right-hand side.

use crate::element::element_matrices;
use crate::error::{Error, Result};
use crate::space::{AsmList, Dof, Space};
use crate::sparse::{CsrMatrix, TripletMatrix};
use crate::weakform::WeakForm;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

/// Assembled system ready for solving.
pub struct AssembledSystem {
    /// Global stiffness matrix.
    pub stiffness: CsrMatrix,
    /// Right-hand side (load) vector, Dirichlet lift included.
    pub rhs: Vec<f64>,
    /// Number of DOFs in the system.
    pub n_dofs: usize,
}

/// Assembly options.
#[derive(Debug, Clone, Default)]
pub struct AssemblyOptions {
    /// Number of parallel threads (0 = auto-detect).
    pub n_threads: usize,
}

/// Contribution of one element to the global system.
struct ElementContribution {
    triplets: Vec<(usize, usize, f64)>,
    rhs: Vec<(usize, f64)>,
}

/// Assemble global stiffness matrix and load vector.
///
/// Element matrices are computed in parallel on a pool of
/// `options.n_threads` threads and merged in element order, so the result
/// does not depend on scheduling.
///
/// # Example
///
/// ```ignore
/// use heat2d_core::assembly::{assemble, AssemblyOptions};
///
/// let system = assemble(&weak_form, &space, &AssemblyOptions { n_threads: 4 })?;
/// assert_eq!(system.rhs.len(), space.num_dofs());
/// ```
pub fn assemble(wf: &WeakForm, space: &Space, options: &AssemblyOptions) -> Result<AssembledSystem> {
    let conductivities = wf.conductivity_by_marker(space.mesh())?;
    let n_dofs = space.num_dofs();
    if n_dofs == 0 {
        return Err(Error::Assembly("the system has no unknowns".into()));
    }
    let source = wf.volume_heat_src();

    let pool = ThreadPoolBuilder::new()
        .num_threads(options.n_threads)
        .build()
        .map_err(|e| Error::Assembly(format!("cannot create thread pool: {e}")))?;

    let contributions: Vec<ElementContribution> = pool.install(|| {
        space
            .asm_lists()
            .par_iter()
            .map(|list| -> Result<ElementContribution> {
                let conductivity = conductivities
                    .get(list.marker)
                    .copied()
                    .flatten()
                    .ok_or_else(|| {
                        Error::Config(format!(
                            "element {} has no conductivity",
                            list.element_id
                        ))
                    })?;
                Ok(element_contribution(list, conductivity, source))
            })
            .collect::<Result<Vec<_>>>()
    })?;

    // Estimate non-zeros from the element contributions
    let nnz_estimate = contributions.iter().map(|c| c.triplets.len()).sum();
    let mut triplet = TripletMatrix::with_capacity(n_dofs, n_dofs, nnz_estimate);
    let mut rhs = vec![0.0; n_dofs];
    for contribution in &contributions {
        triplet.extend(&contribution.triplets);
        for &(row, value) in &contribution.rhs {
            rhs[row] += value;
        }
    }

    let stiffness = triplet.to_csr()?;
    if stiffness.values().iter().chain(&rhs).any(|v| !v.is_finite()) {
        return Err(Error::Assembly("non-finite entries in the assembled system".into()));
    }

    log::debug!(
        "assembled {} DOFs from {} elements, {} non-zeros",
        n_dofs,
        contributions.len(),
        stiffness.nnz()
    );

    Ok(AssembledSystem {
        stiffness,
        rhs,
        n_dofs,
    })
}

/// Scatter element matrices through the assembly list's expansion.
fn element_contribution(list: &AsmList, conductivity: f64, source: f64) -> ElementContribution {
    let m = element_matrices(&list.map, &list.shapes, list.order, conductivity, source);
    let n = list.shapes.len();
    let mut triplets = Vec::with_capacity(n * n);
    let mut rhs = Vec::with_capacity(n);

    for i in 0..n {
        for &(di, ci) in &list.terms[i] {
            let Dof::Free(row) = di else {
                continue;
            };
            rhs.push((row, ci * m.load[i]));
            for k in 0..n {
                let kik = ci * m.stiffness[(i, k)];
                for &(dk, ck) in &list.terms[k] {
                    match dk {
                        Dof::Free(col) => triplets.push((row, col, kik * ck)),
                        Dof::Fixed(g) => rhs.push((row, -kik * ck * g)),
                    }
                }
            }
        }
    }

    ElementContribution { triplets, rhs }
}
