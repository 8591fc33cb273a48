//! Linear problem driver: assemble and solve one stationary problem.

use crate::assembly::{assemble, AssemblyOptions};
use crate::error::{Error, Result};
use crate::solver::{residual_norm, select_solver, SolverConfig};
use crate::space::Space;
use crate::weakform::WeakForm;
use std::time::Instant;

/// Assembles the weak form over a space and solves for the coefficients.
#[derive(Debug)]
pub struct LinearSolver<'a> {
    weak_form: &'a WeakForm,
    space: &'a Space,
    config: SolverConfig,
    solution: Option<Vec<f64>>,
}

impl<'a> LinearSolver<'a> {
    /// Bind a weak form to a space.
    ///
    /// Fails if the weak form's regions do not match the space's mesh.
    pub fn new(weak_form: &'a WeakForm, space: &'a Space) -> Result<Self> {
        weak_form.conductivity_by_marker(space.mesh())?;
        Ok(Self {
            weak_form,
            space,
            config: SolverConfig::default(),
            solution: None,
        })
    }

    /// Replace the solver configuration.
    pub fn with_config(mut self, config: SolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn space(&self) -> &Space {
        self.space
    }

    /// Assemble and solve. Any previous solution is discarded first.
    pub fn solve(&mut self) -> Result<()> {
        self.solution = None;
        let start = Instant::now();

        let system = assemble(
            self.weak_form,
            self.space,
            &AssemblyOptions {
                n_threads: self.config.num_threads,
            },
        )?;
        let solver = select_solver(&self.config);
        let x = solver.solve(&system.stiffness, &system.rhs)?;
        if x.len() != self.space.num_dofs() {
            return Err(Error::Solver(format!(
                "solution has {} entries for {} DOFs",
                x.len(),
                self.space.num_dofs()
            )));
        }

        log::info!(
            "solved {} DOFs with {} in {:.3}s (residual {:.3e})",
            system.n_dofs,
            solver.name(),
            start.elapsed().as_secs_f64(),
            residual_norm(&system.stiffness, &x, &system.rhs)
        );
        self.solution = Some(x);
        Ok(())
    }

    /// Coefficient vector of the last successful solve.
    pub fn sln_vector(&self) -> Result<&[f64]> {
        self.solution
            .as_deref()
            .ok_or_else(|| Error::State("no solution available, call solve() first".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bc::{EssentialBc, EssentialBcs};
    use crate::mesh::tests::two_quads;
    use crate::solver::SolverBackend;
    use approx::assert_relative_eq;

    fn weak_form(src: f64) -> WeakForm {
        WeakForm::new(src)
            .with_region("Left", 1.0)
            .unwrap()
            .with_region("Right", 5.0)
            .unwrap()
    }

    #[test]
    fn test_sln_vector_before_solve() {
        let space = Space::new(two_quads(), EssentialBcs::new(), 2).unwrap();
        let wf = weak_form(1.0);
        let solver = LinearSolver::new(&wf, &space).unwrap();
        assert!(matches!(solver.sln_vector(), Err(Error::State(_))));
    }

    #[test]
    fn test_constant_dirichlet_without_source() {
        let bcs = EssentialBcs::new().with(EssentialBc::constant(&["Wall"], 20.0));
        let mut mesh = two_quads();
        mesh.refine_all_elements().unwrap();
        let space = Space::new(mesh, bcs, 2).unwrap();
        let wf = weak_form(0.0);
        let mut solver = LinearSolver::new(&wf, &space).unwrap();
        solver.solve().unwrap();

        let x = solver.sln_vector().unwrap();
        assert_eq!(x.len(), space.num_dofs());
        // Vertex coefficients carry the constant, higher functions vanish
        for (i, v) in x.iter().enumerate() {
            let expected = if i < space.vertex_functions_count() { 20.0 } else { 0.0 };
            assert_relative_eq!(*v, expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_backends_give_same_solution() {
        let bcs = EssentialBcs::new().with(EssentialBc::constant(&["Wall"], 20.0));
        let mut mesh = two_quads();
        mesh.refine_element(1).unwrap();
        let space = Space::new(mesh, bcs, 3).unwrap();
        let wf = weak_form(100.0);

        let mut cholesky = LinearSolver::new(&wf, &space).unwrap();
        cholesky.solve().unwrap();
        let mut lu = LinearSolver::new(&wf, &space).unwrap().with_config(SolverConfig {
            backend: SolverBackend::DenseLu,
            num_threads: 1,
        });
        lu.solve().unwrap();

        for (a, b) in cholesky.sln_vector().unwrap().iter().zip(lu.sln_vector().unwrap()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-8, max_relative = 1e-10);
        }
    }

    #[test]
    fn test_all_dofs_fixed_is_a_solver_failure() {
        // Linear elements with every vertex on the wall leave no unknowns
        let bcs = EssentialBcs::new().with(EssentialBc::constant(&["Wall"], 20.0));
        let space = Space::new(two_quads(), bcs, 1).unwrap();
        let wf = weak_form(1.0);
        let mut solver = LinearSolver::new(&wf, &space).unwrap();
        let err = solver.solve().unwrap_err();
        assert!(err.is_solver_failure());
        assert!(matches!(solver.sln_vector(), Err(Error::State(_))));
    }

    #[test]
    fn test_unknown_region_in_weak_form() {
        let space = Space::new(two_quads(), EssentialBcs::new(), 1).unwrap();
        let wf = weak_form(1.0).with_region("Copper", 1.0).unwrap();
        assert!(matches!(LinearSolver::new(&wf, &space), Err(Error::Config(_))));
    }
}
