//! The stationary heat-transfer run.
//!
//! Load → refine → space → independent copy → per-element orders → DOF
//! report → solve → reconstruct → VTK / views. Everything up to the DOF
//! report propagates errors; the solve and its outputs are captured in
//! [`PipelineReport::solve`] so the caller decides how a failed solve ends
//! the process. A failing output sink is logged and recorded without
//! stopping the others.

use crate::config::Config;
use crate::error::Result;
use crate::linear::LinearSolver;
use crate::mesh::{Mesh, MeshReaderXml};
use crate::solution::Solution;
use crate::space::Space;
use crate::views::{wait_for_close, OrderView, ScalarView, ViewWindow};
use crate::vtk::{Linearizer, Orderizer};
use crate::weakform::WeakForm;
use std::fs;
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// DOF counts of the final space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DofCounts {
    pub num_dofs: usize,
    pub vertex: usize,
    pub edge: usize,
    pub bubble: usize,
}

impl DofCounts {
    pub fn of(space: &Space) -> Self {
        Self {
            num_dofs: space.num_dofs(),
            vertex: space.vertex_functions_count(),
            edge: space.edge_functions_count(),
            bubble: space.bubble_functions_count(),
        }
    }
}

/// Outcome of a successful solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveSummary {
    pub n_dofs: usize,
    pub min: f64,
    pub max: f64,
    /// VTK files written.
    pub written: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct PipelineReport {
    pub dofs: DofCounts,
    /// Polynomial order of each active element, in id order.
    pub orders: Vec<usize>,
    /// Failures of output sinks, in the order they happened.
    pub sink_errors: Vec<crate::Error>,
    pub solve: Result<SolveSummary>,
}

/// Terminal the run reports to; views block on `input`.
pub struct Frontend<R, W> {
    pub input: R,
    pub output: W,
}

/// Run against the process terminal.
pub fn run(config: &Config) -> Result<PipelineReport> {
    let stdin = std::io::stdin();
    run_with(
        config,
        Frontend {
            input: stdin.lock(),
            output: std::io::stdout(),
        },
    )
}

pub fn run_with<R: BufRead, W: Write>(
    config: &Config,
    mut frontend: Frontend<R, W>,
) -> Result<PipelineReport> {
    config.validate()?;
    let weak_form = config.weak_form()?;

    let space = build_space(config)?;
    weak_form.conductivity_by_marker(space.mesh())?;

    let dofs = DofCounts::of(&space);
    log::info!(
        "{} DOFs ({} vertex, {} edge, {} bubble)",
        dofs.num_dofs,
        dofs.vertex,
        dofs.edge,
        dofs.bubble
    );
    writeln!(
        frontend.output,
        "{}\n{}\n{}\n{}",
        dofs.num_dofs, dofs.vertex, dofs.edge, dofs.bubble
    )?;

    let mut sink_errors = Vec::new();
    if config.viewer {
        let view = OrderView::new(ViewWindow::new("Element orders", config.view_columns, 60));
        let shown = view
            .show(&space, &mut frontend.output)
            .and_then(|_| wait_for_close(&mut frontend.input, &mut frontend.output));
        if let Err(e) = shown {
            log::error!("order view failed: {e}");
            sink_errors.push(e);
        }
    }

    let solve = solve_and_output(config, &weak_form, &space, &mut frontend, &mut sink_errors);
    if let Err(e) = &solve {
        log::error!("solve failed: {e}");
    }

    Ok(PipelineReport {
        orders: space
            .active_element_ids()
            .into_iter()
            .filter_map(|id| space.element_order(id))
            .collect(),
        dofs,
        sink_errors,
        solve,
    })
}

/// Load and refine the mesh, then build the space the rest of the run uses.
///
/// The space is copied onto a mesh of its own and the original pair is
/// dropped before returning.
pub fn build_space(config: &Config) -> Result<Space> {
    let reader = MeshReaderXml::new();
    let mut mesh = reader.load(&config.mesh)?;
    log::info!(
        "loaded {} with {} elements",
        config.mesh.display(),
        mesh.n_elements()
    );
    if let Some(path) = &config.save_mesh {
        reader.save(path, &mesh)?;
    }

    refine(&mut mesh, config)?;

    let mut space = {
        let original = Space::new(mesh, config.essential_bcs(), config.p_init)?;
        let target = original.mesh().clone();
        original.copy_onto(target)?
    };

    if config.cycle_orders {
        cycle_orders(&mut space)?;
    }
    Ok(space)
}

fn refine(mesh: &mut Mesh, config: &Config) -> Result<()> {
    mesh.refine_in_areas(&config.refine_regions, config.init_ref_num)?;
    for region in &config.extra_refine_regions {
        mesh.refine_in_area(region)?;
    }
    log::info!("{} active elements after refinement", mesh.n_active_elements());
    Ok(())
}

/// Orders 2, 3, 4, 1, 2, ... over the active elements in id order.
pub fn cycle_orders(space: &mut Space) -> Result<()> {
    for (i, id) in space.active_element_ids().into_iter().enumerate() {
        space.set_element_order(id, (i + 1) % 4 + 1)?;
    }
    Ok(())
}

fn solve_and_output<R: BufRead, W: Write>(
    config: &Config,
    weak_form: &WeakForm,
    space: &Space,
    frontend: &mut Frontend<R, W>,
    sink_errors: &mut Vec<crate::Error>,
) -> Result<SolveSummary> {
    let mut solver = LinearSolver::new(weak_form, space)?.with_config(config.solver.clone());
    solver.solve()?;
    let sln = Solution::vector_to_solution(solver.sln_vector()?, space)?;
    let (min, max) = sln.min_max();
    log::info!("temperature range [{min:.4}, {max:.4}]");

    let mut written = Vec::new();
    if config.vtk {
        if let Err(e) = write_vtk(config, space, &sln, &mut written) {
            log::error!("VTK output failed: {e}");
            sink_errors.push(e);
        }
    }

    if config.viewer {
        let view = ScalarView::new(ViewWindow::new("Solution", config.view_columns, 60));
        let shown = view
            .show(&sln, &mut frontend.output)
            .and_then(|_| wait_for_close(&mut frontend.input, &mut frontend.output));
        if let Err(e) = shown {
            log::error!("solution view failed: {e}");
            sink_errors.push(e);
        }
    }

    Ok(SolveSummary {
        n_dofs: space.num_dofs(),
        min,
        max,
        written,
    })
}

fn write_vtk(
    config: &Config,
    space: &Space,
    sln: &Solution,
    written: &mut Vec<PathBuf>,
) -> Result<()> {
    fs::create_dir_all(&config.output_dir)?;

    let path = config.output_dir.join("sln.vtk");
    Linearizer::new().save_solution_vtk(
        sln,
        &path,
        "Temperature",
        config.vtk_3d,
        config.vtk_accuracy.into(),
    )?;
    written.push(path);

    let orderizer = Orderizer::new();
    let path = config.output_dir.join("mesh.vtk");
    orderizer.save_mesh_vtk(space, &path)?;
    written.push(path);

    let path = config.output_dir.join("ord.vtk");
    orderizer.save_orders_vtk(space, &path)?;
    written.push(path);
    Ok(())
}
