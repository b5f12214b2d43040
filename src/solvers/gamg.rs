use std::sync::{Arc, Mutex};

use super::{sum_mag, Solver, SolverPerformance};
use crate::config::{SolverConfig, SolverControls};
use crate::gamg::{GamgCycle, GamgHierarchy};
use crate::matrix::LduMatrix;
use crate::proc::{CommPool, ProcTopology};
use crate::registry::UnknownTypeError;

/// Geometric-algebraic multigrid as an outer solver: one V-cycle per
/// iteration, with the usual residual controls between cycles. The
/// agglomeration hierarchy is built once at construction and reused across
/// solves.
pub struct GamgSolver {
    matrix: Arc<LduMatrix>,
    cycle: GamgCycle,
    field_name: String,
    controls: SolverControls,
    r: Vec<f64>,
    ax: Vec<f64>,
}

impl GamgSolver {
    pub fn new(matrix: Arc<LduMatrix>, config: &SolverConfig) -> Result<Self, UnknownTypeError> {
        let hierarchy = GamgHierarchy::build(Arc::clone(&matrix), &config.gamg);
        Self::with_hierarchy(matrix, config, hierarchy)
    }

    /// Builds the solver for one partition of a distributed case, applying
    /// the configured processor agglomeration policy while coarsening.
    pub fn new_distributed(
        matrix: Arc<LduMatrix>,
        config: &SolverConfig,
        topology: &ProcTopology,
        pool: Arc<Mutex<CommPool>>,
    ) -> Result<Self, UnknownTypeError> {
        let hierarchy =
            GamgHierarchy::build_distributed(Arc::clone(&matrix), &config.gamg, topology, pool)?;
        Self::with_hierarchy(matrix, config, hierarchy)
    }

    fn with_hierarchy(
        matrix: Arc<LduMatrix>,
        config: &SolverConfig,
        hierarchy: GamgHierarchy,
    ) -> Result<Self, UnknownTypeError> {
        let cycle = GamgCycle::new(hierarchy, &config.gamg)?;
        let n = matrix.n_cells();
        Ok(Self {
            matrix,
            cycle,
            field_name: config.field_name.clone(),
            controls: config.controls,
            r: vec![0.0; n],
            ax: vec![0.0; n],
        })
    }

    pub fn hierarchy(&self) -> &GamgHierarchy {
        self.cycle.hierarchy()
    }
}

impl Solver for GamgSolver {
    fn name(&self) -> &str {
        "GAMG"
    }

    fn solve(&mut self, x: &mut [f64], b: &[f64]) -> SolverPerformance {
        let mut perf = SolverPerformance::new(self.name(), &self.field_name);
        let matrix = &self.matrix;
        let controls = &self.controls;

        matrix.amul(&mut self.ax, x);
        for (cell, ri) in self.r.iter_mut().enumerate() {
            *ri = b[cell] - self.ax[cell];
        }

        let norm_factor = matrix.norm_factor(x, b, &self.ax);
        perf.initial_residual = sum_mag(&self.r) / norm_factor;
        perf.final_residual = perf.initial_residual;

        if controls.min_iter > 0 || !perf.check_convergence(controls) {
            loop {
                self.cycle.vcycle(x, b);
                matrix.residual(&mut self.r, x, b);
                perf.final_residual = sum_mag(&self.r) / norm_factor;

                perf.n_iterations += 1;
                let keep_going = (perf.n_iterations < controls.max_iter
                    && !perf.check_convergence(controls))
                    || perf.n_iterations < controls.min_iter;
                if !keep_going {
                    break;
                }
            }
        }

        perf.report();
        perf
    }
}
