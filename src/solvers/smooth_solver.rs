use std::sync::Arc;

use super::{sum_mag, Solver, SolverPerformance};
use crate::config::{SolverConfig, SolverControls};
use crate::matrix::LduMatrix;
use crate::registry::UnknownTypeError;
use crate::smoothers::{self, Smoother};

/// Iterative solver that just applies a smoother until the residual controls
/// are met, checking convergence every `n_sweeps` sweeps.
pub struct SmoothSolver {
    matrix: Arc<LduMatrix>,
    smoother: Box<dyn Smoother>,
    field_name: String,
    controls: SolverControls,
    n_sweeps: usize,
    r: Vec<f64>,
    ax: Vec<f64>,
}

impl SmoothSolver {
    pub fn new(matrix: Arc<LduMatrix>, config: &SolverConfig) -> Result<Self, UnknownTypeError> {
        let registry = smoothers::standard();
        let factory = registry.get(&config.smoother)?;
        let smoother = factory(Arc::clone(&matrix));
        let n = matrix.n_cells();
        Ok(Self {
            matrix,
            smoother,
            field_name: config.field_name.clone(),
            controls: config.controls,
            n_sweeps: config.n_sweeps.max(1),
            r: vec![0.0; n],
            ax: vec![0.0; n],
        })
    }
}

impl Solver for SmoothSolver {
    fn name(&self) -> &str {
        "smoothSolver"
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
                self.smoother.smooth(x, b, self.n_sweeps);
                matrix.residual(&mut self.r, x, b);
                perf.final_residual = sum_mag(&self.r) / norm_factor;

                perf.n_iterations += self.n_sweeps;
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
