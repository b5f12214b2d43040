use std::sync::Arc;

use super::{dot, sum_mag, Solver, SolverPerformance};
use crate::config::{SolverConfig, SolverControls};
use crate::matrix::LduMatrix;
use crate::preconditioners::{new_preconditioner, Preconditioner};
use crate::registry::UnknownTypeError;
use crate::GREAT;

/// Preconditioned bi-conjugate gradient for asymmetric matrices, iterating
/// the transposed system alongside the primal one.
pub struct PBiCg {
    matrix: Arc<LduMatrix>,
    preconditioner: Box<dyn Preconditioner>,
    field_name: String,
    controls: SolverControls,
    w: Vec<f64>,
    w_t: Vec<f64>,
    r: Vec<f64>,
    r_t: Vec<f64>,
    p: Vec<f64>,
    p_t: Vec<f64>,
}

impl PBiCg {
    pub fn new(matrix: Arc<LduMatrix>, config: &SolverConfig) -> Result<Self, UnknownTypeError> {
        let preconditioner = new_preconditioner(Arc::clone(&matrix), config)?;
        let n = matrix.n_cells();
        Ok(Self {
            matrix,
            preconditioner,
            field_name: config.field_name.clone(),
            controls: config.controls,
            w: vec![0.0; n],
            w_t: vec![0.0; n],
            r: vec![0.0; n],
            r_t: vec![0.0; n],
            p: vec![0.0; n],
            p_t: vec![0.0; n],
        })
    }
}

impl Solver for PBiCg {
    fn name(&self) -> &str {
        "PBiCG"
    }

    fn solve(&mut self, x: &mut [f64], b: &[f64]) -> SolverPerformance {
        let mut perf = SolverPerformance::new(self.name(), &self.field_name);
        let matrix = &self.matrix;
        let controls = &self.controls;
        let n = matrix.n_cells();

        matrix.amul(&mut self.w, x);
        for (cell, ri) in self.r.iter_mut().enumerate() {
            *ri = b[cell] - self.w[cell];
        }
        // shadow residual of the transposed system
        self.r_t.copy_from_slice(&self.r);

        let norm_factor = matrix.norm_factor(x, b, &self.w);
        perf.initial_residual = sum_mag(&self.r) / norm_factor;
        perf.final_residual = perf.initial_residual;

        if controls.min_iter > 0 || !perf.check_convergence(controls) {
            let mut w_r_t = GREAT;
            loop {
                let w_r_t_old = w_r_t;
                self.preconditioner.precondition(&mut self.w, &self.r);
                self.preconditioner
                    .precondition_transpose(&mut self.w_t, &self.r_t);
                w_r_t = dot(&self.w, &self.r_t);

                if perf.n_iterations == 0 {
                    self.p.copy_from_slice(&self.w);
                    self.p_t.copy_from_slice(&self.w_t);
                } else {
                    let beta = w_r_t / w_r_t_old;
                    for cell in 0..n {
                        self.p[cell] = self.w[cell] + beta * self.p[cell];
                        self.p_t[cell] = self.w_t[cell] + beta * self.p_t[cell];
                    }
                }

                matrix.amul(&mut self.w, &self.p);
                matrix.tmul(&mut self.w_t, &self.p_t);
                let w_p_t = dot(&self.w, &self.p_t);

                if perf.check_singularity(w_p_t.abs() / norm_factor) {
                    break;
                }

                let alpha = w_r_t / w_p_t;
                for cell in 0..n {
                    x[cell] += alpha * self.p[cell];
                    self.r[cell] -= alpha * self.w[cell];
                    self.r_t[cell] -= alpha * self.w_t[cell];
                }
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
