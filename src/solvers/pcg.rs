use std::sync::Arc;

use super::{dot, sum_mag, Solver, SolverPerformance};
use crate::config::{SolverConfig, SolverControls};
use crate::matrix::LduMatrix;
use crate::preconditioners::{new_preconditioner, Preconditioner};
use crate::registry::UnknownTypeError;
use crate::GREAT;

/// Preconditioned conjugate gradient for symmetric matrices.
pub struct Pcg {
    matrix: Arc<LduMatrix>,
    preconditioner: Box<dyn Preconditioner>,
    field_name: String,
    controls: SolverControls,
    w: Vec<f64>,
    r: Vec<f64>,
    p: Vec<f64>,
}

impl Pcg {
    pub fn new(matrix: Arc<LduMatrix>, config: &SolverConfig) -> Result<Self, UnknownTypeError> {
        if !matrix.is_symmetric() {
            panic!("PCG requires a symmetric matrix, use PBiCG or PBiCGStab");
        }
        let preconditioner = new_preconditioner(Arc::clone(&matrix), config)?;
        let n = matrix.n_cells();
        Ok(Self {
            matrix,
            preconditioner,
            field_name: config.field_name.clone(),
            controls: config.controls,
            w: vec![0.0; n],
            r: vec![0.0; n],
            p: vec![0.0; n],
        })
    }
}

impl Solver for Pcg {
    fn name(&self) -> &str {
        "PCG"
    }

    fn solve(&mut self, x: &mut [f64], b: &[f64]) -> SolverPerformance {
        let mut perf = SolverPerformance::new(self.name(), &self.field_name);
        let matrix = &self.matrix;
        let controls = &self.controls;

        matrix.amul(&mut self.w, x);
        for (cell, ri) in self.r.iter_mut().enumerate() {
            *ri = b[cell] - self.w[cell];
        }

        let norm_factor = matrix.norm_factor(x, b, &self.w);
        perf.initial_residual = sum_mag(&self.r) / norm_factor;
        perf.final_residual = perf.initial_residual;

        if controls.min_iter > 0 || !perf.check_convergence(controls) {
            let mut w_r = GREAT;
            loop {
                let w_r_old = w_r;
                self.preconditioner.precondition(&mut self.w, &self.r);
                w_r = dot(&self.w, &self.r);

                if perf.n_iterations == 0 {
                    self.p.copy_from_slice(&self.w);
                } else {
                    let beta = w_r / w_r_old;
                    for (pi, &wi) in self.p.iter_mut().zip(self.w.iter()) {
                        *pi = wi + beta * *pi;
                    }
                }

                matrix.amul(&mut self.w, &self.p);
                let w_p = dot(&self.w, &self.p);

                if perf.check_singularity(w_p.abs() / norm_factor) {
                    break;
                }

                let alpha = w_r / w_p;
                for cell in 0..matrix.n_cells() {
                    x[cell] += alpha * self.p[cell];
                    self.r[cell] -= alpha * self.w[cell];
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
