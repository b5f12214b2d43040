use std::sync::Arc;

use super::{dot, sum_mag, Solver, SolverPerformance};
use crate::config::{SolverConfig, SolverControls};
use crate::matrix::LduMatrix;
use crate::preconditioners::{new_preconditioner, Preconditioner};
use crate::registry::UnknownTypeError;
use crate::GREAT;

/// Preconditioned stabilized bi-conjugate gradient for asymmetric matrices.
/// Avoids the transpose products of PBiCG by combining each search direction
/// with a stabilizing minimal-residual step, and can exit on the half-step
/// when the intermediate residual already satisfies the controls.
pub struct PBiCgStab {
    matrix: Arc<LduMatrix>,
    preconditioner: Box<dyn Preconditioner>,
    field_name: String,
    controls: SolverControls,
    r: Vec<f64>,
    r0: Vec<f64>,
    p: Vec<f64>,
    y: Vec<f64>,
    ay: Vec<f64>,
    s: Vec<f64>,
    z: Vec<f64>,
    t: Vec<f64>,
}

impl PBiCgStab {
    pub fn new(matrix: Arc<LduMatrix>, config: &SolverConfig) -> Result<Self, UnknownTypeError> {
        let preconditioner = new_preconditioner(Arc::clone(&matrix), config)?;
        let n = matrix.n_cells();
        Ok(Self {
            matrix,
            preconditioner,
            field_name: config.field_name.clone(),
            controls: config.controls,
            r: vec![0.0; n],
            r0: vec![0.0; n],
            p: vec![0.0; n],
            y: vec![0.0; n],
            ay: vec![0.0; n],
            s: vec![0.0; n],
            z: vec![0.0; n],
            t: vec![0.0; n],
        })
    }
}

impl Solver for PBiCgStab {
    fn name(&self) -> &str {
        "PBiCGStab"
    }

    fn solve(&mut self, x: &mut [f64], b: &[f64]) -> SolverPerformance {
        let mut perf = SolverPerformance::new(self.name(), &self.field_name);
        let matrix = &self.matrix;
        let controls = &self.controls;
        let n = matrix.n_cells();

        matrix.amul(&mut self.y, x);
        for (cell, ri) in self.r.iter_mut().enumerate() {
            *ri = b[cell] - self.y[cell];
        }
        // fixed shadow residual
        self.r0.copy_from_slice(&self.r);

        let norm_factor = matrix.norm_factor(x, b, &self.y);
        perf.initial_residual = sum_mag(&self.r) / norm_factor;
        perf.final_residual = perf.initial_residual;

        if controls.min_iter > 0 || !perf.check_convergence(controls) {
            let mut r0_r = GREAT;
            let mut alpha = 0.0;
            let mut omega = 0.0;

            loop {
                let r0_r_old = r0_r;
                r0_r = dot(&self.r0, &self.r);

                if perf.check_singularity(r0_r.abs() / norm_factor) {
                    break;
                }

                if perf.n_iterations == 0 {
                    self.p.copy_from_slice(&self.r);
                } else {
                    let beta = (r0_r / r0_r_old) * (alpha / omega);
                    for cell in 0..n {
                        self.p[cell] =
                            self.r[cell] + beta * (self.p[cell] - omega * self.ay[cell]);
                    }
                }

                self.preconditioner.precondition(&mut self.y, &self.p);
                matrix.amul(&mut self.ay, &self.y);
                let r0_ay = dot(&self.r0, &self.ay);
                alpha = r0_r / r0_ay;

                for cell in 0..n {
                    self.s[cell] = self.r[cell] - alpha * self.ay[cell];
                }

                // half-step exit: the intermediate residual may already pass
                perf.final_residual = sum_mag(&self.s) / norm_factor;
                if perf.n_iterations + 1 >= controls.min_iter && perf.check_convergence(controls)
                {
                    for cell in 0..n {
                        x[cell] += alpha * self.y[cell];
                    }
                    perf.n_iterations += 1;
                    break;
                }

                self.preconditioner.precondition(&mut self.z, &self.s);
                matrix.amul(&mut self.t, &self.z);
                let t_t = dot(&self.t, &self.t);
                omega = dot(&self.t, &self.s) / t_t;

                for cell in 0..n {
                    x[cell] += alpha * self.y[cell] + omega * self.z[cell];
                    self.r[cell] = self.s[cell] - omega * self.t[cell];
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
