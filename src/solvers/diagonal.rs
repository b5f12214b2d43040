use std::sync::Arc;

use super::{Solver, SolverPerformance};
use crate::config::SolverConfig;
use crate::matrix::LduMatrix;

/// Exact one-shot solver for matrices without off-diagonal coupling.
pub struct DiagonalSolver {
    matrix: Arc<LduMatrix>,
    field_name: String,
}

impl DiagonalSolver {
    pub fn new(matrix: Arc<LduMatrix>, config: &SolverConfig) -> Self {
        if !matrix.is_diagonal() {
            panic!("diagonal solver applied to a matrix with off-diagonal coefficients");
        }
        Self {
            matrix,
            field_name: config.field_name.clone(),
        }
    }
}

impl Solver for DiagonalSolver {
    fn name(&self) -> &str {
        "diagonal"
    }

    fn solve(&mut self, x: &mut [f64], b: &[f64]) -> SolverPerformance {
        let mut perf = SolverPerformance::new(self.name(), &self.field_name);
        for (cell, xi) in x.iter_mut().enumerate() {
            *xi = b[cell] / self.matrix.diag()[cell];
        }
        perf.converged = true;
        perf.report();
        perf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::LduAddressing;
    use crate::utils::poisson_3d;

    #[test]
    fn solves_exactly_in_one_shot() {
        let addr = Arc::new(LduAddressing::new(4, vec![], vec![]));
        let matrix = Arc::new(LduMatrix::from_coeffs(
            addr,
            vec![2.0, 4.0, 8.0, 0.5],
            vec![],
            None,
        ));
        let config = SolverConfig::for_field("rho");
        let mut solver = DiagonalSolver::new(matrix, &config);
        let b = vec![2.0, 2.0, 2.0, 2.0];
        let mut x = vec![0.0; 4];
        let perf = solver.solve(&mut x, &b);
        assert!(perf.converged);
        assert_eq!(perf.n_iterations, 0);
        assert_eq!(x, vec![1.0, 0.5, 0.25, 4.0]);
    }

    #[test]
    #[should_panic(expected = "off-diagonal")]
    fn coupled_matrix_is_rejected() {
        let matrix = Arc::new(poisson_3d(2, 2, 2));
        let config = SolverConfig::for_field("rho");
        let _ = DiagonalSolver::new(matrix, &config);
    }
}
