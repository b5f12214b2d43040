use std::sync::Arc;

use log::{info, warn};

use crate::config::{SolverConfig, SolverControls};
use crate::matrix::LduMatrix;
use crate::registry::{Registry, UnknownTypeError};
use crate::{SMALL, VSMALL};

pub mod diagonal;
pub mod gamg;
pub mod pbicg;
pub mod pbicgstab;
pub mod pcg;
pub mod smooth_solver;

pub use diagonal::DiagonalSolver;
pub use gamg::GamgSolver;
pub use pbicg::PBiCg;
pub use pbicgstab::PBiCgStab;
pub use pcg::Pcg;
pub use smooth_solver::SmoothSolver;

/// Outcome of one solve call: the normalized initial and final residuals, the
/// iteration count, and whether the stopping criteria or a singularity guard
/// ended the iteration.
#[derive(Debug, Clone)]
pub struct SolverPerformance {
    pub solver_name: String,
    pub field_name: String,
    pub initial_residual: f64,
    pub final_residual: f64,
    pub n_iterations: usize,
    pub converged: bool,
    pub singular: bool,
}

impl SolverPerformance {
    pub fn new(solver_name: &str, field_name: &str) -> Self {
        Self {
            solver_name: solver_name.to_string(),
            field_name: field_name.to_string(),
            initial_residual: 0.0,
            final_residual: 0.0,
            n_iterations: 0,
            converged: false,
            singular: false,
        }
    }

    /// Evaluates the stopping criteria against the current final residual:
    /// the absolute tolerance first, then the relative drop from the initial
    /// residual when `rel_tol` is enabled.
    pub fn check_convergence(&mut self, controls: &SolverControls) -> bool {
        self.converged = self.final_residual < controls.tolerance
            || (controls.rel_tol > SMALL
                && self.final_residual <= controls.rel_tol * self.initial_residual);
        self.converged
    }

    /// Flags the solve as singular when a denominator in the iteration
    /// collapsed; a singular solve is also reported converged since the
    /// residual can no longer be reduced.
    pub fn check_singularity(&mut self, value: f64) -> bool {
        if value < VSMALL {
            self.singular = true;
            self.converged = true;
        }
        self.singular
    }

    /// Logs the solve in the usual one-line format.
    pub fn report(&self) {
        if self.singular {
            warn!(
                "{}: solving for {}: solution singular after {} iterations",
                self.solver_name, self.field_name, self.n_iterations
            );
            return;
        }
        if !self.converged {
            warn!(
                "{}: solving for {}: not converged within {} iterations, \
                 final residual = {:e}",
                self.solver_name, self.field_name, self.n_iterations, self.final_residual
            );
            return;
        }
        info!(
            "{}: solving for {}, initial residual = {:e}, final residual = {:e}, \
             iterations = {}",
            self.solver_name,
            self.field_name,
            self.initial_residual,
            self.final_residual,
            self.n_iterations
        );
    }
}

/// A matrix solver bound to one matrix and one field configuration. Solvers
/// are stateful (factorizations, hierarchies, scratch fields) and reusable
/// across repeated solves of the same matrix.
pub trait Solver {
    fn name(&self) -> &str;

    /// Solves `A x = b`, improving `x` in place from its initial guess.
    fn solve(&mut self, x: &mut [f64], b: &[f64]) -> SolverPerformance;
}

pub(crate) fn sum_mag(field: &[f64]) -> f64 {
    field.iter().map(|v| v.abs()).sum()
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub type SolverFactory =
    fn(Arc<LduMatrix>, &SolverConfig) -> Result<Box<dyn Solver>, UnknownTypeError>;

/// Registry of the built-in solvers.
pub fn standard() -> Registry<SolverFactory> {
    let mut reg: Registry<SolverFactory> = Registry::new("solver");
    reg.insert("PCG", |matrix, config| Ok(Box::new(Pcg::new(matrix, config)?)));
    reg.insert("PBiCG", |matrix, config| {
        Ok(Box::new(PBiCg::new(matrix, config)?))
    });
    reg.insert("PBiCGStab", |matrix, config| {
        Ok(Box::new(PBiCgStab::new(matrix, config)?))
    });
    reg.insert("smoothSolver", |matrix, config| {
        Ok(Box::new(SmoothSolver::new(matrix, config)?))
    });
    reg.insert("diagonal", |matrix, config| {
        Ok(Box::new(DiagonalSolver::new(matrix, config)))
    });
    reg.insert("GAMG", |matrix, config| {
        Ok(Box::new(GamgSolver::new(matrix, config)?))
    });
    reg
}

/// Constructs a solver by name from the standard registry.
pub fn new_solver(
    matrix: Arc<LduMatrix>,
    config: &SolverConfig,
) -> Result<Box<dyn Solver>, UnknownTypeError> {
    let registry = standard();
    let factory = registry.get(&config.solver)?;
    factory(matrix, config)
}
