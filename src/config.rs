use crate::gamg::GamgConfig;

/// Convergence controls shared by every iterative solver, read from the
/// per-field solver configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverControls {
    /// Absolute stop threshold on the normalized residual.
    pub tolerance: f64,
    /// Relative-drop stop threshold against the initial residual. Zero
    /// disables the relative test.
    pub rel_tol: f64,
    /// Hard iteration cap.
    pub max_iter: usize,
    /// Forces at least this many iterations even when the initial residual
    /// already passes the tolerance.
    pub min_iter: usize,
}

impl Default for SolverControls {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            rel_tol: 0.0,
            max_iter: 1000,
            min_iter: 0,
        }
    }
}

/// Per-field solver selection, the in-memory equivalent of one entry of an
/// `fvSolution`-style dictionary.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Name of the field being solved for, used in solve reports.
    pub field_name: String,
    /// Solver type name looked up in the solver registry.
    pub solver: String,
    /// Preconditioner type name, for the Krylov solvers.
    pub preconditioner: String,
    /// Smoother type name, for `smoothSolver` and the GAMG levels.
    pub smoother: String,
    /// Smoother sweeps per outer iteration of `smoothSolver`.
    pub n_sweeps: usize,
    pub controls: SolverControls,
    pub gamg: GamgConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            field_name: String::new(),
            solver: "PCG".to_string(),
            preconditioner: "none".to_string(),
            smoother: "symGaussSeidel".to_string(),
            n_sweeps: 1,
            controls: SolverControls::default(),
            gamg: GamgConfig::default(),
        }
    }
}

impl SolverConfig {
    pub fn for_field(field_name: &str) -> Self {
        Self {
            field_name: field_name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_solver(mut self, solver: &str) -> Self {
        self.solver = solver.to_string();
        self
    }

    pub fn with_preconditioner(mut self, preconditioner: &str) -> Self {
        self.preconditioner = preconditioner.to_string();
        self
    }

    pub fn with_smoother(mut self, smoother: &str) -> Self {
        self.smoother = smoother.to_string();
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.controls.tolerance = tolerance;
        self
    }

    pub fn with_rel_tol(mut self, rel_tol: f64) -> Self {
        self.controls.rel_tol = rel_tol;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.controls.max_iter = max_iter;
        self
    }

    pub fn with_min_iter(mut self, min_iter: usize) -> Self {
        self.controls.min_iter = min_iter;
        self
    }
}
