use std::sync::Arc;

use crate::config::SolverConfig;
use crate::matrix::LduMatrix;
use crate::registry::{Registry, UnknownTypeError};

pub mod dic;
pub mod dilu;
pub mod gamg;

pub use dic::DicPreconditioner;
pub use dilu::DiluPreconditioner;
pub use gamg::GamgPreconditioner;

/// Approximate inverse applied inside the Krylov iterations. Bound to one
/// matrix at construction; any factorization work happens there, so the
/// per-call operations are cheap.
pub trait Preconditioner {
    /// `w = M^-1 r`.
    fn precondition(&mut self, w: &mut [f64], r: &[f64]);

    /// `w = transpose(M)^-1 r`, needed by the bi-conjugate-gradient solvers
    /// on asymmetric systems. Defaults to the forward form, which is correct
    /// for every symmetric preconditioner.
    fn precondition_transpose(&mut self, w: &mut [f64], r: &[f64]) {
        self.precondition(w, r);
    }
}

/// Identity: no preconditioning.
pub struct NoPreconditioner;

impl Preconditioner for NoPreconditioner {
    fn precondition(&mut self, w: &mut [f64], r: &[f64]) {
        w.copy_from_slice(r);
    }
}

/// Inverse-diagonal (Jacobi) preconditioning.
pub struct DiagonalPreconditioner {
    r_d: Vec<f64>,
}

impl DiagonalPreconditioner {
    pub fn new(matrix: &LduMatrix) -> Self {
        Self {
            r_d: matrix.diag().iter().map(|d| 1.0 / d).collect(),
        }
    }
}

impl Preconditioner for DiagonalPreconditioner {
    fn precondition(&mut self, w: &mut [f64], r: &[f64]) {
        for (cell, wi) in w.iter_mut().enumerate() {
            *wi = self.r_d[cell] * r[cell];
        }
    }
}

pub type PreconditionerFactory =
    fn(Arc<LduMatrix>, &SolverConfig) -> Result<Box<dyn Preconditioner>, UnknownTypeError>;

/// Registry of the built-in preconditioners.
pub fn standard() -> Registry<PreconditionerFactory> {
    let mut reg: Registry<PreconditionerFactory> = Registry::new("preconditioner");
    reg.insert("none", |_, _| Ok(Box::new(NoPreconditioner)));
    reg.insert("diagonal", |matrix, _| {
        Ok(Box::new(DiagonalPreconditioner::new(&matrix)))
    });
    reg.insert("DIC", |matrix, _| {
        Ok(Box::new(DicPreconditioner::new(&matrix)))
    });
    reg.insert("DILU", |matrix, _| {
        Ok(Box::new(DiluPreconditioner::new(&matrix)))
    });
    reg.insert("GAMG", |matrix, config| {
        Ok(Box::new(GamgPreconditioner::new(matrix, &config.gamg)?))
    });
    reg
}

/// Constructs a preconditioner by name from the standard registry.
pub fn new_preconditioner(
    matrix: Arc<LduMatrix>,
    config: &SolverConfig,
) -> Result<Box<dyn Preconditioner>, UnknownTypeError> {
    let registry = standard();
    let factory = registry.get(&config.preconditioner)?;
    factory(matrix, config)
}
