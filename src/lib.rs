//! Sparse linear algebra for cell-centered finite-volume discretizations:
//! matrices in lower-diagonal-upper (LDU) form over owner/neighbour face
//! addressing, with Krylov solvers, smoothers, preconditioners and a
//! geometric-algebraic multigrid built by pairwise agglomeration.

pub mod addressing;
pub mod config;
pub mod gamg;
pub mod matrix;
pub mod preconditioners;
pub mod proc;
pub mod registry;
pub mod smoothers;
pub mod solvers;
pub mod utils;

// Scalar bounds shared across the numerics, matching the usual
// finite-volume conventions for guarding divisions and norms.
pub(crate) const SMALL: f64 = 1.0e-20;
pub(crate) const VSMALL: f64 = 1.0e-300;
pub(crate) const GREAT: f64 = 1.0e15;
