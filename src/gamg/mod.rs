use std::mem;
use std::sync::{Arc, Mutex};

use log::{debug, info};

use crate::matrix::LduMatrix;
use crate::proc::{
    new_agglomerator, CommPool, ProcAgglomerationConfig, ProcAgglomerator, ProcTopology,
};
use crate::registry::UnknownTypeError;
use crate::smoothers::{self, Smoother};

pub mod agglomerate;
pub mod coarse_solvers;

use agglomerate::{agglomerate_matrix, face_weights, pairwise};
use coarse_solvers::CoarseSolver;

/// Options for the multigrid hierarchy and cycle. The same struct configures
/// GAMG as an outer solver and as a preconditioner.
#[derive(Debug, Clone)]
pub struct GamgConfig {
    /// Coarsening stops once a level has at most this many cells.
    pub n_cells_in_coarsest_level: usize,
    /// Hard cap on hierarchy depth.
    pub max_levels: usize,
    /// Maximum number of fine cells agglomerated into one coarse cell.
    pub max_group_size: usize,
    /// Smoother type name applied on every non-coarsest level.
    pub smoother: String,
    /// Smoother sweeps before and after the coarse correction; zero disables
    /// that smoothing stage.
    pub n_pre_sweeps: usize,
    pub n_post_sweeps: usize,
    /// V-cycles per preconditioning application (GAMG-as-preconditioner).
    pub n_vcycles: usize,
    /// Optional parallel coarsening policy; see the `proc` module.
    pub processor_agglomeration: Option<ProcAgglomerationConfig>,
}

impl Default for GamgConfig {
    fn default() -> Self {
        Self {
            n_cells_in_coarsest_level: 10,
            max_levels: 50,
            max_group_size: 4,
            smoother: "symGaussSeidel".to_string(),
            n_pre_sweeps: 0,
            n_post_sweeps: 2,
            n_vcycles: 2,
            processor_agglomeration: None,
        }
    }
}

/// A processor merge performed while building the hierarchy: at which level
/// it happened and the resulting rank-to-cluster map.
#[derive(Debug, Clone)]
pub struct ProcMerge {
    pub level: usize,
    pub rank_to_cluster: Vec<usize>,
}

/// Ordered sequence of agglomerated matrices, finest first, together with the
/// fine-to-coarse cell restriction maps between consecutive levels.
///
/// When built with a processor topology, the hierarchy owns the processor
/// agglomerator so that the communicators it allocated live exactly as long
/// as the hierarchy and are released on teardown.
pub struct GamgHierarchy {
    levels: Vec<Arc<LduMatrix>>,
    restrictions: Vec<Vec<usize>>,
    proc_agglomerator: Option<Box<dyn ProcAgglomerator>>,
    proc_merges: Vec<ProcMerge>,
}

impl GamgHierarchy {
    /// Builds the hierarchy for a single-partition matrix.
    pub fn build(fine: Arc<LduMatrix>, config: &GamgConfig) -> Self {
        Self::build_impl(fine, config, None)
    }

    /// Builds the hierarchy for a matrix that is one partition of a
    /// distributed case, merging processor clusters at coarse levels
    /// according to the configured policy.
    pub fn build_distributed(
        fine: Arc<LduMatrix>,
        config: &GamgConfig,
        topology: &ProcTopology,
        pool: Arc<Mutex<CommPool>>,
    ) -> Result<Self, UnknownTypeError> {
        let proc_config = config
            .processor_agglomeration
            .clone()
            .unwrap_or_default();
        let agglomerator = new_agglomerator(topology, &proc_config, pool)?;
        Ok(Self::build_impl(
            fine,
            config,
            Some((agglomerator, proc_config)),
        ))
    }

    fn build_impl(
        fine: Arc<LduMatrix>,
        config: &GamgConfig,
        proc: Option<(Box<dyn ProcAgglomerator>, ProcAgglomerationConfig)>,
    ) -> Self {
        let (mut proc_agglomerator, proc_config) = match proc {
            Some((agglomerator, proc_config)) => (Some(agglomerator), Some(proc_config)),
            None => (None, None),
        };

        crate::utils::matrix_stats("GAMG finest level", &fine);

        let mut levels = vec![fine];
        let mut restrictions: Vec<Vec<usize>> = Vec::new();
        let mut proc_merges: Vec<ProcMerge> = Vec::new();

        while levels.len() < config.max_levels.max(1) {
            let current = Arc::clone(levels.last().unwrap());
            let n_fine = current.n_cells();
            if n_fine <= config.n_cells_in_coarsest_level {
                break;
            }

            let weights = face_weights(&current);
            let (restrict, n_coarse) =
                pairwise(current.addressing(), &weights, config.max_group_size.max(2));

            // stalled agglomeration: under 5% reduction means the graph is
            // effectively not coarsening any further
            if n_coarse >= n_fine || (n_fine - n_coarse) * 20 < n_fine {
                debug!(
                    "agglomeration stalled at {} cells after {} levels, truncating hierarchy",
                    n_fine,
                    levels.len()
                );
                break;
            }

            let coarse = agglomerate_matrix(&current, &restrict, n_coarse);
            info!(
                "GAMG level {}: agglomerated {} -> {} cells",
                levels.len(),
                n_fine,
                n_coarse
            );
            restrictions.push(restrict);
            levels.push(Arc::new(coarse));

            if let (Some(agglomerator), Some(proc_config)) =
                (proc_agglomerator.as_mut(), proc_config.as_ref())
            {
                let clusters = agglomerator.n_clusters().max(1);
                if n_coarse / clusters < proc_config.merge_below_cells_per_rank
                    && agglomerator.agglomerate()
                {
                    info!(
                        "processor agglomeration at level {}: {} clusters remain",
                        levels.len() - 1,
                        agglomerator.n_clusters()
                    );
                    proc_merges.push(ProcMerge {
                        level: levels.len() - 1,
                        rank_to_cluster: agglomerator.rank_to_cluster().to_vec(),
                    });
                }
            }
        }

        Self {
            levels,
            restrictions,
            proc_agglomerator,
            proc_merges,
        }
    }

    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn matrix(&self, level: usize) -> &Arc<LduMatrix> {
        &self.levels[level]
    }

    pub fn coarsest(&self) -> &Arc<LduMatrix> {
        self.levels.last().unwrap()
    }

    pub fn cell_counts(&self) -> Vec<usize> {
        self.levels.iter().map(|m| m.n_cells()).collect()
    }

    /// Fine-to-coarse cell map between `level` and `level + 1`.
    pub fn restriction(&self, level: usize) -> &[usize] {
        &self.restrictions[level]
    }

    pub fn proc_merges(&self) -> &[ProcMerge] {
        &self.proc_merges
    }

    pub fn proc_agglomerator(&self) -> Option<&dyn ProcAgglomerator> {
        self.proc_agglomerator.as_deref()
    }

    /// Restricts a fine-level field to the next coarser level by summation
    /// over each coarse group.
    pub fn restrict_field(&self, level: usize, fine: &[f64], coarse: &mut [f64]) {
        coarse.fill(0.0);
        for (cell, &group) in self.restrictions[level].iter().enumerate() {
            coarse[group] += fine[cell];
        }
    }

    /// Prolongs a coarse-level correction back to the finer level by
    /// injection, accumulating into the fine field.
    pub fn prolong_field(&self, level: usize, coarse: &[f64], fine: &mut [f64]) {
        for (cell, &group) in self.restrictions[level].iter().enumerate() {
            fine[cell] += coarse[group];
        }
    }
}

/// One multigrid V-cycle over a built hierarchy: pre-smooth, restrict the
/// residual, recurse, prolong the correction, post-smooth; the coarsest level
/// is solved directly. Owns per-level scratch fields so repeated cycles do
/// not reallocate.
pub struct GamgCycle {
    hierarchy: GamgHierarchy,
    smoothers: Vec<Box<dyn Smoother>>,
    coarse_solver: CoarseSolver,
    n_pre_sweeps: usize,
    n_post_sweeps: usize,
    x_level: Vec<Vec<f64>>,
    b_level: Vec<Vec<f64>>,
    r_level: Vec<Vec<f64>>,
}

impl GamgCycle {
    pub fn new(hierarchy: GamgHierarchy, config: &GamgConfig) -> Result<Self, UnknownTypeError> {
        let registry = smoothers::standard();
        let factory = *registry.get(&config.smoother)?;

        let n_levels = hierarchy.n_levels();
        let mut level_smoothers = Vec::with_capacity(n_levels.saturating_sub(1));
        for level in 0..n_levels - 1 {
            level_smoothers.push(factory(Arc::clone(hierarchy.matrix(level))));
        }
        let coarse_solver = CoarseSolver::new(hierarchy.coarsest());

        let sizes = hierarchy.cell_counts();
        Ok(Self {
            hierarchy,
            smoothers: level_smoothers,
            coarse_solver,
            n_pre_sweeps: config.n_pre_sweeps,
            n_post_sweeps: config.n_post_sweeps,
            x_level: sizes.iter().map(|&n| vec![0.0; n]).collect(),
            b_level: sizes.iter().map(|&n| vec![0.0; n]).collect(),
            r_level: sizes.iter().map(|&n| vec![0.0; n]).collect(),
        })
    }

    pub fn hierarchy(&self) -> &GamgHierarchy {
        &self.hierarchy
    }

    /// Runs one V-cycle on the finest-level system, improving `x` in place.
    pub fn vcycle(&mut self, x: &mut [f64], b: &[f64]) {
        self.cycle(0, x, b);
    }

    fn cycle(&mut self, level: usize, x: &mut [f64], b: &[f64]) {
        if level + 1 == self.hierarchy.n_levels() {
            self.coarse_solver.solve(x, b);
            return;
        }

        if self.n_pre_sweeps > 0 {
            self.smoothers[level].smooth(x, b, self.n_pre_sweeps);
        }

        let mut r = mem::take(&mut self.r_level[level]);
        self.hierarchy.matrix(level).residual(&mut r, x, b);

        let mut b_coarse = mem::take(&mut self.b_level[level + 1]);
        self.hierarchy.restrict_field(level, &r, &mut b_coarse);
        let mut x_coarse = mem::take(&mut self.x_level[level + 1]);
        x_coarse.fill(0.0);

        self.cycle(level + 1, &mut x_coarse, &b_coarse);

        self.hierarchy.prolong_field(level, &x_coarse, x);
        self.r_level[level] = r;
        self.b_level[level + 1] = b_coarse;
        self.x_level[level + 1] = x_coarse;

        self.smoothers[level].smooth(x, b, self.n_post_sweeps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::poisson_3d;

    #[test]
    fn hierarchy_shrinks_monotonically_to_coarsest_bound() {
        let fine = Arc::new(poisson_3d(8, 8, 8));
        let config = GamgConfig::default();
        let hierarchy = GamgHierarchy::build(fine, &config);
        let counts = hierarchy.cell_counts();
        assert!(counts.len() > 2);
        for pair in counts.windows(2) {
            assert!(pair[1] < pair[0], "levels must shrink: {:?}", counts);
        }
        assert!(*counts.last().unwrap() <= config.n_cells_in_coarsest_level);
    }

    #[test]
    fn diagonal_matrix_stalls_immediately() {
        let mut fine = poisson_3d(4, 4, 4);
        fine.upper_mut().fill(0.0);
        let hierarchy = GamgHierarchy::build(Arc::new(fine), &GamgConfig::default());
        // no coupling to agglomerate on: the fine level is the only level
        assert_eq!(hierarchy.n_levels(), 1);
    }

    #[test]
    fn max_levels_caps_the_hierarchy() {
        let fine = Arc::new(poisson_3d(8, 8, 8));
        let config = GamgConfig {
            max_levels: 2,
            ..GamgConfig::default()
        };
        let hierarchy = GamgHierarchy::build(fine, &config);
        assert_eq!(hierarchy.n_levels(), 2);
    }

    #[test]
    fn restrict_then_prolong_preserves_group_sums() {
        let fine = Arc::new(poisson_3d(4, 4, 1));
        let hierarchy = GamgHierarchy::build(fine, &GamgConfig::default());
        assert!(hierarchy.n_levels() >= 2);
        let n_fine = hierarchy.matrix(0).n_cells();
        let n_coarse = hierarchy.matrix(1).n_cells();
        let fine_field: Vec<f64> = (0..n_fine).map(|i| i as f64).collect();
        let mut coarse = vec![0.0; n_coarse];
        hierarchy.restrict_field(0, &fine_field, &mut coarse);
        assert!((coarse.iter().sum::<f64>() - fine_field.iter().sum::<f64>()).abs() < 1e-12);
        let mut back = vec![0.0; n_fine];
        hierarchy.prolong_field(0, &coarse, &mut back);
        // injection spreads each group sum to all members
        for (cell, &group) in hierarchy.restriction(0).iter().enumerate() {
            assert_eq!(back[cell], coarse[group]);
        }
    }

    #[test]
    fn vcycle_contracts_the_error_on_spd() {
        let fine = Arc::new(poisson_3d(6, 6, 6));
        let config = GamgConfig::default();
        let hierarchy = GamgHierarchy::build(Arc::clone(&fine), &config);
        let mut cycle = GamgCycle::new(hierarchy, &config).unwrap();

        let b = vec![1.0; 216];
        let mut x = vec![0.0; 216];
        let mut r = vec![0.0; 216];
        fine.residual(&mut r, &x, &b);
        let norm0: f64 = r.iter().map(|v| v.abs()).sum();

        cycle.vcycle(&mut x, &b);
        fine.residual(&mut r, &x, &b);
        let norm1: f64 = r.iter().map(|v| v.abs()).sum();
        assert!(norm1 < 0.5 * norm0, "one V-cycle: {} -> {}", norm0, norm1);
    }

    #[test]
    fn zero_sweep_cycle_is_pure_coarse_grid_correction() {
        let fine = Arc::new(poisson_3d(4, 4, 1));
        let config = GamgConfig {
            n_pre_sweeps: 0,
            n_post_sweeps: 0,
            max_levels: 2,
            ..GamgConfig::default()
        };
        let hierarchy = GamgHierarchy::build(Arc::clone(&fine), &config);
        assert_eq!(hierarchy.n_levels(), 2);

        // from a zero guess with no smoothing, one V-cycle must equal the
        // prolongated direct solve of the restricted right-hand side
        let b: Vec<f64> = (0..16).map(|i| (i as f64 * 0.7).sin()).collect();
        let n_coarse = hierarchy.matrix(1).n_cells();
        let mut b_coarse = vec![0.0; n_coarse];
        hierarchy.restrict_field(0, &b, &mut b_coarse);
        let coarse_solver = CoarseSolver::new(hierarchy.matrix(1));
        let mut x_coarse = vec![0.0; n_coarse];
        coarse_solver.solve(&mut x_coarse, &b_coarse);
        let mut expected = vec![0.0; 16];
        hierarchy.prolong_field(0, &x_coarse, &mut expected);

        let mut cycle = GamgCycle::new(hierarchy, &config).unwrap();
        let mut x = vec![0.0; 16];
        cycle.vcycle(&mut x, &b);
        for (a, e) in x.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-12, "{} vs {}", a, e);
        }
    }

    #[test]
    fn unknown_smoother_in_cycle_config_is_rejected() {
        let fine = Arc::new(poisson_3d(4, 4, 4));
        let config = GamgConfig {
            smoother: "ILU".to_string(),
            ..GamgConfig::default()
        };
        let hierarchy = GamgHierarchy::build(fine, &config);
        let err = GamgCycle::new(hierarchy, &config).map(|_| ()).unwrap_err();
        assert!(err.to_string().contains("unknown smoother type 'ILU'"));
    }
}
