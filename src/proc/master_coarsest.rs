use std::sync::{Arc, Mutex};

use log::info;

use super::{ClusterState, CommPool, ProcAgglomerationConfig, ProcAgglomerator, ProcTopology};

/// Collapses all ranks onto a reduced set of master ranks in a single step.
/// With `n_masters` set, ranks are split into that many contiguous clusters;
/// otherwise `n_processors_per_master` fixes the cluster size. When neither
/// is set everything merges onto rank 0. `n_masters` wins when both are
/// given.
pub struct MasterCoarsest {
    state: ClusterState,
    n_masters: usize,
}

impl MasterCoarsest {
    pub fn new(
        topology: &ProcTopology,
        config: &ProcAgglomerationConfig,
        pool: Arc<Mutex<CommPool>>,
    ) -> Self {
        let n_ranks = topology.n_ranks();
        let n_masters = if config.n_masters > 0 {
            config.n_masters.min(n_ranks)
        } else if config.n_processors_per_master > 0 {
            n_ranks.div_ceil(config.n_processors_per_master)
        } else {
            1
        };
        Self {
            state: ClusterState::identity(n_ranks, pool),
            n_masters,
        }
    }
}

impl ProcAgglomerator for MasterCoarsest {
    fn agglomerate(&mut self) -> bool {
        let n_clusters = self.state.masters().len();
        if n_clusters <= self.n_masters || n_clusters <= 1 {
            return false;
        }

        // Contiguous chunks of the current clusters, evenly sized.
        let per_master = n_clusters.div_ceil(self.n_masters);
        let cluster_map: Vec<usize> = (0..n_clusters).map(|c| c / per_master).collect();
        let rank_to_cluster = self
            .state
            .rank_to_cluster()
            .iter()
            .map(|&c| cluster_map[c])
            .collect::<Vec<_>>();

        self.state.apply(rank_to_cluster);
        info!(
            "masterCoarsest: {} clusters -> {}",
            n_clusters,
            self.state.masters().len()
        );
        true
    }

    fn rank_to_cluster(&self) -> &[usize] {
        self.state.rank_to_cluster()
    }

    fn masters(&self) -> &[usize] {
        self.state.masters()
    }
}
