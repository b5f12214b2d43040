use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use log::info;

use super::{ClusterState, CommPool, ProcAgglomerator, ProcTopology};
use crate::addressing::LduAddressing;
use crate::gamg::agglomerate::pairwise;

/// Merges clusters pairwise along their largest processor interfaces, so
/// each step roughly halves the cluster count while keeping merged partitions
/// physically adjacent. Runs the same weighted pairwise agglomeration as the
/// cell-level coarsening, on a proxy graph with one cell per cluster and the
/// inter-cluster face counts as weights.
pub struct ProcFaces {
    topology: ProcTopology,
    state: ClusterState,
}

impl ProcFaces {
    pub fn new(topology: &ProcTopology, pool: Arc<Mutex<CommPool>>) -> Self {
        Self {
            topology: topology.clone(),
            state: ClusterState::identity(topology.n_ranks(), pool),
        }
    }

    /// Inter-cluster connectivity under the current clustering, as a proxy
    /// graph with one cell per cluster.
    fn proxy_graph(&self) -> (LduAddressing, Vec<f64>) {
        let rank_to_cluster = self.state.rank_to_cluster();
        let n_clusters = self.state.masters().len();

        let mut merged: BTreeMap<(usize, usize), usize> = BTreeMap::new();
        for &(a, b, n_faces) in self.topology.interfaces() {
            let ca = rank_to_cluster[a];
            let cb = rank_to_cluster[b];
            if ca != cb {
                *merged.entry((ca.min(cb), ca.max(cb))).or_insert(0) += n_faces;
            }
        }

        let mut lower_addr = Vec::with_capacity(merged.len());
        let mut upper_addr = Vec::with_capacity(merged.len());
        let mut weights = Vec::with_capacity(merged.len());
        for ((l, u), n_faces) in merged {
            lower_addr.push(l);
            upper_addr.push(u);
            weights.push(n_faces as f64);
        }
        (
            LduAddressing::new(n_clusters, lower_addr, upper_addr),
            weights,
        )
    }
}

impl ProcAgglomerator for ProcFaces {
    fn agglomerate(&mut self) -> bool {
        let n_clusters = self.state.masters().len();
        if n_clusters <= 1 {
            return false;
        }

        let (addr, weights) = self.proxy_graph();
        let (cluster_map, n_merged) = pairwise(&addr, &weights, 2);
        if n_merged >= n_clusters {
            // fully disconnected cluster graph, nothing to pair
            return false;
        }

        let rank_to_cluster = self
            .state
            .rank_to_cluster()
            .iter()
            .map(|&c| cluster_map[c])
            .collect::<Vec<_>>();
        self.state.apply(rank_to_cluster);
        info!("procFaces: {} clusters -> {}", n_clusters, n_merged);
        true
    }

    fn rank_to_cluster(&self) -> &[usize] {
        self.state.rank_to_cluster()
    }

    fn masters(&self) -> &[usize] {
        self.state.masters()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_along_the_largest_interfaces() {
        // 0-1 and 2-3 share big interfaces, 1-2 a small one
        let topo = ProcTopology::new(
            vec![500; 4],
            vec![(0, 1, 100), (1, 2, 5), (2, 3, 100)],
        );
        let pool = Arc::new(Mutex::new(CommPool::new()));
        let mut agg = ProcFaces::new(&topo, Arc::clone(&pool));

        assert!(agg.agglomerate());
        assert_eq!(agg.n_clusters(), 2);
        let map = agg.rank_to_cluster();
        assert_eq!(map[0], map[1]);
        assert_eq!(map[2], map[3]);
        assert_ne!(map[0], map[2]);
        assert_eq!(pool.lock().unwrap().n_live(), 2);

        // second step merges the remaining pair
        assert!(agg.agglomerate());
        assert_eq!(agg.n_clusters(), 1);
        assert!(!agg.agglomerate());
    }

    #[test]
    fn disconnected_ranks_stop_the_merging() {
        let topo = ProcTopology::new(vec![500; 3], vec![]);
        let pool = Arc::new(Mutex::new(CommPool::new()));
        let mut agg = ProcFaces::new(&topo, pool);
        assert!(!agg.agglomerate());
        assert_eq!(agg.n_clusters(), 3);
    }

    #[test]
    fn communicators_are_released_on_drop() {
        let topo = ProcTopology::new(vec![500; 4], vec![(0, 1, 10), (1, 2, 10), (2, 3, 10)]);
        let pool = Arc::new(Mutex::new(CommPool::new()));
        {
            let mut agg = ProcFaces::new(&topo, Arc::clone(&pool));
            while agg.agglomerate() {}
            assert_eq!(pool.lock().unwrap().n_live(), 1);
        }
        assert_eq!(pool.lock().unwrap().n_live(), 0);
    }
}
