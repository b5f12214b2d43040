use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use crate::registry::{Registry, UnknownTypeError};

pub mod master_coarsest;
pub mod proc_faces;

pub use master_coarsest::MasterCoarsest;
pub use proc_faces::ProcFaces;

/// Inter-partition connectivity of a distributed case: how many ranks there
/// are, how many cells each holds, and the processor interfaces between them
/// weighted by their face counts. This is the input the parallel coarsening
/// policies cluster on.
#[derive(Debug, Clone)]
pub struct ProcTopology {
    cells_per_rank: Vec<usize>,
    /// Deduplicated interfaces keyed by `(lower rank, upper rank)`, value is
    /// the total face count of the interface.
    interfaces: Vec<(usize, usize, usize)>,
}

impl ProcTopology {
    pub fn new(cells_per_rank: Vec<usize>, interfaces: Vec<(usize, usize, usize)>) -> Self {
        let n_ranks = cells_per_rank.len();
        let mut merged: BTreeMap<(usize, usize), usize> = BTreeMap::new();
        for (a, b, n_faces) in interfaces {
            if a == b {
                panic!("rank {} cannot interface with itself", a);
            }
            if a >= n_ranks || b >= n_ranks {
                panic!(
                    "interface ({}, {}) references a rank outside 0..{}",
                    a, b, n_ranks
                );
            }
            *merged.entry((a.min(b), a.max(b))).or_insert(0) += n_faces;
        }
        Self {
            cells_per_rank,
            interfaces: merged.into_iter().map(|((a, b), w)| (a, b, w)).collect(),
        }
    }

    pub fn n_ranks(&self) -> usize {
        self.cells_per_rank.len()
    }

    pub fn cells_per_rank(&self) -> &[usize] {
        &self.cells_per_rank
    }

    pub fn interfaces(&self) -> &[(usize, usize, usize)] {
        &self.interfaces
    }
}

/// Handle to an allocated communicator covering one processor cluster.
#[derive(Debug)]
pub struct Communicator {
    id: usize,
    ranks: Vec<usize>,
}

impl Communicator {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn ranks(&self) -> &[usize] {
        &self.ranks
    }
}

/// Process-wide allocator of communicators. Every allocation must be paired
/// with a release; `n_live` lets owners (and tests) verify nothing leaked
/// before the pool is torn down.
#[derive(Debug, Default)]
pub struct CommPool {
    next_id: usize,
    live: BTreeSet<usize>,
}

impl CommPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, ranks: Vec<usize>) -> Communicator {
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id);
        Communicator { id, ranks }
    }

    pub fn release(&mut self, comm: Communicator) {
        if !self.live.remove(&comm.id) {
            panic!("communicator {} released twice", comm.id);
        }
    }

    pub fn n_live(&self) -> usize {
        self.live.len()
    }
}

/// Policy deciding how ranks are merged into clusters at coarse multigrid
/// levels. Each successful `agglomerate` call coarsens the current cluster
/// set one step and reallocates one communicator per cluster; once a single
/// cluster remains, further calls return `false`.
pub trait ProcAgglomerator {
    /// Attempts one merge step; `true` if the cluster set changed.
    fn agglomerate(&mut self) -> bool;

    /// Cluster id of every original rank under the current clustering.
    fn rank_to_cluster(&self) -> &[usize];

    /// Designated master rank of each cluster, the only rank of a cluster
    /// that keeps participating in coarsening communication.
    fn masters(&self) -> &[usize];

    fn n_clusters(&self) -> usize {
        self.masters().len()
    }
}

/// Shared clustering state: the rank-to-cluster map, the per-cluster master
/// ranks, and the communicators currently held. Releases every outstanding
/// communicator when re-clustered and when dropped, so teardown is safe on
/// all paths.
pub(crate) struct ClusterState {
    rank_to_cluster: Vec<usize>,
    masters: Vec<usize>,
    comms: Vec<Communicator>,
    pool: Arc<Mutex<CommPool>>,
}

impl ClusterState {
    pub(crate) fn identity(n_ranks: usize, pool: Arc<Mutex<CommPool>>) -> Self {
        Self {
            rank_to_cluster: (0..n_ranks).collect(),
            masters: (0..n_ranks).collect(),
            comms: Vec::new(),
            pool,
        }
    }

    pub(crate) fn rank_to_cluster(&self) -> &[usize] {
        &self.rank_to_cluster
    }

    pub(crate) fn masters(&self) -> &[usize] {
        &self.masters
    }

    fn release_comms(&mut self) {
        let mut pool = self.pool.lock().unwrap();
        for comm in self.comms.drain(..) {
            pool.release(comm);
        }
    }

    /// Installs a new clustering, swapping the communicator set.
    pub(crate) fn apply(&mut self, rank_to_cluster: Vec<usize>) {
        let n_clusters = rank_to_cluster.iter().max().map_or(0, |&c| c + 1);
        let mut cluster_ranks: Vec<Vec<usize>> = vec![Vec::new(); n_clusters];
        for (rank, &cluster) in rank_to_cluster.iter().enumerate() {
            cluster_ranks[cluster].push(rank);
        }

        self.release_comms();
        let mut pool = self.pool.lock().unwrap();
        self.masters = cluster_ranks.iter().map(|ranks| ranks[0]).collect();
        self.comms = cluster_ranks
            .into_iter()
            .map(|ranks| pool.allocate(ranks))
            .collect();
        self.rank_to_cluster = rank_to_cluster;
    }
}

impl Drop for ClusterState {
    fn drop(&mut self) {
        self.release_comms();
    }
}

/// Parallel coarsening options, nested inside `GamgConfig`.
#[derive(Debug, Clone)]
pub struct ProcAgglomerationConfig {
    /// Policy name looked up in the processor agglomerator registry.
    pub agglomerator: String,
    /// Cluster size for `masterCoarsest`; 0 merges everything onto one
    /// master in a single step.
    pub n_processors_per_master: usize,
    /// Target cluster count for `masterCoarsest`; takes precedence over
    /// `n_processors_per_master` when both are set.
    pub n_masters: usize,
    /// Merge once the mean coarse-level cell count per cluster drops below
    /// this bound.
    pub merge_below_cells_per_rank: usize,
}

impl Default for ProcAgglomerationConfig {
    fn default() -> Self {
        Self {
            agglomerator: "masterCoarsest".to_string(),
            n_processors_per_master: 0,
            n_masters: 0,
            merge_below_cells_per_rank: 64,
        }
    }
}

pub type ProcAgglomeratorFactory = fn(
    &ProcTopology,
    &ProcAgglomerationConfig,
    Arc<Mutex<CommPool>>,
) -> Box<dyn ProcAgglomerator>;

/// Registry of the built-in processor agglomeration policies.
pub fn standard() -> Registry<ProcAgglomeratorFactory> {
    let mut reg: Registry<ProcAgglomeratorFactory> = Registry::new("processor agglomerator");
    reg.insert("masterCoarsest", |topology, config, pool| {
        Box::new(MasterCoarsest::new(topology, config, pool))
    });
    reg.insert("procFaces", |topology, _, pool| {
        Box::new(ProcFaces::new(topology, pool))
    });
    reg
}

/// Constructs a processor agglomerator by name from the standard registry.
pub fn new_agglomerator(
    topology: &ProcTopology,
    config: &ProcAgglomerationConfig,
    pool: Arc<Mutex<CommPool>>,
) -> Result<Box<dyn ProcAgglomerator>, UnknownTypeError> {
    let registry = standard();
    let factory = registry.get(&config.agglomerator)?;
    Ok(factory(topology, config, pool))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comm_pool_tracks_live_allocations() {
        let mut pool = CommPool::new();
        let a = pool.allocate(vec![0, 1]);
        let b = pool.allocate(vec![2]);
        assert_eq!(pool.n_live(), 2);
        pool.release(a);
        assert_eq!(pool.n_live(), 1);
        pool.release(b);
        assert_eq!(pool.n_live(), 0);
    }

    #[test]
    #[should_panic(expected = "released twice")]
    fn double_release_is_fatal() {
        let mut pool = CommPool::new();
        let a = pool.allocate(vec![0]);
        let fake = Communicator {
            id: a.id(),
            ranks: vec![0],
        };
        pool.release(a);
        pool.release(fake);
    }

    #[test]
    fn topology_merges_duplicate_interfaces() {
        let topo = ProcTopology::new(vec![100; 3], vec![(1, 0, 4), (0, 1, 6), (1, 2, 3)]);
        assert_eq!(topo.interfaces(), &[(0, 1, 10), (1, 2, 3)]);
    }

    #[test]
    #[should_panic(expected = "itself")]
    fn self_interface_is_fatal() {
        ProcTopology::new(vec![10; 2], vec![(1, 1, 4)]);
    }

    #[test]
    fn unknown_policy_is_rejected_with_alternatives() {
        let topo = ProcTopology::new(vec![10; 2], vec![(0, 1, 1)]);
        let config = ProcAgglomerationConfig {
            agglomerator: "cellGroups".to_string(),
            ..Default::default()
        };
        let err = new_agglomerator(&topo, &config, Arc::new(Mutex::new(CommPool::new())))
            .map(|_| ())
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("unknown processor agglomerator type 'cellGroups'"));
        assert!(err.to_string().contains("masterCoarsest"));
        assert!(err.to_string().contains("procFaces"));
    }
}
