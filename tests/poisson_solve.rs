use std::sync::{Arc, Mutex};

use ldu_amg::config::SolverConfig;
use ldu_amg::gamg::GamgHierarchy;
use ldu_amg::matrix::LduMatrix;
use ldu_amg::proc::{CommPool, ProcAgglomerationConfig, ProcTopology};
use ldu_amg::solvers::{new_solver, GamgSolver, Solver};
use ldu_amg::utils::{convection_diffusion_1d, poisson_3d};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn l1_residual(matrix: &LduMatrix, x: &[f64], b: &[f64]) -> f64 {
    let mut r = vec![0.0; matrix.n_cells()];
    matrix.residual(&mut r, x, b);
    r.iter().map(|v| v.abs()).sum()
}

#[test]
fn pcg_dic_solves_pressure_poisson() {
    init_logging();
    let matrix = Arc::new(poisson_3d(10, 10, 10));
    let config = SolverConfig::for_field("p")
        .with_solver("PCG")
        .with_preconditioner("DIC")
        .with_tolerance(1e-8);
    let mut solver = new_solver(Arc::clone(&matrix), &config).unwrap();

    let b: Vec<f64> = (0..1000).map(|i| ((i * 31 % 17) as f64) - 8.0).collect();
    let mut x = vec![0.0; 1000];
    let perf = solver.solve(&mut x, &b);

    assert!(perf.converged);
    assert!(!perf.singular);
    assert!(perf.final_residual < 1e-8);
    assert!(perf.final_residual <= perf.initial_residual);
    assert!(l1_residual(&matrix, &x, &b) < 1e-3);
}

#[test]
fn gamg_beats_unpreconditioned_cg_on_iterations() {
    init_logging();
    let matrix = Arc::new(poisson_3d(12, 12, 12));
    let b: Vec<f64> = (0..matrix.n_cells()).map(|i| (i as f64 * 0.01).sin()).collect();

    let cg_config = SolverConfig::for_field("p").with_solver("PCG");
    let mut cg = new_solver(Arc::clone(&matrix), &cg_config).unwrap();
    let mut x_cg = vec![0.0; matrix.n_cells()];
    let cg_perf = cg.solve(&mut x_cg, &b);

    let mg_config = SolverConfig::for_field("p").with_solver("GAMG");
    let mut mg = new_solver(Arc::clone(&matrix), &mg_config).unwrap();
    let mut x_mg = vec![0.0; matrix.n_cells()];
    let mg_perf = mg.solve(&mut x_mg, &b);

    assert!(cg_perf.converged);
    assert!(mg_perf.converged);
    assert!(mg_perf.n_iterations < cg_perf.n_iterations);
}

#[test]
fn gamg_preconditioned_pcg_converges_fast() {
    let matrix = Arc::new(poisson_3d(8, 8, 8));
    let config = SolverConfig::for_field("p")
        .with_solver("PCG")
        .with_preconditioner("GAMG");
    let mut solver = new_solver(Arc::clone(&matrix), &config).unwrap();
    let b = vec![1.0; 512];
    let mut x = vec![0.0; 512];
    let perf = solver.solve(&mut x, &b);
    assert!(perf.converged);
    assert!(perf.n_iterations < 15, "took {}", perf.n_iterations);
}

#[test]
fn pbicgstab_dilu_solves_transport() {
    let matrix = Arc::new(convection_diffusion_1d(200, 0.45));
    let config = SolverConfig::for_field("T")
        .with_solver("PBiCGStab")
        .with_preconditioner("DILU")
        .with_rel_tol(1e-6);
    let mut solver = new_solver(Arc::clone(&matrix), &config).unwrap();

    let b: Vec<f64> = (0..200).map(|i| 1.0 + (i as f64 * 0.05).cos()).collect();
    let mut x = vec![0.0; 200];
    let perf = solver.solve(&mut x, &b);

    assert!(perf.converged);
    assert!(perf.final_residual <= 1e-6 * perf.initial_residual || perf.final_residual < 1e-6);
}

#[test]
fn unknown_names_surface_the_valid_alternatives() {
    let matrix = Arc::new(poisson_3d(2, 2, 2));

    let config = SolverConfig::for_field("p").with_solver("AMG");
    let err = new_solver(Arc::clone(&matrix), &config).map(|_| ()).unwrap_err();
    assert!(err.to_string().contains("unknown solver type 'AMG'"));
    assert!(err.to_string().contains("GAMG"));

    let config = SolverConfig::for_field("p").with_preconditioner("ICC");
    let err = new_solver(matrix, &config).map(|_| ()).unwrap_err();
    assert!(err.to_string().contains("unknown preconditioner type 'ICC'"));
    assert!(err.to_string().contains("DIC"));
}

#[test]
fn distributed_hierarchy_merges_processors_and_releases_communicators() {
    init_logging();
    // one partition of a 4-rank case, coarsening until the per-rank cell
    // count falls below the merge threshold
    let matrix = Arc::new(poisson_3d(8, 8, 4));
    let topology = ProcTopology::new(
        vec![256; 4],
        vec![(0, 1, 32), (1, 2, 32), (2, 3, 32), (0, 2, 8)],
    );
    let pool = Arc::new(Mutex::new(CommPool::new()));

    let mut config = SolverConfig::for_field("p").with_solver("GAMG");
    config.gamg.processor_agglomeration = Some(ProcAgglomerationConfig {
        merge_below_cells_per_rank: 128,
        ..Default::default()
    });

    {
        let hierarchy = GamgHierarchy::build_distributed(
            Arc::clone(&matrix),
            &config.gamg,
            &topology,
            Arc::clone(&pool),
        )
        .unwrap();

        let merges = hierarchy.proc_merges();
        assert!(!merges.is_empty(), "expected at least one processor merge");
        // masterCoarsest default merges everything onto rank 0
        assert_eq!(merges.last().unwrap().rank_to_cluster, vec![0; 4]);
        let agglomerator = hierarchy.proc_agglomerator().unwrap();
        assert_eq!(agglomerator.n_clusters(), 1);
        assert_eq!(pool.lock().unwrap().n_live(), 1);
    }

    // hierarchy teardown returns every communicator to the pool
    assert_eq!(pool.lock().unwrap().n_live(), 0);
}

#[test]
fn distributed_gamg_solver_still_converges() {
    let matrix = Arc::new(poisson_3d(8, 8, 4));
    let topology = ProcTopology::new(vec![128; 2], vec![(0, 1, 64)]);
    let pool = Arc::new(Mutex::new(CommPool::new()));

    let mut config = SolverConfig::for_field("p").with_solver("GAMG");
    config.gamg.processor_agglomeration = Some(ProcAgglomerationConfig {
        agglomerator: "procFaces".to_string(),
        merge_below_cells_per_rank: 64,
        ..Default::default()
    });

    let mut solver =
        GamgSolver::new_distributed(Arc::clone(&matrix), &config, &topology, Arc::clone(&pool))
            .unwrap();
    let b = vec![1.0; 256];
    let mut x = vec![0.0; 256];
    let perf = solver.solve(&mut x, &b);
    assert!(perf.converged);
    assert!(l1_residual(&matrix, &x, &b) < 1e-3);

    drop(solver);
    assert_eq!(pool.lock().unwrap().n_live(), 0);
}
