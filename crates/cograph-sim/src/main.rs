//! Multi-replica simulation CLI.
//!
//! Runs a random workload over several replicas of one graph variant,
//! exchanging state between rounds with one of the synchronization drivers,
//! then verifies that every replica converged to the same valid graph and
//! prints a JSON summary to stdout.
//!
//! Repair configuration comes from the `COGRAPH_*` environment variables
//! (see `RepairConfig::from_env`); logging is controlled by `RUST_LOG`.

use std::process;

use clap::{Args, Parser, Subcommand};
use cograph_core::ReplicaId;
use cograph_graph::{
    AcyclicGraph, DirectedRootedGraph, RepairConfig, RepairReport, ReplicatedGraph,
    UndirectedRootedGraph,
};
use cograph_sim::{
    run_workload, sync_and_repair_all, verify_converged, RandomEdits, SimError, StormDriver,
    StormStats, WorkloadStats,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Replicated graph repair simulator.
#[derive(Parser)]
#[command(name = "cograph-sim", about = "Replicated graph repair simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Simulate replicas of a directed acyclic graph.
    Dag(RunArgs),

    /// Simulate replicas of a fixed-root graph.
    Rooted {
        #[command(flatten)]
        run: RunArgs,

        /// Use the undirected variant.
        #[arg(long)]
        undirected: bool,
    },
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Seed for the workload and the storm driver.
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Number of replicas.
    #[arg(short, long, default_value_t = 3)]
    replicas: u64,

    /// Local edits per round, spread over all replicas.
    #[arg(short, long, default_value_t = 40)]
    ops: usize,

    /// Edit-then-sync rounds.
    #[arg(long, default_value_t = 5)]
    rounds: usize,

    /// Synchronize with the randomised storm driver instead of merging
    /// everyone and repairing everyone.
    #[arg(long)]
    storm: bool,
}

#[derive(Serialize)]
struct Summary {
    variant: &'static str,
    seed: u64,
    replicas: u64,
    rounds: usize,
    workload: WorkloadStats,
    node_count: usize,
    edge_count: usize,
    reports: Vec<RepairReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    storms: Vec<StormStats>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match RepairConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Dag(run) => simulate("dag", &run, &config, AcyclicGraph::new),
        Commands::Rooted { run, undirected: false } => {
            simulate("directed-rooted", &run, &config, DirectedRootedGraph::new)
        }
        Commands::Rooted { run, undirected: true } => {
            simulate("undirected-rooted", &run, &config, UndirectedRootedGraph::new)
        }
    };

    match result {
        Ok(summary) => {
            let json = serde_json::to_string_pretty(&summary).unwrap_or_else(|e| {
                format!("{{\"error\": \"failed to serialize summary: {}\"}}", e)
            });
            println!("{}", json);
        }
        Err(e @ (SimError::Diverged { .. } | SimError::StillInvalid { .. })) => {
            eprintln!("Verification failed: {}", e);
            process::exit(3);
        }
        Err(e) => {
            eprintln!("Repair error: {}", e);
            process::exit(2);
        }
    }
}

/// Runs `rounds` rounds of edits and synchronization, then a final full sync.
fn simulate<G: ReplicatedGraph + RandomEdits>(
    variant: &'static str,
    run: &RunArgs,
    config: &RepairConfig,
    new: impl Fn(ReplicaId) -> G,
) -> Result<Summary, SimError> {
    let mut rng = ChaCha8Rng::seed_from_u64(run.seed);
    let mut storm = StormDriver::new(run.seed);
    let mut replicas: Vec<G> = (1..=run.replicas.max(1)).map(|r| new(ReplicaId(r))).collect();

    let mut next_id = 0;
    let mut workload = WorkloadStats::default();
    let mut reports = Vec::new();
    let mut storms = Vec::new();

    for round in 0..run.rounds {
        let stats = run_workload(&mut replicas, run.ops, &mut next_id, &mut rng);
        workload.applied += stats.applied;
        workload.refused += stats.refused;
        tracing::debug!(
            round,
            applied = stats.applied,
            refused = stats.refused,
            "workload round done"
        );

        if run.storm {
            storms.push(storm.run(&mut replicas, config)?);
        } else {
            reports.extend(sync_and_repair_all(&mut replicas, config)?);
        }
    }

    reports.extend(sync_and_repair_all(&mut replicas, config)?);
    verify_converged(&replicas)?;

    let reference = &replicas[0];
    tracing::info!(variant, nodes = reference.node_ids().len(), "replicas converged");
    Ok(Summary {
        variant,
        seed: run.seed,
        replicas: run.replicas,
        rounds: run.rounds,
        workload,
        node_count: reference.node_ids().len(),
        edge_count: reference.edges().len(),
        reports,
        storms,
    })
}
