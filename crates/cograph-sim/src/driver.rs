//! Synchronization drivers.
//!
//! Neither driver is part of the repair logic; they only decide when a
//! replica pulls its peers' state and when it runs repair. Both exchange
//! state through the encoded-update path so every delta is decoded and
//! validated the way a remote peer's would be.

use cograph_graph::{RepairConfig, RepairReport, ReplicatedGraph};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::debug;

use crate::error::SimError;

/// Pulls everything `from` knows into `into` through an encoded delta.
fn pull<G: ReplicatedGraph>(into: &mut G, from: &G) -> Result<(), SimError> {
    let bytes = from.encode_update(&into.state_vector())?;
    into.apply_encoded(&bytes)?;
    Ok(())
}

/// Merges every replica into every other one, then repairs each replica.
/// Returns the repair reports in replica order.
pub fn sync_and_repair_all<G: ReplicatedGraph>(
    replicas: &mut [G],
    config: &RepairConfig,
) -> Result<Vec<RepairReport>, SimError> {
    for i in 0..replicas.len() {
        for j in 0..replicas.len() {
            if i != j {
                let peer = replicas[j].clone();
                pull(&mut replicas[i], &peer)?;
            }
        }
    }
    let mut reports = Vec::with_capacity(replicas.len());
    for replica in replicas.iter_mut() {
        reports.push(replica.repair(config)?);
    }
    Ok(reports)
}

/// Checks that every replica is valid and agrees with the first one.
pub fn verify_converged<G: ReplicatedGraph>(replicas: &[G]) -> Result<(), SimError> {
    let Some(reference) = replicas.first() else {
        return Ok(());
    };
    for replica in replicas {
        if replica.needs_repair() {
            return Err(SimError::StillInvalid {
                replica: replica.replica_id(),
            });
        }
        if !replica.converged_with(reference) {
            return Err(SimError::Diverged {
                replica: replica.replica_id(),
                reference: reference.replica_id(),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StormStats {
    pub rounds: usize,
    /// Times a replica postponed adopting an invalid merged state.
    pub backoffs: usize,
    /// Times a replica replaced its state with a merged copy.
    pub adoptions: usize,
    pub reports: Vec<RepairReport>,
}

/// Randomised merge scheduling.
///
/// Each round, every replica that is not waiting merges its peers into a
/// scratch copy. A valid copy is adopted at once. An invalid one is dropped
/// and the replica waits a random number of rounds before trying again,
/// hoping a peer repairs first; once it has waited `patience` times it
/// repairs the copy itself and adopts it. Runs until no replica has
/// anything left to pull.
#[derive(Debug, Clone)]
pub struct StormDriver {
    rng: ChaCha8Rng,
    max_backoff: u32,
    patience: u32,
    max_rounds: usize,
}

impl StormDriver {
    pub fn new(seed: u64) -> Self {
        StormDriver {
            rng: ChaCha8Rng::seed_from_u64(seed),
            max_backoff: 3,
            patience: 2,
            max_rounds: 1_000,
        }
    }

    /// Upper bound of one random wait, in rounds.
    pub fn with_max_backoff(mut self, rounds: u32) -> Self {
        self.max_backoff = rounds.max(1);
        self
    }

    /// Waits tolerated before a replica repairs on its own.
    pub fn with_patience(mut self, waits: u32) -> Self {
        self.patience = waits;
        self
    }

    pub fn run<G: ReplicatedGraph>(
        &mut self,
        replicas: &mut [G],
        config: &RepairConfig,
    ) -> Result<StormStats, SimError> {
        let n = replicas.len();
        let mut stats = StormStats::default();
        let mut wait = vec![0u32; n];
        let mut waited = vec![0u32; n];

        loop {
            if stats.rounds == self.max_rounds {
                return Err(SimError::NoQuiescence {
                    rounds: stats.rounds,
                });
            }
            stats.rounds += 1;

            let mut busy = false;
            for i in 0..n {
                if wait[i] > 0 {
                    wait[i] -= 1;
                    busy = true;
                    continue;
                }

                let mut scratch = replicas[i].clone();
                for j in (0..n).filter(|&j| j != i) {
                    pull(&mut scratch, &replicas[j])?;
                }
                if scratch.state_vector() == replicas[i].state_vector() {
                    continue;
                }
                busy = true;

                if scratch.needs_repair() {
                    if waited[i] < self.patience {
                        waited[i] += 1;
                        wait[i] = self.rng.gen_range(1..=self.max_backoff);
                        stats.backoffs += 1;
                        debug!(
                            replica = %scratch.replica_id(),
                            wait = wait[i],
                            "merged state invalid, backing off"
                        );
                        continue;
                    }
                    stats.reports.push(scratch.repair(config)?);
                }
                replicas[i] = scratch;
                waited[i] = 0;
                stats.adoptions += 1;
            }

            if !busy {
                return Ok(stats);
            }
        }
    }
}
