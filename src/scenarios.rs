//! Demo jobs that put the dashboard through its paces.
//!
//! Most of them never finish on purpose: the point is to watch which rows stop moving.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;

use crate::call_site;
use crate::comm::MonitoredComm;
use crate::config::MonitorConfig;
use crate::monitor::Monitor;
use crate::snapshot_loop::LoopSummary;
use crate::table::COORDINATOR;
use crate::transport::{Job, LocalCluster, MessagePassing, Transport, TransportError};

const TAG: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Ranks 0 and 1 synchronously send to each other.
    MutualSsend,
    /// Ranks 0 and 1 both wait to receive from the other.
    MutualRecv,
    /// Every rank but 0 joins a broadcast rooted at 0; rank 0 never does.
    Deserter,
    /// Eight ranks: a deadlocked pair, a rank stuck behind it, a busy pair, a late receiver
    /// and a sleeper.
    AllStates,
    /// Rank 0 sends a stream of messages that rank 1 receives.
    Pipeline,
}

impl Scenario {
    pub fn description(self) -> &'static str {
        match self {
            Scenario::MutualSsend => "ranks 0 and 1 deadlock in Ssend",
            Scenario::MutualRecv => "ranks 0 and 1 deadlock in Recv",
            Scenario::Deserter => "rank 0 skips a broadcast everyone else waits in",
            Scenario::AllStates => "deadlock, collateral block, busy pair, late receiver, sleeper",
            Scenario::Pipeline => "rank 0 streams messages to rank 1, then everyone finalizes",
        }
    }

    pub fn min_workers(self) -> usize {
        match self {
            Scenario::AllStates => 8,
            _ => 2,
        }
    }

    pub fn default_workers(self) -> usize {
        match self {
            Scenario::AllStates => 8,
            Scenario::Deserter => 4,
            _ => 2,
        }
    }

    /// Whether every rank is expected to reach `Finalize`.
    pub fn terminates(self) -> bool {
        matches!(self, Scenario::Pipeline)
    }

    /// The body of the job on one rank, between startup and shutdown.
    pub fn run<T>(
        self,
        comm: &MonitoredComm<'_, T>,
        params: &ScenarioParams,
    ) -> Result<(), TransportError>
    where
        T: Transport + MessagePassing,
    {
        match self {
            Scenario::MutualSsend => mutual_ssend(comm),
            Scenario::MutualRecv => mutual_recv(comm),
            Scenario::Deserter => deserter(comm),
            Scenario::AllStates => all_states(comm, params),
            Scenario::Pipeline => pipeline(comm, params),
        }
    }
}

/// Knobs shared by the demo jobs.
#[derive(Debug, Clone)]
pub struct ScenarioParams {
    /// Messages exchanged by the busy pairs.
    pub messages: usize,
    /// Base delay of the sleeping ranks.
    pub pause: Duration,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        ScenarioParams {
            messages: 10_000,
            pause: Duration::from_secs(2),
        }
    }
}

fn payload(rank: usize) -> [u8; 4] {
    (rank as u32).to_le_bytes()
}

fn mutual_ssend<T: Transport + MessagePassing>(
    comm: &MonitoredComm<'_, T>,
) -> Result<(), TransportError> {
    match comm.rank() {
        0 => comm.ssend(1, TAG, &payload(0)),
        1 => comm.ssend(0, TAG, &payload(1)),
        _ => Ok(()),
    }
}

fn mutual_recv<T: Transport + MessagePassing>(
    comm: &MonitoredComm<'_, T>,
) -> Result<(), TransportError> {
    match comm.rank() {
        0 => comm.recv(1, TAG).map(|_| ()),
        1 => comm.recv(0, TAG).map(|_| ()),
        _ => Ok(()),
    }
}

fn deserter<T: Transport + MessagePassing>(
    comm: &MonitoredComm<'_, T>,
) -> Result<(), TransportError> {
    if comm.rank() > 0 {
        let mut data = Vec::new();
        comm.bcast(0, &mut data)?;
    }
    Ok(())
}

fn all_states<T: Transport + MessagePassing>(
    comm: &MonitoredComm<'_, T>,
    params: &ScenarioParams,
) -> Result<(), TransportError> {
    let rank = comm.rank();
    let data = payload(rank);
    match rank {
        0 => comm.ssend(1, TAG, &data)?,
        1 => comm.ssend(0, TAG, &data)?,
        // Blocked behind rank 1, which never posts a receive.
        2 => comm.ssend(1, TAG, &data)?,
        3 => {
            for _ in 0..params.messages {
                comm.ssend(4, TAG, &data)?;
            }
        }
        4 => {
            for _ in 0..params.messages {
                comm.recv(3, TAG)?;
            }
        }
        5 => comm.ssend(6, TAG, &data)?,
        6 => {
            thread::sleep(params.pause * 2);
            comm.recv(5, TAG)?;
        }
        7 => thread::sleep(params.pause),
        _ => {}
    }
    Ok(())
}

fn pipeline<T: Transport + MessagePassing>(
    comm: &MonitoredComm<'_, T>,
    params: &ScenarioParams,
) -> Result<(), TransportError> {
    match comm.rank() {
        0 => {
            for i in 0..params.messages {
                comm.send(1, TAG, &(i as u64).to_le_bytes())?;
            }
        }
        1 => {
            for _ in 0..params.messages {
                comm.recv(0, TAG)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Outcome of one rank.
pub type RankResult = Result<Option<LoopSummary>>;

/// Start `scenario` on every rank of `cluster`, each under its own monitor.
///
/// The coordinator draws on `output`. Each rank's result is its [`Monitor::finalize`] result,
/// or the error that stopped it.
pub fn spawn_monitored(
    cluster: &LocalCluster,
    scenario: Scenario,
    params: ScenarioParams,
    config: MonitorConfig,
    output: Box<dyn Write + Send>,
) -> Result<Job<RankResult>> {
    if cluster.size() < scenario.min_workers() {
        bail!(
            "{:?} needs at least {} workers, got {}",
            scenario,
            scenario.min_workers(),
            cluster.size()
        );
    }
    config.validate()?;

    let output = Mutex::new(Some(output));
    cluster
        .spawn(move |transport| -> RankResult {
            let taken = if transport.rank() == COORDINATOR {
                output.lock().unwrap_or_else(PoisonError::into_inner).take()
            } else {
                None
            };
            let out: Box<dyn Write + Send> = match taken {
                Some(out) => out,
                None => Box::new(io::sink()),
            };

            let monitor = Monitor::init_with_output(transport, &config, &call_site!(), out)?;
            scenario
                .run(&monitor.comm(), &params)
                .with_context(|| format!("rank {} stopped", monitor.rank()))?;
            monitor.finalize(&call_site!())
        })
        .context("failed to start workers")
}
