//! Startup and shutdown of the monitor on one rank.
//!
//! [`Monitor::init`] is collective: every rank of the job must call it, and it returns once the
//! table exists, every rank announced itself and the startup barrier passed.
//! [`Monitor::finalize`] is the matching collective teardown.

use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::comm::MonitoredComm;
use crate::config::MonitorConfig;
use crate::operation::OperationKind;
use crate::probe::{self, StatusSink};
use crate::record::{CallSite, FieldLimits, Phase, StatusRecord};
use crate::snapshot_loop::{LoopHandle, LoopSummary, SnapshotLoop};
use crate::table::{SnapshotBuffer, StatusTable, COORDINATOR};
use crate::transport::{MessagePassing, Transport};

/// Everything the monitor keeps on one rank.
pub struct Monitor<T: Transport> {
    transport: T,
    rank: usize,
    table: Option<StatusTable<T::Window>>,
    snapshot: Option<LoopHandle>,
    limits: FieldLimits,
    force_synchronous_sends: bool,
}

impl<T: Transport> Monitor<T> {
    /// Start monitoring, drawing the dashboard on stdout.
    pub fn init(transport: T, config: &MonitorConfig, site: &CallSite) -> Result<Self> {
        Self::init_with_output(transport, config, site, Box::new(io::stdout()))
    }

    /// Start monitoring. Only the coordinator uses `output`.
    pub fn init_with_output(
        transport: T,
        config: &MonitorConfig,
        site: &CallSite,
        output: Box<dyn Write + Send>,
    ) -> Result<Self> {
        config.validate()?;
        let refresh_interval = config.refresh_interval()?;
        let rank = transport.rank();

        let table = StatusTable::create(&transport)?;
        table
            .acquire()
            .context("failed to open access to the status table")?;

        let snapshot = match table.reader() {
            Some(reader) => {
                let clock = transport.clone();
                let spawned = SnapshotLoop::new(
                    reader,
                    move || clock.wtime(),
                    refresh_interval,
                    config.clear_screen,
                    output,
                )
                .spawn();
                match spawned {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        // The other ranks are about to wait for us at the barrier.
                        transport.abort(1);
                        return Err(e);
                    }
                }
            }
            None => None,
        };

        let monitor = Monitor {
            transport,
            rank,
            table: Some(table),
            snapshot,
            limits: config.limits(),
            force_synchronous_sends: config.force_synchronous_sends,
        };
        monitor.announce(OperationKind::Initialized, Phase::Completed, site);
        monitor
            .transport
            .barrier()
            .context("startup barrier failed")?;

        if monitor.is_coordinator() {
            info!(workers = monitor.size(), "monitor started");
        }
        Ok(monitor)
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.transport.size()
    }

    pub fn is_coordinator(&self) -> bool {
        self.rank == COORDINATOR
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn force_synchronous_sends(&self) -> bool {
        self.force_synchronous_sends
    }

    /// Run `thunk` as `operation`, announcing it on this rank's row.
    pub fn instrument<R>(
        &self,
        operation: OperationKind,
        site: &CallSite,
        thunk: impl FnOnce() -> R,
    ) -> R {
        probe::instrument(self, operation, site, thunk)
    }

    /// The table as the coordinator currently sees it; `None` on other ranks.
    pub fn snapshot(&self) -> Option<Vec<StatusRecord>> {
        let reader = self.table.as_ref()?.reader()?;
        let mut buffer = SnapshotBuffer::new();
        reader.snapshot(&mut buffer);
        Some(buffer.records().to_vec())
    }

    /// Announce `Finalize`, tear the table down and finalize the transport.
    ///
    /// Returns the dashboard's summary on the coordinator and `None` elsewhere. Blocks until
    /// every rank has called it.
    pub fn finalize(mut self, site: &CallSite) -> Result<Option<LoopSummary>> {
        self.announce(OperationKind::Finalized, Phase::Entering, site);

        let Some(table) = self.table.take() else {
            return Ok(None);
        };
        table
            .release()
            .context("failed to close access to the status table")?;
        self.transport
            .barrier()
            .context("shutdown barrier failed")?;

        let summary = match self.snapshot.take() {
            Some(handle) => Some(handle.join()?),
            None => None,
        };
        table.destroy(&self.transport)?;
        self.transport
            .finalize()
            .context("failed to finalize transport")?;

        if let Some(summary) = &summary {
            info!(frames = summary.frames, "monitor finalized");
        }
        Ok(summary)
    }
}

impl<T: Transport + MessagePassing> Monitor<T> {
    /// Instrumented primitives for user code.
    pub fn comm(&self) -> MonitoredComm<'_, T> {
        MonitoredComm::new(self)
    }
}

impl<T: Transport> StatusSink for Monitor<T> {
    fn announce(&self, operation: OperationKind, phase: Phase, site: &CallSite) {
        let Some(table) = &self.table else {
            return;
        };
        let now = self.transport.wtime();
        let record = StatusRecord::new(operation, phase, site, now, &self.limits);
        if let Err(e) = table.publish(&record) {
            debug!(rank = self.rank, %operation, "failed to publish status: {}", e);
        }
    }
}

impl<T: Transport> Drop for Monitor<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.snapshot.take() {
            handle.stop();
            if let Err(e) = handle.join() {
                warn!("{:#}", e);
            }
        }
        if let Some(table) = self.table.take() {
            if let Err(e) = table.release() {
                debug!(rank = self.rank, "failed to release status table: {}", e);
            }
        }
    }
}
