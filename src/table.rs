//! The shared status table.
//!
//! One slot per rank, all of them living in memory owned by the coordinator. Every rank writes
//! its own slot with one-sided puts; only the coordinator reads, by copying the whole region into
//! a [`SnapshotBuffer`]. Nothing orders a copy against a put, so a slot can be read half-written.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, error};

use crate::record::{RawStatusRecord, StatusRecord, SLOT_WORDS};
use crate::transport::{Region, RemoteWindow, Transport, TransportError};

/// Rank that owns the table and runs the dashboard.
pub const COORDINATOR: usize = 0;

/// A rank's handle on the table.
pub struct StatusTable<W> {
    window: W,
    local: Option<Arc<Region>>,
    rank: usize,
    size: usize,
}

impl<W: RemoteWindow> StatusTable<W> {
    /// Collective. The coordinator allocates one slot per rank, marks every slot unset, and
    /// exposes the region; the other ranks only attach.
    ///
    /// If the coordinator cannot allocate the region the whole job is aborted.
    pub fn create<T>(transport: &T) -> Result<Self>
    where
        T: Transport<Window = W>,
    {
        let rank = transport.rank();
        let size = transport.size();

        let local = if rank == COORDINATOR {
            let region = match allocate(size) {
                Ok(region) => region,
                Err(e) => {
                    error!("failed to allocate status table for {} ranks: {:#}", size, e);
                    transport.abort(1);
                    return Err(e);
                }
            };
            let unset = RawStatusRecord::from(&StatusRecord::uninitialized(transport.wtime()));
            let words = unset.to_words();
            for slot in 0..size {
                region
                    .store(slot * SLOT_WORDS, &words)
                    .context("failed to initialize status slot")?;
            }
            Some(Arc::new(region))
        } else {
            None
        };

        let window = transport
            .create_window(local.clone())
            .context("failed to expose status table")?;
        debug!(rank, size, "status table attached");

        Ok(StatusTable {
            window,
            local,
            rank,
            size,
        })
    }

    /// Open the passive access epoch on the coordinator's region. Held for the whole run.
    pub fn acquire(&self) -> Result<(), TransportError> {
        self.window.lock_shared(COORDINATOR)
    }

    pub fn release(&self) -> Result<(), TransportError> {
        self.window.unlock(COORDINATOR)
    }

    /// Overwrite this rank's slot. Does not wait for the coordinator.
    pub fn publish(&self, record: &StatusRecord) -> Result<(), TransportError> {
        let words = RawStatusRecord::from(record).to_words();
        self.window.put(COORDINATOR, self.rank * SLOT_WORDS, &words)
    }

    /// Read side of the table; `None` except on the coordinator.
    pub fn reader(&self) -> Option<TableReader> {
        self.local.as_ref().map(|region| TableReader {
            region: region.clone(),
            size: self.size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Collective. Every rank must have stopped publishing.
    pub fn destroy<T>(self, transport: &T) -> Result<()>
    where
        T: Transport<Window = W>,
    {
        transport
            .free_window(self.window)
            .context("failed to release status table")
    }
}

fn allocate(size: usize) -> Result<Region> {
    let Some(words) = size.checked_mul(SLOT_WORDS) else {
        bail!("status table for {} ranks does not fit in memory", size);
    };
    Region::try_zeroed(words).context("out of memory")
}

/// The coordinator's read access to the table.
#[derive(Clone)]
pub struct TableReader {
    region: Arc<Region>,
    size: usize,
}

impl TableReader {
    pub fn size(&self) -> usize {
        self.size
    }

    /// Copy the whole table into `buffer` and decode it.
    pub fn snapshot(&self, buffer: &mut SnapshotBuffer) {
        self.region.load_into(&mut buffer.words);
        buffer.records.clear();
        buffer.records.extend(
            buffer
                .words
                .chunks_exact(SLOT_WORDS)
                .take(self.size)
                .map(decode_slot),
        );
    }
}

fn decode_slot(words: &[u64]) -> StatusRecord {
    match RawStatusRecord::from_words(words) {
        Ok(raw) => StatusRecord::from(&raw),
        Err(_) => StatusRecord::uninitialized(0.0),
    }
}

/// Coordinator-private copy of the table, refreshed once per frame.
#[derive(Default)]
pub struct SnapshotBuffer {
    words: Vec<u64>,
    records: Vec<StatusRecord>,
}

impl SnapshotBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[StatusRecord] {
        &self.records
    }
}
