//! The coordinator's background dashboard.
//!
//! Each cycle copies the table, checks whether every rank has finalized, draws one frame and
//! sleeps out the rest of the refresh interval. The loop ends after drawing the first frame in
//! which every rank reads `Finalize`, or when its owner asks it to stop.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use tracing::{debug, warn};

use crate::record::StatusRecord;
use crate::render::{render_frame, write_frame};
use crate::table::{SnapshotBuffer, TableReader};

/// True iff every slot currently reads `Finalize`.
pub fn all_finalized(records: &[StatusRecord]) -> bool {
    records.iter().all(StatusRecord::is_finalized)
}

/// What the loop did before it exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub frames: u64,
    /// Whether the last frame showed every rank finalized.
    pub finalized: bool,
}

pub struct SnapshotLoop<C> {
    reader: TableReader,
    clock: C,
    interval: Duration,
    clear_screen: bool,
    output: Box<dyn Write + Send>,
    stop: Arc<AtomicBool>,
}

impl<C> SnapshotLoop<C>
where
    C: Fn() -> f64 + Send + 'static,
{
    /// `clock` must be the clock the ranks stamp their records with.
    pub fn new(
        reader: TableReader,
        clock: C,
        interval: Duration,
        clear_screen: bool,
        output: Box<dyn Write + Send>,
    ) -> Self {
        SnapshotLoop {
            reader,
            clock,
            interval,
            clear_screen,
            output,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn run(mut self) -> LoopSummary {
        let beginning = (self.clock)();
        let mut buffer = SnapshotBuffer::new();
        let mut frames = 0;
        let mut write_failed = false;

        loop {
            let cycle_start = Instant::now();

            self.reader.snapshot(&mut buffer);
            let finalized = all_finalized(buffer.records());

            let now = (self.clock)();
            let frame = render_frame(buffer.records(), now, now - beginning);
            if let Err(e) = write_frame(&mut self.output, &frame, self.clear_screen) {
                if !write_failed {
                    warn!("failed to draw dashboard: {}", e);
                    write_failed = true;
                }
            }
            frames += 1;

            if finalized || self.stop.load(Ordering::Acquire) {
                debug!(frames, finalized, "snapshot loop exiting");
                return LoopSummary { frames, finalized };
            }

            if let Some(rest) = self.interval.checked_sub(cycle_start.elapsed()) {
                thread::sleep(rest);
            }
        }
    }

    /// Run the loop on its own thread.
    pub fn spawn(self) -> Result<LoopHandle> {
        let stop = self.stop.clone();
        let handle = thread::Builder::new()
            .name("snapshot_loop".to_string())
            .spawn(move || self.run())
            .context("failed to spawn snapshot loop")?;
        Ok(LoopHandle { handle, stop })
    }
}

/// A running [`SnapshotLoop`].
pub struct LoopHandle {
    handle: JoinHandle<LoopSummary>,
    stop: Arc<AtomicBool>,
}

impl LoopHandle {
    /// Ask the loop to exit after its next frame.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn join(self) -> Result<LoopSummary> {
        self.handle
            .join()
            .map_err(|_| anyhow!("snapshot loop panicked"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationKind;
    use crate::record::{CallSite, FieldLimits, Phase};
    use crate::table::StatusTable;
    use crate::transport::{LocalCluster, Transport};
    use rand::Rng;
    use std::io;
    use std::sync::Mutex;

    fn record(operation: OperationKind) -> StatusRecord {
        StatusRecord::new(
            operation,
            Phase::Entering,
            &CallSite::new("job.rs", 1, ""),
            0.0,
            &FieldLimits::default(),
        )
    }

    #[test]
    fn test_all_finalized_iff_every_slot_finalized() {
        let mut rng = rand::rng();
        let kinds = [
            OperationKind::Uninitialized,
            OperationKind::Initialized,
            OperationKind::Ssend,
            OperationKind::Finalized,
        ];
        for _ in 0..200 {
            let len = rng.random_range(1..16);
            let records: Vec<StatusRecord> = (0..len)
                .map(|_| record(kinds[rng.random_range(0..kinds.len())]))
                .collect();
            let expected = records
                .iter()
                .filter(|r| r.operation == OperationKind::Finalized)
                .count()
                == records.len();
            assert_eq!(all_finalized(&records), expected);
        }
    }

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("closed"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_exits_once_finalized() {
        let cluster = LocalCluster::new(1);
        let transport = cluster.transport(0);
        let table = StatusTable::create(&transport).unwrap();
        table.acquire().unwrap();
        let finalize = record(OperationKind::Finalized);
        table.publish(&finalize).unwrap();

        let out = Shared::default();
        let clock = transport.clone();
        let summary = SnapshotLoop::new(
            table.reader().unwrap(),
            move || clock.wtime(),
            Duration::from_millis(1),
            false,
            Box::new(out.clone()),
        )
        .run();

        assert_eq!(
            summary,
            LoopSummary {
                frames: 1,
                finalized: true
            }
        );
        let text = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        assert!(text.starts_with("Runtime: "));
        assert!(text.contains("Finalize"));
    }

    #[test]
    fn test_stop_ends_unfinished_loop() {
        let cluster = LocalCluster::new(1);
        let transport = cluster.transport(0);
        let table = StatusTable::create(&transport).unwrap();

        let clock = transport.clone();
        let handle = SnapshotLoop::new(
            table.reader().unwrap(),
            move || clock.wtime(),
            Duration::from_millis(5),
            true,
            Box::new(Broken),
        )
        .spawn()
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        handle.stop();
        let summary = handle.join().unwrap();
        assert!(!summary.finalized);
        assert!(summary.frames >= 1);
    }
}
