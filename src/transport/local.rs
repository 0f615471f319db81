//! In-process transport: every worker is a thread of the current process.
//!
//! All point-to-point and barrier state lives behind one mutex and one condition variable.
//! Windows are the exception: a put goes straight to the target's [`Region`] with atomic
//! stores and never touches the job lock, so instrumenting a blocked worker cannot be held up
//! by the transport's own bookkeeping.

use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;

use tracing::{debug, warn};

use super::{MessagePassing, Region, RemoteWindow, Tag, Transport, TransportError};

/// Tag reserved for broadcast traffic.
const BCAST_TAG: Tag = -1;

struct Envelope {
    seq: u64,
    src: usize,
    tag: Tag,
    payload: Vec<u8>,
    synchronous: bool,
}

#[derive(Default)]
struct WindowSlot {
    regions: Vec<Option<Arc<Region>>>,
}

#[derive(Default)]
struct State {
    aborted: Option<i32>,
    barrier_waiting: usize,
    barrier_generation: u64,
    mailboxes: Vec<VecDeque<Envelope>>,
    next_seq: u64,
    // Synchronous sends whose receive has not happened yet.
    unmatched: HashSet<u64>,
    windows: Vec<WindowSlot>,
    windows_created: Vec<usize>,
    finalized: Vec<bool>,
}

impl State {
    fn check_aborted(&self) -> Result<(), TransportError> {
        match self.aborted {
            Some(code) => Err(TransportError::Aborted { code }),
            None => Ok(()),
        }
    }
}

struct Shared {
    size: usize,
    epoch: Instant,
    state: Mutex<State>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, State>) -> MutexGuard<'a, State> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn check_rank(&self, target: usize) -> Result<(), TransportError> {
        if target < self.size {
            Ok(())
        } else {
            Err(TransportError::InvalidTarget {
                target,
                size: self.size,
            })
        }
    }
}

/// A job of `size` workers living in this process.
#[derive(Clone)]
pub struct LocalCluster {
    shared: Arc<Shared>,
}

/// Threads of a spawned job.
pub struct Job<R> {
    handles: Vec<thread::JoinHandle<R>>,
}

impl<R> Job<R> {
    /// Wait for every worker, in rank order.
    pub fn join(self) -> Vec<thread::Result<R>> {
        self.handles.into_iter().map(|h| h.join()).collect()
    }

    pub fn is_finished(&self) -> bool {
        self.handles.iter().all(|h| h.is_finished())
    }
}

impl LocalCluster {
    /// A job of `size` workers. A size of zero is treated as one.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let state = State {
            mailboxes: (0..size).map(|_| VecDeque::new()).collect(),
            windows_created: vec![0; size],
            finalized: vec![false; size],
            ..State::default()
        };
        LocalCluster {
            shared: Arc::new(Shared {
                size,
                epoch: Instant::now(),
                state: Mutex::new(state),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.shared.size
    }

    /// Transport endpoint for `rank`.
    pub fn transport(&self, rank: usize) -> LocalTransport {
        LocalTransport {
            shared: self.shared.clone(),
            rank,
        }
    }

    /// Run `body` once per rank, each on its own named thread.
    pub fn spawn<F, R>(&self, body: F) -> io::Result<Job<R>>
    where
        F: Fn(LocalTransport) -> R + Send + Sync + 'static,
        R: Send + 'static,
    {
        let body = Arc::new(body);
        let mut handles = Vec::with_capacity(self.size());
        for rank in 0..self.size() {
            let body = body.clone();
            let transport = self.transport(rank);
            let spawned = thread::Builder::new()
                .name(format!("rank-{rank}"))
                .spawn(move || body(transport));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Ranks already running would wait forever for the missing one.
                    self.abort(1);
                    return Err(e);
                }
            }
        }
        Ok(Job { handles })
    }

    pub fn abort(&self, code: i32) {
        let mut state = self.shared.lock();
        if state.aborted.is_none() {
            warn!(code, "aborting job");
            state.aborted = Some(code);
        }
        self.shared.changed.notify_all();
    }

    pub fn abort_code(&self) -> Option<i32> {
        self.shared.lock().aborted
    }
}

/// One rank's endpoint into a [`LocalCluster`].
#[derive(Clone)]
pub struct LocalTransport {
    shared: Arc<Shared>,
    rank: usize,
}

/// Completion handle of a non-blocking send.
#[derive(Debug)]
pub enum Request {
    /// Nothing left to wait for.
    Complete,
    /// Completes when the receiver takes message `seq`.
    Synchronous(u64),
}

impl LocalTransport {
    fn post(
        &self,
        dst: usize,
        tag: Tag,
        data: &[u8],
        synchronous: bool,
    ) -> Result<u64, TransportError> {
        self.shared.check_rank(dst)?;
        let mut state = self.shared.lock();
        state.check_aborted()?;
        let seq = state.next_seq;
        state.next_seq += 1;
        if synchronous {
            state.unmatched.insert(seq);
        }
        state.mailboxes[dst].push_back(Envelope {
            seq,
            src: self.rank,
            tag,
            payload: data.to_vec(),
            synchronous,
        });
        self.shared.changed.notify_all();
        Ok(seq)
    }

    fn wait_matched(&self, seq: u64) -> Result<(), TransportError> {
        let mut state = self.shared.lock();
        while state.unmatched.contains(&seq) {
            state.check_aborted()?;
            state = self.shared.wait(state);
        }
        Ok(())
    }
}

impl Transport for LocalTransport {
    type Window = LocalWindow;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn wtime(&self) -> f64 {
        self.shared.epoch.elapsed().as_secs_f64()
    }

    fn barrier(&self) -> Result<(), TransportError> {
        let mut state = self.shared.lock();
        state.check_aborted()?;
        let generation = state.barrier_generation;
        state.barrier_waiting += 1;
        if state.barrier_waiting == self.shared.size {
            state.barrier_waiting = 0;
            state.barrier_generation += 1;
            self.shared.changed.notify_all();
            return Ok(());
        }
        while state.barrier_generation == generation {
            state.check_aborted()?;
            state = self.shared.wait(state);
        }
        Ok(())
    }

    fn create_window(&self, local: Option<Arc<Region>>) -> Result<LocalWindow, TransportError> {
        let index = {
            let mut state = self.shared.lock();
            state.check_aborted()?;
            let index = state.windows_created[self.rank];
            state.windows_created[self.rank] += 1;
            if state.windows.len() <= index {
                state.windows.resize_with(index + 1, WindowSlot::default);
            }
            let slot = &mut state.windows[index];
            if slot.regions.is_empty() {
                slot.regions = vec![None; self.shared.size];
            }
            slot.regions[self.rank] = local;
            index
        };

        self.barrier()?;

        let regions = self.shared.lock().windows[index].regions.clone();
        debug!(rank = self.rank, index, "window created");
        Ok(LocalWindow {
            index,
            regions,
            epochs: (0..self.shared.size).map(|_| AtomicBool::new(false)).collect(),
        })
    }

    fn free_window(&self, window: LocalWindow) -> Result<(), TransportError> {
        self.barrier()?;
        let mut state = self.shared.lock();
        if let Some(slot) = state.windows.get_mut(window.index) {
            if let Some(region) = slot.regions.get_mut(self.rank) {
                *region = None;
            }
        }
        Ok(())
    }

    fn abort(&self, code: i32) {
        LocalCluster {
            shared: self.shared.clone(),
        }
        .abort(code);
    }

    fn finalize(&self) -> Result<(), TransportError> {
        let mut state = self.shared.lock();
        if state.finalized[self.rank] {
            return Err(TransportError::Finalized { rank: self.rank });
        }
        state.finalized[self.rank] = true;
        Ok(())
    }
}

impl MessagePassing for LocalTransport {
    type Request = Request;

    fn send(&self, dst: usize, tag: Tag, data: &[u8]) -> Result<(), TransportError> {
        self.post(dst, tag, data, false).map(|_| ())
    }

    fn ssend(&self, dst: usize, tag: Tag, data: &[u8]) -> Result<(), TransportError> {
        let seq = self.post(dst, tag, data, true)?;
        self.wait_matched(seq)
    }

    fn isend(&self, dst: usize, tag: Tag, data: &[u8]) -> Result<Request, TransportError> {
        self.post(dst, tag, data, false)?;
        Ok(Request::Complete)
    }

    fn issend(&self, dst: usize, tag: Tag, data: &[u8]) -> Result<Request, TransportError> {
        let seq = self.post(dst, tag, data, true)?;
        Ok(Request::Synchronous(seq))
    }

    fn recv(&self, src: usize, tag: Tag) -> Result<Vec<u8>, TransportError> {
        self.shared.check_rank(src)?;
        let mut state = self.shared.lock();
        loop {
            state.check_aborted()?;
            let found = state.mailboxes[self.rank]
                .iter()
                .position(|e| e.src == src && e.tag == tag);
            if let Some(pos) = found {
                if let Some(envelope) = state.mailboxes[self.rank].remove(pos) {
                    if envelope.synchronous {
                        state.unmatched.remove(&envelope.seq);
                        self.shared.changed.notify_all();
                    }
                    return Ok(envelope.payload);
                }
            }
            state = self.shared.wait(state);
        }
    }

    fn wait(&self, request: Request) -> Result<(), TransportError> {
        match request {
            Request::Complete => Ok(()),
            Request::Synchronous(seq) => self.wait_matched(seq),
        }
    }

    fn bcast(&self, root: usize, data: &mut Vec<u8>) -> Result<(), TransportError> {
        self.shared.check_rank(root)?;
        if self.rank == root {
            for dst in (0..self.shared.size).filter(|r| *r != root) {
                self.post(dst, BCAST_TAG, data, false)?;
            }
            Ok(())
        } else {
            *data = self.recv(root, BCAST_TAG)?;
            Ok(())
        }
    }
}

/// A rank's handle on a collectively created window.
pub struct LocalWindow {
    index: usize,
    regions: Vec<Option<Arc<Region>>>,
    epochs: Box<[AtomicBool]>,
}

impl LocalWindow {
    fn region(&self, target: usize) -> Result<&Arc<Region>, TransportError> {
        self.regions
            .get(target)
            .and_then(Option::as_ref)
            .ok_or(TransportError::InvalidTarget {
                target,
                size: self.regions.len(),
            })
    }
}

impl RemoteWindow for LocalWindow {
    fn lock_shared(&self, target: usize) -> Result<(), TransportError> {
        self.region(target)?;
        self.epochs[target].store(true, Ordering::Release);
        Ok(())
    }

    fn unlock(&self, target: usize) -> Result<(), TransportError> {
        self.region(target)?;
        if !self.epochs[target].swap(false, Ordering::AcqRel) {
            return Err(TransportError::NotLocked { target });
        }
        Ok(())
    }

    fn put(&self, target: usize, offset: usize, data: &[u64]) -> Result<(), TransportError> {
        let region = self.region(target)?;
        if !self.epochs[target].load(Ordering::Acquire) {
            return Err(TransportError::NotLocked { target });
        }
        region.store(offset, data)
    }
}
