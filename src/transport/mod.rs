//! The message-passing layer the monitor runs on top of.
//!
//! The monitor itself only needs what [`Transport`] and [`RemoteWindow`] describe: rank and size,
//! a shared monotonic clock, a barrier, and a collectively created window over memory that other
//! ranks can write into with one-sided puts. [`MessagePassing`] carries the user-level primitives
//! the instrumented layer in [`crate::comm`] wraps.
//!
//! [`local`] implements all three for workers that are threads of one process.

pub mod local;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;

pub use local::{Job, LocalCluster, LocalTransport, LocalWindow, Request};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("job aborted with code {code}")]
    Aborted { code: i32 },
    #[error("no access epoch open on target rank {target}")]
    NotLocked { target: usize },
    #[error("rank {target} is not part of a job of {size} workers")]
    InvalidTarget { target: usize, size: usize },
    #[error("put of {len} words at offset {offset} overruns a region of {capacity} words")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },
    #[error("rank {rank} already finalized")]
    Finalized { rank: usize },
    #[error("collective call mismatch: {0}")]
    MismatchedCollective(String),
}

/// Memory a rank exposes for one-sided access.
///
/// Backed by atomic words: a put stores whole words and a copy loads whole words, so readers and
/// writers never exclude each other. All accesses are relaxed. A reader racing a put can see some
/// words of the old value and some of the new one.
pub struct Region {
    words: Box<[AtomicU64]>,
}

impl Region {
    /// Allocate a zeroed region, reporting allocation failure instead of aborting the process.
    pub fn try_zeroed(len: usize) -> Result<Self, std::collections::TryReserveError> {
        let mut words = Vec::new();
        words.try_reserve_exact(len)?;
        words.extend((0..len).map(|_| AtomicU64::new(0)));
        Ok(Region {
            words: words.into_boxed_slice(),
        })
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn store(&self, offset: usize, data: &[u64]) -> Result<(), TransportError> {
        let end = offset
            .checked_add(data.len())
            .filter(|end| *end <= self.words.len())
            .ok_or(TransportError::OutOfBounds {
                offset,
                len: data.len(),
                capacity: self.words.len(),
            })?;
        for (slot, value) in self.words[offset..end].iter().zip(data) {
            slot.store(*value, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Copy the whole region into `out`, which is resized to fit.
    pub fn load_into(&self, out: &mut Vec<u64>) {
        out.clear();
        out.extend(self.words.iter().map(|w| w.load(Ordering::Relaxed)));
    }
}

/// Handle used to write into memory exposed by other ranks.
pub trait RemoteWindow: Send + Sync {
    /// Open a shared passive-target access epoch on `target`.
    fn lock_shared(&self, target: usize) -> Result<(), TransportError>;

    /// Close the access epoch on `target`.
    fn unlock(&self, target: usize) -> Result<(), TransportError>;

    /// One-sided write of `data` at word `offset` in `target`'s region. Never waits for the
    /// target.
    fn put(&self, target: usize, offset: usize, data: &[u64]) -> Result<(), TransportError>;
}

/// What the monitor needs from the underlying runtime.
pub trait Transport: Clone + Send + Sync + 'static {
    type Window: RemoteWindow + 'static;

    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Monotonic seconds on a clock every rank shares.
    fn wtime(&self) -> f64;

    fn barrier(&self) -> Result<(), TransportError>;

    /// Collective: every rank calls it, each passing the memory it exposes, if any.
    fn create_window(&self, local: Option<Arc<Region>>) -> Result<Self::Window, TransportError>;

    /// Collective: returns once every rank released the window.
    fn free_window(&self, window: Self::Window) -> Result<(), TransportError>;

    /// Tear the whole job down. Blocked calls on every rank fail with
    /// [`TransportError::Aborted`].
    fn abort(&self, code: i32);

    fn finalize(&self) -> Result<(), TransportError>;
}

/// Message tag.
pub type Tag = i32;

/// Point-to-point and collective primitives available to user code.
pub trait MessagePassing {
    type Request;

    /// Standard-mode send. May return before the receiver posts a matching receive.
    fn send(&self, dst: usize, tag: Tag, data: &[u8]) -> Result<(), TransportError>;

    /// Synchronous send: returns only once the matching receive has taken the message.
    fn ssend(&self, dst: usize, tag: Tag, data: &[u8]) -> Result<(), TransportError>;

    fn isend(&self, dst: usize, tag: Tag, data: &[u8]) -> Result<Self::Request, TransportError>;

    fn issend(&self, dst: usize, tag: Tag, data: &[u8]) -> Result<Self::Request, TransportError>;

    fn recv(&self, src: usize, tag: Tag) -> Result<Vec<u8>, TransportError>;

    fn wait(&self, request: Self::Request) -> Result<(), TransportError>;

    /// Root's `data` is delivered into every other rank's `data`.
    fn bcast(&self, root: usize, data: &mut Vec<u8>) -> Result<(), TransportError>;
}
