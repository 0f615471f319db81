//! rankwatch library - live status monitoring for message-passing jobs.
//!
//! Every rank announces what it is about to do and what it just finished into a table owned by
//! rank 0, using one-sided writes that never wait on the reader. Rank 0 redraws the table a few
//! times per second, so a stuck job shows exactly which call each rank is sitting in.
//!
//! # Modules
//!
//! - [`monitor`] - Startup and shutdown on each rank, the entry point
//! - [`comm`] - Instrumented message-passing primitives
//! - [`probe`] - Generic before/after instrumentation of any call
//! - [`table`] - The shared status table
//! - [`snapshot_loop`] - The coordinator's redraw loop
//! - [`render`] - Text layout of one frame
//! - [`transport`] - The runtime the monitor sits on, plus an in-process implementation
//! - [`scenarios`] - Demo jobs
//!
//! # Example
//!
//! ```no_run
//! use rankwatch::transport::LocalCluster;
//! use rankwatch::{call_site, Monitor, MonitorConfig};
//!
//! let cluster = LocalCluster::new(2);
//! let job = cluster
//!     .spawn(|transport| -> anyhow::Result<()> {
//!         let monitor = Monitor::init(transport, &MonitorConfig::default(), &call_site!())?;
//!         let comm = monitor.comm();
//!         if comm.rank() == 0 {
//!             comm.ssend(1, 0, b"hello")?;
//!         } else {
//!             comm.recv(0, 0)?;
//!         }
//!         monitor.finalize(&call_site!())?;
//!         Ok(())
//!     })
//!     .expect("Failed to start workers");
//! for result in job.join() {
//!     result.expect("worker panicked").expect("worker failed");
//! }
//! ```

pub mod comm;
pub mod config;
pub mod monitor;
pub mod operation;
pub mod probe;
pub mod record;
pub mod render;
pub mod scenarios;
pub mod snapshot_loop;
pub mod table;
pub mod transport;

// Re-export for convenience
pub use comm::MonitoredComm;
pub use config::MonitorConfig;
pub use monitor::Monitor;
pub use operation::OperationKind;
pub use probe::{instrument, StatusSink};
pub use record::{CallSite, Phase, StatusRecord};
pub use snapshot_loop::LoopSummary;
