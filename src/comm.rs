//! Instrumented message-passing primitives.
//!
//! Each method is one call through [`Monitor::instrument`], tagged with the caller's source
//! location. With `force_synchronous_sends` set, every send-family call is turned into its
//! synchronous counterpart and reported under that name.

use std::borrow::Cow;

use crate::monitor::Monitor;
use crate::operation::OperationKind;
use crate::record::CallSite;
use crate::transport::{MessagePassing, Tag, Transport, TransportError};

/// User-facing primitives of one rank.
pub struct MonitoredComm<'m, T: Transport + MessagePassing> {
    monitor: &'m Monitor<T>,
}

#[track_caller]
fn site(text: String) -> CallSite {
    CallSite::caller(Cow::Owned(text))
}

fn send_text(dst: usize, tag: Tag, data: &[u8]) -> String {
    format!("dst={} tag={} len={}", dst, tag, data.len())
}

impl<'m, T: Transport + MessagePassing> MonitoredComm<'m, T> {
    pub fn new(monitor: &'m Monitor<T>) -> Self {
        MonitoredComm { monitor }
    }

    pub fn rank(&self) -> usize {
        self.monitor.rank()
    }

    pub fn size(&self) -> usize {
        self.monitor.size()
    }

    fn effective(&self, operation: OperationKind) -> OperationKind {
        if self.monitor.force_synchronous_sends() {
            operation.synchronous_counterpart()
        } else {
            operation
        }
    }

    fn blocking_send(
        &self,
        operation: OperationKind,
        site: CallSite,
        dst: usize,
        tag: Tag,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let t = self.monitor.transport();
        match self.effective(operation) {
            OperationKind::Ssend => {
                self.monitor
                    .instrument(OperationKind::Ssend, &site, || t.ssend(dst, tag, data))
            }
            op => self.monitor.instrument(op, &site, || t.send(dst, tag, data)),
        }
    }

    fn nonblocking_send(
        &self,
        operation: OperationKind,
        site: CallSite,
        dst: usize,
        tag: Tag,
        data: &[u8],
    ) -> Result<T::Request, TransportError> {
        let t = self.monitor.transport();
        match self.effective(operation) {
            OperationKind::Issend => {
                self.monitor
                    .instrument(OperationKind::Issend, &site, || t.issend(dst, tag, data))
            }
            op => self.monitor.instrument(op, &site, || t.isend(dst, tag, data)),
        }
    }

    #[track_caller]
    pub fn send(&self, dst: usize, tag: Tag, data: &[u8]) -> Result<(), TransportError> {
        let site = site(send_text(dst, tag, data));
        self.blocking_send(OperationKind::Send, site, dst, tag, data)
    }

    /// Buffered-mode send; the local transport always buffers.
    #[track_caller]
    pub fn bsend(&self, dst: usize, tag: Tag, data: &[u8]) -> Result<(), TransportError> {
        let site = site(send_text(dst, tag, data));
        self.blocking_send(OperationKind::Bsend, site, dst, tag, data)
    }

    /// Ready-mode send.
    #[track_caller]
    pub fn rsend(&self, dst: usize, tag: Tag, data: &[u8]) -> Result<(), TransportError> {
        let site = site(send_text(dst, tag, data));
        self.blocking_send(OperationKind::Rsend, site, dst, tag, data)
    }

    #[track_caller]
    pub fn ssend(&self, dst: usize, tag: Tag, data: &[u8]) -> Result<(), TransportError> {
        let site = site(send_text(dst, tag, data));
        self.blocking_send(OperationKind::Ssend, site, dst, tag, data)
    }

    #[track_caller]
    pub fn isend(&self, dst: usize, tag: Tag, data: &[u8]) -> Result<T::Request, TransportError> {
        let site = site(send_text(dst, tag, data));
        self.nonblocking_send(OperationKind::Isend, site, dst, tag, data)
    }

    #[track_caller]
    pub fn ibsend(&self, dst: usize, tag: Tag, data: &[u8]) -> Result<T::Request, TransportError> {
        let site = site(send_text(dst, tag, data));
        self.nonblocking_send(OperationKind::Ibsend, site, dst, tag, data)
    }

    #[track_caller]
    pub fn irsend(&self, dst: usize, tag: Tag, data: &[u8]) -> Result<T::Request, TransportError> {
        let site = site(send_text(dst, tag, data));
        self.nonblocking_send(OperationKind::Irsend, site, dst, tag, data)
    }

    #[track_caller]
    pub fn issend(&self, dst: usize, tag: Tag, data: &[u8]) -> Result<T::Request, TransportError> {
        let site = site(send_text(dst, tag, data));
        self.nonblocking_send(OperationKind::Issend, site, dst, tag, data)
    }

    #[track_caller]
    pub fn recv(&self, src: usize, tag: Tag) -> Result<Vec<u8>, TransportError> {
        let site = site(format!("src={} tag={}", src, tag));
        let t = self.monitor.transport();
        self.monitor.instrument(OperationKind::Recv, &site, || t.recv(src, tag))
    }

    #[track_caller]
    pub fn wait(&self, request: T::Request) -> Result<(), TransportError> {
        let site = site(String::from("request"));
        let t = self.monitor.transport();
        self.monitor.instrument(OperationKind::Wait, &site, || t.wait(request))
    }

    #[track_caller]
    pub fn barrier(&self) -> Result<(), TransportError> {
        let site = site(String::new());
        let t = self.monitor.transport();
        self.monitor.instrument(OperationKind::Barrier, &site, || t.barrier())
    }

    #[track_caller]
    pub fn bcast(&self, root: usize, data: &mut Vec<u8>) -> Result<(), TransportError> {
        let site = site(format!("root={} len={}", root, data.len()));
        let t = self.monitor.transport();
        self.monitor.instrument(OperationKind::Bcast, &site, || t.bcast(root, data))
    }
}
