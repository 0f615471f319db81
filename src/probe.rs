//! Call-site instrumentation.
//!
//! [`instrument`] brackets any call with two announcements, one before and one after. It never
//! looks at what the call returns.

use crate::operation::OperationKind;
use crate::record::{CallSite, Phase};

/// Something that can be told what the current rank is doing.
pub trait StatusSink {
    /// Record that `operation`, issued from `site`, is about to run or has just returned.
    /// Must not block on other ranks and must not fail the caller.
    fn announce(&self, operation: OperationKind, phase: Phase, site: &CallSite);
}

impl<S: StatusSink + ?Sized> StatusSink for &S {
    fn announce(&self, operation: OperationKind, phase: Phase, site: &CallSite) {
        (**self).announce(operation, phase, site)
    }
}

/// Run `thunk` between an `Entering` and a `Completed` announcement and hand back whatever it
/// returned.
///
/// A panic inside `thunk` unwinds past the second announcement, leaving the rank shown as
/// still inside `operation`.
pub fn instrument<S, R, F>(sink: &S, operation: OperationKind, site: &CallSite, thunk: F) -> R
where
    S: StatusSink + ?Sized,
    F: FnOnce() -> R,
{
    sink.announce(operation, Phase::Entering, site);
    let result = thunk();
    sink.announce(operation, Phase::Completed, site);
    result
}

/// Instrument a single expression, using its source text as the call site.
///
/// ```ignore
/// let data = probe!(monitor, OperationKind::Recv, transport.recv(0, 7))?;
/// ```
#[macro_export]
macro_rules! probe {
    ($sink:expr, $operation:expr, $call:expr) => {
        $crate::probe::instrument(&$sink, $operation, &$crate::call_site!($call), || $call)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[derive(Default)]
    struct Recorder {
        events: RefCell<Vec<(OperationKind, Phase, u32)>>,
    }

    impl StatusSink for Recorder {
        fn announce(&self, operation: OperationKind, phase: Phase, site: &CallSite) {
            self.events.borrow_mut().push((operation, phase, site.line));
        }
    }

    impl Recorder {
        fn count(&self, phase: Phase) -> usize {
            self.events
                .borrow()
                .iter()
                .filter(|(_, p, _)| *p == phase)
                .count()
        }
    }

    #[test]
    fn test_brackets_the_call() {
        let recorder = Recorder::default();
        let site = CallSite::new("job.rs", 3, "x");
        let value = instrument(&recorder, OperationKind::Ssend, &site, || {
            assert_eq!(recorder.events.borrow().len(), 1);
            17
        });
        assert_eq!(value, 17);
        assert_eq!(
            *recorder.events.borrow(),
            vec![
                (OperationKind::Ssend, Phase::Entering, 3),
                (OperationKind::Ssend, Phase::Completed, 3),
            ]
        );
    }

    #[test]
    fn test_errors_pass_through() {
        let recorder = Recorder::default();
        let site = CallSite::new("job.rs", 1, "");
        let result: Result<(), &str> =
            instrument(&recorder, OperationKind::Recv, &site, || Err("truncated"));
        assert_eq!(result, Err("truncated"));
        assert_eq!(recorder.count(Phase::Completed), 1);
    }

    #[test]
    fn test_entering_matches_completed() {
        let recorder = Recorder::default();
        for (i, op) in OperationKind::ALL.iter().enumerate().take(40) {
            let site = CallSite::new("job.rs", i as u32, "");
            instrument(&recorder, *op, &site, || i);
        }
        assert_eq!(recorder.count(Phase::Entering), 40);
        assert_eq!(recorder.count(Phase::Completed), 40);
    }

    #[test]
    fn test_panic_leaves_operation_started() {
        let recorder = Recorder::default();
        let site = CallSite::new("job.rs", 9, "");
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            instrument(&recorder, OperationKind::Barrier, &site, || panic!("boom"))
        }));
        assert!(outcome.is_err());
        assert_eq!(
            recorder.events.borrow().last(),
            Some(&(OperationKind::Barrier, Phase::Entering, 9))
        );
    }

    #[test]
    fn test_probe_macro() {
        let recorder = Recorder::default();
        let sum = crate::probe!(recorder, OperationKind::Reduce, 2 + 3);
        assert_eq!(sum, 5);
        assert_eq!(recorder.count(Phase::Entering), 1);
        assert_eq!(recorder.count(Phase::Completed), 1);
    }
}
