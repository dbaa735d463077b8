//! Debounced pass scheduling

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tracing::trace;

/// Schedules at most one pending evaluation pass per burst of changes
///
/// Queue change listeners call [`ChangeNotifier::schedule`]; the engine task
/// waits on [`ChangeNotifier::notified`] and claims the pass with
/// [`ChangeNotifier::take`]. Scheduling never runs a pass inline.
#[derive(Debug, Default)]
pub struct ChangeNotifier {
    pending: AtomicBool,
    wake: Notify,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a pass; returns true only if none was pending
    pub fn schedule(&self) -> bool {
        let newly = !self.pending.swap(true, Ordering::AcqRel);
        if newly {
            trace!("Pass scheduled");
            self.wake.notify_one();
        }
        newly
    }

    /// Claim the pending pass, if any
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Wait until a pass has been scheduled
    pub async fn notified(&self) {
        self.wake.notified().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_burst_schedules_once() {
        let notifier = ChangeNotifier::new();
        assert!(notifier.schedule());
        assert!(!notifier.schedule());
        assert!(!notifier.schedule());
        assert!(notifier.is_pending());

        assert!(notifier.take());
        assert!(!notifier.take());
        assert!(!notifier.is_pending());
    }

    #[test]
    fn test_schedule_after_take_opens_new_batch() {
        let notifier = ChangeNotifier::new();
        notifier.schedule();
        notifier.take();
        assert!(notifier.schedule());
    }

    #[tokio::test]
    async fn test_notified_wakes_waiter() {
        let notifier = Arc::new(ChangeNotifier::new());
        let waiter = {
            let notifier = notifier.clone();
            tokio::spawn(async move {
                notifier.notified().await;
                notifier.take()
            })
        };

        tokio::task::yield_now().await;
        notifier.schedule();

        let claimed = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(claimed);
    }
}
