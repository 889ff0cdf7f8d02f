//! Progress bar for sync runs.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use songsync_core::{SyncEvent, SyncObserver, TracingObserver};

/// Logs every event and, when enabled, drives a progress bar.
pub(crate) struct ProgressObserver {
    bar: Option<ProgressBar>,
    log: TracingObserver,
}

impl ProgressObserver {
    /// Creates the observer. Without `use_bar` it only logs.
    pub(crate) fn new(use_bar: bool, total: usize) -> Self {
        let bar = use_bar.then(|| {
            let bar = ProgressBar::new(total as u64);
            bar.set_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] {wide_msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });
        Self {
            bar,
            log: TracingObserver,
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.bar.is_some()
    }

    /// Clears the bar; safe to call more than once.
    pub(crate) fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

impl SyncObserver for ProgressObserver {
    fn on_event(&self, event: &SyncEvent) {
        let Some(bar) = &self.bar else {
            self.log.on_event(event);
            return;
        };
        bar.suspend(|| self.log.on_event(event));
        match event {
            SyncEvent::QueryStarted { query, .. } => bar.set_message(query.clone()),
            SyncEvent::QueryFinished { .. } => bar.inc(1),
            SyncEvent::RunFinished { .. } => bar.finish_and_clear(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_observer_disabled_has_no_bar() {
        let observer = ProgressObserver::new(false, 3);
        assert!(!observer.is_enabled());
        observer.on_event(&SyncEvent::QueryFinished {
            index: 0,
            succeeded: true,
        });
        observer.finish();
    }

    #[test]
    fn test_progress_observer_counts_finished_queries() {
        let observer = ProgressObserver::new(true, 2);
        assert!(observer.is_enabled());
        observer.on_event(&SyncEvent::QueryFinished {
            index: 0,
            succeeded: false,
        });
        assert_eq!(observer.bar.as_ref().map(ProgressBar::position), Some(1));
        observer.finish();
    }
}
