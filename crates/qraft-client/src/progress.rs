//! Cosmetic progress animation shown while a request is outstanding.
//!
//! The value has no relation to server-side progress.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const PROGRESS_TICK: Duration = Duration::from_millis(100);
pub const PROGRESS_CEILING: f32 = 98.0;

/// One animation step. Steps shrink as the value approaches the ceiling.
pub fn next_progress(current: f32) -> f32 {
    let step = if current >= 96.0 {
        0.1
    } else if current >= 90.0 {
        0.3
    } else if current >= 75.0 {
        0.6
    } else if current >= 50.0 {
        0.9
    } else if current >= 25.0 {
        1.1
    } else {
        1.3
    };
    (current + step).min(PROGRESS_CEILING)
}

/// Ticks progress on a watch channel until dropped.
pub struct ProgressTicker {
    task: JoinHandle<()>,
}

impl ProgressTicker {
    /// Reset progress to 0 and start ticking.
    pub fn start(progress: Arc<watch::Sender<f32>>) -> Self {
        progress.send_replace(0.0);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(PROGRESS_TICK);
            // First tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                progress.send_modify(|p| *p = next_progress(*p));
            }
        });
        Self { task }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.task.abort();
    }
}
