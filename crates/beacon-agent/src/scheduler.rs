//! Cycle scheduler
//!
//! Runs one cycle, waits `interval`, runs the next. The delay is measured
//! from the end of a cycle, so a slow cycle pushes the next one back
//! instead of overlapping with it. Stopping cancels the pending delay; a
//! cycle already in flight is left to finish.

use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// Waiting for the next cycle
    Idle,
    /// A cycle is in flight
    Running,
    /// No further cycles will run
    Stopped,
}

/// One unit of scheduled work
#[async_trait]
pub trait CycleRunner: Send + Sync {
    /// Run a full cycle. Failures are handled inside; the scheduler
    /// reschedules regardless of outcome.
    async fn run_cycle(&self);
}

/// Fixed-delay scheduler
#[derive(Debug, Clone, Copy)]
pub struct CycleScheduler {
    interval: Duration,
}

impl CycleScheduler {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn the cycle loop. The first cycle starts immediately.
    pub fn start(&self, runner: Arc<dyn CycleRunner>) -> SchedulerHandle {
        let interval = self.interval;
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(CycleState::Running);
        let completed = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&completed);

        let task = tokio::spawn(async move {
            loop {
                if *stop_rx.borrow() {
                    break;
                }

                state_tx.send_replace(CycleState::Running);
                // A panicking cycle is lost, the schedule is not
                if AssertUnwindSafe(runner.run_cycle()).catch_unwind().await.is_err() {
                    tracing::error!("Cycle panicked, rescheduling");
                }
                counter.fetch_add(1, Ordering::SeqCst);

                if *stop_rx.borrow() {
                    break;
                }
                state_tx.send_replace(CycleState::Idle);

                // Re-arm: the next cycle is scheduled only now that this one is done
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop_rx.changed() => break,
                }
            }

            state_tx.send_replace(CycleState::Stopped);
            tracing::debug!("Cycle scheduler stopped");
        });

        tracing::debug!(interval_ms = interval.as_millis() as u64, "Cycle scheduler started");

        SchedulerHandle {
            stop: stop_tx,
            state: state_rx,
            completed,
            task,
        }
    }
}

/// Handle to a running cycle loop
///
/// Dropping the handle stops the loop the same way [`SchedulerHandle::stop`] does.
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    state: watch::Receiver<CycleState>,
    completed: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Cancel the pending cycle; no new cycle starts after this call
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn state(&self) -> CycleState {
        *self.state.borrow()
    }

    /// Number of cycles that ran to completion
    pub fn completed_cycles(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop and wait for the loop to exit (including any in-flight cycle)
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Cycle scheduler task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Records the start/end of every cycle
    struct Recorder {
        work: Duration,
        windows: Mutex<Vec<(Instant, Instant)>>,
    }

    impl Recorder {
        fn new(work: Duration) -> Arc<Self> {
            Arc::new(Self {
                work,
                windows: Mutex::new(Vec::new()),
            })
        }

        fn windows(&self) -> Vec<(Instant, Instant)> {
            self.windows.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CycleRunner for Recorder {
        async fn run_cycle(&self) {
            let start = Instant::now();
            tokio::time::sleep(self.work).await;
            self.windows.lock().unwrap().push((start, Instant::now()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_cycle_runs_immediately() {
        let recorder = Recorder::new(Duration::from_millis(1));
        let begin = Instant::now();
        let handle = CycleScheduler::new(Duration::from_secs(60)).start(recorder.clone());

        tokio::time::sleep(Duration::from_millis(10)).await;
        let windows = recorder.windows();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].0, begin);
        assert_eq!(handle.state(), CycleState::Idle);
        assert_eq!(handle.completed_cycles(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycles_never_overlap() {
        // Producers slower than the interval
        let work = Duration::from_millis(50);
        let interval = Duration::from_millis(10);
        let recorder = Recorder::new(work);
        let handle = CycleScheduler::new(interval).start(recorder.clone());

        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.shutdown().await;

        let windows = recorder.windows();
        assert!(windows.len() >= 5, "only {} cycles ran", windows.len());
        for pair in windows.windows(2) {
            let (_, previous_end) = pair[0];
            let (next_start, _) = pair[1];
            assert!(next_start >= previous_end + interval);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_cycle() {
        let recorder = Recorder::new(Duration::from_millis(1));
        let handle = CycleScheduler::new(Duration::from_millis(100)).start(recorder.clone());

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.stop();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(recorder.windows().len(), 1);
        assert_eq!(handle.state(), CycleState::Stopped);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lets_in_flight_cycle_finish() {
        let recorder = Recorder::new(Duration::from_millis(200));
        let handle = CycleScheduler::new(Duration::from_millis(10)).start(recorder.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.state(), CycleState::Running);
        handle.stop();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(recorder.windows().len(), 1);
        assert_eq!(handle.completed_cycles(), 1);
        assert_eq!(handle.state(), CycleState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_loop() {
        let recorder = Recorder::new(Duration::from_millis(1));
        let handle = CycleScheduler::new(Duration::from_millis(20)).start(recorder.clone());

        tokio::time::sleep(Duration::from_millis(5)).await;
        drop(handle);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(recorder.windows().len(), 1);
    }

    struct PanicsFirst {
        calls: AtomicU64,
    }

    #[async_trait]
    impl CycleRunner for PanicsFirst {
        async fn run_cycle(&self) {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first cycle blew up");
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_cycle_keeps_schedule() {
        let runner = Arc::new(PanicsFirst {
            calls: AtomicU64::new(0),
        });
        let handle = CycleScheduler::new(Duration::from_millis(100)).start(runner.clone());

        tokio::time::sleep(Duration::from_millis(1050)).await;

        assert_eq!(runner.calls.load(Ordering::SeqCst), 11);
        assert_eq!(handle.state(), CycleState::Idle);
        assert!(!handle.is_finished());
        handle.shutdown().await;
    }
}
