//! Cancellable background timers owned by an accessory.
//!
//! A [`TimerSlot`] holds at most one running task. Starting a new task
//! aborts the previous one under the slot lock, so there is never more than
//! one live timer per slot. Each task also receives a [`TimerGuard`]; a task
//! that already woke up when it was superseded sees `is_current() == false`
//! and skips its write.
//!
//! All tasks stop when the shared shutdown token is cancelled, and when the
//! slot itself is dropped together with its accessory.

use crate::hap::Characteristic;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Interval between remaining-duration recomputations.
pub const COUNTDOWN_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Default)]
struct SlotState {
    epoch: u64,
    handle: Option<JoinHandle<()>>,
}

impl SlotState {
    fn supersede(&mut self) {
        self.epoch += 1;
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Lets a running task check whether it is still the slot's current task.
#[derive(Clone)]
pub struct TimerGuard {
    state: Weak<Mutex<SlotState>>,
    epoch: u64,
}

impl TimerGuard {
    pub fn is_current(&self) -> bool {
        self.state
            .upgrade()
            .is_some_and(|state| state.lock().epoch == self.epoch)
    }
}

/// Holder for at most one background timer task.
pub struct TimerSlot {
    state: Arc<Mutex<SlotState>>,
    runtime: Handle,
    shutdown: CancellationToken,
}

impl TimerSlot {
    pub fn new(runtime: Handle, shutdown: CancellationToken) -> Self {
        Self {
            state: Arc::new(Mutex::new(SlotState::default())),
            runtime,
            shutdown,
        }
    }

    /// Abort the current task (if any) and start the one built by `task`.
    ///
    /// Nothing is started once shutdown has been requested.
    pub fn replace<F, Fut>(&self, task: F)
    where
        F: FnOnce(TimerGuard) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.state.lock();
        state.supersede();
        if self.shutdown.is_cancelled() {
            return;
        }
        let future = task(TimerGuard {
            state: Arc::downgrade(&self.state),
            epoch: state.epoch,
        });
        let shutdown = self.shutdown.clone();
        state.handle = Some(self.runtime.spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = future => {}
            }
        }));
    }

    /// Run `action` once after `delay`, replacing any pending timer.
    pub fn schedule<F>(&self, delay: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.replace(move |guard| async move {
            tokio::time::sleep(delay).await;
            if guard.is_current() {
                action();
            }
        });
    }

    pub fn cancel(&self) {
        self.state.lock().supersede();
    }

    pub fn is_pending(&self) -> bool {
        self.state
            .lock()
            .handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Remaining-duration countdown towards an estimated completion time.
///
/// The characteristic shows the whole seconds left and is recomputed every
/// [`COUNTDOWN_INTERVAL`] until it reaches zero.
pub struct Countdown {
    characteristic: Arc<Characteristic>,
    slot: TimerSlot,
}

impl Countdown {
    pub fn new(characteristic: Arc<Characteristic>, runtime: Handle, shutdown: CancellationToken) -> Self {
        Self {
            characteristic,
            slot: TimerSlot::new(runtime, shutdown),
        }
    }

    pub fn characteristic(&self) -> &Arc<Characteristic> {
        &self.characteristic
    }

    /// Restart the countdown for `target`; absent or past targets show 0.
    pub fn update(&self, target: Option<DateTime<Utc>>) {
        let remaining = target
            .and_then(|target| (target - Utc::now()).to_std().ok())
            .unwrap_or_default();
        let seconds = whole_seconds(remaining);
        if seconds == 0 {
            self.slot.cancel();
            self.characteristic.set_value(0i64);
            return;
        }

        let deadline = Instant::now() + remaining;
        let characteristic = self.characteristic.clone();
        self.slot.replace(move |guard| async move {
            loop {
                tokio::time::sleep(COUNTDOWN_INTERVAL).await;
                if !guard.is_current() {
                    break;
                }
                let seconds = whole_seconds(deadline.saturating_duration_since(Instant::now()));
                characteristic.set_value(seconds);
                if seconds == 0 {
                    break;
                }
            }
        });
        self.characteristic.set_value(seconds);
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_pending()
    }

    pub fn cancel(&self) {
        self.slot.cancel();
    }
}

fn whole_seconds(duration: Duration) -> i64 {
    (duration.as_secs_f64().round()) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hap::CharacteristicKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn slot() -> (TimerSlot, CancellationToken) {
        let shutdown = CancellationToken::new();
        (TimerSlot::new(Handle::current(), shutdown.clone()), shutdown)
    }

    fn countdown() -> Countdown {
        Countdown::new(
            Characteristic::new(CharacteristicKind::RemainingDuration),
            Handle::current(),
            CancellationToken::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_fires_once() {
        let (slot, _shutdown) = slot();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        slot.schedule(Duration::from_secs(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(slot.is_pending());

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!slot.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_supersedes_previous_timer() {
        let (slot, _shutdown) = slot();
        let fired = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let counter = fired.clone();
            slot.schedule(Duration::from_secs(10), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_secs(5)).await;
        }

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_timers() {
        let (slot, shutdown) = slot();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        slot.schedule(Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        shutdown.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        slot.schedule(Duration::from_secs(1), || {});
        assert!(!slot.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_slot_cancels() {
        let (slot, _shutdown) = slot();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        slot.schedule(Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(slot);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_counts_down_to_zero() {
        let countdown = countdown();
        countdown.update(Some(Utc::now() + chrono::Duration::seconds(12)));
        assert_eq!(countdown.characteristic().get_i64(), 12);
        assert!(countdown.is_running());

        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(countdown.characteristic().get_i64(), 7);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(countdown.characteristic().get_i64(), 0);
        assert!(!countdown.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_past_or_absent_target_is_zero() {
        let countdown = countdown();
        countdown.update(Some(Utc::now() - chrono::Duration::seconds(30)));
        assert_eq!(countdown.characteristic().get_i64(), 0);
        assert!(!countdown.is_running());

        countdown.update(Some(Utc::now() + chrono::Duration::seconds(30)));
        assert!(countdown.is_running());
        countdown.update(None);
        assert_eq!(countdown.characteristic().get_i64(), 0);
        assert!(!countdown.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_same_target_keeps_single_timer() {
        let countdown = countdown();
        let target = Utc::now() + chrono::Duration::seconds(600);
        countdown.update(Some(target));
        let first = countdown.slot.state.lock().epoch;
        countdown.update(Some(target));

        let state = countdown.slot.state.lock();
        assert_eq!(state.epoch, first + 1);
        assert!(state.handle.as_ref().is_some_and(|handle| !handle.is_finished()));
    }
}
