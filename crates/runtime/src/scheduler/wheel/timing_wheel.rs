//! Hashed timing wheel
//!
//! Time is cut into ticks of fixed length counted from the wheel's origin. A
//! timer with deadline `d` belongs to tick `ceil((d - origin) / tick)` and
//! lives in bucket `tick % slots`; timers further out than one revolution
//! share a bucket with nearer ones and are skipped until their tick comes.
//!
//! Timers never fire before their deadline and may fire up to one tick (plus
//! driver latency) after it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::guard;

/// Handle used to stop an armed timer
#[derive(Debug, Clone, Default)]
pub(crate) struct TimerHandle {
    stopped: Arc<AtomicBool>,
}

impl TimerHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Stop the timer; `true` if this call stopped it
    pub(crate) fn stop(&self) -> bool {
        !self.stopped.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// When a timer was due and when the wheel actually fired it
#[derive(Debug, Clone, Copy)]
pub(crate) struct Expiry {
    pub(crate) deadline: Instant,
    pub(crate) fired_at: Instant,
}

pub(crate) type Callback = Arc<dyn Fn(Expiry) + Send + Sync>;

/// Computes the next deadline of a repeating timer from `(previous, now)`
pub(crate) type Reschedule = Arc<dyn Fn(Instant, Instant) -> Option<Instant> + Send + Sync>;

struct WheelTimer {
    handle: TimerHandle,
    deadline: Instant,
    deadline_tick: u64,
    reschedule: Option<Reschedule>,
    callback: Callback,
}

struct WheelState {
    buckets: Vec<Vec<WheelTimer>>,
    current_tick: u64,
    len: usize,
}

pub(crate) struct TimeWheel {
    origin: Instant,
    tick: Duration,
    slots: usize,
    state: Mutex<WheelState>,
}

impl TimeWheel {
    pub(crate) fn new(tick: Duration, slots: usize) -> Self {
        Self {
            origin: Instant::now(),
            tick,
            slots,
            state: Mutex::new(WheelState {
                buckets: (0..slots).map(|_| Vec::new()).collect(),
                current_tick: 0,
                len: 0,
            }),
        }
    }

    pub(crate) fn tick(&self) -> Duration {
        self.tick
    }

    fn elapsed_ticks(&self, at: Instant, round_up: bool) -> u64 {
        let elapsed = at.saturating_duration_since(self.origin).as_nanos();
        let tick = self.tick.as_nanos().max(1);
        let ticks = if round_up { elapsed.div_ceil(tick) } else { elapsed / tick };
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }

    fn slot_of(&self, tick: u64) -> usize {
        // slots fits in usize, so the remainder does too
        usize::try_from(tick % self.slots as u64).unwrap_or_default()
    }

    fn insert(&self, state: &mut WheelState, mut timer: WheelTimer) {
        // A deadline inside an already processed tick goes into the next one.
        timer.deadline_tick = self.elapsed_ticks(timer.deadline, true).max(state.current_tick + 1);
        let slot = self.slot_of(timer.deadline_tick);
        state.buckets[slot].push(timer);
        state.len += 1;
    }

    /// Arm `handle` to fire `callback` at `deadline`
    ///
    /// With a `reschedule`, the timer is re-armed after every firing at the
    /// deadline it returns, until it returns `None` or the handle is stopped.
    pub(crate) fn arm(
        &self,
        handle: TimerHandle,
        deadline: Instant,
        reschedule: Option<Reschedule>,
        callback: Callback,
    ) {
        let timer = WheelTimer { handle, deadline, deadline_tick: 0, reschedule, callback };
        let mut state = self.state.lock();
        self.insert(&mut state, timer);
    }

    /// One-shot convenience around [`TimeWheel::arm`]
    #[cfg(test)]
    pub(crate) fn after_func<F>(&self, delay: Duration, f: F) -> TimerHandle
    where
        F: Fn(Expiry) + Send + Sync + 'static,
    {
        let handle = TimerHandle::new();
        self.arm(handle.clone(), Instant::now() + delay, None, Arc::new(f));
        handle
    }

    /// Fire every timer whose tick has passed by `now`; returns how many fired
    ///
    /// Callbacks run on the calling task after the wheel lock is released.
    pub(crate) fn advance_to(&self, now: Instant) -> usize {
        let target = self.elapsed_ticks(now, false);

        let fired: Vec<(Callback, Instant)> = {
            let mut state = self.state.lock();
            if target <= state.current_tick {
                return 0;
            }

            let steps = target - state.current_tick;
            let slots: Vec<usize> = if steps >= self.slots as u64 {
                (0..self.slots).collect()
            } else {
                (state.current_tick + 1..=target).map(|tick| self.slot_of(tick)).collect()
            };

            let mut due = Vec::new();
            for slot in slots {
                let bucket = std::mem::take(&mut state.buckets[slot]);
                let mut keep = Vec::with_capacity(bucket.len());
                for timer in bucket {
                    if timer.handle.is_stopped() {
                        state.len -= 1;
                    } else if timer.deadline_tick <= target {
                        state.len -= 1;
                        due.push(timer);
                    } else {
                        keep.push(timer);
                    }
                }
                state.buckets[slot] = keep;
            }
            state.current_tick = target;

            let mut fired = Vec::with_capacity(due.len());
            for mut timer in due {
                fired.push((Arc::clone(&timer.callback), timer.deadline));
                let next = timer.reschedule.as_ref().and_then(|next| next(timer.deadline, now));
                if let Some(next) = next {
                    timer.deadline = next;
                    self.insert(&mut state, timer);
                }
            }
            fired
        };

        let count = fired.len();
        for (callback, deadline) in fired {
            guard::guard("time_wheel", || callback(Expiry { deadline, fired_at: now }));
        }
        count
    }

    /// Stop and drop every armed timer
    pub(crate) fn clear(&self) {
        let mut state = self.state.lock();
        for bucket in &mut state.buckets {
            for timer in bucket.drain(..) {
                timer.handle.stop();
            }
        }
        state.len = 0;
    }

    /// Armed timers, including stopped ones not yet swept
    pub(crate) fn len(&self) -> usize {
        self.state.lock().len
    }

    /// Drive the wheel on its tick until `shutdown` fires, then clear it
    pub(crate) async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.advance_to(Instant::now());
                }
            }
        }

        self.clear();
        debug!("Time wheel driver exited");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, impl Fn(Expiry) + Send + Sync + 'static) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        (hits, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_timer_handle_stop_once() {
        let handle = TimerHandle::new();
        assert!(!handle.is_stopped());
        assert!(handle.stop());
        assert!(!handle.stop());
        assert!(handle.is_stopped());
    }

    #[tokio::test]
    async fn test_never_fires_early() {
        let wheel = TimeWheel::new(Duration::from_millis(10), 8);
        let (hits, callback) = counter();
        let origin = wheel.origin;
        wheel.arm(TimerHandle::new(), origin + Duration::from_millis(25), None, Arc::new(callback));

        assert_eq!(wheel.advance_to(origin + Duration::from_millis(20)), 0);
        assert_eq!(wheel.advance_to(origin + Duration::from_millis(29)), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(wheel.advance_to(origin + Duration::from_millis(30)), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(wheel.len(), 0);
    }

    #[tokio::test]
    async fn test_far_timer_survives_revolutions() {
        let wheel = TimeWheel::new(Duration::from_millis(1), 4);
        let (hits, callback) = counter();
        let origin = wheel.origin;
        wheel.arm(TimerHandle::new(), origin + Duration::from_millis(10), None, Arc::new(callback));

        for ms in 1..10 {
            wheel.advance_to(origin + Duration::from_millis(ms));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        wheel.advance_to(origin + Duration::from_millis(10));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_large_jump_visits_every_bucket() {
        let wheel = TimeWheel::new(Duration::from_millis(1), 4);
        let (hits, callback) = counter();
        let callback: Callback = Arc::new(callback);
        let origin = wheel.origin;
        for ms in [1, 2, 3, 4, 5, 6] {
            let deadline = origin + Duration::from_millis(ms);
            wheel.arm(TimerHandle::new(), deadline, None, Arc::clone(&callback));
        }

        assert_eq!(wheel.advance_to(origin + Duration::from_millis(100)), 6);
        assert_eq!(hits.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_skip_others() {
        let wheel = TimeWheel::new(Duration::from_millis(10), 8);
        let (hits, callback) = counter();
        let origin = wheel.origin;
        let deadline = origin + Duration::from_millis(10);
        wheel.arm(TimerHandle::new(), deadline, None, Arc::new(|_| panic!("callback exploded")));
        wheel.arm(TimerHandle::new(), deadline, None, Arc::new(callback));

        assert_eq!(wheel.advance_to(origin + Duration::from_millis(10)), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(wheel.len(), 0);
    }

    #[tokio::test]
    async fn test_stopped_timer_does_not_fire() {
        let wheel = TimeWheel::new(Duration::from_millis(10), 8);
        let (hits, callback) = counter();
        let handle = wheel.after_func(Duration::from_millis(10), callback);
        handle.stop();

        wheel.advance_to(wheel.origin + Duration::from_millis(50));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(wheel.len(), 0);
    }

    #[tokio::test]
    async fn test_repeating_timer_rearms() {
        let wheel = TimeWheel::new(Duration::from_millis(10), 8);
        let (hits, callback) = counter();
        let origin = wheel.origin;
        let period = Duration::from_millis(20);
        let reschedule: Reschedule = Arc::new(move |prev, _now| Some(prev + period));
        let handle = TimerHandle::new();
        wheel.arm(handle.clone(), origin + period, Some(reschedule), Arc::new(callback));

        for ms in (10..=100).step_by(10) {
            wheel.advance_to(origin + Duration::from_millis(ms));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 5);
        assert_eq!(wheel.len(), 1);

        handle.stop();
        wheel.advance_to(origin + Duration::from_millis(200));
        assert_eq!(hits.load(Ordering::SeqCst), 5);
        assert_eq!(wheel.len(), 0);
    }

    #[tokio::test]
    async fn test_clear_stops_everything() {
        let wheel = TimeWheel::new(Duration::from_millis(10), 8);
        let (_, callback) = counter();
        let handle = wheel.after_func(Duration::from_secs(1), callback);

        wheel.clear();
        assert!(handle.is_stopped());
        assert_eq!(wheel.len(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_driver_fires_and_exits() {
        let wheel = Arc::new(TimeWheel::new(Duration::from_millis(5), 16));
        let (hits, callback) = counter();
        wheel.after_func(Duration::from_millis(20), callback);

        let token = CancellationToken::new();
        let driver = tokio::spawn(Arc::clone(&wheel).run(token.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        token.cancel();
        driver.await.unwrap();
    }
}
