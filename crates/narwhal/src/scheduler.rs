//! Periodic tick drivers.
//!
//! The layout only needs "call this every `interval` until told to stop". A callback returning
//! [`ControlFlow::Break`] ends the schedule from the inside.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub type TickCallback = Box<dyn FnMut() -> ControlFlow<()> + Send>;

pub trait Scheduler: Send {
    /// Begins calling `callback` every `interval`, replacing any previous schedule.
    fn start(&mut self, interval: Duration, callback: TickCallback);
    /// Prevents further calls. A call already in progress is allowed to finish.
    fn stop(&mut self);
    fn is_active(&self) -> bool;
}

/// Runs the callback on a dedicated thread with a sleep between calls.
#[derive(Debug, Default)]
pub struct ThreadScheduler {
    stop_flag: Option<Arc<AtomicBool>>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for ThreadScheduler {
    fn start(&mut self, interval: Duration, mut callback: TickCallback) {
        self.stop();

        let flag = Arc::new(AtomicBool::new(false));
        let thread_flag = flag.clone();
        let spawned = thread::Builder::new()
            .name("narwhal-tick".to_string())
            .spawn(move || {
                while !thread_flag.load(Ordering::Acquire) {
                    let started = Instant::now();
                    if callback().is_break() {
                        thread_flag.store(true, Ordering::Release);
                        break;
                    }
                    thread::sleep(interval.saturating_sub(started.elapsed()));
                }
            });

        match spawned {
            Ok(handle) => {
                self.stop_flag = Some(flag);
                self.handle = Some(handle);
            }
            Err(err) => tracing::error!(error = %err, "failed to spawn tick thread"),
        }
    }

    fn stop(&mut self) {
        if let Some(flag) = self.stop_flag.take() {
            flag.store(true, Ordering::Release);
        }
        let Some(handle) = self.handle.take() else {
            return;
        };
        // Joining from the tick thread itself would deadlock; the loop exits on its own.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::error!("tick thread panicked");
        }
    }

    fn is_active(&self) -> bool {
        self.stop_flag
            .as_ref()
            .is_some_and(|f| !f.load(Ordering::Acquire))
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Default)]
struct ManualState {
    callback: Option<TickCallback>,
    interval: Option<Duration>,
    /// Bumped on every start and stop so a fire racing a restart drops the stale callback.
    generation: u64,
    active: bool,
    fired: u64,
}

/// A scheduler that only ticks when [`fire`](ManualScheduler::fire) is called. Clones share
/// state, so a test can keep one handle and give another to the layout.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("active", &self.is_active())
            .field("fired", &self.fired())
            .finish()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Invokes the callback once. Returns `false` when nothing is scheduled.
    pub fn fire(&self) -> bool {
        let (mut callback, generation) = {
            let mut state = self.lock();
            let Some(cb) = state.callback.take() else {
                return false;
            };
            state.fired += 1;
            (cb, state.generation)
        };

        let flow = callback();

        let mut state = self.lock();
        if state.generation == generation {
            match flow {
                ControlFlow::Continue(()) => state.callback = Some(callback),
                ControlFlow::Break(()) => state.active = false,
            }
        }
        true
    }

    /// Fires up to `n` times, stopping early once the schedule ends. Returns how many fired.
    pub fn fire_n(&self, n: usize) -> usize {
        let mut count = 0;
        while count < n && self.fire() {
            count += 1;
        }
        count
    }

    pub fn fired(&self) -> u64 {
        self.lock().fired
    }

    pub fn interval(&self) -> Option<Duration> {
        self.lock().interval
    }
}

impl Scheduler for ManualScheduler {
    fn start(&mut self, interval: Duration, callback: TickCallback) {
        let mut state = self.lock();
        state.generation += 1;
        state.callback = Some(callback);
        state.interval = Some(interval);
        state.active = true;
    }

    fn stop(&mut self) {
        let mut state = self.lock();
        state.generation += 1;
        state.callback = None;
        state.active = false;
    }

    fn is_active(&self) -> bool {
        self.lock().active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting(limit: usize) -> (Arc<AtomicUsize>, TickCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let cb: TickCallback = Box::new(move || {
            let n = c.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= limit {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        (count, cb)
    }

    #[test]
    fn manual_scheduler_fires_on_demand() {
        let handle = ManualScheduler::new();
        let mut sched = handle.clone();
        assert!(!handle.fire());

        let (count, cb) = counting(usize::MAX);
        sched.start(Duration::from_millis(18), cb);
        assert!(handle.is_active());
        assert_eq!(handle.fire_n(3), 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(handle.interval(), Some(Duration::from_millis(18)));

        sched.stop();
        assert!(!handle.is_active());
        assert!(!handle.fire());
    }

    #[test]
    fn break_ends_a_manual_schedule() {
        let handle = ManualScheduler::new();
        let mut sched = handle.clone();
        let (count, cb) = counting(2);
        sched.start(Duration::from_millis(1), cb);
        assert_eq!(handle.fire_n(10), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(!handle.is_active());
    }

    #[test]
    fn thread_scheduler_stops_after_break() {
        let mut sched = ThreadScheduler::new();
        let (count, cb) = counting(3);
        sched.start(Duration::from_millis(1), cb);

        let deadline = Instant::now() + Duration::from_secs(5);
        while sched.is_active() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!sched.is_active());
        assert_eq!(count.load(Ordering::SeqCst), 3);
        sched.stop();
    }

    #[test]
    fn thread_scheduler_stop_prevents_further_ticks() {
        let mut sched = ThreadScheduler::new();
        let (count, cb) = counting(usize::MAX);
        sched.start(Duration::from_millis(1), cb);
        thread::sleep(Duration::from_millis(20));
        sched.stop();
        let after = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), after);
        assert!(!sched.is_active());
    }
}
