//! Threading for the pipeline's execution units.
//!
//! Every unit runs on its own named OS thread and loops until a shared `Stop`
//! is set. Nothing is ever killed from outside: units check the token at each
//! timed wait and return on their own. The `Supervisor` holds the handles of
//! the producer units and fail-stops the pipeline when one of them exits while
//! the pipeline is still meant to be running.

use crossbeam_channel::{self, RecvTimeoutError};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Cooperative cancellation token.
///
/// Clones share the same flag. Once set it stays set. Setting also drops the
/// token's wake channel sender, so every `sleep` in progress returns at once.
#[derive(Clone, Debug)]
pub struct Stop {
    flag: Arc<AtomicBool>,
    trigger: Arc<Mutex<Option<crossbeam_channel::Sender<()>>>>,
    wake: crossbeam_channel::Receiver<()>,
}

impl Default for Stop {
    fn default() -> Stop {
        let (trigger, wake) = crossbeam_channel::bounded(0);
        Stop {
            flag: Arc::new(AtomicBool::new(false)),
            trigger: Arc::new(Mutex::new(Some(trigger))),
            wake,
        }
    }
}

impl Stop {
    /// Create an unset token.
    pub fn new() -> Stop {
        Stop::default()
    }

    /// Whether stop has been requested.
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Request stop.
    pub fn set(&self) {
        self.flag.store(true, Ordering::Release);
        match self.trigger.lock() {
            Ok(mut trigger) => drop(trigger.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }
    }

    /// Sleep for `dur` unless stop is requested first. Returns whether stop
    /// was observed.
    pub fn sleep(&self, dur: Duration) -> bool {
        if self.is_set() {
            return true;
        }
        match self.wake.recv_timeout(dur) {
            Err(RecvTimeoutError::Timeout) => self.is_set(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }
}

/// A running execution unit.
#[derive(Debug)]
pub struct ThreadHandle {
    name: String,
    handle: thread::JoinHandle<()>,
}

impl ThreadHandle {
    /// The unit's thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the unit's closure has returned or panicked.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Join the given thread, blocking until it exits. A panic in the unit is
    /// logged, not propagated.
    pub fn join(self) {
        if self.handle.join().is_err() {
            error!("worker thread {} panicked", self.name);
        }
    }
}

/// Spawns a new named thread executing the provided closure with a clone of
/// `stop`.
pub fn spawn<F>(name: &str, stop: &Stop, f: F) -> io::Result<ThreadHandle>
where
    F: FnOnce(Stop) + Send + 'static,
{
    let stop = stop.clone();
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || f(stop))?;
    Ok(ThreadHandle {
        name: name.to_string(),
        handle,
    })
}

/// Liveness supervision of the producer units.
///
/// Owned by the pushing loop. The loop calls `check` before every cycle.
#[derive(Debug)]
pub struct Supervisor {
    stop: Stop,
    workers: Vec<ThreadHandle>,
}

impl Supervisor {
    /// Create a supervisor over `stop` with no workers yet.
    pub fn new(stop: Stop) -> Supervisor {
        Supervisor {
            stop,
            workers: Vec::new(),
        }
    }

    /// Add a unit to supervise.
    pub fn watch(&mut self, worker: ThreadHandle) {
        self.workers.push(worker);
    }

    /// The pipeline's stop token.
    pub fn stop(&self) -> &Stop {
        &self.stop
    }

    /// Names of the supervised units.
    pub fn worker_names(&self) -> Vec<&str> {
        self.workers.iter().map(|w| w.name()).collect()
    }

    /// Check every unit. Returns whether the pipeline should keep running.
    ///
    /// A unit that exits while stop is unset has died: stop is set so the
    /// remaining units wind down. Dead units are not restarted.
    pub fn check(&self) -> bool {
        if self.stop.is_set() {
            return false;
        }
        for worker in &self.workers {
            if worker.is_finished() {
                error!("worker thread {} died; stopping pipeline", worker.name());
                self.stop.set();
                return false;
            }
        }
        true
    }

    /// Request stop and wait for every unit to return.
    pub fn shutdown(self) {
        self.stop.set();
        for worker in self.workers {
            debug!("joining worker thread {}", worker.name());
            worker.join();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Instant;

    #[test]
    fn stop_is_shared_between_clones() {
        let stop = Stop::new();
        let other = stop.clone();
        assert!(!other.is_set());
        stop.set();
        assert!(other.is_set());
    }

    #[test]
    fn sleep_returns_early_on_stop() {
        let stop = Stop::new();
        let setter = stop.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            setter.set();
        });
        let start = Instant::now();
        assert!(stop.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        t.join().unwrap();
    }

    #[test]
    fn sleep_wakes_without_polling_delay() {
        let stop = Stop::new();
        let sleeper = stop.clone();
        let t = thread::spawn(move || {
            let start = Instant::now();
            assert!(sleeper.sleep(Duration::from_secs(30)));
            start.elapsed()
        });
        thread::sleep(Duration::from_millis(20));
        let set_at = Instant::now();
        stop.set();
        let slept = t.join().unwrap();
        assert!(set_at.elapsed() < Duration::from_millis(500));
        assert!(slept < Duration::from_secs(5));
        assert!(stop.sleep(Duration::from_secs(30)));
    }

    #[test]
    fn sleep_runs_full_duration_without_stop() {
        let stop = Stop::new();
        let start = Instant::now();
        assert!(!stop.sleep(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn supervisor_fail_stops_on_dead_worker() {
        let stop = Stop::new();
        let mut sup = Supervisor::new(stop.clone());
        sup.watch(spawn("lives", &stop, |s: Stop| while !s.sleep(Duration::from_millis(5)) {}).unwrap());
        sup.watch(spawn("dies", &stop, |_| ()).unwrap());

        let deadline = Instant::now() + Duration::from_secs(5);
        while sup.check() {
            assert!(Instant::now() < deadline, "dead worker never noticed");
            thread::sleep(Duration::from_millis(5));
        }
        assert!(stop.is_set());
        sup.shutdown();
    }

    #[test]
    fn supervisor_healthy_while_workers_run() {
        let stop = Stop::new();
        let mut sup = Supervisor::new(stop.clone());
        sup.watch(spawn("collector", &stop, |s: Stop| while !s.sleep(Duration::from_millis(5)) {}).unwrap());
        assert!(sup.check());
        assert_eq!(vec!["collector"], sup.worker_names());
        sup.shutdown();
        assert!(stop.is_set());
    }

    #[test]
    fn panicking_worker_is_noticed() {
        let stop = Stop::new();
        let mut sup = Supervisor::new(stop.clone());
        sup.watch(spawn("panics", &stop, |_| panic!("sensor gone")).unwrap());
        let deadline = Instant::now() + Duration::from_secs(5);
        while sup.check() {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(5));
        }
        sup.shutdown();
    }
}
