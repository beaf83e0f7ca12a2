//! Common test utilities

use parking_lot::{Condvar, Mutex};
use rxlite::{
    AffinityConfig, AffinityScheduler, Observer, RxError, SchedulerRef, WorkerConfig,
    WorkerScheduler,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Send library logs to the test output; `RUST_LOG` overrides the level
#[allow(dead_code)] // Used by other test modules
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .with_thread_names(true)
        .try_init();
}

#[allow(dead_code)] // Used by other test modules
pub const WAIT: Duration = Duration::from_secs(5);

#[allow(dead_code)] // Used by other test modules
#[derive(Debug, Clone, PartialEq)]
pub enum Event<T> {
    Next(T),
    Error(RxError),
    Complete,
}

/// Signals seen by one subscriber, each tagged with the thread it arrived on
#[allow(dead_code)] // Used by other test modules
#[derive(Clone)]
pub struct Recorder<T> {
    log: Arc<Mutex<Vec<(Event<T>, String)>>>,
    terminal: Arc<Condvar>,
}

#[allow(dead_code)] // Used by other test modules
impl<T: Clone + Send + 'static> Recorder<T> {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            terminal: Arc::new(Condvar::new()),
        }
    }

    pub fn observer(&self) -> RecordingObserver<T> {
        RecordingObserver(self.clone())
    }

    pub fn events(&self) -> Vec<Event<T>> {
        self.log.lock().iter().map(|(e, _)| e.clone()).collect()
    }

    pub fn values(&self) -> Vec<T> {
        self.log
            .lock()
            .iter()
            .filter_map(|(e, _)| match e {
                Event::Next(v) => Some(v.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn completed(&self) -> bool {
        self.log.lock().iter().any(|(e, _)| matches!(e, Event::Complete))
    }

    pub fn threads(&self) -> Vec<String> {
        self.log.lock().iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn wait_terminal(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut log = self.log.lock();
        while !log.iter().any(|(e, _)| !matches!(e, Event::Next(_))) {
            if self.terminal.wait_until(&mut log, deadline).timed_out() {
                return false;
            }
        }
        true
    }

    fn push(&self, event: Event<T>) {
        let name = thread::current().name().unwrap_or("<unnamed>").to_string();
        self.log.lock().push((event, name));
        self.terminal.notify_all();
    }
}

#[allow(dead_code)] // Used by other test modules
pub struct RecordingObserver<T>(Recorder<T>);

impl<T: Clone + Send + 'static> Observer<T> for RecordingObserver<T> {
    fn on_next(&mut self, value: T) {
        self.0.push(Event::Next(value));
    }

    fn on_error(&mut self, error: RxError) {
        self.0.push(Event::Error(error));
    }

    fn on_complete(&mut self) {
        self.0.push(Event::Complete);
    }
}

/// Worker pool whose threads are named `{name}-{n}`
#[allow(dead_code)] // Used by other test modules
pub fn worker(name: &str) -> SchedulerRef {
    Arc::new(
        WorkerScheduler::new(&WorkerConfig {
            thread_name: name.to_string(),
            ..WorkerConfig::default()
        })
        .expect("Failed to start worker scheduler"),
    )
}

/// Serial thread named `name`
#[allow(dead_code)] // Used by other test modules
pub fn affinity(name: &str) -> SchedulerRef {
    Arc::new(
        AffinityScheduler::new(&AffinityConfig {
            thread_name: name.to_string(),
        })
        .expect("Failed to start affinity scheduler"),
    )
}
