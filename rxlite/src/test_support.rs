//! Recording observer shared by the unit tests

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::RxError;
use crate::observer::Observer;

#[derive(Debug, Clone, PartialEq)]
pub enum Event<T> {
    Next(T),
    Error(RxError),
    Complete,
}

/// Signals seen by one subscriber, each tagged with the thread it arrived on
#[derive(Clone)]
pub struct Recorder<T> {
    log: Arc<Mutex<Vec<(Event<T>, String)>>>,
    terminal: Arc<Condvar>,
}

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
