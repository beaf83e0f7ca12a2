//! Execution contexts
//!
//! - [`WorkerScheduler`]: pool of background threads for producers that may
//!   block (the "io" scheduler)
//! - [`AffinityScheduler`]: one serial thread, FIFO, analogous to a UI thread
//!   (the "main" scheduler)
//! - [`ImmediateScheduler`]: runs work in place on the caller
//!
//! Every scheduler runs its tasks under `catch_unwind`: a panicking task is
//! logged and swallowed and the context keeps serving work.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::config::{AffinityConfig, SchedulerConfig, WorkerConfig};
use crate::error::{Result, RxError, panic_message};

/// Unit of work accepted by a scheduler
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Named execution context
pub trait Scheduler: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Queue `task` for asynchronous execution; never blocks the caller
    fn schedule(&self, task: Task);
}

/// Shared scheduler handle
pub type SchedulerRef = Arc<dyn Scheduler>;

/// Run a task, logging and swallowing any panic.
pub(crate) fn run_guarded(scheduler: &str, task: Task) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
        error!(
            scheduler,
            "Scheduled task panicked: {}",
            panic_message(payload.as_ref())
        );
    }
}

/// Background pool backed by a dedicated tokio runtime.
///
/// Tasks go to the runtime's blocking pool, so they are free to sleep or do
/// blocking I/O without starving anything else.
pub struct WorkerScheduler {
    name: String,
    runtime: Option<Runtime>,
    handle: Handle,
}

impl WorkerScheduler {
    /// Build the pool described by `config`
    pub fn new(config: &WorkerConfig) -> Result<Self> {
        let prefix = config.thread_name.clone();
        let counter = AtomicUsize::new(0);

        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .max_blocking_threads(config.max_blocking_threads.max(1))
            .thread_keep_alive(config.keep_alive())
            .thread_name_fn(move || {
                let id = counter.fetch_add(1, Ordering::Relaxed);
                format!("{}-{}", prefix, id)
            })
            .enable_time()
            .build()?;

        debug!(
            "Worker scheduler {} started ({} workers, {} max blocking)",
            config.thread_name, config.worker_threads, config.max_blocking_threads
        );

        Ok(Self {
            name: config.thread_name.clone(),
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    /// Handle to the underlying runtime, for async work that belongs to the pool
    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl Scheduler for WorkerScheduler {
    fn name(&self) -> &str {
        &self.name
    }

    fn schedule(&self, task: Task) {
        let name = self.name.clone();
        self.handle.spawn_blocking(move || run_guarded(&name, task));
    }
}

impl Drop for WorkerScheduler {
    fn drop(&mut self) {
        // shutdown_background is the only teardown that is legal from inside
        // an async context or from one of the pool's own threads.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            debug!("Worker scheduler {} shut down", self.name);
        }
    }
}

/// Single serial thread draining a FIFO queue.
///
/// Tasks run one at a time in submission order on the same thread. The thread
/// exits once the scheduler is dropped and the queue is drained.
pub struct AffinityScheduler {
    name: String,
    sender: mpsc::UnboundedSender<Task>,
    thread_id: ThreadId,
}

impl AffinityScheduler {
    pub fn new(config: &AffinityConfig) -> Result<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Task>();
        let loop_name = config.thread_name.clone();

        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                debug!("Affinity scheduler {} started", loop_name);
                while let Some(task) = receiver.blocking_recv() {
                    run_guarded(&loop_name, task);
                }
                debug!("Affinity scheduler {} stopped", loop_name);
            })?;

        Ok(Self {
            name: config.thread_name.clone(),
            sender,
            thread_id: handle.thread().id(),
        })
    }

    /// Whether the calling thread is this scheduler's thread
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl Scheduler for AffinityScheduler {
    fn name(&self) -> &str {
        &self.name
    }

    fn schedule(&self, task: Task) {
        if self.sender.send(task).is_err() {
            warn!(
                "Dropping task: {}",
                RxError::SchedulerShutdown(self.name.clone())
            );
        }
    }
}

/// Runs every task synchronously on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn name(&self) -> &str {
        "immediate"
    }

    fn schedule(&self, task: Task) {
        run_guarded(self.name(), task);
    }
}

/// The pair of contexts a pipeline usually needs.
#[derive(Clone)]
pub struct Schedulers {
    /// Worker pool for producers
    pub io: SchedulerRef,
    /// Serial context for consumers
    pub main: SchedulerRef,
}

impl Schedulers {
    pub fn new(config: &SchedulerConfig) -> Result<Self> {
        Ok(Self {
            io: Arc::new(WorkerScheduler::new(&config.worker)?),
            main: Arc::new(AffinityScheduler::new(&config.affinity)?),
        })
    }

    /// In-place scheduler handle
    pub fn immediate() -> SchedulerRef {
        Arc::new(ImmediateScheduler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::mpsc::channel;
    use std::time::{Duration, Instant};

    const WAIT: Duration = Duration::from_secs(5);

    fn affinity(name: &str) -> AffinityScheduler {
        AffinityScheduler::new(&AffinityConfig {
            thread_name: name.to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_affinity_runs_in_order_on_one_thread() {
        let scheduler = affinity("test-main");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = channel();

        for i in 0..50 {
            let seen = Arc::clone(&seen);
            scheduler.schedule(Box::new(move || {
                let name = thread::current().name().map(str::to_string);
                seen.lock().push((i, name));
            }));
        }
        scheduler.schedule(Box::new(move || done_tx.send(()).unwrap()));
        done_rx.recv_timeout(WAIT).unwrap();

        let seen = seen.lock();
        let order: Vec<_> = seen.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, (0..50).collect::<Vec<_>>());
        assert!(seen.iter().all(|(_, n)| n.as_deref() == Some("test-main")));
    }

    #[test]
    fn test_affinity_survives_panicking_task() {
        let scheduler = affinity("test-main-panic");
        let (tx, rx) = channel();

        scheduler.schedule(Box::new(|| panic!("task failure")));
        scheduler.schedule(Box::new(move || tx.send(42).unwrap()));

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 42);
    }

    #[test]
    fn test_affinity_is_current() {
        let scheduler = Arc::new(affinity("test-main-current"));
        assert!(!scheduler.is_current());

        let (tx, rx) = channel();
        let inner = Arc::clone(&scheduler);
        scheduler.schedule(Box::new(move || tx.send(inner.is_current()).unwrap()));
        assert!(rx.recv_timeout(WAIT).unwrap());
    }

    #[test]
    fn test_worker_runs_on_named_pool_thread() {
        let scheduler = WorkerScheduler::new(&WorkerConfig {
            thread_name: "test-io".to_string(),
            ..WorkerConfig::default()
        })
        .unwrap();
        let (tx, rx) = channel();

        scheduler.schedule(Box::new(move || {
            tx.send(thread::current().name().map(str::to_string)).unwrap();
        }));

        let name = rx.recv_timeout(WAIT).unwrap().unwrap();
        assert!(name.starts_with("test-io-"), "unexpected thread {}", name);
    }

    #[test]
    fn test_worker_schedule_does_not_block_caller() {
        let scheduler = WorkerScheduler::new(&WorkerConfig::default()).unwrap();
        let (tx, rx) = channel();

        let start = Instant::now();
        scheduler.schedule(Box::new(move || {
            thread::sleep(Duration::from_millis(200));
            tx.send(()).unwrap();
        }));
        assert!(start.elapsed() < Duration::from_millis(150));

        rx.recv_timeout(WAIT).unwrap();
    }

    #[test]
    fn test_worker_survives_panicking_task() {
        let scheduler = WorkerScheduler::new(&WorkerConfig::default()).unwrap();
        let (tx, rx) = channel();

        scheduler.schedule(Box::new(|| panic!("worker failure")));
        scheduler.schedule(Box::new(move || tx.send(7).unwrap()));

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 7);
    }

    #[test]
    fn test_immediate_runs_inline() {
        let caller = thread::current().id();
        let ran_on = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&ran_on);

        ImmediateScheduler.schedule(Box::new(move || {
            *slot.lock() = Some(thread::current().id());
        }));

        assert_eq!(*ran_on.lock(), Some(caller));
    }

    #[test]
    fn test_schedulers_bundle() {
        let schedulers = Schedulers::new(&SchedulerConfig::default()).unwrap();
        assert_eq!(schedulers.io.name(), "rx-io");
        assert_eq!(schedulers.main.name(), "rx-main");
        assert_eq!(Schedulers::immediate().name(), "immediate");
    }
}
