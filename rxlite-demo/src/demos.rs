//! The demo pipelines and the "screen" that owns their subscriptions

use clap::ValueEnum;
use colored::Colorize;
use parking_lot::Mutex;
use rxlite::{
    CompositeDisposable, Disposable, DisposableRef, LambdaObserver, Observable, RxError, Schedulers,
};
use std::str::FromStr;
use std::sync::{Arc, Weak};
use std::thread;
use tracing::{debug, error, info};

use crate::config::DemoSettings;
use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    /// Completed tasks only, with a slow predicate on the worker pool
    Filter,
    /// Counts up while the value is at most five
    TakeWhile,
    /// 0..3, three times over
    Repeat,
    /// Ticks until the screen is torn down
    Interval,
    /// A single delayed tick
    Timer,
    /// Tasks pushed from a producer callback
    Create,
    /// The whole list as one value
    Just,
    /// Every task, in order
    FromArray,
}

impl Demo {
    pub fn name(self) -> &'static str {
        match self {
            Demo::Filter => "filter",
            Demo::TakeWhile => "take-while",
            Demo::Repeat => "repeat",
            Demo::Interval => "interval",
            Demo::Timer => "timer",
            Demo::Create => "create",
            Demo::Just => "just",
            Demo::FromArray => "from-array",
        }
    }
}

/// What `--demo` asks for: one pipeline or every one of them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    One(Demo),
    All,
}

impl Selection {
    pub fn demos(self) -> Vec<Demo> {
        match self {
            Selection::One(demo) => vec![demo],
            Selection::All => Demo::value_variants().to_vec(),
        }
    }
}

impl FromStr for Selection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(Selection::All);
        }
        Demo::from_str(s, true)
            .map(Selection::One)
            .map_err(|_| format!("unknown demo '{}'", s))
    }
}

fn thread_name() -> String {
    thread::current().name().unwrap_or("<unnamed>").to_string()
}

/// Build the pipeline for `demo`; each emission is rendered as one line.
pub fn pipeline(demo: Demo, tasks: &[Task], settings: &DemoSettings) -> Observable<String> {
    match demo {
        Demo::Filter => {
            let delay = settings.filter_delay();
            Observable::from_iter(tasks.to_vec())
                .filter(move |task| {
                    debug!(thread = %thread_name(), "Checking '{}'", task.description);
                    thread::sleep(delay);
                    task.is_complete
                })
                .map(|task| task.to_string())
        }
        Demo::TakeWhile => Observable::range(0, 11)
            .take_while(|n| *n <= 5)
            .map(|n| n.to_string()),
        Demo::Repeat => Observable::range(0, 3).repeat(2).map(|n| n.to_string()),
        Demo::Interval => {
            Observable::interval(settings.interval()).map(|tick| format!("tick {}", tick))
        }
        Demo::Timer => {
            let delay = settings.timer_delay();
            Observable::timer(delay).map(move |_| format!("fired after {:?}", delay))
        }
        Demo::Create => {
            let tasks = tasks.to_vec();
            Observable::create(move |emitter| {
                for task in &tasks {
                    if emitter.is_disposed() {
                        return Ok(());
                    }
                    emitter.on_next(task.clone());
                }
                emitter.on_complete();
                Ok(())
            })
            .map(|task| task.to_string())
        }
        Demo::Just => Observable::just(tasks.to_vec()).map(|list| {
            let open = list.iter().filter(|task| !task.is_complete).count();
            format!("{} tasks, {} open", list.len(), open)
        }),
        Demo::FromArray => Observable::from_array(tasks.to_vec()).map(|task| task.to_string()),
    }
}

enum Tracking {
    Pending,
    Active(Weak<dyn Disposable>),
    Finished,
}

/// Drops a subscription from the screen's group once it terminates.
///
/// The terminal signal can arrive on the affinity thread before `show` has
/// the handle, so both sides meet under one lock. The handle is held weakly;
/// the group owns it.
struct Untrack {
    subscriptions: Arc<CompositeDisposable>,
    state: Mutex<Tracking>,
}

impl Untrack {
    fn started(&self, handle: &DisposableRef) {
        let mut state = self.state.lock();
        if matches!(*state, Tracking::Finished) {
            self.subscriptions.delete(handle);
        } else {
            *state = Tracking::Active(Arc::downgrade(handle));
        }
    }

    fn finished(&self) {
        let mut state = self.state.lock();
        let handle = match &*state {
            Tracking::Active(handle) => handle.upgrade(),
            _ => None,
        };
        if let Some(handle) = handle {
            self.subscriptions.delete(&handle);
        }
        *state = Tracking::Finished;
    }
}

/// Owns the schedulers and every running subscription started on them.
///
/// Producers run on the worker pool; lines are rendered on the affinity thread.
pub struct Screen {
    schedulers: Schedulers,
    subscriptions: Arc<CompositeDisposable>,
}

impl Screen {
    pub fn new(schedulers: Schedulers) -> Self {
        Self {
            schedulers,
            subscriptions: Arc::new(CompositeDisposable::new()),
        }
    }

    /// Run `pipeline` and track it until it terminates or the screen is torn down
    pub fn show(&self, demo: Demo, pipeline: Observable<String>) -> DisposableRef {
        let label = demo.name();
        info!("Starting {} demo", label);

        let untrack = Arc::new(Untrack {
            subscriptions: Arc::clone(&self.subscriptions),
            state: Mutex::new(Tracking::Pending),
        });
        let (on_error, on_complete) = (Arc::clone(&untrack), Arc::clone(&untrack));

        let handle = pipeline
            .subscribe_on(self.schedulers.io.clone())
            .observe_on(self.schedulers.main.clone())
            .subscribe_into(
                &self.subscriptions,
                LambdaObserver::new(
                    move |line: String| {
                        info!(thread = %thread_name(), "{} {}", format!("[{}]", label).cyan(), line)
                    },
                    move |e: RxError| {
                        error!(demo = label, "Pipeline failed: {}", e);
                        on_error.finished();
                    },
                    move || {
                        info!("{} {}", format!("[{}]", label).cyan(), "done".green());
                        on_complete.finished();
                    },
                ),
            );

        untrack.started(&handle);
        handle
    }

    /// Subscriptions still running on this screen
    pub fn tracked(&self) -> usize {
        self.subscriptions.len()
    }

    /// Dispose every subscription; the screen accepts no new ones afterwards.
    pub fn teardown(&self) {
        self.subscriptions.clear();
    }
}
