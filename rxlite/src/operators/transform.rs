//! Transformation operators
//!
//! Each operator returns a new [`Observable`] whose subscription wraps the
//! downstream observer in a stage observer and subscribes upstream with it.
//! Per-subscription state (counters, seen sets, buffers) lives in the stage
//! observer, so one description can be subscribed any number of times.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

use crate::disposable::{self, Disposable, DisposableRef, SerialDisposable};
use crate::error::{Result, RxError};
use crate::observable::{Observable, StageLink};
use crate::observer::{BoxObserver, Observer};

/// Run user code, turning a panic into an error attributed to `stage`.
fn guarded<R>(stage: &str, f: impl FnOnce() -> Result<R>) -> Result<R> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(RxError::from_panic(stage, payload.as_ref())))
}

/// Common state of a stage that may terminate on its own
struct Stage<T> {
    downstream: BoxObserver<T>,
    link: StageLink,
    done: bool,
}

impl<T> Stage<T> {
    fn new(downstream: BoxObserver<T>) -> Self {
        Self {
            downstream,
            link: StageLink::new(),
            done: false,
        }
    }

    fn subscribe(&mut self, upstream: DisposableRef) {
        let handle = self.link.attach(upstream);
        self.downstream.on_subscribe(handle);
    }

    fn next(&mut self, value: T) {
        if !self.done {
            self.downstream.on_next(value);
        }
    }

    /// Cancel upstream and fail downstream
    fn fail(&mut self, error: RxError) {
        if self.done {
            return;
        }
        self.done = true;
        self.link.cancel_upstream();
        self.downstream.on_error(error);
    }

    /// Cancel upstream and complete downstream
    fn finish(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.link.cancel_upstream();
        self.downstream.on_complete();
    }

    fn error(&mut self, error: RxError) {
        if self.done {
            return;
        }
        self.done = true;
        self.downstream.on_error(error);
    }

    fn complete(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.downstream.on_complete();
    }
}

struct FilterObserver<T, P> {
    stage: Stage<T>,
    predicate: Arc<P>,
}

impl<T, P> Observer<T> for FilterObserver<T, P>
where
    T: Send,
    P: Fn(&T) -> Result<bool> + Send + Sync,
{
    fn on_subscribe(&mut self, upstream: DisposableRef) {
        self.stage.subscribe(upstream);
    }

    fn on_next(&mut self, value: T) {
        if self.stage.done {
            return;
        }
        match guarded("filter", || (self.predicate)(&value)) {
            Ok(true) => self.stage.next(value),
            Ok(false) => trace!("filter dropped a value"),
            Err(error) => self.stage.fail(error),
        }
    }

    fn on_error(&mut self, error: RxError) {
        self.stage.error(error);
    }

    fn on_complete(&mut self) {
        self.stage.complete();
    }
}

struct TakeWhileObserver<T, P> {
    stage: Stage<T>,
    predicate: Arc<P>,
}

impl<T, P> Observer<T> for TakeWhileObserver<T, P>
where
    T: Send,
    P: Fn(&T) -> Result<bool> + Send + Sync,
{
    fn on_subscribe(&mut self, upstream: DisposableRef) {
        self.stage.subscribe(upstream);
    }

    fn on_next(&mut self, value: T) {
        if self.stage.done {
            return;
        }
        match guarded("take_while", || (self.predicate)(&value)) {
            Ok(true) => self.stage.next(value),
            Ok(false) => self.stage.finish(),
            Err(error) => self.stage.fail(error),
        }
    }

    fn on_error(&mut self, error: RxError) {
        self.stage.error(error);
    }

    fn on_complete(&mut self) {
        self.stage.complete();
    }
}

struct MapObserver<T, R, F> {
    stage: Stage<R>,
    mapper: Arc<F>,
    _input: std::marker::PhantomData<fn(T)>,
}

impl<T, R, F> Observer<T> for MapObserver<T, R, F>
where
    R: Send,
    F: Fn(T) -> R + Send + Sync,
{
    fn on_subscribe(&mut self, upstream: DisposableRef) {
        self.stage.subscribe(upstream);
    }

    fn on_next(&mut self, value: T) {
        if self.stage.done {
            return;
        }
        match guarded("map", || Ok((self.mapper)(value))) {
            Ok(mapped) => self.stage.next(mapped),
            Err(error) => self.stage.fail(error),
        }
    }

    fn on_error(&mut self, error: RxError) {
        self.stage.error(error);
    }

    fn on_complete(&mut self) {
        self.stage.complete();
    }
}

struct DoOnNextObserver<T, F> {
    stage: Stage<T>,
    action: Arc<F>,
}

impl<T, F> Observer<T> for DoOnNextObserver<T, F>
where
    T: Send,
    F: Fn(&T) + Send + Sync,
{
    fn on_subscribe(&mut self, upstream: DisposableRef) {
        self.stage.subscribe(upstream);
    }

    fn on_next(&mut self, value: T) {
        if self.stage.done {
            return;
        }
        match guarded("do_on_next", || {
            (self.action)(&value);
            Ok(())
        }) {
            Ok(()) => self.stage.next(value),
            Err(error) => self.stage.fail(error),
        }
    }

    fn on_error(&mut self, error: RxError) {
        self.stage.error(error);
    }

    fn on_complete(&mut self) {
        self.stage.complete();
    }
}

struct TakeObserver<T> {
    stage: Stage<T>,
    remaining: u64,
}

impl<T: Send> Observer<T> for TakeObserver<T> {
    fn on_subscribe(&mut self, upstream: DisposableRef) {
        self.stage.subscribe(upstream);
        if self.remaining == 0 {
            self.stage.finish();
        }
    }

    fn on_next(&mut self, value: T) {
        if self.stage.done {
            return;
        }
        self.remaining -= 1;
        self.stage.next(value);
        if self.remaining == 0 {
            self.stage.finish();
        }
    }

    fn on_error(&mut self, error: RxError) {
        self.stage.error(error);
    }

    fn on_complete(&mut self) {
        self.stage.complete();
    }
}

struct DistinctObserver<T> {
    stage: Stage<T>,
    seen: HashSet<T>,
}

impl<T> Observer<T> for DistinctObserver<T>
where
    T: Eq + Hash + Clone + Send,
{
    fn on_subscribe(&mut self, upstream: DisposableRef) {
        self.stage.subscribe(upstream);
    }

    fn on_next(&mut self, value: T) {
        if self.stage.done {
            return;
        }
        if self.seen.insert(value.clone()) {
            self.stage.next(value);
        }
    }

    fn on_error(&mut self, error: RxError) {
        self.seen.clear();
        self.stage.error(error);
    }

    fn on_complete(&mut self) {
        self.seen.clear();
        self.stage.complete();
    }
}

struct BufferObserver<T> {
    stage: Stage<Vec<T>>,
    size: usize,
    buffer: Vec<T>,
}

impl<T: Send> Observer<T> for BufferObserver<T> {
    fn on_subscribe(&mut self, upstream: DisposableRef) {
        self.stage.subscribe(upstream);
    }

    fn on_next(&mut self, value: T) {
        if self.stage.done {
            return;
        }
        self.buffer.push(value);
        if self.buffer.len() >= self.size {
            let chunk = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.size));
            self.stage.next(chunk);
        }
    }

    fn on_error(&mut self, error: RxError) {
        // Partial chunk is discarded on error.
        self.buffer.clear();
        self.stage.error(error);
    }

    fn on_complete(&mut self) {
        if !self.buffer.is_empty() {
            let chunk = std::mem::take(&mut self.buffer);
            self.stage.next(chunk);
        }
        self.stage.complete();
    }
}

struct ThrottleFirstObserver<T> {
    stage: Stage<T>,
    window: Duration,
    last_emit: Option<Instant>,
}

impl<T: Send> Observer<T> for ThrottleFirstObserver<T> {
    fn on_subscribe(&mut self, upstream: DisposableRef) {
        self.stage.subscribe(upstream);
    }

    fn on_next(&mut self, value: T) {
        if self.stage.done {
            return;
        }
        let now = Instant::now();
        let open = self
            .last_emit
            .is_none_or(|last| now.duration_since(last) >= self.window);
        if open {
            self.last_emit = Some(now);
            self.stage.next(value);
        }
    }

    fn on_error(&mut self, error: RxError) {
        self.stage.error(error);
    }

    fn on_complete(&mut self) {
        self.stage.complete();
    }
}

/// Per-subscription state of `repeat`
struct RepeatShared<T> {
    source: Observable<T>,
    downstream: Mutex<BoxObserver<T>>,
    link: Arc<SerialDisposable>,
    /// Additional cycles allowed after the first; `None` repeats forever
    times: Option<u64>,
    completed_cycles: AtomicU64,
    wip: AtomicUsize,
    done: AtomicBool,
}

impl<T: Send + 'static> RepeatShared<T> {
    /// Subscribe to the next cycle.
    ///
    /// Trampolined: a cycle that completes synchronously inside `subscribe`
    /// bumps `wip` and returns, and the loop here starts the following cycle,
    /// so the stack stays flat however many cycles run.
    fn subscribe_next(self: &Arc<Self>) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let mut missed = 1;
        loop {
            if self.link.is_disposed() || self.done.load(Ordering::Acquire) {
                return;
            }
            self.source.subscribe_actual(Box::new(RepeatObserver {
                shared: Arc::clone(self),
            }));
            missed = self.wip.fetch_sub(missed, Ordering::AcqRel) - missed;
            if missed == 0 {
                break;
            }
        }
    }
}

struct RepeatObserver<T> {
    shared: Arc<RepeatShared<T>>,
}

impl<T: Send + 'static> Observer<T> for RepeatObserver<T> {
    fn on_subscribe(&mut self, upstream: DisposableRef) {
        // The previous cycle already terminated; swap in the new one.
        self.shared.link.replace(upstream);
    }

    fn on_next(&mut self, value: T) {
        if self.shared.done.load(Ordering::Acquire) {
            return;
        }
        self.shared.downstream.lock().on_next(value);
    }

    fn on_error(&mut self, error: RxError) {
        if self.shared.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.downstream.lock().on_error(error);
    }

    fn on_complete(&mut self) {
        let cycles = self.shared.completed_cycles.fetch_add(1, Ordering::AcqRel) + 1;
        let again = self.shared.times.is_none_or(|times| cycles <= times);
        if again && !self.shared.link.is_disposed() {
            trace!("repeat starting cycle {}", cycles + 1);
            self.shared.subscribe_next();
            return;
        }
        if self.shared.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.downstream.lock().on_complete();
    }
}

impl<T: Send + 'static> Observable<T> {
    /// Forward only values for which `predicate` holds
    pub fn filter<P>(&self, predicate: P) -> Observable<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.try_filter(move |value| Ok(predicate(value)))
    }

    /// Fallible [`filter`](Observable::filter).
    ///
    /// A predicate error (or panic) disposes upstream and terminates the
    /// stream with `on_error`; no further values are examined.
    pub fn try_filter<P>(&self, predicate: P) -> Observable<T>
    where
        P: Fn(&T) -> Result<bool> + Send + Sync + 'static,
    {
        let source = self.clone();
        let predicate = Arc::new(predicate);
        Observable::new(move |downstream| {
            source.subscribe_actual(Box::new(FilterObserver {
                stage: Stage::new(downstream),
                predicate: Arc::clone(&predicate),
            }));
        })
    }

    /// Forward values while `predicate` holds, then complete.
    ///
    /// The first failing value is not forwarded; upstream is disposed.
    pub fn take_while<P>(&self, predicate: P) -> Observable<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.try_take_while(move |value| Ok(predicate(value)))
    }

    /// Fallible [`take_while`](Observable::take_while)
    pub fn try_take_while<P>(&self, predicate: P) -> Observable<T>
    where
        P: Fn(&T) -> Result<bool> + Send + Sync + 'static,
    {
        let source = self.clone();
        let predicate = Arc::new(predicate);
        Observable::new(move |downstream| {
            source.subscribe_actual(Box::new(TakeWhileObserver {
                stage: Stage::new(downstream),
                predicate: Arc::clone(&predicate),
            }));
        })
    }

    /// Transform every value
    pub fn map<R, F>(&self, mapper: F) -> Observable<R>
    where
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        let source = self.clone();
        let mapper = Arc::new(mapper);
        Observable::new(move |downstream| {
            source.subscribe_actual(Box::new(MapObserver {
                stage: Stage::new(downstream),
                mapper: Arc::clone(&mapper),
                _input: std::marker::PhantomData,
            }));
        })
    }

    /// Run a side effect for every value before forwarding it
    pub fn do_on_next<F>(&self, action: F) -> Observable<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let source = self.clone();
        let action = Arc::new(action);
        Observable::new(move |downstream| {
            source.subscribe_actual(Box::new(DoOnNextObserver {
                stage: Stage::new(downstream),
                action: Arc::clone(&action),
            }));
        })
    }

    /// Forward the first `count` values, then complete and dispose upstream
    pub fn take(&self, count: u64) -> Observable<T> {
        let source = self.clone();
        Observable::new(move |downstream| {
            source.subscribe_actual(Box::new(TakeObserver {
                stage: Stage::new(downstream),
                remaining: count,
            }));
        })
    }

    /// Drop values already seen by this subscription
    pub fn distinct(&self) -> Observable<T>
    where
        T: Eq + Hash + Clone,
    {
        let source = self.clone();
        Observable::new(move |downstream| {
            source.subscribe_actual(Box::new(DistinctObserver {
                stage: Stage::new(downstream),
                seen: HashSet::new(),
            }));
        })
    }

    /// Group values into chunks of `size`; the remainder is emitted on completion
    pub fn buffer(&self, size: usize) -> Observable<Vec<T>> {
        let source = self.clone();
        Observable::new(move |mut downstream| {
            if size == 0 {
                downstream.on_subscribe(disposable::disposed());
                downstream.on_error(RxError::InvalidArgument(
                    "buffer size must be positive".to_string(),
                ));
                return;
            }
            source.subscribe_actual(Box::new(BufferObserver {
                stage: Stage::new(downstream),
                size,
                buffer: Vec::with_capacity(size),
            }));
        })
    }

    /// Forward a value, then ignore everything for `window`
    pub fn throttle_first(&self, window: Duration) -> Observable<T> {
        let source = self.clone();
        Observable::new(move |downstream| {
            source.subscribe_actual(Box::new(ThrottleFirstObserver {
                stage: Stage::new(downstream),
                window,
                last_emit: None,
            }));
        })
    }

    /// Re-subscribe upstream `times` more times after it completes.
    ///
    /// `repeat(2)` over a three-element source yields nine values. An error
    /// in any cycle ends the whole chain.
    pub fn repeat(&self, times: u64) -> Observable<T> {
        self.repeat_inner(Some(times))
    }

    /// Re-subscribe upstream every time it completes, until disposed
    pub fn repeat_forever(&self) -> Observable<T> {
        self.repeat_inner(None)
    }

    fn repeat_inner(&self, times: Option<u64>) -> Observable<T> {
        let source = self.clone();
        Observable::new(move |mut downstream| {
            let link = Arc::new(SerialDisposable::new());
            downstream.on_subscribe(link.clone());

            let shared = Arc::new(RepeatShared {
                source: source.clone(),
                downstream: Mutex::new(downstream),
                link,
                times,
                completed_cycles: AtomicU64::new(0),
                wip: AtomicUsize::new(0),
                done: AtomicBool::new(false),
            });
            shared.subscribe_next();
        })
    }
}
