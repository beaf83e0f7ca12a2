//! Schedule-binding operators: `subscribe_on` and `observe_on`

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{error, trace};

use crate::disposable::{Disposable, DisposableRef, SerialDisposable};
use crate::error::RxError;
use crate::observable::Observable;
use crate::observer::{BoxObserver, Observer};
use crate::scheduler::SchedulerRef;

/// Downstream of `subscribe_on`, shared with the scheduled task; `None` once
/// a terminal signal has gone out.
type DownstreamSlot<T> = Arc<Mutex<Option<BoxObserver<T>>>>;

/// Upstream side of `subscribe_on`: the upstream handle goes into the link
/// that downstream already holds.
struct SubscribeOnObserver<T> {
    downstream: DownstreamSlot<T>,
    link: Arc<SerialDisposable>,
}

impl<T: Send> Observer<T> for SubscribeOnObserver<T> {
    fn on_subscribe(&mut self, upstream: DisposableRef) {
        self.link.set(upstream);
    }

    fn on_next(&mut self, value: T) {
        if let Some(observer) = self.downstream.lock().as_mut() {
            observer.on_next(value);
        }
    }

    fn on_error(&mut self, error: RxError) {
        let observer = self.downstream.lock().take();
        if let Some(mut observer) = observer {
            observer.on_error(error);
        }
    }

    fn on_complete(&mut self) {
        let observer = self.downstream.lock().take();
        if let Some(mut observer) = observer {
            observer.on_complete();
        }
    }
}

enum Signal<T> {
    Next(T),
    Error(RxError),
    Complete,
}

impl<T> Signal<T> {
    fn is_terminal(&self) -> bool {
        !matches!(self, Signal::Next(_))
    }
}

/// Per-subscription queue marshaling signals onto the target scheduler
struct ObserveOnShared<T> {
    queue: Mutex<VecDeque<Signal<T>>>,
    /// Signals enqueued and not yet accounted for by a drain pass
    wip: AtomicUsize,
    /// `None` once a terminal signal has been delivered
    downstream: Mutex<Option<BoxObserver<T>>>,
    link: Arc<SerialDisposable>,
    scheduler: SchedulerRef,
}

impl<T: Send + 'static> ObserveOnShared<T> {
    fn enqueue(self: &Arc<Self>, signal: Signal<T>) {
        if self.link.is_disposed() {
            return;
        }
        self.queue.lock().push_back(signal);
        if self.wip.fetch_add(1, Ordering::AcqRel) == 0 {
            let shared = Arc::clone(self);
            self.scheduler.schedule(Box::new(move || shared.drain()));
        }
    }

    /// Deliver queued signals in order; at most one drain runs at a time.
    fn drain(&self) {
        let mut missed = 1;
        loop {
            loop {
                let signal = self.queue.lock().pop_front();
                match signal {
                    Some(signal) => self.deliver(signal),
                    None => break,
                }
            }
            missed = self.wip.fetch_sub(missed, Ordering::AcqRel) - missed;
            if missed == 0 {
                break;
            }
        }
    }

    fn deliver(&self, signal: Signal<T>) {
        if self.link.is_disposed() {
            trace!("observe_on dropping signal after dispose");
            self.queue.lock().clear();
            return;
        }

        let mut slot = self.downstream.lock();
        let Some(observer) = slot.as_mut() else {
            return;
        };

        let terminal = signal.is_terminal();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match signal {
            Signal::Next(value) => observer.on_next(value),
            Signal::Error(error) => observer.on_error(error),
            Signal::Complete => observer.on_complete(),
        }));

        match outcome {
            Ok(()) => {
                if terminal {
                    *slot = None;
                }
            }
            Err(payload) => {
                let error = RxError::from_panic("observe_on", payload.as_ref());
                error!(
                    scheduler = self.scheduler.name(),
                    "Observer panicked, terminating subscription: {}", error
                );
                self.link.dispose();
                if !terminal {
                    let _ = panic::catch_unwind(AssertUnwindSafe(|| observer.on_error(error)));
                }
                *slot = None;
            }
        }
    }
}

struct ObserveOnObserver<T> {
    shared: Arc<ObserveOnShared<T>>,
}

impl<T: Send + 'static> Observer<T> for ObserveOnObserver<T> {
    fn on_subscribe(&mut self, upstream: DisposableRef) {
        self.shared.link.set(upstream);
    }

    fn on_next(&mut self, value: T) {
        self.shared.enqueue(Signal::Next(value));
    }

    fn on_error(&mut self, error: RxError) {
        self.shared.enqueue(Signal::Error(error));
    }

    fn on_complete(&mut self) {
        self.shared.enqueue(Signal::Complete);
    }
}

impl<T: Send + 'static> Observable<T> {
    /// Run the upstream subscription (and so the producer) on `scheduler`.
    ///
    /// `on_subscribe` still reaches the observer synchronously on the calling
    /// context. If the subscription is disposed before the scheduled task
    /// runs, the producer never starts. When several `subscribe_on` calls are
    /// chained, the one closest to the source decides where production runs.
    /// A panic escaping the producer terminates the subscription with
    /// `on_error(RxError::Panicked)` unless it already terminated.
    pub fn subscribe_on(&self, scheduler: SchedulerRef) -> Observable<T> {
        let source = self.clone();
        Observable::new(move |mut downstream| {
            let link = Arc::new(SerialDisposable::new());
            downstream.on_subscribe(link.clone());

            let source = source.clone();
            // Keeps the context alive until the producer has run.
            let context = Arc::clone(&scheduler);
            scheduler.schedule(Box::new(move || {
                if link.is_disposed() {
                    trace!(
                        scheduler = context.name(),
                        "Skipping producer of a disposed subscription"
                    );
                    return;
                }
                trace!(scheduler = context.name(), "Starting producer");

                let slot: DownstreamSlot<T> = Arc::new(Mutex::new(Some(downstream)));
                let upstream = SubscribeOnObserver {
                    downstream: Arc::clone(&slot),
                    link: Arc::clone(&link),
                };
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    source.subscribe_actual(Box::new(upstream))
                }));

                if let Err(payload) = outcome {
                    let error = RxError::from_panic("subscribe_on", payload.as_ref());
                    error!(
                        scheduler = context.name(),
                        "Producer panicked, terminating subscription: {}", error
                    );
                    let observer = slot.lock().take();
                    if let Some(mut observer) = observer {
                        let _ = panic::catch_unwind(AssertUnwindSafe(|| observer.on_error(error)));
                    }
                    link.dispose();
                }
            }));
        })
    }

    /// Deliver every signal to downstream on `scheduler`, in emission order.
    pub fn observe_on(&self, scheduler: SchedulerRef) -> Observable<T> {
        let source = self.clone();
        Observable::new(move |mut downstream| {
            let link = Arc::new(SerialDisposable::new());
            downstream.on_subscribe(link.clone());

            let shared = Arc::new(ObserveOnShared {
                queue: Mutex::new(VecDeque::new()),
                wip: AtomicUsize::new(0),
                downstream: Mutex::new(Some(downstream)),
                link,
                scheduler: Arc::clone(&scheduler),
            });
            source.subscribe_actual(Box::new(ObserveOnObserver { shared }));
        })
    }
}
