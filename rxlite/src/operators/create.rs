//! Creation operators

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::disposable::{self, BooleanDisposable, Disposable};
use crate::error::{Result, RxError};
use crate::observable::Observable;
use crate::observer::BoxObserver;

/// Producer-side handle passed to [`Observable::create`] callbacks.
///
/// Every method checks disposal first, so emitting into a disposed or
/// terminated subscription is a silent no-op.
pub struct Emitter<T> {
    observer: BoxObserver<T>,
    disposable: Arc<BooleanDisposable>,
    done: bool,
}

impl<T> Emitter<T> {
    fn new(observer: BoxObserver<T>, disposable: Arc<BooleanDisposable>) -> Self {
        Self {
            observer,
            disposable,
            done: false,
        }
    }

    pub fn on_next(&mut self, value: T) {
        if self.done || self.disposable.is_disposed() {
            return;
        }
        self.observer.on_next(value);
    }

    pub fn on_error(&mut self, error: RxError) {
        if self.done || self.disposable.is_disposed() {
            trace!("Emitter dropping on_error: {}", error);
            return;
        }
        self.done = true;
        self.observer.on_error(error);
        self.disposable.dispose();
    }

    pub fn on_complete(&mut self) {
        if self.done || self.disposable.is_disposed() {
            return;
        }
        self.done = true;
        self.observer.on_complete();
        self.disposable.dispose();
    }

    /// Whether downstream disposed the subscription (or it already terminated)
    pub fn is_disposed(&self) -> bool {
        self.done || self.disposable.is_disposed()
    }

    /// Block the producer for up to `timeout`, waking early on disposal.
    ///
    /// Returns `true` if the subscription is disposed.
    pub fn wait_disposed(&self, timeout: Duration) -> bool {
        self.done || self.disposable.wait_disposed(timeout)
    }
}

impl<T: Send + 'static> Observable<T> {
    /// Observable from a producer callback.
    ///
    /// The callback runs on whatever context subscribes (see
    /// [`subscribe_on`](Observable::subscribe_on)). Returning `Err` emits
    /// `on_error`; a panic inside the callback, or inside a downstream stage
    /// it is synchronously feeding, becomes `on_error(RxError::Panicked)`.
    pub fn create<F>(producer: F) -> Self
    where
        F: Fn(&mut Emitter<T>) -> Result<()> + Send + Sync + 'static,
    {
        Observable::new(move |mut observer| {
            let disposable = Arc::new(BooleanDisposable::new());
            observer.on_subscribe(disposable.clone());

            let mut emitter = Emitter::new(observer, disposable);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| producer(&mut emitter)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(error)) => emitter.on_error(error),
                Err(payload) => emitter.on_error(RxError::from_panic("create", payload.as_ref())),
            }
        })
    }

    /// Emit `value` once, then complete
    pub fn just(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Observable::create(move |emitter| {
            emitter.on_next(value.clone());
            emitter.on_complete();
            Ok(())
        })
    }

    /// Emit every element of `iterable` in order, then complete.
    ///
    /// The iterable is cloned per subscription so each subscriber sees the
    /// whole sequence.
    #[allow(clippy::should_implement_trait)]
    pub fn from_iter<I>(iterable: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
    {
        Observable::create(move |emitter| {
            for item in iterable.clone() {
                if emitter.is_disposed() {
                    return Ok(());
                }
                emitter.on_next(item);
            }
            emitter.on_complete();
            Ok(())
        })
    }

    /// Emit the elements of a fixed ordered collection, then complete
    pub fn from_array(values: impl Into<Arc<[T]>>) -> Self
    where
        T: Clone + Sync,
    {
        let values: Arc<[T]> = values.into();
        Observable::create(move |emitter| {
            for item in values.iter() {
                if emitter.is_disposed() {
                    return Ok(());
                }
                emitter.on_next(item.clone());
            }
            emitter.on_complete();
            Ok(())
        })
    }

    /// Complete immediately without emitting
    pub fn empty() -> Self {
        Observable::create(|emitter| {
            emitter.on_complete();
            Ok(())
        })
    }

    /// Never emit and never terminate
    pub fn never() -> Self {
        Observable::new(|mut observer| observer.on_subscribe(disposable::empty()))
    }

    /// Fail immediately with `error`
    pub fn error(error: RxError) -> Self {
        Observable::create(move |_| Err(error.clone()))
    }
}

impl Observable<i64> {
    /// Emit `count` consecutive integers starting at `start`, then complete
    pub fn range(start: i64, count: u64) -> Self {
        Observable::create(move |emitter| {
            if count == 0 {
                emitter.on_complete();
                return Ok(());
            }

            let last = i64::try_from(count - 1)
                .ok()
                .and_then(|span| start.checked_add(span))
                .ok_or_else(|| {
                    RxError::InvalidArgument(format!(
                        "range({}, {}) overflows i64",
                        start, count
                    ))
                })?;

            for value in start..=last {
                if emitter.is_disposed() {
                    return Ok(());
                }
                emitter.on_next(value);
            }
            emitter.on_complete();
            Ok(())
        })
    }
}

impl Observable<u64> {
    /// Emit 0, 1, 2, ... once per `period`, until disposed.
    ///
    /// The producer blocks its executing context between ticks; pair it with
    /// `subscribe_on` to keep it off the caller.
    pub fn interval(period: Duration) -> Self {
        Self::interval_with_delay(period, period)
    }

    /// Like [`interval`](Observable::interval) with a separate first delay
    pub fn interval_with_delay(initial_delay: Duration, period: Duration) -> Self {
        Observable::create(move |emitter| {
            let start = Instant::now();
            let mut next_due = initial_delay;
            let mut tick: u64 = 0;

            loop {
                let wait = next_due.saturating_sub(start.elapsed());
                if emitter.wait_disposed(wait) {
                    return Ok(());
                }
                emitter.on_next(tick);
                tick += 1;
                // Fixed rate: ticks are scheduled from the start, not from the last emission.
                next_due = next_due.saturating_add(period);
            }
        })
    }

    /// Emit `0` after `delay`, then complete
    pub fn timer(delay: Duration) -> Self {
        Observable::create(move |emitter| {
            if emitter.wait_disposed(delay) {
                return Ok(());
            }
            emitter.on_next(0);
            emitter.on_complete();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Event, Recorder};

    #[test]
    fn test_from_iter_in_order() {
        let recorder = Recorder::new();
        Observable::from_iter(vec!["a", "b", "c"]).subscribe(recorder.observer());

        assert_eq!(
            recorder.events(),
            vec![
                Event::Next("a"),
                Event::Next("b"),
                Event::Next("c"),
                Event::Complete
            ]
        );
    }

    #[test]
    fn test_from_iter_empty_completes() {
        let recorder = Recorder::<i32>::new();
        Observable::from_iter(Vec::<i32>::new()).subscribe(recorder.observer());
        assert_eq!(recorder.events(), vec![Event::Complete]);
    }

    #[test]
    fn test_from_array_resubscribes_from_scratch() {
        let obs = Observable::from_array([1, 2, 3]);
        let first = Recorder::new();
        let second = Recorder::new();
        obs.subscribe(first.observer());
        obs.subscribe(second.observer());

        assert_eq!(first.values(), vec![1, 2, 3]);
        assert_eq!(first.events(), second.events());
    }

    #[test]
    fn test_just() {
        let recorder = Recorder::new();
        Observable::just("task").subscribe(recorder.observer());
        assert_eq!(recorder.events(), vec![Event::Next("task"), Event::Complete]);
    }

    #[test]
    fn test_range_zero_count() {
        let recorder = Recorder::new();
        Observable::range(10, 0).subscribe(recorder.observer());
        assert_eq!(recorder.events(), vec![Event::Complete]);
    }

    #[test]
    fn test_range_values() {
        let recorder = Recorder::new();
        Observable::range(-2, 5).subscribe(recorder.observer());
        assert_eq!(recorder.values(), vec![-2, -1, 0, 1, 2]);
        assert!(recorder.completed());
    }

    #[test]
    fn test_range_overflow_errors() {
        let recorder = Recorder::new();
        Observable::range(i64::MAX, 2).subscribe(recorder.observer());
        assert!(matches!(
            recorder.events().as_slice(),
            [Event::Error(RxError::InvalidArgument(_))]
        ));

        let edge = Recorder::new();
        Observable::range(i64::MAX, 1).subscribe(edge.observer());
        assert_eq!(edge.values(), vec![i64::MAX]);
    }

    #[test]
    fn test_create_error_and_panic() {
        let failing = Recorder::<i32>::new();
        Observable::create(|emitter| {
            emitter.on_next(1);
            Err(RxError::Producer("disk on fire".into()))
        })
        .subscribe(failing.observer());
        assert_eq!(
            failing.events(),
            vec![
                Event::Next(1),
                Event::Error(RxError::Producer("disk on fire".into()))
            ]
        );

        let panicking = Recorder::<i32>::new();
        Observable::create(|_| panic!("producer blew up")).subscribe(panicking.observer());
        assert!(matches!(
            panicking.events().as_slice(),
            [Event::Error(RxError::Panicked { .. })]
        ));
    }

    #[test]
    fn test_emitter_ignores_signals_after_terminal() {
        let recorder = Recorder::new();
        Observable::create(|emitter| {
            emitter.on_next(1);
            emitter.on_complete();
            emitter.on_next(2);
            emitter.on_error(RxError::Other("late".into()));
            emitter.on_complete();
            Ok(())
        })
        .subscribe(recorder.observer());

        assert_eq!(recorder.events(), vec![Event::Next(1), Event::Complete]);
    }

    #[test]
    fn test_empty_never_error() {
        let empty = Recorder::<i32>::new();
        Observable::empty().subscribe(empty.observer());
        assert_eq!(empty.events(), vec![Event::Complete]);

        let never = Recorder::<i32>::new();
        let handle = Observable::never().subscribe(never.observer());
        assert!(never.events().is_empty());
        assert!(!handle.is_disposed());

        let error = Recorder::<i32>::new();
        Observable::error(RxError::Other("nope".into())).subscribe(error.observer());
        assert_eq!(error.events(), vec![Event::Error(RxError::Other("nope".into()))]);
    }

    #[test]
    fn test_timer_emits_once_after_delay() {
        let recorder = Recorder::new();
        let start = Instant::now();
        Observable::timer(Duration::from_millis(30)).subscribe(recorder.observer());

        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(recorder.events(), vec![Event::Next(0), Event::Complete]);
    }

    #[test]
    fn test_interval_counts_until_disposed() {
        let recorder = Recorder::new();
        Observable::interval(Duration::from_millis(5))
            .take(4)
            .subscribe(recorder.observer());

        assert_eq!(recorder.values(), vec![0, 1, 2, 3]);
        assert!(recorder.completed());
    }
}
