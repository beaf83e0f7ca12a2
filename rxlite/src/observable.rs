//! Observable implementation
//!
//! An [`Observable`] is a cold description of a producer: nothing runs until
//! it is subscribed, and every subscription re-runs the producer from scratch.

use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::disposable::{CompositeDisposable, Disposable, DisposableRef, SerialDisposable};
use crate::error::RxError;
use crate::observer::{BoxObserver, LambdaObserver, Observer, SafeObserver};

type SubscribeFn<T> = dyn Fn(BoxObserver<T>) + Send + Sync;

/// Cold, cheaply clonable stream description
pub struct Observable<T> {
    source: Arc<SubscribeFn<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<T: Send + 'static> Observable<T> {
    /// Raw constructor.
    ///
    /// `subscribe` receives the downstream observer and must deliver
    /// `on_subscribe` to it before any other signal. Prefer
    /// [`Observable::create`] unless you are writing an operator.
    pub fn new<F>(subscribe: F) -> Self
    where
        F: Fn(BoxObserver<T>) + Send + Sync + 'static,
    {
        Self {
            source: Arc::new(subscribe),
        }
    }

    /// Subscribe without the terminal safety wrapper; operators chain through this.
    pub(crate) fn subscribe_actual(&self, observer: BoxObserver<T>) {
        (self.source)(observer)
    }

    /// Subscribe an observer and get back the subscription handle.
    ///
    /// The same handle is passed to the observer's `on_subscribe`. Disposing
    /// it stops the producer and silences the observer.
    pub fn subscribe<O>(&self, observer: O) -> DisposableRef
    where
        O: Observer<T> + 'static,
    {
        let id = Uuid::new_v4();
        let handle = Arc::new(SerialDisposable::new());
        debug!(subscription = %id, "Subscribing");

        self.subscribe_actual(Box::new(SafeObserver::new(
            Box::new(observer),
            Arc::clone(&handle),
            id,
        )));

        handle
    }

    /// Subscribe with next/error/complete callbacks
    ///
    /// # Example
    /// ```
    /// # use rxlite::Observable;
    /// let obs = Observable::from_iter(vec![1, 2, 3]);
    ///
    /// obs.subscribe_with(
    ///     |value| println!("Next: {}", value),
    ///     |err| eprintln!("Error: {}", err),
    ///     || println!("Complete!"),
    /// );
    /// ```
    pub fn subscribe_with<N, E, C>(&self, next: N, error: E, complete: C) -> DisposableRef
    where
        N: FnMut(T) + Send + 'static,
        E: FnMut(RxError) + Send + 'static,
        C: FnMut() + Send + 'static,
    {
        self.subscribe(LambdaObserver::new(next, error, complete))
    }

    /// Subscribe with only a next callback; errors are logged and dropped
    pub fn subscribe_next<F>(&self, next: F) -> DisposableRef
    where
        F: FnMut(T) + Send + 'static,
    {
        self.subscribe_with(
            next,
            |error| debug!("Unhandled error signal: {}", error),
            || {},
        )
    }

    /// Subscribe and track the handle in `group`.
    ///
    /// If `group` is already disposed the subscription is disposed at once.
    pub fn subscribe_into<O>(&self, group: &CompositeDisposable, observer: O) -> DisposableRef
    where
        O: Observer<T> + 'static,
    {
        let handle = self.subscribe(observer);
        group.add(Arc::clone(&handle));
        handle
    }
}

/// Bookkeeping shared by operator stages.
///
/// Downstream receives `link`; the upstream handle is installed into it, so a
/// downstream dispose reaches upstream while the stage can still cancel
/// upstream on its own without closing the downstream side.
pub(crate) struct StageLink {
    link: Arc<SerialDisposable>,
    upstream: Option<DisposableRef>,
}

impl StageLink {
    pub(crate) fn new() -> Self {
        Self {
            link: Arc::new(SerialDisposable::new()),
            upstream: None,
        }
    }

    /// Record the upstream handle and return the one to give downstream
    pub(crate) fn attach(&mut self, upstream: DisposableRef) -> DisposableRef {
        self.upstream = Some(Arc::clone(&upstream));
        self.link.set(upstream);
        self.link.clone()
    }

    /// Stop upstream without touching the downstream handle
    pub(crate) fn cancel_upstream(&self) {
        if let Some(upstream) = &self.upstream {
            upstream.dispose();
        }
    }
}
