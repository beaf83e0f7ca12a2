//! Observer contract and the built-in observers

use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::disposable::{Disposable, DisposableRef, SerialDisposable};
use crate::error::RxError;

/// Consumer of an [`Observable`](crate::Observable).
///
/// `on_subscribe` arrives first and at most once. After `on_error` or
/// `on_complete` nothing else is delivered.
pub trait Observer<T>: Send {
    fn on_subscribe(&mut self, _subscription: DisposableRef) {}

    fn on_next(&mut self, value: T);

    fn on_error(&mut self, error: RxError) {
        debug!("Unhandled error signal: {}", error);
    }

    fn on_complete(&mut self) {}
}

/// Boxed observer, the currency of operator chains
pub type BoxObserver<T> = Box<dyn Observer<T>>;

impl<T, O: Observer<T> + ?Sized> Observer<T> for Box<O> {
    fn on_subscribe(&mut self, subscription: DisposableRef) {
        (**self).on_subscribe(subscription)
    }

    fn on_next(&mut self, value: T) {
        (**self).on_next(value)
    }

    fn on_error(&mut self, error: RxError) {
        (**self).on_error(error)
    }

    fn on_complete(&mut self) {
        (**self).on_complete()
    }
}

/// Observer built from next/error/complete callbacks
pub struct LambdaObserver<N, E, C> {
    next: N,
    error: E,
    complete: C,
}

impl<N, E, C> LambdaObserver<N, E, C> {
    pub fn new(next: N, error: E, complete: C) -> Self {
        Self {
            next,
            error,
            complete,
        }
    }
}

impl<T, N, E, C> Observer<T> for LambdaObserver<N, E, C>
where
    N: FnMut(T) + Send,
    E: FnMut(RxError) + Send,
    C: FnMut() + Send,
{
    fn on_next(&mut self, value: T) {
        (self.next)(value)
    }

    fn on_error(&mut self, error: RxError) {
        (self.error)(error)
    }

    fn on_complete(&mut self) {
        (self.complete)()
    }
}

/// Terminal wrapper installed by `subscribe`.
///
/// Owns the subscription handle returned to the caller and enforces the
/// contract on the user's observer: one `on_subscribe`, nothing after a
/// terminal signal, nothing after disposal.
pub(crate) struct SafeObserver<T> {
    inner: BoxObserver<T>,
    handle: Arc<SerialDisposable>,
    id: Uuid,
    subscribed: bool,
    done: bool,
}

impl<T> SafeObserver<T> {
    pub(crate) fn new(inner: BoxObserver<T>, handle: Arc<SerialDisposable>, id: Uuid) -> Self {
        Self {
            inner,
            handle,
            id,
            subscribed: false,
            done: false,
        }
    }

    fn is_closed(&self) -> bool {
        self.done || self.handle.is_disposed()
    }
}

impl<T: Send> Observer<T> for SafeObserver<T> {
    fn on_subscribe(&mut self, subscription: DisposableRef) {
        if self.subscribed {
            warn!(subscription = %self.id, "Duplicate on_subscribe, disposing the newcomer");
            subscription.dispose();
            return;
        }
        self.subscribed = true;
        self.handle.set(subscription);
        self.inner.on_subscribe(self.handle.clone());
    }

    fn on_next(&mut self, value: T) {
        if self.is_closed() {
            trace!(subscription = %self.id, "Dropping on_next after close");
            return;
        }
        self.inner.on_next(value);
    }

    fn on_error(&mut self, error: RxError) {
        if self.is_closed() {
            trace!(subscription = %self.id, "Dropping on_error after close: {}", error);
            return;
        }
        self.done = true;
        debug!(subscription = %self.id, "Subscription failed: {}", error);
        self.inner.on_error(error);
        self.handle.dispose();
    }

    fn on_complete(&mut self) {
        if self.is_closed() {
            trace!(subscription = %self.id, "Dropping on_complete after close");
            return;
        }
        self.done = true;
        debug!(subscription = %self.id, "Subscription completed");
        self.inner.on_complete();
        self.handle.dispose();
    }
}
