//! Cancellation handles
//!
//! A [`Disposable`] is a one-shot, idempotent, thread-safe cancellation token.
//! Producers poll [`Disposable::is_disposed`] before every emission; disposing
//! a subscription handle propagates up the operator chain through
//! [`SerialDisposable`] links until it reaches the root producer's
//! [`BooleanDisposable`].

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Cancellation handle
pub trait Disposable: Send + Sync {
    /// Dispose the resource; calling it again is a no-op
    fn dispose(&self);

    /// Check whether [`dispose`](Disposable::dispose) has been called
    fn is_disposed(&self) -> bool;
}

/// Shared disposable handle
pub type DisposableRef = Arc<dyn Disposable>;

/// A fresh disposable with nothing attached to it
pub fn empty() -> DisposableRef {
    Arc::new(BooleanDisposable::new())
}

/// A disposable that is already disposed
pub fn disposed() -> DisposableRef {
    let d = BooleanDisposable::new();
    d.dispose();
    Arc::new(d)
}

fn same_disposable(a: &DisposableRef, b: &DisposableRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Flag-backed disposable, the root token of every producer.
///
/// Blocking waiters (timed sources) park on a condition variable and are
/// woken as soon as the flag flips.
#[derive(Debug, Default)]
pub struct BooleanDisposable {
    disposed: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

impl BooleanDisposable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispose and report whether this call performed the transition.
    ///
    /// Exactly one caller ever gets `true`.
    pub fn try_dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Taking the lock orders the flip before any waiter's re-check.
        let _guard = self.lock.lock();
        self.wake.notify_all();
        true
    }

    /// Block for up to `timeout`, returning early once disposed.
    ///
    /// Returns `true` if the disposable is disposed when the wait ends.
    pub fn wait_disposed(&self, timeout: Duration) -> bool {
        if self.is_disposed() {
            return true;
        }

        let deadline = Instant::now().checked_add(timeout);
        let mut guard = self.lock.lock();
        while !self.is_disposed() {
            match deadline {
                Some(deadline) => {
                    if self.wake.wait_until(&mut guard, deadline).timed_out() {
                        return self.is_disposed();
                    }
                }
                None => self.wake.wait(&mut guard),
            }
        }
        true
    }
}

impl Disposable for BooleanDisposable {
    fn dispose(&self) {
        self.try_dispose();
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// Disposable holding a single replaceable child.
///
/// Disposing it disposes the current child, and any child set afterwards is
/// disposed on arrival. Operator stages hand one of these downstream and set
/// the upstream handle into it once the upstream subscribes.
#[derive(Default)]
pub struct SerialDisposable {
    disposed: AtomicBool,
    current: Mutex<Option<DisposableRef>>,
}

impl SerialDisposable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `next`, disposing the previous child.
    pub fn set(&self, next: DisposableRef) {
        if let Some(previous) = self.swap(next) {
            previous.dispose();
        }
    }

    /// Install `next` without disposing the previous child.
    pub fn replace(&self, next: DisposableRef) {
        self.swap(next);
    }

    /// The currently installed child, if any
    pub fn get(&self) -> Option<DisposableRef> {
        self.current.lock().clone()
    }

    fn swap(&self, next: DisposableRef) -> Option<DisposableRef> {
        let mut current = self.current.lock();
        if self.disposed.load(Ordering::Acquire) {
            drop(current);
            next.dispose();
            return None;
        }
        current.replace(next)
    }
}

impl Disposable for SerialDisposable {
    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let child = self.current.lock().take();
        if let Some(child) = child {
            child.dispose();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// Group of disposables cancelled together.
///
/// Owned by whatever coordinates a group of subscriptions (a screen, a
/// service, a test). Once cleared or disposed, the composite stays disposed:
/// anything added later is disposed immediately instead of being tracked.
#[derive(Default)]
pub struct CompositeDisposable {
    disposed: AtomicBool,
    children: Mutex<Vec<DisposableRef>>,
}

impl CompositeDisposable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `d`. Returns `false` (and disposes `d`) if already disposed.
    pub fn add(&self, d: DisposableRef) -> bool {
        {
            let mut children = self.children.lock();
            if !self.disposed.load(Ordering::Acquire) {
                children.push(d);
                return true;
            }
        }
        d.dispose();
        false
    }

    /// Untrack and dispose `d`
    pub fn remove(&self, d: &DisposableRef) -> bool {
        if self.delete(d) {
            d.dispose();
            true
        } else {
            false
        }
    }

    /// Untrack `d` without disposing it
    pub fn delete(&self, d: &DisposableRef) -> bool {
        let mut children = self.children.lock();
        match children.iter().position(|c| same_disposable(c, d)) {
            Some(index) => {
                children.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of tracked children
    pub fn len(&self) -> usize {
        self.children.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispose every tracked child and stop accepting new ones.
    pub fn clear(&self) {
        self.disposed.store(true, Ordering::Release);
        let children = std::mem::take(&mut *self.children.lock());
        if !children.is_empty() {
            tracing::debug!("Disposing {} tracked subscriptions", children.len());
        }
        for child in children {
            child.dispose();
        }
    }
}

impl Disposable for CompositeDisposable {
    fn dispose(&self) {
        self.clear();
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}
