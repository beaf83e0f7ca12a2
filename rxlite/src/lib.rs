//! # rxlite
//!
//! Minimal push-based reactive streams with explicit execution contexts.
//!
//! ## Features
//!
//! - 🧊 **Cold observables**: every subscription re-runs its producer
//! - 🧵 **Schedulers**: worker pool for producers, serial affinity thread for consumers
//! - 🛑 **Disposables**: cancel a subscription from anywhere, including its own observer
//! - 🔗 **Operators**: `filter`, `take_while`, `repeat`, `map`, `take` and friends
//! - 🔄 **Async bridge**: consume any observable as a `futures::Stream`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rxlite::{Disposable, Observable, SchedulerConfig, Schedulers};
//!
//! fn main() -> rxlite::Result<()> {
//!     let schedulers = Schedulers::new(&SchedulerConfig::default())?;
//!
//!     let subscription = Observable::range(0, 10)
//!         .filter(|n| n % 2 == 0)
//!         .subscribe_on(schedulers.io.clone())
//!         .observe_on(schedulers.main.clone())
//!         .subscribe_next(|n| println!("even: {}", n));
//!
//!     subscription.dispose();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod disposable;
pub mod error;
pub mod observable;
pub mod observer;
pub mod operators;
pub mod reactive;
pub mod scheduler;

#[cfg(test)]
mod test_support;

pub use config::{AffinityConfig, SchedulerConfig, WorkerConfig};
pub use disposable::{
    BooleanDisposable, CompositeDisposable, Disposable, DisposableRef, SerialDisposable,
};
pub use error::{Result, RxError};
pub use observable::Observable;
pub use observer::{BoxObserver, LambdaObserver, Observer};
pub use operators::Emitter;
pub use reactive::ObservableStream;
pub use scheduler::{
    AffinityScheduler, ImmediateScheduler, Scheduler, SchedulerRef, Schedulers, Task,
    WorkerScheduler,
};
