//! Bridge from observables to async `Stream`s
//!
//! Lets async code consume an [`Observable`] with `StreamExt` instead of an
//! observer. Signals are buffered in an unbounded channel, so a slow consumer
//! never blocks the producer.

use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::trace;

use crate::disposable::{Disposable, DisposableRef};
use crate::error::{Result, RxError};
use crate::observable::Observable;
use crate::observer::Observer;

/// Stream of the values of one subscription.
///
/// Yields `Ok(value)` for each `on_next`, a final `Err` for `on_error`, and
/// ends on `on_complete`. Dropping the stream disposes the subscription.
pub struct ObservableStream<T> {
    inner: UnboundedReceiverStream<Result<T>>,
    subscription: DisposableRef,
}

impl<T> ObservableStream<T> {
    /// The underlying subscription handle
    pub fn subscription(&self) -> &DisposableRef {
        &self.subscription
    }

    /// Dispose the subscription; values already buffered are still yielded.
    pub fn unsubscribe(&self) {
        self.subscription.dispose();
    }
}

impl<T> Stream for ObservableStream<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<T> Drop for ObservableStream<T> {
    fn drop(&mut self) {
        self.subscription.dispose();
    }
}

struct ChannelObserver<T> {
    sender: Option<mpsc::UnboundedSender<Result<T>>>,
    subscription: Option<DisposableRef>,
}

impl<T> ChannelObserver<T> {
    fn send(&mut self, item: Result<T>) {
        let closed = match &self.sender {
            Some(sender) => sender.send(item).is_err(),
            None => return,
        };
        if closed {
            trace!("Stream receiver dropped, disposing subscription");
            self.sender = None;
            if let Some(subscription) = &self.subscription {
                subscription.dispose();
            }
        }
    }
}

impl<T: Send> Observer<T> for ChannelObserver<T> {
    fn on_subscribe(&mut self, subscription: DisposableRef) {
        self.subscription = Some(subscription);
    }

    fn on_next(&mut self, value: T) {
        self.send(Ok(value));
    }

    fn on_error(&mut self, error: RxError) {
        self.send(Err(error));
        self.sender = None;
    }

    fn on_complete(&mut self) {
        // Dropping the sender ends the stream.
        self.sender = None;
    }
}

impl<T: Send + 'static> Observable<T> {
    /// Subscribe and expose the signals as a `futures::Stream`.
    ///
    /// # Example
    /// ```
    /// use futures::StreamExt;
    /// use rxlite::Observable;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let mut stream = Observable::range(1, 3).into_stream();
    /// while let Some(value) = stream.next().await {
    ///     println!("Value: {}", value.unwrap());
    /// }
    /// # }
    /// ```
    pub fn into_stream(&self) -> ObservableStream<T> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscription = self.subscribe(ChannelObserver {
            sender: Some(sender),
            subscription: None,
        });

        ObservableStream {
            inner: UnboundedReceiverStream::new(receiver),
            subscription,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stream_yields_values_then_ends() {
        let values: Vec<i64> = Observable::range(0, 4)
            .into_stream()
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(values, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_stream_surfaces_error_last() {
        let items: Vec<Result<i32>> = Observable::create(|emitter| {
            emitter.on_next(7);
            Err(RxError::Producer("broken source".into()))
        })
        .into_stream()
        .collect()
        .await;

        assert_eq!(
            items,
            vec![Ok(7), Err(RxError::Producer("broken source".into()))]
        );
    }

    #[tokio::test]
    async fn test_dropping_stream_disposes_subscription() {
        let stream = Observable::<i64>::never().into_stream();
        let subscription = stream.subscription().clone();
        assert!(!subscription.is_disposed());

        drop(stream);
        assert!(subscription.is_disposed());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_interval() {
        use crate::config::WorkerConfig;
        use crate::scheduler::WorkerScheduler;
        use std::sync::Arc;

        let io = Arc::new(WorkerScheduler::new(&WorkerConfig::default()).unwrap());
        let mut stream = Observable::interval(Duration::from_millis(5))
            .subscribe_on(io)
            .into_stream();

        let first = stream.next().await;
        assert_eq!(first, Some(Ok(0)));

        stream.unsubscribe();
        assert!(stream.subscription().is_disposed());
    }
}
