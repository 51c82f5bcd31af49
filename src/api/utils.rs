use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::stream::Stream;
use tokio::sync::broadcast;

/// Wraps a response stream and notifies `notifier` when it's dropped,
/// which happens when the client disconnects or the response ends.
pub struct DetectDisconnect<S> {
    inner: S,
    notifier: broadcast::Sender<()>,
}

impl<S> DetectDisconnect<S> {
    pub fn new(inner: S, notifier: broadcast::Sender<()>) -> Self {
        Self { inner, notifier }
    }
}

impl<S> Stream for DetectDisconnect<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<S> Drop for DetectDisconnect<S> {
    fn drop(&mut self) {
        // Nobody listening is fine, the work may have finished already
        let _ = self.notifier.send(());
    }
}
