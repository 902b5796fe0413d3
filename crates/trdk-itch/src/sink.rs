//! Downstream consumers of published books.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::warn;
use trdk_core::BookSnapshot;

/// Receives every snapshot a flush produces. Called from the reader task,
/// so implementations must not block.
pub trait BookSink: Send + Sync {
    fn on_book(&self, symbol: &str, book: Arc<BookSnapshot>);
}

#[derive(Debug, Clone)]
pub struct BookUpdate {
    pub symbol: String,
    pub book: Arc<BookSnapshot>,
}

/// Forwards books into a bounded channel; drops them when it is full.
pub struct ChannelSink {
    label: String,
    tx: Sender<BookUpdate>,
}

impl ChannelSink {
    pub fn new(label: impl Into<String>, tx: Sender<BookUpdate>) -> Self {
        Self { label: label.into(), tx }
    }

    /// Sink plus the receiving end of a channel of `capacity` updates.
    pub fn bounded(label: impl Into<String>, capacity: usize) -> (Self, Receiver<BookUpdate>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self::new(label, tx), rx)
    }
}

impl BookSink for ChannelSink {
    fn on_book(&self, symbol: &str, book: Arc<BookSnapshot>) {
        let update = BookUpdate { symbol: symbol.to_string(), book };
        match self.tx.try_send(update) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("[{}] book channel full, dropping {symbol}", self.label),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_when_full() {
        let (sink, rx) = ChannelSink::bounded("test", 1);
        let book = Arc::new(BookSnapshot::default());
        sink.on_book("EUR/USD", book.clone());
        sink.on_book("USD/JPY", book);

        let update = rx.try_recv().unwrap();
        assert_eq!(update.symbol, "EUR/USD");
        assert!(rx.try_recv().is_err());
    }
}
