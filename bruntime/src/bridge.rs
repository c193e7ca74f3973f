//! Blocking iteration over asynchronously produced sequences.
//!
//! ```rust
//! use bruntime::{BlockingStream, SharedRuntime};
//! use futures_util::stream;
//!
//! let runtime = SharedRuntime::new();
//! let fragments = stream::iter(vec!["Hello", ", ", "world"]);
//! let blocking = BlockingStream::new(&runtime, fragments).expect("bridge should build");
//!
//! let joined: String = blocking.collect();
//! assert_eq!(joined, "Hello, world");
//! ```

use std::pin::Pin;

use futures_core::Stream;
use futures_util::StreamExt;

use crate::{LoopDriver, RuntimeError, SharedRuntime};

/// Lets a synchronous consumer pull items from a lazily produced async
/// sequence, one loop step per item.
///
/// The wrapped stream is driven on the shared loop resolved at construction
/// time; no private loop is ever created, and exhaustion releases only the
/// stream's own resources.
pub struct BlockingStream<S> {
    stream: Pin<Box<S>>,
    driver: LoopDriver,
}

impl<S> BlockingStream<S>
where
    S: Stream,
{
    pub fn new(runtime: &SharedRuntime, stream: S) -> Result<Self, RuntimeError> {
        Ok(Self {
            stream: Box::pin(stream),
            driver: runtime.driver()?,
        })
    }
}

impl<S> Iterator for BlockingStream<S>
where
    S: Stream,
{
    type Item = S::Item;

    fn next(&mut self) -> Option<Self::Item> {
        self.driver.block_on(self.stream.as_mut().next())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::stream;

    use super::*;

    #[test]
    fn yields_items_in_source_order_then_signals_exhaustion() {
        let runtime = SharedRuntime::new();
        let mut blocking = BlockingStream::new(&runtime, stream::iter(vec![1, 2, 3]))
            .expect("bridge should build");

        assert_eq!(blocking.next(), Some(1));
        assert_eq!(blocking.next(), Some(2));
        assert_eq!(blocking.next(), Some(3));
        assert_eq!(blocking.next(), None);
        assert_eq!(blocking.next(), None);
    }

    #[test]
    fn exhaustion_leaves_shared_loop_usable() {
        let runtime = SharedRuntime::new();
        let blocking = BlockingStream::new(&runtime, stream::iter(vec!["a", "b"]))
            .expect("bridge should build");
        let collected: Vec<&str> = blocking.collect();
        assert_eq!(collected, vec!["a", "b"]);

        let value = runtime
            .run(async { "still alive" })
            .expect("loop should still drive futures");
        assert_eq!(value, "still alive");
    }

    #[test]
    fn drives_streams_with_pending_suspension_points() {
        let runtime = SharedRuntime::new();
        let fragments = stream::iter(vec!["one", "two"]).then(|item| async move {
            tokio::task::yield_now().await;
            item
        });
        let blocking =
            BlockingStream::new(&runtime, fragments).expect("bridge should build");
        let collected: Vec<&str> = blocking.collect();
        assert_eq!(collected, vec!["one", "two"]);
    }
}
