//! Streaming bridge between a push-style producer and a pull-style consumer.
//!
//! Vendor streams push chunks through a [`ChunkSender`] as they arrive. The
//! agent loop pulls them from a [`ChunkStream`], which polls the bounded
//! queue with a short timeout and re-checks the shared `finished` flag on
//! every cycle, so a silently dead connection never blocks the consumer.
//! Buffered chunks are always drained in FIFO order before `finished` is
//! honoured.

use crate::error::ProviderError;
use crate::provider::StreamChunk;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Default queue capacity between producer and consumer.
pub const DEFAULT_CAPACITY: usize = 64;

/// Default consumer poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

type Item = Result<StreamChunk, ProviderError>;

/// Create a connected sender/stream pair.
pub fn channel(capacity: usize) -> (ChunkSender, ChunkStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let finished = Arc::new(AtomicBool::new(false));
    (
        ChunkSender {
            tx,
            finished: finished.clone(),
        },
        ChunkStream {
            rx,
            finished,
            poll_interval: DEFAULT_POLL_INTERVAL,
            idle_timeout: None,
        },
    )
}

/// Producer half. Cloneable; vendor callbacks hold one each.
#[derive(Clone)]
pub struct ChunkSender {
    tx: mpsc::Sender<Item>,
    finished: Arc<AtomicBool>,
}

impl ChunkSender {
    /// Push a chunk. Returns `false` once the consumer has gone away.
    pub async fn send(&self, chunk: StreamChunk) -> bool {
        self.tx.send(Ok(chunk)).await.is_ok()
    }

    /// Push a terminal error and mark the stream finished.
    pub async fn fail(&self, error: ProviderError) -> bool {
        let delivered = self.tx.send(Err(error)).await.is_ok();
        self.finish();
        delivered
    }

    /// Mark the stream finished. Already queued chunks are still delivered.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    /// Whether the consumer has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half.
pub struct ChunkStream {
    rx: mpsc::Receiver<Item>,
    finished: Arc<AtomicBool>,
    poll_interval: Duration,
    idle_timeout: Option<Duration>,
}

impl ChunkStream {
    /// Build an already-finished stream from a fixed chunk sequence.
    ///
    /// Used to present a non-streaming response as a one-shot stream.
    pub fn from_chunks(chunks: Vec<StreamChunk>) -> Self {
        let (tx, stream) = channel(chunks.len());
        for chunk in chunks {
            // Capacity equals the number of chunks, so this cannot be full.
            let _ = tx.tx.try_send(Ok(chunk));
        }
        tx.finish();
        stream
    }

    /// Set how long each poll waits before re-checking the finished flag.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Give up with a `Timeout` error after this long without any chunk.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Whether the producer has declared the stream finished.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Pull the next chunk, or `None` once the stream is finished and drained.
    pub async fn next(&mut self) -> Option<Item> {
        let mut idle = Duration::ZERO;
        loop {
            match tokio::time::timeout(self.poll_interval, self.rx.recv()).await {
                Ok(Some(item)) => return Some(item),
                // Every sender dropped and the queue is empty.
                Ok(None) => return None,
                Err(_) => {
                    if self.is_finished() && self.rx.is_empty() {
                        return None;
                    }
                    idle += self.poll_interval;
                    if let Some(limit) = self.idle_timeout
                        && idle >= limit
                    {
                        self.finished.store(true, Ordering::Release);
                        return Some(Err(ProviderError::Timeout(format!(
                            "no stream data received for {}ms",
                            limit.as_millis()
                        ))));
                    }
                }
            }
        }
    }

    /// Drain the stream and concatenate its text chunks.
    pub async fn collect_text(mut self) -> Result<String, ProviderError> {
        let mut text = String::new();
        while let Some(item) = self.next().await {
            if let StreamChunk::Text { text: delta } = item? {
                text.push_str(&delta);
            }
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> StreamChunk {
        StreamChunk::Text { text: s.into() }
    }

    #[tokio::test(start_paused = true)]
    async fn drains_queue_before_honouring_finished() {
        let (tx, mut stream) = channel(8);
        assert!(tx.send(text("a")).await);
        assert!(tx.send(text("b")).await);
        tx.finish();

        let mut seen = Vec::new();
        while let Some(item) = stream.next().await {
            if let StreamChunk::Text { text } = item.unwrap() {
                seen.push(text);
            }
        }
        assert_eq!(seen, vec!["a", "b"]);
        // Sender is still alive: termination came from the flag, not a drop.
        assert!(!tx.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn finished_without_data_does_not_block() {
        let (tx, mut stream) = channel(8);
        tx.finish();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn dropped_sender_ends_stream() {
        let (tx, mut stream) = channel(8);
        tx.send(text("only")).await;
        drop(tx);
        assert!(matches!(stream.next().await, Some(Ok(StreamChunk::Text { .. }))));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_producer_times_out() {
        let (_tx, stream) = channel(8);
        let mut stream = stream.with_idle_timeout(Some(Duration::from_millis(500)));
        let item = stream.next().await.unwrap();
        assert!(matches!(item, Err(ProviderError::Timeout(_))));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn producer_on_another_task() {
        let (tx, stream) = channel(2);
        tokio::spawn(async move {
            for word in ["one ", "two ", "three"] {
                tx.send(text(word)).await;
            }
            tx.finish();
        });
        assert_eq!(stream.collect_text().await.unwrap(), "one two three");
    }

    #[tokio::test]
    async fn from_chunks_is_one_shot() {
        let stream = ChunkStream::from_chunks(vec![text("hello"), text(" world")]);
        assert!(stream.is_finished());
        assert_eq!(stream.collect_text().await.unwrap(), "hello world");
    }

    #[tokio::test]
    async fn failure_is_delivered_then_stream_ends() {
        let (tx, mut stream) = channel(4);
        tx.fail(ProviderError::StreamInterrupted("reset".into())).await;
        assert!(matches!(stream.next().await, Some(Err(ProviderError::StreamInterrupted(_)))));
        assert!(stream.next().await.is_none());
    }
}
