//! Bounded per-call audio queue.
//!
//! The media bridge pushes decoded telephony audio with [`AudioQueueSender::push`],
//! which never waits: when the queue is full the newest chunk is dropped and the
//! caller is told so. End-of-input is signalled by [`AudioQueueSender::finish`],
//! which releases the sending half; the receiver observes it as
//! [`AudioFrame::EndOfInput`] only after every buffered chunk has been drained.

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Result of a non-blocking push onto the audio queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Chunk was buffered
    Queued,
    /// Queue was at capacity; the chunk was discarded
    DroppedFull,
    /// End-of-input was already signalled or the consumer is gone
    Closed,
}

/// One item read from the audio queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioFrame {
    /// Raw audio chunk, in arrival order
    Chunk(Bytes),
    /// No more audio will follow
    EndOfInput,
}

/// Producer half of the audio queue.
pub struct AudioQueueSender {
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,
}

/// Consumer half of the audio queue.
pub struct AudioQueueReceiver {
    rx: mpsc::Receiver<Bytes>,
}

/// Create a bounded audio queue holding at most `capacity` chunks.
pub fn audio_queue(capacity: usize) -> (AudioQueueSender, AudioQueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        AudioQueueSender {
            tx: Mutex::new(Some(tx)),
        },
        AudioQueueReceiver { rx },
    )
}

impl AudioQueueSender {
    /// Push a chunk without waiting. Drops the chunk if the queue is full.
    pub fn push(&self, chunk: Bytes) -> PushOutcome {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return PushOutcome::Closed;
        };

        match tx.try_send(chunk) {
            Ok(()) => PushOutcome::Queued,
            Err(TrySendError::Full(_)) => PushOutcome::DroppedFull,
            Err(TrySendError::Closed(_)) => PushOutcome::Closed,
        }
    }

    /// Enqueue the end-of-input sentinel.
    ///
    /// Returns `true` the first time it is called and `false` afterwards.
    /// The sentinel never competes for capacity, so it cannot be dropped.
    pub fn finish(&self) -> bool {
        self.tx.lock().take().is_some()
    }

    /// Whether end-of-input has been signalled.
    pub fn is_finished(&self) -> bool {
        self.tx.lock().is_none()
    }
}

impl AudioQueueReceiver {
    /// Wait for the next frame.
    ///
    /// Once [`AudioFrame::EndOfInput`] is returned every later call returns it too.
    pub async fn next(&mut self) -> AudioFrame {
        match self.rx.recv().await {
            Some(chunk) => AudioFrame::Chunk(chunk),
            None => AudioFrame::EndOfInput,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_then_end_of_input() {
        let (tx, mut rx) = audio_queue(8);
        assert_eq!(tx.push(Bytes::from_static(b"a")), PushOutcome::Queued);
        assert_eq!(tx.push(Bytes::from_static(b"b")), PushOutcome::Queued);
        assert!(tx.finish());

        assert_eq!(rx.next().await, AudioFrame::Chunk(Bytes::from_static(b"a")));
        assert_eq!(rx.next().await, AudioFrame::Chunk(Bytes::from_static(b"b")));
        assert_eq!(rx.next().await, AudioFrame::EndOfInput);
        assert_eq!(rx.next().await, AudioFrame::EndOfInput);
    }

    #[tokio::test]
    async fn test_full_queue_drops_newest() {
        let (tx, mut rx) = audio_queue(2);
        assert_eq!(tx.push(Bytes::from_static(b"1")), PushOutcome::Queued);
        assert_eq!(tx.push(Bytes::from_static(b"2")), PushOutcome::Queued);
        assert_eq!(tx.push(Bytes::from_static(b"3")), PushOutcome::DroppedFull);

        // The sentinel still gets through even though the buffer is full
        assert!(tx.finish());

        assert_eq!(rx.next().await, AudioFrame::Chunk(Bytes::from_static(b"1")));
        assert_eq!(rx.next().await, AudioFrame::Chunk(Bytes::from_static(b"2")));
        assert_eq!(rx.next().await, AudioFrame::EndOfInput);
    }

    #[test]
    fn test_finish_only_once() {
        let (tx, _rx) = audio_queue(4);
        assert!(!tx.is_finished());
        assert!(tx.finish());
        assert!(!tx.finish());
        assert!(tx.is_finished());
        assert_eq!(tx.push(Bytes::from_static(b"late")), PushOutcome::Closed);
    }

    #[test]
    fn test_push_after_consumer_dropped() {
        let (tx, rx) = audio_queue(4);
        drop(rx);
        assert_eq!(tx.push(Bytes::from_static(b"x")), PushOutcome::Closed);
    }
}
