//! Bounded input pipe
//!
//! The sequencer task owns exactly one input pipe and blocks on it with a
//! bounded timeout; wakeups, housekeeping requests and ground commands all
//! arrive here. The pipe is a bounded MPSC queue: any number of producer
//! handles, one consumer.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Create a bounded pipe with the given depth
pub fn pipe<T>(capacity: usize) -> (PipeSender<T>, PipeReceiver<T>) {
    let inner = Arc::new(Inner {
        state: Mutex::new(State {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            senders: 1,
            receiver_alive: true,
        }),
        not_empty: Condvar::new(),
    });

    (
        PipeSender {
            inner: Arc::clone(&inner),
        },
        PipeReceiver { inner },
    )
}

/// Error returned by `try_send` on a full or closed pipe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrySendError<T> {
    /// The pipe is at capacity; the message is handed back
    Full(T),

    /// The receiver is gone; the message is handed back
    Closed(T),
}

/// Error returned by `recv_timeout`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvTimeoutError {
    /// No message arrived within the timeout
    Timeout,

    /// Every sender has been dropped and the queue is drained
    Disconnected,
}

struct State<T> {
    queue: VecDeque<T>,
    capacity: usize,
    senders: usize,
    receiver_alive: bool,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
}

/// Producer handle for the input pipe
pub struct PipeSender<T> {
    inner: Arc<Inner<T>>,
}

/// Consumer handle for the input pipe
pub struct PipeReceiver<T> {
    inner: Arc<Inner<T>>,
}

impl<T> PipeSender<T> {
    /// Enqueue a message without blocking
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        let mut state = self.inner.state.lock().unwrap();
        if !state.receiver_alive {
            return Err(TrySendError::Closed(value));
        }
        if state.queue.len() >= state.capacity {
            return Err(TrySendError::Full(value));
        }
        state.queue.push_back(value);
        drop(state);
        self.inner.not_empty.notify_one();
        Ok(())
    }

    /// Number of messages currently queued
    pub fn len(&self) -> usize {
        self.inner.state.lock().unwrap().queue.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Clone for PipeSender<T> {
    fn clone(&self) -> Self {
        self.inner.state.lock().unwrap().senders += 1;
        PipeSender {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Drop for PipeSender<T> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock().unwrap();
        state.senders -= 1;
        let closed = state.senders == 0;
        drop(state);
        if closed {
            // Wake the receiver so it can observe the disconnect
            self.inner.not_empty.notify_one();
        }
    }
}

impl<T> PipeReceiver<T> {
    /// Dequeue a message, waiting up to `timeout`
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        let mut state = self.inner.state.lock().unwrap();
        loop {
            if let Some(value) = state.queue.pop_front() {
                return Ok(value);
            }
            if state.senders == 0 {
                return Err(RecvTimeoutError::Disconnected);
            }
            let (next, result) = self
                .inner
                .not_empty
                .wait_timeout(state, timeout)
                .unwrap();
            state = next;
            if result.timed_out() {
                return match state.queue.pop_front() {
                    Some(value) => Ok(value),
                    None => Err(RecvTimeoutError::Timeout),
                };
            }
        }
    }

    /// Dequeue a message without blocking
    pub fn try_recv(&self) -> Option<T> {
        self.inner.state.lock().unwrap().queue.pop_front()
    }
}

impl<T> Drop for PipeReceiver<T> {
    fn drop(&mut self) {
        self.inner.state.lock().unwrap().receiver_alive = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_send_recv() {
        let (tx, rx) = pipe(4);
        tx.try_send(1u32).unwrap();
        tx.try_send(2u32).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_millis(10)), Ok(1));
        assert_eq!(rx.try_recv(), Some(2));
        assert_eq!(rx.try_recv(), None);
    }

    #[test]
    fn test_full_pipe_rejects() {
        let (tx, _rx) = pipe(2);
        tx.try_send(1u32).unwrap();
        tx.try_send(2u32).unwrap();
        assert_eq!(tx.try_send(3u32), Err(TrySendError::Full(3)));
        assert_eq!(tx.len(), 2);
    }

    #[test]
    fn test_recv_times_out() {
        let (_tx, rx) = pipe::<u32>(2);
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(5)),
            Err(RecvTimeoutError::Timeout)
        );
    }

    #[test]
    fn test_disconnect_observed() {
        let (tx, rx) = pipe::<u32>(2);
        drop(tx);
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(5)),
            Err(RecvTimeoutError::Disconnected)
        );
    }

    #[test]
    fn test_closed_pipe_rejects_send() {
        let (tx, rx) = pipe(2);
        drop(rx);
        assert_eq!(tx.try_send(9u32), Err(TrySendError::Closed(9)));
    }

    #[test]
    fn test_cross_thread_delivery() {
        let (tx, rx) = pipe(8);
        let producer = thread::spawn(move || {
            for i in 0..8u32 {
                tx.try_send(i).unwrap();
            }
        });
        producer.join().unwrap();

        let mut got = Vec::new();
        while let Ok(v) = rx.recv_timeout(Duration::from_millis(50)) {
            got.push(v);
            if got.len() == 8 {
                break;
            }
        }
        assert_eq!(got, (0..8).collect::<Vec<_>>());
    }
}
