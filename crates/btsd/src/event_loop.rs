//! The service event loop.
//!
//! One tokio task owns a FIFO queue of boxed closures and runs them strictly
//! one after another. It is the only place profile state is mutated. Any
//! thread may post; items posted by one producer run in the order they were
//! posted.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `LoopError::Closed`

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A unit of work run on the loop. Must not block.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

enum LoopItem {
    Run(Task),
    Stop(oneshot::Sender<()>),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopError {
    #[error("Event loop is closed")]
    Closed,
}

// ============================================================================
// Timers
// ============================================================================

/// A delayed post that has not run yet.
///
/// Cancelling is idempotent. A timer whose task is already queued on the
/// loop is still suppressed when cancelled before the task runs.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    id: u64,
    token: CancellationToken,
}

impl TimerHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            debug!(timer = self.id, "Timer cancelled");
        }
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

// ============================================================================
// Loop Handle
// ============================================================================

/// Cheap-to-clone handle for posting work to the event loop.
#[derive(Clone)]
pub struct LoopHandle {
    sender: mpsc::UnboundedSender<LoopItem>,
    closed: Arc<AtomicBool>,
    next_timer: Arc<AtomicU64>,
}

impl LoopHandle {
    /// Queues `task` behind everything already posted. Never blocks.
    pub fn post<F>(&self, task: F) -> Result<(), LoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(LoopError::Closed);
        }
        self.sender
            .send(LoopItem::Run(Box::new(task)))
            .map_err(|_| LoopError::Closed)
    }

    /// Runs `task` on the loop and returns its result.
    pub async fn call<F, R>(&self, task: F) -> Result<R, LoopError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.post(move || {
            // Ignore send error - caller may have given up waiting
            let _ = tx.send(task());
        })?;
        rx.await.map_err(|_| LoopError::Closed)
    }

    /// Posts `task` once `delay` has elapsed, unless cancelled first.
    pub fn post_after<F>(&self, delay: Duration, task: F) -> Result<TimerHandle, LoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(LoopError::Closed);
        }

        let timer = TimerHandle {
            id: self.next_timer.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        };

        let handle = self.clone();
        let token = timer.token.clone();
        let id = timer.id;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let posted = handle.post(move || {
                        if token.is_cancelled() {
                            return;
                        }
                        debug!(timer = id, "Timer fired");
                        task();
                    });
                    if posted.is_err() {
                        debug!(timer = id, "Timer dropped: loop closed");
                    }
                }
            }
        });

        Ok(timer)
    }

    /// Runs everything posted so far, then stops the loop.
    ///
    /// Later posts fail with `LoopError::Closed`. Calling this on a loop
    /// that is already stopping returns immediately.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let (tx, rx) = oneshot::channel();
        if self.sender.send(LoopItem::Stop(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.sender.is_closed()
    }
}

// ============================================================================
// Event Loop
// ============================================================================

pub struct EventLoop {
    receiver: mpsc::UnboundedReceiver<LoopItem>,
}

impl EventLoop {
    /// Spawns the loop task and returns its handle.
    pub fn spawn() -> (LoopHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = LoopHandle {
            sender,
            closed: Arc::new(AtomicBool::new(false)),
            next_timer: Arc::new(AtomicU64::new(1)),
        };
        let task = tokio::spawn(EventLoop { receiver }.run());
        (handle, task)
    }

    async fn run(mut self) {
        info!("Event loop starting");
        let mut executed: u64 = 0;

        while let Some(item) = self.receiver.recv().await {
            match item {
                LoopItem::Run(task) => {
                    task();
                    executed += 1;
                }
                LoopItem::Stop(done) => {
                    self.receiver.close();
                    let _ = done.send(());
                    break;
                }
            }
        }

        info!(executed, "Event loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_single_producer_fifo() {
        let (handle, _task) = EventLoop::spawn();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..50 {
            let seen = Arc::clone(&seen);
            handle.post(move || seen.lock().unwrap().push(i)).unwrap();
        }
        handle.call(|| ()).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_call_returns_result() {
        let (handle, _task) = EventLoop::spawn();
        assert_eq!(handle.call(|| 6 * 7).await, Ok(42));
    }

    #[tokio::test]
    async fn test_post_after_shutdown_is_closed() {
        let (handle, task) = EventLoop::spawn();
        handle.shutdown().await;
        task.await.unwrap();

        assert_eq!(handle.post(|| ()), Err(LoopError::Closed));
        assert_eq!(handle.call(|| 1).await, Err(LoopError::Closed));
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_tasks() {
        let (handle, _task) = EventLoop::spawn();
        let count = Arc::new(AtomicU64::new(0));
        for _ in 0..10 {
            let count = Arc::clone(&count);
            handle
                .post(move || {
                    count.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        handle.shutdown().await;
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let (handle, _task) = EventLoop::spawn();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        handle
            .post_after(Duration::from_millis(100), move || flag.store(true, Ordering::SeqCst))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.call(|| ()).await.unwrap();
        assert!(!fired.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.call(|| ()).await.unwrap();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_runs() {
        let (handle, _task) = EventLoop::spawn();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let timer = handle
            .post_after(Duration::from_millis(10), move || flag.store(true, Ordering::SeqCst))
            .unwrap();
        timer.cancel();
        assert!(timer.is_cancelled());

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.call(|| ()).await.unwrap();
        assert!(!fired.load(Ordering::SeqCst));
    }
}
