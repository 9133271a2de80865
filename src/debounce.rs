//! Trailing-edge debounce with explicit flush
//!
//! Every [`Debouncer::call`] restarts the timer and replaces the pending
//! arguments; the wrapped function runs with the last arguments once no
//! call has arrived for the whole interval. There is no leading edge and
//! no maximum delay: a steady stream of calls closer together than the
//! interval postpones the run indefinitely. [`Debouncer::flush_now`] and
//! [`Debouncer::shutdown`] (or dropping the debouncer) run the pending
//! call immediately so the last write is never lost on teardown.

use crate::error::{Error, Result};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::warn;

enum Command<A> {
    Call(A),
    Flush(oneshot::Sender<bool>),
    Cancel,
}

/// Handle on a debounced function
///
/// Must be created inside a tokio runtime; the timer runs on a spawned task.
pub struct Debouncer<A: Send + 'static> {
    tx: Option<mpsc::UnboundedSender<Command<A>>>,
    task: Option<JoinHandle<()>>,
    interval: Duration,
}

/// Wrap `f` so that bursts of calls collapse into one trailing call
///
/// # Example
///
/// ```rust
/// use prefsync::debounce;
/// use std::sync::{Arc, Mutex};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let written = Arc::new(Mutex::new(Vec::new()));
/// let sink = written.clone();
/// let save = debounce(move |v: u32| sink.lock().unwrap().push(v), Duration::from_millis(50));
///
/// for v in 0..5 {
///     save.call(v);
/// }
/// save.flush_now().await;
/// assert_eq!(*written.lock().unwrap(), vec![4]);
/// # }
/// ```
pub fn debounce<A, F>(f: F, interval: Duration) -> Debouncer<A>
where
    A: Send + 'static,
    F: FnMut(A) + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(f, interval, rx));
    Debouncer {
        tx: Some(tx),
        task: Some(task),
        interval,
    }
}

impl<A: Send + 'static> Debouncer<A> {
    /// Replace the pending arguments and restart the timer
    pub fn call(&self, args: A) {
        if !self.send(Command::Call(args)) {
            warn!("debounced call dropped: worker stopped");
        }
    }

    /// Run the pending call now; `true` if there was one
    pub async fn flush_now(&self) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        if !self.send(Command::Flush(ack_tx)) {
            return false;
        }
        ack_rx.await.unwrap_or(false)
    }

    /// Drop the pending call without running it
    pub fn cancel(&self) {
        self.send(Command::Cancel);
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run the pending call (if any) and stop the worker
    pub async fn shutdown(mut self) -> Result<()> {
        self.tx.take();
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| Error::TaskStopped(format!("debounce worker: {e}"))),
            None => Ok(()),
        }
    }

    fn send(&self, command: Command<A>) -> bool {
        self.tx
            .as_ref()
            .is_some_and(|tx| tx.send(command).is_ok())
    }
}

impl<A: Send + 'static> Drop for Debouncer<A> {
    fn drop(&mut self) {
        // Closing the channel makes the worker flush and exit on its own.
        self.tx.take();
    }
}

async fn run<A, F>(mut f: F, interval: Duration, mut rx: mpsc::UnboundedReceiver<Command<A>>)
where
    F: FnMut(A),
{
    let mut pending: Option<A> = None;
    let timer = tokio::time::sleep(interval);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Call(args)) => {
                    pending = Some(args);
                    timer.as_mut().reset(Instant::now() + interval);
                }
                Some(Command::Flush(ack)) => {
                    let fired = match pending.take() {
                        Some(args) => {
                            f(args);
                            true
                        }
                        None => false,
                    };
                    let _ = ack.send(fired);
                }
                Some(Command::Cancel) => {
                    pending = None;
                }
                None => {
                    if let Some(args) = pending.take() {
                        f(args);
                    }
                    break;
                }
            },
            () = &mut timer, if pending.is_some() => {
                if let Some(args) = pending.take() {
                    f(args);
                }
            }
        }
    }
}
