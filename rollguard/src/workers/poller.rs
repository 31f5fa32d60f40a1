//! Cancellable fixed-interval polling shared by the CI monitor and the health prober

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// Poller options
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Delay before the first attempt
    pub initial_delay: Duration,

    /// Delay between attempts
    pub interval: Duration,

    /// Maximum number of attempts, unbounded when `None`
    pub max_attempts: Option<u32>,

    /// Overall wall-clock budget, measured from `Poller::new`
    pub deadline: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            interval: Duration::from_secs(15),
            max_attempts: None,
            deadline: Duration::from_secs(1800),
        }
    }
}

/// Sender side of a cancellation signal
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiver side of a cancellation signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Create a linked cancellation handle and signal
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// What the caller should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Run attempt number N (1-based)
    Attempt(u32),

    /// `max_attempts` reached
    Exhausted,

    /// The overall deadline passed or would pass before the next attempt
    TimedOut,

    /// Cancellation was requested
    Cancelled,
}

/// Drives a polling loop.
///
/// The caller owns the loop body, so attempts can borrow freely:
///
/// ```ignore
/// let mut poller = Poller::new(options, cancel);
/// loop {
///     match poller.tick().await {
///         Tick::Attempt(n) => { /* poll once, return on a terminal answer */ }
///         other => break other,
///     }
/// }
/// ```
///
/// Cancellation is only observed between attempts, never inside one.
pub struct Poller {
    options: PollOptions,
    cancel: CancelSignal,
    started: Instant,
    deadline: Instant,
    attempts: u32,
}

impl Poller {
    pub fn new(options: PollOptions, cancel: CancelSignal) -> Self {
        let started = Instant::now();
        Self {
            deadline: started + options.deadline,
            options,
            cancel,
            started,
            attempts: 0,
        }
    }

    /// Wait for the next attempt slot
    pub async fn tick(&mut self) -> Tick {
        if self.cancel.is_cancelled() {
            return Tick::Cancelled;
        }
        if let Some(max) = self.options.max_attempts {
            if self.attempts >= max {
                return Tick::Exhausted;
            }
        }

        let wait = if self.attempts == 0 {
            self.options.initial_delay
        } else {
            self.options.interval
        };
        let wake = Instant::now() + wait;
        if wake > self.deadline || Instant::now() >= self.deadline {
            debug!(attempts = self.attempts, "poll deadline reached");
            return Tick::TimedOut;
        }

        if !wait.is_zero() {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Tick::Cancelled,
                _ = tokio::time::sleep_until(wake) => {}
            }
        }

        self.attempts += 1;
        Tick::Attempt(self.attempts)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Run one attempt, giving up when the overall deadline passes
    pub async fn bounded<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::time::timeout_at(self.deadline, fut).await.ok()
    }
}
