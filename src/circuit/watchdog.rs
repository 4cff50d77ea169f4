// ABOUTME: Timer-driven liveness and deadline observers for one circuit
// ABOUTME: SendDog bounds connect and each send; RecvDog watches peer activity

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{self, Instant};

/// Deadline guard for operations that must make progress: the initial
/// `connect` and every send write. The guarded operation either completes
/// within the budget or the socket is considered unhealthy and the caller
/// forces the circuit down.
#[derive(Debug)]
pub(crate) struct SendDog {
    timeout: Duration,
}

impl SendDog {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run `op` under this dog's deadline.
    pub async fn watch<F>(&self, op: F) -> Result<F::Output, time::error::Elapsed>
    where
        F: Future,
    {
        time::timeout(self.timeout, op).await
    }
}

#[derive(Debug)]
struct RecvDogState {
    armed: bool,
    deadline: Instant,
}

/// Expected-activity watchdog for the receive side.
///
/// Armed when the circuit connects; every successful receive pushes the
/// deadline out, as does send-backlog progress (an unacknowledged backlog
/// larger than the socket's send buffer means the peer owes us activity).
/// When the deadline passes with no poke the peer is unresponsive and the
/// receive task shuts the circuit down gracefully.
///
/// Pokes and cancel are plain state updates: they never wait on an
/// in-progress expiry, so unlike a blocking timer-queue cancel they are safe
/// to call while holding any lock.
#[derive(Debug)]
pub(crate) struct RecvDog {
    period: Duration,
    state: Mutex<RecvDogState>,
    changed: Notify,
}

impl RecvDog {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            state: Mutex::new(RecvDogState {
                armed: false,
                deadline: Instant::now(),
            }),
            changed: Notify::new(),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, RecvDogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm on the Connecting -> Connected transition.
    pub fn connect_notify(&self) {
        let mut s = self.state();
        s.armed = true;
        s.deadline = Instant::now() + self.period;
        drop(s);
        self.changed.notify_waiters();
    }

    fn poke(&self) {
        let mut s = self.state();
        if s.armed {
            s.deadline = Instant::now() + self.period;
            drop(s);
            self.changed.notify_waiters();
        }
    }

    /// A receive completed; the peer is alive.
    pub fn message_arrival_notify(&self) {
        self.poke();
    }

    /// The unacknowledged send backlog exceeds the socket send buffer; give
    /// the peer a full period to drain it before calling it unresponsive.
    pub fn send_backlog_progress_notify(&self) {
        self.poke();
    }

    pub fn cancel(&self) {
        self.state().armed = false;
        self.changed.notify_waiters();
    }

    /// Resolves when the armed deadline passes without a poke. Pends forever
    /// while disarmed. Cancel-safe; intended for `select!` alongside the
    /// socket read.
    pub async fn expired(&self) {
        loop {
            let wakeup = self.changed.notified();
            tokio::pin!(wakeup);
            wakeup.as_mut().enable();

            let (armed, deadline) = {
                let s = self.state();
                (s.armed, s.deadline)
            };
            if !armed {
                wakeup.await;
                continue;
            }
            if Instant::now() >= deadline {
                return;
            }
            tokio::select! {
                _ = time::sleep_until(deadline) => {}
                _ = &mut wakeup => {}
            }
        }
    }
}
