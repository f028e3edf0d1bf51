// src/services/timer.rs

//! Single-shot, cancellable deadline per ongoing mock exam.
//!
//! One background task owns a [`DelayQueue`] keyed by session id and is fed
//! through an unbounded channel, so `arm`/`cancel` never block the caller.
//! Due entries are dispatched on their own task so one slow finish does not
//! hold back other sessions' deadlines.

use std::{collections::HashMap, future::poll_fn, sync::Arc, sync::Weak, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::{
    sync::CancellationToken,
    time::{DelayQueue, delay_queue::Key},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{error::AppError, services::clock::Clock};

/// Whatever must happen when a session's deadline passes.
///
/// Implementations must be idempotent: a deadline can fire after the session
/// was already finished by another path, and failed attempts are retried.
#[async_trait]
pub trait ExpiryHandler: Send + Sync {
    async fn on_expired(&self, session_id: Uuid) -> Result<(), AppError>;
}

#[derive(Debug)]
enum TimerCommand {
    Arm { session_id: Uuid, delay: Duration },
    Cancel(Uuid),
}

#[derive(Clone)]
pub struct SessionTimer {
    tx: UnboundedSender<TimerCommand>,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
}

impl SessionTimer {
    /// Spawns the scheduling task. Only a weak reference to the handler is
    /// kept; once it is gone, due entries are dropped.
    pub fn spawn(
        handler: Weak<dyn ExpiryHandler>,
        clock: Arc<dyn Clock>,
        retry_backoff: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        tokio::spawn(run_timer_loop(
            rx,
            tx.clone(),
            handler,
            retry_backoff,
            shutdown.clone(),
        ));

        Self { tx, clock, shutdown }
    }

    /// Schedules the session's deadline, replacing any previous one.
    /// A `fire_at` in the past fires as soon as the task gets to it.
    pub fn arm(&self, session_id: Uuid, fire_at: DateTime<Utc>) {
        let delay = (fire_at - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
        if self.tx.send(TimerCommand::Arm { session_id, delay }).is_err() {
            warn!(%session_id, "Session timer is shut down, deadline not armed");
        }
    }

    /// Best effort: a callback that already started still runs.
    pub fn cancel(&self, session_id: Uuid) {
        let _ = self.tx.send(TimerCommand::Cancel(session_id));
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

async fn run_timer_loop(
    mut rx: UnboundedReceiver<TimerCommand>,
    tx: UnboundedSender<TimerCommand>,
    handler: Weak<dyn ExpiryHandler>,
    retry_backoff: Duration,
    shutdown: CancellationToken,
) {
    let mut queue: DelayQueue<Uuid> = DelayQueue::new();
    let mut keys: HashMap<Uuid, Key> = HashMap::new();

    debug!("Session timer started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(pending = keys.len(), "Session timer shutting down");
                break;
            }
            command = rx.recv() => match command {
                Some(TimerCommand::Arm { session_id, delay }) => {
                    if let Some(key) = keys.remove(&session_id) {
                        queue.remove(&key);
                    }
                    keys.insert(session_id, queue.insert(session_id, delay));
                    debug!(%session_id, delay_ms = delay.as_millis() as u64, "Armed session deadline");
                }
                Some(TimerCommand::Cancel(session_id)) => {
                    if let Some(key) = keys.remove(&session_id) {
                        queue.remove(&key);
                        debug!(%session_id, "Cancelled session deadline");
                    }
                }
                None => break,
            },
            Some(expired) = poll_fn(|cx| queue.poll_expired(cx)), if !queue.is_empty() => {
                let session_id = expired.into_inner();
                keys.remove(&session_id);
                dispatch(session_id, handler.clone(), tx.clone(), retry_backoff);
            }
        }
    }
}

fn dispatch(
    session_id: Uuid,
    handler: Weak<dyn ExpiryHandler>,
    tx: UnboundedSender<TimerCommand>,
    retry_backoff: Duration,
) {
    tokio::spawn(async move {
        let Some(handler) = handler.upgrade() else {
            return;
        };

        info!(%session_id, "Session deadline reached");

        if let Err(e) = handler.on_expired(session_id).await {
            warn!(
                %session_id,
                error = %e,
                retry_in_ms = retry_backoff.as_millis() as u64,
                "Forced finish failed, retrying"
            );
            let _ = tx.send(TimerCommand::Arm {
                session_id,
                delay: retry_backoff,
            });
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::TokioClock;
    use std::sync::Mutex;

    /// Records every firing, fails the first `failures` of them.
    struct Recorder {
        clock: TokioClock,
        fired: Mutex<Vec<(Uuid, DateTime<Utc>)>>,
        failures: Mutex<u32>,
    }

    impl Recorder {
        fn new(clock: TokioClock, failures: u32) -> Arc<Self> {
            Arc::new(Self {
                clock,
                fired: Mutex::new(Vec::new()),
                failures: Mutex::new(failures),
            })
        }

        fn fired(&self) -> Vec<(Uuid, DateTime<Utc>)> {
            self.fired.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExpiryHandler for Recorder {
        async fn on_expired(&self, session_id: Uuid) -> Result<(), AppError> {
            self.fired.lock().unwrap().push((session_id, self.clock.now()));
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(AppError::InternalServerError("store down".to_string()));
            }
            Ok(())
        }
    }

    fn timer_for(recorder: &Arc<Recorder>, clock: TokioClock, backoff: Duration) -> SessionTimer {
        let handler: Arc<dyn ExpiryHandler> = recorder.clone();
        SessionTimer::spawn(Arc::downgrade(&handler), Arc::new(clock), backoff)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_at_deadline() {
        let clock = TokioClock::new();
        let recorder = Recorder::new(clock, 0);
        let timer = timer_for(&recorder, clock, Duration::from_secs(1));

        let id = Uuid::new_v4();
        let deadline = clock.now() + chrono::TimeDelta::milliseconds(100);
        timer.arm(id, deadline);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(recorder.fired().is_empty());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(recorder.fired(), vec![(id, deadline)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let clock = TokioClock::new();
        let recorder = Recorder::new(clock, 0);
        let timer = timer_for(&recorder, clock, Duration::from_secs(1));

        let id = Uuid::new_v4();
        timer.arm(id, clock.now() + chrono::TimeDelta::milliseconds(100));
        timer.cancel(id);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(recorder.fired().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_deadline() {
        let clock = TokioClock::new();
        let recorder = Recorder::new(clock, 0);
        let timer = timer_for(&recorder, clock, Duration::from_secs(1));

        let id = Uuid::new_v4();
        timer.arm(id, clock.now() + chrono::TimeDelta::milliseconds(100));
        let later = clock.now() + chrono::TimeDelta::milliseconds(400);
        timer.arm(id, later);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(recorder.fired(), vec![(id, later)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_deadline_fires_immediately() {
        let clock = TokioClock::new();
        let recorder = Recorder::new(clock, 0);
        let timer = timer_for(&recorder, clock, Duration::from_secs(1));

        let id = Uuid::new_v4();
        timer.arm(id, clock.now() - chrono::TimeDelta::minutes(10));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(recorder.fired().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_expiry_is_retried_after_backoff() {
        let clock = TokioClock::new();
        let recorder = Recorder::new(clock, 2);
        let timer = timer_for(&recorder, clock, Duration::from_millis(200));

        let id = Uuid::new_v4();
        let deadline = clock.now() + chrono::TimeDelta::milliseconds(100);
        timer.arm(id, deadline);

        tokio::time::sleep(Duration::from_secs(2)).await;

        let fired = recorder.fired();
        assert_eq!(fired.len(), 3);
        assert_eq!(fired[0].1, deadline);
        assert_eq!(fired[1].1, deadline + chrono::TimeDelta::milliseconds(200));
        assert_eq!(fired[2].1, deadline + chrono::TimeDelta::milliseconds(400));
    }
}
