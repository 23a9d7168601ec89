//! Sliding-window admission control for the upstream model.
//!
//! [`RateGovernor`] bounds how many model calls are admitted within any
//! trailing window (60 s by default). Callers `await` [`RateGovernor::admit`]
//! immediately before dispatching a request; when the window is full the
//! call sleeps until the oldest admission ages out.
//!
//! An admission is recorded only once `admit` returns. A caller whose future
//! is dropped while waiting leaves no trace in the log.

use anyhow::{bail, Result};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::GovernorConfig;

pub struct RateGovernor {
    calls_per_minute: usize,
    window: Duration,
    margin: Duration,
    /// Serializes admitters so the prune-check-record sequence (including
    /// any wait) is never interleaved.
    gate: tokio::sync::Mutex<()>,
    /// Admission instants, oldest first.
    log: Mutex<VecDeque<Instant>>,
}

impl RateGovernor {
    /// Create a governor admitting at most `calls_per_minute` calls per 60 s.
    pub fn new(calls_per_minute: i64) -> Result<Self> {
        Self::with_window(calls_per_minute, Duration::from_secs(60), Duration::from_millis(100))
    }

    pub fn from_config(config: &GovernorConfig) -> Result<Self> {
        Self::with_window(
            config.calls_per_minute,
            Duration::from_secs(config.window_secs),
            Duration::from_millis(config.safety_margin_ms),
        )
    }

    pub fn with_window(calls_per_minute: i64, window: Duration, margin: Duration) -> Result<Self> {
        if calls_per_minute <= 0 {
            bail!("calls_per_minute must be > 0, got {}", calls_per_minute);
        }
        if window.is_zero() {
            bail!("rate window must be non-zero");
        }
        Ok(Self {
            calls_per_minute: calls_per_minute as usize,
            window,
            margin,
            gate: tokio::sync::Mutex::new(()),
            log: Mutex::new(VecDeque::new()),
        })
    }

    pub fn calls_per_minute(&self) -> usize {
        self.calls_per_minute
    }

    /// Wait until a call may proceed, then record it.
    pub async fn admit(&self) {
        let _turn = self.gate.lock().await;

        loop {
            let wait = {
                let mut log = self.lock_log();
                let now = Instant::now();
                prune(&mut log, now, self.window);

                if log.len() < self.calls_per_minute {
                    log.push_back(now);
                    debug!(
                        in_window = log.len(),
                        limit = self.calls_per_minute,
                        "model call admitted"
                    );
                    return;
                }

                // Full: the oldest retained admission frees the next slot.
                match log.front() {
                    Some(oldest) => (*oldest + self.window).saturating_duration_since(now) + self.margin,
                    None => self.margin,
                }
            };

            info!(
                wait_ms = wait.as_millis() as u64,
                limit = self.calls_per_minute,
                "rate limit reached, delaying model call"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Remaining admissions in the current window. Never blocks on waiters.
    pub fn get_remaining(&self) -> usize {
        let mut log = self.lock_log();
        prune(&mut log, Instant::now(), self.window);
        self.calls_per_minute.saturating_sub(log.len())
    }

    /// Number of admissions recorded in the trailing window.
    pub fn in_window(&self) -> usize {
        let mut log = self.lock_log();
        prune(&mut log, Instant::now(), self.window);
        log.len()
    }

    fn lock_log(&self) -> std::sync::MutexGuard<'_, VecDeque<Instant>> {
        // A poisoned log still holds valid instants.
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Drop admissions that are at least one window old.
fn prune(log: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = log.front() {
        if now.saturating_duration_since(*oldest) >= window {
            log.pop_front();
        } else {
            break;
        }
    }
}
