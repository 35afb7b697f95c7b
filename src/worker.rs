use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info, warn};

use crate::config::PushConfig;
use crate::coordinator::RendezvousCoordinator;
use crate::messages::{Arrival, PeerKind, PushOutcome};
use crate::presence::DevicePresenceState;

/// How often a failed push is retried against the same session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 1,
            delay: Duration::from_millis(50),
        }
    }
}

impl From<&PushConfig> for RetryPolicy {
    fn from(config: &PushConfig) -> Self {
        let default = RetryPolicy::default();
        RetryPolicy {
            max_attempts: config.max_attempts.unwrap_or(default.max_attempts).max(1),
            delay: config
                .retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(default.delay),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub pushed: u32,
    pub failed: u32,
    pub skipped: u32,
}

pub struct PushWorker {
    coordinator: Arc<RendezvousCoordinator>,
    payload: Vec<u8>,
    retry: RetryPolicy,
}

impl PushWorker {
    pub fn new(
        coordinator: Arc<RendezvousCoordinator>,
        payload: Vec<u8>,
        retry: RetryPolicy,
    ) -> Self {
        PushWorker {
            coordinator,
            payload,
            retry,
        }
    }

    /// Pushes the payload to every peer-to-peer device that comes into range
    /// until the coordinator is cancelled.
    pub fn run(&self) -> WorkerReport {
        let mut report = WorkerReport::default();

        loop {
            match self.coordinator.wait_for_arrival() {
                Arrival::Cancelled => break,
                Arrival::Arrived(PeerKind::PeerToPeer) => match self.push() {
                    Some(true) => report.pushed += 1,
                    Some(false) => report.failed += 1,
                    None => break,
                },
                Arrival::Arrived(kind) => {
                    info!("Ignoring {kind:?}, not a push target");
                    report.skipped += 1;
                }
            }

            if self.coordinator.wait_for_departure().is_cancelled() {
                break;
            }
        }

        info!(
            "Push worker exiting (pushed: {}, failed: {}, skipped: {})",
            report.pushed, report.failed, report.skipped
        );
        report
    }

    /// `None` when cancelled, otherwise whether the payload went out.
    fn push(&self) -> Option<bool> {
        for attempt in 1..=self.retry.max_attempts {
            match self.coordinator.push_when_ready(&self.payload) {
                Ok(PushOutcome::Sent) => return Some(true),
                Ok(PushOutcome::PeerLost) => return Some(false),
                Ok(PushOutcome::Cancelled) => return None,
                Err(err) if attempt < self.retry.max_attempts => {
                    warn!(
                        "Push attempt {attempt}/{} failed: {err}",
                        self.retry.max_attempts
                    );
                    thread::sleep(self.retry.delay);
                    if self.coordinator.presence_state() == DevicePresenceState::Exiting {
                        return None;
                    }
                }
                Err(err) => {
                    error!("Push failed after {attempt} attempt(s): {err}");
                }
            }
        }
        Some(false)
    }
}
