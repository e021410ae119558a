//! Progress reporting for running fetches.
//!
//! Extractors call [`ProgressSink::report`] as often as they like. The sink
//! throttles to one status per interval and publishes the newest one on a
//! `watch` channel. A single forwarder task per job drains the channel and
//! edits the user's status message, so updates reach the transport in order
//! and a slow transport only ever sees the latest status.

use crate::downloader::job::JobTicket;
use crate::transport::{StatusUpdate, Transport};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Interval gate for progress updates.
///
/// The first update is always let through; after that at most one per
/// `interval`.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
    step: u32,
}

impl ProgressThrottle {
    /// Create a throttle with the given minimum spacing.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            step: 0,
        }
    }

    /// Minimum spacing between emitted updates.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether an update at `now` may be emitted.
    pub fn should_emit_at(&self, now: Instant) -> bool {
        match self.last_emit {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    /// Record an emission at `now`; returns the animation step.
    pub fn mark_emitted_at(&mut self, now: Instant) -> u32 {
        self.last_emit = Some(now);
        self.step = self.step.wrapping_add(1);
        self.step
    }

    /// Gate and record in one call.
    pub fn tick_at(&mut self, now: Instant) -> Option<u32> {
        if self.should_emit_at(now) {
            Some(self.mark_emitted_at(now))
        } else {
            None
        }
    }
}

/// Append a cycling ellipsis so repeated identical statuses still change.
pub fn animate(status: &str, step: u32) -> String {
    let dots = ".".repeat((step % 4) as usize);
    format!("{status}{dots}")
}

/// Value carried on the progress channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Nothing reported yet
    Idle,
    /// Latest status line
    Status(String),
    /// Fetch finished; forwarder should stop
    Closed,
}

struct SinkInner {
    tx: watch::Sender<ProgressEvent>,
    throttle: Mutex<ProgressThrottle>,
}

/// Throttled, cloneable progress reporter handed to extractors.
#[derive(Clone)]
pub struct ProgressSink {
    inner: Option<Arc<SinkInner>>,
}

impl ProgressSink {
    /// A sink that drops everything.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Create a sink and the receiving end for a forwarder.
    pub fn channel(interval: Duration) -> (Self, ProgressReceiver) {
        let (tx, rx) = watch::channel(ProgressEvent::Idle);
        let sink = Self {
            inner: Some(Arc::new(SinkInner {
                tx,
                throttle: Mutex::new(ProgressThrottle::new(interval)),
            })),
        };
        (sink, ProgressReceiver { rx })
    }

    /// Whether reports go anywhere.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Report a status line; returns whether it passed the throttle.
    pub fn report(&self, status: impl AsRef<str>) -> bool {
        let Some(inner) = &self.inner else {
            return false;
        };

        let step = {
            let mut throttle = match inner.throttle.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            throttle.tick_at(Instant::now())
        };

        match step {
            Some(step) => {
                let line = animate(status.as_ref(), step);
                inner.tx.send_replace(ProgressEvent::Status(line));
                true
            }
            None => false,
        }
    }

    /// Tell the forwarder no more updates will come.
    pub fn close(&self) {
        if let Some(inner) = &self.inner {
            inner.tx.send_replace(ProgressEvent::Closed);
        }
    }
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSink")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Receiving end of a [`ProgressSink`].
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: watch::Receiver<ProgressEvent>,
}

impl ProgressReceiver {
    /// Wait for the next status; `None` once the sink closed or was dropped.
    pub async fn next(&mut self) -> Option<String> {
        loop {
            self.rx.changed().await.ok()?;
            let event = self.rx.borrow_and_update().clone();
            match event {
                ProgressEvent::Status(line) => return Some(line),
                ProgressEvent::Closed => return None,
                ProgressEvent::Idle => continue,
            }
        }
    }
}

/// Spawn the per-job forwarder that relays statuses to the transport.
pub fn spawn_forwarder(
    mut receiver: ProgressReceiver,
    transport: Arc<dyn Transport>,
    ticket: JobTicket,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(line) = receiver.next().await {
            if let Err(e) = transport
                .present(&ticket, StatusUpdate::Progress(line))
                .await
            {
                debug!(job_id = ticket.job_id, error = %e, "Progress update not delivered");
            }
        }
    })
}
