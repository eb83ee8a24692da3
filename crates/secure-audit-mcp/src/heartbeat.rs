// crates/secure-audit-mcp/src/heartbeat.rs
// ============================================================================
// Module: Heartbeat Monitor
// Description: Periodic liveness events for stream sessions.
// Purpose: Keep idle stream sessions observable and detect dead peers.
// Dependencies: tokio, tokio-util, secure-audit-core
// ============================================================================

//! ## Overview
//! One monitor runs per stream session. It pushes a numbered
//! [`StreamEvent::Heartbeat`] every interval until the session is cancelled
//! or the event channel closes. A closed channel means the peer is gone:
//! the monitor logs it and stops instead of retrying.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use secure_audit_core::Component;
use secure_audit_core::LogLevel;
use secure_audit_core::LogRecord;
use secure_audit_core::Timestamp;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::observability::Observability;
use crate::transport::stream::StreamEvent;

// ============================================================================
// SECTION: Monitor
// ============================================================================

/// Emits heartbeat events for one stream session.
pub struct HeartbeatMonitor {
    /// Time between heartbeats.
    interval: Duration,
    /// Session the monitor belongs to.
    session_id: String,
    /// Session event channel.
    events: mpsc::Sender<StreamEvent>,
    /// Session cancellation.
    cancel: CancellationToken,
    /// Log sink.
    observability: Arc<Observability>,
}

impl HeartbeatMonitor {
    /// Creates a monitor; nothing runs until [`Self::spawn`] or [`Self::run`].
    #[must_use]
    pub fn new(
        interval: Duration,
        session_id: impl Into<String>,
        events: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
        observability: Arc<Observability>,
    ) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            session_id: session_id.into(),
            events,
            cancel,
            observability,
        }
    }

    /// Runs the monitor on its own task.
    pub fn spawn(self) -> JoinHandle<u64> {
        tokio::spawn(self.run())
    }

    /// Emits heartbeats until cancelled or the peer goes away. Returns the
    /// number of heartbeats delivered.
    pub async fn run(self) -> u64 {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sent = 0_u64;
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let seq = sent + 1;
            let event = StreamEvent::Heartbeat {
                seq,
                at: Timestamp::now(),
            };
            if self.events.send(event).await.is_err() {
                self.observability.emit(
                    LogRecord::new(Component::Heartbeat, LogLevel::Warning, "heartbeat undeliverable")
                        .with_field("session_id", self.session_id.as_str())
                        .with_field("error_kind", "TransportError")
                        .with_field("seq", seq),
                );
                break;
            }
            sent = seq;
            self.observability.emit(
                LogRecord::new(Component::Heartbeat, LogLevel::Debug, "heartbeat")
                    .with_field("session_id", self.session_id.as_str())
                    .with_field("seq", seq),
            );
        }
        sent
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
