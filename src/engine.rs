//! The asynchronous run loop for one synchronization session.
//!
//! Notifications arrive on an mpsc channel (fed by the transport's
//! subscription task) and are applied to the orchestrator one at a time;
//! the only suspension points are "awaiting the next inbound
//! notification" and "awaiting a command write". Every inbound wait is
//! bounded by a stall timeout: the wire protocol has no end-of-data
//! marker and a dropped final notification would otherwise hang the
//! session forever.

use std::time::Duration;

use log::{info, warn};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::commands::{CommandPort, CommandSequencer, SETTLE_DELAY};
use crate::errors::{Result, SyncError};
use crate::export::ExportSink;
use crate::session::{Step, SyncMode, SyncOrchestrator, SyncReport};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Delay after each command write.
    pub settle: Duration,
    /// Longest the session may wait for the next notification.
    pub stall_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settle: SETTLE_DELAY,
            stall_timeout: Duration::from_secs(30),
        }
    }
}

/// Run one full session: query counts, fetch records, wait for the last
/// expected decode, hand the merged report to the sink.
///
/// Returns `Ok(None)` when an incremental session finds an empty sync
/// range: nothing is exported and the cursor is left untouched. For
/// every other success the report is returned after the sink confirmed
/// the handoff; for incremental sessions the cursor-advance command is
/// issued strictly after that confirmation.
pub async fn run_session<P, S>(
    mode: SyncMode,
    port: &mut P,
    notifications: &mut mpsc::Receiver<Vec<u8>>,
    sink: &mut S,
    config: &EngineConfig,
) -> Result<Option<SyncReport>>
where
    P: CommandPort,
    S: ExportSink,
{
    let sequencer = CommandSequencer::new(config.settle);
    let mut orchestrator = SyncOrchestrator::new(mode);

    sequencer
        .send(port, orchestrator.initial_command())
        .await?;

    loop {
        let payload = match timeout(config.stall_timeout, notifications.recv()).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                orchestrator.abort();
                return Err(SyncError::Transport(
                    "notification channel closed before session completed".into(),
                ));
            }
            Err(_) => {
                orchestrator.abort();
                return Err(SyncError::Timeout(format!(
                    "no notification within {:?}, session stalled",
                    config.stall_timeout
                )));
            }
        };

        match orchestrator.on_notification(&payload)? {
            Step::Continue => {}
            Step::Send(commands) => {
                if let Err(e) = sequencer.run(port, &commands).await {
                    orchestrator.abort();
                    return Err(e);
                }
                orchestrator.commands_sent();
            }
            Step::Complete => break,
        }
    }

    let session = orchestrator.into_session();
    let cursor_advance = session.cursor_advance();
    let nothing_fetched = session.vehicle.is_none()
        && session.trips.is_empty()
        && session.events.is_empty();

    if mode == SyncMode::Incremental && nothing_fetched {
        info!("sync range empty, nothing to export");
        return Ok(None);
    }

    let report = session.into_report();
    if let Err(e) = sink.export(&report) {
        warn!("export failed, leaving device cursor untouched: {e}");
        return Err(e);
    }

    // The sink confirmed the handoff; only now may the cursor move.
    if let Some(command) = cursor_advance {
        sequencer.send(port, command).await?;
        info!("advanced device sync cursor ({command})");
    }

    Ok(Some(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_port::MockPort;
    use crate::records::test_encode::{encode_event_sync, sample_header};
    use crate::records::EventRecord;

    struct RecordingSink {
        exported: usize,
        fail: bool,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                exported: 0,
                fail: false,
            }
        }
    }

    impl ExportSink for RecordingSink {
        fn export(&mut self, _report: &SyncReport) -> Result<()> {
            if self.fail {
                return Err(SyncError::Export("disk full".into()));
            }
            self.exported += 1;
            Ok(())
        }
    }

    fn framed(key: &str, body: &[u8]) -> Vec<u8> {
        let mut payload = format!("{key}={:X}\n", body.len()).into_bytes();
        payload.extend_from_slice(body);
        payload
    }

    fn sync_event(id: u32) -> Vec<u8> {
        let e = EventRecord::StartLeg {
            header: sample_header(id),
        };
        framed("SyncData", &encode_event_sync(&e))
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            settle: Duration::ZERO,
            stall_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn incremental_session_exports_then_advances_cursor() {
        let (tx, mut rx) = mpsc::channel(16);
        tx.send(b"SyncRange=5,7\n".to_vec()).await.unwrap();
        tx.send(sync_event(5)).await.unwrap();
        tx.send(sync_event(6)).await.unwrap();

        let mut port = MockPort::default();
        let mut sink = RecordingSink::new();
        let report = run_session(
            SyncMode::Incremental,
            &mut port,
            &mut rx,
            &mut sink,
            &test_config(),
        )
        .await
        .unwrap()
        .expect("report expected");

        assert_eq!(report.timeline.len(), 2);
        assert_eq!(sink.exported, 1);
        assert_eq!(
            port.written,
            vec!["#0 SC?", "#0 SD?5;", "#0 SD?6;", "#0 SS=7;"]
        );
    }

    #[tokio::test]
    async fn failed_export_leaves_cursor_untouched() {
        let (tx, mut rx) = mpsc::channel(16);
        tx.send(b"SyncRange=0,1\n".to_vec()).await.unwrap();
        tx.send(sync_event(0)).await.unwrap();

        let mut port = MockPort::default();
        let mut sink = RecordingSink::new();
        sink.fail = true;
        let err = run_session(
            SyncMode::Incremental,
            &mut port,
            &mut rx,
            &mut sink,
            &test_config(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SyncError::Export(_)));
        assert!(
            !port.written.iter().any(|c| c.starts_with("#0 SS=")),
            "cursor must not advance after a failed handoff"
        );
    }

    #[tokio::test]
    async fn empty_range_skips_export_and_cursor() {
        let (tx, mut rx) = mpsc::channel(16);
        tx.send(b"SyncRange=5,5\n".to_vec()).await.unwrap();

        let mut port = MockPort::default();
        let mut sink = RecordingSink::new();
        let report = run_session(
            SyncMode::Incremental,
            &mut port,
            &mut rx,
            &mut sink,
            &test_config(),
        )
        .await
        .unwrap();

        assert!(report.is_none());
        assert_eq!(sink.exported, 0);
        assert_eq!(port.written, vec!["#0 SC?"]);
    }

    #[tokio::test]
    async fn stalled_session_times_out() {
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(16);
        // Keep the sender alive so the channel does not just close.
        let _tx = tx;

        let mut port = MockPort::default();
        let mut sink = RecordingSink::new();
        let err = run_session(
            SyncMode::DayFetch,
            &mut port,
            &mut rx,
            &mut sink,
            &test_config(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SyncError::Timeout(_)));
    }

    #[tokio::test]
    async fn closed_channel_is_a_transport_error() {
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(16);
        drop(tx);

        let mut port = MockPort::default();
        let mut sink = RecordingSink::new();
        let err = run_session(
            SyncMode::DayFetch,
            &mut port,
            &mut rx,
            &mut sink,
            &test_config(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SyncError::Transport(_)));
    }

    #[tokio::test]
    async fn transport_failure_during_fetch_aborts() {
        let (tx, mut rx) = mpsc::channel(16);
        tx.send(b"SyncRange=0,2\n".to_vec()).await.unwrap();

        let mut port = MockPort {
            // Initial SC? succeeds; the second SD? write fails.
            fail_at: Some(2),
            ..Default::default()
        };
        let mut sink = RecordingSink::new();
        let err = run_session(
            SyncMode::Incremental,
            &mut port,
            &mut rx,
            &mut sink,
            &test_config(),
        )
        .await
        .unwrap_err();

        assert!(err.is_transport());
        assert_eq!(sink.exported, 0);
    }
}
