//! Snapshot feed from the gateway client.
//!
//! The gateway client writes one cached message object (JSON) per line for
//! every `MESSAGE_DELETE` it sees. Each line becomes a deletion event.

use std::io::{self, BufRead};

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use dmb_core::event::DeletionSender;
use dmb_discord::snapshot::decode_snapshot;

/// Read stdin on a plain OS thread and hand lines over to async code.
///
/// The thread blocks in `read` and cannot be interrupted, so it is detached:
/// it is never joined and does not keep the process alive on shutdown. It
/// stops on EOF, on a read error, or once the receiver is dropped.
pub fn spawn_stdin_reader(capacity: usize) -> mpsc::Receiver<io::Result<String>> {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let failed = line.is_err();
            if tx.blocking_send(line).is_err() || failed {
                break;
            }
        }
        debug!("stdin reader finished");
    });
    rx
}

/// Forward snapshots until the line source closes or `cancel` fires.
/// Malformed lines are logged and skipped. Returns how many events were
/// forwarded.
pub async fn pump_snapshots(
    mut lines: mpsc::Receiver<io::Result<String>>,
    tx: DeletionSender,
    cancel: CancellationToken,
) -> anyhow::Result<usize> {
    let mut forwarded = 0usize;

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.recv() => line,
        };
        let Some(line) = line else { break };
        let line = line.context("read snapshot line")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match decode_snapshot(line) {
            Ok(event) => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = tx.send(event) => sent.context("forward deletion event")?,
                }
                forwarded += 1;
            }
            Err(e) => warn!("skipping deletion snapshot: {e}"),
        }
    }

    Ok(forwarded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use dmb_core::{domain::MessageId, event::deletion_channel, ports::DeletionEventSource};
    use tokio::time::timeout;

    async fn feed_lines(input: &[&str]) -> mpsc::Receiver<io::Result<String>> {
        let (tx, rx) = mpsc::channel(input.len().max(1));
        for line in input {
            tx.send(Ok(line.to_string())).await.unwrap();
        }
        rx
    }

    #[tokio::test]
    async fn forwards_valid_lines_in_order() {
        let lines = feed_lines(&[
            r#"{"id":"1","channel_id":"10","author":{"id":"5"},"content":"a"}"#,
            "",
            "garbage",
            r#"{"id":"2","channel_id":"10"}"#,
            r#"{"id":"3","channel_id":"10","author":{"id":"6"}}"#,
        ])
        .await;
        let (tx, mut rx) = deletion_channel(8);

        let forwarded = pump_snapshots(lines, tx, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(forwarded, 2);

        let first = rx.next_deletion().await.unwrap();
        let second = rx.next_deletion().await.unwrap();
        assert_eq!(first.message_id, MessageId(1));
        assert_eq!(first.text, "a");
        assert_eq!(second.message_id, MessageId(3));
        assert!(rx.next_deletion().await.is_none());
    }

    #[tokio::test]
    async fn stops_when_the_monitor_is_gone() {
        let (tx, rx) = deletion_channel(1);
        drop(rx);
        let lines = feed_lines(&[r#"{"id":"1","channel_id":"10","author":{"id":"5"}}"#]).await;
        let err = pump_snapshots(lines, tx, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("forward deletion event"));
    }

    #[tokio::test]
    async fn read_errors_end_the_feed() {
        let (line_tx, lines) = mpsc::channel(1);
        line_tx
            .send(Err(io::Error::new(io::ErrorKind::InvalidData, "not utf-8")))
            .await
            .unwrap();
        let (tx, _rx) = deletion_channel(1);

        let err = pump_snapshots(lines, tx, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("read snapshot line"));
    }

    #[tokio::test]
    async fn cancellation_stops_an_idle_feed() {
        // The writer side stays open, as with a gateway client that is idle.
        let (_line_tx, lines) = mpsc::channel::<io::Result<String>>(1);
        let (tx, _rx) = deletion_channel(1);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(pump_snapshots(lines, tx, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let forwarded = timeout(Duration::from_secs(1), task)
            .await
            .expect("feed did not stop after cancellation")
            .unwrap()
            .unwrap();
        assert_eq!(forwarded, 0);
    }

    #[tokio::test]
    async fn cancellation_unblocks_a_full_queue() {
        let lines = feed_lines(&[
            r#"{"id":"1","channel_id":"10","author":{"id":"5"}}"#,
            r#"{"id":"2","channel_id":"10","author":{"id":"5"}}"#,
        ])
        .await;
        // Capacity one and nobody draining: the second send waits.
        let (tx, _rx) = deletion_channel(1);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(pump_snapshots(lines, tx, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let forwarded = timeout(Duration::from_secs(1), task)
            .await
            .expect("feed did not stop after cancellation")
            .unwrap()
            .unwrap();
        assert_eq!(forwarded, 1);
    }
}
