//! Unix Domain Socket server delivering host events to the worker

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio::sync::{mpsc, oneshot};

use super::protocol::{EventAck, WorkerEvent, MAX_FRAME_LEN};
use super::NotificationWorker;

/// Event waiting for the worker, with the channel its acknowledgement goes to
struct QueuedEvent {
    event: WorkerEvent,
    reply: oneshot::Sender<EventAck>,
}

/// Run the worker listener
///
/// Connections are accepted concurrently, but events are handed to a single
/// consumer so the worker handles them one at a time in arrival order. Each
/// connection receives its acknowledgement only once the worker finished the
/// event.
///
/// # Arguments
/// * `socket_path` - Path to the Unix domain socket
/// * `worker` - Worker that handles the events
pub async fn run_listener(socket_path: &Path, worker: Arc<NotificationWorker>) -> Result<()> {
    // Remove existing socket if present
    if socket_path.exists() {
        std::fs::remove_file(socket_path).context("Failed to remove existing socket")?;
    }

    // Ensure parent directory exists
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create socket directory")?;
    }

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("Failed to bind to socket: {}", socket_path.display()))?;

    tracing::info!("Worker listener started at: {}", socket_path.display());

    let (tx, rx) = mpsc::channel::<QueuedEvent>(100);
    tokio::spawn(process_events(worker, rx));

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, tx).await {
                        tracing::warn!("Error handling connection: {}", e);
                    }
                });
            }
            Err(e) => {
                tracing::warn!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn process_events(worker: Arc<NotificationWorker>, mut rx: mpsc::Receiver<QueuedEvent>) {
    while let Some(queued) = rx.recv().await {
        let kind = queued.event.kind();
        let ack = match worker.handle(queued.event).await {
            Ok(outcome) => {
                tracing::debug!("{} event: {}", kind, outcome.summary());
                EventAck::success(outcome.summary())
            }
            Err(e) => {
                tracing::warn!("{} event failed: {:#}", kind, e);
                EventAck::failure(format!("{:#}", e))
            }
        };
        // The sender may have disconnected; the event still ran to completion
        let _ = queued.reply.send(ack);
    }
}

async fn handle_connection(
    mut stream: tokio::net::UnixStream,
    tx: mpsc::Sender<QueuedEvent>,
) -> Result<()> {
    // Read length-prefixed message
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .context("Failed to read event length")?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        write_ack(&mut stream, &EventAck::failure("event too large")).await?;
        anyhow::bail!("Event too large: {} bytes", len);
    }

    let mut buf = vec![0u8; len];
    stream
        .read_exact(&mut buf)
        .await
        .context("Failed to read event body")?;

    let event: WorkerEvent = match serde_json::from_slice(&buf) {
        Ok(event) => event,
        Err(e) => {
            write_ack(&mut stream, &EventAck::failure(format!("invalid event: {}", e))).await?;
            return Err(e).context("Failed to parse event");
        }
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    tx.send(QueuedEvent {
        event,
        reply: reply_tx,
    })
    .await
    .context("Worker event loop stopped")?;

    let ack = reply_rx.await.context("Worker dropped the event")?;
    write_ack(&mut stream, &ack).await
}

async fn write_ack(stream: &mut tokio::net::UnixStream, ack: &EventAck) -> Result<()> {
    let json = serde_json::to_vec(ack).context("Failed to serialize acknowledgement")?;
    stream
        .write_all(&(json.len() as u32).to_be_bytes())
        .await
        .context("Failed to write acknowledgement length")?;
    stream
        .write_all(&json)
        .await
        .context("Failed to write acknowledgement")?;
    stream.flush().await.context("Failed to flush stream")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::WorkerConfig;
    use crate::push::types::NotificationPermission;
    use crate::sim::SimulatedBrowser;
    use crate::worker::{send_event, ClickedNotification};
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::tempdir;

    async fn start(socket_path: PathBuf) -> Arc<SimulatedBrowser> {
        let browser = Arc::new(SimulatedBrowser::registered("https://site/"));
        browser.set_permission(NotificationPermission::Granted);
        let worker = Arc::new(NotificationWorker::new(
            browser.clone(),
            &WorkerConfig::default(),
        ));

        let path = socket_path.clone();
        tokio::spawn(async move {
            let _ = run_listener(&path, worker).await;
        });

        for _ in 0..100 {
            if socket_path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        browser
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_push_over_socket_is_displayed_before_ack() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("worker.sock");
        let browser = start(socket_path.clone()).await;

        let ack = tokio::task::spawn_blocking(move || {
            send_event(
                &socket_path,
                &WorkerEvent::Push {
                    data: Some(br#"{"title":"Hello","body":"world"}"#.to_vec()),
                },
            )
        })
        .await
        .unwrap()
        .unwrap();

        assert!(ack.ok, "ack: {:?}", ack);
        // Side effects are complete once the ack arrives
        let shown = browser.shown_notifications();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].payload.title, "Hello");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_events_handled_in_order() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("worker.sock");
        let browser = start(socket_path.clone()).await;

        let outcomes = tokio::task::spawn_blocking(move || {
            ["one", "two", "three"]
                .iter()
                .map(|title| {
                    let event = WorkerEvent::Push {
                        data: Some(format!(r#"{{"title":"{}"}}"#, title).into_bytes()),
                    };
                    send_event(&socket_path, &event).unwrap().outcome.unwrap()
                })
                .collect::<Vec<_>>()
        })
        .await
        .unwrap();

        assert_eq!(
            outcomes,
            vec![
                "displayed \"one\"",
                "displayed \"two\"",
                "displayed \"three\""
            ]
        );

        // Every push shares a tag, so only the last one stays on screen
        let titles: Vec<String> = browser
            .display_history()
            .into_iter()
            .map(|n| n.payload.title)
            .collect();
        assert_eq!(titles, vec!["one", "two", "three"]);
        assert_eq!(browser.shown_notifications().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_event_is_acknowledged_with_error() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("worker.sock");
        let browser = start(socket_path.clone()).await;
        browser.set_display_error(Some("quota exceeded".to_string()));

        let ack = tokio::task::spawn_blocking(move || {
            send_event(&socket_path, &WorkerEvent::Push { data: None })
        })
        .await
        .unwrap()
        .unwrap();

        assert!(!ack.ok);
        assert!(ack.error.unwrap().contains("quota exceeded"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_click_over_socket_opens_window() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("worker.sock");
        let browser = start(socket_path.clone()).await;

        let ack = tokio::task::spawn_blocking(move || {
            send_event(
                &socket_path,
                &WorkerEvent::NotificationClick {
                    notification: ClickedNotification {
                        id: "n".to_string(),
                        tag: None,
                        data: serde_json::json!({"url": "https://site/c"}),
                    },
                    action: None,
                },
            )
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(ack.outcome.as_deref(), Some("opened https://site/c"));
        assert!(browser.windows().iter().any(|w| w.url == "https://site/c"));
    }
}
