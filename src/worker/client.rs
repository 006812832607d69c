//! Client for delivering events to a running notification worker

use anyhow::{Context, Result};
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use super::protocol::{EventAck, WorkerEvent, MAX_FRAME_LEN};

/// Deliver one event and wait for the worker to finish handling it
///
/// # Arguments
/// * `socket_path` - Path to the worker's Unix domain socket
/// * `event` - The event to deliver
///
/// # Returns
/// The worker's acknowledgement, sent after the event's side effects finished
pub fn send_event(socket_path: &Path, event: &WorkerEvent) -> Result<EventAck> {
    let stream = UnixStream::connect(socket_path)
        .with_context(|| format!("Failed to connect to socket: {}", socket_path.display()))?;

    stream
        .set_write_timeout(Some(Duration::from_secs(5)))
        .context("Failed to set write timeout")?;
    stream
        .set_read_timeout(Some(Duration::from_secs(30)))
        .context("Failed to set read timeout")?;

    send_frame(&stream, event)?;
    read_ack(&stream)
}

fn send_frame(mut stream: &UnixStream, event: &WorkerEvent) -> Result<()> {
    let json = serde_json::to_string(event).context("Failed to serialize event")?;
    if json.len() > MAX_FRAME_LEN {
        anyhow::bail!("Event too large: {} bytes", json.len());
    }

    // Write length-prefixed message
    let len = json.len() as u32;
    stream
        .write_all(&len.to_be_bytes())
        .context("Failed to write event length")?;
    stream
        .write_all(json.as_bytes())
        .context("Failed to write event")?;
    stream.flush().context("Failed to flush stream")?;

    Ok(())
}

fn read_ack(mut stream: &UnixStream) -> Result<EventAck> {
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .context("Failed to read acknowledgement length")?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        anyhow::bail!("Acknowledgement too large: {} bytes", len);
    }

    let mut buf = vec![0u8; len];
    stream
        .read_exact(&mut buf)
        .context("Failed to read acknowledgement")?;

    serde_json::from_slice(&buf).context("Failed to parse acknowledgement")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;
    use tempfile::tempdir;

    #[test]
    fn test_send_event_reads_ack() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("worker.sock");

        let listener = UnixListener::bind(&socket_path).unwrap();

        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut len_buf = [0u8; 4];
            stream.read_exact(&mut len_buf).unwrap();
            let len = u32::from_be_bytes(len_buf) as usize;
            let mut buf = vec![0u8; len];
            stream.read_exact(&mut buf).unwrap();

            let ack = serde_json::to_vec(&EventAck::success("displayed")).unwrap();
            stream.write_all(&(ack.len() as u32).to_be_bytes()).unwrap();
            stream.write_all(&ack).unwrap();
            String::from_utf8(buf).unwrap()
        });

        let event = WorkerEvent::Push {
            data: Some(b"hello".to_vec()),
        };
        let ack = send_event(&socket_path, &event).unwrap();
        assert!(ack.ok);
        assert_eq!(ack.outcome.as_deref(), Some("displayed"));

        let received = handle.join().unwrap();
        assert!(received.contains("\"type\":\"push\""));
    }

    #[test]
    fn test_missing_socket_is_an_error() {
        let dir = tempdir().unwrap();
        let result = send_event(&dir.path().join("absent.sock"), &WorkerEvent::Install);
        assert!(result.is_err());
    }
}
