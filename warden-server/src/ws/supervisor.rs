//! Session supervisor: bridges one WebSocket and one sandbox terminal
//!
//! PTY reads and writes block, so each direction gets a dedicated thread that
//! talks to the async side over a channel. Output goes to the client as binary
//! frames; broker notices go out as text frames.

use std::io::{Read, Write};

use axum::extract::ws::Message;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use warden_core::frame::{self, Frame};
use warden_core::{Broker, PtyResizer, SessionId, SessionIo, SessionSignal};

use super::gateway::{WsSink, WsStream, send_notice};
use super::notice;

/// Cap on input buffered before the shell is running
pub(crate) const MAX_PENDING_INPUT: usize = 64 * 1024;

/// Output chunks in flight between the reader thread and the socket
const OUTPUT_BUFFER: usize = 64;

/// Input and geometry received before the shell was running
#[derive(Debug, Default)]
pub(crate) struct Pending {
    pub(crate) size: Option<(u16, u16)>,
    pub(crate) input: Vec<u8>,
}

impl Pending {
    pub(crate) fn push(&mut self, id: SessionId, data: &[u8]) {
        let input = match frame::classify(data) {
            Frame::Resize {
                cols,
                rows,
                remainder,
            } => {
                self.size = Some((cols, rows));
                remainder
            }
            Frame::Input(input) => input,
        };
        if self.input.len() + input.len() > MAX_PENDING_INPUT {
            debug!(session_id = %id, bytes = input.len(), "Dropping input received before start");
            return;
        }
        self.input.extend_from_slice(input);
    }
}

/// Why the bridge stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    ClientGone,
    ProcessEnded,
    SessionClosed,
}

/// Pump bytes both ways until the client leaves, the shell exits or the
/// broker closes the session.
pub(crate) async fn run(
    sink: &mut WsSink,
    stream: &mut WsStream,
    session: SessionIo,
    pending: Pending,
    signals: &mut mpsc::UnboundedReceiver<SessionSignal>,
    id: SessionId,
    broker: &Broker,
) {
    let SessionIo { io, activity } = session;
    let resizer = io.resizer;

    let (output_tx, mut output) = mpsc::channel(OUTPUT_BUFFER);
    let (input, input_rx) = mpsc::unbounded_channel();
    if let Err(e) = spawn_reader(id, io.reader, output_tx) {
        warn!(session_id = %id, "Failed to start terminal reader: {}", e);
        broker.process_exited(id);
        return;
    }
    if let Err(e) = spawn_writer(id, io.writer, input_rx) {
        warn!(session_id = %id, "Failed to start terminal writer: {}", e);
        broker.process_exited(id);
        return;
    }

    if let Some((cols, rows)) = pending.size {
        apply_resize(id, &resizer, cols, rows);
    }
    if !pending.input.is_empty() {
        let _ = input.send(pending.input);
    }

    // Client frames are polled ahead of output; a flooding shell must not
    // starve keystrokes or activity tracking.
    let end = loop {
        tokio::select! {
            biased;

            signal = signals.recv() => match signal {
                Some(SessionSignal::IdleTimeout(after)) => {
                    let _ = send_notice(sink, &notice::idle(after)).await;
                }
                Some(SessionSignal::Shutdown) => {
                    let _ = send_notice(sink, notice::SHUTTING_DOWN).await;
                }
                Some(other) => debug!(session_id = %id, ?other, "Ignoring signal for running session"),
                None => break End::SessionClosed,
            },

            msg = stream.next() => {
                let data = match msg {
                    Some(Ok(Message::Text(text))) => text.into_bytes(),
                    Some(Ok(Message::Binary(data))) => data,
                    Some(Ok(Message::Close(_))) | None => break End::ClientGone,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!(session_id = %id, "WebSocket error: {}", e);
                        break End::ClientGone;
                    }
                };
                activity.touch();
                match frame::classify(&data) {
                    Frame::Resize { cols, rows, remainder } => {
                        apply_resize(id, &resizer, cols, rows);
                        if !remainder.is_empty() {
                            let _ = input.send(remainder.to_vec());
                        }
                    }
                    Frame::Input(bytes) => {
                        let _ = input.send(bytes.to_vec());
                    }
                }
            },

            chunk = output.recv() => match chunk {
                Some(bytes) => {
                    if sink.send(Message::Binary(bytes)).await.is_err() {
                        break End::ClientGone;
                    }
                }
                None => break End::ProcessEnded,
            },
        }
    };

    debug!(session_id = %id, ?end, "Terminal bridge stopped");
    if end == End::ProcessEnded {
        broker.process_exited(id);
    }
}

fn apply_resize(id: SessionId, resizer: &PtyResizer, cols: u16, rows: u16) {
    match resizer.resize(cols, rows) {
        Ok(()) => debug!(session_id = %id, cols, rows, "Resized terminal"),
        Err(e) => warn!(session_id = %id, "Resize failed: {}", e),
    }
}

fn spawn_reader(
    id: SessionId,
    mut reader: Box<dyn Read + Send>,
    tx: mpsc::Sender<Vec<u8>>,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name(format!("pty-reader-{}", id.short()))
        .spawn(move || {
            let mut buffer = [0u8; 8192];
            loop {
                match reader.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.blocking_send(buffer[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        // EIO once the process side of the PTY closes
                        debug!(session_id = %id, "Terminal read ended: {}", e);
                        break;
                    }
                }
            }
        })
        .map(|_| ())
}

fn spawn_writer(
    id: SessionId,
    mut writer: Box<dyn Write + Send>,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name(format!("pty-writer-{}", id.short()))
        .spawn(move || {
            while let Some(bytes) = rx.blocking_recv() {
                if let Err(e) = writer.write_all(&bytes).and_then(|()| writer.flush()) {
                    debug!(session_id = %id, "Terminal write failed: {}", e);
                    break;
                }
            }
        })
        .map(|_| ())
}
