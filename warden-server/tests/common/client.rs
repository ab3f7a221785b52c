//! WebSocket test client for terminal sessions
//!
//! Note: Some methods may appear unused because they're only used in specific
//! test files and clippy checks each test independently.

use std::net::SocketAddr;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// One frame as seen by the terminal client
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Broker notice
    Notice(String),
    /// Terminal output
    Output(Vec<u8>),
    /// Server closed the connection
    Closed,
}

/// Terminal session over a WebSocket
pub struct TerminalClient {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
}

impl TerminalClient {
    /// Connect to `/ws` with no label
    #[allow(dead_code)]
    pub async fn connect(addr: SocketAddr) -> Self {
        Self::connect_with(addr, None, None).await
    }

    /// Connect with an optional label and `X-Forwarded-For` header
    pub async fn connect_with(
        addr: SocketAddr,
        label: Option<&str>,
        forwarded_for: Option<&str>,
    ) -> Self {
        let url = match label {
            Some(label) => format!("ws://{}/ws?label={}", addr, label),
            None => format!("ws://{}/ws", addr),
        };
        let mut request = url.into_client_request().unwrap();
        if let Some(address) = forwarded_for {
            request
                .headers_mut()
                .insert("x-forwarded-for", HeaderValue::from_str(address).unwrap());
        }

        let (ws, _) = tokio_tungstenite::connect_async(request)
            .await
            .expect("Failed to connect");
        let (sink, stream) = ws.split();
        Self { sink, stream }
    }

    /// Send terminal input as a text frame
    pub async fn send_text(&mut self, text: &str) {
        self.sink
            .send(Message::Text(text.to_string().into()))
            .await
            .unwrap();
    }

    /// Send terminal input as a binary frame
    #[allow(dead_code)]
    pub async fn send_binary(&mut self, data: &[u8]) {
        self.sink
            .send(Message::Binary(data.to_vec().into()))
            .await
            .unwrap();
    }

    /// Close from the client side
    #[allow(dead_code)]
    pub async fn close(mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
        let _ = self.sink.close().await;
    }

    /// Next text, binary or close frame
    pub async fn recv(&mut self) -> Frame {
        tokio::time::timeout(DEFAULT_TIMEOUT, async {
            loop {
                match self.stream.next().await {
                    Some(Ok(Message::Text(text))) => return Frame::Notice(text.to_string()),
                    Some(Ok(Message::Binary(data))) => return Frame::Output(data.to_vec()),
                    Some(Ok(Message::Close(_))) | None => return Frame::Closed,
                    Some(Ok(_)) => continue,
                    // Abrupt close after the notice
                    Some(Err(_)) => return Frame::Closed,
                }
            }
        })
        .await
        .expect("Timed out waiting for a frame")
    }

    /// Skip output until a notice arrives
    pub async fn expect_notice(&mut self) -> String {
        loop {
            match self.recv().await {
                Frame::Notice(text) => return text,
                Frame::Output(_) => continue,
                Frame::Closed => panic!("Connection closed while waiting for a notice"),
            }
        }
    }

    /// Collect output until it contains `needle`; returns everything read
    #[allow(dead_code)]
    pub async fn expect_output(&mut self, needle: &str) -> String {
        let mut seen = Vec::new();
        loop {
            match self.recv().await {
                Frame::Output(data) => {
                    seen.extend_from_slice(&data);
                    let text = String::from_utf8_lossy(&seen).to_string();
                    if text.contains(needle) {
                        return text;
                    }
                }
                Frame::Notice(text) => panic!("Unexpected notice {:?} waiting for output", text),
                Frame::Closed => panic!(
                    "Connection closed waiting for {:?}, got {:?}",
                    needle,
                    String::from_utf8_lossy(&seen)
                ),
            }
        }
    }

    /// Read output until `needle` shows up, keeping only a short tail in
    /// memory (for shells that flood the terminal)
    #[allow(dead_code)]
    pub async fn wait_for_output(&mut self, needle: &str) {
        let mut tail: Vec<u8> = Vec::new();
        loop {
            match self.recv().await {
                Frame::Output(data) => {
                    tail.extend_from_slice(&data);
                    if String::from_utf8_lossy(&tail).contains(needle) {
                        return;
                    }
                    let keep = needle.len().min(tail.len());
                    tail.drain(..tail.len() - keep);
                }
                Frame::Notice(text) => panic!("Unexpected notice {:?} waiting for output", text),
                Frame::Closed => panic!("Connection closed waiting for {:?}", needle),
            }
        }
    }

    /// Discard output for `duration`; returns the first notice or close seen
    #[allow(dead_code)]
    pub async fn drain_output_for(&mut self, duration: Duration) -> Option<Frame> {
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            match tokio::time::timeout_at(deadline, self.stream.next()).await {
                Err(_) => return None,
                Ok(Some(Ok(Message::Binary(_)))) => continue,
                Ok(Some(Ok(Message::Text(text)))) => return Some(Frame::Notice(text.to_string())),
                Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) => {
                    return Some(Frame::Closed);
                }
                Ok(Some(Ok(_))) => continue,
            }
        }
    }

    /// Drain frames until the server closes the connection
    #[allow(dead_code)]
    pub async fn expect_closed(&mut self) {
        while self.recv().await != Frame::Closed {}
    }

    /// Assert no frame arrives within `duration`
    #[allow(dead_code)]
    pub async fn expect_silence(&mut self, duration: Duration) {
        let next = tokio::time::timeout(duration, self.stream.next()).await;
        assert!(next.is_err(), "Expected no frame but received {:?}", next);
    }
}
