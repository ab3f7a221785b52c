//! Terminal connection gateway
//!
//! Admits each WebSocket through the broker, reports queue progress while the
//! session waits, then hands the socket to the supervisor once the sandbox is
//! up. Whatever happens, the broker hears about the connection closing.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};
use warden_core::{AdmissionOutcome, SessionIo, SessionSignal, SessionTicket};

use super::notice;
use super::supervisor::{self, Pending};
use crate::AppState;

pub(crate) type WsSink = SplitSink<WebSocket, Message>;
pub(crate) type WsStream = SplitStream<WebSocket>;

/// Query parameters accepted on `/ws`
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Opaque identity label, stored and logged only
    pub label: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<ConnectParams>,
) -> impl IntoResponse {
    let client = client_address(&headers, peer, state.trust_forwarded_for);
    ws.on_upgrade(move |socket| handle_socket(socket, state, client, params.label))
}

/// Resolve the address the quota is charged to
pub fn client_address(headers: &HeaderMap, peer: SocketAddr, trust_forwarded_for: bool) -> IpAddr {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok());
        if let Some(address) = forwarded {
            return address;
        }
    }
    peer.ip()
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, client: IpAddr, label: Option<String>) {
    let (mut sink, mut stream) = socket.split();

    info!(%client, label = label.as_deref().unwrap_or(""), "Terminal client connected");

    let mut ticket = match state.broker.admit(client, label).await {
        Ok(ticket) => ticket,
        Err(e) => {
            info!(%client, "Refused terminal client: {}", e);
            let _ = send_notice(&mut sink, &notice::rejected(&e)).await;
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };
    let id = ticket.id;

    if let AdmissionOutcome::Queued { position } = ticket.outcome {
        let _ = send_notice(&mut sink, &notice::queue_position(position)).await;
    }

    match wait_for_start(&mut sink, &mut stream, &mut ticket).await {
        Some((session, pending)) => {
            supervisor::run(
                &mut sink,
                &mut stream,
                session,
                pending,
                &mut ticket.signals,
                id,
                &state.broker,
            )
            .await;
        }
        None => debug!(session_id = %id, "Session ended before the shell started"),
    }

    state.broker.client_closed(id);
    let _ = sink.send(Message::Close(None)).await;
    info!(session_id = %id, %client, "Terminal client disconnected");
}

/// Relay queue and failure notices until the sandbox starts. Returns `None`
/// if the client left or the session ended first.
async fn wait_for_start(
    sink: &mut WsSink,
    stream: &mut WsStream,
    ticket: &mut SessionTicket,
) -> Option<(SessionIo, Pending)> {
    let id = ticket.id;
    let mut pending = Pending::default();

    loop {
        tokio::select! {
            signal = ticket.signals.recv() => match signal? {
                SessionSignal::Started(session) => return Some((session, pending)),
                SessionSignal::Queued { position } => {
                    send_notice(sink, &notice::queue_position(position)).await.ok()?;
                }
                SessionSignal::SpawnFailed(reason) => {
                    send_notice(sink, &notice::failed(&reason)).await.ok()?;
                }
                SessionSignal::IdleTimeout(after) => {
                    send_notice(sink, &notice::idle(after)).await.ok()?;
                }
                SessionSignal::Shutdown => {
                    send_notice(sink, notice::SHUTTING_DOWN).await.ok()?;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => pending.push(id, text.as_bytes()),
                Some(Ok(Message::Binary(data))) => pending.push(id, &data),
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(session_id = %id, "WebSocket error while waiting: {}", e);
                    return None;
                }
            },
        }
    }
}

pub(crate) async fn send_notice(sink: &mut WsSink, text: &str) -> Result<(), axum::Error> {
    sink.send(Message::Text(text.to_string())).await
}
