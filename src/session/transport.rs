// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! WebSocket transport wiring.
//!
//! [`connect`] establishes the connection and spawns the session task; the
//! task owns the socket and the [`SessionCore`] and runs until the
//! connection drops or the handle asks for a close. Reconnecting means
//! calling [`connect`] again for a fresh session.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{error, info, warn};

use crate::config::ClientConfig;
use crate::metrics;
use crate::protocol::codec::encode_client_message;
use crate::protocol::ClientMessage;

use super::{Command, SessionChannels, SessionCore, SessionError, SessionHandle, SessionState, TreeSnapshot};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connect to the server and start a session.
///
/// Returns once the WebSocket handshake has completed; the protocol
/// handshake and the initial wildcard subscription happen asynchronously
/// on the session task. Fails fast if the endpoint is invalid or the
/// connection cannot be established.
pub async fn connect(config: ClientConfig) -> Result<SessionHandle, SessionError> {
    let endpoint = config.endpoint()?;

    let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
    let (snapshot_tx, snapshot_rx) = watch::channel(TreeSnapshot::default());
    let (wildcard_tx, wildcard_rx) = watch::channel(None);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    metrics::record_connection_event("connect");
    info!(%endpoint, "connecting");

    let mut core = SessionCore::new(config.unique, state_tx, snapshot_tx, wildcard_tx, outbound_tx);

    let (socket, _) = match connect_async(endpoint.as_str()).await {
        Ok(connected) => connected,
        Err(e) => {
            error!(%endpoint, error = %e, "connect failed");
            metrics::record_connection_event("connect_failed");
            core.on_close();
            return Err(e.into());
        }
    };

    core.on_open();
    tokio::spawn(run(core, socket, outbound_rx, command_rx));

    Ok(SessionHandle::new(
        command_tx,
        SessionChannels {
            state: state_rx,
            snapshots: snapshot_rx,
            wildcard: wildcard_rx,
        },
    ))
}

/// The session task. Single consumer of all three event sources, so frame
/// handling, outbound sends and command handling never interleave.
async fn run(
    mut core: SessionCore,
    socket: Socket,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Binary(frame))) => core.on_frame(&frame),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => (),
                Some(Ok(Message::Close(_))) | None => {
                    core.on_close();
                    break;
                }
                Some(Ok(other)) => {
                    warn!(kind = %message_kind(&other), "ignoring non-binary frame");
                    metrics::record_dropped_frame("non_binary");
                }
                Some(Err(e)) => {
                    warn!(error = %e, "connection error");
                    core.on_close();
                    break;
                }
            },
            Some(message) = outbound.recv() => {
                let data = match encode_client_message(&message) {
                    Ok(data) => data,
                    Err(e) => {
                        error!(error = %e, "failed to encode outbound message");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Binary(data)).await {
                    warn!(error = %e, "send failed");
                    core.on_close();
                    break;
                }
            },
            command = commands.recv() => match command {
                Some(Command::SetPattern(pattern)) => core.set_pattern(pattern),
                Some(Command::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    core.on_close();
                    break;
                }
            },
        }
    }
}

fn message_kind(message: &Message) -> &'static str {
    match message {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "frame",
    }
}
