//! Duplex session transport
//!
//! Owns the WebSocket connection to the live-session service. Outbound
//! traffic (capture frames, tool responses) is written by a writer task fed
//! from an mpsc channel; inbound frames are parsed by a reader task and
//! fanned out as [`ServerEvent`]s. The session event loop never touches the
//! socket directly.

mod protocol;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::codec::CAPTURE_SAMPLE_RATE;
use crate::config::EngineConfig;
use crate::state::GroundingSource;
use crate::tools::{ToolCall, ToolResponse};
use crate::{Error, Result};

use protocol::{ClientMessage, ServerMessage};

/// Outbound traffic accepted by the writer task
#[derive(Debug)]
pub enum ClientEvent {
    /// One encoded PCM capture frame
    Audio(Vec<u8>),
    /// A completed tool invocation, correlated by call id
    ToolResponse(ToolResponse),
}

/// Inbound traffic produced by the reader task
#[derive(Debug)]
pub enum ServerEvent {
    /// Decoded PCM bytes of one synthesized audio chunk
    Audio(Vec<u8>),
    /// Web sources cited by the current response
    Grounding(Vec<GroundingSource>),
    /// A batch of function invocations to dispatch locally
    ToolCalls(Vec<ToolCall>),
    /// The remote side closed the connection cleanly
    Closed,
    /// The connection failed
    Fault(String),
}

/// Queue depth for both directions; audio frames are small and frequent
const CHANNEL_CAPACITY: usize = 64;

/// An open WebSocket session with its reader and writer tasks
pub struct SessionTransport {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl SessionTransport {
    /// Connect, send the session setup message, and spawn the pump tasks
    ///
    /// Returns the transport handle plus the outbound sender and inbound
    /// receiver. Dropping the sender makes the writer task close the socket.
    ///
    /// # Errors
    ///
    /// Returns `Error::TransportOpen` if the WebSocket handshake fails, or
    /// `Error::Config` if the endpoint URL is invalid.
    pub async fn open(
        config: &EngineConfig,
        tools: Vec<Value>,
    ) -> Result<(Self, mpsc::Sender<ClientEvent>, mpsc::Receiver<ServerEvent>)> {
        let url = config.session_url()?;
        let (mut socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| Error::TransportOpen(e.to_string()))?;
        tracing::debug!(endpoint = %config.endpoint, "websocket open");

        let setup = serde_json::to_string(&ClientMessage::setup(config, tools))?;
        socket
            .send(Message::Text(setup.into()))
            .await
            .map_err(|e| Error::TransportOpen(e.to_string()))?;

        let (sink, stream) = socket.split();
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let writer = tokio::spawn(write_loop(sink, outbound_rx));
        let reader = tokio::spawn(read_loop(stream, inbound_tx));

        Ok((Self { reader, writer }, outbound_tx, inbound_rx))
    }

    /// Tear down the pump tasks; the socket is dropped with them
    pub fn close(self) {
        self.reader.abort();
        self.writer.abort();
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SocketSink = futures_util::stream::SplitSink<Socket, Message>;
type SocketStream = futures_util::stream::SplitStream<Socket>;

/// Drain the outbound channel into the socket, then close it
async fn write_loop(mut sink: SocketSink, mut outbound: mpsc::Receiver<ClientEvent>) {
    while let Some(event) = outbound.recv().await {
        let message = match event {
            ClientEvent::Audio(pcm) => {
                ClientMessage::audio_frame(BASE64.encode(pcm), CAPTURE_SAMPLE_RATE)
            }
            ClientEvent::ToolResponse(response) => {
                ClientMessage::tool_response(response.id, response.name, response.result)
            }
        };
        let Ok(json) = serde_json::to_string(&message) else {
            continue;
        };
        if let Err(e) = sink.send(Message::Text(json.into())).await {
            tracing::warn!(error = %e, "outbound send failed");
            break;
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}

/// Parse inbound frames and fan them out as server events
async fn read_loop(mut stream: SocketStream, inbound: mpsc::Sender<ServerEvent>) {
    while let Some(frame) = stream.next().await {
        let payload = match frame {
            Ok(Message::Text(text)) => text.as_str().as_bytes().to_vec(),
            // The service delivers JSON in binary frames as well
            Ok(Message::Binary(bytes)) => bytes.to_vec(),
            Ok(Message::Close(_)) => {
                let _ = inbound.send(ServerEvent::Closed).await;
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                let _ = inbound.send(ServerEvent::Fault(e.to_string())).await;
                return;
            }
        };

        let message: ServerMessage = match serde_json::from_slice(&payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable server frame");
                continue;
            }
        };

        for event in parse_events(message) {
            if inbound.send(event).await.is_err() {
                return;
            }
        }
    }
    // Stream ended without a close frame
    let _ = inbound.send(ServerEvent::Closed).await;
}

/// Fan one server message out into zero or more events
fn parse_events(message: ServerMessage) -> Vec<ServerEvent> {
    let mut events = Vec::new();

    if message.setup_complete.is_some() {
        tracing::debug!("session setup complete");
    }

    if let Some(content) = message.server_content {
        if let Some(turn) = content.model_turn {
            for part in turn.parts {
                let Some(inline) = part.inline_data else {
                    continue;
                };
                match BASE64.decode(inline.data.as_bytes()) {
                    Ok(pcm) if !pcm.is_empty() => events.push(ServerEvent::Audio(pcm)),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "undecodable audio chunk"),
                }
            }
        }

        if let Some(grounding) = content.grounding_metadata {
            let sources: Vec<GroundingSource> = grounding
                .grounding_chunks
                .into_iter()
                .filter_map(|chunk| chunk.web)
                .map(|web| GroundingSource {
                    title: web.title.unwrap_or_else(|| web.uri.clone()),
                    uri: web.uri,
                })
                .collect();
            if !sources.is_empty() {
                events.push(ServerEvent::Grounding(sources));
            }
        }
    }

    if let Some(tool_call) = message.tool_call {
        let calls: Vec<ToolCall> = tool_call
            .function_calls
            .into_iter()
            .map(|call| ToolCall {
                id: call.id.unwrap_or_default(),
                name: call.name,
                args: call.args,
            })
            .collect();
        if !calls.is_empty() {
            events.push(ServerEvent::ToolCalls(calls));
        }
    }

    events
}
