//! WebSocket channels
//!
//! Each text or binary WebSocket message carries one or more newline
//! terminated frames, exactly like the TCP stream does.

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::Response,
};
use bytes::Bytes;
use cmdbridge_common::transport::{line_bytes, TransportReader, TransportWriter};
use cmdbridge_common::{Transport, TransportError};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;

use crate::api::channel::serve_channel;
use crate::AppState;

/// Upgrade into a channel session
pub async fn channel_websocket(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| serve_channel(state, websocket_transport(socket, addr)))
}

fn websocket_transport(socket: WebSocket, addr: SocketAddr) -> Transport {
    let (sink, stream) = socket.split();
    Transport::new(
        Box::new(AxumWsReader { inner: stream }),
        Box::new(AxumWsWriter { inner: sink }),
        format!("ws://{}", addr),
    )
}

struct AxumWsReader {
    inner: SplitStream<WebSocket>,
}

#[async_trait]
impl TransportReader for AxumWsReader {
    async fn read_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            match self.inner.next().await {
                None | Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Err(e)) => return Err(TransportError::WebSocket(e.to_string())),
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(line_bytes(text.as_str().as_bytes())))
                }
                Some(Ok(Message::Binary(data))) => return Ok(Some(line_bytes(&data))),
                // Ping/pong are handled by axum
                Some(Ok(_)) => continue,
            }
        }
    }
}

struct AxumWsWriter {
    inner: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl TransportWriter for AxumWsWriter {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let text = String::from_utf8_lossy(data).into_owned();
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner
            .close()
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))
    }
}
