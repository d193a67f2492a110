//! Duplex byte-stream adapters
//!
//! A [`ChannelSession`](crate::session::ChannelSession) only needs three
//! capabilities from the physical channel: read a chunk, write bytes, close.
//! Everything that can provide them (TCP sockets, WebSockets, in-memory
//! pipes) is wrapped into a [`Transport`] here.

use std::fmt;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::TransportError;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Read half of a channel
#[async_trait]
pub trait TransportReader: Send {
    /// Next chunk of bytes; `None` on clean end of stream
    async fn read_chunk(&mut self) -> Result<Option<Bytes>, TransportError>;
}

/// Write half of a channel
#[async_trait]
pub trait TransportWriter: Send {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// A physical channel split into its read and write halves
pub struct Transport {
    reader: Box<dyn TransportReader>,
    writer: Box<dyn TransportWriter>,
    remote_addr: String,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}

impl Transport {
    pub fn new(
        reader: Box<dyn TransportReader>,
        writer: Box<dyn TransportWriter>,
        remote_addr: impl Into<String>,
    ) -> Self {
        Self {
            reader,
            writer,
            remote_addr: remote_addr.into(),
        }
    }

    /// Wrap any async reader/writer pair
    pub fn from_io<R, W>(reader: R, writer: W, remote_addr: impl Into<String>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::new(
            Box::new(IoReader::new(reader)),
            Box::new(IoWriter { inner: writer }),
            remote_addr,
        )
    }

    pub fn from_tcp(stream: TcpStream) -> Self {
        let remote_addr = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let (reader, writer) = stream.into_split();
        Self::from_io(reader, writer, remote_addr)
    }

    pub async fn connect_tcp(addr: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", addr, e)))?;
        stream.set_nodelay(true)?;
        Ok(Self::from_tcp(stream))
    }

    pub async fn connect_websocket(url: &str) -> Result<Self, TransportError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", url, e)))?;
        let (sink, stream) = stream.split();
        Ok(Self::new(
            Box::new(WsReader { inner: stream }),
            Box::new(WsWriter { inner: sink }),
            url,
        ))
    }

    /// Two in-memory transports connected back to back
    pub fn memory_pair(capacity: usize) -> (Self, Self) {
        let (left, right) = tokio::io::duplex(capacity);
        let (left_read, left_write) = tokio::io::split(left);
        let (right_read, right_write) = tokio::io::split(right);
        (
            Self::from_io(left_read, left_write, "memory:left"),
            Self::from_io(right_read, right_write, "memory:right"),
        )
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub fn into_parts(
        self,
    ) -> (
        Box<dyn TransportReader>,
        Box<dyn TransportWriter>,
        String,
    ) {
        (self.reader, self.writer, self.remote_addr)
    }
}

/// Make a message-oriented payload look like one terminated line
pub fn line_bytes(data: &[u8]) -> Bytes {
    if data.ends_with(b"\n") {
        return Bytes::copy_from_slice(data);
    }
    let mut buf = BytesMut::with_capacity(data.len() + 1);
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"\n");
    buf.freeze()
}

// ============================================================================
// AsyncRead / AsyncWrite
// ============================================================================

struct IoReader<R> {
    inner: R,
    buf: BytesMut,
}

impl<R> IoReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> TransportReader for IoReader<R> {
    async fn read_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        self.buf.reserve(READ_CHUNK_SIZE);
        let n = self.inner.read_buf(&mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(self.buf.split().freeze()))
    }
}

struct IoWriter<W> {
    inner: W,
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> TransportWriter for IoWriter<W> {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.inner.write_all(data).await?;
        self.inner.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

// ============================================================================
// WebSocket client
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct WsReader {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl TransportReader for WsReader {
    async fn read_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            match self.inner.next().await {
                None => return Ok(None),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(line_bytes(text.as_str().as_bytes())))
                }
                Some(Ok(Message::Binary(data))) => return Ok(Some(line_bytes(&data))),
                Some(Ok(Message::Close(_))) => return Ok(None),
                // Ping/pong are answered by tungstenite itself
                Some(Ok(_)) => continue,
            }
        }
    }
}

struct WsWriter {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait]
impl TransportWriter for WsWriter {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let text = String::from_utf8_lossy(data).into_owned();
        self.inner.send(Message::text(text)).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner.close().await?;
        Ok(())
    }
}
