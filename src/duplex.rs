//! The duplex connection a route handler owns after a hijack.
//!
//! Framing, masking, fragmentation and ping/pong are the protocol engine's
//! job (`tokio-tungstenite`); this type only exposes message-level send and
//! receive plus an explicit close.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{self, protocol::Role};

pub use tokio_tungstenite::tungstenite::Message;

use crate::error::Error;

/// A bidirectional message stream over a hijacked transport.
///
/// Exclusively owned by the route handler. Call [`close`](Self::close) for a
/// clean shutdown; dropping it closes the transport without a close frame,
/// which the peer observes as an abnormal closure.
///
/// Messages the peer sends before the handler first calls
/// [`recv`](Self::recv) stay buffered in the transport and are delivered in
/// order.
pub struct DuplexConnection<S = TokioIo<Upgraded>> {
    stream: WebSocketStream<S>,
    protocol: Option<String>,
}

impl<S> DuplexConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a transport on which the upgrade handshake already completed.
    pub(crate) async fn from_raw(io: S, protocol: Option<String>) -> Self {
        let stream = WebSocketStream::from_raw_socket(io, Role::Server, None).await;
        Self { stream, protocol }
    }

    /// The subprotocol agreed during the handshake, if any.
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    pub async fn send(&mut self, msg: Message) -> Result<(), Error> {
        self.stream.send(msg).await?;
        Ok(())
    }

    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), Error> {
        self.send(Message::text(text.into())).await
    }

    pub async fn send_binary(&mut self, data: impl Into<Bytes>) -> Result<(), Error> {
        self.send(Message::binary(data.into())).await
    }

    /// Next data message from the peer.
    ///
    /// Control frames are answered by the protocol engine and skipped.
    /// Returns `None` once the peer closed the connection.
    pub async fn recv(&mut self) -> Option<Result<Message, Error>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                // Keep polling so the engine flushes its close reply; the
                // stream ends right after.
                Ok(Message::Close(_)) => continue,
                Ok(msg) => return Some(Ok(msg)),
                Err(tungstenite::Error::ConnectionClosed) => return None,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    /// Sends a normal close frame and flushes it.
    pub async fn close(mut self) -> Result<(), Error> {
        match self.stream.close(None).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
