//! Streaming transport abstraction.
//!
//! A [`StreamConnector`] opens one bidirectional message connection and
//! hands back its two halves: a [`StreamSender`] kept by the session for
//! outbound control messages, and a [`StreamReceiver`] owned by the
//! receive loop. [`WebSocketConnector`] is the production implementation.

use futures_util::future::BoxFuture;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::{AppError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One inbound data message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// UTF-8 text message.
    Text(String),
    /// Binary message; decoded as UTF-8 JSON when possible.
    Binary(Vec<u8>),
}

/// Outbound half of a streaming connection.
pub trait StreamSender: Send {
    /// Send one text message.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Streaming`] when the transport rejects the write.
    fn send_text(&mut self, text: String) -> BoxFuture<'_, Result<()>>;

    /// Close the connection from our side.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Streaming`] when the close handshake cannot be sent.
    fn close(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// Inbound half of a streaming connection.
pub trait StreamReceiver: Send {
    /// Wait for the next data message.
    ///
    /// `None` means the peer closed the connection; `Some(Err(_))` is any
    /// other transport failure. Both end the receive loop.
    fn next_frame(&mut self) -> BoxFuture<'_, Option<Result<InboundFrame>>>;
}

/// Both halves of a freshly opened connection.
pub struct StreamParts {
    /// Outbound half.
    pub sender: Box<dyn StreamSender>,
    /// Inbound half.
    pub receiver: Box<dyn StreamReceiver>,
}

/// Opens streaming connections.
pub trait StreamConnector: Send + Sync {
    /// Connect to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Streaming`] when the connection cannot be opened.
    fn connect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<StreamParts>>;
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl StreamConnector for WebSocketConnector {
    fn connect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<StreamParts>> {
        Box::pin(async move {
            let (stream, response) = tokio_tungstenite::connect_async(url).await?;
            debug!(url, status = response.status().as_u16(), "websocket handshake complete");

            let (sink, source) = stream.split();
            Ok(StreamParts {
                sender: Box::new(WebSocketSender { sink }),
                receiver: Box::new(WebSocketReceiver { source }),
            })
        })
    }
}

struct WebSocketSender {
    sink: SplitSink<WsStream, Message>,
}

impl StreamSender for WebSocketSender {
    fn send_text(&mut self, text: String) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.sink
                .send(Message::Text(text.into()))
                .await
                .map_err(AppError::from)
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            match self.sink.close().await {
                Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
                Err(err) => Err(err.into()),
            }
        })
    }
}

struct WebSocketReceiver {
    source: SplitStream<WsStream>,
}

impl StreamReceiver for WebSocketReceiver {
    fn next_frame(&mut self) -> BoxFuture<'_, Option<Result<InboundFrame>>> {
        Box::pin(async move {
            loop {
                match self.source.next().await? {
                    Ok(Message::Text(text)) => return Some(Ok(InboundFrame::Text(text.to_string()))),
                    Ok(Message::Binary(bytes)) => return Some(Ok(InboundFrame::Binary(bytes.to_vec()))),
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "websocket close frame received");
                        return None;
                    }
                    // Control frames are answered by tungstenite itself.
                    Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                    Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                        return None;
                    }
                    Err(err) => return Some(Err(err.into())),
                }
            }
        })
    }
}
