//! WebSocket connections upgraded by axum.

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};

use super::{Connection, ConnectionError, FrameSink, FrameSource};

/// An upgraded WebSocket ready to be handed to the relay.
pub struct WsConnection {
    socket: WebSocket,
}

impl WsConnection {
    pub const fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

impl Connection for WsConnection {
    type Source = WsSource;
    type Sink = WsSink;

    fn split(self) -> (WsSource, WsSink) {
        let (sink, stream) = self.socket.split();
        (
            WsSource { stream },
            WsSink {
                sink,
                closed: false,
            },
        )
    }
}

pub struct WsSource {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn read(&mut self) -> Result<Option<Bytes>, ConnectionError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(Bytes::from(text))),
                Some(Ok(Message::Binary(data))) => return Ok(Some(data)),
                // Pings are answered by the protocol layer.
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Err(e)) => return Err(ConnectionError::Transport(e.to_string())),
            }
        }
    }
}

pub struct WsSink {
    sink: SplitSink<WebSocket, Message>,
    closed: bool,
}

/// Text frame when the payload is UTF-8, binary otherwise.
fn to_message(payload: Bytes) -> Message {
    match Utf8Bytes::try_from(payload.clone()) {
        Ok(text) => Message::Text(text),
        Err(_) => Message::Binary(payload),
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn write(&mut self, payload: Bytes) -> Result<(), ConnectionError> {
        if self.closed {
            return Err(ConnectionError::Closed);
        }
        self.sink
            .send(to_message(payload))
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let frame = CloseFrame {
            code: close_code::NORMAL,
            reason: Utf8Bytes::from_static(""),
        };
        // The peer may already be gone; a failed close frame still ends the sink.
        let sent = self.sink.send(Message::Close(Some(frame))).await;
        self.sink
            .close()
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;
        sent.map_err(|e| ConnectionError::Transport(e.to_string()))
    }
}
