// WebSocket transport
// Frames exchanged with the chat server and the connector that opens them

use super::SocketError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Sink, SinkExt, StreamExt};
use std::pin::Pin;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// Close code sent on a deliberate shutdown; a close carrying it is never retried
pub const NORMAL_CLOSURE: u16 = 1000;

/// Transport-neutral WebSocket frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close(Option<u16>),
    /// Binary, ping and pong frames; ignored by the chat protocol
    Other,
}

impl Frame {
    fn into_message(self) -> Message {
        match self {
            Frame::Text(text) => Message::Text(text),
            Frame::Close(code) => Message::Close(code.map(|code| CloseFrame {
                code: CloseCode::from(code),
                reason: "".into(),
            })),
            Frame::Other => Message::Ping(Vec::new()),
        }
    }

    fn from_message(message: Message) -> Self {
        match message {
            Message::Text(text) => Frame::Text(text),
            Message::Close(frame) => Frame::Close(frame.map(|frame| u16::from(frame.code))),
            _ => Frame::Other,
        }
    }
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = SocketError> + Send>>;
pub type FrameStream = BoxStream<'static, Result<Frame, SocketError>>;

/// An open connection split into its write and read halves
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens connections to the chat server
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Transport, SocketError>;
}

/// Production connector backed by tokio-tungstenite
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Transport, SocketError> {
        let (ws_stream, response) = connect_async(url).await?;
        debug!(status = %response.status(), "WebSocket handshake complete");

        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(SocketError::from)
            .with(|frame: Frame| futures::future::ready(Ok::<_, SocketError>(frame.into_message())));
        let stream = read.map(|message| message.map(Frame::from_message).map_err(SocketError::from));

        Ok(Transport {
            sink: Box::pin(sink),
            stream: stream.boxed(),
        })
    }
}
