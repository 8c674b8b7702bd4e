use super::{Connector, TransportSink, TransportStream};
use crate::constants::{KEEPALIVE_HEADER, PROTO_VERSION_HEADER};
use crate::error::{AsrError, Result};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connector presenting the input-method client's headers.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    user_agent: String,
}

impl WebSocketConnector {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }
}

fn connect_error(url: &str, message: impl ToString) -> AsrError {
    AsrError::Connect {
        url: url.to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn TransportSink>, Box<dyn TransportStream>)> {
        let mut request = url
            .into_client_request()
            .map_err(|e| connect_error(url, e))?;

        let headers = request.headers_mut();
        headers.insert(
            "User-Agent",
            HeaderValue::from_str(&self.user_agent).map_err(|e| connect_error(url, e))?,
        );
        headers.insert(
            PROTO_VERSION_HEADER.0,
            HeaderValue::from_static(PROTO_VERSION_HEADER.1),
        );
        headers.insert(
            KEEPALIVE_HEADER.0,
            HeaderValue::from_static(KEEPALIVE_HEADER.1),
        );

        info!("Connecting to {}", url);
        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| connect_error(url, e))?;
        info!("Connected");

        let (write, read) = stream.split();
        Ok((
            Box::new(WebSocketSink { write }),
            Box::new(WebSocketSource { read }),
        ))
    }
}

struct WebSocketSink {
    write: SplitSink<WsStream, Message>,
}

#[async_trait]
impl TransportSink for WebSocketSink {
    async fn send(&mut self, data: Vec<u8>) -> Result<()> {
        self.write
            .send(Message::Binary(data))
            .await
            .map_err(|e| AsrError::transport(format!("send failed: {}", e)))
    }

    async fn close(&mut self) -> Result<()> {
        self.write
            .close()
            .await
            .map_err(|e| AsrError::transport(format!("close failed: {}", e)))
    }
}

struct WebSocketSource {
    read: SplitStream<WsStream>,
}

#[async_trait]
impl TransportStream for WebSocketSource {
    async fn recv(&mut self) -> Option<Result<Vec<u8>>> {
        loop {
            match self.read.next().await? {
                Ok(Message::Binary(data)) => return Some(Ok(data)),
                Ok(Message::Text(text)) => return Some(Ok(text.into_bytes())),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {
                    continue
                }
                Ok(Message::Close(frame)) => {
                    debug!("Server closed connection: {:?}", frame);
                    return None;
                }
                Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => return None,
                Err(e) => return Some(Err(AsrError::transport(format!("receive failed: {}", e)))),
            }
        }
    }
}
