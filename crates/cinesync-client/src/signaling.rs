use cinesync_common::{ClientMessage, Error, Result, ServerMessage};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Websocket link to the sync server. One JSON object per text frame.
pub struct SignalingClient {
    ws: Ws,
}

impl SignalingClient {
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::transport(format!("connect {}: {}", url, e)))?;
        Ok(Self { ws: ws_stream })
    }

    pub fn split(self) -> (SignalSender, SignalReceiver) {
        let (sink, stream) = self.ws.split();
        (SignalSender { sink }, SignalReceiver { stream })
    }
}

pub struct SignalSender {
    sink: SplitSink<Ws, Message>,
}

impl SignalSender {
    pub async fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        let text = serde_json::to_string(msg)?;
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(Error::transport)
    }

    pub async fn close(&mut self) {
        if let Err(e) = self.sink.close().await {
            debug!("signaling close: {}", e);
        }
    }
}

pub struct SignalReceiver {
    stream: SplitStream<Ws>,
}

impl SignalReceiver {
    /// Next decodable server message. Malformed frames are logged and skipped.
    pub async fn recv(&mut self) -> Result<ServerMessage> {
        while let Some(msg) = self.stream.next().await {
            let msg = msg.map_err(Error::transport)?;
            match msg {
                Message::Text(text) => match decode_server_message(text.as_str()) {
                    Ok(signal) => return Ok(signal),
                    Err(e) => warn!("dropping malformed server message: {}", e),
                },
                Message::Close(frame) => {
                    debug!("server closed signaling: {:?}", frame);
                    break;
                }
                _ => {}
            }
        }
        Err(Error::transport("signaling connection closed"))
    }
}

pub fn decode_server_message(text: &str) -> Result<ServerMessage> {
    serde_json::from_str(text).map_err(|e| Error::protocol(format!("{}: {}", e, text)))
}
