//! Transport du canal live.
//!
//! Le driver ne connaît que le trait [`Transport`] : une connexion réussie
//! produit un flux de trames texte, qui se termine (ou produit une erreur) à
//! la fermeture. Abandonner le flux ferme la connexion sous-jacente.

use crate::error::TransportError;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// Flux des trames texte d'une connexion ouverte
pub type FrameStream = BoxStream<'static, Result<String, TransportError>>;

pub trait Transport: Send + Sync + 'static {
    /// Ouvre la souscription live d'une machine ; Ok = handshake terminé
    fn connect(&self, machine_id: &str) -> BoxFuture<'static, Result<FrameStream, TransportError>>;
}

/// Client WebSocket `{base}/ws/machines/{machine_id}`
#[derive(Debug, Clone)]
pub struct WsTransport {
    base_url: String,
}

impl WsTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into().trim_end_matches('/').to_string() }
    }

    pub fn url_for(&self, machine_id: &str) -> String {
        format!("{}/ws/machines/{}", self.base_url, urlencoding::encode(machine_id))
    }
}

impl Transport for WsTransport {
    fn connect(&self, machine_id: &str) -> BoxFuture<'static, Result<FrameStream, TransportError>> {
        let url = self.url_for(machine_id);
        async move {
            let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            debug!("[ws] handshake ok: {url}");

            let frames = socket.filter_map(|msg| async move {
                match msg {
                    Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                    Ok(Message::Binary(bytes)) => Some(
                        String::from_utf8(bytes.to_vec())
                            .map_err(|e| TransportError::Protocol(format!("non utf-8 frame: {e}"))),
                    ),
                    Ok(Message::Close(_)) => Some(Err(TransportError::Closed)),
                    Ok(_) => None,
                    Err(e) => Some(Err(map_ws_error(e))),
                }
            });
            Ok(frames.boxed())
        }
        .boxed()
    }
}

fn map_ws_error(err: tokio_tungstenite::tungstenite::Error) -> TransportError {
    use tokio_tungstenite::tungstenite::Error;
    match err {
        Error::ConnectionClosed | Error::AlreadyClosed => TransportError::Closed,
        Error::Io(e) => TransportError::Io(e.to_string()),
        Error::Protocol(e) => TransportError::Protocol(e.to_string()),
        other => TransportError::Io(other.to_string()),
    }
}
