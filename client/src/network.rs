use futures_util::{SinkExt, StreamExt};
use log::{debug, info};
use reqwest::StatusCode;
use shared::{ClientAction, CreateLobbyResponse, LobbyStatus, ServerEvent};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("server closed the connection")]
    Closed,
}

/// WebSocket endpoint for an `http(s)://host:port` base URL.
pub fn ws_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        format!("ws://{}", base)
    };
    format!("{}/ws", base)
}

/// Stateless lobby endpoints.
#[derive(Debug, Clone)]
pub struct LobbyApi {
    http: reqwest::Client,
    base_url: String,
}

impl LobbyApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn create_lobby(&self) -> Result<String, ClientError> {
        let response: CreateLobbyResponse = self
            .http
            .post(format!("{}/api/lobby/create", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        info!("Created lobby {}", response.lobby_code);
        Ok(response.lobby_code)
    }

    /// `None` when the server does not know the lobby.
    pub async fn lobby_status(&self, code: &str) -> Result<Option<LobbyStatus>, ClientError> {
        let response = self
            .http
            .get(format!("{}/api/lobby/{}", self.base_url, code))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.json().await?))
    }
}

/// One real-time connection to the server.
pub struct Connection {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Connection {
    pub async fn connect(base_url: &str) -> Result<Self, ClientError> {
        let url = ws_url(base_url);
        let (socket, _) = connect_async(url.as_str()).await?;
        debug!("Connected to {}", url);
        Ok(Self { socket })
    }

    pub async fn send(&mut self, action: &ClientAction) -> Result<(), ClientError> {
        let text = serde_json::to_string(action)?;
        debug!("-> {}", action.name());
        self.socket.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Waits for the next server event, skipping control frames.
    pub async fn next_event(&mut self) -> Result<ServerEvent, ClientError> {
        while let Some(frame) = self.socket.next().await {
            match frame? {
                Message::Text(text) => return Ok(serde_json::from_str(text.as_str())?),
                Message::Close(_) => break,
                _ => {}
            }
        }
        Err(ClientError::Closed)
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.socket.close(None).await?;
        Ok(())
    }
}
