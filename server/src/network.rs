//! HTTP and WebSocket front of the lobby server
//!
//! Stateless lobby requests are plain JSON handlers. The real-time channel
//! is one WebSocket per client: a writer task drains the connection's event
//! queue while the reader loop feeds frames into the [`Gateway`].

use crate::catalog::{CatalogError, PromptCatalog};
use crate::config::ServerConfig;
use crate::gateway::{Gateway, INTERNAL_ERROR_MESSAGE};
use crate::store::{spawn_expiry_sweeper, FileStore, MemoryStore, SessionStore, StoreError};
use crate::utils::get_timestamp;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{Sink, SinkExt, StreamExt};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use shared::{CreateLobbyResponse, ServerEvent};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("network error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Builds the HTTP router for a gateway.
pub fn router(gateway: Arc<Gateway>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/lobby/create", post(create_lobby))
        .route("/api/lobby/{code}", get(lobby_status))
        .route("/ws", get(ws_handler))
        .with_state(gateway)
        .layer(cors_layer(cors_origins))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| origin.trim().parse().ok())
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "timestamp": get_timestamp() }))
}

async fn create_lobby(State(gateway): State<Arc<Gateway>>) -> Response {
    match gateway.create_lobby().await {
        Ok(lobby_code) => Json(CreateLobbyResponse { lobby_code }).into_response(),
        Err(e) => {
            error!("Failed to create lobby: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
        }
    }
}

async fn lobby_status(State(gateway): State<Arc<Gateway>>, Path(code): Path<String>) -> Response {
    match gateway.lobby_status(&code).await {
        Ok(Some(status)) => Json(status).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Lobby not found"),
        Err(e) => {
            error!("Failed to look up lobby {}: {}", code, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(gateway): State<Arc<Gateway>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, addr, gateway))
}

async fn send_event<S>(sink: &mut S, event: &ServerEvent) -> bool
where
    S: Sink<Message> + Unpin,
{
    match serde_json::to_string(event) {
        Ok(text) => sink.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            error!("Failed to encode event: {}", e);
            true
        }
    }
}

async fn handle_socket(socket: WebSocket, addr: SocketAddr, gateway: Arc<Gateway>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let Some(conn) = gateway.connect(addr, tx).await else {
        warn!("Rejecting connection from {}: server full", addr);
        send_event(&mut sink, &ServerEvent::error("Server is full")).await;
        let _ = sink.close().await;
        return;
    };

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if !send_event(&mut sink, &event).await {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        gateway.handle_message(conn, text.as_str()).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        gateway
                            .send_error(conn, "Binary frames are not supported".to_string())
                            .await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("Socket error from client {}: {}", conn, e);
                        break;
                    }
                }
            }
            _ = &mut send_task => {
                debug!("Writer for client {} stopped", conn);
                break;
            }
        }
    }

    gateway.disconnect(conn).await;
    send_task.abort();
}

/// Lobby server bound to a listener, ready to run.
pub struct Server {
    listener: TcpListener,
    gateway: Arc<Gateway>,
    config: ServerConfig,
}

impl Server {
    /// Loads the prompt catalog, opens the session store and binds the
    /// listener described by `config`.
    ///
    /// A `data_dir` selects the file-backed store, otherwise sessions live
    /// in memory. Binding port 0 picks a free port; see [`Self::local_addr`].
    pub async fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let catalog = match &config.prompts_dir {
            Some(dir) => PromptCatalog::load_dir(dir)?,
            None => PromptCatalog::builtin()?,
        };

        let store: Arc<dyn SessionStore> = match &config.data_dir {
            Some(dir) => Arc::new(FileStore::open(dir, config.session_ttl).await?),
            None => Arc::new(MemoryStore::new(config.session_ttl)),
        };

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let gateway = Arc::new(Gateway::new(
            store,
            Arc::new(catalog),
            rng,
            config.max_connections,
        ));

        let listener = TcpListener::bind(config.bind_addr()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            gateway,
            config,
        })
    }

    /// Address the listener actually bound.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the gateway, usable after [`Self::run`] takes the server.
    pub fn gateway(&self) -> Arc<Gateway> {
        Arc::clone(&self.gateway)
    }

    /// Serves until the listener fails. The expiry sweeper runs alongside.
    pub async fn run(self) -> Result<(), ServerError> {
        let sweeper = spawn_expiry_sweeper(self.gateway.store().clone(), self.config.sweep_interval);
        let app = router(self.gateway, &self.config.cors_origins);

        info!("Server started successfully");
        let result = axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;

        sweeper.abort();
        result.map_err(ServerError::from)
    }
}
