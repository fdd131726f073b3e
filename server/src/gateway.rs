//! Real-time boundary between connections and lobby sessions
//!
//! Every inbound [`ClientAction`] goes through the same pipeline:
//!
//! 1. parse and validate the envelope (failures go back to the sender only)
//! 2. take the lobby's lock, load the session
//! 3. run it through [`crate::game::apply`]
//! 4. save with a version check and broadcast the filtered view
//!
//! Mutations of one lobby are serialized by its lock. Different lobbies
//! never wait on each other.

use crate::catalog::PromptCatalog;
use crate::client_manager::{ClientManager, ConnectionId, Subscription};
use crate::config::MAX_CODE_ATTEMPTS;
use crate::game::{apply, Action, Context, GameError, Outcome};
use crate::session::Session;
use crate::store::{SessionStore, StoreError};
use crate::utils::{generate_code, get_timestamp, normalize_code};
use crate::view::filter_view;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use shared::{ClientAction, LobbyStatus, ServerEvent, CODE_LENGTH};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, RwLock};

/// Message sent when something fails on our side.
pub const INTERNAL_ERROR_MESSAGE: &str = "Something went wrong, please try again";

/// Why an inbound action or lobby request did not go through.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Lobby not found")]
    LobbyNotFound,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Rejected(#[from] GameError),
    #[error("session store failed: {0}")]
    Store(#[from] StoreError),
    #[error("no free lobby code after {0} attempts")]
    CodesExhausted(usize),
}

impl GatewayError {
    /// Text for the private `error` event, or `None` when the failure is
    /// dropped without a reply.
    pub fn client_message(&self) -> Option<String> {
        match self {
            GatewayError::LobbyNotFound | GatewayError::Validation(_) => Some(self.to_string()),
            GatewayError::Rejected(e) if e.is_reported() => Some(e.to_string()),
            GatewayError::Rejected(_) => None,
            GatewayError::Store(_) | GatewayError::CodesExhausted(_) => {
                Some(INTERNAL_ERROR_MESSAGE.to_string())
            }
        }
    }
}

fn require(value: &str, field: &str) -> Result<(), GatewayError> {
    if value.trim().is_empty() {
        return Err(GatewayError::Validation(format!("Missing {}", field)));
    }
    Ok(())
}

/// Checks required fields and turns an envelope into a state machine action.
pub fn to_game_action(action: ClientAction) -> Result<Action, GatewayError> {
    require(action.code(), "lobby code")?;

    let action = match action {
        ClientAction::JoinLobby {
            name, player_id, ..
        } => {
            require(&name, "player name")?;
            Action::Join {
                name,
                player_id: player_id.filter(|id| !id.trim().is_empty()),
            }
        }
        ClientAction::StartGame { player_id, .. } => {
            require(&player_id, "player id")?;
            Action::Start { player_id }
        }
        ClientAction::SubmitAnswer {
            player_id, answer, ..
        } => {
            require(&player_id, "player id")?;
            Action::SubmitAnswer {
                player_id,
                value: answer,
            }
        }
        ClientAction::SkipQuestion { player_id, .. } => {
            require(&player_id, "player id")?;
            Action::SkipQuestion { player_id }
        }
        ClientAction::PlaceArrow {
            player_id,
            position,
            ..
        } => {
            require(&player_id, "player id")?;
            Action::PlaceArrow {
                player_id,
                position,
            }
        }
        ClientAction::RevealAnswers { player_id, .. } => {
            require(&player_id, "player id")?;
            Action::Reveal { player_id }
        }
        ClientAction::NextRound { round_score, .. } => Action::NextRound { round_score },
    };
    Ok(action)
}

/// Shared entry point for the HTTP routes and every WebSocket task.
///
/// Holds the store, the prompt catalog, the connection registry and one
/// lock per lobby that currently has an action in flight.
pub struct Gateway {
    store: Arc<dyn SessionStore>,
    catalog: Arc<PromptCatalog>,
    clients: Arc<RwLock<ClientManager>>,
    rng: Mutex<StdRng>,
    lobby_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Gateway {
    /// Builds a gateway over `store`.
    ///
    /// `rng` drives lobby codes, fallback player ids and prompt draws. At
    /// most `max_connections` sockets are accepted at once.
    pub fn new(
        store: Arc<dyn SessionStore>,
        catalog: Arc<PromptCatalog>,
        rng: StdRng,
        max_connections: usize,
    ) -> Self {
        Self {
            store,
            catalog,
            clients: Arc::new(RwLock::new(ClientManager::new(max_connections))),
            rng: Mutex::new(rng),
            lobby_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Creates an empty lobby under a fresh code.
    ///
    /// Codes are drawn until the store accepts one as new. Fails with
    /// [`GatewayError::CodesExhausted`] after `MAX_CODE_ATTEMPTS` collisions.
    pub async fn create_lobby(&self) -> Result<String, GatewayError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = {
                let mut rng = self.rng.lock().await;
                generate_code(&mut *rng, CODE_LENGTH)
            };

            if self
                .store
                .insert_new(Session::new(code.clone(), get_timestamp()))
                .await?
            {
                info!("Created lobby {}", code);
                return Ok(code);
            }
            debug!("Lobby code {} already taken, retrying", code);
        }

        Err(GatewayError::CodesExhausted(MAX_CODE_ATTEMPTS))
    }

    /// Summary of a live lobby, or `None` when no joinable session exists.
    pub async fn lobby_status(&self, code: &str) -> Result<Option<LobbyStatus>, GatewayError> {
        let code = normalize_code(code);
        let session = self.store.load(&code).await?;

        Ok(session
            .filter(|s| s.status.is_joinable())
            .map(|s| LobbyStatus {
                exists: true,
                player_count: s.players.len(),
                phase: s.phase,
                status: s.status,
            }))
    }

    /// Registers a socket. `None` means the server is at capacity.
    pub async fn connect(
        &self,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> Option<ConnectionId> {
        self.clients.write().await.add_client(addr, sender)
    }

    /// Handles one text frame from a connection.
    ///
    /// Frames that do not decode as a [`ClientAction`] get a private
    /// `Invalid message` error; everything else goes to [`Self::handle_action`].
    pub async fn handle_message(&self, conn: ConnectionId, text: &str) {
        match serde_json::from_str::<ClientAction>(text) {
            Ok(action) => self.handle_action(conn, action).await,
            Err(e) => {
                debug!("Client {} sent an invalid message: {}", conn, e);
                self.send_error(conn, format!("Invalid message: {}", e)).await;
            }
        }
    }

    /// Runs one decoded action from `conn` against its lobby.
    ///
    /// Validation failures and reported rejections come back to `conn` as a
    /// private `error`; silent rejections are only logged. A successful join
    /// binds `conn` to the joined player, and if that replaced a binding to
    /// some other player, that player is marked disconnected.
    pub async fn handle_action(&self, conn: ConnectionId, action: ClientAction) {
        let code = normalize_code(action.code());
        let name = action.name();

        let result = match to_game_action(action) {
            Ok(action) => self.execute(Some(conn), &code, action).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(Some(replaced)) => self.release_player(replaced).await,
            Ok(None) => {}
            Err(e) => self.report_failure(conn, &code, name, e).await,
        }
    }

    async fn report_failure(&self, conn: ConnectionId, code: &str, name: &str, e: GatewayError) {
        match &e {
            GatewayError::Store(_) | GatewayError::CodesExhausted(_) => {
                error!("Failed to handle {} for lobby {}: {}", name, code, e)
            }
            _ => debug!("Rejected {} from client {} on {}: {}", name, conn, code, e),
        }
        if let Some(message) = e.client_message() {
            self.send_error(conn, message).await;
        }
    }

    /// Drops a closed socket and marks its player as disconnected unless
    /// another socket still speaks for them.
    ///
    /// Safe to call more than once for the same id.
    pub async fn disconnect(&self, conn: ConnectionId) {
        let subscription = {
            let mut clients = self.clients.write().await;
            let Some(removed) = clients.remove_client(&conn) else {
                return;
            };
            match removed.subscription {
                Some(sub)
                    if !clients.player_has_other_connection(conn, &sub.code, &sub.player_id) =>
                {
                    sub
                }
                _ => return,
            }
        };

        self.release_player(subscription).await;
    }

    /// Applies `Disconnect` for a player no socket speaks for anymore.
    async fn release_player(&self, subscription: Subscription) {
        let action = Action::Disconnect {
            player_id: subscription.player_id.clone(),
        };
        if let Err(e) = self.execute(None, &subscription.code, action).await {
            warn!(
                "Could not mark {} disconnected in {}: {}",
                subscription.player_id, subscription.code, e
            );
        }
    }

    /// Number of open sockets, bound or not.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// The backing session store.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Sends a private `error` event to one connection.
    pub async fn send_error(&self, conn: ConnectionId, message: String) {
        self.clients
            .read()
            .await
            .send_to(conn, ServerEvent::error(message));
    }

    async fn lobby_lock(&self, code: &str) -> Arc<Mutex<()>> {
        let mut locks = self.lobby_locks.lock().await;
        Arc::clone(locks.entry(code.to_string()).or_default())
    }

    async fn release_lobby_lock(&self, code: &str) {
        let mut locks = self.lobby_locks.lock().await;
        if locks
            .get(code)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(code);
        }
    }

    /// Runs `action` under the lobby's lock.
    ///
    /// Returns the binding a join displaced when no other socket still
    /// holds it. The caller releases it after this lobby's lock is dropped,
    /// so two sockets swapping lobbies never wait on each other's locks.
    async fn execute(
        &self,
        conn: Option<ConnectionId>,
        code: &str,
        action: Action,
    ) -> Result<Option<Subscription>, GatewayError> {
        let lock = self.lobby_lock(code).await;
        let result = {
            let _guard = lock.lock().await;
            self.execute_locked(conn, code, action).await
        };
        drop(lock);
        self.release_lobby_lock(code).await;
        result
    }

    async fn execute_locked(
        &self,
        conn: Option<ConnectionId>,
        code: &str,
        action: Action,
    ) -> Result<Option<Subscription>, GatewayError> {
        let mut session = self
            .store
            .load(code)
            .await?
            .filter(|s| s.status.is_joinable())
            .ok_or(GatewayError::LobbyNotFound)?;

        let outcome = {
            let mut rng = self.rng.lock().await;
            let mut ctx = Context {
                catalog: &self.catalog,
                rng: &mut *rng,
                now: get_timestamp(),
            };
            apply(&mut session, action, &mut ctx)?
        };

        let saved = self.store.save(session).await?;

        let mut clients = self.clients.write().await;
        let mut orphaned = None;
        if let (Some(conn), Outcome::Joined { player_id, .. }) = (conn, &outcome) {
            orphaned = clients
                .subscribe(conn, code, player_id)
                .filter(|old| !clients.player_has_other_connection(conn, &old.code, &old.player_id));
            clients.send_to(
                conn,
                ServerEvent::Joined {
                    player_id: player_id.clone(),
                    state: filter_view(&saved, Some(player_id)),
                },
            );
        }

        let delivered = clients.broadcast(
            code,
            &ServerEvent::State {
                state: filter_view(&saved, None),
            },
        );
        debug!(
            "Lobby {} v{} ({}) sent to {} connections",
            code, saved.version, saved.phase, delivered
        );
        Ok(orphaned)
    }
}
