//! # Lobby Client Library
//!
//! Headless client for the lobby server. It speaks the same JSON protocol a
//! browser front end would and is used for load testing, demos and the
//! end-to-end tests.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! - [`network::LobbyApi`] wraps the HTTP endpoints for creating and
//!   inspecting lobbies
//! - [`network::Connection`] is one WebSocket to the real-time channel,
//!   sending [`shared::ClientAction`]s and yielding [`shared::ServerEvent`]s
//!
//! ### Game Module (`game`)
//! A scripted [`game::Bot`] that reacts to each filtered lobby view: the
//! host starts the game, everyone answers and places, and the lead player
//! reveals and reports the round score.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::game::{play, Bot};
//! use client::network::{Connection, LobbyApi};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api = LobbyApi::new("http://127.0.0.1:3001");
//!     let code = api.create_lobby().await?;
//!
//!     let mut conn = Connection::connect(api.base_url()).await?;
//!     let mut bot = Bot::new(&code, "Ada", "ada-1", 42);
//!     let final_view = play(&mut conn, &mut bot).await?;
//!     println!("Scored {} points", final_view.total_score);
//!
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod network;
