//! # Lobby Server Library
//!
//! This library provides the authoritative server for the cooperative
//! "guess the order" party game. Players join a lobby by code, answer a
//! numeric prompt privately, then place themselves on a shared line and try
//! to end up sorted by their hidden answers.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Sessions
//! Every lobby is one [`session::Session`] document owned by the store. The
//! server alone decides phase changes, round scores and the lead player.
//! Clients only send intents and render whatever view they receive.
//!
//! ### Hidden Answers
//! All outbound state goes through [`view::filter_view`]. Answers stay
//! hidden from other players until the lead reveals them.
//!
//! ### Reconnection
//! Player identity is a client-chosen id. Closing a socket only marks the
//! player disconnected, and joining again with the same id resumes the seat.
//!
//! ## Module Organization
//!
//! ### Catalog Module (`catalog`)
//! Read-only prompt collection loaded from JSON category files, sampled
//! without repeats per session.
//!
//! ### Game Module (`game`)
//! The phase state machine. One [`game::apply`] entry point validates an
//! action against the phase table before mutating anything.
//!
//! ### Store Module (`store`)
//! Keyed session storage with compare-and-swap saves and 24 hour expiry,
//! backed by memory or by bincode files on disk.
//!
//! ### Gateway Module (`gateway`)
//! Bridges connections to sessions: load, apply, save, broadcast. Each
//! lobby's mutations are serialized behind its own lock.
//!
//! ### Network Module (`network`)
//! HTTP endpoints for creating and inspecting lobbies plus the WebSocket
//! channel, built on axum.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         port: 3001,
//!         ..ServerConfig::default()
//!     };
//!
//!     // Loads the prompt catalog, opens the store and binds the listener
//!     let server = Server::new(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod client_manager;
pub mod config;
pub mod game;
pub mod gateway;
pub mod network;
pub mod session;
pub mod store;
pub mod utils;
pub mod view;
