//! Lobby session data model
//!
//! A [`Session`] is the single server-authoritative document for one lobby.
//! It is owned by the session store and only mutated through
//! [`crate::game::apply`].

use rand::Rng;
use serde::{Deserialize, Serialize};
use shared::{Phase, Prompt, Status, MAX_ROUNDS, PLAYER_COLORS};

/// A participant embedded in a session. Identity survives reconnects.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Client-chosen identifier, stable across reconnects
    pub id: String,
    pub name: String,
    pub color: String,
    /// Best-effort liveness flag
    pub connected: bool,
    pub last_seen: u64,
    /// Answer submitted this round
    pub answer: Option<f64>,
    /// Slot chosen during placement
    pub position: Option<u32>,
}

impl Player {
    /// A freshly joined, connected player with nothing submitted yet.
    pub fn new(id: String, name: String, color: String, now: u64) -> Self {
        Self {
            id,
            name,
            color,
            connected: true,
            last_seen: now,
            answer: None,
            position: None,
        }
    }

    fn clear_round(&mut self) {
        self.answer = None;
        self.position = None;
    }
}

/// One lobby from creation to expiry.
///
/// `current_round` is 1-based. `round_scores` holds one entry per completed
/// round and `total_score` is always their sum.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub code: String,
    /// Insertion order is turn order.
    pub players: Vec<Player>,
    pub phase: Phase,
    pub current_prompt: Option<Prompt>,
    pub used_prompt_ids: Vec<String>,
    pub start_player_index: usize,
    pub can_advance_lead: bool,
    pub current_round: u32,
    pub max_rounds: u32,
    pub round_scores: Vec<u32>,
    pub total_score: u32,
    pub status: Status,
    pub created_at: u64,
    pub last_activity: u64,
    /// Bumped by the store on every save.
    pub version: u64,
}

impl Session {
    /// An empty lobby in the waiting phase, at version 0.
    pub fn new(code: String, now: u64) -> Self {
        Self {
            code,
            players: Vec::new(),
            phase: Phase::Waiting,
            current_prompt: None,
            used_prompt_ids: Vec::new(),
            start_player_index: 0,
            can_advance_lead: false,
            current_round: 1,
            max_rounds: MAX_ROUNDS,
            round_scores: Vec::new(),
            total_score: 0,
            status: Status::Active,
            created_at: now,
            last_activity: now,
            version: 0,
        }
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }

    /// The player at `start_player_index`.
    pub fn lead(&self) -> Option<&Player> {
        self.players.get(self.start_player_index)
    }

    pub fn is_lead(&self, player_id: &str) -> bool {
        self.lead().is_some_and(|p| p.id == player_id)
    }

    /// True once every player has an answer for the current prompt.
    pub fn all_answered(&self) -> bool {
        self.players.iter().all(|p| p.answer.is_some())
    }

    /// True once every player other than the lead has placed.
    pub fn others_placed(&self) -> bool {
        self.players
            .iter()
            .enumerate()
            .all(|(index, p)| index == self.start_player_index || p.position.is_some())
    }

    /// Drops submitted answers but keeps placements.
    pub fn clear_answers(&mut self) {
        for player in &mut self.players {
            player.answer = None;
        }
    }

    /// Resets every player's answer and placement for a new round.
    pub fn clear_round(&mut self) {
        for player in &mut self.players {
            player.clear_round();
        }
    }

    /// Marks the prompt as shown and makes it current.
    pub fn show_prompt(&mut self, prompt: Prompt) {
        self.used_prompt_ids.push(prompt.id.clone());
        self.current_prompt = Some(prompt);
    }

    /// Ends the game.
    ///
    /// Sets both the phase and the status to finished. The session stays
    /// readable until the store expires it.
    pub fn finish(&mut self) {
        self.phase = Phase::Finished;
        self.status = Status::Finished;
    }

    /// First palette colour not yet taken, or a random one once all are.
    pub fn next_color<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        PLAYER_COLORS
            .iter()
            .find(|color| !self.players.iter().any(|p| p.color == **color))
            .unwrap_or_else(|| &PLAYER_COLORS[rng.gen_range(0..PLAYER_COLORS.len())])
            .to_string()
    }

    /// Whether `ttl_ms` has passed since the last accepted action.
    pub fn is_expired(&self, now: u64, ttl_ms: u64) -> bool {
        now.saturating_sub(self.last_activity) > ttl_ms
    }
}
