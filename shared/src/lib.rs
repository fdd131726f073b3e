//! Protocol types and game rules shared by the lobby server and its clients.
//!
//! Everything that crosses the wire lives here: inbound [`ClientAction`]
//! envelopes, outbound [`ServerEvent`]s, and the filtered [`SessionView`]
//! a client is allowed to see. The scoring rule is also here so the client
//! computing a round score and the server tests checking it agree on a
//! single implementation.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_PLAYERS: usize = 8;
pub const MIN_PLAYERS: usize = 3;
pub const MAX_ROUNDS: u32 = 8;
pub const CODE_LENGTH: usize = 6;
pub const NAME_MAX_LEN: usize = 20;

/// Upper bound for answers on prompts with a bounded scale.
pub const SCALE_MAX: f64 = 100.0;

pub const PLAYER_COLORS: [&str; 8] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#FFA07A", "#98D8C8", "#F7DC6F", "#BB8FCE", "#85C1E2",
];

/// Round phase. Governs which actions are legal.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Waiting,
    Answering,
    Placing,
    Revealing,
    Finished,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Waiting => "waiting",
            Phase::Answering => "answering",
            Phase::Placing => "placing",
            Phase::Revealing => "revealing",
            Phase::Finished => "finished",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse lifecycle flag, independent of [`Phase`].
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Finished,
    Abandoned,
}

impl Status {
    /// Lobbies in these states can still be looked up and joined.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Status::Active | Status::Finished)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub id: String,
    pub category_id: String,
    pub category_name: String,
    pub text: String,
    /// Answers are expected on a 0-100 scale.
    pub bounded_scale: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: String,
    pub name: String,
    pub color: String,
    pub connected: bool,
    pub has_answered: bool,
    pub has_placed: bool,
    pub answer: Option<f64>,
    pub position: Option<u32>,
}

/// The subset of a session that is safe to send to clients.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub code: String,
    pub players: Vec<PlayerView>,
    pub current_round: u32,
    pub max_rounds: u32,
    pub total_score: u32,
    pub phase: Phase,
    pub current_prompt: Option<Prompt>,
    pub start_player_index: usize,
    pub can_advance_lead: bool,
    pub round_scores: Vec<u32>,
    pub status: Status,
}

impl SessionView {
    pub fn player(&self, player_id: &str) -> Option<&PlayerView> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn lead_player(&self) -> Option<&PlayerView> {
        self.players.get(self.start_player_index)
    }

    pub fn is_lead(&self, player_id: &str) -> bool {
        self.lead_player().is_some_and(|p| p.id == player_id)
    }
}

/// Inbound real-time envelope, tagged by `type`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientAction {
    JoinLobby {
        #[serde(alias = "lobbyCode")]
        code: String,
        #[serde(alias = "playerName")]
        name: String,
        #[serde(rename = "playerId", default)]
        player_id: Option<String>,
    },
    StartGame {
        #[serde(alias = "lobbyCode")]
        code: String,
        #[serde(rename = "playerId")]
        player_id: String,
    },
    SubmitAnswer {
        #[serde(alias = "lobbyCode")]
        code: String,
        #[serde(rename = "playerId")]
        player_id: String,
        #[serde(alias = "value")]
        answer: f64,
    },
    SkipQuestion {
        #[serde(alias = "lobbyCode")]
        code: String,
        #[serde(rename = "playerId")]
        player_id: String,
    },
    PlaceArrow {
        #[serde(alias = "lobbyCode")]
        code: String,
        #[serde(rename = "playerId")]
        player_id: String,
        position: u32,
    },
    RevealAnswers {
        #[serde(alias = "lobbyCode")]
        code: String,
        #[serde(rename = "playerId")]
        player_id: String,
    },
    NextRound {
        #[serde(alias = "lobbyCode")]
        code: String,
        #[serde(rename = "roundScore")]
        round_score: u32,
    },
}

impl ClientAction {
    pub fn code(&self) -> &str {
        match self {
            ClientAction::JoinLobby { code, .. }
            | ClientAction::StartGame { code, .. }
            | ClientAction::SubmitAnswer { code, .. }
            | ClientAction::SkipQuestion { code, .. }
            | ClientAction::PlaceArrow { code, .. }
            | ClientAction::RevealAnswers { code, .. }
            | ClientAction::NextRound { code, .. } => code,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientAction::JoinLobby { .. } => "join-lobby",
            ClientAction::StartGame { .. } => "start-game",
            ClientAction::SubmitAnswer { .. } => "submit-answer",
            ClientAction::SkipQuestion { .. } => "skip-question",
            ClientAction::PlaceArrow { .. } => "place-arrow",
            ClientAction::RevealAnswers { .. } => "reveal-answers",
            ClientAction::NextRound { .. } => "next-round",
        }
    }
}

/// Outbound real-time event, tagged by `type`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Private reply to the joining connection.
    Joined {
        #[serde(rename = "playerId")]
        player_id: String,
        state: SessionView,
    },
    /// Broadcast to the lobby after every accepted mutation.
    State { state: SessionView },
    /// Private, human-readable failure.
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateLobbyResponse {
    pub lobby_code: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LobbyStatus {
    pub exists: bool,
    pub player_count: usize,
    pub phase: Phase,
    pub status: Status,
}

/// Scores a round from `(position, answer)` pairs.
///
/// Pairs are ordered by position and walked while answers are
/// non-decreasing; the walk stops at the first strictly smaller answer.
/// The score is the length of that correctly ordered prefix.
pub fn score_placements(placements: &[(u32, f64)]) -> u32 {
    let mut sorted = placements.to_vec();
    sorted.sort_by_key(|(position, _)| *position);

    let mut score = 0;
    let mut last_accepted = f64::NEG_INFINITY;
    for (_, answer) in sorted {
        if answer < last_accepted {
            break;
        }
        last_accepted = answer;
        score += 1;
    }
    score
}

/// Scores a revealed view. Players missing a position or an answer are skipped.
pub fn score_round(players: &[PlayerView]) -> u32 {
    let placements: Vec<(u32, f64)> = players
        .iter()
        .filter_map(|p| Some((p.position?, p.answer?)))
        .collect();
    score_placements(&placements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn placed(id: &str, position: u32, answer: f64) -> PlayerView {
        PlayerView {
            id: id.to_string(),
            name: id.to_string(),
            color: PLAYER_COLORS[0].to_string(),
            connected: true,
            has_answered: true,
            has_placed: true,
            answer: Some(answer),
            position: Some(position),
        }
    }

    #[test]
    fn test_score_stops_at_first_break() {
        let placements = [(0, 10.0), (1, 5.0), (2, 20.0), (3, 25.0)];
        assert_eq!(score_placements(&placements), 1);
    }

    #[test]
    fn test_score_all_correct() {
        let placements = [(0, 1.0), (1, 2.0), (2, 3.0), (3, 4.0)];
        assert_eq!(score_placements(&placements), 4);
    }

    #[test]
    fn test_score_sorts_by_position() {
        let placements = [(2, 9.0), (0, 3.0), (1, 5.0)];
        assert_eq!(score_placements(&placements), 3);
    }

    #[test]
    fn test_score_ties_are_correct() {
        let placements = [(0, 7.0), (1, 7.0), (2, 7.0)];
        assert_eq!(score_placements(&placements), 3);
    }

    #[test]
    fn test_score_empty() {
        assert_eq!(score_placements(&[]), 0);
    }

    #[test]
    fn test_score_round_skips_unplaced() {
        let mut unplaced = placed("c", 0, 1.0);
        unplaced.position = None;
        let players = vec![placed("a", 0, 2.0), unplaced, placed("b", 1, 3.0)];
        assert_eq!(score_round(&players), 2);
    }

    #[test]
    fn test_join_accepts_legacy_field_names() {
        let json = r#"{"type":"join-lobby","lobbyCode":"abc123","playerName":"Ana"}"#;
        let action: ClientAction = serde_json::from_str(json).unwrap();
        assert_eq!(
            action,
            ClientAction::JoinLobby {
                code: "abc123".to_string(),
                name: "Ana".to_string(),
                player_id: None,
            }
        );
    }

    #[test]
    fn test_submit_answer_accepts_value_alias() {
        let json = r#"{"type":"submit-answer","code":"ABC123","playerId":"p1","value":42.5}"#;
        match serde_json::from_str::<ClientAction>(json).unwrap() {
            ClientAction::SubmitAnswer { answer, .. } => assert_approx_eq!(answer, 42.5),
            other => panic!("Unexpected action: {:?}", other),
        }
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let json = r#"{"type":"place-arrow","code":"ABC123","playerId":"p1"}"#;
        let err = serde_json::from_str::<ClientAction>(json).unwrap_err();
        assert!(err.to_string().contains("position"));
    }

    #[test]
    fn test_server_event_shape() {
        let event = ServerEvent::error("Lobby not found");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "Lobby not found");
    }

    #[test]
    fn test_view_lead_lookup() {
        let view = SessionView {
            code: "ABC123".to_string(),
            players: vec![placed("a", 0, 1.0), placed("b", 1, 2.0)],
            current_round: 1,
            max_rounds: MAX_ROUNDS,
            total_score: 0,
            phase: Phase::Revealing,
            current_prompt: None,
            start_player_index: 1,
            can_advance_lead: true,
            round_scores: vec![],
            status: Status::Active,
        };
        assert!(view.is_lead("b"));
        assert!(!view.is_lead("a"));
        assert_eq!(view.player("a").map(|p| p.position), Some(Some(0)));
    }

    #[test]
    fn test_phase_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Phase::Revealing).unwrap(), "\"revealing\"");
        assert_eq!(Phase::Placing.to_string(), "placing");
        assert!(Status::Finished.is_joinable());
        assert!(!Status::Abandoned.is_joinable());
    }
}
