//! Session state machine
//!
//! Every player action goes through [`apply`], which checks the action
//! against the current [`Phase`] before touching the session. Preconditions
//! are validated up front so a rejected action leaves the session exactly as
//! it was. Late, duplicated or reordered client messages therefore end up as
//! harmless [`GameError::WrongPhase`] rejections.
//!
//! Phase edges:
//!
//! ```text
//! waiting --start--> answering --(all answered)--> placing --reveal--> revealing
//! revealing --next round--> answering | finished
//! answering --skip--> answering
//! ```

use crate::catalog::PromptCatalog;
use crate::session::{Player, Session};
use crate::utils::generate_player_id;
use log::info;
use rand::Rng;
use shared::{Phase, MAX_PLAYERS, MIN_PLAYERS, NAME_MAX_LEN, SCALE_MAX};
use thiserror::Error;

/// A validated player action.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Join {
        name: String,
        player_id: Option<String>,
    },
    Start {
        player_id: String,
    },
    SubmitAnswer {
        player_id: String,
        value: f64,
    },
    SkipQuestion {
        player_id: String,
    },
    PlaceArrow {
        player_id: String,
        position: u32,
    },
    Reveal {
        player_id: String,
    },
    NextRound {
        round_score: u32,
    },
    /// Issued by the gateway when a player's connection closes.
    Disconnect {
        player_id: String,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Join { .. } => "join",
            Action::Start { .. } => "start",
            Action::SubmitAnswer { .. } => "submit answer",
            Action::SkipQuestion { .. } => "skip question",
            Action::PlaceArrow { .. } => "place arrow",
            Action::Reveal { .. } => "reveal",
            Action::NextRound { .. } => "next round",
            Action::Disconnect { .. } => "disconnect",
        }
    }

    /// Transition table: the phases in which this action is legal.
    pub fn allowed_in(&self, phase: Phase) -> bool {
        match self {
            Action::Join { .. } | Action::Disconnect { .. } => true,
            Action::Start { .. } => phase == Phase::Waiting,
            Action::SubmitAnswer { .. } | Action::SkipQuestion { .. } => {
                phase == Phase::Answering
            }
            Action::PlaceArrow { .. } | Action::Reveal { .. } => phase == Phase::Placing,
            Action::NextRound { .. } => phase == Phase::Revealing,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Joined { player_id: String, reconnected: bool },
    Updated,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GameError {
    #[error("cannot {action} while the lobby is {phase}")]
    WrongPhase { action: &'static str, phase: Phase },
    #[error("You need at least {} players to start", MIN_PLAYERS)]
    NotEnoughPlayers,
    #[error("Lobby is full")]
    LobbyFull,
    #[error("No more prompts available")]
    NoPromptsLeft,
    #[error("only the lead player can do that")]
    NotLead,
    #[error("player {0} is not in this lobby")]
    UnknownPlayer(String),
    #[error("the prompt was already answered")]
    AlreadyAnswered,
    #[error("not every player has placed yet")]
    PlacementIncomplete,
    #[error("{0}")]
    Invalid(String),
}

impl GameError {
    /// Whether the requester gets a private error. Everything else is
    /// dropped silently.
    pub fn is_reported(&self) -> bool {
        matches!(
            self,
            GameError::NotEnoughPlayers
                | GameError::LobbyFull
                | GameError::NoPromptsLeft
                | GameError::Invalid(_)
        )
    }
}

/// What the state machine needs besides the session.
pub struct Context<'a, R: ?Sized> {
    pub catalog: &'a PromptCatalog,
    pub rng: &'a mut R,
    pub now: u64,
}

/// Applies `action` to `session`.
pub fn apply<R: Rng + ?Sized>(
    session: &mut Session,
    action: Action,
    ctx: &mut Context<'_, R>,
) -> Result<Outcome, GameError> {
    if !action.allowed_in(session.phase) {
        return Err(GameError::WrongPhase {
            action: action.name(),
            phase: session.phase,
        });
    }

    let outcome = match action {
        Action::Join { name, player_id } => join(session, name, player_id, ctx)?,
        Action::Start { player_id } => start(session, &player_id, ctx)?,
        Action::SubmitAnswer { player_id, value } => {
            submit_answer(session, &player_id, value, ctx.now)?
        }
        Action::SkipQuestion { player_id } => skip_question(session, &player_id, ctx)?,
        Action::PlaceArrow {
            player_id,
            position,
        } => place_arrow(session, &player_id, position, ctx.now)?,
        Action::Reveal { player_id } => reveal(session, &player_id)?,
        Action::NextRound { round_score } => next_round(session, round_score, ctx)?,
        Action::Disconnect { player_id } => disconnect(session, &player_id)?,
    };

    session.last_activity = ctx.now;
    Ok(outcome)
}

fn validate_name(name: &str) -> Result<String, GameError> {
    let name = name.trim();
    let len = name.chars().count();
    if len == 0 || len > NAME_MAX_LEN {
        return Err(GameError::Invalid(format!(
            "Name must be between 1 and {} characters",
            NAME_MAX_LEN
        )));
    }
    Ok(name.to_string())
}

fn join<R: Rng + ?Sized>(
    session: &mut Session,
    name: String,
    player_id: Option<String>,
    ctx: &mut Context<'_, R>,
) -> Result<Outcome, GameError> {
    let name = validate_name(&name)?;

    if let Some(id) = player_id.as_deref() {
        if let Some(player) = session.players.iter_mut().find(|p| p.id == id) {
            player.connected = true;
            player.last_seen = ctx.now;
            info!("Player {} reconnected to {}", player.name, session.code);
            return Ok(Outcome::Joined {
                player_id: id.to_string(),
                reconnected: true,
            });
        }
    }

    if session.players.len() >= MAX_PLAYERS {
        return Err(GameError::LobbyFull);
    }

    let id = player_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| generate_player_id(ctx.rng));
    let color = session.next_color(ctx.rng);
    info!("Player {} joined {} as {}", name, session.code, color);
    session
        .players
        .push(Player::new(id.clone(), name, color, ctx.now));

    Ok(Outcome::Joined {
        player_id: id,
        reconnected: false,
    })
}

fn start<R: Rng + ?Sized>(
    session: &mut Session,
    player_id: &str,
    ctx: &mut Context<'_, R>,
) -> Result<Outcome, GameError> {
    if session.player(player_id).is_none() {
        return Err(GameError::UnknownPlayer(player_id.to_string()));
    }
    if session.players.len() < MIN_PLAYERS {
        return Err(GameError::NotEnoughPlayers);
    }

    match ctx.catalog.sample(&session.used_prompt_ids, ctx.rng) {
        Some(prompt) => {
            session.show_prompt(prompt);
            session.phase = Phase::Answering;
            info!(
                "Lobby {} started with {} players",
                session.code,
                session.players.len()
            );
        }
        None => {
            info!("Lobby {} has no prompts to start with", session.code);
            session.finish();
        }
    }
    Ok(Outcome::Updated)
}

fn submit_answer(
    session: &mut Session,
    player_id: &str,
    value: f64,
    now: u64,
) -> Result<Outcome, GameError> {
    if !value.is_finite() {
        return Err(GameError::Invalid("Answer must be a number".to_string()));
    }
    let bounded = session
        .current_prompt
        .as_ref()
        .is_some_and(|p| p.bounded_scale);
    if bounded && !(0.0..=SCALE_MAX).contains(&value) {
        return Err(GameError::Invalid(format!(
            "Answer must be between 0 and {}",
            SCALE_MAX
        )));
    }

    let player = session
        .player_mut(player_id)
        .ok_or_else(|| GameError::UnknownPlayer(player_id.to_string()))?;
    player.answer = Some(value);
    player.last_seen = now;

    if session.all_answered() {
        session.phase = Phase::Placing;
    }
    Ok(Outcome::Updated)
}

fn skip_question<R: Rng + ?Sized>(
    session: &mut Session,
    player_id: &str,
    ctx: &mut Context<'_, R>,
) -> Result<Outcome, GameError> {
    let lead = session
        .lead()
        .filter(|p| p.id == player_id)
        .ok_or(GameError::NotLead)?;
    if lead.answer.is_some() {
        return Err(GameError::AlreadyAnswered);
    }

    let prompt = ctx
        .catalog
        .sample(&session.used_prompt_ids, ctx.rng)
        .ok_or(GameError::NoPromptsLeft)?;
    session.show_prompt(prompt);
    session.clear_answers();
    Ok(Outcome::Updated)
}

fn place_arrow(
    session: &mut Session,
    player_id: &str,
    position: u32,
    now: u64,
) -> Result<Outcome, GameError> {
    if position as usize >= session.players.len() {
        return Err(GameError::Invalid(format!(
            "Position must be below {}",
            session.players.len()
        )));
    }

    let player = session
        .player_mut(player_id)
        .ok_or_else(|| GameError::UnknownPlayer(player_id.to_string()))?;
    player.position = Some(position);
    player.last_seen = now;

    // Monotonic within a round; only next_round resets it.
    if session.others_placed() {
        session.can_advance_lead = true;
    }
    Ok(Outcome::Updated)
}

fn reveal(session: &mut Session, player_id: &str) -> Result<Outcome, GameError> {
    if !session.is_lead(player_id) {
        return Err(GameError::NotLead);
    }
    if !session.can_advance_lead {
        return Err(GameError::PlacementIncomplete);
    }
    session.phase = Phase::Revealing;
    Ok(Outcome::Updated)
}

fn next_round<R: Rng + ?Sized>(
    session: &mut Session,
    round_score: u32,
    ctx: &mut Context<'_, R>,
) -> Result<Outcome, GameError> {
    if round_score as usize > session.players.len() {
        return Err(GameError::Invalid(format!(
            "Round score cannot exceed {}",
            session.players.len()
        )));
    }

    session.round_scores.push(round_score);
    session.total_score += round_score;
    session.clear_round();
    session.start_player_index = (session.start_player_index + 1) % session.players.len();
    session.can_advance_lead = false;

    if session.current_round >= session.max_rounds {
        info!(
            "Lobby {} finished with {} points",
            session.code, session.total_score
        );
        session.finish();
        return Ok(Outcome::Updated);
    }

    session.current_round += 1;
    match ctx.catalog.sample(&session.used_prompt_ids, ctx.rng) {
        Some(prompt) => {
            session.show_prompt(prompt);
            session.phase = Phase::Answering;
        }
        None => {
            info!("Lobby {} ran out of prompts", session.code);
            session.finish();
        }
    }
    Ok(Outcome::Updated)
}

fn disconnect(session: &mut Session, player_id: &str) -> Result<Outcome, GameError> {
    let player = session
        .player_mut(player_id)
        .ok_or_else(|| GameError::UnknownPlayer(player_id.to_string()))?;
    player.connected = false;
    Ok(Outcome::Updated)
}
