use crate::network::{ClientError, Connection};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{score_round, ClientAction, Phase, ServerEvent, SessionView, MIN_PLAYERS, SCALE_MAX};
use std::collections::HashSet;

/// Upper bound for answers on prompts without a fixed scale.
const OPEN_SCALE_MAX: f64 = 1000.0;

/// A scripted player that reacts to lobby views.
///
/// The bot answers at random, then places itself by where its own answer
/// sits on the prompt's scale. As lead it reveals once everybody else has
/// placed and reports the score computed from the revealed view.
pub struct Bot {
    pub code: String,
    pub name: String,
    pub player_id: String,
    /// Host bots start the game once this many players are present.
    pub start_at: usize,
    rng: StdRng,
    answer: Option<(String, f64)>,
    sent: HashSet<(u32, String, &'static str)>,
}

impl Bot {
    pub fn new(code: &str, name: &str, player_id: &str, seed: u64) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            player_id: player_id.to_string(),
            start_at: MIN_PLAYERS,
            rng: StdRng::seed_from_u64(seed),
            answer: None,
            sent: HashSet::new(),
        }
    }

    pub fn with_start_at(mut self, players: usize) -> Self {
        self.start_at = players.max(MIN_PLAYERS);
        self
    }

    pub fn join_action(&self) -> ClientAction {
        ClientAction::JoinLobby {
            code: self.code.clone(),
            name: self.name.clone(),
            player_id: Some(self.player_id.clone()),
        }
    }

    /// The bot's own answer for the current prompt, if it gave one.
    pub fn answer(&self) -> Option<f64> {
        self.answer.as_ref().map(|(_, value)| *value)
    }

    /// Returns each action at most once per round, prompt and kind.
    fn once(&mut self, view: &SessionView, action: ClientAction) -> Option<ClientAction> {
        let prompt = view
            .current_prompt
            .as_ref()
            .map(|p| p.id.clone())
            .unwrap_or_default();
        self.sent
            .insert((view.current_round, prompt, action.name()))
            .then_some(action)
    }

    /// Actions to send in response to `view`.
    pub fn decide(&mut self, view: &SessionView) -> Vec<ClientAction> {
        let Some(me) = view.player(&self.player_id) else {
            return Vec::new();
        };
        let has_answered = me.has_answered;
        let has_placed = me.has_placed;
        let is_lead = view.is_lead(&self.player_id);
        let is_host = view.players.first().is_some_and(|p| p.id == self.player_id);

        let mut actions = Vec::new();
        match view.phase {
            Phase::Waiting => {
                if is_host && view.players.len() >= self.start_at {
                    actions.extend(self.once(
                        view,
                        ClientAction::StartGame {
                            code: self.code.clone(),
                            player_id: self.player_id.clone(),
                        },
                    ));
                }
            }
            Phase::Answering => {
                if !has_answered {
                    let value = self.pick_answer(view);
                    actions.extend(self.once(
                        view,
                        ClientAction::SubmitAnswer {
                            code: self.code.clone(),
                            player_id: self.player_id.clone(),
                            answer: value,
                        },
                    ));
                }
            }
            Phase::Placing => {
                if !has_placed {
                    let position = self.estimate_position(view);
                    actions.extend(self.once(
                        view,
                        ClientAction::PlaceArrow {
                            code: self.code.clone(),
                            player_id: self.player_id.clone(),
                            position,
                        },
                    ));
                }
                if is_lead && view.can_advance_lead {
                    actions.extend(self.once(
                        view,
                        ClientAction::RevealAnswers {
                            code: self.code.clone(),
                            player_id: self.player_id.clone(),
                        },
                    ));
                }
            }
            Phase::Revealing => {
                if is_lead {
                    let round_score = score_round(&view.players);
                    actions.extend(self.once(
                        view,
                        ClientAction::NextRound {
                            code: self.code.clone(),
                            round_score,
                        },
                    ));
                }
            }
            Phase::Finished => {}
        }
        actions
    }

    fn scale_max(view: &SessionView) -> f64 {
        match &view.current_prompt {
            Some(prompt) if prompt.bounded_scale => SCALE_MAX,
            _ => OPEN_SCALE_MAX,
        }
    }

    fn pick_answer(&mut self, view: &SessionView) -> f64 {
        let prompt_id = view
            .current_prompt
            .as_ref()
            .map(|p| p.id.clone())
            .unwrap_or_default();
        if let Some((answered, value)) = &self.answer {
            if *answered == prompt_id {
                return *value;
            }
        }

        let value = self.rng.gen_range(0.0..=Self::scale_max(view)).round();
        self.answer = Some((prompt_id, value));
        value
    }

    /// Slot proportional to where the bot's answer sits on the scale.
    pub fn estimate_position(&self, view: &SessionView) -> u32 {
        let slots = view.players.len().max(1);
        let fraction = (self.answer().unwrap_or(0.0) / Self::scale_max(view)).clamp(0.0, 1.0);
        ((fraction * slots as f64) as usize).min(slots - 1) as u32
    }
}

/// Drives `bot` over `conn` until its lobby finishes.
///
/// Returns the final view.
pub async fn play(conn: &mut Connection, bot: &mut Bot) -> Result<SessionView, ClientError> {
    conn.send(&bot.join_action()).await?;

    loop {
        let view = match conn.next_event().await? {
            ServerEvent::Joined { player_id, state } => {
                info!("{} joined {} as {}", bot.name, state.code, player_id);
                bot.player_id = player_id;
                state
            }
            ServerEvent::State { state } => state,
            ServerEvent::Error { message } => {
                warn!("{}: server error: {}", bot.name, message);
                continue;
            }
        };

        if view.phase == Phase::Finished {
            info!(
                "{} saw lobby {} finish with {} points",
                bot.name, view.code, view.total_score
            );
            return Ok(view);
        }

        for action in bot.decide(&view) {
            conn.send(&action).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{PlayerView, Prompt, Status, MAX_ROUNDS, PLAYER_COLORS};

    fn player(id: &str) -> PlayerView {
        PlayerView {
            id: id.to_string(),
            name: id.to_string(),
            color: PLAYER_COLORS[0].to_string(),
            connected: true,
            has_answered: false,
            has_placed: false,
            answer: None,
            position: None,
        }
    }

    fn view(phase: Phase, players: &[&str]) -> SessionView {
        SessionView {
            code: "ABC123".to_string(),
            players: players.iter().map(|id| player(id)).collect(),
            current_round: 1,
            max_rounds: MAX_ROUNDS,
            total_score: 0,
            phase,
            current_prompt: Some(Prompt {
                id: "q1".to_string(),
                category_id: "test".to_string(),
                category_name: "Test".to_string(),
                text: "How much?".to_string(),
                bounded_scale: true,
            }),
            start_player_index: 0,
            can_advance_lead: false,
            round_scores: Vec::new(),
            status: Status::Active,
        }
    }

    #[test]
    fn test_host_starts_once_enough_players() {
        let mut host = Bot::new("ABC123", "Host", "a", 1);
        assert!(host.decide(&view(Phase::Waiting, &["a", "b"])).is_empty());

        let ready = view(Phase::Waiting, &["a", "b", "c"]);
        let actions = host.decide(&ready);
        assert!(matches!(actions.as_slice(), [ClientAction::StartGame { .. }]));
        assert!(host.decide(&ready).is_empty());

        let mut guest = Bot::new("ABC123", "Guest", "b", 2);
        assert!(guest.decide(&ready).is_empty());
    }

    #[test]
    fn test_bounded_answers_stay_on_scale() {
        let mut bot = Bot::new("ABC123", "Bot", "a", 3);
        let actions = bot.decide(&view(Phase::Answering, &["a", "b", "c"]));
        match actions.as_slice() {
            [ClientAction::SubmitAnswer { answer, .. }] => {
                assert!((0.0..=SCALE_MAX).contains(answer));
                assert_approx_eq!(answer.fract(), 0.0);
                assert_eq!(bot.answer(), Some(*answer));
            }
            other => panic!("Unexpected actions: {:?}", other),
        }
    }

    #[test]
    fn test_estimate_position_tracks_answer() {
        let mut bot = Bot::new("ABC123", "Bot", "a", 3);
        let placing = view(Phase::Placing, &["a", "b", "c", "d"]);

        bot.answer = Some(("q1".to_string(), 0.0));
        assert_eq!(bot.estimate_position(&placing), 0);
        bot.answer = Some(("q1".to_string(), 60.0));
        assert_eq!(bot.estimate_position(&placing), 2);
        bot.answer = Some(("q1".to_string(), 100.0));
        assert_eq!(bot.estimate_position(&placing), 3);
    }

    #[test]
    fn test_lead_places_then_reveals() {
        let mut lead = Bot::new("ABC123", "Lead", "a", 4);
        lead.answer = Some(("q1".to_string(), 10.0));
        let mut placing = view(Phase::Placing, &["a", "b", "c"]);
        placing.can_advance_lead = true;

        let actions = lead.decide(&placing);
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], ClientAction::PlaceArrow { position: 0, .. }));
        assert!(matches!(actions[1], ClientAction::RevealAnswers { .. }));
    }

    #[test]
    fn test_lead_reports_revealed_score() {
        let mut lead = Bot::new("ABC123", "Lead", "a", 5);
        let mut revealing = view(Phase::Revealing, &["a", "b", "c"]);
        for (p, (position, answer)) in revealing
            .players
            .iter_mut()
            .zip([(1, 5.0), (0, 3.0), (2, 9.0)])
        {
            p.position = Some(position);
            p.answer = Some(answer);
        }

        let actions = lead.decide(&revealing);
        assert_eq!(
            actions,
            vec![ClientAction::NextRound {
                code: "ABC123".to_string(),
                round_score: 3
            }]
        );

        let mut other = Bot::new("ABC123", "Other", "b", 6);
        assert!(other.decide(&revealing).is_empty());
    }

    #[test]
    fn test_repeated_states_keep_first_answer() {
        let mut bot = Bot::new("ABC123", "Bot", "a", 8);
        let answering = view(Phase::Answering, &["a", "b", "c"]);

        assert_eq!(bot.decide(&answering).len(), 1);
        let first = bot.answer();
        for _ in 0..5 {
            assert!(bot.decide(&answering).is_empty());
        }
        assert_eq!(bot.answer(), first);
    }

    #[test]
    fn test_unknown_bot_does_nothing() {
        let mut bot = Bot::new("ABC123", "Ghost", "zzz", 7);
        assert!(bot.decide(&view(Phase::Answering, &["a", "b", "c"])).is_empty());
    }
}
