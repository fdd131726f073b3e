//! The single place where a session becomes something clients may see.
//!
//! Answers stay hidden until the lobby is revealing, except that a player
//! always sees their own record. Positions are visible as soon as they are
//! set.

use crate::session::Session;
use shared::{Phase, PlayerView, SessionView};

pub fn filter_view(session: &Session, requesting_player: Option<&str>) -> SessionView {
    let revealing = session.phase == Phase::Revealing;

    let players = session
        .players
        .iter()
        .map(|p| {
            let own = requesting_player == Some(p.id.as_str());
            PlayerView {
                id: p.id.clone(),
                name: p.name.clone(),
                color: p.color.clone(),
                connected: p.connected,
                has_answered: p.answer.is_some(),
                has_placed: p.position.is_some(),
                answer: if revealing || own { p.answer } else { None },
                position: p.position,
            }
        })
        .collect();

    SessionView {
        code: session.code.clone(),
        players,
        current_round: session.current_round,
        max_rounds: session.max_rounds,
        total_score: session.total_score,
        phase: session.phase,
        current_prompt: session.current_prompt.clone(),
        start_player_index: session.start_player_index,
        can_advance_lead: session.can_advance_lead,
        round_scores: session.round_scores.clone(),
        status: session.status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Player;

    fn placing_session() -> Session {
        let mut session = Session::new("ABC123".to_string(), 0);
        for (i, (answer, position)) in [(5.0, 1), (3.0, 0), (9.0, 2)].iter().enumerate() {
            let mut player = Player::new(
                format!("p{}", i),
                format!("Player {}", i),
                shared::PLAYER_COLORS[i].to_string(),
                0,
            );
            player.answer = Some(*answer);
            player.position = Some(*position);
            session.players.push(player);
        }
        session.phase = Phase::Placing;
        session
    }

    #[test]
    fn test_placing_view_hides_answers() {
        let view = filter_view(&placing_session(), None);
        assert!(view.players.iter().all(|p| p.answer.is_none()));
        assert!(view.players.iter().all(|p| p.has_answered && p.has_placed));
        assert_eq!(
            view.players.iter().map(|p| p.position).collect::<Vec<_>>(),
            vec![Some(1), Some(0), Some(2)]
        );
    }

    #[test]
    fn test_revealing_view_shows_answers() {
        let mut session = placing_session();
        session.phase = Phase::Revealing;
        let view = filter_view(&session, None);
        assert_eq!(
            view.players.iter().map(|p| p.answer).collect::<Vec<_>>(),
            vec![Some(5.0), Some(3.0), Some(9.0)]
        );
        assert_eq!(shared::score_round(&view.players), 3);
    }

    #[test]
    fn test_requester_sees_only_own_answer() {
        let view = filter_view(&placing_session(), Some("p1"));
        assert_eq!(view.player("p1").unwrap().answer, Some(3.0));
        assert!(view.player("p0").unwrap().answer.is_none());
        assert!(view.player("p2").unwrap().answer.is_none());
    }

    #[test]
    fn test_view_serializes_null_answers() {
        let json = serde_json::to_value(filter_view(&placing_session(), None)).unwrap();
        assert!(json["players"][0]["answer"].is_null());
        assert_eq!(json["players"][0]["position"], 1);
        assert_eq!(json["phase"], "placing");
        assert_eq!(json["code"], "ABC123");
    }
}
