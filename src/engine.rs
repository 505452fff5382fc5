//! Round engine: decides when a round moves on.
//!
//! Two independent triggers drive a round forward: players finishing their
//! work (early advance) and deadlines elapsing. Both funnel through
//! [`advance`], and every transition underneath is idempotent, so a stale or
//! duplicated trigger is a no-op rather than an error.

use chrono::{DateTime, Utc};

use crate::error::GameError;
use crate::types::*;

/// Why the engine is being asked to look at a game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A player submitted, rated, or left
    PlayerActivity,
    CreativeDeadline(RoundNumber),
    ScoringDeadline(RoundNumber),
    /// The scoreboard pause after a round has elapsed
    ScoreboardElapsed(RoundNumber),
}

/// A phase transition that actually happened
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseChange {
    RoundStarted {
        round: RoundNumber,
        creative_deadline: DateTime<Utc>,
    },
    CreativePhaseEnded {
        round: RoundNumber,
        scoring_deadline: Option<DateTime<Utc>>,
    },
    RoundEnded {
        round: RoundNumber,
        scores: Vec<RoundScore>,
        game_completed: bool,
    },
}

/// Apply a trigger, then settle any early advances it unlocked
pub fn advance(
    game: &mut Game,
    trigger: Trigger,
    now: DateTime<Utc>,
) -> Result<Vec<PhaseChange>, GameError> {
    let mut changes = Vec::new();

    match trigger {
        Trigger::PlayerActivity => {}
        Trigger::CreativeDeadline(round) => {
            if is_current(game, round, RoundPhase::Creative) {
                end_creative(game, round, now, &mut changes)?;
            }
        }
        Trigger::ScoringDeadline(round) => {
            if is_current(game, round, RoundPhase::Scoring) {
                end_round(game, round, now, &mut changes)?;
            }
        }
        Trigger::ScoreboardElapsed(round) => {
            if game.state == GameState::Scoring
                && is_current(game, round, RoundPhase::Finished)
                && round < game.options.number_of_rounds
            {
                changes.push(start_next(game, now)?);
            }
        }
    }

    changes.extend(settle(game, now)?);
    Ok(changes)
}

/// Run early advances until nothing else can move
pub fn settle(game: &mut Game, now: DateTime<Utc>) -> Result<Vec<PhaseChange>, GameError> {
    let mut changes = Vec::new();

    while matches!(game.state, GameState::InProgress | GameState::Scoring) {
        let Some(round) = game.current_round() else {
            break;
        };
        let (number, phase) = (round.round_number, round.phase);

        match phase {
            RoundPhase::Creative if game.all_submitted(number) => {
                tracing::debug!(code = %game.game_code, round = number, "all memes submitted");
                end_creative(game, number, now, &mut changes)?;
            }
            RoundPhase::Scoring if game.all_rated(number) => {
                tracing::debug!(code = %game.game_code, round = number, "all memes rated");
                end_round(game, number, now, &mut changes)?;
            }
            _ => break,
        }
    }

    Ok(changes)
}

/// The phase change describing a freshly opened round
pub fn round_started(game: &Game, round: RoundNumber) -> Option<PhaseChange> {
    game.round(round).map(|r| PhaseChange::RoundStarted {
        round,
        creative_deadline: r.creative_deadline,
    })
}

fn is_current(game: &Game, round: RoundNumber, phase: RoundPhase) -> bool {
    game.current_round()
        .is_some_and(|r| r.round_number == round && r.phase == phase)
}

fn end_creative(
    game: &mut Game,
    round: RoundNumber,
    now: DateTime<Utc>,
    changes: &mut Vec<PhaseChange>,
) -> Result<(), GameError> {
    if game.end_creative_phase(round, now)? {
        changes.push(PhaseChange::CreativePhaseEnded {
            round,
            scoring_deadline: game.round(round).and_then(|r| r.scoring_deadline),
        });
    }
    Ok(())
}

fn end_round(
    game: &mut Game,
    round: RoundNumber,
    now: DateTime<Utc>,
    changes: &mut Vec<PhaseChange>,
) -> Result<(), GameError> {
    if let Some(end) = game.end_round(round, now)? {
        changes.push(PhaseChange::RoundEnded {
            round: end.round,
            scores: end.scores,
            game_completed: end.game_completed,
        });
    }
    Ok(())
}

fn start_next(game: &mut Game, now: DateTime<Utc>) -> Result<PhaseChange, GameError> {
    let round = game.start_next_round(now)?;
    round_started(game, round).ok_or(GameError::RoundNotFound(round))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::tests::{lobby, t0};
    use std::collections::BTreeMap;

    fn entries() -> BTreeMap<TextFieldId, String> {
        BTreeMap::from([("top".to_string(), "such meme".to_string())])
    }

    fn started(rounds: u32) -> Game {
        let mut game = lobby(GameOptions {
            require_ready: false,
            number_of_rounds: rounds,
            ..GameOptions::default()
        });
        game.add_player("bob", "Bob", None, t0()).unwrap();
        game.start("alice", t0()).unwrap();
        game
    }

    #[test]
    fn test_player_activity_without_progress_is_noop() {
        let mut game = started(1);
        game.add_submission(1, "alice", "drake", entries(), t0())
            .unwrap();
        let changes = advance(&mut game, Trigger::PlayerActivity, t0()).unwrap();
        assert!(changes.is_empty());
        assert_eq!(game.state, GameState::InProgress);
    }

    #[test]
    fn test_all_submitted_ends_creative_phase() {
        let mut game = started(1);
        game.add_submission(1, "alice", "drake", entries(), t0())
            .unwrap();
        game.add_submission(1, "bob", "doge", entries(), t0())
            .unwrap();

        let changes = advance(&mut game, Trigger::PlayerActivity, t0()).unwrap();
        assert_eq!(changes.len(), 1);
        assert!(matches!(
            changes[0],
            PhaseChange::CreativePhaseEnded { round: 1, .. }
        ));
        assert_eq!(game.state, GameState::Scoring);
    }

    #[test]
    fn test_deadline_after_early_advance_is_noop() {
        let mut game = started(1);
        game.add_submission(1, "alice", "drake", entries(), t0())
            .unwrap();
        game.add_submission(1, "bob", "doge", entries(), t0())
            .unwrap();
        advance(&mut game, Trigger::PlayerActivity, t0()).unwrap();
        let snapshot = game.clone();

        let changes = advance(&mut game, Trigger::CreativeDeadline(1), t0()).unwrap();
        assert!(changes.is_empty());
        assert_eq!(game, snapshot);
    }

    #[test]
    fn test_creative_deadline_with_no_submissions_finishes_round() {
        let mut game = started(2);
        let changes = advance(&mut game, Trigger::CreativeDeadline(1), t0()).unwrap();

        // Nothing to rate, so scoring settles immediately
        assert_eq!(changes.len(), 2);
        assert!(matches!(changes[1], PhaseChange::RoundEnded { round: 1, game_completed: false, .. }));
        assert_eq!(game.state, GameState::Scoring);
        assert_eq!(game.round(1).unwrap().phase, RoundPhase::Finished);
    }

    #[test]
    fn test_scoring_deadline_ends_round() {
        let mut game = started(1);
        game.add_submission(1, "alice", "drake", entries(), t0())
            .unwrap();
        advance(&mut game, Trigger::CreativeDeadline(1), t0()).unwrap();
        assert_eq!(game.round(1).unwrap().phase, RoundPhase::Scoring);

        let changes = advance(&mut game, Trigger::ScoringDeadline(1), t0()).unwrap();
        assert!(matches!(
            changes[..],
            [PhaseChange::RoundEnded { round: 1, game_completed: true, .. }]
        ));
        assert_eq!(game.state, GameState::Completed);
    }

    #[test]
    fn test_scoreboard_elapsed_opens_next_round() {
        let mut game = started(2);
        advance(&mut game, Trigger::CreativeDeadline(1), t0()).unwrap();

        // Stale round number does nothing
        let changes = advance(&mut game, Trigger::ScoreboardElapsed(7), t0()).unwrap();
        assert!(changes.is_empty());

        let changes = advance(&mut game, Trigger::ScoreboardElapsed(1), t0()).unwrap();
        assert!(matches!(changes[..], [PhaseChange::RoundStarted { round: 2, .. }]));
        assert_eq!(game.state, GameState::InProgress);

        // Duplicate fire is a no-op
        let changes = advance(&mut game, Trigger::ScoreboardElapsed(1), t0()).unwrap();
        assert!(changes.is_empty());
        assert_eq!(game.rounds.len(), 2);
    }

    #[test]
    fn test_ratings_complete_round() {
        let mut game = started(1);
        game.add_submission(1, "alice", "drake", entries(), t0())
            .unwrap();
        game.add_submission(1, "bob", "doge", entries(), t0())
            .unwrap();
        advance(&mut game, Trigger::PlayerActivity, t0()).unwrap();

        game.add_rating(1, "alice", "bob", 4, t0()).unwrap();
        assert!(advance(&mut game, Trigger::PlayerActivity, t0())
            .unwrap()
            .is_empty());

        game.add_rating(1, "bob", "alice", 3, t0()).unwrap();
        let changes = advance(&mut game, Trigger::PlayerActivity, t0()).unwrap();
        match &changes[..] {
            [PhaseChange::RoundEnded { scores, game_completed, .. }] => {
                assert!(game_completed);
                assert_eq!(scores.len(), 2);
            }
            other => panic!("unexpected changes: {other:?}"),
        }
    }
}
