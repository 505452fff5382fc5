use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use super::{MAX_SCORE, MAX_TEXT_ENTRY_CHARS};
use crate::error::GameError;
use crate::types::*;

/// Result of finishing a round
#[derive(Debug, Clone, PartialEq)]
pub struct RoundEnd {
    pub round: RoundNumber,
    pub scores: Vec<RoundScore>,
    pub game_completed: bool,
}

impl GameRound {
    fn new(round_number: RoundNumber, now: DateTime<Utc>, creative_seconds: u64) -> Self {
        Self {
            round_number,
            phase: RoundPhase::Creative,
            submissions: BTreeMap::new(),
            ratings: Vec::new(),
            scores: Vec::new(),
            started_at: now,
            creative_deadline: now + seconds(creative_seconds),
            scoring_deadline: None,
            finished_at: None,
        }
    }

    /// Mean received rating per submission, in player join order
    pub(super) fn tally(&self, players: &[GamePlayer]) -> Vec<RoundScore> {
        players
            .iter()
            .filter_map(|p| self.submissions.get(&p.player_id))
            .map(|submission| {
                let received: Vec<u8> = self
                    .ratings
                    .iter()
                    .filter(|r| r.target_id == submission.player_id)
                    .map(|r| r.score)
                    .collect();

                let score = if received.is_empty() {
                    0.0
                } else {
                    received.iter().map(|&s| f64::from(s)).sum::<f64>() / received.len() as f64
                };

                RoundScore {
                    player_id: submission.player_id.clone(),
                    meme_id: submission.meme_id.clone(),
                    score,
                    ratings_received: received.len() as u32,
                }
            })
            .collect()
    }

    fn has_rated(&self, rater_id: &str, target_id: &str) -> bool {
        self.ratings
            .iter()
            .any(|r| r.rater_id == rater_id && r.target_id == target_id)
    }
}

fn seconds(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}

impl Game {
    pub fn round(&self, round_number: RoundNumber) -> Option<&GameRound> {
        self.rounds.iter().find(|r| r.round_number == round_number)
    }

    pub fn current_round(&self) -> Option<&GameRound> {
        self.rounds.last()
    }

    fn round_mut(&mut self, round_number: RoundNumber) -> Result<&mut GameRound, GameError> {
        self.rounds
            .iter_mut()
            .find(|r| r.round_number == round_number)
            .ok_or(GameError::RoundNotFound(round_number))
    }

    pub(super) fn open_round(&mut self, round_number: RoundNumber, now: DateTime<Utc>) -> RoundNumber {
        self.rounds
            .push(GameRound::new(round_number, now, self.options.creative_seconds));
        round_number
    }

    /// Submit (or replace) a player's meme for the creative phase
    pub fn add_submission(
        &mut self,
        round_number: RoundNumber,
        player_id: &str,
        meme_template_id: &str,
        text_entries: BTreeMap<TextFieldId, String>,
        now: DateTime<Utc>,
    ) -> Result<MemeSubmission, GameError> {
        let round = self
            .round(round_number)
            .ok_or(GameError::RoundNotFound(round_number))?;
        if round.phase != RoundPhase::Creative {
            return Err(GameError::PhaseClosed {
                round: round_number,
            });
        }
        if !self.has_player(player_id) {
            return Err(GameError::PlayerNotInGame(player_id.to_string()));
        }

        let meme_template_id = meme_template_id.trim();
        if meme_template_id.is_empty() {
            return Err(GameError::validation("meme template id must not be empty"));
        }
        let mut entries = BTreeMap::new();
        for (field, value) in text_entries {
            let value = value.trim();
            if value.chars().count() > MAX_TEXT_ENTRY_CHARS {
                return Err(GameError::validation(format!(
                    "text entry `{field}` exceeds {MAX_TEXT_ENTRY_CHARS} characters"
                )));
            }
            entries.insert(field, value.to_string());
        }

        // A resubmission keeps its meme id
        let meme_id = round
            .submissions
            .get(player_id)
            .map(|s| s.meme_id.clone())
            .unwrap_or_else(|| ulid::Ulid::new().to_string());

        let submission = MemeSubmission {
            meme_id,
            player_id: player_id.to_string(),
            meme_template_id: meme_template_id.to_string(),
            text_entries: entries,
            submitted_at: now,
        };
        self.round_mut(round_number)?
            .submissions
            .insert(player_id.to_string(), submission.clone());
        Ok(submission)
    }

    /// Rate another player's meme. The latest rating for a (rater, target) pair wins.
    pub fn add_rating(
        &mut self,
        round_number: RoundNumber,
        rater_id: &str,
        target_id: &str,
        score: i32,
        now: DateTime<Utc>,
    ) -> Result<Rating, GameError> {
        let score = u8::try_from(score)
            .ok()
            .filter(|s| i32::from(*s) <= MAX_SCORE)
            .ok_or(GameError::ScoreOutOfRange(score))?;
        if rater_id == target_id {
            return Err(GameError::SelfRating);
        }

        let round = self
            .round(round_number)
            .ok_or(GameError::RoundNotFound(round_number))?;
        if !self.has_player(rater_id) {
            return Err(GameError::PlayerNotInGame(rater_id.to_string()));
        }
        if round.phase != RoundPhase::Scoring {
            return Err(GameError::WrongPhase {
                round: round_number,
                expected: RoundPhase::Scoring,
                actual: round.phase,
            });
        }
        if !round.submissions.contains_key(target_id) {
            return Err(GameError::SubmissionNotFound {
                round: round_number,
                target: target_id.to_string(),
            });
        }

        let rating = Rating {
            rater_id: rater_id.to_string(),
            target_id: target_id.to_string(),
            score,
            rated_at: now,
        };

        let round = self.round_mut(round_number)?;
        match round
            .ratings
            .iter_mut()
            .find(|r| r.rater_id == rater_id && r.target_id == target_id)
        {
            Some(existing) => *existing = rating.clone(),
            None => round.ratings.push(rating.clone()),
        }
        Ok(rating)
    }

    /// Close the creative phase and open scoring.
    ///
    /// Returns `false` when the round is already past the creative phase, so
    /// a deadline and an early advance can both call this safely.
    pub fn end_creative_phase(
        &mut self,
        round_number: RoundNumber,
        now: DateTime<Utc>,
    ) -> Result<bool, GameError> {
        let scoring_seconds = self.options.scoring_seconds;
        let phase = self.round_mut(round_number)?.phase;
        if phase != RoundPhase::Creative {
            return Ok(false);
        }

        self.transition(GameState::Scoring)?;
        let round = self.round_mut(round_number)?;
        round.phase = RoundPhase::Scoring;
        round.scoring_deadline = Some(now + seconds(scoring_seconds));
        Ok(true)
    }

    /// Tally the round and finish it; completes the game after the last round.
    ///
    /// Returns `None` when the round is already finished.
    pub fn end_round(
        &mut self,
        round_number: RoundNumber,
        now: DateTime<Utc>,
    ) -> Result<Option<RoundEnd>, GameError> {
        let round = self
            .round(round_number)
            .ok_or(GameError::RoundNotFound(round_number))?;
        match round.phase {
            RoundPhase::Finished => return Ok(None),
            RoundPhase::Creative => {
                return Err(GameError::WrongPhase {
                    round: round_number,
                    expected: RoundPhase::Scoring,
                    actual: RoundPhase::Creative,
                })
            }
            RoundPhase::Scoring => {}
        }

        let scores = round.tally(&self.players);
        let game_completed = round_number >= self.options.number_of_rounds;
        if game_completed {
            self.transition(GameState::Completed)?;
            self.finished_at = Some(now);
        }

        let round = self.round_mut(round_number)?;
        round.phase = RoundPhase::Finished;
        round.finished_at = Some(now);
        round.scores = scores.clone();

        Ok(Some(RoundEnd {
            round: round_number,
            scores,
            game_completed,
        }))
    }

    /// Open the round after the most recently finished one
    pub fn start_next_round(&mut self, now: DateTime<Utc>) -> Result<RoundNumber, GameError> {
        self.require_state(GameState::Scoring, "start the next round")?;
        let previous = self
            .current_round()
            .ok_or(GameError::RoundNotFound(1))?;
        if previous.phase != RoundPhase::Finished {
            return Err(GameError::WrongPhase {
                round: previous.round_number,
                expected: RoundPhase::Finished,
                actual: previous.phase,
            });
        }
        let next = previous.round_number + 1;
        if next > self.options.number_of_rounds {
            return Err(GameError::RoundNotFound(next));
        }

        self.transition(GameState::InProgress)?;
        Ok(self.open_round(next, now))
    }

    /// Every player has a complete submission in the round
    pub fn all_submitted(&self, round_number: RoundNumber) -> bool {
        let Some(round) = self.round(round_number) else {
            return false;
        };
        !self.players.is_empty()
            && self.players.iter().all(|p| {
                round
                    .submissions
                    .get(&p.player_id)
                    .is_some_and(MemeSubmission::is_complete)
            })
    }

    /// Every player has rated every submission except their own
    pub fn all_rated(&self, round_number: RoundNumber) -> bool {
        let Some(round) = self.round(round_number) else {
            return false;
        };
        self.players.iter().all(|p| {
            round
                .submissions
                .keys()
                .filter(|target| **target != p.player_id)
                .all(|target| round.has_rated(&p.player_id, target))
        })
    }
}
