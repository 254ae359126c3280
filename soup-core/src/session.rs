//! Game sessions and the rules that drive them.
//!
//! A [`Session`] is plain data owned by whoever tracks the player context.
//! [`SessionEngine`] applies transitions to it:
//!
//! ```text
//! idle --start_game--> active --end_game--> idle (returns GameSummary)
//!                      active --start_game--> active (fresh puzzle)
//! ```

use crate::config::Scoring;
use crate::puzzle::{Puzzle, Tier};
use crate::stories::{StoryError, StoryStore};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Points lost for each hint, independent of the configured question penalty.
pub const HINT_PENALTY: i64 = 5;

/// Errors from session transitions.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No active game")]
    NoActiveGame,

    #[error("No puzzles available for difficulty '{0}'")]
    EmptyTier(Tier),

    #[error("The current puzzle has no hints")]
    NoHintsAvailable,
}

/// Whether a session has a puzzle in play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Active,
}

/// The game state of one player context.
#[derive(Debug, Clone, Default)]
pub struct Session {
    active_puzzle: Option<Puzzle>,
    score: i64,
    started_at: Option<SystemTime>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> SessionStatus {
        if self.active_puzzle.is_some() {
            SessionStatus::Active
        } else {
            SessionStatus::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        self.status() == SessionStatus::Active
    }

    pub fn active_puzzle(&self) -> Option<&Puzzle> {
        self.active_puzzle.as_ref()
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn started_at(&self) -> Option<SystemTime> {
        self.started_at
    }

    /// Subtract points, never going below zero.
    fn deduct(&mut self, points: i64) {
        self.score = (self.score - points.max(0)).max(0);
    }
}

/// Result of starting a game.
#[derive(Debug, Clone)]
pub struct StartedGame {
    pub tier: Tier,
    pub title: String,
    pub situation: String,
    pub score: i64,
}

impl fmt::Display for StartedGame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "【海龟汤】\n\n{}\n\n请开始提问吧！记住只能问是/否问题。",
            self.situation
        )
    }
}

/// The reveal produced when a game ends.
#[derive(Debug, Clone)]
pub struct GameSummary {
    pub title: String,
    pub truth: String,
    pub background: String,
    pub final_score: i64,
}

impl fmt::Display for GameSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "游戏结束！\n最终得分：{}分\n\n【真相揭秘】\n{}\n\n【背景故事】\n{}",
            self.final_score, self.truth, self.background
        )
    }
}

/// A hint and the score after paying for it.
#[derive(Debug, Clone)]
pub struct HintOutcome {
    pub hint: String,
    pub score: i64,
}

impl fmt::Display for HintOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "提示：{}\n当前得分：{}", self.hint, self.score)
    }
}

/// Applies game rules to sessions.
pub struct SessionEngine {
    stories: Arc<StoryStore>,
    scoring: Scoring,
    rng: Mutex<StdRng>,
}

impl SessionEngine {
    /// Create an engine with an entropy-seeded random source.
    pub fn new(stories: Arc<StoryStore>, scoring: Scoring) -> Self {
        Self {
            stories,
            scoring,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Use a fixed seed for puzzle and hint selection.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn stories(&self) -> &Arc<StoryStore> {
        &self.stories
    }

    pub fn scoring(&self) -> Scoring {
        self.scoring
    }

    /// Start (or restart) a game with a random puzzle from `tier`.
    ///
    /// `None` means medium. An empty tier fails without touching the session.
    pub fn start_game(
        &self,
        session: &mut Session,
        tier: Option<Tier>,
    ) -> Result<StartedGame, SessionError> {
        self.start_game_at(session, tier, SystemTime::now())
    }

    /// [`start_game`](Self::start_game) with an explicit start time.
    pub fn start_game_at(
        &self,
        session: &mut Session,
        tier: Option<Tier>,
        now: SystemTime,
    ) -> Result<StartedGame, SessionError> {
        let tier = tier.unwrap_or_default();
        let puzzle = {
            let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
            self.stories
                .pick_random(tier, &mut *rng)
                .map_err(|e| match e {
                    StoryError::EmptyTier(t) => SessionError::EmptyTier(t),
                    _ => SessionError::EmptyTier(tier),
                })?
        };

        if session.is_active() {
            tracing::debug!("Restarting active game with a new puzzle");
        }

        // A misconfigured negative maximum still starts at the floor.
        let score = self.scoring.max_score.max(0);
        let started = StartedGame {
            tier,
            title: puzzle.title.clone(),
            situation: puzzle.situation.clone(),
            score,
        };

        tracing::info!(puzzle = %puzzle.id, %tier, "Game started");
        session.active_puzzle = Some(puzzle);
        session.score = score;
        session.started_at = Some(now);

        Ok(started)
    }

    /// End the game, revealing the truth. The session becomes idle.
    pub fn end_game(&self, session: &mut Session) -> Result<GameSummary, SessionError> {
        let puzzle = session
            .active_puzzle
            .take()
            .ok_or(SessionError::NoActiveGame)?;
        session.started_at = None;

        tracing::info!(puzzle = %puzzle.id, score = session.score, "Game ended");
        Ok(GameSummary {
            title: puzzle.title,
            truth: puzzle.truth,
            background: puzzle.background,
            final_score: session.score,
        })
    }

    /// Reveal a random hint for [`HINT_PENALTY`] points. Hints may repeat.
    pub fn get_hint(&self, session: &mut Session) -> Result<HintOutcome, SessionError> {
        let puzzle = session
            .active_puzzle
            .as_ref()
            .ok_or(SessionError::NoActiveGame)?;

        let hint = {
            let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
            puzzle
                .hints
                .choose(&mut *rng)
                .cloned()
                .ok_or(SessionError::NoHintsAvailable)?
        };

        session.deduct(HINT_PENALTY);
        Ok(HintOutcome {
            hint,
            score: session.score,
        })
    }

    /// Charge for asking a question. Does nothing when idle.
    ///
    /// Returns the score after the deduction.
    pub fn apply_question_penalty(&self, session: &mut Session) -> i64 {
        if session.is_active() {
            session.deduct(self.scoring.penalty_per_question);
        }
        session.score
    }

    /// Apply the elapsed-time penalty since the game started.
    ///
    /// Callers must invoke this at most once per scoring checkpoint; each
    /// call charges for the full elapsed time again.
    pub fn update_score(&self, session: &mut Session) -> i64 {
        self.update_score_at(session, SystemTime::now())
    }

    /// [`update_score`](Self::update_score) against an explicit clock.
    pub fn update_score_at(&self, session: &mut Session, now: SystemTime) -> i64 {
        let Some(started_at) = session.started_at.filter(|_| session.is_active()) else {
            return session.score;
        };

        let elapsed = now.duration_since(started_at).unwrap_or(Duration::ZERO);
        let minutes = elapsed.as_secs_f64() / 60.0;
        let penalty = (minutes * self.scoring.penalty_time_factor).floor() as i64;
        session.deduct(penalty);
        session.score
    }
}
