//! Testing utilities for the turtle soup game.
//!
//! This module provides tools for integration testing:
//! - `ScriptedOracle`, `FailingOracle` and `SlowOracle` in place of a real provider
//! - `TestHarness` for scripted game scenarios against an in-memory store
//! - Assertion helpers for verifying session state

use crate::config::ConfigProvider;
use crate::gateway::{AnswerGateway, AnswerProvider, ProviderError};
use crate::persist::{DocumentStore, MemoryStore};
use crate::plugin::{ContextId, HandleOutcome, InboundMessage, TurtleSoup};
use crate::puzzle::{Puzzle, StoryCatalog, Tier};
use crate::session::Session;
use crate::stories::StoryStore;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Answer returned once a [`ScriptedOracle`] runs out of scripted replies.
pub const DEFAULT_ORACLE_ANSWER: &str = "否。";

/// An oracle that returns scripted answers in order.
///
/// Every prompt it receives is recorded and can be inspected through
/// [`prompts`](Self::prompts), even after the oracle has been moved into a
/// gateway.
#[derive(Default)]
pub struct ScriptedOracle {
    answers: Mutex<VecDeque<String>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedOracle {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared log of received prompts.
    pub fn prompts(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.prompts)
    }
}

#[async_trait]
impl AnswerProvider for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn answer(&self, prompt: &str) -> Result<String, ProviderError> {
        self.prompts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(prompt.to_string());

        let next = self
            .answers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        Ok(next.unwrap_or_else(|| DEFAULT_ORACLE_ANSWER.to_string()))
    }
}

/// An oracle whose every call fails.
pub struct FailingOracle;

#[async_trait]
impl AnswerProvider for FailingOracle {
    fn name(&self) -> &str {
        "failing"
    }

    async fn answer(&self, _prompt: &str) -> Result<String, ProviderError> {
        Err(ProviderError::Other("scripted failure".to_string()))
    }
}

/// An oracle that sleeps before answering.
pub struct SlowOracle {
    delay: Duration,
}

impl SlowOracle {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl AnswerProvider for SlowOracle {
    fn name(&self) -> &str {
        "slow"
    }

    async fn answer(&self, _prompt: &str) -> Result<String, ProviderError> {
        tokio::time::sleep(self.delay).await;
        Ok("是。".to_string())
    }
}

/// A small catalog for tests.
///
/// Easy and medium puzzles carry hints, the hard puzzle has none and the
/// extreme tier is empty.
pub fn sample_catalog() -> StoryCatalog {
    let mut catalog = StoryCatalog::empty();
    catalog.push(
        Tier::Easy,
        sample_puzzle("easy_0", "雨夜", &["他没有带伞", "天上在下雨"]),
    );
    catalog.push(
        Tier::Medium,
        sample_puzzle("medium_0", "海龟汤", &["他曾经遭遇海难", "当年的汤不是海龟做的"]),
    );
    catalog.push(Tier::Hard, sample_puzzle("hard_0", "电梯", &[]));
    catalog
}

/// A puzzle whose text fields are derived from `title`.
pub fn sample_puzzle(id: &str, title: &str, hints: &[&str]) -> Puzzle {
    Puzzle {
        id: id.to_string(),
        title: title.to_string(),
        situation: format!("{title}的情境"),
        truth: format!("{title}的真相"),
        background: format!("{title}的背景"),
        hints: hints.iter().map(|h| h.to_string()).collect(),
    }
}

/// Test harness for running game scenarios.
pub struct TestHarness {
    /// The game under test.
    pub game: TurtleSoup,
    /// Backing store; inspect it to check persisted documents.
    pub store: Arc<MemoryStore>,
    /// Context used by [`input`](Self::input).
    pub context: ContextId,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl TestHarness {
    /// Harness over [`sample_catalog`] with default configuration.
    pub fn new() -> Self {
        Self::with_catalog(sample_catalog(), Vec::<String>::new())
    }

    /// Harness over `catalog`, with the oracle scripted to give `answers`.
    pub fn with_catalog<I, S>(catalog: StoryCatalog, answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_config(ConfigProvider::default(), catalog, answers)
    }

    pub fn with_config<I, S>(config: ConfigProvider, catalog: StoryCatalog, answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let oracle = ScriptedOracle::new(answers);
        let prompts = oracle.prompts();
        Self::build(config, catalog, AnswerGateway::with_provider(oracle), prompts)
    }

    /// Harness whose oracle is `provider`. [`prompts`](Self::prompts) stays
    /// empty since only a [`ScriptedOracle`] records them.
    pub fn with_provider(
        config: ConfigProvider,
        catalog: StoryCatalog,
        provider: impl AnswerProvider + 'static,
    ) -> Self {
        let gateway = AnswerGateway::with_provider(provider);
        Self::build(config, catalog, gateway, Arc::new(Mutex::new(Vec::new())))
    }

    fn build(
        config: ConfigProvider,
        catalog: StoryCatalog,
        gateway: AnswerGateway,
        prompts: Arc<Mutex<Vec<String>>>,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let backing: Arc<dyn DocumentStore> = store.clone();
        let stories = Arc::new(StoryStore::with_catalog(backing, catalog));

        let game = TurtleSoup::new(config, stories, gateway).with_seed(7);
        Self {
            game,
            store,
            context: "test".to_string(),
            prompts,
        }
    }

    /// Send text from the harness context.
    pub async fn input(&self, text: &str) -> HandleOutcome {
        self.game
            .handle(&InboundMessage::text(self.context.clone(), text))
            .await
    }

    /// Send text from another context.
    pub async fn input_from(&self, context: &str, text: &str) -> HandleOutcome {
        self.game.handle(&InboundMessage::text(context, text)).await
    }

    /// Send text and return the reply, or an empty string if ignored.
    pub async fn say(&self, text: &str) -> String {
        self.input(text)
            .await
            .text()
            .map(str::to_string)
            .unwrap_or_default()
    }

    pub fn session(&self) -> Option<Session> {
        self.game.session(&self.context)
    }

    pub fn score(&self) -> Option<i64> {
        self.session().map(|s| s.score())
    }

    pub fn is_active(&self) -> bool {
        self.session().is_some_and(|s| s.is_active())
    }

    /// Prompts the oracle has received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the harness context has a game in progress.
#[track_caller]
pub fn assert_active(harness: &TestHarness) {
    assert!(harness.is_active(), "Expected a game in progress");
}

/// Assert the harness context has no game in progress.
#[track_caller]
pub fn assert_idle(harness: &TestHarness) {
    assert!(!harness.is_active(), "Expected no game in progress");
}

/// Assert the current score.
#[track_caller]
pub fn assert_score(harness: &TestHarness, expected: i64) {
    assert_eq!(
        harness.score(),
        Some(expected),
        "Expected score {expected}, got {:?}",
        harness.score()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_oracle_runs_out() {
        let oracle = ScriptedOracle::new(["是"]);
        assert_eq!(oracle.answer("a").await.unwrap(), "是");
        assert_eq!(oracle.answer("b").await.unwrap(), DEFAULT_ORACLE_ANSWER);
        assert_eq!(*oracle.prompts().lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_failing_oracle() {
        assert!(FailingOracle.answer("a").await.is_err());
    }

    #[tokio::test]
    async fn test_harness_basic_game() {
        let harness = TestHarness::with_catalog(sample_catalog(), ["是的。"]);
        assert_idle(&harness);

        let reply = harness.say("开始汤").await;
        assert!(reply.contains("海龟汤的情境"));
        assert_active(&harness);
        assert_score(&harness, 100);

        assert_eq!(harness.say("他是船员吗？").await, "是的。");
        assert_score(&harness, 98);
        assert_eq!(harness.prompts().len(), 1);

        let reply = harness.say("结束汤").await;
        assert!(reply.contains("海龟汤的真相"));
        assert_idle(&harness);
    }

    #[test]
    fn test_sample_catalog_shape() {
        let catalog = sample_catalog();
        assert_eq!(catalog.tier(Tier::Easy).len(), 1);
        assert!(catalog.tier(Tier::Hard)[0].hints.is_empty());
        assert!(catalog.tier(Tier::Extreme).is_empty());
    }
}
