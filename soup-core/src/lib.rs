//! Turtle soup (lateral thinking puzzle) game engine with an AI oracle.
//!
//! This crate provides:
//! - A persistent story pool with built-in and player-contributed puzzles
//! - Per-player sessions with question, hint and time scoring
//! - An oracle that answers yes/no questions through an LLM provider
//! - A message handler that a chat host can plug in
//!
//! # Quick Start
//!
//! ```ignore
//! use soup_core::{InboundMessage, JsonFileStore, TurtleSoup};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(JsonFileStore::new("data"));
//!     let game = TurtleSoup::open(store).await?;
//!
//!     let outcome = game.handle(&InboundMessage::text("player-1", "开始汤 简单")).await;
//!     if let Some(text) = outcome.text() {
//!         println!("{text}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod gateway;
pub mod persist;
pub mod plugin;
pub mod puzzle;
pub mod session;
pub mod stories;
pub mod testing;

// Primary public API
pub use config::{ApiSettings, ConfigError, ConfigProvider, Keywords, Scoring};
pub use gateway::{AnswerGateway, AnswerProvider, GatewayError, ProviderError, APOLOGY};
pub use persist::{DocumentStore, JsonFileStore, MemoryStore, PersistError};
pub use plugin::{
    Command, ContentKind, HandleOutcome, InboundMessage, Reply, StartupError, TurtleSoup,
    PLUGIN_DESCRIPTION, PLUGIN_NAME, PLUGIN_TITLE, PLUGIN_VERSION,
};
pub use puzzle::{Puzzle, PuzzleDraft, PuzzleId, StoryCatalog, Tier};
pub use session::{
    GameSummary, HintOutcome, Session, SessionEngine, SessionError, SessionStatus, StartedGame,
};
pub use stories::{StoryError, StoryStore};
pub use testing::{ScriptedOracle, TestHarness};
