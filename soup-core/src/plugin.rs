//! Host-facing message handler.
//!
//! [`TurtleSoup`] is what a chat runtime talks to: it receives one inbound
//! message at a time, classifies it into a [`Command`], runs it against the
//! story pool, the player's session or the oracle, and returns a reply.
//!
//! The host must deliver messages for the same context one at a time. The
//! session map is only locked for the synchronous part of a command; the
//! oracle call runs with no lock held.

use crate::config::{ConfigError, ConfigProvider, Keywords};
use crate::gateway::{AnswerGateway, GatewayError};
use crate::persist::DocumentStore;
use crate::puzzle::PuzzleDraft;
use crate::session::{Session, SessionEngine, SessionError};
use crate::stories::{StoryError, StoryStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub const PLUGIN_NAME: &str = "turtle_soup";
pub const PLUGIN_TITLE: &str = "海龟汤游戏";
pub const PLUGIN_DESCRIPTION: &str = "一个有趣的海龟汤文字推理游戏";
pub const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const ADD_STORY_COMMAND: &str = "添加故事";
pub const REMOVE_STORY_COMMAND: &str = "删除故事";

const NO_ACTIVE_GAME: &str = "当前没有进行中的游戏！";

/// Identifies one player conversation.
pub type ContextId = String;

/// Errors that prevent the handler from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Kind of inbound content. Only text is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentKind {
    #[default]
    Text,
    Other,
}

/// A message delivered by the host.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub context_id: ContextId,
    pub content: String,
    pub kind: ContentKind,
}

impl InboundMessage {
    pub fn text(context_id: impl Into<ContextId>, content: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
            content: content.into(),
            kind: ContentKind::Text,
        }
    }
}

/// Text sent back to the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
}

impl Reply {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// What the handler did with a message.
///
/// `Handled` tells the host to stop offering the message to other handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    Handled(Reply),
    Ignored,
}

impl HandleOutcome {
    fn reply(text: impl Into<String>) -> Self {
        HandleOutcome::Handled(Reply::new(text))
    }

    pub fn is_handled(&self) -> bool {
        matches!(self, HandleOutcome::Handled(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            HandleOutcome::Handled(reply) => Some(&reply.text),
            HandleOutcome::Ignored => None,
        }
    }
}

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// `添加故事 <tier> <json>`; `None` when the arguments are missing.
    AddStory(Option<(&'a str, &'a str)>),
    /// `删除故事 <id>`.
    RemoveStory(Option<&'a str>),
    /// `<start> [difficulty]`.
    Start(Option<&'a str>),
    End,
    Hint,
    /// Anything else; a question if a game is running.
    Text(&'a str),
}

impl<'a> Command<'a> {
    /// Classify trimmed message content.
    pub fn parse(content: &'a str, keywords: &Keywords) -> Self {
        if let Some(rest) = content.strip_prefix(ADD_STORY_COMMAND) {
            let args = rest
                .trim()
                .split_once(char::is_whitespace)
                .map(|(tier, body)| (tier, body.trim()))
                .filter(|(_, body)| !body.is_empty());
            return Command::AddStory(args);
        }

        if let Some(rest) = content.strip_prefix(REMOVE_STORY_COMMAND) {
            return Command::RemoveStory(rest.split_whitespace().next());
        }

        if !keywords.start.is_empty() && content.starts_with(&keywords.start) {
            return Command::Start(content.split_whitespace().nth(1));
        }

        if content == keywords.end {
            return Command::End;
        }

        if content == keywords.tip {
            return Command::Hint;
        }

        Command::Text(content)
    }
}

/// The turtle soup game as a message handler.
pub struct TurtleSoup {
    config: ConfigProvider,
    keywords: Keywords,
    engine: SessionEngine,
    gateway: AnswerGateway,
    sessions: Mutex<HashMap<ContextId, Session>>,
}

impl TurtleSoup {
    /// Load configuration and stories from `store` and build the oracle.
    ///
    /// Fails if the configuration cannot be established or no oracle
    /// provider is configured.
    pub async fn open(store: Arc<dyn DocumentStore>) -> Result<Self, StartupError> {
        let config = ConfigProvider::load_or_init(store.as_ref()).await?;
        Self::from_config(config, store).await
    }

    /// Like [`open`](Self::open) with an already-loaded configuration.
    pub async fn from_config(
        config: ConfigProvider,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Self, StartupError> {
        let gateway = AnswerGateway::from_settings(&config.api())?;
        let stories = Arc::new(StoryStore::open(store).await);
        Ok(Self::new(config, stories, gateway))
    }

    pub fn new(config: ConfigProvider, stories: Arc<StoryStore>, gateway: AnswerGateway) -> Self {
        let engine = SessionEngine::new(stories, config.scoring());
        Self {
            keywords: config.keywords(),
            config,
            engine,
            gateway,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Use a fixed seed for puzzle and hint selection.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.engine = self.engine.with_seed(seed);
        self
    }

    pub fn config(&self) -> &ConfigProvider {
        &self.config
    }

    pub fn stories(&self) -> &Arc<StoryStore> {
        self.engine.stories()
    }

    pub fn engine(&self) -> &SessionEngine {
        &self.engine
    }

    /// A copy of the session for `context_id`, if one exists.
    pub fn session(&self, context_id: &str) -> Option<Session> {
        self.lock_sessions().get(context_id).cloned()
    }

    /// Handle one inbound message.
    pub async fn handle(&self, message: &InboundMessage) -> HandleOutcome {
        if message.kind != ContentKind::Text {
            return HandleOutcome::Ignored;
        }

        let content = message.content.trim();
        let ctx = message.context_id.as_str();

        match Command::parse(content, &self.keywords) {
            Command::AddStory(args) => self.add_story(args).await,
            Command::RemoveStory(id) => self.remove_story(id).await,
            Command::Start(difficulty) => self.start(ctx, difficulty),
            Command::End => self.end(ctx),
            Command::Hint => self.hint(ctx),
            Command::Text(question) => self.ask(ctx, question).await,
        }
    }

    async fn add_story(&self, args: Option<(&str, &str)>) -> HandleOutcome {
        let Some((tier_name, body)) = args else {
            return HandleOutcome::reply("添加故事失败: 格式错误");
        };

        let Some(tier) = self.config.resolve_tier(tier_name) else {
            let e = StoryError::UnknownTier(tier_name.to_string());
            return HandleOutcome::reply(format!("添加故事失败: {e}"));
        };

        let draft: PuzzleDraft = match serde_json::from_str(body) {
            Ok(draft) => draft,
            Err(e) => {
                let e = StoryError::Validation(format!("invalid JSON: {e}"));
                return HandleOutcome::reply(format!("添加故事失败: {e}"));
            }
        };

        match self.stories().add_custom(draft, tier).await {
            Ok(id) => HandleOutcome::reply(format!("添加自定义故事成功！故事ID：{id}")),
            Err(e @ StoryError::Validation(_)) => HandleOutcome::reply(format!(
                "添加自定义故事失败，请检查格式是否正确。\n{e}"
            )),
            Err(e) => HandleOutcome::reply(format!("添加故事失败: {e}")),
        }
    }

    async fn remove_story(&self, id: Option<&str>) -> HandleOutcome {
        let Some(id) = id else {
            return HandleOutcome::reply("删除故事失败: 请提供故事ID");
        };

        match self.stories().remove_custom(id).await {
            Ok(true) => HandleOutcome::reply("删除自定义故事成功！"),
            Ok(false) => {
                HandleOutcome::reply("删除故事失败，可能故事ID不存在或不是自定义故事。")
            }
            Err(e) => HandleOutcome::reply(format!("删除故事失败: {e}")),
        }
    }

    fn start(&self, ctx: &str, difficulty: Option<&str>) -> HandleOutcome {
        let tier = difficulty.and_then(|d| self.config.resolve_tier(d));
        tracing::debug!(context = ctx, ?tier, "Start requested");

        let mut sessions = self.lock_sessions();
        let session = sessions.entry(ctx.to_string()).or_default();
        let outcome = match self.engine.start_game(session, tier) {
            Ok(started) => HandleOutcome::reply(started.to_string()),
            Err(e) => HandleOutcome::reply(session_error_text(&e)),
        };
        // A failed first start leaves nothing behind.
        if !session.is_active() {
            sessions.remove(ctx);
        }
        outcome
    }

    fn end(&self, ctx: &str) -> HandleOutcome {
        let mut sessions = self.lock_sessions();
        let Some(session) = sessions.get_mut(ctx) else {
            return HandleOutcome::reply(NO_ACTIVE_GAME);
        };

        // The end of a game is the single time-penalty checkpoint.
        self.engine.update_score(session);
        let outcome = match self.engine.end_game(session) {
            Ok(summary) => HandleOutcome::reply(summary.to_string()),
            Err(e) => HandleOutcome::reply(session_error_text(&e)),
        };
        sessions.remove(ctx);
        outcome
    }

    fn hint(&self, ctx: &str) -> HandleOutcome {
        let mut sessions = self.lock_sessions();
        let Some(session) = sessions.get_mut(ctx) else {
            return HandleOutcome::reply(NO_ACTIVE_GAME);
        };

        match self.engine.get_hint(session) {
            Ok(hint) => HandleOutcome::reply(hint.to_string()),
            Err(e) => HandleOutcome::reply(session_error_text(&e)),
        }
    }

    async fn ask(&self, ctx: &str, question: &str) -> HandleOutcome {
        let puzzle = {
            let mut sessions = self.lock_sessions();
            let Some(session) = sessions.get_mut(ctx).filter(|s| s.is_active()) else {
                return HandleOutcome::Ignored;
            };
            let score = self.engine.apply_question_penalty(session);
            tracing::debug!(context = ctx, score, "Question charged");
            session.active_puzzle().cloned()
        };

        let Some(puzzle) = puzzle else {
            return HandleOutcome::Ignored;
        };

        HandleOutcome::reply(self.gateway.answer(question, &puzzle).await)
    }

    /// Usage instructions with the configured keywords.
    pub fn help_text(&self) -> String {
        let levels = self
            .config
            .difficulty_levels()
            .into_keys()
            .collect::<Vec<_>>()
            .join("、");
        let Keywords { start, end, tip } = &self.keywords;

        format!(
            "海龟汤文字推理游戏帮助：\n\
             1. 发送\"{start} [难度]\"开始游戏，难度可选：{levels}\n\
             2. 通过是/否问题来推理故事真相\n\
             3. 发送\"{tip}\"获取提示\n\
             4. 发送\"{end}\"结束游戏\n\n\
             自定义故事：\n\
             5. 发送\"{ADD_STORY_COMMAND} [难度] {{故事数据}}\"添加自定义故事\n\
             6. 发送\"{REMOVE_STORY_COMMAND} [故事ID]\"删除自定义故事\n\n\
             故事数据格式例：\n\
             {{\n    \"title\": \"标题\",\n    \"situation\": \"情境描述\",\n    \
             \"truth\": \"真相\",\n    \"background\": \"背景故事\",\n    \
             \"hints\": [\"提示1\", \"提示2\", \"提示3\"]\n}}"
        )
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<ContextId, Session>> {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn session_error_text(error: &SessionError) -> String {
    match error {
        SessionError::NoActiveGame => NO_ACTIVE_GAME.to_string(),
        SessionError::EmptyTier(tier) => {
            format!("该难度（{tier}）暂无可用的故事，请换个难度试试。")
        }
        SessionError::NoHintsAvailable => "这个故事没有提示。".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords() -> Keywords {
        ConfigProvider::default().keywords()
    }

    #[test]
    fn test_parse_start() {
        let kw = keywords();
        assert_eq!(Command::parse("开始汤", &kw), Command::Start(None));
        assert_eq!(Command::parse("开始汤 简单", &kw), Command::Start(Some("简单")));
        assert_eq!(Command::parse("开始汤简单", &kw), Command::Start(None));
    }

    #[test]
    fn test_parse_end_and_hint_are_exact() {
        let kw = keywords();
        assert_eq!(Command::parse("结束汤", &kw), Command::End);
        assert_eq!(Command::parse("提示", &kw), Command::Hint);
        assert_eq!(Command::parse("提示一下", &kw), Command::Text("提示一下"));
        assert_eq!(Command::parse("结束汤吧", &kw), Command::Text("结束汤吧"));
    }

    #[test]
    fn test_parse_add_story() {
        let kw = keywords();
        assert_eq!(
            Command::parse("添加故事 hard {\"title\": \"a b\"}", &kw),
            Command::AddStory(Some(("hard", "{\"title\": \"a b\"}")))
        );
        assert_eq!(Command::parse("添加故事 hard", &kw), Command::AddStory(None));
        assert_eq!(Command::parse("添加故事", &kw), Command::AddStory(None));
    }

    #[test]
    fn test_parse_remove_story() {
        let kw = keywords();
        assert_eq!(
            Command::parse("删除故事 custom_1 extra", &kw),
            Command::RemoveStory(Some("custom_1"))
        );
        assert_eq!(Command::parse("删除故事", &kw), Command::RemoveStory(None));
    }

    #[test]
    fn test_parse_custom_keywords() {
        let kw = Keywords {
            start: "soup".to_string(),
            end: "stop".to_string(),
            tip: "hint".to_string(),
        };
        assert_eq!(Command::parse("soup hard", &kw), Command::Start(Some("hard")));
        assert_eq!(Command::parse("stop", &kw), Command::End);
        assert_eq!(Command::parse("开始汤", &kw), Command::Text("开始汤"));
    }

    #[test]
    fn test_session_error_text() {
        assert_eq!(session_error_text(&SessionError::NoActiveGame), NO_ACTIVE_GAME);
        assert!(session_error_text(&SessionError::EmptyTier(crate::puzzle::Tier::Hard))
            .contains("hard"));
    }
}
