//! Game configuration.
//!
//! The configuration is a JSON document with named sections. Values are read
//! through [`ConfigProvider::get`], which falls back to the caller's default
//! for anything missing or of the wrong type.

use crate::persist::{DocumentStore, PersistError};
use crate::puzzle::Tier;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Document key under which the configuration is stored.
pub const CONFIG_KEY: &str = "config";

pub const DEFAULT_START_KEYWORD: &str = "开始汤";
pub const DEFAULT_END_KEYWORD: &str = "结束汤";
pub const DEFAULT_TIP_KEYWORD: &str = "提示";
pub const DEFAULT_PENALTY_PER_QUESTION: i64 = 2;
pub const DEFAULT_MAX_SCORE: i64 = 100;
pub const DEFAULT_PENALTY_TIME_FACTOR: f64 = 0.5;
pub const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 30;

/// Errors that prevent the configuration from being established.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access configuration store: {0}")]
    Store(#[from] PersistError),

    #[error("Invalid configuration document: {0}")]
    Invalid(String),
}

/// Command keywords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keywords {
    pub start: String,
    pub end: String,
    pub tip: String,
}

/// Scoring constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scoring {
    pub penalty_per_question: i64,
    pub max_score: i64,
    /// Points lost per elapsed minute when the time penalty is applied.
    pub penalty_time_factor: f64,
}

impl Default for Scoring {
    fn default() -> Self {
        Self {
            penalty_per_question: DEFAULT_PENALTY_PER_QUESTION,
            max_score: DEFAULT_MAX_SCORE,
            penalty_time_factor: DEFAULT_PENALTY_TIME_FACTOR,
        }
    }
}

/// Oracle provider settings from the `api_config` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiSettings {
    /// Primary provider credential.
    pub dashscope_api_key: Option<String>,
    /// Secondary provider endpoint (OpenAI-compatible base URL).
    pub open_ai_api_base: Option<String>,
    pub open_ai_api_key: Option<String>,
    /// Model override for whichever provider is selected.
    pub model: Option<String>,
    pub timeout_secs: u64,
}

/// Read-mostly access to the configuration document.
#[derive(Debug, Clone)]
pub struct ConfigProvider {
    document: Value,
}

impl ConfigProvider {
    /// Load the configuration, seeding and persisting the defaults on first use.
    ///
    /// Any store failure is fatal: the game must not run on defaults it
    /// cannot record.
    pub async fn load_or_init(store: &dyn DocumentStore) -> Result<Self, ConfigError> {
        match store.load(CONFIG_KEY).await {
            Ok(Some(document)) => {
                if !document.is_object() {
                    tracing::error!("Configuration document is not an object");
                    return Err(ConfigError::Invalid(
                        "top level must be an object".to_string(),
                    ));
                }
                tracing::info!("Loaded configuration");
                Ok(Self { document })
            }
            Ok(None) => {
                let document = Self::default_document();
                if let Err(e) = store.save(CONFIG_KEY, &document).await {
                    tracing::error!("Failed to save default configuration: {}", e);
                    return Err(e.into());
                }
                tracing::info!("Seeded default configuration");
                Ok(Self { document })
            }
            Err(e) => {
                tracing::error!("Failed to load configuration: {}", e);
                Err(e.into())
            }
        }
    }

    /// Wrap an already-loaded document.
    pub fn from_document(document: Value) -> Self {
        Self { document }
    }

    /// The documented default configuration.
    pub fn default_document() -> Value {
        json!({
            "keywords": {
                "start": DEFAULT_START_KEYWORD,
                "end": DEFAULT_END_KEYWORD,
                "tip": DEFAULT_TIP_KEYWORD
            },
            "scoring": {
                "penalty_per_question": DEFAULT_PENALTY_PER_QUESTION,
                "max_score": DEFAULT_MAX_SCORE,
                "penalty_time_factor": DEFAULT_PENALTY_TIME_FACTOR
            },
            "game_settings": {
                "difficulty_levels": {
                    "简单": "easy",
                    "中等": "medium",
                    "高等": "hard",
                    "炼狱": "extreme"
                }
            }
        })
    }

    /// Set a value, creating the section if needed.
    pub fn with_value(mut self, section: &str, key: &str, value: impl Into<Value>) -> Self {
        if !self.document.is_object() {
            self.document = json!({});
        }
        if let Some(root) = self.document.as_object_mut() {
            let section = root
                .entry(section.to_string())
                .or_insert_with(|| json!({}));
            if !section.is_object() {
                *section = json!({});
            }
            if let Some(section) = section.as_object_mut() {
                section.insert(key.to_string(), value.into());
            }
        }
        self
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Get a configured value, or `default` if missing or mistyped.
    pub fn get<T: DeserializeOwned>(&self, section: &str, key: &str, default: T) -> T {
        self.document
            .get(section)
            .and_then(|s| s.get(key))
            .filter(|v| !v.is_null())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or(default)
    }

    fn get_non_empty(&self, section: &str, key: &str) -> Option<String> {
        self.get::<Option<String>>(section, key, None)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn keywords(&self) -> Keywords {
        Keywords {
            start: self.get("keywords", "start", DEFAULT_START_KEYWORD.to_string()),
            end: self.get("keywords", "end", DEFAULT_END_KEYWORD.to_string()),
            tip: self.get("keywords", "tip", DEFAULT_TIP_KEYWORD.to_string()),
        }
    }

    pub fn scoring(&self) -> Scoring {
        Scoring {
            penalty_per_question: self.get(
                "scoring",
                "penalty_per_question",
                DEFAULT_PENALTY_PER_QUESTION,
            ),
            max_score: self.get("scoring", "max_score", DEFAULT_MAX_SCORE),
            penalty_time_factor: self.get(
                "scoring",
                "penalty_time_factor",
                DEFAULT_PENALTY_TIME_FACTOR,
            ),
        }
    }

    /// Display name -> tier name.
    pub fn difficulty_levels(&self) -> BTreeMap<String, String> {
        self.get("game_settings", "difficulty_levels", BTreeMap::new())
    }

    /// Resolve a display name (e.g. `简单`) or a tier name (e.g. `easy`).
    pub fn resolve_tier(&self, name: &str) -> Option<Tier> {
        let name = name.trim();
        self.difficulty_levels()
            .get(name)
            .and_then(|tier| tier.parse().ok())
            .or_else(|| name.parse().ok())
    }

    pub fn api(&self) -> ApiSettings {
        ApiSettings {
            dashscope_api_key: self.get_non_empty("api_config", "dashscope_api_key"),
            open_ai_api_base: self.get_non_empty("api_config", "open_ai_api_base"),
            open_ai_api_key: self.get_non_empty("api_config", "open_ai_api_key"),
            model: self.get_non_empty("api_config", "model"),
            timeout_secs: self.get("api_config", "timeout_secs", DEFAULT_ORACLE_TIMEOUT_SECS),
        }
    }
}

impl Default for ConfigProvider {
    fn default() -> Self {
        Self::from_document(Self::default_document())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryStore;

    #[test]
    fn test_get_falls_back_to_default() {
        let config = ConfigProvider::default();
        assert_eq!(config.get("scoring", "max_score", 0i64), 100);
        assert_eq!(config.get("scoring", "missing", 7i64), 7);
        assert_eq!(config.get("nope", "missing", "x".to_string()), "x");
        // Wrong type also falls back
        assert_eq!(config.get("keywords", "start", 3i64), 3);
    }

    #[test]
    fn test_default_sections() {
        let config = ConfigProvider::default();
        let keywords = config.keywords();
        assert_eq!(keywords.start, "开始汤");
        assert_eq!(keywords.end, "结束汤");
        assert_eq!(keywords.tip, "提示");
        assert_eq!(config.scoring(), Scoring::default());
        assert_eq!(config.difficulty_levels().len(), 4);
    }

    #[test]
    fn test_resolve_tier() {
        let config = ConfigProvider::default();
        assert_eq!(config.resolve_tier("简单"), Some(Tier::Easy));
        assert_eq!(config.resolve_tier("炼狱"), Some(Tier::Extreme));
        assert_eq!(config.resolve_tier("hard"), Some(Tier::Hard));
        assert_eq!(config.resolve_tier("地狱"), None);
    }

    #[test]
    fn test_with_value_and_api() {
        let config = ConfigProvider::default()
            .with_value("api_config", "dashscope_api_key", "  ")
            .with_value("api_config", "open_ai_api_base", "http://localhost:8080/v1")
            .with_value("api_config", "timeout_secs", 5);
        let api = config.api();
        assert_eq!(api.dashscope_api_key, None);
        assert_eq!(api.open_ai_api_base.as_deref(), Some("http://localhost:8080/v1"));
        assert_eq!(api.timeout_secs, 5);
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config = ConfigProvider::from_document(json!({"scoring": {"max_score": 50}}));
        let scoring = config.scoring();
        assert_eq!(scoring.max_score, 50);
        assert_eq!(scoring.penalty_per_question, 2);
        assert_eq!(config.keywords().start, "开始汤");
        assert!(config.difficulty_levels().is_empty());
    }

    #[tokio::test]
    async fn test_load_or_init_seeds_defaults() {
        let store = MemoryStore::new();
        let config = ConfigProvider::load_or_init(&store).await.unwrap();
        assert_eq!(config.scoring().max_score, 100);
        assert_eq!(
            store.document(CONFIG_KEY),
            Some(ConfigProvider::default_document())
        );
    }

    #[tokio::test]
    async fn test_load_or_init_keeps_existing() {
        let store = MemoryStore::new()
            .with_document(CONFIG_KEY, json!({"keywords": {"start": "来碗汤"}}));
        let config = ConfigProvider::load_or_init(&store).await.unwrap();
        assert_eq!(config.keywords().start, "来碗汤");
    }

    #[tokio::test]
    async fn test_load_or_init_save_failure_is_fatal() {
        let store = MemoryStore::new().failing_saves();
        let result = ConfigProvider::load_or_init(&store).await;
        assert!(matches!(result, Err(ConfigError::Store(_))));
    }

    #[tokio::test]
    async fn test_load_or_init_rejects_non_object() {
        let store = MemoryStore::new().with_document(CONFIG_KEY, json!([1, 2]));
        let result = ConfigProvider::load_or_init(&store).await;
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
