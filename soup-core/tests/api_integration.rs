//! Integration tests that call a real answer provider.
//!
//! These tests require DASHSCOPE_API_KEY, or OPENAI_API_BASE for an
//! OpenAI-compatible endpoint (via .env file or environment).
//! Run with: `cargo test -p soup-core --test api_integration -- --ignored`
//!
//! These are marked #[ignore] by default to avoid:
//! - API costs in CI
//! - Test failures when no credentials are available
//! - Slow test runs (API calls take seconds)

use soup_core::testing::sample_puzzle;
use soup_core::{AnswerGateway, ConfigProvider, APOLOGY};

/// Load environment variables from .env file
fn setup() {
    let _ = dotenvy::dotenv();
}

/// Provider settings from the environment, if any are present.
fn env_config() -> Option<ConfigProvider> {
    let mut config = ConfigProvider::default();
    let mut found = false;
    for (var, key) in [
        ("DASHSCOPE_API_KEY", "dashscope_api_key"),
        ("OPENAI_API_BASE", "open_ai_api_base"),
        ("OPENAI_API_KEY", "open_ai_api_key"),
    ] {
        if let Ok(value) = std::env::var(var) {
            config = config.with_value("api_config", key, value);
            found = true;
        }
    }
    found.then_some(config)
}

#[tokio::test]
#[ignore] // Run with: cargo test -p soup-core --test api_integration -- --ignored
async fn test_oracle_answers_yes_or_no() {
    setup();
    let Some(config) = env_config() else {
        eprintln!("Skipping test: no provider credentials set");
        return;
    };

    let gateway = AnswerGateway::from_settings(&config.api()).expect("Provider should build");
    let mut puzzle = sample_puzzle("easy_0", "海龟汤", &[]);
    puzzle.situation = "一个男人喝了一口海龟汤后自杀了。".to_string();
    puzzle.truth = "他曾遭遇海难，当年喝的“海龟汤”其实是人肉。".to_string();

    let answer = gateway.answer("他以前喝过海龟汤吗？", &puzzle).await;
    println!("Oracle ({}): {answer}", gateway.provider_name());

    assert_ne!(answer, APOLOGY, "Provider call should succeed");
    assert!(
        answer.contains('是') || answer.contains('否'),
        "Answer should be yes or no: {answer}"
    );
}

#[tokio::test]
#[ignore]
async fn test_bad_credentials_become_apology() {
    setup();

    let config = ConfigProvider::default()
        .with_value("api_config", "dashscope_api_key", "sk-invalid")
        .with_value("api_config", "timeout_secs", 10);
    let gateway = AnswerGateway::from_settings(&config.api()).expect("Provider should build");

    let answer = gateway
        .answer("他是船员吗？", &sample_puzzle("easy_0", "海龟汤", &[]))
        .await;
    assert_eq!(answer, APOLOGY);
}
