//! Headless mode for the turtle soup game.
//!
//! A line-oriented console host: every input line is delivered to the game
//! as a text message from one player context, and the reply is printed.

use soup_core::stories::catalog_from_document;
use soup_core::{
    ConfigProvider, DocumentStore, HandleOutcome, InboundMessage, JsonFileStore, StartupError,
    TurtleSoup, PLUGIN_DESCRIPTION, PLUGIN_NAME, PLUGIN_TITLE, PLUGIN_VERSION,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// Stories installed when the data directory has none yet.
const BUNDLED_STORIES: &str = include_str!("../data/stories.json");

/// Settings for a headless run.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    pub data_dir: PathBuf,
    pub context: String,
    pub seed: Option<u64>,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            data_dir: std::env::var("TURTLE_SOUP_DATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            context: "local".to_string(),
            seed: None,
        }
    }
}

/// Build the game from the data directory, applying environment overrides.
pub async fn open_game(config: &HeadlessConfig) -> Result<TurtleSoup, StartupError> {
    let store: Arc<dyn DocumentStore> = Arc::new(JsonFileStore::new(&config.data_dir));

    let settings = apply_env_overrides(ConfigProvider::load_or_init(store.as_ref()).await?);
    let mut game = TurtleSoup::from_config(settings, store).await?;
    if let Some(seed) = config.seed {
        game = game.with_seed(seed);
    }

    match serde_json::from_str(BUNDLED_STORIES) {
        Ok(document) => {
            if let Err(e) = game
                .stories()
                .seed_if_missing(catalog_from_document(&document))
                .await
            {
                tracing::warn!("Could not install bundled stories: {}", e);
            }
        }
        Err(e) => tracing::warn!("Bundled stories are not valid JSON: {}", e),
    }

    Ok(game)
}

/// Provider credentials from the environment win over the config file.
fn apply_env_overrides(mut config: ConfigProvider) -> ConfigProvider {
    for (var, key) in [
        ("DASHSCOPE_API_KEY", "dashscope_api_key"),
        ("OPENAI_API_BASE", "open_ai_api_base"),
        ("OPENAI_API_KEY", "open_ai_api_key"),
        ("TURTLE_SOUP_MODEL", "model"),
    ] {
        if let Ok(value) = std::env::var(var) {
            if !value.trim().is_empty() {
                config = config.with_value("api_config", key, value);
            }
        }
    }
    config
}

/// One-line identification of the game, e.g. `海龟汤游戏 (turtle_soup) v0.1.0`.
pub fn plugin_banner() -> String {
    format!("{PLUGIN_TITLE} ({PLUGIN_NAME}) v{PLUGIN_VERSION}: {PLUGIN_DESCRIPTION}")
}

/// Run the game in headless mode.
///
/// Lines starting with `#` are console commands; everything else is sent
/// to the game as a chat message.
pub async fn run_headless(config: HeadlessConfig) -> Result<(), StartupError> {
    let game = open_game(&config).await?;
    let mut context = config.context.clone();

    println!("=== 海龟汤 Headless Mode ===");
    println!("{}", plugin_banner());
    println!("Data: {}", config.data_dir.display());
    println!("Stories: {}", game.stories().catalog().len());
    println!();
    println!("Commands:");
    println!("  #quit            - Exit");
    println!("  #help            - Show game help");
    println!("  #status          - Show current session");
    println!("  #context <name>  - Switch player context");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('#') {
            let parts: Vec<&str> = command.split_whitespace().collect();
            match parts.first().copied() {
                Some("quit") | Some("exit") => {
                    println!("再见！");
                    break;
                }
                Some("help") => {
                    println!("{}", plugin_banner());
                    println!("{}", game.help_text());
                }
                Some("status") => match game.session(&context) {
                    Some(session) if session.is_active() => {
                        let title = session
                            .active_puzzle()
                            .map(|p| p.title.as_str())
                            .unwrap_or_default();
                        println!("[STATUS] {context}: 《{title}》 score {}", session.score());
                    }
                    _ => println!("[STATUS] {context}: idle"),
                },
                Some("context") => match parts.get(1) {
                    Some(name) => {
                        context = name.to_string();
                        println!("[CONTEXT] {context}");
                    }
                    None => println!("[ERROR] Usage: #context <name>"),
                },
                _ => println!("[ERROR] Unknown command. Type #help for help."),
            }
            stdout.flush().ok();
            continue;
        }

        let message = InboundMessage::text(context.clone(), line);
        match game.handle(&message).await {
            HandleOutcome::Handled(reply) => {
                println!("{}", reply.text);
                println!();
            }
            HandleOutcome::Ignored => {
                println!("[IGNORED] 没有进行中的游戏，发送\"#help\"查看玩法。");
            }
        }
        stdout.flush().ok();
    }

    Ok(())
}

/// Parse headless settings from command line arguments.
pub fn parse_config_from_args(args: &[String]) -> HeadlessConfig {
    let mut config = HeadlessConfig::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--data-dir" => {
                if let Some(dir) = args.get(i + 1) {
                    config.data_dir = PathBuf::from(dir);
                    i += 1;
                }
            }
            "--context" => {
                if let Some(context) = args.get(i + 1) {
                    config.context = context.clone();
                    i += 1;
                }
            }
            "--seed" => {
                if let Some(seed) = args.get(i + 1) {
                    config.seed = seed.parse().ok();
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }

    config
}
