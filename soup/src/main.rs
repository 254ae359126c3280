//! Turtle soup console host.
//!
//! Plays the game from the terminal, one line per chat message:
//!
//! ```bash
//! cargo run -p soup -- --data-dir ./data --context alice
//! ```

mod headless;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "soup=info,soup_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let config = headless::parse_config_from_args(&args);
    if let Err(e) = headless::run_headless(config).await {
        eprintln!("Error: {e}");
        eprintln!("Set DASHSCOPE_API_KEY, or OPENAI_API_BASE for an OpenAI-compatible endpoint.");
        std::process::exit(1);
    }

    Ok(())
}

fn print_help() {
    println!("海龟汤 - lateral thinking puzzles with an AI host");
    println!();
    println!("USAGE:");
    println!("  soup [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  -h, --help          Show this help message");
    println!("  --data-dir <DIR>    Directory for config.json and stories.json");
    println!("                      (default: $TURTLE_SOUP_DATA or ./data)");
    println!("  --context <NAME>    Player context name (default: local)");
    println!("  --seed <N>          Fixed seed for puzzle and hint selection");
    println!();
    println!("ENVIRONMENT:");
    println!("  DASHSCOPE_API_KEY   DashScope credential (preferred provider)");
    println!("  OPENAI_API_BASE     OpenAI-compatible base URL");
    println!("  OPENAI_API_KEY      Key for the OpenAI-compatible endpoint");
    println!("  TURTLE_SOUP_MODEL   Model override");
    println!("  RUST_LOG            Log filter (e.g. soup_core=debug)");
}
