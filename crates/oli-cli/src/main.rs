mod config;
mod lifecycle;

use anyhow::{Context, Result};
use clap::Parser;
use oli_core::ChatClient;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "oli",
    about = "Chat with OpenRouter models from the terminal, streaming answers to stdout or a filter",
    version
)]
struct Cli {
    /// Prompt (when stdin is a terminal). Without one, starts an interactive chat.
    prompt: Vec<String>,

    /// OpenRouter API key
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    apikey: Option<String>,

    /// Model identifier (default: google/gemini-2.5-flash)
    #[arg(long, short = 'm', env = "OLI_MODEL")]
    model: Option<String>,

    /// System prompt
    #[arg(long, env = "OLI_SYSTEM")]
    system: Option<String>,

    /// Shell command each answer is piped through (e.g. "glow -")
    #[arg(long, env = "OLI_PIPE")]
    pipe: Option<String>,

    /// Enable web search
    #[arg(long, short = 'o')]
    online: bool,

    /// Use a role preset from the config file
    #[arg(long, short = 'r')]
    role: Option<String>,

    /// Config file (default: ./.oli.yaml, then ~/.oli.yaml)
    #[arg(long, env = "OLI_CONFIG")]
    config: Option<PathBuf>,

    /// API base URL
    #[arg(long, env = "OLI_BASE_URL")]
    base_url: Option<String>,
}

impl Cli {
    fn overrides(&self) -> config::Overrides {
        config::Overrides {
            apikey: self.apikey.clone(),
            model: self.model.clone(),
            system: self.system.clone(),
            pipe: self.pipe.clone(),
            base_url: self.base_url.clone(),
            role: self.role.clone(),
            online: self.online,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(e) = run(cli) {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let file = config::load(cli.config.as_deref())?;
    let chat_config = config::resolve(file, cli.overrides())?;
    let client = ChatClient::new(chat_config).context("invalid configuration")?;
    let input = lifecycle::Input::detect(std::io::stdin().is_terminal(), &cli.prompt);
    tracing::debug!(?input, "starting session");

    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let result = rt.block_on(lifecycle::run(client, input));
    // A blocking stdin read may still be parked on a runtime thread.
    rt.shutdown_timeout(Duration::from_millis(100));
    result
}
