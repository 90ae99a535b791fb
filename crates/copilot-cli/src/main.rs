use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use copilot_core::{JsonFileStore, MemoryStore, Relay, Session};
use copilot_relay::{HttpRelay, OpenAIRelay};

mod chat;
mod config;
mod render;
mod setup;

use chat::ChatContext;
use config::{Config, RelayKind};

/// Log level for tracing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Most verbose: every reveal tick
    Trace,
    /// Verbose: relay requests, reveal start and stop
    Debug,
    /// Standard: session loading, replies received
    Info,
    /// Quiet: only warnings and errors
    Warn,
    /// Minimal: only errors
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Parser)]
#[command(name = "copilot")]
#[command(author, version, about = "Copilot: chat with an AI assistant about code", long_about = None)]
pub struct Cli {
    /// Prompt to send (one turn, no animation, nothing saved)
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Model to use (overrides config)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Base URL for the chat-completions API (overrides config)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Use a `{messages} -> {reply}` relay endpoint instead of the API
    #[arg(long)]
    pub relay_url: Option<String>,

    /// System prompt (overrides config)
    #[arg(short, long)]
    pub system: Option<String>,

    /// Temperature (0.0-2.0)
    #[arg(short, long)]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Show replies at once instead of revealing them
    #[arg(long)]
    pub no_animate: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_enum, default_value = "warn")]
    pub log_level: LogLevel,

    /// Enable debug logging (shorthand for --log-level debug)
    #[arg(short, long)]
    pub debug: bool,

    /// Write logs to file (JSON-lines format)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat (default)
    Chat,
    /// Export the saved conversation as JSON
    Export {
        /// Output file or directory (default: ./copilot-chat-YYYY-MM-DD.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List saved projects
    Projects,
    /// Show current configuration
    Config,
    /// Initialize configuration files in ~/.config/copilot
    Setup,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let interactive = cli.prompt.is_none()
        && matches!(cli.command, None | Some(Commands::Chat))
        && atty::is(atty::Stream::Stdout);

    // Resolve log level: --debug overrides --log-level
    let log_level = if cli.debug {
        LogLevel::Debug
    } else {
        cli.log_level
    };

    let filter = EnvFilter::new(log_level.as_filter());

    if interactive && cli.log_file.is_none() {
        // The reveal redraws the terminal in place: suppress tracing output
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::sink)
            .init();
    } else if let Some(log_path) = &cli.log_file {
        let file = std::fs::File::create(log_path)
            .with_context(|| format!("Failed to create log file: {:?}", log_path))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::sync::Mutex::new(file)))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    // Handle setup before config is loaded
    if matches!(&cli.command, Some(Commands::Setup)) {
        return setup::run();
    }

    let mut config = Config::load()?;
    apply_overrides(&cli, &mut config);

    let data_dir = config.data_dir()?;
    tracing::debug!(data_dir = %data_dir.display(), "Using data directory");

    if let Some(prompt) = &cli.prompt {
        // One-shot turns use the saved credential but leave history alone.
        let saved = Session::load(Box::new(JsonFileStore::new(&data_dir)), "")?;
        let mut session =
            Session::load(Box::new(MemoryStore::new()), config.chat.system_prompt.as_str())?;
        if let Some(key) = saved.api_key() {
            session.set_api_key(key)?;
        }
        let ctx = ChatContext {
            config: &config,
            animate: false,
        };
        return chat::run_once(ctx, session, prompt).await;
    }

    let session = Session::load(
        Box::new(JsonFileStore::new(&data_dir)),
        config.chat.system_prompt.as_str(),
    )
    .with_context(|| format!("Failed to load saved chat from {}", data_dir.display()))?;

    match cli.command {
        Some(Commands::Export { output }) => {
            let path = session.export().write(output.as_deref())?;
            println!("Exported {} messages to {}", session.messages().len(), path.display());
            Ok(())
        }
        Some(Commands::Projects) => {
            chat::print_projects(&session);
            Ok(())
        }
        Some(Commands::Config) => show_config(&config, &data_dir),
        Some(Commands::Setup) => Ok(()),
        Some(Commands::Chat) | None => {
            let ctx = ChatContext {
                config: &config,
                animate: interactive && config.chat.animate,
            };
            if interactive {
                chat::run_chat(ctx, session).await
            } else {
                anyhow::bail!("Interactive chat needs a terminal; use -p for a single prompt")
            }
        }
    }
}

/// CLI flags win over config and environment.
fn apply_overrides(cli: &Cli, config: &mut Config) {
    if let Some(model) = &cli.model {
        config.relay.model = model.clone();
    }
    if let Some(base_url) = &cli.base_url {
        config.relay.base_url = Some(base_url.clone());
    }
    if let Some(url) = &cli.relay_url {
        config.relay.kind = RelayKind::Http;
        config.relay.url = Some(url.clone());
    }
    if let Some(system) = &cli.system {
        config.chat.system_prompt = system.clone();
    }
    if let Some(temperature) = cli.temperature {
        config.relay.temperature = temperature;
    }
    if let Some(max_tokens) = cli.max_tokens {
        config.relay.max_tokens = max_tokens;
    }
    if cli.no_animate {
        config.chat.animate = false;
    }
}

/// Key for the chat-completions API: config or `OPENAI_API_KEY` first, then
/// the key stored with `/key`.
fn resolve_api_key(config: &Config, saved_key: Option<&str>) -> Option<String> {
    config.api_key().or_else(|| {
        saved_key
            .filter(|key| !key.trim().is_empty())
            .map(str::to_string)
    })
}

fn openai_relay(config: &Config, saved_key: Option<&str>) -> OpenAIRelay {
    let mut relay = OpenAIRelay::new(resolve_api_key(config, saved_key))
        .with_model(config.relay.model.as_str())
        .with_temperature(config.relay.temperature)
        .with_max_tokens(config.relay.max_tokens)
        .with_timeout(Duration::from_secs(config.relay.timeout_secs));
    if let Some(base_url) = &config.relay.base_url {
        relay = relay.with_base_url(base_url.as_str());
    }
    relay
}

/// Build the relay described by `config`. `saved_key` is the key stored with
/// `/key`, used when neither the config nor the environment provides one.
pub fn build_relay(config: &Config, saved_key: Option<&str>) -> Result<Arc<dyn Relay>> {
    match config.relay.kind {
        RelayKind::Openai => {
            let relay = openai_relay(config, saved_key);
            if !relay.has_api_key() {
                tracing::warn!("No API key configured; requests will fail until one is set with /key");
            }
            Ok(Arc::new(relay))
        }
        RelayKind::Http => {
            let url = config
                .relay
                .url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("relay.kind = \"http\" requires relay.url"))?;
            let timeout = Duration::from_secs(config.relay.timeout_secs);
            Ok(Arc::new(HttpRelay::new(url).with_timeout(timeout)))
        }
    }
}

fn show_config(config: &Config, data_dir: &std::path::Path) -> Result<()> {
    println!("Configuration:");
    println!("  Config file: {}", Config::config_path()?.display());
    println!("  Data directory: {}", data_dir.display());

    println!("\nRelay:");
    match config.relay.kind {
        RelayKind::Openai => {
            println!("  Kind: openai");
            println!("  Model: {}", config.relay.model);
            println!("  Temperature: {}", config.relay.temperature);
            println!("  Max tokens: {}", config.relay.max_tokens);
            if let Some(base_url) = &config.relay.base_url {
                println!("  Base URL: {}", base_url);
            }
            if config.api_key().is_some() {
                println!("  API key: (configured)");
            }
        }
        RelayKind::Http => {
            println!("  Kind: http");
            println!("  URL: {}", config.relay.url.as_deref().unwrap_or("(not set)"));
        }
    }
    println!("  Timeout: {}s", config.relay.timeout_secs);

    println!("\nChat:");
    let prompt = &config.chat.system_prompt;
    let preview: String = prompt.chars().take(60).collect::<String>().replace('\n', " ");
    if prompt.chars().count() > 60 {
        println!("  System: {}...", preview);
    } else {
        println!("  System: {}", preview);
    }
    println!("  Animate: {}", config.chat.animate);
    println!("  Reveal interval: {}ms", config.chat.reveal_interval_ms);
    Ok(())
}
