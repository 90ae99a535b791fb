use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;

const CONFIG_TEMPLATE: &str = r#"# copilot configuration
#
# The OpenAI API key is read from OPENAI_API_KEY by default, or from the key
# saved in chat with /key. Any value below can also be overridden with
# COPILOT_<SECTION>__<KEY>, e.g. COPILOT_RELAY__MODEL=gpt-4o-mini.

# data_dir = "~/.local/share/copilot"

# ── Relay ────────────────────────────────────────────────────────
# kind = "openai" calls the chat-completions API directly.
# kind = "http" posts {messages} to a relay endpoint that answers {reply}.

[relay]
kind = "openai"
# api_key = "sk-..."              # or set OPENAI_API_KEY env var
# base_url = "https://api.openai.com/v1"
model = "gpt-4o"
temperature = 0.7
max_tokens = 2000
timeout_secs = 120

# [relay]
# kind = "http"
# url = "http://localhost:3000/copilot/api/claude"

# ── Chat ─────────────────────────────────────────────────────────

[chat]
# system_prompt = "You are a helpful AI assistant."
reveal_interval_ms = 20
animate = true
"#;

pub fn run() -> Result<()> {
    let config_dir = Config::config_dir()?;
    let config_path = config_dir.join("config.toml");

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;

    if config_path.exists() {
        println!("Existing config file found:");
        println!("  {}", config_path.display());
        print!("\nOverwrite? (Existing file will be backed up) [y/N] ");

        use std::io::Write;
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Setup cancelled.");
            return Ok(());
        }

        backup_file(&config_path)?;
    }

    write_template(&config_path)?;
    println!("Created {}", config_path.display());

    println!("\nNext steps:");
    println!("  1. Set your API key:  export OPENAI_API_KEY=\"sk-...\"");
    println!("  2. Start chatting:    copilot");
    println!("  3. Or run a prompt:   copilot -p \"hello world\"");

    Ok(())
}

fn write_template(path: &Path) -> Result<()> {
    std::fs::write(path, CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Back up a file to <name>.bak, appending a timestamp if .bak already exists.
fn backup_file(path: &Path) -> Result<PathBuf> {
    let mut backup = path.with_extension("toml.bak");

    if backup.exists() {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        backup = path.with_extension(format!("toml.bak.{}", timestamp));
    }

    std::fs::rename(path, &backup)
        .with_context(|| format!("Failed to back up {} to {}", path.display(), backup.display()))?;
    println!("  Backed up to {}", backup.display());

    Ok(backup)
}
