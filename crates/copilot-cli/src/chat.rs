//! Interactive chat mode with readline support.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use crossterm::ExecutableCommand;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span as Styled, Text};
use rustyline::error::ReadlineError;
use rustyline::history::FileHistory;
use rustyline::{Config as EditorConfig, Editor};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use copilot_core::{
    Message, Preview, Revealer, Role, Session, Span, TurnObserver, TurnOutcome, TurnRunner,
};

use crate::config::Config;
use crate::render::{self, RevealRenderer};

/// Chat commands
#[derive(Debug, PartialEq)]
enum ChatCommand {
    Quit,
    Clear,
    History,
    Help,
    Export(Option<String>),
    Projects,
    NewProject(String),
    OpenProject(String),
    DeleteProject(String),
    Save(String),
    Add(String),
    Copy(String),
    Preview(Option<String>),
    Key(String),
    System(String),
    Unknown(String),
    None(String), // Regular message
}

fn parse_command(input: &str) -> ChatCommand {
    let trimmed = input.trim();

    if !trimmed.starts_with('/') {
        return ChatCommand::None(trimmed.to_string());
    }

    let (cmd, arg) = match trimmed.split_once(' ') {
        Some((cmd, arg)) => (cmd.to_lowercase(), arg.trim().to_string()),
        None => (trimmed.to_lowercase(), String::new()),
    };
    let optional = |arg: String| if arg.is_empty() { None } else { Some(arg) };

    match cmd.as_str() {
        "/quit" | "/exit" | "/q" => ChatCommand::Quit,
        "/clear" | "/c" => ChatCommand::Clear,
        "/history" | "/h" => ChatCommand::History,
        "/help" | "/?" => ChatCommand::Help,
        "/export" => ChatCommand::Export(optional(arg)),
        "/projects" | "/p" => ChatCommand::Projects,
        "/new" => ChatCommand::NewProject(arg),
        "/open" => ChatCommand::OpenProject(arg),
        "/delete" => ChatCommand::DeleteProject(arg),
        "/save" => ChatCommand::Save(arg),
        "/add" => ChatCommand::Add(arg),
        "/copy" => ChatCommand::Copy(arg),
        "/preview" => ChatCommand::Preview(optional(arg)),
        "/key" => ChatCommand::Key(arg),
        "/system" | "/sys" => ChatCommand::System(arg),
        _ => ChatCommand::Unknown(cmd),
    }
}

fn print_help() {
    println!(
        r#"
Chat Commands:
  /help, /?           Show this help message
  /quit, /exit        Exit chat mode
  /clear, /c          Clear the conversation and the preview
  /history, /h        Show message count
  /export [path]      Export the conversation as JSON
  /system [prompt]    Show or set the system prompt
  /key <api-key>      Save the API key used for requests

Code blocks are labelled with an id like 1712345678901-1:
  /copy <id>          Copy a code block to the clipboard
  /add <id>           Append a code block to the current project
  /preview [id]       Toggle the preview, or show a code block in it

Projects:
  /projects, /p       List projects
  /new <name>         Create a project and select it
  /open <n>           Select project n and show its code
  /save <id>          Replace the current project's code with a code block
  /delete <n>         Delete project n

Tips:
  - Press Ctrl+C while a reply is being revealed to show it at once
  - Press Ctrl+D to exit
  - Up/Down arrows navigate history
"#
    );
}

fn print_status(msg: &str) {
    let mut stdout = std::io::stdout();
    let _ = stdout.execute(SetForegroundColor(Color::Cyan));
    println!("{}\n", msg);
    let _ = stdout.execute(ResetColor);
}

fn print_error(msg: &str) {
    let mut stdout = std::io::stdout();
    let _ = stdout.execute(SetForegroundColor(Color::Red));
    eprintln!("Error: {}\n", msg);
    let _ = stdout.execute(ResetColor);
}

/// Draws turn progress on the terminal.
pub struct TerminalObserver {
    renderer: RevealRenderer,
}

impl TerminalObserver {
    pub fn new() -> Self {
        Self {
            renderer: RevealRenderer::new(),
        }
    }

    fn frame(message_id: u64, spans: &[Span<'_>], revealing: bool) -> Text<'static> {
        let mut text = Text::from(assistant_label());
        text.extend(render::render_spans(message_id, spans, revealing));
        text
    }
}

impl Default for TerminalObserver {
    fn default() -> Self {
        Self::new()
    }
}

fn assistant_label() -> Line<'static> {
    Line::from(Styled::styled(
        "assistant>",
        Style::default()
            .fg(ratatui::style::Color::Cyan)
            .add_modifier(Modifier::BOLD),
    ))
}

impl TurnObserver for TerminalObserver {
    fn on_message_appended(&mut self, message: &Message) {
        // Failed turns append their error message directly.
        if message.role == Role::Assistant && !message.content.is_empty() {
            let _ = self.renderer.clear();
            render::print_message(message);
        }
    }

    fn on_waiting(&mut self) {
        let mut text = Text::from(assistant_label());
        text.push_line(Line::from(Styled::styled(
            "…",
            Style::default().add_modifier(Modifier::DIM),
        )));
        let _ = self.renderer.draw(&text);
    }

    fn on_reveal_tick(&mut self, message_id: u64, spans: &[Span<'_>]) {
        let _ = self.renderer.draw(&Self::frame(message_id, spans, true));
    }

    fn on_reveal_complete(&mut self, message: &Message, spans: &[Span<'_>]) {
        let _ = self.renderer.draw(&Self::frame(message.id, spans, false));
        self.renderer.finish();
    }

    fn on_preview(&mut self, preview: &Preview) {
        print_status(&format!(
            "Preview updated ({} lines). /preview to hide or show it.",
            preview.code.lines().count()
        ));
    }
}

/// Prints only the final reply; used when stdout is not a terminal.
pub struct PlainObserver;

impl TurnObserver for PlainObserver {
    fn on_reveal_complete(&mut self, message: &Message, _spans: &[Span<'_>]) {
        println!("{}", message.content);
    }
}

/// Everything the chat loop needs besides the session.
pub struct ChatContext<'a> {
    pub config: &'a Config,
    pub animate: bool,
}

impl ChatContext<'_> {
    fn runner(&self, session: &Session) -> Result<TurnRunner> {
        let relay = crate::build_relay(self.config, session.api_key())?;
        let revealer = Revealer::new(Duration::from_millis(self.config.chat.reveal_interval_ms));
        Ok(TurnRunner::new(relay, revealer).with_animation(self.animate))
    }
}

/// Run interactive chat mode
pub async fn run_chat(ctx: ChatContext<'_>, mut session: Session) -> Result<()> {
    let editor_config = EditorConfig::builder()
        .history_ignore_space(true)
        .history_ignore_dups(true)?
        .build();

    let history_path = Config::history_path();
    let mut rl: Editor<(), FileHistory> = Editor::with_config(editor_config)?;

    if let Some(path) = &history_path {
        let _ = rl.load_history(path);
    }

    let mut runner = ctx.runner(&session)?;
    let mut observer = TerminalObserver::new();

    for message in session.messages() {
        render::print_message(message);
    }
    println!("Chat mode started. Type /help for commands, /quit to exit.\n");

    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let _ = rl.add_history_entry(&line);

                match parse_command(&line) {
                    ChatCommand::Quit => {
                        println!("Goodbye!");
                        break;
                    }
                    ChatCommand::None(text) => {
                        if text.is_empty() {
                            continue;
                        }
                        let skip = CancellationToken::new();
                        let watcher = spawn_skip_on_interrupt(skip.clone());
                        let outcome = runner
                            .send_with_skip(&mut session, &text, &mut observer, &skip)
                            .await;
                        watcher.abort();
                        debug!(?outcome, "Turn finished");
                    }
                    ChatCommand::Key(key) => match session.set_api_key(&key) {
                        Ok(()) => {
                            runner = ctx.runner(&session)?;
                            print_status("API key saved.");
                        }
                        Err(e) => print_error(&e.to_string()),
                    },
                    command => {
                        if let Err(e) = handle_command(command, &mut session) {
                            print_error(&e.to_string());
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                break;
            }
        }
    }

    if let Some(path) = &history_path {
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        let _ = rl.save_history(path);
    }

    Ok(())
}

fn spawn_skip_on_interrupt(skip: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            skip.cancel();
        }
    })
}

/// Run one non-interactive turn and print the reply.
pub async fn run_once(ctx: ChatContext<'_>, mut session: Session, prompt: &str) -> Result<()> {
    let mut runner = ctx.runner(&session)?;
    let outcome = runner.send(&mut session, prompt, &mut PlainObserver).await;

    match outcome {
        TurnOutcome::Failed { message_id } => {
            let message = session
                .message(message_id)
                .map(|m| m.content.clone())
                .unwrap_or_default();
            anyhow::bail!(message)
        }
        TurnOutcome::Ignored => anyhow::bail!("Prompt is empty"),
        TurnOutcome::Completed { .. } => Ok(()),
    }
}

fn handle_command(command: ChatCommand, session: &mut Session) -> Result<()> {
    match command {
        ChatCommand::Clear => {
            session.clear();
            print_status("Conversation cleared.");
        }
        ChatCommand::History => {
            let count = session.messages().len();
            let user = session
                .messages()
                .iter()
                .filter(|m| m.role == Role::User)
                .count();
            print_status(&format!(
                "Messages in conversation: {} ({} from you, {} from the assistant)",
                count,
                user,
                count - user
            ));
        }
        ChatCommand::Help => print_help(),
        ChatCommand::Export(path) => {
            let path = session.export().write(path.map(PathBuf::from).as_deref())?;
            print_status(&format!("Exported to {}", path.display()));
        }
        ChatCommand::Projects => print_projects(session),
        ChatCommand::NewProject(name) => {
            let project = session.create_project(&name)?;
            print_status(&format!("Created project \"{}\".", project.name));
        }
        ChatCommand::OpenProject(arg) => {
            let id = project_id(session, &arg)?;
            let project = session.select_project(id)?;
            print_status(&format!("Opened \"{}\" ({}).", project.name, project.language));
            if !project.code.is_empty() {
                println!("{}\n", project.code);
            }
        }
        ChatCommand::DeleteProject(arg) => {
            let id = project_id(session, &arg)?;
            session.delete_project(id)?;
            print_status("Project deleted.");
        }
        ChatCommand::Save(code_id) => {
            let code = code_block(session, &code_id)?;
            let project = session.save_project(code)?;
            print_status(&format!("Saved \"{}\".", project.name));
        }
        ChatCommand::Add(code_id) => {
            let code = code_block(session, &code_id)?;
            let project = session.add_code_to_project(&code);
            print_status(&format!("Added code to \"{}\".", project.name));
        }
        ChatCommand::Copy(code_id) => {
            let code = code_block(session, &code_id)?;
            copy_to_clipboard(&code)?;
            print_status("Copied!");
        }
        ChatCommand::Preview(None) => {
            if session.toggle_preview() {
                render::print_preview(session.preview());
            } else if session.preview().code.is_empty() {
                print_status("Nothing to preview yet.");
            } else {
                print_status("Preview hidden.");
            }
        }
        ChatCommand::Preview(Some(code_id)) => {
            let code = code_block(session, &code_id)?;
            session.show_preview(code);
            render::print_preview(session.preview());
        }
        ChatCommand::System(prompt) => {
            if prompt.is_empty() {
                print_status(&format!("Current system prompt: {}", session.system_prompt()));
            } else {
                session.set_system_prompt(prompt);
                print_status("System prompt updated.");
            }
        }
        ChatCommand::Unknown(cmd) => {
            eprintln!("Unknown command: {}. Type /help for available commands.\n", cmd);
        }
        ChatCommand::Quit | ChatCommand::Key(_) | ChatCommand::None(_) => {}
    }
    Ok(())
}

fn code_block(session: &Session, code_id: &str) -> Result<String> {
    if code_id.is_empty() {
        anyhow::bail!("Missing code block id");
    }
    session
        .code_block(code_id)
        .ok_or_else(|| anyhow::anyhow!("No code block {}", code_id))
}

/// Resolve a 1-based position from `/projects` to a project id.
fn project_id(session: &Session, arg: &str) -> Result<u64> {
    let n: usize = arg
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Expected a project number, got \"{}\"", arg))?;
    n.checked_sub(1)
        .and_then(|i| session.projects().get(i))
        .map(|p| p.id)
        .ok_or_else(|| anyhow::anyhow!("No project {}", n))
}

pub fn print_projects(session: &Session) {
    if session.projects().is_empty() {
        println!("No projects yet. Create one with /new <name>.\n");
        return;
    }

    let current = session.current_project().map(|p| p.id);
    println!("Projects:");
    for (i, project) in session.projects().iter().enumerate() {
        let marker = if current == Some(project.id) { "*" } else { " " };
        println!(
            " {} {}. {} ({}, {} lines, updated {})",
            marker,
            i + 1,
            project.name,
            project.language,
            project.code.lines().count(),
            project.updated_at
        );
    }
    println!();
}

fn copy_to_clipboard(text: &str) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new().map_err(|e| {
        warn!("Failed to access clipboard: {}", e);
        anyhow::anyhow!("Failed to access clipboard: {}", e)
    })?;
    clipboard
        .set_text(text)
        .map_err(|e| anyhow::anyhow!("Failed to copy to clipboard: {}", e))
}
