//! CLI commands

use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::api::{Message, NewMessage, RecordId, Session, SessionConfig};
use crate::config::Config;
use crate::core::AppState;
use crate::session::UpdateStrategy;
use crate::vnc::ViewerOptions;

#[derive(Parser)]
#[command(name = "agent-console")]
#[command(about = "Drive remote agent sessions and their sandbox desktop", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.agent-console/config.yml)
    #[arg(long)]
    config: Option<String>,

    /// Backend URL, overrides the config file
    #[arg(long)]
    api_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the backend is reachable
    Health,

    /// List sessions, newest first
    Sessions {
        #[arg(long, default_value = "0")]
        skip: u32,

        #[arg(long, default_value = "100")]
        limit: u32,
    },

    /// Show one session and its transcript
    Show {
        session_id: String,

        /// Keep following it while it is active (stream or poll)
        #[arg(long)]
        watch: Option<String>,
    },

    /// Start a new session
    Create {
        /// Initial prompt for the agent
        prompt: String,

        /// Model provider
        #[arg(long, default_value = "bedrock")]
        provider: String,

        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        system_prompt_suffix: Option<String>,

        #[arg(long)]
        max_tokens: Option<u32>,

        #[arg(long)]
        thinking_budget: Option<u32>,

        #[arg(long)]
        only_n_most_recent_images: Option<u32>,

        #[arg(long)]
        tool_version: Option<String>,

        /// Follow the session after creating it (stream or poll)
        #[arg(long)]
        watch: Option<String>,
    },

    /// Post a user message into a session
    Send { session_id: String, text: String },

    /// Block until a session finishes
    Wait {
        session_id: String,

        /// Seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },

    /// Remote desktop of the agent sandbox
    Vnc {
        #[command(subcommand)]
        action: VncCommand,
    },
}

#[derive(Subcommand)]
enum VncCommand {
    /// Service status
    Status,
    /// Start the services if needed and print the viewer URL
    Start,
    Stop,
    Restart,
    /// Print the viewer URL
    Url {
        #[arg(long)]
        view_only: bool,
    },
    /// Save a screenshot as PNG
    Screenshot {
        #[arg(long, default_value = "screenshot.png")]
        out: String,
    },
    Click {
        x: i32,
        y: i32,
        #[arg(long)]
        right: bool,
        #[arg(long)]
        double: bool,
    },
    Type {
        text: String,
    },
    Key {
        key: String,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(url) = cli.api_url {
        config.api.base_url = url;
    }
    tracing::debug!("Using backend at {}", config.api.base_url);

    // Create a multi-threaded runtime for CLI operations
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let state = AppState::new(config)?;
    rt.block_on(execute(state, cli.command))
}

async fn execute(state: AppState, command: Commands) -> Result<()> {
    match command {
        Commands::Health => {
            let health = state.api.health().await?;
            println!("{} ({})", health.message, state.api.base_url());
            Ok(())
        }

        Commands::Sessions { skip, limit } => {
            state.sessions.fetch_sessions(skip, limit).await?;
            let sessions = state.sessions.sorted_sessions();

            if sessions.is_empty() {
                println!("No sessions found");
            } else {
                for session in sessions {
                    print_session(&session);
                }
            }
            Ok(())
        }

        Commands::Show { session_id, watch } => {
            let id = RecordId::new(session_id);
            let strategy = parse_strategy(watch.as_deref())?;
            let session = state
                .messages
                .load_existing_session(&id, strategy.unwrap_or(UpdateStrategy::Poll))
                .await?;
            print_session(&session);

            if strategy.is_some() {
                follow(&state).await;
            } else {
                state.messages.stop_updates();
                TranscriptPrinter::default().render(&state.messages.messages());
                println!();
            }
            Ok(())
        }

        Commands::Create {
            prompt,
            provider,
            model,
            system_prompt_suffix,
            max_tokens,
            thinking_budget,
            only_n_most_recent_images,
            tool_version,
            watch,
        } => {
            let config = SessionConfig {
                model,
                system_prompt_suffix,
                max_tokens,
                thinking_budget,
                only_n_most_recent_images,
                tool_version,
            };

            match parse_strategy(watch.as_deref())? {
                Some(strategy) => {
                    let session = state
                        .messages
                        .start_new_session(&prompt, &provider, config, strategy)
                        .await?;
                    println!("Created session: {}", session.id);
                    follow(&state).await;
                }
                None => {
                    let session = state.api.sessions.create(&prompt, &provider, config).await?;
                    println!("Created session: {}", session.id);
                }
            }
            Ok(())
        }

        Commands::Send { session_id, text } => {
            let message = state
                .api
                .messages
                .create(&NewMessage::user_text(RecordId::new(session_id), text))
                .await?;
            println!("Sent message: {}", message.id);
            Ok(())
        }

        Commands::Wait { session_id, timeout } => {
            let (session, messages) = state
                .api
                .wait_for_completion(&RecordId::new(session_id), Duration::from_secs(timeout))
                .await?;
            print_session(&session);
            TranscriptPrinter::default().render(&messages);
            println!();
            Ok(())
        }

        Commands::Vnc { action } => run_vnc(&state, action).await,
    }
}

async fn run_vnc(state: &AppState, action: VncCommand) -> Result<()> {
    let desktop = &state.remote_desktop;

    match action {
        VncCommand::Status => {
            let status = state.api.vnc.status().await?;
            println!(
                "running: {}{}",
                status.is_running,
                status
                    .error
                    .map(|e| format!(" ({})", e))
                    .unwrap_or_default()
            );
        }
        VncCommand::Start => {
            connect_or_bail(state).await?;
            println!("{}", desktop.viewer_url(&ViewerOptions::default())?);
        }
        VncCommand::Stop => {
            state.api.vnc.stop().await?;
            println!("Stopped VNC services");
        }
        VncCommand::Restart => {
            state.api.vnc.restart().await?;
            println!("Restarting VNC services");
        }
        VncCommand::Url { view_only } => {
            let options = ViewerOptions {
                view_only,
                ..ViewerOptions::default()
            };
            println!("{}", desktop.viewer_url(&options)?);
        }
        VncCommand::Screenshot { out } => {
            connect_or_bail(state).await?;
            let screenshot = desktop.screenshot().await?;
            let bytes = screenshot
                .decode()
                .context("Screenshot payload is not valid base64")?;
            std::fs::write(&out, bytes).context("Failed to write screenshot")?;
            println!("Saved screenshot to {}", out);
        }
        VncCommand::Click {
            x,
            y,
            right,
            double,
        } => {
            connect_or_bail(state).await?;
            if right {
                desktop.right_click(x, y).await?;
            } else if double {
                desktop.double_click(x, y).await?;
            } else {
                desktop.click(x, y).await?;
            }
        }
        VncCommand::Type { text } => {
            connect_or_bail(state).await?;
            desktop.type_text(&text).await?;
        }
        VncCommand::Key { key } => {
            connect_or_bail(state).await?;
            desktop.key(&key).await?;
        }
    }
    Ok(())
}

async fn connect_or_bail(state: &AppState) -> Result<()> {
    if state.remote_desktop.connect().await {
        Ok(())
    } else {
        anyhow::bail!(state
            .remote_desktop
            .status()
            .error
            .unwrap_or_else(|| "VNC connection failed".to_string()))
    }
}

fn parse_strategy(raw: Option<&str>) -> Result<Option<UpdateStrategy>> {
    raw.map(|s| {
        UpdateStrategy::from_str(s)
            .with_context(|| format!("Unknown update strategy: {} (use stream or poll)", s))
    })
    .transpose()
}

fn print_session(session: &Session) {
    println!(
        "[{}] {} - {} ({}) - {}",
        session.id,
        session
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string()),
        session.provider,
        session.status,
        session.initial_prompt.chars().take(60).collect::<String>()
    );
}

/// Follow the coordinator until updates stop, printing the transcript as it grows
async fn follow(state: &AppState) {
    let mut rx = state.messages.coordinator().subscribe();
    let mut printer = TranscriptPrinter::default();

    loop {
        let snapshot = rx.borrow_and_update().clone();
        printer.render(&snapshot.messages);

        if !snapshot.phase.is_live() {
            println!();
            if let Some(status) = snapshot.status {
                println!("Session status: {}", status.status);
            }
            if let Some(err) = snapshot.last_error {
                eprintln!("Error: {}", err);
            }
            break;
        }

        if rx.changed().await.is_err() {
            break;
        }
    }
}

/// Prints each message once and streams growth of the last one
#[derive(Default)]
pub struct TranscriptPrinter {
    printed: HashMap<RecordId, usize>,
}

impl TranscriptPrinter {
    pub fn render(&mut self, messages: &[Message]) {
        let mut out = std::io::stdout().lock();
        let _ = self.render_to(&mut out, messages);
    }

    pub fn render_to(
        &mut self,
        out: &mut impl Write,
        messages: &[Message],
    ) -> std::io::Result<()> {
        for message in messages {
            let text = message.content.as_text();
            match self.printed.get_mut(&message.id) {
                None => {
                    write!(out, "\n[{}] {}", message.role.as_str(), text)?;
                    if message.has_image() {
                        write!(out, " [screenshot]")?;
                    }
                    self.printed.insert(message.id.clone(), text.len());
                }
                Some(seen) if text.len() > *seen => {
                    // Only whole appends are printed as growth
                    if let Some(tail) = text.get(*seen..) {
                        write!(out, "{}", tail)?;
                    }
                    *seen = text.len();
                }
                Some(_) => {}
            }
        }
        out.flush()
    }
}
