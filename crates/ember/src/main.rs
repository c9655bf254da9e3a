//! Chat with a local Ollama model from the terminal.

#[macro_use]
extern crate tracing;

mod terminal;

use std::io::{IsTerminal, Write as _};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ember::core::transcript::render_messages;
use ember::core::{Conversation, Notification};
use ember::{Config, SessionBuilder};
use ember_ollama_model::OllamaProvider;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::terminal::Printer;

#[derive(Parser, Debug)]
#[command(name = "ember")]
#[command(about = "Chat with a model served by a local Ollama server", long_about = None)]
#[command(version)]
struct Cli {
    /// Address of the Ollama server, overrides EMBER_OLLAMA_HOST
    #[arg(long, global = true, value_name = "URL")]
    host: Option<String>,

    /// Model to chat with, overrides EMBER_MODEL
    #[arg(short, long, global = true, value_name = "NAME")]
    model: Option<String>,

    /// File the conversation is stored in, overrides EMBER_STATE_PATH
    #[arg(long, global = true, value_name = "PATH")]
    state: Option<PathBuf>,

    /// Fail right away when the server cannot be reached
    #[arg(long, global = true)]
    no_retry: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Chat in the terminal (default)
    Chat,
    /// Exchange JSON lines on stdin and stdout
    Bridge,
    /// Print the stored conversation
    History {
        /// Print the conversation as HTML
        #[arg(long)]
        html: bool,
    },
    /// Delete the stored conversation
    Clear,
}

impl Cli {
    fn config(&self) -> Config {
        let mut config = Config::from_env();
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(state) = &self.state {
            config.state_path = state.clone();
        }
        if self.no_retry {
            config.retry_policy = None;
        }
        config
    }
}

enum SessionEvent {
    Notification(Notification),
    Idle,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr, stdout carries the bridge protocol.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config();
    debug!("using {config:?}");

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => chat(&config).await,
        Command::Bridge => bridge(&config).await,
        Command::History { html } => history(&config, html).await,
        Command::Clear => clear(&config).await,
    }
}

fn session_builder(config: &Config) -> SessionBuilder {
    let provider = OllamaProvider::new(config.ollama_config());
    SessionBuilder::with_model_provider(provider)
        .with_retry_policy(config.retry_policy)
        .with_store(config.open_store())
}

async fn chat(config: &Config) -> anyhow::Result<()> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let session = session_builder(config)
        .restore_history(true)
        .on_notification({
            let event_tx = event_tx.clone();
            move |notification| {
                event_tx.send(SessionEvent::Notification(notification)).ok();
            }
        })
        .on_idle(move || {
            event_tx.send(SessionEvent::Idle).ok();
        })
        .build()
        .await
        .with_context(|| {
            format!("failed to load {}", config.state_path.display())
        })?;

    println!(
        "Chatting with {} at {}. Type /clear to start over, Ctrl-D to quit.",
        config.model, config.host
    );

    let mut printer = Printer::new(std::io::stdout().is_terminal());
    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")?
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    // The restored history arrives before the first idle event.
    if !wait_idle(&mut event_rx, &mut printer, None).await? {
        return Ok(());
    }

    // One reader for the whole chat, lines typed ahead stay buffered.
    let mut input = io::BufReader::new(io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = read_line(&mut input).await else {
            break;
        };
        match line.trim() {
            "/clear" => session.clear_history(),
            text => session.send_message(text),
        }

        if !wait_idle(&mut event_rx, &mut printer, Some(&progress_style))
            .await?
        {
            break;
        }
    }

    session.close().await;
    Ok(())
}

/// Prints notifications until the session becomes idle. Returns `false` if
/// the session is gone.
async fn wait_idle(
    event_rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
    printer: &mut Printer,
    progress_style: Option<&ProgressStyle>,
) -> anyhow::Result<bool> {
    let mut progress_bar: Option<ProgressBar> = None;

    loop {
        // Spin only while nothing of the reply is on screen.
        if let Some(progress_style) = progress_style {
            if !printer.is_streaming() {
                progress_bar
                    .get_or_insert_with(|| {
                        let progress_bar = ProgressBar::new_spinner();
                        progress_bar.set_style(progress_style.clone());
                        progress_bar.set_message("🤔 Thinking...");
                        progress_bar
                    })
                    .inc(1);
            }
        }

        let sleep = sleep(Duration::from_millis(100));
        let event = select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    return Ok(false);
                };
                event
            },
            _ = sleep => {
                continue;
            }
        };

        // Finish the progress bar before printing anything else.
        if let Some(progress_bar) = progress_bar.take() {
            progress_bar.finish_and_clear();
        }

        match event {
            SessionEvent::Notification(notification) => {
                print!("{}", printer.print(&notification));
                std::io::stdout().flush()?;
            }
            SessionEvent::Idle => return Ok(true),
        }
    }
}

async fn bridge(config: &Config) -> anyhow::Result<()> {
    let input = io::BufReader::new(io::stdin());
    ember::bridge::run(session_builder(config), input, io::stdout()).await?;
    Ok(())
}

async fn history(config: &Config, html: bool) -> anyhow::Result<()> {
    let conversation = Conversation::load(&config.open_store())
        .await
        .with_context(|| {
            format!("failed to load {}", config.state_path.display())
        })?;

    if html {
        println!("{}", render_messages(conversation.messages()));
        return Ok(());
    }
    if conversation.is_empty() {
        println!("No messages yet.");
        return Ok(());
    }
    let mut printer = Printer::new(std::io::stdout().is_terminal());
    for message in conversation.messages() {
        print!(
            "{}",
            printer.print(&Notification::AddMessage {
                message: message.clone(),
            })
        );
    }
    Ok(())
}

async fn clear(config: &Config) -> anyhow::Result<()> {
    Conversation::default()
        .save(&config.open_store())
        .await
        .with_context(|| {
            format!("failed to write {}", config.state_path.display())
        })?;
    println!("History cleared.");
    Ok(())
}

async fn read_line<R: AsyncBufRead + Unpin>(
    input: &mut Lines<R>,
) -> Option<String> {
    match input.next_line().await {
        Ok(line) => line,
        Err(err) => {
            error!("error reading input: {err}");
            None
        }
    }
}
