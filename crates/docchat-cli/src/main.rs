//! docchat - ask questions about your documents from the terminal

mod config;
mod render;
mod replay;

use clap::Parser;
use docchat_session::{
    ChatSession, Outcome, SessionEvent, Theme, ThemeStore, intents, parse_tool_context,
};
use docchat_wire::{ChatBackend, Feedback, HttpBackend, Role};
use render::Renderer;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// docchat - chat with your data
#[derive(Parser, Debug)]
#[command(name = "docchat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Ask a single question and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Backend base URL (default: http://127.0.0.1:50505)
    #[arg(short, long)]
    backend_url: Option<String>,

    /// Use the history endpoint so the conversation is stored
    #[arg(long)]
    history: bool,

    /// Color theme (light, dark)
    #[arg(short, long)]
    theme: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Replay a captured response body instead of calling the backend
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Re-split the replayed body into chunks of this many bytes
    #[arg(long, requires = "replay")]
    chunk_size: Option<usize>,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose || std::env::var_os("RUST_LOG").is_some() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("docchat_cli=debug,docchat_session=debug,docchat_wire=debug")
        });
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let config = config::Config::load();

    let theme = match args.theme.as_deref() {
        Some(name) => Theme::parse(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown theme: {} (expected light or dark)", name))?,
        None => config.theme.unwrap_or_default(),
    };
    let themes = ThemeStore::new(theme);
    let color = std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    let renderer = Renderer::new(themes.subscribe(), color);

    if let Some(path) = &args.replay {
        let backend = replay::ReplayBackend::from_file(path, args.chunk_size)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let session = ChatSession::new(Arc::new(backend));
        let question = args
            .command
            .unwrap_or_else(|| format!("(replay of {})", path.display()));
        ask(&session, &question, &renderer).await?;
        return Ok(());
    }

    let backend_url = config.backend_url(args.backend_url.as_deref());
    let mut backend = HttpBackend::new(&backend_url)
        .with_history(args.history || config.history.unwrap_or(false));
    for (name, value) in &config.headers {
        backend = backend.with_header(name, value)?;
    }
    let backend = Arc::new(backend);

    // Non-interactive mode
    if let Some(command) = args.command {
        let session = ChatSession::new(backend);
        return ask(&session, &command, &renderer).await;
    }

    run_interactive(backend, &backend_url, &themes, &renderer).await
}

/// Ask one question, printing progress while it streams and the answer at the end.
///
/// Ctrl-C while the answer is streaming stops the request.
async fn ask(session: &ChatSession, question: &str, renderer: &Renderer) -> anyhow::Result<()> {
    let progress = std::io::stderr().is_terminal();
    let receiver = session.subscribe();
    let printer = tokio::spawn(print_progress(receiver, progress));

    let request = session.ask(question);
    tokio::pin!(request);
    let outcome = loop {
        tokio::select! {
            outcome = &mut request => break outcome,
            _ = tokio::signal::ctrl_c() => {
                let stopped = session.stop_generating();
                tracing::debug!(stopped, "Interrupted");
            }
        }
    };
    if outcome.is_err() {
        printer.abort();
    }
    let _ = printer.await;

    match outcome? {
        Outcome::Answered {
            messages,
            answer: Some(answer),
        } => {
            let searched = messages
                .iter()
                .find_map(parse_tool_context)
                .map(|context| intents(&context))
                .and_then(|intents| renderer.searched(&intents));
            if let Some(searched) = searched {
                println!("{}\n", searched);
            }
            println!("{}", renderer.answer(&answer));
        }
        Outcome::Answered { answer: None, .. } => println!("(no answer)"),
        Outcome::Failed(message) => println!("{}", renderer.error(&message)),
        Outcome::Cancelled => println!("[stopped]"),
    }
    Ok(())
}

/// Show a one-line progress indicator on stderr until the request ends
async fn print_progress(
    mut receiver: tokio::sync::broadcast::Receiver<SessionEvent>,
    enabled: bool,
) {
    let mut stderr = std::io::stderr();
    while let Ok(event) = receiver.recv().await {
        if event.is_terminal() {
            break;
        }
        if !enabled {
            continue;
        }
        match event {
            SessionEvent::RequestStart { .. } => {
                let _ = write!(stderr, "\rGenerating answer...");
            }
            SessionEvent::MessageUpdate {
                assistant: Some(message),
                ..
            } => {
                let _ = write!(stderr, "\rGenerating answer... {} chars", message.text().chars().count());
            }
            SessionEvent::ExecResults { results, .. } => {
                for result in results {
                    let _ = write!(stderr, "\r\x1b[2K[{}]\n", result.intent);
                }
            }
            _ => {}
        }
        let _ = stderr.flush();
    }
    if enabled {
        let _ = write!(stderr, "\r\x1b[2K");
        let _ = stderr.flush();
    }
}

async fn run_interactive(
    backend: Arc<HttpBackend>,
    backend_url: &str,
    themes: &ThemeStore,
    renderer: &Renderer,
) -> anyhow::Result<()> {
    // Show minimal startup info (only if TTY)
    if std::io::stderr().is_terminal() {
        let title = match backend.frontend_settings().await {
            Ok(settings) => settings.ui.title.unwrap_or_else(|| "docchat".to_string()),
            Err(e) => {
                tracing::debug!(error = %e, "Could not fetch frontend settings");
                "docchat".to_string()
            }
        };
        eprintln!("{} ({})", title, backend_url);
        eprintln!("Type /help for commands.");
        eprintln!();
    }

    let backend: Arc<dyn ChatBackend> = backend;
    let session = ChatSession::new(backend);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            // EOF or Ctrl-C at the prompt
            println!();
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" => break,
            "/new" => {
                session.new_conversation();
                println!("Started a new conversation.");
            }
            "/theme" => {
                let theme = themes.toggle();
                println!("Theme: {:?}", theme);
            }
            "/help" => {
                println!("/new              start a new conversation");
                println!("/source N         show the full text of source [N]");
                println!("/feedback VALUE   rate the last answer (positive, negative, ...)");
                println!("/theme            switch between light and dark");
                println!("/quit             exit");
                println!("Ctrl-C while an answer is streaming stops it.");
            }
            cmd if cmd.starts_with("/source") => {
                let number = cmd["/source".len()..].trim();
                let answer = session.last_answer();
                match answer.as_ref().and_then(|a| a.citation_for(number)) {
                    Some(citation) => println!("{}", renderer.source(citation)),
                    None => println!("No source [{}] in the last answer.", number),
                }
            }
            cmd if cmd.starts_with("/feedback") => {
                let value = cmd["/feedback".len()..].trim();
                if value.is_empty() {
                    println!("Usage: /feedback VALUE");
                } else {
                    rate_last_answer(&session, Feedback::from(value.to_string())).await;
                }
            }
            cmd if cmd.starts_with('/') => {
                println!("Unknown command: {}", cmd);
                println!("Type /help for available commands.");
            }
            question => {
                println!();
                ask(&session, question, renderer).await?;
            }
        }
        println!();
    }

    Ok(())
}

/// Attach feedback to the most recent answer of the conversation
async fn rate_last_answer(session: &ChatSession, feedback: Feedback) {
    let conversation = session.conversation();
    let Some(answer) = conversation
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
    else {
        println!("Nothing to rate yet.");
        return;
    };

    match session.send_feedback(&answer.id, feedback.clone()).await {
        Ok(()) => println!("Feedback recorded: {}", feedback.as_str()),
        Err(e) => println!("Could not record feedback: {}", e),
    }
}
