#![recursion_limit = "256"]

mod action;
mod app;
mod auth;
mod batch;
mod classify;
mod config;
mod error;
mod event;
mod github;
mod keys;
mod optimistic;
mod seen;
mod source;
mod tabs;
mod timer;
mod tui;
mod types;
mod ui;

use std::fs::OpenOptions;
use std::panic;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::action::Action;
use crate::app::{App, Timing};
use crate::config::Config;
use crate::event::Event;
use crate::github::GitHub;
use crate::seen::SeenStore;
use crate::timer::TokioScheduler;
use crate::tui::EventHandler;

/// Triage GitHub pull request notifications from the terminal
#[derive(Debug, Parser)]
#[command(name = "prinbox", version, about)]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds between background refreshes
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Where to keep the seen/done history
    #[arg(long)]
    seen_file: Option<PathBuf>,

    /// Write logs here instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let writer = match &cli.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(cli.log_file.is_none()),
        )
        .init();

    let mut config = Config::load(cli.config.as_deref());
    if let Some(secs) = cli.poll_interval {
        config.general.poll_interval_secs = secs;
    }
    if let Some(path) = cli.seen_file {
        config.general.seen_file = Some(path);
    }

    // Auth problems are reported before the terminal is taken over
    let github = match connect(&config).await {
        Ok(github) => github,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    // Set up panic hook to restore terminal
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = tui::restore();
        original_hook(panic_info);
    }));

    let result = run(github, config).await;

    // Restore terminal
    tui::restore()?;

    result
}

async fn connect(config: &Config) -> error::Result<GitHub> {
    let token = auth::load_token(&config.github)?;
    auth::verify_token(&token, &config.github.api_url).await?;
    GitHub::new(token, &config.github.api_url)
}

async fn run(github: GitHub, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let seen = match config.seen_path() {
        Some(path) => SeenStore::load(path),
        None => SeenStore::in_memory(),
    };
    tracing::info!(path = ?seen.path(), entries = seen.len(), "seen store loaded");

    // Initialize terminal
    let mut terminal = tui::init()?;

    // Create action channel
    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();

    let timing = Timing {
        debounce: config.debounce(),
        key_timeout: config.key_timeout(),
    };
    let mut app = App::new(
        Arc::new(github),
        seen,
        TokioScheduler::new(action_tx.clone()),
        timing,
        action_tx.clone(),
    );

    let render_rate = Duration::from_millis(16); // ~60fps
    let mut events = EventHandler::new(render_rate);

    // The first tick fires immediately and doubles as the initial fetch
    let mut poll = tokio::time::interval(config.poll_interval());

    // Main loop
    loop {
        tokio::select! {
            Some(event) = events.next() => {
                match event {
                    Event::Render => {
                        terminal.draw(|frame| ui::render(frame, &app))?;
                    }
                    _ => {
                        let action = app.handle_event(event);
                        if !matches!(action, Action::None) {
                            action_tx.send(action)?;
                        }
                    }
                }
            }
            Some(action) = action_rx.recv() => {
                app.update(action);
            }
            _ = poll.tick() => {
                app.update(Action::Refresh);
            }
        }

        if app.should_quit {
            break;
        }
    }

    drop(events);
    terminal.draw(|frame| ui::render(frame, &app))?;
    app.flush_pending_mutations().await;

    Ok(())
}
