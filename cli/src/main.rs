//! evote CLI - line-oriented terminal client.
//!
//! # Event Loop
//!
//! ```text
//! stdin line  -> Command::parse -> App input method
//! Ctrl-C      -> App::lifecycle(Background)   (quits if nothing was interrupted)
//! tick (50ms) -> App::tick
//! ```
//!
//! After every turn of the loop pending notifications are printed, and the
//! screen is printed again if it changed.

mod commands;
mod crash_hardening;
mod render;

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use evote_config::EvoteConfig;
use evote_engine::{
    App, AppLifecycle, CredentialStore, FileCredentialStore, GuardDecision, MemoryCredentialStore,
    NoopPlatform, Route, RouteParams, Settings, VoteScreen,
};

use commands::{Command, HELP};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_evote_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // Without a log file, no logs at all: stdout belongs to the prompt.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_evote_log_file() -> (Option<(PathBuf, std::fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in evote_log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn evote_log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.evote/logs/evote.log
    if let Some(data_dir) = evote_config::data_dir() {
        candidates.push(data_dir.join("logs").join("evote.log"));
    }

    // Fallback: ./.evote/logs/evote.log
    candidates.push(PathBuf::from(".evote").join("logs").join("evote.log"));

    candidates
}

fn load_settings() -> Settings {
    match EvoteConfig::load() {
        Ok(config) => config.unwrap_or_default().settings(),
        Err(e) => {
            tracing::warn!("Ignoring unreadable config: {e}");
            eprintln!("Ignoring config: {e}");
            EvoteConfig::default().settings()
        }
    }
}

fn credential_store(settings: &Settings) -> Arc<dyn CredentialStore> {
    if let Some(path) = &settings.credentials_path {
        return Arc::new(FileCredentialStore::new(path.clone()));
    }
    tracing::warn!("No home directory; credentials will not outlive this process");
    Arc::new(MemoryCredentialStore::new())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    if let Err(e) = crash_hardening::apply() {
        tracing::warn!("{e:#}");
    }

    let settings = load_settings();
    let store = credential_store(&settings);
    let mut app = App::from_settings(&settings, store, Arc::new(NoopPlatform))
        .context("cannot use the configured API URL")?;

    tracing::info!(
        api = %settings.api_base_url,
        profile = settings.platform.as_str(),
        "Starting evote"
    );
    println!(
        "evote - {} ({} profile). Type 'help' for commands.",
        settings.api_base_url,
        settings.platform.as_str()
    );

    app.start().await;
    let mut screen = ScreenPrinter::default();
    screen.refresh(&mut app);

    run(&mut app, &mut screen).await
}

const TICK: Duration = Duration::from_millis(50);

async fn run(app: &mut App, screen: &mut ScreenPrinter) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticks = tokio::time::interval(TICK);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read from stdin")? else {
                    break;
                };
                match Command::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => {
                        if let Err(e) = execute(app, screen, command).await {
                            println!("{e:#}");
                        }
                    }
                    Err(e) => println!("{e}"),
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                if !app.lifecycle(AppLifecycle::Background) {
                    break;
                }
                tracing::info!("Ctrl-C interrupted secure voting");
            }
            _ = ticks.tick() => app.tick().await,
        }
        screen.refresh(app);
    }

    tracing::info!("Exiting");
    Ok(())
}

async fn execute(app: &mut App, screen: &mut ScreenPrinter, command: Command) -> Result<()> {
    match command {
        Command::Help => println!("{HELP}"),
        Command::Status => screen.invalidate(),
        Command::Login { email, password } => app.sign_in(&email, &password)?,
        Command::Register {
            name,
            email,
            password,
        } => app.register(&name, &email, &password)?,
        Command::Logout => app.sign_out().await,
        Command::Profile => {
            let decision = app.navigate(Route::Profile, RouteParams::none()).await?;
            if report_decision(decision) {
                match app.cached_user().await {
                    Some(user) => println!(
                        "Signed in as {}",
                        user.display_name().unwrap_or("(unnamed user)")
                    ),
                    None => println!("Signed in."),
                }
            }
        }
        Command::Open(event_id) => {
            report_decision(app.open_event(event_id).await?);
        }
        Command::Results(event_id) => {
            report_decision(app.open_results(event_id).await?);
        }
        Command::Enter => app.enter_secure_mode()?,
        Command::Answer(accept) => {
            app.answer_prompt(accept)?;
        }
        Command::Select(option) => select(app, &option)?,
        Command::Submit => app.submit()?,
        Command::Acknowledge => app.acknowledge_confirmation()?,
        Command::Back => {
            app.back().await;
        }
        Command::Lifecycle(state) => {
            if !app.lifecycle(state) {
                tracing::debug!(state = state.as_str(), "Lifecycle change had no effect");
            }
        }
        Command::Reload => app.reload(),
        Command::Server(url) => {
            EvoteConfig::persist_api_url(url.trim())?;
            println!("Saved. Restart evote to use {}", url.trim());
        }
        Command::Quit => {}
    }
    Ok(())
}

/// Print why a screen did not open. Returns whether it may render.
fn report_decision(decision: GuardDecision) -> bool {
    if !decision.authenticated {
        println!("Please sign in first ('login <email> <password>').");
    }
    decision.authenticated
}

/// `select 2` picks the second listed option; anything else is an id or name.
fn select(app: &mut App, raw: &str) -> Result<()> {
    let by_number = raw.parse::<usize>().ok().and_then(|n| {
        app.vote_screen()
            .and_then(VoteScreen::session)
            .and_then(|session| session.options().get(n.checked_sub(1)?))
            .map(|option| option.name.to_string())
    });
    app.select(by_number.as_deref().unwrap_or(raw))?;
    Ok(())
}

#[derive(Debug, Default)]
struct ScreenPrinter {
    last: Vec<String>,
}

impl ScreenPrinter {
    fn invalidate(&mut self) {
        self.last.clear();
    }

    fn refresh(&mut self, app: &mut App) {
        for message in app.take_notifications() {
            println!("! {message}");
        }
        let lines = render::screen(app);
        if lines != self.last {
            for line in &lines {
                println!("{line}");
            }
            self.last = lines;
        }
    }
}
