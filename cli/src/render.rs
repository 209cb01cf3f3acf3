//! Plain-text rendering of the app state.

use evote_engine::{App, GuardState, Phase, Prompt, ResultsScreen, SecureVotingSession, VoteScreen};
use evote_types::{EventResults, truncate_with_ellipsis};

const BAR_WIDTH: usize = 24;
const NAME_WIDTH: usize = 28;

/// Everything the user should currently see, one line per entry.
pub fn screen(app: &App) -> Vec<String> {
    let current = app.current();
    let mut lines = vec![format!(
        "[{}] {}{}",
        current.route,
        guard_label(app.guard_state()),
        if app.is_busy() { " (working...)" } else { "" }
    )];

    if let Some(vote) = app.vote_screen() {
        lines.extend(vote_lines(vote));
    }
    if let Some(results) = app.results_screen() {
        lines.extend(results_screen_lines(results));
    }
    lines
}

fn guard_label(state: GuardState) -> &'static str {
    match state {
        GuardState::Unknown => "checking session",
        GuardState::Authenticated => "signed in",
        GuardState::Unauthenticated => "signed out",
    }
}

fn vote_lines(screen: &VoteScreen) -> Vec<String> {
    match screen {
        VoteScreen::Loading { event_id } => vec![format!("Loading event {event_id}...")],
        VoteScreen::Failed { event_id, message } => vec![
            format!("Could not load event {event_id}: {message}"),
            "Type 'reload' to try again.".to_string(),
        ],
        VoteScreen::Ready(session) => session_lines(session),
    }
}

fn session_lines(session: &SecureVotingSession) -> Vec<String> {
    let title = session.title().unwrap_or("Vote");
    let lock = if session.is_locked() { " [secure mode]" } else { "" };
    let mut lines = vec![format!(
        "{} ({}){lock}",
        truncate_with_ellipsis(title, 60),
        session.phase()
    )];

    match session.phase() {
        Phase::PreEntry if session.has_voted() => {
            lines.push("Your vote has been recorded.".to_string());
        }
        Phase::PreEntry => lines.push("Type 'enter' to start secure voting.".to_string()),
        Phase::SelectingOption | Phase::Submitting => {
            let selected = session.selected();
            for (index, option) in session.options().iter().enumerate() {
                let marker = if selected == Some(&option.id()) { '*' } else { ' ' };
                lines.push(format!(
                    "  {marker} {}) {}",
                    index + 1,
                    truncate_with_ellipsis(&option.name, NAME_WIDTH)
                ));
            }
            if session.phase() == Phase::Submitting {
                lines.push("Submitting your vote...".to_string());
            } else if session.can_submit() {
                lines.push("Type 'submit' to cast your vote.".to_string());
            }
        }
        Phase::Confirmed => lines.push("Vote recorded. Type 'ok' to continue.".to_string()),
        Phase::AlreadyVoted => lines.push("You have already voted in this event.".to_string()),
    }

    if let Some(prompt) = session.prompt() {
        lines.push(prompt_text(prompt).to_string());
    }
    lines
}

pub fn prompt_text(prompt: Prompt) -> &'static str {
    match prompt {
        Prompt::ConfirmEntry => {
            "Secure voting locks the screen to portrait and ends the attempt if you \
             leave the app. Continue? (yes/no)"
        }
        Prompt::ConfirmExit => "Leave secure voting? Your selection will be discarded. (yes/no)",
    }
}

fn results_screen_lines(screen: &ResultsScreen) -> Vec<String> {
    match screen {
        ResultsScreen::Loading { event_id } => vec![format!("Loading results for {event_id}...")],
        ResultsScreen::Failed { event_id, message } => vec![
            format!("Could not load results for {event_id}: {message}"),
            "Type 'reload' to try again.".to_string(),
        ],
        ResultsScreen::Ready { results, .. } => results_lines(results),
    }
}

pub fn results_lines(results: &EventResults) -> Vec<String> {
    if results.options.is_empty() {
        return vec!["No votes yet.".to_string()];
    }
    let mut lines: Vec<String> = results
        .options
        .iter()
        .map(|tally| {
            let pct = results.percentage(tally);
            let filled = ((pct / 100.0) * BAR_WIDTH as f64).round() as usize;
            format!(
                "  {:<NAME_WIDTH$} {}{} {:>5.1}% ({})",
                truncate_with_ellipsis(&tally.name, NAME_WIDTH),
                "#".repeat(filled.min(BAR_WIDTH)),
                ".".repeat(BAR_WIDTH - filled.min(BAR_WIDTH)),
                pct,
                tally.votes
            )
        })
        .collect();
    let total: u64 = if results.total_votes == 0 {
        results.options.iter().map(|tally| tally.votes).sum()
    } else {
        results.total_votes
    };
    lines.push(format!("  {total} vote(s) in total"));
    lines
}
