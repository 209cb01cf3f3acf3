//! Line commands understood by the terminal client.

use thiserror::Error;

use evote_engine::{AppLifecycle, EventId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    Login { email: String, password: String },
    Register { name: String, email: String, password: String },
    Logout,
    Profile,
    Open(EventId),
    Results(EventId),
    Enter,
    Answer(bool),
    /// Option by list number, id or name.
    Select(String),
    Submit,
    Acknowledge,
    Back,
    Lifecycle(AppLifecycle),
    Reload,
    Server(String),
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("{0}")]
    InvalidId(String),
}

pub const HELP: &str = "\
Commands:
  login <email> <password>          sign in
  register <name> <email> <password> create an account
  logout                            sign out
  profile                           show the signed-in user
  open <event-id>                   open an event's vote screen
  results <event-id>                show an event's results
  enter                             start secure voting (asks to confirm)
  yes | no                          answer the prompt on screen
  select <n | id | name>            pick an option
  submit                            cast the selected vote
  ok                                dismiss the vote confirmation
  back                              hardware back
  background | inactive | active    simulate app lifecycle changes
  reload                            retry a failed load
  server <url>                      save the API URL for the next start
  status                            show the current screen
  quit";

impl Command {
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };
        let rest: Vec<&str> = words.collect();

        let command = match head.to_ascii_lowercase().as_str() {
            "help" | "?" => Self::Help,
            "status" | "s" => Self::Status,
            "login" | "signin" => match rest.as_slice() {
                [email, password] => Self::Login {
                    email: (*email).to_string(),
                    password: (*password).to_string(),
                },
                _ => return Err(ParseError::Usage("login <email> <password>")),
            },
            "register" | "signup" => match rest.as_slice() {
                [name @ .., email, password] if !name.is_empty() => Self::Register {
                    name: name.join(" "),
                    email: (*email).to_string(),
                    password: (*password).to_string(),
                },
                _ => return Err(ParseError::Usage("register <name> <email> <password>")),
            },
            "logout" | "signout" => Self::Logout,
            "profile" | "whoami" => Self::Profile,
            "open" | "vote" => Self::Open(event_arg(&rest, "open <event-id>")?),
            "results" | "stats" => Self::Results(event_arg(&rest, "results <event-id>")?),
            "enter" => Self::Enter,
            "yes" | "y" => Self::Answer(true),
            "no" | "n" => Self::Answer(false),
            "select" | "pick" => {
                if rest.is_empty() {
                    return Err(ParseError::Usage("select <n | id | name>"));
                }
                Self::Select(rest.join(" "))
            }
            "submit" => Self::Submit,
            "ok" => Self::Acknowledge,
            "back" | "b" => Self::Back,
            "background" | "bg" => Self::Lifecycle(AppLifecycle::Background),
            "inactive" => Self::Lifecycle(AppLifecycle::Inactive),
            "active" | "fg" | "foreground" => Self::Lifecycle(AppLifecycle::Active),
            "reload" | "retry" => Self::Reload,
            "server" => match rest.as_slice() {
                [url] => Self::Server((*url).to_string()),
                _ => return Err(ParseError::Usage("server <url>")),
            },
            "quit" | "exit" | "q" => Self::Quit,
            other => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

fn event_arg(rest: &[&str], usage: &'static str) -> Result<EventId, ParseError> {
    match rest {
        [raw] => EventId::new(*raw).map_err(|e| ParseError::InvalidId(e.to_string())),
        _ => Err(ParseError::Usage(usage)),
    }
}
