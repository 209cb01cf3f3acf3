//! Event payloads exchanged with the voting API.
//!
//! The server owns these shapes. Field names follow its camelCase JSON.

use serde::{Deserialize, Serialize};

use crate::{EventId, NonEmptyString, OptionId};

/// One selectable option of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOption {
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<OptionId>,
    pub name: NonEmptyString,
}

impl VoteOption {
    #[must_use]
    pub fn new(id: impl Into<String>, name: NonEmptyString) -> Self {
        Self {
            id: Some(OptionId::new(id)),
            name,
        }
    }

    /// Option id; servers that omit ids address options by name.
    #[must_use]
    pub fn id(&self) -> OptionId {
        self.id
            .clone()
            .unwrap_or_else(|| OptionId::new(self.name.as_str()))
    }
}

/// `GET /event/{id}` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetail {
    #[serde(alias = "_id")]
    pub id: EventId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub options: Vec<VoteOption>,
    #[serde(default)]
    pub has_voted: bool,
}

impl EventDetail {
    #[must_use]
    pub fn option(&self, id: &OptionId) -> Option<&VoteOption> {
        self.options.iter().find(|option| option.id() == *id)
    }

    /// Looks an option up by id first, then by case-insensitive name.
    #[must_use]
    pub fn find_option(&self, needle: &str) -> Option<&VoteOption> {
        let needle = needle.trim();
        self.option(&OptionId::new(needle)).or_else(|| {
            self.options
                .iter()
                .find(|option| option.name.trim().eq_ignore_ascii_case(needle))
        })
    }
}

/// `POST /event/{id}/vote` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub option_name: String,
}

/// Vote count for a single option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionTally {
    pub name: String,
    #[serde(default)]
    pub votes: u64,
}

/// `GET /event/{id}/stats` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResults {
    #[serde(default)]
    pub event_id: Option<EventId>,
    #[serde(default)]
    pub total_votes: u64,
    #[serde(default)]
    pub options: Vec<OptionTally>,
}

impl EventResults {
    /// Share of the vote for `tally`, in percent. Zero when nobody voted.
    #[must_use]
    pub fn percentage(&self, tally: &OptionTally) -> f64 {
        let total = if self.total_votes == 0 {
            self.options.iter().map(|o| o.votes).sum()
        } else {
            self.total_votes
        };
        if total == 0 {
            return 0.0;
        }
        tally.votes as f64 * 100.0 / total as f64
    }
}
