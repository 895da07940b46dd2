use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The chat channel can render at most this many button choices in one
/// message.
pub const MAX_CHOICES: usize = 3;

/// Hard cap on selectable rows across all sections of one list message.
/// Longer selections must paginate (see the booking time step).
pub const MAX_LIST_ROWS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Choice {
    pub id: String,
    pub label: String,
}

impl Choice {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
}

impl ListRow {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListSection {
    pub title: String,
    pub rows: Vec<ListRow>,
}

impl ListSection {
    pub fn new(title: impl Into<String>, rows: Vec<ListRow>) -> Self {
        Self {
            title: title.into(),
            rows,
        }
    }

    pub fn row_count(sections: &[ListSection]) -> usize {
        sections.iter().map(|s| s.rows.len()).sum()
    }
}

/// Outbound boundary to the chat channel. Delivery is at-least-once;
/// callers decide per call site whether a send failure fails the step or
/// is best-effort.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, identity: &str, body: &str) -> Result<()>;

    /// `choices.len() <= MAX_CHOICES`.
    async fn send_choices(&self, identity: &str, body: &str, choices: &[Choice]) -> Result<()>;

    /// Total rows across `sections` must not exceed MAX_LIST_ROWS.
    async fn send_list(
        &self,
        identity: &str,
        body: &str,
        button: &str,
        sections: &[ListSection],
    ) -> Result<()>;
}

/// Records every outbound message. The test double used across the
/// crate's unit and scenario tests.
#[derive(Default)]
pub struct RecordingMessenger {
    pub sent: std::sync::Mutex<Vec<Outbound>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text {
        identity: String,
        body: String,
    },
    Choices {
        identity: String,
        body: String,
        choices: Vec<Choice>,
    },
    List {
        identity: String,
        body: String,
        sections: Vec<ListSection>,
    },
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Outbound> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn last_text(&self) -> Option<String> {
        self.sent.lock().unwrap().iter().rev().find_map(|m| match m {
            Outbound::Text { body, .. } => Some(body.clone()),
            _ => None,
        })
    }

    pub fn all_bodies(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| match m {
                Outbound::Text { body, .. }
                | Outbound::Choices { body, .. }
                | Outbound::List { body, .. } => body.clone(),
            })
            .collect()
    }

    pub fn last_list_rows(&self) -> Vec<ListRow> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|m| match m {
                Outbound::List { sections, .. } => {
                    Some(sections.iter().flat_map(|s| s.rows.clone()).collect())
                }
                _ => None,
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(&self, identity: &str, body: &str) -> Result<()> {
        self.sent.lock().unwrap().push(Outbound::Text {
            identity: identity.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn send_choices(&self, identity: &str, body: &str, choices: &[Choice]) -> Result<()> {
        debug_assert!(choices.len() <= MAX_CHOICES);
        self.sent.lock().unwrap().push(Outbound::Choices {
            identity: identity.to_string(),
            body: body.to_string(),
            choices: choices.to_vec(),
        });
        Ok(())
    }

    async fn send_list(
        &self,
        identity: &str,
        body: &str,
        _button: &str,
        sections: &[ListSection],
    ) -> Result<()> {
        debug_assert!(ListSection::row_count(sections) <= MAX_LIST_ROWS);
        self.sent.lock().unwrap().push(Outbound::List {
            identity: identity.to_string(),
            body: body.to_string(),
            sections: sections.to_vec(),
        });
        Ok(())
    }
}
