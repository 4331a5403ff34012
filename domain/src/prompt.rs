use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// Grounded prompt handed to a generator: a system instruction plus the
/// user turn carrying retrieved context and the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// Chat-style message list, system turn first.
    pub fn messages(&self) -> Vec<Message> {
        vec![
            Message {
                role: "system".to_string(),
                content: self.system.clone(),
            },
            Message {
                role: "user".to_string(),
                content: self.user.clone(),
            },
        ]
    }

    /// Appends an extra instruction to the user turn.
    pub fn with_reminder(&self, reminder: &str) -> Self {
        Self {
            system: self.system.clone(),
            user: format!("{}\n\n{}", self.user, reminder),
        }
    }
}
