use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Language recorded for new projects.
pub const DEFAULT_PROJECT_LANGUAGE: &str = "javascript";

/// Separator inserted when code from the chat is appended to a project.
pub const ADDED_FROM_CHAT: &str = "// Added from chat";

/// A named collection of code extracted from the chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub code: String,
    pub language: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Project {
    pub fn new(id: u64, name: impl Into<String>, code: impl Into<String>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id,
            name: name.into(),
            code: code.into(),
            language: DEFAULT_PROJECT_LANGUAGE.to_string(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn set_code(&mut self, code: impl Into<String>) {
        self.code = code.into();
        self.updated_at = Utc::now().to_rfc3339();
    }

    pub fn append_code(&mut self, code: &str) {
        let combined = appended(&self.code, code);
        self.set_code(combined);
    }
}

/// `existing` followed by `code` under an "added from chat" marker, or just
/// `code` when there is nothing yet.
pub fn appended(existing: &str, code: &str) -> String {
    if existing.is_empty() {
        code.to_string()
    } else {
        format!("{}\n\n{}\n{}", existing, ADDED_FROM_CHAT, code)
    }
}
