use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::message::Message;

/// Downloadable snapshot of a conversation. There is no import path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatExport {
    pub messages: Vec<Message>,
    pub export_date: String,
}

impl ChatExport {
    pub fn new(messages: &[Message]) -> Self {
        Self::at(messages, Utc::now())
    }

    pub fn at(messages: &[Message], date: DateTime<Utc>) -> Self {
        Self {
            messages: messages.to_vec(),
            export_date: date.to_rfc3339(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// `copilot-chat-YYYY-MM-DD.json`
    pub fn file_name(date: DateTime<Utc>) -> String {
        format!("copilot-chat-{}.json", date.format("%Y-%m-%d"))
    }

    /// Write the export into `target`. A directory (or `None`, meaning the
    /// current directory) receives the dated default file name.
    pub fn write(&self, target: Option<&Path>) -> Result<PathBuf, Error> {
        let default_name = DateTime::parse_from_rfc3339(&self.export_date)
            .map(|d| Self::file_name(d.with_timezone(&Utc)))
            .unwrap_or_else(|_| Self::file_name(Utc::now()));

        let path = match target {
            Some(p) if p.is_dir() => p.join(default_name),
            Some(p) => p.to_path_buf(),
            None => PathBuf::from(default_name),
        };

        std::fs::write(&path, self.to_json_pretty()?)
            .map_err(|e| Error::storage(format!("Failed to write {}: {}", path.display(), e)))?;
        Ok(path)
    }
}
