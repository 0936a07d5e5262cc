use crate::tag_line::TagLineError;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum WordTaggerError {
    #[error("No storage root selected")]
    NoRootSelected,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Corrupted data in {}: {source}", file.display())]
    CorruptedData {
        file: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Node not found: {0}")]
    NodeNotFound(Uuid),

    #[error("Layer not found: {0}")]
    LayerNotFound(String),

    #[error("Duplicate entry '{text}'{}", conflict_suffix(.conflicting))]
    Duplicate {
        text: String,
        conflicting: Vec<String>,
    },

    #[error("Tag line error: {0}")]
    TagLine(#[from] TagLineError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl WordTaggerError {
    /// Short reason string used for `SyncStatus::Failed`.
    pub fn reason(&self) -> String {
        match self {
            WordTaggerError::NoRootSelected => "no root selected".to_string(),
            WordTaggerError::AccessDenied(_) => "access denied".to_string(),
            WordTaggerError::InvalidPath(_) => "invalid path".to_string(),
            WordTaggerError::CorruptedData { .. } => "corrupted data".to_string(),
            WordTaggerError::Io(e) => format!("io failure: {}", e.kind()),
            WordTaggerError::Serialization(_) => "serialization failure".to_string(),
            other => other.to_string(),
        }
    }
}

fn conflict_suffix(conflicting: &[String]) -> String {
    if conflicting.is_empty() {
        String::new()
    } else {
        format!(": already tagged with {}", conflicting.join(", "))
    }
}

pub type Result<T> = std::result::Result<T, WordTaggerError>;
