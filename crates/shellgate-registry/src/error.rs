use std::path::PathBuf;

use thiserror::Error;

use crate::TabType;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Tab {0} not found")]
    NotFound(u64),

    #[error("Tab {id} ({tab_type}) has no transport slot")]
    NoTransportSlot { id: u64, tab_type: TabType },

    #[error("Session store I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode session data: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Session service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Session service returned HTTP {0}")]
    Status(u16),
}
