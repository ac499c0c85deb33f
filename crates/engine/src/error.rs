use std::path::PathBuf;

use snafu::Snafu;

use crate::transport::TransportError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EngineError {
    #[snafu(display("dialog id is empty"))]
    EmptyDialogId { stage: &'static str },
    #[snafu(display("provisional dialog id '{raw}' carries a malformed token"))]
    InvalidProvisionalId {
        stage: &'static str,
        raw: String,
        source: uuid::Error,
    },
    #[snafu(display("message text is empty"))]
    EmptyMessage { stage: &'static str },
    #[snafu(display("cache has no entry under '{dialog_id}'"))]
    CacheEntryMissing {
        stage: &'static str,
        dialog_id: String,
    },
    #[snafu(display("send failed: {source}"))]
    Transport {
        stage: &'static str,
        source: TransportError,
    },
    #[snafu(display("failed to create settings directory at {path:?}"))]
    CreateSettingsDirectory {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings"))]
    SerializeSettings {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file to {path:?}"))]
    WriteSettingsFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to move settings file from {from:?} to {to:?}"))]
    RenameSettingsFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

pub type EngineResult<T> = Result<T, EngineError>;
