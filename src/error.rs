use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::encoding::EncodeError;

/// Failures that stop the simulator.
///
/// Input typed at the wrong moment and characters the charset cannot punch
/// are not errors; they are dropped where they occur.
#[derive(Debug, Error)]
pub enum KeypunchError {
    #[error("read from {source_name} failed")]
    Read {
        source_name: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid machine configuration: {0}")]
    Config(String),
    #[error("failed to read configuration {}", path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse configuration {}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

pub type Result<T, E = KeypunchError> = std::result::Result<T, E>;
