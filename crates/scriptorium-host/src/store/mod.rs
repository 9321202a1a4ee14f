//! Script persisters shipped with the host
//!
//! [`MemoryStore`] keeps scripts in a map and is meant for tests and
//! short-lived embeddings. [`DirStore`] keeps one TOML file per script.

use std::io;
use std::path::PathBuf;

mod dir;
mod memory;

pub use dir::DirStore;
pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("script not found: {0}")]
    NotFound(String),

    #[error("invalid script id: {0:?}")]
    InvalidId(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize script {id}: {source}")]
    Serialize {
        id: String,
        #[source]
        source: toml::ser::Error,
    },
}
