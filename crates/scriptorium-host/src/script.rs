use serde::{Deserialize, Serialize};

use crate::store::StoreError;

/// Autorun level meaning "never start this script automatically"
pub const AUTORUN_NEVER: i32 = -1;

fn default_autorun() -> i32 {
    AUTORUN_NEVER
}

/// A persisted unit of source text plus its metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    /// Unique identifier, chosen by the caller or generated on save
    pub id: String,

    /// Kind tag written by the registry that last saved this script
    #[serde(default)]
    pub kind: String,

    /// Startup phase in which this script is started automatically
    #[serde(default = "default_autorun")]
    pub autorun: i32,

    #[serde(default)]
    pub code: String,

    /// Free-form notes, never touched by the registry
    #[serde(default)]
    pub notes: String,
}

impl Script {
    /// Create an empty script that never autoruns
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: String::new(),
            autorun: AUTORUN_NEVER,
            code: String::new(),
            notes: String::new(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_autorun(mut self, level: i32) -> Self {
        self.autorun = level;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Whether this script should be started during autorun `level`
    pub fn runs_at(&self, level: i32) -> bool {
        self.autorun != AUTORUN_NEVER && self.autorun == level
    }
}

/// Loads scripts from storage
pub trait ScriptLoader: Send + Sync {
    /// Must fail with [`StoreError::NotFound`] if no script has this id
    fn get_script(&self, id: &str) -> Result<Script, StoreError>;

    /// All scripts flagged for `level`; empty for [`AUTORUN_NEVER`]
    fn get_autorun_scripts(&self, level: i32) -> Result<Vec<Script>, StoreError>;
}

/// Stores scripts to storage
pub trait ScriptStorer: Send + Sync {
    fn store_script(&self, script: &Script) -> Result<(), StoreError>;
}

/// Loads and stores scripts
pub trait ScriptPersister: ScriptLoader + ScriptStorer {}

impl<T: ScriptLoader + ScriptStorer + ?Sized> ScriptPersister for T {}
