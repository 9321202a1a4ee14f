use std::collections::HashMap;
use std::sync::RwLock;

use super::StoreError;
use crate::script::{Script, ScriptLoader, ScriptStorer};
use crate::{read, write};

/// In-memory script store
#[derive(Debug, Default)]
pub struct MemoryStore {
    scripts: RwLock<HashMap<String, Script>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `scripts`
    pub fn with_scripts(scripts: impl IntoIterator<Item = Script>) -> Self {
        let scripts = scripts.into_iter().map(|s| (s.id.clone(), s)).collect();
        Self {
            scripts: RwLock::new(scripts),
        }
    }

    pub fn len(&self) -> usize {
        read(&self.scripts).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ScriptLoader for MemoryStore {
    fn get_script(&self, id: &str) -> Result<Script, StoreError> {
        read(&self.scripts)
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn get_autorun_scripts(&self, level: i32) -> Result<Vec<Script>, StoreError> {
        let scripts = read(&self.scripts);
        let mut matching: Vec<Script> = scripts
            .values()
            .filter(|s| s.runs_at(level))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matching)
    }
}

impl ScriptStorer for MemoryStore {
    fn store_script(&self, script: &Script) -> Result<(), StoreError> {
        write(&self.scripts).insert(script.id.clone(), script.clone());
        Ok(())
    }
}
