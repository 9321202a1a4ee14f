use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::StoreError;
use crate::script::{Script, ScriptLoader, ScriptStorer};

const SCRIPT_EXTENSION: &str = "toml";

/// Stores each script as `<dir>/<id>.toml`
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    /// The directory is created lazily on the first store
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn script_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        validate_id(id)?;
        Ok(self.dir.join(format!("{id}.{SCRIPT_EXTENSION}")))
    }

    fn read_script(path: &Path) -> Result<Script, StoreError> {
        let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Ids become file names, so anything that could escape the directory is rejected
fn validate_id(id: &str) -> Result<(), StoreError> {
    let invalid = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\', '\0'])
        || id.starts_with('.');
    if invalid {
        return Err(StoreError::InvalidId(id.to_string()));
    }
    Ok(())
}

impl ScriptLoader for DirStore {
    fn get_script(&self, id: &str) -> Result<Script, StoreError> {
        let path = self.script_path(id)?;
        match Self::read_script(&path) {
            Err(StoreError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(id.to_string()))
            }
            other => other,
        }
    }

    fn get_autorun_scripts(&self, level: i32) -> Result<Vec<Script>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(
                    target: "scripting",
                    "Script directory does not exist: {}",
                    self.dir.display()
                );
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut scripts = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some(SCRIPT_EXTENSION) {
                continue;
            }

            match Self::read_script(&path) {
                Ok(script) if script.runs_at(level) => scripts.push(script),
                Ok(_) => {}
                Err(e) => {
                    warn!(target: "scripting", "Skipping unreadable script file: {}", e);
                }
            }
        }

        scripts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(scripts)
    }
}

impl ScriptStorer for DirStore {
    fn store_script(&self, script: &Script) -> Result<(), StoreError> {
        let path = self.script_path(&script.id)?;
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StoreError::Io { path, source }
        };

        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;

        let content = toml::to_string_pretty(script).map_err(|source| StoreError::Serialize {
            id: script.id.clone(),
            source,
        })?;

        // Write next to the target and rename so readers never see a partial file
        let tmp = path.with_extension(format!("{SCRIPT_EXTENSION}.tmp"));
        fs::write(&tmp, content).map_err(io_err(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_err(&path))?;

        debug!(target: "scripting", "Stored script {} at {}", script.id, path.display());
        Ok(())
    }
}
