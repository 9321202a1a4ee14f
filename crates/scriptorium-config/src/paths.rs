use std::path::PathBuf;

/// Where scriptorium keeps its files
///
/// Follows the XDG base directory layout on Unix-like systems (including
/// macOS) and `%APPDATA%` on Windows:
/// - config: `$XDG_CONFIG_HOME/{name}`, default `~/.config/{name}`
/// - data: `$XDG_DATA_HOME/{name}`, default `~/.local/share/{name}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl ProjectPaths {
    /// Resolve paths for `name`; `None` if no home directory can be found
    pub fn new(name: &str) -> Option<Self> {
        let home = home_dir()?;

        #[cfg(target_os = "windows")]
        let (config_dir, data_dir) = {
            let appdata = std::env::var_os("APPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|| home.join("AppData").join("Roaming"));
            (appdata.join(name), appdata.join(name))
        };

        #[cfg(not(target_os = "windows"))]
        let (config_dir, data_dir) = (
            xdg_dir("XDG_CONFIG_HOME", || home.join(".config")).join(name),
            xdg_dir("XDG_DATA_HOME", || home.join(".local").join("share")).join(name),
        );

        Some(Self {
            config_dir,
            data_dir,
        })
    }

    pub fn config_dir(&self) -> &PathBuf {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Default location of `config.toml`
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Default directory for stored scripts
    pub fn scripts_dir(&self) -> PathBuf {
        self.data_dir.join("scripts")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

/// The home directory, from `HOME` or `USERPROFILE`
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

/// An XDG base directory; relative values are ignored
#[cfg(not(target_os = "windows"))]
fn xdg_dir(var: &str, fallback: impl FnOnce() -> PathBuf) -> PathBuf {
    std::env::var_os(var)
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .unwrap_or_else(fallback)
}
