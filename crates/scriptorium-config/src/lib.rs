pub mod paths;
pub mod scriptorium_config;

pub use paths::ProjectPaths;
pub use scriptorium_config::{
    AutorunConfig, ConfigLoadError, ExecutorConfig, LoggingConfig, ScriptoriumConfig, StoreConfig,
    APP_NAME,
};
