use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use scriptorium_config::{ConfigLoadError, ScriptoriumConfig};
use scriptorium_host::{DirStore, Environment, OutputSink, Registry, ScriptLoader, Value};
use scriptorium_process::ProcessExecutor;
use tracing::{info, warn};

mod logging;

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enables debug logging
    #[arg(short, long)]
    debug: bool,

    /// Use this config file instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write an example config file
    InitConfig,

    /// Run a script file in a fresh environment
    Run {
        file: PathBuf,

        /// Afterwards, execute each stdin line as a fragment appended to the script
        #[arg(long)]
        append_stdin: bool,
    },

    /// Save a script file to the store
    Save {
        file: PathBuf,

        /// Script id; generated when omitted
        #[arg(long)]
        id: Option<String>,
    },

    /// Print a stored script
    Show { id: String },

    /// Start every stored script at the configured autorun levels
    Autorun {
        /// Only this level instead of the configured ones
        #[arg(short, long)]
        level: Option<i32>,

        /// Start scripts in the background and wait for Ctrl-C
        #[arg(long)]
        r#async: bool,
    },
}

const EXAMPLE_CONFIG: &str = r#"# Scriptorium Configuration

[store]
# dir = "/path/to/scripts"

[autorun]
levels = [0]
async = false

[executor]
program = "sh"
args = ["-c"]
poll_interval_ms = 10

[logging]
file = false
"#;

fn create_example_config(path: Option<&Path>) -> anyhow::Result<()> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => ScriptoriumConfig::config_path().context("Failed to determine config directory")?,
    };
    if config_path.exists() {
        bail!("Config file already exists at {}", config_path.display());
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&config_path, EXAMPLE_CONFIG)?;
    info!("Created example config at {}", config_path.display());
    eprintln!("Config file created at: {}", config_path.display());
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ScriptoriumConfig> {
    let result = match path {
        Some(path) => ScriptoriumConfig::load_from(path),
        None => ScriptoriumConfig::load(),
    };
    match result {
        Ok(config) => Ok(config),
        Err(ConfigLoadError::NotFound) => Ok(ScriptoriumConfig::default()),
        Err(e) => Err(e.into()),
    }
}

fn build_registry(config: &ScriptoriumConfig) -> (Registry, Arc<DirStore>) {
    let executor = ProcessExecutor::new(&config.executor.program, &config.executor.args)
        .with_poll_interval(Duration::from_millis(config.executor.poll_interval_ms));
    let store = Arc::new(DirStore::new(config.store.script_dir()));
    let registry = Registry::builder(Arc::new(executor))
        .with_store(store.clone())
        .build();
    (registry, store)
}

/// Writes script output straight to stdout; a closed stdout aborts the script
fn stdout_sink() -> OutputSink {
    Arc::new(|_: &Environment, msg: &str| -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(msg.as_bytes())?;
        out.flush()?;
        Ok(())
    })
}

fn run_file(registry: &Registry, file: &Path, append_stdin: bool) -> anyhow::Result<()> {
    let code =
        fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let env = registry.create_environment(code, Some(stdout_sink()));

    let value = env.start()?;
    info!("Script finished with {}", value);

    if append_stdin {
        for line in io::stdin().lock().lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match env.execute(&line, true) {
                Ok(Value::Nil) => {}
                Ok(value) => info!("Fragment returned {}", value),
                Err(e) => warn!("Fragment failed: {}", e),
            }
        }
    }
    Ok(())
}

/// Start every script at `levels`; runs on a blocking thread since sync starts block
async fn autorun(registry: &Registry, levels: Vec<i32>, run_async: bool) -> anyhow::Result<()> {
    let registry = registry.clone();
    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        for level in levels {
            registry.start_autorun(level, run_async, Some(stdout_sink()))?;
        }
        Ok(())
    })
    .await?
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Command::InitConfig = cli.command {
        logging::init_logging(false, cli.debug)?;
        return create_example_config(cli.config.as_deref());
    }

    let config = load_config(cli.config.as_deref())?;
    let _log_guard = logging::init_logging(config.logging.file, cli.debug)?;
    let (registry, store) = build_registry(&config);

    match cli.command {
        Command::InitConfig => {}
        Command::Run { file, append_stdin } => {
            let registry = registry.clone();
            tokio::task::spawn_blocking(move || run_file(&registry, &file, append_stdin)).await??
        }
        Command::Save { file, id } => {
            let code = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let script = registry.save_script(id.as_deref().unwrap_or_default(), &code)?;
            println!("{}", script.id);
        }
        Command::Show { id } => {
            let script = store.get_script(&id)?;
            println!("id:      {}", script.id);
            println!("kind:    {}", script.kind);
            println!("autorun: {}", script.autorun);
            if !script.notes.is_empty() {
                println!("notes:   {}", script.notes);
            }
            println!();
            print!("{}", script.code);
            if !script.code.ends_with('\n') {
                println!();
            }
        }
        Command::Autorun { level, r#async } => {
            let levels = level.map_or_else(|| config.autorun.levels.clone(), |l| vec![l]);
            let run_async = r#async || config.autorun.run_async;
            autorun(&registry, levels, run_async).await?;

            if run_async {
                info!("Autorun scripts started, press Ctrl-C to stop");
                tokio::signal::ctrl_c().await?;
                let running = registry.len();
                registry.reset_all();
                info!("Stopped {} environment(s)", running);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptorium_host::{Script, ScriptStorer};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[test]
    fn test_example_config_loads_as_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("scriptorium").join("config.toml");

        create_example_config(Some(&path)).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), ScriptoriumConfig::default());
        assert!(create_example_config(Some(&path)).is_err());
    }

    #[test]
    fn test_missing_config_falls_back_to_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = load_config(Some(&temp_dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, ScriptoriumConfig::default());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sync_autorun_leaves_runtime_free() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = ScriptoriumConfig::default();
        config.store.dir = Some(temp_dir.path().to_path_buf());
        let (registry, store) = build_registry(&config);
        store
            .store_script(&Script::new("slow").with_autorun(0).with_code("sleep 0.3"))
            .unwrap();

        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let ticker = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        autorun(&registry, vec![0], false).await.unwrap();
        ticker.abort();

        assert!(ticks.load(Ordering::SeqCst) > 0);
        let envs = registry.list_all();
        assert_eq!(envs.len(), 1);
        assert!(envs.values().all(|env| env.started()));
    }
}
